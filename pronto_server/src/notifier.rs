//! New-order notification dispatcher.
//!
//! Consumes [`OrderCreatedEvent`]s from the engine hook and messages every subscribed executor
//! matching the order's category and city, honouring each recipient's cooldown. Strictly
//! best-effort: every failure in here is logged and swallowed, and nothing ever propagates back
//! into the order-creation request that triggered the event.
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use log::*;
use pronto_engine::{
    db_types::Order,
    events::OrderCreatedEvent,
    traits::AccountManagement,
    AccountApi,
    SqliteDatabase,
};
use reqwest::Client;
use serde_json::json;

use crate::{config::NotifierConfig, errors::ServerError};

/// Per-recipient send timeout. A slow notification channel should delay messages, not pile up
/// worker tasks.
const SEND_TIMEOUT: StdDuration = StdDuration::from_secs(10);

#[derive(Clone)]
pub struct Notifier {
    client: Client,
    config: NotifierConfig,
    accounts: AccountApi<SqliteDatabase>,
}

impl Notifier {
    pub fn new(config: NotifierConfig, accounts: AccountApi<SqliteDatabase>) -> Result<Self, ServerError> {
        let client = Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| ServerError::InitializeError(format!("Could not build notifier HTTP client: {e}")))?;
        Ok(Self { client, config, accounts })
    }

    pub async fn handle_event(&self, event: OrderCreatedEvent) {
        self.notify_new_order(event.order).await;
    }

    /// Fans the new order out to eligible executors. Never returns an error.
    pub async fn notify_new_order(&self, order: Order) {
        if !self.config.is_configured() {
            trace!("🔔️ Notification channel not configured; skipping fan-out for [{}]", order.id);
            return;
        }
        let executors = match self.accounts.db().subscribed_executors(order.category, &order.city, order.client_id).await
        {
            Ok(executors) => executors,
            Err(e) => {
                warn!("🔔️ Could not look up subscribers for order [{}]: {e}", order.id);
                return;
            },
        };
        if executors.is_empty() {
            info!("🔔️ No subscribed executors for order [{}] ({}, {})", order.id, order.category, order.city);
            return;
        }
        let now = Utc::now();
        let eligible: Vec<_> = executors
            .into_iter()
            .filter(|executor| match executor.last_notified_at {
                Some(last) => now >= last + Duration::minutes(executor.notification_frequency_minutes),
                None => true,
            })
            .collect();
        if eligible.is_empty() {
            info!("🔔️ All subscribers for order [{}] are in cooldown", order.id);
            return;
        }
        let text = format!(
            "🔔 New order in category \"{}\" in {}!\n\nOpen the app to see the details.",
            order.category, order.city
        );
        let url = format!("{}/bot{}/sendMessage", self.config.api_url, self.config.bot_token.reveal());
        let mut sent = 0usize;
        for executor in &eligible {
            let result = self.client.post(&url).json(&json!({ "chat_id": executor.id, "text": text })).send().await;
            match result {
                Ok(response) if response.status().is_success() => {
                    sent += 1;
                    if let Err(e) = self.accounts.db().mark_executor_notified(executor.id, now).await {
                        warn!("🔔️ Could not record notification time for #{}: {e}", executor.id);
                    }
                },
                Ok(response) => {
                    warn!(
                        "🔔️ Notification API returned {} for user #{}; skipping",
                        response.status(),
                        executor.id
                    );
                },
                Err(e) => {
                    warn!("🔔️ Failed to notify user #{}: {e}", executor.id);
                },
            }
        }
        info!("🔔️ Notified {sent}/{} executors about order [{}]", eligible.len(), order.id);
    }
}
