use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    db_types::{BalanceTransaction, Category, ExecutorTake, NewUser, Order, OrderId, UserAccount},
    order_objects::OrderQueryFilter,
};

#[derive(Debug, Clone, Error)]
pub enum AccountApiError {
    #[error("User account {0} does not exist")]
    UserNotFound(i64),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for AccountApiError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}

/// Notification preferences an executor can set for themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPrefs {
    pub notifications_enabled: bool,
    pub subscribed_categories: Vec<Category>,
    pub subscribed_cities: Vec<String>,
    pub notification_frequency_minutes: i64,
}

/// Read-mostly queries over users, orders and the balance history.
#[allow(async_fn_in_trait)]
pub trait AccountManagement {
    /// Fetches the account for the given user id, or `None` if the id has never been seen.
    async fn fetch_user_account(&self, user_id: i64) -> Result<Option<UserAccount>, AccountApiError>;

    /// Fetches the account for the given identity, creating the row on first contact. The
    /// username is refreshed on every call since it can change upstream.
    async fn fetch_or_create_user_account(&self, user: NewUser) -> Result<UserAccount, AccountApiError>;

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, AccountApiError>;

    /// Fetches an order together with its takes, or `None` if the order does not exist.
    async fn fetch_order_with_takes(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<(Order, Vec<ExecutorTake>)>, AccountApiError>;

    /// Fetches the takes for a whole page of orders in one query.
    async fn fetch_takes_for_orders(&self, order_ids: &[OrderId]) -> Result<Vec<ExecutorTake>, AccountApiError>;

    /// Runs the given filter and returns the matching page of orders plus the total match count.
    ///
    /// When the filter carries no owner (`client_id`), the status set is clamped to the publicly
    /// listable statuses regardless of what was requested.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<(Vec<Order>, i64), AccountApiError>;

    /// The full balance-transaction history for a user, newest first.
    async fn fetch_balance_history(&self, user_id: i64) -> Result<Vec<BalanceTransaction>, AccountApiError>;

    async fn update_notification_prefs(
        &self,
        user_id: i64,
        prefs: NotificationPrefs,
    ) -> Result<UserAccount, AccountApiError>;

    /// All executors subscribed to the given category and city with notifications enabled,
    /// excluding the given client. Cooldown filtering is the caller's job.
    async fn subscribed_executors(
        &self,
        category: Category,
        city: &str,
        exclude_user: i64,
    ) -> Result<Vec<UserAccount>, AccountApiError>;

    async fn mark_executor_notified(&self, user_id: i64, at: DateTime<Utc>) -> Result<(), AccountApiError>;
}
