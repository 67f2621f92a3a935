//! `SqliteDatabase` is the concrete SQLite store behind the Pronto engine.
//!
//! Every lifecycle transition runs inside a single transaction here, so a status change, its
//! counter adjustments and any ledger rows commit or roll back as one unit. SQLite serialises
//! writers, which makes each transaction the exclusive read-check-write section that the take
//! and webhook paths rely on: the balance (or invoice status) examined inside a transaction
//! cannot be changed by a racing writer before the commit.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use crate::{
    config::MarketConfig,
    db_types::{
        BalanceTransaction,
        Category,
        ExecutorTake,
        NewOrder,
        NewUser,
        Order,
        OrderId,
        OrderStatus,
        PaymentInvoice,
        TransactionType,
        UserAccount,
        PUBLICLY_LISTABLE,
    },
    order_objects::{NewInvoice, OrderQueryFilter, PaidInvoice, SweepResult, TakeOutcome, UpdateOrderRequest},
    sqlite::db::{self, invoices, ledger, orders, takes, users},
    traits::{
        AccountApiError,
        AccountManagement,
        MarketplaceDatabase,
        NotificationPrefs,
        OrderFlowError,
        PaymentsApiError,
        PaymentsDatabase,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
    config: MarketConfig,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL from the environment.
    pub async fn new(config: MarketConfig, max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db::db_url();
        SqliteDatabase::new_with_url(url.as_str(), config, max_connections).await
    }

    pub async fn new_with_url(url: &str, config: MarketConfig, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = db::new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool, config })
    }

    /// Runs the embedded schema migrations against this database.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        db::run_migrations(&self.pool).await
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl MarketplaceDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    fn config(&self) -> &MarketConfig {
        &self.config
    }

    async fn create_order(&self, order: NewOrder) -> Result<Order, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        users::fetch_user(order.client_id, &mut tx).await?.ok_or(OrderFlowError::UserNotFound(order.client_id))?;
        if orders::active_contact_exists(&order.contact, &mut tx).await? {
            return Err(OrderFlowError::Conflict("This contact already has an active order".to_string()));
        }
        let id = OrderId::random();
        let created = orders::insert_order(&order, &id, self.config.order_lifetime_minutes, &mut tx).await?;
        users::adjust_order_counters(order.client_id, 1, 0, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️📦️ Order [{id}] created for client #{}", created.client_id);
        Ok(created)
    }

    async fn update_order(
        &self,
        order_id: &OrderId,
        client_id: i64,
        patch: UpdateOrderRequest,
        now: DateTime<Utc>,
    ) -> Result<Order, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order_for_client(order_id, client_id, &mut tx)
            .await?
            .ok_or(OrderFlowError::OrderNotFound)?;
        if order.status != OrderStatus::Active {
            return Err(OrderFlowError::Gone("Order is no longer active".to_string()));
        }
        let order_takes = takes::takes_for_order(order_id, &mut tx).await?;
        if !order_takes.is_empty() {
            return Err(OrderFlowError::Forbidden("Cannot edit an order after an executor has taken it".to_string()));
        }
        if order.is_expired(now) {
            return Err(OrderFlowError::Gone("Order has expired".to_string()));
        }
        if patch.is_empty() {
            debug!("🗃️📦️ Empty patch for order [{order_id}]; nothing to do");
            return Ok(order);
        }
        let updated = orders::apply_patch(order_id, &patch, &mut tx).await?.ok_or(OrderFlowError::OrderNotFound)?;
        tx.commit().await?;
        debug!("🗃️📦️ Order [{order_id}] updated by client #{client_id}");
        Ok(updated)
    }

    async fn delete_order(&self, order_id: &OrderId, client_id: i64, now: DateTime<Utc>) -> Result<(), OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order_for_client(order_id, client_id, &mut tx)
            .await?
            .ok_or(OrderFlowError::OrderNotFound)?;
        if order.status != OrderStatus::Active {
            return Err(OrderFlowError::Gone("Order is no longer active".to_string()));
        }
        let order_takes = takes::takes_for_order(order_id, &mut tx).await?;
        if !order_takes.is_empty() {
            return Err(OrderFlowError::Forbidden(
                "Cannot delete an order after an executor has taken it".to_string(),
            ));
        }
        if order.is_expired(now) {
            return Err(OrderFlowError::Gone("Order has expired".to_string()));
        }
        orders::update_order_status(order_id, OrderStatus::Deleted, &mut tx).await?;
        users::adjust_order_counters(client_id, -1, 0, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️📦️ Order [{order_id}] deleted by client #{client_id}");
        Ok(())
    }

    async fn take_order(
        &self,
        order_id: &OrderId,
        executor_id: i64,
        now: DateTime<Utc>,
    ) -> Result<TakeOutcome, OrderFlowError> {
        // Lock acquisition order is fixed system-wide: the executor's account context first,
        // then the order row. The sweep follows the same order when it refunds.
        let mut tx = self.pool.begin().await?;
        let executor =
            users::fetch_user(executor_id, &mut tx).await?.ok_or(OrderFlowError::UserNotFound(executor_id))?;
        let order = orders::fetch_order(order_id, &mut tx).await?.ok_or(OrderFlowError::OrderNotFound)?;
        if order.status != OrderStatus::Active {
            return Err(OrderFlowError::Gone("Order is no longer active".to_string()));
        }
        if order.is_expired(now) {
            // Lazy expiry: this read mutates. The expiry is committed before the caller sees
            // the failure so that the next viewer finds the terminal state.
            orders::update_order_status(order_id, OrderStatus::Expired, &mut tx).await?;
            users::adjust_order_counters(order.client_id, -1, 0, &mut tx).await?;
            let order_takes = takes::takes_for_order(order_id, &mut tx).await?;
            for take in &order_takes {
                users::adjust_order_counters(take.executor_id, -1, 0, &mut tx).await?;
            }
            tx.commit().await?;
            debug!("🗃️📦️ Order [{order_id}] expired lazily on take by #{executor_id}");
            return Err(OrderFlowError::Gone("Order has expired".to_string()));
        }
        if order.client_id == executor_id {
            return Err(OrderFlowError::Forbidden("Cannot take your own order".to_string()));
        }
        let order_takes = takes::takes_for_order(order_id, &mut tx).await?;
        if order_takes.iter().any(|t| t.executor_id == executor_id) {
            // Idempotent retry: the slot is already paid for, hand back the contact for free.
            debug!("🗃️📦️ Executor #{executor_id} already holds a take on [{order_id}]; no charge");
            return Ok(TakeOutcome {
                contact: order.contact,
                take_count: order_takes.len(),
                new_balance: executor.balance,
                charged: false,
            });
        }
        if order_takes.len() >= self.config.max_executors_per_order {
            return Err(OrderFlowError::Conflict(format!(
                "Maximum {} executors reached",
                self.config.max_executors_per_order
            )));
        }
        let cost = self.config.order_take_cost;
        let new_balance = ledger::debit(
            &mut tx,
            executor_id,
            cost,
            TransactionType::OrderTake,
            order_id,
            &format!("Took order {order_id}"),
        )
        .await?;
        takes::insert_take(order_id, executor_id, now, &mut tx).await?;
        users::adjust_order_counters(executor_id, 1, 0, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️📦️ Executor #{executor_id} took order [{order_id}] for {cost}");
        Ok(TakeOutcome { contact: order.contact, take_count: order_takes.len() + 1, new_balance, charged: true })
    }

    async fn respond_to_order(
        &self,
        order_id: &OrderId,
        client_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Order, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order(order_id, &mut tx).await?.ok_or(OrderFlowError::OrderNotFound)?;
        if order.client_id != client_id {
            return Err(OrderFlowError::Forbidden("Only the order client can respond".to_string()));
        }
        if order.status != OrderStatus::Active {
            return Err(OrderFlowError::Gone("Order is no longer active".to_string()));
        }
        let order_takes = takes::takes_for_order(order_id, &mut tx).await?;
        if order_takes.is_empty() {
            return Err(OrderFlowError::Conflict("No executor has taken this order yet".to_string()));
        }
        if order.customer_responded_at.is_some() {
            return Err(OrderFlowError::Conflict("Already responded".to_string()));
        }
        let order = orders::set_customer_responded(order_id, now, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️📦️ Client #{client_id} responded on order [{order_id}]");
        Ok(order)
    }

    async fn close_order(&self, order_id: &OrderId, client_id: i64) -> Result<Order, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order(order_id, &mut tx).await?.ok_or(OrderFlowError::OrderNotFound)?;
        if order.client_id != client_id {
            return Err(OrderFlowError::Forbidden("Only the order client can close it".to_string()));
        }
        if order.status != OrderStatus::Active {
            return Err(OrderFlowError::Gone("Order is no longer active".to_string()));
        }
        let order_takes = takes::takes_for_order(order_id, &mut tx).await?;
        if order_takes.is_empty() {
            return Err(OrderFlowError::Conflict("No executor has taken this order yet".to_string()));
        }
        // Closing after engagement is the client's prerogative; the fee bought contact access
        // that was delivered, so nobody is refunded here. The no-response path in the sweep is
        // the one that reverses payment.
        let order = orders::update_order_status(order_id, OrderStatus::ClosedNoResponse, &mut tx).await?;
        users::adjust_order_counters(client_id, -1, 0, &mut tx).await?;
        for take in &order_takes {
            users::adjust_order_counters(take.executor_id, -1, 0, &mut tx).await?;
        }
        tx.commit().await?;
        debug!("🗃️📦️ Client #{client_id} closed order [{order_id}] without completion");
        Ok(order)
    }

    async fn complete_order(&self, order_id: &OrderId, client_id: i64) -> Result<Order, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order(order_id, &mut tx).await?.ok_or(OrderFlowError::OrderNotFound)?;
        if order.client_id != client_id {
            return Err(OrderFlowError::Forbidden("Only the order client can complete it".to_string()));
        }
        if order.status != OrderStatus::Active {
            return Err(OrderFlowError::Gone("Order is no longer active".to_string()));
        }
        let order_takes = takes::takes_for_order(order_id, &mut tx).await?;
        if order_takes.is_empty() {
            return Err(OrderFlowError::Conflict("No executor has taken this order yet".to_string()));
        }
        let order = orders::update_order_status(order_id, OrderStatus::Completed, &mut tx).await?;
        users::adjust_order_counters(client_id, -1, 1, &mut tx).await?;
        for take in &order_takes {
            users::adjust_order_counters(take.executor_id, -1, 1, &mut tx).await?;
        }
        tx.commit().await?;
        debug!("🗃️📦️ Order [{order_id}] completed; {} executor(s) credited with a completion", order_takes.len());
        Ok(order)
    }

    async fn sweep_expired_orders(&self, now: DateTime<Utc>) -> Result<SweepResult, OrderFlowError> {
        let ids = {
            let mut conn = self.pool.acquire().await?;
            orders::active_order_ids(&mut conn).await?
        };
        trace!("🕰️ Sweep scanning {} active order(s)", ids.len());
        let mut result = SweepResult::default();
        for id in ids {
            // Each order is its own transaction so one bad row cannot wedge the whole pass.
            match self.sweep_one(&id, now).await {
                Ok(Some(SweepAction::Expired(order))) => result.expired.push(order),
                Ok(Some(SweepAction::ClosedNoResponse(order))) => result.closed_no_response.push(order),
                Ok(None) => {},
                Err(e) => {
                    error!("🕰️ Sweep failed for order [{id}]: {e}");
                    result.failures += 1;
                },
            }
        }
        Ok(result)
    }
}

enum SweepAction {
    Expired(Order),
    ClosedNoResponse(Order),
}

impl SqliteDatabase {
    async fn sweep_one(&self, order_id: &OrderId, now: DateTime<Utc>) -> Result<Option<SweepAction>, OrderFlowError> {
        let mut tx = self.pool.begin().await?;
        // Re-fetch under the transaction; a live request may have won the race since the scan.
        let Some(order) = orders::fetch_order(order_id, &mut tx).await? else {
            return Ok(None);
        };
        if order.status != OrderStatus::Active {
            return Ok(None);
        }
        let order_takes = takes::takes_for_order(order_id, &mut tx).await?;

        if order.is_expired(now) {
            let order = orders::update_order_status(order_id, OrderStatus::Expired, &mut tx).await?;
            users::adjust_order_counters(order.client_id, -1, 0, &mut tx).await?;
            for take in &order_takes {
                users::adjust_order_counters(take.executor_id, -1, 0, &mut tx).await?;
            }
            tx.commit().await?;
            info!("🕰️ Order [{order_id}] expired after {} minute(s)", order.expires_in_minutes);
            return Ok(Some(SweepAction::Expired(order)));
        }

        if order.customer_responded_at.is_none() {
            if let Some(first_take) = order_takes.first() {
                let deadline = first_take.taken_at + self.config.no_response_window();
                if now >= deadline {
                    let order = orders::update_order_status(order_id, OrderStatus::ClosedNoResponse, &mut tx).await?;
                    users::adjust_order_counters(order.client_id, -1, 0, &mut tx).await?;
                    // The client went silent, which is not the executors' fault; this is the one
                    // auto-transition that reverses payment.
                    let cost = self.config.order_take_cost;
                    for take in &order_takes {
                        users::adjust_order_counters(take.executor_id, -1, 0, &mut tx).await?;
                        ledger::credit(
                            &mut tx,
                            take.executor_id,
                            cost,
                            TransactionType::Refund,
                            &format!("Refund for order {order_id}"),
                            Some(order_id),
                            None,
                        )
                        .await?;
                        info!("🕰️ Refunded {cost} to executor #{} for order [{order_id}]", take.executor_id);
                    }
                    tx.commit().await?;
                    info!("🕰️ Order [{order_id}] closed with no response; {} executor(s) refunded", order_takes.len());
                    return Ok(Some(SweepAction::ClosedNoResponse(order)));
                }
            }
        }
        Ok(None)
    }
}

impl AccountManagement for SqliteDatabase {
    async fn fetch_user_account(&self, user_id: i64) -> Result<Option<UserAccount>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        users::fetch_user(user_id, &mut conn).await
    }

    async fn fetch_or_create_user_account(&self, user: NewUser) -> Result<UserAccount, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        users::fetch_or_create_user(&user, &mut conn).await
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_with_takes(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<(Order, Vec<ExecutorTake>)>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let Some(order) = orders::fetch_order(order_id, &mut conn).await? else {
            return Ok(None);
        };
        let order_takes = takes::takes_for_order(order_id, &mut conn).await?;
        Ok(Some((order, order_takes)))
    }

    async fn fetch_takes_for_orders(&self, order_ids: &[OrderId]) -> Result<Vec<ExecutorTake>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let order_takes = takes::takes_for_orders(order_ids, &mut conn).await?;
        Ok(order_takes)
    }

    async fn search_orders(&self, mut query: OrderQueryFilter) -> Result<(Vec<Order>, i64), AccountApiError> {
        if query.client_id.is_none() {
            // Public browsing never surfaces deleted or silently-closed orders, whatever the
            // caller asked for.
            let requested = query.status.unwrap_or_else(|| vec![OrderStatus::Active]);
            let mut visible: Vec<OrderStatus> =
                requested.into_iter().filter(|s| PUBLICLY_LISTABLE.contains(s)).collect();
            if visible.is_empty() {
                visible = vec![OrderStatus::Active];
            }
            query.status = Some(visible);
        }
        let mut conn = self.pool.acquire().await?;
        let orders = orders::search_orders(&query, &mut conn).await?;
        let total = orders::count_orders(&query, &mut conn).await?;
        Ok((orders, total))
    }

    async fn fetch_balance_history(&self, user_id: i64) -> Result<Vec<BalanceTransaction>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let txns = ledger::transactions_for_user(user_id, &mut conn).await?;
        Ok(txns)
    }

    async fn update_notification_prefs(
        &self,
        user_id: i64,
        prefs: NotificationPrefs,
    ) -> Result<UserAccount, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        users::update_notification_prefs(user_id, &prefs, &mut conn)
            .await?
            .ok_or(AccountApiError::UserNotFound(user_id))
    }

    async fn subscribed_executors(
        &self,
        category: Category,
        city: &str,
        exclude_user: i64,
    ) -> Result<Vec<UserAccount>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        users::subscribed_executors(category, city, exclude_user, &mut conn).await
    }

    async fn mark_executor_notified(&self, user_id: i64, at: DateTime<Utc>) -> Result<(), AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        users::set_last_notified(user_id, at, &mut conn).await
    }
}

impl PaymentsDatabase for SqliteDatabase {
    async fn create_pending_invoice(
        &self,
        user_id: i64,
        invoice: NewInvoice,
    ) -> Result<PaymentInvoice, PaymentsApiError> {
        if !invoice.amount.is_positive() {
            return Err(PaymentsApiError::InvalidAmount(invoice.amount));
        }
        let mut conn = self.pool.acquire().await?;
        let invoice = invoices::insert_invoice(user_id, &invoice, &mut conn).await?;
        debug!(
            "🗃️💰️ Invoice #{} ({}) persisted for user #{user_id}, external id {}",
            invoice.id, invoice.amount, invoice.external_invoice_id
        );
        Ok(invoice)
    }

    async fn process_paid_invoice(
        &self,
        external_invoice_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PaidInvoice>, PaymentsApiError> {
        let mut tx = self.pool.begin().await?;
        let Some(invoice) = invoices::fetch_by_external_id(external_invoice_id, &mut tx).await? else {
            warn!("🗃️💰️ Webhook for unknown invoice {external_invoice_id}; ignoring");
            return Ok(None);
        };
        if invoice.status == crate::db_types::InvoiceStatus::Paid {
            info!("🗃️💰️ Invoice #{} already paid; skipping", invoice.id);
            return Ok(None);
        }
        let (new_balance, transaction_id) = ledger::credit(
            &mut tx,
            invoice.user_id,
            invoice.amount,
            TransactionType::Recharge,
            &format!("Crypto Pay payment {external_invoice_id}"),
            None,
            Some(external_invoice_id),
        )
        .await?;
        let invoice = invoices::mark_paid(invoice.id, transaction_id, now, &mut tx).await?;
        tx.commit().await?;
        info!(
            "🗃️💰️ Invoice #{} paid: user #{} credited {}; balance is now {new_balance}",
            invoice.id, invoice.user_id, invoice.amount
        );
        Ok(Some(PaidInvoice { invoice, new_balance, transaction_id }))
    }

    async fn invoice_for_user(
        &self,
        invoice_id: i64,
        user_id: i64,
    ) -> Result<Option<PaymentInvoice>, PaymentsApiError> {
        let mut conn = self.pool.acquire().await?;
        let invoice = invoices::fetch_for_user(invoice_id, user_id, &mut conn).await?;
        Ok(invoice)
    }

    async fn recharge(&self, user_id: i64, amount: pronto_common::Rubles, method: &str) -> Result<(pronto_common::Rubles, i64), PaymentsApiError> {
        if !amount.is_positive() {
            return Err(PaymentsApiError::InvalidAmount(amount));
        }
        let mut tx = self.pool.begin().await?;
        let (new_balance, txn_id) = ledger::credit(
            &mut tx,
            user_id,
            amount,
            TransactionType::Recharge,
            &format!("Balance recharge via {method}"),
            None,
            None,
        )
        .await?;
        tx.commit().await?;
        Ok((new_balance, txn_id))
    }
}
