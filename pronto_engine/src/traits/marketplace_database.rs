use chrono::{DateTime, Utc};
use pronto_common::Rubles;
use thiserror::Error;

use crate::{
    config::MarketConfig,
    db_types::{NewOrder, Order, OrderId},
    order_objects::{SweepResult, TakeOutcome, UpdateOrderRequest},
    traits::{ledger::LedgerError, AccountApiError, AccountManagement},
};

/// Everything that can go wrong in an order lifecycle transition.
///
/// Deliberately coarse: ownership failures on fetch-by-owner paths surface as [`OrderNotFound`]
/// (identical to absence, so callers cannot probe for foreign orders), while rule violations on
/// orders the caller may know about carry their own variants.
///
/// [`OrderNotFound`]: OrderFlowError::OrderNotFound
#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("Order not found")]
    OrderNotFound,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Gone(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Insufficient balance: need {needed}, have {available}")]
    InsufficientFunds { needed: Rubles, available: Rubles },
    #[error("Invalid request: {0}")]
    Invalid(String),
    #[error("User account {0} does not exist")]
    UserNotFound(i64),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for OrderFlowError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}

impl From<AccountApiError> for OrderFlowError {
    fn from(e: AccountApiError) -> Self {
        match e {
            AccountApiError::UserNotFound(id) => Self::UserNotFound(id),
            AccountApiError::DatabaseError(msg) => Self::DatabaseError(msg),
        }
    }
}

impl From<LedgerError> for OrderFlowError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientFunds { needed, available } => Self::InsufficientFunds { needed, available },
            LedgerError::UserNotFound(id) => Self::UserNotFound(id),
            LedgerError::NonPositiveAmount(amount) => Self::Invalid(format!("Non-positive ledger amount: {amount}")),
            LedgerError::DatabaseError(msg) => Self::DatabaseError(msg),
        }
    }
}

/// The order state machine surface. Each method is one atomic transition: status changes,
/// counter adjustments and ledger entries of a single call either all commit or none do.
///
/// Time-dependent operations take `now` explicitly so that the same implementation can be driven
/// with a real or a test clock.
#[allow(async_fn_in_trait)]
pub trait MarketplaceDatabase: Clone + AccountManagement {
    /// The URL of the database.
    fn url(&self) -> &str;

    /// The business parameters this store was constructed with.
    fn config(&self) -> &MarketConfig;

    /// Creates a new active order with a fresh random id.
    ///
    /// Fails with `Conflict` if any active order already carries the same contact value.
    /// Increments the client's active-order counter.
    async fn create_order(&self, order: NewOrder) -> Result<Order, OrderFlowError>;

    /// Applies a partial patch to an order owned by `client_id`.
    ///
    /// Fails with `OrderNotFound` when the order is absent *or* owned by someone else, with
    /// `Forbidden` once any executor has taken it, and with `Gone` when the order has left the
    /// active state or passed its expiry deadline.
    async fn update_order(
        &self,
        order_id: &OrderId,
        client_id: i64,
        patch: UpdateOrderRequest,
        now: DateTime<Utc>,
    ) -> Result<Order, OrderFlowError>;

    /// Soft-deletes an order owned by `client_id`. Same preconditions as [`Self::update_order`];
    /// decrements the client's active-order counter.
    async fn delete_order(&self, order_id: &OrderId, client_id: i64, now: DateTime<Utc>) -> Result<(), OrderFlowError>;

    /// An executor claims a slot on the order, paying the configured take cost.
    ///
    /// The debit, the take row and the counter bump commit together. Retrying a take the
    /// executor already holds is free and returns the same contact. When the order turns out to
    /// be past its deadline, the expiry is committed as a side effect before `Gone` is returned.
    async fn take_order(
        &self,
        order_id: &OrderId,
        executor_id: i64,
        now: DateTime<Utc>,
    ) -> Result<TakeOutcome, OrderFlowError>;

    /// The client confirms they engaged an executor. One-shot: fails with `Conflict` when no
    /// takes exist yet or when already responded.
    async fn respond_to_order(
        &self,
        order_id: &OrderId,
        client_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Order, OrderFlowError>;

    /// The client abandons a taken order without completion. Requires at least one take;
    /// decrements the client's and every taker's active counters. Does **not** refund takers.
    async fn close_order(&self, order_id: &OrderId, client_id: i64) -> Result<Order, OrderFlowError>;

    /// The client marks a taken order as done. Bumps completed counters for the client and every
    /// taker.
    async fn complete_order(&self, order_id: &OrderId, client_id: i64) -> Result<Order, OrderFlowError>;

    /// One pass of the expiry sweep over every active order.
    ///
    /// Each order is transitioned in its own transaction; a failure on one order is counted and
    /// the pass continues. Orders past their lifetime expire without ledger activity; taken
    /// orders whose client never responded within the no-response window are closed and every
    /// taker is refunded the take cost.
    async fn sweep_expired_orders(&self, now: DateTime<Utc>) -> Result<SweepResult, OrderFlowError>;
}
