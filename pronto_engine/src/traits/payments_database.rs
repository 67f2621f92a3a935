use chrono::{DateTime, Utc};
use pronto_common::Rubles;
use thiserror::Error;

use crate::{
    db_types::PaymentInvoice,
    order_objects::{NewInvoice, PaidInvoice},
    traits::ledger::LedgerError,
};

#[derive(Debug, Clone, Error)]
pub enum PaymentsApiError {
    #[error("Amount must be positive, got {0}")]
    InvalidAmount(Rubles),
    #[error("User account {0} does not exist")]
    UserNotFound(i64),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for PaymentsApiError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}

impl From<LedgerError> for PaymentsApiError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NonPositiveAmount(amount) => Self::InvalidAmount(amount),
            LedgerError::UserNotFound(id) => Self::UserNotFound(id),
            // Credits never bounce on balance; a refused debit here is a bug upstream.
            LedgerError::InsufficientFunds { .. } => Self::DatabaseError(e.to_string()),
            LedgerError::DatabaseError(msg) => Self::DatabaseError(msg),
        }
    }
}

/// Invoice persistence and the idempotent crediting path driven by provider webhooks.
#[allow(async_fn_in_trait)]
pub trait PaymentsDatabase: Clone {
    /// Persists an invoice minted at the external provider, in pending state.
    async fn create_pending_invoice(
        &self,
        user_id: i64,
        invoice: NewInvoice,
    ) -> Result<PaymentInvoice, PaymentsApiError>;

    /// Credits the owner of the invoice with the invoice amount, exactly once.
    ///
    /// Returns `Ok(None)` without side effects when the invoice is unknown (webhook replay for a
    /// row we never created) or already paid. Neither case is an error: the provider must see
    /// success, or its retries would look like new payments.
    async fn process_paid_invoice(
        &self,
        external_invoice_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PaidInvoice>, PaymentsApiError>;

    /// Fetches an invoice scoped to its owner, for status polling.
    async fn invoice_for_user(&self, invoice_id: i64, user_id: i64)
        -> Result<Option<PaymentInvoice>, PaymentsApiError>;

    /// Directly credits a balance outside the invoice flow. Returns the new balance and the
    /// transaction id.
    async fn recharge(&self, user_id: i64, amount: Rubles, method: &str) -> Result<(Rubles, i64), PaymentsApiError>;
}
