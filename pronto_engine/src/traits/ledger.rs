use pronto_common::Rubles;
use thiserror::Error;

/// Errors raised by the balance-ledger primitives.
///
/// Every balance mutation in the system funnels through the ledger's credit/debit pair, so this
/// is where the insufficient-funds rule lives. Callers fold these into their own error types.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("User account {0} does not exist")]
    UserNotFound(i64),
    #[error("Insufficient balance: need {needed}, have {available}")]
    InsufficientFunds { needed: Rubles, available: Rubles },
    #[error("Ledger amounts must be positive, got {0}")]
    NonPositiveAmount(Rubles),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}
