//! The balance ledger: an append-only transaction log plus a current-balance integer per user.
//!
//! Both functions mutate the balance *and* append the audit row on the connection they are
//! handed, so a caller composing them inside a transaction gets all-or-nothing semantics: a
//! balance change without its transaction record is never observable. The balance check in
//! [`debit`] happens on the same connection, inside the caller's transaction, which is what
//! keeps two concurrent debits from both seeing a stale sufficient balance.
use log::debug;
use pronto_common::Rubles;
use sqlx::SqliteConnection;

use crate::{
    db_types::{OrderId, TransactionType},
    traits::LedgerError,
};

/// Adds `amount` to the user's balance and appends the matching transaction row.
///
/// Returns the new balance and the id of the transaction record. Used for recharges (with an
/// external reference) and for refunds (with an order reference).
pub async fn credit(
    conn: &mut SqliteConnection,
    user_id: i64,
    amount: Rubles,
    txn_type: TransactionType,
    description: &str,
    order_id: Option<&OrderId>,
    external_ref: Option<&str>,
) -> Result<(Rubles, i64), LedgerError> {
    if !amount.is_positive() {
        return Err(LedgerError::NonPositiveAmount(amount));
    }
    let balance = current_balance(user_id, &mut *conn).await?;
    let new_balance = balance + amount;
    set_balance(user_id, new_balance, &mut *conn).await?;
    let txn_id =
        append_transaction(user_id, txn_type, amount, new_balance, order_id, external_ref, description, conn).await?;
    debug!("💰️ Credited {amount} ({txn_type}) to user #{user_id}; balance is now {new_balance}");
    Ok((new_balance, txn_id))
}

/// Subtracts `amount` from the user's balance and appends the matching (negative) transaction
/// row. Fails with `InsufficientFunds` when the balance, read inside the caller's transaction,
/// does not cover the amount. Balances never go below zero.
pub async fn debit(
    conn: &mut SqliteConnection,
    user_id: i64,
    amount: Rubles,
    txn_type: TransactionType,
    order_id: &OrderId,
    description: &str,
) -> Result<Rubles, LedgerError> {
    if !amount.is_positive() {
        return Err(LedgerError::NonPositiveAmount(amount));
    }
    let balance = current_balance(user_id, &mut *conn).await?;
    if balance < amount {
        return Err(LedgerError::InsufficientFunds { needed: amount, available: balance });
    }
    let new_balance = balance - amount;
    set_balance(user_id, new_balance, &mut *conn).await?;
    append_transaction(user_id, txn_type, -amount, new_balance, Some(order_id), None, description, conn).await?;
    debug!("💰️ Debited {amount} ({txn_type}) from user #{user_id}; balance is now {new_balance}");
    Ok(new_balance)
}

async fn current_balance(user_id: i64, conn: &mut SqliteConnection) -> Result<Rubles, LedgerError> {
    let row: Option<(Rubles,)> =
        sqlx::query_as("SELECT balance FROM users WHERE id = $1").bind(user_id).fetch_optional(conn).await?;
    row.map(|r| r.0).ok_or(LedgerError::UserNotFound(user_id))
}

async fn set_balance(user_id: i64, balance: Rubles, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    let _ = sqlx::query("UPDATE users SET balance = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2")
        .bind(balance)
        .bind(user_id)
        .execute(conn)
        .await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn append_transaction(
    user_id: i64,
    txn_type: TransactionType,
    amount: Rubles,
    balance_after: Rubles,
    order_id: Option<&OrderId>,
    external_ref: Option<&str>,
    description: &str,
    conn: &mut SqliteConnection,
) -> Result<i64, LedgerError> {
    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO balance_transactions (user_id, type, amount, balance_after, order_id, external_transaction_id, description)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id;
        "#,
    )
    .bind(user_id)
    .bind(txn_type)
    .bind(amount)
    .bind(balance_after)
    .bind(order_id.map(|o| o.as_str().to_string()))
    .bind(external_ref)
    .bind(description)
    .fetch_one(conn)
    .await?;
    Ok(row.0)
}

pub async fn transactions_for_user(
    user_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<crate::db_types::BalanceTransaction>, sqlx::Error> {
    let txns = sqlx::query_as("SELECT * FROM balance_transactions WHERE user_id = $1 ORDER BY created_at DESC, id DESC")
        .bind(user_id)
        .fetch_all(conn)
        .await?;
    Ok(txns)
}
