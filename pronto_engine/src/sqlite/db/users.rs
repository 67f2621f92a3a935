use chrono::{DateTime, Utc};
use log::trace;
use serde_json::json;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Category, NewUser, UserAccount},
    traits::{AccountApiError, NotificationPrefs},
};

pub async fn fetch_user(user_id: i64, conn: &mut SqliteConnection) -> Result<Option<UserAccount>, AccountApiError> {
    let user = sqlx::query_as("SELECT * FROM users WHERE id = $1").bind(user_id).fetch_optional(conn).await?;
    Ok(user)
}

/// Fetches the account for the given identity, creating the row on first contact. The username
/// is refreshed from the identity layer on every call, since it can change upstream.
pub async fn fetch_or_create_user(user: &NewUser, conn: &mut SqliteConnection) -> Result<UserAccount, AccountApiError> {
    let account: UserAccount = sqlx::query_as(
        r#"
        INSERT INTO users (id, username) VALUES ($1, $2)
        ON CONFLICT (id) DO UPDATE SET
            username = COALESCE(excluded.username, users.username),
            updated_at = CURRENT_TIMESTAMP
        RETURNING *;
        "#,
    )
    .bind(user.id)
    .bind(user.username.as_deref())
    .fetch_one(conn)
    .await?;
    trace!("🧑️ Upserted user account #{}", account.id);
    Ok(account)
}

/// Adjusts the order counters for a user. The active counter is floored at zero so that a
/// replayed decrement cannot drive it negative.
pub async fn adjust_order_counters(
    user_id: i64,
    active_delta: i64,
    completed_delta: i64,
    conn: &mut SqliteConnection,
) -> Result<(), AccountApiError> {
    let _ = sqlx::query(
        r#"UPDATE users SET
        active_orders_count = MAX(0, active_orders_count + $1),
        completed_orders_count = MAX(0, completed_orders_count + $2),
        updated_at = CURRENT_TIMESTAMP
        WHERE id = $3
        "#,
    )
    .bind(active_delta)
    .bind(completed_delta)
    .bind(user_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn update_notification_prefs(
    user_id: i64,
    prefs: &NotificationPrefs,
    conn: &mut SqliteConnection,
) -> Result<Option<UserAccount>, AccountApiError> {
    let account = sqlx::query_as(
        r#"UPDATE users SET
        notifications_enabled = $1,
        subscribed_categories = $2,
        subscribed_cities = $3,
        notification_frequency_minutes = $4,
        updated_at = CURRENT_TIMESTAMP
        WHERE id = $5
        RETURNING *;
        "#,
    )
    .bind(prefs.notifications_enabled)
    .bind(json!(prefs.subscribed_categories).to_string())
    .bind(json!(prefs.subscribed_cities).to_string())
    .bind(prefs.notification_frequency_minutes)
    .bind(user_id)
    .fetch_optional(conn)
    .await?;
    Ok(account)
}

/// Finds executors subscribed to both the category and the city, with notifications switched
/// on. The client posting the order is excluded; cooldown filtering happens at the caller.
pub async fn subscribed_executors(
    category: Category,
    city: &str,
    exclude_user: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<UserAccount>, AccountApiError> {
    let executors = sqlx::query_as(
        r#"
        SELECT * FROM users
        WHERE notifications_enabled = 1
          AND id != $1
          AND EXISTS (SELECT 1 FROM json_each(users.subscribed_categories) WHERE json_each.value = $2)
          AND EXISTS (SELECT 1 FROM json_each(users.subscribed_cities) WHERE json_each.value = $3)
        "#,
    )
    .bind(exclude_user)
    .bind(category.to_string())
    .bind(city)
    .fetch_all(conn)
    .await?;
    Ok(executors)
}

pub async fn set_last_notified(
    user_id: i64,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), AccountApiError> {
    let _ = sqlx::query("UPDATE users SET last_notified_at = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2")
        .bind(at)
        .bind(user_id)
        .execute(conn)
        .await?;
    Ok(())
}
