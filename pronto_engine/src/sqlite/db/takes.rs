use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::db_types::{ExecutorTake, OrderId};

/// All takes for an order, oldest first. The first element is the take that starts the
/// no-response clock.
pub async fn takes_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<ExecutorTake>, sqlx::Error> {
    let takes = sqlx::query_as("SELECT * FROM executor_takes WHERE order_id = $1 ORDER BY taken_at ASC, id ASC")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(takes)
}

/// Takes for a whole page of orders in one round trip, for list views.
pub async fn takes_for_orders(
    order_ids: &[OrderId],
    conn: &mut SqliteConnection,
) -> Result<Vec<ExecutorTake>, sqlx::Error> {
    if order_ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut builder = QueryBuilder::new("SELECT * FROM executor_takes WHERE order_id IN (");
    let mut ids = builder.separated(", ");
    for id in order_ids {
        ids.push_bind(id.as_str().to_string());
    }
    builder.push(") ORDER BY taken_at ASC, id ASC");
    let takes = builder.build_query_as::<ExecutorTake>().fetch_all(conn).await?;
    Ok(takes)
}

pub async fn insert_take(
    order_id: &OrderId,
    executor_id: i64,
    taken_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<ExecutorTake, sqlx::Error> {
    let take = sqlx::query_as(
        "INSERT INTO executor_takes (order_id, executor_id, taken_at) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(order_id.as_str())
    .bind(executor_id)
    .bind(taken_at)
    .fetch_one(conn)
    .await?;
    Ok(take)
}
