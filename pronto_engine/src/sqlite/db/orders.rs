use log::trace;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    db_types::{NewOrder, Order, OrderId, OrderStatus},
    order_objects::{OrderQueryFilter, UpdateOrderRequest},
    traits::OrderFlowError,
};

/// Inserts a new order into the database using the given connection. This is not atomic on its
/// own; embed the call inside a transaction and pass `&mut *tx` when the insert must commit
/// together with counter updates.
pub async fn insert_order(
    order: &NewOrder,
    order_id: &OrderId,
    expires_in_minutes: i64,
    conn: &mut SqliteConnection,
) -> Result<Order, OrderFlowError> {
    let order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                id,
                client_id,
                category,
                description,
                city,
                contact,
                status,
                city_locked,
                expires_in_minutes,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, 'active', 1, $7, $8)
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .bind(order.client_id)
    .bind(order.category)
    .bind(&order.description)
    .bind(&order.city)
    .bind(&order.contact)
    .bind(expires_in_minutes)
    .bind(order.created_at)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

pub async fn fetch_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

/// Fetches an order only when it is owned by the given client. Absence and foreign ownership are
/// indistinguishable to the caller.
pub async fn fetch_order_for_client(
    order_id: &OrderId,
    client_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1 AND client_id = $2")
        .bind(order_id.as_str())
        .bind(client_id)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// Whether any active order already carries this contact value (one active order per contact,
/// system-wide).
pub async fn active_contact_exists(contact: &str, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM orders WHERE contact = $1 AND status = 'active' LIMIT 1")
        .bind(contact)
        .fetch_optional(conn)
        .await?;
    Ok(row.is_some())
}

pub async fn active_order_ids(conn: &mut SqliteConnection) -> Result<Vec<OrderId>, sqlx::Error> {
    let ids: Vec<(OrderId,)> =
        sqlx::query_as("SELECT id FROM orders WHERE status = 'active' ORDER BY created_at ASC").fetch_all(conn).await?;
    Ok(ids.into_iter().map(|r| r.0).collect())
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, query: &OrderQueryFilter) {
    if query.is_empty() {
        return;
    }
    builder.push(" WHERE ");
    let mut where_clause = builder.separated(" AND ");
    if let Some(category) = query.category {
        where_clause.push("category = ");
        where_clause.push_bind_unseparated(category.to_string());
    }
    if let Some(city) = &query.city {
        where_clause.push("city = ");
        where_clause.push_bind_unseparated(city.clone());
    }
    if let Some(client_id) = query.client_id {
        where_clause.push("client_id = ");
        where_clause.push_bind_unseparated(client_id);
    }
    if let Some(statuses) = query.status.as_ref().filter(|s| !s.is_empty()) {
        let status_clause = statuses.iter().map(|s| format!("'{s}'")).collect::<Vec<_>>().join(",");
        where_clause.push(format!("status IN ({status_clause})"));
    }
}

/// Fetches orders according to the criteria in the [`OrderQueryFilter`], newest first.
pub async fn search_orders(query: &OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders");
    push_filters(&mut builder, query);
    builder.push(" ORDER BY created_at DESC");
    if let Some(limit) = query.limit {
        builder.push(" LIMIT ");
        builder.push_bind(limit);
    }
    if let Some(offset) = query.offset {
        builder.push(" OFFSET ");
        builder.push_bind(offset);
    }
    trace!("📝️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    Ok(orders)
}

/// Counts the orders matching the filter, ignoring pagination.
pub async fn count_orders(query: &OrderQueryFilter, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM orders");
    push_filters(&mut builder, query);
    let row: (i64,) = builder.build_query_as().fetch_one(conn).await?;
    Ok(row.0)
}

pub(crate) async fn update_order_status(
    order_id: &OrderId,
    status: OrderStatus,
    conn: &mut SqliteConnection,
) -> Result<Order, OrderFlowError> {
    let result: Option<Order> =
        sqlx::query_as("UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *")
            .bind(status)
            .bind(order_id.as_str())
            .fetch_optional(conn)
            .await?;
    result.ok_or(OrderFlowError::OrderNotFound)
}

pub(crate) async fn set_customer_responded(
    order_id: &OrderId,
    at: chrono::DateTime<chrono::Utc>,
    conn: &mut SqliteConnection,
) -> Result<Order, OrderFlowError> {
    let result: Option<Order> = sqlx::query_as(
        "UPDATE orders SET customer_responded_at = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *",
    )
    .bind(at)
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    result.ok_or(OrderFlowError::OrderNotFound)
}

/// Applies a partial patch to an order. Returns `None` when the order vanished underneath us.
pub(crate) async fn apply_patch(
    order_id: &OrderId,
    patch: &UpdateOrderRequest,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, OrderFlowError> {
    let mut builder = QueryBuilder::new("UPDATE orders SET updated_at = CURRENT_TIMESTAMP, ");
    let mut set_clause = builder.separated(", ");
    if let Some(category) = patch.category {
        set_clause.push("category = ");
        set_clause.push_bind_unseparated(category.to_string());
    }
    if let Some(description) = &patch.description {
        set_clause.push("description = ");
        set_clause.push_bind_unseparated(description.clone());
    }
    if let Some(contact) = &patch.contact {
        set_clause.push("contact = ");
        set_clause.push_bind_unseparated(contact.clone());
    }
    builder.push(" WHERE id = ");
    builder.push_bind(order_id.as_str().to_string());
    builder.push(" RETURNING *");
    trace!("📝️ Executing query: {}", builder.sql());
    let order = builder.build_query_as::<Order>().fetch_optional(conn).await?;
    Ok(order)
}
