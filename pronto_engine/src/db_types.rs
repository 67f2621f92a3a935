use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use pronto_common::Rubles;
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ConversionError(String);

//--------------------------------------       OrderId       ---------------------------------------------------------
/// Opaque order identifier. Orders are addressed directly by id in URLs, so ids are random
/// alphanumerics rather than sequential integers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

const ORDER_ID_LEN: usize = 12;

impl OrderId {
    /// Generates a fresh random order id.
    pub fn random() -> Self {
        let id: String = rand::thread_rng().sample_iter(&Alphanumeric).take(ORDER_ID_LEN).map(char::from).collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//--------------------------------------       Category       --------------------------------------------------------
/// The closed set of service categories. Executors subscribe to these, and the set doubles as
/// input validation: anything that does not parse is rejected at the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Plumbing,
    Electrical,
    HomeRepair,
    Cleaning,
    Assembly,
    Appliances,
    Other,
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Category::Plumbing => "plumbing",
            Category::Electrical => "electrical",
            Category::HomeRepair => "home_repair",
            Category::Cleaning => "cleaning",
            Category::Assembly => "assembly",
            Category::Appliances => "appliances",
            Category::Other => "other",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Category {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plumbing" => Ok(Self::Plumbing),
            "electrical" => Ok(Self::Electrical),
            "home_repair" => Ok(Self::HomeRepair),
            "cleaning" => Ok(Self::Cleaning),
            "assembly" => Ok(Self::Assembly),
            "appliances" => Ok(Self::Appliances),
            "other" => Ok(Self::Other),
            s => Err(ConversionError(format!("Invalid category: {s}"))),
        }
    }
}

//--------------------------------------      OrderStatus      -------------------------------------------------------
/// The order lifecycle. `Active` is the only live state; the other four are terminal and no
/// transition ever leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// The order is open and can be taken by executors.
    Active,
    /// The order outlived its lifetime without being completed.
    Expired,
    /// The client removed the order before anyone took it.
    Deleted,
    /// Closed because the client never responded after a take (or closed manually).
    ClosedNoResponse,
    /// The client marked the order as done.
    Completed,
}

/// Statuses a public (non-owner) listing may ever return.
pub const PUBLICLY_LISTABLE: [OrderStatus; 3] = [OrderStatus::Active, OrderStatus::Expired, OrderStatus::Completed];

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        *self != OrderStatus::Active
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Active => "active",
            OrderStatus::Expired => "expired",
            OrderStatus::Deleted => "deleted",
            OrderStatus::ClosedNoResponse => "closed_no_response",
            OrderStatus::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "expired" => Ok(Self::Expired),
            "deleted" => Ok(Self::Deleted),
            "closed_no_response" => Ok(Self::ClosedNoResponse),
            "completed" => Ok(Self::Completed),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------        Order        ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub client_id: i64,
    pub category: Category,
    pub description: String,
    pub city: String,
    pub contact: String,
    pub status: OrderStatus,
    /// Always true once created. Executors filter by city, so the city cannot be disputed after
    /// the fact.
    pub city_locked: bool,
    pub expires_in_minutes: i64,
    pub customer_responded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + Duration::minutes(self.expires_in_minutes)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    pub fn minutes_left(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at() - now).num_minutes().max(0)
    }
}

//--------------------------------------       NewOrder       --------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub client_id: i64,
    pub category: Category,
    pub description: String,
    pub city: String,
    pub contact: String,
    /// The creation instant. Settable so that tests can post-date orders.
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    pub fn new(client_id: i64, category: Category, description: &str, city: &str, contact: &str) -> Self {
        Self {
            client_id,
            category,
            description: description.to_string(),
            city: city.to_string(),
            contact: contact.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

//--------------------------------------     ExecutorTake     --------------------------------------------------------
/// One executor's paid claim on one order. Unique per (order, executor); never updated.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExecutorTake {
    pub id: i64,
    pub order_id: OrderId,
    pub executor_id: i64,
    pub taken_at: DateTime<Utc>,
}

//--------------------------------------   TransactionType    --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Balance top-up, either direct or via a paid external invoice.
    Recharge,
    /// The fee debited when an executor takes an order.
    OrderTake,
    /// Reversal of a take fee (no-response auto-close only).
    Refund,
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransactionType::Recharge => "recharge",
            TransactionType::OrderTake => "order_take",
            TransactionType::Refund => "refund",
        };
        write!(f, "{s}")
    }
}

impl FromStr for TransactionType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recharge" => Ok(Self::Recharge),
            "order_take" => Ok(Self::OrderTake),
            "refund" => Ok(Self::Refund),
            s => Err(ConversionError(format!("Invalid transaction type: {s}"))),
        }
    }
}

//-------------------------------------- BalanceTransaction   --------------------------------------------------------
/// Append-only audit row. The current balance of any user must always equal the sum of their
/// transaction amounts; `balance_after` is a snapshot for cheap history display.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BalanceTransaction {
    pub id: i64,
    pub user_id: i64,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub txn_type: TransactionType,
    pub amount: Rubles,
    pub balance_after: Rubles,
    pub order_id: Option<OrderId>,
    pub external_transaction_id: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------    InvoiceStatus     --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Expired,
}

impl Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

//--------------------------------------    PaymentInvoice    --------------------------------------------------------
/// A pending external payment request, tracked until the provider confirms it paid. Transitions
/// to `paid` exactly once; replayed webhooks are no-ops.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PaymentInvoice {
    pub id: i64,
    pub user_id: i64,
    pub external_invoice_id: String,
    pub amount: Rubles,
    pub status: InvoiceStatus,
    pub pay_url: Option<String>,
    pub mini_app_invoice_url: Option<String>,
    pub balance_transaction_id: Option<i64>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------     UserAccount      --------------------------------------------------------
/// A marketplace participant. The same account posts orders as a client and takes orders as an
/// executor; the balance only matters for the executor role.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: i64,
    pub username: Option<String>,
    pub balance: Rubles,
    pub active_orders_count: i64,
    pub completed_orders_count: i64,
    pub average_rating: f64,
    pub notifications_enabled: bool,
    pub subscribed_categories: Json<Vec<Category>>,
    pub subscribed_cities: Json<Vec<String>>,
    pub notification_frequency_minutes: i64,
    pub last_notified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------        NewUser       --------------------------------------------------------
/// Identity as handed over by the authentication layer. The account row is created the first
/// time an authenticated id is seen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub id: i64,
    pub username: Option<String>,
}

impl NewUser {
    pub fn new(id: i64) -> Self {
        Self { id, username: None }
    }

    pub fn with_username(mut self, username: &str) -> Self {
        self.username = Some(username.to_string());
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn order_ids_are_random_and_fixed_length() {
        let a = OrderId::random();
        let b = OrderId::random();
        assert_eq!(a.as_str().len(), 12);
        assert_eq!(b.as_str().len(), 12);
        assert_ne!(a, b);
        assert!(a.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn status_round_trips() {
        for s in [
            OrderStatus::Active,
            OrderStatus::Expired,
            OrderStatus::Deleted,
            OrderStatus::ClosedNoResponse,
            OrderStatus::Completed,
        ] {
            assert_eq!(s.to_string().parse::<OrderStatus>().unwrap(), s);
        }
        assert!("paid".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(!OrderStatus::Active.is_terminal());
        assert!(OrderStatus::Expired.is_terminal());
        assert!(OrderStatus::Deleted.is_terminal());
        assert!(OrderStatus::ClosedNoResponse.is_terminal());
        assert!(OrderStatus::Completed.is_terminal());
    }

    #[test]
    fn category_rejects_unknown_values() {
        assert!("plumbing".parse::<Category>().is_ok());
        assert!("time_travel".parse::<Category>().is_err());
    }
}
