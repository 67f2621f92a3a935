//! Request and response bodies for the HTTP API.
//!
//! Validation of free-text fields happens here, before anything reaches the engine: bounds are
//! the ones the mobile client enforces too, so a violation is always a misbehaving caller.
use chrono::{DateTime, Utc};
use pronto_common::Rubles;
use pronto_engine::{
    db_types::{Category, ExecutorTake, Order, OrderStatus},
    order_objects::UpdateOrderRequest,
};
use serde::{Deserialize, Serialize};

use crate::errors::ServerError;

const DESCRIPTION_MIN: usize = 20;
const DESCRIPTION_MAX: usize = 1000;
const CONTACT_MIN: usize = 3;
const CONTACT_MAX: usize = 100;
const CITY_MIN: usize = 2;
const CITY_MAX: usize = 100;

fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<(), ServerError> {
    let n = value.chars().count();
    if n < min || n > max {
        return Err(ServerError::InvalidRequest(format!("{field} must be between {min} and {max} characters")));
    }
    Ok(())
}

fn parse_category(value: &str) -> Result<Category, ServerError> {
    value.parse::<Category>().map_err(|e| ServerError::InvalidRequest(e.to_string()))
}

//--------------------------------------  CreateOrderRequest  --------------------------------------------------------
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub category: String,
    pub description: String,
    pub city: String,
    /// Phone number or messenger @username.
    pub contact: String,
}

impl CreateOrderRequest {
    pub fn validated_category(&self) -> Result<Category, ServerError> {
        check_len("description", &self.description, DESCRIPTION_MIN, DESCRIPTION_MAX)?;
        check_len("city", &self.city, CITY_MIN, CITY_MAX)?;
        check_len("contact", &self.contact, CONTACT_MIN, CONTACT_MAX)?;
        parse_category(&self.category)
    }
}

//--------------------------------------  UpdateOrderBody     --------------------------------------------------------
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateOrderBody {
    pub category: Option<String>,
    pub description: Option<String>,
    pub contact: Option<String>,
}

impl UpdateOrderBody {
    pub fn validate(self) -> Result<UpdateOrderRequest, ServerError> {
        let category = self.category.as_deref().map(parse_category).transpose()?;
        if let Some(description) = &self.description {
            check_len("description", description, DESCRIPTION_MIN, DESCRIPTION_MAX)?;
        }
        if let Some(contact) = &self.contact {
            check_len("contact", contact, CONTACT_MIN, CONTACT_MAX)?;
        }
        Ok(UpdateOrderRequest { category, description: self.description, contact: self.contact })
    }
}

//--------------------------------------    OrderResponse     --------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
pub struct TakeInfo {
    pub executor_id: i64,
    pub taken_at: DateTime<Utc>,
}

impl From<&ExecutorTake> for TakeInfo {
    fn from(take: &ExecutorTake) -> Self {
        Self { executor_id: take.executor_id, taken_at: take.taken_at }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub category: Category,
    pub description: String,
    pub city: String,
    /// Present only for the owning client and executors holding a take.
    pub contact: Option<String>,
    pub status: OrderStatus,
    pub city_locked: bool,
    pub expires_in_minutes: i64,
    pub minutes_left: i64,
    pub customer_responded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub taken_by: Vec<TakeInfo>,
}

impl OrderResponse {
    /// Builds the external representation of an order, nulling the contact for everyone but the
    /// owner and the takers.
    pub fn with_visibility(order: Order, takes: &[ExecutorTake], viewer: Option<i64>) -> Self {
        let show_contact = viewer
            .map(|id| order.client_id == id || takes.iter().any(|t| t.executor_id == id))
            .unwrap_or(false);
        Self::build(order, takes, show_contact)
    }

    /// The owner's view of their own order.
    pub fn for_owner(order: Order, takes: &[ExecutorTake]) -> Self {
        Self::build(order, takes, true)
    }

    /// The list view: contacts are never shown, whoever asks.
    pub fn redacted(order: Order, takes: &[ExecutorTake]) -> Self {
        Self::build(order, takes, false)
    }

    fn build(order: Order, takes: &[ExecutorTake], show_contact: bool) -> Self {
        let minutes_left = order.minutes_left(Utc::now());
        Self {
            id: order.id.0.clone(),
            category: order.category,
            description: order.description,
            city: order.city,
            contact: show_contact.then_some(order.contact),
            status: order.status,
            city_locked: order.city_locked,
            expires_in_minutes: order.expires_in_minutes,
            minutes_left,
            customer_responded_at: order.customer_responded_at,
            created_at: order.created_at,
            taken_by: takes.iter().map(TakeInfo::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: i64,
}

//--------------------------------------   ListOrdersQuery    --------------------------------------------------------
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListOrdersQuery {
    pub category: Option<String>,
    pub city: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub mine: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

//--------------------------------------  TakeOrderResponse   --------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
pub struct TakeOrderResponse {
    pub success: bool,
    pub contact: String,
    pub executor_count: usize,
    pub new_balance: Rubles,
}

//--------------------------------------      Balance         --------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
pub struct BalanceResponse {
    pub balance: Rubles,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RechargeRequest {
    pub amount: i64,
    #[serde(default = "default_recharge_method")]
    pub method: String,
}

fn default_recharge_method() -> String {
    "manual".to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct RechargeResponse {
    pub success: bool,
    pub new_balance: Rubles,
    pub transaction_id: i64,
}

//--------------------------------------      Invoices        --------------------------------------------------------
#[derive(Debug, Clone, Deserialize)]
pub struct CreateInvoiceRequest {
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateInvoiceResponse {
    pub payment_id: i64,
    pub pay_url: String,
    pub mini_app_invoice_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentStatusResponse {
    pub payment_id: i64,
    pub status: String,
    pub amount: Rubles,
    /// Present once the invoice is paid.
    pub new_balance: Option<Rubles>,
}

//--------------------------------------        Auth          --------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
}

//--------------------------------------       Webhook        --------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub ok: bool,
}
