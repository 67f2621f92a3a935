//! Value objects exchanged between the engine APIs and their callers.

use pronto_common::Rubles;
use serde::{Deserialize, Serialize};

use crate::db_types::{Category, Order, OrderStatus, PaymentInvoice};

//--------------------------------------   OrderQueryFilter   --------------------------------------------------------
/// Search criteria for order listings. An empty filter matches everything; the store clamps the
/// status set for callers that do not filter by owner.
#[derive(Debug, Clone, Default)]
pub struct OrderQueryFilter {
    pub category: Option<Category>,
    pub city: Option<String>,
    pub status: Option<Vec<OrderStatus>>,
    pub client_id: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl OrderQueryFilter {
    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_city(mut self, city: &str) -> Self {
        self.city = Some(city.to_string());
        self
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn with_client_id(mut self, client_id: i64) -> Self {
        self.client_id = Some(client_id);
        self
    }

    pub fn with_pagination(mut self, limit: i64, offset: i64) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.city.is_none() && self.status.is_none() && self.client_id.is_none()
    }
}

//-------------------------------------- UpdateOrderRequest   --------------------------------------------------------
/// Partial patch for an order. Only supplied fields change; the city is locked at creation and
/// deliberately absent here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateOrderRequest {
    pub category: Option<Category>,
    pub description: Option<String>,
    pub contact: Option<String>,
}

impl UpdateOrderRequest {
    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.description.is_none() && self.contact.is_none()
    }
}

//--------------------------------------     TakeOutcome      --------------------------------------------------------
/// Result of a successful (or idempotently repeated) take.
#[derive(Debug, Clone, Serialize)]
pub struct TakeOutcome {
    /// The unlocked contact string.
    pub contact: String,
    /// Number of takes on the order after this call.
    pub take_count: usize,
    /// The executor's balance after this call.
    pub new_balance: Rubles,
    /// False when the executor already held a take and nothing was debited.
    pub charged: bool,
}

//--------------------------------------     SweepResult      --------------------------------------------------------
/// What one pass of the expiry sweep did.
#[derive(Debug, Clone, Default)]
pub struct SweepResult {
    pub expired: Vec<Order>,
    pub closed_no_response: Vec<Order>,
    /// Orders whose transition failed this pass; they stay active and are retried next tick.
    pub failures: usize,
}

impl SweepResult {
    pub fn expired_count(&self) -> usize {
        self.expired.len()
    }

    pub fn closed_count(&self) -> usize {
        self.closed_no_response.len()
    }

    pub fn total_count(&self) -> usize {
        self.expired.len() + self.closed_no_response.len()
    }
}

//--------------------------------------      NewInvoice      --------------------------------------------------------
/// A freshly minted invoice at the external provider, ready to be persisted in pending state.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub external_invoice_id: String,
    pub amount: Rubles,
    pub pay_url: Option<String>,
    pub mini_app_invoice_url: Option<String>,
}

//--------------------------------------      PaidInvoice     --------------------------------------------------------
/// Outcome of crediting a paid invoice to its owner's balance.
#[derive(Debug, Clone)]
pub struct PaidInvoice {
    pub invoice: PaymentInvoice,
    pub new_balance: Rubles,
    pub transaction_id: i64,
}
