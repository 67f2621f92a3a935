use serde::{Deserialize, Serialize};

/// The `update_type` value of a webhook delivery that confirms a paid invoice.
pub const INVOICE_PAID: &str = "invoice_paid";

/// Request body for the provider's `createInvoice` call. Amounts are fiat rubles, serialised as
/// a string per the provider API.
#[derive(Debug, Clone, Serialize)]
pub struct NewInvoiceParams {
    pub currency_type: String,
    pub fiat: String,
    pub amount: String,
    pub description: String,
    pub expires_in: u32,
}

impl NewInvoiceParams {
    pub fn fiat_rub(amount: i64, description: &str, expires_in: u32) -> Self {
        Self {
            currency_type: "fiat".to_string(),
            fiat: pronto_common::RUB_CURRENCY_CODE.to_string(),
            amount: amount.to_string(),
            description: description.to_string(),
            expires_in,
        }
    }
}

/// An invoice as the provider reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteInvoice {
    pub invoice_id: i64,
    pub status: String,
    #[serde(default)]
    pub bot_invoice_url: Option<String>,
    #[serde(default)]
    pub mini_app_invoice_url: Option<String>,
}

/// Envelope of every provider API response.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub(crate) struct ApiResponse<T> {
    pub ok: bool,
    #[serde(default)]
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

/// An inbound webhook delivery. Unknown `update_type` values are ignored by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookUpdate {
    pub update_type: String,
    #[serde(default)]
    pub payload: Option<WebhookInvoicePayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookInvoicePayload {
    pub invoice_id: i64,
    #[serde(default)]
    pub status: Option<String>,
}
