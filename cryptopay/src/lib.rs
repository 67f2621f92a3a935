//! Client for the Crypto Pay invoice API.
//!
//! The Pronto server uses this crate in two places: minting fiat invoices when a user tops up
//! their balance, and verifying the HMAC signature on inbound `invoice_paid` webhooks. The
//! provider is treated as a remote black box; everything stateful (the invoice rows, the
//! idempotent crediting) lives in the engine.
mod api;
mod config;
mod data_objects;
mod error;

pub use api::CryptoPayApi;
pub use config::CryptoPayConfig;
pub use data_objects::{NewInvoiceParams, RemoteInvoice, WebhookInvoicePayload, WebhookUpdate, INVOICE_PAID};
pub use error::CryptoPayError;
