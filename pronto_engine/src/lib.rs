//! Pronto Engine
//!
//! The Pronto Engine is the core of the urgent-services marketplace: clients post short-lived
//! orders, executors pay a small fee to unlock the order's contact details, and a periodic sweep
//! enforces the time-based transitions of the order lifecycle.
//!
//! The library is divided into three main sections:
//! 1. Database management and control ([`mod@sqlite`]). SQLite is the supported backend. You
//!    should never need to access the database directly. Instead, use the public APIs provided by
//!    the engine. The exception is the data types used in the database, which are defined in the
//!    [`mod@db_types`] module and are public.
//! 2. The engine public API ([`OrderFlowApi`], [`AccountApi`], [`PaymentsApi`]). These provide
//!    the public-facing functionality of the engine: order lifecycle transitions, account and
//!    balance queries, and invoice crediting. Backends implement the traits in [`mod@traits`] in
//!    order to act as a store for the Pronto server.
//! 3. A small set of events that can be subscribed to ([`mod@events`]). When a new order is
//!    created, an [`events::OrderCreatedEvent`] is emitted so that, for example, a notification
//!    dispatcher can fan the order out to subscribed executors without coupling to the engine.
pub mod config;
pub mod db_types;
pub mod events;
mod market_api;
pub mod order_objects;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use config::MarketConfig;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use market_api::{accounts_api::AccountApi, order_flow_api::OrderFlowApi, payments_api::PaymentsApi};
