//! The engine's public API surface: thin wrappers over a store backend that stamp the wall
//! clock onto time-dependent operations and publish lifecycle events.
pub mod accounts_api;
pub mod order_flow_api;
pub mod payments_api;
