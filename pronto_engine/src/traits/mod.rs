//! # Store interface contracts
//!
//! This module defines the behaviour a database backend must expose in order to act as the store
//! for the Pronto marketplace.
//!
//! * [`MarketplaceDatabase`] is the order state machine surface: every lifecycle transition
//!   (create, take, respond, close, complete, the sweep) is one atomic operation here.
//! * [`AccountManagement`] provides queries for users, orders, takes and the balance history.
//! * [`PaymentsDatabase`] covers invoice persistence and the idempotent webhook credit path.
//!
//! All three use native `async fn` in traits; the engine only ever consumes them from concrete
//! backend types, so the auto-trait caveats of `async_fn_in_trait` do not bite.
mod account_management;
mod ledger;
mod marketplace_database;
mod payments_database;

pub use account_management::{AccountApiError, AccountManagement, NotificationPrefs};
pub use ledger::LedgerError;
pub use marketplace_database::{MarketplaceDatabase, OrderFlowError};
pub use payments_database::{PaymentsApiError, PaymentsDatabase};
