use chrono::Duration;
use pronto_common::Rubles;

/// Business parameters of the marketplace.
///
/// Constructed once (usually from the environment at server startup) and handed to the database
/// backend at construction time. Nothing in the engine reads ambient global state, so tests can
/// run the full state machine with arbitrary lifetimes and costs.
#[derive(Clone, Debug)]
pub struct MarketConfig {
    /// How long a new order stays open before it expires.
    pub order_lifetime_minutes: i64,
    /// How long after the first take the client has to respond before the order is auto-closed
    /// and the takers are refunded.
    pub no_response_close_minutes: i64,
    /// Slot cap: how many executors may take the same order.
    pub max_executors_per_order: usize,
    /// What one take costs an executor.
    pub order_take_cost: Rubles,
    /// Lifetime of an invoice at the external payment provider.
    pub invoice_expiry_seconds: u32,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            order_lifetime_minutes: 60,
            no_response_close_minutes: 15,
            max_executors_per_order: 3,
            order_take_cost: Rubles::from(2),
            invoice_expiry_seconds: 1800,
        }
    }
}

impl MarketConfig {
    pub fn order_lifetime(&self) -> Duration {
        Duration::minutes(self.order_lifetime_minutes)
    }

    pub fn no_response_window(&self) -> Duration {
        Duration::minutes(self.no_response_close_minutes)
    }
}
