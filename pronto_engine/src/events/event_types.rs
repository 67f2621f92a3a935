use crate::db_types::Order;

/// Emitted after an order has been committed to the store. Subscribers see the order as
/// persisted, including its generated id.
#[derive(Debug, Clone)]
pub struct OrderCreatedEvent {
    pub order: Order,
}

impl OrderCreatedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}
