use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    db_types::{NewOrder, Order, OrderId},
    events::{EventProducers, OrderCreatedEvent},
    order_objects::{SweepResult, TakeOutcome, UpdateOrderRequest},
    traits::{MarketplaceDatabase, OrderFlowError},
};

/// `OrderFlowApi` is the primary API for the order lifecycle: creation, edits, the paid take,
/// the client's respond/close/complete actions, and the periodic expiry sweep.
///
/// It is a thin layer over a [`MarketplaceDatabase`] backend: the backend owns atomicity, this
/// layer owns the wall clock and the event hooks.
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> OrderFlowApi<B>
where B: MarketplaceDatabase
{
    /// Submit a new order. On success an [`OrderCreatedEvent`] is published so that the
    /// notification dispatcher (and anything else that subscribed) can react; event delivery is
    /// fire-and-forget and never affects the result.
    pub async fn create_order(&self, order: NewOrder) -> Result<Order, OrderFlowError> {
        let order = self.db.create_order(order).await?;
        debug!("🔄️📦️ Order [{}] created; notifying subscribers", order.id);
        for producer in &self.producers.order_created_producer {
            let event = OrderCreatedEvent::new(order.clone());
            producer.publish_event(event).await;
        }
        Ok(order)
    }

    pub async fn update_order(
        &self,
        order_id: &OrderId,
        client_id: i64,
        patch: UpdateOrderRequest,
    ) -> Result<Order, OrderFlowError> {
        self.db.update_order(order_id, client_id, patch, Utc::now()).await
    }

    pub async fn delete_order(&self, order_id: &OrderId, client_id: i64) -> Result<(), OrderFlowError> {
        self.db.delete_order(order_id, client_id, Utc::now()).await
    }

    /// An executor claims a paid slot on the order. See
    /// [`MarketplaceDatabase::take_order`] for the full precondition ladder.
    pub async fn take_order(&self, order_id: &OrderId, executor_id: i64) -> Result<TakeOutcome, OrderFlowError> {
        let outcome = self.db.take_order(order_id, executor_id, Utc::now()).await?;
        trace!(
            "🔄️📦️ Take on [{order_id}] by #{executor_id}: {} slot(s) used, charged: {}",
            outcome.take_count,
            outcome.charged
        );
        Ok(outcome)
    }

    pub async fn respond_to_order(&self, order_id: &OrderId, client_id: i64) -> Result<Order, OrderFlowError> {
        self.db.respond_to_order(order_id, client_id, Utc::now()).await
    }

    pub async fn close_order(&self, order_id: &OrderId, client_id: i64) -> Result<Order, OrderFlowError> {
        self.db.close_order(order_id, client_id).await
    }

    pub async fn complete_order(&self, order_id: &OrderId, client_id: i64) -> Result<Order, OrderFlowError> {
        self.db.complete_order(order_id, client_id).await
    }

    /// One pass of the expiry sweep, at the current wall-clock time.
    pub async fn sweep_expired_orders(&self) -> Result<SweepResult, OrderFlowError> {
        self.db.sweep_expired_orders(Utc::now()).await
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
