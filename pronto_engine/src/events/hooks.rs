use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, Handler, OrderCreatedEvent};

/// The producer ends of all wired-up hooks. Cloned into each API instance that publishes.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_created_producer: Vec<EventProducer<OrderCreatedEvent>>,
}

/// The receive loops for all wired-up hooks. Start these once at boot.
pub struct EventHandlers {
    pub on_order_created: Option<EventHandler<OrderCreatedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_created = hooks.on_order_created.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_created }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_created {
            result.order_created_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_created {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

/// Callbacks the embedding application wants to run on engine events.
#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_created: Option<Handler<OrderCreatedEvent>>,
}

impl EventHooks {
    pub fn on_order_created<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderCreatedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_created = Some(Arc::new(f));
        self
    }
}
