use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, GroupCancelledEvent, Handler, OrderPaidEvent};

/// The producer ends handed to the group flow api. Cloneable; publishing to a hook nobody registered is a no-op
/// because its producer list is simply empty.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_paid_producer: Vec<EventProducer<OrderPaidEvent>>,
    pub group_cancelled_producer: Vec<EventProducer<GroupCancelledEvent>>,
}

pub struct EventHandlers {
    pub on_order_paid: Option<EventHandler<OrderPaidEvent>>,
    pub on_group_cancelled: Option<EventHandler<GroupCancelledEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_paid = hooks.on_order_paid.map(|f| EventHandler::new(buffer_size, f));
        let on_group_cancelled = hooks.on_group_cancelled.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_paid, on_group_cancelled }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_paid {
            result.order_paid_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_group_cancelled {
            result.group_cancelled_producer.push(handler.subscribe());
        }
        result
    }

    pub fn start_handlers(self) {
        if let Some(handler) = self.on_order_paid {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_group_cancelled {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

/// Builder for the async hooks a caller wants to attach before constructing the group flow api.
#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_paid: Option<Handler<OrderPaidEvent>>,
    pub on_group_cancelled: Option<Handler<GroupCancelledEvent>>,
}

impl EventHooks {
    pub fn on_order_paid<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderPaidEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_paid = Some(Arc::new(f));
        self
    }

    pub fn on_group_cancelled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(GroupCancelledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_group_cancelled = Some(Arc::new(f));
        self
    }
}
