use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    EventHandler,
    EventProducer,
    Handler,
    OrderCreatedEvent,
    OrderStatusChangedEvent,
    StockChangedEvent,
};

/// The publishing side of every subscribed hook. Cheap to clone; API objects each hold a copy.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_created_producer: Vec<EventProducer<OrderCreatedEvent>>,
    pub status_changed_producer: Vec<EventProducer<OrderStatusChangedEvent>>,
    pub stock_changed_producer: Vec<EventProducer<StockChangedEvent>>,
}

impl EventProducers {
    pub fn publish_order_created(&self, event: OrderCreatedEvent) {
        for producer in &self.order_created_producer {
            producer.publish_event(event.clone());
        }
    }

    pub fn publish_status_changed(&self, event: OrderStatusChangedEvent) {
        for producer in &self.status_changed_producer {
            producer.publish_event(event.clone());
        }
    }

    pub fn publish_stock_changed(&self, event: StockChangedEvent) {
        for producer in &self.stock_changed_producer {
            producer.publish_event(event);
        }
    }
}

pub struct EventHandlers {
    pub on_order_created: Option<EventHandler<OrderCreatedEvent>>,
    pub on_status_changed: Option<EventHandler<OrderStatusChangedEvent>>,
    pub on_stock_changed: Option<EventHandler<StockChangedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_created = hooks.on_order_created.map(|f| EventHandler::new(buffer_size, f));
        let on_status_changed = hooks.on_status_changed.map(|f| EventHandler::new(buffer_size, f));
        let on_stock_changed = hooks.on_stock_changed.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_created, on_status_changed, on_stock_changed }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_created {
            result.order_created_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_status_changed {
            result.status_changed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_stock_changed {
            result.stock_changed_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_created {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_status_changed {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_stock_changed {
            tokio::spawn(handler.start_handler());
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_created: Option<Handler<OrderCreatedEvent>>,
    pub on_status_changed: Option<Handler<OrderStatusChangedEvent>>,
    pub on_stock_changed: Option<Handler<StockChangedEvent>>,
}

impl EventHooks {
    pub fn on_order_created<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderCreatedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_created = Some(Arc::new(f));
        self
    }

    pub fn on_status_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderStatusChangedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_status_changed = Some(Arc::new(f));
        self
    }

    pub fn on_stock_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(StockChangedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_stock_changed = Some(Arc::new(f));
        self
    }
}
