use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    CommissionAvailableEvent,
    CommissionSettledEvent,
    EventHandler,
    EventProducer,
    Handler,
    WithdrawalApprovedEvent,
};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub commission_settled_producer: Vec<EventProducer<CommissionSettledEvent>>,
    pub commission_available_producer: Vec<EventProducer<CommissionAvailableEvent>>,
    pub withdrawal_approved_producer: Vec<EventProducer<WithdrawalApprovedEvent>>,
}

pub struct EventHandlers {
    pub on_commission_settled: Option<EventHandler<CommissionSettledEvent>>,
    pub on_commission_available: Option<EventHandler<CommissionAvailableEvent>>,
    pub on_withdrawal_approved: Option<EventHandler<WithdrawalApprovedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_commission_settled = hooks.on_commission_settled.map(|f| EventHandler::new(buffer_size, f));
        let on_commission_available = hooks.on_commission_available.map(|f| EventHandler::new(buffer_size, f));
        let on_withdrawal_approved = hooks.on_withdrawal_approved.map(|f| EventHandler::new(buffer_size, f));
        Self { on_commission_settled, on_commission_available, on_withdrawal_approved }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_commission_settled {
            result.commission_settled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_commission_available {
            result.commission_available_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_withdrawal_approved {
            result.withdrawal_approved_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_commission_settled {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_commission_available {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_withdrawal_approved {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_commission_settled: Option<Handler<CommissionSettledEvent>>,
    pub on_commission_available: Option<Handler<CommissionAvailableEvent>>,
    pub on_withdrawal_approved: Option<Handler<WithdrawalApprovedEvent>>,
}

impl EventHooks {
    pub fn on_commission_settled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(CommissionSettledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_commission_settled = Some(Arc::new(f));
        self
    }

    pub fn on_commission_available<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(CommissionAvailableEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_commission_available = Some(Arc::new(f));
        self
    }

    pub fn on_withdrawal_approved<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(WithdrawalApprovedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_withdrawal_approved = Some(Arc::new(f));
        self
    }
}
