//! Stateless pub-sub plumbing for ledger events.
//!
//! Components subscribe to ledger events (commission settled, commission released, withdrawal approved) and react
//! to them without any access to engine internals. All a handler ever receives is the event value itself. Handlers
//! may be async; each event is dispatched on its own task, and the dispatch loop drains every in-flight handler
//! before shutting down.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{sync::mpsc, task::JoinSet};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, listener) = mpsc::channel(buffer_size);
        Self { listener, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    /// Runs the dispatch loop until every producer has been dropped, then waits for all spawned handler
    /// invocations to finish.
    pub async fn start_handler(mut self) {
        debug!("📬️ Event dispatch loop starting");
        // The loop's own sender must go, or the channel never closes.
        drop(self.sender);
        let mut in_flight: JoinSet<()> = JoinSet::new();
        while let Some(ev) = self.listener.recv().await {
            trace!("📬️ Dispatching event");
            let handler = Arc::clone(&self.handler);
            in_flight.spawn(async move {
                (handler)(ev).await;
            });
            // Reap whatever has already finished so the set does not grow unbounded.
            while let Some(result) = in_flight.try_join_next() {
                log_handler_result(result);
            }
        }
        debug!("📬️ Event channel closed. Draining {} in-flight handler(s).", in_flight.len());
        while let Some(result) = in_flight.join_next().await {
            log_handler_result(result);
        }
        debug!("📬️ Event dispatch loop has shut down");
    }
}

fn log_handler_result(result: Result<(), tokio::task::JoinError>) {
    match result {
        Ok(()) => trace!("📬️ Event handled"),
        Err(e) => warn!("📬️ An event handler panicked: {e}"),
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    /// Publishing never fails from the caller's point of view. A closed channel (handler already shut down) is
    /// logged and the event is dropped; ledger transitions must not depend on notification delivery.
    pub async fn publish_event(&self, event: E) {
        if self.sender.send(event).await.is_err() {
            error!("📬️ Event dropped: the handler for this event type has shut down");
        }
    }
}
