use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{NewPaymentEvent, Order, PaymentEvent, PaymentEventStatus, PaymentEventType},
    events::{CommissionSettledEvent, EventProducers},
    traits::{CommissionLedgerDatabase, CommissionLedgerError, WebhookEventManagement},
};

/// The outcome of processing one webhook delivery.
#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    /// The event's effect was applied to the order in this call.
    Applied(Order),
    /// The event had already been applied (or explicitly ignored); nothing changed. Duplicates are success.
    Duplicate,
    /// The effect could not be applied yet (unknown order, transient error). The event is scheduled for retry, or
    /// dead-lettered once its retry budget is spent.
    Deferred(PaymentEvent),
}

/// `WebhookApi` reconciles payment provider notifications against the ledger.
///
/// Deliveries are at-least-once and unordered, so every notification is first recorded idempotently and then
/// applied with compare-and-set semantics; a delivery that cannot be applied yet is retried on a backoff schedule
/// rather than dropped.
pub struct WebhookApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for WebhookApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WebhookApi")
    }
}

impl<B> WebhookApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> WebhookApi<B>
where B: CommissionLedgerDatabase + WebhookEventManagement
{
    /// Processes a (signature-verified) payment notification.
    ///
    /// The delivery is recorded first, so it survives a crash between receipt and application. Re-delivery of an
    /// already-processed event is reported as [`WebhookOutcome::Duplicate`] and is not an error.
    pub async fn process_notification(&self, notification: NewPaymentEvent) -> Result<WebhookOutcome, CommissionLedgerError> {
        let (event, inserted) = self.db.insert_event(notification).await?;
        if !inserted && matches!(event.status, PaymentEventStatus::Processed | PaymentEventStatus::Ignored) {
            debug!("📨️ Event {} has already been {}; acknowledging without applying", event.event_id, event.status);
            return Ok(WebhookOutcome::Duplicate);
        }
        self.attempt_event(&event).await
    }

    /// Applies the event's effect to its order. On any failure the event is handed to the retry machinery and the
    /// call still returns `Ok`; only database faults propagate as errors.
    async fn attempt_event(&self, event: &PaymentEvent) -> Result<WebhookOutcome, CommissionLedgerError> {
        let applied = match event.event_type {
            PaymentEventType::Success => self.db.apply_payment_success(&event.order_id).await,
            ref failure => {
                let annul_available = matches!(failure, PaymentEventType::Refund | PaymentEventType::Chargeback);
                self.db.apply_payment_failure(&event.order_id, annul_available).await
            },
        };
        match applied {
            Ok(Some(order)) => {
                let event = self.db.mark_event_processed(&event.event_id).await?;
                debug!("📨️ Event {} applied to order [{}]", event.event_id, order.order_id);
                if event.event_type == PaymentEventType::Success {
                    self.call_commission_settled_hook(&order).await;
                }
                Ok(WebhookOutcome::Applied(order))
            },
            Ok(None) => {
                // Out-of-order delivery: the webhook beat the order into the system.
                let msg = format!("Order [{}] is not known to the ledger yet", event.order_id);
                let event = self.db.record_event_failure(&event.event_id, &msg).await?;
                Ok(WebhookOutcome::Deferred(event))
            },
            Err(e) => {
                let event = self.db.record_event_failure(&event.event_id, &e.to_string()).await?;
                Ok(WebhookOutcome::Deferred(event))
            },
        }
    }

    /// Re-processes every event whose retry time has come. Returns the number of events applied in this pass.
    pub async fn retry_due_events(&self, limit: i64) -> Result<usize, CommissionLedgerError> {
        let due = self.db.fetch_due_events(limit).await?;
        if due.is_empty() {
            return Ok(0);
        }
        debug!("📨️ {} webhook events are due for a retry", due.len());
        let mut applied = 0;
        for event in &due {
            if matches!(self.attempt_event(event).await?, WebhookOutcome::Applied(_)) {
                applied += 1;
            }
        }
        debug!("📨️ Retry pass complete. {applied}/{} events applied.", due.len());
        Ok(applied)
    }

    /// Operator retry of a single (typically dead-lettered) event: the retry budget is reset and one attempt is
    /// made immediately.
    pub async fn retry_event(&self, event_id: &str) -> Result<WebhookOutcome, CommissionLedgerError> {
        let event = self.db.requeue_event(event_id).await?;
        info!("📨️ Event {event_id} was manually requeued");
        self.attempt_event(&event).await
    }

    /// Operator dismissal: the event will never be applied.
    pub async fn ignore_event(&self, event_id: &str) -> Result<PaymentEvent, CommissionLedgerError> {
        let event = self.db.ignore_event(event_id).await?;
        warn!("📨️ Event {event_id} was manually ignored and will never be applied");
        Ok(event)
    }

    pub async fn dead_letter_events(&self) -> Result<Vec<PaymentEvent>, CommissionLedgerError> {
        self.db.fetch_dead_letter_events().await
    }

    pub async fn fetch_event(&self, event_id: &str) -> Result<Option<PaymentEvent>, CommissionLedgerError> {
        self.db.fetch_event(event_id).await
    }

    async fn call_commission_settled_hook(&self, order: &Order) {
        if !order.commission_settled {
            return;
        }
        for emitter in &self.producers.commission_settled_producer {
            debug!("📨️ Notifying commission settled hook subscribers");
            let event = CommissionSettledEvent::new(order.clone());
            emitter.publish_event(event).await;
        }
    }
}
