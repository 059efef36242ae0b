use crate::{
    db_types::{NewPaymentEvent, PaymentEvent},
    traits::CommissionLedgerError,
};

/// How many retries get scheduled after the initial attempt; the failure after the last scheduled retry
/// dead-letters the event for operator action.
pub const MAX_EVENT_RETRIES: i64 = 3;

/// Backoff schedule between processing attempts. Failure `n` schedules the next attempt after
/// `EVENT_RETRY_BACKOFF_SECS[n-1]` seconds.
pub const EVENT_RETRY_BACKOFF_SECS: [i64; 3] = [10, 30, 60];

/// Durable tracking of payment provider webhook deliveries.
///
/// Delivery is at-least-once, possibly out of order, possibly duplicated; the store keeps exactly one record per
/// idempotency key and remembers whether its effect has been applied.
#[allow(async_fn_in_trait)]
pub trait WebhookEventManagement: Clone {
    /// Records a webhook delivery. Idempotent on the event id: a re-delivery returns the existing record and
    /// `false` in the second element.
    async fn insert_event(&self, event: NewPaymentEvent) -> Result<(PaymentEvent, bool), CommissionLedgerError>;

    async fn fetch_event(&self, event_id: &str) -> Result<Option<PaymentEvent>, CommissionLedgerError>;

    /// Marks the event as applied exactly once.
    async fn mark_event_processed(&self, event_id: &str) -> Result<PaymentEvent, CommissionLedgerError>;

    /// Records a processing failure: increments the retry counter and schedules the next attempt with backoff, or
    /// dead-letters the event once the ceiling is reached. The event is never silently dropped.
    async fn record_event_failure(&self, event_id: &str, error: &str) -> Result<PaymentEvent, CommissionLedgerError>;

    /// Pending events whose retry time has come, oldest first.
    async fn fetch_due_events(&self, limit: i64) -> Result<Vec<PaymentEvent>, CommissionLedgerError>;

    /// Events awaiting manual operator action.
    async fn fetch_dead_letter_events(&self) -> Result<Vec<PaymentEvent>, CommissionLedgerError>;

    /// Operator retry: pulls the event out of the dead letter queue and makes it immediately due, with a fresh
    /// retry budget.
    async fn requeue_event(&self, event_id: &str) -> Result<PaymentEvent, CommissionLedgerError>;

    /// Operator dismissal: the event is marked `Ignored` and will never be processed.
    async fn ignore_event(&self, event_id: &str) -> Result<PaymentEvent, CommissionLedgerError>;
}
