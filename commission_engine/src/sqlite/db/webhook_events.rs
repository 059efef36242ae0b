use log::{debug, warn};
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewPaymentEvent, PaymentEvent},
    helpers::payment_event_id,
    traits::{CommissionLedgerError, EVENT_RETRY_BACKOFF_SECS, MAX_EVENT_RETRIES},
};

/// Records a webhook delivery, keyed by the event's idempotency hash. Returns `false` in the second parameter if
/// an event with the same key was already recorded (at-least-once delivery collapsing onto one row).
pub async fn idempotent_insert(
    event: NewPaymentEvent,
    conn: &mut SqliteConnection,
) -> Result<(PaymentEvent, bool), CommissionLedgerError> {
    let event_id = payment_event_id(event.order_id.as_str(), &event.txid, event.event_type);
    if let Some(existing) = fetch_event(&event_id, &mut *conn).await? {
        debug!("📨️ Event {event_id} re-delivered for order [{}]; keeping the original record", existing.order_id);
        return Ok((existing, false));
    }
    let inserted: PaymentEvent = sqlx::query_as(
        r#"
        INSERT INTO payment_events (event_id, order_id, txid, event_type, raw)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *;
        "#,
    )
    .bind(&event_id)
    .bind(event.order_id)
    .bind(event.txid)
    .bind(event.event_type.to_string())
    .bind(event.raw)
    .fetch_one(conn)
    .await?;
    debug!("📨️ Event {event_id} recorded for order [{}] ({})", inserted.order_id, inserted.event_type);
    Ok((inserted, true))
}

pub async fn fetch_event(
    event_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentEvent>, CommissionLedgerError> {
    let event = sqlx::query_as("SELECT * FROM payment_events WHERE event_id = $1")
        .bind(event_id)
        .fetch_optional(conn)
        .await?;
    Ok(event)
}

pub async fn mark_processed(
    event_id: &str,
    conn: &mut SqliteConnection,
) -> Result<PaymentEvent, CommissionLedgerError> {
    let event: Option<PaymentEvent> = sqlx::query_as(
        "UPDATE payment_events \
         SET status = 'Processed', next_retry_at = NULL, last_error = NULL, \
             in_dead_letter = 0, dead_letter_reason = NULL, updated_at = CURRENT_TIMESTAMP \
         WHERE event_id = $1 RETURNING *;",
    )
    .bind(event_id)
    .fetch_optional(conn)
    .await?;
    event.ok_or_else(|| CommissionLedgerError::EventNotFound(event_id.to_string()))
}

/// Records a processing failure. While the retry budget lasts, the event stays `Pending` with a backoff-scheduled
/// `next_retry_at`; once exhausted it is flagged for the dead letter queue and left for an operator.
pub async fn record_failure(
    event_id: &str,
    error: &str,
    conn: &mut SqliteConnection,
) -> Result<PaymentEvent, CommissionLedgerError> {
    let event =
        fetch_event(event_id, &mut *conn).await?.ok_or_else(|| CommissionLedgerError::EventNotFound(event_id.to_string()))?;
    let attempt = event.retry_count + 1;
    if attempt <= MAX_EVENT_RETRIES {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let delay = EVENT_RETRY_BACKOFF_SECS[((attempt - 1) as usize).min(EVENT_RETRY_BACKOFF_SECS.len() - 1)];
        let updated: PaymentEvent = sqlx::query_as(
            r#"
            UPDATE payment_events SET
                status = 'Pending',
                retry_count = $1,
                last_error = $2,
                next_retry_at = datetime('now', '+' || $3 || ' seconds'),
                updated_at = CURRENT_TIMESTAMP
            WHERE event_id = $4 RETURNING *;
            "#,
        )
        .bind(attempt)
        .bind(error)
        .bind(delay)
        .bind(event_id)
        .fetch_one(conn)
        .await?;
        debug!("📨️ Event {event_id} failed (attempt {attempt}/{MAX_EVENT_RETRIES}); retrying in {delay}s: {error}");
        Ok(updated)
    } else {
        let reason = format!("Retry budget of {MAX_EVENT_RETRIES} exhausted. Last error: {error}");
        let updated: PaymentEvent = sqlx::query_as(
            r#"
            UPDATE payment_events SET
                status = 'Failed',
                retry_count = $1,
                last_error = $2,
                next_retry_at = NULL,
                in_dead_letter = 1,
                dead_letter_reason = $3,
                updated_at = CURRENT_TIMESTAMP
            WHERE event_id = $4 RETURNING *;
            "#,
        )
        .bind(attempt)
        .bind(error)
        .bind(&reason)
        .bind(event_id)
        .fetch_one(conn)
        .await?;
        warn!("📨️ Event {event_id} moved to the dead letter queue. {reason}");
        Ok(updated)
    }
}

/// Pending events whose scheduled retry time has come.
pub async fn fetch_due(limit: i64, conn: &mut SqliteConnection) -> Result<Vec<PaymentEvent>, CommissionLedgerError> {
    let events = sqlx::query_as(
        "SELECT * FROM payment_events \
         WHERE status = 'Pending' AND in_dead_letter = 0 AND next_retry_at IS NOT NULL \
           AND unixepoch(next_retry_at) <= unixepoch('now') \
         ORDER BY next_retry_at ASC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(events)
}

pub async fn fetch_dead_letter(conn: &mut SqliteConnection) -> Result<Vec<PaymentEvent>, CommissionLedgerError> {
    let events = sqlx::query_as(
        "SELECT * FROM payment_events WHERE in_dead_letter = 1 ORDER BY created_at ASC",
    )
    .fetch_all(conn)
    .await?;
    Ok(events)
}

/// Operator retry: back to `Pending`, immediately due, with a fresh retry budget.
pub async fn requeue(event_id: &str, conn: &mut SqliteConnection) -> Result<PaymentEvent, CommissionLedgerError> {
    let event: Option<PaymentEvent> = sqlx::query_as(
        r#"
        UPDATE payment_events SET
            status = 'Pending',
            retry_count = 0,
            next_retry_at = CURRENT_TIMESTAMP,
            in_dead_letter = 0,
            dead_letter_reason = NULL,
            updated_at = CURRENT_TIMESTAMP
        WHERE event_id = $1 AND status <> 'Processed' RETURNING *;
        "#,
    )
    .bind(event_id)
    .fetch_optional(conn)
    .await?;
    event.ok_or_else(|| CommissionLedgerError::EventNotFound(event_id.to_string()))
}

pub async fn ignore(event_id: &str, conn: &mut SqliteConnection) -> Result<PaymentEvent, CommissionLedgerError> {
    let event: Option<PaymentEvent> = sqlx::query_as(
        r#"
        UPDATE payment_events SET
            status = 'Ignored',
            next_retry_at = NULL,
            in_dead_letter = 0,
            updated_at = CURRENT_TIMESTAMP
        WHERE event_id = $1 AND status <> 'Processed' RETURNING *;
        "#,
    )
    .bind(event_id)
    .fetch_optional(conn)
    .await?;
    event.ok_or_else(|| CommissionLedgerError::EventNotFound(event_id.to_string()))
}
