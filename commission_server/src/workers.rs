use std::time::Duration;

use commission_engine::{db_types::Order, events::EventProducers, CommissionFlowApi, SqliteDatabase, WebhookApi};
use log::*;
use tokio::task::JoinHandle;

/// How many deferred webhook events each retry pump tick will pick up.
const RETRY_BATCH_SIZE: i64 = 50;

/// Starts the commission release sweep. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Every tick, all settled commissions whose release date has arrived are flipped to `Available` and the
/// commission-available hooks fire for each of them.
pub fn start_sweep_worker(db: SqliteDatabase, producers: EventProducers, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        let api = CommissionFlowApi::new(db, producers);
        info!("🕰️ Commission release sweep started (every {}s)", interval.as_secs());
        loop {
            timer.tick().await;
            trace!("🕰️ Running commission release sweep");
            match api.release_due_commissions().await {
                Ok(released) if released.is_empty() => {},
                Ok(released) => {
                    info!("🕰️ {} commissions released: {}", released.len(), order_list(&released));
                },
                Err(e) => {
                    error!("🕰️ Error running commission release sweep: {e}");
                },
            }
        }
    })
}

/// Starts the webhook retry pump. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Every tick, deferred payment events whose backoff has lapsed are re-applied against the ledger.
pub fn start_webhook_retry_worker(db: SqliteDatabase, producers: EventProducers, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        let api = WebhookApi::new(db, producers);
        info!("🕰️ Webhook retry pump started (every {}s)", interval.as_secs());
        loop {
            timer.tick().await;
            trace!("🕰️ Running webhook retry pump");
            match api.retry_due_events(RETRY_BATCH_SIZE).await {
                Ok(0) => {},
                Ok(applied) => info!("🕰️ {applied} deferred payment events applied"),
                Err(e) => {
                    error!("🕰️ Error running webhook retry pump: {e}");
                },
            }
        }
    })
}

fn order_list(orders: &[Order]) -> String {
    orders
        .iter()
        .map(|o| format!("[{}] agent: {} amount: {}", o.order_id, o.ref_agent_id.as_deref().unwrap_or("-"), o.commission_amount))
        .collect::<Vec<String>>()
        .join(", ")
}
