use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use commission_engine::{
    events::{CommissionAvailableEvent, CommissionSettledEvent, EventHandlers, EventHooks, EventProducers, WithdrawalApprovedEvent},
    BalanceApi,
    CommissionFlowApi,
    SqliteDatabase,
    WebhookApi,
    WithdrawalApi,
};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    middleware::HmacMiddlewareFactory,
    routes::{
        approve_withdrawal,
        balance,
        commissions,
        dead_letter_events,
        health,
        ignore_event,
        new_order,
        new_withdrawal,
        payment_webhook,
        reject_withdrawal,
        release_commissions,
        reset_commissions,
        retry_event,
        set_available_at,
        settle_order,
        update_order_amount,
    },
    workers::{start_sweep_worker, start_webhook_retry_worker},
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    if !Sqlite::database_exists(&config.database_url).await.unwrap_or(false) {
        info!("🚀️ Creating database at {}", config.database_url);
        Sqlite::create_database(&config.database_url)
            .await
            .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    }
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let handlers = EventHandlers::new(1, default_hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;
    start_sweep_worker(db.clone(), producers.clone(), config.sweep_interval);
    start_webhook_retry_worker(db.clone(), producers.clone(), config.webhook_retry_interval);
    let srv = create_server_instance(config, db, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

/// The default event hooks log every ledger event. Deployments that need to push notifications elsewhere can
/// build their own `EventHooks` and call `create_server_instance` directly.
pub fn default_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks
        .on_commission_settled(|ev: CommissionSettledEvent| {
            Box::pin(async move {
                info!(
                    "📬️ Commission of {} settled for order [{}]",
                    ev.order.commission_amount, ev.order.order_id
                );
            })
        })
        .on_commission_available(|ev: CommissionAvailableEvent| {
            Box::pin(async move {
                info!(
                    "📬️ Commission of {} on order [{}] is now available for withdrawal",
                    ev.order.commission_amount, ev.order.order_id
                );
            })
        })
        .on_withdrawal_approved(|ev: WithdrawalApprovedEvent| {
            Box::pin(async move {
                info!(
                    "📬️ Withdrawal #{} of {} approved for agent {} ({} orders claimed)",
                    ev.request.id,
                    ev.request.amount,
                    ev.request.agent_id,
                    ev.claimed_orders.len()
                );
            })
        });
    hooks
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let flow_api = CommissionFlowApi::new(db.clone(), producers.clone());
        let balance_api = BalanceApi::new(db.clone(), config.min_withdrawal);
        let withdrawal_api = WithdrawalApi::new(db.clone(), producers.clone());
        let webhook_api = WebhookApi::new(db.clone(), producers.clone());
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("acp::access_log"))
            .app_data(web::Data::new(flow_api))
            .app_data(web::Data::new(balance_api))
            .app_data(web::Data::new(withdrawal_api))
            .app_data(web::Data::new(webhook_api))
            .app_data(web::Data::new(config.clone()));
        // The payment provider signs the raw request body; unsigned payloads never reach the handler.
        let webhook_scope = web::scope("/webhook")
            .wrap(HmacMiddlewareFactory::new(
                "X-Payment-Signature",
                config.webhook.hmac_secret.clone(),
                config.webhook.hmac_checks,
            ))
            .service(payment_webhook);
        let admin_scope = web::scope("/admin")
            .service(release_commissions)
            .service(reset_commissions)
            .service(set_available_at)
            .service(dead_letter_events)
            .service(retry_event)
            .service(ignore_event);
        app.service(health)
            .service(new_order)
            .service(settle_order)
            .service(update_order_amount)
            .service(balance)
            .service(commissions)
            .service(new_withdrawal)
            .service(approve_withdrawal)
            .service(reject_withdrawal)
            .service(webhook_scope)
            .service(admin_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}
