//! Request handler definitions
//!
//! Define each route and its handler here. Handlers that are more than a line or two MUST go into a separate
//! module. Keep this module neat and tidy 🙏
//!
//! Handlers are async and never block the worker thread; all ledger work happens behind the engine APIs.
use actix_web::{get, http::StatusCode, post, put, web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use commission_engine::{
    db_types::{CommissionStatus, NewPaymentEvent, OrderId},
    BalanceApi,
    CommissionFlowApi,
    SqliteDatabase,
    WebhookApi,
    WebhookOutcome,
    WithdrawalApi,
};
use log::*;
use serde::Deserialize;
use serde_json::json;

use crate::{
    config::ServerConfig,
    data_objects::{
        AmountUpdateParams,
        AvailableAtParams,
        JsonResponse,
        NewOrderRequest,
        PaymentNotification,
        ProcessWithdrawalParams,
        WithdrawalRequestParams,
    },
    errors::ServerError,
};

type FlowApi = web::Data<CommissionFlowApi<SqliteDatabase>>;
type Balances = web::Data<BalanceApi<SqliteDatabase>>;
type Withdrawals = web::Data<WithdrawalApi<SqliteDatabase>>;
type Webhooks = web::Data<WebhookApi<SqliteDatabase>>;

#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//--------------------------------------      Order routes     -------------------------------------------------------

#[post("/orders")]
pub async fn new_order(api: FlowApi, body: web::Json<NewOrderRequest>) -> Result<HttpResponse, ServerError> {
    let (order, inserted) = api.process_new_order(body.into_inner().into()).await?;
    let status = if inserted { StatusCode::CREATED } else { StatusCode::OK };
    Ok(HttpResponse::build(status).json(order))
}

#[post("/orders/{order_id}/settle")]
pub async fn settle_order(api: FlowApi, path: web::Path<String>) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    let order = api.settle_order(&order_id).await?;
    Ok(HttpResponse::Ok().json(order))
}

#[post("/orders/{order_id}/amount")]
pub async fn update_order_amount(
    api: FlowApi,
    path: web::Path<String>,
    body: web::Json<AmountUpdateParams>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    let order = api.update_order_amount(&order_id, body.amount).await?;
    Ok(HttpResponse::Ok().json(order))
}

//--------------------------------------     Balance routes    -------------------------------------------------------

#[get("/balance/{tenant_id}/{agent_id}")]
pub async fn balance(api: Balances, path: web::Path<(String, String)>) -> Result<HttpResponse, ServerError> {
    let (tenant_id, agent_id) = path.into_inner();
    let summary = api.summary(&agent_id, &tenant_id).await?;
    Ok(HttpResponse::Ok().json(summary))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommissionListQuery {
    pub status: Option<CommissionStatus>,
}

#[get("/commissions/{tenant_id}/{agent_id}")]
pub async fn commissions(
    api: Balances,
    path: web::Path<(String, String)>,
    query: web::Query<CommissionListQuery>,
) -> Result<HttpResponse, ServerError> {
    let (tenant_id, agent_id) = path.into_inner();
    let orders = api.commission_orders_for_agent(&agent_id, &tenant_id, query.status).await?;
    Ok(HttpResponse::Ok().json(orders))
}

//--------------------------------------   Withdrawal routes   -------------------------------------------------------

#[post("/withdrawals")]
pub async fn new_withdrawal(
    api: Withdrawals,
    config: web::Data<ServerConfig>,
    body: web::Json<WithdrawalRequestParams>,
) -> Result<HttpResponse, ServerError> {
    if body.amount < config.min_withdrawal {
        return Err(ServerError::InvalidRequestBody(format!(
            "Withdrawal amount {} is below the minimum of {}",
            body.amount, config.min_withdrawal
        )));
    }
    let request = api.request_withdrawal(&body.agent_id, &body.tenant_id, body.amount).await?;
    Ok(HttpResponse::Created().json(request))
}

#[post("/withdrawals/{id}/approve")]
pub async fn approve_withdrawal(
    api: Withdrawals,
    path: web::Path<i64>,
    body: web::Json<ProcessWithdrawalParams>,
) -> Result<HttpResponse, ServerError> {
    let (request, claimed) = api.approve_withdrawal(path.into_inner(), &body.processed_by).await?;
    Ok(HttpResponse::Ok().json(json!({ "request": request, "claimed_orders": claimed })))
}

#[post("/withdrawals/{id}/reject")]
pub async fn reject_withdrawal(
    api: Withdrawals,
    path: web::Path<i64>,
    body: web::Json<ProcessWithdrawalParams>,
) -> Result<HttpResponse, ServerError> {
    let reason = body.reason.clone().unwrap_or_else(|| "No reason given".to_string());
    let request = api.reject_withdrawal(path.into_inner(), &body.processed_by, &reason).await?;
    Ok(HttpResponse::Ok().json(request))
}

//--------------------------------------     Webhook routes    -------------------------------------------------------

/// The payment provider webhook. The HMAC middleware has already verified the signature over these exact bytes;
/// the raw body is stored with the event for audit.
#[post("/payment")]
pub async fn payment_webhook(api: Webhooks, body: web::Bytes) -> Result<HttpResponse, ServerError> {
    let notification: PaymentNotification =
        serde_json::from_slice(&body).map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?;
    let raw = String::from_utf8_lossy(&body).into_owned();
    let event = NewPaymentEvent::new(OrderId::from(notification.order_id), notification.txid, notification.event_type)
        .with_raw(raw);
    let outcome = api.process_notification(event).await?;
    let response = match outcome {
        WebhookOutcome::Applied(order) => JsonResponse::success(format!("Event applied to order [{}]", order.order_id)),
        WebhookOutcome::Duplicate => JsonResponse::success("Event was already processed"),
        WebhookOutcome::Deferred(event) => JsonResponse::success(format!("Event {} queued for retry", event.event_id)),
    };
    Ok(HttpResponse::Ok().json(response))
}

//--------------------------------------      Admin routes     -------------------------------------------------------

#[post("/commissions/release")]
pub async fn release_commissions(api: FlowApi) -> Result<HttpResponse, ServerError> {
    let released = api.release_due_commissions().await?;
    Ok(HttpResponse::Ok().json(json!({ "released": released.len(), "orders": released })))
}

#[post("/commissions/reset/{tenant_id}")]
pub async fn reset_commissions(api: FlowApi, path: web::Path<String>) -> Result<HttpResponse, ServerError> {
    let tenant_id = path.into_inner();
    let count = api.reset_all_commissions(&tenant_id).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("{count} commissions reset for tenant {tenant_id}"))))
}

#[put("/orders/{order_id}/available_at")]
pub async fn set_available_at(
    api: FlowApi,
    path: web::Path<String>,
    body: web::Json<AvailableAtParams>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    let available_at: DateTime<Utc> = body.available_at;
    let order = api.set_commission_available_at(&order_id, available_at).await?;
    Ok(HttpResponse::Ok().json(order))
}

#[get("/webhooks/dead_letter")]
pub async fn dead_letter_events(api: Webhooks) -> Result<HttpResponse, ServerError> {
    let events = api.dead_letter_events().await?;
    Ok(HttpResponse::Ok().json(events))
}

#[post("/webhooks/{event_id}/retry")]
pub async fn retry_event(api: Webhooks, path: web::Path<String>) -> Result<HttpResponse, ServerError> {
    let outcome = api.retry_event(&path.into_inner()).await?;
    let response = match outcome {
        WebhookOutcome::Applied(order) => JsonResponse::success(format!("Event applied to order [{}]", order.order_id)),
        WebhookOutcome::Duplicate => JsonResponse::success("Event was already processed"),
        WebhookOutcome::Deferred(event) => JsonResponse::failure(format!(
            "Event could not be applied: {}",
            event.last_error.unwrap_or_else(|| "unknown error".to_string())
        )),
    };
    Ok(HttpResponse::Ok().json(response))
}

#[post("/webhooks/{event_id}/ignore")]
pub async fn ignore_event(api: Webhooks, path: web::Path<String>) -> Result<HttpResponse, ServerError> {
    let event = api.ignore_event(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("Event {} ignored", event.event_id))))
}
