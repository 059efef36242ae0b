//! End-to-end route tests against a real sqlite ledger.
//!
//! Each test spins up a fresh database file, wires the full middleware and route tree exactly as the server
//! does, and drives it over HTTP with [`actix_web::test`].
use acp_common::{Money, Secret};
use actix_web::{
    body::MessageBody,
    dev::{Service, ServiceResponse},
    http::StatusCode,
    middleware::Logger,
    test,
    web,
    App,
    Error,
};
use commission_engine::{
    db_types::Order,
    events::EventProducers,
    BalanceApi,
    CommissionFlowApi,
    SqliteDatabase,
    WebhookApi,
    WithdrawalApi,
};
use commission_server::{
    config::{ServerConfig, WebhookConfig},
    helpers::calculate_hmac,
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
};
use serde_json::{json, Value};
use sqlx::{migrate::MigrateDatabase, Sqlite};

const HMAC_SECRET: &str = "endpoint-test-secret";

async fn prepare_db() -> SqliteDatabase {
    let _ = env_logger::try_init();
    let mut path = std::env::temp_dir();
    path.push(format!("acp_server_test_{}.db", rand::random::<u64>()));
    let url = format!("sqlite://{}", path.to_string_lossy());
    if Sqlite::database_exists(&url).await.unwrap_or(false) {
        Sqlite::drop_database(&url).await.unwrap();
    }
    Sqlite::create_database(&url).await.unwrap();
    let db = SqliteDatabase::new_with_url(&url, 5).await.unwrap();
    db.migrate().await.unwrap();
    db
}

fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.min_withdrawal = Money::from_major(50);
    config.webhook = WebhookConfig { hmac_secret: Secret::new(HMAC_SECRET.to_string()), hmac_checks: true };
    config
}

async fn spawn_app(
    db: SqliteDatabase,
    config: ServerConfig,
) -> impl Service<actix_http::Request, Response = ServiceResponse<impl MessageBody>, Error = Error> {
    let producers = EventProducers::default();
    let flow_api = CommissionFlowApi::new(db.clone(), producers.clone());
    let balance_api = BalanceApi::new(db.clone(), config.min_withdrawal);
    let withdrawal_api = WithdrawalApi::new(db.clone(), producers.clone());
    let webhook_api = WebhookApi::new(db.clone(), producers.clone());
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
    test::init_service(
        App::new()
            .wrap(Logger::default())
            .app_data(web::Data::new(flow_api))
            .app_data(web::Data::new(balance_api))
            .app_data(web::Data::new(withdrawal_api))
            .app_data(web::Data::new(webhook_api))
            .app_data(web::Data::new(config))
            .service(health)
            .service(new_order)
            .service(settle_order)
            .service(update_order_amount)
            .service(balance)
            .service(commissions)
            .service(new_withdrawal)
            .service(approve_withdrawal)
            .service(reject_withdrawal)
            .service(webhook_scope)
            .service(admin_scope),
    )
    .await
}

async fn seed_directory(db: &SqliteDatabase, percent: f64) {
    let api = CommissionFlowApi::new(db.clone(), EventProducers::default());
    api.upsert_tenant("acme", percent, 0).await.unwrap();
    api.upsert_referral_code("SPRING", "acme", "agent-007", None).await.unwrap();
}

fn signed_webhook(body: &Value) -> test::TestRequest {
    let payload = serde_json::to_vec(body).unwrap();
    let sig = calculate_hmac(HMAC_SECRET, &payload);
    test::TestRequest::post()
        .uri("/webhook/payment")
        .insert_header(("X-Payment-Signature", sig))
        .insert_header(("Content-Type", "application/json"))
        .set_payload(payload)
}

#[actix_web::test]
async fn health_check_responds() {
    let db = prepare_db().await;
    let app = spawn_app(db, test_config()).await;
    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn order_creation_is_idempotent_over_http() {
    let db = prepare_db().await;
    seed_directory(&db, 10.0).await;
    let app = spawn_app(db, test_config()).await;
    let body = json!({
        "order_id": "http-100",
        "tenant_id": "acme",
        "customer_id": "cust-1",
        "amount": 100_000,
        "referral_code": "SPRING"
    });
    let req = test::TestRequest::post().uri("/orders").set_json(&body).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let order: Order = test::read_body_json(resp).await;
    assert_eq!(order.ref_agent_id.as_deref(), Some("agent-007"));
    assert_eq!(order.commission_amount, Money::from(10_000));

    let req = test::TestRequest::post().uri("/orders").set_json(&body).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn signed_webhook_settles_and_release_makes_balance_withdrawable() {
    let db = prepare_db().await;
    seed_directory(&db, 10.0).await;
    let app = spawn_app(db, test_config()).await;

    let order = json!({
        "order_id": "http-200",
        "tenant_id": "acme",
        "customer_id": "cust-2",
        "amount": 600_000,
        "referral_code": "SPRING"
    });
    let resp =
        test::call_service(&app, test::TestRequest::post().uri("/orders").set_json(&order).to_request()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    // An unsigned notification never reaches the ledger
    let notification = json!({ "order_id": "http-200", "txid": "tx-200", "event_type": "Success" });
    let payload = serde_json::to_vec(&notification).unwrap();
    let unsigned = test::TestRequest::post().uri("/webhook/payment").set_payload(payload).to_request();
    let err = match test::try_call_service(&app, unsigned).await {
        Ok(_) => panic!("unsigned webhook should be rejected"),
        Err(e) => e,
    };
    assert_eq!(err.error_response().status(), StatusCode::UNAUTHORIZED);

    let resp = test::call_service(&app, signed_webhook(&notification).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    // The commission is settled but still held until the release sweep runs
    let resp =
        test::call_service(&app, test::TestRequest::get().uri("/balance/acme/agent-007").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let summary: Value = test::read_body_json(resp).await;
    assert_eq!(summary["balance"]["on_hold"], json!(60_000));
    assert_eq!(summary["can_withdraw"], json!(false));

    let resp = test::call_service(
        &app,
        test::TestRequest::post().uri("/admin/commissions/release").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let released: Value = test::read_body_json(resp).await;
    assert_eq!(released["released"], json!(1));

    let resp =
        test::call_service(&app, test::TestRequest::get().uri("/balance/acme/agent-007").to_request()).await;
    let summary: Value = test::read_body_json(resp).await;
    assert_eq!(summary["balance"]["available"], json!(60_000));
    assert_eq!(summary["can_withdraw"], json!(true));
}

#[actix_web::test]
async fn withdrawals_below_the_minimum_are_rejected_up_front() {
    let db = prepare_db().await;
    seed_directory(&db, 10.0).await;
    let app = spawn_app(db, test_config()).await;
    let body = json!({ "agent_id": "agent-007", "tenant_id": "acme", "amount": 1_000 });
    let req = test::TestRequest::post().uri("/withdrawals").set_json(&body).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn withdrawal_lifecycle_over_http() {
    let db = prepare_db().await;
    seed_directory(&db, 10.0).await;
    let app = spawn_app(db, test_config()).await;

    let order = json!({
        "order_id": "http-300",
        "tenant_id": "acme",
        "customer_id": "cust-3",
        "amount": 800_000,
        "referral_code": "SPRING"
    });
    test::call_service(&app, test::TestRequest::post().uri("/orders").set_json(&order).to_request()).await;
    let notification = json!({ "order_id": "http-300", "txid": "tx-300", "event_type": "Success" });
    test::call_service(&app, signed_webhook(&notification).to_request()).await;
    test::call_service(&app, test::TestRequest::post().uri("/admin/commissions/release").to_request()).await;

    let body = json!({ "agent_id": "agent-007", "tenant_id": "acme", "amount": 80_000 });
    let req = test::TestRequest::post().uri("/withdrawals").set_json(&body).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let request: Value = test::read_body_json(resp).await;
    let id = request["id"].as_i64().unwrap();

    // A second open request conflicts
    let req = test::TestRequest::post().uri("/withdrawals").set_json(&body).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let approve = json!({ "processed_by": "finance-bot" });
    let req =
        test::TestRequest::post().uri(&format!("/withdrawals/{id}/approve")).set_json(&approve).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let outcome: Value = test::read_body_json(resp).await;
    assert_eq!(outcome["request"]["status"], json!("Completed"));
    assert_eq!(outcome["claimed_orders"].as_array().unwrap().len(), 1);

    let resp =
        test::call_service(&app, test::TestRequest::get().uri("/balance/acme/agent-007").to_request()).await;
    let summary: Value = test::read_body_json(resp).await;
    assert_eq!(summary["balance"]["available"], json!(0));
    assert_eq!(summary["balance"]["claimed"], json!(80_000));
}

#[actix_web::test]
async fn early_webhooks_are_deferred_and_retryable_by_operators() {
    let db = prepare_db().await;
    seed_directory(&db, 10.0).await;
    let app = spawn_app(db.clone(), test_config()).await;

    let notification = json!({ "order_id": "http-400", "txid": "tx-400", "event_type": "Success" });
    let resp = test::call_service(&app, signed_webhook(&notification).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["message"].as_str().unwrap().contains("queued for retry"));

    let order = json!({
        "order_id": "http-400",
        "tenant_id": "acme",
        "customer_id": "cust-4",
        "amount": 100_000,
        "referral_code": "SPRING"
    });
    test::call_service(&app, test::TestRequest::post().uri("/orders").set_json(&order).to_request()).await;

    let event_id = commission_engine::helpers::payment_event_id(
        "http-400",
        "tx-400",
        commission_engine::db_types::PaymentEventType::Success,
    );
    let req = test::TestRequest::post().uri(&format!("/admin/webhooks/{event_id}/retry")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["message"].as_str().unwrap().contains("applied"));

    let resp =
        test::call_service(&app, test::TestRequest::get().uri("/admin/webhooks/dead_letter").to_request()).await;
    let dead: Value = test::read_body_json(resp).await;
    assert_eq!(dead.as_array().unwrap().len(), 0);
}
