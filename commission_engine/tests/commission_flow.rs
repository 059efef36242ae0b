//! End-to-end commission lifecycle tests against a real SQLite backend.
mod support;

use acp_common::Money;
use chrono::{Duration, Utc};
use commission_engine::{
    db_types::{CommissionStatus, NewOrder, OrderId, PaymentStatus},
    events::EventProducers,
    traits::{BalanceManagement, CommissionLedgerDatabase, CommissionLedgerError, ReferralDirectory},
    CommissionFlowApi,
};
use support::{create_released_order, prepare_test_db, random_db_url, seed_directory};

#[tokio::test]
async fn full_commission_lifecycle() {
    let url = random_db_url();
    let db = prepare_test_db(&url).await;
    seed_directory(&db, "acme", "SPRING10", "agent-1", 10.0).await;
    let api = CommissionFlowApi::new(db.clone(), EventProducers::default());

    // 1000.00 at 10% earns 100.00, held until payment and release.
    let new_order = NewOrder::new(OrderId::from("ord-1001"), "acme", "cust-7", Money::from_major(1000))
        .with_referral_code("SPRING10");
    let (order, inserted) = api.process_new_order(new_order).await.unwrap();
    assert!(inserted);
    assert_eq!(order.commission_amount, Money::from_major(100));
    assert_eq!(order.commission_status, CommissionStatus::Pending);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert!(!order.commission_settled);

    // Nothing is available before payment; the sweep has nothing to do.
    assert!(api.release_due_commissions().await.unwrap().is_empty());
    let balance = db.balance_for_agent("agent-1", "acme").await.unwrap();
    assert_eq!(balance.available, Money::from(0));
    assert_eq!(balance.on_hold, Money::from_major(100));

    // Payment confirmation settles the commission and starts the (zero-day) hold clock.
    let order = db.apply_payment_success(&OrderId::from("ord-1001")).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert!(order.commission_settled);
    assert_eq!(order.commission_status, CommissionStatus::Pending);
    assert!(order.commission_available_at.is_some());

    // The sweep releases it, exactly once.
    let released = api.release_due_commissions().await.unwrap();
    assert_eq!(released.len(), 1);
    assert_eq!(released[0].commission_status, CommissionStatus::Available);
    assert!(api.release_due_commissions().await.unwrap().is_empty());

    let balance = db.balance_for_agent("agent-1", "acme").await.unwrap();
    assert_eq!(balance.available, Money::from_major(100));
    assert_eq!(balance.on_hold, Money::from(0));
    assert_eq!(balance.total_assigned(), Money::from_major(100));
}

#[tokio::test]
async fn failed_payment_cancels_commission_forever() {
    let url = random_db_url();
    let db = prepare_test_db(&url).await;
    seed_directory(&db, "acme", "SPRING10", "agent-1", 10.0).await;
    let api = CommissionFlowApi::new(db.clone(), EventProducers::default());

    let new_order =
        NewOrder::new(OrderId::from("ord-2001"), "acme", "cust-2", Money::from_major(500)).with_referral_code("SPRING10");
    let (order, _) = api.process_new_order(new_order).await.unwrap();
    assert_eq!(order.commission_status, CommissionStatus::Pending);

    let order = db.apply_payment_failure(&order.order_id, false).await.unwrap().unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Failed);
    assert_eq!(order.commission_status, CommissionStatus::Cancelled);

    // Cancellation is terminal: settlement and the sweep are both no-ops now.
    let order = api.settle_order(&order.order_id).await.unwrap();
    assert_eq!(order.commission_status, CommissionStatus::Cancelled);
    assert!(!order.commission_settled);
    assert!(api.release_due_commissions().await.unwrap().is_empty());

    let balance = db.balance_for_agent("agent-1", "acme").await.unwrap();
    assert_eq!(balance.available, Money::from(0));
    assert_eq!(balance.cancelled, Money::from_major(50));
}

#[tokio::test]
async fn orders_without_referral_never_earn_commission() {
    let url = random_db_url();
    let db = prepare_test_db(&url).await;
    seed_directory(&db, "acme", "SPRING10", "agent-1", 10.0).await;
    let api = CommissionFlowApi::new(db.clone(), EventProducers::default());

    let (no_code, _) =
        api.process_new_order(NewOrder::new(OrderId::from("ord-3001"), "acme", "cust-1", Money::from_major(100))).await.unwrap();
    let bad_code = NewOrder::new(OrderId::from("ord-3002"), "acme", "cust-1", Money::from_major(100))
        .with_referral_code("NO-SUCH-CODE");
    let (bad_code, _) = api.process_new_order(bad_code).await.unwrap();

    for order in [no_code, bad_code] {
        assert_eq!(order.commission_status, CommissionStatus::None);
        assert!(order.ref_agent_id.is_none());
        assert_eq!(order.commission_amount, Money::from(0));
        // Payment and settlement change nothing for a no-commission order.
        db.apply_payment_success(&order.order_id).await.unwrap();
        let order = api.settle_order(&order.order_id).await.unwrap();
        assert_eq!(order.commission_status, CommissionStatus::None);
        assert!(!order.commission_settled);
    }
    assert!(api.release_due_commissions().await.unwrap().is_empty());
}

#[tokio::test]
async fn order_insertion_is_idempotent() {
    let url = random_db_url();
    let db = prepare_test_db(&url).await;
    seed_directory(&db, "acme", "SPRING10", "agent-1", 10.0).await;
    let api = CommissionFlowApi::new(db.clone(), EventProducers::default());

    let order =
        NewOrder::new(OrderId::from("ord-4001"), "acme", "cust-1", Money::from_major(250)).with_referral_code("SPRING10");
    let (first, inserted) = api.process_new_order(order.clone()).await.unwrap();
    assert!(inserted);
    let (second, inserted) = api.process_new_order(order).await.unwrap();
    assert!(!inserted);
    assert_eq!(first.id, second.id);
    assert_eq!(first.commission_amount, second.commission_amount);

    let balance = db.balance_for_agent("agent-1", "acme").await.unwrap();
    assert_eq!(balance.total_assigned(), Money::from_major(25));
}

#[tokio::test]
async fn racing_submissions_of_one_order_insert_it_once() {
    let url = random_db_url();
    let db = prepare_test_db(&url).await;
    seed_directory(&db, "acme", "SPRING10", "agent-1", 10.0).await;

    // The storefront double-fires the same order. Neither call may surface an error; exactly one inserts.
    let make_order = || {
        NewOrder::new(OrderId::from("ord-4101"), "acme", "cust-1", Money::from_major(250)).with_referral_code("SPRING10")
    };
    let api_a = CommissionFlowApi::new(db.clone(), EventProducers::default());
    let api_b = CommissionFlowApi::new(db.clone(), EventProducers::default());
    let (order_a, order_b) = (make_order(), make_order());
    let a = tokio::spawn(async move { api_a.process_new_order(order_a).await });
    let b = tokio::spawn(async move { api_b.process_new_order(order_b).await });
    let (first, inserted_a) = a.await.unwrap().unwrap();
    let (second, inserted_b) = b.await.unwrap().unwrap();

    assert!(inserted_a ^ inserted_b, "exactly one of the two submissions may insert");
    assert_eq!(first.id, second.id);
    let balance = db.balance_for_agent("agent-1", "acme").await.unwrap();
    assert_eq!(balance.total_assigned(), Money::from_major(25));
}

#[tokio::test]
async fn amount_updates_rederive_commission_until_payment() {
    let url = random_db_url();
    let db = prepare_test_db(&url).await;
    seed_directory(&db, "acme", "SPRING10", "agent-1", 12.0).await;
    let api = CommissionFlowApi::new(db.clone(), EventProducers::default());

    let order =
        NewOrder::new(OrderId::from("ord-5001"), "acme", "cust-1", Money::from_major(100)).with_referral_code("SPRING10");
    let (order, _) = api.process_new_order(order).await.unwrap();
    assert_eq!(order.commission_amount, Money::from_major(12));

    let order = api.update_order_amount(&order.order_id, Money::from_major(200)).await.unwrap();
    assert_eq!(order.amount, Money::from_major(200));
    assert_eq!(order.commission_amount, Money::from_major(24));
    assert_eq!(order.commission_percent, 12.0);

    // Once paid and settled, the amount is frozen.
    db.apply_payment_success(&order.order_id).await.unwrap();
    let err = api.update_order_amount(&order.order_id, Money::from_major(300)).await.unwrap_err();
    assert!(matches!(err, CommissionLedgerError::AmountUpdateForbidden(_)));
}

#[tokio::test]
async fn manual_release_date_override() {
    let url = random_db_url();
    let db = prepare_test_db(&url).await;
    seed_directory(&db, "acme", "SPRING10", "agent-1", 10.0).await;
    let api = CommissionFlowApi::new(db.clone(), EventProducers::default());

    let order =
        NewOrder::new(OrderId::from("ord-6001"), "acme", "cust-1", Money::from_major(100)).with_referral_code("SPRING10");
    let (order, _) = api.process_new_order(order).await.unwrap();
    db.apply_payment_success(&order.order_id).await.unwrap();

    // Pushing the release date into the future keeps the commission on hold.
    let future = Utc::now() + Duration::days(30);
    let order = api.set_commission_available_at(&order.order_id, future).await.unwrap();
    assert_eq!(order.commission_status, CommissionStatus::Pending);
    assert!(api.release_due_commissions().await.unwrap().is_empty());

    // Pulling it back releases on the next sweep.
    let past = Utc::now() - Duration::days(1);
    api.set_commission_available_at(&order.order_id, past).await.unwrap();
    let released = api.release_due_commissions().await.unwrap();
    assert_eq!(released.len(), 1);

    // The override is only legal while the commission is held.
    let err = api.set_commission_available_at(&order.order_id, future).await.unwrap_err();
    assert!(matches!(err, CommissionLedgerError::InvalidTransition { .. }));
}

#[tokio::test]
async fn reset_cancels_unclaimed_commissions() {
    let url = random_db_url();
    let db = prepare_test_db(&url).await;
    seed_directory(&db, "acme", "SPRING10", "agent-1", 10.0).await;
    let api = CommissionFlowApi::new(db.clone(), EventProducers::default());

    create_released_order(&db, "acme", "SPRING10", "ord-7001", Money::from_major(100)).await;
    let held = NewOrder::new(OrderId::from("ord-7002"), "acme", "cust-1", Money::from_major(100))
        .with_referral_code("SPRING10");
    api.process_new_order(held).await.unwrap();

    let touched = api.reset_all_commissions("acme").await.unwrap();
    assert_eq!(touched, 2);
    for oid in ["ord-7001", "ord-7002"] {
        let order = db.fetch_order_by_order_id(&OrderId::from(oid)).await.unwrap().unwrap();
        assert_eq!(order.commission_status, CommissionStatus::Cancelled);
        assert!(!order.commission_settled);
        assert!(order.commission_available_at.is_none());
    }
    let balance = db.balance_for_agent("agent-1", "acme").await.unwrap();
    assert_eq!(balance.available, Money::from(0));

    // Unknown tenants are rejected rather than silently resetting nothing.
    let err = api.reset_all_commissions("no-such-tenant").await.unwrap_err();
    assert!(matches!(err, CommissionLedgerError::TenantNotFound(_)));
}

#[tokio::test]
async fn tenant_default_and_code_override_percentages() {
    let url = random_db_url();
    let db = prepare_test_db(&url).await;
    let api = CommissionFlowApi::new(db.clone(), EventProducers::default());

    api.upsert_tenant("acme", 12.0, 0).await.unwrap();
    // The write must be visible to the very next read on another pool connection.
    let tenant = db.fetch_tenant("acme").await.unwrap().unwrap();
    assert_eq!(tenant.default_commission_percent, 12.0);
    api.upsert_referral_code("DEFAULT", "acme", "agent-1", None).await.unwrap();
    api.upsert_referral_code("VIP", "acme", "agent-1", Some(20.0)).await.unwrap();

    let (order, _) = api
        .process_new_order(
            NewOrder::new(OrderId::from("ord-8001"), "acme", "c", Money::from_major(100)).with_referral_code("DEFAULT"),
        )
        .await
        .unwrap();
    assert_eq!(order.commission_percent, 12.0);
    assert_eq!(order.commission_amount, Money::from_major(12));

    let (order, _) = api
        .process_new_order(
            NewOrder::new(OrderId::from("ord-8002"), "acme", "c", Money::from_major(100)).with_referral_code("VIP"),
        )
        .await
        .unwrap();
    assert_eq!(order.commission_percent, 20.0);
    assert_eq!(order.commission_amount, Money::from_major(20));

    // Codes can only be registered under an existing tenant.
    let err = api.upsert_referral_code("X", "ghost-tenant", "agent-1", None).await.unwrap_err();
    assert!(matches!(err, CommissionLedgerError::TenantNotFound(_)));
}
