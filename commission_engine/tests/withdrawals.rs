//! Withdrawal request and approval tests, including the concurrency guarantee.
mod support;

use acp_common::Money;
use commission_engine::{
    db_types::{CommissionStatus, WithdrawalStatus},
    events::EventProducers,
    traits::{BalanceManagement, CommissionLedgerDatabase, CommissionLedgerError, WithdrawalManagement},
    WithdrawalApi,
};
use support::{create_released_order, prepare_test_db, random_db_url, seed_directory};

#[tokio::test]
async fn requests_exceeding_available_balance_are_rejected() {
    let url = random_db_url();
    let db = prepare_test_db(&url).await;
    seed_directory(&db, "acme", "GOLD", "agent-1", 10.0).await;
    create_released_order(&db, "acme", "GOLD", "ord-w100", Money::from_major(1000)).await;
    let api = WithdrawalApi::new(db.clone(), EventProducers::default());

    // Available is 100.00; asking for 100.01 must fail.
    let err = api.request_withdrawal("agent-1", "acme", Money::from(10_001)).await.unwrap_err();
    assert!(matches!(err, CommissionLedgerError::InsufficientBalance { .. }));

    let request = api.request_withdrawal("agent-1", "acme", Money::from_major(100)).await.unwrap();
    assert_eq!(request.status, WithdrawalStatus::Pending);
    assert_eq!(request.amount, Money::from_major(100));

    // The pending request reserves the balance.
    let balance = db.balance_for_agent("agent-1", "acme").await.unwrap();
    assert_eq!(balance.available, Money::from(0));
    assert_eq!(balance.pending_withdrawals, Money::from_major(100));
}

#[tokio::test]
async fn only_one_open_request_per_agent() {
    let url = random_db_url();
    let db = prepare_test_db(&url).await;
    seed_directory(&db, "acme", "GOLD", "agent-1", 10.0).await;
    create_released_order(&db, "acme", "GOLD", "ord-w200", Money::from_major(2000)).await;
    let api = WithdrawalApi::new(db.clone(), EventProducers::default());

    let first = api.request_withdrawal("agent-1", "acme", Money::from_major(50)).await.unwrap();
    // Plenty of balance remains, but a second request must still wait for the first to be processed.
    let err = api.request_withdrawal("agent-1", "acme", Money::from_major(50)).await.unwrap_err();
    assert!(matches!(err, CommissionLedgerError::WithdrawalAlreadyOpen { request_id } if request_id == first.id));

    // Rejection reopens the door.
    api.reject_withdrawal(first.id, "ops", "wrong bank details").await.unwrap();
    api.request_withdrawal("agent-1", "acme", Money::from_major(50)).await.unwrap();
}

#[tokio::test]
async fn concurrent_requests_cannot_overdraw() {
    let url = random_db_url();
    let db = prepare_test_db(&url).await;
    seed_directory(&db, "acme", "GOLD", "agent-1", 10.0).await;
    create_released_order(&db, "acme", "GOLD", "ord-w300", Money::from_major(1000)).await;

    // Two requests race for the same 100.00. Exactly one may win, whether it fails the balance check or the
    // one-open-request rule.
    let db_a = db.clone();
    let db_b = db.clone();
    let a = tokio::spawn(async move { db_a.create_withdrawal_request("agent-1", "acme", Money::from_major(100)).await });
    let b = tokio::spawn(async move { db_b.create_withdrawal_request("agent-1", "acme", Money::from_major(100)).await });
    let results = [a.await.unwrap(), b.await.unwrap()];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one of two racing withdrawal requests may succeed");

    let balance = db.balance_for_agent("agent-1", "acme").await.unwrap();
    assert_eq!(balance.available, Money::from(0));
    assert_eq!(balance.pending_withdrawals, Money::from_major(100));
}

#[tokio::test]
async fn approval_claims_whole_orders_oldest_first() {
    let url = random_db_url();
    let db = prepare_test_db(&url).await;
    seed_directory(&db, "acme", "GOLD", "agent-1", 10.0).await;
    // Three available commissions: 30.00, 30.00 and 60.00, oldest first.
    create_released_order(&db, "acme", "GOLD", "ord-w401", Money::from_major(300)).await;
    create_released_order(&db, "acme", "GOLD", "ord-w402", Money::from_major(300)).await;
    create_released_order(&db, "acme", "GOLD", "ord-w403", Money::from_major(600)).await;
    let api = WithdrawalApi::new(db.clone(), EventProducers::default());

    let request = api.request_withdrawal("agent-1", "acme", Money::from_major(50)).await.unwrap();
    let (request, claimed) = api.approve_withdrawal(request.id, "ops").await.unwrap();
    assert_eq!(request.status, WithdrawalStatus::Completed);
    assert_eq!(request.processed_by.as_deref(), Some("ops"));

    // Whole orders are claimed: the two oldest cover 50.00 with 60.00.
    let claimed_ids: Vec<&str> = claimed.iter().map(|o| o.order_id.as_str()).collect();
    assert_eq!(claimed_ids, vec!["ord-w401", "ord-w402"]);
    assert!(claimed.iter().all(|o| o.commission_status == CommissionStatus::Claimed));

    let balance = db.balance_for_agent("agent-1", "acme").await.unwrap();
    assert_eq!(balance.claimed, Money::from_major(60));
    assert_eq!(balance.available, Money::from_major(60));
    assert_eq!(balance.total_assigned(), Money::from_major(120));
}

#[tokio::test]
async fn stale_requests_fail_without_claiming_anything() {
    let url = random_db_url();
    let db = prepare_test_db(&url).await;
    seed_directory(&db, "acme", "GOLD", "agent-1", 10.0).await;
    let order = create_released_order(&db, "acme", "GOLD", "ord-w500", Money::from_major(1000)).await;
    let api = WithdrawalApi::new(db.clone(), EventProducers::default());

    let request = api.request_withdrawal("agent-1", "acme", Money::from_major(100)).await.unwrap();
    // A chargeback lands between request and approval and annuls the released commission.
    db.apply_payment_failure(&order.order_id, true).await.unwrap();

    let err = api.approve_withdrawal(request.id, "ops").await.unwrap_err();
    assert!(matches!(err, CommissionLedgerError::StaleWithdrawalRequest { .. }));

    // Nothing was claimed and the request is still pending, so the operator can reject it cleanly.
    let request = api.fetch_withdrawal(request.id).await.unwrap().unwrap();
    assert_eq!(request.status, WithdrawalStatus::Pending);
    let balance = db.balance_for_agent("agent-1", "acme").await.unwrap();
    assert_eq!(balance.claimed, Money::from(0));
    api.reject_withdrawal(request.id, "ops", "commission was charged back").await.unwrap();
}

#[tokio::test]
async fn annulled_commissions_never_drive_the_balance_negative() {
    let url = random_db_url();
    let db = prepare_test_db(&url).await;
    seed_directory(&db, "acme", "GOLD", "agent-1", 10.0).await;
    let order = create_released_order(&db, "acme", "GOLD", "ord-w700", Money::from_major(1000)).await;
    let api = WithdrawalApi::new(db.clone(), EventProducers::default());

    // The full 100.00 is reserved, then a refund annuls the commission backing it.
    api.request_withdrawal("agent-1", "acme", Money::from_major(100)).await.unwrap();
    db.apply_payment_failure(&order.order_id, true).await.unwrap();

    // The stale reservation exceeds what is left; the reported balance floors at zero.
    let balance = db.balance_for_agent("agent-1", "acme").await.unwrap();
    assert_eq!(balance.available, Money::from(0));
    assert_eq!(balance.pending_withdrawals, Money::from_major(100));
    assert_eq!(balance.cancelled, Money::from_major(100));
}

#[tokio::test]
async fn processing_is_limited_to_pending_requests() {
    let url = random_db_url();
    let db = prepare_test_db(&url).await;
    seed_directory(&db, "acme", "GOLD", "agent-1", 10.0).await;
    create_released_order(&db, "acme", "GOLD", "ord-w600", Money::from_major(1000)).await;
    let api = WithdrawalApi::new(db.clone(), EventProducers::default());

    let request = api.request_withdrawal("agent-1", "acme", Money::from_major(100)).await.unwrap();
    let (request, _) = api.approve_withdrawal(request.id, "ops").await.unwrap();

    let err = api.approve_withdrawal(request.id, "ops").await.unwrap_err();
    assert!(matches!(err, CommissionLedgerError::WithdrawalNotPending(_)));
    let err = api.reject_withdrawal(request.id, "ops", "too late").await.unwrap_err();
    assert!(matches!(err, CommissionLedgerError::WithdrawalNotPending(_)));
    let err = api.approve_withdrawal(9999, "ops").await.unwrap_err();
    assert!(matches!(err, CommissionLedgerError::WithdrawalNotFound(9999)));

    let history = api.withdrawals_for_agent("agent-1", "acme").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, WithdrawalStatus::Completed);
}
