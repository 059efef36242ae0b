//! Shared preparation for the integration tests: a fresh, fully-migrated SQLite database per test.
use acp_common::Money;
use commission_engine::{
    db_types::{NewOrder, Order, OrderId},
    traits::{CommissionLedgerDatabase, ReferralDirectory},
    SqliteDatabase,
};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub fn random_db_url() -> String {
    format!("sqlite://{}/acp_test_{}.db", std::env::temp_dir().display(), rand::random::<u64>())
}

pub async fn prepare_test_db(url: &str) -> SqliteDatabase {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    if let Err(e) = Sqlite::drop_database(url).await {
        debug!("Error dropping database {url}: {e:?}");
    }
    Sqlite::create_database(url).await.expect("Error creating test database");
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error creating connection to database");
    db.migrate().await.expect("Error running DB migrations");
    info!("🚀️ Test database ready at {url}");
    db
}

/// Registers a tenant with a zero-day hold and a referral code owned by `agent_id`.
pub async fn seed_directory(db: &SqliteDatabase, tenant_id: &str, code: &str, agent_id: &str, percent: f64) {
    db.upsert_tenant(tenant_id, percent, 0).await.expect("Error creating tenant");
    db.upsert_referral_code(code, tenant_id, agent_id, None).await.expect("Error creating referral code");
}

/// Creates an order attributed through `code`, confirms its payment, and runs the release sweep so its commission
/// is `Available`.
pub async fn create_released_order(
    db: &SqliteDatabase,
    tenant_id: &str,
    code: &str,
    order_id: &str,
    amount: Money,
) -> Order {
    let new_order = NewOrder::new(OrderId::from(order_id), tenant_id, "cust-1", amount).with_referral_code(code);
    let resolution = db.resolve_referral(code, tenant_id).await.expect("Error resolving referral");
    let (order, _) = db.insert_order(new_order, resolution).await.expect("Error inserting order");
    db.apply_payment_success(&order.order_id).await.expect("Error confirming payment");
    db.release_due_commissions().await.expect("Error releasing commissions");
    db.fetch_order_by_order_id(&order.order_id).await.expect("Error fetching order").expect("Order vanished")
}
