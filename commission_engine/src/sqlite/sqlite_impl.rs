//! `SqliteDatabase` is a concrete implementation of a commission ledger backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module.
use std::fmt::Debug;

use acp_common::Money;
use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use super::db::{balances, db_url, directory, new_pool, orders, webhook_events, withdrawals};
use crate::{
    db_types::{
        AgentBalance,
        CommissionStatus,
        NewOrder,
        NewPaymentEvent,
        Order,
        OrderId,
        PaymentEvent,
        ReferralResolution,
        Tenant,
        WithdrawalRequest,
    },
    ledger_api::ledger_objects::OrderQueryFilter,
    traits::{
        BalanceManagement,
        CommissionLedgerDatabase,
        CommissionLedgerError,
        ReferralDirectory,
        WebhookEventManagement,
        WithdrawalManagement,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Runs the embedded schema migrations against this database.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The hold period for the order's tenant, in days. Orders filed under an unregistered tenant release
    /// immediately.
    async fn hold_period_days_for(&self, order: &Order) -> Result<i64, CommissionLedgerError> {
        let mut conn = self.pool.acquire().await?;
        let days = directory::fetch_tenant(&order.tenant_id, &mut conn).await?.map(|t| t.hold_period_days).unwrap_or(0);
        Ok(days)
    }
}

impl CommissionLedgerDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(
        &self,
        order: NewOrder,
        resolution: Option<ReferralResolution>,
    ) -> Result<(Order, bool), CommissionLedgerError> {
        let mut tx = self.pool.begin().await?;
        let result = orders::idempotent_insert(order, resolution, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, CommissionLedgerError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn update_order_amount(&self, order_id: &OrderId, amount: Money) -> Result<Order, CommissionLedgerError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::update_order_amount(order_id, amount, &mut tx).await?;
        tx.commit().await?;
        debug!("🧾️ Order [{order_id}] amount changed to {amount}; commission is now {}", order.commission_amount);
        Ok(order)
    }

    async fn settle_order(&self, order_id: &OrderId) -> Result<Option<Order>, CommissionLedgerError> {
        let order = self
            .fetch_order_by_order_id(order_id)
            .await?
            .ok_or_else(|| CommissionLedgerError::OrderNotFound(order_id.clone()))?;
        let hold_days = self.hold_period_days_for(&order).await?;
        let mut tx = self.pool.begin().await?;
        let settled = orders::settle_order(order_id, hold_days, &mut tx).await?;
        tx.commit().await?;
        Ok(settled)
    }

    async fn release_due_commissions(&self) -> Result<Vec<Order>, CommissionLedgerError> {
        let mut tx = self.pool.begin().await?;
        let released = orders::release_due_commissions(&mut tx).await?;
        tx.commit().await?;
        if !released.is_empty() {
            info!("🧾️ {} commissions released and now available for withdrawal", released.len());
        }
        Ok(released)
    }

    /// Takes a payment confirmation and, in a single atomic transaction,
    /// * marks the order as `Paid`, and
    /// * settles its commission, starting the hold clock.
    /// The commission stays `Pending` (on hold); only the release sweep moves it to `Available`.
    async fn apply_payment_success(&self, order_id: &OrderId) -> Result<Option<Order>, CommissionLedgerError> {
        let Some(order) = self.fetch_order_by_order_id(order_id).await? else {
            return Ok(None);
        };
        let hold_days = self.hold_period_days_for(&order).await?;
        let mut tx = self.pool.begin().await?;
        let changed = orders::mark_order_paid(order_id, &mut tx).await?;
        if changed > 0 {
            debug!("🧾️ Order [{order_id}] marked as paid");
        }
        orders::settle_order(order_id, hold_days, &mut tx).await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn apply_payment_failure(
        &self,
        order_id: &OrderId,
        annul_available: bool,
    ) -> Result<Option<Order>, CommissionLedgerError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::mark_order_failed(order_id, annul_available, &mut tx).await?;
        tx.commit().await?;
        if let Some(o) = &order {
            debug!("🧾️ Order [{order_id}] payment annulled; commission is now {}", o.commission_status);
        }
        Ok(order)
    }

    async fn set_commission_available_at(
        &self,
        order_id: &OrderId,
        available_at: DateTime<Utc>,
    ) -> Result<Order, CommissionLedgerError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::set_commission_available_at(order_id, available_at, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn reset_all_commissions(&self, tenant_id: &str) -> Result<u64, CommissionLedgerError> {
        let mut tx = self.pool.begin().await?;
        if directory::fetch_tenant(tenant_id, &mut tx).await?.is_none() {
            return Err(CommissionLedgerError::TenantNotFound(tenant_id.to_string()));
        }
        let count = orders::reset_all_commissions(tenant_id, &mut tx).await?;
        tx.commit().await?;
        warn!("🧾️ All commissions for tenant [{tenant_id}] were reset. {count} orders affected.");
        Ok(count)
    }

    async fn close(&mut self) -> Result<(), CommissionLedgerError> {
        self.pool.close().await;
        Ok(())
    }
}

impl BalanceManagement for SqliteDatabase {
    async fn balance_for_agent(&self, agent_id: &str, tenant_id: &str) -> Result<AgentBalance, CommissionLedgerError> {
        let mut conn = self.pool.acquire().await?;
        balances::balance_for_agent(agent_id, tenant_id, &mut conn).await
    }

    async fn commission_orders_for_agent(
        &self,
        agent_id: &str,
        tenant_id: &str,
        status: Option<CommissionStatus>,
    ) -> Result<Vec<Order>, CommissionLedgerError> {
        let mut conn = self.pool.acquire().await?;
        balances::commission_orders_for_agent(agent_id, tenant_id, status, &mut conn).await
    }

    async fn earliest_release_at(
        &self,
        agent_id: &str,
        tenant_id: &str,
    ) -> Result<Option<DateTime<Utc>>, CommissionLedgerError> {
        let mut conn = self.pool.acquire().await?;
        balances::earliest_release_at(agent_id, tenant_id, &mut conn).await
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, CommissionLedgerError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::search_orders(query, &mut conn).await?;
        Ok(orders)
    }
}

impl WithdrawalManagement for SqliteDatabase {
    async fn create_withdrawal_request(
        &self,
        agent_id: &str,
        tenant_id: &str,
        amount: Money,
    ) -> Result<WithdrawalRequest, CommissionLedgerError> {
        let mut tx = self.pool.begin().await?;
        let request = withdrawals::create_request(agent_id, tenant_id, amount, &mut tx).await?;
        tx.commit().await?;
        Ok(request)
    }

    /// The claim step runs inside one transaction. If any order fails its compare-and-set claim, the whole
    /// approval rolls back and the request stays `Pending`.
    async fn approve_withdrawal(
        &self,
        request_id: i64,
        processed_by: &str,
    ) -> Result<(WithdrawalRequest, Vec<Order>), CommissionLedgerError> {
        let mut tx = self.pool.begin().await?;
        let (request, claimed) = withdrawals::approve_request(request_id, processed_by, &mut tx).await?;
        tx.commit().await?;
        info!(
            "🏧️ Withdrawal #{request_id} approved by {processed_by}. {} claimed across {} orders.",
            claimed.iter().map(|o| o.commission_amount).sum::<Money>(),
            claimed.len()
        );
        Ok((request, claimed))
    }

    async fn reject_withdrawal(
        &self,
        request_id: i64,
        processed_by: &str,
        reason: &str,
    ) -> Result<WithdrawalRequest, CommissionLedgerError> {
        let mut tx = self.pool.begin().await?;
        let request = withdrawals::reject_request(request_id, processed_by, reason, &mut tx).await?;
        tx.commit().await?;
        info!("🏧️ Withdrawal #{request_id} rejected by {processed_by}: {reason}");
        Ok(request)
    }

    async fn fetch_withdrawal(&self, request_id: i64) -> Result<Option<WithdrawalRequest>, CommissionLedgerError> {
        let mut conn = self.pool.acquire().await?;
        withdrawals::fetch_request(request_id, &mut conn).await
    }

    async fn withdrawals_for_agent(
        &self,
        agent_id: &str,
        tenant_id: &str,
    ) -> Result<Vec<WithdrawalRequest>, CommissionLedgerError> {
        let mut conn = self.pool.acquire().await?;
        withdrawals::requests_for_agent(agent_id, tenant_id, &mut conn).await
    }
}

impl WebhookEventManagement for SqliteDatabase {
    async fn insert_event(&self, event: NewPaymentEvent) -> Result<(PaymentEvent, bool), CommissionLedgerError> {
        let mut tx = self.pool.begin().await?;
        let result = webhook_events::idempotent_insert(event, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_event(&self, event_id: &str) -> Result<Option<PaymentEvent>, CommissionLedgerError> {
        let mut conn = self.pool.acquire().await?;
        webhook_events::fetch_event(event_id, &mut conn).await
    }

    async fn mark_event_processed(&self, event_id: &str) -> Result<PaymentEvent, CommissionLedgerError> {
        let mut tx = self.pool.begin().await?;
        let event = webhook_events::mark_processed(event_id, &mut tx).await?;
        tx.commit().await?;
        Ok(event)
    }

    async fn record_event_failure(&self, event_id: &str, error: &str) -> Result<PaymentEvent, CommissionLedgerError> {
        let mut tx = self.pool.begin().await?;
        let event = webhook_events::record_failure(event_id, error, &mut tx).await?;
        tx.commit().await?;
        Ok(event)
    }

    async fn fetch_due_events(&self, limit: i64) -> Result<Vec<PaymentEvent>, CommissionLedgerError> {
        let mut conn = self.pool.acquire().await?;
        webhook_events::fetch_due(limit, &mut conn).await
    }

    async fn fetch_dead_letter_events(&self) -> Result<Vec<PaymentEvent>, CommissionLedgerError> {
        let mut conn = self.pool.acquire().await?;
        webhook_events::fetch_dead_letter(&mut conn).await
    }

    async fn requeue_event(&self, event_id: &str) -> Result<PaymentEvent, CommissionLedgerError> {
        let mut tx = self.pool.begin().await?;
        let event = webhook_events::requeue(event_id, &mut tx).await?;
        tx.commit().await?;
        Ok(event)
    }

    async fn ignore_event(&self, event_id: &str) -> Result<PaymentEvent, CommissionLedgerError> {
        let mut tx = self.pool.begin().await?;
        let event = webhook_events::ignore(event_id, &mut tx).await?;
        tx.commit().await?;
        Ok(event)
    }
}

impl ReferralDirectory for SqliteDatabase {
    async fn resolve_referral(
        &self,
        code: &str,
        tenant_id: &str,
    ) -> Result<Option<ReferralResolution>, CommissionLedgerError> {
        let mut conn = self.pool.acquire().await?;
        directory::resolve_referral(code, tenant_id, &mut conn).await
    }

    async fn fetch_tenant(&self, tenant_id: &str) -> Result<Option<Tenant>, CommissionLedgerError> {
        let mut conn = self.pool.acquire().await?;
        directory::fetch_tenant(tenant_id, &mut conn).await
    }

    async fn upsert_tenant(
        &self,
        tenant_id: &str,
        default_commission_percent: f64,
        hold_period_days: i64,
    ) -> Result<Tenant, CommissionLedgerError> {
        let mut tx = self.pool.begin().await?;
        let tenant = directory::upsert_tenant(tenant_id, default_commission_percent, hold_period_days, &mut tx).await?;
        tx.commit().await?;
        Ok(tenant)
    }

    async fn upsert_referral_code(
        &self,
        code: &str,
        tenant_id: &str,
        agent_id: &str,
        commission_percent: Option<f64>,
    ) -> Result<(), CommissionLedgerError> {
        let mut tx = self.pool.begin().await?;
        directory::upsert_referral_code(code, tenant_id, agent_id, commission_percent, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }
}
