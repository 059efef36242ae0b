use std::fmt::Debug;

use acp_common::Money;
use chrono::{DateTime, Utc};
use log::*;

use crate::{
    db_types::{NewOrder, Order, OrderId, Tenant},
    events::{CommissionAvailableEvent, CommissionSettledEvent, EventProducers},
    traits::{CommissionLedgerDatabase, CommissionLedgerError, ReferralDirectory},
};

/// `CommissionFlowApi` is the primary API for the commission lifecycle: order intake with referral resolution,
/// settlement, the release sweep, and the explicit admin overrides.
pub struct CommissionFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for CommissionFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CommissionFlowApi")
    }
}

impl<B> CommissionFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> CommissionFlowApi<B>
where B: CommissionLedgerDatabase + ReferralDirectory
{
    /// Submit a new order.
    ///
    /// The referral code, if present, is resolved against the tenant's directory first. An unknown code is not an
    /// error; the order is simply created without commission. The insertion is idempotent on the external order
    /// id; the second element of the result is `false` when the order already existed.
    pub async fn process_new_order(&self, order: NewOrder) -> Result<(Order, bool), CommissionLedgerError> {
        let resolution = match &order.referral_code {
            Some(code) => {
                let resolution = self.db.resolve_referral(code, &order.tenant_id).await?;
                if resolution.is_none() {
                    info!(
                        "🧾️ Referral code [{code}] on order [{}] does not resolve for tenant [{}]. The order will \
                         not earn commission.",
                        order.order_id, order.tenant_id
                    );
                }
                resolution
            },
            None => None,
        };
        let (order, inserted) = self.db.insert_order(order, resolution).await?;
        if inserted {
            debug!(
                "🧾️ Order [{}] created for tenant [{}]. Commission: {} ({}), agent: {:?}",
                order.order_id, order.tenant_id, order.commission_amount, order.commission_status, order.ref_agent_id
            );
        } else {
            debug!("🧾️ Order [{}] was already recorded. Returning the stored order.", order.order_id);
        }
        Ok((order, inserted))
    }

    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, CommissionLedgerError> {
        self.db.fetch_order_by_order_id(order_id).await
    }

    /// The external settlement signal. A no-op (returning the stored order unchanged) when the order is unpaid,
    /// carries no commission, or is already settled.
    pub async fn settle_order(&self, order_id: &OrderId) -> Result<Order, CommissionLedgerError> {
        match self.db.settle_order(order_id).await? {
            Some(order) => {
                self.call_commission_settled_hook(&order).await;
                Ok(order)
            },
            None => {
                let order = self
                    .db
                    .fetch_order_by_order_id(order_id)
                    .await?
                    .ok_or_else(|| CommissionLedgerError::OrderNotFound(order_id.clone()))?;
                debug!(
                    "🧾️ Settlement signal for order [{order_id}] was a no-op ({}, {})",
                    order.payment_status, order.commission_status
                );
                Ok(order)
            },
        }
    }

    /// Pre-payment amount update; the commission amount is re-derived with the percent captured at order time.
    pub async fn update_order_amount(&self, order_id: &OrderId, amount: Money) -> Result<Order, CommissionLedgerError> {
        self.db.update_order_amount(order_id, amount).await
    }

    /// Runs the release sweep and notifies subscribers for every commission that became available.
    pub async fn release_due_commissions(&self) -> Result<Vec<Order>, CommissionLedgerError> {
        let released = self.db.release_due_commissions().await?;
        self.call_commission_available_hook(&released).await;
        Ok(released)
    }

    /// Admin override of a single order's release date.
    pub async fn set_commission_available_at(
        &self,
        order_id: &OrderId,
        available_at: DateTime<Utc>,
    ) -> Result<Order, CommissionLedgerError> {
        let order = self.db.set_commission_available_at(order_id, available_at).await?;
        warn!("🧾️ Release date for order [{order_id}] was manually set to {available_at}");
        Ok(order)
    }

    /// Admin bulk reset of every commission for a tenant. Irreversible.
    pub async fn reset_all_commissions(&self, tenant_id: &str) -> Result<u64, CommissionLedgerError> {
        self.db.reset_all_commissions(tenant_id).await
    }

    pub async fn upsert_tenant(
        &self,
        tenant_id: &str,
        default_commission_percent: f64,
        hold_period_days: i64,
    ) -> Result<Tenant, CommissionLedgerError> {
        self.db.upsert_tenant(tenant_id, default_commission_percent, hold_period_days).await
    }

    pub async fn upsert_referral_code(
        &self,
        code: &str,
        tenant_id: &str,
        agent_id: &str,
        commission_percent: Option<f64>,
    ) -> Result<(), CommissionLedgerError> {
        self.db.upsert_referral_code(code, tenant_id, agent_id, commission_percent).await
    }

    async fn call_commission_settled_hook(&self, order: &Order) {
        for emitter in &self.producers.commission_settled_producer {
            debug!("🧾️ Notifying commission settled hook subscribers");
            let event = CommissionSettledEvent::new(order.clone());
            emitter.publish_event(event).await;
        }
    }

    async fn call_commission_available_hook(&self, released: &[Order]) {
        for emitter in &self.producers.commission_available_producer {
            debug!("🧾️ Notifying commission available hook subscribers");
            for order in released {
                let event = CommissionAvailableEvent::new(order.clone());
                emitter.publish_event(event).await;
            }
        }
    }
}
