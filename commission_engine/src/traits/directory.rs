use crate::{
    db_types::{ReferralResolution, Tenant},
    traits::CommissionLedgerError,
};

/// Tenant/agent directory: resolves which agent a referral code belongs to and what commission policy applies.
#[allow(async_fn_in_trait)]
pub trait ReferralDirectory: Clone {
    /// Resolves a referral code within a tenant to the owning agent and the effective commission percent (the
    /// code's own override, falling back to the tenant default). Unknown codes resolve to `None`; commission is
    /// never silently invented.
    async fn resolve_referral(
        &self,
        code: &str,
        tenant_id: &str,
    ) -> Result<Option<ReferralResolution>, CommissionLedgerError>;

    async fn fetch_tenant(&self, tenant_id: &str) -> Result<Option<Tenant>, CommissionLedgerError>;

    /// Creates or updates a tenant's commission policy.
    async fn upsert_tenant(
        &self,
        tenant_id: &str,
        default_commission_percent: f64,
        hold_period_days: i64,
    ) -> Result<Tenant, CommissionLedgerError>;

    /// Registers (or re-points) a referral code for an agent. `commission_percent` overrides the tenant default
    /// when given.
    async fn upsert_referral_code(
        &self,
        code: &str,
        tenant_id: &str,
        agent_id: &str,
        commission_percent: Option<f64>,
    ) -> Result<(), CommissionLedgerError>;
}
