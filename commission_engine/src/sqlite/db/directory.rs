use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{ReferralResolution, Tenant},
    traits::CommissionLedgerError,
};

/// Resolves a referral code within a tenant. The code's own commission override wins; otherwise the tenant
/// default applies. Unknown codes resolve to `None` and the order earns no commission.
pub async fn resolve_referral(
    code: &str,
    tenant_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<ReferralResolution>, CommissionLedgerError> {
    let resolution = sqlx::query_as(
        r#"
        SELECT rc.agent_id, COALESCE(rc.commission_percent, t.default_commission_percent) AS commission_percent
        FROM referral_codes rc
        JOIN tenants t ON t.tenant_id = rc.tenant_id
        WHERE rc.tenant_id = $1 AND rc.code = $2
        "#,
    )
    .bind(tenant_id)
    .bind(code)
    .fetch_optional(conn)
    .await?;
    Ok(resolution)
}

pub async fn fetch_tenant(tenant_id: &str, conn: &mut SqliteConnection) -> Result<Option<Tenant>, CommissionLedgerError> {
    let tenant = sqlx::query_as("SELECT * FROM tenants WHERE tenant_id = $1")
        .bind(tenant_id)
        .fetch_optional(conn)
        .await?;
    Ok(tenant)
}

pub async fn upsert_tenant(
    tenant_id: &str,
    default_commission_percent: f64,
    hold_period_days: i64,
    conn: &mut SqliteConnection,
) -> Result<Tenant, CommissionLedgerError> {
    let tenant: Tenant = sqlx::query_as(
        r#"
        INSERT INTO tenants (tenant_id, default_commission_percent, hold_period_days)
        VALUES ($1, $2, $3)
        ON CONFLICT (tenant_id) DO UPDATE SET
            default_commission_percent = excluded.default_commission_percent,
            hold_period_days = excluded.hold_period_days,
            updated_at = CURRENT_TIMESTAMP
        RETURNING *;
        "#,
    )
    .bind(tenant_id)
    .bind(default_commission_percent)
    .bind(hold_period_days)
    .fetch_one(conn)
    .await?;
    debug!("🪪️ Tenant [{tenant_id}] saved: {default_commission_percent}% commission, {hold_period_days} day hold");
    Ok(tenant)
}

pub async fn upsert_referral_code(
    code: &str,
    tenant_id: &str,
    agent_id: &str,
    commission_percent: Option<f64>,
    conn: &mut SqliteConnection,
) -> Result<(), CommissionLedgerError> {
    let tenant = fetch_tenant(tenant_id, &mut *conn).await?;
    if tenant.is_none() {
        return Err(CommissionLedgerError::TenantNotFound(tenant_id.to_string()));
    }
    sqlx::query(
        r#"
        INSERT INTO referral_codes (tenant_id, code, agent_id, commission_percent)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (tenant_id, code) DO UPDATE SET
            agent_id = excluded.agent_id,
            commission_percent = excluded.commission_percent
        "#,
    )
    .bind(tenant_id)
    .bind(code)
    .bind(agent_id)
    .bind(commission_percent)
    .execute(conn)
    .await?;
    debug!("🪪️ Referral code [{code}] for tenant [{tenant_id}] now maps to agent [{agent_id}]");
    Ok(())
}
