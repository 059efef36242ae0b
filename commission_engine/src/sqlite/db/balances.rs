use acp_common::Money;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection};

use crate::{
    db_types::{AgentBalance, CommissionStatus, Order},
    traits::CommissionLedgerError,
};

#[derive(Debug, FromRow)]
struct BalanceRow {
    available: i64,
    on_hold: i64,
    claimed: i64,
    cancelled: i64,
}

/// Derives the agent's balance from the order collection in a single aggregate pass. The available figure is
/// reduced by the agent's own pending withdrawal requests, which is what makes two concurrent withdrawal
/// requests unable to draw on the same funds.
pub async fn balance_for_agent(
    agent_id: &str,
    tenant_id: &str,
    conn: &mut SqliteConnection,
) -> Result<AgentBalance, CommissionLedgerError> {
    let row: BalanceRow = sqlx::query_as(
        r#"
        SELECT
            COALESCE(SUM(CASE WHEN commission_status = 'Available' THEN commission_amount END), 0) AS available,
            COALESCE(SUM(CASE WHEN commission_status = 'Pending' THEN commission_amount END), 0) AS on_hold,
            COALESCE(SUM(CASE WHEN commission_status = 'Claimed' THEN commission_amount END), 0) AS claimed,
            COALESCE(SUM(CASE WHEN commission_status = 'Cancelled' THEN commission_amount END), 0) AS cancelled
        FROM orders
        WHERE ref_agent_id = $1 AND tenant_id = $2;
        "#,
    )
    .bind(agent_id)
    .bind(tenant_id)
    .fetch_one(&mut *conn)
    .await?;
    let reserved = pending_withdrawal_total(agent_id, tenant_id, conn).await?;
    // A refund can annul an Available order while a request is still reserving it; never report below zero.
    Ok(AgentBalance {
        available: (Money::from(row.available) - reserved).max(Money::from(0)),
        on_hold: Money::from(row.on_hold),
        claimed: Money::from(row.claimed),
        cancelled: Money::from(row.cancelled),
        pending_withdrawals: reserved,
    })
}

/// Sum of the agent's `Pending` withdrawal requests; the logical hold against the available balance.
pub async fn pending_withdrawal_total(
    agent_id: &str,
    tenant_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Money, CommissionLedgerError> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM withdrawal_requests \
         WHERE agent_id = $1 AND tenant_id = $2 AND status = 'Pending'",
    )
    .bind(agent_id)
    .bind(tenant_id)
    .fetch_one(conn)
    .await?;
    Ok(Money::from(total))
}

pub async fn commission_orders_for_agent(
    agent_id: &str,
    tenant_id: &str,
    status: Option<CommissionStatus>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, CommissionLedgerError> {
    let orders = match status {
        Some(status) => {
            sqlx::query_as(
                "SELECT * FROM orders WHERE ref_agent_id = $1 AND tenant_id = $2 AND commission_status = $3 \
                 ORDER BY created_at ASC, id ASC",
            )
            .bind(agent_id)
            .bind(tenant_id)
            .bind(status.to_string())
            .fetch_all(conn)
            .await?
        },
        None => {
            sqlx::query_as(
                "SELECT * FROM orders WHERE ref_agent_id = $1 AND tenant_id = $2 AND commission_status <> 'None' \
                 ORDER BY created_at ASC, id ASC",
            )
            .bind(agent_id)
            .bind(tenant_id)
            .fetch_all(conn)
            .await?
        },
    };
    Ok(orders)
}

/// The earliest release date among the agent's settled-but-held commissions.
pub async fn earliest_release_at(
    agent_id: &str,
    tenant_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<DateTime<Utc>>, CommissionLedgerError> {
    let next: Option<DateTime<Utc>> = sqlx::query_scalar(
        "SELECT MIN(commission_available_at) FROM orders \
         WHERE ref_agent_id = $1 AND tenant_id = $2 AND commission_status = 'Pending' \
           AND commission_available_at IS NOT NULL",
    )
    .bind(agent_id)
    .bind(tenant_id)
    .fetch_one(conn)
    .await?;
    Ok(next)
}
