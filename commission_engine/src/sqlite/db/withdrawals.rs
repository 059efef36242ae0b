use acp_common::Money;
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Order, WithdrawalRequest},
    sqlite::db::balances,
    traits::CommissionLedgerError,
};

/// Creates a withdrawal request, but only if the agent has no other open request and the amount is covered by the
/// agent's available balance net of pending requests.
///
/// The balance check and the insertion happen in one guarded `INSERT ... SELECT` statement, so two concurrent
/// requests from the same agent serialize at the database and can never both pass a stale balance check.
pub async fn create_request(
    agent_id: &str,
    tenant_id: &str,
    amount: Money,
    conn: &mut SqliteConnection,
) -> Result<WithdrawalRequest, CommissionLedgerError> {
    let request: Option<WithdrawalRequest> = sqlx::query_as(
        r#"
        INSERT INTO withdrawal_requests (agent_id, tenant_id, amount, status)
        SELECT $1, $2, $3, 'Pending'
        WHERE NOT EXISTS (
            SELECT 1 FROM withdrawal_requests
            WHERE agent_id = $1 AND tenant_id = $2 AND status IN ('Pending', 'Approved')
        )
        AND $3 <= (
            COALESCE((
                SELECT SUM(commission_amount) FROM orders
                WHERE ref_agent_id = $1 AND tenant_id = $2 AND commission_status = 'Available'
            ), 0)
            -
            COALESCE((
                SELECT SUM(amount) FROM withdrawal_requests
                WHERE agent_id = $1 AND tenant_id = $2 AND status = 'Pending'
            ), 0)
        )
        RETURNING *;
        "#,
    )
    .bind(agent_id)
    .bind(tenant_id)
    .bind(amount)
    .fetch_optional(&mut *conn)
    .await?;
    match request {
        Some(request) => {
            debug!("🏧️ Withdrawal request #{} for {} filed by agent {agent_id}", request.id, request.amount);
            Ok(request)
        },
        // Zero rows: work out which guard failed so the caller gets an actionable error. The classification runs
        // after the fact and is best-effort under concurrency, which is fine for an error message.
        None => {
            let open: Option<WithdrawalRequest> = sqlx::query_as(
                "SELECT * FROM withdrawal_requests \
                 WHERE agent_id = $1 AND tenant_id = $2 AND status IN ('Pending', 'Approved') \
                 ORDER BY created_at DESC LIMIT 1",
            )
            .bind(agent_id)
            .bind(tenant_id)
            .fetch_optional(&mut *conn)
            .await?;
            if let Some(open) = open {
                return Err(CommissionLedgerError::WithdrawalAlreadyOpen { request_id: open.id });
            }
            let balance = balances::balance_for_agent(agent_id, tenant_id, conn).await?;
            Err(CommissionLedgerError::InsufficientBalance { requested: amount, available: balance.available })
        },
    }
}

pub async fn fetch_request(
    request_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<WithdrawalRequest>, CommissionLedgerError> {
    let request =
        sqlx::query_as("SELECT * FROM withdrawal_requests WHERE id = $1").bind(request_id).fetch_optional(conn).await?;
    Ok(request)
}

pub async fn requests_for_agent(
    agent_id: &str,
    tenant_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<WithdrawalRequest>, CommissionLedgerError> {
    let requests = sqlx::query_as(
        "SELECT * FROM withdrawal_requests WHERE agent_id = $1 AND tenant_id = $2 ORDER BY created_at DESC, id DESC",
    )
    .bind(agent_id)
    .bind(tenant_id)
    .fetch_all(conn)
    .await?;
    Ok(requests)
}

/// Approves a pending request by claiming the agent's `Available` orders oldest-first until the requested amount
/// is covered. Call inside a transaction: any failure must roll back every claim.
///
/// Orders are the atomic unit of commission. Whole orders move to `Claimed`, never fractions, so the claimed
/// total may exceed the requested amount.
pub async fn approve_request(
    request_id: i64,
    processed_by: &str,
    conn: &mut SqliteConnection,
) -> Result<(WithdrawalRequest, Vec<Order>), CommissionLedgerError> {
    let request = fetch_request(request_id, &mut *conn)
        .await?
        .ok_or(CommissionLedgerError::WithdrawalNotFound(request_id))?;
    if request.status != crate::db_types::WithdrawalStatus::Pending {
        return Err(CommissionLedgerError::WithdrawalNotPending(request_id));
    }
    let available: Vec<Order> = sqlx::query_as(
        "SELECT * FROM orders WHERE ref_agent_id = $1 AND tenant_id = $2 AND commission_status = 'Available' \
         ORDER BY created_at ASC, id ASC",
    )
    .bind(&request.agent_id)
    .bind(&request.tenant_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut covered = Money::from(0);
    let mut claimed = Vec::new();
    for order in available {
        if covered >= request.amount {
            break;
        }
        covered = covered + order.commission_amount;
        claimed.push(order);
    }
    if covered < request.amount {
        return Err(CommissionLedgerError::StaleWithdrawalRequest {
            request_id,
            requested: request.amount,
            available: covered,
        });
    }

    let mut claimed_orders = Vec::with_capacity(claimed.len());
    for order in claimed {
        // Compare-and-set per order: if anything changed the order since we read it, the approval is stale and
        // the enclosing transaction rolls the whole claim back.
        let updated: Option<Order> = sqlx::query_as(
            "UPDATE orders SET commission_status = 'Claimed', updated_at = CURRENT_TIMESTAMP \
             WHERE id = $1 AND commission_status = 'Available' RETURNING *;",
        )
        .bind(order.id)
        .fetch_optional(&mut *conn)
        .await?;
        match updated {
            Some(order) => claimed_orders.push(order),
            None => {
                return Err(CommissionLedgerError::StaleWithdrawalRequest {
                    request_id,
                    requested: request.amount,
                    available: covered - order.commission_amount,
                })
            },
        }
    }

    let completed: Option<WithdrawalRequest> = sqlx::query_as(
        "UPDATE withdrawal_requests \
         SET status = 'Completed', processed_at = CURRENT_TIMESTAMP, processed_by = $1 \
         WHERE id = $2 AND status = 'Pending' RETURNING *;",
    )
    .bind(processed_by)
    .bind(request_id)
    .fetch_optional(&mut *conn)
    .await?;
    let completed = completed.ok_or(CommissionLedgerError::WithdrawalNotPending(request_id))?;
    debug!(
        "🏧️ Withdrawal #{request_id} completed by {processed_by}: {} claimed across {} orders",
        completed.amount,
        claimed_orders.len()
    );
    Ok((completed, claimed_orders))
}

pub async fn reject_request(
    request_id: i64,
    processed_by: &str,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<WithdrawalRequest, CommissionLedgerError> {
    let rejected: Option<WithdrawalRequest> = sqlx::query_as(
        "UPDATE withdrawal_requests \
         SET status = 'Rejected', processed_at = CURRENT_TIMESTAMP, processed_by = $1, reason = $2 \
         WHERE id = $3 AND status = 'Pending' RETURNING *;",
    )
    .bind(processed_by)
    .bind(reason)
    .bind(request_id)
    .fetch_optional(&mut *conn)
    .await?;
    match rejected {
        Some(request) => Ok(request),
        None => match fetch_request(request_id, conn).await? {
            Some(_) => Err(CommissionLedgerError::WithdrawalNotPending(request_id)),
            None => Err(CommissionLedgerError::WithdrawalNotFound(request_id)),
        },
    }
}
