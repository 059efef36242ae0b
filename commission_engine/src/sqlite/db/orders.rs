use acp_common::Money;
use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{CommissionStatus, NewOrder, Order, OrderId, ReferralResolution},
    helpers::calculate_commission,
    ledger_api::ledger_objects::OrderQueryFilter,
    traits::CommissionLedgerError,
};

/// Inserts the order into the database, returning `false` in the second parameter if the order already exists.
/// The insert itself is conflict-tolerant, so two concurrent submissions of the same `order_id` both succeed;
/// exactly one of them reports `true`.
pub async fn idempotent_insert(
    order: NewOrder,
    resolution: Option<ReferralResolution>,
    conn: &mut SqliteConnection,
) -> Result<(Order, bool), CommissionLedgerError> {
    let order_id = order.order_id.clone();
    match insert_order(order, resolution, conn).await? {
        Some(order) => {
            debug!("🧾️ Order [{}] inserted with id {}", order.order_id, order.id);
            Ok((order, true))
        },
        None => {
            let order = fetch_order_by_order_id(&order_id, conn)
                .await?
                .ok_or_else(|| CommissionLedgerError::OrderNotFound(order_id))?;
            Ok((order, false))
        },
    }
}

/// Inserts a new order using the given connection. This is not atomic on its own. You can embed this call inside a
/// transaction if you need atomicity, and pass `&mut *tx` as the connection argument.
///
/// When a referral resolution is given, the commission is derived here, exactly once, and the order starts its life as
/// `Pending`. Without one, the order is stored with `commission_status = 'None'` and never earns commission.
/// Returns `None` when an order with this `order_id` is already on record.
async fn insert_order(
    order: NewOrder,
    resolution: Option<ReferralResolution>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, CommissionLedgerError> {
    let (agent_id, percent, commission, status) = match resolution {
        Some(res) => {
            let commission = calculate_commission(order.amount, res.commission_percent)?;
            (Some(res.agent_id), res.commission_percent, commission, CommissionStatus::Pending)
        },
        None => (None, 0.0, Money::from(0), CommissionStatus::None),
    };
    let order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                tenant_id,
                customer_id,
                ref_agent_id,
                amount,
                commission_percent,
                commission_amount,
                commission_status
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (order_id) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(order.order_id)
    .bind(order.tenant_id)
    .bind(order.customer_id)
    .bind(agent_id)
    .bind(order.amount)
    .bind(percent)
    .bind(commission)
    .bind(status.to_string())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

/// Updates the order total and re-derives the commission amount with the percent captured at order time, so the
/// two can never drift apart. Guarded: only unpaid orders whose commission is still `None` or `Pending` and
/// unsettled may change.
pub async fn update_order_amount(
    order_id: &OrderId,
    amount: Money,
    conn: &mut SqliteConnection,
) -> Result<Order, CommissionLedgerError> {
    let order =
        fetch_order_by_order_id(order_id, conn).await?.ok_or_else(|| CommissionLedgerError::OrderNotFound(order_id.clone()))?;
    let commission = match order.commission_status {
        CommissionStatus::None => Money::from(0),
        CommissionStatus::Pending => calculate_commission(amount, order.commission_percent)?,
        _ => return Err(CommissionLedgerError::AmountUpdateForbidden(order_id.clone())),
    };
    let updated: Option<Order> = sqlx::query_as(
        r#"
        UPDATE orders SET amount = $1, commission_amount = $2, updated_at = CURRENT_TIMESTAMP
        WHERE order_id = $3
          AND payment_status = 'Pending'
          AND commission_settled = 0
          AND commission_status IN ('None', 'Pending')
        RETURNING *;
        "#,
    )
    .bind(amount)
    .bind(commission)
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    updated.ok_or_else(|| CommissionLedgerError::AmountUpdateForbidden(order_id.clone()))
}

/// The settlement half of the state machine: flags the commission as settled and starts the hold clock. The guard
/// doubles as the compare-and-set condition, so concurrent settlement signals apply exactly once.
///
/// Returns `None` when the guard did not match (unpaid, no commission, or already settled): a no-op, not an error.
pub async fn settle_order(
    order_id: &OrderId,
    hold_period_days: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, CommissionLedgerError> {
    let order: Option<Order> = sqlx::query_as(
        r#"
        UPDATE orders SET
            commission_settled = 1,
            commission_available_at = COALESCE(commission_available_at, datetime('now', '+' || $1 || ' days')),
            updated_at = CURRENT_TIMESTAMP
        WHERE order_id = $2
          AND payment_status = 'Paid'
          AND commission_status = 'Pending'
          AND commission_amount > 0
          AND commission_settled = 0
        RETURNING *;
        "#,
    )
    .bind(hold_period_days)
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    if let Some(o) = &order {
        debug!("🧾️ Order [{}] settled; commission releases at {:?}", o.order_id, o.commission_available_at);
    }
    Ok(order)
}

/// The release sweep. A single compare-and-set update moves every due commission from `Pending` to `Available`;
/// re-running it (or racing another sweep) moves nothing twice.
pub async fn release_due_commissions(conn: &mut SqliteConnection) -> Result<Vec<Order>, CommissionLedgerError> {
    let released: Vec<Order> = sqlx::query_as(
        r#"
        UPDATE orders SET commission_status = 'Available', updated_at = CURRENT_TIMESTAMP
        WHERE commission_status = 'Pending'
          AND commission_settled = 1
          AND payment_status = 'Paid'
          AND commission_available_at IS NOT NULL
          AND unixepoch(commission_available_at) <= unixepoch('now')
        RETURNING *;
        "#,
    )
    .fetch_all(conn)
    .await?;
    trace!("🧾️ Release sweep moved {} commissions to Available", released.len());
    Ok(released)
}

/// Marks the order as paid. Returns the number of rows changed (0 when the order was already paid or failed).
pub async fn mark_order_paid(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<u64, CommissionLedgerError> {
    let result = sqlx::query(
        "UPDATE orders SET payment_status = 'Paid', updated_at = CURRENT_TIMESTAMP \
         WHERE order_id = $1 AND payment_status = 'Pending'",
    )
    .bind(order_id.as_str())
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Marks the order's payment as failed and cancels its commission. `annul_available` additionally pulls back
/// commissions that were already released (refunds and chargebacks arriving after release).
pub async fn mark_order_failed(
    order_id: &OrderId,
    annul_available: bool,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, CommissionLedgerError> {
    sqlx::query(
        "UPDATE orders SET payment_status = 'Failed', updated_at = CURRENT_TIMESTAMP \
         WHERE order_id = $1 AND payment_status <> 'Failed'",
    )
    .bind(order_id.as_str())
    .execute(&mut *conn)
    .await?;
    let statuses = if annul_available { "('Pending', 'Available')" } else { "('Pending')" };
    let sql = format!(
        "UPDATE orders SET commission_status = 'Cancelled', updated_at = CURRENT_TIMESTAMP \
         WHERE order_id = $1 AND commission_status IN {statuses}"
    );
    sqlx::query(&sql).bind(order_id.as_str()).execute(&mut *conn).await?;
    let order = fetch_order_by_order_id(order_id, conn).await?;
    Ok(order)
}

/// Manual override of a single order's release date. Only `Pending` commissions can be re-dated.
pub async fn set_commission_available_at(
    order_id: &OrderId,
    available_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Order, CommissionLedgerError> {
    let stamp = available_at.naive_utc().format("%F %T%.f").to_string();
    let updated: Option<Order> = sqlx::query_as(
        "UPDATE orders SET commission_available_at = $1, updated_at = CURRENT_TIMESTAMP \
         WHERE order_id = $2 AND commission_status = 'Pending' RETURNING *;",
    )
    .bind(stamp)
    .bind(order_id.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    match updated {
        Some(order) => Ok(order),
        None => {
            let order = fetch_order_by_order_id(order_id, conn)
                .await?
                .ok_or_else(|| CommissionLedgerError::OrderNotFound(order_id.clone()))?;
            Err(CommissionLedgerError::InvalidTransition {
                order_id: order_id.clone(),
                from: order.commission_status,
                to: CommissionStatus::Pending,
            })
        },
    }
}

/// Bulk environment reset for a tenant. Every commission that has not been claimed is cancelled (or returned to
/// `None` where no agent was ever attached), and settlement state is cleared.
pub async fn reset_all_commissions(tenant_id: &str, conn: &mut SqliteConnection) -> Result<u64, CommissionLedgerError> {
    let result = sqlx::query(
        r#"
        UPDATE orders SET
            commission_status = CASE WHEN ref_agent_id IS NULL THEN 'None' ELSE 'Cancelled' END,
            commission_settled = 0,
            commission_available_at = NULL,
            updated_at = CURRENT_TIMESTAMP
        WHERE tenant_id = $1 AND commission_status IN ('None', 'Pending', 'Available');
        "#,
    )
    .bind(tenant_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`
///
/// Resulting orders are ordered by `created_at` in ascending order
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new(
        r#"
    SELECT * FROM orders
    "#,
    );
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(order_id) = query.order_id {
        where_clause.push("order_id = ");
        where_clause.push_bind_unseparated(order_id.to_string());
    }
    if let Some(tenant_id) = query.tenant_id {
        where_clause.push("tenant_id = ");
        where_clause.push_bind_unseparated(tenant_id);
    }
    if let Some(cid) = query.customer_id {
        where_clause.push("customer_id = ");
        where_clause.push_bind_unseparated(cid);
    }
    if let Some(agent_id) = query.agent_id {
        where_clause.push("ref_agent_id = ");
        where_clause.push_bind_unseparated(agent_id);
    }
    if query.status.as_ref().map(|s| !s.is_empty()).unwrap_or(false) {
        let mut statuses = vec![];
        query.status.as_ref().unwrap().iter().for_each(|s| {
            statuses.push(format!("'{s}'"));
        });
        let status_clause = statuses.join(",");
        where_clause.push(format!("commission_status IN ({status_clause})"));
    }
    if let Some(payment_status) = query.payment_status {
        where_clause.push("payment_status = ");
        where_clause.push_bind_unseparated(payment_status.to_string());
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY created_at ASC");

    trace!("🧾️ Executing query: {}", builder.sql());
    let query = builder.build_query_as::<Order>();
    let orders = query.fetch_all(conn).await?;
    trace!("Result of search_orders: {:?}", orders.len());
    Ok(orders)
}
