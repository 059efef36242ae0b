use acp_common::Money;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db_types::{CommissionStatus, NewOrder, Order, OrderId, ReferralResolution};

/// This trait defines the highest level of behaviour for backends supporting the commission ledger engine.
///
/// This behaviour includes:
/// * Recording incoming orders together with their commission computation.
/// * The commission state machine: settlement, the release sweep, and cancellation.
/// * Applying payment webhook outcomes to orders with compare-and-set semantics.
/// * The explicit, audited admin operations that replace ad-hoc data repair.
#[allow(async_fn_in_trait)]
pub trait CommissionLedgerDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Takes a new order and, in a single atomic transaction, stores it together with its commission fields.
    /// `resolution` carries the outcome of referral resolution; `None` means the order earns no commission and is
    /// stored with status `None`.
    ///
    /// This call is idempotent on the external order id. The second element of the return value is `false` if the
    /// order already existed, in which case the stored order is returned unchanged.
    async fn insert_order(
        &self,
        order: NewOrder,
        resolution: Option<ReferralResolution>,
    ) -> Result<(Order, bool), CommissionLedgerError>;

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, CommissionLedgerError>;

    /// Updates the order total (item changes, discounts) and re-derives the commission amount with the percent
    /// captured at order time, so the two can never go stale relative to each other.
    ///
    /// Only legal while the commission is still `Pending` (or `None`) and the order unpaid; fails with
    /// [`CommissionLedgerError::AmountUpdateForbidden`] otherwise.
    async fn update_order_amount(&self, order_id: &OrderId, amount: Money) -> Result<Order, CommissionLedgerError>;

    /// The external settlement signal (delivery confirmation, fulfilment, etc). Marks the commission as settled
    /// and stamps `commission_available_at = now + tenant hold period` if not already set.
    ///
    /// Gated: orders that are not `Paid`, carry no commission, or are already settled are left untouched and
    /// `None` is returned. Re-settling is a no-op, not an error.
    async fn settle_order(&self, order_id: &OrderId) -> Result<Option<Order>, CommissionLedgerError>;

    /// The release sweep: every `Pending` commission that is settled, paid, and past its release date is moved to
    /// `Available` in a single compare-and-set update. Idempotent; concurrent sweeps cannot double-release.
    ///
    /// Returns the orders that were released by this invocation.
    async fn release_due_commissions(&self) -> Result<Vec<Order>, CommissionLedgerError>;

    /// Records the provider's payment confirmation: `payment_status` moves `Pending → Paid`, and the commission is
    /// settled in the same transaction (the hold clock starts at payment). The commission is **not** released here;
    /// only the sweep ever writes `Available`.
    ///
    /// Returns `None` when the order is unknown (webhooks can arrive before the order does).
    async fn apply_payment_success(&self, order_id: &OrderId) -> Result<Option<Order>, CommissionLedgerError>;

    /// Records a payment failure, refund, chargeback or cancellation: `payment_status` becomes `Failed` and the
    /// commission is cancelled. `annul_available` extends the cancellation to already-released (`Available`)
    /// commissions, which is required for refunds and chargebacks that arrive after release.
    ///
    /// Returns `None` when the order is unknown.
    async fn apply_payment_failure(
        &self,
        order_id: &OrderId,
        annul_available: bool,
    ) -> Result<Option<Order>, CommissionLedgerError>;

    /// Manual override of a single order's release date. Only valid while the commission is `Pending`.
    async fn set_commission_available_at(
        &self,
        order_id: &OrderId,
        available_at: DateTime<Utc>,
    ) -> Result<Order, CommissionLedgerError>;

    /// Bulk, explicit, irreversible zeroing of every commission for a tenant: statuses become `Cancelled` (or
    /// `None` for orders that never had an agent), settlement flags and release dates are cleared.
    ///
    /// Used only for environment resets. Returns the number of orders touched.
    async fn reset_all_commissions(&self, tenant_id: &str) -> Result<u64, CommissionLedgerError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), CommissionLedgerError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum CommissionLedgerError {
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("Invalid commission configuration: percent {percent} on order amount {amount}")]
    InvalidCommissionConfig { percent: f64, amount: Money },
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("The amount of order {0} can no longer be changed; its commission has left the pending state")]
    AmountUpdateForbidden(OrderId),
    #[error("Illegal commission transition on order {order_id}: {from} → {to}")]
    InvalidTransition { order_id: OrderId, from: CommissionStatus, to: CommissionStatus },
    #[error("Insufficient balance: requested {requested}, but only {available} is available")]
    InsufficientBalance { requested: Money, available: Money },
    #[error("An open withdrawal request (#{request_id}) already exists for this agent")]
    WithdrawalAlreadyOpen { request_id: i64 },
    #[error("The requested withdrawal #{0} does not exist")]
    WithdrawalNotFound(i64),
    #[error("Withdrawal #{0} is not pending and cannot be processed")]
    WithdrawalNotPending(i64),
    #[error(
        "Withdrawal #{request_id} is stale: {requested} was requested but only {available} of available \
         commission remains"
    )]
    StaleWithdrawalRequest { request_id: i64, requested: Money, available: Money },
    #[error("The requested webhook event {0} does not exist")]
    EventNotFound(String),
    #[error("The requested tenant {0} does not exist")]
    TenantNotFound(String),
}

impl From<sqlx::Error> for CommissionLedgerError {
    fn from(e: sqlx::Error) -> Self {
        CommissionLedgerError::DatabaseError(e.to_string())
    }
}
