use acp_common::Money;

use crate::{
    db_types::{Order, WithdrawalRequest},
    traits::CommissionLedgerError,
};

/// Withdrawal bookkeeping.
///
/// The one hard concurrency requirement in the engine lives here: the balance check and the request insertion in
/// [`Self::create_withdrawal_request`] must be atomic with respect to a concurrent request from the same agent, so
/// that two requests can never both draw on the same available funds.
#[allow(async_fn_in_trait)]
pub trait WithdrawalManagement: Clone {
    /// Creates a withdrawal request in `Pending` state.
    ///
    /// No order state changes yet; the hold is logical: pending requests are subtracted from the agent's
    /// available balance. Fails with [`CommissionLedgerError::InsufficientBalance`] when the amount exceeds the
    /// available balance, and with [`CommissionLedgerError::WithdrawalAlreadyOpen`] when the agent already has an
    /// open (pending or approved) request.
    async fn create_withdrawal_request(
        &self,
        agent_id: &str,
        tenant_id: &str,
        amount: Money,
    ) -> Result<WithdrawalRequest, CommissionLedgerError>;

    /// Approves a pending request: the agent's `Available` orders are claimed oldest-first until the claimed sum
    /// covers the requested amount, and the request is marked `Completed`.
    ///
    /// Orders are the atomic unit of commission: whole orders are claimed, never fractions, so the claimed sum may
    /// exceed the requested amount. If the available orders no longer cover the amount (e.g. an order was
    /// cancelled after the request was filed), fails with [`CommissionLedgerError::StaleWithdrawalRequest`] and
    /// changes nothing.
    ///
    /// Returns the completed request and the orders that were claimed.
    async fn approve_withdrawal(
        &self,
        request_id: i64,
        processed_by: &str,
    ) -> Result<(WithdrawalRequest, Vec<Order>), CommissionLedgerError>;

    /// Rejects a pending request with an operator-supplied reason. No order state changes.
    async fn reject_withdrawal(
        &self,
        request_id: i64,
        processed_by: &str,
        reason: &str,
    ) -> Result<WithdrawalRequest, CommissionLedgerError>;

    async fn fetch_withdrawal(&self, request_id: i64) -> Result<Option<WithdrawalRequest>, CommissionLedgerError>;

    /// All withdrawal requests filed by the agent, newest first.
    async fn withdrawals_for_agent(
        &self,
        agent_id: &str,
        tenant_id: &str,
    ) -> Result<Vec<WithdrawalRequest>, CommissionLedgerError>;
}
