use std::fmt::Debug;

use acp_common::Money;
use log::*;

use crate::{
    db_types::{Order, WithdrawalRequest},
    events::{EventProducers, WithdrawalApprovedEvent},
    traits::{CommissionLedgerError, WithdrawalManagement},
};

/// `WithdrawalApi` files withdrawal requests against available balances and carries operator decisions through to
/// the ledger.
pub struct WithdrawalApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for WithdrawalApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WithdrawalApi")
    }
}

impl<B> WithdrawalApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> WithdrawalApi<B>
where B: WithdrawalManagement
{
    /// Files a withdrawal request. The amount must be covered by the agent's available balance net of other
    /// pending requests, and only one open request per agent is allowed.
    pub async fn request_withdrawal(
        &self,
        agent_id: &str,
        tenant_id: &str,
        amount: Money,
    ) -> Result<WithdrawalRequest, CommissionLedgerError> {
        self.db.create_withdrawal_request(agent_id, tenant_id, amount).await
    }

    /// Approves a pending request, claiming the agent's available commission orders oldest-first, and notifies
    /// subscribers.
    pub async fn approve_withdrawal(
        &self,
        request_id: i64,
        processed_by: &str,
    ) -> Result<(WithdrawalRequest, Vec<Order>), CommissionLedgerError> {
        let (request, claimed) = self.db.approve_withdrawal(request_id, processed_by).await?;
        self.call_withdrawal_approved_hook(&request, &claimed).await;
        Ok((request, claimed))
    }

    pub async fn reject_withdrawal(
        &self,
        request_id: i64,
        processed_by: &str,
        reason: &str,
    ) -> Result<WithdrawalRequest, CommissionLedgerError> {
        self.db.reject_withdrawal(request_id, processed_by, reason).await
    }

    pub async fn fetch_withdrawal(&self, request_id: i64) -> Result<Option<WithdrawalRequest>, CommissionLedgerError> {
        self.db.fetch_withdrawal(request_id).await
    }

    pub async fn withdrawals_for_agent(
        &self,
        agent_id: &str,
        tenant_id: &str,
    ) -> Result<Vec<WithdrawalRequest>, CommissionLedgerError> {
        self.db.withdrawals_for_agent(agent_id, tenant_id).await
    }

    async fn call_withdrawal_approved_hook(&self, request: &WithdrawalRequest, claimed: &[Order]) {
        for emitter in &self.producers.withdrawal_approved_producer {
            debug!("🏧️ Notifying withdrawal approved hook subscribers");
            let event = WithdrawalApprovedEvent::new(request.clone(), claimed.to_vec());
            emitter.publish_event(event).await;
        }
    }
}
