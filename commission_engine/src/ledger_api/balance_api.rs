use acp_common::Money;

use crate::{
    db_types::{AgentBalance, CommissionStatus, Order},
    ledger_api::ledger_objects::{BalanceSummary, OrderQueryFilter},
    traits::{BalanceManagement, CommissionLedgerError},
};

/// Read-only queries over the ledger: derived balances, commission histories and order searches.
#[derive(Debug, Clone)]
pub struct BalanceApi<B> {
    db: B,
    min_withdrawal: Money,
}

impl<B> BalanceApi<B> {
    pub fn new(db: B, min_withdrawal: Money) -> Self {
        Self { db, min_withdrawal }
    }
}

impl<B> BalanceApi<B>
where B: BalanceManagement
{
    pub async fn balance_for_agent(&self, agent_id: &str, tenant_id: &str) -> Result<AgentBalance, CommissionLedgerError> {
        self.db.balance_for_agent(agent_id, tenant_id).await
    }

    /// The balance together with the next release date and a withdrawal eligibility flag. This is the agent-facing
    /// dashboard view.
    pub async fn summary(&self, agent_id: &str, tenant_id: &str) -> Result<BalanceSummary, CommissionLedgerError> {
        let balance = self.db.balance_for_agent(agent_id, tenant_id).await?;
        let next_release_at = self.db.earliest_release_at(agent_id, tenant_id).await?;
        let can_withdraw = balance.available >= self.min_withdrawal;
        Ok(BalanceSummary {
            agent_id: agent_id.to_string(),
            tenant_id: tenant_id.to_string(),
            balance,
            next_release_at,
            min_withdrawal: self.min_withdrawal,
            can_withdraw,
        })
    }

    pub async fn commission_orders_for_agent(
        &self,
        agent_id: &str,
        tenant_id: &str,
        status: Option<CommissionStatus>,
    ) -> Result<Vec<Order>, CommissionLedgerError> {
        self.db.commission_orders_for_agent(agent_id, tenant_id, status).await
    }

    pub async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, CommissionLedgerError> {
        self.db.search_orders(query).await
    }
}
