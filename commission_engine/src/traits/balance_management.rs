use chrono::{DateTime, Utc};

use crate::{
    db_types::{AgentBalance, CommissionStatus, Order},
    ledger_api::ledger_objects::OrderQueryFilter,
    traits::CommissionLedgerError,
};

/// Read-only queries over the order collection. Balances are always derived by aggregation at read time; no
/// backend may answer these from a cached running total.
#[allow(async_fn_in_trait)]
pub trait BalanceManagement: Clone {
    /// The agent's derived balance for one tenant. `available` is already net of the agent's own pending
    /// withdrawal requests.
    async fn balance_for_agent(&self, agent_id: &str, tenant_id: &str) -> Result<AgentBalance, CommissionLedgerError>;

    /// All commission-bearing orders for the agent, optionally restricted to one commission status,
    /// oldest first.
    async fn commission_orders_for_agent(
        &self,
        agent_id: &str,
        tenant_id: &str,
        status: Option<CommissionStatus>,
    ) -> Result<Vec<Order>, CommissionLedgerError>;

    /// The earliest release date among the agent's held commissions, if any.
    async fn earliest_release_at(
        &self,
        agent_id: &str,
        tenant_id: &str,
    ) -> Result<Option<DateTime<Utc>>, CommissionLedgerError>;

    /// Fetches orders according to criteria specified in the `OrderQueryFilter`, ordered by `created_at`
    /// ascending.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, CommissionLedgerError>;
}
