use std::fmt::Display;

use acp_common::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{AgentBalance, CommissionStatus, OrderId, PaymentStatus};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderQueryFilter {
    pub order_id: Option<OrderId>,
    pub tenant_id: Option<String>,
    pub customer_id: Option<String>,
    pub agent_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub status: Option<Vec<CommissionStatus>>,
    pub payment_status: Option<PaymentStatus>,
}

impl OrderQueryFilter {
    pub fn with_order_id(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_tenant_id<S: Into<String>>(mut self, tenant_id: S) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_customer_id<S: Into<String>>(mut self, customer_id: S) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn with_agent_id<S: Into<String>>(mut self, agent_id: S) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_status(mut self, status: CommissionStatus) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn with_payment_status(mut self, status: PaymentStatus) -> Self {
        self.payment_status = Some(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.order_id.is_none() &&
            self.tenant_id.is_none() &&
            self.customer_id.is_none() &&
            self.agent_id.is_none() &&
            self.status.is_none() &&
            self.payment_status.is_none() &&
            self.since.is_none() &&
            self.until.is_none()
    }
}

impl Display for OrderQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "No filters.")?;
            return Ok(());
        }
        if let Some(order_id) = &self.order_id {
            write!(f, "order_id: {order_id}. ")?;
        }
        if let Some(tenant_id) = &self.tenant_id {
            write!(f, "tenant_id: {tenant_id}. ")?;
        }
        if let Some(customer_id) = &self.customer_id {
            write!(f, "customer_id: {customer_id}. ")?;
        }
        if let Some(agent_id) = &self.agent_id {
            write!(f, "agent_id: {agent_id}. ")?;
        }
        if let Some(since) = &self.since {
            write!(f, "since {since}. ")?;
        }
        if let Some(until) = &self.until {
            write!(f, "until {until}. ")?;
        }
        if let Some(statuses) = &self.status {
            let statuses = statuses.iter().map(|s| s.to_string()).collect::<Vec<String>>().join(",");
            write!(f, "status in ({statuses}). ")?;
        }
        if let Some(payment_status) = &self.payment_status {
            write!(f, "payment_status: {payment_status}. ")?;
        }
        Ok(())
    }
}

/// The balance view handed to agents: the derived balance itself, the date the next held commission releases, and
/// whether the available balance clears the platform's minimum withdrawal amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSummary {
    pub agent_id: String,
    pub tenant_id: String,
    pub balance: AgentBalance,
    pub next_release_at: Option<DateTime<Utc>>,
    pub min_withdrawal: Money,
    pub can_withdraw: bool,
}
