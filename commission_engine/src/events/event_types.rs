use serde::{Deserialize, Serialize};

use crate::db_types::{Order, WithdrawalRequest};

/// Fired when an order's commission is settled and its hold clock starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionSettledEvent {
    pub order: Order,
}

impl CommissionSettledEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Fired by the release sweep for every commission that becomes available for withdrawal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionAvailableEvent {
    pub order: Order,
}

impl CommissionAvailableEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Fired when a withdrawal request is approved and its covering orders are claimed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalApprovedEvent {
    pub request: WithdrawalRequest,
    pub claimed_orders: Vec<Order>,
}

impl WithdrawalApprovedEvent {
    pub fn new(request: WithdrawalRequest, claimed_orders: Vec<Order>) -> Self {
        Self { request, claimed_orders }
    }
}
