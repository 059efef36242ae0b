use std::fmt::Display;

use acp_common::Money;
use chrono::{DateTime, Utc};
use commission_engine::db_types::{NewOrder, OrderId, PaymentEventType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

/// Order intake payload. Amounts are in minor units (cents).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderRequest {
    pub order_id: String,
    pub tenant_id: String,
    pub customer_id: String,
    pub amount: Money,
    #[serde(default)]
    pub referral_code: Option<String>,
}

impl From<NewOrderRequest> for NewOrder {
    fn from(req: NewOrderRequest) -> Self {
        let order = NewOrder::new(OrderId::from(req.order_id), req.tenant_id, req.customer_id, req.amount);
        match req.referral_code {
            Some(code) => order.with_referral_code(code),
            None => order,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmountUpdateParams {
    pub amount: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequestParams {
    pub agent_id: String,
    pub tenant_id: String,
    pub amount: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessWithdrawalParams {
    pub processed_by: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableAtParams {
    pub available_at: DateTime<Utc>,
}

/// The payment provider's webhook payload. The raw body is kept alongside the parsed fields for the audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentNotification {
    pub order_id: String,
    pub txid: String,
    pub event_type: PaymentEventType,
}
