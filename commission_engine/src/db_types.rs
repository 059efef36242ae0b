use std::{fmt::Display, str::FromStr};

use acp_common::Money;
use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

//--------------------------------------        OrderId        -------------------------------------------------------
/// The external (storefront-assigned) order identifier.
#[derive(Debug, Clone, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid status value: {0}")]
pub struct ConversionError(String);

//--------------------------------------   CommissionStatus    -------------------------------------------------------
/// Lifecycle state of an order's commission.
///
/// Transitions only ever move forward (`Pending → Available → Claimed`), with `Cancelled` reachable from any
/// non-terminal state. `None` is terminal: orders without a referring agent never earn commission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum CommissionStatus {
    /// The order has no referring agent, or its commission was explicitly zeroed by an admin reset.
    None,
    /// A commission has been computed and is waiting for settlement and/or its hold period to lapse.
    Pending,
    /// The commission may be withdrawn by the agent.
    Available,
    /// The commission has been paid out as part of an approved withdrawal.
    Claimed,
    /// The commission was cancelled (payment failure, refund, chargeback or admin action). Terminal.
    Cancelled,
}

impl Display for CommissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommissionStatus::None => write!(f, "None"),
            CommissionStatus::Pending => write!(f, "Pending"),
            CommissionStatus::Available => write!(f, "Available"),
            CommissionStatus::Claimed => write!(f, "Claimed"),
            CommissionStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FromStr for CommissionStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" => Ok(Self::None),
            "Pending" => Ok(Self::Pending),
            "Available" => Ok(Self::Available),
            "Claimed" => Ok(Self::Claimed),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid commission status: {s}"))),
        }
    }
}

impl From<String> for CommissionStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid commission status: {value}. But this conversion cannot fail. Defaulting to None");
            CommissionStatus::None
        })
    }
}

//--------------------------------------    PaymentStatus      -------------------------------------------------------
/// Payment lifecycle of an order, driven exclusively by provider webhooks. Independent axis from
/// [`CommissionStatus`], but gates it: commission logic never acts on an order that is not `Paid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "Pending"),
            PaymentStatus::Paid => write!(f, "Paid"),
            PaymentStatus::Failed => write!(f, "Failed"),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Paid" => Ok(Self::Paid),
            "Failed" => Ok(Self::Failed),
            s => Err(ConversionError(format!("Invalid payment status: {s}"))),
        }
    }
}

impl From<String> for PaymentStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid payment status: {value}. But this conversion cannot fail. Defaulting to Pending");
            PaymentStatus::Pending
        })
    }
}

//--------------------------------------        Order          -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub tenant_id: String,
    pub customer_id: String,
    /// The agent credited for this order, resolved from a referral code at order-creation time.
    pub ref_agent_id: Option<String>,
    pub amount: Money,
    /// The percent rate captured at order time, so later rate changes never alter historical orders.
    pub commission_percent: f64,
    pub commission_amount: Money,
    pub commission_status: CommissionStatus,
    pub commission_settled: bool,
    pub commission_available_at: Option<DateTime<Utc>>,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------       NewOrder        -------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    /// The order id as assigned by the storefront
    pub order_id: OrderId,
    /// The tenant (business) this order belongs to. Every ledger query is scoped by this id.
    pub tenant_id: String,
    pub customer_id: String,
    /// The order total, used as the commission base
    pub amount: Money,
    /// An optional referral code. Resolution failure is not an error; the order is simply created without
    /// commission.
    pub referral_code: Option<String>,
}

impl NewOrder {
    pub fn new<T: Into<String>, C: Into<String>>(order_id: OrderId, tenant_id: T, customer_id: C, amount: Money) -> Self {
        Self { order_id, tenant_id: tenant_id.into(), customer_id: customer_id.into(), amount, referral_code: None }
    }

    pub fn with_referral_code<S: Into<String>>(mut self, code: S) -> Self {
        self.referral_code = Some(code.into());
        self
    }
}

//--------------------------------------    AgentBalance       -------------------------------------------------------
/// A point-in-time view over the order collection for one agent in one tenant. Derived on read; there is no cached
/// running total anywhere in the system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentBalance {
    /// Sum over `Available` orders, net of the agent's own pending withdrawal requests. Never negative: a stale
    /// pending request can reserve more than remains after a refund, in which case this reports zero.
    pub available: Money,
    /// Sum over `Pending` (settled or not) commission orders.
    pub on_hold: Money,
    /// Sum over `Claimed` orders.
    pub claimed: Money,
    /// Sum over `Cancelled` orders, reported for audit.
    pub cancelled: Money,
    /// Sum of the agent's `Pending` withdrawal requests; already subtracted from `available`.
    pub pending_withdrawals: Money,
}

impl AgentBalance {
    /// Total commission ever assigned to the agent across all non-`None` states.
    pub fn total_assigned(&self) -> Money {
        self.available + self.pending_withdrawals + self.on_hold + self.claimed + self.cancelled
    }
}

//--------------------------------------  WithdrawalStatus     -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

impl Display for WithdrawalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WithdrawalStatus::Pending => write!(f, "Pending"),
            WithdrawalStatus::Approved => write!(f, "Approved"),
            WithdrawalStatus::Rejected => write!(f, "Rejected"),
            WithdrawalStatus::Completed => write!(f, "Completed"),
        }
    }
}

impl FromStr for WithdrawalStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Approved" => Ok(Self::Approved),
            "Rejected" => Ok(Self::Rejected),
            "Completed" => Ok(Self::Completed),
            s => Err(ConversionError(format!("Invalid withdrawal status: {s}"))),
        }
    }
}

impl From<String> for WithdrawalStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid withdrawal status: {value}. But this conversion cannot fail. Defaulting to Pending");
            WithdrawalStatus::Pending
        })
    }
}

//-------------------------------------- WithdrawalRequest     -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: i64,
    pub agent_id: String,
    pub tenant_id: String,
    pub amount: Money,
    pub status: WithdrawalStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub processed_by: Option<String>,
    /// Operator note; set on rejection.
    pub reason: Option<String>,
}

//--------------------------------------  PaymentEventType     -------------------------------------------------------
/// The event vocabulary delivered by the payment provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentEventType {
    Success,
    Failed,
    Refund,
    Chargeback,
    Cancelled,
}

impl PaymentEventType {
    /// True for every event that terminates the payment (and therefore the commission) unfavourably.
    pub fn annuls_payment(&self) -> bool {
        !matches!(self, PaymentEventType::Success)
    }
}

impl Display for PaymentEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentEventType::Success => write!(f, "Success"),
            PaymentEventType::Failed => write!(f, "Failed"),
            PaymentEventType::Refund => write!(f, "Refund"),
            PaymentEventType::Chargeback => write!(f, "Chargeback"),
            PaymentEventType::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FromStr for PaymentEventType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Success" => Ok(Self::Success),
            "Failed" => Ok(Self::Failed),
            "Refund" => Ok(Self::Refund),
            "Chargeback" => Ok(Self::Chargeback),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid payment event type: {s}"))),
        }
    }
}

impl From<String> for PaymentEventType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid payment event type: {value}. But this conversion cannot fail. Defaulting to Failed");
            PaymentEventType::Failed
        })
    }
}

//-------------------------------------- PaymentEventStatus    -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentEventStatus {
    /// Received but not (successfully) applied yet; includes events awaiting a retry.
    Pending,
    /// Applied exactly once.
    Processed,
    /// Exhausted its retry budget.
    Failed,
    /// Dismissed by an operator.
    Ignored,
}

impl Display for PaymentEventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentEventStatus::Pending => write!(f, "Pending"),
            PaymentEventStatus::Processed => write!(f, "Processed"),
            PaymentEventStatus::Failed => write!(f, "Failed"),
            PaymentEventStatus::Ignored => write!(f, "Ignored"),
        }
    }
}

impl FromStr for PaymentEventStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Processed" => Ok(Self::Processed),
            "Failed" => Ok(Self::Failed),
            "Ignored" => Ok(Self::Ignored),
            s => Err(ConversionError(format!("Invalid payment event status: {s}"))),
        }
    }
}

impl From<String> for PaymentEventStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid payment event status: {value}. But this conversion cannot fail. Defaulting to Pending");
            PaymentEventStatus::Pending
        })
    }
}

//--------------------------------------    PaymentEvent       -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub id: i64,
    /// Idempotency key, derived from order id, transaction id and event type.
    pub event_id: String,
    pub order_id: OrderId,
    /// The provider's transaction identifier.
    pub txid: String,
    pub event_type: PaymentEventType,
    pub status: PaymentEventStatus,
    pub retry_count: i64,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub in_dead_letter: bool,
    pub dead_letter_reason: Option<String>,
    pub last_error: Option<String>,
    /// The raw provider payload, kept verbatim for audit and debugging.
    pub raw: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------   NewPaymentEvent     -------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPaymentEvent {
    pub order_id: OrderId,
    pub txid: String,
    pub event_type: PaymentEventType,
    pub raw: String,
}

impl NewPaymentEvent {
    pub fn new(order_id: OrderId, txid: String, event_type: PaymentEventType) -> Self {
        Self { order_id, txid, event_type, raw: String::new() }
    }

    pub fn with_raw<S: Into<String>>(mut self, raw: S) -> Self {
        self.raw = raw.into();
        self
    }
}

//--------------------------------------       Tenant          -------------------------------------------------------
/// Per-tenant commission policy. The hold period starts counting at settlement.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Tenant {
    pub tenant_id: String,
    pub default_commission_percent: f64,
    pub hold_period_days: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------  ReferralResolution   -------------------------------------------------------
/// The result of resolving a referral code within a tenant.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ReferralResolution {
    pub agent_id: String,
    pub commission_percent: f64,
}
