//! Commission Ledger Engine
//!
//! The commission ledger engine tracks referral commissions for a multi-tenant storefront platform: it computes a
//! commission when an order attributed to an agent is created, holds it until the order has settled and the hold
//! period has lapsed, releases it for withdrawal, and reconciles the whole lifecycle against asynchronous payment
//! provider webhooks.
//!
//! The library is divided into two main sections:
//! 1. Database management and control ([`mod@sqlite`]). You should never need to access the database directly.
//!    Instead, use the public API provided by the engine. The exception is the data types used in the database,
//!    which are defined in the `db_types` module and are public.
//! 2. The engine public API ([`mod@ledger_api`]). This provides the public-facing functionality of the ledger:
//!    order intake, settlement and release, balances, withdrawals and webhook reconciliation. Specific backends
//!    need to implement the traits in the [`mod@traits`] module in order to act as a backend for the server.
//!
//! The engine also provides a set of events that can be subscribed to, emitted when a commission settles, becomes
//! available, or a withdrawal is approved. A simple actor framework is used so that a notification dispatcher can
//! hook into these events without ever blocking a ledger transition.

pub mod db_types;
pub mod events;
pub mod helpers;
mod ledger_api;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use ledger_api::{
    balance_api::BalanceApi,
    ledger_objects,
    order_flow_api::CommissionFlowApi,
    webhook_api::{WebhookApi, WebhookOutcome},
    withdrawal_api::WithdrawalApi,
};
pub use traits::CommissionLedgerError;
