//! The behaviour that a storage backend must provide in order to drive the commission ledger engine.
//!
//! The traits are split by concern, mirroring the public API layer: order/commission lifecycle
//! ([`CommissionLedgerDatabase`]), derived balance queries ([`BalanceManagement`]), withdrawal bookkeeping
//! ([`WithdrawalManagement`]), webhook event tracking ([`WebhookEventManagement`]) and referral/tenant resolution
//! ([`ReferralDirectory`]).

mod balance_management;
mod directory;
mod ledger_database;
mod webhook_management;
mod withdrawal_management;

pub use balance_management::BalanceManagement;
pub use directory::ReferralDirectory;
pub use ledger_database::{CommissionLedgerDatabase, CommissionLedgerError};
pub use webhook_management::{WebhookEventManagement, EVENT_RETRY_BACKOFF_SECS, MAX_EVENT_RETRIES};
pub use withdrawal_management::WithdrawalManagement;
