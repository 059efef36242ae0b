//! # Commission ledger public API
//!
//! The `ledger_api` module exposes the programmatic API for the commission ledger engine. The API is modular, so
//! that clients can pick and choose the functionality they need, and different parts could be served by different
//! backends.
//!
//! * [`order_flow_api`] handles the order and commission lifecycle: intake, settlement, release, and the explicit
//!   admin overrides.
//! * [`balance_api`] provides derived balance and commission history queries.
//! * [`withdrawal_api`] files, approves and rejects withdrawal requests.
//! * [`webhook_api`] reconciles payment provider webhook events against the ledger.
//!
//! The pattern for using all the APIs is the same. An API instance is created by supplying a database backend that
//! implements the specific backend traits required by the API.
//!
//! ```rust,ignore
//! use commission_engine::{BalanceApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! // SqliteDatabase implements BalanceManagement
//! let api = BalanceApi::new(db, min_withdrawal);
//! let balance = api.balance_for_agent("agent-1", "tenant-1").await?;
//! ```

pub mod balance_api;
pub mod ledger_objects;
pub mod order_flow_api;
pub mod webhook_api;
pub mod withdrawal_api;
