//! Small pure helpers used across the engine.

use acp_common::Money;
use sha2::{Digest, Sha256};

use crate::{db_types::PaymentEventType, traits::CommissionLedgerError};

/// Derives the commission amount for an order: `round2(amount * percent / 100)`, computed in minor units with
/// round-half-away-from-zero semantics.
///
/// Fails with [`CommissionLedgerError::InvalidCommissionConfig`] when the percent is negative or the order amount
/// is non-positive. A zero percent is legal and yields a zero commission.
pub fn calculate_commission(amount: Money, percent: f64) -> Result<Money, CommissionLedgerError> {
    if percent < 0.0 || !percent.is_finite() || !amount.is_positive() {
        return Err(CommissionLedgerError::InvalidCommissionConfig { percent, amount });
    }
    #[allow(clippy::cast_possible_truncation)]
    let cents = (amount.value() as f64 * percent / 100.0).round() as i64;
    Ok(Money::from(cents))
}

/// Derives the idempotency key for a payment webhook event. Re-deliveries of the same provider notification hash
/// to the same key, so they can never be applied twice.
pub fn payment_event_id(order_id: &str, txid: &str, event_type: PaymentEventType) -> String {
    let mut hasher = Sha256::new();
    hasher.update(order_id.as_bytes());
    hasher.update(b"|");
    hasher.update(txid.as_bytes());
    hasher.update(b"|");
    hasher.update(event_type.to_string().as_bytes());
    let digest = hasher.finalize();
    let hex = digest.iter().map(|b| format!("{b:02x}")).collect::<String>();
    hex[..32].to_string()
}
