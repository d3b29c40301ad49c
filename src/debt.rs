//! Debt guard: the financial field is system-managed
//!
//! `debt` can never be written through create or update. Create DTOs carry
//! no debt field at all; update payloads that mention the key — with any
//! value, including null — are rejected before anything else is validated.
//! The only ways debt changes are the explicit clear operations and the
//! backend adjustment path, both of which keep the non-negative invariant.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::NetworkError;
use crate::models::NetworkNodeUpdate;

/// Monetary amounts are stored with two fractional digits.
pub const DEBT_SCALE: u32 = 2;

/// Reject any update payload that mentions the debt field.
pub fn guard_update(update: &NetworkNodeUpdate) -> Result<(), NetworkError> {
    if update.debt.is_some() {
        return Err(NetworkError::DebtFieldImmutable);
    }
    Ok(())
}

/// Validate and normalize a backend-supplied debt amount.
pub fn check_amount(amount: Decimal) -> Result<Decimal, NetworkError> {
    if amount < Decimal::ZERO {
        return Err(NetworkError::NegativeDebt { amount });
    }
    Ok(amount.round_dp(DEBT_SCALE))
}

/// Result of clearing one node's debt; the prior value is reported for
/// auditing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebtCleared {
    pub old_debt: Decimal,
    pub new_debt: Decimal,
}

/// Result of a bulk clear over an id list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkDebtCleared {
    pub cleared_count: u64,
    pub total_debt_cleared: Decimal,
}
