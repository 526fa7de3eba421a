//! Entitlement calculator.
//!
//! A payee's outstanding claim is derived, never stored:
//!
//! ```text
//! received    = balance + total_released + epoch_shortfall
//!               - outstanding_credit - epoch_base
//! outstanding = max(0, floor(received * shares / total_shares) - released)
//! ```
//!
//! `balance + total_released` is everything the asset ledger has ever
//! received, so deposits never need individual bookkeeping. Credit is booked
//! as released when it is granted but stays in the balance until paid, so
//! outstanding credit is taken back out. `epoch_base` is the part of the
//! received total already fully allocated by the last checkpoint or reset,
//! and `released` counts what the payee took since then. `epoch_shortfall`
//! is value paid out in the epoch that never arrived: it was already counted
//! against the payee it went to, so it stays in everyone's basis. Before the
//! first roster replacement, and without lossy transfers, all of these are
//! zero and `released` is the payee's lifetime total.
//!
//! Truncating division leaves at most `payees - 1` units of dust per asset,
//! owed to no one.

use crate::error::{SplitterError, SplitterResult};
use crate::types::{Amount, Shares};

/// Inputs for one payee on one asset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EntitlementInputs {
    /// Value currently held by the splitter.
    pub balance: Amount,
    /// Value ever released to all payees (credits included).
    pub total_released: Amount,
    /// Credit granted but not yet paid.
    pub outstanding_credit: Amount,
    /// Received total already allocated at the start of the current epoch.
    pub epoch_base: Amount,
    /// Paid out in the current epoch but lost in transit.
    pub epoch_shortfall: Amount,
    /// Entitlement released to this payee in the current epoch.
    pub payee_released: Amount,
    pub payee_shares: Shares,
    pub total_shares: Shares,
}

/// Outstanding entitlement, excluding credit.
///
/// A payee with zero shares is never owed anything here; credit is paid
/// through a separate path.
pub fn pending_payment(inputs: &EntitlementInputs) -> SplitterResult<Amount> {
    if inputs.payee_shares == 0 || inputs.total_shares == 0 {
        return Ok(0);
    }

    let received = inputs
        .balance
        .checked_add(inputs.total_released)
        .ok_or(SplitterError::Arithmetic("total received exceeds u128"))?
        .checked_add(inputs.epoch_shortfall)
        .ok_or(SplitterError::Arithmetic("total received exceeds u128"))?
        .saturating_sub(inputs.outstanding_credit)
        .saturating_sub(inputs.epoch_base);
    let accrued = mul_div_floor(received, inputs.payee_shares, inputs.total_shares)?;

    Ok(accrued.saturating_sub(inputs.payee_released))
}

/// `floor(amount * numerator / denominator)` without a wide intermediate.
///
/// Splits `amount = q * denominator + r`; both partial products fit in
/// u128 because `r < denominator <= u64::MAX`.
pub fn mul_div_floor(
    amount: Amount,
    numerator: Shares,
    denominator: Shares,
) -> SplitterResult<Amount> {
    if denominator == 0 {
        return Err(SplitterError::Arithmetic("division by zero share total"));
    }
    let numerator = numerator as u128;
    let denominator = denominator as u128;

    let whole = (amount / denominator)
        .checked_mul(numerator)
        .ok_or(SplitterError::Arithmetic("entitlement exceeds u128"))?;
    let fraction = (amount % denominator) * numerator / denominator;

    whole
        .checked_add(fraction)
        .ok_or(SplitterError::Arithmetic("entitlement exceeds u128"))
}
