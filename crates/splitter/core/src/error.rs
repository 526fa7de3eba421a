use thiserror::Error;

use crate::types::{AccountId, AdminAction, Amount, AssetId};

pub type SplitterResult<T> = Result<T, SplitterError>;

/// Errors from the splitter ledger.
///
/// Every error aborts the whole operation; nothing is partially applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SplitterError {
    // --- Validation ---
    #[error("account is the zero address")]
    ZeroAddress,

    #[error("payee {payee} has zero shares")]
    ZeroShares { payee: AccountId },

    #[error("payee {payee} already has shares")]
    DuplicatePayee { payee: AccountId },

    #[error("payees and shares length mismatch: {payees} payees, {shares} shares")]
    LengthMismatch { payees: usize, shares: usize },

    #[error("roster must contain at least one payee")]
    EmptyRoster,

    #[error("asset {0} listed more than once")]
    DuplicateAsset(AssetId),

    #[error("invalid asset identifier: {0:?}")]
    InvalidAsset(String),

    #[error("amount must be positive")]
    ZeroAmount,

    // --- Entitlement ---
    #[error("account {payee} has no shares and no credit for {asset}")]
    NoEntitlement { asset: AssetId, payee: AccountId },

    #[error("account {payee} is not due payment in {asset}")]
    NothingDue { asset: AssetId, payee: AccountId },

    // --- Transfer ---
    #[error("transfer of {asset} to {payee} failed: {reason}")]
    TransferFailed {
        asset: AssetId,
        payee: AccountId,
        reason: String,
    },

    // --- Precondition ---
    #[error("payee {payee} still has {amount} unclaimed in {asset}")]
    UnclaimedBalance {
        asset: AssetId,
        payee: AccountId,
        amount: Amount,
    },

    #[error("asset {asset} holds {balance} but is missing from the checkpoint scope")]
    UnlistedAsset { asset: AssetId, balance: Amount },

    // --- Access ---
    #[error("caller {caller} is not authorized to {action}")]
    Unauthorized {
        caller: AccountId,
        action: AdminAction,
    },

    // --- Lifecycle ---
    #[error("splitter is paused")]
    Paused,

    #[error("splitter is not paused")]
    NotPaused,

    #[error("reentrant call rejected: another mutating operation is in progress")]
    Reentrant,

    // --- Internal ---
    #[error("arithmetic overflow: {0}")]
    Arithmetic(&'static str),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("vault error: {0}")]
    Vault(String),
}

/// Coarse error category, letting callers decide to retry, alert, or give up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Structurally invalid request, rejected before any state change.
    Validation,
    /// Nothing to pay.
    Entitlement,
    /// The asset or recipient misbehaved.
    Transfer,
    /// Ledger state does not permit the operation yet.
    Precondition,
    Access,
    Lifecycle,
    Internal,
}

impl SplitterError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SplitterError::ZeroAddress
            | SplitterError::ZeroShares { .. }
            | SplitterError::DuplicatePayee { .. }
            | SplitterError::LengthMismatch { .. }
            | SplitterError::EmptyRoster
            | SplitterError::DuplicateAsset(_)
            | SplitterError::InvalidAsset(_)
            | SplitterError::ZeroAmount => ErrorClass::Validation,
            SplitterError::NoEntitlement { .. } | SplitterError::NothingDue { .. } => {
                ErrorClass::Entitlement
            }
            SplitterError::TransferFailed { .. } => ErrorClass::Transfer,
            SplitterError::UnclaimedBalance { .. } | SplitterError::UnlistedAsset { .. } => {
                ErrorClass::Precondition
            }
            SplitterError::Unauthorized { .. } => ErrorClass::Access,
            SplitterError::Paused | SplitterError::NotPaused | SplitterError::Reentrant => {
                ErrorClass::Lifecycle
            }
            SplitterError::Arithmetic(_)
            | SplitterError::Storage(_)
            | SplitterError::Serialization(_)
            | SplitterError::Vault(_) => ErrorClass::Internal,
        }
    }

    /// Whether the same call may succeed later without changing the request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SplitterError::TransferFailed { .. } | SplitterError::Paused | SplitterError::Reentrant
        )
    }
}

impl From<serde_json::Error> for SplitterError {
    fn from(err: serde_json::Error) -> Self {
        SplitterError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_separate_nothing_to_do_from_invalid_and_misbehaving() {
        let nothing = SplitterError::NothingDue {
            asset: AssetId::Native,
            payee: AccountId::new("alice"),
        };
        assert_eq!(nothing.class(), ErrorClass::Entitlement);
        assert!(!nothing.is_retryable());

        assert_eq!(
            SplitterError::DuplicatePayee {
                payee: AccountId::new("alice")
            }
            .class(),
            ErrorClass::Validation
        );

        let failed = SplitterError::TransferFailed {
            asset: AssetId::token("fee"),
            payee: AccountId::new("bob"),
            reason: "no value delivered".into(),
        };
        assert_eq!(failed.class(), ErrorClass::Transfer);
        assert!(failed.is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SplitterError::UnclaimedBalance {
            asset: AssetId::token("usdc"),
            payee: AccountId::new("carol"),
            amount: 42,
        };
        let s = err.to_string();
        assert!(s.contains("carol"));
        assert!(s.contains("42"));
        assert!(s.contains("token:usdc"));
    }
}
