//! Pull-based payment splitter ledger.
//!
//! Value accumulates on the splitter's account and each payee withdraws its
//! proportional share independently. Entitlement is derived from the held
//! balance and cumulative release counters, so deposits need no bookkeeping.
//! The roster can be replaced while funds are unclaimed: a checkpoint
//! freezes every outstanding entitlement into roster-independent credit
//! first. Token payouts are booked at the amount actually delivered, which
//! keeps the ledger consistent for fee-on-transfer and rebasing assets.

#![deny(unsafe_code)]

pub mod config;
pub mod entitlement;
pub mod error;
pub mod events;
pub mod gate;
pub mod guard;
pub mod ledger;
pub mod roster;
pub mod splitter;
pub mod store;
pub mod transfer;
pub mod types;
pub mod vault;

pub use config::{ScopePolicy, SplitterConfig};
pub use entitlement::{mul_div_floor, pending_payment, EntitlementInputs};
pub use error::{ErrorClass, SplitterError, SplitterResult};
pub use events::{EventJournal, JournalEntry, SplitterEvent};
pub use gate::{AccessGate, AdminSet};
pub use guard::{GuardScope, ReentrancyGuard};
pub use ledger::{AssetLedger, LedgerState};
pub use roster::Roster;
pub use splitter::{CheckpointReport, PayeeStatement, PaymentSplitter, ReleaseReceipt};
pub use store::{LedgerStore, StoreConfig};
pub use transfer::{Delivery, InMemoryRail, RailState, TransferAdapter, TransferRail};
pub use types::{AccountId, AdminAction, Amount, AssetId, CreditGrant, PayeeShare, Shares};
pub use vault::{InMemoryVault, VaultAdapter, VaultRedemption};
