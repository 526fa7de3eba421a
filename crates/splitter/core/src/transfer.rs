use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::entitlement::mul_div_floor;
use crate::error::{SplitterError, SplitterResult};
use crate::types::{AccountId, Amount, AssetId};

/// Outbound value rail: the native currency and token contracts.
///
/// Implementations map transfers onto whatever actually moves value. A
/// rail may call back into the splitter from inside `transfer`.
pub trait TransferRail: Send + Sync {
    fn balance_of(&self, asset: &AssetId, holder: &AccountId) -> SplitterResult<Amount>;

    fn transfer(
        &self,
        asset: &AssetId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> SplitterResult<()>;
}

/// What a transfer was asked to move and what actually arrived.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub requested: Amount,
    pub delivered: Amount,
}

impl Delivery {
    pub fn shortfall(&self) -> Amount {
        self.requested.saturating_sub(self.delivered)
    }
}

/// Wraps outbound transfers from the splitter's account.
///
/// Token deliveries are measured on the recipient's balance immediately
/// before and after the transfer, so fee-on-transfer and rebasing tokens are
/// booked at what they delivered rather than what was requested. Native
/// transfers either move the full amount or fail.
#[derive(Clone)]
pub struct TransferAdapter {
    rail: Arc<dyn TransferRail>,
    source: AccountId,
}

impl TransferAdapter {
    pub fn new(rail: Arc<dyn TransferRail>, source: AccountId) -> Self {
        Self { rail, source }
    }

    pub fn source(&self) -> &AccountId {
        &self.source
    }

    pub fn rail(&self) -> &Arc<dyn TransferRail> {
        &self.rail
    }

    /// Value of `asset` currently held by the splitter.
    pub fn held_balance(&self, asset: &AssetId) -> SplitterResult<Amount> {
        self.rail.balance_of(asset, &self.source)
    }

    pub fn deliver(
        &self,
        asset: &AssetId,
        to: &AccountId,
        amount: Amount,
    ) -> SplitterResult<Delivery> {
        match asset {
            AssetId::Native => {
                self.send(asset, to, amount)?;
                Ok(Delivery {
                    requested: amount,
                    delivered: amount,
                })
            }
            AssetId::Token(_) => {
                let before = self.rail.balance_of(asset, to)?;
                self.send(asset, to, amount)?;
                let after = self.rail.balance_of(asset, to)?;
                let delivered = after.saturating_sub(before);

                if delivered == 0 {
                    warn!(asset = %asset, payee = %to, requested = amount, "Token transfer delivered nothing");
                    return Err(SplitterError::TransferFailed {
                        asset: asset.clone(),
                        payee: to.clone(),
                        reason: "no value delivered".into(),
                    });
                }
                if delivered != amount {
                    debug!(
                        asset = %asset,
                        payee = %to,
                        requested = amount,
                        delivered = delivered,
                        "Token delivered a different amount than requested"
                    );
                }
                Ok(Delivery {
                    requested: amount,
                    delivered,
                })
            }
        }
    }

    fn send(&self, asset: &AssetId, to: &AccountId, amount: Amount) -> SplitterResult<()> {
        self.rail
            .transfer(asset, &self.source, to, amount)
            .map_err(|err| match err {
                SplitterError::TransferFailed { .. } | SplitterError::Reentrant => err,
                other => SplitterError::TransferFailed {
                    asset: asset.clone(),
                    payee: to.clone(),
                    reason: other.to_string(),
                },
            })
    }
}

/// Serializable state of an [`InMemoryRail`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RailState {
    #[serde(default)]
    pub balances: BTreeMap<AssetId, BTreeMap<AccountId, Amount>>,
    /// Per-token fee in basis points, burned on every transfer.
    #[serde(default)]
    pub transfer_fee_bps: BTreeMap<AccountId, u16>,
    /// Recipients that refuse native transfers.
    #[serde(default)]
    pub native_rejecting: BTreeSet<AccountId>,
}

/// In-process rail for tests, local demos, and the CLI.
#[derive(Debug, Default)]
pub struct InMemoryRail {
    inner: RwLock<RailState>,
}

impl InMemoryRail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: RailState) -> Self {
        Self {
            inner: RwLock::new(state),
        }
    }

    pub fn state(&self) -> SplitterResult<RailState> {
        Ok(self.read()?.clone())
    }

    /// Credit value to a holder out of band (a deposit into the splitter, a
    /// vault payout ...).
    pub fn mint(&self, asset: &AssetId, holder: &AccountId, amount: Amount) -> SplitterResult<()> {
        let mut state = self.write()?;
        let balance = state
            .balances
            .entry(asset.clone())
            .or_default()
            .entry(holder.clone())
            .or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(SplitterError::Arithmetic("rail balance exceeds u128"))?;
        Ok(())
    }

    /// Remove value from a holder out of band.
    pub fn burn(&self, asset: &AssetId, holder: &AccountId, amount: Amount) -> SplitterResult<()> {
        let mut state = self.write()?;
        let balance = state
            .balances
            .entry(asset.clone())
            .or_default()
            .entry(holder.clone())
            .or_insert(0);
        *balance = balance
            .checked_sub(amount)
            .ok_or(SplitterError::Arithmetic("rail balance below zero"))?;
        Ok(())
    }

    pub fn set_transfer_fee_bps(&self, token: &AccountId, bps: u16) -> SplitterResult<()> {
        self.write()?
            .transfer_fee_bps
            .insert(token.clone(), bps.min(10_000));
        Ok(())
    }

    pub fn reject_native_transfers_to(&self, recipient: &AccountId) -> SplitterResult<()> {
        self.write()?.native_rejecting.insert(recipient.clone());
        Ok(())
    }

    fn read(&self) -> SplitterResult<std::sync::RwLockReadGuard<'_, RailState>> {
        self.inner
            .read()
            .map_err(|_| SplitterError::Storage("rail lock poisoned".into()))
    }

    fn write(&self) -> SplitterResult<std::sync::RwLockWriteGuard<'_, RailState>> {
        self.inner
            .write()
            .map_err(|_| SplitterError::Storage("rail lock poisoned".into()))
    }
}

impl TransferRail for InMemoryRail {
    fn balance_of(&self, asset: &AssetId, holder: &AccountId) -> SplitterResult<Amount> {
        Ok(self
            .read()?
            .balances
            .get(asset)
            .and_then(|holders| holders.get(holder))
            .copied()
            .unwrap_or(0))
    }

    fn transfer(
        &self,
        asset: &AssetId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> SplitterResult<()> {
        let mut state = self.write()?;
        let failed = |reason: &str| SplitterError::TransferFailed {
            asset: asset.clone(),
            payee: to.clone(),
            reason: reason.to_string(),
        };

        if asset.is_native() && state.native_rejecting.contains(to) {
            return Err(failed("recipient rejected native transfer"));
        }

        let fee = match asset.token_contract() {
            Some(token) => {
                let bps = state.transfer_fee_bps.get(token).copied().unwrap_or(0);
                mul_div_floor(amount, bps as u64, 10_000)?
            }
            None => 0,
        };

        let holders = state.balances.entry(asset.clone()).or_default();
        let from_balance = holders.get(from).copied().unwrap_or(0);
        let remaining = from_balance
            .checked_sub(amount)
            .ok_or_else(|| failed("insufficient balance"))?;
        holders.insert(from.clone(), remaining);

        let credited = amount - fee;
        let to_balance = holders.entry(to.clone()).or_insert(0);
        *to_balance = to_balance
            .checked_add(credited)
            .ok_or(SplitterError::Arithmetic("rail balance exceeds u128"))?;
        Ok(())
    }
}
