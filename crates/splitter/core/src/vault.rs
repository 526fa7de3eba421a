use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::entitlement::mul_div_floor;
use crate::error::{SplitterError, SplitterResult};
use crate::transfer::InMemoryRail;
use crate::types::{AccountId, Amount, AssetId};

/// External yield-bearing vault holding value on the splitter's behalf.
///
/// Redemption output lands in the receiver's balance of [`underlying`]
/// and from then on is ordinary incoming value. Nothing here touches
/// entitlement state.
///
/// [`underlying`]: VaultAdapter::underlying
pub trait VaultAdapter: Send + Sync {
    fn vault_id(&self) -> &str;

    /// The distributable asset the vault pays out.
    fn underlying(&self) -> AssetId;

    /// Underlying assets `shares` would redeem for.
    fn preview_redeem(&self, shares: Amount) -> SplitterResult<Amount>;

    /// Vault shares a withdrawal of `assets` would burn.
    fn preview_withdraw(&self, assets: Amount) -> SplitterResult<Amount>;

    fn max_redeem(&self, owner: &AccountId) -> SplitterResult<Amount>;

    fn max_withdraw(&self, owner: &AccountId) -> SplitterResult<Amount>;

    /// Burn `shares` of `owner` and pay the underlying to `receiver`.
    /// Returns the assets paid.
    fn redeem(
        &self,
        shares: Amount,
        receiver: &AccountId,
        owner: &AccountId,
    ) -> SplitterResult<Amount>;

    /// Pay exactly `assets` of the underlying to `receiver`, burning shares
    /// of `owner`. Returns the shares burned.
    fn withdraw(
        &self,
        assets: Amount,
        receiver: &AccountId,
        owner: &AccountId,
    ) -> SplitterResult<Amount>;
}

/// Outcome of a vault redemption or withdrawal performed by the splitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultRedemption {
    pub vault: String,
    pub asset: AssetId,
    /// Vault shares burned.
    pub shares: Amount,
    /// Underlying received, measured on the splitter's balance.
    pub received: Amount,
}

/// Fixed-rate vault paying out through an [`InMemoryRail`].
///
/// One share is worth `rate_num / rate_den` units of the underlying.
pub struct InMemoryVault {
    id: String,
    underlying: AssetId,
    rail: Arc<InMemoryRail>,
    rate_num: u64,
    rate_den: u64,
    shares: Mutex<BTreeMap<AccountId, Amount>>,
}

impl InMemoryVault {
    pub fn new(
        id: impl Into<String>,
        underlying: AssetId,
        rail: Arc<InMemoryRail>,
        rate_num: u64,
        rate_den: u64,
    ) -> SplitterResult<Self> {
        if rate_num == 0 || rate_den == 0 {
            return Err(SplitterError::Vault("share rate must be positive".into()));
        }
        Ok(Self {
            id: id.into(),
            underlying,
            rail,
            rate_num,
            rate_den,
            shares: Mutex::new(BTreeMap::new()),
        })
    }

    /// Issue vault shares to `owner` without taking a deposit.
    pub fn issue_shares(&self, owner: &AccountId, shares: Amount) -> SplitterResult<()> {
        let mut book = self.book()?;
        let balance = book.entry(owner.clone()).or_insert(0);
        *balance = balance
            .checked_add(shares)
            .ok_or(SplitterError::Arithmetic("vault shares exceed u128"))?;
        Ok(())
    }

    pub fn shares_of(&self, owner: &AccountId) -> SplitterResult<Amount> {
        Ok(self.book()?.get(owner).copied().unwrap_or(0))
    }

    fn book(&self) -> SplitterResult<std::sync::MutexGuard<'_, BTreeMap<AccountId, Amount>>> {
        self.shares
            .lock()
            .map_err(|_| SplitterError::Vault("vault lock poisoned".into()))
    }

    fn burn_and_pay(
        &self,
        owner: &AccountId,
        receiver: &AccountId,
        shares: Amount,
        assets: Amount,
    ) -> SplitterResult<()> {
        let mut book = self.book()?;
        let held = book.get(owner).copied().unwrap_or(0);
        let remaining = held.checked_sub(shares).ok_or_else(|| {
            SplitterError::Vault(format!("{owner} holds {held} shares, needs {shares}"))
        })?;
        self.rail.mint(&self.underlying, receiver, assets)?;
        book.insert(owner.clone(), remaining);
        Ok(())
    }
}

impl VaultAdapter for InMemoryVault {
    fn vault_id(&self) -> &str {
        &self.id
    }

    fn underlying(&self) -> AssetId {
        self.underlying.clone()
    }

    fn preview_redeem(&self, shares: Amount) -> SplitterResult<Amount> {
        mul_div_floor(shares, self.rate_num, self.rate_den)
    }

    fn preview_withdraw(&self, assets: Amount) -> SplitterResult<Amount> {
        // Round up so the withdrawal is always covered.
        let shares = mul_div_floor(assets, self.rate_den, self.rate_num)?;
        if self.preview_redeem(shares)? < assets {
            shares
                .checked_add(1)
                .ok_or(SplitterError::Arithmetic("vault shares exceed u128"))
        } else {
            Ok(shares)
        }
    }

    fn max_redeem(&self, owner: &AccountId) -> SplitterResult<Amount> {
        self.shares_of(owner)
    }

    fn max_withdraw(&self, owner: &AccountId) -> SplitterResult<Amount> {
        self.preview_redeem(self.shares_of(owner)?)
    }

    fn redeem(
        &self,
        shares: Amount,
        receiver: &AccountId,
        owner: &AccountId,
    ) -> SplitterResult<Amount> {
        let assets = self.preview_redeem(shares)?;
        self.burn_and_pay(owner, receiver, shares, assets)?;
        Ok(assets)
    }

    fn withdraw(
        &self,
        assets: Amount,
        receiver: &AccountId,
        owner: &AccountId,
    ) -> SplitterResult<Amount> {
        let shares = self.preview_withdraw(assets)?;
        self.burn_and_pay(owner, receiver, shares, assets)?;
        Ok(shares)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::TransferRail;

    fn vault(rail: &Arc<InMemoryRail>) -> InMemoryVault {
        // 1 share = 1.5 underlying
        InMemoryVault::new("yv-usdc", AssetId::token("usdc"), rail.clone(), 3, 2).unwrap()
    }

    #[test]
    fn redeem_pays_underlying() {
        let rail = Arc::new(InMemoryRail::new());
        let vault = vault(&rail);
        let owner = AccountId::new("splitter");
        vault.issue_shares(&owner, 100).unwrap();

        assert_eq!(vault.max_withdraw(&owner).unwrap(), 150);
        assert_eq!(vault.redeem(10, &owner, &owner).unwrap(), 15);
        assert_eq!(rail.balance_of(&AssetId::token("usdc"), &owner).unwrap(), 15);
        assert_eq!(vault.max_redeem(&owner).unwrap(), 90);
    }

    #[test]
    fn withdraw_rounds_shares_up() {
        let rail = Arc::new(InMemoryRail::new());
        let vault = vault(&rail);
        let owner = AccountId::new("splitter");
        vault.issue_shares(&owner, 100).unwrap();

        assert_eq!(vault.preview_withdraw(4).unwrap(), 3);
        assert_eq!(vault.withdraw(4, &owner, &owner).unwrap(), 3);
        assert_eq!(vault.shares_of(&owner).unwrap(), 97);
        assert_eq!(rail.balance_of(&AssetId::token("usdc"), &owner).unwrap(), 4);
    }

    #[test]
    fn overdrawn_redeem_leaves_no_trace() {
        let rail = Arc::new(InMemoryRail::new());
        let vault = vault(&rail);
        let owner = AccountId::new("splitter");
        vault.issue_shares(&owner, 5).unwrap();

        assert!(matches!(
            vault.redeem(6, &owner, &owner),
            Err(SplitterError::Vault(_))
        ));
        assert_eq!(vault.shares_of(&owner).unwrap(), 5);
        assert_eq!(rail.balance_of(&AssetId::token("usdc"), &owner).unwrap(), 0);
    }

    #[test]
    fn zero_rate_is_rejected() {
        let rail = Arc::new(InMemoryRail::new());
        assert!(InMemoryVault::new("v", AssetId::Native, rail, 0, 1).is_err());
    }
}
