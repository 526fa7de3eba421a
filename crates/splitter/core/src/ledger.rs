use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entitlement::{pending_payment, EntitlementInputs};
use crate::error::{SplitterError, SplitterResult};
use crate::roster::Roster;
use crate::types::{AccountId, Amount, AssetId};

/// Release and credit counters for one asset.
///
/// Lifetime release counters only grow, except when a short delivery is
/// reconciled against what was booked for the same release. Credit is
/// booked as released at the moment it is granted.
///
/// A short delivery leaves the epoch's basis untouched: the shortfall is
/// tracked separately so only the payee who was paid short carries it.
///
/// A roster replacement opens a new epoch: the received total at that point
/// becomes the epoch base and the per-payee epoch counters restart, so the
/// incoming roster only shares in value received afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetLedger {
    total_released: Amount,
    released: BTreeMap<AccountId, Amount>,
    credit: BTreeMap<AccountId, Amount>,
    #[serde(default)]
    epoch_base: Amount,
    #[serde(default)]
    epoch_released: BTreeMap<AccountId, Amount>,
    #[serde(default)]
    epoch_shortfall: Amount,
}

impl AssetLedger {
    pub fn total_released(&self) -> Amount {
        self.total_released
    }

    pub fn released(&self, payee: &AccountId) -> Amount {
        self.released.get(payee).copied().unwrap_or(0)
    }

    pub fn credit(&self, payee: &AccountId) -> Amount {
        self.credit.get(payee).copied().unwrap_or(0)
    }

    /// Sum of all outstanding credits.
    pub fn total_credit(&self) -> Amount {
        self.credit
            .values()
            .fold(0, |acc: Amount, amount| acc.saturating_add(*amount))
    }

    pub fn credited_payees(&self) -> impl Iterator<Item = (&AccountId, Amount)> {
        self.credit.iter().map(|(payee, amount)| (payee, *amount))
    }

    pub fn epoch_base(&self) -> Amount {
        self.epoch_base
    }

    /// Value paid out since the current epoch opened that never arrived.
    pub fn epoch_shortfall(&self) -> Amount {
        self.epoch_shortfall
    }

    /// Entitlement released to `payee` since the current epoch opened.
    pub fn epoch_released(&self, payee: &AccountId) -> Amount {
        self.epoch_released.get(payee).copied().unwrap_or(0)
    }

    /// Everything received given the current `balance`: held value plus
    /// value actually paid out.
    pub fn received(&self, balance: Amount) -> SplitterResult<Amount> {
        Ok(balance
            .checked_add(self.total_released)
            .ok_or(SplitterError::Arithmetic("total received exceeds u128"))?
            .saturating_sub(self.total_credit()))
    }

    pub(crate) fn book_release(&mut self, payee: &AccountId, amount: Amount) -> SplitterResult<()> {
        let total = self
            .total_released
            .checked_add(amount)
            .ok_or(SplitterError::Arithmetic("total released exceeds u128"))?;
        let entry = self.released.entry(payee.clone()).or_insert(0);
        *entry = entry
            .checked_add(amount)
            .ok_or(SplitterError::Arithmetic("payee released exceeds u128"))?;
        self.total_released = total;
        Ok(())
    }

    /// Book freshly computed entitlement, counting it against the epoch too.
    pub(crate) fn book_entitlement(
        &mut self,
        payee: &AccountId,
        amount: Amount,
    ) -> SplitterResult<()> {
        let epoch = self
            .epoch_released(payee)
            .checked_add(amount)
            .ok_or(SplitterError::Arithmetic("epoch released exceeds u128"))?;
        self.book_release(payee, amount)?;
        self.epoch_released.insert(payee.clone(), epoch);
        Ok(())
    }

    /// Take back the undelivered part of a release. Lifetime counters drop
    /// to what actually arrived while the epoch keeps the full amount as paid
    /// to `payee`, so the loss stays with that payee.
    pub(crate) fn unbook_shortfall(
        &mut self,
        payee: &AccountId,
        amount: Amount,
    ) -> SplitterResult<()> {
        let shortfall = self
            .epoch_shortfall
            .checked_add(amount)
            .ok_or(SplitterError::Arithmetic("epoch shortfall exceeds u128"))?;
        self.unbook_lifetime(payee, amount)?;
        self.epoch_shortfall = shortfall;
        Ok(())
    }

    fn unbook_lifetime(&mut self, payee: &AccountId, amount: Amount) -> SplitterResult<()> {
        let payee_released = self
            .released(payee)
            .checked_sub(amount)
            .ok_or(SplitterError::Arithmetic("payee released below zero"))?;
        let total = self
            .total_released
            .checked_sub(amount)
            .ok_or(SplitterError::Arithmetic("total released below zero"))?;
        self.released.insert(payee.clone(), payee_released);
        self.total_released = total;
        Ok(())
    }

    /// Freeze `amount` into the payee's credit, counting it as released.
    pub(crate) fn grant_credit(&mut self, payee: &AccountId, amount: Amount) -> SplitterResult<()> {
        let credit = self
            .credit(payee)
            .checked_add(amount)
            .ok_or(SplitterError::Arithmetic("credit exceeds u128"))?;
        self.book_release(payee, amount)?;
        self.credit.insert(payee.clone(), credit);
        Ok(())
    }

    /// Remove and return the payee's credit.
    pub(crate) fn take_credit(&mut self, payee: &AccountId) -> Amount {
        self.credit.remove(payee).unwrap_or(0)
    }

    /// Open a new epoch at the current received total.
    pub(crate) fn start_epoch(&mut self, balance: Amount) -> SplitterResult<()> {
        self.epoch_base = self.received(balance)?;
        self.epoch_released.clear();
        self.epoch_shortfall = 0;
        Ok(())
    }
}

/// Everything the splitter owns besides the assets themselves.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    pub(crate) roster: Roster,
    pub(crate) assets: BTreeMap<AssetId, AssetLedger>,
    pub(crate) paused: bool,
}

impl LedgerState {
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn asset(&self, asset: &AssetId) -> Option<&AssetLedger> {
        self.assets.get(asset)
    }

    pub(crate) fn asset_mut(&mut self, asset: &AssetId) -> &mut AssetLedger {
        self.assets.entry(asset.clone()).or_default()
    }

    pub fn total_released(&self, asset: &AssetId) -> Amount {
        self.asset(asset).map_or(0, AssetLedger::total_released)
    }

    pub fn released(&self, asset: &AssetId, payee: &AccountId) -> Amount {
        self.asset(asset).map_or(0, |ledger| ledger.released(payee))
    }

    pub fn credit(&self, asset: &AssetId, payee: &AccountId) -> Amount {
        self.asset(asset).map_or(0, |ledger| ledger.credit(payee))
    }

    /// Token contracts with any ledger history.
    pub fn known_tokens(&self) -> Vec<AccountId> {
        self.assets
            .keys()
            .filter_map(|asset| asset.token_contract().cloned())
            .collect()
    }

    /// Raw outstanding entitlement of `payee` given the splitter's current
    /// `balance` of `asset`. Credit is not included.
    pub fn entitlement(
        &self,
        asset: &AssetId,
        payee: &AccountId,
        balance: Amount,
    ) -> SplitterResult<Amount> {
        let ledger = self.asset(asset);
        pending_payment(&EntitlementInputs {
            balance,
            total_released: ledger.map_or(0, AssetLedger::total_released),
            outstanding_credit: ledger.map_or(0, AssetLedger::total_credit),
            epoch_base: ledger.map_or(0, AssetLedger::epoch_base),
            epoch_shortfall: ledger.map_or(0, AssetLedger::epoch_shortfall),
            payee_released: ledger.map_or(0, |ledger| ledger.epoch_released(payee)),
            payee_shares: self.roster.shares_of(payee),
            total_shares: self.roster.total_shares(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PayeeShare;

    fn payee(name: &str) -> AccountId {
        AccountId::new(name)
    }

    #[test]
    fn grant_credit_counts_as_released() {
        let mut ledger = AssetLedger::default();
        ledger.grant_credit(&payee("alice"), 40).unwrap();
        ledger.grant_credit(&payee("alice"), 2).unwrap();
        assert_eq!(ledger.credit(&payee("alice")), 42);
        assert_eq!(ledger.released(&payee("alice")), 42);
        assert_eq!(ledger.total_released(), 42);
        assert_eq!(ledger.total_credit(), 42);

        assert_eq!(ledger.take_credit(&payee("alice")), 42);
        assert_eq!(ledger.credit(&payee("alice")), 0);
        assert_eq!(ledger.released(&payee("alice")), 42);
    }

    #[test]
    fn unbook_cannot_go_negative() {
        let mut ledger = AssetLedger::default();
        ledger.book_release(&payee("alice"), 10).unwrap();
        ledger.unbook_shortfall(&payee("alice"), 4).unwrap();
        assert_eq!(ledger.released(&payee("alice")), 6);
        assert_eq!(ledger.total_released(), 6);
        assert!(ledger.unbook_shortfall(&payee("alice"), 7).is_err());
        assert_eq!(ledger.total_released(), 6);
        assert_eq!(ledger.epoch_shortfall(), 4);
    }

    #[test]
    fn entitlement_uses_roster_and_counters() {
        let mut state = LedgerState {
            roster: Roster::from_entries(&[PayeeShare::new("a", 3), PayeeShare::new("b", 1)])
                .unwrap(),
            ..LedgerState::default()
        };
        assert_eq!(
            state.entitlement(&AssetId::Native, &payee("a"), 1000).unwrap(),
            750
        );

        state
            .asset_mut(&AssetId::Native)
            .book_entitlement(&payee("a"), 750)
            .unwrap();
        assert_eq!(
            state.entitlement(&AssetId::Native, &payee("a"), 250).unwrap(),
            0
        );
        assert_eq!(
            state.entitlement(&AssetId::Native, &payee("b"), 350).unwrap(),
            275
        );
        assert_eq!(
            state.entitlement(&AssetId::Native, &payee("z"), 350).unwrap(),
            0
        );
    }

    #[test]
    fn new_epoch_shares_only_later_receipts() {
        let mut state = LedgerState {
            roster: Roster::from_entries(&[PayeeShare::new("a", 1), PayeeShare::new("b", 1)])
                .unwrap(),
            ..LedgerState::default()
        };
        let ledger = state.asset_mut(&AssetId::Native);
        ledger.grant_credit(&payee("a"), 50).unwrap();
        ledger.grant_credit(&payee("b"), 50).unwrap();
        ledger.start_epoch(100).unwrap();
        assert_eq!(ledger.epoch_base(), 100);
        assert_eq!(ledger.received(100).unwrap(), 100);

        // Same roster, nothing new: only the credits are owed.
        assert_eq!(
            state.entitlement(&AssetId::Native, &payee("a"), 100).unwrap(),
            0
        );
        // 40 more arrives.
        assert_eq!(
            state.entitlement(&AssetId::Native, &payee("a"), 140).unwrap(),
            20
        );
    }

    #[test]
    fn shortfall_stays_with_the_paid_payee() {
        let mut state = LedgerState {
            roster: Roster::from_entries(&[PayeeShare::new("a", 1), PayeeShare::new("b", 1)])
                .unwrap(),
            ..LedgerState::default()
        };
        // 200 received; a is paid 100 and 1 of it is lost on the way.
        let ledger = state.asset_mut(&AssetId::Native);
        ledger.book_entitlement(&payee("a"), 100).unwrap();
        ledger.unbook_shortfall(&payee("a"), 1).unwrap();
        assert_eq!(ledger.released(&payee("a")), 99);
        assert_eq!(ledger.epoch_released(&payee("a")), 100);
        assert_eq!(ledger.received(100).unwrap(), 199);

        assert_eq!(
            state.entitlement(&AssetId::Native, &payee("a"), 100).unwrap(),
            0
        );
        assert_eq!(
            state.entitlement(&AssetId::Native, &payee("b"), 100).unwrap(),
            100
        );
    }

    #[test]
    fn short_credit_payout_leaves_next_epoch_whole() {
        let mut state = LedgerState {
            roster: Roster::from_entries(&[PayeeShare::new("b", 1)]).unwrap(),
            ..LedgerState::default()
        };
        let ledger = state.asset_mut(&AssetId::Native);
        ledger.grant_credit(&payee("a"), 100).unwrap();
        ledger.start_epoch(100).unwrap();
        assert_eq!(ledger.epoch_base(), 100);

        // The credit goes out and one unit is lost in transit.
        assert_eq!(ledger.take_credit(&payee("a")), 100);
        ledger.unbook_shortfall(&payee("a"), 1).unwrap();
        assert_eq!(ledger.released(&payee("a")), 99);
        assert_eq!(ledger.epoch_released(&payee("a")), 0);
        assert_eq!(ledger.epoch_base(), 100);

        assert_eq!(
            state.entitlement(&AssetId::Native, &payee("b"), 0).unwrap(),
            0
        );
        assert_eq!(
            state.entitlement(&AssetId::Native, &payee("b"), 100).unwrap(),
            100
        );

        let ledger = state.asset_mut(&AssetId::Native);
        ledger.start_epoch(100).unwrap();
        assert_eq!(ledger.epoch_shortfall(), 0);
        assert_eq!(ledger.epoch_base(), 199);
    }

    #[test]
    fn known_tokens_skips_native() {
        let mut state = LedgerState::default();
        state.asset_mut(&AssetId::Native);
        state.asset_mut(&AssetId::token("usdc"));
        assert_eq!(state.known_tokens(), vec![AccountId::new("usdc")]);
    }
}
