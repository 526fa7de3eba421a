use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{ScopePolicy, SplitterConfig};
use crate::error::{SplitterError, SplitterResult};
use crate::events::{EventJournal, JournalEntry, SplitterEvent};
use crate::gate::{AccessGate, AdminSet};
use crate::guard::ReentrancyGuard;
use crate::ledger::LedgerState;
use crate::roster::Roster;
use crate::store::LedgerStore;
use crate::transfer::{Delivery, TransferAdapter, TransferRail};
use crate::types::{AccountId, AdminAction, Amount, AssetId, CreditGrant, PayeeShare, Shares};
use crate::vault::{VaultAdapter, VaultRedemption};

/// Result of a successful release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseReceipt {
    pub asset: AssetId,
    pub payee: AccountId,
    /// Checkpoint credit included in the payment.
    pub credit: Amount,
    /// Freshly computed entitlement included in the payment.
    pub entitlement: Amount,
    pub requested: Amount,
    /// What the payee actually received; this is what stays booked.
    pub delivered: Amount,
}

/// Result of a checkpoint followed by a roster replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointReport {
    pub previous_roster: Vec<PayeeShare>,
    pub assets: Vec<AssetId>,
    pub credits: Vec<CreditGrant>,
    pub roster: Vec<PayeeShare>,
}

impl CheckpointReport {
    /// Sum of credits granted in `asset`.
    pub fn credited(&self, asset: &AssetId) -> Amount {
        self.credits
            .iter()
            .filter(|grant| &grant.asset == asset)
            .fold(0, |acc: Amount, grant| acc.saturating_add(grant.amount))
    }
}

/// Per-payee summary for one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayeeStatement {
    pub payee: AccountId,
    pub shares: Shares,
    pub released: Amount,
    pub credit: Amount,
    pub releasable: Amount,
}

/// Pull-based payment splitter over any number of assets.
///
/// Value arrives out of band on the splitter's account. Payees withdraw
/// with [`release`](Self::release); administrators replace the roster
/// with [`checkpoint_and_reset`](Self::checkpoint_and_reset) or
/// [`reset_payees`](Self::reset_payees).
///
/// Every mutating operation runs under one non-reentrant guard and applies
/// through one store transaction, so it either fully happens or leaves no
/// trace.
pub struct PaymentSplitter {
    account: AccountId,
    store: LedgerStore,
    transfers: TransferAdapter,
    gate: Arc<dyn AccessGate>,
    guard: ReentrancyGuard,
    journal: Mutex<EventJournal>,
    scope_policy: ScopePolicy,
    tracked_tokens: Vec<AccountId>,
}

impl PaymentSplitter {
    /// Open the configured store and install the configured roster when the
    /// store holds none. A store with an existing roster is resumed as is.
    pub fn bootstrap(
        config: &SplitterConfig,
        rail: Arc<dyn TransferRail>,
        gate: Arc<dyn AccessGate>,
    ) -> SplitterResult<Self> {
        config.validate()?;
        let store = LedgerStore::open(&config.storage)?;

        let splitter = Self {
            account: config.account.clone(),
            transfers: TransferAdapter::new(rail, config.account.clone()),
            store,
            gate,
            guard: ReentrancyGuard::new(),
            journal: Mutex::new(EventJournal::new()),
            scope_policy: config.scope_policy,
            tracked_tokens: config.tracked_tokens.clone(),
        };

        let fresh = splitter.store.read(|state| state.roster().is_empty())?;
        if fresh {
            let mut staged = splitter.store.stage()?;
            staged.roster = Roster::from_entries(&config.payees)?;
            staged.paused = config.start_paused;
            splitter.store.commit(staged)?;
            splitter.record(
                config
                    .payees
                    .iter()
                    .map(|entry| SplitterEvent::PayeeAdded {
                        payee: entry.payee.clone(),
                        shares: entry.shares,
                    })
                    .collect(),
            );
            info!(
                account = %splitter.account,
                payees = config.payees.len(),
                backend = splitter.store.backend_label(),
                "Splitter initialized"
            );
        } else {
            info!(
                account = %splitter.account,
                backend = splitter.store.backend_label(),
                "Splitter resumed from existing ledger"
            );
        }
        Ok(splitter)
    }

    /// Bootstrap with the configured admin list as the access gate.
    pub fn from_config(config: &SplitterConfig, rail: Arc<dyn TransferRail>) -> SplitterResult<Self> {
        let gate = Arc::new(AdminSet::new(config.admins.iter().cloned()));
        Self::bootstrap(config, rail, gate)
    }

    /// Continue an existing event journal instead of starting an empty one.
    pub fn with_journal(self, journal: EventJournal) -> Self {
        Self {
            journal: Mutex::new(journal),
            ..self
        }
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    // --- Release ---

    /// Pay `payee` its credit plus its fresh entitlement in `asset`.
    ///
    /// Accounting is committed before the transfer. If the transfer fails
    /// the pre-release state is restored; if it delivers a different amount
    /// than requested, the release counters are reconciled to the delivered
    /// amount. Once value has moved the release succeeds even if that
    /// reconciliation cannot be committed; the requested amount then stays
    /// booked and a retry finds nothing due.
    pub fn release(&self, asset: &AssetId, payee: &AccountId) -> SplitterResult<ReleaseReceipt> {
        let _scope = self.guard.enter()?;
        let snapshot = self.store.stage()?;
        if snapshot.is_paused() {
            return Err(SplitterError::Paused);
        }

        let credit = snapshot.credit(asset, payee);
        if snapshot.roster().shares_of(payee) == 0 && credit == 0 {
            return Err(SplitterError::NoEntitlement {
                asset: asset.clone(),
                payee: payee.clone(),
            });
        }

        let balance = self.transfers.held_balance(asset)?;
        let entitlement = snapshot.entitlement(asset, payee, balance)?;
        let payment = credit
            .checked_add(entitlement)
            .ok_or(SplitterError::Arithmetic("payment exceeds u128"))?;
        if payment == 0 {
            return Err(SplitterError::NothingDue {
                asset: asset.clone(),
                payee: payee.clone(),
            });
        }

        let mut staged = snapshot.clone();
        {
            let ledger = staged.asset_mut(asset);
            ledger.take_credit(payee);
            if entitlement > 0 {
                ledger.book_entitlement(payee, entitlement)?;
            }
        }
        self.store.commit(staged.clone())?;
        debug!(
            asset = %asset,
            payee = %payee,
            credit = credit,
            entitlement = entitlement,
            "Release booked, transferring"
        );

        let delivery = match self.transfers.deliver(asset, payee, payment) {
            Ok(delivery) => delivery,
            Err(err) => {
                warn!(asset = %asset, payee = %payee, error = %err, "Transfer failed, rolling back release");
                self.store.commit(snapshot)?;
                return Err(err);
            }
        };

        if delivery.delivered != payment {
            // Value has moved; a reconciliation that cannot be stored is
            // logged and the release still succeeds.
            match self.reconcile(staged, asset, payee, &delivery) {
                Ok(()) => warn!(
                    asset = %asset,
                    payee = %payee,
                    requested = payment,
                    delivered = delivery.delivered,
                    "Release reconciled to delivered amount"
                ),
                Err(err) => warn!(
                    asset = %asset,
                    payee = %payee,
                    requested = payment,
                    delivered = delivery.delivered,
                    error = %err,
                    "Reconciliation not committed, requested amount stays booked"
                ),
            }
        }

        info!(asset = %asset, payee = %payee, amount = delivery.delivered, "Payment released");
        self.record(vec![SplitterEvent::PaymentReleased {
            asset: asset.clone(),
            payee: payee.clone(),
            amount: delivery.delivered,
        }]);

        Ok(ReleaseReceipt {
            asset: asset.clone(),
            payee: payee.clone(),
            credit,
            entitlement,
            requested: payment,
            delivered: delivery.delivered,
        })
    }

    /// Rebook a release to the delivered amount. A shortfall is carried by
    /// `payee` alone; the other payees' entitlement does not move.
    fn reconcile(
        &self,
        mut staged: LedgerState,
        asset: &AssetId,
        payee: &AccountId,
        delivery: &Delivery,
    ) -> SplitterResult<()> {
        let ledger = staged.asset_mut(asset);
        let shortfall = delivery.shortfall();
        if shortfall > 0 {
            ledger.unbook_shortfall(payee, shortfall)?;
        } else {
            ledger.book_entitlement(payee, delivery.delivered - delivery.requested)?;
        }
        self.store.commit(staged)
    }

    // --- Roster replacement ---

    /// Freeze every current payee's outstanding entitlement in the native
    /// asset and in `tokens` into credit, then replace the roster.
    pub fn checkpoint_and_reset(
        &self,
        caller: &AccountId,
        tokens: &[AccountId],
        roster: &[PayeeShare],
    ) -> SplitterResult<CheckpointReport> {
        let _scope = self.guard.enter()?;
        self.authorize(caller, AdminAction::Checkpoint)?;
        let mut staged = self.store.stage()?;
        if staged.is_paused() {
            return Err(SplitterError::Paused);
        }
        Roster::validate_entries(roster)?;
        let assets = self.resolve_scope(tokens, &staged)?;
        let previous_roster = staged.roster().entries();

        // All grants are computed against the untouched state first.
        let mut credits = Vec::new();
        let mut balances = Vec::with_capacity(assets.len());
        for asset in &assets {
            let balance = self.transfers.held_balance(asset)?;
            balances.push(balance);
            for entry in &previous_roster {
                let amount = staged.entitlement(asset, &entry.payee, balance)?;
                if amount > 0 {
                    credits.push(CreditGrant {
                        asset: asset.clone(),
                        payee: entry.payee.clone(),
                        amount,
                    });
                }
            }
        }
        for grant in &credits {
            staged
                .asset_mut(&grant.asset)
                .grant_credit(&grant.payee, grant.amount)?;
        }
        for (asset, balance) in assets.iter().zip(&balances) {
            staged.asset_mut(asset).start_epoch(*balance)?;
        }

        staged.roster.clear();
        staged.roster = Roster::from_entries(roster)?;
        self.store.commit(staged)?;

        info!(
            caller = %caller,
            assets = assets.len(),
            credits = credits.len(),
            payees = roster.len(),
            "Checkpoint committed, roster replaced"
        );

        let mut events = vec![
            SplitterEvent::Checkpointed {
                previous_roster: previous_roster.clone(),
                assets: assets.clone(),
                credits: credits.clone(),
            },
            SplitterEvent::RosterReset {
                roster: roster.to_vec(),
                checkpointed: true,
            },
        ];
        events.extend(payee_added(roster));
        self.record(events);

        Ok(CheckpointReport {
            previous_roster,
            assets,
            credits,
            roster: roster.to_vec(),
        })
    }

    /// Replace the roster without a checkpoint. Every current payee must
    /// have nothing outstanding, neither entitlement nor credit, in the
    /// native asset and in `tokens`.
    pub fn reset_payees(
        &self,
        caller: &AccountId,
        tokens: &[AccountId],
        roster: &[PayeeShare],
    ) -> SplitterResult<Vec<PayeeShare>> {
        let _scope = self.guard.enter()?;
        self.authorize(caller, AdminAction::Reset)?;
        let mut staged = self.store.stage()?;
        if staged.is_paused() {
            return Err(SplitterError::Paused);
        }
        Roster::validate_entries(roster)?;
        let assets = self.resolve_scope(tokens, &staged)?;

        let mut balances = Vec::with_capacity(assets.len());
        for asset in &assets {
            let balance = self.transfers.held_balance(asset)?;
            balances.push(balance);
            for payee in staged.roster().payees() {
                let outstanding = staged
                    .entitlement(asset, payee, balance)?
                    .saturating_add(staged.credit(asset, payee));
                if outstanding > 0 {
                    return Err(SplitterError::UnclaimedBalance {
                        asset: asset.clone(),
                        payee: payee.clone(),
                        amount: outstanding,
                    });
                }
            }
        }
        for (asset, balance) in assets.iter().zip(&balances) {
            staged.asset_mut(asset).start_epoch(*balance)?;
        }

        let removed = staged.roster.clear();
        staged.roster = Roster::from_entries(roster)?;
        self.store.commit(staged)?;

        info!(caller = %caller, removed = removed.len(), payees = roster.len(), "Roster reset");
        let mut events = vec![SplitterEvent::RosterReset {
            roster: roster.to_vec(),
            checkpointed: false,
        }];
        events.extend(payee_added(roster));
        self.record(events);

        Ok(removed)
    }

    // --- Pause gate ---

    pub fn pause(&self, caller: &AccountId) -> SplitterResult<()> {
        self.set_paused(caller, true)
    }

    pub fn unpause(&self, caller: &AccountId) -> SplitterResult<()> {
        self.set_paused(caller, false)
    }

    fn set_paused(&self, caller: &AccountId, paused: bool) -> SplitterResult<()> {
        let _scope = self.guard.enter()?;
        let action = if paused {
            AdminAction::Pause
        } else {
            AdminAction::Unpause
        };
        self.authorize(caller, action)?;

        let mut staged = self.store.stage()?;
        match (staged.is_paused(), paused) {
            (true, true) => return Err(SplitterError::Paused),
            (false, false) => return Err(SplitterError::NotPaused),
            _ => {}
        }
        staged.paused = paused;
        self.store.commit(staged)?;

        info!(caller = %caller, paused = paused, "Pause state changed");
        let event = if paused {
            SplitterEvent::Paused { by: caller.clone() }
        } else {
            SplitterEvent::Unpaused { by: caller.clone() }
        };
        self.record(vec![event]);
        Ok(())
    }

    // --- Vault passthrough ---

    /// Redeem `shares` of the splitter's vault position into the underlying.
    pub fn redeem_vault_shares(
        &self,
        caller: &AccountId,
        vault: &dyn VaultAdapter,
        shares: Amount,
    ) -> SplitterResult<VaultRedemption> {
        self.vault_operation(caller, vault, |vault, account| {
            if shares == 0 {
                return Err(SplitterError::ZeroAmount);
            }
            let max = vault.max_redeem(account)?;
            if shares > max {
                return Err(SplitterError::Vault(format!(
                    "redeem of {shares} shares exceeds max {max}"
                )));
            }
            vault.redeem(shares, account, account)?;
            Ok(shares)
        })
    }

    /// Withdraw exactly `assets` of the underlying from the splitter's vault
    /// position.
    pub fn withdraw_vault_assets(
        &self,
        caller: &AccountId,
        vault: &dyn VaultAdapter,
        assets: Amount,
    ) -> SplitterResult<VaultRedemption> {
        self.vault_operation(caller, vault, |vault, account| {
            if assets == 0 {
                return Err(SplitterError::ZeroAmount);
            }
            let max = vault.max_withdraw(account)?;
            if assets > max {
                return Err(SplitterError::Vault(format!(
                    "withdrawal of {assets} exceeds max {max}"
                )));
            }
            vault.withdraw(assets, account, account)
        })
    }

    fn vault_operation(
        &self,
        caller: &AccountId,
        vault: &dyn VaultAdapter,
        op: impl FnOnce(&dyn VaultAdapter, &AccountId) -> SplitterResult<Amount>,
    ) -> SplitterResult<VaultRedemption> {
        let _scope = self.guard.enter()?;
        self.authorize(caller, AdminAction::ManageVault)?;
        if self.store.read(LedgerState::is_paused)? {
            return Err(SplitterError::Paused);
        }

        let asset = vault.underlying();
        let before = self.transfers.held_balance(&asset)?;
        let shares = op(vault, &self.account)?;
        let after = self.transfers.held_balance(&asset)?;
        let received = after.saturating_sub(before);

        info!(
            vault = vault.vault_id(),
            asset = %asset,
            shares = shares,
            received = received,
            "Vault position redeemed"
        );
        self.record(vec![SplitterEvent::VaultRedeemed {
            vault: vault.vault_id().to_string(),
            asset: asset.clone(),
            shares,
            received,
        }]);

        Ok(VaultRedemption {
            vault: vault.vault_id().to_string(),
            asset,
            shares,
            received,
        })
    }

    // --- Queries ---

    pub fn total_shares(&self) -> SplitterResult<Shares> {
        self.store.read(|state| state.roster().total_shares())
    }

    pub fn shares(&self, payee: &AccountId) -> SplitterResult<Shares> {
        self.store.read(|state| state.roster().shares_of(payee))
    }

    pub fn payees(&self) -> SplitterResult<Vec<AccountId>> {
        self.store.read(|state| state.roster().payees().to_vec())
    }

    pub fn payee(&self, index: usize) -> SplitterResult<Option<AccountId>> {
        self.store.read(|state| state.roster().payee(index).cloned())
    }

    pub fn total_released(&self, asset: &AssetId) -> SplitterResult<Amount> {
        self.store.read(|state| state.total_released(asset))
    }

    /// Everything ever released to `payee` in `asset`, credit included.
    /// Lifetime counters survive removal from the roster; a payee that is
    /// added again shares only in value received after its return.
    pub fn released(&self, asset: &AssetId, payee: &AccountId) -> SplitterResult<Amount> {
        self.store.read(|state| state.released(asset, payee))
    }

    pub fn credit(&self, asset: &AssetId, payee: &AccountId) -> SplitterResult<Amount> {
        self.store.read(|state| state.credit(asset, payee))
    }

    /// Outstanding entitlement from live balance and shares, credit excluded.
    pub fn releasable(&self, asset: &AssetId, payee: &AccountId) -> SplitterResult<Amount> {
        let balance = self.transfers.held_balance(asset)?;
        self.store
            .read(|state| state.entitlement(asset, payee, balance))?
    }

    pub fn releasable_with_credit(
        &self,
        asset: &AssetId,
        payee: &AccountId,
    ) -> SplitterResult<Amount> {
        let raw = self.releasable(asset, payee)?;
        raw.checked_add(self.credit(asset, payee)?)
            .ok_or(SplitterError::Arithmetic("releasable exceeds u128"))
    }

    pub fn held_balance(&self, asset: &AssetId) -> SplitterResult<Amount> {
        self.transfers.held_balance(asset)
    }

    /// Held balance plus everything actually paid out.
    pub fn total_received(&self, asset: &AssetId) -> SplitterResult<Amount> {
        let balance = self.transfers.held_balance(asset)?;
        self.store.read(|state| match state.asset(asset) {
            Some(ledger) => ledger.received(balance),
            None => Ok(balance),
        })?
    }

    pub fn is_paused(&self) -> SplitterResult<bool> {
        self.store.read(LedgerState::is_paused)
    }

    /// Native, then every tracked token and every token with ledger history.
    pub fn known_assets(&self) -> SplitterResult<Vec<AssetId>> {
        let tokens: BTreeSet<AccountId> = self.store.read(|state| {
            self.tracked_tokens
                .iter()
                .cloned()
                .chain(state.known_tokens())
                .collect()
        })?;
        Ok(std::iter::once(AssetId::Native)
            .chain(tokens.into_iter().map(AssetId::Token))
            .collect())
    }

    /// One line per current payee, followed by former payees still holding
    /// credit in `asset`.
    pub fn statements(&self, asset: &AssetId) -> SplitterResult<Vec<PayeeStatement>> {
        let balance = self.transfers.held_balance(asset)?;
        self.store.read(|state| {
            let mut seen = BTreeSet::new();
            let mut accounts: Vec<AccountId> = Vec::new();
            let credited = state
                .asset(asset)
                .map(|ledger| {
                    ledger
                        .credited_payees()
                        .map(|(payee, _)| payee.clone())
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            for payee in state.roster().payees().iter().chain(credited.iter()) {
                if seen.insert(payee.clone()) {
                    accounts.push(payee.clone());
                }
            }

            accounts
                .into_iter()
                .map(|payee| -> SplitterResult<PayeeStatement> {
                    Ok(PayeeStatement {
                        shares: state.roster().shares_of(&payee),
                        released: state.released(asset, &payee),
                        credit: state.credit(asset, &payee),
                        releasable: state.entitlement(asset, &payee, balance)?,
                        payee,
                    })
                })
                .collect()
        })?
    }

    pub fn events(&self) -> SplitterResult<Vec<SplitterEvent>> {
        Ok(self
            .lock_journal()?
            .entries()
            .iter()
            .map(|entry| entry.event.clone())
            .collect())
    }

    pub fn journal_entries(&self) -> SplitterResult<Vec<JournalEntry>> {
        Ok(self.lock_journal()?.entries().to_vec())
    }

    pub fn verify_journal(&self) -> SplitterResult<bool> {
        Ok(self.lock_journal()?.verify_chain())
    }

    // --- Internals ---

    fn authorize(&self, caller: &AccountId, action: AdminAction) -> SplitterResult<()> {
        if self.gate.is_authorized(caller, action) {
            Ok(())
        } else {
            warn!(caller = %caller, action = %action, "Unauthorized administrative call");
            Err(SplitterError::Unauthorized {
                caller: caller.clone(),
                action,
            })
        }
    }

    /// Native first, then the listed tokens in order.
    fn resolve_scope(
        &self,
        tokens: &[AccountId],
        state: &LedgerState,
    ) -> SplitterResult<Vec<AssetId>> {
        let mut assets = vec![AssetId::Native];
        for token in tokens {
            if token.is_zero() {
                return Err(SplitterError::InvalidAsset(token.to_string()));
            }
            let asset = AssetId::Token(token.clone());
            if assets.contains(&asset) {
                return Err(SplitterError::DuplicateAsset(asset));
            }
            assets.push(asset);
        }

        if self.scope_policy == ScopePolicy::FailClosed {
            let known: BTreeSet<AccountId> = self
                .tracked_tokens
                .iter()
                .cloned()
                .chain(state.known_tokens())
                .collect();
            for token in known {
                let asset = AssetId::Token(token);
                if assets.contains(&asset) {
                    continue;
                }
                let balance = self.transfers.held_balance(&asset)?;
                if balance > 0 {
                    return Err(SplitterError::UnlistedAsset { asset, balance });
                }
            }
        }

        debug!(assets = ?assets, "Resolved asset scope");
        Ok(assets)
    }

    fn lock_journal(&self) -> SplitterResult<MutexGuard<'_, EventJournal>> {
        self.journal
            .lock()
            .map_err(|_| SplitterError::Storage("journal lock poisoned".into()))
    }

    /// Append records for an operation that has already committed. A
    /// journal failure cannot undo the commit, so it is logged, not raised.
    fn record(&self, events: Vec<SplitterEvent>) {
        let mut journal = match self.lock_journal() {
            Ok(journal) => journal,
            Err(err) => {
                warn!(error = %err, dropped = events.len(), "Event journal unavailable");
                return;
            }
        };
        for event in events {
            let kind = event.kind();
            if let Err(err) = journal.append(event) {
                warn!(error = %err, kind = kind, "Failed to journal event");
            }
        }
    }
}

fn payee_added(roster: &[PayeeShare]) -> impl Iterator<Item = SplitterEvent> + '_ {
    roster.iter().map(|entry| SplitterEvent::PayeeAdded {
        payee: entry.payee.clone(),
        shares: entry.shares,
    })
}
