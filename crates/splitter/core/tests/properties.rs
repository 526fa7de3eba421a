//! Property tests: arbitrary deposit/release/checkpoint sequences keep the
//! ledger conserved.
//!
//! Conservation means outstanding entitlement plus everything paid out never
//! exceeds what was received, and falls short of it by at most one unit of
//! dust per payee boundary.

use std::sync::Arc;

use maple_splitter::{
    AccountId, Amount, AssetId, InMemoryRail, PayeeShare, PaymentSplitter, SplitterConfig,
    SplitterError,
};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Op {
    Deposit(Amount),
    Release(usize),
}

fn arb_shares() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(1u64..1_000, 1..6)
}

fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![
            (0u128..1_000_000).prop_map(Op::Deposit),
            (0usize..8).prop_map(Op::Release),
        ],
        1..40,
    )
}

fn payee(index: usize) -> AccountId {
    AccountId::new(format!("payee-{index}"))
}

fn new_payee(index: usize) -> AccountId {
    AccountId::new(format!("next-{index}"))
}

fn build(shares: &[u64]) -> (Arc<InMemoryRail>, PaymentSplitter) {
    let roster = shares
        .iter()
        .enumerate()
        .map(|(i, s)| PayeeShare {
            payee: payee(i),
            shares: *s,
        })
        .collect();
    let config = SplitterConfig::new("splitter", roster).with_admins([AccountId::new("ops")]);
    let rail = Arc::new(InMemoryRail::new());
    let splitter = PaymentSplitter::from_config(&config, rail.clone()).unwrap();
    (rail, splitter)
}

/// Apply `ops` to `asset`, returning the total deposited.
fn apply(
    rail: &InMemoryRail,
    splitter: &PaymentSplitter,
    asset: &AssetId,
    payees: &[AccountId],
    ops: &[Op],
) -> Amount {
    let mut deposited = 0;
    for op in ops {
        match op {
            Op::Deposit(amount) => {
                rail.mint(asset, &AccountId::new("splitter"), *amount)
                    .unwrap();
                deposited += amount;
            }
            Op::Release(index) => {
                let who = &payees[index % payees.len()];
                match splitter.release(asset, who) {
                    Ok(_) | Err(SplitterError::NothingDue { .. }) => {}
                    Err(other) => panic!("unexpected release error: {other}"),
                }
            }
        }
    }
    deposited
}

fn outstanding(splitter: &PaymentSplitter, asset: &AssetId, payees: &[AccountId]) -> Amount {
    payees
        .iter()
        .map(|p| splitter.releasable_with_credit(asset, p).unwrap())
        .sum()
}

fn paid_out(rail: &InMemoryRail, asset: &AssetId, payees: &[AccountId]) -> Amount {
    let state = rail.state().unwrap();
    let Some(holders) = state.balances.get(asset) else {
        return 0;
    };
    payees
        .iter()
        .map(|p| holders.get(p).copied().unwrap_or(0))
        .sum()
}

/// Release to everyone until no release pays anything.
fn drain(splitter: &PaymentSplitter, asset: &AssetId, payees: &[AccountId]) {
    loop {
        let mut paid = false;
        for p in payees {
            match splitter.release(asset, p) {
                Ok(_) => paid = true,
                Err(SplitterError::NothingDue { .. })
                | Err(SplitterError::NoEntitlement { .. }) => {}
                Err(other) => panic!("unexpected release error: {other}"),
            }
        }
        if !paid {
            break;
        }
    }
}

fn union(first: &[AccountId], second: &[AccountId]) -> Vec<AccountId> {
    let mut everyone = first.to_vec();
    for p in second {
        if !everyone.contains(p) {
            everyone.push(p.clone());
        }
    }
    everyone
}

fn next_roster(payees: &[AccountId], shares: &[u64]) -> Vec<PayeeShare> {
    payees
        .iter()
        .zip(shares.iter().cycle())
        .map(|(p, s)| PayeeShare { payee: p.clone(), shares: *s })
        .collect()
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// Outstanding entitlement plus released equals received, minus bounded dust.
    #[test]
    fn entitlement_is_conserved_within_dust(
        shares in arb_shares(),
        ops in arb_ops(),
    ) {
        let (rail, splitter) = build(&shares);
        let payees: Vec<_> = (0..shares.len()).map(payee).collect();

        let deposited = apply(&rail, &splitter, &AssetId::Native, &payees, &ops);

        let released = splitter.total_released(&AssetId::Native).unwrap();
        let owed = outstanding(&splitter, &AssetId::Native, &payees);
        let received = splitter.total_received(&AssetId::Native).unwrap();

        prop_assert_eq!(received, deposited);
        prop_assert_eq!(paid_out(&rail, &AssetId::Native, &payees), released);
        prop_assert!(owed + released <= received);
        prop_assert!(received - (owed + released) <= (payees.len() as Amount - 1));
    }

    /// A release immediately repeated always finds nothing due.
    #[test]
    fn repeated_release_is_nothing_due(
        shares in arb_shares(),
        amount in 1u128..1_000_000,
        who in 0usize..8,
    ) {
        let (rail, splitter) = build(&shares);
        let payees: Vec<_> = (0..shares.len()).map(payee).collect();
        let who = &payees[who % payees.len()];
        rail.mint(&AssetId::Native, &AccountId::new("splitter"), amount).unwrap();

        let _ = splitter.release(&AssetId::Native, who);
        let is_nothing_due = matches!(
            splitter.release(&AssetId::Native, who),
            Err(SplitterError::NothingDue { .. })
        );
        prop_assert!(is_nothing_due);
    }

    /// Checkpoint credits equal pre-checkpoint entitlements, each credit is
    /// payable exactly, and nothing is paid twice across the roster change.
    #[test]
    fn checkpoint_conserves_entitlement(
        shares in arb_shares(),
        next_shares in arb_shares(),
        before in arb_ops(),
        after in arb_ops(),
        keep_roster in any::<bool>(),
    ) {
        let (rail, splitter) = build(&shares);
        let payees: Vec<_> = (0..shares.len()).map(payee).collect();
        let ops = AccountId::new("ops");
        let native = AssetId::Native;

        let mut deposited = apply(&rail, &splitter, &native, &payees, &before);
        let expected: Vec<Amount> = payees
            .iter()
            .map(|p| splitter.releasable(&native, p).unwrap())
            .collect();

        let next_payees: Vec<AccountId> = if keep_roster {
            payees.clone()
        } else {
            (0..next_shares.len()).map(new_payee).collect()
        };
        let next = next_roster(&next_payees, &next_shares);

        let report = splitter.checkpoint_and_reset(&ops, &[], &next).unwrap();
        prop_assert_eq!(report.credited(&native), expected.iter().sum::<Amount>());
        for (p, amount) in payees.iter().zip(&expected) {
            prop_assert_eq!(splitter.credit(&native, p).unwrap(), *amount);
        }

        deposited += apply(&rail, &splitter, &native, &next_payees, &after);

        let everyone = union(&payees, &next_payees);
        drain(&splitter, &native, &everyone);

        let paid = paid_out(&rail, &native, &everyone);
        let held = splitter.held_balance(&native).unwrap();
        prop_assert_eq!(paid + held, deposited);
        prop_assert_eq!(outstanding(&splitter, &native, &everyone), 0);
        prop_assert!(held <= (shares.len() + next.len()) as Amount);
    }

    /// The same across a checkpoint in a fee-charging token: every fee is
    /// borne by whoever was paid, nobody is overpaid, and the undistributed
    /// remainder after a full drain stays within the dust bound.
    #[test]
    fn checkpoint_with_fee_token_keeps_dust_bound(
        shares in arb_shares(),
        next_shares in arb_shares(),
        before in arb_ops(),
        after in arb_ops(),
        fee_bps in 0u16..500,
        keep_roster in any::<bool>(),
    ) {
        let (rail, splitter) = build(&shares);
        let payees: Vec<_> = (0..shares.len()).map(payee).collect();
        let ops = AccountId::new("ops");
        let contract = AccountId::new("feetoken");
        let token = AssetId::Token(contract.clone());
        rail.set_transfer_fee_bps(&contract, fee_bps).unwrap();

        let mut deposited = apply(&rail, &splitter, &token, &payees, &before);
        let expected: Amount = payees
            .iter()
            .map(|p| splitter.releasable(&token, p).unwrap())
            .sum();

        let next_payees: Vec<AccountId> = if keep_roster {
            payees.clone()
        } else {
            (0..next_shares.len()).map(new_payee).collect()
        };
        let next = next_roster(&next_payees, &next_shares);

        let report = splitter
            .checkpoint_and_reset(&ops, &[contract.clone()], &next)
            .unwrap();
        prop_assert_eq!(report.credited(&token), expected);

        deposited += apply(&rail, &splitter, &token, &next_payees, &after);

        let everyone = union(&payees, &next_payees);
        drain(&splitter, &token, &everyone);

        let paid = paid_out(&rail, &token, &everyone);
        let held = splitter.held_balance(&token).unwrap();
        prop_assert!(paid + held <= deposited);
        prop_assert_eq!(splitter.total_released(&token).unwrap(), paid);
        prop_assert_eq!(outstanding(&splitter, &token, &everyone), 0);
        prop_assert!(held <= (shares.len() + next.len()) as Amount);
    }
}
