use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{SplitterError, SplitterResult};
use crate::types::{AccountId, PayeeShare, Shares};

/// The active payees and their share weights.
///
/// Order of insertion is kept for `payee(index)`. A payee that is not on
/// the roster has zero shares.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    payees: Vec<AccountId>,
    shares: BTreeMap<AccountId, Shares>,
    total_shares: Shares,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a roster from entries, validating each one as it is added.
    pub fn from_entries(entries: &[PayeeShare]) -> SplitterResult<Self> {
        if entries.is_empty() {
            return Err(SplitterError::EmptyRoster);
        }
        let mut roster = Self::new();
        for entry in entries {
            roster.add_payee(&entry.payee, entry.shares)?;
        }
        Ok(roster)
    }

    /// Add a payee. The duplicate guard is a direct lookup: any payee that
    /// already holds shares is rejected.
    pub fn add_payee(&mut self, payee: &AccountId, shares: Shares) -> SplitterResult<()> {
        if payee.is_zero() {
            return Err(SplitterError::ZeroAddress);
        }
        if shares == 0 {
            return Err(SplitterError::ZeroShares {
                payee: payee.clone(),
            });
        }
        if self.shares_of(payee) > 0 {
            return Err(SplitterError::DuplicatePayee {
                payee: payee.clone(),
            });
        }

        self.total_shares = self
            .total_shares
            .checked_add(shares)
            .ok_or(SplitterError::Arithmetic("total shares exceed u64"))?;
        self.payees.push(payee.clone());
        self.shares.insert(payee.clone(), shares);
        Ok(())
    }

    /// Zero every payee's shares and empty the roster. Returns the removed
    /// entries in roster order.
    pub fn clear(&mut self) -> Vec<PayeeShare> {
        let removed = self.entries();
        self.payees.clear();
        self.shares.clear();
        self.total_shares = 0;
        removed
    }

    /// Validate a whole candidate roster without building it.
    ///
    /// Duplicates are found with a pairwise scan, O(n^2) in roster size.
    pub fn validate_entries(entries: &[PayeeShare]) -> SplitterResult<()> {
        if entries.is_empty() {
            return Err(SplitterError::EmptyRoster);
        }
        for (i, entry) in entries.iter().enumerate() {
            if entry.payee.is_zero() {
                return Err(SplitterError::ZeroAddress);
            }
            if entry.shares == 0 {
                return Err(SplitterError::ZeroShares {
                    payee: entry.payee.clone(),
                });
            }
            for other in &entries[i + 1..] {
                if other.payee == entry.payee {
                    return Err(SplitterError::DuplicatePayee {
                        payee: entry.payee.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn shares_of(&self, payee: &AccountId) -> Shares {
        self.shares.get(payee).copied().unwrap_or(0)
    }

    pub fn total_shares(&self) -> Shares {
        self.total_shares
    }

    pub fn payees(&self) -> &[AccountId] {
        &self.payees
    }

    pub fn payee(&self, index: usize) -> Option<&AccountId> {
        self.payees.get(index)
    }

    pub fn contains(&self, payee: &AccountId) -> bool {
        self.shares.contains_key(payee)
    }

    pub fn len(&self) -> usize {
        self.payees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payees.is_empty()
    }

    pub fn entries(&self) -> Vec<PayeeShare> {
        self.payees
            .iter()
            .map(|payee| PayeeShare {
                payee: payee.clone(),
                shares: self.shares_of(payee),
            })
            .collect()
    }
}
