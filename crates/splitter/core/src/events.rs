use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SplitterError, SplitterResult};
use crate::types::{AccountId, Amount, AssetId, CreditGrant, PayeeShare, Shares};

/// Structured record emitted by every committed state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitterEvent {
    PayeeAdded {
        payee: AccountId,
        shares: Shares,
    },
    /// `amount` is what the payee actually received.
    PaymentReleased {
        asset: AssetId,
        payee: AccountId,
        amount: Amount,
    },
    Checkpointed {
        previous_roster: Vec<PayeeShare>,
        assets: Vec<AssetId>,
        credits: Vec<CreditGrant>,
    },
    RosterReset {
        roster: Vec<PayeeShare>,
        checkpointed: bool,
    },
    Paused {
        by: AccountId,
    },
    Unpaused {
        by: AccountId,
    },
    VaultRedeemed {
        vault: String,
        asset: AssetId,
        shares: Amount,
        received: Amount,
    },
}

impl SplitterEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SplitterEvent::PayeeAdded { .. } => "payee_added",
            SplitterEvent::PaymentReleased { .. } => "payment_released",
            SplitterEvent::Checkpointed { .. } => "checkpointed",
            SplitterEvent::RosterReset { .. } => "roster_reset",
            SplitterEvent::Paused { .. } => "paused",
            SplitterEvent::Unpaused { .. } => "unpaused",
            SplitterEvent::VaultRedeemed { .. } => "vault_redeemed",
        }
    }
}

/// Hash-chained journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub index: u64,
    pub event_id: String,
    pub recorded_at: DateTime<Utc>,
    pub event: SplitterEvent,
    pub previous_hash: Option<String>,
    pub entry_hash: String,
}

/// Append-only event journal with hash-chain proofs.
///
/// Entries are never edited in place. Each entry hash covers the entry's
/// content and the previous entry's hash, so rewriting any past record
/// breaks every later link.
#[derive(Debug, Default, Clone)]
pub struct EventJournal {
    entries: Vec<JournalEntry>,
}

impl EventJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a journal from persisted entries and verify the chain.
    pub fn from_entries(entries: Vec<JournalEntry>) -> SplitterResult<Self> {
        for (expected, entry) in entries.iter().enumerate() {
            if entry.index != expected as u64 {
                return Err(SplitterError::Storage(format!(
                    "journal index gap at position {} (found {})",
                    expected, entry.index
                )));
            }
        }
        let journal = Self { entries };
        if !journal.verify_chain() {
            return Err(SplitterError::Storage(
                "persisted journal hash-chain verification failed".into(),
            ));
        }
        Ok(journal)
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_hash(&self) -> Option<&str> {
        self.entries.last().map(|entry| entry.entry_hash.as_str())
    }

    pub fn append(&mut self, event: SplitterEvent) -> SplitterResult<&JournalEntry> {
        let index = self.entries.len() as u64;
        let event_id = Uuid::new_v4().to_string();
        let recorded_at = Utc::now();
        let previous_hash = self.last_hash().map(str::to_string);
        let entry_hash = compute_entry_hash(
            index,
            &event_id,
            recorded_at,
            &event,
            previous_hash.as_deref(),
        )?;

        self.entries.push(JournalEntry {
            index,
            event_id,
            recorded_at,
            event,
            previous_hash,
            entry_hash,
        });
        let last = self.entries.len() - 1;
        Ok(&self.entries[last])
    }

    pub fn verify_chain(&self) -> bool {
        let mut previous_hash: Option<String> = None;
        for entry in &self.entries {
            if entry.previous_hash != previous_hash {
                return false;
            }
            let expected = compute_entry_hash(
                entry.index,
                &entry.event_id,
                entry.recorded_at,
                &entry.event,
                previous_hash.as_deref(),
            );
            match expected {
                Ok(hash) if hash == entry.entry_hash => {}
                _ => return false,
            }
            previous_hash = Some(entry.entry_hash.clone());
        }
        true
    }
}

#[derive(Serialize)]
struct HashMaterial<'a> {
    index: u64,
    event_id: &'a str,
    recorded_at: DateTime<Utc>,
    event: &'a SplitterEvent,
    previous_hash: Option<&'a str>,
}

fn compute_entry_hash(
    index: u64,
    event_id: &str,
    recorded_at: DateTime<Utc>,
    event: &SplitterEvent,
    previous_hash: Option<&str>,
) -> SplitterResult<String> {
    let bytes = serde_json::to_vec(&HashMaterial {
        index,
        event_id,
        recorded_at,
        event,
        previous_hash,
    })?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn released(amount: Amount) -> SplitterEvent {
        SplitterEvent::PaymentReleased {
            asset: AssetId::Native,
            payee: AccountId::new("alice"),
            amount,
        }
    }

    #[test]
    fn verifies_hash_chain() {
        let mut journal = EventJournal::new();
        journal
            .append(SplitterEvent::PayeeAdded {
                payee: AccountId::new("alice"),
                shares: 3,
            })
            .unwrap();
        let second = journal.append(released(750)).unwrap().clone();

        assert_eq!(second.index, 1);
        assert_eq!(
            second.previous_hash.as_deref(),
            Some(journal.entries()[0].entry_hash.as_str())
        );
        assert!(journal.verify_chain());
    }

    #[test]
    fn detects_tampered_entries() {
        let mut journal = EventJournal::new();
        journal.append(released(10)).unwrap();
        journal.append(released(20)).unwrap();

        let mut entries = journal.entries().to_vec();
        entries[0].event = released(11);
        assert!(EventJournal::from_entries(entries).is_err());
    }

    #[test]
    fn rehydrates_from_json() {
        let mut journal = EventJournal::new();
        journal.append(released(u128::MAX)).unwrap();
        journal
            .append(SplitterEvent::Checkpointed {
                previous_roster: vec![PayeeShare::new("alice", 1)],
                assets: vec![AssetId::Native, AssetId::token("usdc")],
                credits: vec![CreditGrant {
                    asset: AssetId::Native,
                    payee: AccountId::new("alice"),
                    amount: 5,
                }],
            })
            .unwrap();

        let json = serde_json::to_string(journal.entries()).unwrap();
        let entries: Vec<JournalEntry> = serde_json::from_str(&json).unwrap();
        let restored = EventJournal::from_entries(entries).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.entries()[1].event.kind(), "checkpointed");
    }

    #[test]
    fn rejects_index_gaps() {
        let mut journal = EventJournal::new();
        journal.append(released(1)).unwrap();
        journal.append(released(2)).unwrap();
        let entries = journal.entries()[1..].to_vec();
        assert!(matches!(
            EventJournal::from_entries(entries),
            Err(SplitterError::Storage(_))
        ));
    }
}
