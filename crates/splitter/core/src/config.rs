use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{SplitterError, SplitterResult};
use crate::roster::Roster;
use crate::store::StoreConfig;
use crate::types::{AccountId, PayeeShare};

/// How checkpoint and reset treat tokens the caller did not list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopePolicy {
    /// Only the listed tokens are considered. Entitlement in an unlisted
    /// token stays on the old share math.
    #[default]
    Explicit,
    /// Reject the operation when a known token with a nonzero balance is
    /// missing from the list.
    FailClosed,
}

/// Splitter bootstrap configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitterConfig {
    /// The splitter's own holder identity on the asset rail.
    pub account: AccountId,
    /// Initial roster, installed only when the store holds none.
    pub payees: Vec<PayeeShare>,
    #[serde(default)]
    pub admins: Vec<AccountId>,
    #[serde(default)]
    pub storage: StoreConfig,
    #[serde(default)]
    pub start_paused: bool,
    #[serde(default)]
    pub scope_policy: ScopePolicy,
    /// Tokens the fail-closed scope check always looks at.
    #[serde(default)]
    pub tracked_tokens: Vec<AccountId>,
}

impl SplitterConfig {
    pub fn new(account: impl Into<String>, payees: Vec<PayeeShare>) -> Self {
        Self {
            account: AccountId::new(account),
            payees,
            admins: Vec::new(),
            storage: StoreConfig::default(),
            start_paused: false,
            scope_policy: ScopePolicy::default(),
            tracked_tokens: Vec::new(),
        }
    }

    pub fn with_admins(mut self, admins: impl IntoIterator<Item = AccountId>) -> Self {
        self.admins = admins.into_iter().collect();
        self
    }

    pub fn with_storage(mut self, storage: StoreConfig) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_scope_policy(mut self, policy: ScopePolicy) -> Self {
        self.scope_policy = policy;
        self
    }

    pub fn with_tracked_tokens(mut self, tokens: impl IntoIterator<Item = AccountId>) -> Self {
        self.tracked_tokens = tokens.into_iter().collect();
        self
    }

    pub fn paused(mut self) -> Self {
        self.start_paused = true;
        self
    }

    pub fn from_json_file(path: &Path) -> SplitterResult<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| SplitterError::Storage(format!("read {} failed: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn write_json_file(&self, path: &Path) -> SplitterResult<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        fs::write(path, bytes)
            .map_err(|e| SplitterError::Storage(format!("write {} failed: {e}", path.display())))
    }

    /// Structural checks only; nothing is installed.
    pub fn validate(&self) -> SplitterResult<()> {
        if self.account.is_zero() {
            return Err(SplitterError::ZeroAddress);
        }
        Roster::validate_entries(&self.payees)?;
        if self.tracked_tokens.iter().any(AccountId::is_zero) {
            return Err(SplitterError::ZeroAddress);
        }
        Ok(())
    }
}
