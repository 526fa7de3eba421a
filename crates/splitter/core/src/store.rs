use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SplitterError, SplitterResult};
use crate::ledger::LedgerState;

/// Ledger persistence backend configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    /// Keep ledger state in process memory only.
    #[default]
    Memory,
    /// Persist a JSON snapshot of the ledger state after every commit and
    /// resume from it on startup.
    File { path: PathBuf },
}

impl StoreConfig {
    pub fn memory() -> Self {
        Self::Memory
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File { path: path.into() }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File { .. } => "file",
        }
    }
}

#[derive(Debug, Clone)]
enum StoreBackend {
    Memory,
    File(PathBuf),
}

/// Single-writer ledger store.
///
/// Each mutating operation stages a copy of the state, mutates it, and
/// hands it back through [`LedgerStore::commit`]. A staged copy that is
/// dropped instead of committed leaves no trace. The file backend writes
/// the snapshot before the in-memory state is swapped.
#[derive(Debug)]
pub struct LedgerStore {
    state: RwLock<LedgerState>,
    backend: StoreBackend,
}

impl LedgerStore {
    pub fn open(config: &StoreConfig) -> SplitterResult<Self> {
        match config {
            StoreConfig::Memory => Ok(Self::in_memory(LedgerState::default())),
            StoreConfig::File { path } => {
                let state = load_snapshot(path)?;
                debug!(path = %path.display(), "Opened file-backed ledger store");
                Ok(Self {
                    state: RwLock::new(state),
                    backend: StoreBackend::File(path.clone()),
                })
            }
        }
    }

    pub fn in_memory(state: LedgerState) -> Self {
        Self {
            state: RwLock::new(state),
            backend: StoreBackend::Memory,
        }
    }

    pub fn backend_label(&self) -> &'static str {
        match self.backend {
            StoreBackend::Memory => "memory",
            StoreBackend::File(_) => "file",
        }
    }

    /// Run a read-only closure against the committed state.
    pub fn read<T>(&self, f: impl FnOnce(&LedgerState) -> T) -> SplitterResult<T> {
        let state = self
            .state
            .read()
            .map_err(|_| SplitterError::Storage("ledger lock poisoned".into()))?;
        Ok(f(&state))
    }

    /// Copy of the committed state, to be mutated and committed.
    pub fn stage(&self) -> SplitterResult<LedgerState> {
        self.read(LedgerState::clone)
    }

    /// Replace the committed state.
    pub fn commit(&self, next: LedgerState) -> SplitterResult<()> {
        if let StoreBackend::File(path) = &self.backend {
            write_snapshot(path, &next)?;
        }
        let mut state = self
            .state
            .write()
            .map_err(|_| SplitterError::Storage("ledger lock poisoned".into()))?;
        *state = next;
        Ok(())
    }
}

fn load_snapshot(path: &Path) -> SplitterResult<LedgerState> {
    if !path.exists() {
        return Ok(LedgerState::default());
    }
    let bytes = fs::read(path)
        .map_err(|e| SplitterError::Storage(format!("read {} failed: {e}", path.display())))?;
    if bytes.is_empty() {
        return Ok(LedgerState::default());
    }
    Ok(serde_json::from_slice(&bytes)?)
}

fn write_snapshot(path: &Path, state: &LedgerState) -> SplitterResult<()> {
    let bytes = serde_json::to_vec_pretty(state)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            SplitterError::Storage(format!("create {} failed: {e}", parent.display()))
        })?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)
        .map_err(|e| SplitterError::Storage(format!("write {} failed: {e}", tmp.display())))?;
    fs::rename(&tmp, path)
        .map_err(|e| SplitterError::Storage(format!("rename to {} failed: {e}", path.display())))
}
