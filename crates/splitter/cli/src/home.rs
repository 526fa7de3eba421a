//! On-disk splitter home: config, ledger snapshot, simulated rail, journal.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use maple_splitter::{
    EventJournal, InMemoryRail, JournalEntry, PaymentSplitter, RailState, SplitterConfig,
    StoreConfig,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

const CONFIG_FILE: &str = "config.json";
const LEDGER_FILE: &str = "ledger.json";
const RAIL_FILE: &str = "rail.json";
const EVENTS_FILE: &str = "events.json";

pub struct Home {
    root: PathBuf,
}

/// A loaded splitter plus the rail it pays through.
pub struct Session {
    pub rail: Arc<InMemoryRail>,
    pub splitter: PaymentSplitter,
}

impl Home {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, file: &str) -> PathBuf {
        self.root.join(file)
    }

    pub fn is_initialized(&self) -> bool {
        self.path(CONFIG_FILE).exists()
    }

    /// Create a fresh home. An existing one is only replaced with `force`.
    pub fn init(&self, config: SplitterConfig, force: bool) -> Result<Session> {
        if self.is_initialized() {
            if !force {
                bail!(
                    "{} is already initialized (use --force to start over)",
                    self.root.display()
                );
            }
            for file in [CONFIG_FILE, LEDGER_FILE, RAIL_FILE, EVENTS_FILE] {
                let path = self.path(file);
                if path.exists() {
                    fs::remove_file(&path)
                        .with_context(|| format!("remove {}", path.display()))?;
                }
            }
        }
        fs::create_dir_all(&self.root)
            .with_context(|| format!("create {}", self.root.display()))?;

        let config = config.with_storage(StoreConfig::file(self.path(LEDGER_FILE)));
        config.validate()?;
        config.write_json_file(&self.path(CONFIG_FILE))?;

        let rail = Arc::new(InMemoryRail::new());
        let splitter = PaymentSplitter::from_config(&config, rail.clone())?;
        let session = Session { rail, splitter };
        self.save(&session)?;
        Ok(session)
    }

    pub fn open(&self) -> Result<Session> {
        if !self.is_initialized() {
            bail!(
                "{} is not a splitter home (run `splitter init` first)",
                self.root.display()
            );
        }
        let config = SplitterConfig::from_json_file(&self.path(CONFIG_FILE))?
            .with_storage(StoreConfig::file(self.path(LEDGER_FILE)));

        let rail_state: RailState = read_json(&self.path(RAIL_FILE))?.unwrap_or_default();
        let rail = Arc::new(InMemoryRail::from_state(rail_state));

        let entries: Vec<JournalEntry> = read_json(&self.path(EVENTS_FILE))?.unwrap_or_default();
        let journal = EventJournal::from_entries(entries)?;
        debug!(home = %self.root.display(), events = journal.len(), "Opened splitter home");

        let splitter = PaymentSplitter::from_config(&config, rail.clone())?.with_journal(journal);
        Ok(Session { rail, splitter })
    }

    /// Persist the rail and journal. The ledger persists itself on commit.
    pub fn save(&self, session: &Session) -> Result<()> {
        write_json(&self.path(RAIL_FILE), &session.rail.state()?)?;
        write_json(&self.path(EVENTS_FILE), &session.splitter.journal_entries()?)?;
        Ok(())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    if bytes.is_empty() {
        return Ok(None);
    }
    let value =
        serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))?;
    Ok(Some(value))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("rename to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use maple_splitter::{AccountId, AssetId, PayeeShare};

    fn config() -> SplitterConfig {
        SplitterConfig::new("splitter", vec![PayeeShare::new("alice", 1)])
            .with_admins([AccountId::new("ops")])
    }

    #[test]
    fn init_then_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let home = Home::new(dir.path().join("home"));

        let session = home.init(config(), false).unwrap();
        session
            .rail
            .mint(&AssetId::Native, &AccountId::new("splitter"), 10)
            .unwrap();
        session
            .splitter
            .release(&AssetId::Native, &AccountId::new("alice"))
            .unwrap();
        home.save(&session).unwrap();
        drop(session);

        let reopened = home.open().unwrap();
        assert_eq!(
            reopened
                .splitter
                .released(&AssetId::Native, &AccountId::new("alice"))
                .unwrap(),
            10
        );
        assert_eq!(reopened.splitter.events().unwrap().len(), 2);
        assert!(reopened.splitter.verify_journal().unwrap());
    }

    #[test]
    fn init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let home = Home::new(dir.path());
        home.init(config(), false).unwrap();
        assert!(home.init(config(), false).is_err());
        assert!(home.init(config(), true).is_ok());
    }

    #[test]
    fn open_requires_init() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Home::new(dir.path()).open().is_err());
    }
}
