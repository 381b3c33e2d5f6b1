//! Serializable image of a [`Forge`](crate::Forge).

use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use forge_chain::ArtifactVersion;
use forge_ledger::LedgerEntry;
use forge_types::{Account, Project};

use crate::error::{SdkError, SdkResult};

/// Snapshot layout version written by this crate.
pub const SNAPSHOT_FORMAT: u32 = 2;

/// Everything needed to rebuild a forge: accounts, their ledger entries,
/// projects, and every version. Balances are not stored; they are replayed
/// from the entries on import.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub format: u32,
    pub exported_at: DateTime<Utc>,
    pub accounts: Vec<Account>,
    pub entries: Vec<LedgerEntry>,
    pub projects: Vec<Project>,
    pub versions: Vec<ArtifactVersion>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            format: SNAPSHOT_FORMAT,
            exported_at: Utc::now(),
            accounts: Vec::new(),
            entries: Vec::new(),
            projects: Vec::new(),
            versions: Vec::new(),
        }
    }

    /// Entries belonging to `account`, in their stored order.
    pub fn entries_for(&self, account: &Account) -> Vec<LedgerEntry> {
        self.entries
            .iter()
            .filter(|e| e.account == account.id)
            .cloned()
            .collect()
    }

    pub fn to_json(&self) -> SdkResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> SdkResult<Self> {
        let snapshot: Self = serde_json::from_str(text)?;
        if snapshot.format != SNAPSHOT_FORMAT {
            return Err(SdkError::Snapshot(format!(
                "unsupported format {} (expected {SNAPSHOT_FORMAT})",
                snapshot.format
            )));
        }
        Ok(snapshot)
    }

    pub fn load(path: impl AsRef<Path>) -> SdkResult<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Write to `path` via a temporary file in the same directory, so a
    /// crash never leaves a half-written snapshot behind.
    pub fn save(&self, path: impl AsRef<Path>) -> SdkResult<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(self.to_json()?.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}
