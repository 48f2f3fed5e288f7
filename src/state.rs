use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};

use crate::config::{self, TriageConfig};
use crate::contacts::{AliasMap, ImportanceSnapshot};
use crate::error::{Result, TriageError};
use crate::tracking::{InboxBehavior, TrackingStore};

pub const CONFIG_FILE: &str = "config.json";
pub const TRACKING_FILE: &str = "email_tracking.json";
pub const SENDER_SCORES_FILE: &str = "sender_scores.json";
pub const CONTACT_MAP_FILE: &str = "contact_map.json";
pub const INBOX_BEHAVIOR_FILE: &str = "inbox_behavior.json";

/// Process-wide state for one run: configuration plus the four snapshots.
///
/// Shared behind an `Arc` by concurrent triage tasks. Alias map and
/// importance are read-mostly; tracking mutations are serialized by the
/// mutex.
pub struct Workspace {
    pub config: TriageConfig,
    data_dir: Option<PathBuf>,
    pub aliases: RwLock<AliasMap>,
    pub importance: RwLock<ImportanceSnapshot>,
    pub tracking: Mutex<TrackingStore>,
    pub behavior: RwLock<InboxBehavior>,
}

impl Workspace {
    /// Empty state that never touches disk.
    pub fn in_memory(config: TriageConfig) -> Self {
        Self {
            config,
            data_dir: None,
            aliases: RwLock::new(AliasMap::new()),
            importance: RwLock::new(ImportanceSnapshot::default()),
            tracking: Mutex::new(TrackingStore::new()),
            behavior: RwLock::new(InboxBehavior::default()),
        }
    }

    /// Open `data_dir`, reading `config.json` from it.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let config = config::load_config(&data_dir.join(CONFIG_FILE));
        Self::open_with_config(data_dir, config)
    }

    /// Open the default data directory (`~/.inbox-triage/`).
    pub fn open_default() -> Result<Self> {
        let dir = config::default_data_dir()
            .ok_or_else(|| TriageError::DataDirNotFound(PathBuf::from("~")))?;
        Self::open(&dir)
    }

    /// Open `data_dir` with an explicit config. Snapshots that are missing
    /// or corrupt load empty.
    pub fn open_with_config(data_dir: &Path, config: TriageConfig) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .map_err(|_| TriageError::DataDirNotFound(data_dir.to_path_buf()))?;

        let aliases = AliasMap::load(&data_dir.join(CONTACT_MAP_FILE));
        let importance = ImportanceSnapshot::load(&data_dir.join(SENDER_SCORES_FILE));
        let tracking = TrackingStore::load(&data_dir.join(TRACKING_FILE));
        let behavior = InboxBehavior::load(&data_dir.join(INBOX_BEHAVIOR_FILE));

        log::info!(
            "Workspace {}: {} aliases, {} scored contacts, {} tracked messages",
            data_dir.display(),
            aliases.len(),
            importance.len(),
            tracking.len()
        );

        Ok(Self {
            config,
            data_dir: Some(data_dir.to_path_buf()),
            aliases: RwLock::new(aliases),
            importance: RwLock::new(importance),
            tracking: Mutex::new(tracking),
            behavior: RwLock::new(behavior),
        })
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Snapshot path for `file`, `None` for an in-memory workspace.
    pub fn snapshot_path(&self, file: &str) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join(file))
    }

    /// Write the alias map. Failures are logged and the old file stays.
    pub fn persist_aliases(&self) -> bool {
        let Some(path) = self.snapshot_path(CONTACT_MAP_FILE) else {
            return true;
        };
        persist_logged(&path, || self.aliases.read().save(&path))
    }

    pub fn persist_importance(&self) -> bool {
        let Some(path) = self.snapshot_path(SENDER_SCORES_FILE) else {
            return true;
        };
        persist_logged(&path, || self.importance.read().save(&path))
    }

    pub fn persist_behavior(&self) -> bool {
        let Some(path) = self.snapshot_path(INBOX_BEHAVIOR_FILE) else {
            return true;
        };
        persist_logged(&path, || self.behavior.read().save(&path))
    }
}

fn persist_logged(path: &Path, write: impl FnOnce() -> Result<()>) -> bool {
    match write() {
        Ok(()) => {
            log::debug!("Wrote {}", path.display());
            true
        }
        Err(e) => {
            log::warn!("Failed to write {}: {}. {}", path.display(), e, e.recovery_suggestion());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_empty_dir_and_persist() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        assert!(ws.aliases.read().is_empty());
        assert!(ws.tracking.lock().is_empty());
        assert_eq!(ws.config, TriageConfig::default());

        ws.aliases.write().insert_direct("Jane Roe", "jane@x.com");
        assert!(ws.persist_aliases());

        let reopened = Workspace::open(dir.path()).unwrap();
        assert_eq!(reopened.aliases.read().normalize("Jane Roe"), "jane@x.com");
    }

    #[test]
    fn test_open_reads_config_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), r#"{"worker_count": 9}"#).unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        assert_eq!(ws.config.worker_count, 9);
    }

    #[test]
    fn test_corrupt_snapshots_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        for file in [TRACKING_FILE, SENDER_SCORES_FILE, CONTACT_MAP_FILE, INBOX_BEHAVIOR_FILE] {
            std::fs::write(dir.path().join(file), "{broken").unwrap();
        }
        let ws = Workspace::open(dir.path()).unwrap();
        assert!(ws.importance.read().is_empty());
        assert!(ws.behavior.read().is_empty());
    }

    #[test]
    fn test_in_memory_never_writes() {
        let ws = Workspace::in_memory(TriageConfig::default());
        assert!(ws.data_dir().is_none());
        assert!(ws.persist_importance());
        assert!(ws.snapshot_path(TRACKING_FILE).is_none());
    }
}
