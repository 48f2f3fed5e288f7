//! Message tracking store.
//!
//! One record per message id counting consecutive unread scans:
//!
//! ```text
//! read    => check_count = 0
//! unread  => check_count = previous + 1   (previous = 0 when unseen)
//! ```
//!
//! A scan works on a [`ScanBatch`], a staged copy of the store. Nothing
//! reaches the store or disk until [`TrackingStore::commit`]; dropping a
//! batch abandons the scan and leaves the last good snapshot in place.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::config::TriageConfig;
use crate::error::Result;
use crate::types::MailMessage;
use crate::util;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingRecord {
    #[serde(default)]
    pub subject: String,
    /// Canonical sender key.
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub raw_sender: String,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub sender_email: Option<String>,
    #[serde(default, with = "crate::util::lenient_timestamp")]
    pub received_time: Option<NaiveDateTime>,
    #[serde(default, with = "crate::util::lenient_timestamp")]
    pub last_modified: Option<NaiveDateTime>,
    #[serde(default)]
    pub folder_path: String,
    #[serde(default = "default_read", alias = "is_currently_read")]
    pub is_read: bool,
    #[serde(default)]
    pub check_count: u32,
    #[serde(default, with = "crate::util::lenient_timestamp")]
    pub last_checked: Option<NaiveDateTime>,
}

fn default_read() -> bool {
    true
}

/// Next `check_count` given the prior record and the current read flag.
pub fn next_check_count(previous: Option<&TrackingRecord>, is_read: bool) -> u32 {
    if is_read {
        0
    } else {
        previous.map_or(0, |r| r.check_count).saturating_add(1)
    }
}

// ---------------------------------------------------------------------------
// Inbox behavior
// ---------------------------------------------------------------------------

/// What the user did with one sender's mail, as of the latest scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SenderBehavior {
    #[serde(default)]
    pub read_kept: u32,
    #[serde(default)]
    pub unread_kept: u32,
    #[serde(default)]
    pub deleted: u32,
    #[serde(default)]
    pub moved: u32,
    #[serde(default)]
    pub total: u32,
    #[serde(default, with = "crate::util::lenient_timestamp")]
    pub last_read_kept: Option<NaiveDateTime>,
}

/// Where a scanned message sits relative to the inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    ReadKept,
    UnreadKept,
    Deleted,
    Moved,
}

/// Where a scanned message sits. Only the inbox itself counts as kept: a
/// sub-folder that happens to share the inbox's name is a move.
pub fn classify_disposition(message: &MailMessage, config: &TriageConfig) -> Disposition {
    let folder = util::last_path_segment(&message.folder_path);
    if folder.eq_ignore_ascii_case(&config.deleted_folder) {
        Disposition::Deleted
    } else if is_inbox_path(&message.folder_path, &config.inbox_folder) {
        if message.is_read {
            Disposition::ReadKept
        } else {
            Disposition::UnreadKept
        }
    } else {
        Disposition::Moved
    }
}

/// True for an empty path, a bare `Inbox`, or `\\Store\Inbox` with the
/// inbox directly under the mailbox root.
fn is_inbox_path(folder_path: &str, inbox: &str) -> bool {
    let trimmed = folder_path.trim();
    let (rest, rooted) = match trimmed.strip_prefix("\\\\") {
        Some(rest) => (rest, true),
        None => (trimmed, false),
    };
    let segments: Vec<&str> = rest
        .split(['/', '\\'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    match segments.as_slice() {
        [] => !rooted,
        [folder] => !rooted && folder.eq_ignore_ascii_case(inbox),
        [_store, folder] => rooted && folder.eq_ignore_ascii_case(inbox),
        _ => false,
    }
}

/// Per-sender behavior counts, rebuilt by every scan.
#[derive(Debug, Clone, Default)]
pub struct InboxBehavior {
    senders: BTreeMap<String, SenderBehavior>,
}

impl InboxBehavior {
    pub fn get(&self, sender: &str) -> Option<&SenderBehavior> {
        self.senders.get(sender)
    }

    pub fn insert(&mut self, sender: &str, stats: SenderBehavior) {
        self.senders.insert(sender.to_string(), stats);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SenderBehavior)> {
        self.senders.iter()
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    pub fn observe(&mut self, sender: &str, message: &MailMessage, config: &TriageConfig) {
        let stats = self.senders.entry(sender.to_string()).or_default();
        stats.total += 1;
        match classify_disposition(message, config) {
            Disposition::ReadKept => {
                stats.read_kept += 1;
                if message.received_time > stats.last_read_kept {
                    stats.last_read_kept = message.received_time;
                }
            }
            Disposition::UnreadKept => stats.unread_kept += 1,
            Disposition::Deleted => stats.deleted += 1,
            Disposition::Moved => stats.moved += 1,
        }
    }

    pub fn load(path: &Path) -> InboxBehavior {
        InboxBehavior {
            senders: util::load_json_map(path),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        util::write_json_atomic(path, &self.senders)
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct TrackingStore {
    records: BTreeMap<String, TrackingRecord>,
}

/// Staged scan state. Mutations land here until committed.
#[derive(Debug)]
pub struct ScanBatch {
    records: BTreeMap<String, TrackingRecord>,
    behavior: InboxBehavior,
    observed: usize,
}

impl ScanBatch {
    /// Apply one observation of `message` whose canonical sender is
    /// `sender`, returning the updated record.
    pub fn observe(
        &mut self,
        message: &MailMessage,
        sender: &str,
        now: NaiveDateTime,
        config: &TriageConfig,
    ) -> &TrackingRecord {
        let previous = self.records.get(&message.id);
        let check_count = next_check_count(previous, message.is_read);
        log::debug!(
            "Tracking {}: read={} check_count {} -> {}",
            message.id,
            message.is_read,
            previous.map_or(0, |r| r.check_count),
            check_count
        );

        let record = TrackingRecord {
            subject: message.subject.clone(),
            sender: sender.to_string(),
            raw_sender: message.raw_sender().unwrap_or_default(),
            sender_name: message.sender_name.clone(),
            sender_email: message.sender_address.clone(),
            received_time: message.received_time,
            last_modified: message.last_modified,
            folder_path: message.folder_path.clone(),
            is_read: message.is_read,
            check_count,
            last_checked: Some(now),
        };
        self.behavior.observe(sender, message, config);
        self.observed += 1;

        self.records.insert(message.id.clone(), record);
        &self.records[&message.id]
    }

    /// State as of this scan, including records observed so far.
    pub fn get(&self, id: &str) -> Option<&TrackingRecord> {
        self.records.get(id)
    }

    pub fn observed(&self) -> usize {
        self.observed
    }

    pub fn behavior(&self) -> &InboxBehavior {
        &self.behavior
    }
}

impl TrackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&TrackingRecord> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TrackingRecord)> {
        self.records.iter()
    }

    pub fn begin_scan(&self) -> ScanBatch {
        ScanBatch {
            records: self.records.clone(),
            behavior: InboxBehavior::default(),
            observed: 0,
        }
    }

    /// Persist the batch (when `path` is given) and then adopt it.
    ///
    /// A failed write leaves both the file and this store unchanged.
    /// Returns the batch's inbox behavior for the caller to persist.
    pub fn commit(&mut self, batch: ScanBatch, path: Option<&Path>) -> Result<InboxBehavior> {
        if let Some(path) = path {
            util::write_json_atomic(path, &batch.records)?;
        }
        log::info!(
            "Tracking store committed: {} observed, {} records",
            batch.observed,
            batch.records.len()
        );
        self.records = batch.records;
        Ok(batch.behavior)
    }

    /// Load `email_tracking.json`. Never fails; each timestamp is coerced
    /// on its own and records that cannot be decoded are dropped.
    pub fn load(path: &Path) -> TrackingStore {
        let records: BTreeMap<String, TrackingRecord> = util::load_json_map(path);
        log::debug!("Loaded {} tracking records from {}", records.len(), path.display());
        TrackingStore { records }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        util::write_json_atomic(path, &self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    fn message(id: &str, is_read: bool, folder: &str) -> MailMessage {
        MailMessage {
            id: id.to_string(),
            sender_address: Some("a@x.com".to_string()),
            subject: "Status".to_string(),
            folder_path: folder.to_string(),
            is_read,
            received_time: Some(now()),
            ..Default::default()
        }
    }

    fn scan(store: &mut TrackingStore, msg: &MailMessage) -> u32 {
        let config = TriageConfig::default();
        let mut batch = store.begin_scan();
        batch.observe(msg, "a@x.com", now(), &config);
        store.commit(batch, None).unwrap();
        store.get(&msg.id).unwrap().check_count
    }

    #[test]
    fn test_check_count_increments_and_resets() {
        let mut store = TrackingStore::new();
        let unread = message("m1", false, "Inbox");
        let read = message("m1", true, "Inbox");

        for n in 1..=4 {
            assert_eq!(scan(&mut store, &unread), n);
        }
        assert_eq!(scan(&mut store, &read), 0);
        assert_eq!(scan(&mut store, &unread), 1);
    }

    #[test]
    fn test_first_observation_read_is_zero() {
        assert_eq!(next_check_count(None, true), 0);
        assert_eq!(next_check_count(None, false), 1);
    }

    #[test]
    fn test_dropped_batch_leaves_store_untouched() {
        let config = TriageConfig::default();
        let mut store = TrackingStore::new();
        scan(&mut store, &message("m1", false, "Inbox"));

        let mut batch = store.begin_scan();
        batch.observe(&message("m1", false, "Inbox"), "a@x.com", now(), &config);
        batch.observe(&message("m2", false, "Inbox"), "a@x.com", now(), &config);
        assert_eq!(batch.get("m1").unwrap().check_count, 2);
        drop(batch);

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("m1").unwrap().check_count, 1);
    }

    #[test]
    fn test_failed_write_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("email_tracking.json");
        let config = TriageConfig::default();
        let mut store = TrackingStore::new();

        let mut batch = store.begin_scan();
        batch.observe(&message("m1", false, "Inbox"), "a@x.com", now(), &config);
        store.commit(batch, Some(&path)).unwrap();

        // A directory where the file should be makes the rename fail.
        let blocked = dir.path().join("blocked");
        std::fs::create_dir_all(blocked.join("email_tracking.json")).unwrap();
        let mut batch = store.begin_scan();
        batch.observe(&message("m1", false, "Inbox"), "a@x.com", now(), &config);
        assert!(store
            .commit(batch, Some(&blocked.join("email_tracking.json")))
            .is_err());
        assert_eq!(store.get("m1").unwrap().check_count, 1);

        let reloaded = TrackingStore::load(&path);
        assert_eq!(reloaded.get("m1").unwrap().check_count, 1);
    }

    #[test]
    fn test_load_coerces_timestamps_per_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("email_tracking.json");
        std::fs::write(
            &path,
            r#"{
                "m1": {"subject": "Hi", "sender": "a@x.com",
                       "received_time": "2024-06-01T08:00:00+00:00",
                       "last_modified": "not a date",
                       "last_checked": 12345,
                       "is_currently_read": false, "check_count": 2},
                "m2": {"check_count": "many"},
                "m3": "garbage"
            }"#,
        )
        .unwrap();

        let store = TrackingStore::load(&path);
        assert_eq!(store.len(), 1);
        let record = store.get("m1").unwrap();
        assert_eq!(
            record.received_time.map(|t| util::format_timestamp(&t)).as_deref(),
            Some("2024-06-01T08:00:00")
        );
        assert!(record.last_modified.is_none());
        assert!(record.last_checked.is_none());
        assert!(!record.is_read);
        assert_eq!(record.check_count, 2);
    }

    #[test]
    fn test_corrupt_store_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("email_tracking.json");
        std::fs::write(&path, "\u{0}\u{1}not json").unwrap();
        assert!(TrackingStore::load(&path).is_empty());
    }

    #[test]
    fn test_behavior_dispositions() {
        let config = TriageConfig::default();
        let mut behavior = InboxBehavior::default();
        behavior.observe("a@x.com", &message("1", true, "\\\\Me\\Inbox"), &config);
        behavior.observe("a@x.com", &message("2", false, "\\\\Me\\Inbox"), &config);
        behavior.observe("a@x.com", &message("3", true, "\\\\Me\\Deleted Items"), &config);
        behavior.observe("a@x.com", &message("4", true, "\\\\Me\\Projects"), &config);

        let stats = behavior.get("a@x.com").unwrap();
        assert_eq!(
            (stats.read_kept, stats.unread_kept, stats.deleted, stats.moved, stats.total),
            (1, 1, 1, 1, 4)
        );
        assert_eq!(stats.last_read_kept, Some(now()));
    }

    #[test]
    fn test_only_the_root_inbox_is_kept() {
        let config = TriageConfig::default();
        for kept in ["Inbox", "inbox/", "", "\\\\Me\\Inbox", "\\\\Me\\Inbox\\"] {
            assert_eq!(
                classify_disposition(&message("1", true, kept), &config),
                Disposition::ReadKept,
                "{kept}"
            );
        }
        for moved in [
            "Projects/Inbox",
            "Inbox/Sub/Inbox",
            "\\\\Me\\Projects\\Inbox",
            "\\\\Me\\Inbox\\Receipts",
            "\\\\Inbox",
        ] {
            assert_eq!(
                classify_disposition(&message("1", true, moved), &config),
                Disposition::Moved,
                "{moved}"
            );
        }
        assert_eq!(
            classify_disposition(&message("1", true, "\\\\Me\\Deleted Items"), &config),
            Disposition::Deleted
        );
    }

    #[test]
    fn test_commit_returns_scan_behavior() {
        let config = TriageConfig::default();
        let mut store = TrackingStore::new();
        let mut batch = store.begin_scan();
        batch.observe(&message("1", true, "Inbox"), "a@x.com", now(), &config);
        let behavior = store.commit(batch, None).unwrap();
        assert_eq!(behavior.get("a@x.com").unwrap().read_kept, 1);
    }
}
