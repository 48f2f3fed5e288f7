//! Header parsing, identifier fragments, timestamp coercion and atomic
//! snapshot writes.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::constants::{MIN_FRAGMENT_LEN, SYSTEM_SENDER_PATTERNS};
use crate::error::{Result, TriageError};

/// Canonical on-disk timestamp format (naive, no offset).
pub const CANONICAL_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

// =============================================================================
// Sender headers
// =============================================================================

/// Extract the bare email address from a header like "Jane Doe <jane@x.com>".
///
/// Returns the lowercased text of the innermost `<...>` pair, or the whole
/// trimmed input lowercased when there is no such pair. The result never
/// contains a bracket pair, so extracting twice gives the same address.
pub fn extract_email_address(from_field: &str) -> String {
    for (end, _) in from_field.match_indices('>') {
        if let Some(start) = from_field[..end].rfind('<') {
            return from_field[start + 1..end].trim().to_lowercase();
        }
    }
    from_field.trim().to_lowercase()
}

/// Extract the display name from a header like `"Jane Doe" <jane@x.com>`.
///
/// Returns `None` for bare addresses and for names that are themselves
/// addresses.
pub fn extract_display_name(from_field: &str) -> Option<String> {
    let trimmed = from_field.trim();
    let angle_start = trimmed.find('<')?;
    if angle_start == 0 {
        return None;
    }

    let name = trimmed[..angle_start].trim().trim_matches('"').trim();
    if name.is_empty() || name.contains('@') {
        return None;
    }
    Some(name.to_string())
}

/// Domain part of an address, lowercased. Empty when there is no '@'.
pub fn extract_domain(email_addr: &str) -> String {
    match email_addr.rfind('@') {
        Some(at_pos) => email_addr[at_pos + 1..].trim().to_lowercase(),
        None => String::new(),
    }
}

/// Local part of an address (everything before the last '@').
pub fn local_part(email_addr: &str) -> &str {
    match email_addr.rfind('@') {
        Some(at_pos) => &email_addr[..at_pos],
        None => email_addr,
    }
}

fn address_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s<>]+@[^@\s<>]+\.[^@\s<>]+$").unwrap())
}

/// Whether a string is shaped like a routable email address.
pub fn looks_like_address(s: &str) -> bool {
    address_re().is_match(s.trim())
}

/// Automated senders never take part in fuzzy alias inference.
pub fn is_system_sender(sender: &str) -> bool {
    let lower = sender.to_lowercase();
    SYSTEM_SENDER_PATTERNS.iter().any(|p| lower.contains(p))
}

pub fn is_reply_subject(subject: &str) -> bool {
    subject.trim_start().to_lowercase().starts_with("re:")
}

pub fn is_forward_subject(subject: &str) -> bool {
    let lower = subject.trim_start().to_lowercase();
    lower.starts_with("fw:") || lower.starts_with("fwd:")
}

/// Last segment of a folder path like `\\Mailbox\Inbox` or `Archive/News`.
pub fn last_path_segment(folder_path: &str) -> &str {
    folder_path
        .trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim()
}

// =============================================================================
// Identifier fragments
// =============================================================================

fn non_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9]+").unwrap())
}

/// Lowercase fragments of a display name, split on any non-alphanumeric
/// run, keeping only fragments of at least `MIN_FRAGMENT_LEN` chars.
pub fn name_fragments(name: &str) -> Vec<String> {
    non_word_re()
        .split(&name.to_lowercase())
        .filter(|w| w.len() >= MIN_FRAGMENT_LEN)
        .map(str::to_string)
        .collect()
}

/// Lowercase fragments of an address local-part, split on `.`, `_`, `-`.
/// Empty fragments are dropped; short ones are kept for partial matching.
pub fn local_part_fragments(local: &str) -> Vec<String> {
    local
        .to_lowercase()
        .split(['.', '_', '-'])
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

// =============================================================================
// Timestamps
// =============================================================================

/// Coerce any timestamp spelling the stores have ever written into the
/// canonical naive form. Offsets are converted to UTC first.
pub fn coerce_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    for fmt in [
        CANONICAL_TIMESTAMP_FORMAT,
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(CANONICAL_TIMESTAMP_FORMAT).to_string()
}

/// Serde adapter for `Option<NaiveDateTime>` fields in snapshot files.
///
/// Writes the canonical form; reads any coercible string and turns
/// everything else (numbers, garbage, null) into `None`.
pub mod lenient_timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&super::format_timestamp(ts)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match value {
            serde_json::Value::String(s) => super::coerce_timestamp(&s),
            _ => None,
        })
    }
}

// =============================================================================
// Snapshot files
// =============================================================================

/// Serialize `value` as pretty JSON and atomically replace `path`.
///
/// The payload goes to a temp file in the same directory which is then
/// renamed over the target, so readers see either the old or new file.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let snapshot_err = |message: String| TriageError::Snapshot {
        path: path.to_path_buf(),
        message,
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| snapshot_err(e.to_string()))?;

    let payload = serde_json::to_string_pretty(value)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| snapshot_err(e.to_string()))?;
    tmp.write_all(payload.as_bytes())
        .map_err(|e| snapshot_err(e.to_string()))?;
    tmp.flush().map_err(|e| snapshot_err(e.to_string()))?;
    tmp.persist(path).map_err(|e| snapshot_err(e.error.to_string()))?;
    Ok(())
}

/// Load a JSON object of `key -> record` from `path`.
///
/// Never fails: a missing file, unparsable JSON or a non-object root all
/// yield an empty map. Records that fail to decode are dropped one by one.
pub fn load_json_map<T: DeserializeOwned>(path: &Path) -> BTreeMap<String, T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            log::warn!("Failed to read {}: {}; starting empty", path.display(), e);
            return BTreeMap::new();
        }
    };

    let root: Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("Corrupt snapshot {}: {}; starting empty", path.display(), e);
            return BTreeMap::new();
        }
    };
    let Value::Object(entries) = root else {
        log::warn!("Snapshot {} is not a JSON object; starting empty", path.display());
        return BTreeMap::new();
    };

    let mut records = BTreeMap::new();
    for (key, value) in entries {
        match serde_json::from_value::<T>(value) {
            Ok(record) => {
                records.insert(key, record);
            }
            Err(e) => log::warn!("Dropping record '{}' from {}: {}", key, path.display(), e),
        }
    }
    records
}
