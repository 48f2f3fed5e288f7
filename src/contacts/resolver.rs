//! Contact identity resolution.
//!
//! Collapses display names and addresses into one canonical contact key.
//!
//! Stages:
//! 1. Direct pairs: a message carrying both a display name and an address
//!    records the pair at maximum confidence.
//! 2. Fragment extraction over the remaining names and addresses.
//! 3. Candidate pairing on fragment containment.
//! 4. Additive scoring of each candidate pair.
//! 5. Best address per name, accepted at `ALIAS_ACCEPT_FLOOR`.
//!
//! The map is fully built only when empty. Afterwards it only grows by
//! direct pairs harvested from scans.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{
    ALIAS_ACCEPT_FLOOR, FRAGMENT_DIRECT_POINTS, FRAGMENT_PARTIAL_POINTS, FULL_NAME_POINTS,
    INITIAL_LAST_NAME_POINTS, MIN_FRAGMENT_LEN, UNKNOWN_CONTACT,
};
use crate::error::Result;
use crate::types::{MailHistory, MailMessage, Recipient};
use crate::util;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How an alias was learned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasSource {
    /// Name and address seen together on one message.
    Direct,
    /// Guessed from fragment overlap.
    Inferred,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasEntry {
    pub address: String,
    pub source: AliasSource,
    /// Fragment score for inferred aliases; 0 for direct pairs.
    #[serde(default)]
    pub score: u32,
}

impl AliasEntry {
    fn direct(address: String) -> Self {
        Self {
            address,
            source: AliasSource::Direct,
            score: 0,
        }
    }

    fn inferred(address: String, score: u32) -> Self {
        Self {
            address,
            source: AliasSource::Inferred,
            score,
        }
    }

    /// Whether `self` may be replaced by `other`.
    fn yields_to(&self, other: &AliasEntry) -> bool {
        match (self.source, other.source) {
            (AliasSource::Direct, _) => false,
            (AliasSource::Inferred, AliasSource::Direct) => true,
            (AliasSource::Inferred, AliasSource::Inferred) => other.score > self.score,
        }
    }
}

/// On-disk form: older snapshots stored bare `name -> address` strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredAlias {
    Entry(AliasEntry),
    Plain(String),
}

/// Counts from one full build.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AliasBuildStats {
    pub direct: usize,
    pub inferred: usize,
    pub skipped: usize,
}

/// Display-name to canonical-address mapping.
#[derive(Debug, Clone, Default)]
pub struct AliasMap {
    entries: BTreeMap<String, AliasEntry>,
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Fragment score for pairing display name `name` with address `address`.
///
/// Additive: +2 per name fragment inside the local-part, +2/+1 per
/// local-part fragment found in the name or inside one name fragment,
/// +5 when the name fragments concatenate to the local-part and +4 for a
/// first-initial plus last-name local-part.
pub fn score_candidate(name: &str, address: &str) -> u32 {
    let name_lower = name.trim().to_lowercase();
    let local = util::local_part(address).trim().to_lowercase();
    if name_lower.is_empty() || local.is_empty() {
        return 0;
    }

    let words = util::name_fragments(&name_lower);
    let parts = util::local_part_fragments(&local);
    let mut score = 0;

    for word in &words {
        if local.contains(word.as_str()) {
            score += FRAGMENT_DIRECT_POINTS;
        }
    }

    for part in &parts {
        if part.len() >= MIN_FRAGMENT_LEN && name_lower.contains(part.as_str()) {
            score += FRAGMENT_DIRECT_POINTS;
        } else if words.iter().any(|w| w.contains(part.as_str())) {
            score += FRAGMENT_PARTIAL_POINTS;
        }
    }

    let stripped: String = local.chars().filter(|c| !matches!(c, '.' | '-' | '_')).collect();
    if !words.is_empty() && words.concat() == stripped {
        score += FULL_NAME_POINTS;
    }

    if words.len() > 1 {
        let first_initial = words[0].chars().next();
        let last = &words[words.len() - 1];
        let initial_then_last = first_initial
            .and_then(|c| local.strip_prefix(c))
            .is_some_and(|rest| rest.starts_with(last.as_str()));
        if initial_then_last {
            score += INITIAL_LAST_NAME_POINTS;
        }
    }

    score
}

/// Whether `name` and `address` share enough to be worth scoring.
fn is_candidate(name_words: &[String], name_lower: &str, address: &str) -> bool {
    let local = util::local_part(address);
    name_words.iter().any(|w| local.contains(w.as_str()))
        || util::local_part_fragments(local)
            .iter()
            .any(|p| name_lower.contains(p.as_str()))
}

fn recipient_pair(recipient: &Recipient) -> Option<(String, String)> {
    let name = recipient.name.as_deref()?.trim();
    let address = recipient.address.as_deref()?.trim();
    if name.is_empty() || name.contains('@') || !address.contains('@') {
        return None;
    }
    let address = util::extract_email_address(address);
    util::looks_like_address(&address).then(|| (name.to_lowercase(), address))
}

// ---------------------------------------------------------------------------
// Map
// ---------------------------------------------------------------------------

impl AliasMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, name: &str) -> Option<&AliasEntry> {
        self.entries.get(&name.trim().to_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AliasEntry)> {
        self.entries.iter()
    }

    /// Canonical contact key for any identifier.
    ///
    /// Addresses are lowercased, names are looked up in the map and fall
    /// back to their lowercase form. Idempotent.
    pub fn normalize(&self, identifier: &str) -> String {
        let trimmed = identifier.trim();
        if trimmed.is_empty() {
            return UNKNOWN_CONTACT.to_string();
        }
        if trimmed.contains('@') {
            return util::extract_email_address(trimmed);
        }
        let key = trimmed.to_lowercase();
        match self.entries.get(&key) {
            Some(entry) => entry.address.clone(),
            None => key,
        }
    }

    fn offer(&mut self, name: String, entry: AliasEntry) -> bool {
        match self.entries.get(&name) {
            Some(existing) if !existing.yields_to(&entry) => {
                if existing.address != entry.address {
                    log::debug!(
                        "Keeping alias {} -> {} over {}",
                        name,
                        existing.address,
                        entry.address
                    );
                }
                false
            }
            _ => {
                log::debug!("Alias {} -> {} ({:?})", name, entry.address, entry.source);
                self.entries.insert(name, entry);
                true
            }
        }
    }

    /// Record a direct (name, address) pair. Existing direct pairs win.
    pub fn insert_direct(&mut self, name: &str, address: &str) -> bool {
        let name = name.trim().to_lowercase();
        let address = util::extract_email_address(address);
        if name.is_empty() || name.contains('@') || !util::looks_like_address(&address) {
            return false;
        }
        self.offer(name, AliasEntry::direct(address))
    }

    /// Add the direct pairs carried by `messages`. Returns how many
    /// entries were added or upgraded.
    pub fn extend_direct_pairs<'a, I>(&mut self, messages: I) -> usize
    where
        I: IntoIterator<Item = &'a MailMessage>,
    {
        let mut added = 0;
        for message in messages {
            let pairs = message
                .direct_pair()
                .into_iter()
                .chain(message.recipients.iter().filter_map(recipient_pair));
            for (name, address) in pairs {
                if self.insert_direct(&name, &address) {
                    added += 1;
                }
            }
        }
        added
    }

    /// Build the whole map from history. Does nothing unless the map is
    /// empty.
    pub fn build(&mut self, history: &MailHistory) -> AliasBuildStats {
        let mut stats = AliasBuildStats::default();
        if !self.entries.is_empty() {
            log::debug!("Alias map has {} entries; skipping full build", self.len());
            return stats;
        }

        // Stage 1: direct pairs
        stats.direct = self.extend_direct_pairs(&history.received);
        for sent in &history.sent {
            for (name, address) in sent.recipients.iter().filter_map(recipient_pair) {
                if self.insert_direct(&name, &address) {
                    stats.direct += 1;
                }
            }
        }

        // Stage 2: leftover identifiers
        let recipients = history
            .received
            .iter()
            .flat_map(|m| m.recipients.iter())
            .chain(history.sent.iter().flat_map(|s| s.recipients.iter()));
        let raw_identifiers = history
            .received
            .iter()
            .flat_map(|m| [m.sender_name.as_deref(), m.sender_address.as_deref()])
            .chain(recipients.flat_map(|r| [r.name.as_deref(), r.address.as_deref()]))
            .flatten();

        let mut names = BTreeSet::new();
        let mut addresses = BTreeSet::new();
        for raw in raw_identifiers {
            let raw = raw.trim();
            if raw.is_empty() || util::is_system_sender(raw) {
                continue;
            }
            let bare = util::extract_email_address(raw);
            if util::looks_like_address(&bare) {
                addresses.insert(bare);
            } else if !raw.contains('@') {
                names.insert(raw.to_lowercase());
            }
        }

        // Stages 3-5: candidate pairing, scoring, selection
        for name in names {
            if self.entries.contains_key(&name) {
                continue;
            }
            let words = util::name_fragments(&name);
            let mut best: Option<(&String, u32)> = None;
            for address in &addresses {
                if !is_candidate(&words, &name, address) {
                    continue;
                }
                let score = score_candidate(&name, address);
                if best.map_or(true, |(_, s)| score > s) {
                    best = Some((address, score));
                }
            }
            match best {
                Some((address, score)) if score >= ALIAS_ACCEPT_FLOOR => {
                    if self.offer(name, AliasEntry::inferred(address.clone(), score)) {
                        stats.inferred += 1;
                    }
                }
                _ => stats.skipped += 1,
            }
        }

        log::info!(
            "Built alias map: {} direct, {} inferred, {} unresolved names",
            stats.direct,
            stats.inferred,
            stats.skipped
        );
        stats
    }

    /// Load `contact_map.json`. Never fails.
    pub fn load(path: &Path) -> AliasMap {
        let stored: BTreeMap<String, StoredAlias> = util::load_json_map(path);
        let mut map = AliasMap::new();
        for (name, alias) in stored {
            let entry = match alias {
                StoredAlias::Entry(entry) => entry,
                StoredAlias::Plain(address) => AliasEntry::direct(address),
            };
            let address = util::extract_email_address(&entry.address);
            if !util::looks_like_address(&address) {
                log::warn!("Dropping alias '{}': '{}' is not an address", name, entry.address);
                continue;
            }
            map.entries.insert(
                name.trim().to_lowercase(),
                AliasEntry { address, ..entry },
            );
        }
        map
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        util::write_json_atomic(path, &self.entries)
    }
}
