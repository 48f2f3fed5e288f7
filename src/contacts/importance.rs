//! Sender importance model.
//!
//! Three signals per canonical contact, all learned from the user's own
//! behavior:
//! - Reply: latency, rate and length of the user's replies to them.
//! - Initiation: new threads the user started with them as a "To".
//! - Relevance: their messages the user read and left in the inbox.
//!
//! Signals are gathered into an [`ImportanceContext`] which is consumed by
//! [`ImportanceContext::build`]. The resulting [`ImportanceSnapshot`]
//! replaces the previous one wholesale.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::config::TriageConfig;
use crate::constants::{FLAT_RANGE_SCORE, REPLY_LENGTH_SATURATION, SINGLE_CONTACT_SCORE};
use crate::contacts::AliasMap;
use crate::error::Result;
use crate::tracking::InboxBehavior;
use crate::types::{MailHistory, MailMessage};
use crate::util;

// ---------------------------------------------------------------------------
// Conversation index
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct ThreadEntry {
    received: NaiveDateTime,
    sender: String,
}

/// Received messages grouped by conversation id, oldest first.
#[derive(Debug, Default)]
pub struct ConversationIndex {
    threads: HashMap<String, Vec<ThreadEntry>>,
}

impl ConversationIndex {
    pub fn from_messages(messages: &[MailMessage]) -> Self {
        let mut threads: HashMap<String, Vec<ThreadEntry>> = HashMap::new();
        for message in messages {
            let (Some(conversation), Some(received)) =
                (message.conversation_id.as_deref(), message.received_time)
            else {
                continue;
            };
            let Some(sender) = message.raw_sender() else {
                continue;
            };
            threads
                .entry(conversation.to_string())
                .or_default()
                .push(ThreadEntry { received, sender });
        }
        for entries in threads.values_mut() {
            entries.sort_by_key(|e| e.received);
        }
        Self { threads }
    }

    /// Most recent message in `conversation` received strictly before `at`.
    pub fn parent_before(&self, conversation: &str, at: NaiveDateTime) -> Option<(NaiveDateTime, &str)> {
        self.threads
            .get(conversation)?
            .iter()
            .rev()
            .find(|e| e.received < at)
            .map(|e| (e.received, e.sender.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Aggregation context
// ---------------------------------------------------------------------------

/// One reply the user sent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplyObservation {
    pub latency_hours: f64,
    pub body_length: usize,
    pub sent_on: NaiveDateTime,
}

#[derive(Debug, Clone, Default)]
struct Interactions {
    replies: Vec<ReplyObservation>,
    initiations: u32,
    read_kept: u32,
    dates: Vec<NaiveDateTime>,
}

impl Interactions {
    fn merge(&mut self, other: Interactions) {
        self.replies.extend(other.replies);
        self.initiations += other.initiations;
        self.read_kept += other.read_kept;
        self.dates.extend(other.dates);
    }
}

/// Per-run accumulator for importance signals, keyed by contact.
///
/// Created for one rebuild and consumed by [`ImportanceContext::build`].
#[derive(Debug, Default)]
pub struct ImportanceContext {
    contacts: HashMap<String, Interactions>,
}

impl ImportanceContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_reply(&mut self, contact: &str, observation: ReplyObservation) {
        let entry = self.contacts.entry(contact.to_string()).or_default();
        entry.replies.push(observation);
    }

    pub fn record_initiation(&mut self, contact: &str, sent_on: NaiveDateTime) {
        let entry = self.contacts.entry(contact.to_string()).or_default();
        entry.initiations += 1;
        entry.dates.push(sent_on);
    }

    pub fn record_read_kept(&mut self, contact: &str, count: u32, last: Option<NaiveDateTime>) {
        if count == 0 {
            return;
        }
        let entry = self.contacts.entry(contact.to_string()).or_default();
        entry.read_kept += count;
        entry.dates.extend(last);
    }

    /// Gather reply and initiation signals from sent history, and relevance
    /// from the inbox behavior snapshot.
    pub fn from_history(
        history: &MailHistory,
        behavior: &InboxBehavior,
        aliases: &AliasMap,
        config: &TriageConfig,
    ) -> Self {
        let mut ctx = Self::new();
        let index = ConversationIndex::from_messages(&history.received);

        let mut sent: Vec<_> = history.sent.iter().filter(|s| s.sent_on.is_some()).collect();
        sent.sort_by(|a, b| b.sent_on.cmp(&a.sent_on));
        sent.truncate(config.max_analysis_emails);

        let (mut replies, mut orphans) = (0usize, 0usize);
        for message in sent {
            let Some(sent_on) = message.sent_on else {
                continue;
            };

            if !message.is_reply() && !message.is_forward() {
                for recipient in message.primary_recipients() {
                    ctx.record_initiation(&aliases.normalize(recipient), sent_on);
                }
            }

            if !message.is_reply() {
                continue;
            }
            let Some(conversation) = message.conversation_id.as_deref() else {
                continue;
            };
            match index.parent_before(conversation, sent_on) {
                Some((parent_received, parent_sender)) => {
                    let latency = (sent_on - parent_received).num_seconds() as f64 / 3600.0;
                    ctx.record_reply(
                        &aliases.normalize(parent_sender),
                        ReplyObservation {
                            latency_hours: latency,
                            body_length: message.body_length,
                            sent_on,
                        },
                    );
                    replies += 1;
                }
                None => {
                    log::debug!("No parent found for reply '{}'", message.subject);
                    orphans += 1;
                }
            }
        }

        for (sender, stats) in behavior.iter() {
            ctx.record_read_kept(&aliases.normalize(sender), stats.read_kept, stats.last_read_kept);
        }

        log::info!(
            "Importance signals: {} replies matched, {} without parent, {} contacts",
            replies,
            orphans,
            ctx.contacts.len()
        );
        ctx
    }

    /// Score every contact and min-max normalize across them.
    pub fn build(self, aliases: &AliasMap, config: &TriageConfig) -> ImportanceSnapshot {
        // Merge all spellings of one identity.
        let mut merged: HashMap<String, Interactions> = HashMap::new();
        for (contact, interactions) in self.contacts {
            merged
                .entry(aliases.normalize(&contact))
                .or_default()
                .merge(interactions);
        }

        let now = Local::now().naive_local();
        let mut scores = BTreeMap::new();
        for (contact, interactions) in merged {
            let (reply_component, reply_count, reply_dates) = reply_component(&interactions, config);

            let raw_score = config.reply_pattern_score_factor * reply_component
                + config.initiation_score_factor * f64::from(interactions.initiations)
                + config.read_kept_score_factor * f64::from(interactions.read_kept);

            let total = reply_count + interactions.initiations + interactions.read_kept;
            log::debug!(
                "Contact '{}': replies={} initiations={} read_kept={} raw={:.3}",
                contact,
                reply_count,
                interactions.initiations,
                interactions.read_kept,
                raw_score
            );
            if total == 0 {
                continue;
            }

            let last_interaction = interactions.dates.iter().chain(reply_dates.iter()).max().copied();
            scores.insert(
                contact.clone(),
                SenderImportance {
                    contact,
                    reply_count,
                    initiation_count: interactions.initiations,
                    read_kept_count: interactions.read_kept,
                    total_interactions: total,
                    raw_score,
                    normalized_score: FLAT_RANGE_SCORE,
                    last_interaction,
                    last_updated: Some(now),
                },
            );
        }

        normalize_scores(&mut scores);
        log::info!("Calculated importance scores for {} contacts", scores.len());
        ImportanceSnapshot { scores }
    }
}

/// Reply component plus the count and dates of the replies that fed it.
fn reply_component(
    interactions: &Interactions,
    config: &TriageConfig,
) -> (f64, u32, Vec<NaiveDateTime>) {
    if interactions.replies.len() < config.min_emails_for_pattern as usize {
        return (0.0, 0, Vec::new());
    }
    let valid: Vec<&ReplyObservation> = interactions
        .replies
        .iter()
        .filter(|r| r.latency_hours >= 0.0)
        .collect();
    if valid.is_empty() {
        return (0.0, 0, Vec::new());
    }

    let count = valid.len() as f64;
    let avg_latency = valid.iter().map(|r| r.latency_hours).sum::<f64>() / count;
    let avg_length = valid.iter().map(|r| r.body_length as f64).sum::<f64>() / count;
    let dates: Vec<NaiveDateTime> = valid.iter().map(|r| r.sent_on).collect();

    let (first, last) = match (dates.iter().min(), dates.iter().max()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return (0.0, 0, Vec::new()),
    };
    let span_days = (last - first).num_days().max(1) as f64;

    let latency_score = 1.0 / (1.0 + avg_latency.max(0.0) / 24.0);
    let rate_score = (count / span_days * 10.0).min(1.0);
    let length_score = (avg_length / REPLY_LENGTH_SATURATION).min(1.0);

    let component = config.reply_time_weight * latency_score
        + config.reply_rate_weight * rate_score
        + config.reply_length_weight * length_score;
    (component, valid.len() as u32, dates)
}

/// Linear min-max scaling into [0, 1].
fn normalize_scores(scores: &mut BTreeMap<String, SenderImportance>) {
    let (min, max) = scores.values().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
        (lo.min(s.raw_score), hi.max(s.raw_score))
    });
    let range = max - min;

    if range > 0.0 {
        for record in scores.values_mut() {
            record.normalized_score = ((record.raw_score - min) / range).clamp(0.0, 1.0);
        }
    } else if scores.len() == 1 {
        for record in scores.values_mut() {
            record.normalized_score = SINGLE_CONTACT_SCORE;
        }
    } else {
        for record in scores.values_mut() {
            record.normalized_score = FLAT_RANGE_SCORE;
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenderImportance {
    pub contact: String,
    #[serde(default)]
    pub reply_count: u32,
    #[serde(default)]
    pub initiation_count: u32,
    #[serde(default)]
    pub read_kept_count: u32,
    #[serde(default)]
    pub total_interactions: u32,
    #[serde(default)]
    pub raw_score: f64,
    pub normalized_score: f64,
    #[serde(default, with = "crate::util::lenient_timestamp")]
    pub last_interaction: Option<NaiveDateTime>,
    #[serde(default, with = "crate::util::lenient_timestamp")]
    pub last_updated: Option<NaiveDateTime>,
}

/// Normalized importance per canonical contact.
#[derive(Debug, Clone, Default)]
pub struct ImportanceSnapshot {
    scores: BTreeMap<String, SenderImportance>,
}

impl ImportanceSnapshot {
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn get(&self, contact: &str) -> Option<&SenderImportance> {
        self.scores.get(contact)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SenderImportance> {
        self.scores.values()
    }

    /// Average normalized score of known contacts at `domain`.
    pub fn domain_average(&self, domain: &str) -> Option<f64> {
        if domain.is_empty() {
            return None;
        }
        let matching: Vec<f64> = self
            .scores
            .iter()
            .filter(|(contact, _)| util::extract_domain(contact) == domain)
            .map(|(_, s)| s.normalized_score)
            .collect();
        if matching.is_empty() {
            return None;
        }
        Some(matching.iter().sum::<f64>() / matching.len() as f64)
    }

    /// Load `sender_scores.json`. Never fails; out-of-range scores are
    /// clamped.
    pub fn load(path: &Path) -> ImportanceSnapshot {
        let mut scores: BTreeMap<String, SenderImportance> = util::load_json_map(path);
        for record in scores.values_mut() {
            if !record.normalized_score.is_finite() {
                record.normalized_score = FLAT_RANGE_SCORE;
            }
            record.normalized_score = record.normalized_score.clamp(0.0, 1.0);
        }
        ImportanceSnapshot { scores }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        util::write_json_atomic(path, &self.scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::SenderBehavior;
    use crate::types::{Recipient, SentMessage};
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn inbound(id: &str, sender: &str, conv: &str, received: NaiveDateTime) -> MailMessage {
        MailMessage {
            id: id.to_string(),
            sender_address: Some(sender.to_string()),
            conversation_id: Some(conv.to_string()),
            received_time: Some(received),
            ..Default::default()
        }
    }

    fn sent(subject: &str, conv: Option<&str>, to: &[&str], sent_on: NaiveDateTime) -> SentMessage {
        SentMessage {
            id: format!("{}-{}", subject, sent_on),
            subject: subject.to_string(),
            body_length: 250,
            sent_on: Some(sent_on),
            conversation_id: conv.map(str::to_string),
            recipients: to.iter().map(|a| Recipient::to(a)).collect(),
        }
    }

    #[test]
    fn test_parent_is_latest_earlier_message() {
        let index = ConversationIndex::from_messages(&[
            inbound("1", "a@x.com", "c1", at(1, 9)),
            inbound("2", "b@x.com", "c1", at(1, 11)),
            inbound("3", "c@x.com", "c1", at(1, 15)),
        ]);
        let (when, who) = index.parent_before("c1", at(1, 12)).unwrap();
        assert_eq!(when, at(1, 11));
        assert_eq!(who, "b@x.com");
        assert!(index.parent_before("c1", at(1, 9)).is_none());
        assert_eq!(index.parent_before("c1", at(2, 0)).unwrap().1, "c@x.com");
        assert!(index.parent_before("c2", at(2, 0)).is_none());
    }

    #[test]
    fn test_single_contact_zero_range_gets_default() {
        let mut ctx = ImportanceContext::new();
        ctx.record_initiation("solo@x.com", at(2, 10));
        let snapshot = ctx.build(&AliasMap::new(), &TriageConfig::default());
        let record = snapshot.get("solo@x.com").unwrap();
        assert!((record.normalized_score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_flat_range_many_contacts_neutral() {
        let mut ctx = ImportanceContext::new();
        ctx.record_initiation("a@x.com", at(2, 10));
        ctx.record_initiation("b@x.com", at(2, 10));
        let snapshot = ctx.build(&AliasMap::new(), &TriageConfig::default());
        assert!(snapshot.iter().all(|s| (s.normalized_score - 0.5).abs() < 1e-9));
    }

    #[test]
    fn test_scores_within_unit_interval() {
        let mut ctx = ImportanceContext::new();
        for i in 0..5 {
            ctx.record_initiation("busy@x.com", at(1 + i, 9));
        }
        ctx.record_read_kept("reader@x.com", 2, Some(at(3, 9)));
        ctx.record_reply(
            "boss@x.com",
            ReplyObservation {
                latency_hours: 1.0,
                body_length: 800,
                sent_on: at(4, 9),
            },
        );
        let snapshot = ctx.build(&AliasMap::new(), &TriageConfig::default());
        assert_eq!(snapshot.len(), 3);
        for s in snapshot.iter() {
            assert!((0.0..=1.0).contains(&s.normalized_score), "{}", s.normalized_score);
        }
        assert!((snapshot.get("busy@x.com").unwrap().normalized_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_reply_component_formula() {
        let mut ctx = ImportanceContext::new();
        for (day, latency) in [(1, 12.0), (11, 36.0)] {
            ctx.record_reply(
                "peer@x.com",
                ReplyObservation {
                    latency_hours: latency,
                    body_length: 250,
                    sent_on: at(day, 9),
                },
            );
        }
        // Negative latency is discarded.
        ctx.record_reply(
            "peer@x.com",
            ReplyObservation {
                latency_hours: -2.0,
                body_length: 10_000,
                sent_on: at(20, 9),
            },
        );
        let snapshot = ctx.build(&AliasMap::new(), &TriageConfig::default());
        let record = snapshot.get("peer@x.com").unwrap();
        // avg 24h -> 0.5; 2 replies / 10 days * 10 -> 1.0 capped; 250/500 -> 0.5
        let expected = 0.4 * 0.5 + 0.4 * 1.0 + 0.2 * 0.5;
        assert_eq!(record.reply_count, 2);
        assert!((record.raw_score - expected).abs() < 1e-9, "{}", record.raw_score);
        assert_eq!(record.last_interaction, Some(at(11, 9)));
    }

    #[test]
    fn test_min_replies_gate() {
        let config = TriageConfig {
            min_emails_for_pattern: 2,
            ..Default::default()
        };
        let mut ctx = ImportanceContext::new();
        ctx.record_reply(
            "rare@x.com",
            ReplyObservation {
                latency_hours: 1.0,
                body_length: 100,
                sent_on: at(1, 9),
            },
        );
        let snapshot = ctx.build(&AliasMap::new(), &config);
        assert!(snapshot.get("rare@x.com").is_none());
    }

    #[test]
    fn test_aliases_merge_into_one_contact() {
        let mut aliases = AliasMap::new();
        aliases.insert_direct("John Doe", "jdoe@example.com");
        let mut ctx = ImportanceContext::new();
        ctx.record_initiation("john doe", at(1, 9));
        ctx.record_initiation("jdoe@example.com", at(2, 9));
        let snapshot = ctx.build(&aliases, &TriageConfig::default());
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("jdoe@example.com").unwrap().initiation_count, 2);
    }

    #[test]
    fn test_from_history_signals() {
        let history = MailHistory {
            received: vec![inbound("in-1", "Boss <boss@corp.com>", "c1", at(3, 8))],
            sent: vec![
                sent("RE: plan", Some("c1"), &["boss@corp.com"], at(3, 10)),
                sent("Kickoff", None, &["peer@corp.com"], at(4, 9)),
                sent("FW: deck", None, &["other@corp.com"], at(4, 9)),
            ],
        };
        let mut behavior = InboxBehavior::default();
        behavior.insert(
            "reader@corp.com",
            SenderBehavior {
                read_kept: 3,
                total: 3,
                last_read_kept: Some(at(5, 9)),
                ..Default::default()
            },
        );

        let config = TriageConfig::default();
        let aliases = AliasMap::new();
        let snapshot =
            ImportanceContext::from_history(&history, &behavior, &aliases, &config).build(&aliases, &config);

        assert_eq!(snapshot.get("boss@corp.com").unwrap().reply_count, 1);
        assert_eq!(snapshot.get("peer@corp.com").unwrap().initiation_count, 1);
        assert!(snapshot.get("other@corp.com").is_none());
        assert_eq!(snapshot.get("reader@corp.com").unwrap().read_kept_count, 3);
    }

    #[test]
    fn test_domain_average() {
        let mut ctx = ImportanceContext::new();
        ctx.record_initiation("a@corp.com", at(1, 9));
        ctx.record_initiation("a@corp.com", at(2, 9));
        ctx.record_initiation("b@corp.com", at(1, 9));
        ctx.record_initiation("c@else.com", at(1, 9));
        let snapshot = ctx.build(&AliasMap::new(), &TriageConfig::default());
        // a -> 1.0, b -> 0.0, c -> 0.0
        assert!((snapshot.domain_average("corp.com").unwrap() - 0.5).abs() < 1e-9);
        assert!(snapshot.domain_average("nowhere.org").is_none());
    }

    #[test]
    fn test_snapshot_round_trip_and_clamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sender_scores.json");
        std::fs::write(
            &path,
            r#"{"x@y.com": {"contact": "x@y.com", "normalized_score": 4.0,
                "last_interaction": "2024-05-01 09:00:00"},
               "broken": {"normalized_score": "high"}}"#,
        )
        .unwrap();
        let loaded = ImportanceSnapshot::load(&path);
        assert_eq!(loaded.len(), 1);
        let record = loaded.get("x@y.com").unwrap();
        assert!((record.normalized_score - 1.0).abs() < 1e-9);
        assert_eq!(record.last_interaction, Some(at(1, 9)));

        loaded.save(&path).unwrap();
        assert_eq!(ImportanceSnapshot::load(&path).len(), 1);
    }
}
