//! Message scorer.
//!
//! Fuses five components into a final score in [0, 1]:
//! - sender (0.4): learned contact importance, domain fallback, reopen bonus
//! - topic (0.25): category priority from content analysis
//! - temporal (0.15): recency blended with urgency
//! - message state (0.1): unread/ignored penalties, flag and importance bonuses
//! - recipient (0.1): addressed to the user directly, in a crowd, or on CC
//!
//! Weights come from [`TriageConfig`] and are re-normalized to sum to 1.
//! Scoring is a pure function of its inputs.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::config::{ScoringWeights, TriageConfig};
use crate::constants::{
    ACTION_ITEM_URGENCY_BOOST, CONVERSATION_BONUS, DIRECT_RECIPIENT_LIMIT, MASS_RECIPIENT_LIMIT,
    MAX_IGNORE_PENALTY, NEUTRAL_SCORE, UNKNOWN_CONTACT,
};
use crate::content::ContentAnalysis;
use crate::contacts::{AliasMap, ImportanceSnapshot};
use crate::error::{Result, TriageError};
use crate::signals::recency;
use crate::tracking::TrackingRecord;
use crate::types::{FlagStatus, Importance, MailMessage, Recipient, RecipientRole};
use crate::util;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Optional per-contact reading signals. Absent contacts get no bonus.
#[derive(Debug, Clone, Default)]
pub struct ReadingPatterns {
    reopen_ratios: BTreeMap<String, f64>,
}

impl ReadingPatterns {
    pub fn set_reopen_ratio(&mut self, contact: &str, ratio: f64) {
        self.reopen_ratios.insert(contact.to_string(), ratio);
    }

    pub fn reopen_ratio(&self, contact: &str) -> Option<f64> {
        self.reopen_ratios.get(contact).copied()
    }
}

/// Everything the scorer reads for one message.
pub struct ScoringInputs<'a> {
    pub message: &'a MailMessage,
    pub analysis: &'a ContentAnalysis,
    pub aliases: &'a AliasMap,
    pub importance: &'a ImportanceSnapshot,
    /// This scan's tracking record for the message.
    pub tracking: Option<&'a TrackingRecord>,
    pub patterns: Option<&'a ReadingPatterns>,
    /// Known messages sharing this message's conversation id.
    pub conversation_size: usize,
    pub now: NaiveDateTime,
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// Fields of the scored message the recommendation step needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageMetadata {
    pub id: String,
    /// Canonical sender key.
    pub sender: String,
    pub raw_sender: String,
    pub subject: String,
    pub received_time: Option<NaiveDateTime>,
    pub age_days: i64,
    pub is_reply: bool,
    pub is_forward: bool,
    pub conversation_id: Option<String>,
    pub is_unread: bool,
    /// Consecutive unread scans, 0 when read or untracked.
    pub check_count: u32,
    pub is_flagged: bool,
    pub flag_due_by: Option<NaiveDateTime>,
    pub days_until_due: Option<i64>,
    pub high_importance: bool,
    pub to_me: bool,
    pub cc_me: bool,
    pub recipient_count: usize,
}

impl MessageMetadata {
    /// Extract scoring metadata. Fails only when the message cannot be
    /// identified.
    pub fn extract(
        message: &MailMessage,
        aliases: &AliasMap,
        tracking: Option<&TrackingRecord>,
        now: NaiveDateTime,
        config: &TriageConfig,
    ) -> Result<MessageMetadata> {
        if message.id.trim().is_empty() {
            return Err(TriageError::Metadata(format!(
                "message '{}' has no id",
                message.subject
            )));
        }

        let raw_sender = message.raw_sender().unwrap_or_default();
        let sender = if raw_sender.is_empty() {
            UNKNOWN_CONTACT.to_string()
        } else {
            aliases.normalize(&raw_sender)
        };

        let is_user = |r: &Recipient| {
            r.identifier().is_some_and(|id| config.is_user_address(id))
        };
        let to_me = message
            .recipients
            .iter()
            .any(|r| r.role == RecipientRole::To && is_user(r));
        let cc_me = !to_me
            && message
                .recipients
                .iter()
                .any(|r| r.role == RecipientRole::Cc && is_user(r));

        let check_count = tracking
            .filter(|r| !r.is_read)
            .map_or(0, |r| r.check_count);

        Ok(MessageMetadata {
            id: message.id.clone(),
            sender,
            raw_sender,
            subject: message.subject.clone(),
            received_time: message.received_time,
            age_days: recency::age_days(message.received_time, now),
            is_reply: util::is_reply_subject(&message.subject),
            is_forward: util::is_forward_subject(&message.subject),
            conversation_id: message.conversation_id.clone(),
            is_unread: !message.is_read,
            check_count,
            is_flagged: message.is_flagged(),
            flag_due_by: message.flag_due_by,
            days_until_due: message
                .flag_due_by
                .filter(|_| message.flag_status != FlagStatus::Complete)
                .map(|due| recency::days_until_due(due, now)),
            high_importance: message.importance == Importance::High,
            to_me,
            cc_me,
            recipient_count: message.total_recipients(),
        })
    }

    /// Due today or overdue.
    pub fn is_due_today(&self) -> bool {
        self.days_until_due.is_some_and(|d| d <= 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreComponents {
    pub sender: f64,
    pub topic: f64,
    pub temporal: f64,
    pub message_state: f64,
    pub recipient: f64,
    pub urgency: f64,
    pub recency: f64,
    pub reopen_bonus: f64,
    pub category_priority: f64,
}

#[derive(Debug, Clone)]
pub struct ScoreResult {
    pub final_score: f64,
    pub components: ScoreComponents,
    pub metadata: MessageMetadata,
    pub analysis: ContentAnalysis,
    /// Human-readable contributors, most significant first.
    pub reasons: Vec<String>,
}

impl ScoreResult {
    pub fn reason(&self) -> String {
        self.reasons.join(" · ")
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

/// Sender component and the reopen bonus folded into it.
pub fn sender_score(
    sender: &str,
    importance: &ImportanceSnapshot,
    patterns: Option<&ReadingPatterns>,
    reasons: &mut Vec<String>,
) -> (f64, f64) {
    let base = match importance.get(sender) {
        Some(record) => {
            reasons.push(format!("known sender ({:.2})", record.normalized_score));
            record.normalized_score
        }
        None if sender.contains('@') => match importance.domain_average(&util::extract_domain(sender)) {
            Some(avg) => {
                reasons.push("known domain".to_string());
                avg
            }
            None => NEUTRAL_SCORE,
        },
        None => NEUTRAL_SCORE,
    };

    let reopen_bonus = match patterns.and_then(|p| p.reopen_ratio(sender)) {
        Some(ratio) if ratio > 0.5 => 0.2,
        Some(ratio) if ratio > 0.2 => 0.1,
        _ => 0.0,
    };
    if reopen_bonus > 0.0 {
        reasons.push("often reopened".to_string());
    }
    ((base + reopen_bonus).min(1.0), reopen_bonus)
}

/// Urgency with the action-item boost, capped at 1.
pub fn urgency_score(analysis: &ContentAnalysis) -> f64 {
    let base = analysis.urgency.score();
    if analysis.has_action_items() {
        (base + ACTION_ITEM_URGENCY_BOOST).min(1.0)
    } else {
        base
    }
}

/// Temporal component and the recency value that fed it.
pub fn temporal_score(
    meta: &MessageMetadata,
    urgency: f64,
    conversation_size: usize,
    config: &TriageConfig,
    reasons: &mut Vec<String>,
) -> (f64, f64) {
    let mut recency = recency::recency_score(meta.age_days);
    if conversation_size > 1 {
        recency = (recency + CONVERSATION_BONUS).min(1.0);
        reasons.push("active conversation".to_string());
    }
    if meta.received_time.is_some_and(recency::is_off_hours) {
        recency = (recency + config.off_hours_bonus).min(1.0);
        reasons.push("sent off-hours".to_string());
    }
    (0.4 * recency + 0.6 * urgency, recency)
}

/// Message-state component. Not clamped; the final score is.
pub fn message_state_score(meta: &MessageMetadata, config: &TriageConfig, reasons: &mut Vec<String>) -> f64 {
    let mut score = NEUTRAL_SCORE;

    if meta.is_unread {
        score -= config.unread_penalty;
        if meta.check_count > 1 {
            let penalty =
                (config.ignore_penalty * f64::from(meta.check_count - 1)).min(MAX_IGNORE_PENALTY);
            score -= penalty;
            reasons.push(format!("ignored {} scans", meta.check_count));
            log::debug!(
                "{}: ignore penalty -{:.3} at check_count {}",
                meta.id,
                penalty,
                meta.check_count
            );
        }
    } else {
        score += config.read_kept_bonus;
    }

    if meta.is_flagged {
        score += config.flagged_bonus;
        reasons.push("flagged".to_string());
        match meta.days_until_due {
            Some(d) if d <= 0 => {
                score += config.due_today_bonus;
                reasons.push("due today".to_string());
            }
            Some(d) if d <= 2 => {
                score += config.due_soon_bonus;
                reasons.push("due soon".to_string());
            }
            _ => {}
        }
    }

    if meta.high_importance {
        score += config.high_importance_bonus;
        reasons.push("high importance".to_string());
    }
    score
}

pub fn recipient_score(meta: &MessageMetadata, config: &TriageConfig, reasons: &mut Vec<String>) -> f64 {
    let mut score = NEUTRAL_SCORE;
    if meta.to_me {
        score += config.to_me_bonus;
        if meta.recipient_count <= DIRECT_RECIPIENT_LIMIT {
            score += config.direct_to_me_bonus;
            reasons.push("sent directly to you".to_string());
        } else if meta.recipient_count > MASS_RECIPIENT_LIMIT {
            score -= config.many_recipients_penalty;
            reasons.push("mass mailing".to_string());
        }
    } else if meta.cc_me {
        score -= config.cc_me_penalty;
        reasons.push("cc only".to_string());
    }
    score
}

/// Weighted sum clamped to [0, 1].
pub fn combine(components: &ScoreComponents, weights: &ScoringWeights) -> f64 {
    let w = weights.normalized();
    let raw = w.sender * components.sender
        + w.topic * components.topic
        + w.temporal * components.temporal
        + w.message_state * components.message_state
        + w.recipient * components.recipient;
    if raw.is_nan() {
        return 0.0;
    }
    raw.clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Score one message. `None` when its metadata cannot be extracted; the
/// caller counts that as an error and moves on.
pub fn score_message(inputs: &ScoringInputs, config: &TriageConfig) -> Option<ScoreResult> {
    let meta = match MessageMetadata::extract(
        inputs.message,
        inputs.aliases,
        inputs.tracking,
        inputs.now,
        config,
    ) {
        Ok(meta) => meta,
        Err(e) => {
            log::error!("Skipping message: {}", e);
            return None;
        }
    };

    let mut reasons = Vec::new();
    let (sender, reopen_bonus) =
        sender_score(&meta.sender, inputs.importance, inputs.patterns, &mut reasons);

    let category_priority = inputs.analysis.category.priority();
    let urgency = urgency_score(inputs.analysis);
    if inputs.analysis.has_action_items() {
        reasons.push("action items".to_string());
    }

    let (temporal, recency) =
        temporal_score(&meta, urgency, inputs.conversation_size, config, &mut reasons);
    let message_state = message_state_score(&meta, config, &mut reasons);
    let recipient = recipient_score(&meta, config, &mut reasons);

    let components = ScoreComponents {
        sender,
        topic: category_priority,
        temporal,
        message_state,
        recipient,
        urgency,
        recency,
        reopen_bonus,
        category_priority,
    };
    let final_score = combine(&components, &config.weights());

    log::debug!(
        "Scored {} from {}: {:.3} (sender {:.2}, topic {:.2}, temporal {:.2}, state {:.2}, recipient {:.2})",
        meta.id,
        meta.sender,
        final_score,
        sender,
        category_priority,
        temporal,
        message_state,
        recipient
    );

    Some(ScoreResult {
        final_score,
        components,
        metadata: meta,
        analysis: inputs.analysis.clone(),
        reasons,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Category, Urgency};
    use crate::contacts::ImportanceContext;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 8, 14)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn message() -> MailMessage {
        MailMessage {
            id: "m-1".to_string(),
            sender_name: Some("Pat Lee".to_string()),
            sender_address: Some("pat@corp.com".to_string()),
            subject: "Quarterly plan".to_string(),
            received_time: Some(now() - chrono::Duration::hours(2)),
            folder_path: "Inbox".to_string(),
            ..Default::default()
        }
    }

    fn meta_for(message: &MailMessage, tracking: Option<&TrackingRecord>, config: &TriageConfig) -> MessageMetadata {
        MessageMetadata::extract(message, &AliasMap::new(), tracking, now(), config).unwrap()
    }

    fn tracking(check_count: u32, is_read: bool) -> TrackingRecord {
        TrackingRecord {
            subject: String::new(),
            sender: "pat@corp.com".to_string(),
            raw_sender: "pat@corp.com".to_string(),
            sender_name: None,
            sender_email: None,
            received_time: None,
            last_modified: None,
            folder_path: "Inbox".to_string(),
            is_read,
            check_count,
            last_checked: None,
        }
    }

    #[test]
    fn test_ignore_penalty_zeroes_message_state() {
        let config = TriageConfig::default();
        let record = tracking(3, false);
        let meta = meta_for(&message(), Some(&record), &config);
        let score = message_state_score(&meta, &config, &mut Vec::new());
        assert!(score.abs() < 1e-9, "expected 0.0, got {}", score);
    }

    #[test]
    fn test_ignore_penalty_capped() {
        let config = TriageConfig::default();
        let record = tracking(20, false);
        let meta = meta_for(&message(), Some(&record), &config);
        let score = message_state_score(&meta, &config, &mut Vec::new());
        assert!((score - (0.5 - 0.2 - 0.4)).abs() < 1e-9, "{}", score);
    }

    #[test]
    fn test_read_flagged_due_today_and_important() {
        let config = TriageConfig::default();
        let mut m = message();
        m.is_read = true;
        m.flag_status = FlagStatus::Marked;
        m.flag_due_by = Some(now());
        m.importance = Importance::High;
        let meta = meta_for(&m, None, &config);
        let score = message_state_score(&meta, &config, &mut Vec::new());
        // 0.5 + 0.3 + 0.15 + 0.25 + 0.2
        assert!((score - 1.4).abs() < 1e-9, "{}", score);
        assert!(meta.is_due_today());
    }

    #[test]
    fn test_recipient_rules() {
        let config = TriageConfig {
            user_addresses: vec!["me@corp.com".to_string()],
            ..Default::default()
        };
        let mut m = message();
        m.recipients = vec![Recipient::to("me@corp.com")];
        let meta = meta_for(&m, None, &config);
        assert!((recipient_score(&meta, &config, &mut Vec::new()) - 0.75).abs() < 1e-9);

        m.recipient_count = Some(40);
        let meta = meta_for(&m, None, &config);
        assert!((recipient_score(&meta, &config, &mut Vec::new()) - 0.55).abs() < 1e-9);

        m.recipients = vec![Recipient::to("team@corp.com"), Recipient::cc("me@corp.com")];
        let meta = meta_for(&m, None, &config);
        assert!((recipient_score(&meta, &config, &mut Vec::new()) - 0.45).abs() < 1e-9);
    }

    #[test]
    fn test_sender_score_domain_fallback_and_reopen() {
        let mut ctx = ImportanceContext::new();
        ctx.record_initiation("boss@corp.com", now());
        ctx.record_initiation("boss@corp.com", now());
        ctx.record_initiation("peer@corp.com", now());
        let snapshot = ctx.build(&AliasMap::new(), &TriageConfig::default());

        let (known, _) = sender_score("boss@corp.com", &snapshot, None, &mut Vec::new());
        assert!((known - 1.0).abs() < 1e-9);

        let (domain, _) = sender_score("new@corp.com", &snapshot, None, &mut Vec::new());
        assert!((domain - 0.5).abs() < 1e-9);

        let (stranger, _) = sender_score("x@else.org", &snapshot, None, &mut Vec::new());
        assert!((stranger - 0.5).abs() < 1e-9);

        let mut patterns = ReadingPatterns::default();
        patterns.set_reopen_ratio("x@else.org", 0.6);
        let (boosted, bonus) = sender_score("x@else.org", &snapshot, Some(&patterns), &mut Vec::new());
        assert!((bonus - 0.2).abs() < 1e-9);
        assert!((boosted - 0.7).abs() < 1e-9);

        patterns.set_reopen_ratio("boss@corp.com", 0.3);
        let (capped, _) = sender_score("boss@corp.com", &snapshot, Some(&patterns), &mut Vec::new());
        assert!((capped - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_temporal_with_conversation_and_off_hours() {
        let config = TriageConfig::default();
        let mut m = message();
        m.received_time = Some(now() - chrono::Duration::hours(6)); // 06:00
        let meta = meta_for(&m, None, &config);
        let (temporal, recency) = temporal_score(&meta, 0.6, 2, &config, &mut Vec::new());
        assert!((recency - 1.0).abs() < 1e-9);
        assert!((temporal - (0.4 + 0.36)).abs() < 1e-9);

        let (_, single) = temporal_score(&meta, 0.6, 1, &config, &mut Vec::new());
        assert!((single - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_urgency_action_boost() {
        let analysis = ContentAnalysis {
            urgency: Urgency::Urgent,
            action_items: vec!["Please sign the form.".to_string()],
            ..Default::default()
        };
        assert!((urgency_score(&analysis) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_final_score_clamped() {
        let components = ScoreComponents {
            sender: 1.0,
            topic: 1.0,
            temporal: 1.0,
            message_state: 1.5,
            recipient: 1.0,
            urgency: 1.0,
            recency: 1.0,
            reopen_bonus: 0.0,
            category_priority: 1.0,
        };
        let score = combine(&components, &TriageConfig::default().weights());
        assert!((score - 1.0).abs() < 1e-9, "{}", score);

        let negative = ScoreComponents {
            sender: 0.0,
            topic: 0.0,
            temporal: 0.0,
            message_state: -3.0,
            recipient: 0.0,
            ..components
        };
        assert_eq!(combine(&negative, &TriageConfig::default().weights()), 0.0);
    }

    #[test]
    fn test_score_message_end_to_end() {
        let config = TriageConfig::default();
        let m = message();
        let analysis = ContentAnalysis {
            category: Category::Professional,
            urgency: Urgency::Medium,
            ..Default::default()
        };
        let aliases = AliasMap::new();
        let importance = ImportanceSnapshot::default();
        let inputs = ScoringInputs {
            message: &m,
            analysis: &analysis,
            aliases: &aliases,
            importance: &importance,
            tracking: None,
            patterns: None,
            conversation_size: 1,
            now: now(),
        };
        let result = score_message(&inputs, &config).unwrap();
        // sender .5, topic .7, temporal .4*.95+.6*.6, state .5-.2, recipient .5
        let expected = 0.4 * 0.5 + 0.25 * 0.7 + 0.15 * (0.38 + 0.36) + 0.1 * 0.3 + 0.1 * 0.5;
        assert!((result.final_score - expected).abs() < 1e-9, "{}", result.final_score);
        assert_eq!(result.metadata.sender, "pat@corp.com");
    }

    #[test]
    fn test_missing_id_yields_none() {
        let mut m = message();
        m.id = String::new();
        let analysis = ContentAnalysis::default();
        let aliases = AliasMap::new();
        let importance = ImportanceSnapshot::default();
        let inputs = ScoringInputs {
            message: &m,
            analysis: &analysis,
            aliases: &aliases,
            importance: &importance,
            tracking: None,
            patterns: None,
            conversation_size: 0,
            now: now(),
        };
        assert!(score_message(&inputs, &TriageConfig::default()).is_none());
    }
}
