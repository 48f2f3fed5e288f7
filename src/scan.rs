//! Run orchestration: inbox scan, importance rebuild and batch triage.
//!
//! A run is `scan_inbox` (sequential, updates tracking and aliases), then
//! `triage` (per-message analysis and scoring on the bounded pool).
//! `rebuild_importance` runs whenever fresh history is available.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::constants::{
    ARCHIVE_PREFIX, FOLDER_ACTION_REQUIRED, FOLDER_DUE_TODAY, FOLDER_HIGH_PRIORITY,
    FOLDER_IMPORTANT, FOLDER_MEDIUM_PRIORITY, UNKNOWN_CONTACT,
};
use crate::contacts::ImportanceContext;
use crate::content::{AnalysisSource, GuardedAnalyzer};
use crate::parallel::run_bounded;
use crate::signals::{
    recommend, score_message, wants_folder_suggestion, ReadingPatterns, Recommendation,
    ScoreResult, ScoringInputs,
};
use crate::state::{Workspace, TRACKING_FILE};
use crate::types::{MailHistory, MailMessage};

// ---------------------------------------------------------------------------
// Scan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanSummary {
    pub observed: usize,
    /// Messages without an id; they are never tracked.
    pub skipped: usize,
    pub new_aliases: usize,
    /// False when the tracking snapshot could not be written; the store
    /// then keeps its previous state.
    pub committed: bool,
}

/// Record one inbox scan: harvest direct alias pairs, then update every
/// message's tracking record and the per-sender behavior counts.
/// Messages with a blank id are skipped.
pub fn scan_inbox(ws: &Workspace, messages: &[MailMessage], now: NaiveDateTime) -> ScanSummary {
    let new_aliases = ws.aliases.write().extend_direct_pairs(messages);
    if new_aliases > 0 {
        log::info!("Learned {} new direct aliases", new_aliases);
        ws.persist_aliases();
    }

    let mut tracking = ws.tracking.lock();
    let mut batch = tracking.begin_scan();
    let mut skipped = 0;
    {
        let aliases = ws.aliases.read();
        for message in messages {
            if message.id.trim().is_empty() {
                log::warn!("Skipping message without id: '{}'", message.subject);
                skipped += 1;
                continue;
            }
            let sender = match message.raw_sender() {
                Some(raw) => aliases.normalize(&raw),
                None => UNKNOWN_CONTACT.to_string(),
            };
            batch.observe(message, &sender, now, &ws.config);
        }
    }
    let observed = batch.observed();

    let path = ws.snapshot_path(TRACKING_FILE);
    match tracking.commit(batch, path.as_deref()) {
        Ok(behavior) => {
            drop(tracking);
            *ws.behavior.write() = behavior;
            ws.persist_behavior();
            ScanSummary {
                observed,
                skipped,
                new_aliases,
                committed: true,
            }
        }
        Err(e) => {
            log::warn!("Tracking scan discarded: {}. {}", e, e.recovery_suggestion());
            ScanSummary {
                observed,
                skipped,
                new_aliases,
                committed: false,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Importance
// ---------------------------------------------------------------------------

/// Rebuild sender importance from `history` and the last scan's behavior.
/// Builds the alias map first when it is still empty. Returns the number
/// of scored contacts.
pub fn rebuild_importance(ws: &Workspace, history: &MailHistory) -> usize {
    let stats = ws.aliases.write().build(history);
    if stats.direct + stats.inferred > 0 {
        log::info!(
            "Alias map built: {} direct, {} inferred, {} skipped",
            stats.direct,
            stats.inferred,
            stats.skipped
        );
        ws.persist_aliases();
    }

    let snapshot = {
        let aliases = ws.aliases.read();
        let behavior = ws.behavior.read();
        ImportanceContext::from_history(history, &behavior, &aliases, &ws.config)
            .build(&aliases, &ws.config)
    };
    let scored = snapshot.len();
    *ws.importance.write() = snapshot;
    ws.persist_importance();
    scored
}

// ---------------------------------------------------------------------------
// Triage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MessageTriage {
    pub id: String,
    pub score: ScoreResult,
    pub recommendation: Recommendation,
    pub source: AnalysisSource,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TriageStats {
    pub processed: usize,
    pub errors: usize,
    pub due_today: usize,
    pub high_priority: usize,
    pub important: usize,
    pub medium_priority: usize,
    pub action_required: usize,
    pub category_folders: usize,
    pub archived: usize,
    pub flagged: usize,
    pub tasks: usize,
    pub content_fallbacks: usize,
}

impl TriageStats {
    fn record(&mut self, triage: &MessageTriage) {
        self.processed += 1;
        let rec = &triage.recommendation;
        if rec.folder == FOLDER_DUE_TODAY {
            self.due_today += 1;
        } else if rec.folder == FOLDER_IMPORTANT {
            self.important += 1;
        } else if rec.folder.starts_with(FOLDER_HIGH_PRIORITY) {
            self.high_priority += 1;
        } else if rec.folder.starts_with(FOLDER_MEDIUM_PRIORITY) {
            self.medium_priority += 1;
        } else if rec.folder.starts_with(FOLDER_ACTION_REQUIRED) {
            self.action_required += 1;
        } else if rec.folder.starts_with(&format!("{}/", ARCHIVE_PREFIX)) {
            self.archived += 1;
        } else {
            self.category_folders += 1;
        }
        if rec.flag {
            self.flagged += 1;
        }
        if rec.create_task {
            self.tasks += 1;
        }
        if triage.source == AnalysisSource::Fallback {
            self.content_fallbacks += 1;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TriageReport {
    pub stats: TriageStats,
    /// Triaged messages in input order; skipped messages are absent.
    pub messages: Vec<MessageTriage>,
}

/// Analyze, score and recommend every message, `worker_count` at a time.
///
/// Call after [`scan_inbox`] so scores see this scan's tracking records.
/// A message whose metadata cannot be extracted, or whose worker task
/// panics, is counted as an error and skipped.
pub async fn triage(
    ws: Arc<Workspace>,
    analyzer: GuardedAnalyzer,
    messages: Vec<MailMessage>,
    patterns: Option<Arc<ReadingPatterns>>,
    now: NaiveDateTime,
) -> TriageReport {
    let mut conversations: HashMap<String, usize> = HashMap::new();
    for id in messages.iter().filter_map(|m| m.conversation_id.as_ref()) {
        *conversations.entry(id.clone()).or_default() += 1;
    }
    let conversations = Arc::new(conversations);

    let workers = ws.config.worker_count;
    let ids: Vec<String> = messages.iter().map(|m| m.id.clone()).collect();
    let total = messages.len();
    let outcomes = run_bounded(workers, messages, move |message| {
        let ws = ws.clone();
        let analyzer = analyzer.clone();
        let patterns = patterns.clone();
        let conversations = conversations.clone();
        async move { triage_one(&ws, &analyzer, message, patterns.as_deref(), &conversations, now).await }
    })
    .await;

    let mut report = TriageReport::default();
    for (id, outcome) in ids.iter().zip(outcomes) {
        match outcome {
            Ok(Some(triage)) => {
                report.stats.record(&triage);
                report.messages.push(triage);
            }
            Ok(None) => report.stats.errors += 1,
            Err(e) => {
                if e.is_per_message() {
                    log::warn!("Message '{}' skipped: {}. {}", id, e, e.recovery_suggestion());
                } else {
                    log::error!("Message '{}' failed: {}", id, e);
                }
                report.stats.errors += 1;
            }
        }
    }

    let s = &report.stats;
    log::info!(
        "Triaged {}/{} messages: {} due today, {} high, {} important, {} medium, {} action required, {} archived, {} category, {} errors, {} content fallbacks",
        s.processed,
        total,
        s.due_today,
        s.high_priority,
        s.important,
        s.medium_priority,
        s.action_required,
        s.archived,
        s.category_folders,
        s.errors,
        s.content_fallbacks
    );
    report
}

async fn triage_one(
    ws: &Workspace,
    analyzer: &GuardedAnalyzer,
    message: MailMessage,
    patterns: Option<&ReadingPatterns>,
    conversations: &HashMap<String, usize>,
    now: NaiveDateTime,
) -> Option<MessageTriage> {
    let raw_sender = message.raw_sender().unwrap_or_default();
    let guarded = analyzer.analyze(&message.subject, &message.body, &raw_sender).await;

    let conversation_size = message
        .conversation_id
        .as_ref()
        .and_then(|id| conversations.get(id).copied())
        .unwrap_or(0);
    let record = ws.tracking.lock().get(&message.id).cloned();

    let score = {
        let aliases = ws.aliases.read();
        let importance = ws.importance.read();
        let inputs = ScoringInputs {
            message: &message,
            analysis: &guarded.analysis,
            aliases: &aliases,
            importance: &importance,
            tracking: record.as_ref(),
            patterns,
            conversation_size,
            now,
        };
        score_message(&inputs, &ws.config)
    }?;

    let suggestion = if wants_folder_suggestion(&score, &ws.config) {
        analyzer
            .suggest_folder_name(&message.subject, &message.body, score.analysis.category)
            .await
    } else {
        None
    };
    let recommendation = recommend(&score, &ws.config, suggestion.as_deref());

    Some(MessageTriage {
        id: message.id,
        score,
        recommendation,
        source: guarded.source,
    })
}
