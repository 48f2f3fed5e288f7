//! Folder/flag/task recommendation from a scored message.
//!
//! Rules run in order and later rules only touch folders earlier rules left
//! at "General", except action items which may override low-signal folders.

use serde::Serialize;

use crate::config::TriageConfig;
use crate::constants::{
    ARCHIVE_PREFIX, FOLDER_ACTION_REQUIRED, FOLDER_DUE_TODAY, FOLDER_GENERAL,
    FOLDER_HIGH_PRIORITY, FOLDER_IMPORTANT, FOLDER_MEDIUM_PRIORITY, GENERIC_FOLDER_NAMES,
    LOW_SIGNAL_FOLDERS, MAX_FOLDER_NAME_LEN, PRIORITY_FOLDERS,
};
use crate::content::rules::capitalize;
use crate::content::Category;

use super::scoring::ScoreResult;

/// What to do with one message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub folder: String,
    pub flag: bool,
    pub create_task: bool,
    pub auto_archive: bool,
    pub score: f64,
}

impl Recommendation {
    fn general(score: f64) -> Self {
        Self {
            folder: FOLDER_GENERAL.to_string(),
            flag: false,
            create_task: false,
            auto_archive: false,
            score,
        }
    }

    pub fn is_priority_folder(&self) -> bool {
        PRIORITY_FOLDERS.contains(&self.folder.as_str())
    }
}

// ---------------------------------------------------------------------------
// Rules: due date, importance, thresholds
// ---------------------------------------------------------------------------

fn apply_priority_rules(rec: &mut Recommendation, result: &ScoreResult, config: &TriageConfig) {
    let meta = &result.metadata;
    if meta.is_due_today() {
        rec.folder = FOLDER_DUE_TODAY.to_string();
        rec.flag = true;
        rec.create_task = true;
        return;
    }

    if meta.high_importance {
        rec.folder = if result.final_score >= config.high_priority_threshold {
            FOLDER_HIGH_PRIORITY
        } else {
            FOLDER_IMPORTANT
        }
        .to_string();
        rec.flag = true;
    }

    if !rec.is_priority_folder() {
        if result.final_score >= config.high_priority_threshold {
            rec.folder = FOLDER_HIGH_PRIORITY.to_string();
            rec.flag = true;
            rec.create_task = true;
        } else if result.final_score >= config.medium_priority_threshold {
            rec.folder = FOLDER_MEDIUM_PRIORITY.to_string();
            rec.flag = true;
        }
    }
}

/// Whether [`recommend`] will file this message under a topic sub-folder,
/// i.e. whether asking for a folder suggestion is worthwhile.
pub fn wants_folder_suggestion(result: &ScoreResult, config: &TriageConfig) -> bool {
    if !result.analysis.category.wants_subfolder() {
        return false;
    }
    let mut rec = Recommendation::general(result.final_score);
    apply_priority_rules(&mut rec, result, config);
    rec.folder == FOLDER_GENERAL
}

// ---------------------------------------------------------------------------
// Rule: category folders
// ---------------------------------------------------------------------------

/// Clean a suggested folder name. `None` when nothing usable remains.
pub fn sanitize_folder_name(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c => c,
        })
        .take(MAX_FOLDER_NAME_LEN)
        .collect();
    let cleaned = cleaned.trim().to_string();

    if cleaned.is_empty() || GENERIC_FOLDER_NAMES.contains(&cleaned.to_lowercase().as_str()) {
        return None;
    }
    Some(cleaned)
}

fn category_folder(
    rec: &mut Recommendation,
    category: Category,
    topics: &[String],
    suggested: Option<&str>,
    config: &TriageConfig,
) {
    let name = category.folder_name();

    if category.is_bulk() {
        if rec.score < config.auto_archive_threshold {
            rec.folder = format!("{}/{}", ARCHIVE_PREFIX, name);
            rec.auto_archive = true;
        } else {
            rec.folder = name.to_string();
        }
        return;
    }

    if category.wants_subfolder() {
        let sub = suggested
            .and_then(sanitize_folder_name)
            .or_else(|| topics.first().and_then(|t| sanitize_folder_name(&capitalize(t))));
        rec.folder = match sub {
            Some(sub) => format!("{}/{}", name, sub),
            None => name.to_string(),
        };
        return;
    }

    rec.folder = name.to_string();
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Recommend a folder, flag and task for a scored message.
///
/// `suggested` is an optional sub-folder name for personal and professional
/// mail; when absent the leading topic is used.
pub fn recommend(result: &ScoreResult, config: &TriageConfig, suggested: Option<&str>) -> Recommendation {
    let mut rec = Recommendation::general(result.final_score);
    apply_priority_rules(&mut rec, result, config);

    if rec.folder == FOLDER_GENERAL {
        category_folder(
            &mut rec,
            result.analysis.category,
            &result.analysis.topics,
            suggested,
            config,
        );
    }

    if result.analysis.has_action_items() {
        rec.create_task = true;
        if !rec.is_priority_folder() {
            if rec.auto_archive {
                rec.auto_archive = false;
                rec.folder = FOLDER_ACTION_REQUIRED.to_string();
            } else if LOW_SIGNAL_FOLDERS.contains(&rec.folder.as_str()) {
                rec.folder = FOLDER_ACTION_REQUIRED.to_string();
            }
        }
    }

    log::debug!(
        "Recommend {} -> {} (score {:.3}, flag={}, task={}, archive={})",
        result.metadata.id,
        rec.folder,
        rec.score,
        rec.flag,
        rec.create_task,
        rec.auto_archive
    );
    rec
}
