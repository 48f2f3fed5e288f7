//! Triage configuration.
//!
//! A flat JSON object of weights, thresholds, bonuses and penalties.
//! Loading never fails: each known key is validated on its own and falls
//! back to its default when the value has the wrong type.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, TriageError};

/// Name of the data directory under the user's home.
const DATA_DIR_NAME: &str = ".inbox-triage";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    // Component weights
    pub sender_weight: f64,
    pub topic_weight: f64,
    pub temporal_weight: f64,
    pub message_state_weight: f64,
    pub recipient_weight: f64,

    // Thresholds
    pub high_priority_threshold: f64,
    pub medium_priority_threshold: f64,
    pub auto_archive_threshold: f64,

    // Message state
    pub unread_penalty: f64,
    pub ignore_penalty: f64,
    pub read_kept_bonus: f64,
    pub flagged_bonus: f64,
    pub due_today_bonus: f64,
    pub due_soon_bonus: f64,
    pub high_importance_bonus: f64,

    // Recipients
    pub to_me_bonus: f64,
    pub direct_to_me_bonus: f64,
    pub many_recipients_penalty: f64,
    pub cc_me_penalty: f64,

    // Temporal
    pub off_hours_bonus: f64,

    // Importance model
    pub reply_time_weight: f64,
    pub reply_rate_weight: f64,
    pub reply_length_weight: f64,
    pub reply_pattern_score_factor: f64,
    pub initiation_score_factor: f64,
    pub read_kept_score_factor: f64,
    pub min_emails_for_pattern: u32,
    pub max_analysis_emails: usize,

    // Content analysis
    pub use_content_service: bool,
    pub content_timeout_secs: u64,
    pub topic_count: usize,

    // Runtime
    pub worker_count: usize,
    pub user_addresses: Vec<String>,
    pub inbox_folder: String,
    pub deleted_folder: String,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            sender_weight: 0.4,
            topic_weight: 0.25,
            temporal_weight: 0.15,
            message_state_weight: 0.1,
            recipient_weight: 0.1,

            high_priority_threshold: 0.8,
            medium_priority_threshold: 0.5,
            auto_archive_threshold: 0.3,

            unread_penalty: 0.2,
            ignore_penalty: 0.15,
            read_kept_bonus: 0.3,
            flagged_bonus: 0.15,
            due_today_bonus: 0.25,
            due_soon_bonus: 0.15,
            high_importance_bonus: 0.2,

            to_me_bonus: 0.15,
            direct_to_me_bonus: 0.1,
            many_recipients_penalty: 0.1,
            cc_me_penalty: 0.05,

            off_hours_bonus: 0.05,

            reply_time_weight: 0.4,
            reply_rate_weight: 0.4,
            reply_length_weight: 0.2,
            reply_pattern_score_factor: 1.0,
            initiation_score_factor: 0.5,
            read_kept_score_factor: 0.3,
            min_emails_for_pattern: 1,
            max_analysis_emails: 5000,

            use_content_service: true,
            content_timeout_secs: 30,
            topic_count: 3,

            worker_count: 4,
            user_addresses: Vec::new(),
            inbox_folder: "Inbox".to_string(),
            deleted_folder: "Deleted Items".to_string(),
        }
    }
}

/// The five component weights of the final score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    pub sender: f64,
    pub topic: f64,
    pub temporal: f64,
    pub message_state: f64,
    pub recipient: f64,
}

impl ScoringWeights {
    fn total(&self) -> f64 {
        self.sender + self.topic + self.temporal + self.message_state + self.recipient
    }

    /// Rescale so the weights sum to 1. Negative weights count as zero; a
    /// non-positive total falls back to the default weights.
    pub fn normalized(&self) -> ScoringWeights {
        let clamped = ScoringWeights {
            sender: self.sender.max(0.0),
            topic: self.topic.max(0.0),
            temporal: self.temporal.max(0.0),
            message_state: self.message_state.max(0.0),
            recipient: self.recipient.max(0.0),
        };
        let total = clamped.total();
        if !total.is_finite() || total <= 0.0 {
            log::warn!("Scoring weights sum to {}; using defaults", total);
            return TriageConfig::default().weights();
        }
        ScoringWeights {
            sender: clamped.sender / total,
            topic: clamped.topic / total,
            temporal: clamped.temporal / total,
            message_state: clamped.message_state / total,
            recipient: clamped.recipient / total,
        }
    }
}

impl TriageConfig {
    /// Raw (un-normalized) component weights.
    pub fn weights(&self) -> ScoringWeights {
        ScoringWeights {
            sender: self.sender_weight,
            topic: self.topic_weight,
            temporal: self.temporal_weight,
            message_state: self.message_state_weight,
            recipient: self.recipient_weight,
        }
    }

    /// Whether `address` is one of the mailbox owner's addresses.
    pub fn is_user_address(&self, address: &str) -> bool {
        let needle = crate::util::extract_email_address(address);
        self.user_addresses
            .iter()
            .any(|a| crate::util::extract_email_address(a) == needle)
    }

    /// Parse a config document, coercing each known key independently.
    ///
    /// Unknown keys are ignored. Fails with `Configuration` when the
    /// document is not JSON or its root is not an object.
    pub fn parse_json_str(content: &str) -> Result<TriageConfig> {
        let parsed: Value = serde_json::from_str(content)
            .map_err(|e| TriageError::Configuration(format!("invalid JSON: {}", e)))?;
        match parsed {
            Value::Object(map) => Ok(Self::from_map(map)),
            other => Err(TriageError::Configuration(format!(
                "root must be an object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Lenient form of [`TriageConfig::parse_json_str`]: a document that
    /// cannot be used at all yields defaults.
    pub fn from_json_str(content: &str) -> TriageConfig {
        Self::parse_json_str(content).unwrap_or_else(|e| {
            log::warn!("{}. {}", e, e.recovery_suggestion());
            TriageConfig::default()
        })
    }

    fn from_map(input: Map<String, Value>) -> TriageConfig {
        let defaults = TriageConfig::default();
        let mut accepted = match serde_json::to_value(&defaults) {
            Ok(Value::Object(map)) => map,
            _ => return defaults,
        };

        for (key, value) in input {
            if !accepted.contains_key(&key) {
                log::debug!("Ignoring unknown config key '{}'", key);
                continue;
            }
            let mut candidate = accepted.clone();
            candidate.insert(key.clone(), value.clone());
            if serde_json::from_value::<TriageConfig>(Value::Object(candidate)).is_ok() {
                accepted.insert(key, value);
            } else {
                log::warn!(
                    "Config key '{}' has invalid {} value; using default",
                    key,
                    json_type_name(&value)
                );
            }
        }

        serde_json::from_value(Value::Object(accepted)).unwrap_or(defaults)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Default data directory: `~/.inbox-triage/`.
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DATA_DIR_NAME))
}

/// Load configuration from `path`. Missing or unreadable files yield defaults.
pub fn load_config(path: &Path) -> TriageConfig {
    if !path.exists() {
        log::info!("No config at {}, using defaults", path.display());
        return TriageConfig::default();
    }
    match std::fs::read_to_string(path) {
        Ok(content) => TriageConfig::from_json_str(&content),
        Err(e) => {
            log::warn!("Failed to read config {}: {}", path.display(), e);
            TriageConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_sum_to_one() {
        let w = TriageConfig::default().weights();
        assert!((w.total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_bad_type_falls_back_per_key() {
        let cfg = TriageConfig::from_json_str(
            r#"{"unread_penalty": "lots", "ignore_penalty": 0.25, "worker_count": 8}"#,
        );
        assert!((cfg.unread_penalty - 0.2).abs() < 1e-9);
        assert!((cfg.ignore_penalty - 0.25).abs() < 1e-9);
        assert_eq!(cfg.worker_count, 8);
    }

    #[test]
    fn test_unknown_keys_ignored_and_ints_accepted() {
        let cfg = TriageConfig::from_json_str(r#"{"bogus": true, "high_priority_threshold": 1}"#);
        assert!((cfg.high_priority_threshold - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_object_and_garbage_yield_defaults() {
        assert_eq!(TriageConfig::from_json_str("[1, 2]"), TriageConfig::default());
        assert_eq!(TriageConfig::from_json_str("{not json"), TriageConfig::default());
    }

    #[test]
    fn test_malformed_document_is_a_configuration_error() {
        for content in ["{not json", "[1, 2]", "\"text\""] {
            let err = TriageConfig::parse_json_str(content).unwrap_err();
            assert!(matches!(err, TriageError::Configuration(_)), "{content}");
        }
        let cfg = TriageConfig::parse_json_str(r#"{"worker_count": 2}"#).unwrap();
        assert_eq!(cfg.worker_count, 2);
    }

    #[test]
    fn test_load_config_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{\"worker_count\": ").unwrap();
        assert_eq!(load_config(&path), TriageConfig::default());
    }

    #[test]
    fn test_normalized_weights() {
        let w = ScoringWeights {
            sender: 2.0,
            topic: 1.0,
            temporal: 1.0,
            message_state: 0.0,
            recipient: 0.0,
        }
        .normalized();
        assert!((w.sender - 0.5).abs() < 1e-9);
        assert!((w.total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_weights_fall_back() {
        let w = ScoringWeights {
            sender: 0.0,
            topic: 0.0,
            temporal: 0.0,
            message_state: 0.0,
            recipient: -1.0,
        }
        .normalized();
        assert_eq!(w, TriageConfig::default().weights());
    }

    #[test]
    fn test_load_config_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(&dir.path().join("config.json"));
        assert_eq!(cfg, TriageConfig::default());
    }

    #[test]
    fn test_user_address_match() {
        let cfg = TriageConfig {
            user_addresses: vec!["Me@Corp.com".to_string()],
            ..Default::default()
        };
        assert!(cfg.is_user_address("Me <me@corp.com>"));
        assert!(!cfg.is_user_address("you@corp.com"));
    }
}
