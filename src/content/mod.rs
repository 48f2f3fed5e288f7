//! Content analysis contract.
//!
//! The engine consumes topics, action items, urgency and category for each
//! message. Any provider implementing [`ContentAnalyzer`] can supply them;
//! [`RuleBasedAnalyzer`] is the deterministic fallback and
//! [`GuardedAnalyzer`] bounds a remote provider with a timeout.

pub mod guard;
pub mod rules;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use guard::{AnalysisSource, GuardedAnalysis, GuardedAnalyzer};
pub use rules::RuleBasedAnalyzer;

/// Urgency level reported by content analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Urgency {
    pub fn score(self) -> f64 {
        match self {
            Urgency::Urgent => 0.95,
            Urgency::High => 0.9,
            Urgency::Medium => 0.6,
            Urgency::Low => 0.3,
        }
    }

    /// Lenient parse; unknown labels are `Medium`.
    pub fn from_label(label: &str) -> Urgency {
        match label.trim().to_lowercase().as_str() {
            "urgent" | "critical" => Urgency::Urgent,
            "high" => Urgency::High,
            "low" => Urgency::Low,
            _ => Urgency::Medium,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Personal,
    Professional,
    Transactional,
    #[default]
    General,
    Newsletter,
    Promotional,
    Spam,
}

impl Category {
    /// Priority used as the topic component of the final score.
    pub fn priority(self) -> f64 {
        match self {
            Category::Personal => 0.8,
            Category::Professional => 0.7,
            Category::Transactional => 0.6,
            Category::General | Category::Spam => 0.5,
            Category::Newsletter => 0.3,
            Category::Promotional => 0.2,
        }
    }

    /// Folder name for this category ("Promotional", "Spam", ...).
    pub fn folder_name(self) -> &'static str {
        match self {
            Category::Personal => "Personal",
            Category::Professional => "Professional",
            Category::Transactional => "Transactional",
            Category::General => "General",
            Category::Newsletter => "Newsletter",
            Category::Promotional => "Promotional",
            Category::Spam => "Spam",
        }
    }

    /// Bulk mail that may be archived when it scores low.
    pub fn is_bulk(self) -> bool {
        matches!(self, Category::Newsletter | Category::Promotional)
    }

    /// Categories that get a topic sub-folder.
    pub fn wants_subfolder(self) -> bool {
        matches!(self, Category::Personal | Category::Professional)
    }

    /// Lenient parse; unknown labels are `General`.
    pub fn from_label(label: &str) -> Category {
        match label.trim().to_lowercase().as_str() {
            "personal" => Category::Personal,
            "professional" | "work" => Category::Professional,
            "transactional" => Category::Transactional,
            "newsletter" => Category::Newsletter,
            "promotional" | "promotion" | "marketing" => Category::Promotional,
            "spam" => Category::Spam,
            _ => Category::General,
        }
    }
}

/// Result of analyzing one message's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentAnalysis {
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub action_items: Vec<String>,
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default = "default_sentiment")]
    pub sentiment: String,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub category: Category,
}

fn default_sentiment() -> String {
    "neutral".to_string()
}

impl Default for ContentAnalysis {
    fn default() -> Self {
        Self {
            topics: Vec::new(),
            action_items: Vec::new(),
            urgency: Urgency::Medium,
            sentiment: default_sentiment(),
            entities: Vec::new(),
            category: Category::General,
        }
    }
}

impl ContentAnalysis {
    pub fn has_action_items(&self) -> bool {
        !self.action_items.is_empty()
    }
}

/// A provider of content analysis.
#[async_trait]
pub trait ContentAnalyzer: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    async fn analyze(&self, subject: &str, body: &str, sender: &str) -> Result<ContentAnalysis>;

    /// A short sub-folder name for a personal or professional message.
    /// `Ok(None)` when the provider has nothing useful.
    async fn suggest_folder_name(
        &self,
        subject: &str,
        body: &str,
        category: Category,
    ) -> Result<Option<String>>;
}
