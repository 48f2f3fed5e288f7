//! Scoring and recommendation.
//!
//! [`scoring`] fuses sender importance, content category, recency and
//! urgency, message state and recipient position into one score per
//! message. [`recommend`] turns that score into a folder, flag and task.

pub mod recency;
pub mod recommend;
pub mod scoring;

pub use recommend::{recommend, sanitize_folder_name, wants_folder_suggestion, Recommendation};
pub use scoring::{
    score_message, MessageMetadata, ReadingPatterns, ScoreComponents, ScoreResult, ScoringInputs,
};
