//! Contact identity and importance.

pub mod importance;
pub mod resolver;

pub use importance::{
    ConversationIndex, ImportanceContext, ImportanceSnapshot, ReplyObservation, SenderImportance,
};
pub use resolver::{score_candidate, AliasBuildStats, AliasEntry, AliasMap, AliasSource};
