//! Mailbox triage core.
//!
//! Learns which senders matter from the user's own reply, initiation and
//! reading habits, tracks how long each message has been ignored, and
//! scores every inbox message into a folder, flag and task recommendation.
//!
//! A typical run:
//!
//! ```no_run
//! # async fn run(messages: Vec<inbox_triage::MailMessage>, history: inbox_triage::MailHistory) -> inbox_triage::Result<()> {
//! use std::sync::Arc;
//! use inbox_triage::{content::GuardedAnalyzer, scan, Workspace};
//!
//! inbox_triage::init_logging();
//! let now = chrono::Local::now().naive_local();
//! let ws = Arc::new(Workspace::open_default()?);
//!
//! scan::scan_inbox(&ws, &messages, now);
//! scan::rebuild_importance(&ws, &history);
//! let analyzer = GuardedAnalyzer::rules_only(&ws.config);
//! let report = scan::triage(ws, analyzer, messages, None, now).await;
//! # let _ = report;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod contacts;
pub mod content;
mod error;
pub mod parallel;
pub mod scan;
pub mod signals;
pub mod state;
pub mod tracking;
pub mod types;
pub mod util;

pub use config::{load_config, ScoringWeights, TriageConfig};
pub use error::{Result, TriageError};
pub use scan::{rebuild_importance, scan_inbox, triage, ScanSummary, TriageReport, TriageStats};
pub use state::Workspace;
pub use types::{FlagStatus, Importance, MailHistory, MailMessage, Recipient, RecipientRole, SentMessage};

/// Install an `env_logger` honoring `RUST_LOG`, defaulting to `info`.
/// Later calls are no-ops.
pub fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("info");
    if env_logger::Builder::from_env(env).try_init().is_err() {
        log::debug!("Logger already installed");
    }
}
