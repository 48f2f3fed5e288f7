//! Timeout and fallback around a content analysis provider.
//!
//! Every provider call is bounded by `content_timeout_secs`. Timeouts and
//! errors fall back to [`RuleBasedAnalyzer`] so a slow service never holds
//! up more than its own message.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::{Category, ContentAnalysis, ContentAnalyzer, RuleBasedAnalyzer};
use crate::config::TriageConfig;
use crate::error::{Result, TriageError};

/// Run `task`, failing with `ContentTimeout` after `secs` seconds.
pub async fn run_with_timeout<T, F>(secs: u64, task: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(Duration::from_secs(secs), task).await {
        Ok(result) => result,
        Err(_) => Err(TriageError::ContentTimeout(secs)),
    }
}

/// Which provider produced an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisSource {
    /// The content service answered in time.
    Service,
    /// No service configured or it is disabled.
    Rules,
    /// The service failed or timed out; rules were used instead.
    Fallback,
}

#[derive(Debug, Clone)]
pub struct GuardedAnalysis {
    pub analysis: ContentAnalysis,
    pub source: AnalysisSource,
}

#[derive(Clone)]
pub struct GuardedAnalyzer {
    service: Option<Arc<dyn ContentAnalyzer>>,
    rules: RuleBasedAnalyzer,
    timeout_secs: u64,
}

impl GuardedAnalyzer {
    /// The service is only used when `use_content_service` is on.
    pub fn new(service: Option<Arc<dyn ContentAnalyzer>>, config: &TriageConfig) -> Self {
        Self {
            service: service.filter(|_| config.use_content_service),
            rules: RuleBasedAnalyzer::new(config.topic_count),
            timeout_secs: config.content_timeout_secs,
        }
    }

    pub fn rules_only(config: &TriageConfig) -> Self {
        Self::new(None, config)
    }

    pub async fn analyze(&self, subject: &str, body: &str, sender: &str) -> GuardedAnalysis {
        let Some(service) = &self.service else {
            return GuardedAnalysis {
                analysis: self.rules.analyze_now(subject, body),
                source: AnalysisSource::Rules,
            };
        };

        match run_with_timeout(self.timeout_secs, service.analyze(subject, body, sender)).await {
            Ok(analysis) => GuardedAnalysis {
                analysis,
                source: AnalysisSource::Service,
            },
            Err(e) => {
                let level = if e.is_retryable() {
                    log::Level::Warn
                } else {
                    log::Level::Error
                };
                log::log!(
                    level,
                    "Content service '{}' failed for '{}': {}; using rules",
                    service.name(),
                    subject,
                    e
                );
                GuardedAnalysis {
                    analysis: self.rules.analyze_now(subject, body),
                    source: AnalysisSource::Fallback,
                }
            }
        }
    }

    /// Sub-folder suggestion from the service, else from the rules.
    pub async fn suggest_folder_name(
        &self,
        subject: &str,
        body: &str,
        category: Category,
    ) -> Option<String> {
        if let Some(service) = &self.service {
            let task = service.suggest_folder_name(subject, body, category);
            match run_with_timeout(self.timeout_secs, task).await {
                Ok(Some(name)) => return Some(name),
                Ok(None) => {}
                Err(e) => log::warn!("Folder suggestion failed for '{}': {}", subject, e),
            }
        }
        self.rules.folder_name_now(subject, body)
    }
}
