//! Non-interactive decision source

use crate::config::{ImportConfig, QuietFallback};
use async_trait::async_trait;
use cratedig_core::{CatalogEntry, DecisionSource, DuplicateDecision, ImportTask, Match, MatchDecision};
use tracing::{info, warn};

/// Answers every question from configuration
///
/// Only strong matches are applied without asking, so anything that reaches
/// this decider falls back to the configured answer.
#[derive(Debug, Clone, Copy)]
pub struct QuietDecider {
    fallback: QuietFallback,
    duplicates: DuplicateDecision,
}

impl QuietDecider {
    pub fn new(fallback: QuietFallback, duplicates: DuplicateDecision) -> Self {
        Self {
            fallback,
            duplicates,
        }
    }

    pub fn from_config(config: &ImportConfig) -> Self {
        Self::new(config.quiet_fallback, config.duplicate_action)
    }
}

impl Default for QuietDecider {
    fn default() -> Self {
        Self::new(QuietFallback::Skip, DuplicateDecision::SkipNew)
    }
}

#[async_trait]
impl DecisionSource for QuietDecider {
    async fn choose_match(&self, task: &ImportTask, ranked: &[Match]) -> MatchDecision {
        let decision = match self.fallback {
            QuietFallback::Skip => MatchDecision::Skip,
            QuietFallback::AsIs => MatchDecision::UseAsIs,
        };
        info!(
            key = %task.key,
            candidates = ranked.len(),
            best = ranked.first().map(|m| m.similarity()),
            ?decision,
            "No confident match"
        );
        decision
    }

    async fn resolve_duplicate(
        &self,
        task: &ImportTask,
        existing: &[CatalogEntry],
    ) -> DuplicateDecision {
        info!(
            key = %task.key,
            existing = existing.len(),
            decision = ?self.duplicates,
            "Duplicate in catalog"
        );
        self.duplicates
    }

    async fn task_failed(&self, task: &ImportTask, error: &(dyn std::error::Error + Send + Sync)) {
        warn!(key = %task.key, error = %error, "Import failed");
    }
}
