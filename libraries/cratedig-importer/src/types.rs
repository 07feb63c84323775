//! Common types for the importer

use cratedig_core::{ApplyStep, EntryId, GroupKey, Outcome};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Final record of one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskReport {
    /// Group key
    pub key: GroupKey,

    /// Outcome recorded in the journal
    pub outcome: Outcome,

    /// Number of local tracks
    pub tracks: usize,

    /// Similarity of the applied match (none for as-is imports)
    pub similarity: Option<f64>,

    /// Apply sub-steps that completed
    pub completed_steps: Vec<ApplyStep>,

    /// Catalog rows written
    pub entries: Vec<EntryId>,

    /// Final file locations
    pub paths: Vec<PathBuf>,

    /// Error message for failed groups
    pub error: Option<String>,
}

impl TaskReport {
    pub fn new(key: GroupKey, outcome: Outcome, tracks: usize) -> Self {
        Self {
            key,
            outcome,
            tracks,
            similarity: None,
            completed_steps: Vec::new(),
            entries: Vec::new(),
            paths: Vec::new(),
            error: None,
        }
    }

    /// Combine the reports of a split group's children
    ///
    /// Any failure makes the group failed, then any abort makes it aborted.
    /// All children skipped makes it skipped; otherwise it is done.
    pub fn aggregate(key: GroupKey, children: Vec<TaskReport>) -> Self {
        let has = |outcome: Outcome| children.iter().any(|c| c.outcome == outcome);
        let outcome = if has(Outcome::Failed) {
            Outcome::Failed
        } else if has(Outcome::Aborted) {
            Outcome::Aborted
        } else if !children.is_empty() && children.iter().all(|c| c.outcome == Outcome::Skipped) {
            Outcome::Skipped
        } else {
            Outcome::Done
        };

        let errors: Vec<String> = children
            .iter()
            .filter_map(|c| c.error.as_ref().map(|e| format!("{}: {e}", c.key)))
            .collect();

        let mut report = TaskReport::new(key, outcome, children.iter().map(|c| c.tracks).sum());
        report.error = (!errors.is_empty()).then(|| errors.join("; "));
        for child in children {
            report.entries.extend(child.entries);
            report.paths.extend(child.paths);
        }
        report
    }
}

/// Progress update during import
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProgress {
    /// Groups finished so far
    pub processed: usize,
    pub done: usize,
    pub skipped: usize,
    pub aborted: usize,
    pub failed: usize,

    /// Group that finished last
    pub current: Option<GroupKey>,
}

impl ImportProgress {
    pub fn record(&mut self, report: &TaskReport) {
        self.processed += 1;
        match report.outcome {
            Outcome::Done => self.done += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Aborted => self.aborted += 1,
            Outcome::Failed => self.failed += 1,
        }
        self.current = Some(report.key.clone());
    }
}

/// Summary of an import run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    /// One report per group, in scan order
    pub reports: Vec<TaskReport>,

    /// The run was stopped by an abort
    pub aborted: bool,

    /// Duration of import operation
    pub duration_seconds: u64,
}

impl ImportSummary {
    pub fn count(&self, outcome: Outcome) -> usize {
        self.reports.iter().filter(|r| r.outcome == outcome).count()
    }

    /// No group ended aborted or failed
    pub fn is_clean(&self) -> bool {
        self.count(Outcome::Aborted) == 0 && self.count(Outcome::Failed) == 0
    }

    /// 0 on clean completion, 1 when aborted or failed groups remain
    pub fn exit_code(&self) -> i32 {
        if self.is_clean() {
            0
        } else {
            1
        }
    }

    pub fn summary_text(&self) -> String {
        format!(
            "Import complete: {} done, {} skipped, {} aborted, {} failed",
            self.count(Outcome::Done),
            self.count(Outcome::Skipped),
            self.count(Outcome::Aborted),
            self.count(Outcome::Failed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(key: &str, outcome: Outcome) -> TaskReport {
        TaskReport::new(GroupKey::new(key), outcome, 1)
    }

    #[test]
    fn aggregate_prefers_failure_then_abort() {
        let parent = GroupKey::new("/a");
        let mut failed = report("/a#2", Outcome::Failed);
        failed.error = Some("disk full".to_string());

        let agg = TaskReport::aggregate(
            parent.clone(),
            vec![report("/a#1", Outcome::Done), failed, report("/a#3", Outcome::Aborted)],
        );
        assert_eq!(agg.outcome, Outcome::Failed);
        assert_eq!(agg.tracks, 3);
        assert!(agg.error.unwrap().contains("/a#2: disk full"));

        let agg = TaskReport::aggregate(
            parent.clone(),
            vec![report("/a#1", Outcome::Done), report("/a#2", Outcome::Aborted)],
        );
        assert_eq!(agg.outcome, Outcome::Aborted);

        let agg = TaskReport::aggregate(
            parent.clone(),
            vec![report("/a#1", Outcome::Skipped), report("/a#2", Outcome::Skipped)],
        );
        assert_eq!(agg.outcome, Outcome::Skipped);

        let agg = TaskReport::aggregate(
            parent,
            vec![report("/a#1", Outcome::Skipped), report("/a#2", Outcome::Done)],
        );
        assert_eq!(agg.outcome, Outcome::Done);
    }

    #[test]
    fn exit_code_reflects_unfinished_groups() {
        let mut summary = ImportSummary::default();
        summary.reports.push(report("/a", Outcome::Done));
        summary.reports.push(report("/b", Outcome::Skipped));
        assert_eq!(summary.exit_code(), 0);

        summary.reports.push(report("/c", Outcome::Failed));
        assert_eq!(summary.exit_code(), 1);
        assert_eq!(summary.count(Outcome::Failed), 1);
    }

    #[test]
    fn progress_counts_outcomes() {
        let mut progress = ImportProgress::default();
        progress.record(&report("/a", Outcome::Done));
        progress.record(&report("/b", Outcome::Aborted));
        assert_eq!(progress.processed, 2);
        assert_eq!(progress.aborted, 1);
        assert_eq!(progress.current, Some(GroupKey::new("/b")));
    }
}
