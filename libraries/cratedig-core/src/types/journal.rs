/// Resume journal records
use crate::types::GroupKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Final outcome of a group in one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Done,
    Skipped,
    Aborted,
    Failed,
}

impl Outcome {
    /// Outcomes that let a resumed run leave the group alone
    pub fn is_settled(self) -> bool {
        matches!(self, Outcome::Done | Outcome::Skipped)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Done => "done",
            Outcome::Skipped => "skipped",
            Outcome::Aborted => "aborted",
            Outcome::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Ordered sub-steps of the apply stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyStep {
    TransferFiles,
    WriteTags,
    CatalogCommit,
    RemoveSources,
}

impl fmt::Display for ApplyStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApplyStep::TransferFiles => "transfer_files",
            ApplyStep::WriteTags => "write_tags",
            ApplyStep::CatalogCommit => "catalog_commit",
            ApplyStep::RemoveSources => "remove_sources",
        };
        f.write_str(s)
    }
}

/// One line of the resume journal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeEntry {
    pub key: GroupKey,
    pub outcome: Outcome,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub completed_steps: Vec<ApplyStep>,
}

impl ResumeEntry {
    /// Entry stamped with the current time
    pub fn now(key: GroupKey, outcome: Outcome, completed_steps: Vec<ApplyStep>) -> Self {
        Self {
            key,
            outcome,
            timestamp: Utc::now(),
            completed_steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_serializes_as_one_json_object() {
        let entry = ResumeEntry::now(
            GroupKey::new("/music/Album"),
            Outcome::Failed,
            vec![ApplyStep::WriteTags],
        );
        let line = serde_json::to_string(&entry).unwrap();
        assert!(line.contains("\"outcome\":\"failed\""));
        assert!(line.contains("\"completedSteps\":[\"write_tags\"]"));
        assert!(!line.contains('\n'));

        let back: ResumeEntry = serde_json::from_str(&line).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn only_done_and_skipped_are_settled() {
        assert!(Outcome::Done.is_settled());
        assert!(Outcome::Skipped.is_settled());
        assert!(!Outcome::Aborted.is_settled());
        assert!(!Outcome::Failed.is_settled());
    }
}
