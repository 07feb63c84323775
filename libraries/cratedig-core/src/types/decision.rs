/// Decisions returned by a decision source
use serde::{Deserialize, Serialize};

/// Answer to "which candidate should this task use?"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchDecision {
    /// Apply the top-ranked candidate
    ApplyBest,

    /// Apply the candidate at this rank (0-based)
    ApplyCandidate(usize),

    /// Keep the existing tags
    UseAsIs,

    /// Split an album task into one singleton task per track
    AsSingletons,

    /// Search again with a user-supplied query
    ManualSearch(ManualQuery),

    /// Leave the group out of this run
    Skip,

    /// Stop the whole import
    Abort,
}

/// User-supplied search query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualQuery {
    /// Free-text artist and album (or title, in singleton mode)
    Terms { artist: String, title: String },

    /// Candidate id to look up directly
    Id(String),
}

/// Answer to "an entry with this identity already exists"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateDecision {
    /// Drop the incoming group
    SkipNew,

    /// Import alongside the existing entry
    KeepBoth,

    /// Delete the existing entry and its files, then import
    RemoveOld,

    /// Re-match the union of old and new tracks as one group
    Merge,
}
