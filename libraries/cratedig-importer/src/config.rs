//! Import configuration

use crate::{ImportError, Result};
use cratedig_core::DuplicateDecision;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// File management strategy for imports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FileManagementStrategy {
    /// Move files into the library (copy, verify, delete sources after commit)
    Move,

    /// Copy files into the library (preserves originals)
    #[default]
    Copy,

    /// Reference files in their current location
    Reference,
}

/// What the non-interactive decider does with a task that was not auto-accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuietFallback {
    #[default]
    Skip,
    AsIs,
}

/// Configuration for import operations
///
/// Built once and shared by every pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImportConfig {
    /// Root of the organized library
    pub library_path: PathBuf,

    /// File management strategy
    pub file_strategy: FileManagementStrategy,

    /// Write resolved tags into the files
    pub write_tags: bool,

    /// Import every file as a singleton instead of grouping albums
    pub singletons: bool,

    /// Skip groups the resume journal marks as done or skipped
    pub resume: bool,

    /// Process journaled groups again even when resuming
    pub force_reprocess: bool,

    /// Location of the resume journal
    pub journal_path: PathBuf,

    /// Destination template, or a preset name (`audiophile`, `simple`, `label`)
    pub path_template: String,

    /// Capacity of each hand-off queue between stages
    pub queue_capacity: usize,

    /// Upper bound for one metadata source call
    pub search_timeout_secs: u64,

    /// Hash-compare every copied file with its source
    pub verify_transfers: bool,

    /// Non-interactive answer for tasks that need a decision
    pub quiet_fallback: QuietFallback,

    /// Non-interactive answer for duplicates
    pub duplicate_action: DuplicateDecision,

    /// Scoring and recommendation settings
    pub matching: MatchConfig,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            library_path: PathBuf::from("library"),
            file_strategy: FileManagementStrategy::Copy,
            write_tags: true,
            singletons: false,
            resume: true,
            force_reprocess: false,
            journal_path: PathBuf::from("cratedig-journal.jsonl"),
            path_template: crate::path_template::DEFAULT_TEMPLATE.to_string(),
            queue_capacity: 2,
            search_timeout_secs: 30,
            verify_transfers: true,
            quiet_fallback: QuietFallback::Skip,
            duplicate_action: DuplicateDecision::SkipNew,
            matching: MatchConfig::default(),
        }
    }
}

impl ImportConfig {
    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(ImportError::Config("queueCapacity must be at least 1".to_string()));
        }
        if self.search_timeout_secs == 0 {
            return Err(ImportError::Config(
                "searchTimeoutSecs must be at least 1".to_string(),
            ));
        }
        if self.path_template.trim().is_empty() {
            return Err(ImportError::Config("pathTemplate is empty".to_string()));
        }
        if self.file_strategy != FileManagementStrategy::Reference
            && self.library_path.as_os_str().is_empty()
        {
            return Err(ImportError::Config(
                "libraryPath is required unless files are referenced in place".to_string(),
            ));
        }
        self.matching.validate()
    }
}

/// Scoring and auto-accept settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchConfig {
    /// Minimum similarity for auto-accept
    pub auto_accept_threshold: f64,

    /// Top two candidates from different sources closer than this need a decision
    pub disagreement_margin: f64,

    /// A best match with missing tracks is never auto-accepted
    pub missing_tracks_block_auto: bool,

    /// A best match leaving local tracks unmatched (partial) is never auto-accepted
    pub unmatched_tracks_block_auto: bool,

    pub weights: DistanceWeights,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            auto_accept_threshold: 0.96,
            disagreement_margin: 0.02,
            missing_tracks_block_auto: true,
            unmatched_tracks_block_auto: true,
            weights: DistanceWeights::default(),
        }
    }
}

impl MatchConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.auto_accept_threshold) {
            return Err(ImportError::Config(format!(
                "autoAcceptThreshold must be within [0, 1], got {}",
                self.auto_accept_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.disagreement_margin) {
            return Err(ImportError::Config(format!(
                "disagreementMargin must be within [0, 1], got {}",
                self.disagreement_margin
            )));
        }
        self.weights.validate()
    }
}

/// Weights of every distance component
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DistanceWeights {
    // Album fields
    pub artist: f64,
    pub album: f64,
    pub year: f64,
    pub mediums: f64,
    pub label: f64,
    pub catalog_number: f64,
    pub album_id: f64,

    /// Multiplier of a matched pair's track distance
    pub tracks: f64,

    /// Cost of a candidate track absent locally
    pub missing_track: f64,

    /// Cost of a local track without a counterpart
    pub unmatched_track: f64,

    // Track fields
    pub track_title: f64,
    pub track_artist: f64,
    pub track_index: f64,
    pub track_length: f64,
    pub track_id: f64,

    /// Length difference tolerated without penalty
    pub track_length_grace_secs: f64,

    /// Length difference at which the length penalty is full
    pub track_length_max_secs: f64,

    /// Year difference at which the year penalty is full
    pub year_span: f64,

    /// Track number difference at which the index penalty is full
    pub track_index_span: f64,
}

impl Default for DistanceWeights {
    fn default() -> Self {
        Self {
            artist: 3.0,
            album: 3.0,
            year: 1.0,
            mediums: 1.0,
            label: 0.5,
            catalog_number: 0.5,
            album_id: 5.0,
            tracks: 1.0,
            missing_track: 0.9,
            unmatched_track: 0.6,
            track_title: 3.0,
            track_artist: 2.0,
            track_index: 1.0,
            track_length: 2.0,
            track_id: 5.0,
            track_length_grace_secs: 10.0,
            track_length_max_secs: 30.0,
            year_span: 10.0,
            track_index_span: 1.0,
        }
    }
}

impl DistanceWeights {
    pub fn validate(&self) -> Result<()> {
        let named = [
            ("artist", self.artist),
            ("album", self.album),
            ("year", self.year),
            ("mediums", self.mediums),
            ("label", self.label),
            ("catalogNumber", self.catalog_number),
            ("albumId", self.album_id),
            ("tracks", self.tracks),
            ("missingTrack", self.missing_track),
            ("unmatchedTrack", self.unmatched_track),
            ("trackTitle", self.track_title),
            ("trackArtist", self.track_artist),
            ("trackIndex", self.track_index),
            ("trackLength", self.track_length),
            ("trackId", self.track_id),
            ("trackLengthGraceSecs", self.track_length_grace_secs),
        ];
        for (name, value) in named {
            if !value.is_finite() || value < 0.0 {
                return Err(ImportError::Config(format!(
                    "weights.{name} must be a non-negative number, got {value}"
                )));
            }
        }
        if self.track_length_max_secs <= self.track_length_grace_secs {
            return Err(ImportError::Config(
                "weights.trackLengthMaxSecs must exceed trackLengthGraceSecs".to_string(),
            ));
        }
        if self.year_span <= 0.0 || self.track_index_span <= 0.0 {
            return Err(ImportError::Config(
                "weights.yearSpan and weights.trackIndexSpan must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
