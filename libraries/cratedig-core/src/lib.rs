//! Crate Digger Core
//!
//! Domain types, collaborator traits, and error handling for the Crate Digger
//! import pipeline.
//!
//! # Architecture
//!
//! The core crate defines:
//! - **Domain Types**: `TrackRecord`, `ImportTask`, `Candidate`, `Match`, `Distance`, etc.
//! - **Collaborator Traits**: `TagCodec`, `MetadataSource`, `CatalogStore`,
//!   `DecisionSource`, `PathFormatter`, `ImportObserver`
//! - **Error Handling**: Unified `DigError` and `Result` types
//!
//! # Example
//!
//! ```rust
//! use cratedig_core::types::{GroupKey, ImportTask, TaskState, TrackRecord};
//!
//! let mut task = ImportTask::album(
//!     GroupKey::new("/music/Album"),
//!     vec![TrackRecord::new("/music/Album/01.flac")],
//! );
//! task.transition(TaskState::Grouped).unwrap();
//! assert!(task.transition(TaskState::Done).is_err());
//! ```

#![forbid(unsafe_code)]

pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use error::{DigError, Result};
pub use traits::{
    CatalogStore, CatalogTransaction, DecisionSource, ImportObserver, MetadataSource,
    PathFormatter, TagCodec,
};

pub use types::{
    normalize_text, AlbumCandidate, Alignment, ApplyStep, Candidate, CandidateTrack,
    CatalogEntry, Chosen, Distance, DistanceComponent, DistanceField, DuplicateDecision, EntryId,
    GroupKey, Identity, ImportEvent, ImportTask, ManualQuery, Match, MatchDecision, NewAlbum,
    Outcome, ResumeEntry, SplitOrigin, TagFields, TaskState, TrackCandidate, TrackRecord,
};
