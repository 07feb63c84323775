mod candidate;
mod catalog;
mod decision;
mod distance;
mod event;
mod journal;
mod matching;
mod task;
mod track;

pub use candidate::{AlbumCandidate, Candidate, CandidateTrack, TrackCandidate};
pub use catalog::{normalize_text, CatalogEntry, EntryId, Identity, NewAlbum};
pub use decision::{DuplicateDecision, ManualQuery, MatchDecision};
pub use distance::{Distance, DistanceComponent, DistanceField};
pub use event::ImportEvent;
pub use journal::{ApplyStep, Outcome, ResumeEntry};
pub use matching::{Alignment, Chosen, Match};
pub use task::{GroupKey, ImportTask, SplitOrigin, TaskState};
pub use track::{TagFields, TrackRecord};
