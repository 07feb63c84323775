/// Collaborator traits for the import pipeline
use crate::error::Result;
use crate::types::{
    AlbumCandidate, CatalogEntry, DuplicateDecision, EntryId, Identity, ImportEvent, ImportTask,
    Match, MatchDecision, NewAlbum, TagFields, TrackCandidate, TrackRecord,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Tag codec trait
///
/// Implementers read and write embedded tags of audio files.
pub trait TagCodec: Send + Sync {
    /// Read tags from a file into a snapshot
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    fn read(&self, path: &Path) -> Result<TrackRecord>;

    /// Write tags to a file
    ///
    /// Only fields that are `Some` are written.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written
    fn write(&self, path: &Path, fields: &TagFields) -> Result<()>;
}

/// Metadata source trait
///
/// A backend that proposes canonical metadata for local files. Not-found is
/// expressed as an empty list or `None`, never as an error.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Name used in logs and stamped on candidates
    fn name(&self) -> &str;

    /// Album proposals for a group of tracks
    async fn candidates(
        &self,
        tracks: &[TrackRecord],
        artist_hint: Option<&str>,
        album_hint: Option<&str>,
        va_likely: bool,
    ) -> Result<Vec<AlbumCandidate>>;

    /// Track proposals for a single file
    async fn item_candidates(
        &self,
        track: &TrackRecord,
        artist_hint: Option<&str>,
        title_hint: Option<&str>,
    ) -> Result<Vec<TrackCandidate>>;

    /// Look up an album by its source id
    async fn album_for_id(&self, id: &str) -> Result<Option<AlbumCandidate>>;

    /// Look up a track by its source id
    async fn track_for_id(&self, id: &str) -> Result<Option<TrackCandidate>>;
}

/// Catalog store trait
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Existing entries whose normalized identity equals `identity`
    async fn find_duplicates(&self, identity: &Identity) -> Result<Vec<CatalogEntry>>;

    /// Items of an album, in track order
    async fn album_items(&self, album_id: i64) -> Result<Vec<TrackRecord>>;

    /// A singleton item
    async fn item(&self, item_id: i64) -> Result<Option<TrackRecord>>;

    /// Files of stored items anywhere below `dir`
    async fn paths_under(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    /// Begin a write transaction
    ///
    /// At most one write transaction exists at a time; callers wait here.
    async fn transaction(&self) -> Result<Box<dyn CatalogTransaction>>;
}

/// A write transaction on the catalog
///
/// Dropping the transaction without committing rolls it back.
#[async_trait]
pub trait CatalogTransaction: Send {
    /// Insert singleton items, returning their ids
    async fn add(&mut self, items: &[TrackRecord]) -> Result<Vec<i64>>;

    /// Insert an album and its items, returning the album id
    async fn add_album(&mut self, album: &NewAlbum, items: &[TrackRecord]) -> Result<i64>;

    /// Delete an entry, returning the paths of its files
    async fn remove(&mut self, entry: EntryId) -> Result<Vec<PathBuf>>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Decision source trait
///
/// The human (or scripted) side of the import. Called from a single
/// coordinator, so at most one question is outstanding.
#[async_trait]
pub trait DecisionSource: Send + Sync {
    /// Pick an outcome for a task whose best match was not strong enough
    async fn choose_match(&self, task: &ImportTask, ranked: &[Match]) -> MatchDecision;

    /// Resolve a collision with existing catalog entries
    async fn resolve_duplicate(
        &self,
        task: &ImportTask,
        existing: &[CatalogEntry],
    ) -> DuplicateDecision;

    /// Surface a task failure
    async fn task_failed(&self, task: &ImportTask, error: &(dyn std::error::Error + Send + Sync)) {
        let _ = (task, error);
    }
}

/// Computes library-relative destination paths
pub trait PathFormatter: Send + Sync {
    /// Relative destination for a file with the given resolved fields
    ///
    /// `source` supplies the extension.
    fn format(&self, fields: &TagFields, source: &Path) -> PathBuf;
}

/// Notified synchronously after each successful commit
pub trait ImportObserver: Send + Sync {
    fn on_import(&self, event: &ImportEvent);
}
