//! Test helpers and fixtures for importer integration tests
//!
//! Audio files are real files in a temp directory; their tags live in
//! [`MemoryCodec`] so tests can assert on every tag write. A stamping codec
//! also changes the bytes of every file it writes.

#![allow(dead_code)]

use async_trait::async_trait;
use cratedig_core::{
    AlbumCandidate, CandidateTrack, CatalogEntry, CatalogStore, CatalogTransaction,
    DecisionSource, DigError, DuplicateDecision, EntryId, GroupKey, Identity, ImportEvent,
    ImportObserver, ImportTask, Match, MatchDecision, MetadataSource, NewAlbum, TagCodec,
    TagFields, TrackCandidate, TrackRecord,
};
use cratedig_importer::{AbortSignal, ImportConfig};
use cratedig_storage::SqliteCatalog;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tempfile::TempDir;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// Test database wrapper that cleans up on drop
pub struct TestDb {
    pub catalog: SqliteCatalog,
    _temp_dir: TempDir,
}

impl TestDb {
    pub async fn new() -> Self {
        init_tracing();
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db_url = format!("sqlite://{}", temp_dir.path().join("catalog.db").display());

        let pool = cratedig_storage::create_pool(&db_url)
            .await
            .expect("Failed to create pool");
        cratedig_storage::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        Self {
            catalog: SqliteCatalog::new(pool),
            _temp_dir: temp_dir,
        }
    }
}

/// Incoming tree, library and journal under one temp directory
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
        }
    }

    pub fn incoming(&self) -> PathBuf {
        self.dir.path().join("incoming")
    }

    pub fn library(&self) -> PathBuf {
        self.dir.path().join("library")
    }

    pub fn journal(&self) -> PathBuf {
        self.dir.path().join("state").join("journal.jsonl")
    }

    pub fn config(&self) -> ImportConfig {
        let mut config = ImportConfig::default();
        config.library_path = self.library();
        config.journal_path = self.journal();
        config.search_timeout_secs = 1;
        config
    }
}

/// Tag codec backed by a map; counts every write
#[derive(Default)]
pub struct MemoryCodec {
    tags: Mutex<HashMap<PathBuf, TrackRecord>>,
    writes: Mutex<Vec<PathBuf>>,
    stamp: bool,
}

/// Bytes a stamping codec appends on every write
pub const TAG_STAMP: &str = "+TAGGED";

impl MemoryCodec {
    /// Codec whose writes also append [`TAG_STAMP`] to the file on disk
    pub fn stamping() -> Self {
        Self {
            stamp: true,
            ..Self::default()
        }
    }

    pub fn insert(&self, record: TrackRecord) {
        self.tags.lock().unwrap().insert(record.path.clone(), record);
    }

    pub fn writes(&self) -> Vec<PathBuf> {
        self.writes.lock().unwrap().clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    pub fn tags(&self, path: &Path) -> Option<TrackRecord> {
        self.tags.lock().unwrap().get(path).cloned()
    }
}

impl TagCodec for MemoryCodec {
    fn read(&self, path: &Path) -> cratedig_core::Result<TrackRecord> {
        self.tags(path)
            .ok_or_else(|| DigError::metadata(format!("no tags in {}", path.display())))
    }

    fn write(&self, path: &Path, fields: &TagFields) -> cratedig_core::Result<()> {
        self.writes.lock().unwrap().push(path.to_path_buf());
        if self.stamp {
            let mut file = fs::OpenOptions::new().append(true).open(path)?;
            file.write_all(TAG_STAMP.as_bytes())?;
        }
        let mut tags = self.tags.lock().unwrap();
        let record = tags
            .get(path)
            .cloned()
            .unwrap_or_else(|| TrackRecord::new(path));
        tags.insert(path.to_path_buf(), record.with_fields(fields));
        Ok(())
    }
}

/// Test fixture: a tagged track record
pub fn record(path: &Path, artist: &str, album: &str, number: u32) -> TrackRecord {
    let mut record = TrackRecord::new(path);
    record.title = Some(format!("Track {number}"));
    record.artist = Some(artist.to_string());
    record.album_artist = Some(artist.to_string());
    record.album = Some(album.to_string());
    record.track_number = Some(number);
    record.year = Some(1994);
    record.length_ms = Some(200_000);
    record
}

/// Create an album directory with `numbers` as its tracks and register their tags
pub fn write_album(
    codec: &MemoryCodec,
    dir: &Path,
    artist: &str,
    album: &str,
    numbers: impl IntoIterator<Item = u32>,
) -> Vec<PathBuf> {
    fs::create_dir_all(dir).expect("Failed to create album dir");
    numbers
        .into_iter()
        .map(|n| {
            let path = dir.join(format!("{n:02} - Track {n}.flac"));
            fs::write(&path, format!("{artist}/{album}/{n}")).expect("Failed to write file");
            codec.insert(record(&path, artist, album, n));
            path
        })
        .collect()
}

/// Test fixture: an album proposal with `tracks` tracks
pub fn album_candidate(id: &str, artist: &str, album: &str, tracks: u32) -> AlbumCandidate {
    AlbumCandidate {
        id: id.to_string(),
        artist: artist.to_string(),
        album: album.to_string(),
        year: Some(1994),
        tracks: (1..=tracks)
            .map(|n| CandidateTrack {
                id: Some(format!("{id}-{n}")),
                title: format!("Track {n}"),
                track_number: Some(n),
                medium: Some(1),
                length_ms: Some(200_000),
                ..CandidateTrack::default()
            })
            .collect(),
        ..AlbumCandidate::default()
    }
}

/// Metadata source returning fixed proposals
#[derive(Default)]
pub struct FakeSource {
    pub name: String,
    pub albums: Vec<AlbumCandidate>,
    pub tracks: Vec<TrackCandidate>,
    pub fail: bool,
    pub delay: Option<Duration>,
    pub searches: AtomicUsize,
}

impl FakeSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_album(mut self, album: AlbumCandidate) -> Self {
        self.albums.push(album);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    async fn respond(&self) -> cratedig_core::Result<()> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(DigError::search(format!("{} is unreachable", self.name)));
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataSource for FakeSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn candidates(
        &self,
        _tracks: &[TrackRecord],
        _artist_hint: Option<&str>,
        _album_hint: Option<&str>,
        _va_likely: bool,
    ) -> cratedig_core::Result<Vec<AlbumCandidate>> {
        self.respond().await?;
        Ok(self.albums.clone())
    }

    async fn item_candidates(
        &self,
        _track: &TrackRecord,
        _artist_hint: Option<&str>,
        _title_hint: Option<&str>,
    ) -> cratedig_core::Result<Vec<TrackCandidate>> {
        self.respond().await?;
        Ok(self.tracks.clone())
    }

    async fn album_for_id(&self, id: &str) -> cratedig_core::Result<Option<AlbumCandidate>> {
        self.respond().await?;
        Ok(self.albums.iter().find(|a| a.id == id).cloned())
    }

    async fn track_for_id(&self, id: &str) -> cratedig_core::Result<Option<TrackCandidate>> {
        self.respond().await?;
        Ok(self.tracks.iter().find(|t| t.id == id).cloned())
    }
}

/// Decision source answering from queues; skips once they run dry
#[derive(Default)]
pub struct ScriptedDecider {
    matches: Mutex<VecDeque<MatchDecision>>,
    duplicates: Mutex<VecDeque<DuplicateDecision>>,

    /// Every match question: task key and the best candidate offered
    pub asked: Mutex<Vec<(GroupKey, Option<Match>)>>,

    /// Every duplicate question: task key and number of existing entries
    pub duplicates_seen: Mutex<Vec<(GroupKey, usize)>>,

    pub failures: Mutex<Vec<(GroupKey, String)>>,
}

impl ScriptedDecider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_match(self, decision: MatchDecision) -> Self {
        self.matches.lock().unwrap().push_back(decision);
        self
    }

    pub fn then_duplicate(self, decision: DuplicateDecision) -> Self {
        self.duplicates.lock().unwrap().push_back(decision);
        self
    }

    pub fn asked_keys(&self) -> Vec<GroupKey> {
        self.asked.lock().unwrap().iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn duplicate_keys(&self) -> Vec<GroupKey> {
        self.duplicates_seen
            .lock()
            .unwrap()
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }
}

#[async_trait]
impl DecisionSource for ScriptedDecider {
    async fn choose_match(&self, task: &ImportTask, ranked: &[Match]) -> MatchDecision {
        self.asked
            .lock()
            .unwrap()
            .push((task.key.clone(), ranked.first().cloned()));
        self.matches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(MatchDecision::Skip)
    }

    async fn resolve_duplicate(
        &self,
        task: &ImportTask,
        existing: &[CatalogEntry],
    ) -> DuplicateDecision {
        self.duplicates_seen
            .lock()
            .unwrap()
            .push((task.key.clone(), existing.len()));
        self.duplicates
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(DuplicateDecision::SkipNew)
    }

    async fn task_failed(&self, task: &ImportTask, error: &(dyn std::error::Error + Send + Sync)) {
        self.failures
            .lock()
            .unwrap()
            .push((task.key.clone(), error.to_string()));
    }
}

/// Observer that raises the abort signal after `limit` imports
pub struct AbortAfter {
    pub limit: usize,
    pub signal: AbortSignal,
    pub seen: Mutex<Vec<ImportEvent>>,
}

impl AbortAfter {
    pub fn new(limit: usize, signal: AbortSignal) -> Self {
        Self {
            limit,
            signal,
            seen: Mutex::new(Vec::new()),
        }
    }
}

impl ImportObserver for AbortAfter {
    fn on_import(&self, event: &ImportEvent) {
        let mut seen = self.seen.lock().unwrap();
        seen.push(event.clone());
        if seen.len() >= self.limit {
            self.signal.raise();
        }
    }
}

/// Observer appending its name to a shared log
pub struct NamedObserver {
    pub name: &'static str,
    pub log: Arc<Mutex<Vec<(&'static str, ImportEvent)>>>,
}

impl ImportObserver for NamedObserver {
    fn on_import(&self, event: &ImportEvent) {
        self.log.lock().unwrap().push((self.name, event.clone()));
    }
}

/// SQLite catalog whose first `failures` transactions fail on insert
pub struct FlakyCatalog {
    pub inner: SqliteCatalog,
    failures: AtomicUsize,
}

impl FlakyCatalog {
    pub fn new(inner: SqliteCatalog, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl CatalogStore for FlakyCatalog {
    async fn find_duplicates(&self, identity: &Identity) -> cratedig_core::Result<Vec<CatalogEntry>> {
        self.inner.find_duplicates(identity).await
    }

    async fn album_items(&self, album_id: i64) -> cratedig_core::Result<Vec<TrackRecord>> {
        self.inner.album_items(album_id).await
    }

    async fn item(&self, item_id: i64) -> cratedig_core::Result<Option<TrackRecord>> {
        self.inner.item(item_id).await
    }

    async fn paths_under(&self, dir: &Path) -> cratedig_core::Result<Vec<PathBuf>> {
        self.inner.paths_under(dir).await
    }

    async fn transaction(&self) -> cratedig_core::Result<Box<dyn CatalogTransaction>> {
        let fail = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        Ok(Box::new(FlakyTransaction {
            inner: self.inner.transaction().await?,
            fail,
        }))
    }
}

struct FlakyTransaction {
    inner: Box<dyn CatalogTransaction>,
    fail: bool,
}

impl FlakyTransaction {
    fn check(&self) -> cratedig_core::Result<()> {
        if self.fail {
            return Err(DigError::storage("disk I/O error"));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogTransaction for FlakyTransaction {
    async fn add(&mut self, items: &[TrackRecord]) -> cratedig_core::Result<Vec<i64>> {
        let ids = self.inner.add(items).await?;
        self.check()?;
        Ok(ids)
    }

    async fn add_album(&mut self, album: &NewAlbum, items: &[TrackRecord]) -> cratedig_core::Result<i64> {
        let id = self.inner.add_album(album, items).await?;
        self.check()?;
        Ok(id)
    }

    async fn remove(&mut self, entry: EntryId) -> cratedig_core::Result<Vec<PathBuf>> {
        self.inner.remove(entry).await
    }

    async fn commit(self: Box<Self>) -> cratedig_core::Result<()> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> cratedig_core::Result<()> {
        self.inner.rollback().await
    }
}

/// Audio files below `dir`, sorted
pub fn files_under(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        return Vec::new();
    }
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}
