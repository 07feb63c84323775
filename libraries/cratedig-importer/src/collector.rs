//! Candidate collection from metadata sources
//!
//! Sources are registered once at start-up and queried concurrently. Each
//! call is bounded by the search timeout; a failing or slow source
//! contributes no candidates and the import carries on.

use crate::ImportError;
use cratedig_core::{
    AlbumCandidate, Candidate, ImportTask, ManualQuery, MetadataSource, TrackCandidate,
};
use futures_util::future::join_all;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const VARIOUS_ARTISTS: &[&str] = &["various artists", "various", "va", "v a"];

/// Consensus values of a task's local tracks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Likelies {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub title: Option<String>,
    pub album_id: Option<String>,
    pub track_id: Option<String>,

    /// Probably a various-artists compilation
    pub va_likely: bool,
}

impl Likelies {
    /// Compute hints from a task's tracks
    pub fn of(task: &ImportTask) -> Self {
        let artist = if task.is_album {
            task.consensus(|t| t.effective_album_artist())
        } else {
            task.consensus(|t| t.artist.as_deref())
        };
        let distinct_artists: HashSet<String> = task
            .tracks
            .iter()
            .filter_map(|t| t.artist.as_deref())
            .map(cratedig_core::normalize_text)
            .filter(|a| !a.is_empty())
            .collect();
        let named_va = artist
            .as_deref()
            .map(cratedig_core::normalize_text)
            .is_some_and(|a| VARIOUS_ARTISTS.contains(&a.as_str()));

        Self {
            album: task.consensus(|t| t.album.as_deref()),
            title: task.tracks.first().map(|t| t.display_title()),
            album_id: task.consensus(|t| t.album_id.as_deref()),
            track_id: task.consensus(|t| t.track_id.as_deref()),
            va_likely: task.is_album && (distinct_artists.len() > 1 || named_va),
            artist,
        }
    }
}

/// Registry of metadata sources
#[derive(Clone)]
pub struct CandidateCollector {
    sources: Vec<Arc<dyn MetadataSource>>,
    timeout: Duration,
}

impl CandidateCollector {
    pub fn new(timeout: Duration) -> Self {
        Self {
            sources: Vec::new(),
            timeout,
        }
    }

    /// Register a source; earlier sources win ranking ties
    pub fn register(&mut self, source: Arc<dyn MetadataSource>) {
        debug!(source = source.name(), priority = self.sources.len(), "Registered metadata source");
        self.sources.push(source);
    }

    pub fn with_source(mut self, source: Arc<dyn MetadataSource>) -> Self {
        self.register(source);
        self
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Query every source for a task
    ///
    /// Id lookups (when the tracks carry a consensus id) come first, then
    /// search results, each in registration order. Duplicate ids keep their
    /// first occurrence.
    pub async fn collect(&self, task: &ImportTask) -> Vec<Candidate> {
        let likelies = Likelies::of(task);
        debug!(
            key = %task.key,
            artist = ?likelies.artist,
            album = ?likelies.album,
            va_likely = likelies.va_likely,
            "Collecting candidates"
        );

        let mut found = Vec::new();
        if task.is_album {
            if let Some(id) = &likelies.album_id {
                found.extend(self.albums_by_id(id).await);
            }
            found.extend(
                self.album_search(
                    task,
                    likelies.artist.as_deref(),
                    likelies.album.as_deref(),
                    likelies.va_likely,
                )
                .await,
            );
        } else {
            if let Some(id) = &likelies.track_id {
                found.extend(self.tracks_by_id(id).await);
            }
            found.extend(
                self.item_search(task, likelies.artist.as_deref(), likelies.title.as_deref())
                    .await,
            );
        }

        dedupe(found)
    }

    /// Query every source with a user-supplied query
    pub async fn collect_manual(&self, task: &ImportTask, query: &ManualQuery) -> Vec<Candidate> {
        debug!(key = %task.key, ?query, "Manual search");
        let found = match (query, task.is_album) {
            (ManualQuery::Id(id), true) => self.albums_by_id(id).await,
            (ManualQuery::Id(id), false) => self.tracks_by_id(id).await,
            (ManualQuery::Terms { artist, title }, true) => {
                let va_likely = Likelies::of(task).va_likely;
                self.album_search(task, Some(artist), Some(title), va_likely)
                    .await
            }
            (ManualQuery::Terms { artist, title }, false) => {
                self.item_search(task, Some(artist), Some(title)).await
            }
        };
        dedupe(found)
    }

    async fn album_search(
        &self,
        task: &ImportTask,
        artist: Option<&str>,
        album: Option<&str>,
        va_likely: bool,
    ) -> Vec<Candidate> {
        let calls = self.sources.iter().enumerate().map(|(priority, source)| {
            let call = source.candidates(&task.tracks, artist, album, va_likely);
            async move {
                self.bounded(source.as_ref(), "candidates", call)
                    .await
                    .unwrap_or_default()
                    .into_iter()
                    .map(|c| stamp_album(c, source.name(), priority))
                    .collect::<Vec<_>>()
            }
        });
        join_all(calls).await.into_iter().flatten().collect()
    }

    async fn item_search(
        &self,
        task: &ImportTask,
        artist: Option<&str>,
        title: Option<&str>,
    ) -> Vec<Candidate> {
        let Some(track) = task.tracks.first() else {
            return Vec::new();
        };
        let calls = self.sources.iter().enumerate().map(|(priority, source)| {
            let call = source.item_candidates(track, artist, title);
            async move {
                self.bounded(source.as_ref(), "item_candidates", call)
                    .await
                    .unwrap_or_default()
                    .into_iter()
                    .map(|c| stamp_track(c, source.name(), priority))
                    .collect::<Vec<_>>()
            }
        });
        join_all(calls).await.into_iter().flatten().collect()
    }

    async fn albums_by_id(&self, id: &str) -> Vec<Candidate> {
        let calls = self.sources.iter().enumerate().map(|(priority, source)| {
            let call = source.album_for_id(id);
            async move {
                self.bounded(source.as_ref(), "album_for_id", call)
                    .await
                    .flatten()
                    .map(|c| stamp_album(c, source.name(), priority))
            }
        });
        join_all(calls).await.into_iter().flatten().collect()
    }

    async fn tracks_by_id(&self, id: &str) -> Vec<Candidate> {
        let calls = self.sources.iter().enumerate().map(|(priority, source)| {
            let call = source.track_for_id(id);
            async move {
                self.bounded(source.as_ref(), "track_for_id", call)
                    .await
                    .flatten()
                    .map(|c| stamp_track(c, source.name(), priority))
            }
        });
        join_all(calls).await.into_iter().flatten().collect()
    }

    /// Run one source call under the timeout; `None` on error or timeout
    async fn bounded<T>(
        &self,
        source: &dyn MetadataSource,
        operation: &str,
        call: impl Future<Output = cratedig_core::Result<T>>,
    ) -> Option<T> {
        let message = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => return Some(value),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {:?}", self.timeout),
        };
        let err = ImportError::TransientSearch {
            source_name: source.name().to_string(),
            message,
        };
        warn!(operation, error = %err, "Metadata source returned no candidates");
        None
    }
}

fn stamp_album(mut candidate: AlbumCandidate, source: &str, priority: usize) -> Candidate {
    candidate.source = source.to_string();
    candidate.source_priority = priority;
    Candidate::Album(Arc::new(candidate))
}

fn stamp_track(mut candidate: TrackCandidate, source: &str, priority: usize) -> Candidate {
    candidate.source = source.to_string();
    candidate.source_priority = priority;
    Candidate::Track(Arc::new(candidate))
}

/// Keep the first candidate per id
fn dedupe(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.id().to_string()))
        .collect()
}
