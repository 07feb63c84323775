/// Metadata proposals supplied by metadata sources
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One track of an album candidate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateTrack {
    /// Source-specific track id
    pub id: Option<String>,

    /// Track title
    pub title: String,

    /// Track artist (differs from the album artist on compilations)
    pub artist: Option<String>,

    /// Position on its medium (1-based)
    pub track_number: Option<u32>,

    /// Medium (disc) number
    pub medium: Option<u32>,

    /// Length in milliseconds
    pub length_ms: Option<u64>,
}

/// Album proposal from a metadata source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlbumCandidate {
    /// Source-specific release id, used for deduplication
    pub id: String,

    /// Name of the source that produced this candidate
    ///
    /// Stamped by the collector.
    #[serde(default)]
    pub source: String,

    /// Registration index of the source; lower wins ties
    #[serde(default)]
    pub source_priority: usize,

    /// Album artist
    pub artist: String,

    /// Album title
    pub album: String,

    /// Release year
    pub year: Option<i32>,

    /// Record label
    pub label: Option<String>,

    /// Release country
    pub country: Option<String>,

    /// Catalog number
    pub catalog_number: Option<String>,

    /// Number of media (discs)
    pub mediums: Option<u32>,

    /// Whether this is a various-artists release
    #[serde(default)]
    pub various_artists: bool,

    /// Ordered track list
    pub tracks: Vec<CandidateTrack>,
}

/// Single-track proposal from a metadata source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackCandidate {
    /// Source-specific recording id
    pub id: String,

    /// Name of the source that produced this candidate
    #[serde(default)]
    pub source: String,

    /// Registration index of the source
    #[serde(default)]
    pub source_priority: usize,

    /// Track title
    pub title: String,

    /// Track artist
    pub artist: Option<String>,

    /// Album the recording appears on, if known
    pub album: Option<String>,

    /// Release year
    pub year: Option<i32>,

    /// Length in milliseconds
    pub length_ms: Option<u64>,
}

/// A candidate held by reference; tasks never mutate it
#[derive(Debug, Clone, PartialEq)]
pub enum Candidate {
    Album(Arc<AlbumCandidate>),
    Track(Arc<TrackCandidate>),
}

impl Candidate {
    /// Candidate id
    pub fn id(&self) -> &str {
        match self {
            Candidate::Album(album) => &album.id,
            Candidate::Track(track) => &track.id,
        }
    }

    /// Source name
    pub fn source(&self) -> &str {
        match self {
            Candidate::Album(album) => &album.source,
            Candidate::Track(track) => &track.source,
        }
    }

    /// Source registration index
    pub fn source_priority(&self) -> usize {
        match self {
            Candidate::Album(album) => album.source_priority,
            Candidate::Track(track) => track.source_priority,
        }
    }

    /// Release year, used as the recency tie-breaker
    pub fn year(&self) -> Option<i32> {
        match self {
            Candidate::Album(album) => album.year,
            Candidate::Track(track) => track.year,
        }
    }

    /// Artist and title used to compare candidate identities
    pub fn identity_parts(&self) -> (String, String) {
        match self {
            Candidate::Album(album) => (album.artist.clone(), album.album.clone()),
            Candidate::Track(track) => (
                track.artist.clone().unwrap_or_default(),
                track.title.clone(),
            ),
        }
    }

    /// Number of tracks the candidate proposes
    pub fn track_count(&self) -> usize {
        match self {
            Candidate::Album(album) => album.tracks.len(),
            Candidate::Track(_) => 1,
        }
    }
}
