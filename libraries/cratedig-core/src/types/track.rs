/// Local track snapshot and resolved tag fields
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Immutable snapshot of one local file's parsed tags
///
/// Created by the scanner from the tag codec. Resolved values are applied by
/// building a new record with [`TrackRecord::with_fields`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    /// File path on disk
    pub path: PathBuf,

    /// Track title
    pub title: Option<String>,

    /// Track artist
    pub artist: Option<String>,

    /// Album title
    pub album: Option<String>,

    /// Album artist
    pub album_artist: Option<String>,

    /// Track number on its medium
    pub track_number: Option<u32>,

    /// Number of tracks on the medium
    pub track_total: Option<u32>,

    /// Disc number
    pub disc_number: Option<u32>,

    /// Number of discs
    pub disc_total: Option<u32>,

    /// Release year
    pub year: Option<i32>,

    /// Record label
    pub label: Option<String>,

    /// Label catalog number
    pub catalog_number: Option<String>,

    /// Track length in milliseconds
    pub length_ms: Option<u64>,

    /// Acoustic fingerprint, if one was computed
    pub fingerprint: Option<String>,

    /// External recording id (e.g. a MusicBrainz recording id)
    pub track_id: Option<String>,

    /// External release id (e.g. a MusicBrainz release id)
    pub album_id: Option<String>,
}

impl TrackRecord {
    /// Create a record with only a path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Track length as a `Duration`
    pub fn length(&self) -> Option<Duration> {
        self.length_ms.map(Duration::from_millis)
    }

    /// Title, falling back to the file stem
    pub fn display_title(&self) -> String {
        self.title.clone().unwrap_or_else(|| file_stem(&self.path))
    }

    /// Album artist, falling back to the track artist
    pub fn effective_album_artist(&self) -> Option<&str> {
        self.album_artist.as_deref().or(self.artist.as_deref())
    }

    /// The fields currently carried by this record
    pub fn fields(&self) -> TagFields {
        TagFields {
            title: self.title.clone(),
            artist: self.artist.clone(),
            album: self.album.clone(),
            album_artist: self.album_artist.clone(),
            track_number: self.track_number,
            track_total: self.track_total,
            disc_number: self.disc_number,
            disc_total: self.disc_total,
            year: self.year,
            label: self.label.clone(),
            catalog_number: self.catalog_number.clone(),
            track_id: self.track_id.clone(),
            album_id: self.album_id.clone(),
        }
    }

    /// Build a new record with `fields` applied on top of this one
    ///
    /// Only fields that are `Some` in `fields` replace existing values.
    pub fn with_fields(&self, fields: &TagFields) -> Self {
        let mut next = self.clone();
        macro_rules! apply {
            ($($name:ident),*) => {
                $(if fields.$name.is_some() { next.$name = fields.$name.clone(); })*
            };
        }
        apply!(
            title,
            artist,
            album,
            album_artist,
            track_number,
            track_total,
            disc_number,
            disc_total,
            year,
            label,
            catalog_number,
            track_id,
            album_id
        );
        next
    }

    /// Same record at a different path
    pub fn relocated(&self, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..self.clone()
        }
    }
}

/// Field values to persist onto a file or a catalog row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagFields {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub track_number: Option<u32>,
    pub track_total: Option<u32>,
    pub disc_number: Option<u32>,
    pub disc_total: Option<u32>,
    pub year: Option<i32>,
    pub label: Option<String>,
    pub catalog_number: Option<String>,
    pub track_id: Option<String>,
    pub album_id: Option<String>,
}

impl TagFields {
    /// Check if no field is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_title_falls_back_to_file_stem() {
        let record = TrackRecord::new("/music/01 - Intro.flac");
        assert_eq!(record.display_title(), "01 - Intro");
    }

    #[test]
    fn with_fields_only_overrides_set_values() {
        let mut record = TrackRecord::new("/music/a.mp3");
        record.title = Some("old title".to_string());
        record.artist = Some("Artist".to_string());

        let fields = TagFields {
            title: Some("New Title".to_string()),
            track_number: Some(3),
            ..TagFields::default()
        };
        let next = record.with_fields(&fields);

        assert_eq!(next.title.as_deref(), Some("New Title"));
        assert_eq!(next.artist.as_deref(), Some("Artist"));
        assert_eq!(next.track_number, Some(3));
        // Original snapshot untouched
        assert_eq!(record.title.as_deref(), Some("old title"));
    }

    #[test]
    fn album_artist_fallback() {
        let mut record = TrackRecord::new("/a.mp3");
        record.artist = Some("Queen".to_string());
        assert_eq!(record.effective_album_artist(), Some("Queen"));

        record.album_artist = Some("Various Artists".to_string());
        assert_eq!(record.effective_album_artist(), Some("Various Artists"));
    }
}
