/// Catalog identities and entries
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Identity used to detect duplicates in the catalog
///
/// Compared in normalized form, see [`normalize_text`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
    /// Album artist + album title
    Album { artist: String, album: String },

    /// Artist + title of a singleton
    Item { artist: String, title: String },
}

impl Identity {
    /// Normalized lookup key
    ///
    /// Two identities are duplicates iff their keys are equal.
    pub fn key(&self) -> String {
        match self {
            Identity::Album { artist, album } => {
                format!("album\u{1f}{}\u{1f}{}", normalize_text(artist), normalize_text(album))
            }
            Identity::Item { artist, title } => {
                format!("item\u{1f}{}\u{1f}{}", normalize_text(artist), normalize_text(title))
            }
        }
    }

    /// Whether this identifies an album
    pub fn is_album(&self) -> bool {
        matches!(self, Identity::Album { .. })
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Album { artist, album } => write!(f, "{artist} - {album}"),
            Identity::Item { artist, title } => write!(f, "{artist} - {title}"),
        }
    }
}

/// Catalog row id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntryId {
    Album(i64),
    Item(i64),
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryId::Album(id) => write!(f, "album#{id}"),
            EntryId::Item(id) => write!(f, "item#{id}"),
        }
    }
}

/// Existing catalog entry returned by duplicate lookups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: EntryId,
    pub artist: String,
    pub title: String,
    pub year: Option<i32>,

    /// Files belonging to the entry (all items of an album)
    pub paths: Vec<PathBuf>,
}

/// Album row to insert
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewAlbum {
    pub album_artist: String,
    pub album: String,
    pub year: Option<i32>,
    pub label: Option<String>,

    /// External release id
    pub album_id: Option<String>,
}

impl NewAlbum {
    /// Duplicate-detection identity of this album
    pub fn identity(&self) -> Identity {
        Identity::Album {
            artist: self.album_artist.clone(),
            album: self.album.clone(),
        }
    }
}

/// Normalize a string for comparison
///
/// Lowercases, replaces punctuation with spaces and collapses whitespace.
pub fn normalize_text(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Hello   World  "), "hello world");
        assert_eq!(normalize_text("AC/DC"), "ac dc");
        assert_eq!(normalize_text("Don't Stop!"), "don t stop");
        assert_eq!(normalize_text("Björk"), "björk");
    }

    #[test]
    fn identity_key_ignores_case_and_punctuation() {
        let a = Identity::Album {
            artist: "The Beatles".to_string(),
            album: "Abbey Road".to_string(),
        };
        let b = Identity::Album {
            artist: "the beatles".to_string(),
            album: "Abbey  Road.".to_string(),
        };
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn album_and_item_keys_never_collide() {
        let album = Identity::Album {
            artist: "X".to_string(),
            album: "Y".to_string(),
        };
        let item = Identity::Item {
            artist: "X".to_string(),
            title: "Y".to_string(),
        };
        assert_ne!(album.key(), item.key());
    }
}
