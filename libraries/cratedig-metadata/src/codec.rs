/// Tag codec implementation using lofty
use crate::error::MetadataError;
use cratedig_core::{TagCodec, TagFields, TrackRecord};
use lofty::{Accessor, AudioFile, ItemKey, Tag, TagExt, TaggedFileExt};
use std::path::Path;
use tracing::debug;

/// Tag codec using the lofty library
pub struct LoftyTagCodec;

impl LoftyTagCodec {
    /// Create a new tag codec
    pub fn new() -> Self {
        Self
    }

    /// Extract fields from a lofty tag
    fn extract_from_tag(tag: &Tag, record: &mut TrackRecord) {
        // lofty 0.18 API - iterate through items
        for item in tag.items() {
            let Some(text) = item.value().text() else {
                continue;
            };
            match item.key() {
                ItemKey::TrackTitle => record.title = non_empty(text),
                ItemKey::TrackArtist => record.artist = non_empty(text),
                ItemKey::AlbumTitle => record.album = non_empty(text),
                ItemKey::AlbumArtist => record.album_artist = non_empty(text),
                ItemKey::Label => record.label = non_empty(text),
                ItemKey::CatalogNumber => record.catalog_number = non_empty(text),
                ItemKey::Year | ItemKey::RecordingDate => {
                    if record.year.is_none() {
                        record.year = parse_year(text);
                    }
                }
                ItemKey::TrackNumber => {
                    let (number, total) = parse_position(text);
                    record.track_number = number;
                    record.track_total = record.track_total.or(total);
                }
                ItemKey::TrackTotal => record.track_total = text.trim().parse().ok(),
                ItemKey::DiscNumber => {
                    let (number, total) = parse_position(text);
                    record.disc_number = number;
                    record.disc_total = record.disc_total.or(total);
                }
                ItemKey::DiscTotal => record.disc_total = text.trim().parse().ok(),
                ItemKey::MusicBrainzRecordingId => record.track_id = non_empty(text),
                ItemKey::MusicBrainzReleaseId => record.album_id = non_empty(text),
                _ => {}
            }
        }
    }

    /// Copy set fields onto a lofty tag
    fn apply_to_tag(tag: &mut Tag, fields: &TagFields) {
        if let Some(title) = &fields.title {
            tag.set_title(title.clone());
        }
        if let Some(artist) = &fields.artist {
            tag.set_artist(artist.clone());
        }
        if let Some(album) = &fields.album {
            tag.set_album(album.clone());
        }
        if let Some(year) = fields.year.and_then(|y| u32::try_from(y).ok()) {
            tag.set_year(year);
        }
        if let Some(track) = fields.track_number {
            tag.set_track(track);
        }
        if let Some(total) = fields.track_total {
            tag.set_track_total(total);
        }
        if let Some(disc) = fields.disc_number {
            tag.set_disk(disc);
        }
        if let Some(total) = fields.disc_total {
            tag.set_disk_total(total);
        }

        let text_items = [
            (ItemKey::AlbumArtist, &fields.album_artist),
            (ItemKey::Label, &fields.label),
            (ItemKey::CatalogNumber, &fields.catalog_number),
            (ItemKey::MusicBrainzRecordingId, &fields.track_id),
            (ItemKey::MusicBrainzReleaseId, &fields.album_id),
        ];
        for (key, value) in text_items {
            if let Some(value) = value {
                tag.insert_text(key, value.clone());
            }
        }
    }
}

impl Default for LoftyTagCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl TagCodec for LoftyTagCodec {
    fn read(&self, path: &Path) -> cratedig_core::Result<TrackRecord> {
        if !path.exists() {
            return Err(MetadataError::FileNotFound(path.display().to_string()).into());
        }

        let tagged_file = lofty::read_from_path(path).map_err(MetadataError::from)?;

        let mut record = TrackRecord::new(path);
        record.length_ms = Some(tagged_file.properties().duration().as_millis() as u64);

        // Primary tag first, then whichever tag the file carries
        if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.tags().first()) {
            Self::extract_from_tag(tag, &mut record);
        }

        Ok(record)
    }

    fn write(&self, path: &Path, fields: &TagFields) -> cratedig_core::Result<()> {
        if !path.exists() {
            return Err(MetadataError::FileNotFound(path.display().to_string()).into());
        }
        if fields.is_empty() {
            return Ok(());
        }

        let mut tagged_file = lofty::read_from_path(path).map_err(MetadataError::from)?;

        if tagged_file.primary_tag().is_none() {
            let tag_type = tagged_file.primary_tag_type();
            tagged_file.insert_tag(Tag::new(tag_type));
        }
        let tag = tagged_file
            .primary_tag_mut()
            .ok_or_else(|| MetadataError::NoWritableTag(path.display().to_string()))?;

        Self::apply_to_tag(tag, fields);
        tag.save_to_path(path).map_err(MetadataError::from)?;

        debug!(path = %path.display(), "Wrote tags");
        Ok(())
    }
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Leading four-digit year of a date string ("1999", "1999-03-01")
fn parse_year(text: &str) -> Option<i32> {
    let digits: String = text.trim().chars().take_while(char::is_ascii_digit).collect();
    if digits.len() >= 4 {
        digits[..4].parse().ok()
    } else {
        None
    }
}

/// "3" or "3/12"
fn parse_position(text: &str) -> (Option<u32>, Option<u32>) {
    let mut parts = text.trim().splitn(2, '/');
    let number = parts.next().and_then(|n| n.trim().parse().ok());
    let total = parts.next().and_then(|t| t.trim().parse().ok());
    (number, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn read_nonexistent_file_returns_error() {
        let codec = LoftyTagCodec::new();
        let result = codec.read(Path::new("/nonexistent/file.mp3"));
        assert!(result.is_err());
    }

    #[test]
    fn read_garbage_file_returns_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.mp3");
        fs::write(&path, b"definitely not audio").unwrap();

        let codec = LoftyTagCodec::new();
        assert!(codec.read(&path).is_err());
    }

    #[test]
    fn write_nonexistent_file_returns_error() {
        let codec = LoftyTagCodec::new();
        let fields = TagFields {
            title: Some("x".to_string()),
            ..TagFields::default()
        };
        assert!(codec.write(Path::new("/nonexistent/file.flac"), &fields).is_err());
    }

    #[test]
    fn empty_write_is_a_no_op() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.mp3");
        fs::write(&path, b"not audio either").unwrap();

        let codec = LoftyTagCodec::new();
        codec.write(&path, &TagFields::default()).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"not audio either");
    }

    #[test]
    fn year_parsing() {
        assert_eq!(parse_year("1999"), Some(1999));
        assert_eq!(parse_year("2004-05-12"), Some(2004));
        assert_eq!(parse_year("99"), None);
        assert_eq!(parse_year(""), None);
    }

    #[test]
    fn position_parsing() {
        assert_eq!(parse_position("3"), (Some(3), None));
        assert_eq!(parse_position("3/12"), (Some(3), Some(12)));
        assert_eq!(parse_position(" 7 / 9 "), (Some(7), Some(9)));
        assert_eq!(parse_position("A1"), (None, None));
    }
}
