//! Path template parser and resolver for library organization
//!
//! Supports templates like `{AlbumArtist}/{Year} - {Album}/{TrackNo} - {Title}`
//! with automatic fallbacks and sanitization for filesystem safety.
//!
//! # Available Placeholders
//!
//! | Placeholder | Description | Fallback |
//! |-------------|-------------|----------|
//! | `{Artist}` | Track artist | "Unknown Artist" |
//! | `{AlbumArtist}` | Album artist | Falls back to `{Artist}` |
//! | `{Album}` | Album title | "Unknown Album" |
//! | `{Title}` | Track title | Filename without extension |
//! | `{TrackNo}` | Track number (zero-padded) | "00" |
//! | `{DiscNo}` | Disc number | "1" |
//! | `{Year}` | Release year | "0000" |
//! | `{Label}` | Record label | "Unknown Label" |
//!
//! Files without an album (singletons) are placed with the singleton
//! template instead.

use cratedig_core::{PathFormatter, TagFields};
use std::path::{Path, PathBuf};

/// Default path template (Audiophile style)
pub const DEFAULT_TEMPLATE: &str = "{AlbumArtist}/{Year} - {Album}/{TrackNo} - {Title}";

/// Simple path template (no year)
pub const SIMPLE_TEMPLATE: &str = "{AlbumArtist}/{Album}/{TrackNo} - {Title}";

/// Label-first path template
pub const LABEL_TEMPLATE: &str = "{Label}/{AlbumArtist}/{Album}/{TrackNo} - {Title}";

/// Template for files that belong to no album
pub const SINGLETON_TEMPLATE: &str = "{Artist}/Singles/{Title}";

/// Path template parser and resolver
#[derive(Debug, Clone)]
pub struct PathTemplate {
    /// The album template string with placeholders
    template: String,
    /// Template used when the fields carry no album
    singleton_template: String,
    /// Whether to add disc subfolder for multi-disc albums
    add_disc_folder: bool,
    /// Whether to include track artist for compilations
    compilation_artist_in_filename: bool,
}

impl Default for PathTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}

impl PathTemplate {
    /// Create a new path template
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            singleton_template: SINGLETON_TEMPLATE.to_string(),
            add_disc_folder: true,
            compilation_artist_in_filename: true,
        }
    }

    /// Set whether to add disc subfolder for multi-disc albums
    pub fn with_disc_folder(mut self, add_disc_folder: bool) -> Self {
        self.add_disc_folder = add_disc_folder;
        self
    }

    /// Get the template string
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Resolve the template to a path using the provided fields
    ///
    /// # Arguments
    ///
    /// * `fields` - Resolved tag values for the file
    /// * `source_path` - Original file path (used for filename fallback and extension)
    ///
    /// # Returns
    ///
    /// A relative path from the library root
    pub fn resolve(&self, fields: &TagFields, source_path: &Path) -> PathBuf {
        let extension = source_path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("flac");

        let is_singleton = fields.album.is_none();
        let is_multi_disc = !is_singleton
            && (fields.disc_total.is_some_and(|total| total > 1)
                || fields.disc_number.is_some_and(|disc| disc > 1));
        let is_compilation = !is_singleton && is_compilation(fields);

        let mut resolved = if is_singleton {
            self.singleton_template.clone()
        } else {
            self.template.clone()
        };

        resolved = resolve_placeholder(&resolved, "AlbumArtist", || album_artist(fields));
        resolved = resolve_placeholder(&resolved, "Artist", || artist(fields));
        resolved = resolve_placeholder(&resolved, "Album", || {
            fields
                .album
                .as_deref()
                .map(str::trim)
                .filter(|album| !album.is_empty())
                .unwrap_or("Unknown Album")
                .to_string()
        });
        resolved = resolve_placeholder(&resolved, "Title", || title(fields, source_path));
        resolved = resolve_placeholder(&resolved, "TrackNo", || {
            fields
                .track_number
                .map(|n| format!("{:02}", n))
                .unwrap_or_else(|| "00".to_string())
        });
        resolved = resolve_placeholder(&resolved, "DiscNo", || {
            fields.disc_number.unwrap_or(1).to_string()
        });
        resolved = resolve_placeholder(&resolved, "Year", || {
            fields
                .year
                .map(|y| y.to_string())
                .unwrap_or_else(|| "0000".to_string())
        });
        resolved = resolve_placeholder(&resolved, "Label", || {
            fields.label.clone().unwrap_or_else(|| "Unknown Label".to_string())
        });

        if self.add_disc_folder && is_multi_disc {
            resolved = insert_disc_folder(&resolved, fields.disc_number.unwrap_or(1));
        }

        if self.compilation_artist_in_filename && is_compilation {
            resolved = add_compilation_artist(&resolved, &artist(fields));
        }

        let resolved = format!("{}.{}", resolved, extension);

        sanitize_path(&resolved)
    }
}

impl PathFormatter for PathTemplate {
    fn format(&self, fields: &TagFields, source: &Path) -> PathBuf {
        self.resolve(fields, source)
    }
}

/// Resolve a single placeholder in the template
///
/// Separators inside the value are replaced so a value never adds a directory.
fn resolve_placeholder<F>(template: &str, name: &str, value_fn: F) -> String
where
    F: FnOnce() -> String,
{
    let placeholder = format!("{{{}}}", name);
    if template.contains(&placeholder) {
        let value = value_fn().replace(['/', '\\'], "_");
        template.replace(&placeholder, &value)
    } else {
        template.to_string()
    }
}

fn album_artist(fields: &TagFields) -> String {
    fields
        .album_artist
        .as_deref()
        .or(fields.artist.as_deref())
        .unwrap_or("Unknown Artist")
        .to_string()
}

fn artist(fields: &TagFields) -> String {
    fields
        .artist
        .as_deref()
        .unwrap_or("Unknown Artist")
        .to_string()
}

fn title(fields: &TagFields, source_path: &Path) -> String {
    fields.title.clone().unwrap_or_else(|| {
        source_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Unknown")
            .to_string()
    })
}

/// Check if the album artist marks a compilation/VA album
fn is_compilation(fields: &TagFields) -> bool {
    let lower = fields
        .album_artist
        .as_deref()
        .unwrap_or("")
        .to_lowercase();
    ["various artists", "various", "va", "compilation", "soundtrack", "ost"]
        .iter()
        .any(|indicator| lower == *indicator || lower.starts_with(&format!("{indicator} ")))
}

/// Insert disc folder before the filename
fn insert_disc_folder(path: &str, disc: u32) -> String {
    if let Some(last_sep) = path.rfind('/') {
        let (dir, file) = path.split_at(last_sep);
        format!("{}/Disc {}{}", dir, disc, file)
    } else {
        format!("Disc {}/{}", disc, path)
    }
}

/// Add artist to filename for compilation albums
fn add_compilation_artist(path: &str, artist: &str) -> String {
    let (dir, file) = match path.rfind('/') {
        Some(last_sep) => path.split_at(last_sep + 1),
        None => ("", path),
    };
    // Insert after a "NN - " track number prefix when there is one
    if let Some(dash_pos) = file.find(" - ") {
        let (track_num, rest) = file.split_at(dash_pos + 3);
        format!("{}{}{} - {}", dir, track_num, artist, rest)
    } else {
        format!("{}{} - {}", dir, artist, file)
    }
}

/// Sanitize a path string, making each component filesystem-safe
fn sanitize_path(path: &str) -> PathBuf {
    path.split('/')
        .filter(|component| !component.is_empty())
        .map(sanitize_path_component)
        .collect()
}

/// Sanitize a single path component for filesystem safety
///
/// Removes/replaces characters that are invalid on common filesystems
pub fn sanitize_path_component(s: &str) -> String {
    let sanitized: String = s
        .chars()
        .map(|c| match c {
            // Invalid on Windows: < > : " / \ | ? *
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    // Trim whitespace and dots (Windows doesn't like trailing dots)
    let trimmed = sanitized.trim().trim_end_matches('.');

    let reserved = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];

    let upper = trimmed.to_uppercase();
    if reserved.contains(&upper.as_str()) {
        format!("_{}", trimmed)
    } else if trimmed.is_empty() || trimmed == ".." {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Preset templates for common use cases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplatePreset {
    /// `{AlbumArtist}/{Year} - {Album}/{TrackNo} - {Title}` (default)
    Audiophile,
    /// `{AlbumArtist}/{Album}/{TrackNo} - {Title}`
    Simple,
    /// `{Label}/{AlbumArtist}/{Album}/{TrackNo} - {Title}`
    LabelFirst,
}

impl TemplatePreset {
    /// Get the template string for this preset
    pub fn template(&self) -> &'static str {
        match self {
            TemplatePreset::Audiophile => DEFAULT_TEMPLATE,
            TemplatePreset::Simple => SIMPLE_TEMPLATE,
            TemplatePreset::LabelFirst => LABEL_TEMPLATE,
        }
    }

    /// Look up a preset by its configuration name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "audiophile" | "default" => Some(TemplatePreset::Audiophile),
            "simple" => Some(TemplatePreset::Simple),
            "label" | "label_first" => Some(TemplatePreset::LabelFirst),
            _ => None,
        }
    }
}

impl From<TemplatePreset> for PathTemplate {
    fn from(preset: TemplatePreset) -> Self {
        PathTemplate::new(preset.template())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_fields() -> TagFields {
        TagFields {
            title: Some("Bohemian Rhapsody".to_string()),
            artist: Some("Queen".to_string()),
            album: Some("A Night at the Opera".to_string()),
            album_artist: Some("Queen".to_string()),
            track_number: Some(11),
            disc_number: Some(1),
            year: Some(1975),
            label: Some("EMI".to_string()),
            ..TagFields::default()
        }
    }

    #[test]
    fn test_default_template() {
        let template = PathTemplate::default();
        let path = template.resolve(&test_fields(), Path::new("/path/to/song.flac"));

        assert_eq!(
            path,
            PathBuf::from("Queen/1975 - A Night at the Opera/11 - Bohemian Rhapsody.flac")
        );
    }

    #[test]
    fn test_simple_template() {
        let template = PathTemplate::new(SIMPLE_TEMPLATE);
        let path = template.resolve(&test_fields(), Path::new("/path/to/song.flac"));

        assert_eq!(
            path,
            PathBuf::from("Queen/A Night at the Opera/11 - Bohemian Rhapsody.flac")
        );
    }

    #[test]
    fn test_label_template() {
        let template = PathTemplate::new(LABEL_TEMPLATE);
        let path = template.resolve(&test_fields(), Path::new("/path/to/song.flac"));

        assert_eq!(
            path,
            PathBuf::from("EMI/Queen/A Night at the Opera/11 - Bohemian Rhapsody.flac")
        );
    }

    #[test]
    fn test_fallback_values() {
        let template = PathTemplate::default();
        let fields = TagFields {
            album: Some("  ".to_string()),
            ..TagFields::default()
        };
        let path = template.resolve(&fields, Path::new("/path/to/original_song.mp3"));

        assert_eq!(
            path,
            PathBuf::from("Unknown Artist/0000 - Unknown Album/00 - original_song.mp3")
        );
    }

    #[test]
    fn test_singleton_template() {
        let template = PathTemplate::default();
        let fields = TagFields {
            title: Some("Loose Track".to_string()),
            artist: Some("Someone".to_string()),
            ..TagFields::default()
        };
        let path = template.resolve(&fields, Path::new("/in/x.ogg"));

        assert_eq!(path, PathBuf::from("Someone/Singles/Loose Track.ogg"));
    }

    #[test]
    fn test_album_artist_fallback() {
        let template = PathTemplate::default();
        let mut fields = test_fields();
        fields.album_artist = None;

        let path = template.resolve(&fields, Path::new("/path/to/song.flac"));

        let components: Vec<_> = path.components().collect();
        assert_eq!(components[0].as_os_str().to_string_lossy(), "Queen");
    }

    #[test]
    fn test_multi_disc_album() {
        let template = PathTemplate::default();
        let mut fields = test_fields();
        fields.disc_number = Some(2);

        let path = template.resolve(&fields, Path::new("/path/to/song.flac"));
        assert!(path.to_string_lossy().contains("Disc 2"));

        // Disc 1 of a two-disc set also gets a folder
        fields.disc_number = Some(1);
        fields.disc_total = Some(2);
        let path = template.resolve(&fields, Path::new("/path/to/song.flac"));
        assert!(path.to_string_lossy().contains("Disc 1"));
    }

    #[test]
    fn test_compilation_album() {
        let template = PathTemplate::default();
        let mut fields = test_fields();
        fields.album_artist = Some("Various Artists".to_string());
        fields.artist = Some("Freddie Mercury".to_string());

        let path = template.resolve(&fields, Path::new("/path/to/song.flac"));
        let filename = path.file_name().unwrap().to_string_lossy();
        assert_eq!(filename, "11 - Freddie Mercury - Bohemian Rhapsody.flac");
    }

    #[test]
    fn test_sanitize_path_component() {
        assert_eq!(sanitize_path_component("Valid Name"), "Valid Name");
        assert_eq!(sanitize_path_component("Artist/Album"), "Artist_Album");
        assert_eq!(sanitize_path_component("Song: The Remix"), "Song_ The Remix");
        assert_eq!(sanitize_path_component("A<B>C"), "A_B_C");
        assert_eq!(sanitize_path_component("  Trimmed  "), "Trimmed");
        assert_eq!(sanitize_path_component("trailing..."), "trailing");
        assert_eq!(sanitize_path_component("CON"), "_CON");
        assert_eq!(sanitize_path_component(""), "_");
    }

    #[test]
    fn test_value_with_slash_stays_in_one_component() {
        let template = PathTemplate::default();
        let mut fields = test_fields();
        fields.album = Some("AC/DC Live".to_string());

        let path = template.resolve(&fields, Path::new("/x.flac"));
        assert_eq!(path.components().count(), 3);
        assert!(path.to_string_lossy().contains("1975 - AC_DC Live"));
    }

    #[test]
    fn test_preset_lookup() {
        let template: PathTemplate = TemplatePreset::Audiophile.into();
        assert_eq!(template.template(), DEFAULT_TEMPLATE);
        assert_eq!(TemplatePreset::from_name("simple"), Some(TemplatePreset::Simple));
        assert_eq!(TemplatePreset::from_name("Label"), Some(TemplatePreset::LabelFirst));
        assert_eq!(TemplatePreset::from_name("nope"), None);
    }

    #[test]
    fn test_disable_disc_folder() {
        let template = PathTemplate::default().with_disc_folder(false);
        let mut fields = test_fields();
        fields.disc_number = Some(2);

        let path = template.resolve(&fields, Path::new("/path/to/song.flac"));
        assert!(!path.to_string_lossy().contains("Disc"));
    }
}
