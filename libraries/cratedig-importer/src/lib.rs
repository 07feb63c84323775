//! Crate Digger Importer
//!
//! Takes a directory tree of audio files, groups them into albums and
//! singletons, matches each group against metadata sources, asks for a
//! decision when the match is weak, and applies the result to the library.
//!
//! # Architecture
//!
//! - `grouping`: Walks the tree and builds album/singleton tasks
//! - `collector`: Queries metadata sources for candidates
//! - `alignment` / `distance`: Order-preserving track alignment and weighted scoring
//! - `matching`: Ranking and the auto-accept recommendation
//! - `coordinator`: Decisions and duplicate resolution
//! - `apply`: Tag writing, file transfer and the catalog commit
//! - `journal`: Append-only resume journal
//! - `importer`: Staged pipeline connecting everything above
//!
//! # Example
//!
//! ```rust,no_run
//! use cratedig_importer::{ImportConfig, MusicImporter, QuietDecider};
//! # async fn run(
//! #     codec: std::sync::Arc<dyn cratedig_core::TagCodec>,
//! #     catalog: std::sync::Arc<dyn cratedig_core::CatalogStore>,
//! # ) -> cratedig_importer::Result<()> {
//! let config = ImportConfig::default();
//! let decider = std::sync::Arc::new(QuietDecider::from_config(&config));
//! let importer = MusicImporter::new(config, codec, catalog, decider)?;
//! let summary = importer.run(std::path::Path::new("/incoming")).await?;
//! println!("{}", summary.summary_text());
//! # Ok(())
//! # }
//! ```

mod error;
mod types;

pub mod alignment;
pub mod apply;
pub mod collector;
pub mod config;
pub mod coordinator;
pub mod decision;
pub mod distance;
pub mod grouping;
pub mod importer;
pub mod journal;
pub mod matching;
pub mod path_template;
pub mod transfer;

pub use config::{
    DistanceWeights, FileManagementStrategy, ImportConfig, MatchConfig, QuietFallback,
};
pub use decision::QuietDecider;
pub use error::ImportError;
pub use importer::{AbortSignal, MusicImporter};
pub use path_template::PathTemplate;
pub use types::*;

/// Re-export commonly used types
pub type Result<T> = std::result::Result<T, ImportError>;
