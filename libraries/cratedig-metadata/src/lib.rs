//! Crate Digger Metadata
//!
//! Tag reading and writing for audio files, backed by lofty.
//!
//! This crate provides [`LoftyTagCodec`], the default [`TagCodec`] used by the
//! importer: it snapshots embedded tags into a `TrackRecord` and writes
//! resolved fields back.
//!
//! # Example
//!
//! ```rust,no_run
//! use cratedig_core::TagCodec;
//! use cratedig_metadata::LoftyTagCodec;
//! use std::path::Path;
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let codec = LoftyTagCodec::new();
//! let record = codec.read(Path::new("/music/song.mp3"))?;
//! println!("{}", record.display_title());
//! # Ok(())
//! # }
//! ```
//!
//! [`TagCodec`]: cratedig_core::TagCodec

mod codec;
mod error;

pub use codec::LoftyTagCodec;
pub use error::{MetadataError, Result};
