//! File transfers into the library
//!
//! Copies are hash-verified. A destination that already holds identical
//! content counts as transferred unless the catalog still owns that file.

use crate::config::FileManagementStrategy;
use crate::{ImportError, Result};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Buffer size for hashing (64KB)
const BUFFER_SIZE: usize = 64 * 1024;

/// How a file reached its destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Copied during this apply
    Copied,

    /// Destination already held identical, unowned content
    AlreadyPresent,

    /// File stays where it is
    InPlace,
}

/// One file's transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub source: PathBuf,
    pub dest: PathBuf,
    pub placement: Placement,
}

/// Compute SHA256 hash of a file
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Copy a file with optional verification
///
/// A copy that does not hash to its source is deleted.
pub fn copy_file_verified(source: &Path, dest: &Path, verify: bool) -> Result<()> {
    let source_hash = if verify {
        Some(compute_file_hash(source)?)
    } else {
        None
    };

    fs::copy(source, dest)?;

    if let Some(expected_hash) = source_hash {
        let actual_hash = compute_file_hash(dest)?;
        if expected_hash != actual_hash {
            if let Err(e) = fs::remove_file(dest) {
                warn!(path = %dest.display(), error = %e, "Could not remove corrupt copy");
            }
            return Err(ImportError::VerificationFailed(dest.to_path_buf()));
        }
        debug!(path = %dest.display(), "File verification passed");
    }

    Ok(())
}

/// Place `source` at `dest`
///
/// An occupied destination with the same content is reused unless it is in
/// `claimed` (files catalog entries still point at). Any other occupied
/// destination gets a " (n)" suffix.
pub fn place(
    source: &Path,
    dest: &Path,
    strategy: FileManagementStrategy,
    verify: bool,
    claimed: &HashSet<PathBuf>,
) -> Result<Transfer> {
    if strategy == FileManagementStrategy::Reference || source == dest {
        return Ok(Transfer {
            source: source.to_path_buf(),
            dest: source.to_path_buf(),
            placement: Placement::InPlace,
        });
    }

    let mut source_hash: Option<String> = None;
    let mut target = dest.to_path_buf();
    let mut counter = 0;
    while target.exists() {
        if claimed.contains(&target) {
            counter += 1;
            target = numbered(dest, counter)?;
            continue;
        }
        let hash = match &source_hash {
            Some(hash) => hash.clone(),
            None => {
                let hash = compute_file_hash(source)?;
                source_hash = Some(hash.clone());
                hash
            }
        };
        if compute_file_hash(&target)? == hash {
            debug!(path = %target.display(), "Destination already holds this file");
            return Ok(Transfer {
                source: source.to_path_buf(),
                dest: target,
                placement: Placement::AlreadyPresent,
            });
        }
        counter += 1;
        target = numbered(dest, counter)?;
    }

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    copy_file_verified(source, &target, verify)?;
    debug!(from = %source.display(), to = %target.display(), "Copied file");

    Ok(Transfer {
        source: source.to_path_buf(),
        dest: target,
        placement: Placement::Copied,
    })
}

/// "name (n).ext" next to `dest`
fn numbered(dest: &Path, counter: u32) -> Result<PathBuf> {
    if counter >= 1000 {
        return Err(ImportError::InvalidPath(format!(
            "Could not resolve filename conflict for {} after 1000 attempts",
            dest.display()
        )));
    }
    let stem = dest
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ImportError::InvalidPath(format!("Invalid filename: {}", dest.display())))?;
    let name = match dest.extension().and_then(|s| s.to_str()) {
        Some(ext) => format!("{stem} ({counter}).{ext}"),
        None => format!("{stem} ({counter})"),
    };
    Ok(dest.with_file_name(name))
}

/// Delete files copied by an apply that did not commit
pub fn undo(transfers: &[Transfer]) {
    for transfer in transfers.iter().filter(|t| t.placement == Placement::Copied) {
        if let Err(e) = fs::remove_file(&transfer.dest) {
            warn!(path = %transfer.dest.display(), error = %e, "Could not remove uncommitted copy");
        }
    }
}

/// Delete the sources of moved files
///
/// Returns the first failure; remaining sources are still attempted.
pub fn remove_sources(transfers: &[Transfer]) -> Result<()> {
    let sources: Vec<PathBuf> = transfers
        .iter()
        .filter(|t| t.placement != Placement::InPlace && t.source != t.dest)
        .map(|t| t.source.clone())
        .collect();
    remove_source_files(&sources)
}

/// Delete source files whose library copies are committed
///
/// Already missing files are fine.
pub fn remove_source_files(sources: &[PathBuf]) -> Result<()> {
    let mut first_error = None;
    for source in sources {
        match fs::remove_file(source) {
            Ok(()) => debug!(path = %source.display(), "Removed source"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %source.display(), error = %e, "Could not remove source");
                first_error.get_or_insert(e);
            }
        }
    }
    match first_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

/// Delete files of a removed catalog entry
pub fn remove_files(paths: &[PathBuf]) {
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "Removed file of replaced entry"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Could not remove file"),
        }
    }
}
