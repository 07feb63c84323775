//! Resume journal
//!
//! One JSON object per line, appended and synced after each task settles.
//! Later lines for the same key override earlier ones.

use crate::{ImportError, Result};
use cratedig_core::{ApplyStep, DigError, GroupKey, Outcome, ResumeEntry};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// In-memory view of the journal as it was at start-up
#[derive(Debug, Clone, Default)]
pub struct JournalSnapshot {
    entries: HashMap<GroupKey, ResumeEntry>,
}

impl JournalSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load a journal file; a missing file is an empty journal
    ///
    /// # Errors
    /// `CorruptJournal` for any malformed line except an unterminated last
    /// line, which is an interrupted write and is ignored.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No journal yet");
                return Ok(Self::empty());
            }
            Err(e) => return Err(e.into()),
        };

        let mut lines: Vec<&str> = content.split('\n').collect();
        // Text after the last newline was never completed
        if let Some(tail) = lines.pop() {
            if !tail.trim().is_empty() {
                warn!(
                    path = %path.display(),
                    line = lines.len() + 1,
                    "Ignoring interrupted journal write"
                );
            }
        }

        let mut entries = HashMap::new();
        for (index, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: ResumeEntry =
                serde_json::from_str(line).map_err(|e| ImportError::CorruptJournal {
                    path: path.to_path_buf(),
                    line: index + 1,
                    message: e.to_string(),
                })?;
            entries.insert(entry.key.clone(), entry);
        }

        debug!(path = %path.display(), groups = entries.len(), "Loaded journal");
        Ok(Self { entries })
    }

    pub fn get(&self, key: &GroupKey) -> Option<&ResumeEntry> {
        self.entries.get(key)
    }

    /// Keys whose last outcome was `Done` or `Skipped`
    pub fn settled_keys(&self) -> HashSet<GroupKey> {
        self.entries
            .values()
            .filter(|e| e.outcome.is_settled())
            .map(|e| e.key.clone())
            .collect()
    }

    /// Sub-steps a failed attempt already completed
    pub fn completed_steps(&self, key: &GroupKey) -> &[ApplyStep] {
        match self.entries.get(key) {
            Some(entry) if entry.outcome == Outcome::Failed => &entry.completed_steps,
            _ => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Appends entries to the journal file
pub struct JournalWriter {
    file: File,
    path: PathBuf,
}

impl JournalWriter {
    /// Open for appending, dropping an unterminated last line
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let mut content = Vec::new();
        file.read_to_end(&mut content)?;
        let keep = content
            .iter()
            .rposition(|b| *b == b'\n')
            .map_or(0, |pos| pos + 1);
        if keep < content.len() {
            warn!(path = %path.display(), "Truncating interrupted journal write");
            file.set_len(keep as u64)?;
        }
        file.seek(SeekFrom::Start(keep as u64))?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Append one entry and flush it to disk
    pub fn append(&mut self, entry: &ResumeEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry).map_err(DigError::from)?;
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        self.file.sync_data()?;
        debug!(key = %entry.key, outcome = %entry.outcome, "Journaled outcome");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
