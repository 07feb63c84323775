/// Notifications emitted after a successful import
use crate::types::{EntryId, GroupKey, Identity};
use std::path::PathBuf;

/// A committed import, passed to every registered observer
#[derive(Debug, Clone, PartialEq)]
pub struct ImportEvent {
    pub key: GroupKey,
    pub identity: Identity,

    /// Rows written by the commit
    pub entries: Vec<EntryId>,

    /// Rows removed by the commit (merge)
    pub replaced: Vec<EntryId>,

    /// Final location of every file
    pub paths: Vec<PathBuf>,

    /// Existing tags were kept
    pub as_is: bool,
}
