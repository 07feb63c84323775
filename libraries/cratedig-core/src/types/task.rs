/// Import task and its lifecycle
use crate::error::{DigError, Result};
use crate::types::{Chosen, EntryId, Identity, Match, TrackRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Lifecycle state of an [`ImportTask`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Grouped,
    Searching,
    AwaitingDecision,
    DuplicateCheck,
    Applying,
    Done,
    Skipped,
    Aborted,
    Failed,
}

impl TaskState {
    /// `Done`, `Skipped` and `Aborted` accept no further transition
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Done | TaskState::Skipped | TaskState::Aborted)
    }

    /// Terminal, or `Failed`
    pub fn is_finished(self) -> bool {
        self.is_terminal() || self == TaskState::Failed
    }

    /// Whether `self -> next` is a legal edge
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;

        if self.is_terminal() {
            return false;
        }
        // Any live state can be aborted or fail
        if matches!(next, Aborted | Failed) {
            return self != Failed;
        }
        matches!(
            (self, next),
            (Pending, Grouped)
                | (Grouped, Searching)
                | (Searching, AwaitingDecision | DuplicateCheck)
                | (AwaitingDecision, DuplicateCheck | Searching | Skipped)
                | (DuplicateCheck, Applying | Skipped | Searching)
                | (Applying, Done)
                | (Failed, Grouped)
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Grouped => "grouped",
            TaskState::Searching => "searching",
            TaskState::AwaitingDecision => "awaiting_decision",
            TaskState::DuplicateCheck => "duplicate_check",
            TaskState::Applying => "applying",
            TaskState::Done => "done",
            TaskState::Skipped => "skipped",
            TaskState::Aborted => "aborted",
            TaskState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Stable identifier of a group across runs
///
/// The directory path for albums (parent + shared prefix for merged
/// multi-disc groups), the file path for singletons.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupKey(String);

impl GroupKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of the `index`-th child when a task is split into singletons
    pub fn child(&self, index: usize) -> Self {
        Self(format!("{}#{}", self.0, index + 1))
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Where a split child came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOrigin {
    pub parent: GroupKey,
    pub index: usize,
    pub count: usize,
}

/// One unit of work flowing through the pipeline
#[derive(Debug, Clone)]
pub struct ImportTask {
    /// Group key
    pub key: GroupKey,

    /// Local tracks in group order
    pub tracks: Vec<TrackRecord>,

    /// Album task (false for singletons)
    pub is_album: bool,

    /// Catalog entries removed when this task is applied (after a merge)
    pub replaces: Vec<EntryId>,

    /// Set on children of an `AsSingletons` split
    pub origin: Option<SplitOrigin>,

    state: TaskState,
    candidates: Vec<Match>,
    selection: Option<Chosen>,
    chosen: Option<Chosen>,
}

impl ImportTask {
    /// New album task in `Pending`
    pub fn album(key: GroupKey, tracks: Vec<TrackRecord>) -> Self {
        Self::build(key, tracks, true)
    }

    /// New singleton task in `Pending`
    pub fn singleton(key: GroupKey, track: TrackRecord) -> Self {
        Self::build(key, vec![track], false)
    }

    fn build(key: GroupKey, tracks: Vec<TrackRecord>, is_album: bool) -> Self {
        Self {
            key,
            tracks,
            is_album,
            replaces: Vec::new(),
            origin: None,
            state: TaskState::Pending,
            candidates: Vec::new(),
            selection: None,
            chosen: None,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Move to `next`, rejecting illegal edges
    pub fn transition(&mut self, next: TaskState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(DigError::InvalidTransition {
                key: self.key.to_string(),
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Ranked candidate list
    pub fn candidates(&self) -> &[Match] {
        &self.candidates
    }

    /// Replace the candidate list
    pub fn set_candidates(&mut self, ranked: Vec<Match>) {
        self.candidates = ranked;
    }

    /// Top-ranked candidate
    pub fn best(&self) -> Option<&Match> {
        self.candidates.first()
    }

    /// Tentative outcome picked by a decision, replaced by later decisions
    pub fn select(&mut self, chosen: Chosen) {
        self.selection = Some(chosen);
    }

    /// Drop the tentative outcome (e.g. before re-matching a merged group)
    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    pub fn selection(&self) -> Option<&Chosen> {
        self.selection.as_ref()
    }

    /// Freeze the selection as the chosen outcome and enter `Applying`
    ///
    /// Can succeed once per task.
    pub fn commit_choice(&mut self) -> Result<()> {
        if self.chosen.is_some() {
            return Err(DigError::ChoiceAlreadyMade(self.key.to_string()));
        }
        let Some(selection) = self.selection.take() else {
            return Err(DigError::InvalidInput(format!(
                "no outcome selected for {}",
                self.key
            )));
        };
        self.transition(TaskState::Applying)?;
        self.chosen = Some(selection);
        Ok(())
    }

    /// Committed outcome
    pub fn chosen(&self) -> Option<&Chosen> {
        self.chosen.as_ref()
    }

    /// Most common non-empty value of a field across tracks
    ///
    /// Ties go to the value seen first.
    pub fn consensus<F>(&self, field: F) -> Option<String>
    where
        F: Fn(&TrackRecord) -> Option<&str>,
    {
        let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
        for (order, value) in self
            .tracks
            .iter()
            .filter_map(|t| field(t))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .enumerate()
        {
            counts.entry(value).or_insert((0, order)).0 += 1;
        }
        counts
            .into_iter()
            .max_by(|a, b| a.1 .0.cmp(&b.1 .0).then(b.1 .1.cmp(&a.1 .1)))
            .map(|(value, _)| value.to_string())
    }

    /// Identity the task will occupy in the catalog once applied
    pub fn identity(&self) -> Identity {
        let fields = match &self.chosen.as_ref().or(self.selection.as_ref()) {
            Some(Chosen::Match(m)) => Some(m.candidate.identity_parts()),
            _ => None,
        };
        if self.is_album {
            let (artist, album) = fields.unwrap_or_else(|| {
                (
                    self.consensus(|t| t.effective_album_artist())
                        .unwrap_or_default(),
                    self.consensus(|t| t.album.as_deref()).unwrap_or_default(),
                )
            });
            Identity::Album { artist, album }
        } else {
            let (artist, title) = fields.unwrap_or_else(|| {
                let track = self.tracks.first();
                (
                    track.and_then(|t| t.artist.clone()).unwrap_or_default(),
                    track.map(TrackRecord::display_title).unwrap_or_default(),
                )
            });
            Identity::Item { artist, title }
        }
    }

    /// Split an album task into one singleton child per track
    ///
    /// Children start in `Grouped`.
    pub fn split(&self) -> Vec<ImportTask> {
        let count = self.tracks.len();
        self.tracks
            .iter()
            .enumerate()
            .map(|(index, track)| {
                let mut child = ImportTask::singleton(self.key.child(index), track.clone());
                child.state = TaskState::Grouped;
                child.origin = Some(SplitOrigin {
                    parent: self.key.clone(),
                    index,
                    count,
                });
                child
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Alignment, Candidate, Distance, TrackCandidate};
    use std::sync::Arc;

    fn track(path: &str, artist: &str, album: &str) -> TrackRecord {
        let mut t = TrackRecord::new(path);
        t.artist = Some(artist.to_string());
        t.album = Some(album.to_string());
        t
    }

    fn walk_to(task: &mut ImportTask, states: &[TaskState]) {
        for s in states {
            task.transition(*s).unwrap();
        }
    }

    #[test]
    fn happy_path_transitions() {
        let mut task = ImportTask::album(GroupKey::new("/a"), vec![track("/a/1.mp3", "A", "B")]);
        walk_to(
            &mut task,
            &[
                TaskState::Grouped,
                TaskState::Searching,
                TaskState::AwaitingDecision,
                TaskState::DuplicateCheck,
            ],
        );
        task.select(Chosen::AsIs);
        task.commit_choice().unwrap();
        assert_eq!(task.state(), TaskState::Applying);
        task.transition(TaskState::Done).unwrap();
    }

    #[test]
    fn terminal_states_reject_transitions() {
        for terminal in [TaskState::Done, TaskState::Skipped, TaskState::Aborted] {
            for next in [
                TaskState::Grouped,
                TaskState::Searching,
                TaskState::Failed,
                TaskState::Aborted,
                TaskState::Done,
            ] {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn illegal_transition_is_an_error() {
        let mut task = ImportTask::singleton(GroupKey::new("/x.mp3"), TrackRecord::new("/x.mp3"));
        let err = task.transition(TaskState::Applying).unwrap_err();
        assert!(matches!(
            err,
            DigError::InvalidTransition {
                from: TaskState::Pending,
                to: TaskState::Applying,
                ..
            }
        ));
        assert_eq!(task.state(), TaskState::Pending);
    }

    #[test]
    fn choice_is_committed_once() {
        let mut task = ImportTask::singleton(GroupKey::new("/x.mp3"), TrackRecord::new("/x.mp3"));
        walk_to(
            &mut task,
            &[TaskState::Grouped, TaskState::Searching, TaskState::DuplicateCheck],
        );

        // Nothing selected yet
        assert!(task.commit_choice().is_err());

        task.select(Chosen::AsIs);
        task.commit_choice().unwrap();
        task.select(Chosen::AsIs);
        assert!(matches!(task.commit_choice(), Err(DigError::ChoiceAlreadyMade(_))));
    }

    #[test]
    fn set_candidates_replaces_list() {
        let mut task = ImportTask::singleton(GroupKey::new("/x.mp3"), TrackRecord::new("/x.mp3"));
        let m = Match {
            candidate: Candidate::Track(Arc::new(TrackCandidate::default())),
            alignment: Alignment::default(),
            distance: Distance::new(),
            partial: false,
        };
        task.set_candidates(vec![m.clone(), m.clone()]);
        task.set_candidates(vec![m]);
        assert_eq!(task.candidates().len(), 1);
    }

    #[test]
    fn consensus_prefers_most_common_then_first_seen() {
        let task = ImportTask::album(
            GroupKey::new("/a"),
            vec![
                track("/a/1.mp3", "Solo", "X"),
                track("/a/2.mp3", "Band", "X"),
                track("/a/3.mp3", "Band", "X"),
                track("/a/4.mp3", "Other", "Y"),
            ],
        );
        assert_eq!(task.consensus(|t| t.artist.as_deref()).as_deref(), Some("Band"));
        assert_eq!(task.consensus(|t| t.album.as_deref()).as_deref(), Some("X"));

        let tie = ImportTask::album(
            GroupKey::new("/b"),
            vec![track("/b/1.mp3", "First", "Z"), track("/b/2.mp3", "Second", "Z")],
        );
        assert_eq!(tie.consensus(|t| t.artist.as_deref()).as_deref(), Some("First"));
    }

    #[test]
    fn split_creates_grouped_children() {
        let task = ImportTask::album(
            GroupKey::new("/a"),
            vec![track("/a/1.mp3", "A", "B"), track("/a/2.mp3", "A", "B")],
        );
        let children = task.split();
        assert_eq!(children.len(), 2);
        assert_eq!(children[1].key.as_str(), "/a#2");
        assert!(!children[0].is_album);
        assert_eq!(children[0].state(), TaskState::Grouped);
        assert_eq!(children[1].origin.as_ref().unwrap().count, 2);
    }
}
