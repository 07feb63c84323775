//! Grouping of audio files into import tasks
//!
//! A directory holding audio files is one album-sized group. Sibling
//! directories named like `Disc 1`, `Album (CD2)` or `Foo vol.3` that share a
//! prefix are merged into a single multi-disc group. In singleton mode every
//! file is its own group.
//!
//! Discovery walks the tree when [`Grouper::tasks`] is called; tags are read
//! only when the returned iterator is advanced.

use crate::{ImportError, Result};
use cratedig_core::{normalize_text, GroupKey, ImportTask, TagCodec, TaskState, TrackRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Supported audio file extensions
const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "opus", "wav", "m4a", "aac", "aif", "aiff", "wma", "ape",
];

/// Matches disc directory names: "CD1", "Disc 2", "Album (Disk 03)", "Foo - vol.2"
static DISC_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(.*?)[\s._\-\[(]*\b(?:disc|disk|cd|part|vol(?:ume)?)[\s._\-]*(\d+)[\])]*\s*$")
        .unwrap()
});

/// Check if a file is a supported audio file
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Split a directory name into its shared prefix and disc number
pub fn parse_disc_marker(name: &str) -> Option<(String, u32)> {
    let caps = DISC_MARKER.captures(name)?;
    let number = caps.get(2)?.as_str().parse().ok()?;
    let prefix = caps.get(1).map_or("", |m| m.as_str());
    Some((normalize_text(prefix), number))
}

/// A discovered group before its tags are read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupPlan {
    pub key: GroupKey,
    pub files: Vec<PathBuf>,
    pub is_album: bool,
}

/// Walks a root path and yields import tasks
pub struct Grouper {
    root: PathBuf,
    codec: Arc<dyn TagCodec>,
    singletons: bool,
    follow_links: bool,
    skip: HashSet<GroupKey>,
}

impl Grouper {
    /// Create a grouper for `root`
    pub fn new(root: impl Into<PathBuf>, codec: Arc<dyn TagCodec>) -> Self {
        Self {
            root: root.into(),
            codec,
            singletons: false,
            follow_links: false,
            skip: HashSet::new(),
        }
    }

    /// Emit one task per file instead of grouping
    pub fn singletons(mut self, singletons: bool) -> Self {
        self.singletons = singletons;
        self
    }

    /// Set whether to follow symbolic links
    pub fn follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    /// Keys that must not be emitted (settled in a previous run)
    pub fn skip_keys(mut self, keys: HashSet<GroupKey>) -> Self {
        self.skip = keys;
        self
    }

    /// Walk the tree and compute groups, in scan order
    pub fn discover(&self) -> Result<Vec<GroupPlan>> {
        if !self.root.exists() {
            return Err(ImportError::FileNotFound(self.root.display().to_string()));
        }

        if self.root.is_file() {
            if !is_audio_file(&self.root) {
                return Err(ImportError::InvalidPath(format!(
                    "{} is not a supported audio file",
                    self.root.display()
                )));
            }
            return Ok(vec![GroupPlan {
                key: key_for(&self.root),
                files: vec![self.root.clone()],
                is_album: false,
            }]);
        }

        // Files per directory, directories in first-seen order
        let mut dir_order: Vec<PathBuf> = Vec::new();
        let mut by_dir: HashMap<PathBuf, Vec<PathBuf>> = HashMap::new();

        let walker = WalkDir::new(&self.root)
            .follow_links(self.follow_links)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_file() || !is_audio_file(path) {
                continue;
            }
            let dir = path.parent().unwrap_or(&self.root).to_path_buf();
            by_dir
                .entry(dir.clone())
                .or_insert_with(|| {
                    dir_order.push(dir);
                    Vec::new()
                })
                .push(path.to_path_buf());
        }

        let plans = if self.singletons {
            dir_order
                .iter()
                .flat_map(|dir| by_dir.remove(dir).unwrap_or_default())
                .map(|file| GroupPlan {
                    key: key_for(&file),
                    files: vec![file],
                    is_album: false,
                })
                .collect()
        } else {
            merge_discs(dir_order, by_dir)
        };

        debug!(root = %self.root.display(), groups = plans.len(), "Discovered groups");
        Ok(plans)
    }

    /// Lazy sequence of tasks
    ///
    /// Each call walks the tree again and yields the same order.
    pub fn tasks(&self) -> Result<Tasks<'_>> {
        let plans: Vec<GroupPlan> = self
            .discover()?
            .into_iter()
            .filter(|plan| {
                let settled = self.skip.contains(&plan.key);
                if settled {
                    debug!(key = %plan.key, "Skipping group settled in a previous run");
                }
                !settled
            })
            .collect();

        Ok(Tasks {
            grouper: self,
            plans: plans.into_iter(),
        })
    }

    /// Read tags for a plan; `None` when no file was readable
    fn load(&self, plan: GroupPlan) -> Option<ImportTask> {
        let mut tracks: Vec<TrackRecord> = Vec::with_capacity(plan.files.len());
        for path in &plan.files {
            match self.codec.read(path) {
                Ok(record) => tracks.push(record),
                Err(e) => {
                    let err = ImportError::Validation {
                        path: path.clone(),
                        message: e.to_string(),
                    };
                    warn!(key = %plan.key, error = %err, "Dropping unreadable file");
                }
            }
        }

        if tracks.is_empty() {
            warn!(key = %plan.key, "Group has no readable files");
            return None;
        }

        let mut task = if plan.is_album {
            ImportTask::album(plan.key, tracks)
        } else {
            let track = tracks.remove(0);
            ImportTask::singleton(plan.key, track)
        };
        if let Err(e) = task.transition(TaskState::Grouped) {
            warn!(key = %task.key, error = %e, "Could not mark task grouped");
            return None;
        }
        Some(task)
    }
}

/// Iterator over tasks, reading tags on demand
pub struct Tasks<'a> {
    grouper: &'a Grouper,
    plans: std::vec::IntoIter<GroupPlan>,
}

impl Iterator for Tasks<'_> {
    type Item = ImportTask;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let plan = self.plans.next()?;
            if let Some(task) = self.grouper.load(plan) {
                return Some(task);
            }
        }
    }
}

fn key_for(path: &Path) -> GroupKey {
    GroupKey::new(path.to_string_lossy())
}

/// Merge sibling disc directories that share a prefix
///
/// A merged group is keyed by the parent plus the shared prefix. Audio files
/// sitting directly in the directory with that path (loose files next to
/// `CD1`/`CD2` when the prefix is empty) join the merged group ahead of the
/// discs, so no two groups share a key.
fn merge_discs(
    dir_order: Vec<PathBuf>,
    mut by_dir: HashMap<PathBuf, Vec<PathBuf>>,
) -> Vec<GroupPlan> {
    // (parent, normalized prefix) -> member directories with disc numbers
    let mut disc_sets: HashMap<(PathBuf, String), Vec<(u32, PathBuf)>> = HashMap::new();
    for dir in &dir_order {
        let marker = dir
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_disc_marker);
        if let (Some((prefix, number)), Some(parent)) = (marker, dir.parent()) {
            disc_sets
                .entry((parent.to_path_buf(), prefix))
                .or_default()
                .push((number, dir.clone()));
        }
    }
    disc_sets.retain(|_, members| members.len() > 1);

    let mut member_of: HashMap<PathBuf, (PathBuf, String)> = HashMap::new();
    let mut set_paths: HashMap<(PathBuf, String), PathBuf> = HashMap::new();
    for (set_key, members) in &mut disc_sets {
        members.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        for (_, dir) in members.iter() {
            member_of.insert(dir.clone(), set_key.clone());
        }

        let shared = members
            .first()
            .and_then(|(_, d)| d.file_name())
            .and_then(|n| n.to_str())
            .and_then(raw_prefix)
            .unwrap_or_default();
        let (parent, _) = set_key;
        let key_path = if shared.is_empty() {
            parent.clone()
        } else {
            parent.join(shared)
        };
        set_paths.insert(set_key.clone(), key_path);
    }
    // Loose files at a merged group's own path belong to that group
    let mut loose_of: HashMap<(PathBuf, String), PathBuf> = HashMap::new();
    for (set_key, key_path) in &set_paths {
        if by_dir.contains_key(key_path) && !member_of.contains_key(key_path) {
            member_of.insert(key_path.clone(), set_key.clone());
            loose_of.insert(set_key.clone(), key_path.clone());
        }
    }

    let mut plans = Vec::new();
    let mut emitted: HashSet<(PathBuf, String)> = HashSet::new();
    for dir in dir_order {
        let Some(set_key) = member_of.get(&dir) else {
            if let Some(files) = by_dir.remove(&dir) {
                plans.push(GroupPlan {
                    key: key_for(&dir),
                    files,
                    is_album: true,
                });
            }
            continue;
        };

        // The merged group sits where its first directory was seen
        if !emitted.insert(set_key.clone()) {
            continue;
        }
        let Some(key_path) = set_paths.get(set_key) else {
            continue;
        };

        let mut files: Vec<PathBuf> = loose_of
            .get(set_key)
            .and_then(|loose| by_dir.remove(loose))
            .unwrap_or_default();
        if let Some(members) = disc_sets.get(set_key) {
            for (_, d) in members {
                files.extend(by_dir.remove(d).unwrap_or_default());
            }
        }
        plans.push(GroupPlan {
            key: key_for(key_path),
            files,
            is_album: true,
        });
    }
    plans
}

/// Prefix of a disc directory name as written (not normalized)
fn raw_prefix(name: &str) -> Option<String> {
    let caps = DISC_MARKER.captures(name)?;
    Some(caps.get(1).map_or("", |m| m.as_str()).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cratedig_core::TagFields;
    use std::fs;
    use tempfile::TempDir;

    /// Codec that treats every file as readable unless its name contains "bad"
    struct NameCodec;

    impl TagCodec for NameCodec {
        fn read(&self, path: &Path) -> cratedig_core::Result<TrackRecord> {
            if path.to_string_lossy().contains("bad") {
                return Err(cratedig_core::DigError::metadata("unreadable"));
            }
            let mut record = TrackRecord::new(path);
            record.title = path.file_stem().map(|s| s.to_string_lossy().into_owned());
            Ok(record)
        }

        fn write(&self, _path: &Path, _fields: &TagFields) -> cratedig_core::Result<()> {
            Ok(())
        }
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    fn grouper(root: &Path) -> Grouper {
        Grouper::new(root, Arc::new(NameCodec))
    }

    #[test]
    fn test_is_audio_file() {
        assert!(is_audio_file(Path::new("test.mp3")));
        assert!(is_audio_file(Path::new("test.MP3")));
        assert!(is_audio_file(Path::new("test.aiff")));
        assert!(is_audio_file(Path::new("test.ape")));
        assert!(!is_audio_file(Path::new("cover.jpg")));
        assert!(!is_audio_file(Path::new("test")));
    }

    #[test]
    fn test_parse_disc_marker() {
        assert_eq!(parse_disc_marker("CD1"), Some((String::new(), 1)));
        assert_eq!(parse_disc_marker("Disc 2"), Some((String::new(), 2)));
        assert_eq!(
            parse_disc_marker("The Wall (Disk 02)"),
            Some(("the wall".to_string(), 2))
        );
        assert_eq!(
            parse_disc_marker("Anthology - vol.3"),
            Some(("anthology".to_string(), 3))
        );
        assert_eq!(parse_disc_marker("Part 1"), Some((String::new(), 1)));
        assert_eq!(parse_disc_marker("Discovery"), None);
        assert_eq!(parse_disc_marker("Abbey Road"), None);
    }

    #[test]
    fn one_group_per_directory_in_name_order() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("b_album/02.mp3"));
        touch(&temp.path().join("b_album/01.mp3"));
        touch(&temp.path().join("a_album/01.flac"));
        touch(&temp.path().join("a_album/cover.jpg"));

        let plans = grouper(temp.path()).discover().unwrap();
        assert_eq!(plans.len(), 2);
        assert!(plans[0].key.as_str().ends_with("a_album"));
        assert_eq!(plans[0].files.len(), 1);
        assert!(plans[1].files[0].ends_with("01.mp3"));
        assert!(plans.iter().all(|p| p.is_album));
    }

    #[test]
    fn disc_directories_are_merged() {
        let temp = TempDir::new().unwrap();
        let album = temp.path().join("Artist - Album");
        touch(&album.join("CD2/01.mp3"));
        touch(&album.join("CD1/01.mp3"));
        touch(&album.join("CD1/02.mp3"));
        touch(&temp.path().join("Other/01.mp3"));

        let plans = grouper(temp.path()).discover().unwrap();
        assert_eq!(plans.len(), 2);

        let merged = &plans[0];
        assert_eq!(merged.key, key_for(&album));
        assert_eq!(merged.files.len(), 3);
        assert!(merged.files[0].ends_with("CD1/01.mp3"));
        assert!(merged.files[2].ends_with("CD2/01.mp3"));
    }

    #[test]
    fn loose_files_next_to_discs_join_the_merged_group() {
        let temp = TempDir::new().unwrap();
        let album = temp.path().join("Album");
        touch(&album.join("00 bonus.mp3"));
        touch(&album.join("CD1/01.mp3"));
        touch(&album.join("CD2/01.mp3"));
        touch(&album.join("zz hidden track.mp3"));

        let plans = grouper(temp.path()).discover().unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].key, key_for(&album));
        assert_eq!(plans[0].files.len(), 4);
        assert!(plans[0].files[0].ends_with("00 bonus.mp3"));
        assert!(plans[0].files[1].ends_with("zz hidden track.mp3"));
        assert!(plans[0].files[3].ends_with("CD2/01.mp3"));
    }

    #[test]
    fn group_keys_are_unique() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("Album/00 bonus.mp3"));
        touch(&temp.path().join("Album/CD1/01.mp3"));
        touch(&temp.path().join("Album/CD2/01.mp3"));
        touch(&temp.path().join("Wall/intro.mp3"));
        touch(&temp.path().join("Wall (Disc 1)/a.mp3"));
        touch(&temp.path().join("Wall (Disc 2)/b.mp3"));

        let plans = grouper(temp.path()).discover().unwrap();
        let keys: HashSet<&GroupKey> = plans.iter().map(|p| &p.key).collect();
        assert_eq!(keys.len(), plans.len());
        assert_eq!(plans.iter().map(|p| p.files.len()).sum::<usize>(), 6);

        let wall = plans
            .iter()
            .find(|p| p.key == key_for(&temp.path().join("Wall")))
            .unwrap();
        assert_eq!(wall.files.len(), 3);
    }

    #[test]
    fn prefixed_disc_directories_merge_by_prefix() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("Wall (Disc 1)/a.mp3"));
        touch(&temp.path().join("Wall (Disc 2)/b.mp3"));
        touch(&temp.path().join("Other Disc 1/c.mp3"));

        let plans = grouper(temp.path()).discover().unwrap();
        assert_eq!(plans.len(), 2);
        let wall = plans.iter().find(|p| p.files.len() == 2).unwrap();
        assert_eq!(wall.key, key_for(&temp.path().join("Wall")));
        // Lone disc directory stays its own group
        assert!(plans.iter().any(|p| p.key.as_str().ends_with("Other Disc 1")));
    }

    #[test]
    fn disc_order_is_numeric() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("Disc 10/z.mp3"));
        touch(&temp.path().join("Disc 9/y.mp3"));

        let plans = grouper(temp.path()).discover().unwrap();
        assert_eq!(plans.len(), 1);
        assert!(plans[0].files[0].ends_with("Disc 9/y.mp3"));
    }

    #[test]
    fn singleton_mode_emits_one_task_per_file() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("a/1.mp3"));
        touch(&temp.path().join("a/2.mp3"));

        let g = grouper(temp.path()).singletons(true);
        let tasks: Vec<_> = g.tasks().unwrap().collect();
        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(|t| !t.is_album && t.tracks.len() == 1));
        assert!(tasks[0].key.as_str().ends_with("1.mp3"));
    }

    #[test]
    fn unreadable_files_are_dropped_and_empty_groups_vanish() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("ok/1.mp3"));
        touch(&temp.path().join("ok/bad.mp3"));
        touch(&temp.path().join("zz_broken/bad1.mp3"));

        let tasks: Vec<_> = grouper(temp.path()).tasks().unwrap().collect();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].tracks.len(), 1);
        assert_eq!(tasks[0].state(), TaskState::Grouped);
    }

    #[test]
    fn settled_keys_are_skipped() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("a/1.mp3"));
        touch(&temp.path().join("b/1.mp3"));

        let skip: HashSet<GroupKey> = [key_for(&temp.path().join("a"))].into_iter().collect();
        let tasks: Vec<_> = grouper(temp.path()).skip_keys(skip).tasks().unwrap().collect();
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].key.as_str().ends_with('b'));
    }

    #[test]
    fn tasks_is_restartable() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("a/1.mp3"));
        touch(&temp.path().join("b/1.mp3"));

        let g = grouper(temp.path());
        let first: Vec<_> = g.tasks().unwrap().map(|t| t.key).collect();
        let second: Vec<_> = g.tasks().unwrap().map(|t| t.key).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_root_is_an_error() {
        let g = grouper(Path::new("/definitely/not/here"));
        assert!(matches!(g.discover(), Err(ImportError::FileNotFound(_))));
    }
}
