//! Apply stage
//!
//! Commits a task's chosen outcome as ordered sub-steps: file transfers, tag
//! writes on the placed files, the catalog commit and (for moves) source
//! removal. A failure rolls the catalog transaction back and deletes files
//! copied by this attempt; only steps whose effects survive are reported as
//! completed. Sub-steps a previous failed attempt completed are not repeated.

use crate::config::{FileManagementStrategy, ImportConfig};
use crate::distance::LocalAlbum;
use crate::journal::JournalSnapshot;
use crate::transfer::{self, Transfer};
use crate::{ImportError, Result};
use cratedig_core::{
    AlbumCandidate, ApplyStep, CatalogStore, CatalogTransaction, Chosen, EntryId, ImportEvent,
    ImportObserver, ImportTask, Match, NewAlbum, PathFormatter, TagCodec, TagFields,
    TrackCandidate, TrackRecord,
};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Result of a committed task
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub entries: Vec<EntryId>,
    pub paths: Vec<PathBuf>,
    pub completed: Vec<ApplyStep>,
}

/// A failed apply with the sub-steps that did complete
#[derive(Debug)]
pub struct ApplyFailure {
    pub error: ImportError,
    pub completed: Vec<ApplyStep>,
}

pub struct Applier {
    config: Arc<ImportConfig>,
    catalog: Arc<dyn CatalogStore>,
    codec: Arc<dyn TagCodec>,
    formatter: Arc<dyn PathFormatter>,
    observers: Vec<Arc<dyn ImportObserver>>,
    journal: Arc<JournalSnapshot>,
}

impl Applier {
    pub fn new(
        config: Arc<ImportConfig>,
        catalog: Arc<dyn CatalogStore>,
        codec: Arc<dyn TagCodec>,
        formatter: Arc<dyn PathFormatter>,
        observers: Vec<Arc<dyn ImportObserver>>,
        journal: Arc<JournalSnapshot>,
    ) -> Self {
        Self {
            config,
            catalog,
            codec,
            formatter,
            observers,
            journal,
        }
    }

    /// Apply a task in `Applying`
    pub async fn apply(&self, task: &ImportTask) -> std::result::Result<Applied, ApplyFailure> {
        let previous = self.journal.completed_steps(&task.key);
        if !previous.is_empty() {
            info!(key = %task.key, steps = ?previous, "Retrying failed task");
        }

        let chosen = task.chosen().cloned().unwrap_or(Chosen::AsIs);
        if previous.contains(&ApplyStep::CatalogCommit) {
            return self.finish_committed(task, &chosen);
        }

        let mut completed = Vec::new();
        let fields = resolve_fields(task, &chosen);
        let records: Vec<TrackRecord> = task
            .tracks
            .iter()
            .zip(&fields)
            .map(|(track, f)| track.with_fields(f))
            .collect();

        // TransferFiles
        let transfers = match self.transfer(task, &records).await {
            Ok(transfers) => transfers,
            Err(error) => return Err(ApplyFailure { error, completed }),
        };
        completed.push(ApplyStep::TransferFiles);

        // WriteTags, on the library copies so sources stay untouched
        if self.config.write_tags && !previous.contains(&ApplyStep::WriteTags) {
            if let Err(error) = self.write_tags(task, &transfers, &fields).await {
                transfer::undo(&transfers);
                return Err(ApplyFailure {
                    error,
                    completed: self.surviving_undo(&completed),
                });
            }
        }
        completed.push(ApplyStep::WriteTags);

        let placed: Vec<TrackRecord> = records
            .iter()
            .zip(&transfers)
            .map(|(record, t)| record.relocated(&t.dest))
            .collect();
        let paths: Vec<PathBuf> = transfers.iter().map(|t| t.dest.clone()).collect();

        // CatalogCommit
        let entries = match self.commit(task, &chosen, &placed).await {
            Ok(entries) => entries,
            Err(error) => {
                transfer::undo(&transfers);
                return Err(ApplyFailure {
                    error,
                    completed: self.surviving_undo(&completed),
                });
            }
        };
        completed.push(ApplyStep::CatalogCommit);

        // RemoveSources
        if self.config.file_strategy == FileManagementStrategy::Move {
            if let Err(e) = transfer::remove_sources(&transfers) {
                let error = ImportError::apply(&task.key, ApplyStep::RemoveSources, None, e);
                return Err(ApplyFailure { error, completed });
            }
            completed.push(ApplyStep::RemoveSources);
        }

        self.notify(task, &chosen, &entries, &paths);
        Ok(Applied {
            entries,
            paths,
            completed,
        })
    }

    /// Finish a task whose catalog rows a previous attempt committed
    ///
    /// Only source removal can be outstanding.
    fn finish_committed(
        &self,
        task: &ImportTask,
        chosen: &Chosen,
    ) -> std::result::Result<Applied, ApplyFailure> {
        debug!(key = %task.key, "Catalog rows already committed");
        let mut completed = vec![
            ApplyStep::TransferFiles,
            ApplyStep::WriteTags,
            ApplyStep::CatalogCommit,
        ];
        if self.config.file_strategy == FileManagementStrategy::Move {
            let sources: Vec<PathBuf> = task.tracks.iter().map(|t| t.path.clone()).collect();
            if let Err(e) = transfer::remove_source_files(&sources) {
                let error = ImportError::apply(&task.key, ApplyStep::RemoveSources, None, e);
                return Err(ApplyFailure { error, completed });
            }
            completed.push(ApplyStep::RemoveSources);
        }

        self.notify(task, chosen, &[], &[]);
        Ok(Applied {
            entries: Vec::new(),
            paths: Vec::new(),
            completed,
        })
    }

    /// Steps whose effects are still on disk after `transfer::undo`
    fn surviving_undo(&self, completed: &[ApplyStep]) -> Vec<ApplyStep> {
        if self.config.file_strategy == FileManagementStrategy::Reference {
            completed.to_vec()
        } else {
            Vec::new()
        }
    }

    fn notify(&self, task: &ImportTask, chosen: &Chosen, entries: &[EntryId], paths: &[PathBuf]) {
        let event = ImportEvent {
            key: task.key.clone(),
            identity: task.identity(),
            entries: entries.to_vec(),
            replaced: task.replaces.clone(),
            paths: paths.to_vec(),
            as_is: matches!(chosen, Chosen::AsIs),
        };
        for observer in &self.observers {
            observer.on_import(&event);
        }
        info!(key = %task.key, identity = %event.identity, files = paths.len(), "Imported");
    }

    async fn write_tags(
        &self,
        task: &ImportTask,
        transfers: &[Transfer],
        fields: &[TagFields],
    ) -> Result<()> {
        let codec = Arc::clone(&self.codec);
        let key = task.key.clone();
        let jobs: Vec<(PathBuf, TagFields)> = transfers
            .iter()
            .zip(fields)
            .filter(|(_, f)| !f.is_empty())
            .map(|(t, f)| (t.dest.clone(), f.clone()))
            .collect();

        tokio::task::spawn_blocking(move || {
            for (path, fields) in &jobs {
                codec.write(path, fields).map_err(|e| {
                    ImportError::apply(&key, ApplyStep::WriteTags, Some(path.as_path()), e)
                })?;
            }
            debug!(key = %key, files = jobs.len(), "Wrote tags");
            Ok(())
        })
        .await?
    }

    /// Library files no other entry may share
    ///
    /// Files of entries this task replaces are free for reuse.
    async fn claimed_paths(&self, task: &ImportTask, dests: &[PathBuf]) -> Result<HashSet<PathBuf>> {
        let step_err = |e: cratedig_core::DigError| {
            ImportError::apply(&task.key, ApplyStep::TransferFiles, None, e)
        };

        let dirs: BTreeSet<&Path> = dests.iter().filter_map(|d| d.parent()).collect();
        let mut claimed = HashSet::new();
        for dir in dirs {
            claimed.extend(self.catalog.paths_under(dir).await.map_err(step_err)?);
        }
        for replaced in &task.replaces {
            let tracks = match *replaced {
                EntryId::Album(id) => self.catalog.album_items(id).await.map_err(step_err)?,
                EntryId::Item(id) => self
                    .catalog
                    .item(id)
                    .await
                    .map_err(step_err)?
                    .into_iter()
                    .collect(),
            };
            for track in tracks {
                claimed.remove(&track.path);
            }
        }
        Ok(claimed)
    }

    async fn transfer(&self, task: &ImportTask, records: &[TrackRecord]) -> Result<Vec<Transfer>> {
        let key = task.key.clone();
        let strategy = self.config.file_strategy;
        let verify = self.config.verify_transfers;
        let jobs: Vec<(PathBuf, PathBuf)> = records
            .iter()
            .map(|r| {
                let relative = self.formatter.format(&r.fields(), &r.path);
                (r.path.clone(), self.config.library_path.join(relative))
            })
            .collect();

        let mut claimed = if strategy == FileManagementStrategy::Reference {
            HashSet::new()
        } else {
            let dests: Vec<PathBuf> = jobs.iter().map(|(_, dest)| dest.clone()).collect();
            self.claimed_paths(task, &dests).await?
        };

        tokio::task::spawn_blocking(move || {
            let mut done: Vec<Transfer> = Vec::with_capacity(jobs.len());
            for (source, dest) in &jobs {
                match transfer::place(source, dest, strategy, verify, &claimed) {
                    Ok(t) => {
                        claimed.insert(t.dest.clone());
                        done.push(t);
                    }
                    Err(e) => {
                        transfer::undo(&done);
                        return Err(ImportError::apply(
                            &key,
                            ApplyStep::TransferFiles,
                            Some(source.as_path()),
                            e,
                        ));
                    }
                }
            }
            Ok(done)
        })
        .await?
    }

    async fn commit(
        &self,
        task: &ImportTask,
        chosen: &Chosen,
        placed: &[TrackRecord],
    ) -> Result<Vec<EntryId>> {
        let step_err = |e: cratedig_core::DigError| {
            ImportError::apply(&task.key, ApplyStep::CatalogCommit, None, e)
        };

        let mut tx = self.catalog.transaction().await.map_err(step_err)?;
        match write_rows(tx.as_mut(), task, chosen, placed).await {
            Ok(entries) => {
                tx.commit().await.map_err(step_err)?;
                Ok(entries)
            }
            Err(e) => {
                error!(key = %task.key, error = %e, "Rolling back catalog transaction");
                if let Err(rollback) = tx.rollback().await {
                    error!(key = %task.key, error = %rollback, "Rollback failed");
                }
                Err(step_err(e))
            }
        }
    }
}

async fn write_rows(
    tx: &mut dyn CatalogTransaction,
    task: &ImportTask,
    chosen: &Chosen,
    placed: &[TrackRecord],
) -> cratedig_core::Result<Vec<EntryId>> {
    for replaced in &task.replaces {
        tx.remove(*replaced).await?;
    }
    if task.is_album {
        let album = new_album(task, chosen);
        let id = tx.add_album(&album, placed).await?;
        Ok(vec![EntryId::Album(id)])
    } else {
        let ids = tx.add(placed).await?;
        Ok(ids.into_iter().map(EntryId::Item).collect())
    }
}

/// Album row for an album task
fn new_album(task: &ImportTask, chosen: &Chosen) -> NewAlbum {
    if let Chosen::Match(m) = chosen {
        if let cratedig_core::Candidate::Album(album) = &m.candidate {
            return NewAlbum {
                album_artist: album.artist.clone(),
                album: album.album.clone(),
                year: album.year,
                label: album.label.clone(),
                album_id: Some(album.id.clone()).filter(|id| !id.is_empty()),
            };
        }
    }
    let local = LocalAlbum::from_tracks(&task.tracks);
    NewAlbum {
        album_artist: local.artist.unwrap_or_default(),
        album: local.album.unwrap_or_default(),
        year: local.year,
        label: local.label,
        album_id: local.album_id,
    }
}

/// Tag values each local track receives
///
/// As-is imports keep every field; matches fill in the candidate's values.
pub fn resolve_fields(task: &ImportTask, chosen: &Chosen) -> Vec<TagFields> {
    let Chosen::Match(m) = chosen else {
        return vec![TagFields::default(); task.tracks.len()];
    };
    match &m.candidate {
        cratedig_core::Candidate::Album(album) => (0..task.tracks.len())
            .map(|i| album_fields(album, m, i))
            .collect(),
        cratedig_core::Candidate::Track(track) => {
            let mut fields = vec![TagFields::default(); task.tracks.len()];
            if let Some(first) = fields.first_mut() {
                *first = track_fields(track);
            }
            fields
        }
    }
}

fn album_fields(album: &AlbumCandidate, m: &Match, local: usize) -> TagFields {
    let mut fields = TagFields {
        album: Some(album.album.clone()),
        album_artist: Some(album.artist.clone()),
        year: album.year,
        label: album.label.clone(),
        catalog_number: album.catalog_number.clone(),
        album_id: Some(album.id.clone()).filter(|id| !id.is_empty()),
        disc_total: album.mediums,
        ..TagFields::default()
    };

    let paired = m
        .alignment
        .candidate_for(local)
        .and_then(|j| album.tracks.get(j));
    if let Some(track) = paired {
        fields.title = Some(track.title.clone());
        fields.artist = Some(track.artist.clone().unwrap_or_else(|| album.artist.clone()));
        fields.track_number = track.track_number;
        fields.disc_number = track.medium;
        fields.track_id = track.id.clone();
        fields.track_total = Some(
            album
                .tracks
                .iter()
                .filter(|t| t.medium == track.medium)
                .count() as u32,
        );
    }
    fields
}

fn track_fields(track: &TrackCandidate) -> TagFields {
    TagFields {
        title: Some(track.title.clone()),
        artist: track.artist.clone(),
        album: track.album.clone(),
        year: track.year,
        track_id: Some(track.id.clone()).filter(|id| !id.is_empty()),
        ..TagFields::default()
    }
}
