//! Decisions and duplicate resolution
//!
//! The coordinator is a single worker, so at most one task waits for an
//! answer from the decision source at any time. It hands every task on
//! either ready to apply (`Applying`) or finished.

use crate::collector::CandidateCollector;
use crate::config::ImportConfig;
use crate::importer::AbortSignal;
use crate::journal::JournalSnapshot;
use crate::matching::{recommend, score_and_rank, Recommendation};
use crate::{transfer, ImportError};
use cratedig_core::{
    ApplyStep, CatalogEntry, CatalogStore, Chosen, DecisionSource, DuplicateDecision, EntryId, ImportTask,
    ManualQuery, MatchDecision, TaskState,
};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A task leaving the coordinator
#[derive(Debug)]
pub struct Resolved {
    pub task: ImportTask,

    /// Why the task failed, when it did
    pub failure: Option<ImportError>,
}

impl Resolved {
    fn ok(task: ImportTask) -> Self {
        Self {
            task,
            failure: None,
        }
    }
}

enum Settled {
    Task(Resolved),
    Split(Vec<ImportTask>),
}

enum DuplicateOutcome {
    Proceed,
    Finished,
    Research,
}

pub struct Coordinator {
    config: Arc<ImportConfig>,
    collector: Arc<CandidateCollector>,
    catalog: Arc<dyn CatalogStore>,
    decider: Arc<dyn DecisionSource>,
    journal: Arc<JournalSnapshot>,
    abort: AbortSignal,
}

impl Coordinator {
    pub fn new(
        config: Arc<ImportConfig>,
        collector: Arc<CandidateCollector>,
        catalog: Arc<dyn CatalogStore>,
        decider: Arc<dyn DecisionSource>,
        journal: Arc<JournalSnapshot>,
        abort: AbortSignal,
    ) -> Self {
        Self {
            config,
            collector,
            catalog,
            decider,
            journal,
            abort,
        }
    }

    /// Settle a searched task
    ///
    /// Returns one entry per task leaving the coordinator: the task itself,
    /// or the children of a split album in track order.
    pub async fn resolve(&self, task: ImportTask) -> Vec<Resolved> {
        let mut out = Vec::new();
        let mut queue = VecDeque::from([task]);

        while let Some(mut task) = queue.pop_front() {
            if task.state() == TaskState::Grouped && !self.abort.is_raised() {
                if let Err(e) = self.search(&mut task, None).await {
                    out.push(self.fail(task, e).await);
                    continue;
                }
            }
            match self.settle(task).await {
                Settled::Task(resolved) => out.push(resolved),
                Settled::Split(children) => {
                    for child in children.into_iter().rev() {
                        queue.push_front(child);
                    }
                }
            }
        }
        out
    }

    /// Run a search and replace the task's candidate list
    pub async fn search(
        &self,
        task: &mut ImportTask,
        query: Option<&ManualQuery>,
    ) -> Result<(), ImportError> {
        task.transition(TaskState::Searching)?;
        let candidates = match query {
            Some(query) => self.collector.collect_manual(task, query).await,
            None => self.collector.collect(task).await,
        };
        let ranked = score_and_rank(task, candidates, &self.config.matching);
        task.set_candidates(ranked);
        Ok(())
    }

    async fn settle(&self, mut task: ImportTask) -> Settled {
        loop {
            if self.abort.is_raised() {
                return Settled::Task(self.aborted(task));
            }

            match self.choose(&mut task).await {
                Ok(Some(children)) => return Settled::Split(children),
                Ok(None) => {}
                Err(e) => return Settled::Task(self.fail(task, e).await),
            }
            if task.state().is_terminal() {
                return Settled::Task(Resolved::ok(task));
            }

            match self.check_duplicates(&mut task).await {
                Ok(DuplicateOutcome::Proceed) => {
                    if self.abort.is_raised() {
                        return Settled::Task(self.aborted(task));
                    }
                    if let Err(e) = task.commit_choice() {
                        return Settled::Task(self.fail(task, e.into()).await);
                    }
                    debug!(key = %task.key, "Ready to apply");
                    return Settled::Task(Resolved::ok(task));
                }
                Ok(DuplicateOutcome::Finished) => return Settled::Task(Resolved::ok(task)),
                Ok(DuplicateOutcome::Research) => {}
                Err(e) => return Settled::Task(self.fail(task, e).await),
            }
        }
    }

    /// Pick an outcome, leaving the task in `DuplicateCheck` or terminal
    ///
    /// Returns the children when the decision splits the task. Results of a
    /// manual search are always put to the decision source.
    async fn choose(&self, task: &mut ImportTask) -> Result<Option<Vec<ImportTask>>, ImportError> {
        match recommend(task.candidates(), &self.config.matching) {
            Recommendation::Strong => {
                if let Some(best) = task.best().cloned() {
                    info!(key = %task.key, distance = %best.distance, "Auto-accepted match");
                    task.select(Chosen::Match(Box::new(best)));
                    task.transition(TaskState::DuplicateCheck)?;
                    return Ok(None);
                }
            }
            Recommendation::Review(reason) => {
                debug!(key = %task.key, %reason, "Match needs a decision");
            }
        }

        task.transition(TaskState::AwaitingDecision)?;
        loop {
            if self.abort.is_raised() {
                task.transition(TaskState::Aborted)?;
                return Ok(None);
            }

            let decision = self.decider.choose_match(task, task.candidates()).await;
            debug!(key = %task.key, ?decision, "Decision");
            match decision {
                MatchDecision::ApplyBest => {
                    let chosen = match task.best() {
                        Some(best) => Chosen::Match(Box::new(best.clone())),
                        None => {
                            warn!(key = %task.key, "No candidates to apply, importing as-is");
                            Chosen::AsIs
                        }
                    };
                    task.select(chosen);
                }
                MatchDecision::ApplyCandidate(index) => {
                    let Some(picked) = task.candidates().get(index).cloned() else {
                        warn!(
                            key = %task.key,
                            index,
                            candidates = task.candidates().len(),
                            "Candidate index out of range, asking again"
                        );
                        continue;
                    };
                    task.select(Chosen::Match(Box::new(picked)));
                }
                MatchDecision::UseAsIs => task.select(Chosen::AsIs),
                MatchDecision::AsSingletons => {
                    if !task.is_album {
                        warn!(key = %task.key, "Task is already a singleton, asking again");
                        continue;
                    }
                    info!(key = %task.key, tracks = task.tracks.len(), "Splitting into singletons");
                    return Ok(Some(task.split()));
                }
                MatchDecision::ManualSearch(query) => {
                    task.clear_selection();
                    self.search(task, Some(&query)).await?;
                    task.transition(TaskState::AwaitingDecision)?;
                    continue;
                }
                MatchDecision::Skip => {
                    info!(key = %task.key, "Skipped by decision");
                    task.transition(TaskState::Skipped)?;
                    return Ok(None);
                }
                MatchDecision::Abort => {
                    info!(key = %task.key, "Import aborted by decision");
                    task.transition(TaskState::Aborted)?;
                    self.abort.raise();
                    return Ok(None);
                }
            }

            task.transition(TaskState::DuplicateCheck)?;
            return Ok(None);
        }
    }

    /// Look for existing entries with the task's identity
    async fn check_duplicates(&self, task: &mut ImportTask) -> Result<DuplicateOutcome, ImportError> {
        // A failed earlier attempt that committed would find its own rows
        if self
            .journal
            .completed_steps(&task.key)
            .contains(&ApplyStep::CatalogCommit)
        {
            debug!(key = %task.key, "Rows committed by an earlier attempt, skipping duplicate check");
            return Ok(DuplicateOutcome::Proceed);
        }

        let identity = task.identity();
        let existing: Vec<CatalogEntry> = self
            .catalog
            .find_duplicates(&identity)
            .await?
            .into_iter()
            .filter(|e| !task.replaces.contains(&e.id))
            .collect();

        if existing.is_empty() {
            return Ok(DuplicateOutcome::Proceed);
        }

        if self.abort.is_raised() {
            task.transition(TaskState::Aborted)?;
            return Ok(DuplicateOutcome::Finished);
        }

        info!(key = %task.key, %identity, existing = existing.len(), "Duplicate found");
        match self.decider.resolve_duplicate(task, &existing).await {
            DuplicateDecision::SkipNew => {
                task.transition(TaskState::Skipped)?;
                Ok(DuplicateOutcome::Finished)
            }
            DuplicateDecision::KeepBoth => Ok(DuplicateOutcome::Proceed),
            DuplicateDecision::RemoveOld => {
                self.remove_old(task, &existing).await?;
                Ok(DuplicateOutcome::Proceed)
            }
            DuplicateDecision::Merge if !task.is_album => {
                // Singletons are replaced inside the apply transaction
                task.replaces.extend(existing.iter().map(|e| e.id));
                Ok(DuplicateOutcome::Proceed)
            }
            DuplicateDecision::Merge => {
                self.merge(task, &existing).await?;
                Ok(DuplicateOutcome::Research)
            }
        }
    }

    /// Delete existing entries and their files in one transaction
    async fn remove_old(&self, task: &ImportTask, existing: &[CatalogEntry]) -> Result<(), ImportError> {
        let mut tx = self.catalog.transaction().await?;
        let mut removed = Vec::new();
        for entry in existing {
            match tx.remove(entry.id).await {
                Ok(paths) => removed.extend(paths),
                Err(e) => {
                    tx.rollback().await?;
                    return Err(e.into());
                }
            }
        }
        tx.commit().await?;

        // Never delete the files being imported
        let incoming: HashSet<_> = task.tracks.iter().map(|t| t.path.as_path()).collect();
        removed.retain(|p| !incoming.contains(p.as_path()));
        transfer::remove_files(&removed);

        info!(key = %task.key, removed = existing.len(), files = removed.len(), "Removed old entries");
        Ok(())
    }

    /// Fold existing entries' tracks into the task and search again
    async fn merge(&self, task: &mut ImportTask, existing: &[CatalogEntry]) -> Result<(), ImportError> {
        let known: HashSet<_> = task.tracks.iter().map(|t| t.path.clone()).collect();
        let mut added = 0;
        for entry in existing {
            let tracks = match entry.id {
                EntryId::Album(id) => self.catalog.album_items(id).await?,
                EntryId::Item(id) => self.catalog.item(id).await?.into_iter().collect(),
            };
            for track in tracks.into_iter().filter(|t| !known.contains(&t.path)) {
                task.tracks.push(track);
                added += 1;
            }
            task.replaces.push(entry.id);
        }
        task.tracks
            .sort_by_key(|t| (t.disc_number.unwrap_or(1), t.track_number.unwrap_or(u32::MAX)));
        info!(key = %task.key, added, "Merging with existing entries");

        task.clear_selection();
        self.search(task, None).await
    }

    fn aborted(&self, mut task: ImportTask) -> Resolved {
        if !task.state().is_finished() {
            if let Err(e) = task.transition(TaskState::Aborted) {
                warn!(key = %task.key, error = %e, "Could not abort task");
            }
        }
        debug!(key = %task.key, "Task aborted");
        Resolved::ok(task)
    }

    async fn fail(&self, mut task: ImportTask, err: ImportError) -> Resolved {
        error!(key = %task.key, error = %err, "Task failed");
        if let Err(e) = task.transition(TaskState::Failed) {
            warn!(key = %task.key, error = %e, "Could not mark task failed");
        }
        self.decider.task_failed(&task, &err).await;
        Resolved {
            task,
            failure: Some(err),
        }
    }
}
