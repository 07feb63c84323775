//! Pipeline executor - connects grouping, search, scoring, decisions and apply
//!
//! Each stage is a single worker joined to the next by a bounded channel, so
//! tasks keep scan order end to end and a slow stage throttles the ones
//! before it.

use crate::apply::Applier;
use crate::collector::CandidateCollector;
use crate::coordinator::{Coordinator, Resolved};
use crate::grouping::Grouper;
use crate::journal::{JournalSnapshot, JournalWriter};
use crate::matching::score_and_rank;
use crate::path_template::{PathTemplate, TemplatePreset};
use crate::{ImportConfig, ImportError, ImportProgress, ImportSummary, Result, TaskReport};
use cratedig_core::{
    Candidate, CatalogStore, Chosen, DecisionSource, GroupKey, ImportObserver, ImportTask,
    MetadataSource, Outcome, PathFormatter, ResumeEntry, TagCodec, TaskState,
};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Shared flag that stops an import
///
/// Raised by an `Abort` decision or from outside (e.g. Ctrl-C). Grouping
/// stops, tasks already in flight drain as `Aborted`.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        if !self.0.swap(true, Ordering::SeqCst) {
            info!("Abort requested");
        }
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Music importer orchestrator
pub struct MusicImporter {
    config: Arc<ImportConfig>,
    codec: Arc<dyn TagCodec>,
    catalog: Arc<dyn CatalogStore>,
    decider: Arc<dyn DecisionSource>,
    collector: CandidateCollector,
    formatter: Arc<dyn PathFormatter>,
    observers: Vec<Arc<dyn ImportObserver>>,
    progress: Option<mpsc::Sender<ImportProgress>>,
    abort: AbortSignal,
}

impl MusicImporter {
    /// Create a new music importer
    ///
    /// # Errors
    /// Returns `Config` when the configuration is out of range.
    pub fn new(
        config: ImportConfig,
        codec: Arc<dyn TagCodec>,
        catalog: Arc<dyn CatalogStore>,
        decider: Arc<dyn DecisionSource>,
    ) -> Result<Self> {
        config.validate()?;
        let formatter = Arc::new(
            TemplatePreset::from_name(&config.path_template)
                .map_or_else(|| PathTemplate::new(&config.path_template), PathTemplate::from),
        );
        Ok(Self {
            collector: CandidateCollector::new(config.search_timeout()),
            config: Arc::new(config),
            codec,
            catalog,
            decider,
            formatter,
            observers: Vec::new(),
            progress: None,
            abort: AbortSignal::new(),
        })
    }

    /// Register a metadata source; registration order is source priority
    pub fn with_source(mut self, source: Arc<dyn MetadataSource>) -> Self {
        self.collector.register(source);
        self
    }

    /// Replace the destination path formatter
    pub fn with_formatter(mut self, formatter: Arc<dyn PathFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    /// Add an observer, called after every commit in registration order
    pub fn with_observer(mut self, observer: Arc<dyn ImportObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Receive a progress update after every finished group
    pub fn with_progress(mut self, tx: mpsc::Sender<ImportProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Use an externally owned abort signal
    pub fn with_abort_signal(mut self, abort: AbortSignal) -> Self {
        self.abort = abort;
        self
    }

    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    /// Import everything under `root`
    ///
    /// # Errors
    /// Fails before any task is processed when the journal is corrupt or the
    /// root cannot be walked. Task failures are reported in the summary.
    pub async fn run(&self, root: &Path) -> Result<ImportSummary> {
        let start_time = Instant::now();
        let config = Arc::clone(&self.config);

        let snapshot = Arc::new(JournalSnapshot::load(&config.journal_path)?);
        let writer = JournalWriter::open(&config.journal_path)?;

        let skip: HashSet<GroupKey> = if config.resume && !config.force_reprocess {
            snapshot.settled_keys()
        } else {
            HashSet::new()
        };
        info!(
            root = %root.display(),
            journaled = snapshot.len(),
            skipping = skip.len(),
            sources = self.collector.source_count(),
            "Starting import"
        );

        let grouper = Grouper::new(root, Arc::clone(&self.codec))
            .singletons(config.singletons)
            .skip_keys(skip);

        let capacity = config.queue_capacity;
        let (grouped_tx, grouped_rx) = mpsc::channel::<ImportTask>(capacity);
        let (found_tx, found_rx) = mpsc::channel::<(ImportTask, Vec<Candidate>)>(capacity);
        let (scored_tx, scored_rx) = mpsc::channel::<ImportTask>(capacity);
        let (resolved_tx, mut resolved_rx) = mpsc::channel::<Resolved>(capacity);

        let collector = Arc::new(self.collector.clone());

        let scanner = {
            let abort = self.abort.clone();
            tokio::task::spawn_blocking(move || scan_stage(&grouper, &grouped_tx, &abort))
        };
        let searcher = tokio::spawn(search_stage(
            Arc::clone(&collector),
            self.abort.clone(),
            grouped_rx,
            found_tx,
        ));
        let scorer = tokio::spawn(score_stage(Arc::clone(&config), found_rx, scored_tx));
        let coordinator = Coordinator::new(
            Arc::clone(&config),
            collector,
            Arc::clone(&self.catalog),
            Arc::clone(&self.decider),
            Arc::clone(&snapshot),
            self.abort.clone(),
        );
        let coordinating = tokio::spawn(coordinate_stage(coordinator, scored_rx, resolved_tx));

        let applier = Applier::new(
            Arc::clone(&config),
            Arc::clone(&self.catalog),
            Arc::clone(&self.codec),
            Arc::clone(&self.formatter),
            self.observers.clone(),
            snapshot,
        );

        let mut finisher = Finisher {
            applier,
            decider: Arc::clone(&self.decider),
            abort: self.abort.clone(),
            writer,
            progress_tx: self.progress.clone(),
            progress: ImportProgress::default(),
            split: None,
            reports: Vec::new(),
        };
        let mut fatal: Option<ImportError> = None;
        while let Some(resolved) = resolved_rx.recv().await {
            if let Err(e) = finisher.finish(resolved).await {
                error!(error = %e, "Could not record outcome, stopping import");
                self.abort.raise();
                fatal = Some(e);
                break;
            }
        }
        drop(resolved_rx);
        let reports = finisher.reports;

        let scanned = scanner.await?;
        searcher.await?;
        scorer.await?;
        coordinating.await?;
        if let Some(e) = fatal {
            return Err(e);
        }
        let scanned = scanned?;

        let summary = ImportSummary {
            reports,
            aborted: self.abort.is_raised(),
            duration_seconds: start_time.elapsed().as_secs(),
        };
        info!(
            groups = scanned,
            done = summary.count(Outcome::Done),
            skipped = summary.count(Outcome::Skipped),
            aborted = summary.count(Outcome::Aborted),
            failed = summary.count(Outcome::Failed),
            "{}",
            summary.summary_text()
        );
        Ok(summary)
    }
}

/// Emit tasks until the tree is exhausted or the import is aborted
fn scan_stage(
    grouper: &Grouper,
    tx: &mpsc::Sender<ImportTask>,
    abort: &AbortSignal,
) -> Result<usize> {
    let mut emitted = 0;
    for task in grouper.tasks()? {
        if abort.is_raised() {
            debug!("Grouping stopped by abort");
            break;
        }
        debug!(key = %task.key, tracks = task.tracks.len(), "Grouped");
        if tx.blocking_send(task).is_err() {
            break;
        }
        emitted += 1;
    }
    Ok(emitted)
}

async fn search_stage(
    collector: Arc<CandidateCollector>,
    abort: AbortSignal,
    mut rx: mpsc::Receiver<ImportTask>,
    tx: mpsc::Sender<(ImportTask, Vec<Candidate>)>,
) {
    while let Some(mut task) = rx.recv().await {
        let mut candidates = Vec::new();
        if !abort.is_raised() {
            match task.transition(TaskState::Searching) {
                Ok(()) => {
                    candidates = collector
                        .collect(&task)
                        .instrument(info_span!("search", key = %task.key))
                        .await;
                }
                Err(e) => warn!(key = %task.key, error = %e, "Task not ready for search"),
            }
        }
        debug!(key = %task.key, candidates = candidates.len(), "Searched");
        if tx.send((task, candidates)).await.is_err() {
            break;
        }
    }
}

async fn score_stage(
    config: Arc<ImportConfig>,
    mut rx: mpsc::Receiver<(ImportTask, Vec<Candidate>)>,
    tx: mpsc::Sender<ImportTask>,
) {
    while let Some((mut task, candidates)) = rx.recv().await {
        if task.state() == TaskState::Searching {
            let ranked = score_and_rank(&task, candidates, &config.matching);
            task.set_candidates(ranked);
        }
        if tx.send(task).await.is_err() {
            break;
        }
    }
}

async fn coordinate_stage(
    coordinator: Coordinator,
    mut rx: mpsc::Receiver<ImportTask>,
    tx: mpsc::Sender<Resolved>,
) {
    while let Some(task) = rx.recv().await {
        let span = info_span!("decide", key = %task.key);
        for resolved in coordinator.resolve(task).instrument(span).await {
            if tx.send(resolved).await.is_err() {
                return;
            }
        }
    }
}

/// Children of a split group collected until the last one arrives
struct PendingSplit {
    parent: GroupKey,
    count: usize,
    children: Vec<TaskReport>,
}

/// Final stage: apply, journal, report
struct Finisher {
    applier: Applier,
    decider: Arc<dyn DecisionSource>,
    abort: AbortSignal,
    writer: JournalWriter,
    progress_tx: Option<mpsc::Sender<ImportProgress>>,
    progress: ImportProgress,
    split: Option<PendingSplit>,
    reports: Vec<TaskReport>,
}

impl Finisher {
    async fn finish(&mut self, resolved: Resolved) -> Result<()> {
        let span = info_span!("apply", key = %resolved.task.key);
        let report = self.settle(resolved).instrument(span).await;

        match report.origin {
            None => self.record(report.report),
            Some((parent, index, count)) => {
                let pending = self.split.get_or_insert_with(|| PendingSplit {
                    parent: parent.clone(),
                    count,
                    children: Vec::with_capacity(count),
                });
                if pending.parent != parent {
                    warn!(parent = %pending.parent, "Split group ended early");
                }
                pending.children.push(report.report);
                if index + 1 >= count {
                    if let Some(done) = self.split.take() {
                        let aggregate = TaskReport::aggregate(done.parent, done.children);
                        self.record(aggregate)?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Bring a task to its final state
    async fn settle(&mut self, resolved: Resolved) -> SettledReport {
        let Resolved { mut task, failure } = resolved;
        let origin = task
            .origin
            .as_ref()
            .map(|o| (o.parent.clone(), o.index, o.count));

        let mut report = TaskReport::new(task.key.clone(), Outcome::Aborted, task.tracks.len());
        if let Some(Chosen::Match(m)) = task.chosen() {
            report.similarity = Some(m.similarity());
        }

        if task.state() == TaskState::Applying {
            if self.abort.is_raised() {
                info!(key = %task.key, "Not applying after abort");
                mark(&mut task, TaskState::Aborted);
            } else {
                match self.applier.apply(&task).await {
                    Ok(applied) => {
                        mark(&mut task, TaskState::Done);
                        report.entries = applied.entries;
                        report.paths = applied.paths;
                        report.completed_steps = applied.completed;
                    }
                    Err(failure) => {
                        error!(key = %task.key, error = %failure.error, "Apply failed");
                        mark(&mut task, TaskState::Failed);
                        self.decider.task_failed(&task, &failure.error).await;
                        report.completed_steps = failure.completed;
                        report.error = Some(failure.error.to_string());
                    }
                }
            }
        }
        if let Some(e) = failure {
            report.error = Some(e.to_string());
        }

        report.outcome = match task.state() {
            TaskState::Done => Outcome::Done,
            TaskState::Skipped => Outcome::Skipped,
            TaskState::Failed => Outcome::Failed,
            TaskState::Aborted => Outcome::Aborted,
            other => {
                warn!(key = %task.key, state = %other, "Task left the pipeline unfinished");
                Outcome::Aborted
            }
        };
        info!(key = %task.key, outcome = %report.outcome, "Task finished");

        SettledReport { report, origin }
    }

    /// Journal and count one group
    fn record(&mut self, report: TaskReport) -> Result<()> {
        let entry = ResumeEntry::now(
            report.key.clone(),
            report.outcome,
            if report.outcome == Outcome::Failed {
                report.completed_steps.clone()
            } else {
                Vec::new()
            },
        );
        self.writer.append(&entry)?;

        self.progress.record(&report);
        if let Some(tx) = &self.progress_tx {
            // Progress is best effort and never throttles the pipeline
            let _ = tx.try_send(self.progress.clone());
        }
        self.reports.push(report);
        Ok(())
    }
}

struct SettledReport {
    report: TaskReport,
    origin: Option<(GroupKey, usize, usize)>,
}

fn mark(task: &mut ImportTask, state: TaskState) {
    if let Err(e) = task.transition(state) {
        warn!(key = %task.key, error = %e, "Unexpected state change");
    }
}
