//! Indexing pipeline orchestration.
//!
//! Coordinates one indexing job at a time: fetch a batch → classify each
//! item → persist accepted media → count → report progress. The scan walks
//! a history backwards from a starting position, one item at a time, and
//! stores its cursor after every batch so an interrupted job can resume.
//!
//! # Single flight
//!
//! [`IndexingCoordinator`] owns an exclusion lock. A second start while a
//! job is active fails immediately with [`IndexError::AlreadyRunning`];
//! nothing is queued.
//!
//! # Cancellation
//!
//! Cooperative: the active job's [`CancelToken`] is polled before every item
//! and before every batch. In-flight fetch and persist calls complete first,
//! and writes already made are kept.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::backoff::BackoffController;
use crate::classify::{classify, Classification};
use crate::config::{Config, IndexerConfig};
use crate::connector_export::ExportHistory;
use crate::error::{FetchError, IndexError, PersistError};
use crate::fetcher::RateLimitedFetcher;
use crate::links::{self, Reference};
use crate::models::{ChatRef, Counters, JobStatus, JobSummary, MediaRecord, RawMessage};
use crate::progress::{ProgressMode, ProgressReporter, ProgressSnapshot};
use crate::store::SqliteStore;
use crate::traits::{CheckpointStore, HistorySource, Persister, SaveOutcome};

/// Tunables of the job loop.
#[derive(Debug, Clone)]
pub struct IndexSettings {
    /// Items requested per fetch (capped at the fetch ceiling).
    pub batch_size: usize,
    /// A `running` snapshot is pushed every this many processed items.
    pub progress_every: u64,
    /// Pause between full batches.
    pub batch_pause: Duration,
    /// Wait used when a rate-limit signal carries no duration.
    pub min_retry_wait: Duration,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self::from(&IndexerConfig::default())
    }
}

impl From<&IndexerConfig> for IndexSettings {
    fn from(config: &IndexerConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            progress_every: config.progress_every,
            batch_pause: config.batch_pause(),
            min_retry_wait: config.min_retry_wait(),
        }
    }
}

/// What to index and where to start.
#[derive(Debug, Clone)]
pub struct IndexRequest {
    pub source: ChatRef,
    /// Explicit starting position; the newest item when `None` or not
    /// positive.
    pub position: Option<i64>,
    /// Prefer a stored resume marker over `position`.
    pub resume: bool,
}

impl IndexRequest {
    pub fn new(source: ChatRef, position: Option<i64>) -> Self {
        Self {
            source,
            position,
            resume: false,
        }
    }
}

/// Cancellation flag of one job. Only ever goes from unset to set.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Returns `true` for the call that set the flag.
    pub fn cancel(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A job running on a background task.
pub struct JobHandle {
    task: JoinHandle<Result<JobSummary, IndexError>>,
    cancel: CancelToken,
}

impl JobHandle {
    pub fn cancel(&self) -> bool {
        self.cancel.cancel()
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Wait for the job to finish.
    pub async fn wait(self) -> Result<JobSummary, IndexError> {
        self.task
            .await
            .map_err(|e| IndexError::Task(e.to_string()))?
    }
}

/// Runs indexing jobs one at a time.
#[derive(Clone)]
pub struct IndexingCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    fetcher: RateLimitedFetcher,
    persister: Arc<dyn Persister>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    backoff: BackoffController,
    settings: IndexSettings,
    lock: Arc<tokio::sync::Mutex<()>>,
    active: Mutex<Option<CancelToken>>,
}

/// Holds the exclusion lock for the lifetime of a job.
struct JobGuard {
    inner: Arc<Inner>,
    _lock: OwnedMutexGuard<()>,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.inner
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Why the scan loop stopped.
enum Exit {
    Completed,
    Cancelled,
    Failed(String),
}

/// State of the running job. Discarded when the loop exits.
struct IndexJob {
    id: String,
    source: ChatRef,
    cursor: i64,
    fetched: u64,
    counters: Counters,
}

impl IndexJob {
    fn snapshot(&self, status: JobStatus) -> ProgressSnapshot {
        ProgressSnapshot::new(self.fetched, &self.counters, status)
    }

    fn summary(&self, status: JobStatus, failure: Option<String>) -> JobSummary {
        JobSummary {
            job_id: self.id.clone(),
            source: self.source.key(),
            status,
            fetched: self.fetched,
            counters: self.counters,
            cursor: self.cursor,
            failure,
        }
    }
}

impl IndexingCoordinator {
    pub fn new(
        history: Arc<dyn HistorySource>,
        persister: Arc<dyn Persister>,
        checkpoints: Option<Arc<dyn CheckpointStore>>,
        settings: IndexSettings,
    ) -> Self {
        let backoff = BackoffController::new(settings.min_retry_wait);
        Self {
            inner: Arc::new(Inner {
                fetcher: RateLimitedFetcher::new(history, backoff.clone()),
                persister,
                checkpoints,
                backoff,
                settings,
                lock: Arc::new(tokio::sync::Mutex::new(())),
                active: Mutex::new(None),
            }),
        }
    }

    /// Run a job to completion on the current task.
    pub async fn run(
        &self,
        request: IndexRequest,
        reporter: &dyn ProgressReporter,
    ) -> Result<JobSummary, IndexError> {
        let (guard, token) = self.acquire()?;
        let result = self.inner.execute(request, reporter, &token).await;
        drop(guard);
        result
    }

    /// Start a job on a background task. The lock is taken before this
    /// returns, so a concurrent start fails right away.
    pub fn start(
        &self,
        request: IndexRequest,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<JobHandle, IndexError> {
        let (guard, token) = self.acquire()?;
        let inner = self.inner.clone();
        let job_token = token.clone();
        let task = tokio::spawn(async move {
            let result = inner.execute(request, reporter.as_ref(), &job_token).await;
            drop(guard);
            result
        });
        Ok(JobHandle {
            task,
            cancel: token,
        })
    }

    /// Cancel the active job, if any. Safe to call at any time and
    /// repeatedly. Returns `true` when this call signalled a running job.
    pub fn cancel(&self) -> bool {
        let active = self
            .inner
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match active {
            Some(token) => {
                let first = token.cancel();
                if first {
                    info!("cancellation requested");
                }
                first
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock.try_lock().is_err()
    }

    fn acquire(&self) -> Result<(JobGuard, CancelToken), IndexError> {
        let lock = self
            .inner
            .lock
            .clone()
            .try_lock_owned()
            .map_err(|_| IndexError::AlreadyRunning)?;
        let token = CancelToken::new();
        *self
            .inner
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        Ok((
            JobGuard {
                inner: self.inner.clone(),
                _lock: lock,
            },
            token,
        ))
    }
}

impl Inner {
    async fn execute(
        &self,
        request: IndexRequest,
        reporter: &dyn ProgressReporter,
        token: &CancelToken,
    ) -> Result<JobSummary, IndexError> {
        let job_id = Uuid::new_v4().to_string();
        let span = info_span!("index_job", job_id = %job_id, source = %request.source);
        self.scan(job_id, request, reporter, token)
            .instrument(span)
            .await
    }

    async fn scan(
        &self,
        job_id: String,
        request: IndexRequest,
        reporter: &dyn ProgressReporter,
        token: &CancelToken,
    ) -> Result<JobSummary, IndexError> {
        let mut job = IndexJob {
            id: job_id,
            source: request.source.clone(),
            cursor: 0,
            fetched: 0,
            counters: Counters::default(),
        };

        job.cursor = match self.starting_cursor(&request).await {
            Ok(Some(cursor)) => cursor,
            Ok(None) => {
                let err = IndexError::NoStartingPoint;
                warn!("{}", err);
                self.push(
                    reporter,
                    &job.snapshot(JobStatus::Error).with_detail(err.to_string()),
                )
                .await;
                return Err(err);
            }
            Err(e) => {
                error!(error = %e, "could not resolve starting position");
                job.counters.errors += 1;
                return Ok(self.finish(&job, Exit::Failed(e.to_string()), reporter).await);
            }
        };

        info!(cursor = job.cursor, "indexing started");

        let limit = RateLimitedFetcher::capped(self.settings.batch_size);
        let exit = loop {
            if token.is_cancelled() {
                break Exit::Cancelled;
            }
            if job.cursor <= 0 {
                break Exit::Completed;
            }

            let batch = match self.fetcher.fetch(&job.source, job.cursor, limit).await {
                Ok(batch) => batch,
                Err(e) => {
                    error!(cursor = job.cursor, error = %e, "batch fetch failed");
                    job.counters.errors += 1;
                    break Exit::Failed(e.to_string());
                }
            };
            let exhausted = batch.len() < limit;

            let mut consumed = 0usize;
            for item in &batch {
                if token.is_cancelled() {
                    break;
                }
                if item.id > job.cursor {
                    debug!(item = item.id, cursor = job.cursor, "item above cursor skipped");
                    continue;
                }

                self.process(&mut job, item).await;
                job.cursor = item.id - 1;
                job.fetched += 1;
                consumed += 1;

                if job.fetched % self.settings.progress_every == 0 {
                    self.push(reporter, &job.snapshot(JobStatus::Running)).await;
                }
            }

            self.save_checkpoint(&job).await;

            if token.is_cancelled() {
                break Exit::Cancelled;
            }
            if exhausted {
                break Exit::Completed;
            }
            if consumed == 0 {
                job.counters.errors += 1;
                break Exit::Failed(format!(
                    "history returned no items at or below position {}",
                    job.cursor
                ));
            }

            debug!(
                cursor = job.cursor,
                fetched = job.fetched,
                saved = job.counters.saved,
                "batch done"
            );
            if !self.settings.batch_pause.is_zero() {
                tokio::time::sleep(self.settings.batch_pause).await;
            }
        };

        Ok(self.finish(&job, exit, reporter).await)
    }

    /// Resume marker (when asked for), then the explicit position, then the
    /// newest item of the source.
    async fn starting_cursor(
        &self,
        request: &IndexRequest,
    ) -> Result<Option<i64>, FetchError> {
        if request.resume {
            if let Some(store) = &self.checkpoints {
                match store.load(&request.source).await {
                    Ok(Some(cursor)) => {
                        info!(cursor, "resuming from stored marker");
                        return Ok(Some(cursor));
                    }
                    Ok(None) => debug!("no resume marker stored"),
                    Err(e) => warn!(error = %e, "failed to load resume marker"),
                }
            }
        }

        if let Some(position) = request.position.filter(|p| *p > 0) {
            return Ok(Some(position));
        }

        self.fetcher.latest_position(&request.source).await
    }

    async fn process(&self, job: &mut IndexJob, item: &RawMessage) {
        match classify(item) {
            Classification::Deleted => job.counters.deleted += 1,
            Classification::NoMedia => job.counters.no_media += 1,
            Classification::Unsupported => job.counters.unsupported += 1,
            Classification::Accepted(record) => match self.persist(&record).await {
                Ok(SaveOutcome::Saved) => job.counters.saved += 1,
                Ok(SaveOutcome::Duplicate) => job.counters.duplicate += 1,
                Err(e) => {
                    warn!(message_id = item.id, error = %e, "failed to save media");
                    job.counters.errors += 1;
                }
            },
        }
    }

    /// Save with the single retry permitted after a rate limit.
    async fn persist(&self, record: &MediaRecord) -> Result<SaveOutcome, PersistError> {
        match self.persister.save(record).await {
            Err(PersistError::RateLimited { retry_after }) => {
                self.backoff.await_retry(retry_after, "persist").await;
                self.persister.save(record).await
            }
            other => other,
        }
    }

    async fn save_checkpoint(&self, job: &IndexJob) {
        if let Some(store) = &self.checkpoints {
            if let Err(e) = store.store(&job.source, job.cursor).await {
                warn!(cursor = job.cursor, error = %e, "failed to store resume marker");
            }
        }
    }

    async fn push(&self, reporter: &dyn ProgressReporter, snapshot: &ProgressSnapshot) {
        if let Err(e) = reporter.report(snapshot).await {
            warn!(error = %e, "progress report failed");
        }
    }

    async fn finish(&self, job: &IndexJob, exit: Exit, reporter: &dyn ProgressReporter) -> JobSummary {
        let (status, failure) = match exit {
            Exit::Completed => (JobStatus::Completed, None),
            Exit::Cancelled => (JobStatus::Cancelled, None),
            Exit::Failed(reason) => (JobStatus::Error, Some(reason)),
        };

        if status == JobStatus::Completed {
            if let Some(store) = &self.checkpoints {
                if let Err(e) = store.clear(&job.source).await {
                    warn!(error = %e, "failed to clear resume marker");
                }
            }
        }

        let mut snapshot = job.snapshot(status);
        if let Some(reason) = &failure {
            snapshot = snapshot.with_detail(reason.clone());
        }
        self.push(reporter, &snapshot).await;

        let c = &job.counters;
        info!(
            %status,
            fetched = job.fetched,
            saved = c.saved,
            duplicate = c.duplicate,
            deleted = c.deleted,
            no_media = c.no_media,
            unsupported = c.unsupported,
            errors = c.errors,
            cursor = job.cursor,
            "indexing finished"
        );

        job.summary(status, failure)
    }
}

/// Pick the chat and starting position of an export job. `--chat` and
/// `--from` override the link; the export's own chat is the default.
/// Every reference the export serves is keyed by the export's chat id, so
/// `--resume` finds the marker however the chat was named before.
/// Non-positive positions mean "start from the newest message".
pub fn select_target(
    history: &ExportHistory,
    reference: Option<String>,
    chat: Option<String>,
    from: Option<i64>,
) -> Result<(ChatRef, Option<i64>)> {
    let mut source = None;
    let mut position = None;
    if let Some(text) = reference {
        let resolved = links::resolve(&Reference::Link(text.clone())).map_err(|_| {
            anyhow::anyhow!(
                "Invalid submission: '{}' is not a chat link. Provide a t.me link.",
                text
            )
        })?;
        source = Some(resolved.source);
        position = resolved.position;
    }
    if let Some(chat) = chat {
        source = Some(chat.parse::<ChatRef>()?);
    }
    if from.is_some() {
        position = from;
    }

    let source = source.unwrap_or(ChatRef::Id(history.chat_id()));
    let source = history.canonical(&source).unwrap_or(source);
    Ok((source, position.filter(|p| *p > 0)))
}

/// CLI entry point: index the configured chat export into the database.
pub async fn run_index(
    config: &Config,
    reference: Option<String>,
    chat: Option<String>,
    from: Option<i64>,
    resume: bool,
    progress: ProgressMode,
) -> Result<JobSummary> {
    let export_config = config
        .export
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("Export not configured. Set [export] path in config."))?;
    let history = Arc::new(ExportHistory::load(&export_config.path)?);

    let (source, position) = select_target(&history, reference, chat, from)?;

    let store = Arc::new(
        SqliteStore::open(config)
            .await
            .context("Failed to open media database")?,
    );
    let coordinator = IndexingCoordinator::new(
        history.clone(),
        store.clone(),
        Some(store.clone()),
        IndexSettings::from(&config.indexer),
    );

    let request = IndexRequest {
        source: source.clone(),
        position,
        resume,
    };
    let handle = coordinator.start(request, Arc::from(progress.reporter()))?;

    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling after the current item");
            cancel.cancel();
        }
    });

    let summary = handle.wait().await?;
    store.close().await;

    let c = &summary.counters;
    match history.name() {
        Some(name) => println!("index {} ({})", source, name),
        None => println!("index {}", source),
    }
    println!("  job: {}", summary.job_id);
    println!("  status: {}", summary.status);
    println!("  fetched: {}", summary.fetched);
    println!("  saved: {}", c.saved);
    println!("  duplicate: {}", c.duplicate);
    println!("  deleted: {}", c.deleted);
    println!("  no media: {}", c.no_media);
    println!("  unsupported: {}", c.unsupported);
    println!("  errors: {}", c.errors);
    println!("  cursor: {}", summary.cursor);

    if let Some(failure) = &summary.failure {
        anyhow::bail!("indexing failed: {}", failure);
    }
    println!("ok");
    Ok(summary)
}
