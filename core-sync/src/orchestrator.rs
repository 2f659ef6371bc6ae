//! # Download Orchestrator
//!
//! Drives a sync session end to end: refreshes course metadata, resolves the
//! applicable file set, detects stale files, and downloads them with bounded
//! concurrency. Progress lands in the session-scoped tables and on the event
//! bus as it happens.
//!
//! ## Session lifecycle
//!
//! Only one session runs at a time. Starting a session wipes all progress
//! tables from the previous session, assigns a fresh worker ID, and spawns a
//! supervisor task. The supervisor plans each course, schedules downloads
//! through a semaphore, and folds results back into course aggregates.
//!
//! Cancellation fires the session's token. In-flight downloads settle their
//! own rows; after a grace period any rows still pending or in flight are
//! swept to cancelled so no row is left non-terminal.
//!
//! Files discovered during a download (attachments referenced by a
//! downloaded file) are scheduled into the same session and marked as
//! additional files.

use crate::events::{EventBus, SyncEvent};
use crate::progress::{aggregate_state, fraction_complete, ProgressAggregator};
use crate::settings::SyncSettingsResolver;
use crate::snapshot::SnapshotReplacer;
use crate::staleness::StalenessDetector;
use crate::{Result, SyncError};
use bridge_traits::{
    BridgeError, ContentApi, DiscoveredFile, DownloadRequest, FileTransfer, ProgressCallback,
};
use core_store::repositories::{
    CourseFileRepository, CourseSyncProgressRepository, FileSyncProgressRepository,
    LocalFileRepository, ProgressStepRepository, SqliteCourseFileRepository,
    SqliteCourseSyncProgressRepository, SqliteDashboardRepository,
    SqliteFileSyncProgressRepository, SqliteLocalFileRepository, SqliteProgressStepRepository,
    SqliteSyncSettingsRepository,
};
use core_store::{
    CourseFile, CourseSyncProgress, CourseSyncState, FileSyncProgress, FileSyncState, LocalFile,
    SyncProgressStep, WorkerId,
};
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the download orchestrator
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum number of concurrent file downloads
    pub max_concurrent_downloads: usize,
    /// Per-file download timeout
    pub download_timeout: Duration,
    /// How long a cancel waits for in-flight downloads to settle before
    /// sweeping their rows
    pub shutdown_grace: Duration,
    /// Buffer size of the sync event channel
    pub event_buffer_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 4,
            download_timeout: Duration::from_secs(300),
            shutdown_grace: Duration::from_secs(5),
            event_buffer_size: 256,
        }
    }
}

// ============================================================================
// Internal Types
// ============================================================================

/// A download the supervisor has scheduled but not yet finished.
#[derive(Debug, Clone)]
struct DownloadItem {
    progress_id: i64,
    course_id: i64,
    file_id: i64,
    name: String,
    size: i64,
}

/// Byte counters forwarded from a transfer callback to the progress pump.
#[derive(Debug)]
struct ByteUpdate {
    progress_id: i64,
    course_id: i64,
    file_id: i64,
    bytes_done: i64,
    bytes_total: i64,
}

/// What a download task reports back to the supervisor.
#[derive(Debug)]
struct TaskOutcome {
    course_id: i64,
    /// The failure should abort the whole session (storage exhausted)
    session_fatal: bool,
}

struct ActiveSession {
    worker_id: WorkerId,
    cancellation_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

/// Everything a session supervisor and its download tasks share.
struct SessionContext {
    transfer: Arc<dyn FileTransfer>,
    snapshot: SnapshotReplacer,
    resolver: SyncSettingsResolver,
    detector: StalenessDetector,
    aggregator: ProgressAggregator,
    local_file_repo: Arc<dyn LocalFileRepository>,
    file_progress_repo: Arc<dyn FileSyncProgressRepository>,
    course_progress_repo: Arc<dyn CourseSyncProgressRepository>,
    step_repo: Arc<dyn ProgressStepRepository>,
    event_bus: Arc<EventBus>,
    config: SyncConfig,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Coordinates sync sessions over the local store and remote bridges.
pub struct SyncOrchestrator {
    ctx: Arc<SessionContext>,
    active: Arc<Mutex<Option<ActiveSession>>>,
}

impl SyncOrchestrator {
    /// Create a new orchestrator over a database pool and remote bridges
    pub fn new(
        pool: SqlitePool,
        content_api: Arc<dyn ContentApi>,
        transfer: Arc<dyn FileTransfer>,
        config: SyncConfig,
    ) -> Self {
        let course_file_repo: Arc<dyn CourseFileRepository> =
            Arc::new(SqliteCourseFileRepository::new(pool.clone()));
        let local_file_repo: Arc<dyn LocalFileRepository> =
            Arc::new(SqliteLocalFileRepository::new(pool.clone()));
        let settings_repo = Arc::new(SqliteSyncSettingsRepository::new(pool.clone()));
        let file_progress_repo: Arc<dyn FileSyncProgressRepository> =
            Arc::new(SqliteFileSyncProgressRepository::new(pool.clone()));
        let course_progress_repo: Arc<dyn CourseSyncProgressRepository> =
            Arc::new(SqliteCourseSyncProgressRepository::new(pool.clone()));
        let step_repo: Arc<dyn ProgressStepRepository> =
            Arc::new(SqliteProgressStepRepository::new(pool.clone()));
        let dashboard_repo = Arc::new(SqliteDashboardRepository::new(pool));

        let ctx = SessionContext {
            transfer,
            snapshot: SnapshotReplacer::new(
                content_api,
                course_file_repo.clone(),
                local_file_repo.clone(),
                dashboard_repo,
            ),
            resolver: SyncSettingsResolver::new(settings_repo, course_file_repo.clone()),
            detector: StalenessDetector::new(course_file_repo, local_file_repo.clone()),
            aggregator: ProgressAggregator::new(
                file_progress_repo.clone(),
                course_progress_repo.clone(),
            ),
            local_file_repo,
            file_progress_repo,
            course_progress_repo,
            step_repo,
            event_bus: Arc::new(EventBus::new(config.event_buffer_size)),
            config,
        };

        Self {
            ctx: Arc::new(ctx),
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// The event bus carrying this orchestrator's sync events
    pub fn event_bus(&self) -> &EventBus {
        &self.ctx.event_bus
    }

    /// Refresh the metadata cache for one course outside a sync session
    ///
    /// # Errors
    ///
    /// Returns an error if the remote fetch or database operation fails
    pub async fn refresh_course_files(&self, course_id: i64) -> Result<usize> {
        self.ctx.snapshot.refresh_course_files(course_id).await
    }

    /// Refresh the dashboard card snapshot
    ///
    /// # Errors
    ///
    /// Returns an error if the remote fetch or database operation fails
    pub async fn refresh_dashboard(&self) -> Result<usize> {
        self.ctx.snapshot.refresh_dashboard().await
    }

    /// Check whether a sync session is currently running
    pub async fn is_sync_active(&self) -> bool {
        let active = self.active.lock().await;
        match active.as_ref() {
            Some(session) => session
                .handle
                .as_ref()
                .map(|h| !h.is_finished())
                .unwrap_or(false),
            None => false,
        }
    }

    /// Start a sync session over the given courses
    ///
    /// Wipes all session-scoped progress from the previous session, assigns
    /// a fresh worker ID, and runs the session in the background. Progress
    /// is observable through the event bus and the progress repositories.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::SessionInProgress`] if a session is already
    /// running, or an error if the progress tables cannot be cleared
    #[instrument(skip(self), fields(course_count = course_ids.len()))]
    pub async fn start_sync(&self, course_ids: Vec<i64>) -> Result<WorkerId> {
        let mut active = self.active.lock().await;
        if let Some(session) = active.as_ref() {
            let running = session
                .handle
                .as_ref()
                .map(|h| !h.is_finished())
                .unwrap_or(false);
            if running {
                return Err(SyncError::SessionInProgress(session.worker_id));
            }
        }

        self.ctx.file_progress_repo.clear_session_scoped().await?;

        let worker_id = WorkerId::new();
        let cancellation_token = CancellationToken::new();
        info!(%worker_id, courses = course_ids.len(), "starting sync session");

        self.ctx
            .event_bus
            .emit(SyncEvent::SessionStarted {
                worker_id,
                course_count: course_ids.len(),
            })
            .ok();

        let ctx = self.ctx.clone();
        let token = cancellation_token.clone();
        let active_slot = self.active.clone();
        let handle = tokio::spawn(async move {
            run_session(ctx, worker_id, course_ids, token).await;

            // Free the slot so the next session can start.
            let mut guard = active_slot.lock().await;
            if guard.as_ref().map(|s| s.worker_id) == Some(worker_id) {
                *guard = None;
            }
        });

        *active = Some(ActiveSession {
            worker_id,
            cancellation_token,
            handle: Some(handle),
        });

        Ok(worker_id)
    }

    /// Cancel a running sync session
    ///
    /// Fires the session's cancellation token and waits up to the configured
    /// grace period for in-flight downloads to settle their rows. Rows still
    /// pending or in flight after the grace period are swept to cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::WorkerNotFound`] if no session with the given
    /// worker ID is running
    #[instrument(skip(self), fields(worker_id = %worker_id))]
    pub async fn cancel(&self, worker_id: WorkerId) -> Result<()> {
        let handle = {
            let mut active = self.active.lock().await;
            let session = active
                .as_mut()
                .filter(|s| s.worker_id == worker_id)
                .ok_or(SyncError::WorkerNotFound(worker_id))?;

            session.cancellation_token.cancel();
            session.handle.take()
        };

        info!(%worker_id, "cancelling sync session");
        self.ctx
            .event_bus
            .emit(SyncEvent::SessionCancelled { worker_id })
            .ok();

        if let Some(handle) = handle {
            if tokio::time::timeout(self.ctx.config.shutdown_grace, handle)
                .await
                .is_err()
            {
                warn!(%worker_id, "session did not settle within grace period, sweeping rows");
                self.ctx
                    .file_progress_repo
                    .mark_states_for_worker(
                        worker_id,
                        &[FileSyncState::Pending, FileSyncState::InProgress],
                        FileSyncState::Cancelled,
                    )
                    .await?;
            }
        }

        let mut active = self.active.lock().await;
        if active.as_ref().map(|s| s.worker_id) == Some(worker_id) {
            *active = None;
        }
        Ok(())
    }

    /// Get the per-course progress rows for a session
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn course_progress(&self, worker_id: WorkerId) -> Result<Vec<CourseSyncProgress>> {
        Ok(self.ctx.course_progress_repo.by_worker(worker_id).await?)
    }

    /// Get the per-file progress rows for a session
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn file_progress(&self, worker_id: WorkerId) -> Result<Vec<FileSyncProgress>> {
        Ok(self.ctx.file_progress_repo.by_worker(worker_id).await?)
    }

    /// Get the coarse progress steps recorded for a session
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn progress_steps(&self, worker_id: WorkerId) -> Result<Vec<SyncProgressStep>> {
        Ok(self.ctx.step_repo.by_worker(worker_id).await?)
    }
}

// ============================================================================
// Session Supervisor
// ============================================================================

/// Plan and execute one sync session.
async fn run_session(
    ctx: Arc<SessionContext>,
    worker_id: WorkerId,
    course_ids: Vec<i64>,
    token: CancellationToken,
) {
    let mut planned: Vec<DownloadItem> = Vec::new();
    for &course_id in &course_ids {
        if token.is_cancelled() {
            break;
        }
        match plan_course(&ctx, worker_id, course_id).await {
            Ok(items) => planned.extend(items),
            Err(err) => {
                warn!(%worker_id, course_id, %err, "course planning failed");
                mark_course_failed(&ctx, worker_id, course_id).await;
            }
        }
    }

    run_downloads(&ctx, worker_id, planned, &token).await;
    finalize_session(&ctx, worker_id, token.is_cancelled()).await;
}

/// Refresh a course's metadata, detect its stale files, and schedule them.
async fn plan_course(
    ctx: &Arc<SessionContext>,
    worker_id: WorkerId,
    course_id: i64,
) -> Result<Vec<DownloadItem>> {
    ctx.step_repo
        .insert(worker_id, course_id, "Collecting course files")
        .await?;

    ctx.snapshot.refresh_course_files(course_id).await?;
    let applicable = ctx.resolver.applicable_file_ids(course_id).await?;
    let stale = ctx.detector.detect(course_id, &applicable).await?;

    ctx.course_progress_repo
        .upsert(&CourseSyncProgress {
            course_id,
            worker_id,
            state: CourseSyncState::InProgress,
            aggregate_state: CourseSyncState::NotStarted,
            started_at: chrono::Utc::now().timestamp(),
        })
        .await?;

    let mut items = Vec::with_capacity(stale.len());
    for file in &stale {
        let progress_id = ctx
            .file_progress_repo
            .insert(&FileSyncProgress::scheduled(
                course_id, file.id, worker_id, file.size, false,
            ))
            .await?;
        items.push(download_item(progress_id, file));
    }

    if !items.is_empty() {
        ctx.step_repo
            .insert(worker_id, course_id, "Downloading files")
            .await?;
    }

    ctx.event_bus
        .emit(SyncEvent::CourseStarted {
            worker_id,
            course_id,
            file_count: items.len(),
        })
        .ok();

    debug!(%worker_id, course_id, scheduled = items.len(), "course planned");
    Ok(items)
}

fn download_item(progress_id: i64, file: &CourseFile) -> DownloadItem {
    DownloadItem {
        progress_id,
        course_id: file.course_id,
        file_id: file.id,
        name: file.name.clone(),
        size: file.size,
    }
}

/// Run the scheduled downloads with bounded concurrency until the queue
/// (including additional files discovered along the way) drains or the
/// session is cancelled or aborted.
async fn run_downloads(
    ctx: &Arc<SessionContext>,
    worker_id: WorkerId,
    planned: Vec<DownloadItem>,
    token: &CancellationToken,
) {
    if planned.is_empty() {
        return;
    }

    let semaphore = Arc::new(Semaphore::new(ctx.config.max_concurrent_downloads));
    let fatal = Arc::new(AtomicBool::new(false));
    let (extra_tx, mut extra_rx) = mpsc::unbounded_channel::<(i64, DiscoveredFile)>();
    let (bytes_tx, bytes_rx) = mpsc::unbounded_channel::<ByteUpdate>();

    let pump = tokio::spawn(progress_pump(ctx.clone(), worker_id, bytes_rx));

    let mut join_set: JoinSet<TaskOutcome> = JoinSet::new();
    for item in planned {
        spawn_download(
            &mut join_set,
            ctx.clone(),
            worker_id,
            item,
            token.clone(),
            semaphore.clone(),
            extra_tx.clone(),
            bytes_tx.clone(),
            fatal.clone(),
        );
    }

    loop {
        // Additional files may already be queued when the set drains.
        if join_set.is_empty() {
            match extra_rx.try_recv() {
                Ok((course_id, discovered)) => {
                    schedule_extra(
                        &mut join_set,
                        ctx,
                        worker_id,
                        course_id,
                        discovered,
                        token,
                        &semaphore,
                        &extra_tx,
                        &bytes_tx,
                        &fatal,
                    )
                    .await;
                    continue;
                }
                Err(_) => break,
            }
        }

        tokio::select! {
            Some(joined) = join_set.join_next() => {
                match joined {
                    Ok(outcome) => {
                        if outcome.session_fatal && !fatal.swap(true, Ordering::SeqCst) {
                            warn!(%worker_id, "storage exhausted, aborting remaining downloads");
                            if let Err(err) = ctx.file_progress_repo
                                .mark_states_for_worker(
                                    worker_id,
                                    &[FileSyncState::Pending],
                                    FileSyncState::Failed,
                                )
                                .await
                            {
                                error!(%worker_id, %err, "failed to settle pending rows");
                            }
                        }
                        emit_course_progress(ctx, worker_id, outcome.course_id).await;
                    }
                    Err(err) => error!(%worker_id, %err, "download task panicked"),
                }
            }
            Some((course_id, discovered)) = extra_rx.recv() => {
                schedule_extra(
                    &mut join_set,
                    ctx,
                    worker_id,
                    course_id,
                    discovered,
                    token,
                    &semaphore,
                    &extra_tx,
                    &bytes_tx,
                    &fatal,
                )
                .await;
            }
            _ = token.cancelled() => break,
        }
    }

    drop(extra_tx);
    drop(bytes_tx);

    if token.is_cancelled() {
        // Give in-flight tasks a moment to settle their own rows; anything
        // left over is swept during finalization.
        let drain = async {
            while join_set.join_next().await.is_some() {}
        };
        if tokio::time::timeout(ctx.config.shutdown_grace, drain)
            .await
            .is_err()
        {
            join_set.abort_all();
        }
    }

    pump.await.ok();
}

/// Insert a progress row for a file discovered mid-download and schedule it.
#[allow(clippy::too_many_arguments)]
async fn schedule_extra(
    join_set: &mut JoinSet<TaskOutcome>,
    ctx: &Arc<SessionContext>,
    worker_id: WorkerId,
    course_id: i64,
    discovered: DiscoveredFile,
    token: &CancellationToken,
    semaphore: &Arc<Semaphore>,
    extra_tx: &mpsc::UnboundedSender<(i64, DiscoveredFile)>,
    bytes_tx: &mpsc::UnboundedSender<ByteUpdate>,
    fatal: &Arc<AtomicBool>,
) {
    if token.is_cancelled() || fatal.load(Ordering::SeqCst) {
        return;
    }

    let row = FileSyncProgress::scheduled(
        course_id,
        discovered.file_id,
        worker_id,
        discovered.size,
        true,
    );
    let progress_id = match ctx.file_progress_repo.insert(&row).await {
        Ok(id) => id,
        Err(err) => {
            error!(%worker_id, course_id, file_id = discovered.file_id, %err,
                "failed to schedule additional file");
            return;
        }
    };

    debug!(%worker_id, course_id, file_id = discovered.file_id, "scheduling additional file");
    spawn_download(
        join_set,
        ctx.clone(),
        worker_id,
        DownloadItem {
            progress_id,
            course_id,
            file_id: discovered.file_id,
            name: discovered.name,
            size: discovered.size,
        },
        token.clone(),
        semaphore.clone(),
        extra_tx.clone(),
        bytes_tx.clone(),
        fatal.clone(),
    );
}

/// What a single download attempt ended as.
enum DownloadEnd {
    Done(bridge_traits::Downloaded),
    Cancelled,
    TimedOut,
    Failed(BridgeError),
}

#[allow(clippy::too_many_arguments)]
fn spawn_download(
    join_set: &mut JoinSet<TaskOutcome>,
    ctx: Arc<SessionContext>,
    worker_id: WorkerId,
    item: DownloadItem,
    token: CancellationToken,
    semaphore: Arc<Semaphore>,
    extra_tx: mpsc::UnboundedSender<(i64, DiscoveredFile)>,
    bytes_tx: mpsc::UnboundedSender<ByteUpdate>,
    fatal: Arc<AtomicBool>,
) {
    join_set.spawn(async move {
        let mut outcome = TaskOutcome {
            course_id: item.course_id,
            session_fatal: false,
        };

        let _permit = match semaphore.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return outcome,
        };

        // Settle rows whose turn never comes.
        if fatal.load(Ordering::SeqCst) {
            set_row_state(&ctx, worker_id, &item, FileSyncState::Failed).await;
            return outcome;
        }
        if token.is_cancelled() {
            set_row_state(&ctx, worker_id, &item, FileSyncState::Cancelled).await;
            return outcome;
        }

        set_row_state(&ctx, worker_id, &item, FileSyncState::InProgress).await;

        let callback: ProgressCallback = {
            let bytes_tx = bytes_tx.clone();
            let (progress_id, course_id, file_id) = (item.progress_id, item.course_id, item.file_id);
            Arc::new(move |bytes_done, bytes_total| {
                bytes_tx
                    .send(ByteUpdate {
                        progress_id,
                        course_id,
                        file_id,
                        bytes_done: bytes_done as i64,
                        bytes_total: bytes_total as i64,
                    })
                    .ok();
            })
        };

        let request = DownloadRequest {
            file_id: item.file_id,
            course_id: item.course_id,
            name: item.name.clone(),
            size: item.size,
        };

        let end = tokio::select! {
            _ = token.cancelled() => DownloadEnd::Cancelled,
            result = tokio::time::timeout(
                ctx.config.download_timeout,
                ctx.transfer.download(&request, callback),
            ) => match result {
                Err(_) => DownloadEnd::TimedOut,
                Ok(Ok(downloaded)) => DownloadEnd::Done(downloaded),
                Ok(Err(err)) => DownloadEnd::Failed(err),
            },
        };

        let final_state = match end {
            DownloadEnd::Done(downloaded) => {
                let bytes_total = downloaded.bytes_total as i64;
                if let Err(err) = ctx
                    .file_progress_repo
                    .update_bytes(item.progress_id, bytes_total, bytes_total)
                    .await
                {
                    error!(%worker_id, file_id = item.file_id, %err, "failed to finalize byte count");
                }
                if let Err(err) = ctx
                    .local_file_repo
                    .upsert(&LocalFile {
                        id: item.file_id,
                        course_id: item.course_id,
                        downloaded_at: chrono::Utc::now().timestamp(),
                        local_path: downloaded.local_path,
                    })
                    .await
                {
                    error!(%worker_id, file_id = item.file_id, %err, "failed to record local file");
                    set_row_state(&ctx, worker_id, &item, FileSyncState::Failed).await;
                    return outcome;
                }
                for discovered in downloaded.additional {
                    extra_tx.send((item.course_id, discovered)).ok();
                }
                FileSyncState::Completed
            }
            DownloadEnd::Cancelled => FileSyncState::Cancelled,
            DownloadEnd::TimedOut => {
                warn!(%worker_id, file_id = item.file_id, "download timed out");
                FileSyncState::Failed
            }
            DownloadEnd::Failed(err) => {
                warn!(%worker_id, file_id = item.file_id, %err, "download failed");
                outcome.session_fatal = err.is_session_fatal();
                FileSyncState::Failed
            }
        };

        set_row_state(&ctx, worker_id, &item, final_state).await;
        outcome
    });
}

/// Persist byte updates from transfer callbacks and republish them as events.
async fn progress_pump(
    ctx: Arc<SessionContext>,
    worker_id: WorkerId,
    mut rx: mpsc::UnboundedReceiver<ByteUpdate>,
) {
    while let Some(update) = rx.recv().await {
        if let Err(err) = ctx
            .file_progress_repo
            .update_bytes(update.progress_id, update.bytes_done, update.bytes_total)
            .await
        {
            warn!(%worker_id, file_id = update.file_id, %err, "failed to persist byte progress");
        }
        ctx.event_bus
            .emit(SyncEvent::FileProgress {
                worker_id,
                course_id: update.course_id,
                file_id: update.file_id,
                bytes_done: update.bytes_done,
                bytes_total: update.bytes_total,
            })
            .ok();
    }
}

async fn set_row_state(
    ctx: &Arc<SessionContext>,
    worker_id: WorkerId,
    item: &DownloadItem,
    state: FileSyncState,
) {
    if let Err(err) = ctx.file_progress_repo.set_state(item.progress_id, state).await {
        error!(%worker_id, file_id = item.file_id, %state, %err, "failed to persist file state");
    }
    if state.is_terminal() {
        ctx.event_bus
            .emit(SyncEvent::FileFinished {
                worker_id,
                course_id: item.course_id,
                file_id: item.file_id,
                state,
            })
            .ok();
    }
}

async fn mark_course_failed(ctx: &Arc<SessionContext>, worker_id: WorkerId, course_id: i64) {
    let result = ctx
        .course_progress_repo
        .upsert(&CourseSyncProgress {
            course_id,
            worker_id,
            state: CourseSyncState::Failed,
            aggregate_state: CourseSyncState::Failed,
            started_at: chrono::Utc::now().timestamp(),
        })
        .await;
    if let Err(err) = result {
        error!(%worker_id, course_id, %err, "failed to record course failure");
    }
}

async fn emit_course_progress(ctx: &Arc<SessionContext>, worker_id: WorkerId, course_id: i64) {
    match ctx.aggregator.recompute_course(course_id, worker_id).await {
        Ok((state, fraction)) => {
            ctx.event_bus
                .emit(SyncEvent::CourseProgress {
                    worker_id,
                    course_id,
                    state,
                    fraction_complete: fraction,
                })
                .ok();
        }
        Err(err) => error!(%worker_id, course_id, %err, "failed to recompute course aggregate"),
    }
}

/// Settle every row and course in the session and emit the final event.
async fn finalize_session(ctx: &Arc<SessionContext>, worker_id: WorkerId, cancelled: bool) {
    if cancelled {
        if let Err(err) = ctx
            .file_progress_repo
            .mark_states_for_worker(
                worker_id,
                &[FileSyncState::Pending, FileSyncState::InProgress],
                FileSyncState::Cancelled,
            )
            .await
        {
            error!(%worker_id, %err, "failed to sweep unfinished rows");
        }
    }

    let courses = match ctx.course_progress_repo.by_worker(worker_id).await {
        Ok(courses) => courses,
        Err(err) => {
            error!(%worker_id, %err, "failed to load course progress for finalization");
            return;
        }
    };

    for course in &courses {
        let rows = match ctx
            .file_progress_repo
            .by_course_and_worker(course.course_id, worker_id)
            .await
        {
            Ok(rows) => rows,
            Err(err) => {
                error!(%worker_id, course_id = course.course_id, %err,
                    "failed to load file rows for finalization");
                continue;
            }
        };

        let (state, fraction) = if rows.is_empty() {
            match course.state {
                // Planning failure already settled this course.
                CourseSyncState::Failed => (CourseSyncState::Failed, 0.0),
                _ if cancelled => (CourseSyncState::Cancelled, 0.0),
                // Nothing was stale.
                _ => (CourseSyncState::Completed, 1.0),
            }
        } else {
            (aggregate_state(&rows), fraction_complete(&rows))
        };

        let persisted = async {
            ctx.course_progress_repo
                .set_aggregate_state(course.course_id, worker_id, state)
                .await?;
            ctx.course_progress_repo
                .set_state(course.course_id, worker_id, state)
                .await
        };
        if let Err(err) = persisted.await {
            error!(%worker_id, course_id = course.course_id, %err,
                "failed to persist final course state");
        }

        ctx.event_bus
            .emit(SyncEvent::CourseProgress {
                worker_id,
                course_id: course.course_id,
                state,
                fraction_complete: fraction,
            })
            .ok();
    }

    let session_state = match ctx.aggregator.session_state(worker_id).await {
        Ok(state) => state,
        Err(err) => {
            error!(%worker_id, %err, "failed to compute session state");
            CourseSyncState::Failed
        }
    };

    info!(%worker_id, state = %session_state, "sync session finished");
    ctx.event_bus
        .emit(SyncEvent::SessionFinished {
            worker_id,
            state: session_state,
        })
        .ok();
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::content::{DashboardCardInfo, RemoteFileInfo};
    use bridge_traits::Downloaded;
    use core_store::create_test_pool;

    struct EmptyApi;

    #[async_trait]
    impl ContentApi for EmptyApi {
        async fn list_course_files(
            &self,
            _course_id: i64,
        ) -> bridge_traits::Result<Vec<RemoteFileInfo>> {
            Ok(Vec::new())
        }

        async fn list_dashboard_cards(&self) -> bridge_traits::Result<Vec<DashboardCardInfo>> {
            Ok(Vec::new())
        }
    }

    struct NoopTransfer;

    #[async_trait]
    impl FileTransfer for NoopTransfer {
        async fn download(
            &self,
            request: &DownloadRequest,
            _on_progress: ProgressCallback,
        ) -> bridge_traits::Result<Downloaded> {
            Ok(Downloaded {
                local_path: format!("/data/{}", request.file_id),
                bytes_total: request.size as u64,
                additional: Vec::new(),
            })
        }
    }

    fn orchestrator(pool: sqlx::SqlitePool) -> SyncOrchestrator {
        SyncOrchestrator::new(
            pool,
            Arc::new(EmptyApi),
            Arc::new(NoopTransfer),
            SyncConfig::default(),
        )
    }

    #[test]
    fn test_config_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.max_concurrent_downloads, 4);
        assert!(config.shutdown_grace < config.download_timeout);
    }

    #[tokio::test]
    async fn test_cancel_unknown_worker() {
        let pool = create_test_pool().await.unwrap();
        let orchestrator = orchestrator(pool);

        let result = orchestrator.cancel(WorkerId::new()).await;
        assert!(matches!(result, Err(SyncError::WorkerNotFound(_))));
    }

    #[tokio::test]
    async fn test_empty_session_completes() {
        let pool = create_test_pool().await.unwrap();
        let orchestrator = orchestrator(pool);
        let mut events = orchestrator.event_bus().subscribe();

        let worker_id = orchestrator.start_sync(vec![]).await.unwrap();

        loop {
            match events.recv().await.unwrap() {
                SyncEvent::SessionFinished { state, .. } => {
                    assert_eq!(state, CourseSyncState::Completed);
                    break;
                }
                event => assert_eq!(event.worker_id(), worker_id),
            }
        }

        // The supervisor frees the session slot just after the final event.
        for _ in 0..50 {
            if !orchestrator.is_sync_active().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session slot not released");
    }
}
