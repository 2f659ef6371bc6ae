//! Integration tests for offline sync sessions
//!
//! These tests drive the orchestrator end to end over an in-memory database
//! with mock remote bridges, covering:
//! - Full sync of a fresh course
//! - Partial failure with failed rows retained
//! - Storage exhaustion aborting the session
//! - Cancellation settling every row
//! - Single-session enforcement and additional-file scheduling

use async_trait::async_trait;
use bridge_traits::content::{ContentApi, DashboardCardInfo, RemoteFileInfo};
use bridge_traits::error::BridgeError;
use bridge_traits::transfer::{
    DiscoveredFile, Downloaded, DownloadRequest, FileTransfer, ProgressCallback,
};
use core_store::repositories::{
    CourseFileRepository, FileSyncProgressRepository, LocalFileRepository,
    SqliteCourseFileRepository, SqliteFileSyncProgressRepository, SqliteLocalFileRepository,
    SqliteSyncSettingsRepository, SyncSettingsRepository,
};
use core_store::{
    create_test_pool, CourseSyncSettings, CourseSyncState, FileSyncState, LocalFile, WorkerId,
};
use core_sync::events::{Receiver, SyncEvent};
use core_sync::{SyncConfig, SyncOrchestrator};
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Mock Implementations
// ============================================================================

/// Mock content API serving fixed per-course listings
struct MockApi {
    listings: HashMap<i64, Vec<RemoteFileInfo>>,
}

#[async_trait]
impl ContentApi for MockApi {
    async fn list_course_files(
        &self,
        course_id: i64,
    ) -> bridge_traits::error::Result<Vec<RemoteFileInfo>> {
        Ok(self.listings.get(&course_id).cloned().unwrap_or_default())
    }

    async fn list_dashboard_cards(
        &self,
    ) -> bridge_traits::error::Result<Vec<DashboardCardInfo>> {
        Ok(Vec::new())
    }
}

/// Mock transfer that succeeds, fails specific files, or discovers extras
#[derive(Default)]
struct MockTransfer {
    fail: HashSet<i64>,
    storage_full: HashSet<i64>,
    extras: HashMap<i64, Vec<DiscoveredFile>>,
}

#[async_trait]
impl FileTransfer for MockTransfer {
    async fn download(
        &self,
        request: &DownloadRequest,
        on_progress: ProgressCallback,
    ) -> bridge_traits::error::Result<Downloaded> {
        if self.storage_full.contains(&request.file_id) {
            return Err(BridgeError::StorageFull("disk exhausted".to_string()));
        }
        if self.fail.contains(&request.file_id) {
            return Err(BridgeError::Network("connection reset".to_string()));
        }

        let total = request.size as u64;
        on_progress(total / 2, total);
        on_progress(total, total);

        Ok(Downloaded {
            local_path: format!("/data/{}/{}", request.course_id, request.file_id),
            bytes_total: total,
            additional: self.extras.get(&request.file_id).cloned().unwrap_or_default(),
        })
    }
}

/// Mock transfer that never finishes, for cancellation tests
struct StalledTransfer;

#[async_trait]
impl FileTransfer for StalledTransfer {
    async fn download(
        &self,
        request: &DownloadRequest,
        on_progress: ProgressCallback,
    ) -> bridge_traits::error::Result<Downloaded> {
        on_progress(0, request.size as u64);
        futures::future::pending::<()>().await;
        unreachable!()
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn folder(id: i64, parent: i64, course_id: i64) -> RemoteFileInfo {
    RemoteFileInfo {
        id,
        parent_folder_id: parent,
        course_id,
        context_id: course_id,
        is_folder: true,
        name: format!("folder-{}", id),
        size: 0,
        is_hidden: false,
        updated_at: 100,
        created_at: 100,
    }
}

fn file(id: i64, parent: i64, course_id: i64, size: i64) -> RemoteFileInfo {
    RemoteFileInfo {
        id,
        parent_folder_id: parent,
        course_id,
        context_id: course_id,
        is_folder: false,
        name: format!("file-{}.pdf", id),
        size,
        is_hidden: false,
        updated_at: 100,
        created_at: 100,
    }
}

/// One course (id 7) with a root folder and three files
fn standard_listing() -> HashMap<i64, Vec<RemoteFileInfo>> {
    HashMap::from([(
        7,
        vec![
            folder(10, 0, 7),
            file(11, 10, 7, 100),
            file(12, 10, 7, 200),
            file(13, 10, 7, 300),
        ],
    )])
}

async fn enable_full_sync(pool: &SqlitePool, course_id: i64) {
    SqliteSyncSettingsRepository::new(pool.clone())
        .upsert(&CourseSyncSettings {
            course_id,
            full_sync_enabled: true,
        })
        .await
        .unwrap();
}

fn fast_config() -> SyncConfig {
    SyncConfig {
        max_concurrent_downloads: 2,
        download_timeout: Duration::from_secs(5),
        shutdown_grace: Duration::from_millis(200),
        event_buffer_size: 256,
    }
}

async fn wait_session_finished(events: &mut Receiver<SyncEvent>) -> CourseSyncState {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("session did not finish in time")
            .expect("event channel closed")
        {
            SyncEvent::SessionFinished { state, .. } => return state,
            _ => continue,
        }
    }
}

async fn run_to_completion(
    orchestrator: &SyncOrchestrator,
    course_ids: Vec<i64>,
) -> (WorkerId, CourseSyncState) {
    let mut events = orchestrator.event_bus().subscribe();
    let worker_id = orchestrator.start_sync(course_ids).await.unwrap();
    let state = wait_session_finished(&mut events).await;
    (worker_id, state)
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_full_sync_downloads_every_stale_file() {
    let pool = create_test_pool().await.unwrap();
    enable_full_sync(&pool, 7).await;

    let orchestrator = SyncOrchestrator::new(
        pool.clone(),
        Arc::new(MockApi {
            listings: standard_listing(),
        }),
        Arc::new(MockTransfer::default()),
        fast_config(),
    );

    let (worker_id, state) = run_to_completion(&orchestrator, vec![7]).await;
    assert_eq!(state, CourseSyncState::Completed);

    let rows = orchestrator.file_progress(worker_id).await.unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.state == FileSyncState::Completed));
    assert!(rows.iter().all(|r| r.bytes_done == r.bytes_total));

    let locals = SqliteLocalFileRepository::new(pool)
        .find_by_course(7)
        .await
        .unwrap();
    let ids: Vec<i64> = locals.iter().map(|f| f.id).collect();
    assert_eq!(ids, vec![11, 12, 13]);

    let courses = orchestrator.course_progress(worker_id).await.unwrap();
    assert_eq!(courses.len(), 1);
    assert_eq!(courses[0].aggregate_state, CourseSyncState::Completed);
}

#[tokio::test]
async fn test_fresh_files_are_not_redownloaded() {
    let pool = create_test_pool().await.unwrap();
    enable_full_sync(&pool, 7).await;

    // Files 11 and 12 were already downloaded after their remote update.
    let locals = SqliteLocalFileRepository::new(pool.clone());
    for id in [11, 12] {
        locals
            .upsert(&LocalFile {
                id,
                course_id: 7,
                downloaded_at: 150,
                local_path: format!("/data/7/{}", id),
            })
            .await
            .unwrap();
    }

    let orchestrator = SyncOrchestrator::new(
        pool,
        Arc::new(MockApi {
            listings: standard_listing(),
        }),
        Arc::new(MockTransfer::default()),
        fast_config(),
    );

    let (worker_id, state) = run_to_completion(&orchestrator, vec![7]).await;
    assert_eq!(state, CourseSyncState::Completed);

    let rows = orchestrator.file_progress(worker_id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].file_id, 13);
}

#[tokio::test]
async fn test_selective_sync_downloads_only_selected_files() {
    let pool = create_test_pool().await.unwrap();
    let settings = SqliteSyncSettingsRepository::new(pool.clone());
    settings
        .upsert(&CourseSyncSettings {
            course_id: 7,
            full_sync_enabled: false,
        })
        .await
        .unwrap();
    settings.add_selection(7, 12).await.unwrap();

    let orchestrator = SyncOrchestrator::new(
        pool,
        Arc::new(MockApi {
            listings: standard_listing(),
        }),
        Arc::new(MockTransfer::default()),
        fast_config(),
    );

    let (worker_id, state) = run_to_completion(&orchestrator, vec![7]).await;
    assert_eq!(state, CourseSyncState::Completed);

    let rows = orchestrator.file_progress(worker_id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].file_id, 12);
}

#[tokio::test]
async fn test_partial_failure_retains_failed_rows() {
    let pool = create_test_pool().await.unwrap();
    enable_full_sync(&pool, 7).await;

    let orchestrator = SyncOrchestrator::new(
        pool.clone(),
        Arc::new(MockApi {
            listings: standard_listing(),
        }),
        Arc::new(MockTransfer {
            fail: HashSet::from([12]),
            ..Default::default()
        }),
        fast_config(),
    );

    let (worker_id, state) = run_to_completion(&orchestrator, vec![7]).await;
    assert_eq!(state, CourseSyncState::PartialFailure);

    let rows = orchestrator.file_progress(worker_id).await.unwrap();
    let state_of = |file_id| rows.iter().find(|r| r.file_id == file_id).unwrap().state;
    assert_eq!(state_of(11), FileSyncState::Completed);
    assert_eq!(state_of(12), FileSyncState::Failed);
    assert_eq!(state_of(13), FileSyncState::Completed);

    // The failed file never produced a local record.
    let locals = SqliteLocalFileRepository::new(pool);
    assert!(locals.find_by_id(12).await.unwrap().is_none());
    assert!(locals.find_by_id(11).await.unwrap().is_some());

    let courses = orchestrator.course_progress(worker_id).await.unwrap();
    assert_eq!(courses[0].aggregate_state, CourseSyncState::PartialFailure);
}

#[tokio::test]
async fn test_storage_full_aborts_remaining_downloads() {
    let pool = create_test_pool().await.unwrap();
    enable_full_sync(&pool, 7).await;

    // One download at a time: the first hits storage exhaustion and the
    // rest must be settled as failed without being attempted.
    let config = SyncConfig {
        max_concurrent_downloads: 1,
        ..fast_config()
    };
    let orchestrator = SyncOrchestrator::new(
        pool,
        Arc::new(MockApi {
            listings: standard_listing(),
        }),
        Arc::new(MockTransfer {
            storage_full: HashSet::from([11, 12, 13]),
            ..Default::default()
        }),
        config,
    );

    let (worker_id, state) = run_to_completion(&orchestrator, vec![7]).await;
    assert_eq!(state, CourseSyncState::Failed);

    let rows = orchestrator.file_progress(worker_id).await.unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.state == FileSyncState::Failed));
}

#[tokio::test]
async fn test_cancel_settles_every_row() {
    let pool = create_test_pool().await.unwrap();
    enable_full_sync(&pool, 7).await;

    let orchestrator = SyncOrchestrator::new(
        pool.clone(),
        Arc::new(MockApi {
            listings: standard_listing(),
        }),
        Arc::new(StalledTransfer),
        fast_config(),
    );

    let mut events = orchestrator.event_bus().subscribe();
    let worker_id = orchestrator.start_sync(vec![7]).await.unwrap();

    // Wait until at least one download is actually in flight.
    loop {
        match tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap()
        {
            SyncEvent::FileProgress { .. } => break,
            _ => continue,
        }
    }

    orchestrator.cancel(worker_id).await.unwrap();

    let progress = SqliteFileSyncProgressRepository::new(pool);
    let rows = progress.by_worker(worker_id).await.unwrap();
    assert_eq!(rows.len(), 3);
    assert!(
        rows.iter().all(|r| r.state == FileSyncState::Cancelled),
        "every row must be terminal after cancel: {:?}",
        rows
    );
    assert!(!orchestrator.is_sync_active().await);
}

#[tokio::test]
async fn test_second_session_rejected_while_active() {
    let pool = create_test_pool().await.unwrap();
    enable_full_sync(&pool, 7).await;

    let orchestrator = SyncOrchestrator::new(
        pool,
        Arc::new(MockApi {
            listings: standard_listing(),
        }),
        Arc::new(StalledTransfer),
        fast_config(),
    );

    let worker_id = orchestrator.start_sync(vec![7]).await.unwrap();
    let second = orchestrator.start_sync(vec![7]).await;
    assert!(matches!(
        second,
        Err(core_sync::SyncError::SessionInProgress(id)) if id == worker_id
    ));

    orchestrator.cancel(worker_id).await.unwrap();
}

#[tokio::test]
async fn test_additional_files_join_the_session() {
    let pool = create_test_pool().await.unwrap();
    enable_full_sync(&pool, 7).await;

    let listing = HashMap::from([(7, vec![folder(10, 0, 7), file(11, 10, 7, 100)])]);
    // Downloading file 11 discovers an embedded attachment.
    let extras = HashMap::from([(
        11,
        vec![DiscoveredFile {
            file_id: 900,
            course_id: 7,
            name: "attachment.png".to_string(),
            size: 50,
        }],
    )]);

    let orchestrator = SyncOrchestrator::new(
        pool.clone(),
        Arc::new(MockApi { listings: listing }),
        Arc::new(MockTransfer {
            extras,
            ..Default::default()
        }),
        fast_config(),
    );

    let (worker_id, state) = run_to_completion(&orchestrator, vec![7]).await;
    assert_eq!(state, CourseSyncState::Completed);

    let rows = orchestrator.file_progress(worker_id).await.unwrap();
    assert_eq!(rows.len(), 2);
    let extra_row = rows.iter().find(|r| r.file_id == 900).unwrap();
    assert!(extra_row.additional_file);
    assert_eq!(extra_row.state, FileSyncState::Completed);

    let locals = SqliteLocalFileRepository::new(pool);
    assert!(locals.find_by_id(900).await.unwrap().is_some());
}

#[tokio::test]
async fn test_new_session_wipes_previous_progress() {
    let pool = create_test_pool().await.unwrap();
    enable_full_sync(&pool, 7).await;

    let orchestrator = SyncOrchestrator::new(
        pool.clone(),
        Arc::new(MockApi {
            listings: standard_listing(),
        }),
        Arc::new(MockTransfer::default()),
        fast_config(),
    );

    let (first_worker, _) = run_to_completion(&orchestrator, vec![7]).await;
    let (second_worker, state) = run_to_completion(&orchestrator, vec![7]).await;
    assert_eq!(state, CourseSyncState::Completed);
    assert_ne!(first_worker, second_worker);

    let progress = SqliteFileSyncProgressRepository::new(pool);
    assert!(progress.by_worker(first_worker).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_metadata_refresh_failure_fails_that_course_only() {
    let pool = create_test_pool().await.unwrap();
    enable_full_sync(&pool, 7).await;
    enable_full_sync(&pool, 8).await;

    // Course 8 has no listing entry; make the API fail for it instead.
    struct FlakyApi {
        good: HashMap<i64, Vec<RemoteFileInfo>>,
    }

    #[async_trait]
    impl ContentApi for FlakyApi {
        async fn list_course_files(
            &self,
            course_id: i64,
        ) -> bridge_traits::error::Result<Vec<RemoteFileInfo>> {
            self.good
                .get(&course_id)
                .cloned()
                .ok_or_else(|| BridgeError::Network("listing unavailable".to_string()))
        }

        async fn list_dashboard_cards(
            &self,
        ) -> bridge_traits::error::Result<Vec<DashboardCardInfo>> {
            Ok(Vec::new())
        }
    }

    let orchestrator = SyncOrchestrator::new(
        pool,
        Arc::new(FlakyApi {
            good: standard_listing(),
        }),
        Arc::new(MockTransfer::default()),
        fast_config(),
    );

    let (worker_id, state) = run_to_completion(&orchestrator, vec![7, 8]).await;
    assert_eq!(state, CourseSyncState::PartialFailure);

    let courses = orchestrator.course_progress(worker_id).await.unwrap();
    let state_of = |course_id| {
        courses
            .iter()
            .find(|c| c.course_id == course_id)
            .unwrap()
            .aggregate_state
    };
    assert_eq!(state_of(7), CourseSyncState::Completed);
    assert_eq!(state_of(8), CourseSyncState::Failed);
}

#[tokio::test]
async fn test_metadata_refresh_prunes_vanished_local_files() {
    let pool = create_test_pool().await.unwrap();

    // A leftover download for a file the remote listing no longer knows.
    let locals = SqliteLocalFileRepository::new(pool.clone());
    locals
        .upsert(&LocalFile {
            id: 999,
            course_id: 7,
            downloaded_at: 100,
            local_path: "/data/7/999".to_string(),
        })
        .await
        .unwrap();

    let orchestrator = SyncOrchestrator::new(
        pool.clone(),
        Arc::new(MockApi {
            listings: standard_listing(),
        }),
        Arc::new(MockTransfer::default()),
        fast_config(),
    );

    orchestrator.refresh_course_files(7).await.unwrap();

    assert!(locals.find_by_id(999).await.unwrap().is_none());
    let files = SqliteCourseFileRepository::new(pool)
        .all_for_course(7)
        .await
        .unwrap();
    assert_eq!(files.len(), 4);
}
