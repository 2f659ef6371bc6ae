//! Entity models for the offline content cache.
//!
//! Each type maps to one SQLite table created by the initial migration.
//! Remote metadata (`CourseFile`) and sync settings are durable; progress
//! records are scoped to a sync session identified by a [`WorkerId`] and
//! wiped when a new session starts.

use crate::{Result, StoreError};
use bridge_traits::content::{DashboardCardInfo, RemoteFileInfo};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Correlation identifier grouping all progress records created by one
/// invocation of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(Uuid);

impl WorkerId {
    /// Create a new random worker ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a worker ID from its string form
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Ok(Self(Uuid::parse_str(s).map_err(|e| {
            StoreError::InvalidInput {
                field: "worker_id".to_string(),
                message: e.to_string(),
            }
        })?))
    }

    /// Get the string representation of this ID
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// State Types
// ============================================================================

/// Lifecycle state of a single scheduled download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSyncState {
    /// Scheduled but not yet started
    Pending,
    /// Transfer in flight
    InProgress,
    /// Transfer finished and the local file record was written
    Completed,
    /// Transfer failed; the row is retained for drill-down
    Failed,
    /// Session was cancelled before the transfer finished
    Cancelled,
}

impl FileSyncState {
    /// Check if this state represents a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FileSyncState::Completed | FileSyncState::Failed | FileSyncState::Cancelled
        )
    }

    /// Get the string representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            FileSyncState::Pending => "pending",
            FileSyncState::InProgress => "in_progress",
            FileSyncState::Completed => "completed",
            FileSyncState::Failed => "failed",
            FileSyncState::Cancelled => "cancelled",
        }
    }
}

impl FromStr for FileSyncState {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(FileSyncState::Pending),
            "in_progress" => Ok(FileSyncState::InProgress),
            "completed" => Ok(FileSyncState::Completed),
            "failed" => Ok(FileSyncState::Failed),
            "cancelled" => Ok(FileSyncState::Cancelled),
            _ => Err(StoreError::InvalidInput {
                field: "state".to_string(),
                message: format!("unknown file sync state: {}", s),
            }),
        }
    }
}

impl std::fmt::Display for FileSyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Aggregate state of a course within a sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseSyncState {
    /// Course has no progress rows yet
    NotStarted,
    /// At least one file row is still pending or in flight
    InProgress,
    /// Every file row completed
    Completed,
    /// Mixed completed/failed file rows
    PartialFailure,
    /// Every file row failed
    Failed,
    /// Session cancelled while the course had unfinished rows
    Cancelled,
}

impl CourseSyncState {
    /// Check if this state represents a terminal state
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            CourseSyncState::NotStarted | CourseSyncState::InProgress
        )
    }

    /// Get the string representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            CourseSyncState::NotStarted => "not_started",
            CourseSyncState::InProgress => "in_progress",
            CourseSyncState::Completed => "completed",
            CourseSyncState::PartialFailure => "partial_failure",
            CourseSyncState::Failed => "failed",
            CourseSyncState::Cancelled => "cancelled",
        }
    }
}

impl FromStr for CourseSyncState {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "not_started" => Ok(CourseSyncState::NotStarted),
            "in_progress" => Ok(CourseSyncState::InProgress),
            "completed" => Ok(CourseSyncState::Completed),
            "partial_failure" => Ok(CourseSyncState::PartialFailure),
            "failed" => Ok(CourseSyncState::Failed),
            "cancelled" => Ok(CourseSyncState::Cancelled),
            _ => Err(StoreError::InvalidInput {
                field: "state".to_string(),
                message: format!("unknown course sync state: {}", s),
            }),
        }
    }
}

impl std::fmt::Display for CourseSyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Entities
// ============================================================================

/// Last-known remote metadata for a file or folder.
///
/// Refreshed wholesale on every metadata fetch: rows absent from the latest
/// listing are removed. The course root folder is the only folder whose
/// `parent_folder_id` is 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseFile {
    pub id: i64,
    pub parent_folder_id: i64,
    pub course_id: i64,
    pub context_id: i64,
    pub is_folder: bool,
    pub name: String,
    pub size: i64,
    pub is_hidden: bool,
    pub updated_at: i64,
    pub created_at: i64,
}

impl From<RemoteFileInfo> for CourseFile {
    fn from(info: RemoteFileInfo) -> Self {
        Self {
            id: info.id,
            parent_folder_id: info.parent_folder_id,
            course_id: info.course_id,
            context_id: info.context_id,
            is_folder: info.is_folder,
            name: info.name,
            size: info.size,
            is_hidden: info.is_hidden,
            updated_at: info.updated_at,
            created_at: info.created_at,
        }
    }
}

/// A successfully completed local download.
///
/// Created only on download completion; `downloaded_at` is the comparison
/// point for staleness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalFile {
    pub id: i64,
    pub course_id: i64,
    pub downloaded_at: i64,
    pub local_path: String,
}

/// Per-course offline sync configuration.
///
/// A course with no settings row is not enrolled in offline sync at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSyncSettings {
    pub course_id: i64,
    pub full_sync_enabled: bool,
}

/// One scheduled download within a sync session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSyncProgress {
    pub id: i64,
    pub course_id: i64,
    pub file_id: i64,
    pub worker_id: WorkerId,
    /// File pulled in implicitly during orchestration (e.g. an embedded
    /// attachment) rather than by the initial staleness scan.
    pub additional_file: bool,
    pub state: FileSyncState,
    pub bytes_done: i64,
    pub bytes_total: i64,
    pub updated_at: i64,
}

impl FileSyncProgress {
    /// Create a pending row for a newly scheduled download.
    ///
    /// The `id` is assigned by the database on insert.
    pub fn scheduled(
        course_id: i64,
        file_id: i64,
        worker_id: WorkerId,
        bytes_total: i64,
        additional_file: bool,
    ) -> Self {
        Self {
            id: 0,
            course_id,
            file_id,
            worker_id,
            additional_file,
            state: FileSyncState::Pending,
            bytes_done: 0,
            bytes_total,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// One course participating in a sync session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSyncProgress {
    pub course_id: i64,
    pub worker_id: WorkerId,
    /// Lifecycle marker set by the orchestrator at session boundaries
    pub state: CourseSyncState,
    /// Pure projection recomputed from the course's file rows
    pub aggregate_state: CourseSyncState,
    pub started_at: i64,
}

/// Coarse session-scoped progress entry independent of file-level detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProgressStep {
    pub id: i64,
    pub worker_id: WorkerId,
    pub course_id: i64,
    pub title: String,
}

/// One card in the dashboard snapshot.
///
/// The whole snapshot is replaced on every refresh; there is no per-row
/// staleness comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardCard {
    pub id: i64,
    pub course_id: i64,
    pub position: i64,
    pub title: String,
    pub image_url: Option<String>,
}

impl From<DashboardCardInfo> for DashboardCard {
    fn from(info: DashboardCardInfo) -> Self {
        Self {
            id: info.id,
            course_id: info.course_id,
            position: info.position,
            title: info.title,
            image_url: info.image_url,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_id_roundtrip() {
        let id = WorkerId::new();
        let parsed = WorkerId::from_string(&id.as_str()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_worker_id_rejects_garbage() {
        assert!(WorkerId::from_string("not-a-uuid").is_err());
    }

    #[test]
    fn test_file_sync_state_roundtrip() {
        for state in [
            FileSyncState::Pending,
            FileSyncState::InProgress,
            FileSyncState::Completed,
            FileSyncState::Failed,
            FileSyncState::Cancelled,
        ] {
            assert_eq!(state.as_str().parse::<FileSyncState>().unwrap(), state);
        }
        assert!("running".parse::<FileSyncState>().is_err());
    }

    #[test]
    fn test_file_sync_state_terminal() {
        assert!(!FileSyncState::Pending.is_terminal());
        assert!(!FileSyncState::InProgress.is_terminal());
        assert!(FileSyncState::Completed.is_terminal());
        assert!(FileSyncState::Failed.is_terminal());
        assert!(FileSyncState::Cancelled.is_terminal());
    }

    #[test]
    fn test_course_sync_state_roundtrip() {
        for state in [
            CourseSyncState::NotStarted,
            CourseSyncState::InProgress,
            CourseSyncState::Completed,
            CourseSyncState::PartialFailure,
            CourseSyncState::Failed,
            CourseSyncState::Cancelled,
        ] {
            assert_eq!(state.as_str().parse::<CourseSyncState>().unwrap(), state);
        }
    }

    #[test]
    fn test_scheduled_progress_row() {
        let worker_id = WorkerId::new();
        let row = FileSyncProgress::scheduled(7, 42, worker_id, 1024, false);

        assert_eq!(row.state, FileSyncState::Pending);
        assert_eq!(row.bytes_done, 0);
        assert_eq!(row.bytes_total, 1024);
        assert!(!row.additional_file);
        assert_eq!(row.worker_id, worker_id);
    }

    #[test]
    fn test_course_file_from_remote_info() {
        let info = RemoteFileInfo {
            id: 5,
            parent_folder_id: 1,
            course_id: 7,
            context_id: 7,
            is_folder: false,
            name: "syllabus.pdf".to_string(),
            size: 2048,
            is_hidden: false,
            updated_at: 200,
            created_at: 100,
        };

        let file = CourseFile::from(info);
        assert_eq!(file.id, 5);
        assert_eq!(file.course_id, 7);
        assert!(!file.is_folder);
    }
}
