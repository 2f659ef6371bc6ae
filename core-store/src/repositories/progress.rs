//! Sync progress repositories
//!
//! Three session-scoped tables share this module: per-file progress rows,
//! per-course aggregate rows, and coarse progress steps. All three are keyed
//! by the session's worker ID and wiped together when a new session begins.

use crate::error::Result;
use crate::models::{
    CourseSyncProgress, CourseSyncState, FileSyncProgress, FileSyncState, SyncProgressStep,
    WorkerId,
};
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};

// ============================================================================
// File Progress
// ============================================================================

/// Repository trait for per-file sync progress rows
#[async_trait]
pub trait FileSyncProgressRepository: Send + Sync {
    /// Insert a progress row and return its database-assigned ID
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn insert(&self, progress: &FileSyncProgress) -> Result<i64>;

    /// Find a progress row by ID
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn find_by_id(&self, id: i64) -> Result<Option<FileSyncProgress>>;

    /// Set the state of a progress row and bump its update timestamp
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn set_state(&self, id: i64, state: FileSyncState) -> Result<()>;

    /// Update the byte counters of a progress row
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn update_bytes(&self, id: i64, bytes_done: i64, bytes_total: i64) -> Result<()>;

    /// Get every progress row for a session
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn by_worker(&self, worker_id: WorkerId) -> Result<Vec<FileSyncProgress>>;

    /// Get a course's progress rows within a session
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn by_course_and_worker(
        &self,
        course_id: i64,
        worker_id: WorkerId,
    ) -> Result<Vec<FileSyncProgress>>;

    /// Move every session row currently in one of `from` into `to`
    ///
    /// Used by the cancel sweep and by the storage-full abort to settle rows
    /// their download task will never touch.
    ///
    /// # Returns
    ///
    /// The number of rows moved
    async fn mark_states_for_worker(
        &self,
        worker_id: WorkerId,
        from: &[FileSyncState],
        to: FileSyncState,
    ) -> Result<u64>;

    /// Wipe all session-scoped progress data in one transaction
    ///
    /// Clears file progress, course progress, and progress steps together so
    /// a new session never sees leftovers from a previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn clear_session_scoped(&self) -> Result<()>;
}

/// SQLite implementation of FileSyncProgressRepository
pub struct SqliteFileSyncProgressRepository {
    pool: SqlitePool,
}

impl SqliteFileSyncProgressRepository {
    /// Create a new SQLite file sync progress repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct FileProgressRow {
    id: i64,
    course_id: i64,
    file_id: i64,
    worker_id: String,
    additional_file: bool,
    state: String,
    bytes_done: i64,
    bytes_total: i64,
    updated_at: i64,
}

impl TryFrom<FileProgressRow> for FileSyncProgress {
    type Error = crate::StoreError;

    fn try_from(row: FileProgressRow) -> Result<Self> {
        Ok(FileSyncProgress {
            id: row.id,
            course_id: row.course_id,
            file_id: row.file_id,
            worker_id: WorkerId::from_string(&row.worker_id)?,
            additional_file: row.additional_file,
            state: row.state.parse()?,
            bytes_done: row.bytes_done,
            bytes_total: row.bytes_total,
            updated_at: row.updated_at,
        })
    }
}

const FILE_PROGRESS_COLUMNS: &str =
    "id, course_id, file_id, worker_id, additional_file, state, bytes_done, bytes_total, updated_at";

#[async_trait]
impl FileSyncProgressRepository for SqliteFileSyncProgressRepository {
    async fn insert(&self, progress: &FileSyncProgress) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO file_sync_progress (
                course_id, file_id, worker_id, additional_file,
                state, bytes_done, bytes_total, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(progress.course_id)
        .bind(progress.file_id)
        .bind(progress.worker_id.as_str())
        .bind(progress.additional_file)
        .bind(progress.state.as_str())
        .bind(progress.bytes_done)
        .bind(progress.bytes_total)
        .bind(progress.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<FileSyncProgress>> {
        let row: Option<FileProgressRow> = sqlx::query_as(&format!(
            "SELECT {} FROM file_sync_progress WHERE id = ?",
            FILE_PROGRESS_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(FileSyncProgress::try_from).transpose()
    }

    async fn set_state(&self, id: i64, state: FileSyncState) -> Result<()> {
        sqlx::query("UPDATE file_sync_progress SET state = ?, updated_at = ? WHERE id = ?")
            .bind(state.as_str())
            .bind(chrono::Utc::now().timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update_bytes(&self, id: i64, bytes_done: i64, bytes_total: i64) -> Result<()> {
        sqlx::query(
            "UPDATE file_sync_progress SET bytes_done = ?, bytes_total = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(bytes_done)
        .bind(bytes_total)
        .bind(chrono::Utc::now().timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn by_worker(&self, worker_id: WorkerId) -> Result<Vec<FileSyncProgress>> {
        let rows: Vec<FileProgressRow> = sqlx::query_as(&format!(
            "SELECT {} FROM file_sync_progress WHERE worker_id = ? ORDER BY id",
            FILE_PROGRESS_COLUMNS
        ))
        .bind(worker_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(FileSyncProgress::try_from).collect()
    }

    async fn by_course_and_worker(
        &self,
        course_id: i64,
        worker_id: WorkerId,
    ) -> Result<Vec<FileSyncProgress>> {
        let rows: Vec<FileProgressRow> = sqlx::query_as(&format!(
            "SELECT {} FROM file_sync_progress WHERE course_id = ? AND worker_id = ? ORDER BY id",
            FILE_PROGRESS_COLUMNS
        ))
        .bind(course_id)
        .bind(worker_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(FileSyncProgress::try_from).collect()
    }

    async fn mark_states_for_worker(
        &self,
        worker_id: WorkerId,
        from: &[FileSyncState],
        to: FileSyncState,
    ) -> Result<u64> {
        if from.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; from.len()].join(", ");
        let sql = format!(
            "UPDATE file_sync_progress SET state = ?, updated_at = ? \
             WHERE worker_id = ? AND state IN ({})",
            placeholders
        );

        let mut query = sqlx::query(&sql)
            .bind(to.as_str())
            .bind(chrono::Utc::now().timestamp())
            .bind(worker_id.as_str());
        for state in from {
            query = query.bind(state.as_str());
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn clear_session_scoped(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM file_sync_progress")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM course_sync_progress")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM sync_progress_steps")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

// ============================================================================
// Course Progress
// ============================================================================

/// Repository trait for per-course sync progress rows
#[async_trait]
pub trait CourseSyncProgressRepository: Send + Sync {
    /// Insert or update a course progress row
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn upsert(&self, progress: &CourseSyncProgress) -> Result<()>;

    /// Get a course's progress row within a session
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn get(&self, course_id: i64, worker_id: WorkerId) -> Result<Option<CourseSyncProgress>>;

    /// Get every course progress row for a session
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn by_worker(&self, worker_id: WorkerId) -> Result<Vec<CourseSyncProgress>>;

    /// Set the lifecycle state of a course within a session
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn set_state(
        &self,
        course_id: i64,
        worker_id: WorkerId,
        state: CourseSyncState,
    ) -> Result<()>;

    /// Set the recomputed aggregate state of a course within a session
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn set_aggregate_state(
        &self,
        course_id: i64,
        worker_id: WorkerId,
        state: CourseSyncState,
    ) -> Result<()>;
}

/// SQLite implementation of CourseSyncProgressRepository
pub struct SqliteCourseSyncProgressRepository {
    pool: SqlitePool,
}

impl SqliteCourseSyncProgressRepository {
    /// Create a new SQLite course sync progress repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct CourseProgressRow {
    course_id: i64,
    worker_id: String,
    state: String,
    aggregate_state: String,
    started_at: i64,
}

impl TryFrom<CourseProgressRow> for CourseSyncProgress {
    type Error = crate::StoreError;

    fn try_from(row: CourseProgressRow) -> Result<Self> {
        Ok(CourseSyncProgress {
            course_id: row.course_id,
            worker_id: WorkerId::from_string(&row.worker_id)?,
            state: row.state.parse()?,
            aggregate_state: row.aggregate_state.parse()?,
            started_at: row.started_at,
        })
    }
}

#[async_trait]
impl CourseSyncProgressRepository for SqliteCourseSyncProgressRepository {
    async fn upsert(&self, progress: &CourseSyncProgress) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO course_sync_progress (
                course_id, worker_id, state, aggregate_state, started_at
            ) VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(course_id, worker_id) DO UPDATE SET
                state = excluded.state,
                aggregate_state = excluded.aggregate_state,
                started_at = excluded.started_at
            "#,
        )
        .bind(progress.course_id)
        .bind(progress.worker_id.as_str())
        .bind(progress.state.as_str())
        .bind(progress.aggregate_state.as_str())
        .bind(progress.started_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, course_id: i64, worker_id: WorkerId) -> Result<Option<CourseSyncProgress>> {
        let row: Option<CourseProgressRow> = sqlx::query_as(
            "SELECT course_id, worker_id, state, aggregate_state, started_at \
             FROM course_sync_progress WHERE course_id = ? AND worker_id = ?",
        )
        .bind(course_id)
        .bind(worker_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(CourseSyncProgress::try_from).transpose()
    }

    async fn by_worker(&self, worker_id: WorkerId) -> Result<Vec<CourseSyncProgress>> {
        let rows: Vec<CourseProgressRow> = sqlx::query_as(
            "SELECT course_id, worker_id, state, aggregate_state, started_at \
             FROM course_sync_progress WHERE worker_id = ? ORDER BY course_id",
        )
        .bind(worker_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CourseSyncProgress::try_from).collect()
    }

    async fn set_state(
        &self,
        course_id: i64,
        worker_id: WorkerId,
        state: CourseSyncState,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE course_sync_progress SET state = ? WHERE course_id = ? AND worker_id = ?",
        )
        .bind(state.as_str())
        .bind(course_id)
        .bind(worker_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_aggregate_state(
        &self,
        course_id: i64,
        worker_id: WorkerId,
        state: CourseSyncState,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE course_sync_progress SET aggregate_state = ? \
             WHERE course_id = ? AND worker_id = ?",
        )
        .bind(state.as_str())
        .bind(course_id)
        .bind(worker_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ============================================================================
// Progress Steps
// ============================================================================

/// Repository trait for coarse session progress steps
#[async_trait]
pub trait ProgressStepRepository: Send + Sync {
    /// Record a progress step and return its database-assigned ID
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn insert(&self, worker_id: WorkerId, course_id: i64, title: &str) -> Result<i64>;

    /// Get every recorded step for a session, in insertion order
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn by_worker(&self, worker_id: WorkerId) -> Result<Vec<SyncProgressStep>>;
}

/// SQLite implementation of ProgressStepRepository
pub struct SqliteProgressStepRepository {
    pool: SqlitePool,
}

impl SqliteProgressStepRepository {
    /// Create a new SQLite progress step repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct StepRow {
    id: i64,
    worker_id: String,
    course_id: i64,
    title: String,
}

impl TryFrom<StepRow> for SyncProgressStep {
    type Error = crate::StoreError;

    fn try_from(row: StepRow) -> Result<Self> {
        Ok(SyncProgressStep {
            id: row.id,
            worker_id: WorkerId::from_string(&row.worker_id)?,
            course_id: row.course_id,
            title: row.title,
        })
    }
}

#[async_trait]
impl ProgressStepRepository for SqliteProgressStepRepository {
    async fn insert(&self, worker_id: WorkerId, course_id: i64, title: &str) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO sync_progress_steps (worker_id, course_id, title) VALUES (?, ?, ?)",
        )
        .bind(worker_id.as_str())
        .bind(course_id)
        .bind(title)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn by_worker(&self, worker_id: WorkerId) -> Result<Vec<SyncProgressStep>> {
        let rows: Vec<StepRow> = sqlx::query_as(
            "SELECT id, worker_id, course_id, title FROM sync_progress_steps \
             WHERE worker_id = ? ORDER BY id",
        )
        .bind(worker_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SyncProgressStep::try_from).collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
