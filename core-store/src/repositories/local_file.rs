//! Local file repository
//!
//! Tracks completed downloads. A row here is the proof that a file exists on
//! disk; absence of a row marks the file as never downloaded.

use crate::error::Result;
use crate::models::LocalFile;
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};

// ============================================================================
// Repository Trait
// ============================================================================

/// Repository trait for local download records
#[async_trait]
pub trait LocalFileRepository: Send + Sync {
    /// Find a local file record by file ID
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn find_by_id(&self, id: i64) -> Result<Option<LocalFile>>;

    /// Get all local file records for a course
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn find_by_course(&self, course_id: i64) -> Result<Vec<LocalFile>>;

    /// Insert or update a local file record after a completed download
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn upsert(&self, file: &LocalFile) -> Result<()>;

    /// Delete a local file record
    ///
    /// # Returns
    ///
    /// `true` if a record was deleted, `false` if none existed
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Remove local records for files no longer present in course metadata
    ///
    /// # Returns
    ///
    /// The number of records removed
    async fn prune_missing_for_course(&self, course_id: i64) -> Result<u64>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of LocalFileRepository
pub struct SqliteLocalFileRepository {
    pool: SqlitePool,
}

impl SqliteLocalFileRepository {
    /// Create a new SQLite local file repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct LocalFileRow {
    id: i64,
    course_id: i64,
    downloaded_at: i64,
    local_path: String,
}

impl From<LocalFileRow> for LocalFile {
    fn from(row: LocalFileRow) -> Self {
        LocalFile {
            id: row.id,
            course_id: row.course_id,
            downloaded_at: row.downloaded_at,
            local_path: row.local_path,
        }
    }
}

#[async_trait]
impl LocalFileRepository for SqliteLocalFileRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<LocalFile>> {
        let row: Option<LocalFileRow> =
            sqlx::query_as("SELECT id, course_id, downloaded_at, local_path FROM local_files WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(LocalFile::from))
    }

    async fn find_by_course(&self, course_id: i64) -> Result<Vec<LocalFile>> {
        let rows: Vec<LocalFileRow> = sqlx::query_as(
            "SELECT id, course_id, downloaded_at, local_path FROM local_files \
             WHERE course_id = ? ORDER BY id",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(LocalFile::from).collect())
    }

    async fn upsert(&self, file: &LocalFile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO local_files (id, course_id, downloaded_at, local_path)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                course_id = excluded.course_id,
                downloaded_at = excluded.downloaded_at,
                local_path = excluded.local_path
            "#,
        )
        .bind(file.id)
        .bind(file.course_id)
        .bind(file.downloaded_at)
        .bind(&file.local_path)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM local_files WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn prune_missing_for_course(&self, course_id: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM local_files
            WHERE course_id = ?
              AND id NOT IN (
                  SELECT id FROM course_files WHERE course_id = ? AND is_folder = 0
              )
            "#,
        )
        .bind(course_id)
        .bind(course_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

// ============================================================================
// Tests
// ============================================================================
