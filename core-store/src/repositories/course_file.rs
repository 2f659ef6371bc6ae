//! Course file metadata repository
//!
//! Remote metadata is refreshed wholesale per course: the repository replaces
//! every row for a course inside a single transaction so concurrent readers
//! never observe a half-applied listing.

use crate::error::Result;
use crate::models::CourseFile;
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};

// ============================================================================
// Repository Trait
// ============================================================================

/// Repository trait for remote file metadata persistence
#[async_trait]
pub trait CourseFileRepository: Send + Sync {
    /// Replace all metadata rows for a course with the latest remote listing
    ///
    /// Runs as a single transaction: delete everything for the course, then
    /// insert the new rows. Rows absent from `files` disappear.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn replace_all_for_course(&self, course_id: i64, files: &[CourseFile]) -> Result<()>;

    /// Find a file or folder by ID
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn find_by_id(&self, id: i64) -> Result<Option<CourseFile>>;

    /// Get all metadata rows for a course, folders included
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn all_for_course(&self, course_id: i64) -> Result<Vec<CourseFile>>;

    /// Get the visible, non-folder files reachable from the course root folder
    ///
    /// Walks the folder tree starting at the root folder (the folder whose
    /// `parent_folder_id` is 0) and returns every non-hidden file under it,
    /// ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn files_under_course_tree(&self, course_id: i64) -> Result<Vec<CourseFile>>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of CourseFileRepository
pub struct SqliteCourseFileRepository {
    pool: SqlitePool,
}

impl SqliteCourseFileRepository {
    /// Create a new SQLite course file repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a course file
#[derive(Debug, FromRow)]
struct CourseFileRow {
    id: i64,
    parent_folder_id: i64,
    course_id: i64,
    context_id: i64,
    is_folder: bool,
    name: String,
    size: i64,
    is_hidden: bool,
    updated_at: i64,
    created_at: i64,
}

impl From<CourseFileRow> for CourseFile {
    fn from(row: CourseFileRow) -> Self {
        CourseFile {
            id: row.id,
            parent_folder_id: row.parent_folder_id,
            course_id: row.course_id,
            context_id: row.context_id,
            is_folder: row.is_folder,
            name: row.name,
            size: row.size,
            is_hidden: row.is_hidden,
            updated_at: row.updated_at,
            created_at: row.created_at,
        }
    }
}

const SELECT_COLUMNS: &str = "id, parent_folder_id, course_id, context_id, is_folder, \
     name, size, is_hidden, updated_at, created_at";

#[async_trait]
impl CourseFileRepository for SqliteCourseFileRepository {
    async fn replace_all_for_course(&self, course_id: i64, files: &[CourseFile]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM course_files WHERE course_id = ?")
            .bind(course_id)
            .execute(&mut *tx)
            .await?;

        for file in files {
            sqlx::query(
                r#"
                INSERT INTO course_files (
                    id, parent_folder_id, course_id, context_id, is_folder,
                    name, size, is_hidden, updated_at, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(file.id)
            .bind(file.parent_folder_id)
            .bind(file.course_id)
            .bind(file.context_id)
            .bind(file.is_folder)
            .bind(&file.name)
            .bind(file.size)
            .bind(file.is_hidden)
            .bind(file.updated_at)
            .bind(file.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<CourseFile>> {
        let row: Option<CourseFileRow> = sqlx::query_as(&format!(
            "SELECT {} FROM course_files WHERE id = ?",
            SELECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CourseFile::from))
    }

    async fn all_for_course(&self, course_id: i64) -> Result<Vec<CourseFile>> {
        let rows: Vec<CourseFileRow> = sqlx::query_as(&format!(
            "SELECT {} FROM course_files WHERE course_id = ? ORDER BY id",
            SELECT_COLUMNS
        ))
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CourseFile::from).collect())
    }

    async fn files_under_course_tree(&self, course_id: i64) -> Result<Vec<CourseFile>> {
        // Walk folders down from the root (parent_folder_id = 0), then pick
        // the visible files whose parent is one of those folders.
        let rows: Vec<CourseFileRow> = sqlx::query_as(
            r#"
            WITH RECURSIVE folder_tree(id) AS (
                SELECT id FROM course_files
                WHERE course_id = ? AND is_folder = 1 AND parent_folder_id = 0
                UNION ALL
                SELECT cf.id FROM course_files cf
                JOIN folder_tree ft ON cf.parent_folder_id = ft.id
                WHERE cf.course_id = ? AND cf.is_folder = 1
            )
            SELECT id, parent_folder_id, course_id, context_id, is_folder,
                   name, size, is_hidden, updated_at, created_at
            FROM course_files
            WHERE course_id = ?
              AND is_folder = 0
              AND is_hidden = 0
              AND parent_folder_id IN (SELECT id FROM folder_tree)
            ORDER BY id
            "#,
        )
        .bind(course_id)
        .bind(course_id)
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CourseFile::from).collect())
    }
}

// ============================================================================
// Tests
// ============================================================================
