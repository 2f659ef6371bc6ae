//! Sync settings repository
//!
//! Per-course sync configuration and the per-file selection set used when a
//! course is not in full-sync mode.

use crate::error::Result;
use crate::models::CourseSyncSettings;
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};
use std::collections::BTreeSet;

// ============================================================================
// Repository Trait
// ============================================================================

/// Repository trait for sync settings persistence
#[async_trait]
pub trait SyncSettingsRepository: Send + Sync {
    /// Get the sync settings for a course, if any exist
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn get(&self, course_id: i64) -> Result<Option<CourseSyncSettings>>;

    /// Get sync settings for every configured course
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn all(&self) -> Result<Vec<CourseSyncSettings>>;

    /// Insert or update the sync settings for a course
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn upsert(&self, settings: &CourseSyncSettings) -> Result<()>;

    /// Get the explicitly selected file IDs for a course
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn selections_for_course(&self, course_id: i64) -> Result<BTreeSet<i64>>;

    /// Add a file to the per-file selection set for a course
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn add_selection(&self, course_id: i64, file_id: i64) -> Result<()>;

    /// Remove a file from the per-file selection set for a course
    ///
    /// # Returns
    ///
    /// `true` if a selection was removed, `false` if none existed
    async fn remove_selection(&self, course_id: i64, file_id: i64) -> Result<bool>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of SyncSettingsRepository
pub struct SqliteSyncSettingsRepository {
    pool: SqlitePool,
}

impl SqliteSyncSettingsRepository {
    /// Create a new SQLite sync settings repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct SettingsRow {
    course_id: i64,
    full_sync_enabled: bool,
}

impl From<SettingsRow> for CourseSyncSettings {
    fn from(row: SettingsRow) -> Self {
        CourseSyncSettings {
            course_id: row.course_id,
            full_sync_enabled: row.full_sync_enabled,
        }
    }
}

#[async_trait]
impl SyncSettingsRepository for SqliteSyncSettingsRepository {
    async fn get(&self, course_id: i64) -> Result<Option<CourseSyncSettings>> {
        let row: Option<SettingsRow> = sqlx::query_as(
            "SELECT course_id, full_sync_enabled FROM course_sync_settings WHERE course_id = ?",
        )
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CourseSyncSettings::from))
    }

    async fn all(&self) -> Result<Vec<CourseSyncSettings>> {
        let rows: Vec<SettingsRow> = sqlx::query_as(
            "SELECT course_id, full_sync_enabled FROM course_sync_settings ORDER BY course_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CourseSyncSettings::from).collect())
    }

    async fn upsert(&self, settings: &CourseSyncSettings) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO course_sync_settings (course_id, full_sync_enabled)
            VALUES (?, ?)
            ON CONFLICT(course_id) DO UPDATE SET
                full_sync_enabled = excluded.full_sync_enabled
            "#,
        )
        .bind(settings.course_id)
        .bind(settings.full_sync_enabled)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn selections_for_course(&self, course_id: i64) -> Result<BTreeSet<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT file_id FROM file_sync_selections WHERE course_id = ? ORDER BY file_id",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn add_selection(&self, course_id: i64, file_id: i64) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO file_sync_selections (course_id, file_id) VALUES (?, ?)",
        )
        .bind(course_id)
        .bind(file_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove_selection(&self, course_id: i64, file_id: i64) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM file_sync_selections WHERE course_id = ? AND file_id = ?")
                .bind(course_id)
                .bind(file_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[tokio::test]
    async fn test_settings_upsert_and_get() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteSyncSettingsRepository::new(pool);

        assert!(repo.get(7).await.unwrap().is_none());

        repo.upsert(&CourseSyncSettings {
            course_id: 7,
            full_sync_enabled: true,
        })
        .await
        .unwrap();

        let settings = repo.get(7).await.unwrap().unwrap();
        assert!(settings.full_sync_enabled);

        repo.upsert(&CourseSyncSettings {
            course_id: 7,
            full_sync_enabled: false,
        })
        .await
        .unwrap();

        let settings = repo.get(7).await.unwrap().unwrap();
        assert!(!settings.full_sync_enabled);
        assert_eq!(repo.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_selection_set() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteSyncSettingsRepository::new(pool);

        repo.add_selection(7, 11).await.unwrap();
        repo.add_selection(7, 12).await.unwrap();
        // Duplicate add is a no-op.
        repo.add_selection(7, 11).await.unwrap();

        let selected = repo.selections_for_course(7).await.unwrap();
        assert_eq!(selected.into_iter().collect::<Vec<_>>(), vec![11, 12]);

        assert!(repo.remove_selection(7, 11).await.unwrap());
        assert!(!repo.remove_selection(7, 11).await.unwrap());
        assert_eq!(repo.selections_for_course(7).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_selections_scoped_per_course() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteSyncSettingsRepository::new(pool);

        repo.add_selection(7, 11).await.unwrap();
        repo.add_selection(8, 11).await.unwrap();

        assert!(repo.remove_selection(7, 11).await.unwrap());
        assert_eq!(repo.selections_for_course(8).await.unwrap().len(), 1);
    }
}
