//! Sync settings resolution
//!
//! Turns per-course configuration into the concrete set of file IDs a sync
//! session should consider. Resolution fails closed: a course with no
//! settings row, or a selective course with an empty selection, yields an
//! empty set rather than an implicit full sync.

use crate::Result;
use core_store::repositories::{CourseFileRepository, SyncSettingsRepository};
use core_store::CourseSyncSettings;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// How a course participates in offline sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Course is not configured for offline sync
    Disabled,
    /// Every visible file under the course tree is applicable
    Full,
    /// Only explicitly selected files are applicable
    Selective,
}

/// Resolves course sync settings into applicable file sets.
pub struct SyncSettingsResolver {
    settings_repo: Arc<dyn SyncSettingsRepository>,
    course_file_repo: Arc<dyn CourseFileRepository>,
}

impl SyncSettingsResolver {
    /// Create a new resolver over the given repositories
    pub fn new(
        settings_repo: Arc<dyn SyncSettingsRepository>,
        course_file_repo: Arc<dyn CourseFileRepository>,
    ) -> Self {
        Self {
            settings_repo,
            course_file_repo,
        }
    }

    /// Determine how a course participates in sync
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn sync_mode(&self, course_id: i64) -> Result<SyncMode> {
        Ok(match self.settings_repo.get(course_id).await? {
            None => SyncMode::Disabled,
            Some(CourseSyncSettings {
                full_sync_enabled: true,
                ..
            }) => SyncMode::Full,
            Some(_) => SyncMode::Selective,
        })
    }

    /// Compute the set of file IDs applicable for syncing a course
    ///
    /// Full-sync courses get every visible file reachable from the course
    /// root folder. Selective courses get the intersection of their
    /// selection set with those files, so stale selections pointing at
    /// removed or hidden files drop out.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn applicable_file_ids(&self, course_id: i64) -> Result<BTreeSet<i64>> {
        let mode = self.sync_mode(course_id).await?;
        if mode == SyncMode::Disabled {
            debug!(course_id, "course not configured for sync");
            return Ok(BTreeSet::new());
        }

        let tree_files: BTreeSet<i64> = self
            .course_file_repo
            .files_under_course_tree(course_id)
            .await?
            .into_iter()
            .map(|f| f.id)
            .collect();

        let applicable = match mode {
            SyncMode::Full => tree_files,
            SyncMode::Selective => {
                let selected = self.settings_repo.selections_for_course(course_id).await?;
                selected.intersection(&tree_files).copied().collect()
            }
            SyncMode::Disabled => unreachable!(),
        };

        debug!(course_id, count = applicable.len(), "resolved applicable files");
        Ok(applicable)
    }

    /// Get the courses configured for sync, in course ID order
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn configured_courses(&self) -> Result<Vec<CourseSyncSettings>> {
        Ok(self.settings_repo.all().await?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use core_store::create_test_pool;
    use core_store::models::CourseFile;
    use core_store::repositories::{
        SqliteCourseFileRepository, SqliteSyncSettingsRepository,
    };

    fn entry(id: i64, parent: i64, is_folder: bool) -> CourseFile {
        CourseFile {
            id,
            parent_folder_id: parent,
            course_id: 7,
            context_id: 7,
            is_folder,
            name: format!("entry-{}", id),
            size: if is_folder { 0 } else { 100 },
            is_hidden: false,
            updated_at: 100,
            created_at: 100,
        }
    }

    async fn setup() -> (
        SyncSettingsResolver,
        Arc<SqliteSyncSettingsRepository>,
        Arc<SqliteCourseFileRepository>,
    ) {
        let pool = create_test_pool().await.unwrap();
        let settings = Arc::new(SqliteSyncSettingsRepository::new(pool.clone()));
        let files = Arc::new(SqliteCourseFileRepository::new(pool));
        let resolver = SyncSettingsResolver::new(settings.clone(), files.clone());
        (resolver, settings, files)
    }

    #[tokio::test]
    async fn test_unconfigured_course_resolves_empty() {
        let (resolver, _, files) = setup().await;
        files
            .replace_all_for_course(7, &[entry(10, 0, true), entry(11, 10, false)])
            .await
            .unwrap();

        assert_eq!(resolver.sync_mode(7).await.unwrap(), SyncMode::Disabled);
        assert!(resolver.applicable_file_ids(7).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_full_sync_takes_whole_tree() {
        let (resolver, settings, files) = setup().await;
        files
            .replace_all_for_course(
                7,
                &[entry(10, 0, true), entry(11, 10, false), entry(12, 10, false)],
            )
            .await
            .unwrap();
        settings
            .upsert(&CourseSyncSettings {
                course_id: 7,
                full_sync_enabled: true,
            })
            .await
            .unwrap();

        let ids = resolver.applicable_file_ids(7).await.unwrap();
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec![11, 12]);
    }

    #[tokio::test]
    async fn test_selective_intersects_with_tree() {
        let (resolver, settings, files) = setup().await;
        files
            .replace_all_for_course(7, &[entry(10, 0, true), entry(11, 10, false)])
            .await
            .unwrap();
        settings
            .upsert(&CourseSyncSettings {
                course_id: 7,
                full_sync_enabled: false,
            })
            .await
            .unwrap();
        settings.add_selection(7, 11).await.unwrap();
        // Selection pointing at a file no longer present remotely.
        settings.add_selection(7, 99).await.unwrap();

        assert_eq!(resolver.sync_mode(7).await.unwrap(), SyncMode::Selective);
        let ids = resolver.applicable_file_ids(7).await.unwrap();
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec![11]);
    }

    #[tokio::test]
    async fn test_selective_with_empty_selection_resolves_empty() {
        let (resolver, settings, files) = setup().await;
        files
            .replace_all_for_course(7, &[entry(10, 0, true), entry(11, 10, false)])
            .await
            .unwrap();
        settings
            .upsert(&CourseSyncSettings {
                course_id: 7,
                full_sync_enabled: false,
            })
            .await
            .unwrap();

        assert!(resolver.applicable_file_ids(7).await.unwrap().is_empty());
    }
}
