//! Snapshot cache replacement
//!
//! Pulls fresh metadata from the remote API and swaps it into the local
//! cache wholesale. Course file listings are replaced per course and the
//! dashboard card set is replaced as a single snapshot, each inside one
//! transaction so readers never see a partial refresh. A failed fetch
//! leaves the previous cache untouched.

use crate::Result;
use bridge_traits::ContentApi;
use core_store::repositories::{CourseFileRepository, DashboardRepository, LocalFileRepository};
use core_store::{CourseFile, DashboardCard};
use std::sync::Arc;
use tracing::{info, instrument};

/// Replaces cached snapshots with fresh remote state.
pub struct SnapshotReplacer {
    content_api: Arc<dyn ContentApi>,
    course_file_repo: Arc<dyn CourseFileRepository>,
    local_file_repo: Arc<dyn LocalFileRepository>,
    dashboard_repo: Arc<dyn DashboardRepository>,
}

impl SnapshotReplacer {
    /// Create a new replacer over the given API and repositories
    pub fn new(
        content_api: Arc<dyn ContentApi>,
        course_file_repo: Arc<dyn CourseFileRepository>,
        local_file_repo: Arc<dyn LocalFileRepository>,
        dashboard_repo: Arc<dyn DashboardRepository>,
    ) -> Self {
        Self {
            content_api,
            course_file_repo,
            local_file_repo,
            dashboard_repo,
        }
    }

    /// Refresh the metadata cache for one course from the remote listing
    ///
    /// Replaces every `course_files` row for the course and prunes local
    /// download records whose file no longer exists remotely.
    ///
    /// # Returns
    ///
    /// The number of metadata rows in the new listing
    ///
    /// # Errors
    ///
    /// Returns an error if the remote fetch or database operation fails;
    /// the previous cache is left intact
    #[instrument(skip(self), fields(course_id = course_id))]
    pub async fn refresh_course_files(&self, course_id: i64) -> Result<usize> {
        let listing = self.content_api.list_course_files(course_id).await?;
        let files: Vec<CourseFile> = listing.into_iter().map(CourseFile::from).collect();
        let count = files.len();

        self.course_file_repo
            .replace_all_for_course(course_id, &files)
            .await?;
        let pruned = self.local_file_repo.prune_missing_for_course(course_id).await?;

        info!(course_id, count, pruned, "refreshed course file metadata");
        Ok(count)
    }

    /// Refresh the dashboard card snapshot
    ///
    /// # Returns
    ///
    /// The number of cards in the new snapshot
    ///
    /// # Errors
    ///
    /// Returns an error if the remote fetch or database operation fails;
    /// the previous snapshot is left intact
    #[instrument(skip(self))]
    pub async fn refresh_dashboard(&self) -> Result<usize> {
        let cards: Vec<DashboardCard> = self
            .content_api
            .list_dashboard_cards()
            .await?
            .into_iter()
            .map(DashboardCard::from)
            .collect();
        let count = cards.len();

        self.dashboard_repo.replace_all(&cards).await?;

        info!(count, "replaced dashboard snapshot");
        Ok(count)
    }
}

// ============================================================================
// Tests
// ============================================================================
