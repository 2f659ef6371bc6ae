//! Staleness detection
//!
//! Decides which applicable files actually need downloading by comparing
//! remote metadata timestamps against the completed-download record.

use crate::Result;
use core_store::repositories::{CourseFileRepository, LocalFileRepository};
use core_store::{CourseFile, LocalFile};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Check whether a remote file needs (re-)downloading.
///
/// A file is stale when no local record exists, or when the remote copy was
/// updated or created after the local download finished. Equal timestamps
/// are fresh: a download completed in the same second as the remote update
/// is not re-fetched.
pub fn is_stale(remote: &CourseFile, local: Option<&LocalFile>) -> bool {
    match local {
        None => true,
        Some(local) => {
            remote.updated_at > local.downloaded_at || remote.created_at > local.downloaded_at
        }
    }
}

/// Computes the stale subset of a course's applicable files.
pub struct StalenessDetector {
    course_file_repo: Arc<dyn CourseFileRepository>,
    local_file_repo: Arc<dyn LocalFileRepository>,
}

impl StalenessDetector {
    /// Create a new detector over the given repositories
    pub fn new(
        course_file_repo: Arc<dyn CourseFileRepository>,
        local_file_repo: Arc<dyn LocalFileRepository>,
    ) -> Self {
        Self {
            course_file_repo,
            local_file_repo,
        }
    }

    /// Return the stale files among `applicable`, ordered by file ID
    ///
    /// Applicable IDs with no metadata row are skipped; staleness is only
    /// defined for files the metadata store still knows about.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn detect(
        &self,
        course_id: i64,
        applicable: &BTreeSet<i64>,
    ) -> Result<Vec<CourseFile>> {
        if applicable.is_empty() {
            return Ok(Vec::new());
        }

        let locals: std::collections::HashMap<i64, LocalFile> = self
            .local_file_repo
            .find_by_course(course_id)
            .await?
            .into_iter()
            .map(|f| (f.id, f))
            .collect();

        let mut stale = Vec::new();
        for remote in self.course_file_repo.all_for_course(course_id).await? {
            if remote.is_folder || !applicable.contains(&remote.id) {
                continue;
            }
            if is_stale(&remote, locals.get(&remote.id)) {
                stale.push(remote);
            }
        }

        // all_for_course returns rows ordered by id already; keep the
        // guarantee explicit in case the query changes.
        stale.sort_by_key(|f| f.id);
        debug!(course_id, stale = stale.len(), "staleness scan complete");
        Ok(stale)
    }
}

// ============================================================================
// Tests
// ============================================================================
