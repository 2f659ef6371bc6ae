//! Progress aggregation
//!
//! Projects a course's per-file progress rows into a single aggregate state
//! and a byte-weighted completion fraction. The projection is pure; the
//! aggregator persists the result on the course progress row.

use crate::Result;
use core_store::repositories::{CourseSyncProgressRepository, FileSyncProgressRepository};
use core_store::{CourseSyncState, FileSyncProgress, FileSyncState, WorkerId};
use std::sync::Arc;
use tracing::debug;

/// Fold a course's file rows into one aggregate state.
///
/// A course with no rows is complete (nothing was stale). Any non-terminal
/// row keeps the course in progress. Once every row is terminal, a single
/// cancelled row makes the course cancelled; otherwise uniform outcomes map
/// to themselves and mixed completed/failed outcomes become a partial
/// failure.
pub fn aggregate_state(rows: &[FileSyncProgress]) -> CourseSyncState {
    if rows.is_empty() {
        return CourseSyncState::Completed;
    }
    if rows.iter().any(|r| !r.state.is_terminal()) {
        return CourseSyncState::InProgress;
    }
    if rows.iter().any(|r| r.state == FileSyncState::Cancelled) {
        return CourseSyncState::Cancelled;
    }

    let any_completed = rows.iter().any(|r| r.state == FileSyncState::Completed);
    let any_failed = rows.iter().any(|r| r.state == FileSyncState::Failed);
    match (any_completed, any_failed) {
        (true, true) => CourseSyncState::PartialFailure,
        (false, true) => CourseSyncState::Failed,
        _ => CourseSyncState::Completed,
    }
}

/// Byte-weighted completion fraction in the range 0.0 to 1.0.
///
/// An empty row set, or one whose total size is zero, counts as fully
/// complete rather than dividing by zero.
pub fn fraction_complete(rows: &[FileSyncProgress]) -> f64 {
    let total: i64 = rows.iter().map(|r| r.bytes_total.max(0)).sum();
    if total <= 0 {
        return 1.0;
    }

    let done: i64 = rows
        .iter()
        .map(|r| r.bytes_done.clamp(0, r.bytes_total.max(0)))
        .sum();
    done as f64 / total as f64
}

/// Recomputes and persists course aggregate state from file rows.
pub struct ProgressAggregator {
    file_progress_repo: Arc<dyn FileSyncProgressRepository>,
    course_progress_repo: Arc<dyn CourseSyncProgressRepository>,
}

impl ProgressAggregator {
    /// Create a new aggregator over the given repositories
    pub fn new(
        file_progress_repo: Arc<dyn FileSyncProgressRepository>,
        course_progress_repo: Arc<dyn CourseSyncProgressRepository>,
    ) -> Self {
        Self {
            file_progress_repo,
            course_progress_repo,
        }
    }

    /// Recompute a course's aggregate state and completion fraction
    ///
    /// Persists the aggregate state on the course progress row and returns
    /// both values for event emission.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn recompute_course(
        &self,
        course_id: i64,
        worker_id: WorkerId,
    ) -> Result<(CourseSyncState, f64)> {
        let rows = self
            .file_progress_repo
            .by_course_and_worker(course_id, worker_id)
            .await?;

        let state = aggregate_state(&rows);
        let fraction = fraction_complete(&rows);

        self.course_progress_repo
            .set_aggregate_state(course_id, worker_id, state)
            .await?;

        debug!(course_id, %worker_id, %state, fraction, "recomputed course aggregate");
        Ok((state, fraction))
    }

    /// Fold every course in a session into one session-level state
    ///
    /// Uses the same projection rules as [`aggregate_state`], applied to the
    /// course aggregates instead of file rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn session_state(&self, worker_id: WorkerId) -> Result<CourseSyncState> {
        let courses = self.course_progress_repo.by_worker(worker_id).await?;
        if courses.is_empty() {
            return Ok(CourseSyncState::Completed);
        }
        if courses.iter().any(|c| !c.aggregate_state.is_terminal()) {
            return Ok(CourseSyncState::InProgress);
        }
        if courses
            .iter()
            .any(|c| c.aggregate_state == CourseSyncState::Cancelled)
        {
            return Ok(CourseSyncState::Cancelled);
        }

        let any_ok = courses.iter().any(|c| {
            c.aggregate_state == CourseSyncState::Completed
        });
        let any_bad = courses.iter().any(|c| {
            matches!(
                c.aggregate_state,
                CourseSyncState::Failed | CourseSyncState::PartialFailure
            )
        });
        Ok(match (any_ok, any_bad) {
            (true, true) => CourseSyncState::PartialFailure,
            (false, true) => {
                if courses
                    .iter()
                    .all(|c| c.aggregate_state == CourseSyncState::Failed)
                {
                    CourseSyncState::Failed
                } else {
                    CourseSyncState::PartialFailure
                }
            }
            _ => CourseSyncState::Completed,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
