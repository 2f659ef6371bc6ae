//! Repository traits and SQLite implementations
//!
//! Each repository exposes an async trait so higher layers can be tested
//! against mocks, plus a `Sqlite*` implementation backed by a shared pool.

pub mod course_file;
pub mod dashboard;
pub mod local_file;
pub mod progress;
pub mod sync_settings;

pub use course_file::{CourseFileRepository, SqliteCourseFileRepository};
pub use dashboard::{DashboardRepository, SqliteDashboardRepository};
pub use local_file::{LocalFileRepository, SqliteLocalFileRepository};
pub use progress::{
    CourseSyncProgressRepository, FileSyncProgressRepository, ProgressStepRepository,
    SqliteCourseSyncProgressRepository, SqliteFileSyncProgressRepository,
    SqliteProgressStepRepository,
};
pub use sync_settings::{SqliteSyncSettingsRepository, SyncSettingsRepository};
