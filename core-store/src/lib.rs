//! # Offline Content Metadata Store
//!
//! Owns the local SQLite database mirroring remote course content metadata
//! and provides repository patterns for data access.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite schema and migrations for the offline cache
//! - Remote file metadata (`course_files`) with replace-all refresh semantics
//! - Completed download records (`local_files`)
//! - Per-course sync settings and selective-sync file selections
//! - Session-scoped file/course sync progress tables
//! - The atomically replaced dashboard snapshot

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{Result, StoreError};
pub use models::{
    CourseFile, CourseSyncProgress, CourseSyncSettings, CourseSyncState, DashboardCard,
    FileSyncProgress, FileSyncState, LocalFile, SyncProgressStep, WorkerId,
};
