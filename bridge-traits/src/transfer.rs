//! File Transfer Abstraction
//!
//! The byte-transfer mechanics (chunking, resumable ranges, disk placement)
//! live behind this trait. The engine decides *what* to fetch; an
//! implementation decides *how*, reporting incremental progress through a
//! callback and surfacing any additional files it discovered while
//! processing the primary one (e.g. attachments embedded in rich content).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;

/// Progress callback invoked as bytes arrive: `(bytes_done, bytes_total)`.
///
/// Implementations may call it from any task; callers must keep it cheap.
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// A single file the engine wants transferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub file_id: i64,
    pub course_id: i64,
    pub name: String,
    /// Expected size in bytes, 0 when unknown.
    pub size: i64,
}

/// A file discovered during transfer of a primary file.
///
/// These are not part of the course file tree scan; the engine schedules
/// them as additional files within the same session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredFile {
    pub file_id: i64,
    pub course_id: i64,
    pub name: String,
    pub size: i64,
}

/// Outcome of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Downloaded {
    /// Where the implementation placed the file locally.
    pub local_path: String,
    /// Actual transferred size in bytes.
    pub bytes_total: u64,
    /// Additional files discovered while processing this one.
    pub additional: Vec<DiscoveredFile>,
}

/// Byte-transfer collaborator.
#[async_trait]
pub trait FileTransfer: Send + Sync {
    /// Transfer one file, reporting progress incrementally.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::BridgeError`] classifying the failure; the engine
    /// never retries within the same session.
    async fn download(
        &self,
        request: &DownloadRequest,
        on_progress: ProgressCallback,
    ) -> Result<Downloaded>;
}
