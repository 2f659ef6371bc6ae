//! Remote Content Metadata API
//!
//! Abstracts the learning-management backend that serves course content
//! listings. Implementations wrap the real HTTP client; the engine only sees
//! typed payloads and typed failures.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Last-known remote metadata for a file or folder in a course tree.
///
/// Folders form the tree via `parent_folder_id`; the course root folder is
/// the only folder whose `parent_folder_id` is 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileInfo {
    pub id: i64,
    pub parent_folder_id: i64,
    pub course_id: i64,
    pub context_id: i64,
    pub is_folder: bool,
    pub name: String,
    pub size: i64,
    pub is_hidden: bool,
    /// Unix seconds of the last remote content modification.
    pub updated_at: i64,
    /// Unix seconds of remote record creation. A remote rename/move can
    /// recreate the record with a fresh creation time but the same id.
    pub created_at: i64,
}

/// One card in the user's dashboard overview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardCardInfo {
    pub id: i64,
    pub course_id: i64,
    pub position: i64,
    pub title: String,
    pub image_url: Option<String>,
}

/// Remote content API collaborator.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::content::ContentApi;
///
/// async fn refresh(api: &dyn ContentApi, course_id: i64) -> bridge_traits::Result<usize> {
///     let files = api.list_course_files(course_id).await?;
///     Ok(files.len())
/// }
/// ```
#[async_trait]
pub trait ContentApi: Send + Sync {
    /// List the full file/folder metadata tree for a course.
    ///
    /// The returned listing is authoritative: records missing from it no
    /// longer exist remotely.
    async fn list_course_files(&self, course_id: i64) -> Result<Vec<RemoteFileInfo>>;

    /// Fetch the authoritative dashboard card listing for the current user.
    async fn list_dashboard_cards(&self) -> Result<Vec<DashboardCardInfo>>;
}
