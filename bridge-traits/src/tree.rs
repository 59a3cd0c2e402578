//! Hierarchical Document Source Abstraction
//!
//! A tree source exposes folders, files and shortcuts (aliases) one folder
//! level at a time. Listing is paginated with an opaque continuation token.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Kind of a node in a hierarchical source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Folder,
    Shortcut,
}

/// Where a shortcut points
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortcutTarget {
    pub target_id: String,
    pub target_kind: NodeKind,
    pub target_mime_type: Option<String>,
}

/// One child returned by a folder listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteNode {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    pub mime_type: Option<String>,
    /// Present only when `kind` is `Shortcut`
    pub shortcut: Option<ShortcutTarget>,
    /// Content checksum; native documents that must be exported have none
    pub md5_checksum: Option<String>,
    /// Last modification time (RFC 3339)
    pub modified_time: Option<String>,
}

/// A shared drive visible to the credentials in use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedDrive {
    pub id: String,
    pub name: String,
}

/// Hierarchical document source
///
/// # Example
///
/// ```ignore
/// use bridge_traits::tree::TreeSource;
///
/// async fn first_page(source: &dyn TreeSource) -> Result<usize> {
///     let (children, _next) = source.list_children("root", None, None).await?;
///     Ok(children.len())
/// }
/// ```
#[async_trait]
pub trait TreeSource: Send + Sync {
    /// List one page of the direct children of `folder_id`
    ///
    /// `drive_id` scopes the listing to a shared drive when set.
    async fn list_children(
        &self,
        folder_id: &str,
        drive_id: Option<&str>,
        page_token: Option<String>,
    ) -> Result<(Vec<RemoteNode>, Option<String>)>;

    /// List one page of shared drives
    async fn list_drives(
        &self,
        page_token: Option<String>,
    ) -> Result<(Vec<SharedDrive>, Option<String>)>;

    /// Download the raw bytes of a binary file
    async fn download(&self, file_id: &str) -> Result<Bytes>;

    /// Export a native (checksum-less) document to the given MIME type
    async fn export(&self, file_id: &str, mime_type: &str) -> Result<Bytes>;
}
