//! Google Drive API response types
//!
//! Data structures for deserializing Google Drive API v3 responses.

use serde::{Deserialize, Serialize};

/// MIME type Drive uses for folders
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// MIME type Drive uses for shortcuts
pub const SHORTCUT_MIME_TYPE: &str = "application/vnd.google-apps.shortcut";

/// Google Drive API file resource
///
/// See: https://developers.google.com/drive/api/v3/reference/files#resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,

    pub name: String,

    pub mime_type: String,

    /// Modification time (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,

    /// MD5 checksum (binary files only; Google-native documents have none)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5_checksum: Option<String>,

    /// Present when `mime_type` is the shortcut type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortcut_details: Option<ShortcutDetails>,
}

/// Google Drive API shortcut details
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortcutDetails {
    pub target_id: String,

    pub target_mime_type: String,
}

/// Google Drive API files.list response
///
/// See: https://developers.google.com/drive/api/v3/reference/files/list
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesListResponse {
    #[serde(default)]
    pub files: Vec<DriveFile>,

    /// Token for next page
    #[serde(default)]
    pub next_page_token: Option<String>,

    #[serde(default)]
    pub incomplete_search: bool,
}

/// Google Drive API drive resource
#[derive(Debug, Clone, Deserialize)]
pub struct Drive {
    pub id: String,
    pub name: String,
}

/// Google Drive API drives.list response
///
/// See: https://developers.google.com/drive/api/v3/reference/drives/list
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrivesListResponse {
    #[serde(default)]
    pub drives: Vec<Drive>,

    #[serde(default)]
    pub next_page_token: Option<String>,
}
