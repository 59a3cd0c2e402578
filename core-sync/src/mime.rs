//! MIME type helpers for hierarchical sources
//!
//! Native (Google Apps) documents have no binary content and no checksum;
//! they must be exported to a concrete format before they can be stored.

use tracing::warn;

pub const NATIVE_PREFIX: &str = "application/vnd.google-apps.";
pub const NATIVE_DOCUMENT: &str = "application/vnd.google-apps.document";
pub const NATIVE_SPREADSHEET: &str = "application/vnd.google-apps.spreadsheet";
pub const NATIVE_PRESENTATION: &str = "application/vnd.google-apps.presentation";

pub const DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const PPTX: &str = "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const TEXT_PLAIN: &str = "text/plain";

pub fn is_native(mime_type: &str) -> bool {
    mime_type.starts_with(NATIVE_PREFIX)
}

/// Extension a copied file must carry in the bucket, derived from its MIME
/// type. Unmapped types log a warning and get no extension.
pub fn bucket_extension(mime_type: &str) -> &'static str {
    match mime_type {
        DOCX => ".docx",
        NATIVE_DOCUMENT => ".gdoc",
        NATIVE_SPREADSHEET => ".gsheet",
        NATIVE_PRESENTATION => ".gslides",
        "application/vnd.google-apps.drawing" => ".gdraw",
        "application/vnd.google-apps.form" => ".gform",
        "application/vnd.google-apps.map" => ".gmap",
        "application/vnd.google-apps.script" => ".gs",
        "application/vnd.google-apps.site" => ".gsite",
        "application/vnd.google-apps.folder" => "",
        "application/pdf" => ".pdf",
        "text/html" => ".html",
        "application/octet-stream" => "",
        other => {
            warn!(mime_type = other, "No extension mapped for MIME type");
            ""
        }
    }
}

/// Office format a native document is exported to for indexing, with the
/// extension the exported file is named with
pub fn office_export(mime_type: &str) -> Option<(&'static str, &'static str)> {
    match mime_type {
        NATIVE_DOCUMENT => Some((DOCX, ".docx")),
        NATIVE_SPREADSHEET => Some((XLSX, ".xlsx")),
        NATIVE_PRESENTATION => Some((PPTX, ".pptx")),
        _ => None,
    }
}
