//! S3 XML response types

use serde::Deserialize;

use crate::error::{Result, S3Error};

/// `ListObjectsV2` result document
///
/// See: https://docs.aws.amazon.com/AmazonS3/latest/API/API_ListObjectsV2.html
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListBucketResult {
    #[serde(default)]
    pub is_truncated: bool,

    #[serde(default)]
    pub contents: Vec<ObjectSummary>,

    #[serde(default)]
    pub next_continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectSummary {
    pub key: String,

    #[serde(default)]
    pub size: Option<u64>,

    #[serde(default)]
    pub last_modified: Option<String>,
}

/// Error document returned with non-2xx responses
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorDocument {
    #[serde(default)]
    pub code: String,

    #[serde(default)]
    pub message: String,
}

pub fn parse_list(body: &[u8]) -> Result<ListBucketResult> {
    let text = std::str::from_utf8(body).map_err(|e| S3Error::ParseError(e.to_string()))?;
    quick_xml::de::from_str(text).map_err(|e| S3Error::ParseError(e.to_string()))
}

/// Best-effort parse of an error body; HEAD responses carry none
pub fn parse_error(body: &[u8]) -> Option<ErrorDocument> {
    let text = std::str::from_utf8(body).ok()?;
    quick_xml::de::from_str(text).ok()
}
