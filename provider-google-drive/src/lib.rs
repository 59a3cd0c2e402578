//! # Google Drive Provider
//!
//! Implements the `TreeSource` trait for Google Drive API v3.
//!
//! ## Overview
//!
//! This module provides:
//! - Folder-by-folder child listing (`'<id>' in parents`), including shared drives
//! - Shortcut resolution data (`shortcutDetails`) for the harvester
//! - Binary downloads (`alt=media`) and native document export
//! - Shared drive lookup for name-based transfers
//! - Exponential backoff on rate limiting and server errors

pub mod connector;
pub mod error;
pub mod types;

pub use connector::GoogleDriveConnector;
pub use error::{GoogleDriveError, Result};
