//! # S3 Provider
//!
//! Implements the `ObjectStore` trait against the S3 REST API.
//!
//! ## Overview
//!
//! This module provides:
//! - `ListObjectsV2` pagination via continuation tokens
//! - Object download, existence checks (`HEAD`) and uploads with user metadata
//! - AWS Signature Version 4 request signing
//! - Path-style addressing so S3-compatible endpoints work unchanged

pub mod connector;
pub mod error;
pub mod signing;
pub mod types;

pub use connector::{S3Config, S3Connector};
pub use error::{Result, S3Error};
