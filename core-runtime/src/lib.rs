//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the ingestion pipeline:
//! - Logging and tracing infrastructure
//! - Configuration management (profiles, synchronizer tuning, policies)
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the other crates depend on. It
//! establishes the logging conventions, configuration model and event
//! broadcasting used throughout the workspace.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
