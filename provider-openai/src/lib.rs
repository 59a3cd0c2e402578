//! # OpenAI Provider
//!
//! Implements `DocumentStore` over the Files API and `IndexBackend` over
//! vector store file batches.
//!
//! ## Overview
//!
//! - [`OpenAiDocumentStore`] uploads with `purpose=assistants`, lists with
//!   `after`/`has_more` pagination and deletes files
//! - [`OpenAiIndexBackend`] submits `file_batches`, lists vector store files
//!   filtered by status and detaches files from a vector store
//!
//! Both share one [`OpenAiClient`] carrying the API key, base URL and the
//! retry loop for rate limits and server errors.

pub mod client;
pub mod error;
pub mod files;
pub mod types;
pub mod vector_store;

pub use client::{OpenAiClient, OpenAiConfig};
pub use error::{OpenAiError, Result};
pub use files::OpenAiDocumentStore;
pub use vector_store::OpenAiIndexBackend;
