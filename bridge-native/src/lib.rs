//! # Native Bridge Implementations
//!
//! Default implementations of bridge traits for server and CLI hosts.
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest` with pooled connections and retry on
//!   rate limits and server errors
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use bridge_native::ReqwestHttpClient;
//! use bridge_traits::HttpClient;
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new()?);
//!     // Hand to the connectors built by core-service
//!     Ok(())
//! }
//! ```

mod http;

pub use http::ReqwestHttpClient;
