//! HTTP transport for media downloads
//!
//! The module is organized into specialized components:
//! - `config`: HTTP client configuration and building
//! - `http`: rate-limited GET with status checking
//! - `fetch`: the `Fetcher` seam and its streaming HTTP implementation

pub mod config;
pub mod fetch;
pub mod http;

pub use config::ClientConfig;
pub use fetch::{Fetcher, HttpFetcher};
pub use http::HttpHandler;
