//! REST API client module for the ContentHub backend.
//!
//! This module provides the `ApiClient` for communicating with the
//! ContentHub API to read and write posts, categories, tags and comments.
//!
//! The API uses short-lived JWT bearer tokens. When a request is rejected
//! with 401 the client runs a single refresh cycle shared by every caller
//! that is waiting, then retries the original requests once.

pub mod client;
pub mod error;
pub mod refresh;

#[cfg(test)]
mod http_tests;

pub use client::{ApiClient, ClientOptions, DEFAULT_BASE_URL};
pub use error::ApiError;
