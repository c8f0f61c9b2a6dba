//! Local caching module for offline data access.
//!
//! This module provides the `CacheManager` for storing and retrieving
//! ContentHub listings locally. Data is cached in JSON format and considered
//! stale after 60 minutes.
//!
//! Cached data types include:
//! - Categories and tags
//! - Featured posts
//! - The first page of the public feed

pub mod manager;

pub use manager::{CacheAges, CacheManager, CachedData};
