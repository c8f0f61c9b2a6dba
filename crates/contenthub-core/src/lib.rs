//! ContentHub core library.
//!
//! Everything a ContentHub front end needs that isn't presentation: the
//! authenticated REST client with single-flight token refresh, the wire
//! models, session storage, cursor-paginated feed state, an offline cache
//! and the on-disk configuration.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod feed;
pub mod models;
pub mod utils;

pub use api::{ApiClient, ApiError, ClientOptions};
pub use auth::{AuthState, SessionData, SessionEvent, TokenStore};
pub use config::{Config, TokenBackend};
pub use feed::{FeedState, Removal};
