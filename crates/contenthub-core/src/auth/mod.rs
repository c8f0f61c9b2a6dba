//! Authentication module for managing user sessions.
//!
//! This module provides:
//! - `SessionData`: access/refresh token pair with expiry
//! - `TokenStore`: where the session is persisted (`FileTokenStore`,
//!   `KeyringTokenStore`, `MemoryTokenStore`)
//! - `SessionEvent`: login/refresh/logout notifications
//! - `AuthState`: the signed-in user as seen by the front end

pub mod events;
pub mod keyring_store;
pub mod session;
pub mod state;

pub use events::SessionEvent;
pub use keyring_store::KeyringTokenStore;
pub use session::{FileTokenStore, MemoryTokenStore, SessionData, TokenStore};
pub use state::AuthState;
