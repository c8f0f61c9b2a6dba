use serde::Serialize;

/// Session lifecycle notifications published by `ApiClient`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    LoggedIn,
    /// A refresh cycle rotated the tokens.
    Refreshed,
    /// The session could not be renewed; the user must log in again.
    Ended { reason: String },
    LoggedOut,
}

impl SessionEvent {
    /// Whether the front end should send the user back to the login screen.
    pub fn requires_login(&self) -> bool {
        matches!(self, SessionEvent::Ended { .. } | SessionEvent::LoggedOut)
    }
}
