use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, warn};

use crate::api::{ApiClient, ApiError};
use crate::models::UserProfile;

use super::SessionEvent;

/// Who is signed in, as far as the front end is concerned.
#[derive(Debug, Clone, Default)]
pub struct AuthState {
    pub authenticated: bool,
    pub user: Option<UserProfile>,
    /// True until a stored session has been checked against the backend.
    pub loading: bool,
}

impl AuthState {
    /// Initial state from whatever session the client loaded at startup.
    pub fn from_client(client: &ApiClient) -> Self {
        let authenticated = client.is_authenticated();
        Self {
            authenticated,
            user: None,
            loading: authenticated,
        }
    }

    /// Validate a stored session by fetching the profile. A token close to
    /// expiry is rotated first. A profile failure that isn't a session end
    /// leaves the user signed in without details.
    pub async fn initialize(&mut self, client: &ApiClient) {
        match client.refresh_if_needed().await {
            Ok(true) => debug!("Stored session refreshed before use"),
            Ok(false) => {}
            Err(e) => debug!(error = %e, "Early refresh failed"),
        }
        if client.is_authenticated() {
            match client.get_user_profile().await {
                Ok(profile) => self.user = Some(profile),
                Err(e) if e.is_session_ended() => debug!("Stored session is no longer valid"),
                Err(e) => warn!(error = %e, "Profile unavailable, continuing without it"),
            }
        }
        self.authenticated = client.is_authenticated();
        if !self.authenticated {
            self.user = None;
        }
        self.loading = false;
    }

    pub async fn login(
        &mut self,
        client: &ApiClient,
        email: &str,
        password: &str,
    ) -> Result<(), ApiError> {
        client.login(email, password).await?;
        self.authenticated = true;
        self.loading = false;
        match client.get_user_profile().await {
            Ok(profile) => self.user = Some(profile),
            Err(e) => warn!(error = %e, "Profile unavailable after login"),
        }
        Ok(())
    }

    pub async fn logout(&mut self, client: &ApiClient) -> Result<(), ApiError> {
        client.logout().await?;
        self.clear();
        Ok(())
    }

    pub fn apply(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::LoggedIn => self.authenticated = true,
            SessionEvent::Refreshed => {}
            SessionEvent::Ended { .. } | SessionEvent::LoggedOut => self.clear(),
        }
    }

    /// Apply every pending event. Returns the last one that requires the user
    /// to log in again, if any.
    pub fn sync(&mut self, events: &mut broadcast::Receiver<SessionEvent>) -> Option<SessionEvent> {
        let mut needs_login = None;
        loop {
            match events.try_recv() {
                Ok(event) => {
                    self.apply(&event);
                    if event.requires_login() {
                        needs_login = Some(event);
                    }
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed session events");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        needs_login
    }

    pub fn display_name(&self) -> &str {
        self.user.as_ref().map(|u| u.name.as_str()).unwrap_or("Guest")
    }

    fn clear(&mut self) {
        self.authenticated = false;
        self.user = None;
        self.loading = false;
    }
}
