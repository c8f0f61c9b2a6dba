//! Application state for the ContentHub CLI.
//!
//! `App` owns the configuration, the API client, the offline cache and the
//! auth state, and keeps the auth state in step with the client's session
//! events.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use contenthub_core::cache::{CacheManager, CachedData};
use contenthub_core::{ApiClient, ApiError, AuthState, Config, SessionEvent};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Maximum length for email input.
const MAX_EMAIL_LENGTH: usize = 254;

pub struct App {
    pub config: Config,
    pub client: ApiClient,
    pub auth: AuthState,
    pub cache: CacheManager,
    events: broadcast::Receiver<SessionEvent>,
    json: bool,
}

impl App {
    pub fn new(config: Config, cache_dir: PathBuf, json: bool) -> Result<Self> {
        debug!(?cache_dir, api = %config.api_base_url(), "App::new() starting");
        let store = config.token_store(&cache_dir);
        let client = ApiClient::with_options(config.client_options(), store)
            .context("Failed to create API client")?;
        let events = client.subscribe();
        let auth = AuthState::from_client(&client);
        let cache = CacheManager::new(cache_dir)?;

        Ok(Self {
            config,
            client,
            auth,
            cache,
            events,
            json,
        })
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    pub fn require_login(&self) -> Result<()> {
        if self.client.is_authenticated() {
            Ok(())
        } else {
            anyhow::bail!("Not signed in. Run `contenthub login` first.")
        }
    }

    /// Sign in, prompting for whatever wasn't supplied.
    pub async fn login_interactive(
        &mut self,
        email: Option<String>,
        password: Option<String>,
    ) -> Result<()> {
        let email = match email.filter(|e| !e.trim().is_empty()) {
            Some(email) => email.trim().to_string(),
            None => Self::prompt_email(self.config.last_email.as_deref())?,
        };
        if email.is_empty() || email.len() > MAX_EMAIL_LENGTH {
            anyhow::bail!("A valid email is required");
        }
        let password = match password.filter(|p| !p.is_empty()) {
            Some(password) => password,
            None => Self::prompt_password("Password: ")?,
        };

        self.auth.login(&self.client, &email, &password).await?;
        info!("Login successful");

        if self.config.last_email.as_deref() != Some(email.as_str()) {
            self.config.last_email = Some(email);
            if let Err(e) = self.config.save() {
                warn!(error = %e, "Failed to save config");
            }
        }
        Ok(())
    }

    fn prompt_email(last: Option<&str>) -> Result<String> {
        match last {
            Some(last) => print!("Email [{}]: ", last),
            None => print!("Email: "),
        }
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim();
        Ok(match last {
            Some(last) if input.is_empty() => last.to_string(),
            _ => input.to_string(),
        })
    }

    pub fn prompt_password(prompt: &str) -> Result<String> {
        let password = rpassword::prompt_password(prompt)?;
        Ok(password)
    }

    /// Apply queued session events. Returns true when a refresh failure
    /// signed the user out.
    pub fn check_session_events(&mut self) -> bool {
        match self.auth.sync(&mut self.events) {
            Some(SessionEvent::Ended { reason }) => {
                debug!(%reason, "Session ended");
                true
            }
            _ => false,
        }
    }

    // =========================================================================
    // Output
    // =========================================================================

    /// Print `value` as JSON in `--json` mode, otherwise the text rendering.
    pub fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            let text = text();
            if text.ends_with('\n') {
                print!("{}", text);
            } else {
                println!("{}", text);
            }
        }
        Ok(())
    }

    pub fn json(&self) -> bool {
        self.json
    }

    /// Persist a listing, logging rather than failing on cache errors.
    pub fn remember(&self, what: &str, result: Result<()>) {
        if let Err(e) = result {
            warn!(cache = what, error = %e, "Failed to update cache");
        }
    }
}

/// Unwrap a cached listing for offline display.
pub fn from_cache<T>(cached: Result<Option<CachedData<T>>>, what: &str) -> Result<T> {
    match cached? {
        Some(cached) => {
            let stale = if cached.is_stale() { ", may be out of date" } else { "" };
            eprintln!("Showing cached {} ({}{})", what, cached.age_display(), stale);
            Ok(cached.data)
        }
        None => anyhow::bail!("No cached {}. Run `contenthub sync` while online.", what),
    }
}

/// Failures where the server was never reached, so cached data is worth showing.
pub fn is_offline_error(err: &ApiError) -> bool {
    matches!(err, ApiError::Network(_) | ApiError::Timeout)
}
