use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Buffer time before expiry to trigger a proactive refresh (5 minutes)
const TOKEN_REFRESH_BUFFER_MINUTES: i64 = 5;

/// Access and refresh credentials for one signed-in user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub access_token: String,
    pub refresh_token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub refresh_expires_at: Option<DateTime<Utc>>,
}

impl SessionData {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Check if the access token will expire soon and should be refreshed
    pub fn needs_refresh(&self) -> bool {
        Utc::now() > self.expires_at - Duration::minutes(TOKEN_REFRESH_BUFFER_MINUTES)
    }

    /// A session whose refresh token has itself lapsed can't be renewed.
    pub fn can_refresh(&self) -> bool {
        !self.refresh_token.is_empty()
            && self.refresh_expires_at.map(|t| Utc::now() < t).unwrap_or(true)
    }

    pub fn time_until_expiry(&self) -> Duration {
        self.expires_at - Utc::now()
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> i64 {
        self.time_until_expiry().num_minutes().max(0)
    }
}

/// Persistent home for the current session's tokens.
///
/// Only the token manager inside `ApiClient` calls these; everything else
/// learns about session changes through `SessionEvent`s.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<SessionData>>;
    fn save(&self, data: &SessionData) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Stores the session as JSON in the cache directory.
pub struct FileTokenStore {
    cache_dir: PathBuf,
}

impl FileTokenStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<SessionData>> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let data: SessionData =
            serde_json::from_str(&contents).context("Failed to parse session file")?;
        Ok(Some(data))
    }

    fn save(&self, data: &SessionData) -> Result<()> {
        let path = self.session_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create session directory")?;
        }
        let contents = serde_json::to_string_pretty(data)?;
        std::fs::write(&path, contents).context("Failed to write session file")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to restrict session file permissions")?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path).context("Failed to remove session file")?;
        }
        Ok(())
    }
}

/// Keeps the session in process memory only.
#[derive(Default)]
pub struct MemoryTokenStore {
    data: Mutex<Option<SessionData>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(data: SessionData) -> Self {
        Self {
            data: Mutex::new(Some(data)),
        }
    }

    fn slot(&self) -> Result<std::sync::MutexGuard<'_, Option<SessionData>>> {
        self.data
            .lock()
            .map_err(|_| anyhow::anyhow!("Memory token store lock poisoned"))
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<SessionData>> {
        Ok(self.slot()?.clone())
    }

    fn save(&self, data: &SessionData) -> Result<()> {
        *self.slot()? = Some(data.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.slot()? = None;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn sample_session(access: &str, refresh: &str) -> SessionData {
    let now = Utc::now();
    SessionData {
        access_token: access.to_string(),
        refresh_token: refresh.to_string(),
        issued_at: now,
        expires_at: now + Duration::minutes(15),
        refresh_expires_at: Some(now + Duration::days(7)),
    }
}
