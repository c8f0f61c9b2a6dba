use anyhow::{Context, Result};
use keyring::Entry;

use super::session::{SessionData, TokenStore};

const SERVICE_NAME: &str = "contenthub";

/// Keeps the session in the OS keychain, one entry per account.
pub struct KeyringTokenStore {
    account: String,
}

impl KeyringTokenStore {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(SERVICE_NAME, &self.account).context("Failed to create keyring entry")
    }
}

impl TokenStore for KeyringTokenStore {
    fn load(&self) -> Result<Option<SessionData>> {
        match self.entry()?.get_password() {
            Ok(secret) => {
                let data = serde_json::from_str(&secret)
                    .context("Failed to parse session stored in keychain")?;
                Ok(Some(data))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve session from keychain"),
        }
    }

    fn save(&self, data: &SessionData) -> Result<()> {
        let secret = serde_json::to_string(data)?;
        self.entry()?
            .set_password(&secret)
            .context("Failed to store session in keychain")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete session from keychain"),
        }
    }
}
