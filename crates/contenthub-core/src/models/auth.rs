use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::user::Role;
use crate::auth::SessionData;

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub user_role: Option<Role>,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
}

/// Login reply. Timestamps arrive as epoch milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub issued_at: DateTime<Utc>,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub expires_at: DateTime<Utc>,
    pub refresh_token: String,
    #[serde(default, deserialize_with = "timestamp::deserialize_option")]
    pub ref_expiry: Option<DateTime<Utc>>,
}

impl LoginResponse {
    pub fn into_session(self) -> SessionData {
        SessionData {
            access_token: self.token,
            refresh_token: self.refresh_token,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            refresh_expires_at: self.ref_expiry,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// Refresh reply. The backend rotates the refresh token on every call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenResponse {
    pub refresh_token: String,
    pub access_token: String,
    #[serde(default, deserialize_with = "timestamp::deserialize_option")]
    pub refresh_exp_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::deserialize_option")]
    pub access_exp_time: Option<DateTime<Utc>>,
}

impl RefreshTokenResponse {
    /// Build the rotated session. Missing expiries fall back to the lifetime
    /// of the previous access token.
    pub fn into_session(self, previous: Option<&SessionData>) -> SessionData {
        let issued_at = Utc::now();
        let lifetime = previous
            .map(|p| p.expires_at - p.issued_at)
            .filter(|d| *d > chrono::Duration::zero())
            .unwrap_or_else(|| chrono::Duration::minutes(15));
        SessionData {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            issued_at,
            expires_at: self.access_exp_time.unwrap_or(issued_at + lifetime),
            refresh_expires_at: self
                .refresh_exp_time
                .or_else(|| previous.and_then(|p| p.refresh_expires_at)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogoutResponse {
    #[serde(default)]
    pub message: String,
}

/// Timestamps from the auth endpoints come either as epoch milliseconds or
/// as ISO-8601 instants depending on the endpoint.
mod timestamp {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{de::Error, Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Text(String),
    }

    fn convert<E: Error>(raw: Raw) -> Result<DateTime<Utc>, E> {
        match raw {
            Raw::Millis(ms) => Utc
                .timestamp_millis_opt(ms)
                .single()
                .ok_or_else(|| E::custom(format!("timestamp out of range: {}", ms))),
            Raw::Text(s) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(E::custom),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        convert(Raw::deserialize(deserializer)?)
    }

    pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<Raw>::deserialize(deserializer)?
            .map(convert)
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_response_millis() {
        let json = r#"{"token":"acc","issuedAt":1735689600000,"expiresAt":1735690500000,"refreshToken":"ref","refExpiry":1736294400000}"#;
        let session = serde_json::from_str::<LoginResponse>(json).unwrap().into_session();
        assert_eq!(session.access_token, "acc");
        assert_eq!(session.refresh_token, "ref");
        assert_eq!((session.expires_at - session.issued_at).num_minutes(), 15);
        assert!(session.refresh_expires_at.is_some());
    }

    #[test]
    fn test_refresh_response_iso_instants() {
        let json = r#"{"refreshToken":"ref2","accessToken":"acc2","refreshExpTime":"2030-01-08T00:00:00Z","accessExpTime":"2030-01-01T00:15:00.5Z"}"#;
        let resp: RefreshTokenResponse = serde_json::from_str(json).unwrap();
        let session = resp.into_session(None);
        assert_eq!(session.access_token, "acc2");
        assert_eq!(session.expires_at.to_rfc3339(), "2030-01-01T00:15:00.500+00:00");
    }

    #[test]
    fn test_refresh_response_without_expiry_reuses_lifetime() {
        let previous = crate::auth::session::sample_session("old", "old-ref");
        let resp: RefreshTokenResponse =
            serde_json::from_str(r#"{"refreshToken":"r","accessToken":"a"}"#).unwrap();
        let session = resp.into_session(Some(&previous));
        assert_eq!((session.expires_at - session.issued_at).num_minutes(), 15);
        assert_eq!(session.refresh_expires_at, previous.refresh_expires_at);
    }
}
