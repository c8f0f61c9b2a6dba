use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    #[error("{message}")]
    Validation {
        status: u16,
        message: String,
        errors: BTreeMap<String, String>,
    },

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Session ended: {reason}")]
    SessionEnded { reason: String },

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Token storage error: {0}")]
    Storage(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error body shape returned by the backend for every non-2xx response.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Option<BTreeMap<String, String>>,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Build an error from a non-success status and its raw body.
    ///
    /// When the body is the backend's `{message, status, errors}` document the
    /// message and field errors are lifted out; otherwise the (truncated) body
    /// text becomes the message.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
        let message = parsed
            .message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| Self::truncate_body(body));

        if let Some(errors) = parsed.errors.filter(|e| !e.is_empty()) {
            return ApiError::Validation {
                status: status.as_u16(),
                message,
                errors,
            };
        }

        match status.as_u16() {
            400 | 409 | 422 => ApiError::BadRequest { message },
            401 => ApiError::Unauthorized { message },
            403 => ApiError::AccessDenied(message),
            404 => ApiError::NotFound(message),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(message),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, message)),
        }
    }

    /// HTTP-style status code for display, mirroring the backend's error body.
    /// Transport failures report 500 the way the web front end did.
    pub fn status(&self) -> u16 {
        match self {
            ApiError::BadRequest { .. } | ApiError::InvalidRequest(_) => 400,
            ApiError::Validation { status, .. } => *status,
            ApiError::Unauthorized { .. } | ApiError::SessionEnded { .. } => 401,
            ApiError::AccessDenied(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::RateLimited => 429,
            ApiError::Timeout => 408,
            ApiError::Network(e) => e.status().map(|s| s.as_u16()).unwrap_or(500),
            ApiError::ServerError(_) | ApiError::InvalidResponse(_) | ApiError::Storage(_) => 500,
        }
    }

    /// Human-readable message suitable for page-level display.
    pub fn message(&self) -> String {
        match self {
            ApiError::BadRequest { message }
            | ApiError::Validation { message, .. }
            | ApiError::Unauthorized { message } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Field name → message map for form-level display. Empty for
    /// non-validation errors.
    pub fn validation_errors(&self) -> BTreeMap<String, String> {
        match self {
            ApiError::Validation { errors, .. } => errors.clone(),
            _ => BTreeMap::new(),
        }
    }

    /// True when the user has to log in again.
    pub fn is_session_ended(&self) -> bool {
        matches!(self, ApiError::SessionEnded { .. })
    }
}
