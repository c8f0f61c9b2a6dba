use serde::{Deserialize, Serialize};

/// Standard success wrapper the backend puts around most payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    #[serde(default)]
    pub message: Option<String>,
    pub data: T,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub success: Option<bool>,
    /// Server timestamp. Kept as raw JSON because its format varies and a
    /// bad value must not hide the payload.
    #[serde(default)]
    pub date_time: Option<serde_json::Value>,
}

/// A response body that is either wrapped in an `Envelope` or bare.
///
/// A few endpoints (category rename, tag creation) return the entity
/// directly while the rest wrap it.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Payload<T> {
    Enveloped(Envelope<T>),
    Bare(T),
}

impl<T> Payload<T> {
    pub fn into_inner(self) -> T {
        match self {
            Payload::Enveloped(envelope) => envelope.data,
            Payload::Bare(data) => data,
        }
    }
}
