use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use serde::{Deserialize, Serialize};
use super::errors::{Result, UploadError};

/// Opaque blob persisted alongside a background transfer session so a
/// platform wake-up event can reattach to the right user context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionBlob {
    pub session_id: String,
    pub user_id: String,
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_group: Option<String>,
}

impl SessionBlob {
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            base_url: base_url.into(),
            app_group: None,
        }
    }

    pub fn with_app_group(mut self, app_group: impl Into<String>) -> Self {
        self.app_group = Some(app_group.into());
        self
    }

    /// base64(JSON)，对外不透明
    pub fn encode(&self) -> Result<String> {
        Ok(BASE64_STANDARD.encode(serde_json::to_vec(self)?))
    }

    pub fn decode(blob: &str) -> Result<Self> {
        let bytes = BASE64_STANDARD
            .decode(blob)
            .map_err(|err| UploadError::Param(format!("Invalid session blob: {err}")))?;

        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_round_trip() {
        let blob = SessionBlob::new("bg-session-1", "u1", "https://canvas.example.edu")
            .with_app_group("group.com.example.app");

        let encoded = blob.encode().unwrap();
        assert_eq!(SessionBlob::decode(&encoded).unwrap(), blob);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(SessionBlob::decode("not base64 !!!").is_err());

        let not_json = BASE64_STANDARD.encode(b"hello");
        assert!(SessionBlob::decode(&not_json).is_err());
    }
}
