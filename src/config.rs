use std::fs;
use std::path::{Path, PathBuf};
use serde::Deserialize;
use crate::upload::errors::{Result, UploadError};
use crate::upload::session::SessionBlob;

fn default_user_id() -> String {
    "self".to_string()
}

fn default_max_concurrent() -> usize {
    3
}

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// e.g. https://canvas.example.edu
    pub base_url: String,
    pub access_token: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    /// 最大并发上传数
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Records survive restarts when set
    #[serde(default)]
    pub state_file: Option<PathBuf>,
    /// Shared container for background-transfer session blobs
    #[serde(default)]
    pub app_group: Option<String>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let config_str = fs::read_to_string(path)?;
        toml::from_str(&config_str)
            .map_err(|err| UploadError::Param(format!("Can't parse config: {err}")))
    }

    /// Blob handed to the platform's background-transfer session so a
    /// wake-up event can reattach to this user context.
    pub fn session_blob(&self, session_id: impl Into<String>) -> SessionBlob {
        let blob = SessionBlob::new(session_id, self.user_id.clone(), self.base_url.clone());
        match &self.app_group {
            Some(app_group) => blob.with_app_group(app_group.clone()),
            None => blob,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_optional_fields() {
        let config: Config = toml::from_str(
            r#"
            base_url = "https://canvas.example.edu"
            access_token = "token-1"
            "#,
        )
        .unwrap();

        assert_eq!(config.user_id, "self");
        assert_eq!(config.max_concurrent, 3);
        assert!(config.state_file.is_none());
        assert!(config.app_group.is_none());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(Config::load("/nonexistent/config.toml").is_err());
    }

    #[test]
    fn test_session_blob_carries_app_group() {
        let config: Config = toml::from_str(
            r#"
            base_url = "https://canvas.example.edu"
            access_token = "token-1"
            user_id = "7"
            app_group = "group.com.example.app"
            "#,
        )
        .unwrap();

        let blob = config.session_blob("bg-session-1");
        assert_eq!(blob.user_id, "7");
        assert_eq!(blob.base_url, "https://canvas.example.edu");
        assert_eq!(blob.app_group.as_deref(), Some("group.com.example.app"));

        let encoded = blob.encode().unwrap();
        assert_eq!(SessionBlob::decode(&encoded).unwrap(), blob);
    }
}
