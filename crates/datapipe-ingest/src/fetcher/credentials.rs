//! Kaggle API credentials
//!
//! Resolution order matches the official client: explicit username/key from
//! the environment first, then `kaggle.json` in the configured directory or
//! `~/.kaggle`.

use super::FetchError;
use crate::config::KaggleConfig;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

pub const CREDENTIALS_FILE: &str = "kaggle.json";

#[derive(Clone, Deserialize)]
pub struct KaggleCredentials {
    pub username: String,
    pub key: String,
}

impl fmt::Debug for KaggleCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KaggleCredentials")
            .field("username", &self.username)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl KaggleCredentials {
    pub fn resolve(config: &KaggleConfig) -> Result<Self, FetchError> {
        if let (Some(username), Some(key)) = (&config.username, &config.key) {
            return Self::checked(username.clone(), key.clone(), "environment");
        }

        let path = credentials_path(config).ok_or_else(|| {
            FetchError::Authentication(
                "no KAGGLE_USERNAME/KAGGLE_KEY set and no home directory to look for kaggle.json"
                    .to_string(),
            )
        })?;

        let text = std::fs::read_to_string(&path).map_err(|e| {
            FetchError::Authentication(format!(
                "could not read {}: {}. Set KAGGLE_USERNAME and KAGGLE_KEY or create the file",
                path.display(),
                e
            ))
        })?;

        let creds: KaggleCredentials = serde_json::from_str(&text).map_err(|e| {
            FetchError::Authentication(format!("malformed {}: {}", path.display(), e))
        })?;

        Self::checked(creds.username, creds.key, "kaggle.json")
    }

    fn checked(username: String, key: String, origin: &str) -> Result<Self, FetchError> {
        if username.trim().is_empty() || key.trim().is_empty() {
            return Err(FetchError::Authentication(format!(
                "empty username or key in {}",
                origin
            )));
        }
        tracing::debug!(username = %username, origin, "Kaggle credentials loaded");
        Ok(Self { username, key })
    }
}

fn credentials_path(config: &KaggleConfig) -> Option<PathBuf> {
    config
        .config_dir
        .clone()
        .or_else(|| dirs::home_dir().map(|home| home.join(".kaggle")))
        .map(|dir| dir.join(CREDENTIALS_FILE))
}
