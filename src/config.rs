//! Configuration: JSON file with defaults, endpoint overridable from the environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::media::ThumbnailOptions;
use crate::state::cache::{DEFAULT_QUOTA_BYTES, DEFAULT_SLOT, MAX_LOCAL_PHOTOS};

pub const ENV_URL: &str = "PORTAL_OBRAS_URL";
pub const ENV_SECRET: &str = "PORTAL_OBRAS_SECRET";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub endpoint: EndpointConfig,
    pub cache: CacheConfig,
    pub thumbnail: ThumbnailOptions,
}

/// The remote web-app endpoint and its shared secret
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub url: String,
    pub secret: String,
    pub list_timeout_secs: u64,
    pub multipart_timeout_secs: u64,
    /// Longer: inlined payloads are about a third heavier
    pub inline_timeout_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            secret: String::new(),
            list_timeout_secs: 10,
            multipart_timeout_secs: 15,
            inline_timeout_secs: 30,
        }
    }
}

impl EndpointConfig {
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty() && !self.secret.is_empty()
    }

    pub fn list_timeout(&self) -> Duration {
        Duration::from_secs(self.list_timeout_secs)
    }

    pub fn multipart_timeout(&self) -> Duration {
        Duration::from_secs(self.multipart_timeout_secs)
    }

    pub fn inline_timeout(&self) -> Duration {
        Duration::from_secs(self.inline_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// SQLite file; `None` means the user data directory
    pub path: Option<PathBuf>,
    pub slot: String,
    pub quota_bytes: usize,
    pub max_photos: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: None,
            slot: DEFAULT_SLOT.to_string(),
            quota_bytes: DEFAULT_QUOTA_BYTES,
            max_photos: MAX_LOCAL_PHOTOS,
        }
    }
}

impl PortalConfig {
    /// `~/.config/portal-obras/config.json` (platform equivalent elsewhere)
    pub fn default_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir()?;
        path.push("portal-obras");
        path.push("config.json");
        Some(path)
    }

    /// Parse a config file. Unknown keys are ignored, missing keys take defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Explicit path must exist; the default path may be missing (defaults apply).
    /// Environment overrides are applied last.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_URL).filter(|v| !v.is_empty()) {
            self.endpoint.url = url;
        }
        if let Some(secret) = lookup(ENV_SECRET).filter(|v| !v.is_empty()) {
            self.endpoint.secret = secret;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let quality = self.thumbnail.quality;
        if !(quality > 0.0 && quality <= 1.0) {
            return Err(invalid("thumbnail.quality", "must be in (0, 1]"));
        }
        if self.thumbnail.max_width == 0 || self.thumbnail.max_height == 0 {
            return Err(invalid("thumbnail", "bounding box must be non-empty"));
        }
        if self.cache.slot.is_empty() {
            return Err(invalid("cache.slot", "must not be empty"));
        }
        let timeouts = [
            self.endpoint.list_timeout_secs,
            self.endpoint.multipart_timeout_secs,
            self.endpoint.inline_timeout_secs,
        ];
        if timeouts.contains(&0) {
            return Err(invalid("endpoint", "timeouts must be positive"));
        }
        Ok(())
    }
}

fn invalid(path: &str, message: &str) -> ConfigError {
    ConfigError::InvalidField {
        path: path.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "endpoint": {{ "url": "https://script.example/exec", "secret": "s" }}, "cache": {{ "max_photos": 3, "unknown": true }} }}"#
        )
        .unwrap();

        let config = PortalConfig::from_file(file.path()).unwrap();
        assert!(config.endpoint.is_configured());
        assert_eq!(config.endpoint.inline_timeout(), Duration::from_secs(30));
        assert_eq!(config.cache.max_photos, 3);
        assert_eq!(config.cache.slot, DEFAULT_SLOT);
        assert_eq!(config.thumbnail, ThumbnailOptions::default());
    }

    #[test]
    fn rejects_bad_quality() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "thumbnail": {{ "quality": 1.5 }} }}"#).unwrap();
        assert!(matches!(
            PortalConfig::from_file(file.path()),
            Err(ConfigError::InvalidField { .. })
        ));
    }

    #[test]
    fn env_overrides_endpoint() {
        let mut config = PortalConfig::default();
        config.apply_env(|key| match key {
            ENV_URL => Some("https://other.example/exec".to_string()),
            ENV_SECRET => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.endpoint.url, "https://other.example/exec");
        assert_eq!(config.endpoint.secret, "");
        assert!(!config.endpoint.is_configured());
    }
}
