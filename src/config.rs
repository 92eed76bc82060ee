// ABOUTME: Runtime settings loaded from an optional TOML file
// ABOUTME: Every field has a default so the mirror runs with no config at all

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::backfill::BackfillConfig;
use crate::catalog::client::DEFAULT_API_BASE_URL;
use crate::live::{WatchdogConfig, DEFAULT_MAP_STREAM_URL};

/// Settings for one mirror process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Where the gzipped snapshot is written
    pub cache_path: PathBuf,
    pub api_base_url: String,
    pub map_stream_url: String,
    /// Vote stream endpoint; the vote channel is off when unset
    pub vote_stream_url: Option<String>,
    pub page_size: u32,
    pub http_timeout_secs: u64,
    pub timings: Timings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timings {
    pub page_retry_ms: u64,
    pub page_delay_ms: u64,
    pub handshake_timeout_secs: u64,
    pub reconnect_delay_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_path: PathBuf::from("./cached.proto.gz"),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            map_stream_url: DEFAULT_MAP_STREAM_URL.to_string(),
            vote_stream_url: None,
            page_size: 10,
            http_timeout_secs: 30,
            timings: Timings::default(),
        }
    }
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            page_retry_ms: 3000,
            page_delay_ms: 100,
            handshake_timeout_secs: 15,
            reconnect_delay_secs: 15,
        }
    }
}

impl Settings {
    /// `<config_dir>/beatsaver-cache/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("beatsaver-cache").join("config.toml"))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(contents).context("Failed to parse settings")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Loads `explicit` if given, else the default path if it exists, else defaults.
    ///
    /// An explicit path that does not exist is an error.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::debug!("Loading config from {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let api = Url::parse(&self.api_base_url)
            .with_context(|| format!("Invalid api_base_url: {}", self.api_base_url))?;
        if !matches!(api.scheme(), "http" | "https") {
            bail!("api_base_url must be http or https, got {}", api.scheme());
        }

        validate_stream_url("map_stream_url", &self.map_stream_url)?;
        if let Some(url) = &self.vote_stream_url {
            validate_stream_url("vote_stream_url", url)?;
        }

        if self.page_size == 0 {
            bail!("page_size must be greater than 0");
        }
        if self.http_timeout_secs == 0 {
            bail!("http_timeout_secs must be greater than 0");
        }
        if self.timings.handshake_timeout_secs == 0 {
            bail!("timings.handshake_timeout_secs must be greater than 0");
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn backfill_config(&self) -> BackfillConfig {
        BackfillConfig {
            page_size: self.page_size,
            retry_delay: Duration::from_millis(self.timings.page_retry_ms),
            page_delay: Duration::from_millis(self.timings.page_delay_ms),
        }
    }

    pub fn watchdog_config(&self) -> WatchdogConfig {
        WatchdogConfig {
            handshake_timeout: Duration::from_secs(self.timings.handshake_timeout_secs),
            reconnect_delay: Duration::from_secs(self.timings.reconnect_delay_secs),
        }
    }
}

fn validate_stream_url(field: &str, value: &str) -> Result<()> {
    let url = Url::parse(value).with_context(|| format!("Invalid {}: {}", field, value))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        bail!("{} must be ws or wss, got {}", field, url.scheme());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_runtime_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.cache_path, PathBuf::from("./cached.proto.gz"));
        assert_eq!(settings.api_base_url, "https://api.beatsaver.com/maps");
        assert_eq!(settings.map_stream_url, "wss://ws.beatsaver.com/maps");
        assert!(settings.vote_stream_url.is_none());
        assert!(settings.validate().is_ok());

        let backfill = settings.backfill_config();
        let defaults = BackfillConfig::default();
        assert_eq!(backfill.page_size, defaults.page_size);
        assert_eq!(backfill.retry_delay, defaults.retry_delay);
        assert_eq!(backfill.page_delay, defaults.page_delay);

        let watchdog = settings.watchdog_config();
        assert_eq!(watchdog.handshake_timeout, Duration::from_secs(15));
        assert_eq!(watchdog.reconnect_delay, Duration::from_secs(15));
        assert_eq!(settings.http_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_empty_file_is_all_defaults() {
        assert_eq!(Settings::from_toml_str("").unwrap(), Settings::default());
    }

    #[test]
    fn test_partial_file_overrides() {
        let settings = Settings::from_toml_str(
            r#"
            cache_path = "/var/cache/maps.proto.gz"
            vote_stream_url = "wss://ws.example.com/votes"

            [timings]
            reconnect_delay_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(settings.cache_path, PathBuf::from("/var/cache/maps.proto.gz"));
        assert_eq!(
            settings.vote_stream_url.as_deref(),
            Some("wss://ws.example.com/votes")
        );
        assert_eq!(settings.timings.reconnect_delay_secs, 5);
        assert_eq!(settings.timings.handshake_timeout_secs, 15);
        assert_eq!(settings.page_size, 10);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Settings::from_toml_str("page_size = 0").is_err());
        assert!(Settings::from_toml_str(r#"api_base_url = "not a url""#).is_err());
        assert!(Settings::from_toml_str(r#"map_stream_url = "https://ws.beatsaver.com""#).is_err());
        assert!(Settings::from_toml_str(r#"vote_stream_url = "ftp://example.com""#).is_err());
        assert!(Settings::from_toml_str("unknown_key = 1").is_err());
        assert!(Settings::from_toml_str("http_timeout_secs = 0").is_err());
    }

    #[test]
    fn test_rejects_zero_handshake_timeout() {
        let err = Settings::from_toml_str("[timings]\nhandshake_timeout_secs = 0").unwrap_err();
        assert!(format!("{:#}", err).contains("handshake_timeout_secs"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "page_size = 25").unwrap();
        let settings = Settings::load_or_default(Some(file.path())).unwrap();
        assert_eq!(settings.page_size, 25);
    }

    #[test]
    fn test_missing_explicit_path_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(Settings::load_or_default(Some(&missing)).is_err());
    }
}
