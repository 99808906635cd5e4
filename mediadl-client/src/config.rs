//! Runtime settings, loadable from TOML and `MEDIADL_*` environment variables.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use std::{fmt, io};

use serde::Deserialize;

use crate::retry::{AutoSleep, RetryPolicy};

// ─── Config ───────────────────────────────────────────────────────────────────

/// Settings for [`crate::AuthController`] and [`crate::DownloadOrchestrator`].
///
/// ```toml
/// session_path        = "mediadl.session"
/// download_dir        = "downloads"
/// fetch_limit         = 100
/// inter_item_delay_ms = 500
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Where the session token is persisted.
    pub session_path:              PathBuf,
    /// Directory downloaded files are saved into.
    pub download_dir:              PathBuf,
    /// How many recent messages a catalog fetch looks at.
    pub fetch_limit:               usize,
    /// Pause between two items of a batch download.
    pub inter_item_delay_ms:       u64,
    /// Retries for transient connection failures.
    pub connect_retries:           u32,
    pub retry_delay_ms:            u64,
    /// Longest FLOOD_WAIT slept through automatically.
    pub flood_wait_threshold_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_path:              PathBuf::from("mediadl.session"),
            download_dir:              PathBuf::from("downloads"),
            fetch_limit:               100,
            inter_item_delay_ms:       500,
            connect_retries:           3,
            retry_delay_ms:            1_000,
            flood_wait_threshold_secs: 60,
        }
    }
}

impl Config {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(ConfigError::Parse)
    }

    /// Read a TOML file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(raw) => Self::from_toml_str(&raw),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("[mediadl] No config at {}, using defaults", path.as_ref().display());
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    /// Override fields from `MEDIADL_*` environment variables.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_vars(std::env::vars())
    }

    /// Same as [`Config::apply_env`] with an explicit variable source.
    pub fn apply_vars<I>(mut self, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(field) = key.strip_prefix("MEDIADL_") else { continue };
            match field {
                "SESSION_PATH"              => self.session_path = PathBuf::from(&value),
                "DOWNLOAD_DIR"              => self.download_dir = PathBuf::from(&value),
                "FETCH_LIMIT"               => self.fetch_limit = parse(&key, &value)?,
                "INTER_ITEM_DELAY_MS"       => self.inter_item_delay_ms = parse(&key, &value)?,
                "CONNECT_RETRIES"           => self.connect_retries = parse(&key, &value)?,
                "RETRY_DELAY_MS"            => self.retry_delay_ms = parse(&key, &value)?,
                "FLOOD_WAIT_THRESHOLD_SECS" => self.flood_wait_threshold_secs = parse(&key, &value)?,
                _ => tracing::debug!("[mediadl] Ignoring unknown setting {key}"),
            }
        }
        Ok(self)
    }

    pub fn inter_item_delay(&self) -> Duration {
        Duration::from_millis(self.inter_item_delay_ms)
    }

    pub fn retry_policy(&self) -> Arc<dyn RetryPolicy> {
        Arc::new(AutoSleep {
            retries:         self.connect_retries,
            io_delay:        Duration::from_millis(self.retry_delay_ms),
            flood_threshold: Duration::from_secs(self.flood_wait_threshold_secs),
        })
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key:   key.to_string(),
        value: value.to_string(),
    })
}

// ─── ConfigError ──────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Parse(toml::de::Error),
    InvalidValue { key: String, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e)    => write!(f, "cannot read config: {e}"),
            Self::Parse(e) => write!(f, "invalid config: {e}"),
            Self::InvalidValue { key, value } => write!(f, "invalid value {value:?} for {key}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e)    => Some(e),
            Self::Parse(e) => Some(e),
            Self::InvalidValue { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = Config::from_toml_str("fetch_limit = 20\ninter_item_delay_ms = 0\n").unwrap();
        assert_eq!(cfg.fetch_limit, 20);
        assert_eq!(cfg.inter_item_delay(), Duration::ZERO);
        assert_eq!(cfg.session_path, PathBuf::from("mediadl.session"));
        assert_eq!(cfg.connect_retries, 3);
    }

    #[test]
    fn unknown_toml_keys_are_rejected() {
        assert!(matches!(Config::from_toml_str("fetch_limt = 1"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn env_overrides_and_validates() {
        let vars = vec![
            ("MEDIADL_DOWNLOAD_DIR".to_string(), "/tmp/out".to_string()),
            ("MEDIADL_INTER_ITEM_DELAY_MS".to_string(), "250".to_string()),
            ("PATH".to_string(), "/usr/bin".to_string()),
        ];
        let cfg = Config::default().apply_vars(vars).unwrap();
        assert_eq!(cfg.download_dir, PathBuf::from("/tmp/out"));
        assert_eq!(cfg.inter_item_delay(), Duration::from_millis(250));

        let bad = vec![("MEDIADL_FETCH_LIMIT".to_string(), "lots".to_string())];
        let err = Config::default().apply_vars(bad).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "MEDIADL_FETCH_LIMIT"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, Config::default());
    }
}
