//! Client configuration: built-in defaults, then an optional JSON file, then
//! environment variables.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chat_api::ChatApiConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::media::DEFAULT_MAX_MEDIA_BYTES;

pub const CONFIG_PATH_ENV: &str = "MXLN_CONFIG_PATH";
pub const BASE_URL_ENV: &str = "MXLN_BASE_URL";
pub const TIMEOUT_ENV: &str = "MXLN_TIMEOUT_SEC";
pub const MAX_MEDIA_BYTES_ENV: &str = "MXLN_MAX_MEDIA_BYTES";
pub const PREFERENCES_PATH_ENV: &str = "MXLN_PREFERENCES_PATH";
pub const LOG_ENV: &str = "MXLN_LOG";

const USER_AGENT: &str = concat!("mxln/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    pub base_url: String,
    pub timeout: Option<Duration>,
    pub max_media_bytes: u64,
    /// `None` keeps preferences in memory only.
    pub preferences_path: Option<PathBuf>,
    pub log_filter: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: chat_api::url::DEFAULT_BASE_URL.to_string(),
            timeout: None,
            max_media_bytes: DEFAULT_MAX_MEDIA_BYTES,
            preferences_path: default_preferences_path(),
            log_filter: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    base_url: Option<String>,
    timeout_sec: Option<u64>,
    max_media_bytes: Option<u64>,
    preferences_path: Option<PathBuf>,
    log: Option<String>,
}

impl ChatConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(path) = env_string_opt(CONFIG_PATH_ENV) {
            config.apply_file(Path::new(&path))?;
        }
        config.apply_env()?;
        Ok(config)
    }

    /// Overlays values from a JSON config file.
    pub fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigFile = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(base_url) = file.base_url.filter(|value| !value.trim().is_empty()) {
            self.base_url = base_url;
        }
        if let Some(seconds) = file.timeout_sec {
            self.timeout = Some(timeout_from_secs("timeout_sec", seconds)?);
        }
        if let Some(max_media_bytes) = file.max_media_bytes {
            self.max_media_bytes = max_media_bytes;
        }
        if let Some(path) = file.preferences_path {
            self.preferences_path = Some(path);
        }
        if let Some(log) = file.log.filter(|value| !value.trim().is_empty()) {
            self.log_filter = Some(log);
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(base_url) = env_string_opt(BASE_URL_ENV) {
            self.base_url = base_url;
        }
        if let Some(raw) = env_string_opt(TIMEOUT_ENV) {
            let seconds = parse_u64(TIMEOUT_ENV, &raw)?;
            self.timeout = Some(timeout_from_secs(TIMEOUT_ENV, seconds)?);
        }
        if let Some(raw) = env_string_opt(MAX_MEDIA_BYTES_ENV) {
            self.max_media_bytes = parse_u64(MAX_MEDIA_BYTES_ENV, &raw)?;
        }
        if let Some(path) = env_string_opt(PREFERENCES_PATH_ENV) {
            self.preferences_path = Some(PathBuf::from(path));
        }
        if let Some(filter) = env_string_opt(LOG_ENV) {
            self.log_filter = Some(filter);
        }
        Ok(())
    }

    /// Transport settings for the completion client.
    #[must_use]
    pub fn chat_api_config(&self) -> ChatApiConfig {
        let config = ChatApiConfig::new(self.base_url.clone()).with_user_agent(USER_AGENT);
        match self.timeout {
            Some(timeout) => config.with_timeout(timeout),
            None => config,
        }
    }
}

fn default_preferences_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("mxln").join("preferences.json"))
}

fn timeout_from_secs(key: &'static str, seconds: u64) -> Result<Duration, ConfigError> {
    if seconds == 0 {
        return Err(ConfigError::InvalidValue {
            key,
            value: seconds.to_string(),
            reason: "must be greater than zero",
        });
    }
    Ok(Duration::from_secs(seconds))
}

fn parse_u64(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
        reason: "expected a non-negative integer",
    })
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value.trim().to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    const ALL_KEYS: [&str; 6] = [
        CONFIG_PATH_ENV,
        BASE_URL_ENV,
        TIMEOUT_ENV,
        MAX_MEDIA_BYTES_ENV,
        PREFERENCES_PATH_ENV,
        LOG_ENV,
    ];

    struct EnvGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.previous {
                env::set_var(self.key, value);
            } else {
                env::remove_var(self.key);
            }
        }
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env lock poisoned")
    }

    fn set_env_guard(key: &'static str, value: Option<&str>) -> EnvGuard {
        let previous = env::var(key).ok();
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
        EnvGuard { key, previous }
    }

    fn clear_all() -> Vec<EnvGuard> {
        ALL_KEYS
            .into_iter()
            .map(|key| set_env_guard(key, None))
            .collect()
    }

    #[test]
    fn defaults_apply_without_env() {
        let _lock = env_lock();
        let _guards = clear_all();

        let config = ChatConfig::from_env().expect("config");
        assert_eq!(config.base_url, "http://127.0.0.1:8080");
        assert_eq!(config.timeout, None);
        assert_eq!(config.max_media_bytes, DEFAULT_MAX_MEDIA_BYTES);
        assert_eq!(config.log_filter, None);
    }

    #[test]
    fn env_values_override_defaults_and_blank_values_are_ignored() {
        let _lock = env_lock();
        let _guards = clear_all();
        let _g1 = set_env_guard(BASE_URL_ENV, Some(" http://chat.local:9000 "));
        let _g2 = set_env_guard(TIMEOUT_ENV, Some("30"));
        let _g3 = set_env_guard(MAX_MEDIA_BYTES_ENV, Some("1024"));
        let _g4 = set_env_guard(PREFERENCES_PATH_ENV, Some("/tmp/mxln-prefs.json"));
        let _g5 = set_env_guard(LOG_ENV, Some("   "));

        let config = ChatConfig::from_env().expect("config");
        assert_eq!(config.base_url, "http://chat.local:9000");
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.max_media_bytes, 1024);
        assert_eq!(
            config.preferences_path.as_deref(),
            Some(Path::new("/tmp/mxln-prefs.json"))
        );
        assert_eq!(config.log_filter, None);
    }

    #[test]
    fn invalid_numbers_are_errors() {
        let _lock = env_lock();
        let _guards = clear_all();
        let _g1 = set_env_guard(TIMEOUT_ENV, Some("0"));
        assert!(matches!(
            ChatConfig::from_env(),
            Err(ConfigError::InvalidValue { key: TIMEOUT_ENV, .. })
        ));

        let _g2 = set_env_guard(TIMEOUT_ENV, Some("soon"));
        assert!(matches!(
            ChatConfig::from_env(),
            Err(ConfigError::InvalidValue { key: TIMEOUT_ENV, .. })
        ));
    }

    #[test]
    fn file_values_sit_between_defaults_and_env() {
        let _lock = env_lock();
        let _guards = clear_all();
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("mxln.json");
        std::fs::write(
            &path,
            r#"{"base_url":"http://from-file:1","max_media_bytes":10,"log":"mxln_chat=debug"}"#,
        )
        .expect("config file should be written");

        let _g1 = set_env_guard(CONFIG_PATH_ENV, Some(path.to_str().expect("utf-8 path")));
        let _g2 = set_env_guard(MAX_MEDIA_BYTES_ENV, Some("20"));

        let config = ChatConfig::from_env().expect("config");
        assert_eq!(config.base_url, "http://from-file:1");
        assert_eq!(config.max_media_bytes, 20);
        assert_eq!(config.log_filter.as_deref(), Some("mxln_chat=debug"));
    }

    #[test]
    fn unknown_file_fields_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("mxln.json");
        std::fs::write(&path, r#"{"base_uri":"typo"}"#).expect("config file should be written");

        let mut config = ChatConfig::default();
        assert!(matches!(
            config.apply_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
