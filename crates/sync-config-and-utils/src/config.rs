//! Configuration for the sync client.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default API base URL (can be overridden at compile time via ACOURSE_API_URL).
pub const DEFAULT_API_URL: &str = match option_env!("ACOURSE_API_URL") {
    Some(url) => url,
    None => "https://acourse.io",
};

/// Default realtime database URL (compile time: FIREBASE_DATABASE_URL).
pub const DEFAULT_DATABASE_URL: &str = match option_env!("FIREBASE_DATABASE_URL") {
    Some(url) => url,
    None => "https://acourse-d9d0a.firebaseio.com",
};

/// Default web API key of the realtime project (compile time: FIREBASE_API_KEY).
pub const DEFAULT_API_KEY: Option<&str> = option_env!("FIREBASE_API_KEY");

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// How long a shared listener stays attached after its last consumer leaves.
pub const DEFAULT_DETACH_DELAY_MS: u64 = 10_000;

/// Default per-request timeout for the REST/RPC API.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Base URL of the REST/RPC API.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Realtime database URL.
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Realtime project web API key.
    #[serde(default = "default_api_key")]
    pub api_key: Option<String>,
    /// Deferred detach delay in milliseconds.
    #[serde(default = "default_detach_delay_ms")]
    pub detach_delay_ms: u64,
    /// Turn unauthenticated calls to auth-required endpoints into errors
    /// instead of silent no-ops.
    #[serde(default)]
    pub strict_auth: bool,
    /// REST/RPC request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

fn default_api_key() -> Option<String> {
    DEFAULT_API_KEY.map(|s| s.to_string())
}

fn default_detach_delay_ms() -> u64 {
    DEFAULT_DETACH_DELAY_MS
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            api_url: default_api_url(),
            database_url: default_database_url(),
            api_key: default_api_key(),
            detach_delay_ms: DEFAULT_DETACH_DELAY_MS,
            strict_auth: false,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl Config {
    /// Create a Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production). Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(level) = get("ACOURSE_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(url) = get("ACOURSE_API_URL") {
            self.api_url = url;
        }
        if let Some(url) = get("FIREBASE_DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(key) = get("FIREBASE_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(strict) = get("ACOURSE_STRICT_AUTH") {
            self.strict_auth = matches!(strict.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    /// Check that both base URLs parse.
    pub fn validate(&self) -> CoreResult<()> {
        self.api_url()?;
        self.database_url()?;
        if self.request_timeout_ms == 0 {
            return Err(CoreError::Config(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the API base URL as a parsed URL.
    pub fn api_url(&self) -> CoreResult<Url> {
        Url::parse(&self.api_url).map_err(CoreError::from)
    }

    /// Get the realtime database URL as a parsed URL.
    pub fn database_url(&self) -> CoreResult<Url> {
        Url::parse(&self.database_url).map_err(CoreError::from)
    }

    pub fn detach_delay(&self) -> Duration {
        Duration::from_millis(self.detach_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.detach_delay(), Duration::from_secs(10));
        assert!(!config.strict_auth);
    }

    #[test]
    fn test_config_load_partial_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, r#"{ "log_level": "debug", "detach_delay_ms": 500 }"#)
            .unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.detach_delay_ms, 500);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        config.log_level = "trace".to_string();
        config.strict_auth = true;
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.detach_delay_ms, DEFAULT_DETACH_DELAY_MS);
    }

    #[test]
    fn test_overrides_ignore_empty_values() {
        let vars: HashMap<&str, &str> = [
            ("ACOURSE_LOG_LEVEL", "warn"),
            ("ACOURSE_API_URL", "  "),
            ("ACOURSE_STRICT_AUTH", "TRUE"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.log_level, "warn");
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert!(config.strict_auth);
    }

    #[test]
    fn test_config_invalid_url() {
        let mut config = Config::default();
        config.database_url = "not a valid url".to_string();
        assert!(config.database_url().is_err());
        assert!(matches!(config.validate(), Err(CoreError::InvalidUrl(_))));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = Config::default();
        config.request_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }
}
