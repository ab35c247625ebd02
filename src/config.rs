use medidash_core::realtime::{BridgeConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Hosted backend (REST + realtime websocket)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Project URL, e.g. "https://xyz.example.co"
    pub url: Option<String>,
    /// Anon or service key sent with every request
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Database schema the tables live in
    pub schema: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            schema: "public".to_string(),
        }
    }
}

impl BackendConfig {
    /// Returns true if both url and api_key are set
    pub fn is_configured(&self) -> bool {
        self.url.is_some() && self.api_key.is_some()
    }
}

/// Live update tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub debounce_ms: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub join_timeout_secs: u64,
    pub heartbeat_secs: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            join_timeout_secs: 10,
            heartbeat_secs: 30,
        }
    }
}

impl RealtimeConfig {
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            debounce: Duration::from_millis(self.debounce_ms),
            retry: RetryPolicy::new(
                self.retry_attempts,
                Duration::from_millis(self.retry_delay_ms),
            ),
        }
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs.max(1))
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }

    /// Socket reconnects back off like fetch retries, but never faster than 1s.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms).max(Duration::from_secs(1))
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Path to the SQLite database holding local settings
    pub database_path: ConfigValue<PathBuf>,
    /// Backend URL, tracked separately so `config show` can report its source
    pub backend_url: ConfigValue<Option<String>>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    pub backend: BackendConfig,
    pub realtime: RealtimeConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    backend: Option<BackendConfig>,
    realtime: Option<RealtimeConfig>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let default_db_path = Self::default_data_dir().join("medidash.db");

        // Start with defaults
        let mut database_path = ConfigValue::new(default_db_path, ConfigSource::Default);
        let mut backend_url = ConfigValue::new(None, ConfigSource::Default);
        let mut config_file = None;
        let mut backend = BackendConfig::default();
        let mut realtime = RealtimeConfig::default();

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(db_path) = file_config.database_path {
                // Resolve relative paths against config file's directory
                let resolved_path = if db_path.is_relative() {
                    path.parent().map(|p| p.join(&db_path)).unwrap_or(db_path)
                } else {
                    db_path
                };
                database_path = ConfigValue::new(resolved_path, ConfigSource::File);
            }
            if let Some(backend_config) = file_config.backend {
                if backend_config.url.is_some() {
                    backend_url = ConfigValue::new(backend_config.url.clone(), ConfigSource::File);
                }
                backend = backend_config;
            }
            if let Some(realtime_config) = file_config.realtime {
                realtime = realtime_config;
            }
        }

        // Apply environment variable overrides
        if let Ok(db_path) = std::env::var("MEDIDASH_DATABASE_PATH") {
            database_path = ConfigValue::new(PathBuf::from(db_path), ConfigSource::Environment);
        }
        if let Ok(url) = std::env::var("MEDIDASH_BACKEND_URL") {
            backend_url = ConfigValue::new(Some(url), ConfigSource::Environment);
        }
        if let Ok(key) = std::env::var("MEDIDASH_API_KEY") {
            backend.api_key = Some(key);
        }
        backend.url = backend_url.value.clone();

        Ok(Self {
            database_path,
            backend_url,
            config_file,
            backend,
            realtime,
        })
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/medidash/
    /// - macOS: ~/Library/Application Support/medidash/
    /// - Windows: %APPDATA%/medidash/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("medidash")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/medidash/
    /// - macOS: ~/Library/Application Support/medidash/
    /// - Windows: %APPDATA%/medidash/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("medidash")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let config = Config::load(Some(config_path)).unwrap();
        assert!(config
            .database_path
            .value
            .to_string_lossy()
            .contains("medidash.db"));
        assert_eq!(config.database_path.source, ConfigSource::Default);
        assert_eq!(config.backend.schema, "public");
        assert_eq!(config.realtime, RealtimeConfig::default());
        assert!(config.config_file.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "database_path: /custom/path/db.sqlite").unwrap();
        writeln!(file, "backend:").unwrap();
        writeln!(file, "  url: https://hospital.example.co").unwrap();
        writeln!(file, "  api_key: anon-key").unwrap();
        writeln!(file, "realtime:").unwrap();
        writeln!(file, "  debounce_ms: 250").unwrap();

        let config = Config::load(Some(config_path.clone())).unwrap();
        assert_eq!(
            config.database_path.value,
            PathBuf::from("/custom/path/db.sqlite")
        );
        assert_eq!(config.database_path.source, ConfigSource::File);
        assert_eq!(config.backend_url.source, ConfigSource::File);
        assert!(config.backend.is_configured());
        assert_eq!(config.backend.schema, "public");
        assert_eq!(config.realtime.debounce_ms, 250);
        assert_eq!(config.realtime.retry_attempts, 3);
        assert_eq!(config.config_file, Some(config_path));
    }

    #[test]
    fn test_relative_database_path() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "database_path: data/local.db").unwrap();

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(
            config.database_path.value,
            temp_dir.path().join("data/local.db")
        );
    }

    #[test]
    #[ignore] // Run with --ignored; env vars can pollute parallel tests
    fn test_env_var_overrides_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "backend:").unwrap();
        writeln!(file, "  url: https://fromfile.example.co").unwrap();

        std::env::set_var("MEDIDASH_BACKEND_URL", "https://fromenv.example.co");

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(
            config.backend.url.as_deref(),
            Some("https://fromenv.example.co")
        );
        assert_eq!(config.backend_url.source, ConfigSource::Environment);

        std::env::remove_var("MEDIDASH_BACKEND_URL");
    }

    #[test]
    fn test_invalid_yaml_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "invalid: yaml: content: [").unwrap();

        let result = Config::load(Some(config_path));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_bridge_config_from_realtime() {
        let realtime = RealtimeConfig {
            debounce_ms: 500,
            retry_attempts: 0,
            retry_delay_ms: 200,
            join_timeout_secs: 0,
            heartbeat_secs: 15,
        };
        let bridge = realtime.bridge_config();
        assert_eq!(bridge.debounce, Duration::from_millis(500));
        assert_eq!(bridge.retry.max_attempts, 1);
        assert_eq!(bridge.retry.base_delay, Duration::from_millis(200));
        assert_eq!(realtime.join_timeout(), Duration::from_secs(1));
        assert_eq!(realtime.heartbeat(), Duration::from_secs(15));
    }
}
