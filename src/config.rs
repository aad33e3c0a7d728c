//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::ApiConfig;
use crate::websocket::HubConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub hub: HubSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    #[serde(default = "default_max_history_limit")]
    pub max_history_limit: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_history_limit() -> usize {
    50
}

fn default_max_history_limit() -> usize {
    500
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
            history_limit: default_history_limit(),
            max_history_limit: default_max_history_limit(),
        }
    }
}

/// SQLite database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("parlor").join("parlor.db").to_string_lossy().to_string())
        .unwrap_or_else(|| "./parlor.db".to_string())
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// Token verification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret; must be set before serving
    #[serde(default)]
    pub jwt_secret: String,

    /// Clock skew tolerated on `exp`
    #[serde(default = "default_leeway")]
    pub leeway_secs: u64,

    /// Lifetime of tokens minted by the CLI
    #[serde(default = "default_token_ttl")]
    pub token_ttl_minutes: i64,
}

fn default_leeway() -> u64 {
    30
}

fn default_token_ttl() -> i64 {
    60 * 24
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            leeway_secs: default_leeway(),
            token_ttl_minutes: default_token_ttl(),
        }
    }
}

/// Connection hub tuning
#[derive(Debug, Clone, Deserialize)]
pub struct HubSettings {
    /// Frames queued per connection before it is treated as slow
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    /// Upper bound on a single socket write
    #[serde(default = "default_send_timeout")]
    pub send_timeout_ms: u64,
}

fn default_outbound_buffer() -> usize {
    64
}

fn default_send_timeout() -> u64 {
    5000 // 5 seconds
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            outbound_buffer: default_outbound_buffer(),
            send_timeout_ms: default_send_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from an explicit path, or fall back to the default locations
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => {
                let config = Self::load_with_env(path)?;
                tracing::info!("Loaded config from {:?}", path);
                Ok(config)
            }
            None => Ok(Self::load_default()),
        }
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("parlor").join("config.toml")),
            Some(PathBuf::from("/etc/parlor/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        // Fall back to environment-only config
        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Server overrides
        if let Some(host) = lookup("PARLOR_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PARLOR_PORT") {
            match port.parse() {
                Ok(p) => self.server.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid PARLOR_PORT"),
            }
        }

        if let Some(path) = lookup("PARLOR_DATABASE") {
            self.database.path = path;
        }

        if let Some(secret) = lookup("PARLOR_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }

        // Logging overrides
        if let Some(level) = lookup("PARLOR_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("PARLOR_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// HTTP layer settings
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            cors_origins: self.server.cors_origins.clone(),
            history_limit: self.server.history_limit.max(1),
            max_history_limit: self.server.max_history_limit.max(1),
        }
    }

    /// Connection hub settings
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            outbound_buffer: self.hub.outbound_buffer.max(1),
            send_timeout: Duration::from_millis(self.hub.send_timeout_ms),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Parlor Configuration
#
# Environment variables override these settings:
# - PARLOR_HOST
# - PARLOR_PORT
# - PARLOR_DATABASE
# - PARLOR_JWT_SECRET
# - PARLOR_LOG_LEVEL
# - PARLOR_LOG_FORMAT

[server]
# Server host
host = "0.0.0.0"

# Server port
port = 8090

# Allowed CORS origins (empty allows any origin)
cors_origins = []

# Default and maximum page size for message history
history_limit = 50
max_history_limit = 500

[database]
# SQLite database file
path = "~/.local/share/parlor/parlor.db"

[auth]
# HS256 secret used to sign and verify bearer tokens
jwt_secret = ""

# Tolerated clock skew when checking token expiry (seconds)
leeway_secs = 30

# Lifetime of tokens issued by `parlor token` (minutes)
token_ttl_minutes = 1440

[hub]
# Frames queued per connection before the client is dropped as too slow
outbound_buffer = 64

# Maximum time a single socket write may take (ms)
send_timeout_ms = 5000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_generated_config_parses() {
        let config = Config::parse(&generate_default_config(), Path::new("default.toml")).unwrap();

        assert_eq!(config.server.port, 8090);
        assert_eq!(config.hub.outbound_buffer, 64);
        assert_eq!(config.hub.send_timeout_ms, 5000);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::parse(
            "[hub]\noutbound_buffer = 8\n\n[auth]\njwt_secret = \"s3cret\"\n",
            Path::new("partial.toml"),
        )
        .unwrap();

        assert_eq!(config.hub.outbound_buffer, 8);
        assert_eq!(config.hub.send_timeout_ms, 5000);
        assert_eq!(config.auth.jwt_secret, "s3cret");
        assert_eq!(config.auth.leeway_secs, 30);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_invalid_toml_reports_path() {
        let err = Config::parse("[server\nport = ", Path::new("broken.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { ref path, .. } if path == Path::new("broken.toml")));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nport = 9100\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.port, 9100);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PARLOR_HOST", "127.0.0.1"),
            ("PARLOR_PORT", "9000"),
            ("PARLOR_DATABASE", "/tmp/chat.db"),
            ("PARLOR_JWT_SECRET", "from-env"),
            ("PARLOR_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.database.path, "/tmp/chat.db");
        assert_eq!(config.auth.jwt_secret, "from-env");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_bad_port_override_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|key| (key == "PARLOR_PORT").then(|| "not-a-port".to_string()));
        assert_eq!(config.server.port, 8090);
    }

    #[test]
    fn test_hub_config_conversion() {
        let mut config = Config::default();
        config.hub.outbound_buffer = 0;
        config.hub.send_timeout_ms = 250;

        let hub = config.hub_config();
        assert_eq!(hub.outbound_buffer, 1);
        assert_eq!(hub.send_timeout, Duration::from_millis(250));
    }
}
