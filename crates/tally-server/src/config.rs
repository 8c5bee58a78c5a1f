//! Server configuration
//!
//! Values are layered: built-in defaults, then an optional TOML file,
//! then environment variables, then command-line flags.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};
use tally_logging::LogConfig;
use thiserror::Error;

pub const DEFAULT_API_KEY: &str = "your-secret-api-key-12345";

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}

/// Complete server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Location of the redb file
    pub db_path: PathBuf,
    /// Shared secret for `POST /update`
    pub api_key: String,
    /// Extra attempts for an update that hits a concurrency conflict
    pub max_conflict_retries: u32,
    /// Logging setup
    pub log: LogConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            db_path: PathBuf::from("app.redb"),
            api_key: DEFAULT_API_KEY.to_string(),
            max_conflict_retries: 3,
            log: LogConfig::default(),
        }
    }
}

/// Command-line flags
#[derive(Debug, Default, Parser)]
#[command(name = "tally-server", version, about = "Shared counter and message service")]
pub struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Interface to bind
    #[arg(long)]
    pub host: Option<String>,

    /// TCP port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Database file
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Default log level (RUST_LOG still wins)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Human-readable console logs instead of JSON lines
    #[arg(long)]
    pub pretty: bool,

    /// Also write daily-rotated JSONL log files into this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

impl ServerConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Build the effective configuration for a process
    pub fn resolve(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.apply_cli(cli);
        Ok(config)
    }

    /// Override fields from environment variables read through `lookup`
    ///
    /// Recognized: `PORT`, `API_KEY`, `TALLY_HOST`, `TALLY_DB_PATH`,
    /// `TALLY_LOG_DIR`, `TALLY_MAX_CONFLICT_RETRIES`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "PORT",
                value: port,
            })?;
        }
        if let Some(key) = lookup("API_KEY") {
            self.api_key = key;
        }
        if let Some(host) = lookup("TALLY_HOST") {
            self.host = host;
        }
        if let Some(path) = lookup("TALLY_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("TALLY_LOG_DIR") {
            self.log.log_to_dir(dir);
        }
        if let Some(retries) = lookup("TALLY_MAX_CONFLICT_RETRIES") {
            self.max_conflict_retries =
                retries.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: "TALLY_MAX_CONFLICT_RETRIES",
                    value: retries,
                })?;
        }
        Ok(())
    }

    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(host) = &cli.host {
            self.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(db) = &cli.db {
            self.db_path = db.clone();
        }
        if let Some(level) = &cli.log_level {
            self.log.default_level = level.clone();
        }
        if cli.pretty {
            self.log.use_pretty_console();
        }
        if let Some(dir) = &cli.log_dir {
            self.log.log_to_dir(dir.clone());
        }
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.host.parse().map_err(|_| ConfigError::InvalidValue {
            key: "host",
            value: self.host.clone(),
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn uses_default_api_key(&self) -> bool {
        self.api_key == DEFAULT_API_KEY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr().unwrap(), "0.0.0.0:5000".parse().unwrap());
        assert_eq!(config.db_path, PathBuf::from("app.redb"));
        assert!(config.uses_default_api_key());
    }

    #[test]
    fn test_partial_toml() {
        let config = ServerConfig::from_toml_str(
            r#"
            port = 8080
            api_key = "from-file"

            [log]
            default_level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.api_key, "from-file");
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.log.default_level, "debug");
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = ServerConfig::from_toml_str("port = 8080").unwrap();
        config
            .apply_env(env(&[
                ("PORT", "9000"),
                ("API_KEY", "from-env"),
                ("TALLY_DB_PATH", "/tmp/state.redb"),
            ]))
            .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.api_key, "from-env");
        assert_eq!(config.db_path, PathBuf::from("/tmp/state.redb"));
    }

    #[test]
    fn test_bad_env_port() {
        let mut config = ServerConfig::default();
        let err = config.apply_env(env(&[("PORT", "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "PORT", .. }));
    }

    #[test]
    fn test_cli_wins() {
        let mut config = ServerConfig::default();
        config.apply_env(env(&[("PORT", "9000")])).unwrap();
        let cli = Cli::parse_from(["tally-server", "--port", "7000", "--pretty", "--host", "127.0.0.1"]);
        config.apply_cli(&cli);
        assert_eq!(config.bind_addr().unwrap(), "127.0.0.1:7000".parse().unwrap());
        assert!(config.log.console.pretty);
    }

    #[test]
    fn test_log_dir_enables_file_output() {
        let mut config = ServerConfig::default();
        config.apply_env(env(&[("TALLY_LOG_DIR", "/tmp/from-env")])).unwrap();
        assert_eq!(
            config.log.file.as_ref().unwrap().directory,
            PathBuf::from("/tmp/from-env")
        );

        let cli = Cli::parse_from(["tally-server", "--log-dir", "/tmp/from-cli"]);
        config.apply_cli(&cli);
        assert_eq!(
            config.log.file.as_ref().unwrap().directory,
            PathBuf::from("/tmp/from-cli")
        );
    }

    #[test]
    fn test_invalid_host() {
        let config = ServerConfig {
            host: "not an ip".into(),
            ..Default::default()
        };
        assert!(config.bind_addr().is_err());
    }
}
