//! Configuration file handling

use serde::Deserialize;
use std::path::Path;

use super::paths::config_path;
use super::Result;
use crate::testing::runner::DEFAULT_ITERATIONS;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Backend connection settings
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Default settings applied to every suite
    #[serde(default)]
    pub defaults: Defaults,
}

/// Connection parameters for the backend under test
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default = "default_password")]
    pub password: String,

    #[serde(default = "default_database")]
    pub database: String,

    /// Reported to the server as `application_name`
    #[serde(default = "default_application_name")]
    pub application_name: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: default_user(),
            password: default_password(),
            database: default_database(),
            application_name: default_application_name(),
        }
    }
}

impl ConnectionConfig {
    /// `host:port`, used in log lines and connection errors
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    8812
}
fn default_user() -> String {
    "admin".to_string()
}
fn default_password() -> String {
    "quest".to_string()
}
fn default_database() -> String {
    "qdb".to_string()
}
fn default_application_name() -> String {
    "compat-runner".to_string()
}

/// Default settings
#[derive(Debug, Deserialize, Clone)]
pub struct Defaults {
    /// Iterations per test when the test does not set `iterations`
    #[serde(default = "default_iterations")]
    pub iterations: u32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
        }
    }
}

fn default_iterations() -> u32 {
    DEFAULT_ITERATIONS
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit path, which must exist
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_backend() {
        let config = Config::default();
        assert_eq!(config.connection.endpoint(), "localhost:8812");
        assert_eq!(config.connection.user, "admin");
        assert_eq!(config.connection.password, "quest");
        assert_eq!(config.connection.database, "qdb");
        assert_eq!(config.defaults.iterations, 50);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::parse(
            r#"
[connection]
host = "db.internal"
port = 5432

[defaults]
iterations = 3
"#,
        )
        .unwrap();
        assert_eq!(config.connection.endpoint(), "db.internal:5432");
        assert_eq!(config.connection.user, "admin");
        assert_eq!(config.defaults.iterations, 3);
    }

    #[test]
    fn test_invalid_toml_is_config_parse_error() {
        let err = Config::parse("[connection\nhost = 1").unwrap_err();
        assert!(matches!(err, crate::common::Error::ConfigParse(_)));
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = Config::load_from(Path::new("/nonexistent/compat-runner.toml")).unwrap_err();
        assert!(matches!(err, crate::common::Error::FileRead { .. }));
    }
}
