//! Server configuration module.
//!
//! Parses configuration from environment variables for the Chatter server.
//! `main` loads a `.env` file (if present) before calling [`Config::from_env`].
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `JWT_SECRET` | Yes | - | HS256 secret used to verify bearer tokens |
//! | `DATABASE_URL` | No | - | SQLite URL (`sqlite:chat.db`); in-memory store when unset |
//! | `PORT` | No | 3000 | HTTP server port |

use std::env;

use thiserror::Error;
use tracing::warn;

/// Default HTTP server port.
const DEFAULT_PORT: u16 = 3000;

/// URL scheme accepted for `DATABASE_URL`.
const SQLITE_SCHEME: &str = "sqlite:";

/// Errors that can occur when parsing configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has invalid format.
    #[error("invalid format for {var}: {message}")]
    InvalidFormat { var: String, message: String },

    /// Port number is invalid.
    #[error("invalid port number: {0}")]
    InvalidPort(#[from] std::num::ParseIntError),
}

/// Server configuration parsed from environment variables.
#[derive(Clone)]
pub struct Config {
    /// HTTP server port.
    pub port: u16,

    /// Connection string for the document store. `None` selects the
    /// in-memory store.
    pub database_url: Option<String>,

    /// Shared secret for verifying bearer tokens.
    pub jwt_secret: String,
}

impl Config {
    /// Parse configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - `JWT_SECRET` is missing or empty
    /// - `DATABASE_URL` is set but is not a SQLite URL
    /// - `PORT` is not a valid u16
    ///
    /// # Example
    ///
    /// ```no_run
    /// use chatter_server::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Server will listen on port {}", config.port);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = parse_port()?;
        let database_url = parse_database_url()?;
        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => return Err(ConfigError::MissingEnvVar("JWT_SECRET".to_string())),
        };

        if database_url.is_none() {
            warn!("DATABASE_URL is not set - messages are kept in memory only");
        }

        Ok(Self {
            port,
            database_url,
            jwt_secret,
        })
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("jwt_secret", &"<redacted>")
            .finish()
    }
}

/// Parse the PORT environment variable.
///
/// Returns the default port if not set.
fn parse_port() -> Result<u16, ConfigError> {
    match env::var("PORT") {
        Ok(port_str) => Ok(port_str.trim().parse()?),
        Err(env::VarError::NotPresent) => Ok(DEFAULT_PORT),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidFormat {
            var: "PORT".to_string(),
            message: "contains invalid unicode".to_string(),
        }),
    }
}

/// Parse the DATABASE_URL environment variable.
///
/// An empty value is treated the same as an unset one.
fn parse_database_url() -> Result<Option<String>, ConfigError> {
    let url = match env::var("DATABASE_URL") {
        Ok(s) if !s.trim().is_empty() => s.trim().to_string(),
        _ => return Ok(None),
    };

    if !url.starts_with(SQLITE_SCHEME) {
        return Err(ConfigError::InvalidFormat {
            var: "DATABASE_URL".to_string(),
            message: format!("expected a '{SQLITE_SCHEME}' URL, got '{url}'"),
        });
    }

    Ok(Some(url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    /// Helper to temporarily set environment variables for testing.
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            let old_value = env::var(key).ok();
            self.vars.push((key.to_string(), old_value));
            env::set_var(key, value);
        }

        fn remove(&mut self, key: &str) {
            let old_value = env::var(key).ok();
            self.vars.push((key.to_string(), old_value));
            env::remove_var(key);
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.iter().rev() {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    #[serial]
    fn test_config_defaults() {
        let mut guard = EnvGuard::new();
        guard.set("JWT_SECRET", "secret");
        guard.remove("DATABASE_URL");
        guard.remove("PORT");

        let config = Config::from_env().expect("should parse config");
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.database_url.is_none());
        assert_eq!(config.jwt_secret, "secret");
    }

    #[test]
    #[serial]
    fn test_config_all_values() {
        let mut guard = EnvGuard::new();
        guard.set("JWT_SECRET", "secret");
        guard.set("DATABASE_URL", "sqlite:chat.db");
        guard.set("PORT", "9090");

        let config = Config::from_env().expect("should parse config");
        assert_eq!(config.port, 9090);
        assert_eq!(config.database_url, Some("sqlite:chat.db".to_string()));
    }

    #[test]
    #[serial]
    fn test_config_missing_jwt_secret() {
        let mut guard = EnvGuard::new();
        guard.remove("JWT_SECRET");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref v) if v == "JWT_SECRET"));
    }

    #[test]
    #[serial]
    fn test_config_empty_jwt_secret() {
        let mut guard = EnvGuard::new();
        guard.set("JWT_SECRET", "");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(_)));
    }

    #[test]
    #[serial]
    fn test_parse_port_default() {
        let mut guard = EnvGuard::new();
        guard.remove("PORT");

        assert_eq!(parse_port().expect("should parse port"), 3000);
    }

    #[test]
    #[serial]
    fn test_parse_port_custom() {
        let mut guard = EnvGuard::new();
        guard.set("PORT", "8081");

        assert_eq!(parse_port().expect("should parse port"), 8081);
    }

    #[test]
    #[serial]
    fn test_parse_port_invalid() {
        let mut guard = EnvGuard::new();
        guard.set("PORT", "not-a-number");

        assert!(matches!(parse_port(), Err(ConfigError::InvalidPort(_))));
    }

    #[test]
    #[serial]
    fn test_parse_port_out_of_range() {
        let mut guard = EnvGuard::new();
        guard.set("PORT", "99999");

        assert!(parse_port().is_err());
    }

    #[test]
    #[serial]
    fn test_parse_database_url_empty_is_none() {
        let mut guard = EnvGuard::new();
        guard.set("DATABASE_URL", "   ");

        assert_eq!(parse_database_url().unwrap(), None);
    }

    #[test]
    #[serial]
    fn test_parse_database_url_rejects_other_schemes() {
        let mut guard = EnvGuard::new();
        guard.set("DATABASE_URL", "mongodb://localhost:27017/chat");

        let err = parse_database_url().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFormat { var, .. } if var == "DATABASE_URL"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = Config {
            port: 3000,
            database_url: None,
            jwt_secret: "super-secret".to_string(),
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }
}
