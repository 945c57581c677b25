//! Configuration loading and validation.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Canvax configuration.
///
/// Every section is optional; missing values fall back to the defaults the
/// accessor methods return.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address both listeners bind to (default: "0.0.0.0").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    /// HTTP port serving `/create`, `/join`, `/health` and the WebSocket endpoint.
    #[serde(default = "default_port")]
    pub port: u16,

    /// TCP port for the newline-delimited JSON stream transport.
    #[serde(default = "default_stream_port")]
    pub stream_port: u16,

    /// How long shutdown waits for in-flight connections to finish.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: None,
            port: default_port(),
            stream_port: default_stream_port(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_port() -> u16 {
    8080
}

fn default_stream_port() -> u16 {
    8081
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

/// Tunables for canvas sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// History ceiling; reaching it discards the oldest half.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Capacity of each session's broadcast feed.
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,

    /// Clientless sessions idle longer than this are reaped.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,

    #[serde(default = "default_code_length")]
    pub code_length: usize,

    #[serde(default = "default_client_id_length")]
    pub client_id_length: usize,

    /// Longest accepted stream-transport line, in bytes.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            feed_capacity: default_feed_capacity(),
            idle_timeout_secs: default_idle_timeout_secs(),
            reap_interval_secs: default_reap_interval_secs(),
            code_length: default_code_length(),
            client_id_length: default_client_id_length(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

fn default_history_limit() -> usize {
    1000
}

fn default_feed_capacity() -> usize {
    100
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_reap_interval_secs() -> u64 {
    60
}

fn default_code_length() -> usize {
    6
}

fn default_client_id_length() -> usize {
    8
}

fn default_max_frame_bytes() -> usize {
    64 * 1024
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "canvax_gateway=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

static ENV_VAR_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid"));

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    ENV_VAR_PATTERN
        .replace_all(input, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    ///
    /// A missing file yields the default config.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let substituted = substitute_env_vars(&raw);

        let config: Config = json5::from_str(&substituted)
            .map_err(|e| crate::error::CanvaxError::Config(e.to_string()))?;

        tracing::debug!(path = %path.display(), "Config loaded");
        Ok(config)
    }

    /// Default config file location: `~/.canvax/config.json`.
    pub fn default_path() -> PathBuf {
        data_dir().join("config.json")
    }

    pub fn bind_addr(&self) -> String {
        self.server
            .as_ref()
            .and_then(|s| s.bind.clone())
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    pub fn port(&self) -> u16 {
        self.server.as_ref().map(|s| s.port).unwrap_or_else(default_port)
    }

    pub fn stream_port(&self) -> u16 {
        self.server
            .as_ref()
            .map(|s| s.stream_port)
            .unwrap_or_else(default_stream_port)
    }

    pub fn shutdown_grace(&self) -> Duration {
        let secs = self
            .server
            .as_ref()
            .map(|s| s.shutdown_grace_secs)
            .unwrap_or_else(default_shutdown_grace_secs);
        Duration::from_secs(secs)
    }

    /// Session tunables, falling back to defaults when the section is absent.
    pub fn session(&self) -> SessionConfig {
        self.session.clone().unwrap_or_default()
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if let Some(server) = &self.server {
            if server.port == 0 {
                errors.push("Server port cannot be 0".to_string());
            }
            if server.stream_port == 0 {
                errors.push("Stream port cannot be 0".to_string());
            }
            if server.port == server.stream_port {
                errors.push(format!(
                    "Server port and stream port must differ (both {})",
                    server.port
                ));
            }
        }

        if let Some(session) = &self.session {
            if session.history_limit < 2 {
                errors.push("session.history_limit must be at least 2".to_string());
            }
            if session.feed_capacity == 0 {
                errors.push("session.feed_capacity cannot be 0".to_string());
            }
            if session.code_length == 0 || session.client_id_length == 0 {
                errors.push("Session code and client id lengths must be non-zero".to_string());
            }
            if session.code_length < 4 {
                warnings.push(format!(
                    "session.code_length {} makes code collisions likely",
                    session.code_length
                ));
            }
            if session.reap_interval_secs == 0 {
                errors.push("session.reap_interval_secs cannot be 0".to_string());
            }
        }

        if let Some(logging) = &self.logging {
            if logging.format != "plain" && logging.format != "json" {
                warnings.push(format!(
                    "Unknown log format '{}', falling back to plain",
                    logging.format
                ));
            }
        }

        (warnings, errors)
    }
}

/// Base directory for Canvax data: `~/.canvax/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".canvax")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        // SAFETY: test-only, single-threaded test runner
        unsafe { std::env::set_var("TEST_CANVAX_BIND", "127.0.0.1") };
        let input = r#"{"bind": "${TEST_CANVAX_BIND}", "other": "plain"}"#;
        let result = substitute_env_vars(input);
        assert!(result.contains("127.0.0.1"));
        assert!(result.contains("plain"));
        unsafe { std::env::remove_var("TEST_CANVAX_BIND") };
    }

    #[test]
    fn test_env_var_missing() {
        let input = r#"{"key": "${NONEXISTENT_VAR_CANVAX_TEST}"}"#;
        let result = substitute_env_vars(input);
        assert!(result.contains(r#""""#));
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port(), 8080);
        assert_eq!(config.stream_port(), 8081);
        assert_eq!(config.bind_addr(), "0.0.0.0");
        assert_eq!(config.shutdown_grace(), Duration::from_secs(10));

        let session = config.session();
        assert_eq!(session.history_limit, 1000);
        assert_eq!(session.feed_capacity, 100);
        assert_eq!(session.idle_timeout_secs, 600);
        assert_eq!(session.reap_interval_secs, 60);
        assert_eq!(session.code_length, 6);
        assert_eq!(session.client_id_length, 8);
    }

    #[test]
    fn test_partial_session_section() {
        let config: Config = json5::from_str(
            r#"{
                // trailing comments are fine in JSON5
                session: { history_limit: 50 },
            }"#,
        )
        .unwrap();
        let session = config.session();
        assert_eq!(session.history_limit, 50);
        assert_eq!(session.feed_capacity, 100);
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.json")).unwrap();
        assert!(config.server.is_none());
        assert_eq!(config.port(), 8080);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ server: { port: 9000, stream_port: 9001, bind: "127.0.0.1" } }"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.port(), 9000);
        assert_eq!(config.stream_port(), 9001);
        assert_eq!(config.bind_addr(), "127.0.0.1");
    }

    #[test]
    fn test_load_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ server: ").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, crate::error::CanvaxError::Config(_)));
    }

    #[test]
    fn test_logging_config_defaults() {
        let config: Config = json5::from_str(r#"{ "logging": {} }"#).unwrap();
        let logging = config.logging.expect("logging should be present");
        assert_eq!(logging.format, "plain");
        assert!(logging.level.is_none());
        assert_eq!(logging.output, "stderr");
        assert!(logging.filters.is_empty());
    }

    #[test]
    fn test_validate_same_ports_errors() {
        let config = Config {
            server: Some(ServerConfig {
                port: 9000,
                stream_port: 9000,
                ..ServerConfig::default()
            }),
            ..Config::default()
        };
        let (_warnings, errors) = config.validate();
        assert!(
            errors.iter().any(|e| e.contains("must differ")),
            "Expected a port clash error, got: {errors:?}"
        );
    }

    #[test]
    fn test_validate_short_codes_warn() {
        let config = Config {
            session: Some(SessionConfig {
                code_length: 2,
                ..SessionConfig::default()
            }),
            ..Config::default()
        };
        let (warnings, errors) = config.validate();
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        assert!(warnings.iter().any(|w| w.contains("collisions")));
    }

    #[test]
    fn test_validate_default_is_clean() {
        let (warnings, errors) = Config::default().validate();
        assert!(warnings.is_empty());
        assert!(errors.is_empty());
    }
}
