//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Content type value that disables the automatic response content type.
pub const CONTENT_TYPE_DISABLED: &str = "-";

/// Default response content type.
pub const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";

/// Default cap on a buffered request body (4 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, TLS, keep-alive).
    pub listener: ListenerConfig,

    /// Per-request HTTP behaviour.
    pub http: HttpConfig,

    /// Capacity hints for per-request pools.
    pub pooling: PoolingConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address: a socket address ("0.0.0.0:4000") or a resolvable
    /// `host:port` ("localhost:4000").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// TCP keep-alive period in seconds (0 disables).
    pub keep_alive_secs: u64,

    /// Maximum bytes buffered while reading request headers.
    pub max_header_bytes: Option<usize>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4000".to_string(),
            tls: None,
            keep_alive_secs: 180,
            max_header_bytes: None,
        }
    }
}

impl ListenerConfig {
    /// Keep-alive period, `None` when disabled.
    pub fn keep_alive(&self) -> Option<Duration> {
        (self.keep_alive_secs > 0).then(|| Duration::from_secs(self.keep_alive_secs))
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate chain file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,

    /// CA files used to verify client certificates. Non-empty enables mutual TLS.
    #[serde(default)]
    pub client_ca_paths: Vec<String>,
}

/// Per-request HTTP behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Content type set on responses that do not set one; "-" disables.
    pub content_type: String,

    /// Largest request body buffered for a handler; larger bodies get 413.
    pub max_body_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            content_type: CONTENT_TYPE_JSON.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl HttpConfig {
    /// Default content type, `None` when disabled.
    pub fn default_content_type(&self) -> Option<&str> {
        match self.content_type.as_str() {
            CONTENT_TYPE_DISABLED | "" => None,
            other => Some(other),
        }
    }
}

/// Capacity hints for the per-request pools.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolingConfig {
    /// Expected path variables per route.
    pub path_var_count: usize,

    /// Expected filters per route, global filters excluded.
    pub filter_count: usize,

    /// Idle objects retained per pool.
    pub max_idle: usize,
}

impl Default for PoolingConfig {
    fn default() -> Self {
        Self {
            path_var_count: 3,
            filter_count: 5,
            max_idle: 1024,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed to read request headers, in seconds (0 disables).
    pub read_secs: u64,

    /// Time allowed to produce a response, in seconds (0 disables).
    pub write_secs: u64,
}

impl TimeoutConfig {
    pub fn read(&self) -> Option<Duration> {
        (self.read_secs > 0).then(|| Duration::from_secs(self.read_secs))
    }

    pub fn write(&self) -> Option<Duration> {
        (self.write_secs > 0).then(|| Duration::from_secs(self.write_secs))
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log filter directive (trace, debug, info, warn, error or an EnvFilter string).
    pub level: String,

    /// Emit JSON lines instead of the human readable format.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ServerConfig::default();
        assert_eq!(config.listener.bind_address, "0.0.0.0:4000");
        assert_eq!(config.listener.keep_alive(), Some(Duration::from_secs(180)));
        assert_eq!(config.pooling.path_var_count, 3);
        assert_eq!(config.pooling.filter_count, 5);
        assert_eq!(config.http.default_content_type(), Some(CONTENT_TYPE_JSON));
        assert_eq!(config.http.max_body_bytes, 4 * 1024 * 1024);
        assert_eq!(config.timeouts.read(), None);
    }

    #[test]
    fn dash_disables_content_type() {
        let http = HttpConfig {
            content_type: "-".into(),
            ..Default::default()
        };
        assert_eq!(http.default_content_type(), None);
    }
}
