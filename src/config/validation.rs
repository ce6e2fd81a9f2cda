//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (pool hints and body cap > 0, address shape)
//! - Check TLS settings are complete
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use hyper::header::HeaderValue;
use thiserror::Error;

use crate::config::schema::ServerConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !is_bind_address(&config.listener.bind_address) {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("{:?} is not a host:port address", config.listener.bind_address),
        ));
    }

    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.is_empty() {
            errors.push(ValidationError::new("listener.tls.cert_path", "must not be empty"));
        }
        if tls.key_path.is_empty() {
            errors.push(ValidationError::new("listener.tls.key_path", "must not be empty"));
        }
    }

    if config.listener.max_header_bytes == Some(0) {
        errors.push(ValidationError::new("listener.max_header_bytes", "must be positive"));
    }

    if let Some(content_type) = config.http.default_content_type() {
        if HeaderValue::from_str(content_type).is_err() {
            errors.push(ValidationError::new(
                "http.content_type",
                format!("{content_type:?} is not a valid header value"),
            ));
        }
    }

    if config.http.max_body_bytes == 0 {
        errors.push(ValidationError::new("http.max_body_bytes", "must be positive"));
    }

    if config.pooling.path_var_count == 0 {
        errors.push(ValidationError::new("pooling.path_var_count", "must be positive"));
    }

    if config.pooling.filter_count == 0 {
        errors.push(ValidationError::new("pooling.filter_count", "must be positive"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// A socket address, or a `host:port` pair left for the resolver.
fn is_bind_address(address: &str) -> bool {
    if address.parse::<SocketAddr>().is_ok() {
        return true;
    }
    match address.rsplit_once(':') {
        Some((host, port)) => {
            !host.is_empty() && !host.contains(':') && port.parse::<u16>().is_ok()
        }
        None => false,
    }
}
