//! # Core Error Types
//!
//! Centralized error definitions for the core-logic crate.
//! All errors implement `std::error::Error` and `std::fmt::Display`.

use thiserror::Error;

/// Unified error type for core-logic operations.
///
/// Wraps the configuration and network error families so the application
/// layer can match on one type.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Config(ConfigError),

    #[error(transparent)]
    Network(NetworkError),

    #[error("Unknown error: {message}")]
    Unknown { message: String },
}

impl From<ConfigError> for CoreError {
    fn from(e: ConfigError) -> Self {
        CoreError::Config(e)
    }
}

impl From<NetworkError> for CoreError {
    fn from(e: NetworkError) -> Self {
        CoreError::Network(e)
    }
}

/// Configuration-related errors
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("Invalid node URL format: '{url}'")]
    InvalidNodeUrl { url: String },

    #[error("Missing required configuration field: '{field}'")]
    MissingField { field: String },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Failed to parse {path}: {msg}")]
    Parse { path: String, msg: String },

    #[error("Failed to serialize configuration: {msg}")]
    Serialize { msg: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("I/O error on {path}: {msg}")]
    IoError { path: String, msg: String },
}

/// Network and node API errors.
///
/// These are never fatal during steady-state spamming: workers count and
/// log them, then start the next cycle.
#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    #[error("Request timeout after {timeout_ms}ms to {endpoint}")]
    Timeout { timeout_ms: u64, endpoint: String },

    #[error("Connection refused to {endpoint}: {reason}")]
    ConnectionRefused { endpoint: String, reason: String },

    #[error("HTTP error {status_code} from {endpoint}")]
    HttpError { status_code: u16, endpoint: String },

    #[error("Node {endpoint} rejected '{command}': {reason}")]
    NodeRejected {
        endpoint: String,
        command: String,
        reason: String,
    },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },
}

impl NetworkError {
    /// Endpoint the failing request was sent to.
    pub fn endpoint(&self) -> &str {
        match self {
            NetworkError::Timeout { endpoint, .. }
            | NetworkError::ConnectionRefused { endpoint, .. }
            | NetworkError::HttpError { endpoint, .. }
            | NetworkError::NodeRejected { endpoint, .. }
            | NetworkError::InvalidResponse { endpoint, .. } => endpoint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_error_endpoint() {
        let err = NetworkError::NodeRejected {
            endpoint: "http://localhost:14265".to_string(),
            command: "attachToTangle".to_string(),
            reason: "invalid trytes".to_string(),
        };
        assert_eq!(err.endpoint(), "http://localhost:14265");
        assert!(err.to_string().contains("attachToTangle"));
    }

    #[test]
    fn test_core_error_is_transparent() {
        let err: CoreError = ConfigError::MissingField {
            field: "seed".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Missing required configuration field: 'seed'"
        );
    }
}
