//! Error handling for the Clinicflow Server

use clinicflow_core::EngineError;
use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error surfaced by the engine
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// I/O error while binding or serving
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_passes_through() {
        let err: ServerError = EngineError::Conflict("busy".to_string()).into();
        assert_eq!(err.to_string(), "Conflict: busy");
    }

    #[test]
    fn test_config_error_display() {
        let err = ServerError::Config("SERVER_PORT is not a number".to_string());
        assert!(err.to_string().starts_with("Configuration error"));
    }
}
