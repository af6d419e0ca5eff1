//! Configuration for the Clinicflow Server
//!
//! Loaded from environment variables with sensible defaults; invalid values
//! fall back with a warning rather than aborting startup.

use serde::{Deserialize, Serialize};
use std::env;
use tracing::warn;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host to bind to
    #[serde(default = "default_host")]
    pub bind_address: String,

    /// Log level used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Seconds between overdue-task sweeps; 0 disables the sweeper
    #[serde(default = "default_sweep_interval")]
    pub task_sweep_interval_seconds: u64,
}

fn default_port() -> u16 {
    8080
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_sweep_interval() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_host(),
            log_level: default_log_level(),
            task_sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Ok(port) = env::var("SERVER_PORT") {
            match port.parse::<u16>() {
                Ok(port) => config.port = port,
                Err(_) => warn!("Invalid SERVER_PORT value: {}", port),
            }
        }

        if let Ok(host) = env::var("SERVER_HOST") {
            config.bind_address = host;
        }

        if let Ok(level) = env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        if let Ok(interval) = env::var("TASK_SWEEP_INTERVAL_SECONDS") {
            match interval.parse::<u64>() {
                Ok(seconds) => config.task_sweep_interval_seconds = seconds,
                Err(_) => warn!("Invalid TASK_SWEEP_INTERVAL_SECONDS value: {}", interval),
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.task_sweep_interval_seconds, 30);
    }
}
