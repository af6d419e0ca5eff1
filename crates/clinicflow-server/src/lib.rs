//!
//! Clinicflow Server - HTTP application server for the Clinicflow Platform
//!
//! This module exports all the components of the Clinicflow Server.

/// API module
pub mod api;

/// Configuration module
pub mod config;

/// Error module
pub mod error;

/// Server module
pub mod server;

// Re-export key types
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::ClinicflowServer;

/// Run function
pub async fn run(config: ServerConfig) -> ServerResult<()> {
    init_logging(&config);

    let server = ClinicflowServer::new_in_memory(config);
    server.run().await
}

/// Initialize logging
fn init_logging(config: &ServerConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    fmt().with_env_filter(filter).with_target(true).init();
}
