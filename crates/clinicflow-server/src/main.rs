use anyhow::{Context, Result};
use clinicflow_server::config::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration from environment variables
    let config = ServerConfig::load();

    // Run the server using the library's run function
    clinicflow_server::run(config).await.context("Server error")?;

    Ok(())
}
