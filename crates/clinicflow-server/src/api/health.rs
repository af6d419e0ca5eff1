//! Health check endpoint for the Clinicflow Server

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::server::ClinicflowServer;

/// Health check handler
///
/// The state store is in-process, so a reachable server is a healthy one.
pub async fn health_check(State(_server): State<Arc<ClinicflowServer>>) -> impl IntoResponse {
    debug!("Health check requested");
    Json(json!({
        "status": "UP",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
