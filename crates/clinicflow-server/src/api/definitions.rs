//! Process definition endpoints

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use clinicflow_core::{DefinitionId, ProcessDefinition, ProcessGraph};

use super::errors::ApiError;
use super::{Page, PageParams};
use crate::server::ClinicflowServer;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDefinitionRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub graph: ProcessGraph,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGraphRequest {
    pub graph: ProcessGraph,
}

pub async fn create_definition_handler(
    State(server): State<Arc<ClinicflowServer>>,
    Json(request): Json<CreateDefinitionRequest>,
) -> Result<(StatusCode, Json<ProcessDefinition>), ApiError> {
    if request.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Definition name must not be empty".to_string()));
    }
    let definition = server
        .definitions
        .create_definition(request.name, request.description, request.graph)
        .await?;
    Ok((StatusCode::CREATED, Json(definition)))
}

pub async fn list_definitions_handler(
    State(server): State<Arc<ClinicflowServer>>,
    Query(params): Query<PageParams>,
) -> Result<Json<Page<ProcessDefinition>>, ApiError> {
    let definitions = server.definitions.list_definitions().await?;
    Ok(Json(params.paginate(definitions)))
}

pub async fn get_definition_handler(
    State(server): State<Arc<ClinicflowServer>>,
    Path(definition_id): Path<String>,
) -> Result<Json<ProcessDefinition>, ApiError> {
    let definition = server
        .definitions
        .get_definition(&DefinitionId(definition_id))
        .await?;
    Ok(Json(definition))
}

pub async fn update_graph_handler(
    State(server): State<Arc<ClinicflowServer>>,
    Path(definition_id): Path<String>,
    Json(request): Json<UpdateGraphRequest>,
) -> Result<Json<ProcessDefinition>, ApiError> {
    let definition = server
        .definitions
        .update_graph(&DefinitionId(definition_id), request.graph)
        .await?;
    Ok(Json(definition))
}

pub async fn validate_definition_handler(
    State(server): State<Arc<ClinicflowServer>>,
    Path(definition_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let violations = server
        .definitions
        .validate_definition(&DefinitionId(definition_id))
        .await?;
    Ok(Json(json!({
        "valid": violations.is_empty(),
        "violations": violations,
    })))
}

pub async fn activate_definition_handler(
    State(server): State<Arc<ClinicflowServer>>,
    Path(definition_id): Path<String>,
) -> Result<Json<ProcessDefinition>, ApiError> {
    let definition = server
        .definitions
        .activate(&DefinitionId(definition_id))
        .await?;
    Ok(Json(definition))
}

pub async fn deactivate_definition_handler(
    State(server): State<Arc<ClinicflowServer>>,
    Path(definition_id): Path<String>,
) -> Result<Json<ProcessDefinition>, ApiError> {
    let definition = server
        .definitions
        .deactivate(&DefinitionId(definition_id))
        .await?;
    Ok(Json(definition))
}

pub async fn delete_definition_handler(
    State(server): State<Arc<ClinicflowServer>>,
    Path(definition_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    server
        .definitions
        .delete_definition(&DefinitionId(definition_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn import_bpmn_handler(
    State(server): State<Arc<ClinicflowServer>>,
    body: String,
) -> Result<(StatusCode, Json<ProcessDefinition>), ApiError> {
    let definition = server.definitions.import_bpmn(&body).await?;
    Ok((StatusCode::CREATED, Json(definition)))
}

pub async fn export_bpmn_handler(
    State(server): State<Arc<ClinicflowServer>>,
    Path(definition_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let xml = server
        .definitions
        .export_bpmn(&DefinitionId(definition_id))
        .await?;
    Ok(([(header::CONTENT_TYPE, "application/xml")], xml))
}
