//! Process instance endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use clinicflow_core::domain::repository::InstanceFilter;
use clinicflow_core::{
    DefinitionId, HistoryEvent, InstanceId, InstanceStatus, ProcessInstance, Variables,
};

use super::errors::ApiError;
use super::{Page, PageParams};
use crate::server::ClinicflowServer;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartInstanceRequest {
    pub definition_id: String,
    #[serde(default)]
    pub variables: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminateInstanceRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceListQuery {
    #[serde(default = "super::default_page")]
    pub page: usize,
    #[serde(default = "super::default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub definition_id: Option<String>,
    #[serde(default)]
    pub status: Option<InstanceStatus>,
}

/// Variables arrive as a JSON object; anything else is a 400
pub(super) fn parse_variables(value: serde_json::Value) -> Result<Variables, ApiError> {
    Variables::from_value(value)
        .ok_or_else(|| ApiError::BadRequest("variables must be a JSON object".to_string()))
}

pub async fn start_instance_handler(
    State(server): State<Arc<ClinicflowServer>>,
    Json(request): Json<StartInstanceRequest>,
) -> Result<(StatusCode, Json<ProcessInstance>), ApiError> {
    let variables = parse_variables(request.variables)?;
    let instance = server
        .engine
        .start_instance(&DefinitionId(request.definition_id), variables)
        .await?;
    Ok((StatusCode::CREATED, Json(instance)))
}

pub async fn list_instances_handler(
    State(server): State<Arc<ClinicflowServer>>,
    Query(query): Query<InstanceListQuery>,
) -> Result<Json<Page<ProcessInstance>>, ApiError> {
    let filter = InstanceFilter {
        definition_id: query.definition_id.map(DefinitionId),
        status: query.status,
    };
    let instances = server.engine.list_instances(&filter).await?;
    let params = PageParams {
        page: query.page,
        page_size: query.page_size,
    };
    Ok(Json(params.paginate(instances)))
}

pub async fn get_instance_handler(
    State(server): State<Arc<ClinicflowServer>>,
    Path(instance_id): Path<String>,
) -> Result<Json<ProcessInstance>, ApiError> {
    let instance = server.engine.get_instance(&InstanceId(instance_id)).await?;
    Ok(Json(instance))
}

pub async fn suspend_instance_handler(
    State(server): State<Arc<ClinicflowServer>>,
    Path(instance_id): Path<String>,
) -> Result<Json<ProcessInstance>, ApiError> {
    let instance = server
        .engine
        .suspend_instance(&InstanceId(instance_id))
        .await?;
    Ok(Json(instance))
}

pub async fn resume_instance_handler(
    State(server): State<Arc<ClinicflowServer>>,
    Path(instance_id): Path<String>,
) -> Result<Json<ProcessInstance>, ApiError> {
    let instance = server
        .engine
        .resume_instance(&InstanceId(instance_id))
        .await?;
    Ok(Json(instance))
}

pub async fn terminate_instance_handler(
    State(server): State<Arc<ClinicflowServer>>,
    Path(instance_id): Path<String>,
    body: Option<Json<TerminateInstanceRequest>>,
) -> Result<Json<ProcessInstance>, ApiError> {
    let reason = body.and_then(|Json(r)| r.reason);
    let instance = server
        .engine
        .terminate_instance(&InstanceId(instance_id), reason)
        .await?;
    Ok(Json(instance))
}

pub async fn retry_instance_handler(
    State(server): State<Arc<ClinicflowServer>>,
    Path(instance_id): Path<String>,
) -> Result<Json<ProcessInstance>, ApiError> {
    let instance = server
        .engine
        .retry_instance(&InstanceId(instance_id))
        .await?;
    Ok(Json(instance))
}

pub async fn instance_history_handler(
    State(server): State<Arc<ClinicflowServer>>,
    Path(instance_id): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<Json<Page<HistoryEvent>>, ApiError> {
    let events = server
        .engine
        .instance_history(&InstanceId(instance_id))
        .await?;
    Ok(Json(params.paginate(events)))
}
