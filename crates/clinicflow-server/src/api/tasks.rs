//! Human task endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

use clinicflow_core::domain::repository::TaskFilter;
use clinicflow_core::{HumanTask, InstanceId, TaskId, TaskStatus};

use super::errors::ApiError;
use super::instances::parse_variables;
use super::{Page, PageParams};
use crate::server::ClinicflowServer;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskListQuery {
    #[serde(default = "super::default_page")]
    pub page: usize,
    #[serde(default = "super::default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub claimed_by: Option<String>,
    #[serde(default)]
    pub candidate_group: Option<String>,
    #[serde(default)]
    pub min_priority: Option<i32>,
    #[serde(default)]
    pub due_before: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimTaskRequest {
    pub user: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseTaskRequest {
    pub user: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegateTaskRequest {
    pub from_user: String,
    pub to_user: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteTaskRequest {
    pub user: String,
    #[serde(default)]
    pub variables: serde_json::Value,
}

pub async fn list_tasks_handler(
    State(server): State<Arc<ClinicflowServer>>,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<Page<HumanTask>>, ApiError> {
    let filter = TaskFilter {
        instance_id: query.instance_id.map(InstanceId),
        status: query.status,
        claimed_by: query.claimed_by,
        candidate_group: query.candidate_group,
        min_priority: query.min_priority,
        due_before: query.due_before,
    };
    let tasks = server.tasks.list_tasks(&filter).await?;
    let params = PageParams {
        page: query.page,
        page_size: query.page_size,
    };
    Ok(Json(params.paginate(tasks)))
}

pub async fn get_task_handler(
    State(server): State<Arc<ClinicflowServer>>,
    Path(task_id): Path<String>,
) -> Result<Json<HumanTask>, ApiError> {
    let task = server.tasks.get_task(&TaskId(task_id)).await?;
    Ok(Json(task))
}

pub async fn claim_task_handler(
    State(server): State<Arc<ClinicflowServer>>,
    Path(task_id): Path<String>,
    Json(request): Json<ClaimTaskRequest>,
) -> Result<Json<HumanTask>, ApiError> {
    let task = server.tasks.claim(&TaskId(task_id), &request.user).await?;
    Ok(Json(task))
}

pub async fn release_task_handler(
    State(server): State<Arc<ClinicflowServer>>,
    Path(task_id): Path<String>,
    Json(request): Json<ReleaseTaskRequest>,
) -> Result<Json<HumanTask>, ApiError> {
    let task = server
        .tasks
        .release(&TaskId(task_id), &request.user)
        .await?;
    Ok(Json(task))
}

pub async fn delegate_task_handler(
    State(server): State<Arc<ClinicflowServer>>,
    Path(task_id): Path<String>,
    Json(request): Json<DelegateTaskRequest>,
) -> Result<Json<HumanTask>, ApiError> {
    let task = server
        .tasks
        .delegate(&TaskId(task_id), &request.from_user, &request.to_user)
        .await?;
    Ok(Json(task))
}

pub async fn complete_task_handler(
    State(server): State<Arc<ClinicflowServer>>,
    Path(task_id): Path<String>,
    Json(request): Json<CompleteTaskRequest>,
) -> Result<Json<HumanTask>, ApiError> {
    let variables = parse_variables(request.variables)?;
    let task = server
        .engine
        .complete_task(&TaskId(task_id), &request.user, variables)
        .await?;
    Ok(Json(task))
}

pub async fn cancel_task_handler(
    State(server): State<Arc<ClinicflowServer>>,
    Path(task_id): Path<String>,
) -> Result<Json<HumanTask>, ApiError> {
    let task = server.tasks.cancel(&TaskId(task_id)).await?;
    Ok(Json(task))
}
