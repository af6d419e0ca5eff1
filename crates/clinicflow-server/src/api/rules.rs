//! Business rule endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use clinicflow_core::{BusinessRule, RuleId};

use super::errors::ApiError;
use super::instances::parse_variables;
use super::{Page, PageParams};
use crate::server::ClinicflowServer;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRuleRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub expression: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRuleRequest {
    pub expression: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateRuleRequest {
    #[serde(default)]
    pub variables: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateExpressionRequest {
    pub expression: String,
    #[serde(default)]
    pub variables: serde_json::Value,
}

pub async fn create_rule_handler(
    State(server): State<Arc<ClinicflowServer>>,
    Json(request): Json<CreateRuleRequest>,
) -> Result<(StatusCode, Json<BusinessRule>), ApiError> {
    if request.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Rule name must not be empty".to_string()));
    }
    let rule = server
        .rules
        .create_rule(request.name, request.description, request.expression)
        .await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

pub async fn list_rules_handler(
    State(server): State<Arc<ClinicflowServer>>,
    Query(params): Query<PageParams>,
) -> Result<Json<Page<BusinessRule>>, ApiError> {
    let rules = server.rules.list_rules().await?;
    Ok(Json(params.paginate(rules)))
}

pub async fn get_rule_handler(
    State(server): State<Arc<ClinicflowServer>>,
    Path(rule_id): Path<String>,
) -> Result<Json<BusinessRule>, ApiError> {
    let rule = server.rules.get_rule(&RuleId(rule_id)).await?;
    Ok(Json(rule))
}

pub async fn update_rule_handler(
    State(server): State<Arc<ClinicflowServer>>,
    Path(rule_id): Path<String>,
    Json(request): Json<UpdateRuleRequest>,
) -> Result<Json<BusinessRule>, ApiError> {
    let rule = server
        .rules
        .update_expression(&RuleId(rule_id), request.expression)
        .await?;
    Ok(Json(rule))
}

pub async fn delete_rule_handler(
    State(server): State<Arc<ClinicflowServer>>,
    Path(rule_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    server.rules.delete_rule(&RuleId(rule_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn evaluate_rule_handler(
    State(server): State<Arc<ClinicflowServer>>,
    Path(rule_id): Path<String>,
    Json(request): Json<EvaluateRuleRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let variables = parse_variables(request.variables)?;
    let result = server.rules.test_rule(&RuleId(rule_id), &variables).await?;
    Ok(Json(json!({ "result": result })))
}

pub async fn evaluate_expression_handler(
    State(server): State<Arc<ClinicflowServer>>,
    Json(request): Json<EvaluateExpressionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let variables = parse_variables(request.variables)?;
    let result = server
        .rules
        .evaluate_adhoc(&request.expression, &variables)?;
    Ok(Json(json!({ "result": result })))
}
