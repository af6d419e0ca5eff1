//! Standardized error responses for the API

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use clinicflow_core::EngineError;

use crate::error::ServerError;

/// API error type for returning standard error responses
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),
    /// Wrapped engine error, mapped by variant
    Engine(EngineError),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::Engine(err)
    }
}

impl From<ServerError> for ApiError {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Engine(inner) => ApiError::Engine(inner),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_code, message) = match &self {
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "ERR_BAD_REQUEST", msg.clone())
            }
            ApiError::Engine(err) => {
                let (status, code) = match err {
                    EngineError::DefinitionNotFound(_) => {
                        (StatusCode::NOT_FOUND, "ERR_DEFINITION_NOT_FOUND")
                    }
                    EngineError::InstanceNotFound(_) => {
                        (StatusCode::NOT_FOUND, "ERR_INSTANCE_NOT_FOUND")
                    }
                    EngineError::TaskNotFound(_) => (StatusCode::NOT_FOUND, "ERR_TASK_NOT_FOUND"),
                    EngineError::RuleNotFound(_) => (StatusCode::NOT_FOUND, "ERR_RULE_NOT_FOUND"),
                    EngineError::Validation(_) => (StatusCode::BAD_REQUEST, "ERR_VALIDATION"),
                    EngineError::Bpmn(_) => (StatusCode::BAD_REQUEST, "ERR_BPMN"),
                    EngineError::Serialization(_) => {
                        (StatusCode::BAD_REQUEST, "ERR_SERIALIZATION")
                    }
                    EngineError::Conflict(_) => (StatusCode::CONFLICT, "ERR_CONFLICT"),
                    EngineError::Expression(_) => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "ERR_EXPRESSION")
                    }
                    EngineError::Fault(_) | EngineError::StateStore(_) | EngineError::Io(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "ERR_INTERNAL")
                    }
                };
                (status, code, err.to_string())
            }
        };

        let body = Json(json!({
            "error": message,
            "errorDetails": {
                "errorCode": error_code,
                "errorMessage": message,
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_of(EngineError::TaskNotFound("t".to_string()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(EngineError::Conflict("c".to_string()).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(EngineError::Validation("v".to_string()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(EngineError::Expression("e".to_string()).into()),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(EngineError::StateStore("s".to_string()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(ApiError::BadRequest("b".to_string())),
            StatusCode::BAD_REQUEST
        );
    }
}
