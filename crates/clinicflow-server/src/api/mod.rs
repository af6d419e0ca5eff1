//! API module for the Clinicflow Server
//!
//! Routes and handlers; every collection endpoint pages with `page` and
//! `pageSize` query parameters and answers `{ items, total }`.

use axum::{
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod definitions;
pub mod errors;
pub mod health;
pub mod instances;
pub mod rules;
pub mod tasks;

use crate::server::ClinicflowServer;

const MAX_PAGE_SIZE: usize = 200;

/// Build the router for API endpoints
pub fn build_router(server: Arc<ClinicflowServer>) -> Router {
    Router::new()
        // Definition management
        .route(
            "/v1/definitions",
            get(definitions::list_definitions_handler).post(definitions::create_definition_handler),
        )
        .route("/v1/definitions/import", post(definitions::import_bpmn_handler))
        .route(
            "/v1/definitions/:definition_id",
            get(definitions::get_definition_handler)
                .delete(definitions::delete_definition_handler),
        )
        .route(
            "/v1/definitions/:definition_id/graph",
            put(definitions::update_graph_handler),
        )
        .route(
            "/v1/definitions/:definition_id/validate",
            get(definitions::validate_definition_handler),
        )
        .route(
            "/v1/definitions/:definition_id/activate",
            post(definitions::activate_definition_handler),
        )
        .route(
            "/v1/definitions/:definition_id/deactivate",
            post(definitions::deactivate_definition_handler),
        )
        .route(
            "/v1/definitions/:definition_id/export",
            get(definitions::export_bpmn_handler),
        )
        // Instance management
        .route(
            "/v1/instances",
            get(instances::list_instances_handler).post(instances::start_instance_handler),
        )
        .route("/v1/instances/:instance_id", get(instances::get_instance_handler))
        .route(
            "/v1/instances/:instance_id/suspend",
            post(instances::suspend_instance_handler),
        )
        .route(
            "/v1/instances/:instance_id/resume",
            post(instances::resume_instance_handler),
        )
        .route(
            "/v1/instances/:instance_id/terminate",
            post(instances::terminate_instance_handler),
        )
        .route(
            "/v1/instances/:instance_id/retry",
            post(instances::retry_instance_handler),
        )
        .route(
            "/v1/instances/:instance_id/history",
            get(instances::instance_history_handler),
        )
        // Task management
        .route("/v1/tasks", get(tasks::list_tasks_handler))
        .route("/v1/tasks/:task_id", get(tasks::get_task_handler))
        .route("/v1/tasks/:task_id/claim", post(tasks::claim_task_handler))
        .route("/v1/tasks/:task_id/release", post(tasks::release_task_handler))
        .route("/v1/tasks/:task_id/delegate", post(tasks::delegate_task_handler))
        .route("/v1/tasks/:task_id/complete", post(tasks::complete_task_handler))
        .route("/v1/tasks/:task_id/cancel", post(tasks::cancel_task_handler))
        // Rule management
        .route(
            "/v1/rules",
            get(rules::list_rules_handler).post(rules::create_rule_handler),
        )
        .route("/v1/rules/evaluate", post(rules::evaluate_expression_handler))
        .route(
            "/v1/rules/:rule_id",
            get(rules::get_rule_handler)
                .put(rules::update_rule_handler)
                .delete(rules::delete_rule_handler),
        )
        .route(
            "/v1/rules/:rule_id/evaluate",
            post(rules::evaluate_rule_handler),
        )
        // Health check
        .route("/health", get(health::health_check))
        // Request tracing
        .layer(TraceLayer::new_for_http())
        // Shared state
        .with_state(server)
}

/// Query parameters for paged listings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageParams {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

pub(crate) fn default_page() -> usize {
    1
}

pub(crate) fn default_page_size() -> usize {
    20
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

/// A page of a larger result set
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl PageParams {
    /// Cut one page out of a full result set
    pub fn paginate<T>(&self, items: Vec<T>) -> Page<T> {
        let total = items.len();
        let page = self.page.max(1);
        let page_size = self.page_size.clamp(1, MAX_PAGE_SIZE);
        let start = (page - 1).saturating_mul(page_size);

        let items = if start >= total {
            Vec::new()
        } else {
            items
                .into_iter()
                .skip(start)
                .take(page_size)
                .collect()
        };

        Page { items, total }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginate_slices_and_counts() {
        let params = PageParams {
            page: 2,
            page_size: 3,
        };
        let page = params.paginate((1..=8).collect::<Vec<_>>());
        assert_eq!(page.items, vec![4, 5, 6]);
        assert_eq!(page.total, 8);
    }

    #[test]
    fn test_paginate_past_the_end() {
        let params = PageParams {
            page: 5,
            page_size: 10,
        };
        let page = params.paginate(vec![1, 2, 3]);
        assert!(page.items.is_empty());
        assert_eq!(page.total, 3);
    }

    #[test]
    fn test_paginate_clamps_degenerate_params() {
        let params = PageParams {
            page: 0,
            page_size: 0,
        };
        let page = params.paginate(vec![1, 2, 3]);
        assert_eq!(page.items, vec![1]);
        assert_eq!(page.total, 3);
    }
}
