//! Clinicflow Core
//!
//! The workflow orchestration engine behind the Clinicflow platform:
//! versioned process definitions, a token-based instance engine, human task
//! management, rule evaluation, and an append-only history log that can
//! replay any instance.
//!
//! The crate is transport-agnostic. `clinicflow-server` exposes it over
//! HTTP; other frontends only need the repository traits and the services
//! in [`application`].

pub mod application;
pub mod bpmn;
pub mod domain;
pub mod error;
pub mod types;

pub use application::definition_service::DefinitionService;
pub use application::engine::ProcessEngine;
pub use application::replay::{replay, ExecutionState};
pub use application::rules::{JmespathRuleEvaluator, RuleEvaluator, RuleService};
pub use application::task_service::TaskService;
pub use domain::definition::{DefinitionId, DefinitionStatus, ProcessDefinition};
pub use domain::events::{HistoryEvent, HistoryEventKind};
pub use domain::graph::{
    AssigneeRule, Edge, EdgeId, Node, NodeId, NodeKind, ProcessGraph, Violation,
};
pub use domain::instance::{FaultInfo, InstanceId, InstanceStatus, ProcessInstance};
pub use domain::rule::{BusinessRule, RuleId};
pub use domain::task::{HumanTask, TaskId, TaskStatus};
pub use error::EngineError;
pub use types::Variables;
