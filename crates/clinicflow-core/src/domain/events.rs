use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::definition::DefinitionId;
use crate::domain::graph::{EdgeId, NodeId};
use crate::domain::instance::InstanceId;
use crate::domain::task::{HumanTask, TaskId};
use crate::types::Variables;

/// One entry in an instance's append-only history log
///
/// Sequence numbers are assigned by the log, contiguous from 0 per
/// instance. Entries are never updated or deleted; replaying the kinds in
/// order rebuilds the instance's execution state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEvent {
    /// Instance the entry belongs to
    pub instance_id: InstanceId,

    /// Position in the instance's log, starting at 0
    pub sequence: u64,

    /// Timestamp when the entry was appended
    pub timestamp: DateTime<Utc>,

    /// What happened
    #[serde(flatten)]
    pub kind: HistoryEventKind,
}

/// Every state change an instance can record
///
/// Each variant carries the full delta it applies, so replay never needs
/// the process graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HistoryEventKind {
    /// Instance created with its initial token on the start node
    #[serde(rename_all = "camelCase")]
    InstanceStarted {
        definition_id: DefinitionId,
        definition_version: u32,
        start_node: NodeId,
        variables: Variables,
    },

    /// A token traversed an edge
    #[serde(rename_all = "camelCase")]
    TokenMoved {
        from: NodeId,
        to: NodeId,
        edge: EdgeId,
    },

    /// A token was consumed at an end node
    #[serde(rename_all = "camelCase")]
    TokenConsumed { node: NodeId },

    /// A token arrived at a parallel join and is held there
    #[serde(rename_all = "camelCase")]
    JoinArrived {
        join: NodeId,
        edge: EdgeId,
        from: NodeId,
    },

    /// All incoming branches arrived; merged into one token on the join
    #[serde(rename_all = "camelCase")]
    JoinMerged { join: NodeId },

    /// A human task was created for a parked token
    #[serde(rename_all = "camelCase")]
    TaskCreated { task: HumanTask },

    /// A user took ownership of a task
    #[serde(rename_all = "camelCase")]
    TaskClaimed { task_id: TaskId, user: String },

    /// The owner returned a task to the open pool
    #[serde(rename_all = "camelCase")]
    TaskReleased { task_id: TaskId, user: String },

    /// The owner handed a task to another user
    #[serde(rename_all = "camelCase")]
    TaskDelegated {
        task_id: TaskId,
        from_user: String,
        to_user: String,
    },

    /// A task was completed with output variables
    #[serde(rename_all = "camelCase")]
    TaskCompleted {
        task_id: TaskId,
        user: String,
        output: Variables,
    },

    /// A task was withdrawn
    #[serde(rename_all = "camelCase")]
    TaskCancelled { task_id: TaskId },

    /// The overdue sweep flagged a task past its deadline
    #[serde(rename_all = "camelCase")]
    TaskEscalated { task_id: TaskId },

    /// Operator paused the instance
    InstanceSuspended,

    /// Operator resumed the instance
    InstanceResumed,

    /// Operator killed the instance
    #[serde(rename_all = "camelCase")]
    InstanceTerminated { reason: Option<String> },

    /// Advancing hit an unrecoverable condition
    #[serde(rename_all = "camelCase")]
    InstanceFaulted {
        node: Option<NodeId>,
        error: String,
    },

    /// Operator cleared a fault for another attempt
    InstanceRetried,

    /// The last token was consumed
    InstanceCompleted,
}

impl HistoryEventKind {
    /// Stable name used in logs and API payloads
    pub fn name(&self) -> &'static str {
        match self {
            HistoryEventKind::InstanceStarted { .. } => "instanceStarted",
            HistoryEventKind::TokenMoved { .. } => "tokenMoved",
            HistoryEventKind::TokenConsumed { .. } => "tokenConsumed",
            HistoryEventKind::JoinArrived { .. } => "joinArrived",
            HistoryEventKind::JoinMerged { .. } => "joinMerged",
            HistoryEventKind::TaskCreated { .. } => "taskCreated",
            HistoryEventKind::TaskClaimed { .. } => "taskClaimed",
            HistoryEventKind::TaskReleased { .. } => "taskReleased",
            HistoryEventKind::TaskDelegated { .. } => "taskDelegated",
            HistoryEventKind::TaskCompleted { .. } => "taskCompleted",
            HistoryEventKind::TaskCancelled { .. } => "taskCancelled",
            HistoryEventKind::TaskEscalated { .. } => "taskEscalated",
            HistoryEventKind::InstanceSuspended => "instanceSuspended",
            HistoryEventKind::InstanceResumed => "instanceResumed",
            HistoryEventKind::InstanceTerminated { .. } => "instanceTerminated",
            HistoryEventKind::InstanceFaulted { .. } => "instanceFaulted",
            HistoryEventKind::InstanceRetried => "instanceRetried",
            HistoryEventKind::InstanceCompleted => "instanceCompleted",
        }
    }
}
