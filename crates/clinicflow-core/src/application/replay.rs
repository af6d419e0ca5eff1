//! History replay
//!
//! The history log is the authoritative record: folding an instance's
//! events in sequence order rebuilds its execution state without touching
//! the process graph. Used for audit checks against the stored snapshot.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;

use crate::domain::events::{HistoryEvent, HistoryEventKind};
use crate::domain::graph::NodeId;
use crate::domain::instance::{FaultInfo, InstanceStatus, ProcessInstance};
use crate::error::EngineError;
use crate::types::Variables;

/// The replayable core of an instance: everything execution depends on
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionState {
    pub status: InstanceStatus,
    pub variables: Variables,
    pub tokens: BTreeSet<NodeId>,
    pub pending_joins: HashMap<NodeId, HashSet<crate::domain::graph::EdgeId>>,
    pub fault: Option<FaultInfo>,
}

impl ExecutionState {
    /// Project the replayable state out of a live instance
    pub fn of(instance: &ProcessInstance) -> Self {
        Self {
            status: instance.status,
            variables: instance.variables.clone(),
            tokens: instance.tokens.clone(),
            pending_joins: instance.pending_joins.clone(),
            fault: instance.fault.clone(),
        }
    }
}

/// Fold a history log back into execution state
///
/// The log must start with `InstanceStarted` and have contiguous sequence
/// numbers; anything else means the log was tampered with or truncated.
pub fn replay(events: &[HistoryEvent]) -> Result<ExecutionState, EngineError> {
    let first = events
        .first()
        .ok_or_else(|| EngineError::StateStore("Cannot replay an empty log".to_string()))?;

    let (mut variables, mut tokens) = match &first.kind {
        HistoryEventKind::InstanceStarted {
            variables,
            start_node,
            ..
        } => {
            let mut tokens = BTreeSet::new();
            tokens.insert(start_node.clone());
            (variables.clone(), tokens)
        }
        other => {
            return Err(EngineError::StateStore(format!(
                "Log must start with instanceStarted, found {}",
                other.name()
            )))
        }
    };

    let mut status = InstanceStatus::Running;
    let mut pending_joins: HashMap<NodeId, HashSet<crate::domain::graph::EdgeId>> = HashMap::new();
    let mut fault: Option<FaultInfo> = None;

    for (i, event) in events.iter().enumerate() {
        if event.sequence != i as u64 {
            return Err(EngineError::StateStore(format!(
                "Log sequence gap: expected {}, found {}",
                i, event.sequence
            )));
        }
        if i == 0 {
            continue;
        }

        match &event.kind {
            HistoryEventKind::InstanceStarted { .. } => {
                return Err(EngineError::StateStore(
                    "Duplicate instanceStarted in log".to_string(),
                ))
            }
            HistoryEventKind::TokenMoved { from, to, .. } => {
                tokens.remove(from);
                tokens.insert(to.clone());
            }
            HistoryEventKind::TokenConsumed { node } => {
                tokens.remove(node);
            }
            HistoryEventKind::JoinArrived { join, edge, from } => {
                tokens.remove(from);
                pending_joins
                    .entry(join.clone())
                    .or_default()
                    .insert(edge.clone());
            }
            HistoryEventKind::JoinMerged { join } => {
                pending_joins.remove(join);
                tokens.insert(join.clone());
            }
            HistoryEventKind::TaskCompleted { output, .. } => {
                variables.merge(output);
            }
            // Ownership changes do not alter execution state
            HistoryEventKind::TaskCreated { .. }
            | HistoryEventKind::TaskClaimed { .. }
            | HistoryEventKind::TaskReleased { .. }
            | HistoryEventKind::TaskDelegated { .. }
            | HistoryEventKind::TaskCancelled { .. }
            | HistoryEventKind::TaskEscalated { .. } => {}
            HistoryEventKind::InstanceSuspended => status = InstanceStatus::Suspended,
            HistoryEventKind::InstanceResumed => status = InstanceStatus::Running,
            HistoryEventKind::InstanceTerminated { .. } => status = InstanceStatus::Terminated,
            HistoryEventKind::InstanceFaulted { node, error } => {
                status = InstanceStatus::Faulted;
                fault = Some(FaultInfo {
                    node: node.clone(),
                    error: error.clone(),
                });
            }
            HistoryEventKind::InstanceRetried => {
                status = InstanceStatus::Running;
                fault = None;
            }
            HistoryEventKind::InstanceCompleted => status = InstanceStatus::Completed,
        }
    }

    // A snapshot at rest is never mid-advance
    if status == InstanceStatus::Running {
        status = InstanceStatus::Waiting;
    }

    Ok(ExecutionState {
        status,
        variables,
        tokens,
        pending_joins,
        fault,
    })
}
