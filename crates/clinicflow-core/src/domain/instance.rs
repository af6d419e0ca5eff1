use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use uuid::Uuid;

use crate::domain::definition::{DefinitionId, ProcessDefinition};
use crate::domain::events::HistoryEventKind;
use crate::domain::graph::{EdgeId, NodeId};
use crate::error::EngineError;
use crate::types::Variables;

/// Value object: Instance ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub String);

impl InstanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

/// Status of a process instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InstanceStatus {
    /// Tokens are being advanced
    Running,
    /// All tokens are parked at human tasks or joins
    Waiting,
    /// Paused by an operator; no token movement, no task completion
    Suspended,
    /// All tokens consumed at end nodes
    Completed,
    /// Killed by an operator; final
    Terminated,
    /// Advance hit an unrecoverable condition; retryable
    Faulted,
}

impl InstanceStatus {
    /// Completed and Terminated are final; Faulted can be retried
    pub fn is_terminal(&self) -> bool {
        matches!(self, InstanceStatus::Completed | InstanceStatus::Terminated)
    }
}

/// What went wrong when an instance faulted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaultInfo {
    /// Node the faulting token was at, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeId>,
    /// Error description
    pub error: String,
}

/// Aggregate: one run of a process definition version
///
/// Execution state is a set of tokens positioned on nodes plus per-join
/// arrival bookkeeping. Every mutation records a history event; the engine
/// drains them with `take_events` and appends to the history log before
/// persisting, so the log can always rebuild this struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInstance {
    /// ID of the instance
    pub id: InstanceId,

    /// Definition version this instance is pinned to
    pub definition_id: DefinitionId,

    /// Version number at start time, kept for display and audit
    pub definition_version: u32,

    /// Logical process name, denormalized for listings
    pub definition_name: String,

    /// Current status
    pub status: InstanceStatus,

    /// Instance variables, merged on task completion
    pub variables: Variables,

    /// Nodes currently holding a token; ordered for deterministic advance
    pub tokens: BTreeSet<NodeId>,

    /// Edges that have already delivered a token to each waiting join
    pub pending_joins: HashMap<NodeId, HashSet<EdgeId>>,

    /// Fault details when status is Faulted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<FaultInfo>,

    /// Timestamp when the instance was started
    pub created_at: DateTime<Utc>,

    /// Timestamp when the instance was last updated
    pub updated_at: DateTime<Utc>,

    /// Timestamp when the instance reached a final status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Events recorded since the last drain
    #[serde(skip)]
    pending_events: Vec<HistoryEventKind>,
}

impl ProcessInstance {
    /// Start a new instance of an active definition
    ///
    /// Places the initial token on the start node and records
    /// `InstanceStarted`. The definition must have passed validation, so a
    /// missing start node here is a store corruption, not a user error.
    pub fn start(
        definition: &ProcessDefinition,
        variables: Variables,
    ) -> Result<Self, EngineError> {
        if !definition.is_active() {
            return Err(EngineError::Conflict(format!(
                "Cannot start instance of definition {} in status: {:?}",
                definition.id.0, definition.status
            )));
        }

        let start_node = definition.graph.start_node().ok_or_else(|| {
            EngineError::StateStore(format!(
                "Active definition {} has no start node",
                definition.id.0
            ))
        })?;

        let now = Utc::now();
        let mut tokens = BTreeSet::new();
        tokens.insert(start_node.id.clone());

        let mut instance = Self {
            id: InstanceId::new(),
            definition_id: definition.id.clone(),
            definition_version: definition.version,
            definition_name: definition.name.clone(),
            status: InstanceStatus::Running,
            variables: variables.clone(),
            tokens,
            pending_joins: HashMap::new(),
            fault: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
            pending_events: Vec::new(),
        };

        instance.record_event(HistoryEventKind::InstanceStarted {
            definition_id: definition.id.clone(),
            definition_version: definition.version,
            start_node: start_node.id.clone(),
            variables,
        });

        Ok(instance)
    }

    /// True if tokens may move and tasks may be completed
    pub fn is_active(&self) -> bool {
        matches!(self.status, InstanceStatus::Running | InstanceStatus::Waiting)
    }

    /// Error unless the instance accepts work right now
    pub fn ensure_active(&self) -> Result<(), EngineError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(EngineError::Conflict(format!(
                "Instance {} cannot accept work in status: {:?}",
                self.id.0, self.status
            )))
        }
    }

    /// Move a token along an edge
    pub fn move_token(&mut self, edge: &EdgeId, from: &NodeId, to: &NodeId) {
        self.tokens.remove(from);
        self.tokens.insert(to.clone());
        self.touch();
        self.record_event(HistoryEventKind::TokenMoved {
            from: from.clone(),
            to: to.clone(),
            edge: edge.clone(),
        });
    }

    /// Consume a token at an end node
    pub fn consume_token(&mut self, node: &NodeId) {
        self.tokens.remove(node);
        self.touch();
        self.record_event(HistoryEventKind::TokenConsumed { node: node.clone() });
    }

    /// Register a token arriving at a parallel join
    ///
    /// The arriving token is removed from its source node. When every one of
    /// `required` incoming edges has delivered, the arrivals merge into a
    /// single token on the join and the method returns true.
    pub fn arrive_at_join(
        &mut self,
        join: &NodeId,
        edge: &EdgeId,
        from: &NodeId,
        required: usize,
    ) -> bool {
        self.tokens.remove(from);
        let arrived = self.pending_joins.entry(join.clone()).or_default();
        arrived.insert(edge.clone());
        let complete = arrived.len() >= required;
        self.touch();
        self.record_event(HistoryEventKind::JoinArrived {
            join: join.clone(),
            edge: edge.clone(),
            from: from.clone(),
        });

        if complete {
            self.pending_joins.remove(join);
            self.tokens.insert(join.clone());
            self.record_event(HistoryEventKind::JoinMerged { join: join.clone() });
        }
        complete
    }

    /// Merge task output into instance variables, later keys winning
    pub fn merge_variables(&mut self, output: &Variables) {
        self.variables.merge(output);
        self.touch();
    }

    /// Park the instance: all remaining tokens sit at human tasks
    pub fn park(&mut self) {
        if !self.status.is_terminal() && self.status != InstanceStatus::Suspended {
            self.status = InstanceStatus::Waiting;
            self.touch();
        }
    }

    /// Mark the instance running again while tokens advance
    pub fn run(&mut self) {
        if self.status == InstanceStatus::Waiting || self.status == InstanceStatus::Faulted {
            self.status = InstanceStatus::Running;
            self.fault = None;
            self.touch();
        }
    }

    /// Complete the instance once the last token is consumed
    pub fn complete(&mut self) -> Result<(), EngineError> {
        if !self.tokens.is_empty() {
            return Err(EngineError::Fault(format!(
                "Instance {} still has {} live tokens",
                self.id.0,
                self.tokens.len()
            )));
        }
        let now = Utc::now();
        self.status = InstanceStatus::Completed;
        self.finished_at = Some(now);
        self.updated_at = now;
        self.record_event(HistoryEventKind::InstanceCompleted);
        Ok(())
    }

    /// Pause a running or waiting instance
    pub fn suspend(&mut self) -> Result<(), EngineError> {
        self.ensure_active()?;
        self.status = InstanceStatus::Suspended;
        self.touch();
        self.record_event(HistoryEventKind::InstanceSuspended);
        Ok(())
    }

    /// Resume a suspended instance
    pub fn resume(&mut self) -> Result<(), EngineError> {
        if self.status != InstanceStatus::Suspended {
            return Err(EngineError::Conflict(format!(
                "Cannot resume instance {} in status: {:?}",
                self.id.0, self.status
            )));
        }
        self.status = InstanceStatus::Running;
        self.touch();
        self.record_event(HistoryEventKind::InstanceResumed);
        Ok(())
    }

    /// Kill the instance; final, cannot be resumed or retried
    pub fn terminate(&mut self, reason: Option<String>) -> Result<(), EngineError> {
        if self.status.is_terminal() {
            return Err(EngineError::Conflict(format!(
                "Cannot terminate instance {} in status: {:?}",
                self.id.0, self.status
            )));
        }
        let now = Utc::now();
        self.status = InstanceStatus::Terminated;
        self.finished_at = Some(now);
        self.updated_at = now;
        self.record_event(HistoryEventKind::InstanceTerminated { reason });
        Ok(())
    }

    /// Record a fault; the token stays where it was for retry
    pub fn fault(&mut self, node: Option<NodeId>, error: String) {
        self.fault = Some(FaultInfo {
            node: node.clone(),
            error: error.clone(),
        });
        self.status = InstanceStatus::Faulted;
        self.touch();
        self.record_event(HistoryEventKind::InstanceFaulted { node, error });
    }

    /// Clear a fault and let the engine re-attempt the advance
    pub fn retry(&mut self) -> Result<(), EngineError> {
        if self.status != InstanceStatus::Faulted {
            return Err(EngineError::Conflict(format!(
                "Cannot retry instance {} in status: {:?}",
                self.id.0, self.status
            )));
        }
        self.fault = None;
        self.status = InstanceStatus::Running;
        self.touch();
        self.record_event(HistoryEventKind::InstanceRetried);
        Ok(())
    }

    /// Record an event for later draining
    pub fn record_event(&mut self, kind: HistoryEventKind) {
        self.pending_events.push(kind);
    }

    /// Drain recorded events for the history log
    pub fn take_events(&mut self) -> Vec<HistoryEventKind> {
        std::mem::take(&mut self.pending_events)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
