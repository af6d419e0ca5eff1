use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::graph::{AssigneeRule, Node, NodeId, NodeKind};
use crate::domain::instance::InstanceId;
use crate::error::EngineError;
use crate::types::Variables;

/// Value object: Task ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

/// Status of a human task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    /// Visible to all candidates, not yet owned
    Created,
    /// Owned by exactly one user
    Claimed,
    /// Finished with output variables; final
    Completed,
    /// Withdrawn by the engine or an operator; final
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }
}

/// Aggregate: a unit of human work created when a token parks at a task node
///
/// Ownership is exclusive: at most one user holds a claimed task, and only
/// the owner may complete, release, or delegate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HumanTask {
    /// ID of the task
    pub id: TaskId,

    /// Instance the task belongs to
    pub instance_id: InstanceId,

    /// Task node that produced this task
    pub node_id: NodeId,

    /// Display name, taken from the node
    pub name: String,

    /// Who may claim the task
    pub assignee: AssigneeRule,

    /// Current status
    pub status: TaskStatus,

    /// Owner while claimed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,

    /// Priority from the node configuration, higher is more urgent
    pub priority: i32,

    /// Timestamp when the task was created
    pub created_at: DateTime<Utc>,

    /// Deadline derived from the node's due offset, if configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,

    /// Set once the overdue sweep has escalated this task
    #[serde(default)]
    pub escalated: bool,

    /// Timestamp when the task reached a final status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Output variables recorded on completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Variables>,
}

impl HumanTask {
    /// Create an open task for a token parked at the given task node
    pub fn for_node(instance_id: InstanceId, node: &Node) -> Result<Self, EngineError> {
        let (assignee, priority, due_in_minutes) = match &node.kind {
            NodeKind::Task {
                assignee,
                priority,
                due_in_minutes,
            } => (assignee.clone(), *priority, *due_in_minutes),
            other => {
                return Err(EngineError::Fault(format!(
                    "Cannot create a task for {} node {}",
                    other.name(),
                    node.id.0
                )))
            }
        };

        let now = Utc::now();
        Ok(Self {
            id: TaskId::new(),
            instance_id,
            node_id: node.id.clone(),
            name: node.name.clone(),
            assignee,
            status: TaskStatus::Created,
            claimed_by: None,
            priority,
            created_at: now,
            due_at: due_in_minutes.map(|m| now + Duration::minutes(m)),
            escalated: false,
            finished_at: None,
            output: None,
        })
    }

    pub fn is_live(&self) -> bool {
        !self.status.is_terminal()
    }

    /// True if the given user is allowed to claim this task
    ///
    /// Group membership is resolved upstream by the identity layer; at this
    /// level a group-assigned task accepts any claimer.
    pub fn claimable_by(&self, user: &str) -> bool {
        match &self.assignee {
            AssigneeRule::User(owner) => owner == user,
            AssigneeRule::Group(_) => true,
        }
    }

    /// Take exclusive ownership of an open task
    pub fn claim(&mut self, user: &str) -> Result<(), EngineError> {
        if self.status != TaskStatus::Created {
            return Err(EngineError::Conflict(format!(
                "Cannot claim task {} in status: {:?}",
                self.id.0, self.status
            )));
        }
        if !self.claimable_by(user) {
            return Err(EngineError::Conflict(format!(
                "Task {} is assigned to {:?}, not claimable by {}",
                self.id.0, self.assignee, user
            )));
        }
        self.status = TaskStatus::Claimed;
        self.claimed_by = Some(user.to_string());
        Ok(())
    }

    /// Return a claimed task to the open pool
    pub fn release(&mut self, user: &str) -> Result<(), EngineError> {
        self.ensure_owned_by(user)?;
        self.status = TaskStatus::Created;
        self.claimed_by = None;
        Ok(())
    }

    /// Hand a claimed task to another user without opening it up
    pub fn delegate(&mut self, from_user: &str, to_user: &str) -> Result<(), EngineError> {
        self.ensure_owned_by(from_user)?;
        self.claimed_by = Some(to_user.to_string());
        Ok(())
    }

    /// Finish the task with output variables
    pub fn complete(&mut self, user: &str, output: Variables) -> Result<(), EngineError> {
        self.ensure_owned_by(user)?;
        self.status = TaskStatus::Completed;
        self.finished_at = Some(Utc::now());
        self.output = Some(output);
        Ok(())
    }

    /// Withdraw the task; used when the instance terminates or faults
    pub fn cancel(&mut self) -> Result<(), EngineError> {
        if self.status.is_terminal() {
            return Err(EngineError::Conflict(format!(
                "Cannot cancel task {} in status: {:?}",
                self.id.0, self.status
            )));
        }
        self.status = TaskStatus::Cancelled;
        self.claimed_by = None;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Mark the task escalated; at most once per task
    pub fn escalate(&mut self) -> Result<(), EngineError> {
        if self.status.is_terminal() {
            return Err(EngineError::Conflict(format!(
                "Cannot escalate task {} in status: {:?}",
                self.id.0, self.status
            )));
        }
        if self.escalated {
            return Err(EngineError::Conflict(format!(
                "Task {} is already escalated",
                self.id.0
            )));
        }
        self.escalated = true;
        Ok(())
    }

    /// True if the deadline has passed and the task is still live
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal()
            && self.due_at.map(|due| due < now).unwrap_or(false)
    }

    fn ensure_owned_by(&self, user: &str) -> Result<(), EngineError> {
        if self.status != TaskStatus::Claimed {
            return Err(EngineError::Conflict(format!(
                "Task {} is not claimed, status: {:?}",
                self.id.0, self.status
            )));
        }
        match &self.claimed_by {
            Some(owner) if owner == user => Ok(()),
            Some(owner) => Err(EngineError::Conflict(format!(
                "Task {} is claimed by {}, not {}",
                self.id.0, owner, user
            ))),
            None => Err(EngineError::StateStore(format!(
                "Claimed task {} has no owner",
                self.id.0
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_node(assignee: AssigneeRule) -> Node {
        Node {
            id: NodeId("review".to_string()),
            name: "Review lab results".to_string(),
            kind: NodeKind::Task {
                assignee,
                priority: 2,
                due_in_minutes: Some(60),
            },
        }
    }

    fn open_task() -> HumanTask {
        HumanTask::for_node(
            InstanceId("inst-1".to_string()),
            &task_node(AssigneeRule::Group("nurses".to_string())),
        )
        .unwrap()
    }

    #[test]
    fn test_for_node_copies_configuration() {
        let task = open_task();
        assert_eq!(task.status, TaskStatus::Created);
        assert_eq!(task.name, "Review lab results");
        assert_eq!(task.priority, 2);
        assert!(task.due_at.is_some());
        assert!(!task.escalated);
    }

    #[test]
    fn test_for_node_rejects_non_task_node() {
        let node = Node {
            id: NodeId("end".to_string()),
            name: "End".to_string(),
            kind: NodeKind::End,
        };
        let err = HumanTask::for_node(InstanceId("inst-1".to_string()), &node).unwrap_err();
        assert!(matches!(err, EngineError::Fault(_)));
    }

    #[test]
    fn test_claim_and_complete() {
        let mut task = open_task();
        task.claim("alice").unwrap();
        assert_eq!(task.claimed_by.as_deref(), Some("alice"));

        let output = Variables::from_value(serde_json::json!({"approved": true})).unwrap();
        task.complete("alice", output).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.finished_at.is_some());
    }

    #[test]
    fn test_claim_already_claimed_conflicts() {
        let mut task = open_task();
        task.claim("alice").unwrap();
        let err = task.claim("bob").unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
        assert_eq!(task.claimed_by.as_deref(), Some("alice"));
    }

    #[test]
    fn test_user_assignment_restricts_claimer() {
        let mut task = HumanTask::for_node(
            InstanceId("inst-1".to_string()),
            &task_node(AssigneeRule::User("alice".to_string())),
        )
        .unwrap();

        assert!(task.claim("bob").is_err());
        assert!(task.claim("alice").is_ok());
    }

    #[test]
    fn test_complete_requires_owner() {
        let mut task = open_task();
        task.claim("alice").unwrap();
        let err = task.complete("bob", Variables::new()).unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
        assert_eq!(task.status, TaskStatus::Claimed);
    }

    #[test]
    fn test_complete_unclaimed_conflicts() {
        let mut task = open_task();
        let err = task.complete("alice", Variables::new()).unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[test]
    fn test_complete_twice_conflicts() {
        let mut task = open_task();
        task.claim("alice").unwrap();
        task.complete("alice", Variables::new()).unwrap();
        let err = task.complete("alice", Variables::new()).unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[test]
    fn test_release_reopens_task() {
        let mut task = open_task();
        task.claim("alice").unwrap();
        task.release("alice").unwrap();
        assert_eq!(task.status, TaskStatus::Created);
        assert!(task.claimed_by.is_none());
        assert!(task.claim("bob").is_ok());
    }

    #[test]
    fn test_delegate_transfers_ownership() {
        let mut task = open_task();
        task.claim("alice").unwrap();
        task.delegate("alice", "bob").unwrap();
        assert_eq!(task.status, TaskStatus::Claimed);
        assert_eq!(task.claimed_by.as_deref(), Some("bob"));

        assert!(task.complete("alice", Variables::new()).is_err());
        assert!(task.complete("bob", Variables::new()).is_ok());
    }

    #[test]
    fn test_cancel_open_and_claimed() {
        let mut open = open_task();
        open.cancel().unwrap();
        assert_eq!(open.status, TaskStatus::Cancelled);

        let mut claimed = open_task();
        claimed.claim("alice").unwrap();
        claimed.cancel().unwrap();
        assert_eq!(claimed.status, TaskStatus::Cancelled);
        assert!(claimed.claimed_by.is_none());

        assert!(claimed.cancel().is_err());
    }

    #[test]
    fn test_escalate_once() {
        let mut task = open_task();
        task.escalate().unwrap();
        assert!(task.escalated);
        assert!(task.escalate().is_err());
    }

    #[test]
    fn test_is_overdue() {
        let mut task = open_task();
        let now = Utc::now();
        assert!(!task.is_overdue(now));
        assert!(task.is_overdue(now + Duration::hours(2)));

        task.cancel().unwrap();
        assert!(!task.is_overdue(now + Duration::hours(2)));
    }
}
