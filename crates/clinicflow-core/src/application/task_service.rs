//! Human task service
//!
//! Claim, release, delegate, and cancel live here; completing a task moves
//! tokens and therefore belongs to the engine. Every state change is
//! appended to the owning instance's history log.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::domain::events::HistoryEventKind;
use crate::domain::instance::ProcessInstance;
use crate::domain::repository::{
    HistoryRepository, InstanceRepository, TaskFilter, TaskRepository,
};
use crate::domain::task::{HumanTask, TaskId};
use crate::error::EngineError;

/// Application service for task ownership operations
pub struct TaskService {
    tasks: Arc<dyn TaskRepository>,
    instances: Arc<dyn InstanceRepository>,
    history: Arc<dyn HistoryRepository>,
}

impl TaskService {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        instances: Arc<dyn InstanceRepository>,
        history: Arc<dyn HistoryRepository>,
    ) -> Self {
        Self {
            tasks,
            instances,
            history,
        }
    }

    pub async fn get_task(&self, id: &TaskId) -> Result<HumanTask, EngineError> {
        self.tasks
            .find_by_id(id)
            .await?
            .ok_or_else(|| EngineError::TaskNotFound(id.0.clone()))
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<HumanTask>, EngineError> {
        self.tasks.list(filter).await
    }

    /// Claim an open task; exactly one concurrent claimer wins
    pub async fn claim(&self, id: &TaskId, user: &str) -> Result<HumanTask, EngineError> {
        let task = self.get_task(id).await?;
        self.ensure_instance_accepts_work(&task).await?;

        // The store's check-and-set decides the race
        let claimed = self.tasks.claim(id, user).await?;
        self.history
            .append(
                &claimed.instance_id,
                HistoryEventKind::TaskClaimed {
                    task_id: claimed.id.clone(),
                    user: user.to_string(),
                },
            )
            .await?;
        info!(task_id = %id.0, user = %user, "Task claimed");
        Ok(claimed)
    }

    /// Return a claimed task to the open pool
    pub async fn release(&self, id: &TaskId, user: &str) -> Result<HumanTask, EngineError> {
        let mut task = self.get_task(id).await?;
        self.ensure_instance_accepts_work(&task).await?;

        task.release(user)?;
        self.tasks.save(&task).await?;
        self.history
            .append(
                &task.instance_id,
                HistoryEventKind::TaskReleased {
                    task_id: task.id.clone(),
                    user: user.to_string(),
                },
            )
            .await?;
        debug!(task_id = %id.0, user = %user, "Task released");
        Ok(task)
    }

    /// Hand a claimed task directly to another user
    pub async fn delegate(
        &self,
        id: &TaskId,
        from_user: &str,
        to_user: &str,
    ) -> Result<HumanTask, EngineError> {
        let mut task = self.get_task(id).await?;
        self.ensure_instance_accepts_work(&task).await?;

        task.delegate(from_user, to_user)?;
        self.tasks.save(&task).await?;
        self.history
            .append(
                &task.instance_id,
                HistoryEventKind::TaskDelegated {
                    task_id: task.id.clone(),
                    from_user: from_user.to_string(),
                    to_user: to_user.to_string(),
                },
            )
            .await?;
        info!(task_id = %id.0, from_user = %from_user, to_user = %to_user, "Task delegated");
        Ok(task)
    }

    /// Withdraw a live task without advancing the instance
    pub async fn cancel(&self, id: &TaskId) -> Result<HumanTask, EngineError> {
        let mut task = self.get_task(id).await?;
        task.cancel()?;
        self.tasks.save(&task).await?;
        self.history
            .append(
                &task.instance_id,
                HistoryEventKind::TaskCancelled {
                    task_id: task.id.clone(),
                },
            )
            .await?;
        warn!(task_id = %id.0, "Task cancelled");
        Ok(task)
    }

    /// Escalate every live task whose deadline has passed
    ///
    /// Each task is escalated at most once. Returns the escalated tasks.
    pub async fn sweep_overdue(&self, now: DateTime<Utc>) -> Result<Vec<HumanTask>, EngineError> {
        let mut escalated = Vec::new();
        for mut task in self.tasks.find_overdue(now).await? {
            if task.escalate().is_err() {
                continue;
            }
            self.tasks.save(&task).await?;
            self.history
                .append(
                    &task.instance_id,
                    HistoryEventKind::TaskEscalated {
                        task_id: task.id.clone(),
                    },
                )
                .await?;
            warn!(
                task_id = %task.id.0,
                instance_id = %task.instance_id.0,
                "Task overdue, escalated"
            );
            escalated.push(task);
        }
        Ok(escalated)
    }

    /// Suspended and final instances accept no ownership changes
    async fn ensure_instance_accepts_work(&self, task: &HumanTask) -> Result<(), EngineError> {
        let instance: ProcessInstance = self
            .instances
            .find_by_id(&task.instance_id)
            .await?
            .ok_or_else(|| EngineError::InstanceNotFound(task.instance_id.0.clone()))?;
        instance.ensure_active()
    }
}
