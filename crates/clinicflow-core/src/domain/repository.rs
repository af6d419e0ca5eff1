//! Repository traits for the Clinicflow engine
//!
//! The engine and services talk to state through these traits only.
//! External crates can implement them to provide durable persistence; the
//! `memory` module provides the concurrent in-memory implementations the
//! server runs on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::definition::{DefinitionId, ProcessDefinition};
use super::events::{HistoryEvent, HistoryEventKind};
use super::instance::{InstanceId, InstanceStatus, ProcessInstance};
use super::rule::{BusinessRule, RuleId};
use super::task::{HumanTask, TaskId, TaskStatus};
use crate::error::EngineError;

/// Filter for instance listings
#[derive(Debug, Clone, Default)]
pub struct InstanceFilter {
    /// Restrict to instances of one definition version
    pub definition_id: Option<DefinitionId>,
    /// Restrict to one status
    pub status: Option<InstanceStatus>,
}

/// Filter for task listings
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Restrict to tasks of one instance
    pub instance_id: Option<InstanceId>,
    /// Restrict to one status
    pub status: Option<TaskStatus>,
    /// Restrict to tasks claimed by this user
    pub claimed_by: Option<String>,
    /// Restrict to tasks assigned to this candidate group
    pub candidate_group: Option<String>,
    /// Restrict to tasks at or above this priority
    pub min_priority: Option<i32>,
    /// Restrict to tasks due before this point in time
    pub due_before: Option<DateTime<Utc>>,
}

/// Repository for process definitions
#[async_trait]
pub trait DefinitionRepository: Send + Sync {
    /// Find a definition version by ID
    async fn find_by_id(&self, id: &DefinitionId) -> Result<Option<ProcessDefinition>, EngineError>;

    /// Save a definition version
    async fn save(&self, definition: &ProcessDefinition) -> Result<(), EngineError>;

    /// Delete a definition version
    async fn delete(&self, id: &DefinitionId) -> Result<(), EngineError>;

    /// List all definition versions
    async fn find_all(&self) -> Result<Vec<ProcessDefinition>, EngineError>;

    /// Next version number for the given process name
    async fn next_version(&self, name: &str) -> Result<u32, EngineError>;
}

/// Repository for process instances
#[async_trait]
pub trait InstanceRepository: Send + Sync {
    /// Find an instance by ID
    async fn find_by_id(&self, id: &InstanceId) -> Result<Option<ProcessInstance>, EngineError>;

    /// Save an instance
    async fn save(&self, instance: &ProcessInstance) -> Result<(), EngineError>;

    /// List instances matching the filter
    async fn list(&self, filter: &InstanceFilter) -> Result<Vec<ProcessInstance>, EngineError>;

    /// Count non-final instances pinned to a definition version
    async fn count_live_for_definition(&self, id: &DefinitionId) -> Result<usize, EngineError>;
}

/// Repository for human tasks
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Find a task by ID
    async fn find_by_id(&self, id: &TaskId) -> Result<Option<HumanTask>, EngineError>;

    /// Save a task
    async fn save(&self, task: &HumanTask) -> Result<(), EngineError>;

    /// Atomically claim an open task for a user
    ///
    /// The check-and-set must happen under the store's own exclusion so two
    /// concurrent claimers can never both win.
    async fn claim(&self, id: &TaskId, user: &str) -> Result<HumanTask, EngineError>;

    /// List tasks matching the filter, highest priority first
    async fn list(&self, filter: &TaskFilter) -> Result<Vec<HumanTask>, EngineError>;

    /// Live tasks of an instance
    async fn find_live_by_instance(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Vec<HumanTask>, EngineError>;

    /// Live tasks whose deadline has passed and that are not yet escalated
    async fn find_overdue(&self, now: DateTime<Utc>) -> Result<Vec<HumanTask>, EngineError>;
}

/// Append-only history log, one ordered stream per instance
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// Append an event, assigning the next sequence number
    async fn append(
        &self,
        instance_id: &InstanceId,
        kind: HistoryEventKind,
    ) -> Result<HistoryEvent, EngineError>;

    /// Full log of an instance in sequence order
    async fn find_by_instance(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Vec<HistoryEvent>, EngineError>;
}

/// Repository for business rules
#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// Find a rule by ID
    async fn find_by_id(&self, id: &RuleId) -> Result<Option<BusinessRule>, EngineError>;

    /// Find a rule by its unique name
    async fn find_by_name(&self, name: &str) -> Result<Option<BusinessRule>, EngineError>;

    /// Save a rule
    async fn save(&self, rule: &BusinessRule) -> Result<(), EngineError>;

    /// Delete a rule
    async fn delete(&self, id: &RuleId) -> Result<(), EngineError>;

    /// List all rules
    async fn find_all(&self) -> Result<Vec<BusinessRule>, EngineError>;
}

/// Concurrent in-memory implementations
pub mod memory {
    use super::*;
    use dashmap::DashMap;
    use std::sync::Arc;

    /// In-memory definition store backed by a concurrent map
    pub struct MemoryDefinitionRepository {
        definitions: Arc<DashMap<String, ProcessDefinition>>,
    }

    impl MemoryDefinitionRepository {
        pub fn new() -> Self {
            Self {
                definitions: Arc::new(DashMap::with_capacity(16)),
            }
        }
    }

    impl Default for MemoryDefinitionRepository {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl DefinitionRepository for MemoryDefinitionRepository {
        async fn find_by_id(
            &self,
            id: &DefinitionId,
        ) -> Result<Option<ProcessDefinition>, EngineError> {
            Ok(self.definitions.get(&id.0).map(|d| d.clone()))
        }

        async fn save(&self, definition: &ProcessDefinition) -> Result<(), EngineError> {
            self.definitions
                .insert(definition.id.0.clone(), definition.clone());
            Ok(())
        }

        async fn delete(&self, id: &DefinitionId) -> Result<(), EngineError> {
            self.definitions.remove(&id.0);
            Ok(())
        }

        async fn find_all(&self) -> Result<Vec<ProcessDefinition>, EngineError> {
            let mut all: Vec<ProcessDefinition> =
                self.definitions.iter().map(|d| d.clone()).collect();
            all.sort_by(|a, b| a.name.cmp(&b.name).then(a.version.cmp(&b.version)));
            Ok(all)
        }

        async fn next_version(&self, name: &str) -> Result<u32, EngineError> {
            let max = self
                .definitions
                .iter()
                .filter(|d| d.name == name)
                .map(|d| d.version)
                .max()
                .unwrap_or(0);
            Ok(max + 1)
        }
    }

    /// In-memory instance store with a per-definition index
    pub struct MemoryInstanceRepository {
        instances: Arc<DashMap<String, ProcessInstance>>,
    }

    impl MemoryInstanceRepository {
        pub fn new() -> Self {
            Self {
                instances: Arc::new(DashMap::with_capacity(64)),
            }
        }
    }

    impl Default for MemoryInstanceRepository {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl InstanceRepository for MemoryInstanceRepository {
        async fn find_by_id(
            &self,
            id: &InstanceId,
        ) -> Result<Option<ProcessInstance>, EngineError> {
            Ok(self.instances.get(&id.0).map(|i| i.clone()))
        }

        async fn save(&self, instance: &ProcessInstance) -> Result<(), EngineError> {
            self.instances
                .insert(instance.id.0.clone(), instance.clone());
            Ok(())
        }

        async fn list(&self, filter: &InstanceFilter) -> Result<Vec<ProcessInstance>, EngineError> {
            let mut matching: Vec<ProcessInstance> = self
                .instances
                .iter()
                .filter(|i| {
                    filter
                        .definition_id
                        .as_ref()
                        .map(|d| &i.definition_id == d)
                        .unwrap_or(true)
                        && filter.status.map(|s| i.status == s).unwrap_or(true)
                })
                .map(|i| i.clone())
                .collect();
            matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(matching)
        }

        async fn count_live_for_definition(
            &self,
            id: &DefinitionId,
        ) -> Result<usize, EngineError> {
            Ok(self
                .instances
                .iter()
                .filter(|i| &i.definition_id == id && !i.status.is_terminal())
                .count())
        }
    }

    /// In-memory task store
    ///
    /// `claim` mutates through `get_mut`, which holds the map shard's write
    /// lock for the duration of the check-and-set.
    pub struct MemoryTaskRepository {
        tasks: Arc<DashMap<String, HumanTask>>,
    }

    impl MemoryTaskRepository {
        pub fn new() -> Self {
            Self {
                tasks: Arc::new(DashMap::with_capacity(64)),
            }
        }
    }

    impl Default for MemoryTaskRepository {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl TaskRepository for MemoryTaskRepository {
        async fn find_by_id(&self, id: &TaskId) -> Result<Option<HumanTask>, EngineError> {
            Ok(self.tasks.get(&id.0).map(|t| t.clone()))
        }

        async fn save(&self, task: &HumanTask) -> Result<(), EngineError> {
            self.tasks.insert(task.id.0.clone(), task.clone());
            Ok(())
        }

        async fn claim(&self, id: &TaskId, user: &str) -> Result<HumanTask, EngineError> {
            let mut entry = self
                .tasks
                .get_mut(&id.0)
                .ok_or_else(|| EngineError::TaskNotFound(id.0.clone()))?;
            entry.claim(user)?;
            Ok(entry.clone())
        }

        async fn list(&self, filter: &TaskFilter) -> Result<Vec<HumanTask>, EngineError> {
            let mut matching: Vec<HumanTask> = self
                .tasks
                .iter()
                .filter(|t| {
                    filter
                        .instance_id
                        .as_ref()
                        .map(|i| &t.instance_id == i)
                        .unwrap_or(true)
                        && filter.status.map(|s| t.status == s).unwrap_or(true)
                        && filter
                            .claimed_by
                            .as_ref()
                            .map(|u| t.claimed_by.as_ref() == Some(u))
                            .unwrap_or(true)
                        && filter
                            .candidate_group
                            .as_ref()
                            .map(|g| {
                                matches!(&t.assignee,
                                    crate::domain::graph::AssigneeRule::Group(group) if group == g)
                            })
                            .unwrap_or(true)
                        && filter.min_priority.map(|p| t.priority >= p).unwrap_or(true)
                        && filter
                            .due_before
                            .map(|cutoff| t.due_at.map(|due| due < cutoff).unwrap_or(false))
                            .unwrap_or(true)
                })
                .map(|t| t.clone())
                .collect();
            matching.sort_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.created_at.cmp(&b.created_at))
            });
            Ok(matching)
        }

        async fn find_live_by_instance(
            &self,
            instance_id: &InstanceId,
        ) -> Result<Vec<HumanTask>, EngineError> {
            Ok(self
                .tasks
                .iter()
                .filter(|t| &t.instance_id == instance_id && !t.status.is_terminal())
                .map(|t| t.clone())
                .collect())
        }

        async fn find_overdue(&self, now: DateTime<Utc>) -> Result<Vec<HumanTask>, EngineError> {
            Ok(self
                .tasks
                .iter()
                .filter(|t| t.is_overdue(now) && !t.escalated)
                .map(|t| t.clone())
                .collect())
        }
    }

    /// In-memory append-only history log
    pub struct MemoryHistoryRepository {
        streams: Arc<DashMap<String, Vec<HistoryEvent>>>,
    }

    impl MemoryHistoryRepository {
        pub fn new() -> Self {
            Self {
                streams: Arc::new(DashMap::with_capacity(64)),
            }
        }
    }

    impl Default for MemoryHistoryRepository {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl HistoryRepository for MemoryHistoryRepository {
        async fn append(
            &self,
            instance_id: &InstanceId,
            kind: HistoryEventKind,
        ) -> Result<HistoryEvent, EngineError> {
            let mut stream = self.streams.entry(instance_id.0.clone()).or_default();
            let event = HistoryEvent {
                instance_id: instance_id.clone(),
                sequence: stream.len() as u64,
                timestamp: Utc::now(),
                kind,
            };
            stream.push(event.clone());
            Ok(event)
        }

        async fn find_by_instance(
            &self,
            instance_id: &InstanceId,
        ) -> Result<Vec<HistoryEvent>, EngineError> {
            Ok(self
                .streams
                .get(&instance_id.0)
                .map(|s| s.clone())
                .unwrap_or_default())
        }
    }

    /// In-memory rule store
    pub struct MemoryRuleRepository {
        rules: Arc<DashMap<String, BusinessRule>>,
    }

    impl MemoryRuleRepository {
        pub fn new() -> Self {
            Self {
                rules: Arc::new(DashMap::with_capacity(16)),
            }
        }
    }

    impl Default for MemoryRuleRepository {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl RuleRepository for MemoryRuleRepository {
        async fn find_by_id(&self, id: &RuleId) -> Result<Option<BusinessRule>, EngineError> {
            Ok(self.rules.get(&id.0).map(|r| r.clone()))
        }

        async fn find_by_name(&self, name: &str) -> Result<Option<BusinessRule>, EngineError> {
            Ok(self
                .rules
                .iter()
                .find(|r| r.name == name)
                .map(|r| r.clone()))
        }

        async fn save(&self, rule: &BusinessRule) -> Result<(), EngineError> {
            self.rules.insert(rule.id.0.clone(), rule.clone());
            Ok(())
        }

        async fn delete(&self, id: &RuleId) -> Result<(), EngineError> {
            self.rules.remove(&id.0);
            Ok(())
        }

        async fn find_all(&self) -> Result<Vec<BusinessRule>, EngineError> {
            let mut all: Vec<BusinessRule> = self.rules.iter().map(|r| r.clone()).collect();
            all.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(all)
        }
    }
}
