//! Process engine
//!
//! Advances instance tokens through definition graphs. All movement for one
//! instance happens under that instance's lock, and every state change is
//! appended to the history log before the instance snapshot is saved, so
//! the log never lags the snapshot.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::application::rules::RuleEvaluator;
use crate::domain::definition::{DefinitionId, ProcessDefinition};
use crate::domain::events::{HistoryEvent, HistoryEventKind};
use crate::domain::graph::{Edge, Node, NodeKind};
use crate::domain::instance::{InstanceId, ProcessInstance};
use crate::domain::repository::{
    DefinitionRepository, HistoryRepository, InstanceFilter, InstanceRepository, TaskRepository,
};
use crate::domain::task::{HumanTask, TaskId, TaskStatus};
use crate::error::EngineError;
use crate::types::Variables;

/// Upper bound on token movements per advance call
///
/// A graph of guarded back-edges can loop without ever parking; past this
/// budget the instance faults instead of spinning.
const MAX_ADVANCE_STEPS: usize = 10_000;

/// Drives process instances: starting, advancing, and operator actions
pub struct ProcessEngine {
    definitions: Arc<dyn DefinitionRepository>,
    instances: Arc<dyn InstanceRepository>,
    tasks: Arc<dyn TaskRepository>,
    history: Arc<dyn HistoryRepository>,
    evaluator: Arc<dyn RuleEvaluator>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ProcessEngine {
    pub fn new(
        definitions: Arc<dyn DefinitionRepository>,
        instances: Arc<dyn InstanceRepository>,
        tasks: Arc<dyn TaskRepository>,
        history: Arc<dyn HistoryRepository>,
        evaluator: Arc<dyn RuleEvaluator>,
    ) -> Self {
        Self {
            definitions,
            instances,
            tasks,
            history,
            evaluator,
            locks: DashMap::new(),
        }
    }

    /// Serialize all mutations of one instance
    fn lock_for(&self, id: &InstanceId) -> Arc<Mutex<()>> {
        self.locks
            .entry(id.0.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Start a new instance of an active definition version
    pub async fn start_instance(
        &self,
        definition_id: &DefinitionId,
        variables: Variables,
    ) -> Result<ProcessInstance, EngineError> {
        let definition = self
            .definitions
            .find_by_id(definition_id)
            .await?
            .ok_or_else(|| EngineError::DefinitionNotFound(definition_id.0.clone()))?;

        let mut instance = ProcessInstance::start(&definition, variables)?;
        info!(
            instance_id = %instance.id.0,
            definition_id = %definition.id.0,
            definition_version = definition.version,
            "Starting process instance"
        );

        let lock = self.lock_for(&instance.id);
        let _guard = lock.lock().await;

        self.advance(&definition, &mut instance).await?;
        self.persist(&mut instance).await?;
        Ok(instance)
    }

    /// Complete a task and advance the instance past its node
    ///
    /// An unclaimed task is claimed implicitly when the caller is an
    /// eligible claimant, so a group member can finish work in one call.
    pub async fn complete_task(
        &self,
        task_id: &TaskId,
        user: &str,
        output: Variables,
    ) -> Result<HumanTask, EngineError> {
        let task = self
            .tasks
            .find_by_id(task_id)
            .await?
            .ok_or_else(|| EngineError::TaskNotFound(task_id.0.clone()))?;

        let lock = self.lock_for(&task.instance_id);
        let _guard = lock.lock().await;

        let mut instance = self.load_instance(&task.instance_id).await?;
        instance.ensure_active()?;

        // Re-read under the lock; the claim state may have changed
        let mut task = self
            .tasks
            .find_by_id(task_id)
            .await?
            .ok_or_else(|| EngineError::TaskNotFound(task_id.0.clone()))?;
        if task.status == TaskStatus::Created && task.claimable_by(user) {
            task.claim(user)?;
            instance.record_event(HistoryEventKind::TaskClaimed {
                task_id: task.id.clone(),
                user: user.to_string(),
            });
        }
        task.complete(user, output.clone())?;
        self.tasks.save(&task).await?;

        instance.merge_variables(&output);
        instance.record_event(HistoryEventKind::TaskCompleted {
            task_id: task.id.clone(),
            user: user.to_string(),
            output,
        });
        instance.run();

        info!(
            instance_id = %instance.id.0,
            task_id = %task.id.0,
            node_id = %task.node_id.0,
            "Task completed, advancing instance"
        );

        let definition = self.load_definition(&instance.definition_id).await?;

        // Route the parked token along the first matching outgoing edge
        match definition.graph.node(&task.node_id) {
            Some(node) => {
                let node = node.clone();
                if self.route_token(&definition, &mut instance, &node).await? {
                    self.advance(&definition, &mut instance).await?;
                }
            }
            None => instance.fault(
                Some(task.node_id.clone()),
                format!("Task node {} no longer exists in definition", task.node_id.0),
            ),
        }

        self.persist(&mut instance).await?;
        Ok(task)
    }

    /// Pause a running or waiting instance
    pub async fn suspend_instance(&self, id: &InstanceId) -> Result<ProcessInstance, EngineError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut instance = self.load_instance(id).await?;
        instance.suspend()?;
        info!(instance_id = %id.0, "Instance suspended");
        self.persist(&mut instance).await?;
        Ok(instance)
    }

    /// Resume a suspended instance and let parked tokens continue
    pub async fn resume_instance(&self, id: &InstanceId) -> Result<ProcessInstance, EngineError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut instance = self.load_instance(id).await?;
        instance.resume()?;
        info!(instance_id = %id.0, "Instance resumed");

        let definition = self.load_definition(&instance.definition_id).await?;
        self.advance(&definition, &mut instance).await?;
        self.persist(&mut instance).await?;
        Ok(instance)
    }

    /// Kill an instance; live tasks are cancelled, the status is final
    pub async fn terminate_instance(
        &self,
        id: &InstanceId,
        reason: Option<String>,
    ) -> Result<ProcessInstance, EngineError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut instance = self.load_instance(id).await?;
        instance.terminate(reason)?;
        warn!(instance_id = %id.0, "Instance terminated");

        for mut task in self.tasks.find_live_by_instance(id).await? {
            task.cancel()?;
            self.tasks.save(&task).await?;
            instance.record_event(HistoryEventKind::TaskCancelled {
                task_id: task.id.clone(),
            });
        }

        self.persist(&mut instance).await?;
        Ok(instance)
    }

    /// Clear a fault and re-attempt the advance from the faulted position
    pub async fn retry_instance(&self, id: &InstanceId) -> Result<ProcessInstance, EngineError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut instance = self.load_instance(id).await?;
        instance.retry()?;
        info!(instance_id = %id.0, "Retrying faulted instance");

        let definition = self.load_definition(&instance.definition_id).await?;
        self.advance(&definition, &mut instance).await?;
        self.persist(&mut instance).await?;
        Ok(instance)
    }

    pub async fn get_instance(&self, id: &InstanceId) -> Result<ProcessInstance, EngineError> {
        self.load_instance(id).await
    }

    /// Instances matching the filter, newest first
    pub async fn list_instances(
        &self,
        filter: &InstanceFilter,
    ) -> Result<Vec<ProcessInstance>, EngineError> {
        self.instances.list(filter).await
    }

    /// Full history log of an instance
    pub async fn instance_history(
        &self,
        id: &InstanceId,
    ) -> Result<Vec<HistoryEvent>, EngineError> {
        self.load_instance(id).await?;
        self.history.find_by_instance(id).await
    }

    /// Advance every movable token until the instance parks or finishes
    async fn advance(
        &self,
        definition: &ProcessDefinition,
        instance: &mut ProcessInstance,
    ) -> Result<(), EngineError> {
        let mut steps = 0;

        loop {
            if !instance.is_active() {
                return Ok(());
            }

            let mut moved = false;
            let tokens: Vec<_> = instance.tokens.iter().cloned().collect();

            for node_id in tokens {
                // Earlier movement in this pass may have consumed the token
                if !instance.tokens.contains(&node_id) {
                    continue;
                }

                let node = match definition.graph.node(&node_id) {
                    Some(node) => node.clone(),
                    None => {
                        instance.fault(
                            Some(node_id.clone()),
                            format!("Token sits on unknown node {}", node_id.0),
                        );
                        return Ok(());
                    }
                };

                match &node.kind {
                    NodeKind::Start | NodeKind::Decision | NodeKind::ParallelJoin => {
                        moved |= self.route_token(definition, instance, &node).await?;
                    }
                    NodeKind::ParallelSplit => {
                        for edge in definition.graph.outgoing(&node.id) {
                            let edge = edge.clone();
                            self.deliver(definition, instance, &edge);
                        }
                        moved = true;
                    }
                    NodeKind::Task { .. } => {
                        moved |= self.ensure_task(instance, &node).await?;
                    }
                    NodeKind::End => {
                        instance.consume_token(&node.id);
                        moved = true;
                    }
                }

                if !instance.is_active() {
                    return Ok(());
                }

                steps += 1;
                if steps > MAX_ADVANCE_STEPS {
                    instance.fault(
                        Some(node.id.clone()),
                        format!("Advance exceeded {} steps without parking", MAX_ADVANCE_STEPS),
                    );
                    return Ok(());
                }
            }

            if !moved {
                break;
            }
        }

        if instance.tokens.is_empty() {
            instance.complete()?;
            info!(instance_id = %instance.id.0, "Instance completed");
        } else {
            instance.park();
        }
        Ok(())
    }

    /// Move the token at `node` along its first matching outgoing edge
    ///
    /// Returns true if the token moved. A node with outgoing edges but no
    /// matching guard faults the instance; an expression error does too.
    async fn route_token(
        &self,
        definition: &ProcessDefinition,
        instance: &mut ProcessInstance,
        node: &Node,
    ) -> Result<bool, EngineError> {
        let selected = match self.select_edge(definition, instance, node) {
            Ok(edge) => edge,
            Err(EngineError::Expression(message)) => {
                instance.fault(Some(node.id.clone()), message);
                return Ok(false);
            }
            Err(other) => return Err(other),
        };

        match selected {
            Some(edge) => {
                self.deliver(definition, instance, &edge);
                Ok(true)
            }
            None => {
                instance.fault(
                    Some(node.id.clone()),
                    format!("No outgoing edge of node {} matched", node.id.0),
                );
                Ok(false)
            }
        }
    }

    /// First outgoing edge whose guard passes, in declaration order
    ///
    /// An unguarded edge always passes, so placing it last makes it the
    /// default branch.
    fn select_edge(
        &self,
        definition: &ProcessDefinition,
        instance: &ProcessInstance,
        node: &Node,
    ) -> Result<Option<Edge>, EngineError> {
        for edge in definition.graph.outgoing(&node.id) {
            let passes = match &edge.guard {
                None => true,
                Some(expression) => self.evaluator.evaluate(expression, &instance.variables)?,
            };
            debug!(
                instance_id = %instance.id.0,
                node_id = %node.id.0,
                edge_id = %edge.id.0,
                passes,
                "Evaluated edge guard"
            );
            if passes {
                return Ok(Some(edge.clone()));
            }
        }
        Ok(None)
    }

    /// Put a token onto an edge's target, with join arrivals held back
    fn deliver(&self, definition: &ProcessDefinition, instance: &mut ProcessInstance, edge: &Edge) {
        let target_is_join = definition
            .graph
            .node(&edge.to)
            .map(|n| n.kind == NodeKind::ParallelJoin)
            .unwrap_or(false);

        if target_is_join {
            let required = definition.graph.incoming(&edge.to).len();
            instance.arrive_at_join(&edge.to, &edge.id, &edge.from, required);
        } else {
            instance.move_token(&edge.id, &edge.from, &edge.to);
        }
    }

    /// Create the human task for a parked token, once
    async fn ensure_task(
        &self,
        instance: &mut ProcessInstance,
        node: &Node,
    ) -> Result<bool, EngineError> {
        let live = self.tasks.find_live_by_instance(&instance.id).await?;
        if live.iter().any(|t| t.node_id == node.id) {
            return Ok(false);
        }

        let task = HumanTask::for_node(instance.id.clone(), node)?;
        self.tasks.save(&task).await?;
        instance.record_event(HistoryEventKind::TaskCreated { task: task.clone() });
        debug!(
            instance_id = %instance.id.0,
            task_id = %task.id.0,
            node_id = %node.id.0,
            "Created human task"
        );
        Ok(true)
    }

    /// Append drained events to the log, then save the snapshot
    async fn persist(&self, instance: &mut ProcessInstance) -> Result<(), EngineError> {
        for kind in instance.take_events() {
            self.history.append(&instance.id, kind).await?;
        }
        self.instances.save(instance).await?;

        // A finished instance never takes its lock again
        if instance.status.is_terminal() {
            self.locks.remove(&instance.id.0);
        }
        Ok(())
    }

    async fn load_instance(&self, id: &InstanceId) -> Result<ProcessInstance, EngineError> {
        self.instances
            .find_by_id(id)
            .await?
            .ok_or_else(|| EngineError::InstanceNotFound(id.0.clone()))
    }

    async fn load_definition(
        &self,
        id: &DefinitionId,
    ) -> Result<ProcessDefinition, EngineError> {
        self.definitions
            .find_by_id(id)
            .await?
            .ok_or_else(|| EngineError::DefinitionNotFound(id.0.clone()))
    }
}
