//! Server wiring and lifecycle

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use clinicflow_core::domain::repository::memory::{
    MemoryDefinitionRepository, MemoryHistoryRepository, MemoryInstanceRepository,
    MemoryRuleRepository, MemoryTaskRepository,
};
use clinicflow_core::{
    DefinitionService, JmespathRuleEvaluator, ProcessEngine, RuleService, TaskService,
};

use crate::api;
use crate::config::ServerConfig;
use crate::error::ServerResult;

/// The Clinicflow application server
///
/// Owns the engine and the application services; HTTP handlers reach them
/// through `Arc<ClinicflowServer>` as the router state.
pub struct ClinicflowServer {
    pub config: ServerConfig,
    pub engine: Arc<ProcessEngine>,
    pub definitions: Arc<DefinitionService>,
    pub tasks: Arc<TaskService>,
    pub rules: Arc<RuleService>,
}

impl ClinicflowServer {
    /// Wire the server on the in-memory state store
    pub fn new_in_memory(config: ServerConfig) -> Self {
        let definition_repo = Arc::new(MemoryDefinitionRepository::new());
        let instance_repo = Arc::new(MemoryInstanceRepository::new());
        let task_repo = Arc::new(MemoryTaskRepository::new());
        let history_repo = Arc::new(MemoryHistoryRepository::new());
        let rule_repo = Arc::new(MemoryRuleRepository::new());
        let evaluator = Arc::new(JmespathRuleEvaluator::new());

        let engine = Arc::new(ProcessEngine::new(
            definition_repo.clone(),
            instance_repo.clone(),
            task_repo.clone(),
            history_repo.clone(),
            evaluator.clone(),
        ));
        let definitions = Arc::new(DefinitionService::new(
            definition_repo,
            instance_repo.clone(),
        ));
        let tasks = Arc::new(TaskService::new(task_repo, instance_repo, history_repo));
        let rules = Arc::new(RuleService::new(rule_repo, evaluator));

        Self {
            config,
            engine,
            definitions,
            tasks,
            rules,
        }
    }

    /// Serve HTTP until shutdown is requested
    pub async fn run(self) -> ServerResult<()> {
        let server = Arc::new(self);
        server.clone().spawn_overdue_sweeper();

        let addr = format!("{}:{}", server.config.bind_address, server.config.port);
        let listener = TcpListener::bind(&addr).await?;
        info!(address = %addr, "Clinicflow server listening");

        let router = api::build_router(server);
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Clinicflow server stopped");
        Ok(())
    }

    /// Periodically escalate tasks that blew their deadline
    fn spawn_overdue_sweeper(self: Arc<Self>) {
        let interval = self.config.task_sweep_interval_seconds;
        if interval == 0 {
            warn!("Overdue-task sweeper disabled by configuration");
            return;
        }

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval));
            loop {
                ticker.tick().await;
                match self.tasks.sweep_overdue(Utc::now()).await {
                    Ok(escalated) if !escalated.is_empty() => {
                        info!(count = escalated.len(), "Escalated overdue tasks");
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Overdue sweep failed"),
                }
            }
        });
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
}
