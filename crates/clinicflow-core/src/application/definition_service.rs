//! Process definition store
//!
//! Versioning is per process name: each create appends a new draft version
//! numbered max(existing) + 1. Activation freezes a version behind the
//! structural validator; running instances stay pinned to the version they
//! started on no matter what is published later.

use std::sync::Arc;

use tracing::{debug, info};

use crate::bpmn;
use crate::domain::definition::{DefinitionId, ProcessDefinition};
use crate::domain::graph::{ProcessGraph, Violation};
use crate::domain::repository::{DefinitionRepository, InstanceRepository};
use crate::error::EngineError;

/// Application service for managing process definitions
pub struct DefinitionService {
    definitions: Arc<dyn DefinitionRepository>,
    instances: Arc<dyn InstanceRepository>,
}

impl DefinitionService {
    pub fn new(
        definitions: Arc<dyn DefinitionRepository>,
        instances: Arc<dyn InstanceRepository>,
    ) -> Self {
        Self {
            definitions,
            instances,
        }
    }

    /// Create a new draft version of the named process
    pub async fn create_definition(
        &self,
        name: String,
        description: Option<String>,
        graph: ProcessGraph,
    ) -> Result<ProcessDefinition, EngineError> {
        let version = self.definitions.next_version(&name).await?;
        let definition = ProcessDefinition::new(name, version, description, graph);
        self.definitions.save(&definition).await?;
        info!(
            definition_id = %definition.id.0,
            definition_name = %definition.name,
            version = definition.version,
            "Created draft definition"
        );
        Ok(definition)
    }

    pub async fn get_definition(
        &self,
        id: &DefinitionId,
    ) -> Result<ProcessDefinition, EngineError> {
        self.definitions
            .find_by_id(id)
            .await?
            .ok_or_else(|| EngineError::DefinitionNotFound(id.0.clone()))
    }

    /// All versions of all processes, sorted by name then version
    pub async fn list_definitions(&self) -> Result<Vec<ProcessDefinition>, EngineError> {
        self.definitions.find_all().await
    }

    /// One specific version of a named process
    pub async fn get_version(
        &self,
        name: &str,
        version: u32,
    ) -> Result<ProcessDefinition, EngineError> {
        self.definitions
            .find_all()
            .await?
            .into_iter()
            .find(|d| d.name == name && d.version == version)
            .ok_or_else(|| {
                EngineError::DefinitionNotFound(format!("{} version {}", name, version))
            })
    }

    /// Every stored version of a named process, oldest first
    pub async fn list_versions(
        &self,
        name: &str,
    ) -> Result<Vec<ProcessDefinition>, EngineError> {
        let mut versions: Vec<_> = self
            .definitions
            .find_all()
            .await?
            .into_iter()
            .filter(|d| d.name == name)
            .collect();
        versions.sort_by_key(|d| d.version);
        Ok(versions)
    }

    /// Structural violations of a definition's current graph
    pub async fn validate_definition(
        &self,
        id: &DefinitionId,
    ) -> Result<Vec<Violation>, EngineError> {
        let definition = self.get_definition(id).await?;
        Ok(definition.graph.validate())
    }

    /// Replace a draft's graph
    pub async fn update_graph(
        &self,
        id: &DefinitionId,
        graph: ProcessGraph,
    ) -> Result<ProcessDefinition, EngineError> {
        let mut definition = self.get_definition(id).await?;
        definition.update_graph(graph)?;
        self.definitions.save(&definition).await?;
        Ok(definition)
    }

    /// Validate and publish a version
    pub async fn activate(&self, id: &DefinitionId) -> Result<ProcessDefinition, EngineError> {
        let mut definition = self.get_definition(id).await?;
        definition.activate()?;
        self.definitions.save(&definition).await?;
        info!(
            definition_id = %id.0,
            definition_name = %definition.name,
            version = definition.version,
            "Definition activated"
        );
        Ok(definition)
    }

    /// Retire a version; running instances keep executing it
    pub async fn deactivate(&self, id: &DefinitionId) -> Result<ProcessDefinition, EngineError> {
        let mut definition = self.get_definition(id).await?;
        definition.deactivate()?;
        self.definitions.save(&definition).await?;
        info!(definition_id = %id.0, "Definition deactivated");
        Ok(definition)
    }

    /// Delete a version, refused while live instances are pinned to it
    pub async fn delete_definition(&self, id: &DefinitionId) -> Result<(), EngineError> {
        self.get_definition(id).await?;
        let live = self.instances.count_live_for_definition(id).await?;
        if live > 0 {
            return Err(EngineError::Conflict(format!(
                "Definition {} has {} live instances",
                id.0, live
            )));
        }
        self.definitions.delete(id).await?;
        info!(definition_id = %id.0, "Definition deleted");
        Ok(())
    }

    /// Import a BPMN document as a new draft version
    ///
    /// The process element's id becomes the definition name, so repeated
    /// imports of the same document stack up as versions.
    pub async fn import_bpmn(&self, xml: &str) -> Result<ProcessDefinition, EngineError> {
        let process = bpmn::parse(xml)?;
        debug!(
            process_id = %process.id,
            nodes = process.graph.nodes.len(),
            edges = process.graph.edges.len(),
            "Parsed BPMN document"
        );
        self.create_definition(process.id, process.name, process.graph)
            .await
    }

    /// Export a definition's graph as a BPMN document
    pub async fn export_bpmn(&self, id: &DefinitionId) -> Result<String, EngineError> {
        let definition = self.get_definition(id).await?;
        Ok(bpmn::render(&definition))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::definition::DefinitionStatus;
    use crate::domain::graph::{AssigneeRule, Edge, EdgeId, Node, NodeId, NodeKind};
    use crate::domain::instance::ProcessInstance;
    use crate::domain::repository::memory::{
        MemoryDefinitionRepository, MemoryInstanceRepository,
    };
    use crate::types::Variables;

    struct Fixture {
        service: DefinitionService,
        instances: Arc<MemoryInstanceRepository>,
    }

    fn fixture() -> Fixture {
        let definitions = Arc::new(MemoryDefinitionRepository::new());
        let instances = Arc::new(MemoryInstanceRepository::new());
        Fixture {
            service: DefinitionService::new(definitions, instances.clone()),
            instances,
        }
    }

    fn valid_graph() -> ProcessGraph {
        ProcessGraph {
            nodes: vec![
                Node {
                    id: NodeId("start".to_string()),
                    name: "Start".to_string(),
                    kind: NodeKind::Start,
                },
                Node {
                    id: NodeId("review".to_string()),
                    name: "Review".to_string(),
                    kind: NodeKind::Task {
                        assignee: AssigneeRule::Group("staff".to_string()),
                        priority: 0,
                        due_in_minutes: None,
                    },
                },
                Node {
                    id: NodeId("end".to_string()),
                    name: "End".to_string(),
                    kind: NodeKind::End,
                },
            ],
            edges: vec![
                Edge {
                    id: EdgeId("e1".to_string()),
                    from: NodeId("start".to_string()),
                    to: NodeId("review".to_string()),
                    guard: None,
                },
                Edge {
                    id: EdgeId("e2".to_string()),
                    from: NodeId("review".to_string()),
                    to: NodeId("end".to_string()),
                    guard: None,
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_versions_stack_per_name() {
        let f = fixture();
        let v1 = f
            .service
            .create_definition("intake".to_string(), None, valid_graph())
            .await
            .unwrap();
        let v2 = f
            .service
            .create_definition("intake".to_string(), None, valid_graph())
            .await
            .unwrap();
        let other = f
            .service
            .create_definition("discharge".to_string(), None, valid_graph())
            .await
            .unwrap();

        assert_eq!(v1.version, 1);
        assert_eq!(v2.version, 2);
        assert_eq!(other.version, 1);
        assert_ne!(v1.id, v2.id);

        let fetched = f.service.get_version("intake", 2).await.unwrap();
        assert_eq!(fetched.id, v2.id);
        assert!(matches!(
            f.service.get_version("intake", 9).await.unwrap_err(),
            EngineError::DefinitionNotFound(_)
        ));

        let versions = f.service.list_versions("intake").await.unwrap();
        assert_eq!(
            versions.iter().map(|d| d.version).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[tokio::test]
    async fn test_activate_lifecycle() {
        let f = fixture();
        let def = f
            .service
            .create_definition("intake".to_string(), None, valid_graph())
            .await
            .unwrap();

        let active = f.service.activate(&def.id).await.unwrap();
        assert_eq!(active.status, DefinitionStatus::Active);

        let inactive = f.service.deactivate(&def.id).await.unwrap();
        assert_eq!(inactive.status, DefinitionStatus::Inactive);
    }

    #[tokio::test]
    async fn test_activate_invalid_graph_rejected() {
        let f = fixture();
        let graph = ProcessGraph {
            nodes: vec![Node {
                id: NodeId("end".to_string()),
                name: "End".to_string(),
                kind: NodeKind::End,
            }],
            edges: vec![],
        };
        let def = f
            .service
            .create_definition("broken".to_string(), None, graph)
            .await
            .unwrap();

        let err = f.service.activate(&def.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let violations = f.service.validate_definition(&def.id).await.unwrap();
        assert!(!violations.is_empty());
    }

    #[tokio::test]
    async fn test_delete_with_live_instances_conflicts() {
        let f = fixture();
        let def = f
            .service
            .create_definition("intake".to_string(), None, valid_graph())
            .await
            .unwrap();
        let def = f.service.activate(&def.id).await.unwrap();

        let instance = ProcessInstance::start(&def, Variables::new()).unwrap();
        f.instances.save(&instance).await.unwrap();

        let err = f.service.delete_definition(&def.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));

        // finished instances no longer block deletion
        let mut finished = instance;
        finished.terminate(None).unwrap();
        f.instances.save(&finished).await.unwrap();
        f.service.delete_definition(&def.id).await.unwrap();
        assert!(matches!(
            f.service.get_definition(&def.id).await.unwrap_err(),
            EngineError::DefinitionNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_update_graph_on_active_conflicts() {
        let f = fixture();
        let def = f
            .service
            .create_definition("intake".to_string(), None, valid_graph())
            .await
            .unwrap();
        f.service.activate(&def.id).await.unwrap();

        let err = f
            .service
            .update_graph(&def.id, valid_graph())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_import_export_round_trip() {
        let f = fixture();
        let xml = r#"<definitions xmlns="http://www.omg.org/spec/BPMN/20100524/MODEL" id="d">
  <process id="referral" name="Referral">
    <startEvent id="start"/>
    <userTask id="review" name="Review referral" candidateGroups="gps"/>
    <endEvent id="end"/>
    <sequenceFlow id="f1" sourceRef="start" targetRef="review"/>
    <sequenceFlow id="f2" sourceRef="review" targetRef="end"/>
  </process>
</definitions>"#;

        let imported = f.service.import_bpmn(xml).await.unwrap();
        assert_eq!(imported.name, "referral");
        assert_eq!(imported.version, 1);
        assert_eq!(imported.status, DefinitionStatus::Draft);

        // a second import becomes version 2 of the same process
        let again = f.service.import_bpmn(xml).await.unwrap();
        assert_eq!(again.version, 2);

        let exported = f.service.export_bpmn(&imported.id).await.unwrap();
        let reparsed = crate::bpmn::parse(&exported).unwrap();
        assert_eq!(reparsed.id, "referral");
        assert_eq!(reparsed.graph.edges.len(), 2);
    }
}
