use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::graph::ProcessGraph;
use crate::error::EngineError;

/// Value object: Definition ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DefinitionId(pub String);

impl DefinitionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for DefinitionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle status of a process definition version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DefinitionStatus {
    /// Editable, cannot be instantiated
    Draft,
    /// Frozen and instantiable
    Active,
    /// Retired; running instances keep their pinned version
    Inactive,
}

/// Aggregate: one immutable version of a process definition
///
/// Versions of the same logical process share a name; the store assigns
/// version numbers monotonically per name. Once a version leaves draft its
/// graph never changes again, so running instances can pin it safely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessDefinition {
    /// ID of the definition version
    pub id: DefinitionId,

    /// Logical process name shared by all versions
    pub name: String,

    /// Version number, assigned by the store as max(existing) + 1
    pub version: u32,

    /// Optional free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Lifecycle status
    pub status: DefinitionStatus,

    /// The process graph
    pub graph: ProcessGraph,

    /// Timestamp when the definition was created
    pub created_at: DateTime<Utc>,

    /// Timestamp when the definition was last updated
    pub updated_at: DateTime<Utc>,
}

impl ProcessDefinition {
    /// Create a new draft version
    pub fn new(
        name: String,
        version: u32,
        description: Option<String>,
        graph: ProcessGraph,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: DefinitionId::new(),
            name,
            version,
            description,
            status: DefinitionStatus::Draft,
            graph,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == DefinitionStatus::Active
    }

    /// Replace the graph of a draft
    pub fn update_graph(&mut self, graph: ProcessGraph) -> Result<(), EngineError> {
        if self.status != DefinitionStatus::Draft {
            return Err(EngineError::Conflict(format!(
                "Cannot edit definition {} in status: {:?}",
                self.id.0, self.status
            )));
        }
        self.graph = graph;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Transition draft or inactive -> active, validating the graph first
    pub fn activate(&mut self) -> Result<(), EngineError> {
        match self.status {
            DefinitionStatus::Draft | DefinitionStatus::Inactive => {}
            DefinitionStatus::Active => {
                return Err(EngineError::Conflict(format!(
                    "Definition {} is already active",
                    self.id.0
                )))
            }
        }

        let violations = self.graph.validate();
        if !violations.is_empty() {
            let detail = violations
                .iter()
                .map(|v| format!("{}: {}", v.code, v.message))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(EngineError::Validation(detail));
        }

        self.status = DefinitionStatus::Active;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Transition active -> inactive
    pub fn deactivate(&mut self) -> Result<(), EngineError> {
        if self.status != DefinitionStatus::Active {
            return Err(EngineError::Conflict(format!(
                "Cannot deactivate definition {} in status: {:?}",
                self.id.0, self.status
            )));
        }
        self.status = DefinitionStatus::Inactive;
        self.updated_at = Utc::now();
        Ok(())
    }
}
