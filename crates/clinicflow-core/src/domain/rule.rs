use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Value object: Rule ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleId(pub String);

impl RuleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RuleId {
    fn default() -> Self {
        Self::new()
    }
}

/// A named, reusable boolean expression over instance variables
///
/// Rules are pure: evaluating one reads variables and nothing else. Edge
/// guards may embed the same expression language inline; a stored rule just
/// gives the expression a name and a place to test it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessRule {
    /// ID of the rule
    pub id: RuleId,

    /// Unique display name
    pub name: String,

    /// Optional free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// The guard expression
    pub expression: String,

    /// Timestamp when the rule was created
    pub created_at: DateTime<Utc>,

    /// Timestamp when the rule was last updated
    pub updated_at: DateTime<Utc>,
}

impl BusinessRule {
    pub fn new(name: String, description: Option<String>, expression: String) -> Self {
        let now = Utc::now();
        Self {
            id: RuleId::new(),
            name,
            description,
            expression,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the expression, keeping the identity
    pub fn update_expression(&mut self, expression: String) {
        self.expression = expression;
        self.updated_at = Utc::now();
    }
}
