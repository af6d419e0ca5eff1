use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The variable context carried by a process instance
///
/// This is a wrapper around a JSON object with helper methods for
/// reading and merging variables. Non-object values are rejected at
/// the API boundary, so the inner value is always a JSON object.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Variables(pub Map<String, Value>);

impl Variables {
    /// Create an empty variable map
    #[inline]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Create a variable map from a JSON value, rejecting non-objects
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            Value::Null => Some(Self::new()),
            _ => None,
        }
    }

    /// Get a variable by name
    #[inline]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Set a variable, replacing any previous value
    #[inline]
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    /// Merge another variable map into this one; later values win
    pub fn merge(&mut self, other: &Variables) {
        for (name, value) in &other.0 {
            self.0.insert(name.clone(), value.clone());
        }
    }

    /// Number of variables
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// View the variables as a JSON object value
    #[inline]
    pub fn as_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<Map<String, Value>> for Variables {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// JSON truthiness used by guard and rule evaluation
///
/// null, false, empty string, empty array and empty object are falsy;
/// everything else (including 0) is truthy, matching JMESPath semantics.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Number(_) => true,
    }
}
