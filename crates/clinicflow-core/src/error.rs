use thiserror::Error;

/// Core error type for the Clinicflow orchestration engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Process definition not found
    #[error("Process definition not found: {0}")]
    DefinitionNotFound(String),

    /// Process instance not found
    #[error("Process instance not found: {0}")]
    InstanceNotFound(String),

    /// Human task not found
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Business rule not found
    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    /// Structural validation error, raised at activation and never at runtime
    #[error("Validation error: {0}")]
    Validation(String),

    /// State-conflicting operation, rejected with no state change
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Unrecoverable runtime error that moves an instance to `Faulted`
    #[error("Execution fault: {0}")]
    Fault(String),

    /// Expression compilation or evaluation error
    #[error("Expression error: {0}")]
    Expression(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// State store error
    #[error("State store error: {0}")]
    StateStore(String),

    /// BPMN document error
    #[error("BPMN error: {0}")]
    Bpmn(String),

    /// Input/output error
    #[error("Input/output error: {0}")]
    Io(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io(err.to_string())
    }
}
