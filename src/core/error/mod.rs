use conductor_types::InstanceId;
use std::time::Duration;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Engine-level failures surfaced to callers or recorded on a failed instance.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("workflow definition '{0}' not found")]
    DefinitionNotFound(String),

    #[error("workflow definition '{0}' is already registered")]
    DuplicateDefinition(String),

    #[error("invalid workflow definition '{name}': {reason}")]
    InvalidDefinition { name: String, reason: String },

    #[error("task '{task}' references '${reference}' which no context key or dependency provides")]
    UnresolvedReference { task: String, reference: String },

    #[error("circular dependency detected among tasks: {}", .tasks.join(" -> "))]
    CircularDependency { tasks: Vec<String> },

    #[error("task '{task}' depends on unknown task '{dependency}'")]
    InvalidDependency { task: String, dependency: String },

    #[error("workflow instance {0} not found")]
    InstanceNotFound(InstanceId),

    #[error("instance {instance_id} did not finish within {}", format_wait(.waited))]
    WaitTimeout {
        instance_id: InstanceId,
        waited: Duration,
    },
}

fn format_wait(waited: &Duration) -> String {
    humantime::format_duration(*waited).to_string()
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::DefinitionNotFound(_) => "WFE-DEF-001",
            EngineError::DuplicateDefinition(_) => "WFE-DEF-002",
            EngineError::InvalidDefinition { .. } => "WFE-DEF-003",
            EngineError::UnresolvedReference { .. } => "WFE-REF-001",
            EngineError::CircularDependency { .. } => "WFE-GRAPH-001",
            EngineError::InvalidDependency { .. } => "WFE-GRAPH-002",
            EngineError::InstanceNotFound(_) => "WFE-INST-001",
            EngineError::WaitTimeout { .. } => "WFE-INST-002",
        }
    }

    pub(crate) fn invalid_definition(name: &str, reason: impl Into<String>) -> Self {
        EngineError::InvalidDefinition {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failure of one task attempt. Every variant counts against the retry budget.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TaskError {
    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error("{0}")]
    Execution(String),

    #[error("unresolved reference '${0}'")]
    UnresolvedReference(String),

    #[error("function '{0}' is not registered")]
    UnknownFunction(String),

    #[error("task function panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    pub fn code(&self) -> &'static str {
        match self {
            TaskError::Timeout(_) => "WFE-TASK-001",
            TaskError::Execution(_) => "WFE-TASK-002",
            TaskError::UnresolvedReference(_) => "WFE-TASK-003",
            TaskError::UnknownFunction(_) => "WFE-TASK-004",
            TaskError::Panicked(_) => "WFE-TASK-005",
        }
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        TaskError::Execution(format!("{:#}", err))
    }
}
