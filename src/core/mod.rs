pub mod config;
pub mod error;
pub mod workflow;

pub use config::{ConductorConfig, ConfigLoader, ConfigValidator};
pub use error::{EngineError, EngineResult, TaskError};
pub use workflow::{Engine, FunctionRegistry, TaskTemplate, WorkflowDefinition};
