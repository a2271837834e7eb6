//! Workflow definitions, task execution and the scheduling engine.

pub mod builtins;
pub mod definition;
pub mod engine;
pub mod executor;
pub mod function;
pub mod graph;
pub mod persistence;
pub mod registry;
pub mod resolve;
pub mod retry;
pub mod schema;

pub use definition::{TaskTemplate, WorkflowDefinition};
pub use engine::{Engine, EngineBuilder};
pub use executor::{TaskExecutor, WorkerPool};
pub use function::{
    BlockingTaskFunction, CancelSignal, FunctionRegistry, FunctionRegistryBuilder, TaskCall,
    TaskFunction, TaskOutput,
};
pub use graph::DependencyGraph;
pub use persistence::Persistence;
pub use registry::{DefinitionRegistry, DuplicatePolicy};
pub use retry::RetryPolicy;
pub use schema::WorkflowDocument;
