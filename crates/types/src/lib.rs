//! Shared record types for conductor workflow instances.
//!
//! These types are the persisted shape of a workflow run. They carry no executable
//! state: task functions are referenced by key and re-bound by the engine on reload.

pub mod filter;
pub mod instance;
pub mod status;

pub use filter::InstanceFilter;
pub use instance::{InstanceId, TaskRun, WorkflowInstance};
pub use status::{InstanceStatus, ParseStatusError, TaskStatus};
