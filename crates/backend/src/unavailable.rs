use crate::{BackendError, BackendResult, InstanceStore};
use async_trait::async_trait;
use conductor_types::{InstanceFilter, InstanceId, WorkflowInstance};

/// Stand-in for a backend that failed to open. Every call errors.
#[derive(Debug, Clone)]
pub struct UnavailableStore {
    reason: String,
}

impl UnavailableStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn error(&self) -> BackendError {
        BackendError::Unavailable(self.reason.clone())
    }
}

#[async_trait]
impl InstanceStore for UnavailableStore {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    async fn store(&self, _instance: &WorkflowInstance) -> BackendResult<()> {
        Err(self.error())
    }

    async fn get(&self, _instance_id: &InstanceId) -> BackendResult<Option<WorkflowInstance>> {
        Err(self.error())
    }

    async fn update(&self, _instance: &WorkflowInstance) -> BackendResult<bool> {
        Err(self.error())
    }

    async fn list(&self, _filter: &InstanceFilter) -> BackendResult<Vec<WorkflowInstance>> {
        Err(self.error())
    }
}
