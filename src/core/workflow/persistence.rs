//! Soft-failing facade over the configured instance store.

use conductor_backend::InstanceStore;
use conductor_types::{InstanceFilter, InstanceId, WorkflowInstance};
use std::sync::Arc;

/// Wraps an [`InstanceStore`] so backend errors become warnings.
///
/// Every method reports failure through its return value; callers keep
/// running without durability when the backend is down.
#[derive(Clone)]
pub struct Persistence {
    store: Arc<dyn InstanceStore>,
}

impl Persistence {
    pub fn new(store: Arc<dyn InstanceStore>) -> Self {
        Self { store }
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.name()
    }

    pub fn store_handle(&self) -> Arc<dyn InstanceStore> {
        Arc::clone(&self.store)
    }

    pub async fn store(&self, instance: &WorkflowInstance) -> bool {
        match self.store.store(instance).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    instance_id = %instance.instance_id,
                    backend = self.store.name(),
                    code = err.code(),
                    error = %err,
                    "failed to persist new instance"
                );
                false
            }
        }
    }

    pub async fn update(&self, instance: &WorkflowInstance) -> bool {
        match self.store.update(instance).await {
            Ok(true) => true,
            Ok(false) => {
                tracing::warn!(
                    instance_id = %instance.instance_id,
                    backend = self.store.name(),
                    "instance document missing from store, update skipped"
                );
                false
            }
            Err(err) => {
                tracing::warn!(
                    instance_id = %instance.instance_id,
                    backend = self.store.name(),
                    status = %instance.status,
                    code = err.code(),
                    error = %err,
                    "failed to persist instance update"
                );
                false
            }
        }
    }

    pub async fn get(&self, instance_id: &InstanceId) -> Option<WorkflowInstance> {
        match self.store.get(instance_id).await {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!(
                    instance_id = %instance_id,
                    backend = self.store.name(),
                    code = err.code(),
                    error = %err,
                    "failed to load instance"
                );
                None
            }
        }
    }

    pub async fn list(&self, filter: &InstanceFilter) -> Vec<WorkflowInstance> {
        match self.store.list(filter).await {
            Ok(instances) => instances,
            Err(err) => {
                tracing::warn!(
                    backend = self.store.name(),
                    code = err.code(),
                    error = %err,
                    "failed to list instances"
                );
                Vec::new()
            }
        }
    }
}
