//! In-memory instance store for development and tests.

use crate::{BackendError, BackendResult, InstanceStore};
use async_trait::async_trait;
use conductor_types::{InstanceFilter, InstanceId, WorkflowInstance};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    instances: Arc<DashMap<InstanceId, WorkflowInstance>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[async_trait]
impl InstanceStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn store(&self, instance: &WorkflowInstance) -> BackendResult<()> {
        match self.instances.entry(instance.instance_id) {
            Entry::Occupied(_) => Err(BackendError::Conflict(format!(
                "instance {} already stored",
                instance.instance_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(instance.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, instance_id: &InstanceId) -> BackendResult<Option<WorkflowInstance>> {
        Ok(self.instances.get(instance_id).map(|entry| entry.value().clone()))
    }

    async fn update(&self, instance: &WorkflowInstance) -> BackendResult<bool> {
        match self.instances.get_mut(&instance.instance_id) {
            Some(mut entry) => {
                *entry = instance.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list(&self, filter: &InstanceFilter) -> BackendResult<Vec<WorkflowInstance>> {
        let mut matched: Vec<WorkflowInstance> = self
            .instances
            .iter()
            .filter(|entry| filter.matches(&entry.tenant_id, entry.status))
            .map(|entry| entry.value().clone())
            .collect();

        // Newest first, ties broken by id like the sqlite store
        matched.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.instance_id.cmp(&a.instance_id))
        });

        Ok(matched
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .collect())
    }
}
