use crate::core::workflow::persistence::Persistence;
use conductor_types::{InstanceId, WorkflowInstance};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Finished instances whose final write never reached the store.
///
/// Bounded: once full, the oldest entry is dropped and only the stale stored
/// copy remains.
pub(crate) struct UnsavedFinals {
    capacity: usize,
    entries: Mutex<VecDeque<WorkflowInstance>>,
}

impl UnsavedFinals {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, VecDeque<WorkflowInstance>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn hold(&self, instance: WorkflowInstance) {
        let mut entries = self.entries();
        entries.retain(|held| held.instance_id != instance.instance_id);
        entries.push_back(instance);
        while entries.len() > self.capacity {
            if let Some(dropped) = entries.pop_front() {
                tracing::warn!(
                    instance_id = %dropped.instance_id,
                    status = %dropped.status,
                    "dropping unsaved final state; the store keeps an older copy"
                );
            }
        }
    }

    pub(crate) fn get(&self, instance_id: &InstanceId) -> Option<WorkflowInstance> {
        self.entries()
            .iter()
            .find(|held| held.instance_id == *instance_id)
            .cloned()
    }

    pub(crate) fn contains(&self, instance_id: &InstanceId) -> bool {
        self.entries()
            .iter()
            .any(|held| held.instance_id == *instance_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries().len()
    }

    fn remove(&self, instance_id: &InstanceId) {
        self.entries()
            .retain(|held| held.instance_id != *instance_id);
    }

    /// Retry the final write for one instance, forgetting it once stored.
    pub(crate) async fn flush(
        &self,
        instance_id: &InstanceId,
        persistence: &Persistence,
    ) -> Option<WorkflowInstance> {
        let instance = self.get(instance_id)?;
        if persistence.update(&instance).await {
            self.remove(instance_id);
            tracing::info!(instance_id = %instance_id, "late write of final state succeeded");
        }
        Some(instance)
    }
}
