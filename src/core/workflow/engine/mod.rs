//! Execution engine: owns definitions, functions, live runs and the store.

mod run;
mod scheduler;
mod unsaved;

use self::run::RunHandle;
use self::unsaved::UnsavedFinals;
use crate::core::config::ConductorConfig;
use crate::core::error::{EngineError, EngineResult};
use crate::core::workflow::definition::WorkflowDefinition;
use crate::core::workflow::executor::{TaskExecutor, WorkerPool};
use crate::core::workflow::function::FunctionRegistry;
use crate::core::workflow::persistence::Persistence;
use crate::core::workflow::registry::{DefinitionRegistry, DuplicatePolicy};
use crate::core::workflow::resolve;
use crate::core::workflow::retry::RetryPolicy;
use conductor_backend::{InstanceStore, MemoryStore};
use conductor_types::{InstanceFilter, InstanceId, InstanceStatus, WorkflowInstance};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const RECOVERY_PAGE_SIZE: usize = 100;
const UNSAVED_FINALS_CAPACITY: usize = 1024;
const WAIT_POLL_MIN: Duration = Duration::from_millis(5);
const WAIT_POLL_MAX: Duration = Duration::from_millis(200);

pub(crate) struct EngineInner {
    pub(crate) definitions: DefinitionRegistry,
    pub(crate) executor: TaskExecutor,
    pub(crate) persistence: Persistence,
    pub(crate) retry: RetryPolicy,
    pub(crate) default_timeout: Duration,
    pub(crate) runs: DashMap<InstanceId, Arc<RunHandle>>,
    pub(crate) unsaved: UnsavedFinals,
}

/// Handle to a workflow engine. Clones share the same state.
///
/// Engines are independent: two engines in one process never see each
/// other's definitions or instances unless they share a store.
#[derive(Clone)]
pub struct Engine {
    pub(crate) inner: Arc<EngineInner>,
}

/// Configures an [`Engine`] before any definition is registered.
pub struct EngineBuilder {
    functions: FunctionRegistry,
    store: Option<Arc<dyn InstanceStore>>,
    retry: RetryPolicy,
    worker_pool_size: usize,
    default_task_timeout: Duration,
    duplicate_policy: DuplicatePolicy,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        let defaults = ConductorConfig::default();
        Self {
            functions: FunctionRegistry::with_builtins(),
            store: None,
            retry: RetryPolicy::from(&defaults.retry),
            worker_pool_size: defaults.engine.worker_pool_size,
            default_task_timeout: defaults.engine.default_task_timeout(),
            duplicate_policy: defaults.engine.duplicate_definitions,
        }
    }
}

impl EngineBuilder {
    /// Replace the function registry. Defaults to the built-ins.
    pub fn functions(mut self, functions: FunctionRegistry) -> Self {
        self.functions = functions;
        self
    }

    /// Use this store instead of a fresh in-memory one.
    pub fn store(mut self, store: Arc<dyn InstanceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Apply the engine and retry sections of a loaded configuration.
    pub fn config(mut self, config: &ConductorConfig) -> Self {
        self.retry = RetryPolicy::from(&config.retry);
        self.worker_pool_size = config.engine.worker_pool_size;
        self.default_task_timeout = config.engine.default_task_timeout();
        self.duplicate_policy = config.engine.duplicate_definitions;
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn worker_pool_size(mut self, size: usize) -> Self {
        self.worker_pool_size = size;
        self
    }

    pub fn default_task_timeout(mut self, timeout: Duration) -> Self {
        self.default_task_timeout = timeout;
        self
    }

    pub fn duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    pub fn build(self) -> Engine {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn InstanceStore>);
        let executor = TaskExecutor::new(self.functions, WorkerPool::new(self.worker_pool_size));
        tracing::debug!(
            backend = store.name(),
            worker_pool_size = executor.pool().size(),
            "engine created"
        );
        Engine {
            inner: Arc::new(EngineInner {
                definitions: DefinitionRegistry::new(self.duplicate_policy),
                executor,
                persistence: Persistence::new(store),
                retry: self.retry,
                default_timeout: self.default_task_timeout,
                runs: DashMap::new(),
                unsaved: UnsavedFinals::new(UNSAVED_FINALS_CAPACITY),
            }),
        }
    }
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Build an engine from configuration, opening the configured store.
    pub async fn from_config(config: &ConductorConfig, functions: FunctionRegistry) -> Engine {
        let store = conductor_backend::open_store(&config.persistence).await;
        Engine::builder()
            .config(config)
            .functions(functions)
            .store(store)
            .build()
    }

    pub fn backend_name(&self) -> &'static str {
        self.inner.persistence.backend_name()
    }

    pub fn functions(&self) -> &FunctionRegistry {
        self.inner.executor.functions()
    }

    pub fn register_definition(&self, definition: WorkflowDefinition) -> EngineResult<()> {
        self.inner
            .definitions
            .register(definition, self.inner.executor.functions())
    }

    pub fn definition(&self, name: &str) -> EngineResult<Arc<WorkflowDefinition>> {
        self.inner.definitions.get(name)
    }

    pub fn definition_names(&self) -> Vec<String> {
        self.inner.definitions.names()
    }

    /// Create an instance of `workflow_name` and start scheduling it.
    ///
    /// Returns as soon as the instance is persisted in `pending`; callers
    /// observe progress through [`Engine::get_instance`].
    pub async fn start(
        &self,
        workflow_name: &str,
        tenant_id: &str,
        user_id: &str,
        parameters: Map<String, Value>,
    ) -> EngineResult<InstanceId> {
        let definition = self.inner.definitions.get(workflow_name)?;
        let context = definition.seed_context(parameters);
        resolve::preflight(&definition, &context)?;

        let tasks = definition.instantiate_tasks(self.inner.default_timeout);
        let instance =
            WorkflowInstance::new(definition.name.as_str(), tenant_id, user_id, context, tasks);
        let instance_id = instance.instance_id;

        self.inner.persistence.store(&instance).await;
        self.launch(instance);
        tracing::info!(
            instance_id = %instance_id,
            workflow = %workflow_name,
            tenant_id = %tenant_id,
            "workflow instance created"
        );
        Ok(instance_id)
    }

    /// Current state of an instance, preferring the live copy over the store.
    pub async fn get_instance(&self, instance_id: &InstanceId) -> Option<WorkflowInstance> {
        if let Some(handle) = self.live(instance_id) {
            return Some(handle.state.lock().await.clone());
        }
        if let Some(instance) = self.flush_unsaved(instance_id).await {
            return Some(instance);
        }
        self.inner.persistence.get(instance_id).await
    }

    /// Stored instances matching the filter, newest first, with live state overlaid.
    pub async fn list_instances(&self, filter: &InstanceFilter) -> Vec<WorkflowInstance> {
        let mut instances = self.inner.persistence.list(filter).await;
        for instance in instances.iter_mut() {
            if let Some(handle) = self.live(&instance.instance_id) {
                *instance = handle.state.lock().await.clone();
            } else if let Some(unsaved) = self.flush_unsaved(&instance.instance_id).await {
                *instance = unsaved;
            }
        }
        instances
    }

    /// Cancel a non-terminal instance. Returns `false` for unknown or finished instances.
    pub async fn cancel(&self, instance_id: &InstanceId) -> bool {
        if let Some(handle) = self.live(instance_id) {
            let mut state = handle.state.lock().await;
            if !state.finish(InstanceStatus::Cancelled, None) {
                return false;
            }
            self.inner.persistence.update(&state).await;
            drop(state);
            handle.signal_cancel();
            handle.wake.notify_one();
            tracing::info!(instance_id = %instance_id, "instance cancelled");
            return true;
        }

        if self.flush_unsaved(instance_id).await.is_some() {
            return false;
        }
        let Some(mut stored) = self.inner.persistence.get(instance_id).await else {
            return false;
        };
        if !stored.finish(InstanceStatus::Cancelled, None) {
            return false;
        }
        self.inner.persistence.update(&stored).await;
        tracing::info!(instance_id = %instance_id, "stored instance cancelled");
        true
    }

    /// Stop launching new tasks. Only valid from `running`.
    pub async fn pause(&self, instance_id: &InstanceId) -> bool {
        if let Some(handle) = self.live(instance_id) {
            let mut state = handle.state.lock().await;
            if !state.pause() {
                return false;
            }
            self.inner.persistence.update(&state).await;
            drop(state);
            handle.wake.notify_one();
            tracing::info!(instance_id = %instance_id, "instance paused");
            return true;
        }

        if self.flush_unsaved(instance_id).await.is_some() {
            return false;
        }
        let Some(mut stored) = self.inner.persistence.get(instance_id).await else {
            return false;
        };
        if !stored.pause() {
            return false;
        }
        self.inner.persistence.update(&stored).await
    }

    /// Continue a paused instance, starting a fresh loop when none is alive.
    pub async fn resume(&self, instance_id: &InstanceId) -> bool {
        if let Some(handle) = self.live(instance_id) {
            let mut state = handle.state.lock().await;
            if !state.resume() {
                return false;
            }
            self.inner.persistence.update(&state).await;
            drop(state);
            handle.wake.notify_one();
            tracing::info!(instance_id = %instance_id, "instance resumed");
            return true;
        }

        if self.flush_unsaved(instance_id).await.is_some() {
            return false;
        }
        let Some(mut stored) = self.inner.persistence.get(instance_id).await else {
            return false;
        };
        if !stored.resume() {
            return false;
        }
        self.inner.persistence.update(&stored).await;
        let launched = self.launch(stored);
        tracing::info!(instance_id = %instance_id, launched, "stored instance resumed");
        true
    }

    /// Start loops for stored `running`/`pending` instances that have none.
    /// Returns how many were started.
    pub async fn recover(&self) -> usize {
        let mut orphans = Vec::new();
        for status in [InstanceStatus::Running, InstanceStatus::Pending] {
            let mut offset = 0;
            loop {
                let filter = InstanceFilter::default()
                    .with_status(status)
                    .page(RECOVERY_PAGE_SIZE, offset);
                let page = self.inner.persistence.list(&filter).await;
                let fetched = page.len();
                orphans.extend(page.into_iter().filter(|instance| {
                    !self.inner.runs.contains_key(&instance.instance_id)
                        && !self.inner.unsaved.contains(&instance.instance_id)
                }));
                if fetched < RECOVERY_PAGE_SIZE {
                    break;
                }
                offset += fetched;
            }
        }

        let mut recovered = 0;
        for instance in orphans {
            let instance_id = instance.instance_id;
            if self.launch(instance) {
                tracing::info!(instance_id = %instance_id, "recovered orphaned instance");
                recovered += 1;
            }
        }
        recovered
    }

    /// Poll until the instance is terminal, backing off between reads.
    pub async fn wait_for_terminal(
        &self,
        instance_id: &InstanceId,
        timeout: Duration,
    ) -> EngineResult<WorkflowInstance> {
        let deadline = Instant::now() + timeout;
        let mut delay = WAIT_POLL_MIN;
        loop {
            match self.get_instance(instance_id).await {
                Some(instance) if instance.is_terminal() => return Ok(instance),
                Some(_) => {}
                None => return Err(EngineError::InstanceNotFound(*instance_id)),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(EngineError::WaitTimeout {
                    instance_id: *instance_id,
                    waited: timeout,
                });
            }
            tokio::time::sleep(delay.min(deadline - now)).await;
            delay = (delay * 2).min(WAIT_POLL_MAX);
        }
    }

    /// Stop every live loop without touching persisted state.
    pub async fn shutdown(&self) {
        let handles: Vec<Arc<RunHandle>> = self
            .inner
            .runs
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for handle in &handles {
            handle.request_shutdown();
        }
        for handle in handles {
            if let Some(join) = handle.take_join() {
                if let Err(err) = join.await {
                    tracing::warn!(instance_id = %handle.instance_id, error = %err, "scheduling loop ended abnormally");
                }
            }
        }
        tracing::info!("engine shut down");
    }

    /// Finished instances whose final state is only held in memory.
    pub fn unsaved_instances(&self) -> usize {
        self.inner.unsaved.len()
    }

    /// Number of instances with a scheduling loop in this process.
    pub fn live_instances(&self) -> usize {
        self.inner.runs.len()
    }

    async fn flush_unsaved(&self, instance_id: &InstanceId) -> Option<WorkflowInstance> {
        self.inner
            .unsaved
            .flush(instance_id, &self.inner.persistence)
            .await
    }

    fn live(&self, instance_id: &InstanceId) -> Option<Arc<RunHandle>> {
        self.inner
            .runs
            .get(instance_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Spawn a loop for the instance unless one is already registered.
    fn launch(&self, instance: WorkflowInstance) -> bool {
        let handle = Arc::new(RunHandle::new(instance));
        match self.inner.runs.entry(handle.instance_id) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&handle));
            }
        }
        let join = tokio::spawn(scheduler::drive(self.clone(), Arc::clone(&handle)));
        handle.set_join(join);
        true
    }
}
