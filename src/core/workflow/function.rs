//! Task functions bound by string key.

use async_trait::async_trait;
use conductor_types::InstanceId;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// Read side of an instance's cancellation flag.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    receiver: watch::Receiver<bool>,
    /// Keeps a detached signal's channel open so it never reports closure.
    _sender: Option<Arc<watch::Sender<bool>>>,
}

impl CancelSignal {
    pub(crate) fn new(receiver: watch::Receiver<bool>) -> Self {
        Self {
            receiver,
            _sender: None,
        }
    }

    /// Signal that never fires, for calling functions outside an engine.
    pub fn never() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            receiver,
            _sender: Some(Arc::new(sender)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once the instance is cancelled or its run is dropped.
    pub async fn cancelled(&mut self) {
        if self.receiver.wait_for(|flag| *flag).await.is_err() {
            tracing::debug!("cancellation source dropped before firing");
        }
    }
}

/// Everything a task function receives for one attempt.
#[derive(Debug, Clone)]
pub struct TaskCall {
    pub instance_id: InstanceId,
    pub task_id: String,
    pub task_name: String,
    /// 1-based attempt number.
    pub attempt: u32,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
    /// Read-only snapshot taken when the attempt launched.
    pub context: Arc<Map<String, Value>>,
    pub cancel: CancelSignal,
}

impl TaskCall {
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    pub fn kwarg(&self, key: &str) -> Option<&Value> {
        self.kwargs.get(key)
    }

    pub fn context_value(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }
}

/// Result value plus context keys to write back into the instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskOutput {
    pub value: Value,
    pub context_updates: Map<String, Value>,
}

impl TaskOutput {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            context_updates: Map::new(),
        }
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context_updates.insert(key.into(), value.into());
        self
    }
}

impl From<Value> for TaskOutput {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

/// Function awaited on the scheduler runtime.
#[async_trait]
pub trait TaskFunction: Send + Sync + 'static {
    async fn call(&self, call: TaskCall) -> anyhow::Result<TaskOutput>;
}

/// Synchronous function dispatched to the bounded worker pool.
pub trait BlockingTaskFunction: Send + Sync + 'static {
    fn call(&self, call: TaskCall) -> anyhow::Result<TaskOutput>;
}

struct AsyncFn<F>(F);

#[async_trait]
impl<F, Fut> TaskFunction for AsyncFn<F>
where
    F: Fn(TaskCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<TaskOutput>> + Send + 'static,
{
    async fn call(&self, call: TaskCall) -> anyhow::Result<TaskOutput> {
        (self.0)(call).await
    }
}

struct BlockingFn<F>(F);

impl<F> BlockingTaskFunction for BlockingFn<F>
where
    F: Fn(TaskCall) -> anyhow::Result<TaskOutput> + Send + Sync + 'static,
{
    fn call(&self, call: TaskCall) -> anyhow::Result<TaskOutput> {
        (self.0)(call)
    }
}

#[derive(Clone)]
pub enum TaskHandler {
    Async(Arc<dyn TaskFunction>),
    Blocking(Arc<dyn BlockingTaskFunction>),
}

impl TaskHandler {
    pub fn is_blocking(&self) -> bool {
        matches!(self, TaskHandler::Blocking(_))
    }
}

/// Builder used to register task functions before the engine starts.
pub struct FunctionRegistryBuilder {
    functions: HashMap<String, TaskHandler>,
}

impl Default for FunctionRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionRegistryBuilder {
    pub fn new() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    fn insert(&mut self, key: String, handler: TaskHandler) -> &mut Self {
        if self.functions.contains_key(&key) {
            panic!("duplicate task function registered: {}", key);
        }
        self.functions.insert(key, handler);
        self
    }

    pub fn register_async<T: TaskFunction>(&mut self, key: impl Into<String>, function: T) -> &mut Self {
        self.insert(key.into(), TaskHandler::Async(Arc::new(function)))
    }

    pub fn register_blocking<T: BlockingTaskFunction>(
        &mut self,
        key: impl Into<String>,
        function: T,
    ) -> &mut Self {
        self.insert(key.into(), TaskHandler::Blocking(Arc::new(function)))
    }

    pub fn async_fn<F, Fut>(&mut self, key: impl Into<String>, function: F) -> &mut Self
    where
        F: Fn(TaskCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<TaskOutput>> + Send + 'static,
    {
        self.register_async(key, AsyncFn(function))
    }

    pub fn blocking_fn<F>(&mut self, key: impl Into<String>, function: F) -> &mut Self
    where
        F: Fn(TaskCall) -> anyhow::Result<TaskOutput> + Send + Sync + 'static,
    {
        self.register_blocking(key, BlockingFn(function))
    }

    pub fn build(self) -> FunctionRegistry {
        FunctionRegistry {
            inner: Arc::new(self.functions),
        }
    }
}

/// Immutable key to function map owned by one engine.
#[derive(Clone)]
pub struct FunctionRegistry {
    inner: Arc<HashMap<String, TaskHandler>>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionRegistry {
    pub fn new() -> Self {
        FunctionRegistryBuilder::new().build()
    }

    pub fn builder() -> FunctionRegistryBuilder {
        FunctionRegistryBuilder::new()
    }

    /// Registry holding only the built-in functions.
    pub fn with_builtins() -> Self {
        let mut builder = Self::builder();
        super::builtins::register_builtins(&mut builder);
        builder.build()
    }

    pub fn get(&self, key: &str) -> Option<TaskHandler> {
        self.inner.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.keys().cloned().collect();
        keys.sort();
        keys
    }
}
