use crate::core::error::TaskError;
use crate::core::workflow::function::{CancelSignal, FunctionRegistry, TaskCall, TaskHandler, TaskOutput};
use crate::core::workflow::resolve;
use conductor_types::{InstanceId, TaskRun};
use futures::FutureExt;
use serde_json::{Map, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;

/// Bounded pool for blocking task functions, shared by every instance.
///
/// Callers queue for a slot; a slot is held until the function returns even
/// if the caller stopped waiting.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    slots: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            slots: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    pub async fn run<F, T>(&self, work: F) -> Result<T, TaskError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| TaskError::Execution("worker pool is closed".to_string()))?;
        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            work()
        });
        match handle.await {
            Ok(value) => Ok(value),
            Err(err) if err.is_panic() => Err(TaskError::Panicked(panic_message(err.into_panic()))),
            Err(err) => Err(TaskError::Execution(format!("worker task aborted: {}", err))),
        }
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Runs one attempt of a task: resolve, bind, invoke, bound by the task timeout.
#[derive(Clone)]
pub struct TaskExecutor {
    functions: FunctionRegistry,
    pool: WorkerPool,
}

impl TaskExecutor {
    pub fn new(functions: FunctionRegistry, pool: WorkerPool) -> Self {
        Self { functions, pool }
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// The timeout covers queueing for a worker slot as well as the call itself.
    pub async fn execute(
        &self,
        run: &TaskRun,
        instance_id: InstanceId,
        context: Arc<Map<String, Value>>,
        cancel: CancelSignal,
    ) -> Result<TaskOutput, TaskError> {
        let (args, kwargs) = resolve::resolve_arguments(&run.args, &run.kwargs, &context)?;
        let handler = self
            .functions
            .get(&run.function)
            .ok_or_else(|| TaskError::UnknownFunction(run.function.clone()))?;

        let call = TaskCall {
            instance_id,
            task_id: run.task_id.clone(),
            task_name: run.name.clone(),
            attempt: run.retry_count + 1,
            args,
            kwargs,
            context,
            cancel,
        };

        let invocation = async move {
            match handler {
                TaskHandler::Async(function) => {
                    match AssertUnwindSafe(function.call(call)).catch_unwind().await {
                        Ok(result) => result.map_err(TaskError::from),
                        Err(payload) => Err(TaskError::Panicked(panic_message(payload))),
                    }
                }
                TaskHandler::Blocking(function) => self
                    .pool
                    .run(move || function.call(call))
                    .await?
                    .map_err(TaskError::from),
            }
        };

        match timeout(Duration::from_millis(run.timeout_ms), invocation).await {
            Ok(result) => result,
            Err(_) => Err(TaskError::Timeout(run.timeout_ms)),
        }
    }
}
