//! Per-instance scheduling loop.

use super::run::RunHandle;
use super::Engine;
use crate::core::error::{EngineError, TaskError};
use crate::core::workflow::executor::panic_message;
use crate::core::workflow::function::TaskOutput;
use crate::core::workflow::graph::DependencyGraph;
use conductor_types::{InstanceStatus, TaskStatus, WorkflowInstance};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tracing::Instrument;

enum Event {
    Finished {
        task: String,
        attempt: u32,
        outcome: Result<TaskOutput, TaskError>,
    },
    RetryDue {
        task: String,
    },
}

enum Exit {
    Finished,
    Shutdown,
}

/// Run one attempt, turning a panic anywhere in it into a task failure.
async fn guarded<F>(task: String, attempt: u32, attempt_future: F) -> Event
where
    F: Future<Output = Result<TaskOutput, TaskError>>,
{
    let outcome = match AssertUnwindSafe(attempt_future).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => Err(TaskError::Panicked(panic_message(payload))),
    };
    Event::Finished {
        task,
        attempt,
        outcome,
    }
}

/// Drive one instance until it is terminal or the engine shuts down.
pub(crate) async fn drive(engine: Engine, run: Arc<RunHandle>) {
    let span = tracing::info_span!("instance", instance_id = %run.instance_id);
    async move {
        let mut scheduler = Scheduler {
            engine: engine.clone(),
            run: Arc::clone(&run),
            tasks: JoinSet::new(),
            durable: true,
        };
        let exit = scheduler.run_to_end().await;
        scheduler.tasks.abort_all();

        // A finished run whose last write was lost is parked until a later write lands.
        let unsaved = matches!(exit, Exit::Finished) && !scheduler.durable;
        if unsaved {
            let state = run.state.lock().await.clone();
            engine.inner.unsaved.hold(state);
        }
        engine
            .inner
            .runs
            .remove_if(&run.instance_id, |_, live| Arc::ptr_eq(live, &run));
        tracing::debug!(unsaved, "scheduling loop exited");
    }
    .instrument(span)
    .await
}

struct Scheduler {
    engine: Engine,
    run: Arc<RunHandle>,
    tasks: JoinSet<Event>,
    /// Whether the most recent persistence write succeeded.
    durable: bool,
}

impl Scheduler {
    async fn run_to_end(&mut self) -> Exit {
        if let Some(exit) = self.prepare().await {
            return exit;
        }

        loop {
            if let Some(exit) = self.advance().await {
                return exit;
            }

            let joined = if self.tasks.is_empty() {
                self.run.wake.notified().await;
                None
            } else {
                tokio::select! {
                    joined = self.tasks.join_next() => joined,
                    _ = self.run.wake.notified() => None,
                }
            };

            match joined {
                Some(Ok(event)) => self.apply(event).await,
                Some(Err(err)) if err.is_cancelled() => {}
                Some(Err(err)) => self.crashed(err).await,
                None => {}
            }
        }
    }

    async fn persist(&mut self, instance: &WorkflowInstance) {
        self.durable = self.engine.inner.persistence.update(instance).await;
    }

    /// Validate the graph and rebuild in-memory work from the stored instance.
    async fn prepare(&mut self) -> Option<Exit> {
        let run = Arc::clone(&self.run);
        let mut state = run.state.lock().await;
        if state.is_terminal() {
            return Some(Exit::Finished);
        }

        for task in state.tasks.iter_mut() {
            if task.reset_orphaned() {
                tracing::info!(task = %task.name, "re-running task left in flight");
            }
        }
        if state.status == InstanceStatus::Pending {
            state.mark_running();
        }

        let graph = DependencyGraph::build(
            state
                .tasks
                .iter()
                .map(|task| (task.name.as_str(), task.dependencies.as_slice())),
        );
        if let Err(err) = graph.check() {
            tracing::error!(code = err.code(), error = %err, "instance rejected before any task ran");
            state.finish(InstanceStatus::Failed, Some(err.to_string()));
            self.persist(&state).await;
            return Some(Exit::Finished);
        }

        let pending_retries: Vec<(String, u32)> = state
            .tasks
            .iter()
            .filter(|task| task.is_retryable_failure())
            .map(|task| (task.name.clone(), task.retry_count))
            .collect();
        for (task, retry_count) in pending_retries {
            let delay = self.engine.inner.retry.delay_for(retry_count);
            self.schedule_retry(task, delay);
        }

        self.persist(&state).await;
        tracing::info!(
            workflow = %state.workflow_name,
            tasks = state.tasks.len(),
            status = %state.status,
            "scheduling loop started"
        );
        None
    }

    /// Re-evaluate readiness and launch whatever can run.
    async fn advance(&mut self) -> Option<Exit> {
        let run = Arc::clone(&self.run);
        let mut state = run.state.lock().await;

        if run.is_shutting_down() {
            self.tasks.abort_all();
            return Some(Exit::Shutdown);
        }
        if state.is_terminal() {
            self.tasks.abort_all();
            tracing::info!(status = %state.status, "instance reached a terminal state");
            return Some(Exit::Finished);
        }
        if state.status != InstanceStatus::Running {
            return None;
        }

        if state.all_tasks_completed() {
            state.finish(InstanceStatus::Completed, None);
            self.persist(&state).await;
            tracing::info!("instance completed");
            return Some(Exit::Finished);
        }

        let ready: Vec<usize> = state
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| task.status == TaskStatus::Pending)
            .filter(|(_, task)| {
                task.dependencies.iter().all(|dependency| {
                    state
                        .task(dependency)
                        .is_some_and(|upstream| upstream.status == TaskStatus::Completed)
                })
            })
            .map(|(index, _)| index)
            .collect();

        if ready.is_empty() {
            if self.tasks.is_empty() {
                let stuck: Vec<String> = state
                    .tasks
                    .iter()
                    .filter(|task| task.status != TaskStatus::Completed)
                    .map(|task| task.name.clone())
                    .collect();
                let err = EngineError::CircularDependency { tasks: stuck };
                tracing::error!(code = err.code(), error = %err, "no task can make progress");
                state.finish(InstanceStatus::Failed, Some(err.to_string()));
                self.persist(&state).await;
                return Some(Exit::Finished);
            }
            return None;
        }

        let context = Arc::new(state.context.clone());
        for index in ready {
            let task = &mut state.tasks[index];
            task.mark_running();
            let snapshot = task.clone();
            let attempt = snapshot.retry_count + 1;
            tracing::info!(task = %snapshot.name, attempt, function = %snapshot.function, "task started");

            let engine = self.engine.clone();
            let instance_id = run.instance_id;
            let cancel = run.cancel_signal();
            let context = Arc::clone(&context);
            let task = snapshot.name.clone();
            self.tasks.spawn(guarded(task, attempt, async move {
                engine
                    .inner
                    .executor
                    .execute(&snapshot, instance_id, context, cancel)
                    .await
            }));
        }
        self.persist(&state).await;
        None
    }

    async fn apply(&mut self, event: Event) {
        let run = Arc::clone(&self.run);
        let mut state = run.state.lock().await;
        if state.is_terminal() {
            return;
        }

        match event {
            Event::Finished {
                task,
                attempt,
                outcome: Ok(output),
            } => {
                let Some(output_key) = state.task(&task).map(|record| record.output_key.clone()) else {
                    return;
                };
                if let Some(key) = output_key {
                    state.context.insert(key, output.value.clone());
                }
                state.context.extend(output.context_updates);
                if let Some(record) = state.task_mut(&task) {
                    record.mark_completed(output.value);
                }
                tracing::info!(task = %task, attempt, "task completed");
                self.persist(&state).await;
            }
            Event::Finished {
                task,
                attempt,
                outcome: Err(err),
            } => {
                let Some(record) = state.task_mut(&task) else {
                    return;
                };
                let exhausted = record.mark_failed(err.to_string());
                let retry_count = record.retry_count;

                if exhausted {
                    let message = format!("task '{}' failed: {}", task, err);
                    tracing::error!(
                        task = %task,
                        attempt,
                        code = err.code(),
                        error = %err,
                        "task out of retries, failing instance"
                    );
                    state.finish(InstanceStatus::Failed, Some(message));
                    self.persist(&state).await;
                    self.tasks.abort_all();
                    run.signal_cancel();
                } else {
                    let delay = self.engine.inner.retry.delay_for(retry_count);
                    tracing::warn!(
                        task = %task,
                        attempt,
                        code = err.code(),
                        error = %err,
                        retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "task failed, retry scheduled"
                    );
                    self.persist(&state).await;
                    self.schedule_retry(task, delay);
                }
            }
            Event::RetryDue { task } => {
                let reset = state
                    .task_mut(&task)
                    .is_some_and(|record| record.reset_for_retry());
                if reset {
                    tracing::debug!(task = %task, "task re-enqueued");
                    self.persist(&state).await;
                }
            }
        }
    }

    /// A spawned future died outside the attempt guard; its task can no longer
    /// report, so the instance fails instead of stalling.
    async fn crashed(&mut self, err: JoinError) {
        tracing::error!(error = %err, "scheduler task crashed");
        let run = Arc::clone(&self.run);
        let mut state = run.state.lock().await;
        if state.finish(
            InstanceStatus::Failed,
            Some(format!("scheduler task crashed: {}", err)),
        ) {
            self.persist(&state).await;
            self.tasks.abort_all();
            run.signal_cancel();
        }
    }

    fn schedule_retry(&mut self, task: String, delay: Duration) {
        self.tasks.spawn(async move {
            tokio::time::sleep(delay).await;
            Event::RetryDue { task }
        });
    }
}
