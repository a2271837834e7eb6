use anyhow::bail;
use conductor::core::workflow::builtins::register_builtins;
use conductor::core::workflow::{
    Engine, FunctionRegistry, RetryPolicy, TaskCall, TaskOutput, TaskTemplate, WorkflowDefinition,
};
use conductor::types::{InstanceStatus, TaskStatus};
use serde_json::{json, Map};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(10);

/// Registry with the built-ins plus `flaky`, which fails until its
/// `succeed_on` attempt, and `count`, which only counts calls.
fn registry(flaky_calls: Arc<AtomicU32>, count_calls: Arc<AtomicU32>) -> FunctionRegistry {
    let mut builder = FunctionRegistry::builder();
    register_builtins(&mut builder);
    builder.async_fn("flaky", move |call: TaskCall| {
        flaky_calls.fetch_add(1, Ordering::SeqCst);
        async move {
            let succeed_on = call
                .kwarg("succeed_on")
                .and_then(|v| v.as_u64())
                .unwrap_or(u64::MAX);
            if u64::from(call.attempt) < succeed_on {
                bail!("attempt {} failed", call.attempt);
            }
            Ok(TaskOutput::new(json!({"attempt": call.attempt})))
        }
    });
    builder.async_fn("count", move |_call: TaskCall| {
        count_calls.fetch_add(1, Ordering::SeqCst);
        async { Ok(TaskOutput::default()) }
    });
    builder.build()
}

fn engine(functions: FunctionRegistry, delay: Duration) -> Engine {
    Engine::builder()
        .functions(functions)
        .retry_policy(RetryPolicy::fixed(delay))
        .build()
}

#[tokio::test]
async fn failures_within_budget_still_complete() {
    let flaky = Arc::new(AtomicU32::new(0));
    let engine = engine(
        registry(Arc::clone(&flaky), Arc::new(AtomicU32::new(0))),
        Duration::from_millis(5),
    );
    engine
        .register_definition(
            WorkflowDefinition::new("flaky").task(
                TaskTemplate::new("unstable", "flaky")
                    .kwarg("succeed_on", 3)
                    .max_retries(3),
            ),
        )
        .unwrap();

    let id = engine.start("flaky", "t", "u", Map::new()).await.unwrap();
    let instance = engine.wait_for_terminal(&id, WAIT).await.unwrap();

    assert_eq!(instance.status, InstanceStatus::Completed);
    let task = instance.task("unstable").unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.retry_count, 2);
    assert!(task.error.is_none());
    assert_eq!(task.result, Some(json!({"attempt": 3})));
    assert_eq!(flaky.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn exhausted_retries_fail_instance_and_skip_dependents() {
    let flaky = Arc::new(AtomicU32::new(0));
    let downstream = Arc::new(AtomicU32::new(0));
    let engine = engine(
        registry(Arc::clone(&flaky), Arc::clone(&downstream)),
        Duration::from_millis(5),
    );
    engine
        .register_definition(
            WorkflowDefinition::new("doomed")
                .task(TaskTemplate::new("broken", "flaky").max_retries(1))
                .task(TaskTemplate::new("after", "count").depends_on(["broken"])),
        )
        .unwrap();

    let id = engine.start("doomed", "t", "u", Map::new()).await.unwrap();
    let instance = engine.wait_for_terminal(&id, WAIT).await.unwrap();

    assert_eq!(instance.status, InstanceStatus::Failed);
    assert_eq!(
        instance.error.as_deref(),
        Some("task 'broken' failed: attempt 2 failed")
    );
    let broken = instance.task("broken").unwrap();
    assert_eq!(broken.status, TaskStatus::Failed);
    assert_eq!(broken.retry_count, 2);
    assert_eq!(flaky.load(Ordering::SeqCst), 2);

    assert_eq!(instance.task("after").unwrap().status, TaskStatus::Pending);
    assert_eq!(downstream.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn zero_retries_fail_on_first_error() {
    let engine = engine(FunctionRegistry::with_builtins(), Duration::from_millis(5));
    engine
        .register_definition(
            WorkflowDefinition::new("once")
                .task(TaskTemplate::new("boom", "fail").kwarg("message", "disk full")),
        )
        .unwrap();

    let id = engine.start("once", "t", "u", Map::new()).await.unwrap();
    let instance = engine.wait_for_terminal(&id, WAIT).await.unwrap();

    assert_eq!(instance.status, InstanceStatus::Failed);
    assert_eq!(instance.error.as_deref(), Some("task 'boom' failed: disk full"));
    assert_eq!(instance.task("boom").unwrap().retry_count, 1);
}

#[tokio::test]
async fn timeouts_count_against_the_retry_budget() {
    let mut builder = FunctionRegistry::builder();
    builder.async_fn("hang", |_call: TaskCall| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(TaskOutput::default())
    });
    let engine = engine(builder.build(), Duration::from_millis(5));
    engine
        .register_definition(
            WorkflowDefinition::new("slow").task(
                TaskTemplate::new("stuck", "hang")
                    .timeout(Duration::from_millis(20))
                    .max_retries(1),
            ),
        )
        .unwrap();

    let id = engine.start("slow", "t", "u", Map::new()).await.unwrap();
    let instance = engine.wait_for_terminal(&id, WAIT).await.unwrap();

    assert_eq!(instance.status, InstanceStatus::Failed);
    assert_eq!(
        instance.error.as_deref(),
        Some("task 'stuck' failed: timed out after 20 ms")
    );
    assert_eq!(instance.task("stuck").unwrap().retry_count, 2);
}

#[tokio::test]
async fn panicking_function_becomes_task_failure() {
    let mut builder = FunctionRegistry::builder();
    builder.async_fn("explode", |_call: TaskCall| async {
        if true {
            panic!("kaboom");
        }
        Ok(TaskOutput::default())
    });
    let engine = engine(builder.build(), Duration::from_millis(5));
    engine
        .register_definition(WorkflowDefinition::new("panic").task(TaskTemplate::new("p", "explode")))
        .unwrap();

    let id = engine.start("panic", "t", "u", Map::new()).await.unwrap();
    let instance = engine.wait_for_terminal(&id, WAIT).await.unwrap();

    assert_eq!(instance.status, InstanceStatus::Failed);
    let error = instance.error.unwrap();
    assert!(error.contains("panicked") && error.contains("kaboom"), "error was {error}");
}

#[tokio::test]
async fn backoff_does_not_hold_up_other_tasks() {
    let finished = Arc::new(Mutex::new(Vec::<(String, Instant)>::new()));
    let mut builder = FunctionRegistry::builder();
    let log = Arc::clone(&finished);
    builder.async_fn("fail_once", move |call: TaskCall| {
        let log = Arc::clone(&log);
        async move {
            log.lock()
                .unwrap()
                .push((format!("{}#{}", call.task_name, call.attempt), Instant::now()));
            if call.kwarg("fails").is_some() && call.attempt == 1 {
                bail!("first attempt fails");
            }
            Ok(TaskOutput::default())
        }
    });
    let engine = engine(builder.build(), Duration::from_millis(300));
    engine
        .register_definition(
            WorkflowDefinition::new("independent")
                .task(
                    TaskTemplate::new("retrying", "fail_once")
                        .kwarg("fails", true)
                        .max_retries(1),
                )
                .task(TaskTemplate::new("quick", "fail_once"))
                .task(TaskTemplate::new("follow", "fail_once").depends_on(["quick"])),
        )
        .unwrap();

    let id = engine.start("independent", "t", "u", Map::new()).await.unwrap();
    let instance = engine.wait_for_terminal(&id, WAIT).await.unwrap();
    assert_eq!(instance.status, InstanceStatus::Completed);

    let log = finished.lock().unwrap().clone();
    let when = |label: &str| {
        log.iter()
            .find(|(name, _)| name == label)
            .map(|(_, at)| *at)
            .unwrap_or_else(|| panic!("{label} never ran"))
    };
    assert!(when("follow#1") < when("retrying#2"));
    assert_eq!(instance.task("retrying").unwrap().retry_count, 1);
}
