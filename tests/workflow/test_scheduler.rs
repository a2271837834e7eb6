use conductor::core::workflow::builtins::register_builtins;
use conductor::core::workflow::{
    Engine, FunctionRegistry, RetryPolicy, TaskCall, TaskOutput, TaskTemplate, WorkflowDefinition,
};
use conductor::types::{InstanceStatus, TaskStatus};
use serde_json::{json, Map};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;

const WAIT: Duration = Duration::from_secs(10);

fn engine_with(functions: FunctionRegistry) -> Engine {
    Engine::builder()
        .functions(functions)
        .retry_policy(RetryPolicy::fixed(Duration::from_millis(10)))
        .build()
}

fn builtins() -> FunctionRegistry {
    FunctionRegistry::with_builtins()
}

#[tokio::test]
async fn chain_completes_every_task() {
    let engine = engine_with(builtins());
    engine
        .register_definition(
            WorkflowDefinition::new("chain")
                .task(TaskTemplate::new("A", "noop"))
                .task(TaskTemplate::new("B", "noop").depends_on(["A"])),
        )
        .unwrap();

    let id = engine.start("chain", "tenant", "user", Map::new()).await.unwrap();
    let instance = engine.wait_for_terminal(&id, WAIT).await.unwrap();

    assert_eq!(instance.status, InstanceStatus::Completed);
    assert!(instance.error.is_none());
    assert!(instance.completed_at.is_some());
    for name in ["A", "B"] {
        let task = instance.task(name).unwrap();
        assert_eq!(task.status, TaskStatus::Completed, "task {name}");
        assert_eq!(task.result, Some(json!({"status": "ok"})));
    }
}

#[tokio::test]
async fn dependents_start_after_dependencies_complete() {
    let log = Arc::new(Mutex::new(Vec::<String>::new()));
    let mut builder = FunctionRegistry::builder();
    let recorder = Arc::clone(&log);
    builder.async_fn("record", move |call: TaskCall| {
        let log = Arc::clone(&recorder);
        async move {
            log.lock().unwrap().push(format!("{}:start", call.task_name));
            tokio::time::sleep(Duration::from_millis(20)).await;
            log.lock().unwrap().push(format!("{}:end", call.task_name));
            Ok(TaskOutput::default())
        }
    });
    let engine = engine_with(builder.build());
    engine
        .register_definition(
            WorkflowDefinition::new("ordered")
                .task(TaskTemplate::new("C", "record").depends_on(["B"]))
                .task(TaskTemplate::new("B", "record").depends_on(["A"]))
                .task(TaskTemplate::new("A", "record")),
        )
        .unwrap();

    let id = engine.start("ordered", "t", "u", Map::new()).await.unwrap();
    let instance = engine.wait_for_terminal(&id, WAIT).await.unwrap();
    assert_eq!(instance.status, InstanceStatus::Completed);

    let log = log.lock().unwrap().clone();
    assert_eq!(
        log,
        vec!["A:start", "A:end", "B:start", "B:end", "C:start", "C:end"]
    );
}

#[tokio::test]
async fn cycle_fails_before_any_task_runs() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut builder = FunctionRegistry::builder();
    let counter = Arc::clone(&calls);
    builder.async_fn("count", move |_call: TaskCall| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok(TaskOutput::default()) }
    });
    let engine = engine_with(builder.build());
    engine
        .register_definition(
            WorkflowDefinition::new("loop")
                .task(TaskTemplate::new("A", "count").depends_on(["B"]))
                .task(TaskTemplate::new("B", "count").depends_on(["A"])),
        )
        .unwrap();

    let id = engine.start("loop", "t", "u", Map::new()).await.unwrap();
    let instance = engine.wait_for_terminal(&id, WAIT).await.unwrap();

    assert_eq!(instance.status, InstanceStatus::Failed);
    let error = instance.error.unwrap();
    assert!(error.contains("circular dependency"), "error was {error}");
    assert!(error.contains('A') && error.contains('B'));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    for task in &instance.tasks {
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.started_at.is_none());
    }
}

#[tokio::test]
async fn unknown_dependency_fails_instance() {
    let engine = engine_with(builtins());
    engine
        .register_definition(
            WorkflowDefinition::new("dangling")
                .task(TaskTemplate::new("A", "noop"))
                .task(TaskTemplate::new("B", "noop").depends_on(["ghost"])),
        )
        .unwrap();

    let id = engine.start("dangling", "t", "u", Map::new()).await.unwrap();
    let instance = engine.wait_for_terminal(&id, WAIT).await.unwrap();

    assert_eq!(instance.status, InstanceStatus::Failed);
    assert!(instance.error.as_ref().unwrap().contains("unknown task 'ghost'"));
    assert_eq!(instance.task("A").unwrap().status, TaskStatus::Pending);
}

#[tokio::test]
async fn ready_tasks_run_concurrently() {
    let barrier = Arc::new(Barrier::new(2));
    let mut builder = FunctionRegistry::builder();
    register_builtins(&mut builder);
    let shared = Arc::clone(&barrier);
    builder.async_fn("rendezvous", move |_call: TaskCall| {
        let barrier = Arc::clone(&shared);
        async move {
            barrier.wait().await;
            Ok(TaskOutput::default())
        }
    });
    let engine = engine_with(builder.build());
    engine
        .register_definition(
            WorkflowDefinition::new("fan-out")
                .task(TaskTemplate::new("root", "noop"))
                .task(
                    TaskTemplate::new("left", "rendezvous")
                        .depends_on(["root"])
                        .timeout(Duration::from_secs(2)),
                )
                .task(
                    TaskTemplate::new("right", "rendezvous")
                        .depends_on(["root"])
                        .timeout(Duration::from_secs(2)),
                )
                .task(TaskTemplate::new("join", "noop").depends_on(["left", "right"])),
        )
        .unwrap();

    let id = engine.start("fan-out", "t", "u", Map::new()).await.unwrap();
    let instance = engine.wait_for_terminal(&id, WAIT).await.unwrap();

    assert_eq!(instance.status, InstanceStatus::Completed);
    assert_eq!(instance.task("left").unwrap().retry_count, 0);
    assert_eq!(instance.task("right").unwrap().retry_count, 0);
}

#[tokio::test]
async fn same_round_context_writes_keep_last_completion() {
    let mut builder = FunctionRegistry::builder();
    builder.async_fn("write_after", |call: TaskCall| async move {
        let delay = call.kwarg("delay_ms").and_then(|v| v.as_u64()).unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(TaskOutput::new(json!(null)).set("winner", call.task_name.clone()))
    });
    let engine = engine_with(builder.build());
    engine
        .register_definition(
            WorkflowDefinition::new("race")
                .task(TaskTemplate::new("slow", "write_after").kwarg("delay_ms", 150))
                .task(TaskTemplate::new("fast", "write_after").kwarg("delay_ms", 0)),
        )
        .unwrap();

    let id = engine.start("race", "t", "u", Map::new()).await.unwrap();
    let instance = engine.wait_for_terminal(&id, WAIT).await.unwrap();

    assert_eq!(instance.status, InstanceStatus::Completed);
    assert_eq!(instance.context["winner"], json!("slow"));
}

#[tokio::test]
async fn outputs_and_provided_keys_feed_downstream_arguments() {
    let engine = engine_with(builtins());
    engine
        .register_definition(
            WorkflowDefinition::new("pipeline")
                .default_param("region", "eu")
                .task(
                    TaskTemplate::new("login", "set_context")
                        .kwarg("token", "abc123")
                        .provides(["token"]),
                )
                .task(
                    TaskTemplate::new("fetch", "echo")
                        .arg("$region")
                        .kwarg("auth", "$token")
                        .kwarg("price", "$$5")
                        .depends_on(["login"])
                        .output_key("fetched"),
                )
                .task(
                    TaskTemplate::new("report", "echo")
                        .arg(json!({"rows": "$fetched"}))
                        .depends_on(["fetch"]),
                ),
        )
        .unwrap();

    let mut params = Map::new();
    params.insert("region".into(), json!("us"));
    let id = engine.start("pipeline", "t", "u", params).await.unwrap();
    let instance = engine.wait_for_terminal(&id, WAIT).await.unwrap();

    assert_eq!(instance.status, InstanceStatus::Completed);
    let fetched = json!({"args": ["us"], "kwargs": {"auth": "abc123", "price": "$5"}});
    assert_eq!(instance.context["fetched"], fetched);
    assert_eq!(
        instance.task("report").unwrap().result,
        Some(json!({"args": [{"rows": fetched}], "kwargs": {}}))
    );
}

#[tokio::test]
async fn blocking_functions_share_a_small_pool() {
    let engine = Engine::builder().worker_pool_size(1).build();
    let mut definition = WorkflowDefinition::new("sleepy");
    for name in ["a", "b", "c"] {
        definition = definition.task(TaskTemplate::new(name, "sleep").kwarg("ms", 20));
    }
    engine.register_definition(definition).unwrap();

    let id = engine.start("sleepy", "t", "u", Map::new()).await.unwrap();
    let instance = engine.wait_for_terminal(&id, WAIT).await.unwrap();

    assert_eq!(instance.status, InstanceStatus::Completed);
    assert!(instance
        .tasks
        .iter()
        .all(|task| task.status == TaskStatus::Completed));
}

#[tokio::test]
async fn engines_do_not_share_definitions() {
    let first = engine_with(builtins());
    let second = engine_with(builtins());
    first
        .register_definition(WorkflowDefinition::new("only-here").task(TaskTemplate::new("a", "noop")))
        .unwrap();

    assert_eq!(first.definition_names(), vec!["only-here"]);
    assert!(second.definition_names().is_empty());
    let err = second
        .start("only-here", "t", "u", Map::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "WFE-DEF-001");
}
