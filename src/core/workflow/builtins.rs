use crate::core::workflow::function::{FunctionRegistryBuilder, TaskCall, TaskOutput};
use anyhow::{anyhow, bail};
use serde_json::{json, Value};
use std::thread;
use std::time::{Duration, Instant};

const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Register `noop`, `echo`, `set_context`, `sleep` and `fail`.
pub fn register_builtins(builder: &mut FunctionRegistryBuilder) {
    builder
        .async_fn("noop", |_call: TaskCall| async move {
            Ok(TaskOutput::new(json!({"status": "ok"})))
        })
        .async_fn("echo", |call: TaskCall| async move { Ok(echo(&call)) })
        .async_fn("set_context", |call: TaskCall| async move { Ok(set_context(call)) })
        .async_fn("fail", |call: TaskCall| async move { fail(&call) })
        .blocking_fn("sleep", sleep);
}

fn echo(call: &TaskCall) -> TaskOutput {
    TaskOutput::new(json!({
        "args": call.args,
        "kwargs": call.kwargs,
    }))
}

fn set_context(call: TaskCall) -> TaskOutput {
    let mut output = TaskOutput::new(Value::Object(call.kwargs.clone()));
    output.context_updates = call.kwargs;
    output
}

fn fail(call: &TaskCall) -> anyhow::Result<TaskOutput> {
    let message = call
        .kwarg("message")
        .and_then(Value::as_str)
        .unwrap_or("task failed on request");
    bail!("{}", message)
}

/// Blocks a worker for `ms` milliseconds, giving up early on cancellation.
fn sleep(call: TaskCall) -> anyhow::Result<TaskOutput> {
    let ms = match call.kwarg("ms") {
        None => 0,
        Some(value) => value
            .as_u64()
            .ok_or_else(|| anyhow!("sleep: 'ms' must be a non-negative integer, got {}", value))?,
    };
    let deadline = Instant::now() + Duration::from_millis(ms);
    loop {
        if call.cancel.is_cancelled() {
            bail!("sleep interrupted by cancellation");
        }
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
    Ok(TaskOutput::new(json!({"slept_ms": ms})))
}
