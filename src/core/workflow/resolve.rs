//! `$name` context placeholders in task arguments.
//!
//! A string `"$key"` is replaced by the context value under `key`; `"$$text"`
//! is the literal `"$text"`. Arrays and object values are resolved
//! recursively; object keys are never rewritten.

use crate::core::error::{EngineError, TaskError};
use crate::core::workflow::definition::WorkflowDefinition;
use crate::core::workflow::graph::DependencyGraph;
use serde_json::{Map, Value};
use std::collections::HashSet;

enum Placeholder<'a> {
    Reference(&'a str),
    Escaped(&'a str),
}

fn placeholder(text: &str) -> Option<Placeholder<'_>> {
    let rest = text.strip_prefix('$')?;
    if rest.starts_with('$') {
        Some(Placeholder::Escaped(rest))
    } else if rest.is_empty() {
        None
    } else {
        Some(Placeholder::Reference(rest))
    }
}

pub fn resolve_value(value: &Value, context: &Map<String, Value>) -> Result<Value, TaskError> {
    match value {
        Value::String(text) => match placeholder(text) {
            Some(Placeholder::Reference(key)) => context
                .get(key)
                .cloned()
                .ok_or_else(|| TaskError::UnresolvedReference(key.to_string())),
            Some(Placeholder::Escaped(literal)) => Ok(Value::String(literal.to_string())),
            None => Ok(value.clone()),
        },
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_value(item, context))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut resolved = Map::new();
            for (key, child) in map {
                resolved.insert(key.clone(), resolve_value(child, context)?);
            }
            Ok(Value::Object(resolved))
        }
        other => Ok(other.clone()),
    }
}

pub fn resolve_arguments(
    args: &[Value],
    kwargs: &Map<String, Value>,
    context: &Map<String, Value>,
) -> Result<(Vec<Value>, Map<String, Value>), TaskError> {
    let args = args
        .iter()
        .map(|arg| resolve_value(arg, context))
        .collect::<Result<Vec<_>, _>>()?;
    let mut resolved = Map::new();
    for (key, value) in kwargs {
        resolved.insert(key.clone(), resolve_value(value, context)?);
    }
    Ok((args, resolved))
}

/// Context keys referenced anywhere inside `value`.
pub fn collect_references<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(text) => {
            if let Some(Placeholder::Reference(key)) = placeholder(text) {
                out.push(key);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_references(item, out);
            }
        }
        Value::Object(map) => {
            for child in map.values() {
                collect_references(child, out);
            }
        }
        _ => {}
    }
}

/// Check that every reference can be satisfied before an instance is created.
///
/// A task may reference seeded context keys and the `output_key`/`provides`
/// keys of its transitive dependencies.
pub fn preflight(
    definition: &WorkflowDefinition,
    context: &Map<String, Value>,
) -> Result<(), EngineError> {
    let graph = DependencyGraph::build(
        definition
            .tasks
            .iter()
            .map(|task| (task.name.as_str(), task.dependencies.as_slice())),
    );

    for task in &definition.tasks {
        let mut references = Vec::new();
        for arg in &task.args {
            collect_references(arg, &mut references);
        }
        for value in task.kwargs.values() {
            collect_references(value, &mut references);
        }
        if references.is_empty() {
            continue;
        }

        let mut available: HashSet<&str> = context.keys().map(String::as_str).collect();
        for ancestor in graph.ancestors(&task.name) {
            if let Some(upstream) = definition.get_task(&ancestor) {
                available.extend(upstream.output_key.as_deref());
                available.extend(upstream.provides.iter().map(String::as_str));
            }
        }

        if let Some(missing) = references.iter().find(|key| !available.contains(**key)) {
            return Err(EngineError::UnresolvedReference {
                task: task.name.clone(),
                reference: missing.to_string(),
            });
        }
    }
    Ok(())
}
