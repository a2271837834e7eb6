use crate::core::error::{EngineError, EngineResult};
use crate::core::workflow::definition::WorkflowDefinition;
use crate::core::workflow::function::FunctionRegistry;
use crate::core::workflow::graph::DependencyGraph;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// What to do when a definition name is registered twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    #[default]
    Reject,
    Overwrite,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "reject" => Ok(DuplicatePolicy::Reject),
            "overwrite" => Ok(DuplicatePolicy::Overwrite),
            other => Err(format!(
                "invalid duplicate policy '{}'; supported values are reject, overwrite",
                other
            )),
        }
    }
}

/// Definitions owned by one engine, keyed by name.
pub struct DefinitionRegistry {
    definitions: DashMap<String, Arc<WorkflowDefinition>>,
    policy: DuplicatePolicy,
}

impl DefinitionRegistry {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            definitions: DashMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    /// Store a definition after structural validation.
    ///
    /// Cycles and unknown dependency names are only logged here; instances of
    /// such a definition fail when their scheduler starts.
    pub fn register(
        &self,
        definition: WorkflowDefinition,
        functions: &FunctionRegistry,
    ) -> EngineResult<()> {
        validate_structure(&definition, functions)?;

        let graph = DependencyGraph::build(
            definition
                .tasks
                .iter()
                .map(|task| (task.name.as_str(), task.dependencies.as_slice())),
        );
        for (task, dependency) in graph.unknown_dependencies() {
            tracing::warn!(
                workflow = %definition.name,
                task = %task,
                dependency = %dependency,
                "definition references an unknown dependency; its instances will fail"
            );
        }
        for cycle in graph.cycles() {
            tracing::warn!(
                workflow = %definition.name,
                cycle = %cycle.join(" -> "),
                "definition contains a dependency cycle; its instances will fail"
            );
        }

        let name = definition.name.clone();
        match self.definitions.entry(name.clone()) {
            Entry::Occupied(mut slot) => match self.policy {
                DuplicatePolicy::Reject => return Err(EngineError::DuplicateDefinition(name)),
                DuplicatePolicy::Overwrite => {
                    slot.insert(Arc::new(definition));
                    tracing::info!(workflow = %name, "workflow definition replaced");
                }
            },
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(definition));
                tracing::debug!(workflow = %name, "workflow definition registered");
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> EngineResult<Arc<WorkflowDefinition>> {
        self.definitions
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| EngineError::DefinitionNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .definitions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

fn validate_structure(
    definition: &WorkflowDefinition,
    functions: &FunctionRegistry,
) -> EngineResult<()> {
    let name = definition.name.as_str();
    if name.trim().is_empty() {
        return Err(EngineError::invalid_definition(name, "name cannot be empty"));
    }
    if definition.tasks.is_empty() {
        return Err(EngineError::invalid_definition(name, "workflow has no tasks"));
    }

    let mut ids = HashSet::new();
    let mut names = HashSet::new();
    for task in &definition.tasks {
        if task.name.trim().is_empty() {
            return Err(EngineError::invalid_definition(name, "task name cannot be empty"));
        }
        if !ids.insert(task.task_id.as_str()) {
            return Err(EngineError::invalid_definition(
                name,
                format!("duplicate task id '{}'", task.task_id),
            ));
        }
        if !names.insert(task.name.as_str()) {
            return Err(EngineError::invalid_definition(
                name,
                format!("duplicate task name '{}'", task.name),
            ));
        }
        if !functions.contains(&task.function) {
            return Err(EngineError::invalid_definition(
                name,
                format!(
                    "task '{}' uses unregistered function '{}'",
                    task.name, task.function
                ),
            ));
        }
        if task.timeout == Some(Duration::ZERO) {
            return Err(EngineError::invalid_definition(
                name,
                format!("task '{}' has a zero timeout", task.name),
            ));
        }
    }
    Ok(())
}
