use conductor_types::{TaskRun, TaskStatus};
use serde_json::{Map, Value};
use std::time::Duration;
use uuid::Uuid;

/// Immutable description of one unit of work inside a workflow definition.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskTemplate {
    pub task_id: String,
    pub name: String,
    /// Key resolved through the engine's function registry.
    pub function: String,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
    pub dependencies: Vec<String>,
    /// `None` falls back to the engine default.
    pub timeout: Option<Duration>,
    pub max_retries: u32,
    /// Context key that receives the task's result value.
    pub output_key: Option<String>,
    /// Further context keys the task may write through its output.
    pub provides: Vec<String>,
}

impl TaskTemplate {
    pub fn new(name: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            name: name.into(),
            function: function.into(),
            args: Vec::new(),
            kwargs: Map::new(),
            dependencies: Vec::new(),
            timeout: None,
            max_retries: 0,
            output_key: None,
            provides: Vec::new(),
        }
    }

    pub fn with_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = task_id.into();
        self
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn args<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.args.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    pub fn provides<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.provides.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Fresh per-instance execution record for this template.
    pub fn instantiate(&self, default_timeout: Duration) -> TaskRun {
        let timeout = self.timeout.unwrap_or(default_timeout);
        TaskRun {
            task_id: self.task_id.clone(),
            name: self.name.clone(),
            function: self.function.clone(),
            args: self.args.clone(),
            kwargs: self.kwargs.clone(),
            dependencies: self.dependencies.clone(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            retry_count: 0,
            max_retries: self.max_retries,
            output_key: self.output_key.clone(),
            status: TaskStatus::Pending,
            result: None,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Named, ordered collection of task templates plus default parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowDefinition {
    pub name: String,
    pub description: String,
    pub tasks: Vec<TaskTemplate>,
    pub defaults: Map<String, Value>,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            tasks: Vec::new(),
            defaults: Map::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn default_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }

    pub fn task(mut self, task: TaskTemplate) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn get_task(&self, name: &str) -> Option<&TaskTemplate> {
        self.tasks.iter().find(|task| task.name == name)
    }

    /// Defaults overlaid with caller parameters.
    pub fn seed_context(&self, parameters: Map<String, Value>) -> Map<String, Value> {
        let mut context = self.defaults.clone();
        context.extend(parameters);
        context
    }

    pub fn instantiate_tasks(&self, default_timeout: Duration) -> Vec<TaskRun> {
        self.tasks
            .iter()
            .map(|task| task.instantiate(default_timeout))
            .collect()
    }
}
