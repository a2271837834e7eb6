use crate::status::{InstanceStatus, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Globally unique identifier of a workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(Uuid);

impl InstanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for InstanceId {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value.trim()).map(Self)
    }
}

impl From<Uuid> for InstanceId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// Per-instance execution record of one task template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRun {
    pub task_id: String,
    pub name: String,
    /// Key of the task function in the engine's function registry.
    pub function: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub timeout_ms: u64,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Context key that receives the result value on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
    pub status: TaskStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskRun {
    pub fn mark_running(&mut self) {
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
        self.completed_at = None;
    }

    pub fn mark_completed(&mut self, result: Value) {
        self.status = TaskStatus::Completed;
        self.result = Some(result);
        self.error = None;
        self.completed_at = Some(Utc::now());
    }

    /// Record a failed attempt. Returns `true` when the retry budget is spent.
    pub fn mark_failed(&mut self, error: impl Into<String>) -> bool {
        self.status = TaskStatus::Failed;
        self.retry_count = self.retry_count.saturating_add(1);
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
        self.retries_exhausted()
    }

    pub fn retries_exhausted(&self) -> bool {
        self.retry_count > self.max_retries
    }

    /// A failed attempt that still has budget left.
    pub fn is_retryable_failure(&self) -> bool {
        self.status == TaskStatus::Failed && !self.retries_exhausted()
    }

    /// Move a retryable failure back to pending for its next attempt.
    pub fn reset_for_retry(&mut self) -> bool {
        if !self.is_retryable_failure() {
            return false;
        }
        self.status = TaskStatus::Pending;
        self.started_at = None;
        self.completed_at = None;
        true
    }

    /// Revert a run left `running` by a scheduler that is no longer alive.
    pub fn reset_orphaned(&mut self) -> bool {
        if self.status != TaskStatus::Running {
            return false;
        }
        self.status = TaskStatus::Pending;
        self.started_at = None;
        self.completed_at = None;
        true
    }
}

/// One execution of a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub instance_id: InstanceId,
    pub workflow_name: String,
    pub tenant_id: String,
    pub user_id: String,
    pub status: InstanceStatus,
    #[serde(default)]
    pub context: Map<String, Value>,
    pub tasks: Vec<TaskRun>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl WorkflowInstance {
    pub fn new(
        workflow_name: impl Into<String>,
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
        context: Map<String, Value>,
        tasks: Vec<TaskRun>,
    ) -> Self {
        Self {
            instance_id: InstanceId::new(),
            workflow_name: workflow_name.into(),
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            status: InstanceStatus::Pending,
            context,
            tasks,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Enter `running` from `pending` or `paused`.
    pub fn mark_running(&mut self) -> bool {
        match self.status {
            InstanceStatus::Pending | InstanceStatus::Paused => {
                self.status = InstanceStatus::Running;
                if self.started_at.is_none() {
                    self.started_at = Some(Utc::now());
                }
                true
            }
            _ => false,
        }
    }

    pub fn pause(&mut self) -> bool {
        if self.status != InstanceStatus::Running {
            return false;
        }
        self.status = InstanceStatus::Paused;
        true
    }

    pub fn resume(&mut self) -> bool {
        if self.status != InstanceStatus::Paused {
            return false;
        }
        self.status = InstanceStatus::Running;
        true
    }

    /// Set a terminal status. Refuses non-terminal targets and already-finished instances.
    pub fn finish(&mut self, status: InstanceStatus, error: Option<String>) -> bool {
        if self.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.error = error;
        self.completed_at = Some(Utc::now());
        true
    }

    pub fn task(&self, name: &str) -> Option<&TaskRun> {
        self.tasks.iter().find(|task| task.name == name)
    }

    pub fn task_mut(&mut self, name: &str) -> Option<&mut TaskRun> {
        self.tasks.iter_mut().find(|task| task.name == name)
    }

    pub fn all_tasks_completed(&self) -> bool {
        self.tasks
            .iter()
            .all(|task| task.status == TaskStatus::Completed)
    }

    pub fn tasks_with_status(&self, status: TaskStatus) -> impl Iterator<Item = &TaskRun> {
        self.tasks.iter().filter(move |task| task.status == status)
    }
}
