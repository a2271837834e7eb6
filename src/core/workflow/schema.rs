//! YAML workflow documents.

use crate::core::workflow::definition::{TaskTemplate, WorkflowDefinition};
use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// Root of a definitions file: one or more workflows.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowDocument {
    pub workflows: Vec<WorkflowSpec>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Default parameters seeded into every instance's context.
    #[serde(default)]
    pub defaults: Map<String, Value>,
    pub tasks: Vec<TaskSpec>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TaskSpec {
    pub name: String,
    /// Stable task id; generated when omitted.
    #[serde(default)]
    pub id: Option<String>,
    pub function: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Human readable duration such as `30s` or `2m`.
    #[serde(default)]
    pub timeout: Option<String>,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub output_key: Option<String>,
    #[serde(default)]
    pub provides: Vec<String>,
}

impl WorkflowDocument {
    pub fn from_yaml_str(text: &str) -> anyhow::Result<Self> {
        let doc: WorkflowDocument =
            serde_yaml::from_str(text).context("failed to parse workflow document")?;
        if doc.workflows.is_empty() {
            bail!("workflow document defines no workflows");
        }
        Ok(doc)
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("invalid document {}", path.display()))
    }

    pub fn into_definitions(self) -> anyhow::Result<Vec<WorkflowDefinition>> {
        self.workflows
            .into_iter()
            .map(WorkflowSpec::into_definition)
            .collect()
    }
}

impl WorkflowSpec {
    pub fn into_definition(self) -> anyhow::Result<WorkflowDefinition> {
        let mut definition = WorkflowDefinition::new(self.name).description(self.description);
        definition.defaults = self.defaults;
        for task in self.tasks {
            let template = task
                .into_template()
                .with_context(|| format!("in workflow '{}'", definition.name))?;
            definition = definition.task(template);
        }
        Ok(definition)
    }
}

impl TaskSpec {
    pub fn into_template(self) -> anyhow::Result<TaskTemplate> {
        let mut template = TaskTemplate::new(self.name, self.function)
            .args(self.args)
            .depends_on(self.depends_on)
            .provides(self.provides)
            .max_retries(self.max_retries);
        if let Some(id) = self.id {
            template = template.with_id(id);
        }
        if let Some(raw) = self.timeout {
            let timeout = humantime::parse_duration(raw.trim()).map_err(|err| {
                anyhow!("task '{}' has invalid timeout '{}': {}", template.name, raw, err)
            })?;
            template = template.timeout(timeout);
        }
        if let Some(key) = self.output_key {
            template = template.output_key(key);
        }
        template.kwargs = self.kwargs;
        Ok(template)
    }
}

/// Parse a definitions file into workflow definitions.
pub fn load_definitions(path: &Path) -> anyhow::Result<Vec<WorkflowDefinition>> {
    WorkflowDocument::load_from_file(path)?.into_definitions()
}
