use serde_json::{Map, Value, json};

use crate::collection::{Collection, ListQuery};
use crate::http::Api;
use crate::resource::{Endpoints, FieldKind, FieldSpec, Record, Resource};
use crate::{Error, Result};

#[derive(Debug)]
pub struct Task;

impl Resource for Task {
    const KIND: &'static str = "task";
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::read_only("href", FieldKind::Href),
        FieldSpec::read_only("id", FieldKind::Uuid),
        FieldSpec::new("name", FieldKind::STRING),
        FieldSpec::read_only("status", FieldKind::STRING),
        FieldSpec::new("description", FieldKind::STRING),
        FieldSpec::read_only("project", FieldKind::STRING),
        FieldSpec::read_only("app", FieldKind::STRING),
        FieldSpec::read_only("type", FieldKind::STRING),
        FieldSpec::read_only("created_by", FieldKind::STRING),
        FieldSpec::read_only("executed_by", FieldKind::STRING),
        FieldSpec::read_only("start_time", FieldKind::DateTime),
        FieldSpec::read_only("end_time", FieldKind::DateTime),
        FieldSpec::read_only("created_time", FieldKind::DateTime),
        FieldSpec::read_only("batch", FieldKind::Bool),
        FieldSpec::new("batch_input", FieldKind::STRING),
        FieldSpec::new("batch_by", FieldKind::Dict),
        FieldSpec::read_only("batch_group", FieldKind::Dict),
        FieldSpec::read_only("parent", FieldKind::STRING),
        FieldSpec::new("inputs", FieldKind::Dict),
        FieldSpec::read_only("outputs", FieldKind::Dict),
        FieldSpec::new("execution_settings", FieldKind::Dict),
        FieldSpec::new("use_interruptible_instances", FieldKind::Bool),
        FieldSpec::read_only("execution_status", FieldKind::Dict),
        FieldSpec::read_only("price", FieldKind::Dict),
        FieldSpec::read_only("errors", FieldKind::LIST),
        FieldSpec::read_only("warnings", FieldKind::LIST),
    ];
    const ENDPOINTS: Endpoints = Endpoints {
        get: Some("tasks/{id}"),
        query: "tasks",
        save: Some("tasks/{id}"),
        delete: Some("tasks/{id}"),
        metadata: None,
        tags: None,
    };
}

/// Parameters of a new task.
#[derive(Debug, Clone, Default)]
pub struct TaskDraft {
    pub name: String,
    pub project: String,
    pub app: String,
    pub description: Option<String>,
    pub inputs: Map<String, Value>,
    pub batch_input: Option<String>,
    pub batch_by: Option<Map<String, Value>>,
    pub use_interruptible_instances: Option<bool>,
    pub execution_settings: Option<Map<String, Value>>,
}

impl TaskDraft {
    fn body(&self) -> Value {
        let mut body = json!({
            "name": self.name,
            "project": self.project,
            "app": self.app,
            "inputs": self.inputs,
        });
        if let Some(description) = &self.description {
            body["description"] = json!(description);
        }
        if let Some(batch_input) = &self.batch_input {
            body["batch_input"] = json!(batch_input);
        }
        if let Some(batch_by) = &self.batch_by {
            body["batch_by"] = json!(batch_by);
        }
        if let Some(interruptible) = self.use_interruptible_instances {
            body["use_interruptible_instances"] = json!(interruptible);
        }
        if let Some(settings) = &self.execution_settings {
            body["execution_settings"] = json!(settings);
        }
        body
    }
}

impl Task {
    pub async fn get(api: &Api, id: &str) -> Result<Record<Task>> {
        Record::fetch(api, id).await
    }

    pub async fn query(api: &Api, query: &ListQuery) -> Result<Collection<Task>> {
        Collection::query(api, query).await
    }

    /// Create a draft task, or create and run it when `run` is set. A run
    /// request answered with validation errors fails with
    /// [`Error::TaskValidation`].
    pub async fn create(api: &Api, draft: &TaskDraft, run: bool) -> Result<Record<Task>> {
        let query = if run {
            vec![("action".to_string(), "run".to_string())]
        } else {
            Vec::new()
        };
        let created = api.post_with("tasks", &query, draft.body()).await?.body;
        if run {
            check_errors(&created)?;
        }
        Record::from_value(api.clone(), created)
    }
}

fn check_errors(task: &Value) -> Result<()> {
    match task.get("errors") {
        Some(Value::Array(errors)) if !errors.is_empty() => Err(Error::TaskValidation {
            message: "task was created but is not valid and was not run".to_string(),
            errors: Value::Array(errors.clone()),
        }),
        _ => Ok(()),
    }
}

impl Record<Task> {
    fn task_id(&self) -> Result<String> {
        self.id()
            .map(str::to_string)
            .ok_or_else(|| Error::Validation("task has no id".to_string()))
    }

    async fn action(&mut self, action: &str) -> Result<()> {
        let path = format!("tasks/{}/actions/{}", self.task_id()?, action);
        let body = self.api().post(&path, json!({})).await?;
        *self = Record::from_value(self.api().clone(), body)?;
        Ok(())
    }

    /// Run a draft task.
    pub async fn run(&mut self) -> Result<()> {
        self.action("run").await
    }

    pub async fn abort(&mut self) -> Result<()> {
        self.action("abort").await
    }

    /// Copy this task into a new draft, or a new run when `run` is set.
    pub async fn clone_task(&self, run: bool) -> Result<Record<Task>> {
        let path = format!("tasks/{}/actions/clone", self.task_id()?);
        let query = if run {
            vec![("action".to_string(), "run".to_string())]
        } else {
            Vec::new()
        };
        let cloned = self.api().post_with(&path, &query, json!({})).await?.body;
        Record::from_value(self.api().clone(), cloned)
    }

    pub async fn execution_details(&self) -> Result<Value> {
        let path = format!("tasks/{}/execution_details", self.task_id()?);
        self.api().get(&path).await
    }
}
