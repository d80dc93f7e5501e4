use serde_json::{Map, Value, json};

use super::Member;
use crate::collection::{Collection, ListQuery, PageMode};
use crate::http::Api;
use crate::resource::{Endpoints, FieldKind, FieldSpec, Record, Resource};
use crate::{Error, Result};

#[derive(Debug)]
pub struct Project;

impl Resource for Project {
    const KIND: &'static str = "project";
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::read_only("href", FieldKind::Href),
        FieldSpec::read_only("id", FieldKind::STRING),
        FieldSpec::new("name", FieldKind::STRING),
        FieldSpec::new("billing_group", FieldKind::Uuid),
        FieldSpec::new("description", FieldKind::STRING),
        FieldSpec::read_only("type", FieldKind::STRING),
        FieldSpec::new("tags", FieldKind::LIST),
        FieldSpec::new("settings", FieldKind::Dict),
        FieldSpec::read_only("root_folder", FieldKind::STRING),
        FieldSpec::read_only("created_by", FieldKind::STRING),
        FieldSpec::read_only("created_on", FieldKind::DateTime),
        FieldSpec::read_only("modified_on", FieldKind::DateTime),
        FieldSpec::read_only("permissions", FieldKind::Dict),
    ];
    const ENDPOINTS: Endpoints = Endpoints {
        get: Some("projects/{id}"),
        query: "projects",
        save: Some("projects/{id}"),
        delete: Some("projects/{id}"),
        metadata: None,
        tags: None,
    };
}

impl Project {
    pub async fn get(api: &Api, id: &str) -> Result<Record<Project>> {
        Record::fetch(api, id).await
    }

    pub async fn query(api: &Api, query: &ListQuery) -> Result<Collection<Project>> {
        Collection::query(api, query).await
    }

    pub async fn create(
        api: &Api,
        name: &str,
        billing_group: &str,
        description: Option<&str>,
    ) -> Result<Record<Project>> {
        let mut draft: Record<Project> = Record::new(api.clone());
        draft.set("name", name)?;
        draft.set("billing_group", billing_group)?;
        if let Some(description) = description {
            draft.set("description", description)?;
        }
        let created = api.post("projects", Value::Object(draft.modified_data())).await?;
        Record::from_value(api.clone(), created)
    }
}

impl Record<Project> {
    fn project_id(&self) -> Result<String> {
        self.id()
            .map(str::to_string)
            .ok_or_else(|| Error::Validation("project has no id".to_string()))
    }

    pub async fn members(&self, query: &ListQuery) -> Result<Collection<Member>> {
        let path = format!("projects/{}/members", self.project_id()?);
        Collection::fetch(self.api(), &path, query, PageMode::Offset).await
    }

    /// Add a user with the given permission flags (`read`, `copy`, `write`,
    /// `execute`, `admin`).
    pub async fn add_member(
        &self,
        username: &str,
        permissions: Map<String, Value>,
    ) -> Result<Record<Member>> {
        let path = format!("projects/{}/members", self.project_id()?);
        let body = json!({"username": username, "permissions": permissions});
        let added = self.api().post(&path, body).await?;
        Record::from_value(self.api().clone(), added)
    }

    pub async fn remove_member(&self, username: &str) -> Result<()> {
        let path = format!("projects/{}/members/{}", self.project_id()?, username);
        self.api().delete(&path).await
    }
}
