use serde_json::Value;

use crate::resource::{Endpoints, FieldKind, FieldSpec, Record, Resource};
use crate::{Error, Result};

/// A user's membership in a project.
#[derive(Debug)]
pub struct Member;

const PERMISSIONS: &[FieldSpec] = &[
    FieldSpec::new("read", FieldKind::Bool),
    FieldSpec::new("copy", FieldKind::Bool),
    FieldSpec::new("write", FieldKind::Bool),
    FieldSpec::new("execute", FieldKind::Bool),
    FieldSpec::new("admin", FieldKind::Bool),
];

impl Resource for Member {
    const KIND: &'static str = "member";
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::read_only("href", FieldKind::Href),
        FieldSpec::read_only("id", FieldKind::STRING),
        FieldSpec::read_only("username", FieldKind::STRING),
        FieldSpec::read_only("email", FieldKind::STRING),
        FieldSpec::read_only("type", FieldKind::STRING),
        FieldSpec::new("permissions", FieldKind::Compound(PERMISSIONS)),
    ];
    const ENDPOINTS: Endpoints = Endpoints::new("");
    const IDENTITY: &'static str = "username";
}

impl Record<Member> {
    /// PATCH pending permission edits to `<member href>/permissions`.
    pub async fn save_permissions(&mut self) -> Result<()> {
        let Some(Value::Object(permissions)) = self.modified_data().remove("permissions") else {
            return Err(Error::NotModified);
        };
        let href = self
            .href()
            .ok_or_else(|| Error::Validation("member has no href".to_string()))?;
        let path = format!("{}/permissions", href.trim_end_matches('/'));
        let saved = self.api().patch(&path, Value::Object(permissions)).await?;
        let mut refreshed = self.data().clone();
        refreshed.insert("permissions".to_string(), saved);
        *self = Record::from_value(self.api().clone(), Value::Object(refreshed))?;
        Ok(())
    }

    pub fn permission(&self, name: &str) -> bool {
        self.get("permissions")
            .and_then(|permissions| permissions.get(name))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}
