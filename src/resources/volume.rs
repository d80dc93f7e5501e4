use crate::collection::{Collection, ListQuery, PageMode};
use crate::http::Api;
use crate::resource::{Endpoints, FieldKind, FieldSpec, Record, Resource};
use crate::{Error, Result};

/// A cloud storage bucket attached to the platform.
#[derive(Debug)]
pub struct Volume;

impl Resource for Volume {
    const KIND: &'static str = "volume";
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::read_only("href", FieldKind::Href),
        FieldSpec::read_only("id", FieldKind::STRING),
        FieldSpec::read_only("name", FieldKind::STRING),
        FieldSpec::new("description", FieldKind::STRING),
        FieldSpec::new("access_mode", FieldKind::STRING),
        FieldSpec::new("service", FieldKind::Dict),
        FieldSpec::read_only("active", FieldKind::Bool),
        FieldSpec::read_only("created_on", FieldKind::DateTime),
        FieldSpec::read_only("modified_on", FieldKind::DateTime),
    ];
    const ENDPOINTS: Endpoints = Endpoints {
        get: Some("storage/volumes/{id}"),
        query: "storage/volumes",
        save: Some("storage/volumes/{id}"),
        delete: Some("storage/volumes/{id}"),
        metadata: None,
        tags: None,
    };
}

/// An object (or prefix) inside a volume.
#[derive(Debug)]
pub struct VolumeObject;

impl Resource for VolumeObject {
    const KIND: &'static str = "volume object";
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::read_only("href", FieldKind::Href),
        FieldSpec::read_only("location", FieldKind::STRING),
        FieldSpec::read_only("volume", FieldKind::STRING),
        FieldSpec::read_only("type", FieldKind::STRING),
        FieldSpec::read_only("metadata", FieldKind::Dict),
    ];
    const ENDPOINTS: Endpoints = Endpoints::new("");
    const IDENTITY: &'static str = "location";
}

impl Volume {
    pub async fn get(api: &Api, id: &str) -> Result<Record<Volume>> {
        Record::fetch(api, id).await
    }

    pub async fn query(api: &Api, query: &ListQuery) -> Result<Collection<Volume>> {
        Collection::query(api, query).await
    }
}

impl Record<Volume> {
    /// Cursor-paged listing of the objects under `prefix`.
    pub async fn list_objects(
        &self,
        prefix: Option<&str>,
        query: &ListQuery,
    ) -> Result<Collection<VolumeObject>> {
        let id = self
            .id()
            .ok_or_else(|| Error::Validation("volume has no id".to_string()))?;
        let path = format!("storage/volumes/{}/list", id);
        let query = match prefix {
            Some(prefix) => query.clone().filter("prefix", prefix),
            None => query.clone(),
        };
        Collection::fetch(self.api(), &path, &query, PageMode::Cursor).await
    }
}
