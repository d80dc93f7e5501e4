use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use super::field::{self, FieldKind};
use super::{Resource, expand};
use crate::http::Api;
use crate::{Error, Result};

const METADATA: &str = "metadata";
const TAGS: &str = "tags";

/// One (possibly partially loaded) resource with pending edits.
pub struct Record<R: Resource> {
    api: Api,
    data: Map<String, Value>,
    dirty: Map<String, Value>,
    nested_dirty: BTreeMap<String, Map<String, Value>>,
    fetched: bool,
    metadata_overwrite: bool,
    _kind: PhantomData<fn() -> R>,
}

impl<R: Resource> Record<R> {
    fn empty(api: Api) -> Self {
        Self {
            api,
            data: Map::new(),
            dirty: Map::new(),
            nested_dirty: BTreeMap::new(),
            fetched: false,
            metadata_overwrite: false,
            _kind: PhantomData,
        }
    }

    /// Build a record from a server payload. Unknown keys are dropped.
    pub fn from_value(api: Api, value: Value) -> Result<Self> {
        let Value::Object(object) = value else {
            return Err(Error::Validation(format!(
                "{} payload must be a JSON object",
                R::KIND
            )));
        };
        let mut record = Self::empty(api);
        record.data = recognized::<R>(object);
        Ok(record)
    }

    /// A stub carrying only its identity; other fields hydrate on first read.
    pub fn with_id(api: Api, id: impl Into<String>) -> Self {
        let mut record = Self::empty(api);
        record.data.insert(R::IDENTITY.to_string(), Value::String(id.into()));
        record
    }

    /// An empty record. Read-only fields may be set until it has data.
    pub fn new(api: Api) -> Self {
        Self::empty(api)
    }

    /// Fetch a record by identity.
    pub async fn fetch(api: &Api, id: &str) -> Result<Self> {
        let template = R::ENDPOINTS
            .get
            .ok_or_else(|| Error::Validation(format!("{} cannot be fetched by id", R::KIND)))?;
        let body = api.get(&expand(template, id)).await?;
        let mut record = Self::from_value(api.clone(), body)?;
        record.fetched = true;
        Ok(record)
    }

    pub fn api(&self) -> &Api {
        &self.api
    }

    pub fn id(&self) -> Option<&str> {
        self.data.get(R::IDENTITY).and_then(Value::as_str)
    }

    pub fn href(&self) -> Option<&str> {
        self.data.get("href").and_then(Value::as_str)
    }

    /// Last-known server state merged with local edits.
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.data)
    }

    /// Read a field without any I/O.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Read a field, hydrating the record once if the field is missing.
    pub async fn field(&mut self, name: &str) -> Result<Option<&Value>> {
        if field::find(R::FIELDS, name).is_none() {
            return Err(Error::Validation(format!(
                "{} has no field '{}'",
                R::KIND,
                name
            )));
        }
        if !self.data.contains_key(name) && !self.fetched && self.resolvable_url().is_some() {
            self.hydrate().await?;
        }
        Ok(self.data.get(name))
    }

    /// Typed [`field`](Self::field).
    pub async fn field_as<T: DeserializeOwned>(&mut self, name: &str) -> Result<Option<T>> {
        match self.field(name).await? {
            Some(Value::Null) | None => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
        }
    }

    fn resolvable_url(&self) -> Option<String> {
        if let Some(href) = self.href() {
            return Some(href.to_string());
        }
        let template = R::ENDPOINTS.get?;
        self.id().map(|id| expand(template, id))
    }

    async fn hydrate(&mut self) -> Result<()> {
        self.fetched = true;
        let Some(url) = self.resolvable_url() else {
            return Ok(());
        };
        tracing::debug!("hydrating {} from {}", R::KIND, url);
        let body = self.api.get(&url).await?;
        self.replace_data(body);
        // local edits win over the freshly fetched state
        for (key, value) in &self.dirty {
            self.data.insert(key.clone(), value.clone());
        }
        for (key, edits) in &self.nested_dirty {
            let slot = object_slot(&mut self.data, key);
            for (k, v) in edits {
                slot.insert(k.clone(), v.clone());
            }
        }
        Ok(())
    }

    fn replace_data(&mut self, body: Value) {
        if let Value::Object(object) = body {
            self.data = recognized::<R>(object);
        }
    }

    /// Assign a top-level field.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let spec = field::find(R::FIELDS, name).ok_or_else(|| {
            Error::Validation(format!("{} has no field '{}'", R::KIND, name))
        })?;
        if spec.read_only && !self.data.is_empty() {
            return Err(Error::ReadOnly(name.to_string()));
        }
        spec.validate(&value)?;
        if matches!(spec.kind, FieldKind::Metadata) {
            self.metadata_overwrite = true;
            self.nested_dirty.remove(name);
        }
        self.data.insert(name.to_string(), value.clone());
        self.dirty.insert(name.to_string(), value);
        Ok(())
    }

    /// Assign one key of a compound field.
    pub fn set_nested(&mut self, compound: &str, key: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let spec = field::find(R::FIELDS, compound).ok_or_else(|| {
            Error::Validation(format!("{} has no field '{}'", R::KIND, compound))
        })?;
        match spec.kind {
            FieldKind::Compound(fields) => {
                let nested = field::find(fields, key).ok_or_else(|| {
                    Error::Validation(format!("{}.{} is not a known field", compound, key))
                })?;
                if (spec.read_only || nested.read_only) && !self.data.is_empty() {
                    return Err(Error::ReadOnly(format!("{}.{}", compound, key)));
                }
                nested.validate(&value)?;
            }
            FieldKind::Metadata | FieldKind::Dict => {
                if spec.read_only && !self.data.is_empty() {
                    return Err(Error::ReadOnly(compound.to_string()));
                }
            }
            _ => {
                return Err(Error::Validation(format!(
                    "{} is not a compound field",
                    compound
                )));
            }
        }
        object_slot(&mut self.data, compound).insert(key.to_string(), value.clone());
        self.nested_dirty
            .entry(compound.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    /// Edit metadata key by key; saved with merge (PATCH) semantics unless
    /// the whole map was replaced through [`set_metadata`](Self::set_metadata).
    ///
    /// Fails when the resource has no writable metadata field.
    pub fn metadata_mut(&mut self) -> Result<MetadataEditor<'_, R>> {
        let spec = field::find(R::FIELDS, METADATA).ok_or_else(|| {
            Error::Validation(format!("{} has no field '{}'", R::KIND, METADATA))
        })?;
        if spec.read_only && !self.data.is_empty() {
            return Err(Error::ReadOnly(METADATA.to_string()));
        }
        if !matches!(spec.kind, FieldKind::Metadata) {
            return Err(Error::Validation(format!(
                "{}.{} is not editable metadata",
                R::KIND,
                METADATA
            )));
        }
        Ok(MetadataEditor { record: self })
    }

    /// Replace the whole metadata map; saved with overwrite (PUT) semantics.
    pub fn set_metadata(&mut self, metadata: Map<String, Value>) -> Result<()> {
        self.set(METADATA, Value::Object(metadata))
    }

    /// Whether the next save overwrites metadata instead of merging it.
    pub fn metadata_overwrite(&self) -> bool {
        self.metadata_overwrite
    }

    /// Top-level dirty fields plus the dirty sub-map of every edited compound.
    pub fn modified_data(&self) -> Map<String, Value> {
        let mut modified = self.dirty.clone();
        for (key, edits) in &self.nested_dirty {
            if edits.is_empty() {
                continue;
            }
            let slot = object_slot(&mut modified, key);
            for (k, v) in edits {
                slot.insert(k.clone(), v.clone());
            }
        }
        modified
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty() || self.nested_dirty.values().any(|edits| !edits.is_empty())
    }

    fn clear_field(&mut self, name: &str) {
        self.dirty.remove(name);
        self.nested_dirty.remove(name);
    }

    fn require_id(&self) -> Result<String> {
        self.id().map(str::to_string).ok_or_else(|| {
            Error::Validation(format!("{} has no {}", R::KIND, R::IDENTITY))
        })
    }

    /// Persist pending edits.
    ///
    /// Metadata and tags go to their own endpoints, the remainder is PATCHed.
    /// Each request is independent: edits applied before a failing request
    /// stay applied and are no longer dirty.
    pub async fn save(&mut self) -> Result<()> {
        let mut modified = self.modified_data();
        if modified.is_empty() {
            return Err(Error::NotModified);
        }
        let id = self.require_id()?;

        if let Some(template) = R::ENDPOINTS.metadata {
            if let Some(metadata) = modified.remove(METADATA) {
                let path = expand(template, &id);
                let body = if self.metadata_overwrite {
                    self.api.put(&path, metadata.clone()).await?
                } else {
                    self.api.patch(&path, metadata.clone()).await?
                };
                let saved = if body.is_object() { body } else { metadata };
                self.data.insert(METADATA.to_string(), saved);
                self.clear_field(METADATA);
                self.metadata_overwrite = false;
            }
        }

        if let Some(template) = R::ENDPOINTS.tags {
            if let Some(tags) = modified.remove(TAGS) {
                let body = self.api.put(&expand(template, &id), tags.clone()).await?;
                let saved = if body.is_array() { body } else { tags };
                self.data.insert(TAGS.to_string(), saved);
                self.clear_field(TAGS);
            }
        }

        if !modified.is_empty() {
            let template = R::ENDPOINTS
                .save
                .ok_or_else(|| Error::Validation(format!("{} cannot be saved", R::KIND)))?;
            let path = match self.href() {
                Some(href) => href.to_string(),
                None => expand(template, &id),
            };
            let body = self.api.patch(&path, Value::Object(modified)).await?;
            self.replace_data(body);
            self.dirty.clear();
            self.nested_dirty.clear();
            self.metadata_overwrite = false;
        }
        tracing::debug!("saved {} {}", R::KIND, id);
        Ok(())
    }

    /// Re-read server state, discarding local edits.
    pub async fn reload(&mut self) -> Result<()> {
        let mut body = None;
        if let Some(href) = self.href().map(str::to_string) {
            match self.api.get(&href).await {
                Ok(value) => body = Some(value),
                Err(e) => tracing::debug!("reload of {} via href failed: {}", R::KIND, e),
            }
        }
        if body.is_none() {
            if let (Some(template), Some(id)) = (R::ENDPOINTS.get, self.id()) {
                match self.api.get(&expand(template, id)).await {
                    Ok(value) => body = Some(value),
                    Err(e) => tracing::debug!("reload of {} by id failed: {}", R::KIND, e),
                }
            }
        }
        let Some(body) = body else {
            return Err(Error::UnableToRefresh(format!(
                "{} {}",
                R::KIND,
                self.id().unwrap_or("<unidentified>")
            )));
        };
        self.replace_data(body);
        self.dirty.clear();
        self.nested_dirty.clear();
        self.metadata_overwrite = false;
        self.fetched = true;
        Ok(())
    }

    /// Delete the record on the server.
    pub async fn delete(self) -> Result<()> {
        let path = match (R::ENDPOINTS.delete, self.id(), self.href()) {
            (Some(template), Some(id), _) => expand(template, id),
            (_, _, Some(href)) => href.to_string(),
            _ => {
                return Err(Error::Validation(format!(
                    "{} cannot be deleted without an identity",
                    R::KIND
                )));
            }
        };
        self.api.delete(&path).await
    }
}

/// Key-by-key metadata edits of a record.
pub struct MetadataEditor<'a, R: Resource> {
    record: &'a mut Record<R>,
}

impl<R: Resource> MetadataEditor<'_, R> {
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        object_slot(&mut self.record.data, METADATA).insert(key.clone(), value.clone());
        if self.record.metadata_overwrite {
            // the whole map is already scheduled for PUT
            object_slot(&mut self.record.dirty, METADATA).insert(key, value);
        } else {
            self.record
                .nested_dirty
                .entry(METADATA.to_string())
                .or_default()
                .insert(key, value);
        }
        self
    }

    /// Remove a key; the platform drops keys set to `null`.
    pub fn remove(&mut self, key: impl Into<String>) -> &mut Self {
        self.insert(key, Value::Null)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.record
            .data
            .get(METADATA)
            .and_then(Value::as_object)
            .and_then(|metadata| metadata.get(key))
    }
}

impl<R: Resource> PartialEq for Record<R> {
    fn eq(&self, other: &Self) -> bool {
        match (self.id(), other.id()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl<R: Resource> fmt::Debug for Record<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(R::KIND)
            .field(R::IDENTITY, &self.id())
            .field("data", &self.data)
            .field("dirty", &self.modified_data())
            .finish()
    }
}

/// Keep recognized fields whose values pass validation.
fn recognized<R: Resource>(object: Map<String, Value>) -> Map<String, Value> {
    object
        .into_iter()
        .filter(|(key, value)| match field::find(R::FIELDS, key) {
            Some(spec) => match spec.validate(value) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("dropping {}.{} from server payload: {}", R::KIND, key, e);
                    false
                }
            },
            None => false,
        })
        .collect()
}

/// The object stored under `key`, created (or replacing a non-object) if needed.
fn object_slot<'a>(map: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
    let slot = map
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(object) => object,
        _ => unreachable!("slot was just made an object"),
    }
}
