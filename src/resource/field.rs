use serde_json::{Map, Value};

use crate::{Error, Result};

/// Shape of a resource field.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Integer,
    Float,
    Str { max_length: Option<usize> },
    Bool,
    /// Version-4 UUID string.
    Uuid,
    /// ISO-8601 timestamp in UTC (`...Z`).
    DateTime,
    List { max_length: Option<usize> },
    Dict,
    Href,
    /// Nested object with its own field table.
    Compound(&'static [FieldSpec]),
    CompoundList(&'static [FieldSpec]),
    DownloadInfo,
    Metadata,
}

impl FieldKind {
    pub const STRING: FieldKind = FieldKind::Str { max_length: None };
    pub const LIST: FieldKind = FieldKind::List { max_length: None };

    fn describe(&self) -> &'static str {
        match self {
            FieldKind::Integer => "an integer",
            FieldKind::Float => "a number",
            FieldKind::Str { .. } => "a string",
            FieldKind::Bool => "a boolean",
            FieldKind::Uuid => "a UUID v4 string",
            FieldKind::DateTime => "an ISO-8601 UTC datetime",
            FieldKind::List { .. } => "a list",
            FieldKind::Dict | FieldKind::Metadata => "an object",
            FieldKind::Href => "a URL string",
            FieldKind::Compound(_) | FieldKind::DownloadInfo => "an object",
            FieldKind::CompoundList(_) => "a list of objects",
        }
    }
}

/// A named field of a resource type.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub read_only: bool,
}

impl FieldSpec {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            read_only: false,
        }
    }

    pub const fn read_only(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            read_only: true,
        }
    }

    /// Check a value against this field's kind. `null` is always accepted.
    pub fn validate(&self, value: &Value) -> Result<()> {
        if value.is_null() || self.accepts(value)? {
            return Ok(());
        }
        Err(Error::Validation(format!(
            "{} must be {}",
            self.name,
            self.kind.describe()
        )))
    }

    fn accepts(&self, value: &Value) -> Result<bool> {
        let ok = match self.kind {
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Float => value.is_number(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Href => value.is_string(),
            FieldKind::Dict | FieldKind::Metadata | FieldKind::DownloadInfo => value.is_object(),
            FieldKind::Str { max_length } => match value.as_str() {
                Some(s) => {
                    check_length(self.name, s.chars().count(), max_length)?;
                    true
                }
                None => false,
            },
            FieldKind::List { max_length } => match value.as_array() {
                Some(items) => {
                    check_length(self.name, items.len(), max_length)?;
                    true
                }
                None => false,
            },
            FieldKind::Uuid => value
                .as_str()
                .and_then(|s| uuid::Uuid::parse_str(s).ok())
                .is_some_and(|id| id.get_version_num() == 4),
            FieldKind::DateTime => value.as_str().is_some_and(|s| {
                s.ends_with('Z') && chrono::DateTime::parse_from_rfc3339(s).is_ok()
            }),
            FieldKind::Compound(fields) => match value.as_object() {
                Some(object) => {
                    validate_object(fields, object)?;
                    true
                }
                None => false,
            },
            FieldKind::CompoundList(fields) => match value.as_array() {
                Some(items) => {
                    for item in items {
                        let Some(object) = item.as_object() else {
                            return Ok(false);
                        };
                        validate_object(fields, object)?;
                    }
                    true
                }
                None => false,
            },
        };
        Ok(ok)
    }
}

fn check_length(name: &str, len: usize, max_length: Option<usize>) -> Result<()> {
    match max_length {
        Some(max) if len > max => Err(Error::Validation(format!(
            "{} is longer than {} (got {})",
            name, max, len
        ))),
        _ => Ok(()),
    }
}

/// Validate the known keys of a nested object; unknown keys pass through.
fn validate_object(fields: &[FieldSpec], object: &Map<String, Value>) -> Result<()> {
    for (key, value) in object {
        if let Some(spec) = find(fields, key) {
            spec.validate(value)?;
        }
    }
    Ok(())
}

pub fn find<'a>(fields: &'a [FieldSpec], name: &str) -> Option<&'a FieldSpec> {
    fields.iter().find(|spec| spec.name == name)
}
