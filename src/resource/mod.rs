//! Declarative resource model: static field tables, dirty tracking and lazy
//! hydration shared by every platform resource.

mod field;
mod record;

pub use field::{FieldKind, FieldSpec, find as find_field};
pub use record::{MetadataEditor, Record};

/// URL templates of a resource type. `{id}` is replaced by the record's
/// identity.
#[derive(Debug, Clone, Copy)]
pub struct Endpoints {
    pub get: Option<&'static str>,
    pub query: &'static str,
    pub save: Option<&'static str>,
    pub delete: Option<&'static str>,
    pub metadata: Option<&'static str>,
    pub tags: Option<&'static str>,
}

impl Endpoints {
    pub const fn new(query: &'static str) -> Self {
        Self {
            get: None,
            query,
            save: None,
            delete: None,
            metadata: None,
            tags: None,
        }
    }
}

pub(crate) fn expand(template: &str, id: &str) -> String {
    template.replace("{id}", id)
}

/// A platform resource type.
pub trait Resource: Send + Sync + 'static {
    /// Human-readable kind, used in errors and logs.
    const KIND: &'static str;
    const FIELDS: &'static [FieldSpec];
    const ENDPOINTS: Endpoints;
    /// Field whose value identifies a record.
    const IDENTITY: &'static str = "id";
}
