use crate::{Error, Result};

/// Parameters of a list request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    /// Continuation token of cursor-style endpoints.
    pub token: Option<String>,
    /// Comma-separated field projection.
    pub fields: Option<String>,
    filters: Vec<(String, String)>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn fields(mut self, fields: impl Into<String>) -> Self {
        self.fields = Some(fields.into());
        self
    }

    /// Add a filter. Repeated keys are sent repeatedly (OR semantics on the
    /// platform side).
    pub fn filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((key.into(), value.into()));
        self
    }

    /// `metadata.<key>=<value>`
    pub fn metadata(self, key: &str, value: impl Into<String>) -> Self {
        self.filter(format!("metadata.{}", key), value)
    }

    /// `origin.<key>=<value>`
    pub fn origin(self, key: &str, value: impl Into<String>) -> Self {
        self.filter(format!("origin.{}", key), value)
    }

    pub fn filters(&self) -> &[(String, String)] {
        &self.filters
    }

    /// Offset and token navigation are mutually exclusive.
    pub fn validate(&self) -> Result<()> {
        if self.token.is_some() && self.offset.is_some() {
            return Err(Error::Validation(
                "offset and token cannot be used together".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(offset) = self.offset {
            pairs.push(("offset".to_string(), offset.to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(token) = &self.token {
            pairs.push(("token".to_string(), token.clone()));
        }
        if let Some(fields) = &self.fields {
            pairs.push(("fields".to_string(), fields.clone()));
        }
        pairs.extend(self.filters.iter().cloned());
        pairs
    }
}
