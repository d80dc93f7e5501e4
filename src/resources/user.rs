use crate::http::Api;
use crate::resource::{Endpoints, FieldKind, FieldSpec, Record, Resource};
use crate::Result;

#[derive(Debug)]
pub struct User;

impl Resource for User {
    const KIND: &'static str = "user";
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::read_only("href", FieldKind::Href),
        FieldSpec::read_only("username", FieldKind::STRING),
        FieldSpec::read_only("email", FieldKind::STRING),
        FieldSpec::read_only("first_name", FieldKind::STRING),
        FieldSpec::read_only("last_name", FieldKind::STRING),
        FieldSpec::read_only("affiliation", FieldKind::STRING),
        FieldSpec::read_only("phone", FieldKind::STRING),
        FieldSpec::read_only("address", FieldKind::STRING),
        FieldSpec::read_only("city", FieldKind::STRING),
        FieldSpec::read_only("state", FieldKind::STRING),
        FieldSpec::read_only("country", FieldKind::STRING),
        FieldSpec::read_only("zip_code", FieldKind::STRING),
        FieldSpec::read_only("role", FieldKind::STRING),
        FieldSpec::read_only("tags", FieldKind::LIST),
    ];
    const ENDPOINTS: Endpoints = Endpoints {
        get: Some("users/{id}"),
        ..Endpoints::new("users")
    };
    const IDENTITY: &'static str = "username";
}

impl User {
    pub async fn get(api: &Api, username: &str) -> Result<Record<User>> {
        Record::fetch(api, username).await
    }

    /// The authenticated user.
    pub async fn me(api: &Api) -> Result<Record<User>> {
        api.user().await
    }
}
