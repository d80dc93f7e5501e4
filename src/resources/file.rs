use serde_json::{Value, json};
use std::path::PathBuf;

use crate::collection::{Collection, ListQuery, PageMode};
use crate::http::Api;
use crate::resource::{Endpoints, FieldKind, FieldSpec, Record, Resource};
use crate::transfer::{Download, DownloadOptions, Upload, UploadOptions, UploadTarget};
use crate::types::DownloadInfo;
use crate::{Error, Result};

/// A file or folder stored on the platform.
#[derive(Debug)]
pub struct File;

const ORIGIN: &[FieldSpec] = &[
    FieldSpec::read_only("task", FieldKind::STRING),
    FieldSpec::read_only("dataset", FieldKind::STRING),
];

const STORAGE: &[FieldSpec] = &[
    FieldSpec::read_only("type", FieldKind::STRING),
    FieldSpec::read_only("volume", FieldKind::STRING),
    FieldSpec::read_only("location", FieldKind::STRING),
];

impl Resource for File {
    const KIND: &'static str = "file";
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::read_only("href", FieldKind::Href),
        FieldSpec::read_only("id", FieldKind::STRING),
        FieldSpec::new("name", FieldKind::STRING),
        FieldSpec::read_only("size", FieldKind::Integer),
        FieldSpec::read_only("project", FieldKind::STRING),
        FieldSpec::read_only("parent", FieldKind::STRING),
        FieldSpec::read_only("type", FieldKind::STRING),
        FieldSpec::read_only("created_on", FieldKind::DateTime),
        FieldSpec::read_only("modified_on", FieldKind::DateTime),
        FieldSpec::read_only("origin", FieldKind::Compound(ORIGIN)),
        FieldSpec::read_only("storage", FieldKind::Compound(STORAGE)),
        FieldSpec::new("metadata", FieldKind::Metadata),
        FieldSpec::new("tags", FieldKind::LIST),
        FieldSpec::read_only("download_info", FieldKind::DownloadInfo),
    ];
    const ENDPOINTS: Endpoints = Endpoints {
        get: Some("files/{id}"),
        query: "files",
        save: Some("files/{id}"),
        delete: Some("files/{id}"),
        metadata: Some("files/{id}/metadata"),
        tags: Some("files/{id}/tags"),
    };
}

/// Where a new folder is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderLocation {
    Project(String),
    Parent(String),
}

impl File {
    pub async fn get(api: &Api, id: &str) -> Result<Record<File>> {
        Record::fetch(api, id).await
    }

    /// List files; `project` or `parent` must be among the filters.
    pub async fn query(api: &Api, query: &ListQuery) -> Result<Collection<File>> {
        let scoped = query
            .filters()
            .iter()
            .any(|(key, _)| key == "project" || key == "parent");
        if !scoped {
            return Err(Error::Validation(
                "file queries need a project or parent filter".to_string(),
            ));
        }
        Collection::query(api, query).await
    }

    /// Offset-paged listing of a folder.
    pub async fn list_folder(api: &Api, folder_id: &str, query: &ListQuery) -> Result<Collection<File>> {
        let path = format!("files/{}/list", folder_id);
        Collection::fetch(api, &path, query, PageMode::Offset).await
    }

    /// Cursor-paged listing of a folder; resume with the next link's token.
    pub async fn scroll_folder(api: &Api, folder_id: &str, query: &ListQuery) -> Result<Collection<File>> {
        let path = format!("files/{}/scroll", folder_id);
        Collection::fetch(api, &path, query, PageMode::Cursor).await
    }

    pub async fn create_folder(api: &Api, name: &str, location: FolderLocation) -> Result<Record<File>> {
        let mut body = json!({"name": name, "type": "folder"});
        match location {
            FolderLocation::Project(id) => body["project"] = Value::String(id),
            FolderLocation::Parent(id) => body["parent"] = Value::String(id),
        }
        let created = api.post("files", body).await?;
        Record::from_value(api.clone(), created)
    }

    /// Prepare an upload of a local file; call `start()` on the result.
    pub fn upload(
        api: &Api,
        path: impl Into<PathBuf>,
        target: UploadTarget,
        options: UploadOptions,
    ) -> Result<Upload> {
        Upload::new(api, path, target, options)
    }
}

impl Record<File> {
    pub fn is_folder(&self) -> bool {
        self.get_str("type") == Some("folder")
    }

    fn file_id(&self) -> Result<String> {
        self.id()
            .map(str::to_string)
            .ok_or_else(|| Error::Validation("file has no id".to_string()))
    }

    /// Copy into another project, optionally renaming.
    pub async fn copy(&self, project: &str, name: Option<&str>) -> Result<Record<File>> {
        let mut body = json!({"project": project});
        if let Some(name) = name {
            body["name"] = Value::String(name.to_string());
        }
        let path = format!("files/{}/actions/copy", self.file_id()?);
        let copied = self.api().post(&path, body).await?;
        Record::from_value(self.api().clone(), copied)
    }

    /// Move into another folder, optionally renaming.
    pub async fn move_to(&self, parent: &str, name: Option<&str>) -> Result<Record<File>> {
        let mut body = json!({"parent": parent});
        if let Some(name) = name {
            body["name"] = Value::String(name.to_string());
        }
        let path = format!("files/{}/actions/move", self.file_id()?);
        let moved = self.api().post(&path, body).await?;
        Record::from_value(self.api().clone(), moved)
    }

    /// Signed URL for downloading the file content.
    pub async fn download_info(&self) -> Result<DownloadInfo> {
        let path = format!("files/{}/download_info", self.file_id()?);
        Ok(serde_json::from_value(self.api().get(&path).await?)?)
    }

    /// Prepare a multipart download of this file; call `start()` on the
    /// result.
    pub async fn download(
        &self,
        destination: impl Into<PathBuf>,
        options: DownloadOptions,
    ) -> Result<Download> {
        if self.is_folder() {
            return Err(Error::Validation("folders cannot be downloaded".to_string()));
        }
        let destination = destination.into();
        if destination.exists() && !options.overwrite {
            return Err(Error::LocalFileAlreadyExists(destination));
        }
        let info = self.download_info().await?;
        Download::new(self.api(), &info.url, destination, options)
    }

    /// Children of a folder, cursor-paged.
    pub async fn list_files(&self, query: &ListQuery) -> Result<Collection<File>> {
        if !self.is_folder() {
            return Err(Error::Validation("only folders have children".to_string()));
        }
        File::scroll_folder(self.api(), &self.file_id()?, query).await
    }
}
