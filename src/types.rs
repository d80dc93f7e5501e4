use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Navigation link of a list response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub rel: String,
    pub href: String,
    #[serde(default = "default_method")]
    pub method: String,
}

fn default_method() -> String {
    "GET".to_string()
}

/// Envelope of every list endpoint.
#[derive(Debug, Deserialize)]
pub struct ListPage {
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl ListPage {
    pub fn link(&self, rel: &str) -> Option<&Link> {
        self.links.iter().find(|link| link.rel == rel)
    }
}

/// Body of `POST /upload/multipart`.
#[derive(Debug, Serialize)]
pub struct UploadInit {
    pub name: String,
    pub size: u64,
    pub part_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub automation_id: Option<String>,
}

/// Response of `POST /upload/multipart`.
#[derive(Debug, Deserialize)]
pub struct UploadSession {
    pub upload_id: String,
    #[serde(default)]
    pub part_size: Option<u64>,
}

/// Response of `GET /upload/multipart/{id}/part/{n}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PartUrl {
    pub url: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
}

/// Body of `POST /upload/multipart/{id}/part`.
#[derive(Debug, Serialize)]
pub struct PartReport {
    pub part_number: u32,
    pub response: PartReportResponse,
}

#[derive(Debug, Serialize)]
pub struct PartReportResponse {
    pub headers: PartReportHeaders,
}

#[derive(Debug, Serialize)]
pub struct PartReportHeaders {
    #[serde(rename = "ETag")]
    pub etag: String,
}

impl PartReport {
    pub fn new(part_number: u32, etag: impl Into<String>) -> Self {
        Self {
            part_number,
            response: PartReportResponse {
                headers: PartReportHeaders { etag: etag.into() },
            },
        }
    }
}

/// Response of `GET /files/{id}/download_info`.
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadInfo {
    pub url: String,
}
