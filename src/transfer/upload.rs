//! Three-phase multipart upload: init, per-part negotiate/upload/report,
//! complete. Any failure or stop after init aborts the server-side session.

use bytes::Bytes;
use reqwest::header::ETAG;
use reqwest::{Client, Method};
use serde_json::json;
use std::io::SeekFrom;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File as LocalFile;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::control::Control;
use super::handle::TransferHandle;
use super::window::run_parts;
use super::{DEFAULT_PART_SIZE, MAX_TOTAL_SIZE, MIN_PART_SIZE, Part, TransferPool, partition};
use crate::http::{Api, RequestSpec, error_for_response};
use crate::resource::Record;
use crate::resources::File;
use crate::retry::with_retries_until;
use crate::types::{PartReport, PartUrl, UploadInit, UploadSession};
use crate::{Error, Result};

const CODE_PACKAGE_TYPE: &str = "CODE_PACKAGE_FILE";

/// Where an uploaded file lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadTarget {
    /// Root of a project.
    Project(String),
    /// A folder.
    Parent(String),
    /// Code package of an automation.
    CodePackage { automation_id: String },
}

#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Remote name; defaults to the local file name.
    pub file_name: Option<String>,
    pub overwrite: bool,
    pub part_size: u64,
    /// Retries for each per-part step (URL negotiation, data-plane PUT and
    /// report); defaults to the API's retry count.
    pub retry_count: Option<u32>,
    pub timeout: Option<Duration>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            file_name: None,
            overwrite: false,
            part_size: DEFAULT_PART_SIZE,
            retry_count: None,
            timeout: None,
        }
    }
}

/// A multipart upload of a local file.
#[derive(Debug)]
pub struct Upload {
    handle: TransferHandle<Record<File>>,
    path: PathBuf,
    size: u64,
}

struct Job {
    api: Api,
    client: Client,
    path: PathBuf,
    name: String,
    size: u64,
    target: UploadTarget,
    overwrite: bool,
    part_size: u64,
    retries: u32,
    backoff: Duration,
    timeout: Duration,
}

impl Upload {
    pub fn new(
        api: &Api,
        path: impl Into<PathBuf>,
        target: UploadTarget,
        options: UploadOptions,
    ) -> Result<Self> {
        let path = path.into();
        if options.part_size < MIN_PART_SIZE {
            return Err(Error::Validation(format!(
                "part size must be at least {} bytes",
                MIN_PART_SIZE
            )));
        }
        let size = std::fs::metadata(&path)?.len();
        check_size(size, &target)?;
        let empty_id = match &target {
            UploadTarget::Project(id) | UploadTarget::Parent(id) => id.is_empty(),
            UploadTarget::CodePackage { automation_id } => automation_id.is_empty(),
        };
        if empty_id {
            return Err(Error::Validation(
                "upload target id must be non-empty".to_string(),
            ));
        }
        let name = match options.file_name {
            Some(name) => name,
            None => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    Error::Validation(format!("{} has no file name", path.display()))
                })?,
        };

        let job = Job {
            api: api.clone(),
            client: api.data_client().clone(),
            path: path.clone(),
            name,
            size,
            target,
            overwrite: options.overwrite,
            part_size: options.part_size,
            retries: options.retry_count.unwrap_or_else(|| api.retry_count()),
            backoff: api.backoff(),
            timeout: options.timeout.unwrap_or_else(|| api.timeout()),
        };
        let control = Arc::new(Control::new());
        let pool = api.upload_pool().clone();
        let task = {
            let control = control.clone();
            Box::pin(async move { Arc::new(job).run(control, pool).await })
        };
        Ok(Self {
            handle: TransferHandle::new(control, task),
            path,
            size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the local file when the upload was prepared.
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Deref for Upload {
    type Target = TransferHandle<Record<File>>;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl DerefMut for Upload {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.handle
    }
}

impl Job {
    async fn run(self: Arc<Self>, control: Arc<Control>, pool: TransferPool) -> Result<Record<File>> {
        let session = self.init().await?;
        let upload_id = session.upload_id;
        tracing::info!(
            "upload {} started for {} ({} bytes)",
            upload_id,
            self.path.display(),
            self.size
        );

        let result = self.transfer(&control, &pool, &upload_id, session.part_size).await;
        let outcome = match result {
            Ok(()) => self.complete(&upload_id).await,
            Err(e) => Err(e),
        };
        if outcome.is_err() {
            self.abort(&upload_id).await;
        }
        outcome
    }

    async fn init(&self) -> Result<UploadSession> {
        let (project, parent, kind, automation_id) = match &self.target {
            UploadTarget::Project(id) => (Some(id.clone()), None, None, None),
            UploadTarget::Parent(id) => (None, Some(id.clone()), None, None),
            UploadTarget::CodePackage { automation_id } => (
                None,
                None,
                Some(CODE_PACKAGE_TYPE.to_string()),
                Some(automation_id.clone()),
            ),
        };
        let body = UploadInit {
            name: self.name.clone(),
            size: self.size,
            part_size: self.part_size,
            project,
            parent,
            kind,
            automation_id,
        };
        let query = [("overwrite".to_string(), self.overwrite.to_string())];
        let response = self
            .api
            .post_with("upload/multipart", &query, serde_json::to_value(body)?)
            .await?;
        Ok(serde_json::from_value(response.body)?)
    }

    async fn transfer(
        self: &Arc<Self>,
        control: &Arc<Control>,
        pool: &TransferPool,
        upload_id: &str,
        server_part_size: Option<u64>,
    ) -> Result<()> {
        let part_size = match server_part_size {
            Some(adjusted) if adjusted > 0 && adjusted != self.part_size => {
                tracing::debug!(
                    "server adjusted part size from {} to {}",
                    self.part_size,
                    adjusted
                );
                adjusted
            }
            _ => self.part_size,
        };
        let parts = partition(self.size, part_size);
        control.begin(parts.len(), self.size);

        let upload_id: Arc<str> = Arc::from(upload_id);
        run_parts(control, pool, parts, |part| {
            let job = self.clone();
            let control = control.clone();
            let upload_id = upload_id.clone();
            async move { job.upload_part(&control, &upload_id, part).await }
        })
        .await?;
        control.checkpoint().await
    }

    async fn upload_part(&self, control: &Control, upload_id: &str, part: Part) -> Result<u64> {
        let data = self.read_part(part).await?;

        let negotiate = self
            .api
            .url(&format!("upload/multipart/{}/part/{}", upload_id, part.number))?;
        let what = format!("negotiate part {}", part.number);
        let response = with_retries_until(&what, self.retries, self.backoff, control.stopped(), || {
            self.api
                .call_once(RequestSpec::new(Method::GET, negotiate.clone()))
        })
        .await?;
        let target: PartUrl = serde_json::from_value(response.body)?;
        control.checkpoint().await?;

        let what = format!("upload part {}", part.number);
        let etag = with_retries_until(&what, self.retries, self.backoff, control.stopped(), || {
            self.put_part(&target, data.clone())
        })
        .await?;
        control.checkpoint().await?;

        let report = format!("upload/multipart/{}/part", upload_id);
        let body = serde_json::to_value(PartReport::new(part.number, etag))?;
        let what = format!("report part {}", part.number);
        with_retries_until(&what, self.retries, self.backoff, control.stopped(), || {
            self.api.post(&report, body.clone())
        })
        .await?;

        tracing::debug!("uploaded part {} ({} bytes)", part.number, part.len());
        Ok(part.len())
    }

    async fn read_part(&self, part: Part) -> Result<Bytes> {
        let mut file = LocalFile::open(&self.path).await?;
        file.seek(SeekFrom::Start(part.start)).await?;
        let mut buffer = vec![0u8; part.len() as usize];
        file.read_exact(&mut buffer).await?;
        Ok(Bytes::from(buffer))
    }

    async fn put_part(&self, target: &PartUrl, data: Bytes) -> Result<String> {
        let method = match target.method.as_deref() {
            Some(method) => Method::from_bytes(method.as_bytes())
                .map_err(|_| Error::Internal(format!("invalid part method '{}'", method)))?,
            None => Method::PUT,
        };
        let mut request = self
            .client
            .request(method, &target.url)
            .timeout(self.timeout)
            .body(data);
        if let Some(headers) = &target.headers {
            for (name, value) in headers {
                request = request.header(name.as_str(), value.as_str());
            }
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(error_for_response(response, false).await);
        }
        response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().trim_matches('"').to_string())
            .ok_or_else(|| Error::Internal("storage response has no ETag".to_string()))
    }

    async fn complete(&self, upload_id: &str) -> Result<Record<File>> {
        let body = self
            .api
            .post(&format!("upload/multipart/{}/complete", upload_id), json!({}))
            .await?;
        tracing::info!("upload {} completed", upload_id);
        Record::from_value(self.api.clone(), body)
    }

    async fn abort(&self, upload_id: &str) {
        tracing::info!("aborting upload {}", upload_id);
        if let Err(e) = self
            .api
            .delete(&format!("upload/multipart/{}", upload_id))
            .await
        {
            tracing::warn!("failed to abort upload {}: {}", upload_id, e);
        }
    }
}

/// Uploads may not exceed [`MAX_TOTAL_SIZE`]; code packages may not be empty.
fn check_size(size: u64, target: &UploadTarget) -> Result<()> {
    if size > MAX_TOTAL_SIZE {
        return Err(Error::Validation(format!(
            "file is {} bytes, the maximum upload size is {} bytes",
            size, MAX_TOTAL_SIZE
        )));
    }
    if size == 0 && matches!(target, UploadTarget::CodePackage { .. }) {
        return Err(Error::Validation(
            "code package uploads must not be empty".to_string(),
        ));
    }
    Ok(())
}
