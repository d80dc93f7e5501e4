//! Ranged, parallel download into a temp file renamed into place on success.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use futures_util::StreamExt;
use reqwest::header::{CONTENT_LENGTH, RANGE};
use reqwest::{Client, StatusCode};
use sha2::{Digest, Sha256};
use std::io::SeekFrom;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufWriter};
use url::Url;

use super::control::Control;
use super::handle::TransferHandle;
use super::window::run_parts;
use super::{CHUNK_SIZE, DEFAULT_PART_SIZE, MIN_PART_SIZE, Part, partition};
use crate::http::{Api, error_for_response};
use crate::retry::with_retries_until;
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub part_size: u64,
    pub overwrite: bool,
    /// Retries per part; defaults to the API's retry count.
    pub retry_count: Option<u32>,
    /// Per-request timeout; defaults to the API's timeout.
    pub timeout: Option<Duration>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
            overwrite: false,
            retry_count: None,
            timeout: None,
        }
    }
}

/// A multipart download of a signed URL to a local path.
#[derive(Debug)]
pub struct Download {
    handle: TransferHandle<PathBuf>,
    url: Url,
    destination: PathBuf,
}

struct Job {
    client: Client,
    url: Url,
    destination: PathBuf,
    part_size: u64,
    retries: u32,
    backoff: Duration,
    timeout: Duration,
}

impl Download {
    /// Prepare a download. Fails up front when `destination` exists and
    /// `overwrite` is not set.
    pub fn new(
        api: &Api,
        url: &str,
        destination: impl Into<PathBuf>,
        options: DownloadOptions,
    ) -> Result<Self> {
        let destination = destination.into();
        if options.part_size < MIN_PART_SIZE {
            return Err(Error::Validation(format!(
                "part size must be at least {} bytes",
                MIN_PART_SIZE
            )));
        }
        if destination.exists() && !options.overwrite {
            return Err(Error::LocalFileAlreadyExists(destination));
        }
        let url = Url::parse(url)
            .map_err(|e| Error::Validation(format!("invalid download url '{}': {}", url, e)))?;

        let job = Job {
            client: api.data_client().clone(),
            url: url.clone(),
            destination: destination.clone(),
            part_size: options.part_size,
            retries: options.retry_count.unwrap_or_else(|| api.retry_count()),
            backoff: api.backoff(),
            timeout: options.timeout.unwrap_or_else(|| api.timeout()),
        };
        let control = Arc::new(Control::new());
        let pool = api.download_pool().clone();
        let task = {
            let control = control.clone();
            Box::pin(async move { job.run(control, pool).await })
        };
        Ok(Self {
            handle: TransferHandle::new(control, task),
            url,
            destination,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Path the parts are written to before the final rename.
    pub fn temp_path(&self) -> PathBuf {
        temp_path(&self.destination)
    }
}

impl Deref for Download {
    type Target = TransferHandle<PathBuf>;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl DerefMut for Download {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.handle
    }
}

impl Job {
    async fn run(self, control: Arc<Control>, pool: super::TransferPool) -> Result<PathBuf> {
        let size = with_retries_until(
            "probe download size",
            self.retries,
            self.backoff,
            control.stopped(),
            || self.probe(),
        )
        .await?;
        tracing::info!(
            "downloading {} bytes to {}",
            size,
            self.destination.display()
        );

        if size == 0 {
            control.begin(1, 0);
            fs::File::create(&self.destination).await?;
            control.part_done(0);
            return Ok(self.destination);
        }

        let temp = temp_path(&self.destination);
        let parts = partition(size, self.part_size);
        control.begin(parts.len(), size);

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&temp)
            .await?;
        file.set_len(size).await?;
        drop(file);

        let job = Arc::new(self);
        let result = {
            let job = job.clone();
            let temp = temp.clone();
            let stop = control.clone();
            run_parts(&control, &pool, parts, move |part| {
                let job = job.clone();
                let temp = temp.clone();
                let control = stop.clone();
                async move { job.fetch_part(&control, &temp, part).await }
            })
            .await
        };
        if let Err(e) = result {
            tracing::debug!("download interrupted, keeping {}", temp.display());
            return Err(e);
        }

        control.checkpoint().await?;
        fs::rename(&temp, &job.destination).await.map_err(|e| {
            Error::Internal(format!(
                "failed to move {} to {}: {} (partial file kept)",
                temp.display(),
                job.destination.display(),
                e
            ))
        })?;
        Ok(job.destination.clone())
    }

    /// Open the URL as a stream and read `Content-Length` without consuming
    /// the body.
    async fn probe(&self) -> Result<u64> {
        let response = self
            .client
            .get(self.url.clone())
            .timeout(self.timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_for_response(response, false).await);
        }
        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
            .ok_or_else(|| Error::Internal("missing Content-Length header".to_string()))
    }

    async fn fetch_part(&self, control: &Control, temp: &Path, part: Part) -> Result<u64> {
        let what = format!("download part {}", part.number);
        with_retries_until(&what, self.retries, self.backoff, control.stopped(), || {
            self.write_part(temp, part)
        })
        .await
    }

    async fn write_part(&self, temp: &Path, part: Part) -> Result<u64> {
        let response = self
            .client
            .get(self.url.clone())
            .header(RANGE, part.range_header())
            .timeout(self.timeout)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(error_for_response(response, false).await);
        }
        if status != StatusCode::PARTIAL_CONTENT && part.start != 0 {
            return Err(Error::Internal(format!(
                "server ignored range request for part {}",
                part.number
            )));
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(temp)
            .await?;
        file.seek(SeekFrom::Start(part.start)).await?;
        let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);

        let mut written = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            let remaining = part.len() - written;
            // a 200 for the first part carries the whole file
            let take = (chunk.len() as u64).min(remaining) as usize;
            writer.write_all(&chunk[..take]).await?;
            written += take as u64;
            if written == part.len() {
                break;
            }
        }
        writer.flush().await?;

        if written != part.len() {
            return Err(Error::Internal(format!(
                "part {} received {} of {} bytes",
                part.number,
                written,
                part.len()
            )));
        }
        tracing::debug!("downloaded part {} ({} bytes)", part.number, written);
        Ok(written)
    }
}

/// Destination plus a short suffix derived from a hash of the destination,
/// stable across retries of the same download.
pub fn temp_path(destination: &Path) -> PathBuf {
    let digest = Sha256::digest(destination.to_string_lossy().as_bytes());
    let suffix = URL_SAFE_NO_PAD.encode(&digest[..6]);
    let mut name = destination.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
