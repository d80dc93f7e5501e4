use reqwest::header::{CONTENT_TYPE, HeaderMap};
use reqwest::{Client, Method, Proxy, Response, StatusCode};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use url::Url;

use super::handlers::ErrorHandler;
use super::rate_limit::{self, RateLimit, RateLimitStatus};
use crate::config::{Auth, Config};
use crate::error::{ApiError, is_transient_status};
use crate::resources::User;
use crate::resource::Record;
use crate::retry::retry_delay;
use crate::transfer::TransferPool;
use crate::{Error, Result};

/// Header carrying the platform token.
pub const AUTH_TOKEN_HEADER: &str = "X-SBG-Auth-Token";
/// Header carrying the total size of a list query.
pub const TOTAL_HEADER: &str = "x-total-matching-query";

/// Statuses the transport retries for idempotent requests.
const RETRY_STATUSES: [u16; 2] = [500, 503];

/// A replayable control-plane request.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub url: Url,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RequestSpec {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            query: Vec::new(),
            body: None,
        }
    }

    pub fn query(mut self, query: &[(String, String)]) -> Self {
        self.query.extend_from_slice(query);
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn is_idempotent(&self) -> bool {
        matches!(
            self.method,
            Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS
        )
    }
}

/// Decoded JSON response with the headers it came with.
#[derive(Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl ApiResponse {
    /// Value of `x-total-matching-query`, if present.
    pub fn total(&self) -> Option<u64> {
        rate_limit::header_u64(&self.headers, TOTAL_HEADER)
    }
}

#[derive(Debug, Default)]
struct LastResponse {
    rate_limit: Option<RateLimit>,
    request_id: Option<String>,
}

struct Inner {
    client: Client,
    base_url: String,
    auth: Auth,
    timeout: Duration,
    retry_count: u32,
    backoff: Duration,
    handlers: Vec<Arc<dyn ErrorHandler>>,
    download_pool: TransferPool,
    upload_pool: TransferPool,
    last: Mutex<LastResponse>,
}

/// Handle to the platform API.
///
/// Cloning is cheap; clones share the HTTP session, the transfer pools and
/// the rate-limit bookkeeping.
#[derive(Clone)]
pub struct Api {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Api {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Api")
            .field("base_url", &self.inner.base_url)
            .field("auth", &self.inner.auth)
            .finish()
    }
}

/// Builder for [`Api`], used to attach error handlers.
pub struct ApiBuilder {
    config: Config,
    handlers: Vec<Arc<dyn ErrorHandler>>,
}

impl ApiBuilder {
    /// Append a handler; handlers run in the order they were added.
    pub fn error_handler(mut self, handler: impl ErrorHandler + 'static) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn build(self) -> Result<Api> {
        let config = self.config;
        let base_url = config.base_url()?.as_str().trim_end_matches('/').to_string();
        let auth = config.auth()?;

        let mut builder = Client::builder()
            .timeout(config.timeout_duration())
            .user_agent(concat!("sbgr/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(config.download_max_workers.max(config.upload_max_workers))
            // proxies come from the config only
            .no_proxy();
        if let Some(proxy) = &config.http_proxy {
            let proxy = Proxy::http(proxy)
                .map_err(|e| Error::Config(format!("invalid http proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }
        if let Some(proxy) = &config.https_proxy {
            let proxy = Proxy::https(proxy)
                .map_err(|e| Error::Config(format!("invalid https proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Internal(format!("failed to create HTTP client: {}", e)))?;

        Ok(Api {
            inner: Arc::new(Inner {
                client,
                base_url,
                auth,
                timeout: config.timeout_duration(),
                retry_count: config.retry_count,
                backoff: config.backoff(),
                handlers: self.handlers,
                download_pool: TransferPool::new(config.download_max_workers),
                upload_pool: TransferPool::new(config.upload_max_workers),
                last: Mutex::new(LastResponse::default()),
            }),
        })
    }
}

impl Api {
    pub fn new(config: &Config) -> Result<Self> {
        Self::builder(config.clone()).build()
    }

    pub fn builder(config: Config) -> ApiBuilder {
        ApiBuilder {
            config,
            handlers: Vec::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Resolve a path relative to the base URL, or pass an absolute href through.
    pub fn url(&self, path: &str) -> Result<Url> {
        let raw = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.inner.base_url, path.trim_start_matches('/'))
        };
        Url::parse(&raw).map_err(|e| Error::Validation(format!("invalid url '{}': {}", raw, e)))
    }

    /// Client for data-plane requests against signed storage URLs. Requests
    /// made with it carry no platform credentials.
    pub fn data_client(&self) -> &Client {
        &self.inner.client
    }

    pub fn download_pool(&self) -> &TransferPool {
        &self.inner.download_pool
    }

    pub fn upload_pool(&self) -> &TransferPool {
        &self.inner.upload_pool
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    pub fn retry_count(&self) -> u32 {
        self.inner.retry_count
    }

    pub fn backoff(&self) -> Duration {
        self.inner.backoff
    }

    /// Rate-limit headers of the most recent control-plane response.
    pub fn rate_limit(&self) -> Option<RateLimit> {
        self.last().rate_limit
    }

    /// `x-request-id` of the most recent control-plane response.
    pub fn request_id(&self) -> Option<String> {
        self.last().request_id.clone()
    }

    fn last(&self) -> std::sync::MutexGuard<'_, LastResponse> {
        self.inner.last.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn observe(&self, headers: &HeaderMap) {
        let rate = RateLimit::from_headers(headers);
        let id = rate_limit::request_id(headers);
        let mut last = self.last();
        if rate.is_some() {
            last.rate_limit = rate;
        }
        if id.is_some() {
            last.request_id = id;
        }
    }

    /// Issue a request once: auth and content type injected, no retries,
    /// no status mapping.
    pub async fn execute(&self, spec: &RequestSpec) -> Result<Response> {
        let mut request = self
            .inner
            .client
            .request(spec.method.clone(), spec.url.clone())
            .header(CONTENT_TYPE, "application/json");
        request = match &self.inner.auth {
            Auth::Token(token) => request.header(AUTH_TOKEN_HEADER, token),
            Auth::OAuth(token) => request.bearer_auth(token),
        };
        if !spec.query.is_empty() {
            request = request.query(&spec.query);
        }
        if let Some(body) = &spec.body {
            request = request.json(body);
        }
        tracing::debug!("{} {}", spec.method, spec.url);
        Ok(request.send().await?)
    }

    /// Issue a request with transport retries and the error-handler chain,
    /// mapping failing statuses to errors.
    pub async fn send(&self, spec: RequestSpec) -> Result<Response> {
        self.send_with_retries(spec, self.inner.retry_count).await
    }

    async fn send_with_retries(&self, spec: RequestSpec, retries: u32) -> Result<Response> {
        let idempotent = spec.is_idempotent();
        let mut attempt = 0;
        let mut response = loop {
            let result = self.execute(&spec).await;
            let retryable = idempotent
                && match &result {
                    Ok(response) => RETRY_STATUSES.contains(&response.status().as_u16()),
                    Err(e) => e.is_transient(),
                };
            if !retryable || attempt >= retries {
                break result?;
            }
            let delay = retry_delay(attempt, self.inner.backoff);
            tracing::warn!(
                "{} {} failed (attempt {}), retrying in {:?}",
                spec.method,
                spec.url,
                attempt + 1,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        };

        for handler in &self.inner.handlers {
            if !is_transient_status(response.status().as_u16()) {
                break;
            }
            response = handler.handle(self, &spec, response).await?;
        }

        self.observe(response.headers());
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_for_response(response, true).await)
        }
    }

    /// [`send`](Self::send) and decode the JSON body.
    pub async fn call(&self, spec: RequestSpec) -> Result<ApiResponse> {
        let response = self.send(spec).await?;
        decode(response).await
    }

    /// [`call`](Self::call) without transport retries, for callers that run
    /// their own retry loop.
    pub async fn call_once(&self, spec: RequestSpec) -> Result<ApiResponse> {
        let response = self.send_with_retries(spec, 0).await?;
        decode(response).await
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        Ok(self.get_with(path, &[]).await?.body)
    }

    pub async fn get_with(&self, path: &str, query: &[(String, String)]) -> Result<ApiResponse> {
        let spec = RequestSpec::new(Method::GET, self.url(path)?).query(query);
        self.call(spec).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value> {
        Ok(self.post_with(path, &[], body).await?.body)
    }

    pub async fn post_with(
        &self,
        path: &str,
        query: &[(String, String)],
        body: Value,
    ) -> Result<ApiResponse> {
        let spec = RequestSpec::new(Method::POST, self.url(path)?)
            .query(query)
            .json(body);
        self.call(spec).await
    }

    pub async fn patch(&self, path: &str, body: Value) -> Result<Value> {
        let spec = RequestSpec::new(Method::PATCH, self.url(path)?).json(body);
        Ok(self.call(spec).await?.body)
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<Value> {
        let spec = RequestSpec::new(Method::PUT, self.url(path)?).json(body);
        Ok(self.call(spec).await?.body)
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        let spec = RequestSpec::new(Method::DELETE, self.url(path)?);
        self.send(spec).await?;
        Ok(())
    }

    /// Authenticated GET whose body is handed back undecoded for streaming.
    pub async fn stream(&self, path: &str) -> Result<Response> {
        self.send(RequestSpec::new(Method::GET, self.url(path)?)).await
    }

    /// `GET /` - the endpoint index.
    pub async fn endpoints(&self) -> Result<Value> {
        self.get("/").await
    }

    /// `GET /rate_limit`.
    pub async fn rate_limit_status(&self) -> Result<RateLimitStatus> {
        let body = self.get("rate_limit").await?;
        Ok(serde_json::from_value(body)?)
    }

    /// `GET /user` - the authenticated user.
    pub async fn user(&self) -> Result<Record<User>> {
        let body = self.get("user").await?;
        Record::from_value(self.clone(), body)
    }
}

/// Turn a failing response into an error. `json_endpoint` controls whether a
/// body that is not the platform's error document means the service is
/// unavailable (control plane) or is just a plain-text reason (data plane).
pub(crate) async fn error_for_response(response: Response, json_endpoint: bool) -> Error {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    match ApiError::from_body(status, &text) {
        Some(body) => Error::from_status(status, body),
        None if json_endpoint => Error::non_json(status),
        None => {
            let mut message = text.trim().to_string();
            message.truncate(512);
            if message.is_empty() {
                message = status.canonical_reason().unwrap_or("request failed").to_string();
            }
            Error::from_status(status, ApiError::new(status, message))
        }
    }
}

/// Decode a successful control-plane response; an empty body is `Null`.
async fn decode(response: Response) -> Result<ApiResponse> {
    let status = response.status();
    let headers = response.headers().clone();
    let text = response.text().await?;
    let body = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).map_err(|_| Error::non_json(status))?
    };
    Ok(ApiResponse {
        status,
        headers,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(url: &str) -> Api {
        Api::new(&Config::new(url, "token")).unwrap()
    }

    #[test]
    fn test_url_relative_path() {
        let api = api("https://api.example.com/v2/");
        assert_eq!(api.base_url(), "https://api.example.com/v2");
        assert_eq!(
            api.url("/files/abc").unwrap().as_str(),
            "https://api.example.com/v2/files/abc"
        );
        assert_eq!(
            api.url("files/abc").unwrap().as_str(),
            "https://api.example.com/v2/files/abc"
        );
    }

    #[test]
    fn test_url_absolute_href() {
        let api = api("https://api.example.com/v2");
        let href = "https://other.example.com/v2/files?offset=2&limit=2";
        assert_eq!(api.url(href).unwrap().as_str(), href);
    }

    #[test]
    fn test_idempotent_methods() {
        let url = Url::parse("https://api/x").unwrap();
        assert!(RequestSpec::new(Method::GET, url.clone()).is_idempotent());
        assert!(RequestSpec::new(Method::PUT, url.clone()).is_idempotent());
        assert!(RequestSpec::new(Method::DELETE, url.clone()).is_idempotent());
        assert!(!RequestSpec::new(Method::POST, url.clone()).is_idempotent());
        assert!(!RequestSpec::new(Method::PATCH, url).is_idempotent());
    }

    #[test]
    fn test_invalid_proxy_is_config_error() {
        let config = Config {
            https_proxy: Some("::not a url::".to_string()),
            ..Config::new("https://api", "token")
        };
        assert!(matches!(Api::new(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_pools_follow_config() {
        let config = Config {
            download_max_workers: 3,
            upload_max_workers: 5,
            ..Config::new("https://api", "token")
        };
        let api = Api::new(&config).unwrap();
        assert_eq!(api.download_pool().size(), 3);
        assert_eq!(api.upload_pool().size(), 5);
    }
}
