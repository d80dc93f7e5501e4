mod profile;

pub use profile::{Profile, ProfileFile};

use clap::Args;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::{Error, Result};

pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_MAX_WORKERS: usize = 16;
pub const DEFAULT_RETRY_COUNT: u32 = 6;
pub const DEFAULT_BACKOFF_FACTOR: f64 = 1.0;

#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Platform API base URL (e.g., https://api.sbgenomics.com/v2)
    #[arg(long = "api-url", env = "API_URL")]
    pub url: Option<String>,

    /// Platform authentication token
    #[arg(long, env = "AUTH_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// OAuth bearer token (alternative to --token)
    #[arg(long, env = "OAUTH_TOKEN", hide_env_values = true)]
    pub oauth_token: Option<String>,

    /// Profile name in the credentials file
    #[arg(long, default_value = "default")]
    pub profile: String,

    /// Credentials file (defaults to ~/.sbgrc)
    #[arg(long)]
    pub config_file: Option<PathBuf>,

    /// Proxy for plain HTTP requests
    #[arg(long, env = "HTTP_PROXY")]
    pub http_proxy: Option<String>,

    /// Proxy for HTTPS requests
    #[arg(long, env = "HTTPS_PROXY")]
    pub https_proxy: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Size of the shared download worker pool
    #[arg(long, default_value_t = DEFAULT_MAX_WORKERS)]
    pub download_max_workers: usize,

    /// Size of the shared upload worker pool
    #[arg(long, default_value_t = DEFAULT_MAX_WORKERS)]
    pub upload_max_workers: usize,

    /// Retries for transient HTTP failures (500, 503)
    #[arg(long, default_value_t = DEFAULT_RETRY_COUNT)]
    pub retry_count: u32,

    /// Base backoff between retries in seconds
    #[arg(long, default_value_t = DEFAULT_BACKOFF_FACTOR)]
    pub backoff_factor: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            oauth_token: None,
            profile: "default".to_string(),
            config_file: None,
            http_proxy: None,
            https_proxy: None,
            timeout: DEFAULT_TIMEOUT_SECS,
            download_max_workers: DEFAULT_MAX_WORKERS,
            upload_max_workers: DEFAULT_MAX_WORKERS,
            retry_count: DEFAULT_RETRY_COUNT,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
        }
    }
}

/// How requests authenticate against the platform.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// `X-SBG-Auth-Token: <token>`
    Token(String),
    /// `Authorization: Bearer <token>`
    OAuth(String),
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::Token(_) => f.write_str("Auth::Token(***)"),
            Auth::OAuth(_) => f.write_str("Auth::OAuth(***)"),
        }
    }
}

impl Config {
    /// Config with an explicit URL and platform token, defaults elsewhere.
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            token: Some(token.into()),
            ..Self::default()
        }
    }

    /// Config populated from `API_URL`, `AUTH_TOKEN`, `OAUTH_TOKEN`,
    /// `HTTP_PROXY` and `HTTPS_PROXY`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |key: &str| lookup(key).filter(|v| !v.is_empty());
        Self {
            url: lookup("API_URL"),
            token: lookup("AUTH_TOKEN"),
            oauth_token: lookup("OAUTH_TOKEN"),
            http_proxy: lookup("HTTP_PROXY"),
            https_proxy: lookup("HTTPS_PROXY"),
            ..Self::default()
        }
    }

    /// Config populated from one profile of a credentials file.
    pub fn from_profile(profile: &str, path: Option<PathBuf>) -> Result<Self> {
        let config = Self {
            profile: profile.to_string(),
            config_file: path,
            ..Self::default()
        };
        let file = ProfileFile::load(&config.profile_path()?)?;
        let found = file
            .profile(profile)
            .ok_or_else(|| Error::Config(format!("profile '{}' not found", profile)))?;
        Ok(config.fill_from(found))
    }

    /// Fill fields that are still unset from the configured profile.
    ///
    /// A missing credentials file is not an error as long as the config is
    /// already complete.
    pub fn merge_profile(self) -> Result<Self> {
        if self.url.is_some() && (self.token.is_some() || self.oauth_token.is_some()) {
            return Ok(self);
        }
        let path = self.profile_path()?;
        if !path.exists() {
            tracing::debug!("credentials file {:?} not found", path);
            return Ok(self);
        }
        let file = ProfileFile::load(&path)?;
        match file.profile(&self.profile) {
            Some(found) => Ok(self.fill_from(found)),
            None => Err(Error::Config(format!(
                "profile '{}' not found in {}",
                self.profile,
                path.display()
            ))),
        }
    }

    fn profile_path(&self) -> Result<PathBuf> {
        match &self.config_file {
            Some(path) => Ok(path.clone()),
            None => ProfileFile::default_path()
                .ok_or_else(|| Error::Config("cannot determine home directory".to_string())),
        }
    }

    fn fill_from(mut self, profile: &Profile) -> Self {
        let has_auth = self.token.is_some() || self.oauth_token.is_some();
        self.url = self.url.or_else(|| profile.api_url.clone());
        if !has_auth {
            self.token = profile.auth_token.clone();
            self.oauth_token = profile.oauth_token.clone();
        }
        self.http_proxy = self.http_proxy.or_else(|| profile.http_proxy.clone());
        self.https_proxy = self.https_proxy.or_else(|| profile.https_proxy.clone());
        self
    }

    /// Base URL with any trailing slash removed.
    pub fn base_url(&self) -> Result<Url> {
        let raw = self
            .url
            .as_deref()
            .ok_or_else(|| Error::Config("API url is missing".to_string()))?;
        let trimmed = raw.trim_end_matches('/');
        Url::parse(trimmed).map_err(|e| Error::Config(format!("invalid API url '{}': {}", raw, e)))
    }

    /// Exactly one of `token` and `oauth_token` must be set.
    pub fn auth(&self) -> Result<Auth> {
        match (&self.token, &self.oauth_token) {
            (Some(token), None) => Ok(Auth::Token(token.clone())),
            (None, Some(token)) => Ok(Auth::OAuth(token.clone())),
            (Some(_), Some(_)) => Err(Error::Config(
                "both token and oauth token are set; supply only one".to_string(),
            )),
            (None, None) => Err(Error::Config("authentication token is missing".to_string())),
        }
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs_f64(self.backoff_factor.max(0.0))
    }
}
