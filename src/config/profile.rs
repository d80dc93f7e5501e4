//! Credentials file (`~/.sbgrc`) parsing.
//!
//! The file is INI-shaped: `[name]` opens a profile, `key = value` lines set
//! its entries, `#` and `;` start comment lines.
//!
//! ```text
//! [default]
//! api-url = https://api.sbgenomics.com/v2
//! auth-token = 0123456789abcdef
//!
//! [cgc]
//! api-url = https://cgc-api.sbgenomics.com/v2
//! oauth-token = eyJhbGciOi...
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Connection settings read from one profile section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub api_url: Option<String>,
    pub auth_token: Option<String>,
    pub oauth_token: Option<String>,
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
}

/// All profiles of a credentials file.
#[derive(Debug, Clone, Default)]
pub struct ProfileFile {
    profiles: HashMap<String, Profile>,
}

impl ProfileFile {
    /// `~/.sbgrc`, if a home directory can be determined.
    pub fn default_path() -> Option<PathBuf> {
        home::home_dir().map(|home| home.join(".sbgrc"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read '{}': {}", path.display(), e))
        })?;
        Self::parse(&contents, path)
    }

    /// Parse file contents; `path` is only used in error messages.
    pub fn parse(input: &str, path: &Path) -> Result<Self> {
        let mut profiles: HashMap<String, Profile> = HashMap::new();
        let mut current: Option<String> = None;

        for (index, line) in input.lines().enumerate() {
            let line_number = index + 1;
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            if trimmed.starts_with('[') {
                let end = trimmed
                    .find(']')
                    .ok_or_else(|| parse_error(path, line_number, "unterminated profile header"))?;
                let name = trimmed[1..end].trim();
                if name.is_empty() {
                    return Err(parse_error(path, line_number, "profile name must be non-empty"));
                }
                profiles.entry(name.to_string()).or_default();
                current = Some(name.to_string());
                continue;
            }

            let (key, value) = trimmed
                .split_once('=')
                .ok_or_else(|| parse_error(path, line_number, "expected 'key = value' format"))?;

            let Some(name) = current.as_ref() else {
                return Err(parse_error(path, line_number, "entry outside of a profile section"));
            };
            let profile = profiles.entry(name.clone()).or_default();
            let value = Some(value.trim().to_string()).filter(|v| !v.is_empty());

            match key.trim().to_ascii_lowercase().as_str() {
                "api-url" | "api_url" => profile.api_url = value,
                "auth-token" | "auth_token" => profile.auth_token = value,
                "oauth-token" | "oauth_token" => profile.oauth_token = value,
                "http-proxy" | "http_proxy" => profile.http_proxy = value,
                "https-proxy" | "https_proxy" => profile.https_proxy = value,
                other => tracing::debug!("ignoring unknown profile key '{}'", other),
            }
        }

        Ok(Self { profiles })
    }

    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}

fn parse_error(path: &Path, line: usize, message: &str) -> Error {
    Error::Config(format!("{}: line {}: {}", path.display(), line, message))
}
