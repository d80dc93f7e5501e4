use reqwest::StatusCode;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

use crate::transfer::TransferStatus;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("bad request: {0}")]
    BadRequest(ApiError),

    #[error("unauthorized: {0}")]
    Unauthorized(ApiError),

    #[error("forbidden: {0}")]
    Forbidden(ApiError),

    #[error("not found: {0}")]
    NotFound(ApiError),

    #[error("method not allowed: {0}")]
    MethodNotAllowed(ApiError),

    #[error("request timeout: {0}")]
    RequestTimeout(ApiError),

    #[error("conflict: {0}")]
    Conflict(ApiError),

    #[error("too many requests: {0}")]
    TooManyRequests(ApiError),

    #[error("server error: {0}")]
    ServerError(ApiError),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(ApiError),

    #[error("field '{0}' is read-only")]
    ReadOnly(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("resource not modified")]
    NotModified,

    #[error("pagination error: {0}")]
    Pagination(String),

    #[error("local file already exists: {}", .0.display())]
    LocalFileAlreadyExists(PathBuf),

    #[error("task validation failed: {message}")]
    TaskValidation {
        message: String,
        errors: serde_json::Value,
    },

    #[error("unable to refresh {0}")]
    UnableToRefresh(String),

    #[error("cannot {operation} a transfer that is {status}")]
    InvalidState {
        operation: &'static str,
        status: TransferStatus,
    },

    #[error("transfer stopped")]
    TransferStopped,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("sbg error: {0}")]
    Sbg(ApiError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Error details returned by the platform alongside a failing status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub more_info: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: status.as_u16(),
            code: None,
            message: message.into(),
            more_info: None,
        }
    }

    /// Parse an error body. Returns `None` when the body is not the
    /// platform's JSON error document.
    pub fn from_body(status: StatusCode, body: &str) -> Option<Self> {
        let mut parsed: ApiError = serde_json::from_str(body).ok()?;
        if parsed.status == 0 {
            parsed.status = status.as_u16();
        }
        Some(parsed)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (status {}", self.message, self.status)?;
        if let Some(code) = self.code {
            write!(f, ", code {}", code)?;
        }
        write!(f, ")")?;
        if let Some(more_info) = &self.more_info {
            write!(f, ", see {}", more_info)?;
        }
        Ok(())
    }
}

impl Error {
    /// Map an HTTP status to the matching error kind.
    pub fn from_status(status: StatusCode, body: ApiError) -> Self {
        match status.as_u16() {
            400 => Error::BadRequest(body),
            401 => Error::Unauthorized(body),
            403 => Error::Forbidden(body),
            404 => Error::NotFound(body),
            405 => Error::MethodNotAllowed(body),
            408 => Error::RequestTimeout(body),
            409 => Error::Conflict(body),
            429 => Error::TooManyRequests(body),
            500 => Error::ServerError(body),
            503 => Error::ServiceUnavailable(body),
            _ => Error::Sbg(body),
        }
    }

    /// Build the error for a response body that is not valid JSON.
    pub fn non_json(status: StatusCode) -> Self {
        Error::ServiceUnavailable(ApiError::new(
            status,
            "service returned a non-JSON response",
        ))
    }

    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Error::BadRequest(e)
            | Error::Unauthorized(e)
            | Error::Forbidden(e)
            | Error::NotFound(e)
            | Error::MethodNotAllowed(e)
            | Error::RequestTimeout(e)
            | Error::Conflict(e)
            | Error::TooManyRequests(e)
            | Error::ServerError(e)
            | Error::ServiceUnavailable(e)
            | Error::Sbg(e) => Some(e),
            _ => None,
        }
    }

    /// HTTP status of the failing response, if the error came from one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            other => other.api_error().map(|e| e.status),
        }
    }

    /// Transient failures are worth retrying: rate limiting, server-side
    /// errors and transport hiccups.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            other => other.status().is_some_and(is_transient_status),
        }
    }
}

pub(crate) fn is_transient_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (400, "BadRequest"),
            (401, "Unauthorized"),
            (403, "Forbidden"),
            (404, "NotFound"),
            (405, "MethodNotAllowed"),
            (408, "RequestTimeout"),
            (409, "Conflict"),
            (429, "TooManyRequests"),
            (500, "ServerError"),
            (503, "ServiceUnavailable"),
            (418, "Sbg"),
        ];
        for (code, kind) in cases {
            let status = StatusCode::from_u16(code).unwrap();
            let err = Error::from_status(status, ApiError::new(status, "boom"));
            assert!(format!("{:?}", err).starts_with(kind), "{} -> {:?}", code, err);
            assert_eq!(err.status(), Some(code));
        }
    }

    #[test]
    fn test_parse_error_body() {
        let body = r#"{"status": 404, "code": 5002, "message": "File not found", "more_info": "https://docs"}"#;
        let parsed = ApiError::from_body(StatusCode::NOT_FOUND, body).unwrap();
        assert_eq!(parsed.code, Some(5002));
        assert_eq!(parsed.message, "File not found");
        assert_eq!(parsed.more_info.as_deref(), Some("https://docs"));
    }

    #[test]
    fn test_parse_error_body_fills_status() {
        let parsed = ApiError::from_body(StatusCode::CONFLICT, r#"{"message": "exists"}"#).unwrap();
        assert_eq!(parsed.status, 409);
    }

    #[test]
    fn test_non_json_body() {
        assert!(ApiError::from_body(StatusCode::BAD_GATEWAY, "<html>oops</html>").is_none());
        let err = Error::non_json(StatusCode::BAD_GATEWAY);
        assert!(matches!(err, Error::ServiceUnavailable(_)));
    }

    #[test]
    fn test_transient_classification() {
        let status = StatusCode::TOO_MANY_REQUESTS;
        assert!(Error::from_status(status, ApiError::new(status, "slow down")).is_transient());
        let status = StatusCode::NOT_FOUND;
        assert!(!Error::from_status(status, ApiError::new(status, "missing")).is_transient());
        assert!(!Error::NotModified.is_transient());
    }

    #[test]
    fn test_display_includes_code_and_info() {
        let err = ApiError {
            status: 400,
            code: Some(9000),
            message: "bad".to_string(),
            more_info: Some("https://docs".to_string()),
        };
        assert_eq!(err.to_string(), "bad (status 400, code 9000), see https://docs");
    }
}
