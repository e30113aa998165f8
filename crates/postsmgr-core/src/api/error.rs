//! Errors returned by `ApiClient` calls.

use serde_json::Value;
use thiserror::Error;

/// Failure of an API call, normalized from whatever went wrong underneath.
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    /// 401: the credential is missing, invalid or expired. The session has been cleared.
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String, raw_body: String },

    /// Any other non-success status.
    #[error("{message}")]
    Server {
        status: u16,
        message: String,
        raw_body: String,
        /// Field validation errors, when the backend sends them
        errors: Option<Value>,
    },

    /// No response arrived: connection refused, DNS, timeout.
    #[error("{message}")]
    Network { message: String },

    /// The request could not be built or sent.
    #[error("Request failed: {message}")]
    Request { message: String },
}

/// The four failure classes callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    Auth,
    Server,
    Network,
    Request,
}

/// Maximum length for error response bodies in log lines
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Build the error for a received non-success response.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let server_message = parsed
            .as_ref()
            .and_then(|v| v.get("message"))
            .and_then(Value::as_str)
            .filter(|m| !m.trim().is_empty())
            .map(str::to_string);

        match status.as_u16() {
            401 => ApiError::Unauthorized {
                message: server_message.unwrap_or_else(|| "Unauthenticated".to_string()),
                raw_body: body.to_string(),
            },
            code => {
                let errors = parsed
                    .as_ref()
                    .and_then(|v| v.get("errors").or_else(|| v.get("error")))
                    .filter(|e| !e.is_null())
                    .cloned();
                ApiError::Server {
                    status: code,
                    message: server_message.unwrap_or_else(|| format!("HTTP {} Error", code)),
                    raw_body: body.to_string(),
                    errors,
                }
            }
        }
    }

    pub fn kind(&self) -> ApiErrorKind {
        match self {
            ApiError::Unauthorized { .. } => ApiErrorKind::Auth,
            ApiError::Server { .. } => ApiErrorKind::Server,
            ApiError::Network { .. } => ApiErrorKind::Network,
            ApiError::Request { .. } => ApiErrorKind::Request,
        }
    }

    /// HTTP status, when a response was received.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::Server { status, .. } => Some(*status),
            ApiError::Network { .. } | ApiError::Request { .. } => None,
        }
    }

    /// Human-readable message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            ApiError::Unauthorized { message, .. }
            | ApiError::Server { message, .. }
            | ApiError::Network { message }
            | ApiError::Request { message } => message,
        }
    }

    /// Response body as received, when there was one.
    pub fn raw_body(&self) -> Option<&str> {
        match self {
            ApiError::Unauthorized { raw_body, .. } | ApiError::Server { raw_body, .. } => {
                Some(raw_body)
            }
            ApiError::Network { .. } | ApiError::Request { .. } => None,
        }
    }

    /// Validation errors sent with a 4xx, e.g. `{"email": ["taken"]}`.
    pub fn validation_errors(&self) -> Option<&Value> {
        match self {
            ApiError::Server { errors, .. } => errors.as_ref(),
            _ => None,
        }
    }
}
