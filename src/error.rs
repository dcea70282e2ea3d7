//! Error types for the backend client.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Error codes the backend uses for an access token that can be renewed.
pub const TOKEN_EXPIRED: &str = "TOKEN_EXPIRED";
pub const INVALID_TOKEN: &str = "INVALID_TOKEN";

/// Shown when neither the backend nor the transport produced anything readable.
pub const GENERIC_ERROR_MESSAGE: &str = "Something went wrong";
pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired, please sign in again";

/// Errors returned by the API client.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Network unreachable, timeout, TLS failure.
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Backend answered with a non-success status.
    #[error("{message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
        request_id: Option<String>,
    },

    /// Token refresh was impossible or failed; local tokens have been cleared.
    #[error("session expired")]
    SessionExpired,

    /// Response body did not match the expected shape.
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// Request could not be assembled (bad header value, unreadable upload).
    #[error("could not build request: {0}")]
    Build(String),
}

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;

/// `{success:false, error:{...}}` as produced by the backend error handler.
/// FastAPI's bare `{detail}` shape is accepted too.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub error: Option<ErrorBody>,
    #[serde(default)]
    pub detail: Option<ErrorDetail>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub details: Option<Value>,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ErrorDetail {
    Message(String),
    Fields(Vec<FieldError>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldError {
    #[serde(default)]
    pub loc: Vec<Value>,
    pub msg: String,
}

impl ErrorDetail {
    fn to_message(&self) -> String {
        match self {
            ErrorDetail::Message(m) => m.clone(),
            ErrorDetail::Fields(fields) => fields
                .iter()
                .map(|f| {
                    let loc: Vec<String> = f
                        .loc
                        .iter()
                        .map(|v| match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect();
                    if loc.is_empty() {
                        f.msg.clone()
                    } else {
                        format!("{}: {}", loc.join("."), f.msg)
                    }
                })
                .collect::<Vec<_>>()
                .join("; "),
        }
    }
}

/// `details.errors[]` entries from a VALIDATION_ERROR envelope, as "field: message".
fn field_errors(details: &Value) -> Vec<String> {
    details
        .get("errors")
        .and_then(Value::as_array)
        .map(|errors| {
            errors
                .iter()
                .filter_map(|e| {
                    let message = e.get("message").and_then(Value::as_str)?;
                    match e.get("field").and_then(Value::as_str) {
                        Some(field) if !field.is_empty() => Some(format!("{field}: {message}")),
                        _ => Some(message.to_string()),
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

impl ApiError {
    /// Build an error from a failed response's status and raw body.
    pub fn from_body(status: StatusCode, body: &str) -> Self {
        let fallback = format!("request failed with status {}", status.as_u16());
        let parsed: Option<ErrorEnvelope> = serde_json::from_str(body).ok();

        match parsed {
            Some(ErrorEnvelope { error: Some(err), .. }) => {
                let mut message = if err.message.trim().is_empty() {
                    fallback
                } else {
                    err.message
                };
                let fields = err.details.as_ref().map(field_errors).unwrap_or_default();
                if !fields.is_empty() {
                    message = format!("{message}: {}", fields.join("; "));
                }
                ApiError::Api {
                    status: err.status_code.unwrap_or(status.as_u16()),
                    code: Some(err.code),
                    message,
                    request_id: err.request_id,
                }
            }
            Some(ErrorEnvelope { detail: Some(detail), .. }) => {
                let message = detail.to_message();
                ApiError::Api {
                    status: status.as_u16(),
                    code: None,
                    message: if message.is_empty() { fallback } else { message },
                    request_id: None,
                }
            }
            _ => ApiError::Api {
                status: status.as_u16(),
                code: None,
                message: fallback,
                request_id: None,
            },
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Api { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
            ApiError::SessionExpired => Some(401),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            ApiError::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// True for the codes that mean "refresh and try again".
    pub fn is_token_error(&self) -> bool {
        matches!(self.code(), Some(TOKEN_EXPIRED) | Some(INVALID_TOKEN))
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Text suitable for the store's user-visible `error` slot.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Api { message, .. } if !message.trim().is_empty() => message.clone(),
            ApiError::SessionExpired => SESSION_EXPIRED_MESSAGE.to_string(),
            ApiError::Transport(e) => {
                let text = e.to_string();
                if text.is_empty() {
                    GENERIC_ERROR_MESSAGE.to_string()
                } else {
                    text
                }
            }
            ApiError::Decode(e) => e.to_string(),
            ApiError::Build(m) if !m.is_empty() => m.clone(),
            _ => GENERIC_ERROR_MESSAGE.to_string(),
        }
    }
}
