//! Error taxonomy for the proxy core.
//!
//! [`ProxyError`] is the library-level error. Each variant records whether
//! the dispatcher may recover by advancing (endpoint, account, or fallback
//! model); everything else surfaces to the caller as an Anthropic-format
//! error envelope via [`IntoResponse`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Library result alias.
pub type Result<T> = std::result::Result<T, ProxyError>;

/// Errors produced by the dispatcher and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// The upstream rejected the request with a rate limit.
    #[error("Rate limited on {account_email} (reset in {reset_ms:?} ms)")]
    RateLimited {
        /// Account that hit the limit.
        account_email: String,
        /// Milliseconds until the limit expires, when known.
        reset_ms: Option<u64>,
    },

    /// The account's credentials were rejected (401/403/invalid_grant).
    #[error("Authentication invalid for {account_email}: {reason}")]
    AuthInvalid {
        /// Account whose credentials failed.
        account_email: String,
        /// Upstream-provided reason.
        reason: String,
    },

    /// No account could serve the request.
    #[error("No accounts available (all_rate_limited: {all_rate_limited})")]
    NoAccounts {
        /// Whether every account is merely rate-limited (vs. absent/invalid).
        all_rate_limited: bool,
    },

    /// The retry loop exhausted its attempt budget.
    #[error("Request failed after {attempts} attempts: {last_error}")]
    MaxRetries {
        /// Attempts performed.
        attempts: u32,
        /// Description of the last failure seen.
        last_error: String,
    },

    /// Upstream returned a non-success status that is not a rate limit or
    /// an auth failure.
    #[error("Upstream error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Upstream error text.
        message: String,
    },

    /// Transport-level failure (connect, timeout, reset).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The inbound request could not be translated.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The request was cancelled by the caller.
    #[error("Request cancelled")]
    Cancelled,

    /// Account storage failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Anything else.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// Build an API error from a status code and message.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Whether the dispatcher may recover from this error by advancing
    /// to another endpoint, account, or fallback model.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::AuthInvalid { .. } => true,
            Self::NoAccounts { all_rate_limited } => *all_rate_limited,
            Self::Api { status, .. } => *status >= 500,
            Self::Network(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
            }
            _ => false,
        }
    }

    /// Whether an error message indicates a transport-level failure.
    pub fn is_network_message(message: &str) -> bool {
        let lower = message.to_lowercase();
        lower.contains("network") || lower.contains("econnrefused") || lower.contains("timeout")
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::RateLimited { .. } | Self::NoAccounts { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::AuthInvalid { .. } => StatusCode::UNAUTHORIZED,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Api { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::Network(_) | Self::MaxRetries { .. } => StatusCode::BAD_GATEWAY,
            Self::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } | Self::NoAccounts { .. } => "rate_limit_error",
            Self::AuthInvalid { .. } => "authentication_error",
            Self::InvalidRequest(_) => "invalid_request_error",
            Self::Api { status, .. } if *status < 500 => "invalid_request_error",
            Self::Api { .. } | Self::Network(_) | Self::MaxRetries { .. } => "api_error",
            Self::Cancelled => "invalid_request_error",
            Self::Storage(_) | Self::Internal(_) => "api_error",
        }
    }
}

/// Anthropic-format error envelope: `{"type":"error","error":{...}}`.
#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    #[serde(rename = "type")]
    envelope_type: &'static str,
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorEnvelope {
            envelope_type: "error",
            error: ErrorDetail {
                error_type: self.error_type().to_string(),
                message: self.to_string(),
            },
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidRequest(format!("JSON error: {err}"))
    }
}
