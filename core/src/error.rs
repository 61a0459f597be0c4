//! Error types for the graph client.
//!
//! # Design
//! One enum covers every failure a caller can see. Local mistakes
//! (`Configuration`, `InvalidParameter`) are kept apart from authentication
//! rejections (`AlgorithmMismatch`, `SignatureInvalid`) and from what the
//! server said (`Http`, `Protocol`), so callers can decide what is worth
//! retrying. Nothing is retried here.

use thiserror::Error;

use crate::http::TransportError;
use crate::response::ErrorInfo;

/// Errors returned by `GraphClient` and the free-standing codecs.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A required credential or URI is not configured.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A parameter value cannot be put on the wire.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Malformed input such as a signed request without exactly two parts.
    #[error("format error: {0}")]
    Format(String),

    /// The signed request names an algorithm other than HMAC-SHA256.
    #[error("unsupported signed request algorithm: {0}")]
    AlgorithmMismatch(String),

    /// The signed request signature does not match its payload.
    #[error("signed request signature is invalid")]
    SignatureInvalid,

    /// A trusted response is missing something it must carry. `body` holds the
    /// raw response for diagnostics.
    #[error("protocol error: {message}")]
    Protocol { message: String, body: String },

    /// The server answered with a failure status.
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        error: Option<ErrorInfo>,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl GraphError {
    pub(crate) fn protocol(message: impl Into<String>, body: impl Into<String>) -> Self {
        GraphError::Protocol {
            message: message.into(),
            body: body.into(),
        }
    }

    /// Structured error details when the server supplied them.
    pub fn error_info(&self) -> Option<&ErrorInfo> {
        match self {
            GraphError::Http { error, .. } => error.as_ref(),
            _ => None,
        }
    }

    /// HTTP status of a server-side failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            GraphError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T, E = GraphError> = std::result::Result<T, E>;
