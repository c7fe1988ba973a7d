//! LedgerSync Remote - ERP backend adapter
//!
//! Provides:
//! - An async REST client implementing the `IRemoteApi` port
//! - A health check that turns backend reachability into connectivity signals
//!
//! ## Modules
//!
//! - [`client`] - Bearer-authenticated JSON client over `reqwest`
//! - [`health`] - Periodic reachability checks against the health endpoint

pub mod client;
pub mod health;

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

pub use client::HttpRemoteApi;
pub use health::HealthCheck;

/// Errors that can occur when communicating with the ERP backend
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Authentication credentials are missing, invalid or expired
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Insufficient permissions for the requested operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The backend rejected the mutation as conflicting (409) or invalid (422)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limit exceeded; retry after the specified duration
    #[error("Too many requests, retry after {retry_after:?}")]
    TooManyRequests {
        /// Duration to wait before retrying
        retry_after: Duration,
    },

    /// A server-side error occurred (5xx)
    #[error("Server error: {0}")]
    ServerError(String),

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The API response could not be parsed or had an unexpected status
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The configured base URL or request path is not usable
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl RemoteError {
    /// Maps a non-success HTTP status to an error
    pub fn from_status(status: StatusCode, body: String, retry_after: Option<Duration>) -> Self {
        let detail = if body.is_empty() {
            status.to_string()
        } else {
            format!("{}: {}", status, body)
        };
        match status {
            StatusCode::UNAUTHORIZED => RemoteError::Unauthorized(detail),
            StatusCode::FORBIDDEN => RemoteError::Forbidden(detail),
            StatusCode::NOT_FOUND => RemoteError::NotFound(detail),
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                RemoteError::Conflict(detail)
            }
            StatusCode::TOO_MANY_REQUESTS => RemoteError::TooManyRequests {
                retry_after: retry_after.unwrap_or(DEFAULT_RETRY_AFTER),
            },
            s if s.is_server_error() => RemoteError::ServerError(detail),
            _ => RemoteError::InvalidResponse(detail),
        }
    }

    /// Machine-readable failure code recorded on queued operations
    pub fn code(&self) -> &'static str {
        match self {
            RemoteError::Unauthorized(_) => "unauthorized",
            RemoteError::Forbidden(_) => "forbidden",
            RemoteError::NotFound(_) => "not_found",
            RemoteError::Conflict(_) => "conflict",
            RemoteError::TooManyRequests { .. } => "rate_limited",
            RemoteError::ServerError(_) => "server_error",
            RemoteError::NetworkError(e) if e.is_timeout() => "timeout",
            RemoteError::NetworkError(_) => "network",
            RemoteError::InvalidResponse(_) => "invalid_response",
            RemoteError::InvalidUrl(_) => "invalid_url",
        }
    }

    /// Whether replaying the same request later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemoteError::TooManyRequests { .. }
                | RemoteError::ServerError(_)
                | RemoteError::NetworkError(_)
        )
    }
}

/// Used when a 429 response carries no usable `Retry-After` header
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);
