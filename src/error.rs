//! Error taxonomy for the proxy pipeline and auth state machine.
//!
//! Variants are grouped by the five propagation classes described in the
//! design doc: setup-fatal, transient, cancellation, admission, and
//! protocol errors. Only setup-fatal errors are allowed to terminate a
//! worker; everything else is logged and the affected operation is
//! abandoned while the pipeline keeps running.

use std::time::Duration;

/// Convenience alias used throughout the crate.
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Errors produced anywhere in the pipeline or the auth subsystem.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProxyError {
    /// Command-line flags or derived configuration failed validation.
    #[error("invalid configuration: {message}")]
    Configuration {
        /// Human-readable description.
        message: String,
    },

    /// The endpoint URL composed from the configured host and a received
    /// or configured path could not be parsed.
    #[error("invalid endpoint url: {message}")]
    InvalidEndpoint {
        /// Human-readable description.
        message: String,
    },

    /// A network request failed outright (connection refused, DNS, TLS).
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O operation on stdin/stdout failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// OIDC discovery returned a non-success status or an unparsable body.
    #[error("oidc discovery failed: {message}")]
    Discovery {
        /// Human-readable description.
        message: String,
    },

    /// The `WWW-Authenticate` header on a 401/403 was missing or malformed.
    #[error("malformed authentication challenge: {message}")]
    MalformedChallenge {
        /// Human-readable description.
        message: String,
    },

    /// The OAuth authorization-code exchange failed.
    #[error("token exchange failed: {message}")]
    TokenExchange {
        /// Human-readable description.
        message: String,
    },

    /// The local OAuth callback request was missing a `code` parameter or
    /// otherwise malformed.
    #[error("invalid oauth callback: {message}")]
    InvalidCallback {
        /// Human-readable description.
        message: String,
    },

    /// A new authentication attempt was denied by the rate limiter.
    #[error("authentication attempt denied, retry after {retry_after:?}")]
    AdmissionDenied {
        /// How long the caller should wait before retrying.
        retry_after: Duration,
    },

    /// The shared cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,
}

impl ProxyError {
    /// Shorthand for a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Shorthand for an invalid-endpoint error.
    pub fn invalid_endpoint(message: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            message: message.into(),
        }
    }

    /// Shorthand for a discovery error.
    pub fn discovery(message: impl Into<String>) -> Self {
        Self::Discovery {
            message: message.into(),
        }
    }

    /// Shorthand for a malformed-challenge error.
    pub fn malformed_challenge(message: impl Into<String>) -> Self {
        Self::MalformedChallenge {
            message: message.into(),
        }
    }

    /// Shorthand for a token-exchange error.
    pub fn token_exchange(message: impl Into<String>) -> Self {
        Self::TokenExchange {
            message: message.into(),
        }
    }

    /// Shorthand for an invalid-callback error.
    pub fn invalid_callback(message: impl Into<String>) -> Self {
        Self::InvalidCallback {
            message: message.into(),
        }
    }

    /// True for setup-fatal errors that should terminate the owning worker
    /// and cascade into a pipeline-wide cancellation.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::InvalidEndpoint { .. } | Self::Discovery { .. }
        )
    }

    /// True for errors where the caller should simply log and move on.
    pub fn is_retryable(&self) -> bool {
        !self.is_fatal() && !matches!(self, Self::Cancelled)
    }
}
