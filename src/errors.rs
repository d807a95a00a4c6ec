// ABOUTME: OAuth 2.0 error responses with stable reason codes plus configuration errors
// ABOUTME: Protocol outcomes are returned as values; only construction-time errors fail fast
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Error types for the authorization engine.
//!
//! Four categories are kept distinct: client errors (stable reason code,
//! never a stack trace), grant-state errors (`invalid_grant`), retryable
//! pending signals for the device flow, and storage failures
//! (`server_error` — never disguised as a client mistake).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// OAuth 2.0 Error Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2Error {
    /// Error code
    pub error: String,
    /// Human-readable error description
    pub error_description: Option<String>,
    /// URI for error information
    pub error_uri: Option<String>,
}

impl OAuth2Error {
    /// Create an `invalid_request` error
    #[must_use]
    pub fn invalid_request(description: &str) -> Self {
        Self {
            error: "invalid_request".to_owned(),
            error_description: Some(description.to_owned()),
            error_uri: Some(
                "https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1".to_owned(),
            ),
        }
    }

    /// Create an `invalid_client` error
    #[must_use]
    pub fn invalid_client() -> Self {
        Self {
            error: "invalid_client".to_owned(),
            error_description: Some("Client authentication failed".to_owned()),
            error_uri: Some("https://datatracker.ietf.org/doc/html/rfc6749#section-5.2".to_owned()),
        }
    }

    /// Create an `invalid_grant` error
    #[must_use]
    pub fn invalid_grant(description: &str) -> Self {
        Self {
            error: "invalid_grant".to_owned(),
            error_description: Some(description.to_owned()),
            error_uri: Some("https://datatracker.ietf.org/doc/html/rfc6749#section-5.2".to_owned()),
        }
    }

    /// Create an `unsupported_grant_type` error
    #[must_use]
    pub fn unsupported_grant_type() -> Self {
        Self {
            error: "unsupported_grant_type".to_owned(),
            error_description: Some("Grant type not supported".to_owned()),
            error_uri: Some("https://datatracker.ietf.org/doc/html/rfc6749#section-5.2".to_owned()),
        }
    }

    /// Create an `unauthorized_client` error (RFC 6749 Section 4.1.2.1)
    /// Used when a client attempts a `grant_type` it was not registered for
    #[must_use]
    pub fn unauthorized_client(description: &str) -> Self {
        Self {
            error: "unauthorized_client".to_owned(),
            error_description: Some(description.to_owned()),
            error_uri: Some(
                "https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1".to_owned(),
            ),
        }
    }

    /// Create an `invalid_scope` error (RFC 6749 Section 4.1.2.1)
    /// Used when a client requests scopes beyond what it was registered for
    #[must_use]
    pub fn invalid_scope(description: &str) -> Self {
        Self {
            error: "invalid_scope".to_owned(),
            error_description: Some(description.to_owned()),
            error_uri: Some(
                "https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1".to_owned(),
            ),
        }
    }

    /// Create an `authorization_pending` signal (RFC 8628 Section 3.5)
    /// Retryable: the device flow user has not yet approved or denied
    #[must_use]
    pub fn authorization_pending() -> Self {
        Self {
            error: "authorization_pending".to_owned(),
            error_description: Some("The authorization request is still pending".to_owned()),
            error_uri: Some("https://datatracker.ietf.org/doc/html/rfc8628#section-3.5".to_owned()),
        }
    }

    /// Create a `slow_down` signal (RFC 8628 Section 3.5)
    /// Retryable: the client polled faster than the issued interval
    #[must_use]
    pub fn slow_down() -> Self {
        Self {
            error: "slow_down".to_owned(),
            error_description: Some("Polling too frequently; respect the issued interval".to_owned()),
            error_uri: Some("https://datatracker.ietf.org/doc/html/rfc8628#section-3.5".to_owned()),
        }
    }

    /// Create an `expired_token` error (RFC 8628 Section 3.5)
    #[must_use]
    pub fn expired_token() -> Self {
        Self {
            error: "expired_token".to_owned(),
            error_description: Some("The device code has expired".to_owned()),
            error_uri: Some("https://datatracker.ietf.org/doc/html/rfc8628#section-3.5".to_owned()),
        }
    }

    /// Create an `access_denied` error (RFC 8628 Section 3.5)
    #[must_use]
    pub fn access_denied() -> Self {
        Self {
            error: "access_denied".to_owned(),
            error_description: Some("The user denied the authorization request".to_owned()),
            error_uri: Some("https://datatracker.ietf.org/doc/html/rfc8628#section-3.5".to_owned()),
        }
    }

    /// Create a `server_error` for storage or signing failures.
    ///
    /// Storage callback failures always map here so operational outages are
    /// never reported as client mistakes.
    #[must_use]
    pub fn server_error() -> Self {
        Self {
            error: "server_error".to_owned(),
            error_description: Some("Internal server error".to_owned()),
            error_uri: None,
        }
    }

    /// Whether a poller should retry this outcome (device flow signals).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.error.as_str(), "authorization_pending" | "slow_down")
    }

    /// Stable reason code for HTTP-layer status mapping by the host.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.error
    }
}

impl std::fmt::Display for OAuth2Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error_description {
            Some(description) => write!(f, "{}: {description}", self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for OAuth2Error {}

/// Configuration error raised at construction time.
///
/// Runtime validation outcomes are always returned as [`OAuth2Error`]
/// values; only programmer errors in configuration fail fast here.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The signing secret is empty or unusable
    #[error("signing secret must not be empty")]
    EmptySecret,

    /// The signing algorithm is not an HMAC family member
    #[error("unsupported signing algorithm: {0:?} (expected HS256/HS384/HS512)")]
    UnsupportedAlgorithm(jsonwebtoken::Algorithm),

    /// A TTL must be strictly positive
    #[error("{name} must be positive, got {value}")]
    NonPositiveTtl {
        /// Which TTL was invalid
        name: &'static str,
        /// The rejected value in seconds
        value: i64,
    },

    /// The sliding threshold must satisfy `0 <= threshold < refresh_ttl`
    #[error("refresh sliding threshold {threshold}s must be in [0, {refresh_ttl}s)")]
    InvalidSlidingThreshold {
        /// Configured threshold in seconds
        threshold: i64,
        /// Configured refresh TTL in seconds
        refresh_ttl: i64,
    },

    /// An environment variable was present but unparseable
    #[error("environment variable {name} has invalid value: {value}")]
    InvalidEnvValue {
        /// Variable name
        name: &'static str,
        /// The rejected raw value
        value: String,
    },

    /// A required environment variable is missing
    #[error("required environment variable {0} is not set")]
    MissingEnvValue(&'static str),
}
