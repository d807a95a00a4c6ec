// ABOUTME: Environment-driven configuration for the codec, server, and rate limiter
// ABOUTME: Invalid configuration fails fast at load/construction, never at request time
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Configuration surface of the engine.
//!
//! Plain structs with defaults plus `from_env()` readers. Validation runs
//! when a component is constructed, so misconfiguration is a startup
//! failure rather than a per-request one.

use crate::constants::{defaults, env_vars};
use crate::errors::ConfigError;
use jsonwebtoken::Algorithm;
use std::env;
use std::time::Duration;

fn env_i64(name: &'static str, default: i64) -> Result<i64, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidEnvValue { name, value: raw }),
        Err(_) => Ok(default),
    }
}

fn env_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(name) {
        Ok(raw) => match raw.to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidEnvValue { name, value: raw }),
        },
        Err(_) => Ok(default),
    }
}

/// Configuration for the [`crate::codec::TokenCodec`].
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// HMAC signing secret
    pub secret: Vec<u8>,
    /// Signing algorithm; must be HS256/HS384/HS512
    pub algorithm: Algorithm,
    /// Access token lifetime in seconds
    pub access_ttl_secs: i64,
    /// Refresh token lifetime in seconds
    pub refresh_ttl_secs: i64,
    /// Sliding renewal threshold in seconds; 0 disables renewal
    pub refresh_sliding_threshold_secs: i64,
}

impl CodecConfig {
    /// Config with the given secret and default TTLs.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            algorithm: Algorithm::HS256,
            access_ttl_secs: defaults::ACCESS_TOKEN_TTL_SECS,
            refresh_ttl_secs: defaults::REFRESH_TOKEN_TTL_SECS,
            refresh_sliding_threshold_secs: defaults::REFRESH_SLIDING_THRESHOLD_SECS,
        }
    }

    /// Load codec configuration from environment variables.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the secret variable is missing or any
    /// value fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let secret = env::var(env_vars::JWT_SECRET)
            .map_err(|_| ConfigError::MissingEnvValue(env_vars::JWT_SECRET))?;

        let algorithm = match env::var(env_vars::JWT_ALGORITHM) {
            Ok(raw) => match raw.as_str() {
                "HS256" => Algorithm::HS256,
                "HS384" => Algorithm::HS384,
                "HS512" => Algorithm::HS512,
                _ => {
                    return Err(ConfigError::InvalidEnvValue {
                        name: env_vars::JWT_ALGORITHM,
                        value: raw,
                    })
                }
            },
            Err(_) => Algorithm::HS256,
        };

        Ok(Self {
            secret: secret.into_bytes(),
            algorithm,
            access_ttl_secs: env_i64(env_vars::ACCESS_TOKEN_TTL, defaults::ACCESS_TOKEN_TTL_SECS)?,
            refresh_ttl_secs: env_i64(
                env_vars::REFRESH_TOKEN_TTL,
                defaults::REFRESH_TOKEN_TTL_SECS,
            )?,
            refresh_sliding_threshold_secs: env_i64(
                env_vars::REFRESH_SLIDING_THRESHOLD,
                defaults::REFRESH_SLIDING_THRESHOLD_SECS,
            )?,
        })
    }

    /// Check structural invariants.
    ///
    /// # Errors
    /// Returns [`ConfigError`] for an empty secret, a non-HMAC algorithm,
    /// non-positive TTLs, or a sliding threshold outside `[0, refresh_ttl)`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.is_empty() {
            return Err(ConfigError::EmptySecret);
        }
        if !matches!(
            self.algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(ConfigError::UnsupportedAlgorithm(self.algorithm));
        }
        if self.access_ttl_secs <= 0 {
            return Err(ConfigError::NonPositiveTtl {
                name: "access_ttl_secs",
                value: self.access_ttl_secs,
            });
        }
        if self.refresh_ttl_secs <= 0 {
            return Err(ConfigError::NonPositiveTtl {
                name: "refresh_ttl_secs",
                value: self.refresh_ttl_secs,
            });
        }
        if self.refresh_sliding_threshold_secs < 0
            || self.refresh_sliding_threshold_secs >= self.refresh_ttl_secs
        {
            return Err(ConfigError::InvalidSlidingThreshold {
                threshold: self.refresh_sliding_threshold_secs,
                refresh_ttl: self.refresh_ttl_secs,
            });
        }
        Ok(())
    }
}

/// Configuration for the [`crate::server::AuthorizationServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Authorization code lifetime in seconds
    pub auth_code_ttl_secs: i64,
    /// Device code lifetime in seconds
    pub device_code_ttl_secs: i64,
    /// Minimum seconds a device client must wait between polls
    pub device_poll_interval_secs: i64,
    /// Whether the refresh grant rotates the presented token
    pub rotate_refresh_tokens: bool,
    /// Verification URI handed to device flow users
    pub device_verification_uri: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            auth_code_ttl_secs: defaults::AUTH_CODE_TTL_SECS,
            device_code_ttl_secs: defaults::DEVICE_CODE_TTL_SECS,
            device_poll_interval_secs: defaults::DEVICE_POLL_INTERVAL_SECS,
            rotate_refresh_tokens: defaults::ROTATE_REFRESH_TOKENS,
            device_verification_uri: defaults::DEVICE_VERIFICATION_URI.to_owned(),
        }
    }
}

impl ServerConfig {
    /// Load server configuration from environment variables.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if any value fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            auth_code_ttl_secs: env_i64(env_vars::AUTH_CODE_TTL, defaults::AUTH_CODE_TTL_SECS)?,
            device_code_ttl_secs: env_i64(
                env_vars::DEVICE_CODE_TTL,
                defaults::DEVICE_CODE_TTL_SECS,
            )?,
            device_poll_interval_secs: env_i64(
                env_vars::DEVICE_POLL_INTERVAL,
                defaults::DEVICE_POLL_INTERVAL_SECS,
            )?,
            rotate_refresh_tokens: env_bool(
                env_vars::ROTATE_REFRESH_TOKENS,
                defaults::ROTATE_REFRESH_TOKENS,
            )?,
            device_verification_uri: env::var(env_vars::DEVICE_VERIFICATION_URI)
                .unwrap_or_else(|_| defaults::DEVICE_VERIFICATION_URI.to_owned()),
        })
    }
}

/// Configuration for the [`crate::rate_limiting::LoginRateLimiter`].
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Failures allowed per window before the IP is blocked
    pub max_attempts: u32,
    /// Fixed counting window
    pub window: Duration,
    /// How long a blocked IP stays blocked
    pub block_duration: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(900),
            block_duration: Duration::from_secs(900),
        }
    }
}

impl RateLimitConfig {
    /// Load rate limiter configuration from environment variables.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if any value fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let fallback = Self::default();
        let max_attempts = env_i64(
            env_vars::RATE_LIMIT_MAX_ATTEMPTS,
            i64::from(fallback.max_attempts),
        )?;
        if max_attempts <= 0 {
            return Err(ConfigError::InvalidEnvValue {
                name: env_vars::RATE_LIMIT_MAX_ATTEMPTS,
                value: max_attempts.to_string(),
            });
        }
        let window = env_i64(
            env_vars::RATE_LIMIT_WINDOW,
            fallback.window.as_secs() as i64,
        )?;
        let block = env_i64(
            env_vars::RATE_LIMIT_BLOCK,
            fallback.block_duration.as_secs() as i64,
        )?;

        Ok(Self {
            max_attempts: u32::try_from(max_attempts).unwrap_or(u32::MAX),
            window: Duration::from_secs(window.max(1) as u64),
            block_duration: Duration::from_secs(block.max(1) as u64),
        })
    }
}
