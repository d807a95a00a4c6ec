// ABOUTME: Application constants and default configuration values
// ABOUTME: Centralizes token TTLs, device flow parameters, and PKCE bounds
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Named constants shared across the authorization engine.

/// Default lifetimes for issued artifacts, in seconds.
pub mod defaults {
    /// Access token lifetime (1 hour)
    pub const ACCESS_TOKEN_TTL_SECS: i64 = 3600;

    /// Refresh token lifetime (30 days)
    pub const REFRESH_TOKEN_TTL_SECS: i64 = 30 * 24 * 3600;

    /// Sliding renewal threshold for refresh tokens; 0 disables renewal
    pub const REFRESH_SLIDING_THRESHOLD_SECS: i64 = 0;

    /// Authorization code lifetime (10 minutes)
    pub const AUTH_CODE_TTL_SECS: i64 = 600;

    /// Device code lifetime (30 minutes)
    pub const DEVICE_CODE_TTL_SECS: i64 = 1800;

    /// Minimum seconds a device client must wait between polls
    pub const DEVICE_POLL_INTERVAL_SECS: i64 = 5;

    /// Refresh tokens are rotated on use unless the host opts out
    pub const ROTATE_REFRESH_TOKENS: bool = true;

    /// Verification URI presented to device flow users
    pub const DEVICE_VERIFICATION_URI: &str = "https://localhost/device";
}

/// Device flow user-code generation parameters.
pub mod device {
    /// Length of the human-enterable user code
    pub const USER_CODE_LENGTH: usize = 8;

    /// User-code alphabet. Excludes ambiguous characters (0/O, 1/I/L)
    /// and vowels so codes cannot spell words.
    pub const USER_CODE_ALPHABET: &[u8] = b"BCDFGHJKMNPQRSTVWXZ23456789";
}

/// PKCE parameter bounds (RFC 7636 Section 4.1).
pub mod pkce {
    /// Minimum length of `code_verifier` and `code_challenge`
    pub const VERIFIER_MIN_LENGTH: usize = 43;

    /// Maximum length of `code_verifier` and `code_challenge`
    pub const VERIFIER_MAX_LENGTH: usize = 128;
}

/// Random artifact sizes, in bytes before base64url encoding.
pub mod secrets {
    /// Authorization code entropy
    pub const AUTH_CODE_BYTES: usize = 32;

    /// Device code entropy
    pub const DEVICE_CODE_BYTES: usize = 32;

    /// Opaque refresh token entropy
    pub const REFRESH_TOKEN_BYTES: usize = 32;

    /// Client secret entropy
    pub const CLIENT_SECRET_BYTES: usize = 32;
}

/// Environment variable names read by the config loaders.
pub mod env_vars {
    /// JWT signing secret (required for `CodecConfig::from_env`)
    pub const JWT_SECRET: &str = "KEYSTONE_JWT_SECRET";
    /// JWT signing algorithm (HS256, HS384, HS512)
    pub const JWT_ALGORITHM: &str = "KEYSTONE_JWT_ALGORITHM";
    /// Access token TTL in seconds
    pub const ACCESS_TOKEN_TTL: &str = "KEYSTONE_ACCESS_TOKEN_TTL_SECS";
    /// Refresh token TTL in seconds
    pub const REFRESH_TOKEN_TTL: &str = "KEYSTONE_REFRESH_TOKEN_TTL_SECS";
    /// Sliding refresh threshold in seconds
    pub const REFRESH_SLIDING_THRESHOLD: &str = "KEYSTONE_REFRESH_SLIDING_THRESHOLD_SECS";
    /// Authorization code TTL in seconds
    pub const AUTH_CODE_TTL: &str = "KEYSTONE_AUTH_CODE_TTL_SECS";
    /// Device code TTL in seconds
    pub const DEVICE_CODE_TTL: &str = "KEYSTONE_DEVICE_CODE_TTL_SECS";
    /// Device poll interval in seconds
    pub const DEVICE_POLL_INTERVAL: &str = "KEYSTONE_DEVICE_POLL_INTERVAL_SECS";
    /// Refresh token rotation toggle ("true"/"false")
    pub const ROTATE_REFRESH_TOKENS: &str = "KEYSTONE_ROTATE_REFRESH_TOKENS";
    /// Device verification URI
    pub const DEVICE_VERIFICATION_URI: &str = "KEYSTONE_DEVICE_VERIFICATION_URI";
    /// Login rate limiter: max failures per window
    pub const RATE_LIMIT_MAX_ATTEMPTS: &str = "KEYSTONE_RATE_LIMIT_MAX_ATTEMPTS";
    /// Login rate limiter: window length in seconds
    pub const RATE_LIMIT_WINDOW: &str = "KEYSTONE_RATE_LIMIT_WINDOW_SECS";
    /// Login rate limiter: block duration in seconds
    pub const RATE_LIMIT_BLOCK: &str = "KEYSTONE_RATE_LIMIT_BLOCK_SECS";
}
