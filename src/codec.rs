// ABOUTME: JWT token codec for signing and verifying access and refresh tokens
// ABOUTME: Handles token typing, detailed validation errors, and sliding refresh renewal
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Token Codec
//!
//! Stateless signing and verification of bearer tokens. Access and refresh
//! tokens share one key and algorithm but carry a `token_type` claim, and a
//! verifier expecting one type always rejects the other.
//!
//! Refresh renewal is sliding: a refresh call returns a new refresh token
//! only when the presented one is inside the configured renewal threshold,
//! bounding the number of live refresh tokens per session.

use crate::config::CodecConfig;
use crate::errors::ConfigError;
use crate::models::User;
use crate::storage::UserStore;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Structural type of a signed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Short-lived credential presented on API requests
    Access,
    /// Longer-lived credential exchanged for new access tokens
    Refresh,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Access => f.write_str("access"),
            Self::Refresh => f.write_str("refresh"),
        }
    }
}

/// `JWT` claims carried by every token the codec signs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id, or `client:<id>` for client tokens)
    pub sub: String,
    /// User `ID`; `None` for client-credentials tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    /// Login name
    pub username: String,
    /// Role names granted to the subject
    pub roles: Vec<String>,
    /// Access or refresh
    pub token_type: TokenType,
    /// Client the token was issued to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Granted scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Unique token id; makes otherwise-identical tokens distinct
    pub jti: String,
    /// Issued at timestamp (seconds)
    pub iat: i64,
    /// Expiration timestamp (seconds)
    pub exp: i64,
}

impl Claims {
    /// Seconds until this token expires; negative once expired.
    #[must_use]
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        self.exp - now.timestamp()
    }
}

/// `JWT` validation error with detailed information
#[derive(Debug, Clone)]
pub enum JwtValidationError {
    /// Token has expired
    TokenExpired {
        /// When the token expired
        expired_at: DateTime<Utc>,
        /// Current time for reference
        current_time: DateTime<Utc>,
    },
    /// Token signature is invalid
    TokenInvalid {
        /// Reason for invalidity
        reason: String,
    },
    /// Token is malformed (not proper `JWT` format)
    TokenMalformed {
        /// Details about malformation
        details: String,
    },
    /// Token is well-formed but of the wrong structural type
    WrongTokenType {
        /// The type the endpoint accepts
        expected: TokenType,
        /// The type the token carries
        actual: TokenType,
    },
}

impl std::fmt::Display for JwtValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TokenExpired {
                expired_at,
                current_time,
            } => {
                let duration_expired = current_time.signed_duration_since(*expired_at);
                if duration_expired.num_minutes() < 60 {
                    write!(
                        f,
                        "token expired {} minutes ago at {}",
                        duration_expired.num_minutes(),
                        expired_at.format("%Y-%m-%d %H:%M:%S UTC")
                    )
                } else if duration_expired.num_hours() < 24 {
                    write!(
                        f,
                        "token expired {} hours ago at {}",
                        duration_expired.num_hours(),
                        expired_at.format("%Y-%m-%d %H:%M:%S UTC")
                    )
                } else {
                    write!(
                        f,
                        "token expired {} days ago at {}",
                        duration_expired.num_days(),
                        expired_at.format("%Y-%m-%d %H:%M:%S UTC")
                    )
                }
            }
            Self::TokenInvalid { reason } => {
                write!(f, "token signature is invalid: {reason}")
            }
            Self::TokenMalformed { details } => {
                write!(f, "token is malformed: {details}")
            }
            Self::WrongTokenType { expected, actual } => {
                write!(f, "expected {expected} token, received {actual} token")
            }
        }
    }
}

impl std::error::Error for JwtValidationError {}

/// Identity a token is signed for.
#[derive(Debug, Clone)]
pub struct TokenIdentity {
    /// Subject claim
    pub sub: String,
    /// User `ID`, when the token carries a user context
    pub user_id: Option<Uuid>,
    /// Login name
    pub username: String,
    /// Role names
    pub roles: Vec<String>,
    /// Client the token is issued to
    pub client_id: Option<String>,
    /// Granted scope
    pub scope: Option<String>,
}

impl TokenIdentity {
    /// Identity for a user-bound token.
    #[must_use]
    pub fn for_user(user: &User) -> Self {
        Self {
            sub: user.id.to_string(),
            user_id: Some(user.id),
            username: user.username.clone(),
            roles: user.roles.clone(),
            client_id: None,
            scope: None,
        }
    }

    /// Identity for a client-credentials token (no user context).
    #[must_use]
    pub fn for_client(client_id: &str) -> Self {
        Self {
            sub: format!("client:{client_id}"),
            user_id: None,
            username: client_id.to_owned(),
            roles: Vec::new(),
            client_id: Some(client_id.to_owned()),
            scope: None,
        }
    }

    /// Rebuild the identity carried by existing claims.
    #[must_use]
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            sub: claims.sub.clone(),
            user_id: claims.user_id,
            username: claims.username.clone(),
            roles: claims.roles.clone(),
            client_id: claims.client_id.clone(),
            scope: claims.scope.clone(),
        }
    }

    /// Bind the identity to a client.
    #[must_use]
    pub fn with_client(mut self, client_id: &str) -> Self {
        self.client_id = Some(client_id.to_owned());
        self
    }

    /// Attach a granted scope.
    #[must_use]
    pub fn with_scope(mut self, scope: Option<&str>) -> Self {
        self.scope = scope.map(str::to_owned);
        self
    }
}

/// Result of a [`TokenCodec::refresh_tokens`] call.
#[derive(Debug, Clone)]
pub struct RefreshedTokens {
    /// Newly issued access token
    pub access_token: String,
    /// New refresh token, present only when renewal was due
    pub refresh_token: Option<String>,
    /// Whether the refresh token was renewed on this call
    pub renewed: bool,
}

/// Failure of a refresh call. Never partially succeeds: no access token is
/// issued unless the full check sequence passed.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    /// The presented refresh token failed verification
    #[error(transparent)]
    Validation(#[from] JwtValidationError),

    /// The user behind the token no longer exists or is inactive
    #[error("user is no longer eligible for token refresh")]
    UserRejected,

    /// Storage or signing failure; not a client mistake
    #[error("internal failure during token refresh")]
    Internal(#[source] anyhow::Error),
}

/// `id_token` claims (OIDC, data-structure level only).
#[derive(Debug, Serialize, Deserialize)]
struct IdTokenClaims {
    sub: String,
    aud: String,
    preferred_username: String,
    email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nonce: Option<String>,
    iat: i64,
    exp: i64,
}

/// Stateless signer/verifier for access and refresh tokens.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
    refresh_sliding_threshold_secs: i64,
}

impl TokenCodec {
    /// Create a codec from validated configuration.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when the secret is empty, the algorithm is
    /// not HMAC, or the sliding threshold is outside `[0, refresh_ttl)`.
    pub fn new(config: CodecConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            encoding_key: EncodingKey::from_secret(&config.secret),
            decoding_key: DecodingKey::from_secret(&config.secret),
            algorithm: config.algorithm,
            access_ttl_secs: config.access_ttl_secs,
            refresh_ttl_secs: config.refresh_ttl_secs,
            refresh_sliding_threshold_secs: config.refresh_sliding_threshold_secs,
        })
    }

    /// Configured access token lifetime in seconds.
    #[must_use]
    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl_secs
    }

    /// Configured refresh token lifetime in seconds.
    #[must_use]
    pub fn refresh_ttl_secs(&self) -> i64 {
        self.refresh_ttl_secs
    }

    /// Sign a token of the given type with its configured lifetime.
    ///
    /// # Errors
    /// Returns an error if `JWT` encoding fails.
    pub fn sign(
        &self,
        identity: &TokenIdentity,
        token_type: TokenType,
    ) -> anyhow::Result<String> {
        let ttl = match token_type {
            TokenType::Access => self.access_ttl_secs,
            TokenType::Refresh => self.refresh_ttl_secs,
        };
        self.sign_with_ttl(identity, token_type, ttl)
    }

    /// Sign a token with an explicit lifetime (per-client TTL overrides).
    ///
    /// # Errors
    /// Returns an error if `JWT` encoding fails.
    pub fn sign_with_ttl(
        &self,
        identity: &TokenIdentity,
        token_type: TokenType,
        ttl_secs: i64,
    ) -> anyhow::Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: identity.sub.clone(),
            user_id: identity.user_id,
            username: identity.username.clone(),
            roles: identity.roles.clone(),
            token_type,
            client_id: identity.client_id.clone(),
            scope: identity.scope.clone(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(ttl_secs)).timestamp(),
        };

        let header = Header::new(self.algorithm);
        let token = encode(&header, &claims, &self.encoding_key)?;
        Ok(token)
    }

    /// Verify a token and require it to be of the expected structural type.
    ///
    /// Expiry, signature, and malformation failures are distinguished; an
    /// access endpoint receiving a refresh token (or vice versa) gets
    /// [`JwtValidationError::WrongTokenType`].
    ///
    /// # Errors
    /// Returns a [`JwtValidationError`] describing the failure.
    pub fn verify(
        &self,
        token: &str,
        expected: TokenType,
    ) -> Result<Claims, JwtValidationError> {
        // Decode without expiry validation so expiry gets its own error
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| Self::convert_jwt_error(&e))?;
        let claims = token_data.claims;

        let current_time = Utc::now();
        if current_time.timestamp() > claims.exp {
            let expired_at = DateTime::from_timestamp(claims.exp, 0).unwrap_or_else(Utc::now);
            tracing::warn!(
                "token expired for subject {}: expired at {}",
                claims.sub,
                expired_at.to_rfc3339()
            );
            return Err(JwtValidationError::TokenExpired {
                expired_at,
                current_time,
            });
        }

        if claims.token_type != expected {
            tracing::warn!(
                "token type mismatch for subject {}: expected {}, got {}",
                claims.sub,
                expected,
                claims.token_type
            );
            return Err(JwtValidationError::WrongTokenType {
                expected,
                actual: claims.token_type,
            });
        }

        Ok(claims)
    }

    /// Decode claims without verifying signature or freshness.
    ///
    /// Used where the claims only feed bookkeeping (revocation records),
    /// never where they grant access.
    ///
    /// # Errors
    /// Returns [`JwtValidationError::TokenMalformed`] if the token cannot
    /// be decoded at all.
    pub fn decode_unverified(token: &str) -> Result<Claims, JwtValidationError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.insecure_disable_signature_validation();

        let token_data = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
            .map_err(|e| JwtValidationError::TokenMalformed {
                details: format!("failed to decode token: {e}"),
            })?;

        Ok(token_data.claims)
    }

    /// Convert `JWT` library errors to detailed validation errors
    fn convert_jwt_error(e: &jsonwebtoken::errors::Error) -> JwtValidationError {
        use jsonwebtoken::errors::ErrorKind;
        tracing::warn!("token validation failed: {:?}", e);

        match e.kind() {
            ErrorKind::InvalidSignature => JwtValidationError::TokenInvalid {
                reason: "Token signature verification failed".into(),
            },
            ErrorKind::InvalidToken => JwtValidationError::TokenMalformed {
                details: "Token format is invalid".into(),
            },
            ErrorKind::Base64(base64_err) => JwtValidationError::TokenMalformed {
                details: format!("Token contains invalid base64: {base64_err}"),
            },
            ErrorKind::Json(json_err) => JwtValidationError::TokenMalformed {
                details: format!("Token contains invalid JSON: {json_err}"),
            },
            ErrorKind::Utf8(utf8_err) => JwtValidationError::TokenMalformed {
                details: format!("Token contains invalid UTF-8: {utf8_err}"),
            },
            _ => JwtValidationError::TokenInvalid {
                reason: format!("Token validation failed: {e}"),
            },
        }
    }

    /// Whether a refresh token is close enough to expiry to be renewed.
    ///
    /// True iff the sliding threshold is enabled (> 0) and the remaining
    /// lifetime has dropped below it.
    #[must_use]
    pub fn should_renew_refresh(&self, claims: &Claims) -> bool {
        self.refresh_sliding_threshold_secs > 0
            && claims.remaining_secs(Utc::now()) < self.refresh_sliding_threshold_secs
    }

    /// Exchange a refresh token for a new access token, renewing the
    /// refresh token only when it is near expiry.
    ///
    /// Check sequence, in order: verify the token is well-formed, unexpired
    /// and refresh-typed; if `user_lookup` is supplied, re-fetch the user
    /// and reject missing or inactive ones (cuts off disabled users even
    /// while their refresh token is still valid, and picks up role
    /// changes); issue the new access token; issue a new refresh token only
    /// when [`Self::should_renew_refresh`] is true.
    ///
    /// # Errors
    /// Returns [`RefreshError`] without issuing anything when any step of
    /// the sequence fails.
    pub async fn refresh_tokens(
        &self,
        refresh_token: &str,
        user_lookup: Option<&dyn UserStore>,
    ) -> Result<RefreshedTokens, RefreshError> {
        let claims = self.verify(refresh_token, TokenType::Refresh)?;

        let identity = match (user_lookup, claims.user_id) {
            (Some(store), Some(user_id)) => {
                let user = store
                    .get_user(user_id)
                    .await
                    .map_err(RefreshError::Internal)?
                    .ok_or(RefreshError::UserRejected)?;
                if !user.is_active {
                    tracing::warn!("refresh rejected for inactive user {}", user.id);
                    return Err(RefreshError::UserRejected);
                }
                // Roles come from the fresh user record; client binding and
                // scope carry over from the presented token
                let mut identity = TokenIdentity::for_user(&user).with_scope(claims.scope.as_deref());
                identity.client_id = claims.client_id.clone();
                identity
            }
            _ => TokenIdentity::from_claims(&claims),
        };

        let access_token = self
            .sign(&identity, TokenType::Access)
            .map_err(RefreshError::Internal)?;

        let renewed = self.should_renew_refresh(&claims);
        let refresh_token = if renewed {
            let new_refresh = self
                .sign(&identity, TokenType::Refresh)
                .map_err(RefreshError::Internal)?;
            tracing::debug!("refresh token renewed for subject {}", claims.sub);
            Some(new_refresh)
        } else {
            None
        };

        Ok(RefreshedTokens {
            access_token,
            refresh_token,
            renewed,
        })
    }

    /// Sign an OIDC `id_token` for an authorized user.
    ///
    /// # Errors
    /// Returns an error if `JWT` encoding fails.
    pub fn sign_id_token(
        &self,
        user: &User,
        client_id: &str,
        nonce: Option<&str>,
    ) -> anyhow::Result<String> {
        let now = Utc::now();
        let claims = IdTokenClaims {
            sub: user.id.to_string(),
            aud: client_id.to_owned(),
            preferred_username: user.username.clone(),
            email: user.email.clone(),
            nonce: nonce.map(str::to_owned),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(self.access_ttl_secs)).timestamp(),
        };

        let header = Header::new(self.algorithm);
        let token = encode(&header, &claims, &self.encoding_key)?;
        Ok(token)
    }
}
