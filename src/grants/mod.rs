// ABOUTME: Grant processor trait, shared token issuance, and the per-grant-type registry
// ABOUTME: Validation is side-effect free; consuming state transitions live in issuance
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Grant Engine
//!
//! One [`GrantProcessor`] per grant type, dispatched through an enum-keyed
//! registry rather than a chain of string comparisons. `validate` performs
//! read-only checks so callers can short-circuit without side effects;
//! `issue_token` performs the atomic consume/rotate transition and builds
//! the token response.

pub mod authorization_code;
pub mod client_credentials;
pub mod device_code;
pub mod refresh_token;

pub use authorization_code::AuthorizationCodeGrant;
pub use client_credentials::ClientCredentialsGrant;
pub use device_code::DeviceCodeGrant;
pub use refresh_token::RefreshTokenGrant;

use crate::codec::{TokenCodec, TokenIdentity, TokenType};
use crate::constants::secrets;
use crate::errors::OAuth2Error;
use crate::models::{Client, GrantType, Token, TokenRequest, TokenResponse};
use crate::storage::{TokenStore, UserStore};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;
use uuid::Uuid;

/// Validated grant data handed from `validate` to `issue_token`.
#[derive(Debug, Clone)]
pub enum GrantContext {
    /// Authorization code exchange; the code is consumed at issuance
    AuthorizationCode {
        /// The validated (not yet consumed) code value
        code: String,
    },
    /// Client credentials; scope already resolved against the client
    ClientCredentials {
        /// Resolved scope
        scope: Option<String>,
    },
    /// Refresh token exchange; the token is rotated at issuance
    RefreshToken {
        /// The validated refresh token value
        refresh_token: String,
    },
    /// Device code exchange; the code is consumed at issuance
    DeviceCode {
        /// The validated (not yet consumed) device code value
        device_code: String,
    },
}

/// A grant type's validation and issuance state machine.
///
/// Implementations never re-validate client secrets; the façade validates
/// the client once before dispatch.
#[async_trait]
pub trait GrantProcessor: Send + Sync {
    /// The grant type this processor handles.
    fn grant_type(&self) -> GrantType;

    /// Validate a token request without side effects.
    ///
    /// # Errors
    /// Returns the OAuth reason code describing the failure; device-flow
    /// pending signals are retryable.
    async fn validate(
        &self,
        request: &TokenRequest,
        client: &Client,
    ) -> Result<GrantContext, OAuth2Error>;

    /// Commit the grant's state transition and issue tokens.
    ///
    /// Single-use artifacts are consumed through the store's atomic path,
    /// so concurrent duplicate exchanges produce at most one token.
    ///
    /// # Errors
    /// Returns `invalid_grant` when the atomic consume loses a race or the
    /// state changed since validation, `server_error` on storage failure.
    async fn issue_token(
        &self,
        request: &TokenRequest,
        client: &Client,
        context: GrantContext,
    ) -> Result<TokenResponse, OAuth2Error>;
}

/// Generate an opaque URL-safe token from the system RNG.
pub(crate) fn generate_opaque_token(length: usize) -> Result<String, OAuth2Error> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; length];
    rng.fill(&mut bytes).map_err(|_| {
        tracing::error!("system RNG failure while generating token material");
        OAuth2Error::server_error()
    })?;
    Ok(general_purpose::URL_SAFE_NO_PAD.encode(&bytes))
}

/// Shared issuance path: builds the access/refresh pair, persists the
/// [`Token`] record, and shapes the wire response.
pub struct TokenIssuer {
    codec: Arc<TokenCodec>,
    tokens: Arc<dyn TokenStore>,
    users: Arc<dyn UserStore>,
}

impl TokenIssuer {
    /// Issuer over the given codec and stores.
    #[must_use]
    pub fn new(
        codec: Arc<TokenCodec>,
        tokens: Arc<dyn TokenStore>,
        users: Arc<dyn UserStore>,
    ) -> Self {
        Self {
            codec,
            tokens,
            users,
        }
    }

    /// Issue a user-bound token pair for a client.
    ///
    /// The user is re-fetched so claims carry current roles; missing or
    /// inactive users fail the grant.
    ///
    /// # Errors
    /// Returns `invalid_grant` for missing/inactive users, `server_error`
    /// on storage or signing failure.
    pub async fn issue_for_user(
        &self,
        client: &Client,
        user_id: Uuid,
        scope: Option<&str>,
        nonce: Option<&str>,
        with_refresh: bool,
    ) -> Result<TokenResponse, OAuth2Error> {
        let user = self
            .users
            .get_user(user_id)
            .await
            .map_err(|e| {
                tracing::error!("user lookup failed for {user_id}: {:#}", e);
                OAuth2Error::server_error()
            })?
            .ok_or_else(|| {
                tracing::warn!("grant references unknown user {user_id}");
                OAuth2Error::invalid_grant("User no longer exists")
            })?;

        if !user.is_active {
            tracing::warn!("grant rejected for inactive user {user_id}");
            return Err(OAuth2Error::invalid_grant("User account is inactive"));
        }

        let access_ttl = client
            .access_token_ttl_secs
            .unwrap_or_else(|| self.codec.access_ttl_secs());
        let identity = TokenIdentity::for_user(&user)
            .with_client(&client.client_id)
            .with_scope(scope);

        let access_token = self
            .codec
            .sign_with_ttl(&identity, TokenType::Access, access_ttl)
            .map_err(|e| {
                tracing::error!(
                    "failed to sign access token for client {}: {:#}",
                    client.client_id,
                    e
                );
                OAuth2Error::server_error()
            })?;

        let now = Utc::now();
        let (refresh_token, refresh_expires_at) = if with_refresh {
            let refresh_ttl = client
                .refresh_token_ttl_secs
                .unwrap_or_else(|| self.codec.refresh_ttl_secs());
            let value = generate_opaque_token(secrets::REFRESH_TOKEN_BYTES)?;
            (Some(value), Some(now + Duration::seconds(refresh_ttl)))
        } else {
            (None, None)
        };

        let id_token = if scope
            .is_some_and(|s| s.split_whitespace().any(|part| part == "openid"))
            && nonce.is_some()
        {
            let signed = self
                .codec
                .sign_id_token(&user, &client.client_id, nonce)
                .map_err(|e| {
                    tracing::error!(
                        "failed to sign id_token for client {}: {:#}",
                        client.client_id,
                        e
                    );
                    OAuth2Error::server_error()
                })?;
            Some(signed)
        } else {
            None
        };

        let token = Token {
            access_token: access_token.clone(),
            token_type: "Bearer".to_owned(),
            refresh_token: refresh_token.clone(),
            id_token: id_token.clone(),
            scope: scope.map(str::to_owned),
            client_id: client.client_id.clone(),
            user_id: Some(user_id),
            created_at: now,
            expires_at: now + Duration::seconds(access_ttl),
            refresh_expires_at,
            revoked: false,
        };

        self.store_record(&token).await?;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_owned(),
            expires_in: access_ttl,
            scope: scope.map(str::to_owned),
            refresh_token,
            id_token,
        })
    }

    /// Issue a client-only access token (no user context, no refresh token).
    ///
    /// # Errors
    /// Returns `server_error` on storage or signing failure.
    pub async fn issue_for_client(
        &self,
        client: &Client,
        scope: Option<&str>,
    ) -> Result<TokenResponse, OAuth2Error> {
        let access_ttl = client
            .access_token_ttl_secs
            .unwrap_or_else(|| self.codec.access_ttl_secs());
        let identity = TokenIdentity::for_client(&client.client_id).with_scope(scope);

        let access_token = self
            .codec
            .sign_with_ttl(&identity, TokenType::Access, access_ttl)
            .map_err(|e| {
                tracing::error!(
                    "failed to sign client credentials token for {}: {:#}",
                    client.client_id,
                    e
                );
                OAuth2Error::server_error()
            })?;

        let now = Utc::now();
        let token = Token {
            access_token: access_token.clone(),
            token_type: "Bearer".to_owned(),
            refresh_token: None,
            id_token: None,
            scope: scope.map(str::to_owned),
            client_id: client.client_id.clone(),
            user_id: None,
            created_at: now,
            expires_at: now + Duration::seconds(access_ttl),
            refresh_expires_at: None,
            revoked: false,
        };

        self.store_record(&token).await?;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_owned(),
            expires_in: access_ttl,
            scope: scope.map(str::to_owned),
            refresh_token: None,
            id_token: None,
        })
    }

    async fn store_record(&self, token: &Token) -> Result<(), OAuth2Error> {
        self.tokens.store_token(token).await.map_err(|e| {
            tracing::error!(
                "failed to store token record for client {}: {:#}",
                token.client_id,
                e
            );
            OAuth2Error::server_error()
        })
    }
}
