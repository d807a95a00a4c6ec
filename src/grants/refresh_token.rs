// ABOUTME: Refresh token grant processor with configurable rotation
// ABOUTME: Rotation revokes the old token atomically before the new pair is returned
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use crate::errors::OAuth2Error;
use crate::grants::{GrantContext, GrantProcessor, TokenIssuer};
use crate::models::{Client, GrantType, Token, TokenRequest, TokenResponse};
use crate::storage::TokenStore;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

/// Processor for the `refresh_token` grant.
pub struct RefreshTokenGrant {
    tokens: Arc<dyn TokenStore>,
    issuer: Arc<TokenIssuer>,
    rotate: bool,
}

impl RefreshTokenGrant {
    /// Processor over the given store and issuer.
    ///
    /// `rotate` controls whether a successful exchange replaces the
    /// presented refresh token (the default posture) or echoes it back
    /// with its original expiry untouched.
    #[must_use]
    pub fn new(tokens: Arc<dyn TokenStore>, issuer: Arc<TokenIssuer>, rotate: bool) -> Self {
        Self {
            tokens,
            issuer,
            rotate,
        }
    }

    fn check_record(record: &Token, client: &Client) -> Result<(), OAuth2Error> {
        if record.revoked {
            return Err(OAuth2Error::invalid_grant("Refresh token has been revoked"));
        }
        if record.is_refresh_expired(Utc::now()) {
            return Err(OAuth2Error::invalid_grant("Refresh token has expired"));
        }
        if record.client_id != client.client_id {
            return Err(OAuth2Error::invalid_grant(
                "Refresh token was issued to a different client",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl GrantProcessor for RefreshTokenGrant {
    fn grant_type(&self) -> GrantType {
        GrantType::RefreshToken
    }

    async fn validate(
        &self,
        request: &TokenRequest,
        client: &Client,
    ) -> Result<GrantContext, OAuth2Error> {
        let refresh_token = request
            .refresh_token
            .as_deref()
            .ok_or_else(|| OAuth2Error::invalid_request("Missing refresh_token"))?;

        let record = self
            .tokens
            .get_by_refresh_token(refresh_token)
            .await
            .map_err(|e| {
                tracing::error!(
                    "refresh token lookup failed for client {}: {:#}",
                    client.client_id,
                    e
                );
                OAuth2Error::server_error()
            })?
            .ok_or_else(|| OAuth2Error::invalid_grant("Invalid or expired refresh token"))?;

        Self::check_record(&record, client)?;

        Ok(GrantContext::RefreshToken {
            refresh_token: refresh_token.to_owned(),
        })
    }

    async fn issue_token(
        &self,
        _request: &TokenRequest,
        client: &Client,
        context: GrantContext,
    ) -> Result<TokenResponse, OAuth2Error> {
        let GrantContext::RefreshToken { refresh_token } = context else {
            return Err(OAuth2Error::invalid_request("Mismatched grant context"));
        };

        if self.rotate {
            // Revoke-old happens inside the atomic consume, before any new
            // token exists; a concurrent duplicate use gets invalid_grant
            let old_record = self
                .tokens
                .consume_refresh_token(&refresh_token, &client.client_id, Utc::now())
                .await
                .map_err(|e| {
                    tracing::error!(
                        "failed to consume refresh token for client {}: {:#}",
                        client.client_id,
                        e
                    );
                    OAuth2Error::server_error()
                })?
                .ok_or_else(|| {
                    tracing::warn!(
                        "refresh token consume lost for client {}: not found, revoked, expired, or mismatched",
                        client.client_id
                    );
                    OAuth2Error::invalid_grant("Invalid or expired refresh token")
                })?;

            let Some(user_id) = old_record.user_id else {
                return Err(OAuth2Error::invalid_grant(
                    "Refresh token carries no user context",
                ));
            };

            let response = self
                .issuer
                .issue_for_user(client, user_id, old_record.scope.as_deref(), None, true)
                .await?;

            tracing::info!(
                "refresh token rotated for client {} and user {user_id}",
                client.client_id
            );
            Ok(response)
        } else {
            // No rotation: re-read the record, issue a fresh access token,
            // and echo the original refresh token with its original expiry
            let record = self
                .tokens
                .get_by_refresh_token(&refresh_token)
                .await
                .map_err(|e| {
                    tracing::error!(
                        "refresh token lookup failed for client {}: {:#}",
                        client.client_id,
                        e
                    );
                    OAuth2Error::server_error()
                })?
                .ok_or_else(|| OAuth2Error::invalid_grant("Invalid or expired refresh token"))?;

            Self::check_record(&record, client)?;

            let Some(user_id) = record.user_id else {
                return Err(OAuth2Error::invalid_grant(
                    "Refresh token carries no user context",
                ));
            };

            let mut response = self
                .issuer
                .issue_for_user(client, user_id, record.scope.as_deref(), None, false)
                .await?;
            response.refresh_token = Some(refresh_token);
            Ok(response)
        }
    }
}
