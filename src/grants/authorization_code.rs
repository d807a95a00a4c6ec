// ABOUTME: Authorization code grant processor with PKCE verification
// ABOUTME: Codes are consumed through the store's atomic single-winner path
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use crate::constants::pkce;
use crate::errors::OAuth2Error;
use crate::grants::{GrantContext, GrantProcessor, TokenIssuer};
use crate::models::{AuthorizationCode, Client, GrantType, TokenRequest, TokenResponse};
use crate::storage::AuthCodeStore;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Processor for the `authorization_code` grant.
pub struct AuthorizationCodeGrant {
    codes: Arc<dyn AuthCodeStore>,
    issuer: Arc<TokenIssuer>,
}

impl AuthorizationCodeGrant {
    /// Processor over the given code store and issuer.
    #[must_use]
    pub fn new(codes: Arc<dyn AuthCodeStore>, issuer: Arc<TokenIssuer>) -> Self {
        Self { codes, issuer }
    }

    /// Run every read-only check against a code record.
    fn check_code(
        auth_code: &AuthorizationCode,
        request: &TokenRequest,
        client: &Client,
        redirect_uri: &str,
    ) -> Result<(), OAuth2Error> {
        if auth_code.used {
            tracing::warn!(
                "authorization code replay attempt for client {}",
                client.client_id
            );
            return Err(OAuth2Error::invalid_grant(
                "Authorization code already used",
            ));
        }
        if auth_code.is_expired(Utc::now()) {
            return Err(OAuth2Error::invalid_grant("Authorization code expired"));
        }
        if auth_code.client_id != client.client_id {
            return Err(OAuth2Error::invalid_grant(
                "Code was issued to a different client",
            ));
        }
        if auth_code.redirect_uri != redirect_uri {
            return Err(OAuth2Error::invalid_grant("Redirect URI mismatch"));
        }

        verify_pkce(auth_code, client, request.code_verifier.as_deref())
    }
}

#[async_trait]
impl GrantProcessor for AuthorizationCodeGrant {
    fn grant_type(&self) -> GrantType {
        GrantType::AuthorizationCode
    }

    async fn validate(
        &self,
        request: &TokenRequest,
        client: &Client,
    ) -> Result<GrantContext, OAuth2Error> {
        let code = request
            .code
            .as_deref()
            .ok_or_else(|| OAuth2Error::invalid_request("Missing authorization code"))?;
        let redirect_uri = request
            .redirect_uri
            .as_deref()
            .ok_or_else(|| OAuth2Error::invalid_request("Missing redirect_uri"))?;

        let auth_code = self
            .codes
            .get_code(code)
            .await
            .map_err(|e| {
                tracing::error!(
                    "authorization code lookup failed for client {}: {:#}",
                    client.client_id,
                    e
                );
                OAuth2Error::server_error()
            })?
            .ok_or_else(|| OAuth2Error::invalid_grant("Invalid or expired authorization code"))?;

        Self::check_code(&auth_code, request, client, redirect_uri)?;

        Ok(GrantContext::AuthorizationCode {
            code: code.to_owned(),
        })
    }

    async fn issue_token(
        &self,
        request: &TokenRequest,
        client: &Client,
        context: GrantContext,
    ) -> Result<TokenResponse, OAuth2Error> {
        let GrantContext::AuthorizationCode { code } = context else {
            return Err(OAuth2Error::invalid_request("Mismatched grant context"));
        };
        let redirect_uri = request
            .redirect_uri
            .as_deref()
            .ok_or_else(|| OAuth2Error::invalid_request("Missing redirect_uri"))?;

        // Atomic consume: at most one of N concurrent exchanges gets the
        // record. PKCE is re-verified after consumption, so a failed
        // verifier burns the code instead of leaving it replayable.
        let auth_code = self
            .codes
            .consume_code(&code, &client.client_id, redirect_uri, Utc::now())
            .await
            .map_err(|e| {
                tracing::error!(
                    "failed to consume authorization code for client {}: {:#}",
                    client.client_id,
                    e
                );
                OAuth2Error::server_error()
            })?
            .ok_or_else(|| {
                tracing::warn!(
                    "authorization code consume lost for client {}: not found, used, expired, or mismatched",
                    client.client_id
                );
                OAuth2Error::invalid_grant("Invalid or expired authorization code")
            })?;

        verify_pkce(&auth_code, client, request.code_verifier.as_deref())?;

        self.issuer
            .issue_for_user(
                client,
                auth_code.user_id,
                auth_code.scope.as_deref(),
                auth_code.nonce.as_deref(),
                true,
            )
            .await
    }
}

/// Verify the PKCE code verifier against the challenge bound to a code.
///
/// `plain`: verifier equals challenge. `S256`:
/// `base64url(sha256(verifier))` equals challenge, no padding. Both compare
/// in constant time.
fn verify_pkce(
    auth_code: &AuthorizationCode,
    client: &Client,
    code_verifier: Option<&str>,
) -> Result<(), OAuth2Error> {
    let Some(stored_challenge) = &auth_code.code_challenge else {
        if code_verifier.is_some() {
            return Err(OAuth2Error::invalid_grant(
                "code_verifier provided but no code_challenge was issued",
            ));
        }
        if client.require_pkce {
            return Err(OAuth2Error::invalid_grant(
                "Client requires PKCE but the code carries no challenge",
            ));
        }
        return Ok(());
    };

    let verifier = code_verifier
        .ok_or_else(|| OAuth2Error::invalid_grant("code_verifier is required (PKCE)"))?;

    // RFC 7636 Section 4.1: length and character set
    if verifier.len() < pkce::VERIFIER_MIN_LENGTH || verifier.len() > pkce::VERIFIER_MAX_LENGTH {
        return Err(OAuth2Error::invalid_grant(
            "code_verifier must be between 43 and 128 characters",
        ));
    }
    if !verifier
        .chars()
        .all(|c| matches!(c, 'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '.' | '_' | '~'))
    {
        return Err(OAuth2Error::invalid_grant(
            "code_verifier contains invalid characters",
        ));
    }

    let method = auth_code.code_challenge_method.as_deref().unwrap_or("S256");
    let computed_challenge = match method {
        "S256" => {
            let mut hasher = Sha256::new();
            hasher.update(verifier.as_bytes());
            general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize())
        }
        "plain" => verifier.to_owned(),
        _ => {
            return Err(OAuth2Error::invalid_grant(
                "Unsupported code_challenge_method",
            ))
        }
    };

    if computed_challenge
        .as_bytes()
        .ct_eq(stored_challenge.as_bytes())
        .into()
    {
        tracing::debug!("PKCE verification successful for client {}", client.client_id);
        Ok(())
    } else {
        tracing::warn!(
            "PKCE verification failed for client {}: code_verifier does not match code_challenge",
            client.client_id
        );
        Err(OAuth2Error::invalid_grant("Invalid code_verifier"))
    }
}
