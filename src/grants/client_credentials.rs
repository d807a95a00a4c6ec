// ABOUTME: Client credentials grant processor for machine-to-machine tokens
// ABOUTME: Public clients are rejected; issues an access token with no refresh token
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use crate::clients::ClientRegistry;
use crate::errors::OAuth2Error;
use crate::grants::{GrantContext, GrantProcessor, TokenIssuer};
use crate::models::{Client, ClientType, GrantType, TokenRequest, TokenResponse};
use async_trait::async_trait;
use std::sync::Arc;

/// Processor for the `client_credentials` grant.
pub struct ClientCredentialsGrant {
    issuer: Arc<TokenIssuer>,
}

impl ClientCredentialsGrant {
    /// Processor over the given issuer.
    #[must_use]
    pub fn new(issuer: Arc<TokenIssuer>) -> Self {
        Self { issuer }
    }
}

#[async_trait]
impl GrantProcessor for ClientCredentialsGrant {
    fn grant_type(&self) -> GrantType {
        GrantType::ClientCredentials
    }

    async fn validate(
        &self,
        request: &TokenRequest,
        client: &Client,
    ) -> Result<GrantContext, OAuth2Error> {
        if client.client_type == ClientType::Public {
            tracing::warn!(
                "public client {} attempted the client_credentials grant",
                client.client_id
            );
            return Err(OAuth2Error::unauthorized_client(
                "Public clients cannot use the client_credentials grant",
            ));
        }

        let scope = ClientRegistry::validate_scope(client, request.scope.as_deref())?;

        Ok(GrantContext::ClientCredentials { scope })
    }

    async fn issue_token(
        &self,
        _request: &TokenRequest,
        client: &Client,
        context: GrantContext,
    ) -> Result<TokenResponse, OAuth2Error> {
        let GrantContext::ClientCredentials { scope } = context else {
            return Err(OAuth2Error::invalid_request("Mismatched grant context"));
        };

        // No user session exists to log back into, so no refresh token
        self.issuer.issue_for_client(client, scope.as_deref()).await
    }
}
