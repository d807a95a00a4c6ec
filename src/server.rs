// ABOUTME: Authorization server façade: client validation, grant dispatch, and token lifecycle
// ABOUTME: Validates the client once per request, then routes to the matching grant processor
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Authorization Server
//!
//! The façade over the client registry, grant processors, and token
//! stores. Transport is the host's job; every operation here takes and
//! returns plain values shaped for the wire.

use crate::clients::ClientRegistry;
use crate::codec::{TokenCodec, TokenType};
use crate::config::ServerConfig;
use crate::constants::{device, secrets};
use crate::errors::OAuth2Error;
use crate::grants::{
    generate_opaque_token, AuthorizationCodeGrant, ClientCredentialsGrant, DeviceCodeGrant,
    GrantProcessor, RefreshTokenGrant, TokenIssuer,
};
use crate::models::{
    AuthorizationCode, AuthorizeRequest, Client, ClientSpec, DeviceAuthorizationResponse,
    DeviceCode, DeviceCodeStatus, GrantType, IntrospectionResponse, RegisteredClient, Token,
    TokenRequest, TokenResponse, TokenTypeHint,
};
use crate::storage::{AuthCodeStore, ClientStore, DeviceCodeStore, TokenStore, UserStore};
use chrono::{Duration, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// OAuth 2.0 authorization server.
pub struct AuthorizationServer {
    registry: ClientRegistry,
    codec: Arc<TokenCodec>,
    tokens: Arc<dyn TokenStore>,
    auth_codes: Arc<dyn AuthCodeStore>,
    device_codes: Arc<dyn DeviceCodeStore>,
    processors: HashMap<GrantType, Box<dyn GrantProcessor>>,
    config: ServerConfig,
}

impl AuthorizationServer {
    /// Assemble a server from its injected collaborators.
    #[must_use]
    pub fn new(
        codec: Arc<TokenCodec>,
        clients: Arc<dyn ClientStore>,
        auth_codes: Arc<dyn AuthCodeStore>,
        tokens: Arc<dyn TokenStore>,
        device_codes: Arc<dyn DeviceCodeStore>,
        users: Arc<dyn UserStore>,
        config: ServerConfig,
    ) -> Self {
        let issuer = Arc::new(TokenIssuer::new(
            Arc::clone(&codec),
            Arc::clone(&tokens),
            users,
        ));

        let mut processors: HashMap<GrantType, Box<dyn GrantProcessor>> = HashMap::new();
        processors.insert(
            GrantType::AuthorizationCode,
            Box::new(AuthorizationCodeGrant::new(
                Arc::clone(&auth_codes),
                Arc::clone(&issuer),
            )),
        );
        processors.insert(
            GrantType::ClientCredentials,
            Box::new(ClientCredentialsGrant::new(Arc::clone(&issuer))),
        );
        processors.insert(
            GrantType::RefreshToken,
            Box::new(RefreshTokenGrant::new(
                Arc::clone(&tokens),
                Arc::clone(&issuer),
                config.rotate_refresh_tokens,
            )),
        );
        processors.insert(
            GrantType::DeviceCode,
            Box::new(DeviceCodeGrant::new(Arc::clone(&device_codes), issuer)),
        );

        Self {
            registry: ClientRegistry::new(clients),
            codec,
            tokens,
            auth_codes,
            device_codes,
            processors,
            config,
        }
    }

    /// The client registry, for admin operations.
    #[must_use]
    pub fn clients(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Register a new client.
    ///
    /// # Errors
    /// See [`ClientRegistry::create_client`].
    pub async fn create_client(
        &self,
        spec: ClientSpec,
    ) -> Result<RegisteredClient, OAuth2Error> {
        self.registry.create_client(spec).await
    }

    /// Handle the authorize step: validate the request against the client
    /// and mint a single-use authorization code bound to the user.
    ///
    /// # Errors
    /// Returns `invalid_client`, `unauthorized_client`, `invalid_request`,
    /// or `invalid_scope` per the failing check; `server_error` on storage
    /// failure.
    pub async fn create_authorization_code(
        &self,
        request: AuthorizeRequest,
        user_id: Uuid,
    ) -> Result<String, OAuth2Error> {
        let client = self
            .registry
            .get_client(&request.client_id)
            .await?
            .filter(|c| c.is_active)
            .ok_or_else(|| {
                tracing::warn!("authorize request for unknown or inactive client {}", request.client_id);
                OAuth2Error::invalid_client()
            })?;

        ClientRegistry::validate_grant_type(&client, GrantType::AuthorizationCode)?;
        ClientRegistry::validate_redirect_uri(&client, &request.redirect_uri)?;
        let scope = ClientRegistry::validate_scope(&client, request.scope.as_deref())?;

        Self::check_pkce_parameters(&client, &request)?;

        let code = Self::generate_code()?;
        let now = Utc::now();
        let auth_code = AuthorizationCode {
            code: code.clone(),
            client_id: client.client_id.clone(),
            user_id,
            redirect_uri: request.redirect_uri,
            scope,
            code_challenge: request.code_challenge,
            code_challenge_method: request.code_challenge_method,
            nonce: request.nonce,
            created_at: now,
            expires_at: now + Duration::seconds(self.config.auth_code_ttl_secs),
            used: false,
        };

        self.auth_codes.store_code(&auth_code).await.map_err(|e| {
            tracing::error!(
                "failed to store authorization code for client {}: {:#}",
                client.client_id,
                e
            );
            OAuth2Error::server_error()
        })?;

        tracing::debug!(
            "issued authorization code for client {} and user {user_id}",
            client.client_id
        );
        Ok(code)
    }

    /// Handle a token request: validate the client once, then dispatch by
    /// grant type to the matching processor.
    ///
    /// # Errors
    /// Returns the processor's OAuth reason code, `invalid_client` for
    /// credential failures, or `unsupported_grant_type`.
    pub async fn token(&self, request: &TokenRequest) -> Result<TokenResponse, OAuth2Error> {
        let Some(grant_type) = GrantType::parse(&request.grant_type) else {
            return Err(OAuth2Error::unsupported_grant_type());
        };

        // Client (and secret, where required) is validated exactly once;
        // processors never re-check credentials
        let client = self
            .registry
            .validate_client(&request.client_id, request.client_secret.as_deref())
            .await?;

        ClientRegistry::validate_grant_type(&client, grant_type)?;

        let processor = self
            .processors
            .get(&grant_type)
            .ok_or_else(OAuth2Error::unsupported_grant_type)?;

        let context = processor.validate(request, &client).await?;
        processor.issue_token(request, &client, context).await
    }

    /// Exchange an authorization code for a token pair.
    ///
    /// # Errors
    /// See [`Self::token`].
    pub async fn exchange_code(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenResponse, OAuth2Error> {
        let mut request = TokenRequest::new(GrantType::AuthorizationCode, client_id, client_secret);
        request.code = Some(code.to_owned());
        request.redirect_uri = Some(redirect_uri.to_owned());
        request.code_verifier = code_verifier.map(str::to_owned);
        self.token(&request).await
    }

    /// Issue a client-credentials access token (no user, no refresh token).
    ///
    /// # Errors
    /// See [`Self::token`].
    pub async fn client_credentials_token(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
        scope: Option<&str>,
    ) -> Result<TokenResponse, OAuth2Error> {
        let mut request = TokenRequest::new(GrantType::ClientCredentials, client_id, client_secret);
        request.scope = scope.map(str::to_owned);
        self.token(&request).await
    }

    /// Exchange a refresh token, rotating it unless rotation is disabled.
    ///
    /// # Errors
    /// See [`Self::token`].
    pub async fn refresh_token(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
        refresh_token: &str,
    ) -> Result<TokenResponse, OAuth2Error> {
        let mut request = TokenRequest::new(GrantType::RefreshToken, client_id, client_secret);
        request.refresh_token = Some(refresh_token.to_owned());
        self.token(&request).await
    }

    /// Start a device flow: mint the device/user code pair.
    ///
    /// # Errors
    /// Returns `invalid_client`, `unauthorized_client`, or `invalid_scope`
    /// per the failing check; `server_error` on storage failure.
    pub async fn create_device_code(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
        scope: Option<&str>,
    ) -> Result<DeviceAuthorizationResponse, OAuth2Error> {
        let client = self
            .registry
            .validate_client(client_id, client_secret)
            .await?;
        ClientRegistry::validate_grant_type(&client, GrantType::DeviceCode)?;
        let scope = ClientRegistry::validate_scope(&client, scope)?;

        let device_code = generate_opaque_token(secrets::DEVICE_CODE_BYTES)?;
        let user_code = Self::generate_user_code()?;
        let now = Utc::now();
        let verification_uri = self.config.device_verification_uri.clone();
        let verification_uri_complete = format!("{verification_uri}?user_code={user_code}");

        let record = DeviceCode {
            device_code: device_code.clone(),
            user_code: user_code.clone(),
            client_id: client.client_id.clone(),
            scope,
            verification_uri: verification_uri.clone(),
            verification_uri_complete: verification_uri_complete.clone(),
            created_at: now,
            expires_at: now + Duration::seconds(self.config.device_code_ttl_secs),
            interval: self.config.device_poll_interval_secs,
            last_polled_at: None,
            user_id: None,
            status: DeviceCodeStatus::Pending,
        };

        self.device_codes
            .store_device_code(&record)
            .await
            .map_err(|e| {
                tracing::error!(
                    "failed to store device code for client {}: {:#}",
                    client.client_id,
                    e
                );
                OAuth2Error::server_error()
            })?;

        tracing::debug!("issued device code for client {}", client.client_id);

        Ok(DeviceAuthorizationResponse {
            device_code,
            user_code,
            verification_uri,
            verification_uri_complete,
            expires_in: self.config.device_code_ttl_secs,
            interval: self.config.device_poll_interval_secs,
        })
    }

    /// Apply a user's approve/deny decision for a device flow.
    ///
    /// Idempotent: repeating a decision leaves the terminal state and the
    /// bound user untouched, and only the token exchange issues tokens.
    ///
    /// # Errors
    /// Returns `invalid_grant` for an unknown user code, `expired_token`
    /// for a code past its window, `server_error` on storage failure.
    pub async fn authorize_device(
        &self,
        user_code: &str,
        user_id: Uuid,
        approve: bool,
    ) -> Result<(), OAuth2Error> {
        let normalized = user_code.trim().replace('-', "").to_uppercase();

        let record = self
            .device_codes
            .get_by_user_code(&normalized)
            .await
            .map_err(|e| {
                tracing::error!("device code lookup failed for user code: {:#}", e);
                OAuth2Error::server_error()
            })?
            .ok_or_else(|| OAuth2Error::invalid_grant("Unknown user code"))?;

        if record.status == DeviceCodeStatus::Pending && record.is_expired(Utc::now()) {
            return Err(OAuth2Error::expired_token());
        }

        self.device_codes
            .authorize(&normalized, user_id, approve)
            .await
            .map_err(|e| {
                tracing::error!("failed to record device authorization: {:#}", e);
                OAuth2Error::server_error()
            })?
            .ok_or_else(|| OAuth2Error::invalid_grant("Unknown user code"))?;

        tracing::info!(
            "device code {} by user {user_id}",
            if approve { "approved" } else { "denied" }
        );
        Ok(())
    }

    /// Poll a device code for tokens.
    ///
    /// # Errors
    /// Returns retryable `authorization_pending`/`slow_down` while the user
    /// has not acted, `access_denied`/`expired_token`/`invalid_grant` for
    /// terminal outcomes.
    pub async fn device_code_token(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
        device_code: &str,
    ) -> Result<TokenResponse, OAuth2Error> {
        let mut request = TokenRequest::new(GrantType::DeviceCode, client_id, client_secret);
        request.device_code = Some(device_code.to_owned());
        self.token(&request).await
    }

    /// Validate an access token and return its live record.
    ///
    /// # Errors
    /// Returns `invalid_grant` for unknown, expired, revoked, or
    /// wrong-typed tokens; `server_error` on storage failure.
    pub async fn validate_token(&self, access_token: &str) -> Result<Token, OAuth2Error> {
        self.codec
            .verify(access_token, TokenType::Access)
            .map_err(|e| OAuth2Error::invalid_grant(&e.to_string()))?;

        let record = self
            .tokens
            .get_by_access_token(access_token)
            .await
            .map_err(|e| {
                tracing::error!("access token lookup failed: {:#}", e);
                OAuth2Error::server_error()
            })?
            .ok_or_else(|| OAuth2Error::invalid_grant("Unknown access token"))?;

        if record.revoked {
            return Err(OAuth2Error::invalid_grant("Token has been revoked"));
        }
        if record.is_expired(Utc::now()) {
            return Err(OAuth2Error::invalid_grant("Token has expired"));
        }

        Ok(record)
    }

    /// Revoke a token (RFC 7009 semantics: unknown tokens are a no-op
    /// success, so callers cannot probe for token existence).
    ///
    /// # Errors
    /// Returns `server_error` on storage failure.
    pub async fn revoke_token(
        &self,
        token: &str,
        hint: Option<TokenTypeHint>,
    ) -> Result<(), OAuth2Error> {
        let storage_err = |e: anyhow::Error| {
            tracing::error!("token revocation failed: {:#}", e);
            OAuth2Error::server_error()
        };

        // Try the hinted type first, then fall back to the other
        let revoked = match hint {
            Some(TokenTypeHint::RefreshToken) => {
                self.tokens
                    .revoke_refresh_token(token)
                    .await
                    .map_err(storage_err)?
                    || self
                        .tokens
                        .revoke_access_token(token)
                        .await
                        .map_err(storage_err)?
            }
            _ => {
                self.tokens
                    .revoke_access_token(token)
                    .await
                    .map_err(storage_err)?
                    || self
                        .tokens
                        .revoke_refresh_token(token)
                        .await
                        .map_err(storage_err)?
            }
        };

        if revoked {
            tracing::info!("token revoked");
        } else {
            tracing::debug!("revocation request for unknown token ignored");
        }
        Ok(())
    }

    /// Introspect a token (RFC 7662).
    ///
    /// Never errors: unknown, malformed, expired, and revoked tokens are
    /// all reported as `active=false` with no metadata, and storage
    /// failures are logged and reported inactive.
    pub async fn introspect_token(&self, token: &str) -> IntrospectionResponse {
        let now = Utc::now();

        match self.tokens.get_by_access_token(token).await {
            Ok(Some(record)) => {
                if record.revoked
                    || record.is_expired(now)
                    || self.codec.verify(token, TokenType::Access).is_err()
                {
                    return IntrospectionResponse::inactive();
                }
                return Self::introspection_for(&record, "access");
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!("introspection lookup failed: {:#}", e);
                return IntrospectionResponse::inactive();
            }
        }

        // Not an access token; report on live refresh tokens too
        match self.tokens.get_by_refresh_token(token).await {
            Ok(Some(record)) if !record.revoked && !record.is_refresh_expired(now) => {
                Self::introspection_for(&record, "refresh")
            }
            Ok(_) => IntrospectionResponse::inactive(),
            Err(e) => {
                tracing::error!("introspection lookup failed: {:#}", e);
                IntrospectionResponse::inactive()
            }
        }
    }

    /// Sweep expired codes, tokens, and device codes from the stores.
    ///
    /// # Errors
    /// Returns `server_error` on storage failure.
    pub async fn cleanup_expired(&self) -> Result<usize, OAuth2Error> {
        let now = Utc::now();
        let storage_err = |e: anyhow::Error| {
            tracing::error!("cleanup sweep failed: {:#}", e);
            OAuth2Error::server_error()
        };

        let codes = self
            .auth_codes
            .cleanup_expired(now)
            .await
            .map_err(storage_err)?;
        let tokens = self.tokens.cleanup_expired(now).await.map_err(storage_err)?;
        let devices = self
            .device_codes
            .cleanup_expired(now)
            .await
            .map_err(storage_err)?;

        let total = codes + tokens + devices;
        if total > 0 {
            tracing::debug!("cleanup removed {codes} codes, {tokens} tokens, {devices} device codes");
        }
        Ok(total)
    }

    fn introspection_for(record: &Token, token_type: &str) -> IntrospectionResponse {
        IntrospectionResponse {
            active: true,
            client_id: Some(record.client_id.clone()),
            scope: record.scope.clone(),
            sub: Some(record.user_id.map_or_else(
                || format!("client:{}", record.client_id),
                |uid| uid.to_string(),
            )),
            exp: Some(record.expires_at.timestamp()),
            iat: Some(record.created_at.timestamp()),
            token_type: Some(token_type.to_owned()),
        }
    }

    /// Validate PKCE parameters at authorize time.
    fn check_pkce_parameters(
        client: &Client,
        request: &AuthorizeRequest,
    ) -> Result<(), OAuth2Error> {
        use crate::constants::pkce;

        if let Some(challenge) = &request.code_challenge {
            if challenge.len() < pkce::VERIFIER_MIN_LENGTH
                || challenge.len() > pkce::VERIFIER_MAX_LENGTH
            {
                return Err(OAuth2Error::invalid_request(
                    "code_challenge must be between 43 and 128 characters",
                ));
            }
            let method = request.code_challenge_method.as_deref().unwrap_or("S256");
            if method != "S256" && method != "plain" {
                return Err(OAuth2Error::invalid_request(
                    "code_challenge_method must be 'S256' or 'plain'",
                ));
            }
        } else if client.require_pkce {
            return Err(OAuth2Error::invalid_request(
                "code_challenge is required for this client (PKCE)",
            ));
        }
        Ok(())
    }

    /// Generate a random code string.
    fn generate_code() -> Result<String, OAuth2Error> {
        generate_opaque_token(secrets::AUTH_CODE_BYTES)
    }

    /// Generate a human-enterable user code from the restricted alphabet.
    ///
    /// Rejection sampling keeps the character distribution uniform.
    fn generate_user_code() -> Result<String, OAuth2Error> {
        let rng = SystemRandom::new();
        let alphabet = device::USER_CODE_ALPHABET;
        let limit = 256 - (256 % alphabet.len());

        let mut code = String::with_capacity(device::USER_CODE_LENGTH);
        let mut buf = [0u8; 32];
        while code.len() < device::USER_CODE_LENGTH {
            rng.fill(&mut buf).map_err(|_| {
                tracing::error!("system RNG failure while generating user code");
                OAuth2Error::server_error()
            })?;
            for byte in buf {
                if (byte as usize) < limit {
                    code.push(alphabet[byte as usize % alphabet.len()] as char);
                    if code.len() == device::USER_CODE_LENGTH {
                        break;
                    }
                }
            }
        }
        Ok(code)
    }
}
