// ABOUTME: Client registry with registration, credential validation, and policy checks
// ABOUTME: Generates and hashes client secrets; the plaintext is surfaced exactly once
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Client Registry
//!
//! CRUD and validation for registered OAuth clients. Secrets are generated
//! from the system RNG, stored as SHA-256 hex, and compared in constant
//! time. Public clients never hold or present a secret.

use crate::constants::secrets;
use crate::errors::OAuth2Error;
use crate::models::{Client, ClientSpec, ClientType, GrantType, RegisteredClient, TokenAuthMethod};
use crate::storage::ClientStore;
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Registry over a pluggable [`ClientStore`].
pub struct ClientRegistry {
    store: Arc<dyn ClientStore>,
}

impl ClientRegistry {
    /// Registry backed by the given store.
    #[must_use]
    pub fn new(store: Arc<dyn ClientStore>) -> Self {
        Self { store }
    }

    /// Register a new client.
    ///
    /// Generates the `client_id`; for confidential clients with an
    /// authentication method, also generates a secret whose plaintext is
    /// returned in the result and never stored.
    ///
    /// # Errors
    /// Returns `invalid_request` for an empty redirect list on
    /// redirect-based grants, or `server_error` on storage/RNG failure.
    pub async fn create_client(
        &self,
        spec: ClientSpec,
    ) -> Result<RegisteredClient, OAuth2Error> {
        let needs_redirect = spec
            .allowed_grant_types
            .contains(&GrantType::AuthorizationCode);
        if needs_redirect && spec.redirect_uris.is_empty() {
            return Err(OAuth2Error::invalid_request(
                "At least one redirect_uri is required for the authorization_code grant",
            ));
        }

        let client_id = Self::generate_client_id();

        let wants_secret = spec.client_type == ClientType::Confidential
            && spec.token_auth_method != TokenAuthMethod::None;
        let (client_secret, secret_hash) = if wants_secret {
            let secret = Self::generate_client_secret().map_err(|e| {
                tracing::error!("client secret generation failed: {:#}", e);
                OAuth2Error::server_error()
            })?;
            let hash = Self::hash_client_secret(&secret);
            (Some(secret), Some(hash))
        } else {
            (None, None)
        };

        let client = Client {
            client_id: client_id.clone(),
            secret_hash,
            client_type: spec.client_type,
            redirect_uris: spec.redirect_uris,
            allowed_grant_types: spec.allowed_grant_types,
            allowed_scopes: spec.allowed_scopes,
            default_scopes: spec.default_scopes,
            token_auth_method: spec.token_auth_method,
            require_pkce: spec.require_pkce,
            access_token_ttl_secs: spec.access_token_ttl_secs,
            refresh_token_ttl_secs: spec.refresh_token_ttl_secs,
            client_name: spec.client_name,
            is_active: true,
            created_at: Utc::now(),
        };

        self.store.store_client(&client).await.map_err(|e| {
            tracing::error!("failed to store client {client_id}: {:#}", e);
            OAuth2Error::server_error()
        })?;

        tracing::info!("registered {:?} client {client_id}", client.client_type);

        Ok(RegisteredClient {
            client,
            client_secret,
        })
    }

    /// Fetch a client by id.
    ///
    /// # Errors
    /// Returns `server_error` on storage failure.
    pub async fn get_client(&self, client_id: &str) -> Result<Option<Client>, OAuth2Error> {
        self.store.get_client(client_id).await.map_err(|e| {
            tracing::error!("client lookup failed for {client_id}: {:#}", e);
            OAuth2Error::server_error()
        })
    }

    /// Validate client credentials.
    ///
    /// Checks, in order: the client exists and is active; if it requires a
    /// secret (confidential with an auth method), one must be supplied and
    /// its hash must match in constant time. Public clients never require a
    /// secret.
    ///
    /// # Errors
    /// Returns `invalid_client` on any credential failure, `server_error`
    /// on storage failure.
    pub async fn validate_client(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
    ) -> Result<Client, OAuth2Error> {
        tracing::debug!("validating client {client_id}");

        let client = self
            .get_client(client_id)
            .await?
            .ok_or_else(|| {
                tracing::warn!("client {client_id} not found");
                OAuth2Error::invalid_client()
            })?;

        if !client.is_active {
            tracing::warn!("client {client_id} is inactive");
            return Err(OAuth2Error::invalid_client());
        }

        if client.requires_secret() {
            let Some(secret) = client_secret else {
                tracing::warn!("client {client_id} requires a secret but none was supplied");
                return Err(OAuth2Error::invalid_client());
            };
            let Some(stored_hash) = &client.secret_hash else {
                // A confidential client without a hash is a registration
                // integrity failure, not a caller mistake
                tracing::error!("confidential client {client_id} has no stored secret hash");
                return Err(OAuth2Error::server_error());
            };
            if !Self::secret_matches(secret, stored_hash) {
                tracing::warn!("client {client_id} secret validation failed");
                return Err(OAuth2Error::invalid_client());
            }
        }

        tracing::debug!("client {client_id} validated");
        Ok(client)
    }

    /// Validate a redirect URI against a client's registration.
    ///
    /// # Errors
    /// Returns `invalid_request` when no registered URI matches.
    pub fn validate_redirect_uri(client: &Client, uri: &str) -> Result<(), OAuth2Error> {
        if client.redirect_uri_matches(uri) {
            Ok(())
        } else {
            Err(OAuth2Error::invalid_request("Invalid redirect_uri"))
        }
    }

    /// Resolve and validate a requested scope against a client.
    ///
    /// # Errors
    /// Returns `invalid_scope` naming the unauthorized scopes.
    pub fn validate_scope(
        client: &Client,
        requested: Option<&str>,
    ) -> Result<Option<String>, OAuth2Error> {
        client.resolve_scope(requested).map_err(|unauthorized| {
            OAuth2Error::invalid_scope(&format!(
                "Scopes not authorized for this client: {}",
                unauthorized.join(" ")
            ))
        })
    }

    /// Check grant type membership.
    ///
    /// # Errors
    /// Returns `unauthorized_client` when the client is not registered for
    /// the grant type.
    pub fn validate_grant_type(client: &Client, grant_type: GrantType) -> Result<(), OAuth2Error> {
        if client.allows_grant_type(grant_type) {
            Ok(())
        } else {
            Err(OAuth2Error::unauthorized_client(&format!(
                "Client is not registered for the {grant_type} grant"
            )))
        }
    }

    /// Toggle a client's active flag (admin operation).
    ///
    /// # Errors
    /// Returns `invalid_client` for unknown clients, `server_error` on
    /// storage failure.
    pub async fn set_active(&self, client_id: &str, active: bool) -> Result<(), OAuth2Error> {
        let found = self
            .store
            .set_client_active(client_id, active)
            .await
            .map_err(|e| {
                tracing::error!("failed to toggle client {client_id}: {:#}", e);
                OAuth2Error::server_error()
            })?;
        if found {
            tracing::info!("client {client_id} active={active}");
            Ok(())
        } else {
            Err(OAuth2Error::invalid_client())
        }
    }

    /// Delete a client (admin operation). Existing tokens are untouched;
    /// callers revoke explicitly.
    ///
    /// # Errors
    /// Returns `invalid_client` for unknown clients, `server_error` on
    /// storage failure.
    pub async fn delete_client(&self, client_id: &str) -> Result<(), OAuth2Error> {
        let found = self.store.delete_client(client_id).await.map_err(|e| {
            tracing::error!("failed to delete client {client_id}: {:#}", e);
            OAuth2Error::server_error()
        })?;
        if found {
            tracing::info!("client {client_id} deleted");
            Ok(())
        } else {
            Err(OAuth2Error::invalid_client())
        }
    }

    /// Generate a client ID.
    fn generate_client_id() -> String {
        format!("kst_client_{}", Uuid::new_v4().simple())
    }

    /// Generate a client secret from the system RNG.
    fn generate_client_secret() -> anyhow::Result<String> {
        let rng = SystemRandom::new();
        let mut bytes = [0u8; secrets::CLIENT_SECRET_BYTES];
        rng.fill(&mut bytes)
            .map_err(|_| anyhow::anyhow!("system RNG failure"))?;
        Ok(general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Hash a client secret for storage.
    fn hash_client_secret(secret: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Constant-time comparison of a presented secret against the stored hash.
    fn secret_matches(secret: &str, stored_hash: &str) -> bool {
        let provided_hash = Self::hash_client_secret(secret);
        provided_hash
            .as_bytes()
            .ct_eq(stored_hash.as_bytes())
            .into()
    }
}
