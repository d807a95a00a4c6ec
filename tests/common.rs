// ABOUTME: Shared test harness: in-memory stores, codec, and fixture builders
// ABOUTME: Keeps integration tests consistent across components
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright ©2025 Async-IO.org

#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use base64::{engine::general_purpose, Engine as _};
use keystone_auth::codec::TokenCodec;
use keystone_auth::config::{CodecConfig, ServerConfig};
use keystone_auth::models::{ClientSpec, ClientType, GrantType, TokenAuthMethod, User};
use keystone_auth::server::AuthorizationServer;
use keystone_auth::storage::{
    InMemoryAuthCodeStore, InMemoryClientStore, InMemoryDeviceCodeStore, InMemoryTokenStore,
    InMemoryUserStore,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::sync::Once;
use uuid::Uuid;

static INIT_TRACING: Once = Once::new();

/// Initialize a test tracing subscriber once per process.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Codec config with a fixed test secret and default TTLs.
pub fn test_codec_config() -> CodecConfig {
    CodecConfig::new(b"test-signing-secret-0123456789abcdef".to_vec())
}

/// Server harness over fresh in-memory stores.
pub struct TestHarness {
    pub server: Arc<AuthorizationServer>,
    pub users: Arc<InMemoryUserStore>,
    pub codec: Arc<TokenCodec>,
}

/// Harness with default server configuration.
pub fn build_server() -> TestHarness {
    build_server_with(ServerConfig::default())
}

/// Harness with custom server configuration.
pub fn build_server_with(config: ServerConfig) -> TestHarness {
    init_tracing();
    let codec = Arc::new(TokenCodec::new(test_codec_config()).unwrap());
    let users = Arc::new(InMemoryUserStore::new());
    let server = Arc::new(AuthorizationServer::new(
        Arc::clone(&codec),
        Arc::new(InMemoryClientStore::new()),
        Arc::new(InMemoryAuthCodeStore::new()),
        Arc::new(InMemoryTokenStore::new()),
        Arc::new(InMemoryDeviceCodeStore::new()),
        Arc::clone(&users) as Arc<dyn keystone_auth::storage::UserStore>,
        config,
    ));
    TestHarness {
        server,
        users,
        codec,
    }
}

/// Insert and return an active test user.
pub fn create_test_user(users: &InMemoryUserStore) -> User {
    let user = User {
        id: Uuid::new_v4(),
        username: "testuser".into(),
        email: "test@example.com".into(),
        roles: vec!["user".into()],
        is_active: true,
    };
    users.insert_user(user.clone());
    user
}

/// Spec for a confidential client registered for every grant type.
pub fn confidential_client_spec() -> ClientSpec {
    ClientSpec {
        client_type: ClientType::Confidential,
        redirect_uris: vec!["http://cb".into()],
        allowed_grant_types: vec![
            GrantType::AuthorizationCode,
            GrantType::ClientCredentials,
            GrantType::RefreshToken,
            GrantType::DeviceCode,
        ],
        allowed_scopes: vec!["openid".into(), "api.read".into(), "api.write".into()],
        default_scopes: vec!["api.read".into()],
        token_auth_method: TokenAuthMethod::ClientSecretBasic,
        require_pkce: false,
        access_token_ttl_secs: None,
        refresh_token_ttl_secs: None,
        client_name: Some("Test Client".into()),
    }
}

/// Spec for a public client (no secret) limited to redirect-based grants.
pub fn public_client_spec() -> ClientSpec {
    ClientSpec {
        client_type: ClientType::Public,
        redirect_uris: vec!["http://cb".into()],
        allowed_grant_types: vec![
            GrantType::AuthorizationCode,
            GrantType::RefreshToken,
            GrantType::DeviceCode,
            GrantType::ClientCredentials,
        ],
        allowed_scopes: vec!["openid".into(), "api.read".into()],
        default_scopes: vec!["api.read".into()],
        token_auth_method: TokenAuthMethod::None,
        require_pkce: true,
        access_token_ttl_secs: None,
        refresh_token_ttl_secs: None,
        client_name: Some("Public Test Client".into()),
    }
}

/// Compute a PKCE S256 challenge from a verifier.
pub fn s256_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize())
}
