// ABOUTME: Unit tests for the token codec
// ABOUTME: Validates signing, typed verification, detailed errors, and sliding refresh renewal
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright ©2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use keystone_auth::codec::{JwtValidationError, RefreshError, TokenCodec, TokenIdentity, TokenType};
use keystone_auth::config::CodecConfig;
use keystone_auth::errors::ConfigError;
use keystone_auth::models::User;
use keystone_auth::storage::{InMemoryUserStore, UserStore};
use uuid::Uuid;

fn create_codec() -> TokenCodec {
    TokenCodec::new(common::test_codec_config()).unwrap()
}

fn create_test_user() -> User {
    User {
        id: Uuid::new_v4(),
        username: "testuser".into(),
        email: "test@example.com".into(),
        roles: vec!["user".into(), "reader".into()],
        is_active: true,
    }
}

#[test]
fn test_sign_and_verify_access_token() {
    let codec = create_codec();
    let user = create_test_user();

    let token = codec
        .sign(&TokenIdentity::for_user(&user), TokenType::Access)
        .unwrap();
    assert!(!token.is_empty());

    let claims = codec.verify(&token, TokenType::Access).unwrap();
    assert_eq!(claims.sub, user.id.to_string());
    assert_eq!(claims.user_id, Some(user.id));
    assert_eq!(claims.username, "testuser");
    assert_eq!(claims.roles, vec!["user".to_owned(), "reader".to_owned()]);
    assert_eq!(claims.token_type, TokenType::Access);
    assert!(claims.exp > claims.iat);
}

#[test]
fn test_tokens_are_unique() {
    let codec = create_codec();
    let user = create_test_user();
    let identity = TokenIdentity::for_user(&user);

    let first = codec.sign(&identity, TokenType::Access).unwrap();
    let second = codec.sign(&identity, TokenType::Access).unwrap();
    assert_ne!(first, second);
}

#[test]
fn test_wrong_token_type_rejected_both_ways() {
    let codec = create_codec();
    let user = create_test_user();
    let identity = TokenIdentity::for_user(&user);

    let access = codec.sign(&identity, TokenType::Access).unwrap();
    let refresh = codec.sign(&identity, TokenType::Refresh).unwrap();

    match codec.verify(&access, TokenType::Refresh) {
        Err(JwtValidationError::WrongTokenType { expected, actual }) => {
            assert_eq!(expected, TokenType::Refresh);
            assert_eq!(actual, TokenType::Access);
        }
        other => panic!("expected WrongTokenType, got {other:?}"),
    }

    match codec.verify(&refresh, TokenType::Access) {
        Err(JwtValidationError::WrongTokenType { expected, actual }) => {
            assert_eq!(expected, TokenType::Access);
            assert_eq!(actual, TokenType::Refresh);
        }
        other => panic!("expected WrongTokenType, got {other:?}"),
    }
}

#[test]
fn test_expired_token_distinguished_from_invalid() {
    let codec = create_codec();
    let user = create_test_user();
    let identity = TokenIdentity::for_user(&user);

    // A token already past its expiry
    let expired = codec
        .sign_with_ttl(&identity, TokenType::Access, -10)
        .unwrap();
    assert!(matches!(
        codec.verify(&expired, TokenType::Access),
        Err(JwtValidationError::TokenExpired { .. })
    ));

    // A token signed under a different key
    let other_codec =
        TokenCodec::new(CodecConfig::new(b"a-completely-different-secret".to_vec())).unwrap();
    let foreign = other_codec.sign(&identity, TokenType::Access).unwrap();
    assert!(matches!(
        codec.verify(&foreign, TokenType::Access),
        Err(JwtValidationError::TokenInvalid { .. })
    ));

    // Not a JWT at all
    assert!(matches!(
        codec.verify("not.a.jwt", TokenType::Access),
        Err(JwtValidationError::TokenMalformed { .. })
    ));
}

#[test]
fn test_config_errors_fail_fast_at_construction() {
    let mut config = common::test_codec_config();
    config.refresh_sliding_threshold_secs = config.refresh_ttl_secs;
    assert!(matches!(
        TokenCodec::new(config),
        Err(ConfigError::InvalidSlidingThreshold { .. })
    ));

    let mut config = common::test_codec_config();
    config.refresh_sliding_threshold_secs = -1;
    assert!(matches!(
        TokenCodec::new(config),
        Err(ConfigError::InvalidSlidingThreshold { .. })
    ));

    assert!(matches!(
        TokenCodec::new(CodecConfig::new(Vec::new())),
        Err(ConfigError::EmptySecret)
    ));

    let mut config = common::test_codec_config();
    config.access_ttl_secs = 0;
    assert!(matches!(
        TokenCodec::new(config),
        Err(ConfigError::NonPositiveTtl { .. })
    ));
}

#[tokio::test]
async fn test_refresh_tokens_happy_path() {
    let codec = create_codec();
    let user = create_test_user();

    let refresh = codec
        .sign(&TokenIdentity::for_user(&user), TokenType::Refresh)
        .unwrap();

    let result = codec.refresh_tokens(&refresh, None).await.unwrap();
    assert!(!result.access_token.is_empty());
    assert!(!result.renewed);
    assert!(result.refresh_token.is_none());

    // The new access token verifies and carries the same subject
    let claims = codec
        .verify(&result.access_token, TokenType::Access)
        .unwrap();
    assert_eq!(claims.sub, user.id.to_string());
}

#[tokio::test]
async fn test_refresh_rejects_access_token() {
    let codec = create_codec();
    let user = create_test_user();

    let access = codec
        .sign(&TokenIdentity::for_user(&user), TokenType::Access)
        .unwrap();

    assert!(matches!(
        codec.refresh_tokens(&access, None).await,
        Err(RefreshError::Validation(
            JwtValidationError::WrongTokenType { .. }
        ))
    ));
}

#[tokio::test]
async fn test_refresh_never_partially_succeeds() {
    let codec = create_codec();
    let user = create_test_user();

    let expired_refresh = codec
        .sign_with_ttl(&TokenIdentity::for_user(&user), TokenType::Refresh, -10)
        .unwrap();

    assert!(matches!(
        codec.refresh_tokens(&expired_refresh, None).await,
        Err(RefreshError::Validation(
            JwtValidationError::TokenExpired { .. }
        ))
    ));
}

#[tokio::test]
async fn test_sliding_refresh_idempotence() {
    // Threshold enabled but the token is far from expiry: repeated calls
    // never renew
    let mut config = common::test_codec_config();
    config.refresh_ttl_secs = 3600;
    config.refresh_sliding_threshold_secs = 60;
    let codec = TokenCodec::new(config).unwrap();
    let user = create_test_user();

    let refresh = codec
        .sign(&TokenIdentity::for_user(&user), TokenType::Refresh)
        .unwrap();

    for _ in 0..5 {
        let result = codec.refresh_tokens(&refresh, None).await.unwrap();
        assert!(!result.renewed);
        assert!(result.refresh_token.is_none());
    }
}

#[tokio::test]
async fn test_sliding_refresh_renews_near_expiry() {
    let mut config = common::test_codec_config();
    config.refresh_ttl_secs = 3600;
    config.refresh_sliding_threshold_secs = 60;
    let codec = TokenCodec::new(config).unwrap();
    let user = create_test_user();

    // Inside the renewal threshold: 30s remaining < 60s threshold
    let near_expiry = codec
        .sign_with_ttl(&TokenIdentity::for_user(&user), TokenType::Refresh, 30)
        .unwrap();

    let result = codec.refresh_tokens(&near_expiry, None).await.unwrap();
    assert!(result.renewed);
    let renewed = result.refresh_token.expect("renewal should return a refresh token");

    // The renewed token has a full lifetime again, so it does not renew
    let result = codec.refresh_tokens(&renewed, None).await.unwrap();
    assert!(!result.renewed);
}

#[tokio::test]
async fn test_sliding_disabled_never_renews() {
    // Threshold 0 disables renewal even at the edge of expiry
    let codec = create_codec();
    let user = create_test_user();

    let near_expiry = codec
        .sign_with_ttl(&TokenIdentity::for_user(&user), TokenType::Refresh, 5)
        .unwrap();

    let result = codec.refresh_tokens(&near_expiry, None).await.unwrap();
    assert!(!result.renewed);
    assert!(result.refresh_token.is_none());
}

#[tokio::test]
async fn test_refresh_with_user_lookup_cuts_off_inactive_user() {
    let codec = create_codec();
    let users = InMemoryUserStore::new();
    let mut user = create_test_user();
    users.insert_user(user.clone());

    let refresh = codec
        .sign(&TokenIdentity::for_user(&user), TokenType::Refresh)
        .unwrap();

    // Active user refreshes fine
    assert!(codec
        .refresh_tokens(&refresh, Some(&users))
        .await
        .is_ok());

    // Deactivate: the still-valid refresh token is now useless
    user.is_active = false;
    users.insert_user(user.clone());
    assert!(matches!(
        codec.refresh_tokens(&refresh, Some(&users)).await,
        Err(RefreshError::UserRejected)
    ));

    // Deleted user likewise
    users.remove_user(user.id);
    assert!(matches!(
        codec.refresh_tokens(&refresh, Some(&users)).await,
        Err(RefreshError::UserRejected)
    ));
}

#[tokio::test]
async fn test_refresh_with_user_lookup_refreshes_roles() {
    let codec = create_codec();
    let users = InMemoryUserStore::new();
    let mut user = create_test_user();
    users.insert_user(user.clone());

    let refresh = codec
        .sign(&TokenIdentity::for_user(&user), TokenType::Refresh)
        .unwrap();

    user.roles = vec!["admin".into()];
    users.insert_user(user.clone());

    let result = codec
        .refresh_tokens(&refresh, Some(&users))
        .await
        .unwrap();
    let claims = codec
        .verify(&result.access_token, TokenType::Access)
        .unwrap();
    assert_eq!(claims.roles, vec!["admin".to_owned()]);
}

#[tokio::test]
async fn test_user_store_lookup_contract() {
    let users = InMemoryUserStore::new();
    let user = create_test_user();
    users.insert_user(user.clone());

    let found = users.get_user(user.id).await.unwrap();
    assert_eq!(found.map(|u| u.id), Some(user.id));
    assert!(users.get_user(Uuid::new_v4()).await.unwrap().is_none());
}
