// ABOUTME: Unit tests for the token blacklist
// ABOUTME: Validates hash records, the per-user watermark, and TTL-based cleanup
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use keystone_auth::blacklist::TokenBlacklist;
use keystone_auth::codec::{TokenCodec, TokenIdentity, TokenType};
use keystone_auth::models::User;
use std::thread::sleep;
use std::time::Duration;
use uuid::Uuid;

fn create_codec() -> TokenCodec {
    common::init_tracing();
    TokenCodec::new(common::test_codec_config()).unwrap()
}

fn create_test_user() -> User {
    User {
        id: Uuid::new_v4(),
        username: "testuser".into(),
        email: "test@example.com".into(),
        roles: vec!["user".into()],
        is_active: true,
    }
}

#[test]
fn test_revoke_single_token() {
    let codec = create_codec();
    let blacklist = TokenBlacklist::new();
    let user = create_test_user();
    let identity = TokenIdentity::for_user(&user);

    let token = codec.sign(&identity, TokenType::Access).unwrap();
    let other = codec.sign(&identity, TokenType::Access).unwrap();

    assert!(!blacklist.is_revoked(&token));

    blacklist.revoke(&token, "logout");
    assert!(blacklist.is_revoked(&token));
    // A sibling token from the same user is untouched
    assert!(!blacklist.is_revoked(&other));
    assert_eq!(blacklist.len(), 1);
}

#[test]
fn test_undecodable_token_still_revoked_by_hash() {
    common::init_tracing();
    let blacklist = TokenBlacklist::new();

    blacklist.revoke("not-a-jwt-at-all", "incident response");
    assert!(blacklist.is_revoked("not-a-jwt-at-all"));
    assert!(!blacklist.is_revoked("some-other-string"));
}

#[test]
fn test_revoke_all_for_user_watermark() {
    let codec = create_codec();
    let blacklist = TokenBlacklist::new();
    let user = create_test_user();
    let identity = TokenIdentity::for_user(&user);

    let before_a = codec.sign(&identity, TokenType::Access).unwrap();
    let before_b = codec.sign(&identity, TokenType::Refresh).unwrap();

    // iat has whole-second resolution, so the watermark must land in a
    // later second than the tokens above
    sleep(Duration::from_millis(1100));
    blacklist.revoke_all_for_user(user.id);

    assert!(blacklist.is_revoked(&before_a));
    assert!(blacklist.is_revoked(&before_b));
    // No per-token records were created
    assert!(blacklist.is_empty());
    assert!(blacklist.watermark_for(user.id).is_some());

    // Tokens issued after the watermark remain valid
    sleep(Duration::from_millis(1100));
    let after = codec.sign(&identity, TokenType::Access).unwrap();
    assert!(!blacklist.is_revoked(&after));
}

#[test]
fn test_watermark_is_per_user() {
    let codec = create_codec();
    let blacklist = TokenBlacklist::new();
    let alice = create_test_user();
    let bob = create_test_user();

    let alice_token = codec
        .sign(&TokenIdentity::for_user(&alice), TokenType::Access)
        .unwrap();
    let bob_token = codec
        .sign(&TokenIdentity::for_user(&bob), TokenType::Access)
        .unwrap();

    sleep(Duration::from_millis(1100));
    blacklist.revoke_all_for_user(alice.id);

    assert!(blacklist.is_revoked(&alice_token));
    assert!(!blacklist.is_revoked(&bob_token));
}

#[test]
fn test_client_tokens_unaffected_by_watermarks() {
    let codec = create_codec();
    let blacklist = TokenBlacklist::new();

    // No user_id claim, so no watermark can apply
    let client_token = codec
        .sign(&TokenIdentity::for_client("kst_client_abc"), TokenType::Access)
        .unwrap();

    blacklist.revoke_all_for_user(Uuid::new_v4());
    assert!(!blacklist.is_revoked(&client_token));
}

#[test]
fn test_cleanup_removes_expired_records_only() {
    let codec = create_codec();
    let blacklist = TokenBlacklist::new();
    let user = create_test_user();
    let identity = TokenIdentity::for_user(&user);

    let expired = codec
        .sign_with_ttl(&identity, TokenType::Access, -10)
        .unwrap();
    let live = codec.sign(&identity, TokenType::Access).unwrap();

    blacklist.revoke(&expired, "logout");
    blacklist.revoke(&live, "logout");
    blacklist.revoke_all_for_user(user.id);
    assert_eq!(blacklist.len(), 2);

    let removed = blacklist.cleanup_expired();
    assert_eq!(removed, 1);
    assert_eq!(blacklist.len(), 1);

    // The live record still answers revocation checks
    assert!(blacklist.is_revoked(&live));
    // The watermark never expires and survives cleanup
    assert!(blacklist.watermark_for(user.id).is_some());
}

#[test]
fn test_revocation_reason_and_expiry_recorded() {
    let codec = create_codec();
    let blacklist = TokenBlacklist::new();
    let user = create_test_user();

    let token = codec
        .sign(&TokenIdentity::for_user(&user), TokenType::Access)
        .unwrap();
    blacklist.revoke(&token, "credential rotation");

    // The record is keyed by hash, so a lookup by raw token works without
    // the plaintext ever being stored
    assert!(blacklist.is_revoked(&token));
    assert_eq!(blacklist.cleanup_expired(), 0);
}
