// ABOUTME: Storage trait contracts the engine requires from its host
// ABOUTME: Async traits with atomic consume paths; an in-memory reference implementation is provided
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Storage contracts
//!
//! The engine never touches a database directly; it talks to these traits.
//! The provided [`memory`] implementations back them with concurrent maps,
//! and production deployments substitute SQL/Redis implementations that
//! satisfy the same contracts.
//!
//! Two contract points are load-bearing for the engine's invariants:
//!
//! - `consume_*` methods are **atomic single-winner** operations. When N
//!   callers race on the same code or refresh token, exactly one receives
//!   the record and the rest receive `None`.
//! - Absence is `Ok(None)`; `Err` is reserved for backend failures, which
//!   the engine reports as `server_error`, never as a client mistake.

pub mod memory;

use crate::models::{AuthorizationCode, Client, DeviceCode, Token, User};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use memory::{
    InMemoryAuthCodeStore, InMemoryClientStore, InMemoryDeviceCodeStore, InMemoryTokenStore,
    InMemoryUserStore,
};

/// Persistence for registered clients.
#[async_trait]
pub trait ClientStore: Send + Sync {
    /// Persist a client record.
    async fn store_client(&self, client: &Client) -> Result<()>;

    /// Fetch a client by id.
    async fn get_client(&self, client_id: &str) -> Result<Option<Client>>;

    /// Toggle a client's active flag. Returns false when the client is unknown.
    async fn set_client_active(&self, client_id: &str, active: bool) -> Result<bool>;

    /// Remove a client. Returns false when the client is unknown.
    ///
    /// Deleting a client does not cascade into token invalidation; callers
    /// revoke explicitly.
    async fn delete_client(&self, client_id: &str) -> Result<bool>;
}

/// Persistence for single-use authorization codes.
#[async_trait]
pub trait AuthCodeStore: Send + Sync {
    /// Persist a freshly issued code.
    async fn store_code(&self, code: &AuthorizationCode) -> Result<()>;

    /// Fetch a code without consuming it (read-only validation).
    async fn get_code(&self, code: &str) -> Result<Option<AuthorizationCode>>;

    /// Atomically consume a code: validates binding (client, redirect URI),
    /// expiry, and the used flag, and flips `used` in one step. At most one
    /// concurrent caller receives the record.
    async fn consume_code(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthorizationCode>>;

    /// Remove expired codes; returns how many were removed.
    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}

/// Persistence for issued token records.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Persist an issued token record.
    async fn store_token(&self, token: &Token) -> Result<()>;

    /// Fetch by access token value.
    async fn get_by_access_token(&self, access_token: &str) -> Result<Option<Token>>;

    /// Fetch by refresh token value.
    async fn get_by_refresh_token(&self, refresh_token: &str) -> Result<Option<Token>>;

    /// Mark the record holding this access token revoked.
    /// Returns false when the token is unknown.
    async fn revoke_access_token(&self, access_token: &str) -> Result<bool>;

    /// Mark the record holding this refresh token revoked.
    /// Returns false when the token is unknown.
    async fn revoke_refresh_token(&self, refresh_token: &str) -> Result<bool>;

    /// Atomically consume a refresh token for rotation: validates binding,
    /// revocation flag, and refresh expiry, then marks the record revoked
    /// in the same step. At most one concurrent caller receives the record,
    /// so a rotated-away token can never be used twice.
    async fn consume_refresh_token(
        &self,
        refresh_token: &str,
        client_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Token>>;

    /// Remove records whose access and refresh lifetimes have both passed;
    /// returns how many were removed.
    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}

/// Persistence for device flow codes.
#[async_trait]
pub trait DeviceCodeStore: Send + Sync {
    /// Persist a freshly issued device code.
    async fn store_device_code(&self, device_code: &DeviceCode) -> Result<()>;

    /// Fetch by device code value.
    async fn get_by_device_code(&self, device_code: &str) -> Result<Option<DeviceCode>>;

    /// Fetch by user code value.
    async fn get_by_user_code(&self, user_code: &str) -> Result<Option<DeviceCode>>;

    /// Record a poll and return the previous poll time, atomically.
    async fn record_poll(
        &self,
        device_code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>>;

    /// Apply the user's approve/deny decision, keyed by user code.
    ///
    /// Idempotent: only a `Pending` record transitions; repeated calls
    /// leave the terminal state untouched. Returns the record after the
    /// call, or `None` when the user code is unknown.
    async fn authorize(
        &self,
        user_code: &str,
        user_id: Uuid,
        approve: bool,
    ) -> Result<Option<DeviceCode>>;

    /// Atomically consume an authorized device code: validates binding,
    /// expiry, and the `Authorized` status, then transitions to `Consumed`
    /// in one step. At most one concurrent caller receives the record.
    async fn consume_device_code(
        &self,
        device_code: &str,
        client_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DeviceCode>>;

    /// Remove expired device codes; returns how many were removed.
    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}

/// Read-only user lookup.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fetch a user by id.
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>>;
}
