// ABOUTME: In-memory reference implementation of the storage traits
// ABOUTME: DashMap-backed; consume paths mutate under the entry guard for single-winner semantics
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! In-memory stores for embedding, demos, and tests.
//!
//! State transitions (`used`, `revoked`, device status) happen inside a
//! `DashMap` entry guard: concurrent consumers of the same key serialize on
//! the shard lock, so exactly one observes the transition precondition.

use crate::models::{AuthorizationCode, Client, DeviceCode, DeviceCodeStatus, Token, User};
use crate::storage::{AuthCodeStore, ClientStore, DeviceCodeStore, TokenStore, UserStore};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

/// In-memory [`ClientStore`].
#[derive(Default)]
pub struct InMemoryClientStore {
    clients: DashMap<String, Client>,
}

impl InMemoryClientStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClientStore for InMemoryClientStore {
    async fn store_client(&self, client: &Client) -> Result<()> {
        self.clients
            .insert(client.client_id.clone(), client.clone());
        Ok(())
    }

    async fn get_client(&self, client_id: &str) -> Result<Option<Client>> {
        Ok(self.clients.get(client_id).map(|c| c.clone()))
    }

    async fn set_client_active(&self, client_id: &str, active: bool) -> Result<bool> {
        match self.clients.get_mut(client_id) {
            Some(mut client) => {
                client.is_active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_client(&self, client_id: &str) -> Result<bool> {
        Ok(self.clients.remove(client_id).is_some())
    }
}

/// In-memory [`AuthCodeStore`].
#[derive(Default)]
pub struct InMemoryAuthCodeStore {
    codes: DashMap<String, AuthorizationCode>,
}

impl InMemoryAuthCodeStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthCodeStore for InMemoryAuthCodeStore {
    async fn store_code(&self, code: &AuthorizationCode) -> Result<()> {
        self.codes.insert(code.code.clone(), code.clone());
        Ok(())
    }

    async fn get_code(&self, code: &str) -> Result<Option<AuthorizationCode>> {
        Ok(self.codes.get(code).map(|c| c.clone()))
    }

    async fn consume_code(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthorizationCode>> {
        // All checks and the used-flag flip happen under the entry guard
        let Some(mut entry) = self.codes.get_mut(code) else {
            return Ok(None);
        };
        if entry.used
            || entry.client_id != client_id
            || entry.redirect_uri != redirect_uri
            || entry.is_expired(now)
        {
            return Ok(None);
        }
        entry.used = true;
        Ok(Some(entry.clone()))
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let before = self.codes.len();
        self.codes.retain(|_, code| !code.is_expired(now));
        Ok(before - self.codes.len())
    }
}

/// In-memory [`TokenStore`].
///
/// Records are keyed by access token; a secondary index maps refresh token
/// values back to their record.
#[derive(Default)]
pub struct InMemoryTokenStore {
    tokens: DashMap<String, Token>,
    refresh_index: DashMap<String, String>,
}

impl InMemoryTokenStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn access_key_for_refresh(&self, refresh_token: &str) -> Option<String> {
        self.refresh_index.get(refresh_token).map(|k| k.clone())
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn store_token(&self, token: &Token) -> Result<()> {
        if let Some(refresh) = &token.refresh_token {
            self.refresh_index
                .insert(refresh.clone(), token.access_token.clone());
        }
        self.tokens.insert(token.access_token.clone(), token.clone());
        Ok(())
    }

    async fn get_by_access_token(&self, access_token: &str) -> Result<Option<Token>> {
        Ok(self.tokens.get(access_token).map(|t| t.clone()))
    }

    async fn get_by_refresh_token(&self, refresh_token: &str) -> Result<Option<Token>> {
        let Some(key) = self.access_key_for_refresh(refresh_token) else {
            return Ok(None);
        };
        Ok(self.tokens.get(&key).map(|t| t.clone()))
    }

    async fn revoke_access_token(&self, access_token: &str) -> Result<bool> {
        match self.tokens.get_mut(access_token) {
            Some(mut token) => {
                token.revoked = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_refresh_token(&self, refresh_token: &str) -> Result<bool> {
        let Some(key) = self.access_key_for_refresh(refresh_token) else {
            return Ok(false);
        };
        match self.tokens.get_mut(&key) {
            Some(mut token) => {
                token.revoked = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn consume_refresh_token(
        &self,
        refresh_token: &str,
        client_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Token>> {
        let Some(key) = self.access_key_for_refresh(refresh_token) else {
            return Ok(None);
        };
        // Validation and the revoked flip happen under the entry guard, so
        // two concurrent rotations of the same token cannot both succeed
        let Some(mut entry) = self.tokens.get_mut(&key) else {
            return Ok(None);
        };
        if entry.revoked
            || entry.client_id != client_id
            || entry.is_refresh_expired(now)
            || entry.refresh_token.as_deref() != Some(refresh_token)
        {
            return Ok(None);
        }
        entry.revoked = true;
        Ok(Some(entry.clone()))
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let before = self.tokens.len();
        self.tokens.retain(|_, token| {
            let refresh_alive = token
                .refresh_expires_at
                .is_some_and(|exp| now <= exp);
            !token.is_expired(now) || refresh_alive
        });
        self.refresh_index
            .retain(|_, access_key| self.tokens.contains_key(access_key));
        Ok(before - self.tokens.len())
    }
}

/// In-memory [`DeviceCodeStore`].
///
/// Records are keyed by device code; a secondary index maps user codes back
/// to their record.
#[derive(Default)]
pub struct InMemoryDeviceCodeStore {
    codes: DashMap<String, DeviceCode>,
    user_code_index: DashMap<String, String>,
}

impl InMemoryDeviceCodeStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeviceCodeStore for InMemoryDeviceCodeStore {
    async fn store_device_code(&self, device_code: &DeviceCode) -> Result<()> {
        self.user_code_index.insert(
            device_code.user_code.clone(),
            device_code.device_code.clone(),
        );
        self.codes
            .insert(device_code.device_code.clone(), device_code.clone());
        Ok(())
    }

    async fn get_by_device_code(&self, device_code: &str) -> Result<Option<DeviceCode>> {
        Ok(self.codes.get(device_code).map(|c| c.clone()))
    }

    async fn get_by_user_code(&self, user_code: &str) -> Result<Option<DeviceCode>> {
        let Some(key) = self.user_code_index.get(user_code).map(|k| k.clone()) else {
            return Ok(None);
        };
        Ok(self.codes.get(&key).map(|c| c.clone()))
    }

    async fn record_poll(
        &self,
        device_code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        let Some(mut entry) = self.codes.get_mut(device_code) else {
            return Ok(None);
        };
        let previous = entry.last_polled_at;
        entry.last_polled_at = Some(now);
        Ok(previous)
    }

    async fn authorize(
        &self,
        user_code: &str,
        user_id: Uuid,
        approve: bool,
    ) -> Result<Option<DeviceCode>> {
        let Some(key) = self.user_code_index.get(user_code).map(|k| k.clone()) else {
            return Ok(None);
        };
        let Some(mut entry) = self.codes.get_mut(&key) else {
            return Ok(None);
        };
        // Only a pending record transitions; re-approval is a no-op
        if entry.status == DeviceCodeStatus::Pending {
            entry.status = if approve {
                DeviceCodeStatus::Authorized
            } else {
                DeviceCodeStatus::Denied
            };
            entry.user_id = Some(user_id);
        }
        Ok(Some(entry.clone()))
    }

    async fn consume_device_code(
        &self,
        device_code: &str,
        client_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DeviceCode>> {
        let Some(mut entry) = self.codes.get_mut(device_code) else {
            return Ok(None);
        };
        if entry.status != DeviceCodeStatus::Authorized
            || entry.client_id != client_id
            || entry.is_expired(now)
        {
            return Ok(None);
        }
        entry.status = DeviceCodeStatus::Consumed;
        Ok(Some(entry.clone()))
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let before = self.codes.len();
        self.codes.retain(|_, code| !code.is_expired(now));
        self.user_code_index
            .retain(|_, device_key| self.codes.contains_key(device_key));
        Ok(before - self.codes.len())
    }
}

/// In-memory [`UserStore`] with an insertion helper for hosts and tests.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: DashMap<Uuid, User>,
}

impl InMemoryUserStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user record.
    pub fn insert_user(&self, user: User) {
        self.users.insert(user.id, user);
    }

    /// Remove a user record.
    pub fn remove_user(&self, user_id: Uuid) {
        self.users.remove(&user_id);
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }
}
