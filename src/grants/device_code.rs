// ABOUTME: Device code grant processor for the RFC 8628 polling flow
// ABOUTME: Distinguishes retryable pending/slow_down signals from terminal failures
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use crate::errors::OAuth2Error;
use crate::grants::{GrantContext, GrantProcessor, TokenIssuer};
use crate::models::{Client, DeviceCodeStatus, GrantType, TokenRequest, TokenResponse};
use crate::storage::DeviceCodeStore;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;

/// Processor for the `device_code` grant (poll side).
pub struct DeviceCodeGrant {
    device_codes: Arc<dyn DeviceCodeStore>,
    issuer: Arc<TokenIssuer>,
}

impl DeviceCodeGrant {
    /// Processor over the given store and issuer.
    #[must_use]
    pub fn new(device_codes: Arc<dyn DeviceCodeStore>, issuer: Arc<TokenIssuer>) -> Self {
        Self {
            device_codes,
            issuer,
        }
    }
}

#[async_trait]
impl GrantProcessor for DeviceCodeGrant {
    fn grant_type(&self) -> GrantType {
        GrantType::DeviceCode
    }

    async fn validate(
        &self,
        request: &TokenRequest,
        client: &Client,
    ) -> Result<GrantContext, OAuth2Error> {
        let device_code = request
            .device_code
            .as_deref()
            .ok_or_else(|| OAuth2Error::invalid_request("Missing device_code"))?;

        let record = self
            .device_codes
            .get_by_device_code(device_code)
            .await
            .map_err(|e| {
                tracing::error!(
                    "device code lookup failed for client {}: {:#}",
                    client.client_id,
                    e
                );
                OAuth2Error::server_error()
            })?
            .ok_or_else(|| OAuth2Error::invalid_grant("Invalid device code"))?;

        if record.client_id != client.client_id {
            return Err(OAuth2Error::invalid_grant(
                "Device code was issued to a different client",
            ));
        }

        let now = Utc::now();
        match record.status {
            DeviceCodeStatus::Consumed => {
                tracing::warn!(
                    "device code replay attempt for client {}",
                    client.client_id
                );
                return Err(OAuth2Error::invalid_grant("Device code already used"));
            }
            DeviceCodeStatus::Denied => return Err(OAuth2Error::access_denied()),
            DeviceCodeStatus::Pending | DeviceCodeStatus::Authorized => {
                if record.is_expired(now) {
                    return Err(OAuth2Error::expired_token());
                }
            }
        }

        // Poll bookkeeping: the previous poll time decides slow_down, and
        // this poll restarts the interval either way
        let previous_poll = self
            .device_codes
            .record_poll(device_code, now)
            .await
            .map_err(|e| {
                tracing::error!(
                    "failed to record device poll for client {}: {:#}",
                    client.client_id,
                    e
                );
                OAuth2Error::server_error()
            })?;

        if let Some(previous) = previous_poll {
            if now < previous + Duration::seconds(record.interval) {
                tracing::debug!(
                    "client {} polling faster than {}s interval",
                    client.client_id,
                    record.interval
                );
                return Err(OAuth2Error::slow_down());
            }
        }

        if record.status == DeviceCodeStatus::Pending {
            return Err(OAuth2Error::authorization_pending());
        }

        Ok(GrantContext::DeviceCode {
            device_code: device_code.to_owned(),
        })
    }

    async fn issue_token(
        &self,
        _request: &TokenRequest,
        client: &Client,
        context: GrantContext,
    ) -> Result<TokenResponse, OAuth2Error> {
        let GrantContext::DeviceCode { device_code } = context else {
            return Err(OAuth2Error::invalid_request("Mismatched grant context"));
        };

        // Atomic authorized -> consumed transition; at most one of N
        // concurrent exchanges gets the record
        let record = self
            .device_codes
            .consume_device_code(&device_code, &client.client_id, Utc::now())
            .await
            .map_err(|e| {
                tracing::error!(
                    "failed to consume device code for client {}: {:#}",
                    client.client_id,
                    e
                );
                OAuth2Error::server_error()
            })?
            .ok_or_else(|| {
                tracing::warn!(
                    "device code consume lost for client {}: not authorized, consumed, expired, or mismatched",
                    client.client_id
                );
                OAuth2Error::invalid_grant("Invalid or expired device code")
            })?;

        let Some(user_id) = record.user_id else {
            // Authorized status without a user is a store integrity failure
            tracing::error!(
                "authorized device code for client {} has no user bound",
                client.client_id
            );
            return Err(OAuth2Error::server_error());
        };

        let response = self
            .issuer
            .issue_for_user(client, user_id, record.scope.as_deref(), None, true)
            .await?;

        tracing::info!(
            "device code exchanged for client {} and user {user_id}",
            client.client_id
        );
        Ok(response)
    }
}
