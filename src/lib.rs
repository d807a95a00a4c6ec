// ABOUTME: Main library entry point for the embeddable authorization and token-lifecycle engine
// ABOUTME: Provides an OAuth 2.0 authorization server, JWT codec, revocation store, and rate limiter
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright ©2025 Async-IO.org

#![deny(unsafe_code)]

//! # Keystone Auth
//!
//! An embeddable authorization and token-lifecycle engine: an OAuth 2.0
//! authorization server plus a JWT access/refresh token codec, a token
//! revocation store, and an IP-based login rate limiter. It issues,
//! validates, rotates, and revokes credentials for API clients and end
//! users.
//!
//! ## Features
//!
//! - **Four grant types**: authorization code (with PKCE), client
//!   credentials, refresh token (with rotation), and device code
//! - **Typed tokens**: access and refresh tokens share one key but are
//!   structurally distinguishable, with sliding refresh renewal
//! - **O(1) revocation**: per-token blacklist records plus a per-user
//!   watermark for instant "log out everywhere"
//! - **Pluggable storage**: async trait contracts with an in-memory
//!   reference implementation; production backends substitute their own
//! - **No hidden state**: every component is constructed by the host and
//!   injected explicitly
//!
//! Transport, password hashing, and persistence backends are the host's
//! job; this crate holds the protocol state machines and their
//! concurrency invariants.
//!
//! ## Example
//!
//! ```rust,no_run
//! use keystone_auth::codec::TokenCodec;
//! use keystone_auth::config::{CodecConfig, ServerConfig};
//! use keystone_auth::server::AuthorizationServer;
//! use keystone_auth::storage::{
//!     InMemoryAuthCodeStore, InMemoryClientStore, InMemoryDeviceCodeStore,
//!     InMemoryTokenStore, InMemoryUserStore,
//! };
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let codec = Arc::new(TokenCodec::new(CodecConfig::new(b"change-me".to_vec()))?);
//! let server = AuthorizationServer::new(
//!     codec,
//!     Arc::new(InMemoryClientStore::new()),
//!     Arc::new(InMemoryAuthCodeStore::new()),
//!     Arc::new(InMemoryTokenStore::new()),
//!     Arc::new(InMemoryDeviceCodeStore::new()),
//!     Arc::new(InMemoryUserStore::new()),
//!     ServerConfig::default(),
//! );
//! # let _ = server;
//! # Ok(())
//! # }
//! ```

/// Token revocation store with per-user watermarks
pub mod blacklist;

/// Client registry: registration, credential validation, policy checks
pub mod clients;

/// JWT token codec with sliding refresh renewal
pub mod codec;

/// Environment-driven configuration
pub mod config;

/// Application constants and default values
pub mod constants;

/// Error types: OAuth reason codes and configuration errors
pub mod errors;

/// Grant processors and the per-grant-type registry
pub mod grants;

/// Core data models and wire shapes
pub mod models;

/// IP-level login rate limiting
pub mod rate_limiting;

/// Authorization server façade
pub mod server;

/// Storage trait contracts and the in-memory reference implementation
pub mod storage;
