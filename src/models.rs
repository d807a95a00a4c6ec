// ABOUTME: Core data models for clients, grants, tokens, and revocation records
// ABOUTME: Includes the wire-shape request/response structures for token endpoints
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Data model for the authorization engine.
//!
//! Records are small value structs; mutable state flags (`used`, `revoked`,
//! device status) are only ever flipped through a store's atomic update
//! path, never by a bare field write from engine code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// OAuth 2.0 grant types supported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization code exchange (with optional PKCE)
    AuthorizationCode,
    /// Client credentials (machine-to-machine, no user context)
    ClientCredentials,
    /// Refresh token exchange
    RefreshToken,
    /// Device code polling flow (RFC 8628)
    DeviceCode,
}

impl GrantType {
    /// Parse the wire-level `grant_type` parameter.
    ///
    /// Accepts the RFC 8628 URN alias for the device flow.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "authorization_code" => Some(Self::AuthorizationCode),
            "client_credentials" => Some(Self::ClientCredentials),
            "refresh_token" => Some(Self::RefreshToken),
            "device_code" | "urn:ietf:params:oauth:grant-type:device_code" => {
                Some(Self::DeviceCode)
            }
            _ => None,
        }
    }

    /// Wire-level name of this grant type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::ClientCredentials => "client_credentials",
            Self::RefreshToken => "refresh_token",
            Self::DeviceCode => "device_code",
        }
    }
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registered client category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    /// Can keep a secret (servers, daemons)
    Confidential,
    /// Cannot keep a secret (SPAs, native apps); never holds a secret hash
    Public,
}

/// How the client authenticates at the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenAuthMethod {
    /// Secret in the Authorization header (RFC 6749 Section 2.3.1)
    #[default]
    ClientSecretBasic,
    /// Secret in the request body
    ClientSecretPost,
    /// No client authentication (public clients)
    None,
}

/// A registered OAuth 2.0 client application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    /// Unique client identifier
    pub client_id: String,
    /// SHA-256 hex of the client secret; `None` for public clients
    pub secret_hash: Option<String>,
    /// Confidential or public
    pub client_type: ClientType,
    /// Registered redirect URIs; a trailing `*` marks a prefix wildcard
    pub redirect_uris: Vec<String>,
    /// Grant types this client may use
    pub allowed_grant_types: Vec<GrantType>,
    /// Scopes this client may request
    pub allowed_scopes: Vec<String>,
    /// Scopes granted when the request names none
    pub default_scopes: Vec<String>,
    /// Token endpoint authentication method
    pub token_auth_method: TokenAuthMethod,
    /// Whether authorization code exchanges must carry PKCE
    pub require_pkce: bool,
    /// Per-client access token TTL override, in seconds
    pub access_token_ttl_secs: Option<i64>,
    /// Per-client refresh token TTL override, in seconds
    pub refresh_token_ttl_secs: Option<i64>,
    /// Optional display name
    pub client_name: Option<String>,
    /// Inactive clients fail validation; toggled only by admin action
    pub is_active: bool,
    /// When the client was registered
    pub created_at: DateTime<Utc>,
}

impl Client {
    /// Whether token requests from this client must present a secret.
    #[must_use]
    pub fn requires_secret(&self) -> bool {
        self.client_type == ClientType::Confidential
            && self.token_auth_method != TokenAuthMethod::None
    }

    /// Whether this client is registered for the given grant type.
    #[must_use]
    pub fn allows_grant_type(&self, grant_type: GrantType) -> bool {
        self.allowed_grant_types.contains(&grant_type)
    }

    /// Match a redirect URI against the registered set.
    ///
    /// Exact match, or prefix match against a registered URI ending in `*`.
    /// Case-sensitive, no normalization; operators register canonical forms.
    #[must_use]
    pub fn redirect_uri_matches(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|registered| {
            registered.strip_suffix('*').map_or_else(
                || registered.as_str() == uri,
                |prefix| uri.starts_with(prefix),
            )
        })
    }

    /// Resolve a requested scope string against this client's registration.
    ///
    /// An empty request maps to the default scopes (or the first allowed
    /// scope when no defaults are registered). A non-empty request must be
    /// a subset of the allowed scopes.
    ///
    /// # Errors
    /// Returns the unauthorized scope names when the request exceeds the
    /// client's registration.
    pub fn resolve_scope(&self, requested: Option<&str>) -> Result<Option<String>, Vec<String>> {
        let requested = requested.map(str::trim).filter(|s| !s.is_empty());

        let Some(requested) = requested else {
            if !self.default_scopes.is_empty() {
                return Ok(Some(self.default_scopes.join(" ")));
            }
            return Ok(self.allowed_scopes.first().cloned());
        };

        let unauthorized: Vec<String> = requested
            .split_whitespace()
            .filter(|scope| !self.allowed_scopes.iter().any(|s| s == scope))
            .map(str::to_owned)
            .collect();

        if unauthorized.is_empty() {
            Ok(Some(requested.to_owned()))
        } else {
            Err(unauthorized)
        }
    }
}

/// Parameters for registering a new client.
#[derive(Debug, Clone)]
pub struct ClientSpec {
    /// Confidential or public
    pub client_type: ClientType,
    /// Redirect URIs (trailing `*` = prefix wildcard)
    pub redirect_uris: Vec<String>,
    /// Grant types the client may use
    pub allowed_grant_types: Vec<GrantType>,
    /// Scopes the client may request
    pub allowed_scopes: Vec<String>,
    /// Scopes granted when the request names none
    pub default_scopes: Vec<String>,
    /// Token endpoint authentication method
    pub token_auth_method: TokenAuthMethod,
    /// Whether authorization code exchanges must carry PKCE
    pub require_pkce: bool,
    /// Per-client access token TTL override, in seconds
    pub access_token_ttl_secs: Option<i64>,
    /// Per-client refresh token TTL override, in seconds
    pub refresh_token_ttl_secs: Option<i64>,
    /// Optional display name
    pub client_name: Option<String>,
}

impl Default for ClientSpec {
    fn default() -> Self {
        Self {
            client_type: ClientType::Confidential,
            redirect_uris: Vec::new(),
            allowed_grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
            allowed_scopes: Vec::new(),
            default_scopes: Vec::new(),
            token_auth_method: TokenAuthMethod::ClientSecretBasic,
            require_pkce: false,
            access_token_ttl_secs: None,
            refresh_token_ttl_secs: None,
            client_name: None,
        }
    }
}

/// Result of client registration.
///
/// The plaintext secret is returned here exactly once; only its hash is
/// stored.
#[derive(Debug, Clone)]
pub struct RegisteredClient {
    /// The stored client record
    pub client: Client,
    /// Plaintext secret for confidential clients; `None` for public clients
    pub client_secret: Option<String>,
}

/// Single-use authorization code exchange artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    /// The opaque code value
    pub code: String,
    /// Client the code was issued to
    pub client_id: String,
    /// User who approved the authorization
    pub user_id: Uuid,
    /// Redirect URI bound at authorization time
    pub redirect_uri: String,
    /// Resolved scope
    pub scope: Option<String>,
    /// PKCE code challenge
    pub code_challenge: Option<String>,
    /// PKCE challenge method (`plain` or `S256`)
    pub code_challenge_method: Option<String>,
    /// OIDC nonce, echoed into the id_token
    pub nonce: Option<String>,
    /// When the code was issued
    pub created_at: DateTime<Utc>,
    /// When the code expires
    pub expires_at: DateTime<Utc>,
    /// Once true the code is never accepted again, even if unexpired
    pub used: bool,
}

impl AuthorizationCode {
    /// Whether this code is past its validity window.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Device flow state machine: pending until the user acts, then terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceCodeStatus {
    /// Waiting for the user to approve or deny
    Pending,
    /// User approved; exchangeable exactly once
    Authorized,
    /// User denied; terminal
    Denied,
    /// Successfully exchanged for tokens; terminal
    Consumed,
}

/// Device flow polling artifact (RFC 8628).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCode {
    /// Opaque code the device polls with
    pub device_code: String,
    /// Short human-enterable code shown to the user
    pub user_code: String,
    /// Client the code was issued to
    pub client_id: String,
    /// Resolved scope
    pub scope: Option<String>,
    /// Where the user enters the user code
    pub verification_uri: String,
    /// Verification URI with the user code pre-filled
    pub verification_uri_complete: String,
    /// When the code was issued
    pub created_at: DateTime<Utc>,
    /// When the code expires
    pub expires_at: DateTime<Utc>,
    /// Minimum seconds between polls
    pub interval: i64,
    /// Last poll time, for `slow_down` enforcement
    pub last_polled_at: Option<DateTime<Utc>>,
    /// Approving user; set once by the authorization action
    pub user_id: Option<Uuid>,
    /// Current state
    pub status: DeviceCodeStatus,
}

impl DeviceCode {
    /// Whether this device code is past its validity window.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// An issued credential pair.
///
/// Rotation creates a new `Token`; the old record is only ever mutated to
/// flip `revoked`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    /// JWT access token
    pub access_token: String,
    /// Token type (always "Bearer")
    pub token_type: String,
    /// Opaque refresh token; `None` for client-credentials grants
    pub refresh_token: Option<String>,
    /// OIDC id_token when `openid` scope and a nonce were present
    pub id_token: Option<String>,
    /// Granted scope
    pub scope: Option<String>,
    /// Client the token was issued to
    pub client_id: String,
    /// User context; `None` for client-credentials grants
    pub user_id: Option<Uuid>,
    /// When the token was issued
    pub created_at: DateTime<Utc>,
    /// When the access token expires
    pub expires_at: DateTime<Utc>,
    /// When the refresh token expires
    pub refresh_expires_at: Option<DateTime<Utc>>,
    /// Revoked tokens are never usable, even inside the validity window
    pub revoked: bool,
}

impl Token {
    /// Whether the access token is past its validity window.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Whether the refresh token (if any) is past its validity window.
    #[must_use]
    pub fn is_refresh_expired(&self, now: DateTime<Utc>) -> bool {
        self.refresh_expires_at.is_some_and(|exp| now > exp)
    }
}

/// Minimal user view read through [`crate::storage::UserStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Stable user identifier
    pub id: Uuid,
    /// Login name, carried into token claims
    pub username: String,
    /// Contact address
    pub email: String,
    /// Role names, carried into token claims
    pub roles: Vec<String>,
    /// Inactive users are cut off at refresh time
    pub is_active: bool,
}

/// Entry in the token blacklist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokedTokenRecord {
    /// SHA-256 hex of the raw token; the plaintext is never stored
    pub token_hash: String,
    /// User the token belonged to, when decodable
    pub user_id: Option<Uuid>,
    /// When the revocation was recorded
    pub revoked_at: DateTime<Utc>,
    /// The token's original expiry, used for TTL-based cleanup
    pub expires_at: Option<DateTime<Utc>>,
    /// Operator-supplied reason
    pub reason: String,
}

/// OAuth 2.0 Token Request (POST /oauth/token shape)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRequest {
    /// Grant type (`authorization_code`, `client_credentials`,
    /// `refresh_token`, `device_code`)
    pub grant_type: String,
    /// Client ID
    pub client_id: String,
    /// Client secret; absent for public clients
    pub client_secret: Option<String>,
    /// Authorization code (for `authorization_code` grant)
    pub code: Option<String>,
    /// Redirect URI (must match the one bound to the code)
    pub redirect_uri: Option<String>,
    /// PKCE code verifier (RFC 7636)
    pub code_verifier: Option<String>,
    /// Requested scopes (for `client_credentials` grant)
    pub scope: Option<String>,
    /// Refresh token (for `refresh_token` grant)
    pub refresh_token: Option<String>,
    /// Device code (for `device_code` grant)
    pub device_code: Option<String>,
}

impl TokenRequest {
    /// Empty request shell for the given grant type and client.
    #[must_use]
    pub fn new(grant_type: GrantType, client_id: &str, client_secret: Option<&str>) -> Self {
        Self {
            grant_type: grant_type.as_str().to_owned(),
            client_id: client_id.to_owned(),
            client_secret: client_secret.map(str::to_owned),
            code: None,
            redirect_uri: None,
            code_verifier: None,
            scope: None,
            refresh_token: None,
            device_code: None,
        }
    }
}

/// OAuth 2.0 Token Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Access token (JWT)
    pub access_token: String,
    /// Token type (always "Bearer")
    pub token_type: String,
    /// Expires in seconds
    pub expires_in: i64,
    /// Scopes granted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Refresh token (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// OIDC id_token (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

/// Authorization request parameters (authorize step).
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    /// Client identifier
    pub client_id: String,
    /// Redirect URI for the response
    pub redirect_uri: String,
    /// Requested scopes
    pub scope: Option<String>,
    /// PKCE code challenge (RFC 7636)
    pub code_challenge: Option<String>,
    /// PKCE code challenge method (`plain` or `S256`)
    pub code_challenge_method: Option<String>,
    /// OIDC nonce, echoed into the id_token
    pub nonce: Option<String>,
}

/// Device Authorization Response (RFC 8628 Section 3.2)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceAuthorizationResponse {
    /// Opaque code the device polls with
    pub device_code: String,
    /// Short code the user enters at the verification URI
    pub user_code: String,
    /// Where the user enters the user code
    pub verification_uri: String,
    /// Verification URI with the user code pre-filled
    pub verification_uri_complete: String,
    /// Lifetime of the codes in seconds
    pub expires_in: i64,
    /// Minimum seconds the device must wait between polls
    pub interval: i64,
}

/// Token Introspection Response (RFC 7662)
///
/// Inactive responses carry no metadata; malformed, revoked, and expired
/// tokens are indistinguishable to the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntrospectionResponse {
    /// Whether the token is currently usable
    pub active: bool,
    /// Client the token was issued to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Granted scope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Subject of the token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Expiry timestamp (seconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Issued-at timestamp (seconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// `access` or `refresh`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl IntrospectionResponse {
    /// The canonical inactive response: `active=false`, no metadata.
    #[must_use]
    pub fn inactive() -> Self {
        Self::default()
    }
}

/// Revocation hint (RFC 7009 Section 2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenTypeHint {
    /// The presented token is an access token
    AccessToken,
    /// The presented token is a refresh token
    RefreshToken,
}
