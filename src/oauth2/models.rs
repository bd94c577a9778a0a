// ABOUTME: Wire-level request and response structures for the protocol endpoints
// ABOUTME: RFC 6749 field names throughout; parsed from query or body parameter maps
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// GET /authorize query parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizeRequest {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    /// PKCE code challenge (RFC 7636)
    pub code_challenge: Option<String>,
    /// PKCE challenge method, `S256` or `plain`
    pub code_challenge_method: Option<String>,
}

impl AuthorizeRequest {
    #[must_use]
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        Self {
            response_type: params.get("response_type").cloned(),
            client_id: params.get("client_id").cloned(),
            redirect_uri: params.get("redirect_uri").cloned(),
            scope: params.get("scope").cloned(),
            state: params.get("state").cloned(),
            code_challenge: params.get("code_challenge").cloned(),
            code_challenge_method: params.get("code_challenge_method").cloned(),
        }
    }
}

/// POST /token body (form or JSON)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scope: Option<String>,
    pub refresh_token: Option<String>,
    /// PKCE code verifier (RFC 7636)
    pub code_verifier: Option<String>,
}

impl TokenRequest {
    #[must_use]
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        Self {
            grant_type: params.get("grant_type").cloned(),
            code: params.get("code").cloned(),
            redirect_uri: params.get("redirect_uri").cloned(),
            client_id: params.get("client_id").cloned(),
            client_secret: params.get("client_secret").cloned(),
            scope: params.get("scope").cloned(),
            refresh_token: params.get("refresh_token").cloned(),
            code_verifier: params.get("code_verifier").cloned(),
        }
    }
}

/// POST /revoke and POST /introspect body (RFC 7009 / RFC 7662)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RevocationRequest {
    pub token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl RevocationRequest {
    #[must_use]
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        Self {
            token: params.get("token").cloned(),
            client_id: params.get("client_id").cloned(),
            client_secret: params.get("client_secret").cloned(),
        }
    }
}

/// Success envelope for POST /token (RFC 6749 §5.1)
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Always "Bearer"
    pub token_type: String,
    /// Seconds until the access token expires
    pub expires_in: i64,
    /// Space-joined granted scopes, echoed in grant order
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// POST /introspect response (RFC 7662 §2.2)
#[derive(Debug, Serialize, Deserialize)]
pub struct IntrospectionResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
}

impl IntrospectionResponse {
    /// The RFC-mandated response for unknown, expired, or revoked tokens:
    /// `active: false` and nothing else.
    #[must_use]
    pub const fn inactive() -> Self {
        Self {
            active: false,
            scope: None,
            client_id: None,
            token_type: None,
            exp: None,
            iat: None,
            sub: None,
        }
    }
}

/// Client identity echoed in the consent payload
#[derive(Debug, Serialize, Deserialize)]
pub struct ClientSummary {
    pub id: Uuid,
    pub name: String,
}

/// Scope presented for consent
#[derive(Debug, Serialize, Deserialize)]
pub struct ScopeDescription {
    pub name: String,
    pub description: String,
}

/// JSON consent challenge returned by GET /authorize for third-party
/// clients when the host supplies no consent renderer
#[derive(Debug, Serialize, Deserialize)]
pub struct ConsentPayload {
    pub authorization_required: bool,
    pub client: ClientSummary,
    pub scopes: Vec<ScopeDescription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}
