// ABOUTME: OAuth 2.0 protocol engine: grant state machine, wire models, routes
// ABOUTME: Implements RFC 6749 grants, RFC 7636 PKCE, RFC 7009 revocation, RFC 7662 introspection
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

/// Grant protocol state machine
pub mod endpoints;
/// Wire request/response structures
pub mod models;
/// Per-IP rate limiting for the authorize and token endpoints
pub mod rate_limiting;
/// warp route filters for the protocol and management surface
pub mod routes;

pub use endpoints::{AuthorizationServer, AuthorizeOutcome, AuthorizeRejection};
pub use models::{
    AuthorizeRequest, ConsentPayload, IntrospectionResponse, RevocationRequest, TokenRequest,
    TokenResponse,
};
pub use rate_limiting::RateLimiter;
