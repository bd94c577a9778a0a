// ABOUTME: Shared constants for the authorization server
// ABOUTME: HTTP status codes, credential sizes, and protocol defaults
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

/// HTTP status codes used by the protocol surface
pub mod http_status {
    pub const OK: u16 = 200;
    pub const CREATED: u16 = 201;
    pub const FOUND: u16 = 302;
    pub const BAD_REQUEST: u16 = 400;
    pub const UNAUTHORIZED: u16 = 401;
    pub const FORBIDDEN: u16 = 403;
    pub const NOT_FOUND: u16 = 404;
    pub const UNPROCESSABLE_ENTITY: u16 = 422;
    pub const TOO_MANY_REQUESTS: u16 = 429;
    pub const INTERNAL_SERVER_ERROR: u16 = 500;
}

/// Credential sizing
pub mod credentials {
    /// Client secrets are 32 random bytes (64 hex chars)
    pub const CLIENT_SECRET_BYTES: usize = 32;
    /// Access tokens, refresh tokens, and authorization codes are
    /// 40 random bytes (80 hex chars)
    pub const TOKEN_SECRET_BYTES: usize = 40;
}

/// Configuration defaults (minutes unless noted)
pub mod defaults {
    pub const ACCESS_TOKEN_LIFETIME_MINS: i64 = 60;
    pub const REFRESH_TOKEN_LIFETIME_MINS: i64 = 43_200;
    pub const AUTH_CODE_LIFETIME_MINS: i64 = 10;
    pub const PERSONAL_ACCESS_TOKEN_LIFETIME_MINS: i64 = 525_600;
    pub const ROUTE_PREFIX: &str = "/oauth";
    pub const PRUNE_REVOKED_AFTER_DAYS: i64 = 7;
    pub const RATE_LIMIT_AUTHORIZE_MAX: u32 = 30;
    pub const RATE_LIMIT_TOKEN_MAX: u32 = 20;
    pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;
    pub const DATABASE_URL: &str = "sqlite:data/aegis.db";
    pub const HTTP_PORT: u16 = 8081;
}

/// Session keys used by the authorization flow
pub mod session_keys {
    /// Pending authorization request, written by GET /authorize and
    /// consumed by POST /authorize
    pub const AUTH_REQUEST: &str = "_oauth2_auth_request";
    /// Authenticated user payload, written by the host's login flow
    pub const USER: &str = "user";
}

/// Cookie carrying the session identifier
pub const SESSION_COOKIE: &str = "aegis_session";
