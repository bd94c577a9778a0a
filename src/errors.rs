// ABOUTME: Protocol error taxonomy for the OAuth 2.0 authorization server
// ABOUTME: Maps RFC 6749 error codes to HTTP statuses and the wire envelope
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use serde::Serialize;
use thiserror::Error;

use crate::constants::http_status::{
    BAD_REQUEST, FORBIDDEN, INTERNAL_SERVER_ERROR, UNAUTHORIZED,
};

/// Result alias for internal plumbing (database, crypto, IO)
pub type AppResult<T> = anyhow::Result<T>;

/// Protocol-level error as defined by RFC 6749 §5.2 and friends.
///
/// Every variant carries a human-readable description which is rendered
/// verbatim in the `error_description` field of the wire envelope.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Missing or malformed request parameter
    #[error("invalid_request: {0}")]
    InvalidRequest(String),

    /// Unknown, revoked, or unauthenticated client
    #[error("invalid_client: {0}")]
    InvalidClient(String),

    /// Authorization code or refresh token absent, expired, revoked, or mismatched
    #[error("invalid_grant: {0}")]
    InvalidGrant(String),

    /// Unknown or disallowed scope
    #[error("invalid_scope: {0}")]
    InvalidScope(String),

    /// Grant type outside {authorization_code, client_credentials, refresh_token}
    #[error("unsupported_grant_type")]
    UnsupportedGrantType,

    /// Resource owner denied consent
    #[error("access_denied: {0}")]
    AccessDenied(String),

    /// Unexpected internal failure
    #[error("server_error: {0}")]
    ServerError(String),
}

impl ProtocolError {
    /// The machine-readable `error` code for the wire envelope
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidClient(_) => "invalid_client",
            Self::InvalidGrant(_) => "invalid_grant",
            Self::InvalidScope(_) => "invalid_scope",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::AccessDenied(_) => "access_denied",
            Self::ServerError(_) => "server_error",
        }
    }

    /// The HTTP status this error is rendered with
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest(_)
            | Self::InvalidGrant(_)
            | Self::InvalidScope(_)
            | Self::UnsupportedGrantType => BAD_REQUEST,
            Self::InvalidClient(_) => UNAUTHORIZED,
            Self::AccessDenied(_) => FORBIDDEN,
            Self::ServerError(_) => INTERNAL_SERVER_ERROR,
        }
    }

    /// The human-readable description for the wire envelope
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::InvalidRequest(d)
            | Self::InvalidClient(d)
            | Self::InvalidGrant(d)
            | Self::InvalidScope(d)
            | Self::AccessDenied(d)
            | Self::ServerError(d) => d.clone(),
            Self::UnsupportedGrantType => "Grant type not supported".to_owned(),
        }
    }

    /// Shorthand for wrapping an internal failure
    pub fn server(err: impl std::fmt::Display) -> Self {
        Self::ServerError(err.to_string())
    }
}

/// JSON envelope rendered for every protocol failure
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub error_description: String,
}

impl From<&ProtocolError> for ErrorBody {
    fn from(err: &ProtocolError) -> Self {
        Self {
            error: err.error_code().to_owned(),
            error_description: err.description(),
        }
    }
}
