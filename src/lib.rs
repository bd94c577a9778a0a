// ABOUTME: Library entry point for the aegis OAuth 2.0 authorization server
// ABOUTME: Opaque-token grant engine with hashed credential storage and warp routes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

#![deny(unsafe_code)]

//! # Aegis Auth Server
//!
//! An opaque-token OAuth 2.0 authorization server implementing RFC 6749
//! (authorization code, client credentials, and refresh token grants),
//! RFC 7636 (PKCE), RFC 7009 (token revocation), and RFC 7662 (token
//! introspection).
//!
//! ## Design
//!
//! - **Opaque credentials**: access tokens, refresh tokens, authorization
//!   codes, and client secrets are random byte strings returned to the
//!   caller exactly once; durable state holds only their SHA-256 hashes.
//! - **Single-use codes**: authorization code consumption is enforced by a
//!   conditional update, so racing exchanges of the same code cannot both
//!   succeed.
//! - **Refresh rotation**: a refresh grant revokes the consumed token
//!   before the replacement pair is issued.
//! - **Host seams**: the user subsystem, session storage for the consent
//!   step, and event emission are consumed through small traits so the
//!   embedding application keeps ownership of identity and sessions.
//!
//! ## Layout
//!
//! - [`database`]: SQL persistence for clients, tokens, and auth codes
//! - [`credentials`]: credential lifecycle (hashing, validation, expiry,
//!   revocation, rotation, pruning)
//! - [`scopes`]: the scope registry
//! - [`oauth2`]: the grant protocol engine and its HTTP routes
//! - [`guard`]: bearer authentication for protected resource routes

/// Shared constants: status codes, credential sizes, defaults
pub mod constants;
/// Protocol error taxonomy and wire envelope
pub mod errors;

/// Environment-driven configuration
pub mod config;
/// tracing-subscriber bootstrap
pub mod logging;

/// Persisted entities and protocol enums
pub mod models;

/// Persistence layer owning the SQL schema
pub mod database;

/// Credential lifecycle management
pub mod credentials;

/// Scope name registry and validation
pub mod scopes;

/// Grant protocol engine, wire models, rate limiting, and routes
pub mod oauth2;

/// Bearer token guard for API routes
pub mod guard;

/// Session storage seam for the consent step
pub mod session;

/// User subsystem seam
pub mod users;

/// Protocol lifecycle events
pub mod events;

pub use config::ServerConfig;
pub use database::Database;
pub use errors::{AppResult, ProtocolError};
pub use oauth2::{AuthorizationServer, RateLimiter};
pub use scopes::ScopeRegistry;
