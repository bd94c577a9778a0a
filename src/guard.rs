// ABOUTME: Bearer token guard for protected resource routes
// ABOUTME: Validates Authorization headers, resolves users, enforces scope requirements
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::warn;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::credentials::{ClientManager, TokenManager};
use crate::models::{Client, Token};
use crate::users::UserStore;

/// Request context attached after successful bearer authentication
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub token: Token,
    /// Loaded client record, when the row still exists
    pub client: Option<Client>,
    /// Resolved user payload; None for client_credentials tokens
    pub user: Option<Value>,
}

/// Guard failure, rendered as a JSON reply
#[derive(Debug, Clone)]
pub enum GuardError {
    /// Missing or non-Bearer Authorization header
    Unauthenticated,
    /// Unknown, expired, or revoked token; or its user no longer exists
    InvalidToken,
    /// Token lacks required scopes; carries the missing names
    InsufficientScope(Vec<String>),
    Internal,
}

impl GuardError {
    #[must_use]
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated | Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::InsufficientScope(_) => StatusCode::FORBIDDEN,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub fn body(&self) -> Value {
        match self {
            Self::Unauthenticated => json!({"error": "unauthenticated"}),
            Self::InvalidToken => json!({"error": "invalid_token"}),
            Self::InsufficientScope(missing) => json!({
                "error": "insufficient_scope",
                "error_description": format!("Missing required scopes: {}", missing.join(", ")),
            }),
            Self::Internal => json!({"error": "server_error"}),
        }
    }

    #[must_use]
    pub fn into_reply(self) -> impl Reply {
        warp::reply::with_status(warp::reply::json(&self.body()), self.http_status())
    }
}

/// Validates `Authorization: Bearer` credentials for API routes
pub struct BearerGuard {
    tokens: TokenManager,
    clients: ClientManager,
    users: Arc<dyn UserStore>,
}

impl BearerGuard {
    #[must_use]
    pub fn new(tokens: TokenManager, clients: ClientManager, users: Arc<dyn UserStore>) -> Self {
        Self {
            tokens,
            clients,
            users,
        }
    }

    /// Authenticate an Authorization header value and build the request
    /// context: validated token, loaded client, resolved user.
    ///
    /// # Errors
    /// `Unauthenticated` without a Bearer header, `InvalidToken` when the
    /// token or its user fails validation.
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<AuthContext, GuardError> {
        let header = authorization.ok_or(GuardError::Unauthenticated)?;
        let plain = header
            .strip_prefix("Bearer ")
            .ok_or(GuardError::Unauthenticated)?;

        let token = self
            .tokens
            .validate(plain)
            .await
            .map_err(|e| {
                warn!("token validation failed: {e:#}");
                GuardError::Internal
            })?
            .ok_or(GuardError::InvalidToken)?;

        let user = match &token.user_id {
            Some(user_id) => Some(
                self.users
                    .find_by_id(user_id)
                    .await
                    .map_err(|e| {
                        warn!("user lookup failed: {e:#}");
                        GuardError::Internal
                    })?
                    .ok_or(GuardError::InvalidToken)?,
            ),
            None => None,
        };

        let client = self.clients.find(token.client_id).await.map_err(|e| {
            warn!("client lookup failed: {e:#}");
            GuardError::Internal
        })?;

        Ok(AuthContext {
            token,
            client,
            user,
        })
    }

    /// Scope enforcement, layered on top of authentication: every required
    /// scope must be granted to the token.
    ///
    /// # Errors
    /// `InsufficientScope` carrying the missing names.
    pub fn enforce_scopes(context: &AuthContext, required: &[String]) -> Result<(), GuardError> {
        let missing: Vec<String> = required
            .iter()
            .filter(|scope| !context.token.has_scope(scope))
            .cloned()
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(GuardError::InsufficientScope(missing))
        }
    }
}

/// warp rejection wrapper for guard failures; pair with [`recover_denied`]
#[derive(Debug)]
pub struct Denied(pub GuardError);

impl warp::reject::Reject for Denied {}

/// Filter that admits only requests carrying a valid bearer token with the
/// required scopes, extracting the authenticated context.
pub fn protect(
    guard: Arc<BearerGuard>,
    required_scopes: Vec<String>,
) -> impl Filter<Extract = (AuthContext,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(warp::any().map(move || (guard.clone(), required_scopes.clone())))
        .and_then(
            |authorization: Option<String>,
             (guard, required): (Arc<BearerGuard>, Vec<String>)| async move {
                let context = guard
                    .authenticate(authorization.as_deref())
                    .await
                    .map_err(|e| warp::reject::custom(Denied(e)))?;
                BearerGuard::enforce_scopes(&context, &required)
                    .map_err(|e| warp::reject::custom(Denied(e)))?;
                Ok::<_, Rejection>(context)
            },
        )
}

/// Render guard rejections as their JSON replies; pass everything else on.
///
/// # Errors
/// Propagates rejections that are not guard failures.
pub async fn recover_denied(rejection: Rejection) -> Result<impl Reply, Rejection> {
    if let Some(Denied(err)) = rejection.find::<Denied>() {
        Ok(err.clone().into_reply())
    } else {
        Err(rejection)
    }
}
