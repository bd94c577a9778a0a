// ABOUTME: The grant protocol state machine behind the five protocol endpoints
// ABOUTME: Authorization issuance/consent, token grants with rotation, revocation, introspection
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use super::models::{
    AuthorizeRequest, ClientSummary, ConsentPayload, IntrospectionResponse, RevocationRequest,
    ScopeDescription, TokenRequest, TokenResponse,
};
use crate::config::ServerConfig;
use crate::constants::session_keys;
use crate::credentials::{
    AuthCodeManager, AuthCodeParams, ClientManager, TokenManager, TokenParams,
};
use crate::credentials::tokens::TokenLifetimes;
use crate::database::Database;
use crate::errors::ProtocolError;
use crate::events::{AuthEvent, EventSink};
use crate::models::{Client, GrantType, PkceMethod, Token};
use crate::scopes::{split_scope_param, ScopeRegistry};
use crate::session::{PendingAuthorization, SessionStore};
use crate::users::{UserRef, UserStore};

/// Successful outcome of GET /authorize
#[derive(Debug)]
pub enum AuthorizeOutcome {
    /// 302 to the validated redirect URI carrying the code (first-party
    /// clients and approved consent)
    Redirect(String),
    /// JSON consent challenge for third-party clients
    ConsentJson(ConsentPayload),
    /// Host-rendered consent page
    ConsentHtml(String),
}

/// Failed outcome of the authorize flow. Errors found before the redirect
/// URI is validated must never be redirected; afterwards the RFC requires
/// carrying them back to the client application.
#[derive(Debug)]
pub enum AuthorizeRejection {
    /// Render the standard JSON envelope with the error's HTTP status
    Json(ProtocolError),
    /// 302 to the validated redirect URI with error query parameters
    Redirect(String),
}

/// The protocol engine. Stateless across requests; every operation runs a
/// bounded number of store round-trips and holds no locks across awaits.
pub struct AuthorizationServer {
    config: Arc<ServerConfig>,
    clients: ClientManager,
    auth_codes: AuthCodeManager,
    tokens: TokenManager,
    scopes: Arc<ScopeRegistry>,
    sessions: Arc<dyn SessionStore>,
    users: Arc<dyn UserStore>,
    events: Arc<dyn EventSink>,
}

impl AuthorizationServer {
    #[must_use]
    pub fn new(
        database: Database,
        config: Arc<ServerConfig>,
        scopes: Arc<ScopeRegistry>,
        sessions: Arc<dyn SessionStore>,
        users: Arc<dyn UserStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let clients = ClientManager::new(database.clone());
        let auth_codes = AuthCodeManager::new(database.clone(), config.auth_code_lifetime);
        let tokens = TokenManager::new(
            database,
            TokenLifetimes {
                access: config.access_token_lifetime,
                refresh: config.refresh_token_lifetime,
                personal_access: config.personal_access_token_lifetime,
            },
            config.personal_access_client,
        );

        Self {
            config,
            clients,
            auth_codes,
            tokens,
            scopes,
            sessions,
            users,
            events,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Arc<ServerConfig> {
        &self.config
    }

    #[must_use]
    pub const fn client_manager(&self) -> &ClientManager {
        &self.clients
    }

    #[must_use]
    pub const fn token_manager(&self) -> &TokenManager {
        &self.tokens
    }

    #[must_use]
    pub const fn auth_code_manager(&self) -> &AuthCodeManager {
        &self.auth_codes
    }

    #[must_use]
    pub fn scope_registry(&self) -> &Arc<ScopeRegistry> {
        &self.scopes
    }

    #[must_use]
    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    #[must_use]
    pub fn users(&self) -> &Arc<dyn UserStore> {
        &self.users
    }

    /// Handle GET /authorize for an authenticated session user.
    ///
    /// Validation runs strictly in request order so that malformed
    /// requests leave no session state behind, and so that no error is
    /// ever carried to a redirect URI that has not been validated against
    /// the client's registered list.
    ///
    /// # Errors
    /// Returns a JSON rejection before the redirect URI is trusted, a
    /// redirect rejection afterwards.
    pub async fn authorize(
        &self,
        request: AuthorizeRequest,
        session_id: &str,
        user: &UserRef,
    ) -> Result<AuthorizeOutcome, AuthorizeRejection> {
        if request.response_type.as_deref() != Some("code") {
            return Err(AuthorizeRejection::Json(ProtocolError::InvalidRequest(
                "Only the 'code' response_type is supported".to_owned(),
            )));
        }

        let client_id = request.client_id.as_deref().ok_or_else(|| {
            AuthorizeRejection::Json(ProtocolError::InvalidRequest(
                "Missing client_id parameter".to_owned(),
            ))
        })?;
        let client = self
            .load_client(client_id)
            .await
            .map_err(AuthorizeRejection::Json)?;

        if !client.allows_grant(GrantType::AuthorizationCode) {
            return Err(AuthorizeRejection::Json(ProtocolError::InvalidRequest(
                "Client is not registered for the authorization_code grant".to_owned(),
            )));
        }

        let redirect_uri = request.redirect_uri.as_deref().ok_or_else(|| {
            AuthorizeRejection::Json(ProtocolError::InvalidRequest(
                "Missing redirect_uri parameter".to_owned(),
            ))
        })?;
        if !client.has_redirect_uri(redirect_uri) {
            warn!(client_id = %client.id, "authorize request with unregistered redirect_uri");
            return Err(AuthorizeRejection::Json(ProtocolError::InvalidRequest(
                "Invalid redirect_uri".to_owned(),
            )));
        }

        // The redirect URI is validated from here on; protocol errors are
        // carried back to the client application per RFC 6749 §4.1.2.1.
        let state = request.state.clone();

        if !client.confidential && request.code_challenge.is_none() {
            return Err(self.redirect_error(
                redirect_uri,
                &ProtocolError::InvalidRequest(
                    "code_challenge is required for public clients".to_owned(),
                ),
                state.as_deref(),
            ));
        }

        let code_challenge_method = match request.code_challenge {
            Some(_) => {
                let raw = request.code_challenge_method.as_deref().unwrap_or("plain");
                match PkceMethod::parse(raw) {
                    Some(method) => Some(method),
                    None => {
                        return Err(self.redirect_error(
                            redirect_uri,
                            &ProtocolError::InvalidRequest(
                                "code_challenge_method must be 'S256' or 'plain'".to_owned(),
                            ),
                            state.as_deref(),
                        ))
                    }
                }
            }
            None => None,
        };

        let requested = request
            .scope
            .as_deref()
            .map(split_scope_param)
            .unwrap_or_default();
        let scopes = match self.scopes.validate(
            &requested,
            client.scopes.as_deref(),
            &self.config.default_scopes,
        ) {
            Ok(scopes) => scopes,
            Err(err) => return Err(self.redirect_error(redirect_uri, &err, state.as_deref())),
        };

        let pending = PendingAuthorization {
            client_id: client.id,
            redirect_uri: redirect_uri.to_owned(),
            scopes: scopes.clone(),
            state,
            code_challenge: request.code_challenge,
            code_challenge_method,
        };
        let payload = serde_json::to_value(&pending)
            .map_err(|e| AuthorizeRejection::Json(ProtocolError::server(e)))?;
        self.sessions
            .put(session_id, session_keys::AUTH_REQUEST, payload)
            .await
            .map_err(|e| AuthorizeRejection::Json(ProtocolError::server(e)))?;

        if client.first_party {
            let url = self.issue_code(&pending, user).await?;
            self.sessions
                .forget(session_id, session_keys::AUTH_REQUEST)
                .await
                .map_err(|e| AuthorizeRejection::Json(ProtocolError::server(e)))?;
            return Ok(AuthorizeOutcome::Redirect(url));
        }

        let described = self.scopes.describe(&pending.scopes);
        if let Some(html) = self.users.render_consent(&client, &described) {
            return Ok(AuthorizeOutcome::ConsentHtml(html));
        }

        Ok(AuthorizeOutcome::ConsentJson(ConsentPayload {
            authorization_required: true,
            client: ClientSummary {
                id: client.id,
                name: client.name,
            },
            scopes: described
                .into_iter()
                .map(|(name, description)| ScopeDescription { name, description })
                .collect(),
            state: pending.state,
        }))
    }

    /// Handle POST /authorize: resolve the pending consent. The session
    /// entry is cleared unconditionally before any branching.
    ///
    /// # Errors
    /// Returns a JSON rejection when no authorization is pending, a
    /// redirect rejection (`access_denied`) when the user declined.
    pub async fn approve(
        &self,
        session_id: &str,
        approved: bool,
        user: &UserRef,
    ) -> Result<String, AuthorizeRejection> {
        let stored = self
            .sessions
            .get(session_id, session_keys::AUTH_REQUEST)
            .await
            .map_err(|e| AuthorizeRejection::Json(ProtocolError::server(e)))?;
        self.sessions
            .forget(session_id, session_keys::AUTH_REQUEST)
            .await
            .map_err(|e| AuthorizeRejection::Json(ProtocolError::server(e)))?;

        let Some(stored) = stored else {
            return Err(AuthorizeRejection::Json(ProtocolError::InvalidRequest(
                "No authorization request in progress".to_owned(),
            )));
        };
        let pending: PendingAuthorization = serde_json::from_value(stored)
            .map_err(|e| AuthorizeRejection::Json(ProtocolError::server(e)))?;

        if !approved {
            return Err(self.redirect_error(
                &pending.redirect_uri,
                &ProtocolError::AccessDenied(
                    "The resource owner denied the authorization request".to_owned(),
                ),
                pending.state.as_deref(),
            ));
        }

        self.issue_code(&pending, user).await
    }

    /// Issue an authorization code for an approved request and build the
    /// redirect back to the client application.
    async fn issue_code(
        &self,
        pending: &PendingAuthorization,
        user: &UserRef,
    ) -> Result<String, AuthorizeRejection> {
        let user_id = user.id().map_err(AuthorizeRejection::Json)?;

        let (plain, code) = self
            .auth_codes
            .create(AuthCodeParams {
                client_id: pending.client_id,
                user_id: user_id.clone(),
                redirect_uri: pending.redirect_uri.clone(),
                scopes: pending.scopes.clone(),
                code_challenge: pending.code_challenge.clone(),
                code_challenge_method: pending.code_challenge_method,
            })
            .await
            .map_err(|e| AuthorizeRejection::Json(ProtocolError::server(e)))?;

        let mut params = vec![("code", plain)];
        if let Some(state) = &pending.state {
            params.push(("state", state.clone()));
        }
        let url = append_query(&pending.redirect_uri, &params)
            .map_err(|e| AuthorizeRejection::Json(ProtocolError::server(e)))?;

        self.events.emit(AuthEvent::CodeIssued {
            client_id: code.client_id,
            user_id,
        });

        Ok(url)
    }

    /// Handle POST /token: dispatch on `grant_type`.
    ///
    /// # Errors
    /// Returns the protocol error to render as the standard envelope.
    pub async fn token(&self, request: TokenRequest) -> Result<TokenResponse, ProtocolError> {
        match request.grant_type.as_deref() {
            Some("authorization_code") => self.authorization_code_grant(request).await,
            Some("client_credentials") => self.client_credentials_grant(request).await,
            Some("refresh_token") => self.refresh_token_grant(request).await,
            Some(_) => Err(ProtocolError::UnsupportedGrantType),
            None => Err(ProtocolError::InvalidRequest(
                "Missing grant_type parameter".to_owned(),
            )),
        }
    }

    async fn authorization_code_grant(
        &self,
        request: TokenRequest,
    ) -> Result<TokenResponse, ProtocolError> {
        let code = require(request.code.as_deref(), "code")?;
        let redirect_uri = require(request.redirect_uri.as_deref(), "redirect_uri")?;
        let client_id = require(request.client_id.as_deref(), "client_id")?;

        let client = self.load_client(client_id).await?;
        self.authenticate_confidential(&client, request.client_secret.as_deref())?;

        let consumed = self
            .auth_codes
            .consume(
                code,
                client.id,
                redirect_uri,
                request.code_verifier.as_deref(),
            )
            .await
            .map_err(ProtocolError::server)?
            .ok_or_else(|| {
                ProtocolError::InvalidGrant("Invalid or expired authorization code".to_owned())
            })?;

        let (access, refresh, token) = self
            .tokens
            .create(TokenParams {
                user_id: Some(consumed.user_id),
                client_id: client.id,
                name: None,
                scopes: consumed.scopes,
                with_refresh: client.allows_grant(GrantType::RefreshToken),
            })
            .await
            .map_err(ProtocolError::server)?;

        self.events.emit(AuthEvent::TokenIssued {
            token_id: token.id,
            client_id: client.id,
            user_id: token.user_id.clone(),
            grant_type: "authorization_code",
        });

        Ok(envelope(access, refresh, &token))
    }

    async fn client_credentials_grant(
        &self,
        request: TokenRequest,
    ) -> Result<TokenResponse, ProtocolError> {
        let client_id = require(request.client_id.as_deref(), "client_id")?;
        let client_secret = require(request.client_secret.as_deref(), "client_secret")?;

        let client = self.load_client(client_id).await?;
        if !client.confidential {
            warn!(client_id = %client.id, "client_credentials attempted by public client");
            return Err(ProtocolError::InvalidClient(
                "Public clients may not use the client_credentials grant".to_owned(),
            ));
        }
        if !client.allows_grant(GrantType::ClientCredentials) {
            return Err(ProtocolError::InvalidGrant(
                "Client is not registered for the client_credentials grant".to_owned(),
            ));
        }
        if !ClientManager::verify_secret(&client, client_secret) {
            return Err(ProtocolError::InvalidClient(
                "Client authentication failed".to_owned(),
            ));
        }

        let requested = request
            .scope
            .as_deref()
            .map(split_scope_param)
            .unwrap_or_default();
        let scopes = self.scopes.validate(
            &requested,
            client.scopes.as_deref(),
            &self.config.default_scopes,
        )?;

        let (access, _, token) = self
            .tokens
            .create(TokenParams {
                user_id: None,
                client_id: client.id,
                name: None,
                scopes,
                with_refresh: false,
            })
            .await
            .map_err(ProtocolError::server)?;

        self.events.emit(AuthEvent::TokenIssued {
            token_id: token.id,
            client_id: client.id,
            user_id: None,
            grant_type: "client_credentials",
        });

        Ok(envelope(access, None, &token))
    }

    async fn refresh_token_grant(
        &self,
        request: TokenRequest,
    ) -> Result<TokenResponse, ProtocolError> {
        let refresh_token = require(request.refresh_token.as_deref(), "refresh_token")?;
        let client_id = require(request.client_id.as_deref(), "client_id")?;

        // Re-checking the client row here also rejects refresh attempts
        // from clients revoked after the token was issued.
        let client = self.load_client(client_id).await?;
        self.authenticate_confidential(&client, request.client_secret.as_deref())?;

        let old = self
            .tokens
            .validate_refresh(refresh_token)
            .await
            .map_err(ProtocolError::server)?
            .filter(|token| token.client_id == client.id)
            .ok_or_else(|| {
                ProtocolError::InvalidGrant("Invalid or expired refresh token".to_owned())
            })?;

        let requested = request
            .scope
            .as_deref()
            .map(split_scope_param)
            .unwrap_or_default();
        let scopes = if requested.is_empty() {
            old.scopes.clone()
        } else {
            let widened: Vec<&str> = requested
                .iter()
                .filter(|name| !old.has_scope(name))
                .map(String::as_str)
                .collect();
            if !widened.is_empty() {
                return Err(ProtocolError::InvalidRequest(format!(
                    "Scope widening is not permitted: {}",
                    widened.join(" ")
                )));
            }
            requested
        };

        // Rotation: revoke the old row before issuing the new pair so the
        // consumed refresh token is unusable even if issuance fails.
        self.tokens
            .revoke(old.id)
            .await
            .map_err(ProtocolError::server)?;

        let (access, refresh, token) = self
            .tokens
            .create(TokenParams {
                user_id: old.user_id.clone(),
                client_id: client.id,
                name: None,
                scopes,
                with_refresh: true,
            })
            .await
            .map_err(ProtocolError::server)?;

        info!(client_id = %client.id, old = %old.id, new = %token.id, "rotated refresh token");
        self.events.emit(AuthEvent::TokenRefreshed {
            token_id: token.id,
            client_id: client.id,
            previous_token_id: old.id,
        });

        Ok(envelope(access, refresh, &token))
    }

    /// Handle POST /revoke (RFC 7009). Succeeds with an empty body for any
    /// present `token` parameter regardless of whether it matched a row —
    /// the response must not leak credential existence.
    ///
    /// # Errors
    /// Returns `invalid_request` when `token` is absent, `invalid_client`
    /// when supplied client credentials fail.
    pub async fn revoke(&self, request: RevocationRequest) -> Result<(), ProtocolError> {
        let token = require(request.token.as_deref(), "token")?;
        self.maybe_authenticate_client(
            request.client_id.as_deref(),
            request.client_secret.as_deref(),
        )
        .await?;

        if let Some(row) = self
            .tokens
            .validate(token)
            .await
            .map_err(ProtocolError::server)?
        {
            self.revoke_row(&row).await?;
        } else if let Some(row) = self
            .tokens
            .validate_refresh(token)
            .await
            .map_err(ProtocolError::server)?
        {
            self.revoke_row(&row).await?;
        }

        Ok(())
    }

    async fn revoke_row(&self, row: &Token) -> Result<(), ProtocolError> {
        self.tokens
            .revoke(row.id)
            .await
            .map_err(ProtocolError::server)?;
        self.events
            .emit(AuthEvent::TokenRevoked { token_id: row.id });
        Ok(())
    }

    /// Handle POST /introspect (RFC 7662).
    ///
    /// # Errors
    /// Returns `invalid_request` when `token` is absent, `invalid_client`
    /// when supplied client credentials fail.
    pub async fn introspect(
        &self,
        request: RevocationRequest,
    ) -> Result<IntrospectionResponse, ProtocolError> {
        let token = require(request.token.as_deref(), "token")?;
        self.maybe_authenticate_client(
            request.client_id.as_deref(),
            request.client_secret.as_deref(),
        )
        .await?;

        let Some(row) = self
            .tokens
            .validate(token)
            .await
            .map_err(ProtocolError::server)?
        else {
            return Ok(IntrospectionResponse::inactive());
        };

        Ok(IntrospectionResponse {
            active: true,
            scope: Some(row.scopes.join(" ")),
            client_id: Some(row.client_id.to_string()),
            token_type: Some("Bearer".to_owned()),
            exp: Some(row.expires_at.timestamp()),
            iat: Some(row.created_at.timestamp()),
            sub: row.user_id,
        })
    }

    /// Look up a client by its wire identifier, rejecting unknown and
    /// revoked rows.
    async fn load_client(&self, client_id: &str) -> Result<Client, ProtocolError> {
        let id = Uuid::parse_str(client_id).map_err(|_| {
            ProtocolError::InvalidClient("Client authentication failed".to_owned())
        })?;

        let client = self
            .clients
            .find(id)
            .await
            .map_err(ProtocolError::server)?
            .ok_or_else(|| {
                ProtocolError::InvalidClient("Client authentication failed".to_owned())
            })?;

        if client.revoked {
            warn!(client_id = %client.id, "request for revoked client");
            return Err(ProtocolError::InvalidClient(
                "Client has been revoked".to_owned(),
            ));
        }

        Ok(client)
    }

    /// Confidential clients must present and pass secret verification.
    fn authenticate_confidential(
        &self,
        client: &Client,
        secret: Option<&str>,
    ) -> Result<(), ProtocolError> {
        if !client.confidential {
            return Ok(());
        }
        let secret = secret.ok_or_else(|| {
            ProtocolError::InvalidClient("Client authentication required".to_owned())
        })?;
        if !ClientManager::verify_secret(client, secret) {
            warn!(client_id = %client.id, "client secret verification failed");
            return Err(ProtocolError::InvalidClient(
                "Client authentication failed".to_owned(),
            ));
        }
        Ok(())
    }

    /// RFC 7009 §2.1 client authentication for revoke/introspect: the
    /// client id is checked when present, and the secret is verified only
    /// when it was also supplied.
    async fn maybe_authenticate_client(
        &self,
        client_id: Option<&str>,
        client_secret: Option<&str>,
    ) -> Result<(), ProtocolError> {
        let Some(client_id) = client_id else {
            return Ok(());
        };
        let client = self.load_client(client_id).await?;
        if client.confidential {
            if let Some(secret) = client_secret {
                if !ClientManager::verify_secret(&client, secret) {
                    return Err(ProtocolError::InvalidClient(
                        "Client authentication failed".to_owned(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Build a redirect-carried error for a validated redirect URI.
    fn redirect_error(
        &self,
        redirect_uri: &str,
        err: &ProtocolError,
        state: Option<&str>,
    ) -> AuthorizeRejection {
        let mut params = vec![
            ("error", err.error_code().to_owned()),
            ("error_description", err.description()),
        ];
        if let Some(state) = state {
            params.push(("state", state.to_owned()));
        }

        match append_query(redirect_uri, &params) {
            Ok(url) => AuthorizeRejection::Redirect(url),
            Err(e) => AuthorizeRejection::Json(ProtocolError::server(e)),
        }
    }
}

fn require<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, ProtocolError> {
    value.ok_or_else(|| ProtocolError::InvalidRequest(format!("Missing {name} parameter")))
}

fn envelope(access: String, refresh: Option<String>, token: &Token) -> TokenResponse {
    TokenResponse {
        access_token: access,
        token_type: "Bearer".to_owned(),
        expires_in: (token.expires_at - Utc::now()).num_seconds(),
        scope: token.scopes.join(" "),
        refresh_token: refresh,
    }
}

/// Append query parameters to a URI, preserving any it already carries.
fn append_query(base: &str, params: &[(&str, String)]) -> Result<String, url::ParseError> {
    let mut url = Url::parse(base)?;
    {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in params {
            pairs.append_pair(name, value);
        }
    }
    Ok(url.into())
}
