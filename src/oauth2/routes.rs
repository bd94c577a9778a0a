// ABOUTME: warp route filters for the protocol endpoints and management surface
// ABOUTME: Cookie session plumbing, body parsing, rate limiting, reply rendering
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use super::endpoints::{AuthorizationServer, AuthorizeOutcome, AuthorizeRejection};
use super::models::{AuthorizeRequest, RevocationRequest, TokenRequest};
use super::rate_limiting::{RateLimitStatus, RateLimiter};
use crate::constants::{session_keys, SESSION_COOKIE};
use crate::credentials::CreateClientInput;
use crate::errors::{ErrorBody, ProtocolError};
use crate::models::{GrantType, Token};
use crate::users::UserRef;

/// All protocol and management routes mounted under the configured prefix.
pub fn routes(
    server: Arc<AuthorizationServer>,
    limiter: Arc<RateLimiter>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let prefix = server.config().prefix_segment();

    let authorize_get = warp::path("authorize")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::addr::remote())
        .and(warp::query::<HashMap<String, String>>())
        .and(warp::header::optional::<String>("cookie"))
        .and(with_server(server.clone()))
        .and(with_limiter(limiter.clone()))
        .and_then(handle_authorize);

    let authorize_post = warp::path("authorize")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::form::<HashMap<String, String>>())
        .and(warp::header::optional::<String>("cookie"))
        .and(with_server(server.clone()))
        .and_then(handle_approve);

    let token = warp::path("token")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::addr::remote())
        .and(warp::header::optional::<String>("content-type"))
        .and(warp::body::bytes())
        .and(with_server(server.clone()))
        .and(with_limiter(limiter))
        .and_then(handle_token);

    let revoke = warp::path("revoke")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::header::optional::<String>("content-type"))
        .and(warp::body::bytes())
        .and(with_server(server.clone()))
        .and_then(handle_revoke);

    let introspect = warp::path("introspect")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::header::optional::<String>("content-type"))
        .and(warp::body::bytes())
        .and(with_server(server.clone()))
        .and_then(handle_introspect);

    let clients_list = warp::path("clients")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::header::optional::<String>("cookie"))
        .and(with_server(server.clone()))
        .and_then(handle_clients_list);

    let clients_create = warp::path("clients")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json::<CreateClientBody>())
        .and(warp::header::optional::<String>("cookie"))
        .and(with_server(server.clone()))
        .and_then(handle_clients_create);

    let clients_get = warp::path!("clients" / Uuid)
        .and(warp::get())
        .and(warp::header::optional::<String>("cookie"))
        .and(with_server(server.clone()))
        .and_then(handle_clients_get);

    let clients_delete = warp::path!("clients" / Uuid)
        .and(warp::delete())
        .and(warp::header::optional::<String>("cookie"))
        .and(with_server(server.clone()))
        .and_then(handle_clients_delete);

    let personal_list = warp::path("personal-tokens")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::header::optional::<String>("cookie"))
        .and(with_server(server.clone()))
        .and_then(handle_personal_list);

    let personal_create = warp::path("personal-tokens")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json::<CreatePersonalTokenBody>())
        .and(warp::header::optional::<String>("cookie"))
        .and(with_server(server.clone()))
        .and_then(handle_personal_create);

    let personal_delete = warp::path!("personal-tokens" / Uuid)
        .and(warp::delete())
        .and(warp::header::optional::<String>("cookie"))
        .and(with_server(server))
        .and_then(handle_personal_delete);

    warp::path(prefix).and(
        authorize_get
            .or(authorize_post)
            .or(token)
            .or(revoke)
            .or(introspect)
            .or(clients_list)
            .or(clients_create)
            .or(clients_get)
            .or(clients_delete)
            .or(personal_list)
            .or(personal_create)
            .or(personal_delete),
    )
}

/// POST /clients body
#[derive(Debug, Deserialize)]
pub struct CreateClientBody {
    pub name: Option<String>,
    pub redirect_uris: Option<Vec<String>>,
    /// Register a public (secretless, PKCE-required) client
    pub public: Option<bool>,
    pub first_party: Option<bool>,
    pub grant_types: Option<Vec<String>>,
}

/// POST /personal-tokens body
#[derive(Debug, Deserialize)]
pub struct CreatePersonalTokenBody {
    pub name: Option<String>,
    pub scopes: Option<Vec<String>>,
}

fn with_server(
    server: Arc<AuthorizationServer>,
) -> impl Filter<Extract = (Arc<AuthorizationServer>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || server.clone())
}

fn with_limiter(
    limiter: Arc<RateLimiter>,
) -> impl Filter<Extract = (Arc<RateLimiter>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || limiter.clone())
}

/// Extract the session id from the cookie header
fn session_id_from_cookie(cookie_header: Option<&str>) -> Option<String> {
    let header = cookie_header?;
    for cookie in header.split(';') {
        let cookie = cookie.trim();
        if let Some(rest) = cookie.strip_prefix(SESSION_COOKIE) {
            if let Some(value) = rest.strip_prefix('=') {
                return Some(value.to_owned());
            }
        }
    }
    None
}

/// Resolve the authenticated session user written by the host's login flow
async fn session_user(server: &AuthorizationServer, session_id: &str) -> Option<UserRef> {
    match server.sessions().get(session_id, session_keys::USER).await {
        Ok(Some(value)) => UserRef::from_value(&value),
        Ok(None) => None,
        Err(e) => {
            warn!("session user lookup failed: {e:#}");
            None
        }
    }
}

/// Parse a request body as JSON or urlencoded form into a parameter map
fn parse_body(content_type: Option<&str>, body: &Bytes) -> HashMap<String, String> {
    if content_type.is_some_and(|ct| ct.contains("json")) {
        match serde_json::from_slice::<HashMap<String, serde_json::Value>>(body) {
            Ok(map) => map
                .into_iter()
                .filter_map(|(key, value)| match value {
                    serde_json::Value::String(s) => Some((key, s)),
                    serde_json::Value::Number(n) => Some((key, n.to_string())),
                    serde_json::Value::Bool(b) => Some((key, b.to_string())),
                    _ => None,
                })
                .collect(),
            Err(e) => {
                debug!("malformed JSON body: {e}");
                HashMap::new()
            }
        }
    } else {
        url::form_urlencoded::parse(body).into_owned().collect()
    }
}

fn protocol_reply(err: &ProtocolError) -> Box<dyn Reply> {
    let status = StatusCode::from_u16(err.http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Box::new(warp::reply::with_status(
        warp::reply::json(&ErrorBody::from(err)),
        status,
    ))
}

fn redirect_reply(url: &str) -> Box<dyn Reply> {
    Box::new(warp::reply::with_status(
        warp::reply::with_header(warp::reply(), "Location", url.to_owned()),
        StatusCode::FOUND,
    ))
}

fn unauthenticated_reply() -> Box<dyn Reply> {
    Box::new(warp::reply::with_status(
        warp::reply::json(&json!({"error": "unauthenticated"})),
        StatusCode::UNAUTHORIZED,
    ))
}

fn not_found_reply() -> Box<dyn Reply> {
    Box::new(warp::reply::with_status(
        warp::reply::json(&json!({"error": "not_found"})),
        StatusCode::NOT_FOUND,
    ))
}

fn unprocessable_reply(message: &str) -> Box<dyn Reply> {
    Box::new(warp::reply::with_status(
        warp::reply::json(&json!({"error": "invalid_input", "error_description": message})),
        StatusCode::UNPROCESSABLE_ENTITY,
    ))
}

fn rate_limited_reply(status: RateLimitStatus) -> Box<dyn Reply> {
    let retry_after = status.retry_after_secs.unwrap_or(1);
    Box::new(warp::reply::with_header(
        warp::reply::with_status(
            warp::reply::json(&json!({
                "error": "temporarily_unavailable",
                "error_description": "Rate limit exceeded, retry later"
            })),
            StatusCode::TOO_MANY_REQUESTS,
        ),
        "Retry-After",
        retry_after.to_string(),
    ))
}

fn authorize_rejection_reply(rejection: &AuthorizeRejection) -> Box<dyn Reply> {
    match rejection {
        AuthorizeRejection::Json(err) => protocol_reply(err),
        AuthorizeRejection::Redirect(url) => redirect_reply(url),
    }
}

/// Handle GET /authorize
async fn handle_authorize(
    remote: Option<SocketAddr>,
    params: HashMap<String, String>,
    cookie: Option<String>,
    server: Arc<AuthorizationServer>,
    limiter: Arc<RateLimiter>,
) -> Result<Box<dyn Reply>, Rejection> {
    if let Some(addr) = remote {
        let status = limiter.check("authorize", addr.ip());
        if status.is_limited {
            return Ok(rate_limited_reply(status));
        }
    }

    let Some(session_id) = session_id_from_cookie(cookie.as_deref()) else {
        return Ok(unauthenticated_reply());
    };
    let Some(user) = session_user(&server, &session_id).await else {
        return Ok(unauthenticated_reply());
    };

    let request = AuthorizeRequest::from_params(&params);
    match server.authorize(request, &session_id, &user).await {
        Ok(AuthorizeOutcome::Redirect(url)) => Ok(redirect_reply(&url)),
        Ok(AuthorizeOutcome::ConsentJson(payload)) => {
            Ok(Box::new(warp::reply::json(&payload)))
        }
        Ok(AuthorizeOutcome::ConsentHtml(html)) => Ok(Box::new(warp::reply::html(html))),
        Err(rejection) => Ok(authorize_rejection_reply(&rejection)),
    }
}

/// Handle POST /authorize (consent resolution)
async fn handle_approve(
    form: HashMap<String, String>,
    cookie: Option<String>,
    server: Arc<AuthorizationServer>,
) -> Result<Box<dyn Reply>, Rejection> {
    let Some(session_id) = session_id_from_cookie(cookie.as_deref()) else {
        return Ok(unauthenticated_reply());
    };
    let Some(user) = session_user(&server, &session_id).await else {
        return Ok(unauthenticated_reply());
    };

    let approved = form
        .get("approved")
        .is_some_and(|v| matches!(v.as_str(), "1" | "true" | "on" | "yes"));

    match server.approve(&session_id, approved, &user).await {
        Ok(url) => Ok(redirect_reply(&url)),
        Err(rejection) => Ok(authorize_rejection_reply(&rejection)),
    }
}

/// Handle POST /token
async fn handle_token(
    remote: Option<SocketAddr>,
    content_type: Option<String>,
    body: Bytes,
    server: Arc<AuthorizationServer>,
    limiter: Arc<RateLimiter>,
) -> Result<Box<dyn Reply>, Rejection> {
    if let Some(addr) = remote {
        let status = limiter.check("token", addr.ip());
        if status.is_limited {
            return Ok(rate_limited_reply(status));
        }
    }

    let params = parse_body(content_type.as_deref(), &body);
    let request = TokenRequest::from_params(&params);
    debug!(
        grant_type = ?request.grant_type,
        client_id = ?request.client_id,
        "token request"
    );

    match server.token(request).await {
        Ok(response) => Ok(Box::new(warp::reply::with_status(
            warp::reply::json(&response),
            StatusCode::OK,
        ))),
        Err(err) => Ok(protocol_reply(&err)),
    }
}

/// Handle POST /revoke (RFC 7009)
async fn handle_revoke(
    content_type: Option<String>,
    body: Bytes,
    server: Arc<AuthorizationServer>,
) -> Result<Box<dyn Reply>, Rejection> {
    let params = parse_body(content_type.as_deref(), &body);
    let request = RevocationRequest::from_params(&params);

    match server.revoke(request).await {
        Ok(()) => Ok(Box::new(warp::reply::with_status(
            warp::reply::json(&json!({})),
            StatusCode::OK,
        ))),
        Err(err) => Ok(protocol_reply(&err)),
    }
}

/// Handle POST /introspect (RFC 7662)
async fn handle_introspect(
    content_type: Option<String>,
    body: Bytes,
    server: Arc<AuthorizationServer>,
) -> Result<Box<dyn Reply>, Rejection> {
    let params = parse_body(content_type.as_deref(), &body);
    let request = RevocationRequest::from_params(&params);

    match server.introspect(request).await {
        Ok(response) => Ok(Box::new(warp::reply::with_status(
            warp::reply::json(&response),
            StatusCode::OK,
        ))),
        Err(err) => Ok(protocol_reply(&err)),
    }
}

/// Handle GET /clients
async fn handle_clients_list(
    cookie: Option<String>,
    server: Arc<AuthorizationServer>,
) -> Result<Box<dyn Reply>, Rejection> {
    if resolve_session_user(&server, cookie.as_deref()).await.is_none() {
        return Ok(unauthenticated_reply());
    }

    match server.client_manager().list(false).await {
        Ok(clients) => Ok(Box::new(warp::reply::json(&clients))),
        Err(e) => Ok(server_error_reply(&e)),
    }
}

/// Handle POST /clients
async fn handle_clients_create(
    body: CreateClientBody,
    cookie: Option<String>,
    server: Arc<AuthorizationServer>,
) -> Result<Box<dyn Reply>, Rejection> {
    if resolve_session_user(&server, cookie.as_deref()).await.is_none() {
        return Ok(unauthenticated_reply());
    }

    let Some(name) = body.name.filter(|n| !n.trim().is_empty()) else {
        return Ok(unprocessable_reply("name is required"));
    };

    let grant_types = match body.grant_types {
        Some(names) => {
            let mut parsed = Vec::with_capacity(names.len());
            for raw in &names {
                match GrantType::parse(raw) {
                    Some(gt) => parsed.push(gt),
                    None => {
                        return Ok(unprocessable_reply(&format!("unknown grant type '{raw}'")))
                    }
                }
            }
            Some(parsed)
        }
        None => None,
    };

    let confidential = !body.public.unwrap_or(false);
    if !confidential
        && grant_types
            .as_ref()
            .is_some_and(|g| g.contains(&GrantType::ClientCredentials))
    {
        return Ok(unprocessable_reply(
            "public clients may not use the client_credentials grant",
        ));
    }

    let input = CreateClientInput {
        name,
        redirect_uris: body.redirect_uris.unwrap_or_default(),
        scopes: None,
        grant_types,
        confidential,
        first_party: body.first_party.unwrap_or(false),
    };

    match server.client_manager().create(input).await {
        Ok((client, secret)) => Ok(Box::new(warp::reply::with_status(
            warp::reply::json(&json!({"client": client, "secret": secret})),
            StatusCode::CREATED,
        ))),
        Err(e) => Ok(server_error_reply(&e)),
    }
}

/// Handle GET /clients/:id
async fn handle_clients_get(
    id: Uuid,
    cookie: Option<String>,
    server: Arc<AuthorizationServer>,
) -> Result<Box<dyn Reply>, Rejection> {
    if resolve_session_user(&server, cookie.as_deref()).await.is_none() {
        return Ok(unauthenticated_reply());
    }

    match server.client_manager().find(id).await {
        Ok(Some(client)) if !client.revoked => Ok(Box::new(warp::reply::json(&client))),
        Ok(_) => Ok(not_found_reply()),
        Err(e) => Ok(server_error_reply(&e)),
    }
}

/// Handle DELETE /clients/:id (soft revoke)
async fn handle_clients_delete(
    id: Uuid,
    cookie: Option<String>,
    server: Arc<AuthorizationServer>,
) -> Result<Box<dyn Reply>, Rejection> {
    if resolve_session_user(&server, cookie.as_deref()).await.is_none() {
        return Ok(unauthenticated_reply());
    }

    match server.client_manager().find(id).await {
        Ok(Some(_)) => match server.client_manager().revoke(id).await {
            Ok(()) => Ok(Box::new(warp::reply::json(&json!({})))),
            Err(e) => Ok(server_error_reply(&e)),
        },
        Ok(None) => Ok(not_found_reply()),
        Err(e) => Ok(server_error_reply(&e)),
    }
}

/// Handle GET /personal-tokens
async fn handle_personal_list(
    cookie: Option<String>,
    server: Arc<AuthorizationServer>,
) -> Result<Box<dyn Reply>, Rejection> {
    let Some(user_id) = resolve_session_user_id(&server, cookie.as_deref()).await else {
        return Ok(unauthenticated_reply());
    };

    match server.token_manager().personal_tokens_for(&user_id).await {
        Ok(tokens) => {
            let summaries: Vec<_> = tokens.iter().map(personal_token_summary).collect();
            Ok(Box::new(warp::reply::json(&summaries)))
        }
        Err(e) => Ok(server_error_reply(&e)),
    }
}

/// Handle POST /personal-tokens
async fn handle_personal_create(
    body: CreatePersonalTokenBody,
    cookie: Option<String>,
    server: Arc<AuthorizationServer>,
) -> Result<Box<dyn Reply>, Rejection> {
    let Some(user_id) = resolve_session_user_id(&server, cookie.as_deref()).await else {
        return Ok(unauthenticated_reply());
    };

    let Some(name) = body.name.filter(|n| !n.trim().is_empty()) else {
        return Ok(unprocessable_reply("name is required"));
    };

    let requested = body.scopes.unwrap_or_default();
    let scopes = match server.scope_registry().validate(
        &requested,
        None,
        &server.config().default_scopes,
    ) {
        Ok(scopes) => scopes,
        Err(err) => return Ok(unprocessable_reply(&err.description())),
    };

    match server
        .token_manager()
        .create_personal(user_id, name, scopes)
        .await
    {
        Ok((plain, token)) => Ok(Box::new(warp::reply::with_status(
            warp::reply::json(&json!({
                "token": plain,
                "record": personal_token_summary(&token),
            })),
            StatusCode::CREATED,
        ))),
        Err(e) => Ok(server_error_reply(&e)),
    }
}

/// Handle DELETE /personal-tokens/:id
async fn handle_personal_delete(
    id: Uuid,
    cookie: Option<String>,
    server: Arc<AuthorizationServer>,
) -> Result<Box<dyn Reply>, Rejection> {
    let Some(user_id) = resolve_session_user_id(&server, cookie.as_deref()).await else {
        return Ok(unauthenticated_reply());
    };

    match server.token_manager().find(id).await {
        Ok(Some(token)) if token.user_id.as_deref() == Some(user_id.as_str()) => {
            match server.token_manager().revoke(id).await {
                Ok(()) => Ok(Box::new(warp::reply::json(&json!({})))),
                Err(e) => Ok(server_error_reply(&e)),
            }
        }
        Ok(_) => Ok(not_found_reply()),
        Err(e) => Ok(server_error_reply(&e)),
    }
}

async fn resolve_session_user(
    server: &AuthorizationServer,
    cookie: Option<&str>,
) -> Option<UserRef> {
    let session_id = session_id_from_cookie(cookie)?;
    session_user(server, &session_id).await
}

async fn resolve_session_user_id(
    server: &AuthorizationServer,
    cookie: Option<&str>,
) -> Option<String> {
    resolve_session_user(server, cookie).await?.id().ok()
}

fn personal_token_summary(token: &Token) -> serde_json::Value {
    json!({
        "id": token.id,
        "name": token.name,
        "scopes": token.scopes,
        "created_at": token.created_at,
        "expires_at": token.expires_at,
        "last_used_at": token.last_used_at,
    })
}

fn server_error_reply(err: &anyhow::Error) -> Box<dyn Reply> {
    warn!("request failed: {err:#}");
    protocol_reply(&ProtocolError::ServerError(
        "Internal server error".to_owned(),
    ))
}
