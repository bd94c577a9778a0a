// ABOUTME: Main server binary: configuration, storage, and the warp HTTP surface
// ABOUTME: Wires the protocol engine to in-process session/user stores by default
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use warp::Filter;

use aegis_auth_server::config::ServerConfig;
use aegis_auth_server::database::Database;
use aegis_auth_server::events::{EventSink, LogSink};
use aegis_auth_server::guard::recover_denied;
use aegis_auth_server::logging;
use aegis_auth_server::oauth2::{routes, AuthorizationServer, RateLimiter};
use aegis_auth_server::scopes::ScopeRegistry;
use aegis_auth_server::session::{MemorySessionStore, SessionStore};
use aegis_auth_server::users::{MemoryUserStore, UserStore};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init()?;

    let config = Arc::new(ServerConfig::from_env()?);
    let database = Database::new(&config.database_url).await?;

    let registry = Arc::new(ScopeRegistry::new(config.scopes.clone()));
    let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
    let users: Arc<dyn UserStore> = Arc::new(MemoryUserStore::new());
    let events: Arc<dyn EventSink> = Arc::new(LogSink);

    let server = Arc::new(AuthorizationServer::new(
        database,
        config.clone(),
        registry,
        sessions,
        users,
        events,
    ));
    let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));

    let api = routes::routes(server, limiter)
        .recover(recover_denied)
        .with(warp::trace::request());

    info!(
        port = config.http_port,
        prefix = %config.route_prefix,
        "authorization server listening"
    );
    warp::serve(api).run(([0, 0, 0, 0], config.http_port)).await;

    Ok(())
}
