// ABOUTME: Shared test harness for the authorization server integration tests
// ABOUTME: In-memory database, seeded users and clients, recording event sink
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org
#![allow(dead_code)]

use std::sync::{Arc, Mutex, Once};

use base64::{engine::general_purpose, Engine as _};
use serde_json::json;
use sha2::{Digest, Sha256};

use aegis_auth_server::config::ServerConfig;
use aegis_auth_server::credentials::CreateClientInput;
use aegis_auth_server::database::Database;
use aegis_auth_server::events::{AuthEvent, EventSink};
use aegis_auth_server::models::{Client, GrantType};
use aegis_auth_server::oauth2::AuthorizationServer;
use aegis_auth_server::scopes::ScopeRegistry;
use aegis_auth_server::session::MemorySessionStore;
use aegis_auth_server::users::{MemoryUserStore, UserRef};

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_test_writer()
            .init();
    });
}

/// Event sink that records everything it sees
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<AuthEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<AuthEvent> {
        self.events.lock().expect("sink lock").clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: AuthEvent) {
        self.events.lock().expect("sink lock").push(event);
    }
}

pub struct TestHarness {
    pub server: Arc<AuthorizationServer>,
    pub database: Database,
    pub users: Arc<MemoryUserStore>,
    pub sessions: Arc<MemorySessionStore>,
    pub events: Arc<RecordingSink>,
    pub config: Arc<ServerConfig>,
}

/// Standard harness: in-memory database, `read`/`write` scopes registered,
/// `read` as the default scope.
pub async fn harness() -> TestHarness {
    harness_with(|_| {}).await
}

/// Harness with a config hook applied before construction
pub async fn harness_with(mutate: impl FnOnce(&mut ServerConfig)) -> TestHarness {
    init_test_logging();

    let mut config = ServerConfig::default();
    config.database_url = "sqlite::memory:".to_owned();
    config.default_scopes = vec!["read".to_owned()];
    mutate(&mut config);
    let config = Arc::new(config);

    let database = Database::new(&config.database_url)
        .await
        .expect("in-memory database");

    let registry = Arc::new(ScopeRegistry::default());
    registry.define([
        ("read".to_owned(), "Read your data".to_owned()),
        ("write".to_owned(), "Modify your data".to_owned()),
    ]);

    let users = Arc::new(MemoryUserStore::new());
    let sessions = Arc::new(MemorySessionStore::new());
    let events = Arc::new(RecordingSink::default());

    let server = Arc::new(AuthorizationServer::new(
        database.clone(),
        config.clone(),
        registry,
        sessions.clone(),
        users.clone(),
        events.clone(),
    ));

    TestHarness {
        server,
        database,
        users,
        sessions,
        events,
        config,
    }
}

impl TestHarness {
    /// Seed a user and return the session reference for it
    pub fn seed_user(&self, id: &str) -> UserRef {
        self.users.insert(
            id,
            json!({"id": id, "email": format!("{id}@example.test")}),
        );
        UserRef::Text(id.to_owned())
    }

    /// Register a confidential client for the code + refresh flows
    pub async fn confidential_client(&self, redirect_uris: &[&str]) -> (Client, String) {
        let (client, secret) = self
            .server
            .client_manager()
            .create(CreateClientInput {
                name: "Test Confidential".to_owned(),
                redirect_uris: redirect_uris.iter().map(|u| (*u).to_owned()).collect(),
                scopes: None,
                grant_types: None,
                confidential: true,
                first_party: false,
            })
            .await
            .expect("create client");
        (client, secret.expect("confidential clients get a secret"))
    }

    /// Register a public (PKCE) client
    pub async fn public_client(&self, redirect_uris: &[&str]) -> Client {
        let (client, secret) = self
            .server
            .client_manager()
            .create(CreateClientInput {
                name: "Test Public".to_owned(),
                redirect_uris: redirect_uris.iter().map(|u| (*u).to_owned()).collect(),
                scopes: None,
                grant_types: None,
                confidential: false,
                first_party: false,
            })
            .await
            .expect("create client");
        assert!(secret.is_none());
        client
    }

    /// Register a machine client permitted the client_credentials grant
    pub async fn machine_client(&self) -> (Client, String) {
        let (client, secret) = self
            .server
            .client_manager()
            .create(CreateClientInput {
                name: "Test Machine".to_owned(),
                redirect_uris: Vec::new(),
                scopes: None,
                grant_types: Some(vec![GrantType::ClientCredentials]),
                confidential: true,
                first_party: false,
            })
            .await
            .expect("create client");
        (client, secret.expect("confidential clients get a secret"))
    }
}

/// PKCE S256 challenge for a verifier
pub fn s256_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Extract a query parameter from a redirect URL
pub fn query_param(redirect_url: &str, name: &str) -> Option<String> {
    let url = url::Url::parse(redirect_url).expect("redirect url parses");
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
