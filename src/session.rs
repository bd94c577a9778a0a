// ABOUTME: Session storage seam for the consent step
// ABOUTME: Host-pluggable get/put/forget store plus the pending-authorization payload
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::AppResult;
use crate::models::PkceMethod;

/// The validated authorization request parked between GET /authorize and
/// the consent resolution at POST /authorize. Small and bounded: six
/// fields, all strings or simple enums.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub client_id: Uuid,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<PkceMethod>,
}

/// Key/value session storage keyed by an opaque session id. The host owns
/// session identity (cookies, CSRF); the protocol engine only reads and
/// writes values under its own keys.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str, key: &str) -> AppResult<Option<Value>>;
    async fn put(&self, session_id: &str, key: &str, value: Value) -> AppResult<()>;
    async fn forget(&self, session_id: &str, key: &str) -> AppResult<()>;
}

/// In-memory session store for tests and single-node deployments
#[derive(Default)]
pub struct MemorySessionStore {
    entries: DashMap<(String, String), Value>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, session_id: &str, key: &str) -> AppResult<Option<Value>> {
        Ok(self
            .entries
            .get(&(session_id.to_owned(), key.to_owned()))
            .map(|entry| entry.value().clone()))
    }

    async fn put(&self, session_id: &str, key: &str, value: Value) -> AppResult<()> {
        self.entries
            .insert((session_id.to_owned(), key.to_owned()), value);
        Ok(())
    }

    async fn forget(&self, session_id: &str, key: &str) -> AppResult<()> {
        self.entries
            .remove(&(session_id.to_owned(), key.to_owned()));
        Ok(())
    }
}
