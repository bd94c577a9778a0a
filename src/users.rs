// ABOUTME: User subsystem seam consumed by the protocol engine and bearer guard
// ABOUTME: Opaque user lookups plus the string/number/object identifier adapter
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::errors::{AppResult, ProtocolError};
use crate::models::Client;

/// An authenticated user reference as supplied by the host session: a bare
/// string id, a numeric id, or an object carrying an `id` field.
#[derive(Debug, Clone, PartialEq)]
pub enum UserRef {
    Text(String),
    Number(i64),
    Object(Value),
}

impl UserRef {
    /// Adapt a session value into a user reference. Returns None for
    /// shapes that cannot carry an identifier (null, arrays, booleans).
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Number(n) => n.as_i64().map(Self::Number),
            Value::Object(_) => Some(Self::Object(value.clone())),
            _ => None,
        }
    }

    /// Resolve the stable identifier. Objects must carry an `id` that is a
    /// string or integer; anything else is a host configuration error.
    ///
    /// # Errors
    /// Returns `server_error` for unusable shapes.
    pub fn id(&self) -> Result<String, ProtocolError> {
        match self {
            Self::Text(s) => Ok(s.clone()),
            Self::Number(n) => Ok(n.to_string()),
            Self::Object(value) => match value.get("id") {
                Some(Value::String(s)) => Ok(s.clone()),
                Some(Value::Number(n)) => Ok(n.to_string()),
                _ => Err(ProtocolError::ServerError(
                    "authenticated user object carries no usable id".to_owned(),
                )),
            },
        }
    }
}

/// The user-account subsystem, consumed through a small interface. The
/// user payload itself is opaque JSON owned by the host.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up a user by stable identifier
    async fn find_by_id(&self, id: &str) -> AppResult<Option<Value>>;

    /// The stable identifier of a user payload
    fn identifier_of(&self, user: &Value) -> Option<String>;

    /// Optional consent renderer: return a pre-built consent page for the
    /// client and described scopes, or None to fall back to the JSON
    /// consent payload.
    fn render_consent(&self, _client: &Client, _scopes: &[(String, String)]) -> Option<String> {
        None
    }
}

/// In-memory user store for tests and single-node deployments
#[derive(Default)]
pub struct MemoryUserStore {
    users: DashMap<String, Value>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: impl Into<String>, user: Value) {
        self.users.insert(id.into(), user);
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: &str) -> AppResult<Option<Value>> {
        Ok(self.users.get(id).map(|entry| entry.value().clone()))
    }

    fn identifier_of(&self, user: &Value) -> Option<String> {
        UserRef::from_value(user).and_then(|r| r.id().ok())
    }
}
