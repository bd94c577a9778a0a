// ABOUTME: Client lifecycle management over the persistence store
// ABOUTME: Creation with one-time secret, lookup, secret verification, revocation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::secrets::{generate_secret, hash_secret, verify_secret};
use crate::constants::credentials::CLIENT_SECRET_BYTES;
use crate::database::Database;
use crate::errors::AppResult;
use crate::models::{Client, GrantType};

/// Input for client creation. Unset fields take the registration defaults:
/// confidential, not first-party, authorization_code + refresh_token grants.
#[derive(Debug, Clone)]
pub struct CreateClientInput {
    pub name: String,
    pub redirect_uris: Vec<String>,
    pub scopes: Option<Vec<String>>,
    pub grant_types: Option<Vec<GrantType>>,
    pub confidential: bool,
    pub first_party: bool,
}

impl CreateClientInput {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            redirect_uris: Vec::new(),
            scopes: None,
            grant_types: None,
            confidential: true,
            first_party: false,
        }
    }
}

/// Client lifecycle operations
#[derive(Clone)]
pub struct ClientManager {
    database: Database,
}

impl ClientManager {
    #[must_use]
    pub const fn new(database: Database) -> Self {
        Self { database }
    }

    /// Create a client. Confidential clients receive a 32-byte random
    /// secret whose plaintext is returned exactly once; only the SHA-256
    /// hash is stored.
    ///
    /// # Errors
    /// Returns an error when secret generation or the insert fails.
    pub async fn create(&self, input: CreateClientInput) -> AppResult<(Client, Option<String>)> {
        let plain_secret = if input.confidential {
            Some(generate_secret(CLIENT_SECRET_BYTES)?)
        } else {
            None
        };

        let now = Utc::now();
        let client = Client {
            id: Uuid::new_v4(),
            name: input.name,
            secret: plain_secret.as_deref().map(hash_secret),
            redirect_uris: input.redirect_uris,
            scopes: input.scopes,
            grant_types: input
                .grant_types
                .unwrap_or_else(|| vec![GrantType::AuthorizationCode, GrantType::RefreshToken]),
            confidential: input.confidential,
            first_party: input.first_party,
            revoked: false,
            created_at: now,
            updated_at: now,
        };

        self.database.insert_client(&client).await?;
        info!(client_id = %client.id, name = %client.name, "registered client");

        Ok((client, plain_secret))
    }

    /// Look up a client regardless of revoked status; callers check
    /// `revoked` themselves.
    ///
    /// # Errors
    /// Returns an error when the lookup fails.
    pub async fn find(&self, id: Uuid) -> AppResult<Option<Client>> {
        self.database.get_client(id).await
    }

    /// List clients, newest-first.
    ///
    /// # Errors
    /// Returns an error when the query fails.
    pub async fn list(&self, include_revoked: bool) -> AppResult<Vec<Client>> {
        self.database.list_clients(include_revoked).await
    }

    /// Verify a plaintext secret against the stored hash in constant time.
    /// False when the client has no stored secret.
    #[must_use]
    pub fn verify_secret(client: &Client, plain: &str) -> bool {
        client
            .secret
            .as_deref()
            .is_some_and(|stored| verify_secret(plain, stored))
    }

    /// Soft-revoke a client. Idempotent.
    ///
    /// # Errors
    /// Returns an error when the update fails.
    pub async fn revoke(&self, id: Uuid) -> AppResult<()> {
        self.database.set_client_revoked(id, Utc::now()).await?;
        info!(client_id = %id, "revoked client");
        Ok(())
    }

    /// Hard-delete a client with its codes and tokens. Tooling and tests
    /// only; the protocol never destroys clients.
    ///
    /// # Errors
    /// Returns an error when a delete fails.
    pub async fn destroy(&self, id: Uuid) -> AppResult<()> {
        self.database.delete_client(id).await
    }
}
