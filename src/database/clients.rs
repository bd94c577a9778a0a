// ABOUTME: Client table persistence operations
// ABOUTME: Insert, lookup, soft-revoke, and cascading hard-delete of clients
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use super::{string_list_from_json, string_list_to_json, timestamp_from_epoch, Database};
use crate::models::{Client, GrantType};

impl Database {
    /// Insert a client row.
    ///
    /// # Errors
    /// Returns an error when the insert fails.
    pub async fn insert_client(&self, client: &Client) -> Result<()> {
        let grant_types: Vec<String> = client
            .grant_types
            .iter()
            .map(|g| g.as_str().to_owned())
            .collect();

        sqlx::query(
            r"
            INSERT INTO clients
                (id, name, secret, redirect_uris, scopes, grant_types,
                 confidential, first_party, revoked, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ",
        )
        .bind(client.id.to_string())
        .bind(&client.name)
        .bind(&client.secret)
        .bind(string_list_to_json(&client.redirect_uris)?)
        .bind(
            client
                .scopes
                .as_ref()
                .map(|s| string_list_to_json(s))
                .transpose()?,
        )
        .bind(string_list_to_json(&grant_types)?)
        .bind(client.confidential)
        .bind(client.first_party)
        .bind(client.revoked)
        .bind(client.created_at.timestamp())
        .bind(client.updated_at.timestamp())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Look up a client by id. Revoked rows are returned; callers check
    /// `revoked` themselves.
    ///
    /// # Errors
    /// Returns an error when the query fails or a row cannot be decoded.
    pub async fn get_client(&self, id: Uuid) -> Result<Option<Client>> {
        let row = sqlx::query("SELECT * FROM clients WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await?;

        row.map(|r| row_to_client(&r)).transpose()
    }

    /// List clients, optionally filtered to non-revoked rows, newest-first.
    ///
    /// # Errors
    /// Returns an error when the query fails or a row cannot be decoded.
    pub async fn list_clients(&self, include_revoked: bool) -> Result<Vec<Client>> {
        let query = if include_revoked {
            "SELECT * FROM clients ORDER BY created_at DESC"
        } else {
            "SELECT * FROM clients WHERE revoked = 0 ORDER BY created_at DESC"
        };

        let rows = sqlx::query(query).fetch_all(self.pool()).await?;
        rows.iter().map(row_to_client).collect()
    }

    /// Soft-revoke a client. Idempotent; bumps `updated_at` on every call.
    ///
    /// # Errors
    /// Returns an error when the update fails.
    pub async fn set_client_revoked(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE clients SET revoked = 1, updated_at = $2 WHERE id = $1")
            .bind(id.to_string())
            .bind(now.timestamp())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Hard-delete a client and everything issued to it, children first.
    ///
    /// # Errors
    /// Returns an error when a delete fails.
    pub async fn delete_client(&self, id: Uuid) -> Result<()> {
        let id = id.to_string();
        sqlx::query("DELETE FROM auth_codes WHERE client_id = $1")
            .bind(&id)
            .execute(self.pool())
            .await?;
        sqlx::query("DELETE FROM tokens WHERE client_id = $1")
            .bind(&id)
            .execute(self.pool())
            .await?;
        sqlx::query("DELETE FROM clients WHERE id = $1")
            .bind(&id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}

fn row_to_client(row: &sqlx::sqlite::SqliteRow) -> Result<Client> {
    let id: String = row.get("id");
    let redirect_uris: String = row.get("redirect_uris");
    let scopes: Option<String> = row.get("scopes");
    let grant_types_raw: String = row.get("grant_types");

    let grant_types = string_list_from_json(&grant_types_raw)?
        .into_iter()
        .filter_map(|name| GrantType::parse(&name))
        .collect();

    Ok(Client {
        id: Uuid::parse_str(&id)?,
        name: row.get("name"),
        secret: row.get("secret"),
        redirect_uris: string_list_from_json(&redirect_uris)?,
        scopes: scopes.as_deref().map(string_list_from_json).transpose()?,
        grant_types,
        confidential: row.get("confidential"),
        first_party: row.get("first_party"),
        revoked: row.get("revoked"),
        created_at: timestamp_from_epoch(row.get("created_at"))?,
        updated_at: timestamp_from_epoch(row.get("updated_at"))?,
    })
}
