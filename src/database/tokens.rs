// ABOUTME: Token table persistence operations
// ABOUTME: Insert, hash lookup, revocation, bulk revocation, listing, and pruning
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use super::{
    optional_timestamp, string_list_from_json, string_list_to_json, timestamp_from_epoch, Database,
};
use crate::models::Token;

impl Database {
    /// Insert a token row.
    ///
    /// # Errors
    /// Returns an error when the insert fails. UNIQUE violations on the
    /// access or refresh hash are non-recoverable collisions.
    pub async fn insert_token(&self, token: &Token) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO tokens
                (id, user_id, client_id, name, scopes, token, refresh_token,
                 expires_at, refresh_expires_at, last_used_at, revoked_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ",
        )
        .bind(token.id.to_string())
        .bind(&token.user_id)
        .bind(token.client_id.to_string())
        .bind(&token.name)
        .bind(string_list_to_json(&token.scopes)?)
        .bind(&token.token)
        .bind(&token.refresh_token)
        .bind(token.expires_at.timestamp())
        .bind(token.refresh_expires_at.map(|t| t.timestamp()))
        .bind(token.last_used_at.map(|t| t.timestamp()))
        .bind(token.revoked_at.map(|t| t.timestamp()))
        .bind(token.created_at.timestamp())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Look up a token row by access hash.
    ///
    /// # Errors
    /// Returns an error when the query fails or the row cannot be decoded.
    pub async fn get_token_by_access_hash(&self, hash: &str) -> Result<Option<Token>> {
        let row = sqlx::query("SELECT * FROM tokens WHERE token = $1")
            .bind(hash)
            .fetch_optional(self.pool())
            .await?;

        row.map(|r| row_to_token(&r)).transpose()
    }

    /// Look up a token row by refresh hash.
    ///
    /// # Errors
    /// Returns an error when the query fails or the row cannot be decoded.
    pub async fn get_token_by_refresh_hash(&self, hash: &str) -> Result<Option<Token>> {
        let row = sqlx::query("SELECT * FROM tokens WHERE refresh_token = $1")
            .bind(hash)
            .fetch_optional(self.pool())
            .await?;

        row.map(|r| row_to_token(&r)).transpose()
    }

    /// Look up a token row by id.
    ///
    /// # Errors
    /// Returns an error when the query fails or the row cannot be decoded.
    pub async fn get_token(&self, id: Uuid) -> Result<Option<Token>> {
        let row = sqlx::query("SELECT * FROM tokens WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await?;

        row.map(|r| row_to_token(&r)).transpose()
    }

    /// Bump `last_used_at`.
    ///
    /// # Errors
    /// Returns an error when the update fails.
    pub async fn touch_token(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE tokens SET last_used_at = $2 WHERE id = $1")
            .bind(id.to_string())
            .bind(now.timestamp())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Set `revoked_at` on a token that is not already revoked. Idempotent:
    /// the guard keeps the original revocation instant.
    ///
    /// # Errors
    /// Returns an error when the update fails.
    pub async fn set_token_revoked(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE tokens SET revoked_at = $2 WHERE id = $1 AND revoked_at IS NULL")
            .bind(id.to_string())
            .bind(now.timestamp())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Revoke every live token belonging to a user. Returns rows affected.
    ///
    /// # Errors
    /// Returns an error when the update fails.
    pub async fn revoke_tokens_for_user(&self, user_id: &str, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE tokens SET revoked_at = $2 WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .bind(now.timestamp())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    /// Revoke every live token a user holds for one client.
    ///
    /// # Errors
    /// Returns an error when the update fails.
    pub async fn revoke_tokens_for_user_client(
        &self,
        user_id: &str,
        client_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r"
            UPDATE tokens SET revoked_at = $3
            WHERE user_id = $1 AND client_id = $2 AND revoked_at IS NULL
            ",
        )
        .bind(user_id)
        .bind(client_id.to_string())
        .bind(now.timestamp())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    /// List a user's live (non-revoked, access-unexpired) tokens newest-first,
    /// optionally filtered to one client.
    ///
    /// # Errors
    /// Returns an error when the query fails or a row cannot be decoded.
    pub async fn live_tokens_for_user(
        &self,
        user_id: &str,
        client_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Token>> {
        let rows = if let Some(client_id) = client_id {
            sqlx::query(
                r"
                SELECT * FROM tokens
                WHERE user_id = $1 AND client_id = $2
                  AND revoked_at IS NULL AND expires_at > $3
                ORDER BY created_at DESC
                ",
            )
            .bind(user_id)
            .bind(client_id.to_string())
            .bind(now.timestamp())
            .fetch_all(self.pool())
            .await?
        } else {
            sqlx::query(
                r"
                SELECT * FROM tokens
                WHERE user_id = $1 AND revoked_at IS NULL AND expires_at > $2
                ORDER BY created_at DESC
                ",
            )
            .bind(user_id)
            .bind(now.timestamp())
            .fetch_all(self.pool())
            .await?
        };

        rows.iter().map(row_to_token).collect()
    }

    /// Delete dead tokens: access expired with no refresh, refresh expired,
    /// or revoked longer ago than the retention window. Returns rows removed.
    ///
    /// # Errors
    /// Returns an error when the delete fails.
    pub async fn prune_tokens(
        &self,
        now: DateTime<Utc>,
        revoked_before: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r"
            DELETE FROM tokens
            WHERE (expires_at < $1 AND refresh_token IS NULL)
               OR (refresh_expires_at IS NOT NULL AND refresh_expires_at < $1)
               OR (revoked_at IS NOT NULL AND revoked_at < $2)
            ",
        )
        .bind(now.timestamp())
        .bind(revoked_before.timestamp())
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected())
    }
}

fn row_to_token(row: &sqlx::sqlite::SqliteRow) -> Result<Token> {
    let id: String = row.get("id");
    let client_id: String = row.get("client_id");
    let scopes: String = row.get("scopes");

    Ok(Token {
        id: Uuid::parse_str(&id)?,
        user_id: row.get("user_id"),
        client_id: Uuid::parse_str(&client_id)?,
        name: row.get("name"),
        scopes: string_list_from_json(&scopes)?,
        token: row.get("token"),
        refresh_token: row.get("refresh_token"),
        expires_at: timestamp_from_epoch(row.get("expires_at"))?,
        refresh_expires_at: optional_timestamp(row.get("refresh_expires_at"))?,
        last_used_at: optional_timestamp(row.get("last_used_at"))?,
        revoked_at: optional_timestamp(row.get("revoked_at"))?,
        created_at: timestamp_from_epoch(row.get("created_at"))?,
    })
}
