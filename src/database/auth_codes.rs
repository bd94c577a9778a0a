// ABOUTME: Authorization code table persistence operations
// ABOUTME: Insert, hash lookup, atomic mark-used, and pruning of auth codes
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
use crate::models::{AuthCode, PkceMethod};

impl Database {
    /// Insert an authorization code row.
    ///
    /// # Errors
    /// Returns an error when the insert fails. A UNIQUE violation on the
    /// code hash is a non-recoverable collision (negligible for 40 random
    /// bytes) and surfaces as-is.
    pub async fn insert_auth_code(&self, code: &AuthCode) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO auth_codes
                (id, client_id, user_id, code, redirect_uri, scopes,
                 code_challenge, code_challenge_method, expires_at, used_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ",
        )
        .bind(code.id.to_string())
        .bind(code.client_id.to_string())
        .bind(&code.user_id)
        .bind(&code.code)
        .bind(&code.redirect_uri)
        .bind(string_list_to_json(&code.scopes)?)
        .bind(&code.code_challenge)
        .bind(code.code_challenge_method.map(|m| m.as_str().to_owned()))
        .bind(code.expires_at.timestamp())
        .bind(code.used_at.map(|t| t.timestamp()))
        .bind(code.created_at.timestamp())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Look up a code row by its hash, scoped to the issuing client.
    ///
    /// # Errors
    /// Returns an error when the query fails or the row cannot be decoded.
    pub async fn get_auth_code_by_hash(
        &self,
        code_hash: &str,
        client_id: Uuid,
    ) -> Result<Option<AuthCode>> {
        let row = sqlx::query("SELECT * FROM auth_codes WHERE code = $1 AND client_id = $2")
            .bind(code_hash)
            .bind(client_id.to_string())
            .fetch_optional(self.pool())
            .await?;

        row.map(|r| row_to_auth_code(&r)).transpose()
    }

    /// Conditionally mark a code used. The `used_at IS NULL` guard makes
    /// this the single-use enforcement point: of two racing exchanges,
    /// exactly one observes a row change.
    ///
    /// Returns whether this call won the update.
    ///
    /// # Errors
    /// Returns an error when the update fails.
    pub async fn mark_auth_code_used(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let result =
            sqlx::query("UPDATE auth_codes SET used_at = $2 WHERE id = $1 AND used_at IS NULL")
                .bind(id.to_string())
                .bind(now.timestamp())
                .execute(self.pool())
                .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete used and expired codes. Returns the number of rows removed.
    ///
    /// # Errors
    /// Returns an error when the delete fails.
    pub async fn prune_auth_codes(&self, now: DateTime<Utc>) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM auth_codes WHERE used_at IS NOT NULL OR expires_at < $1")
                .bind(now.timestamp())
                .execute(self.pool())
                .await?;

        Ok(result.rows_affected())
    }
}

fn row_to_auth_code(row: &sqlx::sqlite::SqliteRow) -> Result<AuthCode> {
    let id: String = row.get("id");
    let client_id: String = row.get("client_id");
    let scopes: String = row.get("scopes");
    let method: Option<String> = row.get("code_challenge_method");

    Ok(AuthCode {
        id: Uuid::parse_str(&id)?,
        client_id: Uuid::parse_str(&client_id)?,
        user_id: row.get("user_id"),
        code: row.get("code"),
        redirect_uri: row.get("redirect_uri"),
        scopes: string_list_from_json(&scopes)?,
        code_challenge: row.get("code_challenge"),
        code_challenge_method: method.as_deref().and_then(PkceMethod::parse),
        expires_at: timestamp_from_epoch(row.get("expires_at"))?,
        used_at: optional_timestamp(row.get("used_at"))?,
        created_at: timestamp_from_epoch(row.get("created_at"))?,
    })
}
