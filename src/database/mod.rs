// ABOUTME: Core database handle with idempotent schema migration
// ABOUTME: Owns the clients, tokens, and auth_codes tables used by the protocol
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

pub mod auth_codes;
pub mod clients;
pub mod tokens;

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite, SqlitePool};

/// Thin persistence layer over a connection pool. Stores rows; does not
/// interpret semantic validity (expiry, revocation) — that belongs to the
/// credential lifecycle layer.
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Create a new database connection and run migrations.
    ///
    /// # Errors
    /// Returns an error when the URL is invalid, the connection fails, or
    /// a migration statement fails.
    pub async fn new(database_url: &str) -> Result<Self> {
        // Ensure SQLite creates the database file if it doesn't exist
        let connection_options = if database_url.starts_with("sqlite:") {
            format!("{database_url}?mode=rwc")
        } else {
            database_url.to_owned()
        };

        // An in-memory database exists per connection; the pool must stay
        // on a single connection or later checkouts see an empty schema.
        let pool = if connection_options.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect(&connection_options)
                .await?
        } else {
            SqlitePool::connect(&connection_options).await?
        };
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get a reference to the pool for advanced operations and tests
    #[must_use]
    pub const fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Run all migrations. Every statement is `CREATE ... IF NOT EXISTS`,
    /// so repeated invocation is a no-op.
    ///
    /// # Errors
    /// Returns an error when a DDL statement fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS clients (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                secret TEXT,
                redirect_uris TEXT NOT NULL,
                scopes TEXT,
                grant_types TEXT NOT NULL,
                confidential BOOLEAN NOT NULL DEFAULT 1,
                first_party BOOLEAN NOT NULL DEFAULT 0,
                revoked BOOLEAN NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS tokens (
                id TEXT PRIMARY KEY,
                user_id TEXT,
                client_id TEXT NOT NULL REFERENCES clients(id) ON DELETE CASCADE,
                name TEXT,
                scopes TEXT NOT NULL,
                token TEXT UNIQUE NOT NULL,
                refresh_token TEXT UNIQUE,
                expires_at INTEGER NOT NULL,
                refresh_expires_at INTEGER,
                last_used_at INTEGER,
                revoked_at INTEGER,
                created_at INTEGER NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS auth_codes (
                id TEXT PRIMARY KEY,
                client_id TEXT NOT NULL REFERENCES clients(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL,
                code TEXT UNIQUE NOT NULL,
                redirect_uri TEXT NOT NULL,
                scopes TEXT NOT NULL,
                code_challenge TEXT,
                code_challenge_method TEXT,
                expires_at INTEGER NOT NULL,
                used_at INTEGER,
                created_at INTEGER NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tokens_user_id ON tokens(user_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tokens_client_id ON tokens(client_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_auth_codes_client_id ON auth_codes(client_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Decode an epoch-seconds column into a timezone-aware timestamp
pub(crate) fn timestamp_from_epoch(seconds: i64) -> Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| anyhow::anyhow!("Invalid timestamp: {seconds}"))
}

/// Decode a nullable epoch-seconds column
pub(crate) fn optional_timestamp(
    seconds: Option<i64>,
) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
    seconds.map(timestamp_from_epoch).transpose()
}

/// Decode a JSON TEXT column holding an array of strings
pub(crate) fn string_list_from_json(raw: &str) -> Result<Vec<String>> {
    Ok(serde_json::from_str(raw)?)
}

/// Encode an array of strings into a JSON TEXT column
pub(crate) fn string_list_to_json(list: &[String]) -> Result<String> {
    Ok(serde_json::to_string(list)?)
}
