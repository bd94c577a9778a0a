// ABOUTME: Token lifecycle: issuance, validation, revocation, rotation support, pruning
// ABOUTME: Access/refresh pairs stored as SHA-256 hashes with fire-and-forget usage tracking
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use chrono::{Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use super::secrets::{generate_secret, hash_secret};
use crate::constants::credentials::TOKEN_SECRET_BYTES;
use crate::database::Database;
use crate::errors::AppResult;
use crate::models::Token;

/// Parameters for token issuance
#[derive(Debug, Clone)]
pub struct TokenParams {
    /// None for client_credentials grants
    pub user_id: Option<String>,
    pub client_id: Uuid,
    /// Personal access tokens only
    pub name: Option<String>,
    pub scopes: Vec<String>,
    /// Request a refresh token. Honored only when `user_id` is present.
    pub with_refresh: bool,
}

/// Token lifecycle configuration
#[derive(Debug, Clone)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
    pub personal_access: Duration,
}

/// Token lifecycle operations
#[derive(Clone)]
pub struct TokenManager {
    database: Database,
    lifetimes: TokenLifetimes,
    /// First-party client backing personal access tokens
    personal_access_client: Option<Uuid>,
}

impl TokenManager {
    #[must_use]
    pub const fn new(
        database: Database,
        lifetimes: TokenLifetimes,
        personal_access_client: Option<Uuid>,
    ) -> Self {
        Self {
            database,
            lifetimes,
            personal_access_client,
        }
    }

    /// Issue a token. The access secret (and refresh secret, when issued)
    /// are returned in plaintext exactly once; the row stores hashes only.
    /// A refresh token is issued only when requested and a user is bound.
    ///
    /// # Errors
    /// Returns an error when secret generation or the insert fails.
    pub async fn create(
        &self,
        params: TokenParams,
    ) -> AppResult<(String, Option<String>, Token)> {
        self.issue(params, self.lifetimes.access).await
    }

    /// Issue a personal access token against the configured first-party
    /// client: year-scale lifetime, no refresh token.
    ///
    /// # Errors
    /// Returns an error when no personal access client is configured, or
    /// issuance fails.
    pub async fn create_personal(
        &self,
        user_id: String,
        name: String,
        scopes: Vec<String>,
    ) -> AppResult<(String, Token)> {
        let client_id = self
            .personal_access_client
            .ok_or_else(|| anyhow::anyhow!("no personal access client is configured"))?;

        let (plain, _, token) = self
            .issue(
                TokenParams {
                    user_id: Some(user_id),
                    client_id,
                    name: Some(name),
                    scopes,
                    with_refresh: false,
                },
                self.lifetimes.personal_access,
            )
            .await?;

        Ok((plain, token))
    }

    async fn issue(
        &self,
        params: TokenParams,
        access_lifetime: Duration,
    ) -> AppResult<(String, Option<String>, Token)> {
        let plain_access = generate_secret(TOKEN_SECRET_BYTES)?;
        let issue_refresh = params.with_refresh && params.user_id.is_some();
        let plain_refresh = if issue_refresh {
            Some(generate_secret(TOKEN_SECRET_BYTES)?)
        } else {
            None
        };

        let now = Utc::now();
        let token = Token {
            id: Uuid::new_v4(),
            user_id: params.user_id,
            client_id: params.client_id,
            name: params.name,
            scopes: params.scopes,
            token: hash_secret(&plain_access),
            refresh_token: plain_refresh.as_deref().map(hash_secret),
            expires_at: now + access_lifetime,
            refresh_expires_at: issue_refresh.then(|| now + self.lifetimes.refresh),
            last_used_at: None,
            revoked_at: None,
            created_at: now,
        };

        self.database.insert_token(&token).await?;
        info!(
            token_id = %token.id,
            client_id = %token.client_id,
            refresh = issue_refresh,
            "issued token"
        );

        Ok((plain_access, plain_refresh, token))
    }

    /// Validate an access token: reject revoked and expired rows. On
    /// success the `last_used_at` bump is spawned fire-and-forget so it
    /// never delays the response; its failure is logged and swallowed.
    ///
    /// # Errors
    /// Returns an error when the lookup fails.
    pub async fn validate(&self, plain_access: &str) -> AppResult<Option<Token>> {
        let Some(token) = self
            .database
            .get_token_by_access_hash(&hash_secret(plain_access))
            .await?
        else {
            return Ok(None);
        };

        let now = Utc::now();
        if token.is_revoked() || token.access_expired(now) {
            return Ok(None);
        }

        let database = self.database.clone();
        let token_id = token.id;
        tokio::spawn(async move {
            if let Err(e) = database.touch_token(token_id, now).await {
                debug!(token_id = %token_id, "last_used_at update failed: {e:#}");
            }
        });

        Ok(Some(token))
    }

    /// Validate a refresh token: reject revoked rows and expired refresh
    /// windows.
    ///
    /// # Errors
    /// Returns an error when the lookup fails.
    pub async fn validate_refresh(&self, plain_refresh: &str) -> AppResult<Option<Token>> {
        let Some(token) = self
            .database
            .get_token_by_refresh_hash(&hash_secret(plain_refresh))
            .await?
        else {
            return Ok(None);
        };

        if token.is_revoked() || token.refresh_expired(Utc::now()) {
            return Ok(None);
        }

        Ok(Some(token))
    }

    /// Soft-revoke a token. Idempotent; the first revocation instant wins.
    ///
    /// # Errors
    /// Returns an error when the update fails.
    pub async fn revoke(&self, id: Uuid) -> AppResult<()> {
        self.database.set_token_revoked(id, Utc::now()).await?;
        info!(token_id = %id, "revoked token");
        Ok(())
    }

    /// Revoke every live token belonging to a user.
    ///
    /// # Errors
    /// Returns an error when the update fails.
    pub async fn revoke_all_for_user(&self, user_id: &str) -> AppResult<u64> {
        self.database
            .revoke_tokens_for_user(user_id, Utc::now())
            .await
    }

    /// Revoke every live token a user holds for one client.
    ///
    /// # Errors
    /// Returns an error when the update fails.
    pub async fn revoke_all_for_client(&self, user_id: &str, client_id: Uuid) -> AppResult<u64> {
        self.database
            .revoke_tokens_for_user_client(user_id, client_id, Utc::now())
            .await
    }

    /// List a user's live tokens newest-first.
    ///
    /// # Errors
    /// Returns an error when the query fails.
    pub async fn all_for_user(&self, user_id: &str) -> AppResult<Vec<Token>> {
        self.database
            .live_tokens_for_user(user_id, None, Utc::now())
            .await
    }

    /// List a user's live personal access tokens. Empty when no personal
    /// access client is configured.
    ///
    /// # Errors
    /// Returns an error when the query fails.
    pub async fn personal_tokens_for(&self, user_id: &str) -> AppResult<Vec<Token>> {
        let Some(client_id) = self.personal_access_client else {
            return Ok(Vec::new());
        };
        self.database
            .live_tokens_for_user(user_id, Some(client_id), Utc::now())
            .await
    }

    /// Look up a token row by id.
    ///
    /// # Errors
    /// Returns an error when the lookup fails.
    pub async fn find(&self, id: Uuid) -> AppResult<Option<Token>> {
        self.database.get_token(id).await
    }

    /// Delete dead tokens; revoked rows are retained for
    /// `revoked_older_than_days` before removal. Returns the count removed.
    ///
    /// # Errors
    /// Returns an error when the delete fails.
    pub async fn prune(&self, revoked_older_than_days: i64) -> AppResult<u64> {
        let now = Utc::now();
        let revoked_before = now - Duration::days(revoked_older_than_days);
        self.database.prune_tokens(now, revoked_before).await
    }
}
