// ABOUTME: Environment-based server configuration with named settings and defaults
// ABOUTME: Token lifetimes, route prefix, scope registrations, and rate limits
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::Duration;
use uuid::Uuid;

use crate::constants::defaults;

/// Per-endpoint rate limit settings (fixed window)
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub authorize_max: u32,
    pub token_max: u32,
    pub window_secs: u64,
    /// Map size past which stale per-IP entries are swept
    pub cleanup_threshold: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            authorize_max: defaults::RATE_LIMIT_AUTHORIZE_MAX,
            token_max: defaults::RATE_LIMIT_TOKEN_MAX,
            window_secs: defaults::RATE_LIMIT_WINDOW_SECS,
            cleanup_threshold: 10_000,
        }
    }
}

/// Server configuration, loaded from the environment with defaults for
/// every setting. Lifetimes are minutes in the environment and surfaced
/// as `chrono::Duration` here.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub access_token_lifetime: Duration,
    pub refresh_token_lifetime: Duration,
    pub auth_code_lifetime: Duration,
    pub personal_access_token_lifetime: Duration,
    /// Path prefix shared by every protocol route
    pub route_prefix: String,
    /// Scope name -> description registrations applied at boot
    pub scopes: BTreeMap<String, String>,
    /// Substituted when a request carries no scope parameter
    pub default_scopes: Vec<String>,
    /// First-party client backing personal access tokens, once configured
    pub personal_access_client: Option<Uuid>,
    pub rate_limit: RateLimitConfig,
    pub prune_revoked_after_days: i64,
    pub database_url: String,
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            access_token_lifetime: Duration::minutes(defaults::ACCESS_TOKEN_LIFETIME_MINS),
            refresh_token_lifetime: Duration::minutes(defaults::REFRESH_TOKEN_LIFETIME_MINS),
            auth_code_lifetime: Duration::minutes(defaults::AUTH_CODE_LIFETIME_MINS),
            personal_access_token_lifetime: Duration::minutes(
                defaults::PERSONAL_ACCESS_TOKEN_LIFETIME_MINS,
            ),
            route_prefix: defaults::ROUTE_PREFIX.to_owned(),
            scopes: BTreeMap::new(),
            default_scopes: Vec::new(),
            personal_access_client: None,
            rate_limit: RateLimitConfig::default(),
            prune_revoked_after_days: defaults::PRUNE_REVOKED_AFTER_DAYS,
            database_url: defaults::DATABASE_URL.to_owned(),
            http_port: defaults::HTTP_PORT,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to
    /// protocol defaults for anything unset.
    ///
    /// # Errors
    /// Returns an error when a set variable fails to parse.
    pub fn from_env() -> Result<Self> {
        let base = Self::default();

        Ok(Self {
            access_token_lifetime: minutes_var(
                "ACCESS_TOKEN_LIFETIME_MINS",
                defaults::ACCESS_TOKEN_LIFETIME_MINS,
            )?,
            refresh_token_lifetime: minutes_var(
                "REFRESH_TOKEN_LIFETIME_MINS",
                defaults::REFRESH_TOKEN_LIFETIME_MINS,
            )?,
            auth_code_lifetime: minutes_var(
                "AUTH_CODE_LIFETIME_MINS",
                defaults::AUTH_CODE_LIFETIME_MINS,
            )?,
            personal_access_token_lifetime: minutes_var(
                "PERSONAL_ACCESS_TOKEN_LIFETIME_MINS",
                defaults::PERSONAL_ACCESS_TOKEN_LIFETIME_MINS,
            )?,
            route_prefix: env::var("OAUTH_ROUTE_PREFIX")
                .unwrap_or_else(|_| defaults::ROUTE_PREFIX.to_owned()),
            scopes: parse_scope_registrations(
                &env::var("OAUTH_SCOPES").unwrap_or_default(),
            ),
            default_scopes: env::var("OAUTH_DEFAULT_SCOPES")
                .unwrap_or_default()
                .split_whitespace()
                .map(str::to_owned)
                .collect(),
            personal_access_client: match env::var("PERSONAL_ACCESS_CLIENT_ID") {
                Ok(raw) => Some(
                    Uuid::from_str(&raw)
                        .context("PERSONAL_ACCESS_CLIENT_ID is not a valid UUID")?,
                ),
                Err(_) => None,
            },
            rate_limit: RateLimitConfig {
                authorize_max: parsed_var(
                    "RATE_LIMIT_AUTHORIZE_MAX",
                    defaults::RATE_LIMIT_AUTHORIZE_MAX,
                )?,
                token_max: parsed_var("RATE_LIMIT_TOKEN_MAX", defaults::RATE_LIMIT_TOKEN_MAX)?,
                window_secs: parsed_var(
                    "RATE_LIMIT_WINDOW_SECS",
                    defaults::RATE_LIMIT_WINDOW_SECS,
                )?,
                cleanup_threshold: base.rate_limit.cleanup_threshold,
            },
            prune_revoked_after_days: parsed_var(
                "PRUNE_REVOKED_AFTER_DAYS",
                defaults::PRUNE_REVOKED_AFTER_DAYS,
            )?,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| defaults::DATABASE_URL.to_owned()),
            http_port: parsed_var("HTTP_PORT", defaults::HTTP_PORT)?,
        })
    }

    /// Route prefix stripped to the single path segment warp mounts under
    #[must_use]
    pub fn prefix_segment(&self) -> String {
        self.route_prefix.trim_matches('/').to_owned()
    }
}

fn minutes_var(name: &str, default_mins: i64) -> Result<Duration> {
    Ok(Duration::minutes(parsed_var(name, default_mins)?))
}

fn parsed_var<T: FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("invalid value for {name}")),
        Err(_) => Ok(default),
    }
}

/// Parse `name=description,name2=description2` scope registrations.
/// Entries without a `=` register the name as its own description.
fn parse_scope_registrations(raw: &str) -> BTreeMap<String, String> {
    raw.split(',')
        .filter_map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() {
                return None;
            }
            match entry.split_once('=') {
                Some((name, description)) => {
                    Some((name.trim().to_owned(), description.trim().to_owned()))
                }
                None => Some((entry.to_owned(), entry.to_owned())),
            }
        })
        .collect()
}
