// ABOUTME: Authorization code lifecycle with PKCE verification
// ABOUTME: Issues single-use codes and consumes them atomically at token exchange
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};
use uuid::Uuid;

use super::secrets::{generate_secret, hash_secret};
use crate::constants::credentials::TOKEN_SECRET_BYTES;
use crate::database::Database;
use crate::errors::AppResult;
use crate::models::{AuthCode, PkceMethod};

/// Parameters for authorization code issuance
#[derive(Debug, Clone)]
pub struct AuthCodeParams {
    pub client_id: Uuid,
    pub user_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<PkceMethod>,
}

/// Authorization code lifecycle operations
#[derive(Clone)]
pub struct AuthCodeManager {
    database: Database,
    lifetime: Duration,
}

impl AuthCodeManager {
    #[must_use]
    pub const fn new(database: Database, lifetime: Duration) -> Self {
        Self { database, lifetime }
    }

    /// Issue a code: 40 random bytes whose plaintext goes into the redirect
    /// exactly once; the row stores the SHA-256 hash.
    ///
    /// # Errors
    /// Returns an error when secret generation or the insert fails.
    pub async fn create(&self, params: AuthCodeParams) -> AppResult<(String, AuthCode)> {
        let plain = generate_secret(TOKEN_SECRET_BYTES)?;
        let now = Utc::now();

        let code = AuthCode {
            id: Uuid::new_v4(),
            client_id: params.client_id,
            user_id: params.user_id,
            code: hash_secret(&plain),
            redirect_uri: params.redirect_uri,
            scopes: params.scopes,
            code_challenge: params.code_challenge,
            code_challenge_method: params.code_challenge_method,
            expires_at: now + self.lifetime,
            used_at: None,
            created_at: now,
        };

        self.database.insert_auth_code(&code).await?;
        debug!(client_id = %code.client_id, "issued authorization code");

        Ok((plain, code))
    }

    /// Validate and consume a code at token exchange. Returns None — with
    /// no side effects — when the code is absent, replayed, expired, bound
    /// to a different redirect URI, or fails PKCE. On success the row is
    /// marked used through a conditional update, so of two racing
    /// exchanges exactly one wins.
    ///
    /// # Errors
    /// Returns an error when a storage operation fails.
    pub async fn consume(
        &self,
        plain: &str,
        client_id: Uuid,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> AppResult<Option<AuthCode>> {
        let now = Utc::now();

        let Some(code) = self
            .database
            .get_auth_code_by_hash(&hash_secret(plain), client_id)
            .await?
        else {
            return Ok(None);
        };

        if code.used_at.is_some() {
            warn!(client_id = %client_id, "authorization code replay detected");
            return Ok(None);
        }
        if code.is_expired(now) {
            return Ok(None);
        }
        if code.redirect_uri != redirect_uri {
            warn!(client_id = %client_id, "authorization code redirect_uri mismatch");
            return Ok(None);
        }
        if !pkce_verifies(&code, code_verifier) {
            return Ok(None);
        }

        // The conditional update is the single-use enforcement point: a
        // lost race behaves exactly like a replay.
        if !self.database.mark_auth_code_used(code.id, now).await? {
            warn!(client_id = %client_id, "authorization code lost consume race");
            return Ok(None);
        }

        Ok(Some(AuthCode {
            used_at: Some(now),
            ..code
        }))
    }

    /// Delete used and expired codes. Returns the count removed.
    ///
    /// # Errors
    /// Returns an error when the delete fails.
    pub async fn prune(&self) -> AppResult<u64> {
        self.database.prune_auth_codes(Utc::now()).await
    }
}

/// PKCE check (RFC 7636). A stored challenge requires a verifier: S256
/// compares BASE64URL(SHA-256(verifier)) against the challenge, plain
/// compares the verifier itself. Both comparisons are constant-time.
fn pkce_verifies(code: &AuthCode, verifier: Option<&str>) -> bool {
    let Some(challenge) = code.code_challenge.as_deref() else {
        return true;
    };

    let Some(verifier) = verifier else {
        debug!(client_id = %code.client_id, "code_verifier required but absent");
        return false;
    };

    let presented = match code.code_challenge_method.unwrap_or(PkceMethod::Plain) {
        PkceMethod::S256 => {
            let mut hasher = Sha256::new();
            hasher.update(verifier.as_bytes());
            general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize())
        }
        PkceMethod::Plain => verifier.to_owned(),
    };

    let matches: bool = presented.as_bytes().ct_eq(challenge.as_bytes()).into();
    if !matches {
        warn!(client_id = %code.client_id, "PKCE verification failed");
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn code_with_challenge(challenge: Option<&str>, method: Option<PkceMethod>) -> AuthCode {
        let now = Utc::now();
        AuthCode {
            id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            user_id: "u1".into(),
            code: "hash".into(),
            redirect_uri: "https://app/cb".into(),
            scopes: vec![],
            code_challenge: challenge.map(str::to_owned),
            code_challenge_method: method,
            expires_at: now + Duration::minutes(10),
            used_at: None,
            created_at: now,
        }
    }

    fn s256_challenge(verifier: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize())
    }

    #[test]
    fn no_challenge_needs_no_verifier() {
        let code = code_with_challenge(None, None);
        assert!(pkce_verifies(&code, None));
        assert!(pkce_verifies(&code, Some("anything")));
    }

    #[test]
    fn s256_matches_only_the_original_verifier() {
        let challenge = s256_challenge("verifier-xyz");
        let code = code_with_challenge(Some(&challenge), Some(PkceMethod::S256));
        assert!(pkce_verifies(&code, Some("verifier-xyz")));
        assert!(!pkce_verifies(&code, Some("verifier-abc")));
        assert!(!pkce_verifies(&code, None));
    }

    #[test]
    fn plain_compares_verifier_directly() {
        let code = code_with_challenge(Some("the-plain-challenge"), Some(PkceMethod::Plain));
        assert!(pkce_verifies(&code, Some("the-plain-challenge")));
        assert!(!pkce_verifies(&code, Some("something-else")));
    }

    #[test]
    fn empty_verifier_with_challenge_is_rejected() {
        let challenge = s256_challenge("verifier-xyz");
        let code = code_with_challenge(Some(&challenge), Some(PkceMethod::S256));
        assert!(!pkce_verifies(&code, Some("")));
    }

    #[test]
    fn missing_method_defaults_to_plain() {
        let code = code_with_challenge(Some("raw-challenge"), None);
        assert!(pkce_verifies(&code, Some("raw-challenge")));
    }
}
