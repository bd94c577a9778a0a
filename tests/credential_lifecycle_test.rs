// ABOUTME: Integration tests for the credential lifecycle layer
// ABOUTME: Hashed-only storage, idempotent revocation, pruning, expiry boundaries, PATs
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

mod common;

use chrono::Utc;
use sqlx::Row;

use aegis_auth_server::credentials::{hash_secret, verify_secret, AuthCodeParams, TokenParams};
use aegis_auth_server::models::GrantType;

use common::{harness, harness_with};

#[tokio::test]
async fn plaintext_secrets_never_reach_the_store() {
    let h = harness().await;
    let (client, secret) = h.confidential_client(&["https://app/cb"]).await;

    let stored: String = sqlx::query("SELECT secret FROM clients WHERE id = $1")
        .bind(client.id.to_string())
        .fetch_one(h.database.pool())
        .await
        .expect("row")
        .get("secret");
    assert_ne!(stored, secret);
    assert_eq!(stored, hash_secret(&secret));

    let (plain_access, plain_refresh, token) = h
        .server
        .token_manager()
        .create(TokenParams {
            user_id: Some("alice".to_owned()),
            client_id: client.id,
            name: None,
            scopes: vec!["read".to_owned()],
            with_refresh: true,
        })
        .await
        .expect("issue");

    let row = sqlx::query("SELECT token, refresh_token FROM tokens WHERE id = $1")
        .bind(token.id.to_string())
        .fetch_one(h.database.pool())
        .await
        .expect("row");
    let stored_access: String = row.get("token");
    let stored_refresh: String = row.get("refresh_token");
    assert_eq!(stored_access, hash_secret(&plain_access));
    assert_eq!(
        stored_refresh,
        hash_secret(&plain_refresh.expect("refresh issued"))
    );
}

#[tokio::test]
async fn secret_verification_accepts_only_the_original() {
    let h = harness().await;
    let (client, secret) = h.confidential_client(&[]).await;

    assert!(verify_secret(&secret, client.secret.as_deref().expect("hash")));
    assert!(!verify_secret("imposter", client.secret.as_deref().expect("hash")));
}

#[tokio::test]
async fn client_revocation_is_idempotent() {
    let h = harness().await;
    let (client, _) = h.confidential_client(&[]).await;

    h.server.client_manager().revoke(client.id).await.expect("first");
    h.server.client_manager().revoke(client.id).await.expect("second");

    let found = h
        .server
        .client_manager()
        .find(client.id)
        .await
        .expect("lookup")
        .expect("still present");
    assert!(found.revoked);
}

#[tokio::test]
async fn token_revocation_keeps_the_first_instant() {
    let h = harness().await;
    let (client, _) = h.machine_client().await;
    let (_, _, token) = h
        .server
        .token_manager()
        .create(TokenParams {
            user_id: None,
            client_id: client.id,
            name: None,
            scopes: vec![],
            with_refresh: false,
        })
        .await
        .expect("issue");

    h.server.token_manager().revoke(token.id).await.expect("first");
    let first = h
        .server
        .token_manager()
        .find(token.id)
        .await
        .expect("lookup")
        .expect("row")
        .revoked_at
        .expect("revoked");

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    h.server.token_manager().revoke(token.id).await.expect("second");
    let second = h
        .server
        .token_manager()
        .find(token.id)
        .await
        .expect("lookup")
        .expect("row")
        .revoked_at
        .expect("still revoked");

    assert_eq!(first, second);
}

#[tokio::test]
async fn access_token_at_the_expiry_boundary_is_invalid() {
    let h = harness().await;
    let (client, _) = h.machine_client().await;
    let (plain, _, token) = h
        .server
        .token_manager()
        .create(TokenParams {
            user_id: None,
            client_id: client.id,
            name: None,
            scopes: vec![],
            with_refresh: false,
        })
        .await
        .expect("issue");

    // push the expiry back to this exact instant
    sqlx::query("UPDATE tokens SET expires_at = $2 WHERE id = $1")
        .bind(token.id.to_string())
        .bind(Utc::now().timestamp())
        .execute(h.database.pool())
        .await
        .expect("update");

    let validated = h.server.token_manager().validate(&plain).await.expect("lookup");
    assert!(validated.is_none());
}

#[tokio::test]
async fn code_pruning_removes_used_and_expired_rows() {
    let h = harness().await;
    let user = h.seed_user("alice");
    let (client, _) = h.confidential_client(&["https://app/cb"]).await;

    let codes = h.server.auth_code_manager();
    let (plain, _) = codes
        .create(AuthCodeParams {
            client_id: client.id,
            user_id: user.id().expect("id"),
            redirect_uri: "https://app/cb".to_owned(),
            scopes: vec!["read".to_owned()],
            code_challenge: None,
            code_challenge_method: None,
        })
        .await
        .expect("issue");
    let (_, expired) = codes
        .create(AuthCodeParams {
            client_id: client.id,
            user_id: user.id().expect("id"),
            redirect_uri: "https://app/cb".to_owned(),
            scopes: vec![],
            code_challenge: None,
            code_challenge_method: None,
        })
        .await
        .expect("issue");

    // consume the first, expire the second
    codes
        .consume(&plain, client.id, "https://app/cb", None)
        .await
        .expect("lookup")
        .expect("consumed");
    sqlx::query("UPDATE auth_codes SET expires_at = $2 WHERE id = $1")
        .bind(expired.id.to_string())
        .bind((Utc::now() - chrono::Duration::minutes(1)).timestamp())
        .execute(h.database.pool())
        .await
        .expect("update");

    assert_eq!(codes.prune().await.expect("prune"), 2);
    // idempotent when nothing new appeared
    assert_eq!(codes.prune().await.expect("prune"), 0);
}

#[tokio::test]
async fn token_pruning_respects_the_retention_window() {
    let h = harness().await;
    let (client, _) = h.machine_client().await;
    let tokens = h.server.token_manager();

    // revoked recently: retained
    let (_, _, recent) = tokens
        .create(TokenParams {
            user_id: None,
            client_id: client.id,
            name: None,
            scopes: vec![],
            with_refresh: false,
        })
        .await
        .expect("issue");
    tokens.revoke(recent.id).await.expect("revoke");

    // revoked beyond the window: pruned
    let (_, _, old) = tokens
        .create(TokenParams {
            user_id: None,
            client_id: client.id,
            name: None,
            scopes: vec![],
            with_refresh: false,
        })
        .await
        .expect("issue");
    sqlx::query("UPDATE tokens SET revoked_at = $2 WHERE id = $1")
        .bind(old.id.to_string())
        .bind((Utc::now() - chrono::Duration::days(8)).timestamp())
        .execute(h.database.pool())
        .await
        .expect("update");

    // access expired with no refresh: pruned
    let (_, _, dead) = tokens
        .create(TokenParams {
            user_id: None,
            client_id: client.id,
            name: None,
            scopes: vec![],
            with_refresh: false,
        })
        .await
        .expect("issue");
    sqlx::query("UPDATE tokens SET expires_at = $2 WHERE id = $1")
        .bind(dead.id.to_string())
        .bind((Utc::now() - chrono::Duration::minutes(5)).timestamp())
        .execute(h.database.pool())
        .await
        .expect("update");

    assert_eq!(tokens.prune(7).await.expect("prune"), 2);
    assert!(tokens.find(recent.id).await.expect("lookup").is_some());
    assert!(tokens.find(old.id).await.expect("lookup").is_none());
    assert!(tokens.find(dead.id).await.expect("lookup").is_none());
}

#[tokio::test]
async fn bulk_revocation_covers_users_and_clients() {
    let h = harness().await;
    let (client_a, _) = h.confidential_client(&[]).await;
    let (client_b, _) = h.confidential_client(&[]).await;
    let tokens = h.server.token_manager();

    for client_id in [client_a.id, client_a.id, client_b.id] {
        tokens
            .create(TokenParams {
                user_id: Some("alice".to_owned()),
                client_id,
                name: None,
                scopes: vec![],
                with_refresh: false,
            })
            .await
            .expect("issue");
    }
    tokens
        .create(TokenParams {
            user_id: Some("bob".to_owned()),
            client_id: client_a.id,
            name: None,
            scopes: vec![],
            with_refresh: false,
        })
        .await
        .expect("issue");

    assert_eq!(
        tokens
            .revoke_all_for_client("alice", client_a.id)
            .await
            .expect("bulk"),
        2
    );
    assert_eq!(tokens.all_for_user("alice").await.expect("list").len(), 1);

    assert_eq!(tokens.revoke_all_for_user("alice").await.expect("bulk"), 1);
    assert!(tokens.all_for_user("alice").await.expect("list").is_empty());
    // bob is untouched
    assert_eq!(tokens.all_for_user("bob").await.expect("list").len(), 1);
}

#[tokio::test]
async fn personal_tokens_require_a_configured_client() {
    let h = harness().await;
    let tokens = h.server.token_manager();

    assert!(tokens.personal_tokens_for("alice").await.expect("list").is_empty());
    assert!(tokens
        .create_personal("alice".to_owned(), "cli".to_owned(), vec![])
        .await
        .is_err());
}

#[tokio::test]
async fn personal_tokens_issue_against_the_configured_client() {
    let pat_id = uuid::Uuid::new_v4();
    let h = harness_with(move |config| {
        config.personal_access_client = Some(pat_id);
    })
    .await;

    let now = Utc::now();
    h.database
        .insert_client(&aegis_auth_server::models::Client {
            id: pat_id,
            name: "Personal Access Client".to_owned(),
            secret: Some(hash_secret("unused")),
            redirect_uris: vec![],
            scopes: None,
            grant_types: vec![],
            confidential: true,
            first_party: true,
            revoked: false,
            created_at: now,
            updated_at: now,
        })
        .await
        .expect("insert");

    let tokens = h.server.token_manager();
    let (plain, token) = tokens
        .create_personal("alice".to_owned(), "laptop-cli".to_owned(), vec!["read".to_owned()])
        .await
        .expect("issue");

    assert_eq!(plain.len(), 80);
    assert_eq!(token.client_id, pat_id);
    assert_eq!(token.name.as_deref(), Some("laptop-cli"));
    assert!(token.refresh_token.is_none());
    // year-scale lifetime
    assert!(token.expires_at > Utc::now() + chrono::Duration::days(300));

    let listed = tokens.personal_tokens_for("alice").await.expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, token.id);
}

#[tokio::test]
async fn destroy_cascades_to_codes_and_tokens() {
    let h = harness().await;
    let user = h.seed_user("alice");
    let (client, _) = h.confidential_client(&["https://app/cb"]).await;

    h.server
        .auth_code_manager()
        .create(AuthCodeParams {
            client_id: client.id,
            user_id: user.id().expect("id"),
            redirect_uri: "https://app/cb".to_owned(),
            scopes: vec![],
            code_challenge: None,
            code_challenge_method: None,
        })
        .await
        .expect("issue code");
    h.server
        .token_manager()
        .create(TokenParams {
            user_id: Some("alice".to_owned()),
            client_id: client.id,
            name: None,
            scopes: vec![],
            with_refresh: true,
        })
        .await
        .expect("issue token");

    h.server.client_manager().destroy(client.id).await.expect("destroy");

    for table in ["clients", "tokens", "auth_codes"] {
        let count: i64 = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {table}"))
            .fetch_one(h.database.pool())
            .await
            .expect("count")
            .get("n");
        assert_eq!(count, 0, "{table} should be empty");
    }
}

#[tokio::test]
async fn default_grant_registration_covers_code_and_refresh() {
    let h = harness().await;
    let (client, _) = h.confidential_client(&[]).await;
    assert!(client.allows_grant(GrantType::AuthorizationCode));
    assert!(client.allows_grant(GrantType::RefreshToken));
    assert!(!client.allows_grant(GrantType::ClientCredentials));
}
