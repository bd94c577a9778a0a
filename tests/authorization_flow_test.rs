// ABOUTME: Integration tests for the GET/POST /authorize flow
// ABOUTME: Consent payloads, first-party shortcut, redirect URI safety, session handling
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

mod common;

use aegis_auth_server::credentials::CreateClientInput;
use aegis_auth_server::oauth2::{AuthorizeOutcome, AuthorizeRejection, AuthorizeRequest};

use common::{harness, query_param, s256_challenge};

const SID: &str = "session-1";

fn authorize_request(client_id: &str, redirect_uri: &str) -> AuthorizeRequest {
    AuthorizeRequest {
        response_type: Some("code".to_owned()),
        client_id: Some(client_id.to_owned()),
        redirect_uri: Some(redirect_uri.to_owned()),
        ..AuthorizeRequest::default()
    }
}

#[tokio::test]
async fn third_party_client_gets_consent_payload() {
    let h = harness().await;
    let user = h.seed_user("alice");
    let (client, _) = h.confidential_client(&["https://app/cb"]).await;

    let mut request = authorize_request(&client.id.to_string(), "https://app/cb");
    request.scope = Some("read write".to_owned());
    request.state = Some("st-42".to_owned());

    match h.server.authorize(request, SID, &user).await {
        Ok(AuthorizeOutcome::ConsentJson(payload)) => {
            assert!(payload.authorization_required);
            assert_eq!(payload.client.id, client.id);
            assert_eq!(payload.client.name, "Test Confidential");
            let names: Vec<&str> = payload.scopes.iter().map(|s| s.name.as_str()).collect();
            assert_eq!(names, vec!["read", "write"]);
            assert_eq!(
                payload.scopes[0].description.as_str(),
                "Read your data"
            );
            assert_eq!(payload.state.as_deref(), Some("st-42"));
        }
        other => panic!("expected consent payload, got {other:?}"),
    }
}

#[tokio::test]
async fn first_party_client_skips_consent() {
    let h = harness().await;
    let user = h.seed_user("alice");
    let (client, _) = h
        .server
        .client_manager()
        .create(CreateClientInput {
            name: "First Party".to_owned(),
            redirect_uris: vec!["https://app/cb".to_owned()],
            scopes: None,
            grant_types: None,
            confidential: true,
            first_party: true,
        })
        .await
        .expect("create client");

    let mut request = authorize_request(&client.id.to_string(), "https://app/cb");
    request.state = Some("st".to_owned());

    match h.server.authorize(request, SID, &user).await {
        Ok(AuthorizeOutcome::Redirect(url)) => {
            assert!(url.starts_with("https://app/cb"));
            let code = query_param(&url, "code").expect("code present");
            assert_eq!(code.len(), 80);
            assert_eq!(query_param(&url, "state").as_deref(), Some("st"));
        }
        other => panic!("expected immediate redirect, got {other:?}"),
    }
}

#[tokio::test]
async fn unregistered_redirect_uri_is_never_redirected() {
    let h = harness().await;
    let user = h.seed_user("alice");
    let (client, _) = h.confidential_client(&["https://app/cb"]).await;

    let request = authorize_request(&client.id.to_string(), "https://evil/cb");
    match h.server.authorize(request, SID, &user).await {
        Err(AuthorizeRejection::Json(err)) => {
            assert_eq!(err.error_code(), "invalid_request");
            assert_eq!(err.http_status(), 400);
        }
        other => panic!("expected JSON rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_parameters_are_json_errors() {
    let h = harness().await;
    let user = h.seed_user("alice");
    let (client, _) = h.confidential_client(&["https://app/cb"]).await;

    // wrong response_type
    let mut request = authorize_request(&client.id.to_string(), "https://app/cb");
    request.response_type = Some("token".to_owned());
    match h.server.authorize(request, SID, &user).await {
        Err(AuthorizeRejection::Json(err)) => assert_eq!(err.error_code(), "invalid_request"),
        other => panic!("expected JSON rejection, got {other:?}"),
    }

    // missing client_id
    let request = AuthorizeRequest {
        response_type: Some("code".to_owned()),
        ..AuthorizeRequest::default()
    };
    match h.server.authorize(request, SID, &user).await {
        Err(AuthorizeRejection::Json(err)) => assert_eq!(err.error_code(), "invalid_request"),
        other => panic!("expected JSON rejection, got {other:?}"),
    }

    // missing redirect_uri
    let mut request = authorize_request(&client.id.to_string(), "https://app/cb");
    request.redirect_uri = None;
    match h.server.authorize(request, SID, &user).await {
        Err(AuthorizeRejection::Json(err)) => assert_eq!(err.error_code(), "invalid_request"),
        other => panic!("expected JSON rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_and_revoked_clients_fail_with_invalid_client() {
    let h = harness().await;
    let user = h.seed_user("alice");

    let request = authorize_request(&uuid::Uuid::new_v4().to_string(), "https://app/cb");
    match h.server.authorize(request, SID, &user).await {
        Err(AuthorizeRejection::Json(err)) => {
            assert_eq!(err.error_code(), "invalid_client");
            assert_eq!(err.http_status(), 401);
        }
        other => panic!("expected JSON rejection, got {other:?}"),
    }

    let (client, _) = h.confidential_client(&["https://app/cb"]).await;
    h.server
        .client_manager()
        .revoke(client.id)
        .await
        .expect("revoke");
    let request = authorize_request(&client.id.to_string(), "https://app/cb");
    match h.server.authorize(request, SID, &user).await {
        Err(AuthorizeRejection::Json(err)) => assert_eq!(err.error_code(), "invalid_client"),
        other => panic!("expected JSON rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn public_client_without_challenge_redirects_the_error() {
    let h = harness().await;
    let user = h.seed_user("alice");
    let client = h.public_client(&["https://app/cb"]).await;

    let mut request = authorize_request(&client.id.to_string(), "https://app/cb");
    request.state = Some("keep-me".to_owned());

    match h.server.authorize(request, SID, &user).await {
        Err(AuthorizeRejection::Redirect(url)) => {
            assert!(url.starts_with("https://app/cb"));
            assert_eq!(
                query_param(&url, "error").as_deref(),
                Some("invalid_request")
            );
            assert_eq!(query_param(&url, "state").as_deref(), Some("keep-me"));
        }
        other => panic!("expected error redirect, got {other:?}"),
    }
}

#[tokio::test]
async fn bad_challenge_method_redirects_the_error() {
    let h = harness().await;
    let user = h.seed_user("alice");
    let client = h.public_client(&["https://app/cb"]).await;

    let mut request = authorize_request(&client.id.to_string(), "https://app/cb");
    request.code_challenge = Some(s256_challenge("verifier-xyz"));
    request.code_challenge_method = Some("S512".to_owned());

    match h.server.authorize(request, SID, &user).await {
        Err(AuthorizeRejection::Redirect(url)) => {
            assert_eq!(
                query_param(&url, "error").as_deref(),
                Some("invalid_request")
            );
        }
        other => panic!("expected error redirect, got {other:?}"),
    }
}

#[tokio::test]
async fn invalid_scope_redirects_with_state() {
    let h = harness().await;
    let user = h.seed_user("alice");
    let (client, _) = h.confidential_client(&["https://app/cb"]).await;

    let mut request = authorize_request(&client.id.to_string(), "https://app/cb");
    request.scope = Some("read nonexistent".to_owned());
    request.state = Some("st".to_owned());

    match h.server.authorize(request, SID, &user).await {
        Err(AuthorizeRejection::Redirect(url)) => {
            assert_eq!(query_param(&url, "error").as_deref(), Some("invalid_scope"));
            assert_eq!(query_param(&url, "state").as_deref(), Some("st"));
        }
        other => panic!("expected error redirect, got {other:?}"),
    }
}

#[tokio::test]
async fn denied_consent_redirects_access_denied() {
    let h = harness().await;
    let user = h.seed_user("alice");
    let (client, _) = h.confidential_client(&["https://app/cb"]).await;

    let mut request = authorize_request(&client.id.to_string(), "https://app/cb");
    request.state = Some("st".to_owned());
    let outcome = h.server.authorize(request, SID, &user).await;
    assert!(matches!(outcome, Ok(AuthorizeOutcome::ConsentJson(_))));

    match h.server.approve(SID, false, &user).await {
        Err(AuthorizeRejection::Redirect(url)) => {
            assert_eq!(query_param(&url, "error").as_deref(), Some("access_denied"));
            assert_eq!(query_param(&url, "state").as_deref(), Some("st"));
        }
        other => panic!("expected access_denied redirect, got {other:?}"),
    }
}

#[tokio::test]
async fn consent_session_is_single_use() {
    let h = harness().await;
    let user = h.seed_user("alice");
    let (client, _) = h.confidential_client(&["https://app/cb"]).await;

    let request = authorize_request(&client.id.to_string(), "https://app/cb");
    let outcome = h.server.authorize(request, SID, &user).await;
    assert!(matches!(outcome, Ok(AuthorizeOutcome::ConsentJson(_))));

    let url = h.server.approve(SID, true, &user).await.expect("approved");
    assert!(query_param(&url, "code").is_some());

    // the pending request was cleared; a second resolution has nothing to act on
    match h.server.approve(SID, true, &user).await {
        Err(AuthorizeRejection::Json(err)) => assert_eq!(err.error_code(), "invalid_request"),
        other => panic!("expected invalid_request, got {other:?}"),
    }
}

#[tokio::test]
async fn approve_without_pending_request_fails() {
    let h = harness().await;
    let user = h.seed_user("alice");

    match h.server.approve("fresh-session", true, &user).await {
        Err(AuthorizeRejection::Json(err)) => assert_eq!(err.error_code(), "invalid_request"),
        other => panic!("expected invalid_request, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_scope_requests_write_no_session_state() {
    let h = harness().await;
    let user = h.seed_user("alice");
    let (client, _) = h.confidential_client(&["https://app/cb"]).await;

    let mut request = authorize_request(&client.id.to_string(), "https://app/cb");
    request.scope = Some("nonexistent".to_owned());
    let rejected = h.server.authorize(request, SID, &user).await;
    assert!(rejected.is_err());

    // scope validation happens before the session write
    match h.server.approve(SID, true, &user).await {
        Err(AuthorizeRejection::Json(err)) => assert_eq!(err.error_code(), "invalid_request"),
        other => panic!("expected invalid_request, got {other:?}"),
    }
}
