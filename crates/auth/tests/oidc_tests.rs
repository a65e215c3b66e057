mod common;

use common::*;
use httpmock::Method::GET;
use httpmock::MockServer;
use lfs_auth::{
    AuthError, GitHubActionsProvider, JwkSet, JwksFetcher, JwtVerifier, GITHUB_ACTIONS_PROVIDER,
};
use lfs_cache::{KvCache, KvCacheJsonExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn provider(server: &MockServer, cache: Arc<dyn KvCache>) -> GitHubActionsProvider {
    let jwks = Arc::new(JwksFetcher::new(cache, Duration::ZERO).unwrap());
    let config = actions_config(server.url("/.well-known/jwks"));
    GitHubActionsProvider::new(JwtVerifier::new(jwks, config.leeway_secs()), &config)
}

macro_rules! mock_server_or_skip {
    () => {{
        if !can_bind_localhost() {
            eprintln!("Skipping httpmock tests: cannot bind to localhost");
            return;
        }
        MockServer::start()
    }};
}

#[tokio::test]
async fn valid_token_yields_workload_identity_and_caches_jwks() {
    let server = mock_server_or_skip!();
    let jwks = server.mock(|when, then| {
        when.method(GET).path("/.well-known/jwks");
        then.status(200).json_body(jwks_document(TEST_KID));
    });
    let cache = memory_cache();
    let provider = provider(&server, cache.clone());

    let token = sign(&actions_claims("foo/bar"), Some(TEST_KID));
    let identity = provider.verify(&token).await.unwrap();
    assert_eq!(identity.repository.to_string(), "foo/bar");
    assert_eq!(identity.git_ref, "refs/heads/main");
    assert_eq!(identity.actor, "octocat");
    assert_eq!(identity.sub, "repo:foo/bar:ref:refs/heads/main");

    provider.verify(&token).await.unwrap();
    jwks.assert_hits(1);

    let cached: JwkSet = cache
        .get_json(&format!("lfs:oidc:jwks:{GITHUB_ACTIONS_PROVIDER}"))
        .await
        .unwrap();
    assert!(cached.find(TEST_KID).is_some());
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let server = mock_server_or_skip!();
    server.mock(|when, then| {
        when.method(GET).path("/.well-known/jwks");
        then.status(200).json_body(jwks_document(TEST_KID));
    });
    let provider = provider(&server, memory_cache());

    let mut claims = actions_claims("foo/bar");
    claims["iat"] = json!(now() - 600);
    claims["nbf"] = json!(now() - 600);
    claims["exp"] = json!(now() - 5);

    let err = provider.verify(&sign(&claims, Some(TEST_KID))).await.unwrap_err();
    assert!(matches!(err, AuthError::ExpiredToken));
    assert!(!err.is_shape_mismatch());
}

#[tokio::test]
async fn audience_may_be_an_array() {
    let server = mock_server_or_skip!();
    server.mock(|when, then| {
        when.method(GET).path("/.well-known/jwks");
        then.status(200).json_body(jwks_document(TEST_KID));
    });
    let provider = provider(&server, memory_cache());

    let mut claims = actions_claims("foo/bar");
    claims["aud"] = json!(["something-else", AUDIENCE]);
    assert!(provider.verify(&sign(&claims, Some(TEST_KID))).await.is_ok());

    claims["aud"] = json!("https://github.com/foo");
    assert!(matches!(
        provider.verify(&sign(&claims, Some(TEST_KID))).await,
        Err(AuthError::InvalidAudience)
    ));
}

#[tokio::test]
async fn foreign_issuer_is_a_shape_mismatch() {
    let server = mock_server_or_skip!();
    server.mock(|when, then| {
        when.method(GET).path("/.well-known/jwks");
        then.status(200).json_body(jwks_document(TEST_KID));
    });
    let provider = provider(&server, memory_cache());

    let mut claims = actions_claims("foo/bar");
    claims["iss"] = json!("https://accounts.example.com");
    let err = provider.verify(&sign(&claims, Some(TEST_KID))).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidIssuer));
    assert!(err.is_shape_mismatch());
}

#[tokio::test]
async fn missing_claims_are_invalid() {
    let server = mock_server_or_skip!();
    server.mock(|when, then| {
        when.method(GET).path("/.well-known/jwks");
        then.status(200).json_body(jwks_document(TEST_KID));
    });
    let provider = provider(&server, memory_cache());

    for claim in ["sub", "repository", "ref", "actor"] {
        let mut claims = actions_claims("foo/bar");
        claims.as_object_mut().unwrap().remove(claim);
        let err = provider.verify(&sign(&claims, Some(TEST_KID))).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)), "{claim}: {err:?}");
    }
}

#[tokio::test]
async fn future_nbf_beyond_leeway_is_rejected() {
    let server = mock_server_or_skip!();
    server.mock(|when, then| {
        when.method(GET).path("/.well-known/jwks");
        then.status(200).json_body(jwks_document(TEST_KID));
    });
    let provider = provider(&server, memory_cache());

    let mut claims = actions_claims("foo/bar");
    claims["nbf"] = json!(now() + 30);
    assert!(provider.verify(&sign(&claims, Some(TEST_KID))).await.is_ok());

    claims["nbf"] = json!(now() + 600);
    assert!(matches!(
        provider.verify(&sign(&claims, Some(TEST_KID))).await,
        Err(AuthError::InvalidToken(_))
    ));
}

#[tokio::test]
async fn non_jwt_and_missing_kid() {
    let server = mock_server_or_skip!();
    let jwks = server.mock(|when, then| {
        when.method(GET).path("/.well-known/jwks");
        then.status(200).json_body(jwks_document(TEST_KID));
    });
    let provider = provider(&server, memory_cache());

    let err = provider
        .verify("5f0c8a62-3b7e-4a53-9d4f-0b8f6f1d2c11")
        .await
        .unwrap_err();
    assert!(err.is_shape_mismatch());

    let err = provider
        .verify(&sign(&actions_claims("foo/bar"), None))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::MissingKeyId));
    jwks.assert_hits(0);
}

#[tokio::test]
async fn rotated_key_triggers_one_refetch() {
    let server = mock_server_or_skip!();
    let jwks = server.mock(|when, then| {
        when.method(GET).path("/.well-known/jwks");
        then.status(200).json_body(jwks_document(TEST_KID));
    });
    let cache = memory_cache();
    let stale: JwkSet = serde_json::from_value(jwks_document("retired-key")).unwrap();
    cache
        .set_json(
            &format!("lfs:oidc:jwks:{GITHUB_ACTIONS_PROVIDER}"),
            &stale,
            Duration::from_secs(60),
        )
        .await
        .unwrap();
    let provider = provider(&server, cache);

    provider
        .verify(&sign(&actions_claims("foo/bar"), Some(TEST_KID)))
        .await
        .unwrap();
    jwks.assert_hits(1);

    // Unknown key ids right after a refetch are answered from the cached set.
    for i in 0..5 {
        let err = provider
            .verify(&sign(
                &actions_claims("foo/bar"),
                Some(format!("unknown-key-{i}").as_str()),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::KeyIdNotFound(_)));
    }
    jwks.assert_hits(1);

    provider
        .verify(&sign(&actions_claims("foo/bar"), Some(TEST_KID)))
        .await
        .unwrap();
    jwks.assert_hits(1);
}

#[tokio::test]
async fn unknown_key_ids_refetch_at_most_once_per_interval() {
    let server = mock_server_or_skip!();
    let jwks = server.mock(|when, then| {
        when.method(GET).path("/.well-known/jwks");
        then.status(200).json_body(jwks_document(TEST_KID));
    });
    let cache = memory_cache();
    let current: JwkSet = serde_json::from_value(jwks_document(TEST_KID)).unwrap();
    cache
        .set_json(
            &format!("lfs:oidc:jwks:{GITHUB_ACTIONS_PROVIDER}"),
            &current,
            Duration::from_secs(60),
        )
        .await
        .unwrap();
    let provider = provider(&server, cache.clone());

    for i in 0..20 {
        let err = provider
            .verify(&sign(&actions_claims("foo/bar"), Some(format!("forged-{i}").as_str())))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::KeyIdNotFound(_)));
    }
    jwks.assert_hits(1);

    // Once the window lapses the next unknown key id may refetch again.
    cache
        .delete(&format!("lfs:oidc:jwks:{GITHUB_ACTIONS_PROVIDER}:refetch"))
        .await
        .unwrap();
    let err = provider
        .verify(&sign(&actions_claims("foo/bar"), Some("forged-late")))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::KeyIdNotFound(_)));
    jwks.assert_hits(2);
}

#[tokio::test]
async fn jwks_outage_fails_verification() {
    let server = mock_server_or_skip!();
    server.mock(|when, then| {
        when.method(GET).path("/.well-known/jwks");
        then.status(503);
    });
    let provider = provider(&server, memory_cache());

    let err = provider
        .verify(&sign(&actions_claims("foo/bar"), Some(TEST_KID)))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::JwksFetchFailed(_)));
}

#[tokio::test]
async fn token_signed_by_other_key_is_invalid() {
    let server = mock_server_or_skip!();
    // Publish a different modulus under the expected kid.
    let mut doc = jwks_document(TEST_KID);
    let mut n = TEST_KEY_N.to_string();
    n.replace_range(10..12, "AA");
    doc["keys"][0]["n"] = json!(n);
    server.mock(|when, then| {
        when.method(GET).path("/.well-known/jwks");
        then.status(200).json_body(doc.clone());
    });
    let provider = provider(&server, memory_cache());

    let err = provider
        .verify(&sign(&actions_claims("foo/bar"), Some(TEST_KID)))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken(_)));
}
