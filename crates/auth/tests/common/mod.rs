#![allow(dead_code)]

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use lfs_cache::{KvCache, MemoryCache};
use lfs_core::config::{GITHUB_ACTIONS_ISSUER, GitHubActionsConfig};
use serde_json::{Value, json};
use std::net::TcpListener;
use std::sync::Arc;

/// PKCS#1 RSA key used only by tests.
pub const TEST_KEY_PEM: &str = include_str!("../fixtures/rsa_test_key.pem");
pub const TEST_KEY_N: &str = "vhbStmsXcWQntxGhaxyd1bqxFmOL-HMDwRfcX2thSU4-dg7EF7s-9iMYdr5rZBMIyVkVcbKh1SShHtvigBOaBCsR4J4v-oh3GsfFkNWnprhHjo6nKOyhAqBl5SoRdhDtZaBpNaxUpTYQYrwoexfJiHZpZwI6azP_6hqrixtEDFW8L_c2vtdrHxNV-i_W1NKCqjsvDngQiSIz3akiwd_Ffk8OMp1EIsskAsPpNd_B3KJgHhh2elL9-Z6ApLAmPU8UQ66uyAh2jL8uS7swtGLKUEpCfAyjr3H3P0kb0zZYL7VSGVkEWSEj8EiOHzCc6orkq4KS04T0fKvmKT8Ew9edTw";
pub const TEST_KEY_E: &str = "AQAB";
pub const TEST_KID: &str = "test-key-1";
pub const AUDIENCE: &str = "lfs-test";

pub fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

pub fn memory_cache() -> Arc<dyn KvCache> {
    Arc::new(MemoryCache::new())
}

pub fn jwks_document(kid: &str) -> Value {
    json!({
        "keys": [{
            "kty": "RSA",
            "kid": kid,
            "use": "sig",
            "alg": "RS256",
            "n": TEST_KEY_N,
            "e": TEST_KEY_E
        }]
    })
}

pub fn now() -> i64 {
    jsonwebtoken::get_current_timestamp() as i64
}

/// Claims of a well-formed GitHub Actions token for `repository`.
pub fn actions_claims(repository: &str) -> Value {
    let now = now();
    json!({
        "iss": GITHUB_ACTIONS_ISSUER,
        "aud": AUDIENCE,
        "sub": format!("repo:{repository}:ref:refs/heads/main"),
        "repository": repository,
        "ref": "refs/heads/main",
        "actor": "octocat",
        "iat": now,
        "nbf": now,
        "exp": now + 300
    })
}

pub fn sign(claims: &Value, kid: Option<&str>) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    let key = EncodingKey::from_rsa_pem(TEST_KEY_PEM.as_bytes()).expect("test key parses");
    jsonwebtoken::encode(&header, claims, &key).expect("token encodes")
}

pub fn actions_config(jwks_url: String) -> GitHubActionsConfig {
    GitHubActionsConfig {
        audience: AUDIENCE.to_string(),
        issuer: GITHUB_ACTIONS_ISSUER.to_string(),
        jwks_url: Some(jwks_url),
        leeway_secs: 60,
    }
}
