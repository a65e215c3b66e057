//! Test fixtures for generating test data and credentials.

use bytes::Bytes;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use lfs_core::config::GITHUB_ACTIONS_ISSUER;
use lfs_core::{Oid, RepositoryName};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

/// PKCS#1 RSA key used only by tests.
pub const TEST_KEY_PEM: &str = include_str!("../fixtures/rsa_test_key.pem");
pub const TEST_KEY_N: &str = "vhbStmsXcWQntxGhaxyd1bqxFmOL-HMDwRfcX2thSU4-dg7EF7s-9iMYdr5rZBMIyVkVcbKh1SShHtvigBOaBCsR4J4v-oh3GsfFkNWnprhHjo6nKOyhAqBl5SoRdhDtZaBpNaxUpTYQYrwoexfJiHZpZwI6azP_6hqrixtEDFW8L_c2vtdrHxNV-i_W1NKCqjsvDngQiSIz3akiwd_Ffk8OMp1EIsskAsPpNd_B3KJgHhh2elL9-Z6ApLAmPU8UQ66uyAh2jL8uS7swtGLKUEpCfAyjr3H3P0kb0zZYL7VSGVkEWSEj8EiOHzCc6orkq4KS04T0fKvmKT8Ew9edTw";
pub const TEST_KEY_E: &str = "AQAB";
pub const TEST_KID: &str = "test-key-1";
/// Audience configured by `AppConfig::for_testing`.
pub const AUDIENCE: &str = "lfs-test";

/// Generate deterministic test data based on a seed.
#[allow(dead_code)]
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        // Simple LCG for deterministic data
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// The OID of `data`.
#[allow(dead_code)]
pub fn oid_of(data: &[u8]) -> Oid {
    Oid::parse(&hex::encode(Sha256::digest(data))).unwrap()
}

#[allow(dead_code)]
pub fn repo(full_name: &str) -> RepositoryName {
    RepositoryName::parse(full_name).unwrap()
}

pub fn jwks_document() -> Value {
    json!({
        "keys": [{
            "kty": "RSA",
            "kid": TEST_KID,
            "use": "sig",
            "alg": "RS256",
            "n": TEST_KEY_N,
            "e": TEST_KEY_E
        }]
    })
}

fn now() -> i64 {
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

pub fn sign(claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(TEST_KID.to_string());
    let key = EncodingKey::from_rsa_pem(TEST_KEY_PEM.as_bytes()).expect("test key parses");
    jsonwebtoken::encode(&header, claims, &key).expect("token encodes")
}

/// A GitHub Actions token for `repository`, valid for five minutes.
#[allow(dead_code)]
pub fn actions_token(repository: &str) -> String {
    sign(&actions_claims(repository))
}

/// A token for `repository` that expired a minute ago.
#[allow(dead_code)]
pub fn expired_actions_token(repository: &str) -> String {
    let mut claims = actions_claims(repository);
    claims["iat"] = json!(now() - 600);
    claims["nbf"] = json!(now() - 600);
    claims["exp"] = json!(now() - 60);
    sign(&claims)
}

#[allow(dead_code)]
pub fn can_bind_localhost() -> bool {
    std::net::TcpListener::bind("127.0.0.1:0").is_ok()
}
