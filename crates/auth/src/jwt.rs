//! RS256 JWT verification against a JWKS-published key.

use crate::error::{AuthError, AuthResult};
use crate::jwks::JwksFetcher;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Verified claims of a token.
pub type Claims = Map<String, Value>;

/// Where a token's key comes from and what it must claim.
#[derive(Clone, Copy, Debug)]
pub struct Expectations<'a> {
    pub provider: &'a str,
    pub jwks_url: &'a str,
    pub issuer: &'a str,
    pub audience: &'a str,
}

/// Verifies RS256 tokens for any issuer.
///
/// `exp` is strict. `nbf` and `iat` allow `leeway` seconds of clock skew.
#[derive(Clone)]
pub struct JwtVerifier {
    jwks: Arc<JwksFetcher>,
    leeway: u64,
}

impl JwtVerifier {
    pub fn new(jwks: Arc<JwksFetcher>, leeway_secs: u64) -> Self {
        Self {
            jwks,
            leeway: leeway_secs,
        }
    }

    pub async fn verify(&self, token: &str, expect: Expectations<'_>) -> AuthResult<Claims> {
        let header =
            jsonwebtoken::decode_header(token).map_err(|e| AuthError::Malformed(e.to_string()))?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthError::InvalidToken(format!(
                "unsupported algorithm {:?}",
                header.alg
            )));
        }
        let kid = header.kid.ok_or(AuthError::MissingKeyId)?;

        let key = self.jwks.key(expect.jwks_url, &kid, expect.provider).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        let claims = jsonwebtoken::decode::<Claims>(token, &key, &validation)
            .map_err(map_jwt_error)?
            .claims;

        check_not_before(&claims, jsonwebtoken::get_current_timestamp(), self.leeway)?;

        if claims.get("iss").and_then(Value::as_str) != Some(expect.issuer) {
            return Err(AuthError::InvalidIssuer);
        }
        check_audience(claims.get("aud"), expect.audience)?;

        Ok(claims)
    }
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
            AuthError::Malformed(err.to_string())
        }
        _ => AuthError::InvalidToken(err.to_string()),
    }
}

/// Reject tokens whose `nbf` or `iat` lies beyond `now + leeway`.
fn check_not_before(claims: &Claims, now: u64, leeway: u64) -> AuthResult<()> {
    for claim in ["nbf", "iat"] {
        let Some(value) = claims.get(claim) else {
            continue;
        };
        let at = value
            .as_u64()
            .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .ok_or_else(|| AuthError::InvalidToken(format!("{claim} is not a timestamp")))?;
        if at > now.saturating_add(leeway) {
            return Err(AuthError::InvalidToken(format!("{claim} is in the future")));
        }
    }
    Ok(())
}

/// `aud` may be a single string or an array of strings.
fn check_audience(aud: Option<&Value>, expected: &str) -> AuthResult<()> {
    let matches = match aud {
        Some(Value::String(s)) => s == expected,
        Some(Value::Array(values)) => values.iter().any(|v| v.as_str() == Some(expected)),
        _ => false,
    };
    if matches {
        Ok(())
    } else {
        Err(AuthError::InvalidAudience)
    }
}
