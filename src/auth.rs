//! Signed session token verification
//!
//! Tokens are minted by the login service; this server only verifies them.
//! Format: `base64url(claims JSON) . base64url(HMAC-SHA1(payload, secret))`.

use crate::error::ApiError;
use crate::protocol::now_secs;
use crate::state::AppState;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use std::sync::Arc;
use thiserror::Error;

type HmacSha1 = Hmac<Sha1>;

/// Identity claims extracted from a verified token. Immutable for the
/// lifetime of one connection; a membership change requires a reconnect
/// with a freshly issued token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: String,
    pub group_id: Option<String>,
    pub exp: Option<u64>,
}

/// Token verification failures
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication error: Token missing")]
    Missing,
    #[error("Authentication error: Invalid token")]
    Malformed,
    #[error("Authentication error: Invalid token")]
    BadSignature,
    #[error("Authentication error: Token expired")]
    Expired,
}

/// Verifies HMAC-signed session tokens
#[derive(Clone)]
pub struct TokenVerifier {
    secret: String,
}

impl TokenVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Verify a token and extract its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::Missing);
        }

        let (payload, signature) = token.split_once('.').ok_or(AuthError::Malformed)?;
        let signature = BASE64.decode(signature).map_err(|_| AuthError::Malformed)?;

        let mut mac = HmacSha1::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::BadSignature)?;

        let claims = BASE64.decode(payload).map_err(|_| AuthError::Malformed)?;
        let claims: Claims =
            serde_json::from_slice(&claims).map_err(|_| AuthError::Malformed)?;

        if let Some(exp) = claims.exp {
            if exp <= now_secs() {
                return Err(AuthError::Expired);
            }
        }

        Ok(claims)
    }
}

/// Bearer-token extractor for the REST surface.
pub struct AuthedUser(pub Claims);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|header| header.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::Auth("Token tidak ditemukan".to_string()))?;

        let claims = state
            .verifier
            .verify(token)
            .map_err(|_| ApiError::Auth("Token tidak valid".to_string()))?;

        Ok(AuthedUser(claims))
    }
}

/// Test-only token minting; issuance in production belongs to the login service.
#[cfg(test)]
pub(crate) fn sign_for_tests(claims: &Claims, secret: &str) -> String {
    let payload = BASE64.encode(serde_json::to_vec(claims).unwrap());
    let mut mac =
        HmacSha1::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    format!("{}.{}", payload, BASE64.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{claims, TEST_SECRET};

    #[test]
    fn verifies_a_signed_token_round_trip() {
        let verifier = TokenVerifier::new(TEST_SECRET);
        let issued = claims("17", "Ahmad", "jamaah", Some("7"));
        let token = sign_for_tests(&issued, TEST_SECRET);

        let verified = verifier.verify(&token).unwrap();
        assert_eq!(verified.id, "17");
        assert_eq!(verified.name, "Ahmad");
        assert_eq!(verified.role, "jamaah");
        assert_eq!(verified.group_id.as_deref(), Some("7"));
    }

    #[test]
    fn rejects_a_tampered_payload() {
        let verifier = TokenVerifier::new(TEST_SECRET);
        let token = sign_for_tests(&claims("17", "Ahmad", "jamaah", Some("7")), TEST_SECRET);

        let forged_payload =
            BASE64.encode(serde_json::to_vec(&claims("17", "Ahmad", "admin", Some("7"))).unwrap());
        let signature = token.split_once('.').unwrap().1;
        let forged = format!("{forged_payload}.{signature}");

        assert!(matches!(
            verifier.verify(&forged),
            Err(AuthError::BadSignature)
        ));
    }

    #[test]
    fn rejects_a_token_signed_with_another_secret() {
        let verifier = TokenVerifier::new(TEST_SECRET);
        let token = sign_for_tests(&claims("17", "Ahmad", "jamaah", None), "other-secret");
        assert!(matches!(
            verifier.verify(&token),
            Err(AuthError::BadSignature)
        ));
    }

    #[test]
    fn rejects_garbage_and_empty_tokens() {
        let verifier = TokenVerifier::new(TEST_SECRET);
        assert!(matches!(verifier.verify(""), Err(AuthError::Missing)));
        assert!(matches!(verifier.verify("   "), Err(AuthError::Missing)));
        assert!(matches!(
            verifier.verify("not-a-token"),
            Err(AuthError::Malformed)
        ));
        assert!(matches!(
            verifier.verify("!!.!!"),
            Err(AuthError::Malformed)
        ));
    }

    #[test]
    fn rejects_an_expired_token() {
        let verifier = TokenVerifier::new(TEST_SECRET);
        let mut expired = claims("17", "Ahmad", "jamaah", Some("7"));
        expired.exp = Some(now_secs() - 60);
        let token = sign_for_tests(&expired, TEST_SECRET);
        assert!(matches!(verifier.verify(&token), Err(AuthError::Expired)));
    }

    #[test]
    fn accepts_an_unexpired_token() {
        let verifier = TokenVerifier::new(TEST_SECRET);
        let mut issued = claims("17", "Ahmad", "jamaah", Some("7"));
        issued.exp = Some(now_secs() + 3600);
        let token = sign_for_tests(&issued, TEST_SECRET);
        assert!(verifier.verify(&token).is_ok());
    }
}
