//! Bearer Tokens - HMAC-SHA256 Signed Claims
//!
//! Format: `base64url(claims JSON) "." base64url(HMAC-SHA256(secret, claims segment))`.
//! Verification is stateless: signature, then expiry.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::auth::AuthError;

/// Claims carried by a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    /// User id.
    pub sub: String,
    pub agent_id: String,
    /// Issued at (Unix seconds).
    pub iat: i64,
    /// Expires at (Unix seconds).
    pub exp: i64,
}

/// Issues and verifies bearer tokens.
pub struct TokenSigner {
    secret: Vec<u8>,
    ttl: Duration,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    pub fn new(secret: impl AsRef<[u8]>, ttl_secs: i64) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Issue a token for `user_id` acting as `agent_id`.
    pub fn issue(&self, user_id: &str, agent_id: &str, now: DateTime<Utc>) -> (String, TokenClaims) {
        let claims = TokenClaims {
            sub: user_id.to_string(),
            agent_id: agent_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        // Serializing a struct of strings and integers cannot fail.
        let payload = serde_json::to_vec(&claims).unwrap_or_default();
        let segment = URL_SAFE_NO_PAD.encode(payload);
        let signature = URL_SAFE_NO_PAD.encode(self.mac(&segment));
        (format!("{segment}.{signature}"), claims)
    }

    /// Verify a token's signature and expiry at `now`.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, AuthError> {
        let (segment, signature) = token
            .split_once('.')
            .ok_or_else(|| AuthError::InvalidToken("expected two segments".into()))?;
        let provided = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AuthError::InvalidToken("signature is not base64url".into()))?;
        if !constant_time_eq(&provided, &self.mac(segment)) {
            return Err(AuthError::InvalidToken("bad signature".into()));
        }
        let payload = URL_SAFE_NO_PAD
            .decode(segment)
            .map_err(|_| AuthError::InvalidToken("claims are not base64url".into()))?;
        let claims: TokenClaims = serde_json::from_slice(&payload)
            .map_err(|e| AuthError::InvalidToken(format!("invalid claims: {e}")))?;
        if now.timestamp() >= claims.exp {
            return Err(AuthError::ExpiredToken);
        }
        Ok(claims)
    }

    fn mac(&self, segment: &str) -> [u8; 32] {
        hmac_sha256::HMAC::mac(segment.as_bytes(), &self.secret)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issued_token_verifies() {
        let signer = TokenSigner::new("secret", 3600);
        let now = Utc::now();
        let (token, claims) = signer.issue("alice", "1:42", now);
        let verified = signer.verify(&token, now + Duration::seconds(10)).unwrap();
        assert_eq!(verified, claims);
        assert_eq!(verified.agent_id, "1:42");
    }

    #[test]
    fn test_expired_token_rejected() {
        let signer = TokenSigner::new("secret", 60);
        let now = Utc::now();
        let (token, _) = signer.issue("alice", "a", now);
        assert_eq!(
            signer.verify(&token, now + Duration::seconds(60)),
            Err(AuthError::ExpiredToken)
        );
    }

    #[test]
    fn test_tampered_or_foreign_token_rejected() {
        let signer = TokenSigner::new("secret", 60);
        let now = Utc::now();
        let (token, _) = signer.issue("alice", "a", now);

        let other = TokenSigner::new("other-secret", 60);
        assert!(matches!(other.verify(&token, now), Err(AuthError::InvalidToken(_))));

        let (_, sig) = token.split_once('.').unwrap();
        let forged_claims = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&TokenClaims {
                sub: "mallory".into(),
                agent_id: "a".into(),
                iat: now.timestamp(),
                exp: now.timestamp() + 60,
            })
            .unwrap(),
        );
        assert!(matches!(
            signer.verify(&format!("{forged_claims}.{sig}"), now),
            Err(AuthError::InvalidToken(_))
        ));
        assert!(signer.verify("garbage", now).is_err());
    }
}
