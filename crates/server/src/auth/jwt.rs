use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use portcullis_core::{ControlError, UserRole};

/// Token audience: admin console or developer portal. A token minted for
/// one surface never authenticates against the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenScope {
    Admin,
    Portal,
}

/// JWT claims embedded in issued tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: user id (portal) or admin username.
    pub sub: String,
    pub email: String,
    pub role: UserRole,
    pub scope: TokenScope,
    /// Issuer; fixed per configuration and required on validation.
    pub iss: String,
    /// Expiry (seconds since epoch).
    pub exp: i64,
    /// Issued-at (seconds since epoch).
    pub iat: i64,
}

/// Issues and validates HS256 tokens with a fixed issuer.
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    lifetime: Duration,
}

impl JwtManager {
    pub fn new(secret: &str, issuer: &str, lifetime_seconds: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.to_owned(),
            lifetime: Duration::seconds(lifetime_seconds),
        }
    }

    /// Issue a token. Returns the encoded JWT and its expiry time.
    pub fn issue(
        &self,
        sub: &str,
        email: &str,
        role: UserRole,
        scope: TokenScope,
    ) -> Result<(String, DateTime<Utc>), ControlError> {
        let now = Utc::now();
        let expires_at = now + self.lifetime;
        let claims = Claims {
            sub: sub.to_owned(),
            email: email.to_owned(),
            role,
            scope,
            iss: self.issuer.clone(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ControlError::Internal(format!("JWT encoding failed: {e}")))?;
        Ok((token, expires_at))
    }

    /// Validate signature, expiry, issuer, and scope.
    ///
    /// Every failure maps to the opaque credential error.
    pub fn validate(&self, token: &str, scope: TokenScope) -> Result<Claims, ControlError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| ControlError::Unauthorized)?;

        if data.claims.scope != scope {
            return Err(ControlError::Unauthorized);
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> JwtManager {
        JwtManager::new("test-secret", "portcullis", 3600)
    }

    #[test]
    fn round_trip() {
        let mgr = manager();
        let (token, expires_at) = mgr
            .issue("u1", "u@example.com", UserRole::Developer, TokenScope::Portal)
            .unwrap();
        assert!(expires_at > Utc::now());

        let claims = mgr.validate(&token, TokenScope::Portal).unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.email, "u@example.com");
        assert_eq!(claims.role, UserRole::Developer);
    }

    #[test]
    fn rejects_wrong_issuer() {
        let mgr = manager();
        let other = JwtManager::new("test-secret", "someone-else", 3600);
        let (token, _) = other
            .issue("u1", "u@example.com", UserRole::Developer, TokenScope::Portal)
            .unwrap();
        assert!(mgr.validate(&token, TokenScope::Portal).is_err());
    }

    #[test]
    fn rejects_tampered_signature() {
        let mgr = manager();
        let (token, _) = mgr
            .issue("u1", "u@example.com", UserRole::Developer, TokenScope::Portal)
            .unwrap();
        let forged = JwtManager::new("other-secret", "portcullis", 3600);
        let (other_token, _) = forged
            .issue("u1", "u@example.com", UserRole::Developer, TokenScope::Portal)
            .unwrap();
        assert!(mgr.validate(&other_token, TokenScope::Portal).is_err());
        assert!(mgr.validate(&format!("{token}x"), TokenScope::Portal).is_err());
    }

    #[test]
    fn rejects_expired_token() {
        let mgr = JwtManager::new("test-secret", "portcullis", -120);
        let (token, _) = mgr
            .issue("u1", "u@example.com", UserRole::Developer, TokenScope::Portal)
            .unwrap();
        assert!(
            JwtManager::new("test-secret", "portcullis", 3600)
                .validate(&token, TokenScope::Portal)
                .is_err()
        );
    }

    #[test]
    fn scope_is_enforced() {
        let mgr = manager();
        let (token, _) = mgr
            .issue("root", "root@example.com", UserRole::Admin, TokenScope::Admin)
            .unwrap();
        assert!(mgr.validate(&token, TokenScope::Portal).is_err());
        assert!(mgr.validate(&token, TokenScope::Admin).is_ok());
    }
}
