//! Token issuing and validation.
//!
//! Self-contained HS256 bearer tokens (three dot-separated base64url
//! segments). Nothing is stored server-side; expiry is the only termination
//! mechanism. Malformed or tampered tokens are hard failures from
//! `subject_of`, while expiry of a well-formed token is an expected outcome
//! reported as `false` by `is_valid`.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::domain::RoleType;

/// Claims carried by every issued token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user's email.
    pub sub: String,
    /// Role tag at issue time. Informational only; authorization re-reads
    /// the role from storage on every check.
    pub role: String,
    /// Issued-at, seconds since epoch.
    pub iat: i64,
    /// Expiry, seconds since epoch.
    pub exp: i64,
}

/// Token parse/signature errors. Never produced for mere expiry.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Invalid token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid expiry claim")]
    InvalidExpiry,
}

/// Issues and verifies bearer tokens with a configured secret and
/// time-to-live. Stateless: validation depends only on the token's signed
/// contents and the wall clock.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl_ms: i64,
}

impl TokenService {
    pub fn new(secret: &str, ttl_ms: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked manually in `is_valid` so that an expired token
        // is a boolean outcome instead of a decode error.
        validation.validate_exp = false;

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl_ms,
        }
    }

    /// Mint a signed token for `subject` with an absolute expiry derived
    /// from the configured time-to-live.
    pub fn issue(&self, subject: &str, role: RoleType) -> Result<String, TokenError> {
        let issued_at = Utc::now();
        let expires_at = issued_at + Duration::milliseconds(self.ttl_ms);

        let claims = Claims {
            sub: subject.to_string(),
            role: role.as_str().to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    /// Parse and verify the signature, returning the subject. Malformed or
    /// tampered input is an error, never an empty result.
    pub fn subject_of(&self, token: &str) -> Result<String, TokenError> {
        Ok(self.claims_of(token)?.sub)
    }

    /// Expiry timestamp of a well-formed token.
    pub fn expiry_of(&self, token: &str) -> Result<DateTime<Utc>, TokenError> {
        let claims = self.claims_of(token)?;
        DateTime::<Utc>::from_timestamp(claims.exp, 0).ok_or(TokenError::InvalidExpiry)
    }

    /// True iff the signature verifies, the subject matches and the token
    /// has not expired. Returns `false` (never an error) for a well-formed
    /// but expired token.
    pub fn is_valid(&self, token: &str, expected_subject: &str) -> bool {
        match self.claims_of(token) {
            Ok(claims) => claims.sub == expected_subject && Utc::now().timestamp() < claims.exp,
            Err(_) => false,
        }
    }

    fn claims_of(&self, token: &str) -> Result<Claims, TokenError> {
        Ok(decode::<Claims>(token, &self.decoding, &self.validation)?.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-signing-secret-for-token-tests";
    const ONE_HOUR_MS: i64 = 3_600_000;

    #[test]
    fn test_subject_round_trip() {
        let tokens = TokenService::new(SECRET, ONE_HOUR_MS);
        let token = tokens.issue("alice@example.com", RoleType::Employee).unwrap();

        assert_eq!(token.split('.').count(), 3);
        assert_eq!(tokens.subject_of(&token).unwrap(), "alice@example.com");
        assert!(tokens.is_valid(&token, "alice@example.com"));
    }

    #[test]
    fn test_expiry_is_in_the_future() {
        let tokens = TokenService::new(SECRET, ONE_HOUR_MS);
        let token = tokens.issue("alice@example.com", RoleType::Admin).unwrap();

        assert!(tokens.expiry_of(&token).unwrap() > Utc::now());
    }

    #[test]
    fn test_wrong_subject_is_invalid() {
        let tokens = TokenService::new(SECRET, ONE_HOUR_MS);
        let token = tokens.issue("alice@example.com", RoleType::Employee).unwrap();

        assert!(!tokens.is_valid(&token, "bob@example.com"));
    }

    #[test]
    fn test_expired_token_is_false_not_an_error() {
        let tokens = TokenService::new(SECRET, 100);
        let token = tokens.issue("alice@example.com", RoleType::Employee).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(200));

        // Still well-formed: parsing succeeds even though validity is gone.
        assert_eq!(tokens.subject_of(&token).unwrap(), "alice@example.com");
        assert!(!tokens.is_valid(&token, "alice@example.com"));
    }

    #[test]
    fn test_tampered_token_fails_hard() {
        let tokens = TokenService::new(SECRET, ONE_HOUR_MS);
        let token = tokens.issue("alice@example.com", RoleType::Employee).unwrap();

        let tampered = format!("{}x", token);
        assert!(tokens.subject_of(&tampered).is_err());
        assert!(!tokens.is_valid(&tampered, "alice@example.com"));
    }

    #[test]
    fn test_garbage_token_fails_hard() {
        let tokens = TokenService::new(SECRET, ONE_HOUR_MS);

        assert!(tokens.subject_of("not.a.token").is_err());
        assert!(tokens.expiry_of("definitely-not-a-token").is_err());
        assert!(!tokens.is_valid("not.a.token", "alice@example.com"));
    }

    #[test]
    fn test_token_from_other_secret_is_rejected() {
        let ours = TokenService::new(SECRET, ONE_HOUR_MS);
        let theirs = TokenService::new("some-other-secret", ONE_HOUR_MS);

        let token = theirs.issue("alice@example.com", RoleType::Employee).unwrap();
        assert!(ours.subject_of(&token).is_err());
        assert!(!ours.is_valid(&token, "alice@example.com"));
    }
}
