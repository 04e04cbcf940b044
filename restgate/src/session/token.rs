// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Bearer token issuing
//!
//! The session manager treats tokens as opaque: it asks a [`TokenIssuer`] to
//! mint one bound to a session UUID and later to hand back the claims. The
//! bundled [`JwtTokenIssuer`] signs HS256 JWTs.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token creation failed: {0}")]
    Creation(String),

    #[error("Invalid token: {0}")]
    Invalid(String),

    #[error("Token expired")]
    Expired,
}

/// Claims bound into a bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Session UUID
    pub sid: Uuid,
    /// Owning user
    pub sub: String,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Token expiry (unix seconds)
    pub exp: i64,
}

impl Claims {
    /// Claims issued at `now`; an unrepresentable expiry saturates
    pub fn new(
        session_id: Uuid,
        user: impl Into<String>,
        now: DateTime<Utc>,
        lifetime: chrono::Duration,
    ) -> Self {
        Self {
            sid: session_id,
            sub: user.into(),
            iat: now.timestamp(),
            exp: now
                .checked_add_signed(lifetime)
                .map_or(i64::MAX, |exp| exp.timestamp()),
        }
    }
}

/// Token issuer capability consumed by the session manager
pub trait TokenIssuer: Send + Sync {
    fn issue_token(&self, claims: &Claims) -> Result<String, TokenError>;

    fn validate_claims(&self, token: &str) -> Result<Claims, TokenError>;

    /// Lifetime stamped into new claims
    fn token_lifetime(&self) -> chrono::Duration {
        chrono::Duration::days(30)
    }
}

/// HS256 JWT issuer
pub struct JwtTokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    lifetime: chrono::Duration,
}

impl JwtTokenIssuer {
    pub fn new(secret: &[u8], lifetime: chrono::Duration) -> Self {
        let mut validation = Validation::default();
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            lifetime,
        }
    }

    pub fn from_config(config: &crate::config::TokenConfig) -> Self {
        if config.uses_development_secret() {
            log::warn!(
                "token issuer is using the development secret; set {}",
                crate::config::ENV_TOKEN_SECRET
            );
        }
        Self::new(config.secret.as_bytes(), config.lifetime())
    }
}

impl TokenIssuer for JwtTokenIssuer {
    fn issue_token(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::default(), claims, &self.encoding).map_err(|e| {
            log::warn!("Failed to encode session token: {}", e);
            TokenError::Creation(e.to_string())
        })
    }

    fn validate_claims(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => {
                    log::debug!("Token verification failed: {}", e);
                    TokenError::Invalid(e.to_string())
                }
            })
    }

    fn token_lifetime(&self) -> chrono::Duration {
        self.lifetime
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_validate() {
        let issuer = JwtTokenIssuer::new(b"unit-test-secret", chrono::Duration::hours(1));
        let sid = Uuid::new_v4();
        let now = Utc::now();
        let claims = Claims::new(sid, "frank", now, issuer.token_lifetime());
        assert_eq!(claims.iat, now.timestamp());
        assert_eq!(claims.exp, (now + chrono::Duration::hours(1)).timestamp());

        let token = issuer.issue_token(&claims).unwrap();
        let back = issuer.validate_claims(&token).unwrap();
        assert_eq!(back.sid, sid);
        assert_eq!(back.sub, "frank");
    }

    #[test]
    fn test_rejects_foreign_signature() {
        let a = JwtTokenIssuer::new(b"secret-a", chrono::Duration::hours(1));
        let b = JwtTokenIssuer::new(b"secret-b", chrono::Duration::hours(1));
        let token = a
            .issue_token(&Claims::new(
                Uuid::new_v4(),
                "gina",
                Utc::now(),
                chrono::Duration::hours(1),
            ))
            .unwrap();
        assert!(matches!(b.validate_claims(&token), Err(TokenError::Invalid(_))));
        assert!(matches!(a.validate_claims("not-a-jwt"), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn test_expired_token() {
        let issuer = JwtTokenIssuer::new(b"unit-test-secret", chrono::Duration::hours(1));
        let claims = Claims::new(
            Uuid::new_v4(),
            "hank",
            Utc::now(),
            chrono::Duration::seconds(-120),
        );
        let token = issuer.issue_token(&claims).unwrap();
        assert_eq!(issuer.validate_claims(&token), Err(TokenError::Expired));
    }

    #[test]
    fn test_issuer_lifetime_from_config() {
        let config = crate::config::TokenConfig {
            secret: "config-secret".to_string(),
            lifetime_secs: 90,
        };
        let issuer = JwtTokenIssuer::from_config(&config);
        assert_eq!(issuer.token_lifetime(), chrono::Duration::seconds(90));
    }
}
