//! Bearer token verification
//!
//! Tokens are HS256 JWTs whose subject is the username. Verification checks
//! the signature and expiry, then resolves the subject to a stored user.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::store::{ChatStore, StoreError};
use crate::types::UserId;

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: UserId,
    pub username: String,
}

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Username
    pub sub: String,
    /// Expiry (seconds since epoch)
    pub exp: i64,
}

/// Token verification failures
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Token expired")]
    Expired,

    #[error("Invalid token: {0}")]
    Invalid(String),

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Resolves a bearer token to the user it was issued for
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<UserIdentity, AuthError>;
}

/// HS256 JWT verifier backed by the user table
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
    store: Arc<dyn ChatStore>,
}

impl JwtVerifier {
    pub fn new(secret: &[u8], leeway_secs: u64, store: Arc<dyn ChatStore>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = leeway_secs;

        Self {
            key: DecodingKey::from_secret(secret),
            validation,
            store,
        }
    }

    fn decode_claims(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid(e.to_string()),
            })
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<UserIdentity, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let claims = self.decode_claims(token)?;
        let user = self
            .store
            .find_user_by_username(&claims.sub)
            .await?
            .ok_or_else(|| AuthError::UnknownUser(claims.sub.clone()))?;

        Ok(UserIdentity {
            id: user.id,
            username: user.username,
        })
    }
}

/// Mint a token for `username` valid for `ttl`
pub fn issue_token(
    secret: &[u8],
    username: &str,
    ttl: Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: username.to_string(),
        exp: (Utc::now() + ttl).timestamp(),
    };
    encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret))
}
