//! Token validation.
//!
//! The hub only needs `credential -> (user_id, username)`. Token issuance lives
//! elsewhere; `JwtValidator` verifies the HS256 tokens that issuer produces.

use async_trait::async_trait;
use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;

use chathub_core::error::ChatHubError;
use chathub_core::protocol::UserId;

use crate::config::AuthSection;

/// Authenticated identity bound to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub username: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing credential")]
    Missing,
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(String),
}

impl From<AuthError> for ChatHubError {
    fn from(e: AuthError) -> Self {
        ChatHubError::AuthFailed(e.to_string())
    }
}

#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate(&self, credential: &str) -> Result<Identity, AuthError>;
}

#[derive(Debug, Deserialize)]
struct Claims {
    user_id: UserId,
    username: String,
}

/// HS256 JWT validator. `exp` is always required; `iss` only when configured.
pub struct JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn new(secret: &[u8], issuer: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(iss) = issuer {
            validation.set_issuer(&[iss]);
        }
        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn from_config(cfg: &AuthSection) -> Self {
        Self::new(cfg.jwt_secret.as_bytes(), cfg.issuer.as_deref())
    }
}

#[async_trait]
impl TokenValidator for JwtValidator {
    async fn validate(&self, credential: &str) -> Result<Identity, AuthError> {
        if credential.is_empty() {
            return Err(AuthError::Missing);
        }
        let data = jsonwebtoken::decode::<Claims>(credential, &self.key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid(e.to_string()),
            })?;
        Ok(Identity {
            user_id: data.claims.user_id,
            username: data.claims.username,
        })
    }
}
