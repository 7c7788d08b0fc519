use crate::{
    error::{AppError, CoreError, CoreResult},
    models::UserId,
};
use argon2::Argon2;
use axum::{
    async_trait,
    extract::{FromRequest, RequestParts, TypedHeader},
    headers::{authorization::Bearer, Authorization},
    Extension,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};

pub fn hash_password(password: impl AsRef<[u8]>) -> CoreResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_ref(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| anyhow::anyhow!("failed to hash password: {e}").into())
}

pub fn verify_password(password: impl AsRef<[u8]>, password_hash: impl AsRef<str>) -> CoreResult<bool> {
    let parsed_hash = PasswordHash::new(password_hash.as_ref())
        .map_err(|e| anyhow::anyhow!("stored password hash is malformed: {e}"))?;
    Ok(Argon2::default()
        .verify_password(password.as_ref(), &parsed_hash)
        .is_ok())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: UserId,
    pub exp: u64,
}

/// Signing keys for session tokens, shared with handlers as an extension.
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl JwtKeys {
    pub fn from_base64_secret(secret: &str, ttl: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            encoding: EncodingKey::from_base64_secret(secret)?,
            decoding: DecodingKey::from_base64_secret(secret)?,
            ttl,
        })
    }

    pub fn generate(&self, user_id: UserId) -> CoreResult<String> {
        let claims = Claims {
            user_id,
            exp: jsonwebtoken::get_current_timestamp() + self.ttl.as_secs(),
        };
        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| anyhow::anyhow!("failed to sign token: {e}").into())
    }

    pub fn validate(&self, token: &str) -> CoreResult<Claims> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| CoreError::Unauthorized("invalid or expired token".into()))
    }
}

/// The caller's user id, taken from a valid bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub UserId);

#[async_trait]
impl<B> FromRequest<B> for AuthUser
where
    B: Send,
{
    type Rejection = AppError;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request(req)
                .await
                .map_err(|_| CoreError::Unauthorized("missing bearer token".into()))?;
        let Extension(keys) = Extension::<Arc<JwtKeys>>::from_request(req)
            .await
            .map_err(|e| AppError::InternalServerError(anyhow::anyhow!("jwt keys missing: {e}")))?;

        Ok(AuthUser(keys.validate(bearer.token())?.user_id))
    }
}
