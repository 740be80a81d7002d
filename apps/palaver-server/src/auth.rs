//! Identity collaborator: bearer-token minting and verification. Tokens are
//! `"{user_id}.{mac}"` with an HMAC-SHA-256 over the id, base64 without
//! padding. Deliberately small; anything heavier plugs in behind
//! [`Identity`].

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use palaver_core::{Error, UserId};

use crate::routes::ApiError;

type HmacSha256 = Hmac<Sha256>;

/// Issues transport-level credentials and resolves them back to a user
/// identity.
pub trait Identity: Send + Sync {
    fn mint(&self, user_id: UserId) -> String;
    fn verify(&self, token: &str) -> Result<UserId, Error>;
}

pub struct TokenSigner {
    secret: Vec<u8>,
}

impl TokenSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac_state(&self, user_id: UserId) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("hmac accepts any key length");
        mac.update(user_id.0.to_string().as_bytes());
        mac
    }
}

impl Identity for TokenSigner {
    fn mint(&self, user_id: UserId) -> String {
        let mac = self.mac_state(user_id).finalize().into_bytes();
        format!("{}.{}", user_id.0, STANDARD_NO_PAD.encode(mac))
    }

    fn verify(&self, token: &str) -> Result<UserId, Error> {
        let (id_part, mac_part) = token.split_once('.').ok_or(Error::Unauthorized)?;
        let id = id_part.parse::<i64>().map_err(|_| Error::Unauthorized)?;
        let user_id = UserId(id);
        let claimed = STANDARD_NO_PAD
            .decode(mac_part)
            .map_err(|_| Error::Unauthorized)?;
        // Constant-time comparison via the hmac crate, not string equality.
        self.mac_state(user_id)
            .verify_slice(&claimed)
            .map_err(|_| Error::Unauthorized)?;
        Ok(user_id)
    }
}

/// Hash a password with SHA-256.
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    hash_password(password) == hash
}

/// Bearer token pulled from the `Authorization` header. Handlers resolve it
/// to a user through the state's identity collaborator.
#[derive(Clone, Debug)]
pub struct AuthToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for AuthToken
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        extract_token(&parts.headers)
            .map(AuthToken)
            .ok_or(ApiError::Unauthorized)
    }
}

impl AuthToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn extract_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|token| token.to_owned())
}
