//! Shared API key authentication.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{AuthError, AuthRequest, Authenticator, Identity};

/// Checks a single shared key sent as `Authorization: Bearer <key>` or
/// `X-API-Key: <key>`.
pub struct ApiKeyAuthenticator {
    key_digest: Vec<u8>,
}

impl ApiKeyAuthenticator {
    pub fn new(api_key: &str) -> Self {
        Self {
            key_digest: Sha256::digest(api_key.as_bytes()).to_vec(),
        }
    }

    fn presented_key(request: &AuthRequest) -> Option<&str> {
        if let Some(value) = request.header("authorization") {
            let (scheme, key) = value.split_once(' ')?;
            if scheme.eq_ignore_ascii_case("bearer") {
                return Some(key.trim());
            }
        }
        request.header("x-api-key")
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError> {
        let key = Self::presented_key(request).ok_or(AuthError::NotAuthenticated)?;

        // Both digests are 32 bytes and every byte is compared.
        let presented = Sha256::digest(key.as_bytes());
        let mismatch = presented
            .iter()
            .zip(self.key_digest.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));
        if mismatch != 0 {
            return Err(AuthError::InvalidCredentials("unknown API key".to_string()));
        }

        Ok(Identity {
            user_id: "api_key".to_string(),
            method: "api_key".to_string(),
        })
    }

    fn method_name(&self) -> &'static str {
        "api_key"
    }
}
