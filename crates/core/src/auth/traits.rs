use async_trait::async_trait;
use thiserror::Error;

use super::types::{AuthRequest, Identity};

/// Why a request was turned away.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credentials were presented.
    #[error("Authentication required")]
    NotAuthenticated,

    /// Credentials were presented but did not match.
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The gate itself is misconfigured; not the caller's fault.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl AuthError {
    /// Label used for the auth failure counter.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotAuthenticated => "not_authenticated",
            Self::InvalidCredentials(_) => "invalid_credentials",
            Self::ConfigurationError(_) => "internal_error",
        }
    }

    /// Whether the caller can fix this by sending other credentials.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::ConfigurationError(_))
    }
}

/// Gate in front of the worker and admin routes.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError>;

    /// Name matching the `auth.method` config value.
    fn method_name(&self) -> &'static str;
}
