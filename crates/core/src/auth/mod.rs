//! Request authentication for the HTTP API.

mod api_key;
mod none;
mod traits;
mod types;

use std::sync::Arc;

pub use api_key::ApiKeyAuthenticator;
pub use none::NoneAuthenticator;
pub use traits::{AuthError, Authenticator};
pub use types::{AuthRequest, Identity};

use crate::config::{AuthConfig, AuthMethod};

/// Builds the authenticator selected by `config`.
pub fn create_authenticator(config: &AuthConfig) -> Result<Arc<dyn Authenticator>, AuthError> {
    match config.method {
        AuthMethod::None => Ok(Arc::new(NoneAuthenticator::new())),
        AuthMethod::ApiKey => match config.api_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(Arc::new(ApiKeyAuthenticator::new(key))),
            _ => Err(AuthError::ConfigurationError(
                "auth.api_key is required for the api_key method".to_string(),
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_none() {
        let config = AuthConfig {
            method: AuthMethod::None,
            api_key: None,
        };
        assert_eq!(create_authenticator(&config).unwrap().method_name(), "none");
    }

    #[test]
    fn test_create_api_key() {
        let config = AuthConfig {
            method: AuthMethod::ApiKey,
            api_key: Some("k".to_string()),
        };
        assert_eq!(
            create_authenticator(&config).unwrap().method_name(),
            "api_key"
        );
    }

    #[test]
    fn test_api_key_without_key() {
        let config = AuthConfig {
            method: AuthMethod::ApiKey,
            api_key: Some(String::new()),
        };
        assert!(matches!(
            create_authenticator(&config),
            Err(AuthError::ConfigurationError(_))
        ));
    }
}
