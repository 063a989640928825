use async_trait::async_trait;

use super::{AuthError, AuthRequest, Authenticator, Identity};

/// Lets every request through as `anonymous`.
///
/// Only used when `auth.method = "none"` is set explicitly.
#[derive(Debug, Default)]
pub struct NoneAuthenticator;

impl NoneAuthenticator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Authenticator for NoneAuthenticator {
    async fn authenticate(&self, _request: &AuthRequest) -> Result<Identity, AuthError> {
        Ok(Identity::anonymous())
    }

    fn method_name(&self) -> &'static str {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_everyone_is_anonymous() {
        let request = AuthRequest {
            headers: HashMap::new(),
            source_ip: "127.0.0.1".parse().unwrap(),
        };

        let identity = NoneAuthenticator::new().authenticate(&request).await.unwrap();

        assert_eq!(identity, Identity::anonymous());
    }
}
