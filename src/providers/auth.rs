//! Request identity resolution

use async_trait::async_trait;
use axum::http::HeaderMap;

use crate::error::{Error, Result};

/// Resolves the requesting user from request headers
#[async_trait]
pub trait AuthResolver: Send + Sync {
    async fn resolve(&self, headers: &HeaderMap) -> Result<String>;
}

/// Trusts the `X-User-Id` header, suited to deployments behind an
/// authenticating proxy. An optional fallback user serves single-user
/// local setups where no proxy exists.
pub struct HeaderAuth {
    fallback_user: Option<String>,
}

impl HeaderAuth {
    pub fn new(fallback_user: Option<String>) -> Self {
        Self { fallback_user }
    }
}

#[async_trait]
impl AuthResolver for HeaderAuth {
    async fn resolve(&self, headers: &HeaderMap) -> Result<String> {
        if let Some(value) = headers.get("x-user-id") {
            let user = value.to_str().map_err(|_| Error::Unauthorized)?.trim();
            if user.is_empty() {
                return Err(Error::Unauthorized);
            }
            return Ok(user.to_string());
        }

        self.fallback_user.clone().ok_or(Error::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn test_header_wins_over_fallback() {
        let auth = HeaderAuth::new(Some("local".to_string()));
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("alice"));

        assert_eq!(auth.resolve(&headers).await.unwrap(), "alice");
    }

    #[tokio::test]
    async fn test_fallback_applies_without_header() {
        let auth = HeaderAuth::new(Some("local".to_string()));
        assert_eq!(auth.resolve(&HeaderMap::new()).await.unwrap(), "local");
    }

    #[tokio::test]
    async fn test_missing_header_without_fallback_is_unauthorized() {
        let auth = HeaderAuth::new(None);
        let err = auth.resolve(&HeaderMap::new()).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized));
    }

    #[tokio::test]
    async fn test_blank_header_is_unauthorized() {
        let auth = HeaderAuth::new(Some("local".to_string()));
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("   "));

        let err = auth.resolve(&headers).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized));
    }
}
