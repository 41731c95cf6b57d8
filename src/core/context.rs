//! Request-scoped context.
//!
//! The host authenticates clients and enforces quotas before the gateway is
//! invoked; whatever identity it established travels here, together with an
//! optional injected credential service. Handlers read the context, annotate
//! logs and events with it, and never mutate it after entry.

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::core::credentials::{ApiKeyProvider, EnvKeyProvider};

static DEFAULT_KEY_PROVIDER: Lazy<Arc<dyn ApiKeyProvider>> =
    Lazy::new(|| Arc::new(EnvKeyProvider));

/// Per-request context handed to the gateway by the host.
#[derive(Clone, Default)]
pub struct RequestContext {
    /// Authenticated user id, when the host established one.
    pub user_id: Option<String>,
    /// Id of the client API key used, when the host tracks them.
    pub api_key_id: Option<String>,
    /// Client address, for observability events.
    pub client_ip: Option<String>,
    key_provider: Option<Arc<dyn ApiKeyProvider>>,
}

impl RequestContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the authenticated user id.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the client API key id.
    pub fn with_api_key_id(mut self, api_key_id: impl Into<String>) -> Self {
        self.api_key_id = Some(api_key_id.into());
        self
    }

    /// Set the client address.
    pub fn with_client_ip(mut self, client_ip: impl Into<String>) -> Self {
        self.client_ip = Some(client_ip.into());
        self
    }

    /// Inject a credential service for this request.
    pub fn with_key_provider(mut self, provider: Arc<dyn ApiKeyProvider>) -> Self {
        self.key_provider = Some(provider);
        self
    }

    /// The credential service to use: the injected one, or the
    /// environment-variable default.
    pub fn key_provider(&self) -> Arc<dyn ApiKeyProvider> {
        self.key_provider
            .clone()
            .unwrap_or_else(|| DEFAULT_KEY_PROVIDER.clone())
    }

    /// User id as a borrowed string, empty when absent.
    pub fn user_id_str(&self) -> &str {
        self.user_id.as_deref().unwrap_or("")
    }

    /// Client API key id as a borrowed string, empty when absent.
    pub fn api_key_id_str(&self) -> &str {
        self.api_key_id.as_deref().unwrap_or("")
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("user_id", &self.user_id)
            .field("api_key_id", &self.api_key_id)
            .field("client_ip", &self.client_ip)
            .field("key_provider", &self.key_provider.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::credentials::KeyError;
    use async_trait::async_trait;

    struct FixedKeys;

    #[async_trait]
    impl ApiKeyProvider for FixedKeys {
        async fn api_key(&self, _target: &str, _user_id: &str) -> Result<String, KeyError> {
            Ok("sk-fixed".to_string())
        }
    }

    #[tokio::test]
    async fn test_injected_provider_wins_over_default() {
        let ctx = RequestContext::new().with_key_provider(Arc::new(FixedKeys));
        let key = ctx.key_provider().api_key("openai", "").await.unwrap();
        assert_eq!(key, "sk-fixed");
    }

    #[test]
    fn test_identity_accessors_default_to_empty() {
        let ctx = RequestContext::new();
        assert_eq!(ctx.user_id_str(), "");
        assert_eq!(ctx.api_key_id_str(), "");

        let ctx = ctx.with_user_id("u-1").with_api_key_id("k-9");
        assert_eq!(ctx.user_id_str(), "u-1");
        assert_eq!(ctx.api_key_id_str(), "k-9");
    }
}
