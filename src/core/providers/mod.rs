//! Provider adapters.
//!
//! One adapter per supported backend style, each implementing the same
//! four-operation contract: name, request mutation, response mutation and
//! catalog fetch. Adapters are stateless; a single instance serves every
//! request for its provider entry. The [`Adapter`] enum gives the registry a
//! concrete, clonable dispatch handle without trait objects.

pub mod anthropic;
pub mod cloudflare;
pub mod google;
pub mod openai;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION, USER_AGENT};
use serde_json::Value;
use url::Url;

use crate::config::ProviderStyle;
use crate::core::http::{UpstreamRequest, UpstreamResponse};
use crate::core::types::ModelEntry;
use crate::error::{GatewayError, Result};

pub use anthropic::AnthropicAdapter;
pub use cloudflare::CloudflareAdapter;
pub use google::GoogleAdapter;
pub use openai::OpenAiAdapter;

/// `User-Agent` sent on gateway-originated upstream calls.
pub(crate) const GATEWAY_USER_AGENT: &str = concat!("modelmux/", env!("CARGO_PKG_VERSION"));

/// The four-operation provider contract.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Canonical style tag for this adapter.
    fn name(&self) -> &'static str;

    /// Rewrite the outbound request for this provider: URL path, auth slot,
    /// headers and body translation.
    fn modify_request(&self, req: &mut UpstreamRequest, model: &str) -> Result<()>;

    /// Rewrite the upstream response back into the unified shape.
    ///
    /// Must cope with both `application/json` bodies and `text/event-stream`
    /// chunk streams. A no-op for styles already in the unified shape.
    async fn modify_response(&self, resp: &mut UpstreamResponse) -> Result<()>;

    /// Fetch this provider's model catalog, paginating where supported.
    async fn fetch_models(
        &self,
        base_url: &Url,
        api_key: &str,
        http: &reqwest::Client,
    ) -> Result<Vec<ModelEntry>>;
}

/// Concrete adapter dispatch, one variant per style tag.
#[derive(Debug, Clone, Copy)]
pub enum Adapter {
    /// OpenAI-compatible pass-through.
    OpenAi(OpenAiAdapter),
    /// Anthropic Messages API.
    Anthropic(AnthropicAdapter),
    /// Google Gemini `generateContent`.
    Google(GoogleAdapter),
    /// Cloudflare Workers AI.
    Cloudflare(CloudflareAdapter),
}

impl Adapter {
    /// The adapter instance backing a configured style.
    pub fn for_style(style: ProviderStyle) -> Self {
        match style {
            ProviderStyle::OpenAi => Adapter::OpenAi(OpenAiAdapter),
            ProviderStyle::Anthropic => Adapter::Anthropic(AnthropicAdapter),
            ProviderStyle::Google => Adapter::Google(GoogleAdapter),
            ProviderStyle::Cloudflare => Adapter::Cloudflare(CloudflareAdapter),
        }
    }

    fn inner(&self) -> &dyn ProviderAdapter {
        match self {
            Adapter::OpenAi(a) => a,
            Adapter::Anthropic(a) => a,
            Adapter::Google(a) => a,
            Adapter::Cloudflare(a) => a,
        }
    }

    /// Canonical style tag.
    pub fn name(&self) -> &'static str {
        self.inner().name()
    }

    /// See [`ProviderAdapter::modify_request`].
    pub fn modify_request(&self, req: &mut UpstreamRequest, model: &str) -> Result<()> {
        self.inner().modify_request(req, model)
    }

    /// See [`ProviderAdapter::modify_response`].
    pub async fn modify_response(&self, resp: &mut UpstreamResponse) -> Result<()> {
        self.inner().modify_response(resp).await
    }

    /// See [`ProviderAdapter::fetch_models`].
    pub async fn fetch_models(
        &self,
        base_url: &Url,
        api_key: &str,
        http: &reqwest::Client,
    ) -> Result<Vec<ModelEntry>> {
        self.inner().fetch_models(base_url, api_key, http).await
    }
}

/// GET a JSON document from a provider endpoint, with optional bearer auth.
///
/// Non-2xx statuses become errors carrying the response body, so callers can
/// log a useful diagnostic before dropping the provider from an aggregate.
pub(crate) async fn get_json(
    http: &reqwest::Client,
    provider: &'static str,
    url: Url,
    bearer: Option<&str>,
) -> Result<Value> {
    let mut request = http
        .get(url.clone())
        .header(USER_AGENT, HeaderValue::from_static(GATEWAY_USER_AGENT));
    if let Some(token) = bearer.filter(|t| !t.is_empty()) {
        request = request.header(AUTHORIZATION, format!("Bearer {token}"));
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(GatewayError::upstream(
            provider,
            format!("request to {url} returned status {status}: {body}"),
        ));
    }

    response.json().await.map_err(Into::into)
}

/// Strip a `Bearer ` prefix from an `Authorization` header value.
pub(crate) fn bearer_token(value: &str) -> &str {
    value.strip_prefix("Bearer ").unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_for_style_tags() {
        assert_eq!(Adapter::for_style(ProviderStyle::OpenAi).name(), "openai");
        assert_eq!(
            Adapter::for_style(ProviderStyle::Anthropic).name(),
            "anthropic"
        );
        assert_eq!(Adapter::for_style(ProviderStyle::Google).name(), "google");
        assert_eq!(
            Adapter::for_style(ProviderStyle::Cloudflare).name(),
            "cloudflare"
        );
    }

    #[test]
    fn test_bearer_token_stripping() {
        assert_eq!(bearer_token("Bearer sk-1"), "sk-1");
        assert_eq!(bearer_token("sk-raw"), "sk-raw");
    }
}
