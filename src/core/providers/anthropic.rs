//! Anthropic adapter.
//!
//! Anthropic authenticates with `x-api-key` instead of a bearer header and
//! pins API behavior with `anthropic-version`. The body translation runs
//! eagerly so the auth move and the rewritten payload travel together.
//! There is no catalog endpoint; the fetch reports an empty list.

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use url::Url;

use crate::core::http::{
    rewrite_request_body, rewrite_response_body, transform_body_chunks, UpstreamRequest,
    UpstreamResponse,
};
use crate::core::transform;
use crate::core::types::ModelEntry;
use crate::error::Result;

use super::{bearer_token, ProviderAdapter};

const X_API_KEY: HeaderName = HeaderName::from_static("x-api-key");
const ANTHROPIC_VERSION: HeaderName = HeaderName::from_static("anthropic-version");

/// Messages API version the gateway speaks.
const API_VERSION: &str = "2023-06-01";

/// Adapter for the Anthropic Messages API.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicAdapter;

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn modify_request(&self, req: &mut UpstreamRequest, model: &str) -> Result<()> {
        req.push_path("/v1/messages");

        rewrite_request_body(req, |body| {
            transform::anthropic::adapt_request(body, model)
        })?;

        req.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        req.headers
            .insert(ANTHROPIC_VERSION, HeaderValue::from_static(API_VERSION));

        // Bearer auth moves into Anthropic's native slot.
        if let Some(auth) = req.headers.remove(AUTHORIZATION) {
            if let Ok(value) = auth.to_str() {
                if let Ok(key) = HeaderValue::from_str(bearer_token(value)) {
                    req.headers.insert(X_API_KEY, key);
                }
            }
        }

        Ok(())
    }

    async fn modify_response(&self, resp: &mut UpstreamResponse) -> Result<()> {
        let content_type = resp.content_type().map(str::to_owned);
        rewrite_response_body(resp, |body| {
            transform_body_chunks(
                content_type.as_deref(),
                body,
                transform::anthropic::adapt_response,
            )
        })
        .await
    }

    async fn fetch_models(
        &self,
        _base_url: &Url,
        _api_key: &str,
        _http: &reqwest::Client,
    ) -> Result<Vec<ModelEntry>> {
        // No public models listing; the aggregate simply omits Anthropic.
        Ok(Vec::new())
    }
}
