//! OpenAI-style adapter: the pass-through default.
//!
//! Covers OpenAI itself and every compatible backend (OpenRouter, Groq and
//! friends). Requests keep their shape apart from the resolved model id;
//! responses come back already unified.

use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use url::Url;

use crate::core::http::{join_path, rewrite_request_body, UpstreamRequest, UpstreamResponse};
use crate::core::transform;
use crate::core::types::ModelEntry;
use crate::error::{GatewayError, Result};

use super::{get_json, ProviderAdapter};

/// Adapter for OpenAI-compatible backends.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiAdapter;

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn modify_request(&self, req: &mut UpstreamRequest, model: &str) -> Result<()> {
        req.push_path("/chat/completions");
        req.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        rewrite_request_body(req, |body| transform::openai::adapt_request(body, model))
    }

    async fn modify_response(&self, _resp: &mut UpstreamResponse) -> Result<()> {
        Ok(())
    }

    async fn fetch_models(
        &self,
        base_url: &Url,
        api_key: &str,
        http: &reqwest::Client,
    ) -> Result<Vec<ModelEntry>> {
        let mut url = base_url.clone();
        url.set_path(&join_path(base_url.path(), "models"));

        let payload = get_json(http, self.name(), url, Some(api_key)).await?;
        let data = payload
            .get("data")
            .cloned()
            .unwrap_or_else(|| serde_json::Value::Array(Vec::new()));
        let entries: Vec<ModelEntry> = serde_json::from_value(data)
            .map_err(|e| GatewayError::transform("openai", format!("invalid models payload: {e}")))?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::{json, Value};

    #[test]
    fn test_request_path_and_body() {
        let mut req =
            UpstreamRequest::post(Url::parse("https://api.openai.com/v1").unwrap());
        req.body = Bytes::from(
            serde_json::to_vec(&json!({
                "model": "openai/gpt-4o",
                "messages": [{"role": "user", "content": "hi"}]
            }))
            .unwrap(),
        );

        OpenAiAdapter.modify_request(&mut req, "gpt-4o").unwrap();

        assert_eq!(
            req.url.as_str(),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(req.headers[CONTENT_TYPE], "application/json");
        let body: Value = serde_json::from_slice(&req.body).unwrap();
        assert_eq!(body["model"], "gpt-4o");
    }

    #[tokio::test]
    async fn test_response_is_untouched() {
        let mut resp = UpstreamResponse::plain_text(reqwest::StatusCode::OK, "{}");
        let before = format!("{:?}", resp.headers);
        OpenAiAdapter.modify_response(&mut resp).await.unwrap();
        assert_eq!(format!("{:?}", resp.headers), before);
    }
}
