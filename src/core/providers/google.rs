//! Google Gemini adapter.
//!
//! Gemini routes by model in the URL (`/models/<model>:generateContent`) and
//! authenticates with a `key` query parameter rather than a header, so the
//! bearer token moves out of `Authorization` and into the query string.

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

use crate::core::http::{
    join_path, rewrite_request_body, rewrite_response_body, transform_body_chunks,
    UpstreamRequest, UpstreamResponse,
};
use crate::core::transform;
use crate::core::types::ModelEntry;
use crate::error::{GatewayError, Result};

use super::{bearer_token, get_json, ProviderAdapter};

/// Adapter for Google Gemini `generateContent`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoogleAdapter;

#[derive(Debug, Deserialize)]
struct ListedModel {
    #[serde(default)]
    name: String,
    #[serde(default, rename = "displayName")]
    display_name: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[async_trait]
impl ProviderAdapter for GoogleAdapter {
    fn name(&self) -> &'static str {
        "google"
    }

    fn modify_request(&self, req: &mut UpstreamRequest, model: &str) -> Result<()> {
        req.push_path(&format!("/models/{model}:generateContent"));

        // Bearer auth moves into the `key` query parameter.
        if let Some(auth) = req.headers.remove(AUTHORIZATION) {
            if let Ok(value) = auth.to_str() {
                let token = bearer_token(value).to_string();
                if !token.is_empty() {
                    req.url.query_pairs_mut().append_pair("key", &token);
                }
            }
        }

        req.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        rewrite_request_body(req, |body| transform::google::adapt_request(body, model))
    }

    async fn modify_response(&self, resp: &mut UpstreamResponse) -> Result<()> {
        let content_type = resp.content_type().map(str::to_owned);
        rewrite_response_body(resp, |body| {
            transform_body_chunks(
                content_type.as_deref(),
                body,
                transform::google::adapt_response,
            )
        })
        .await
    }

    async fn fetch_models(
        &self,
        base_url: &Url,
        api_key: &str,
        http: &reqwest::Client,
    ) -> Result<Vec<ModelEntry>> {
        let mut url = base_url.clone();
        url.set_path(&join_path(base_url.path(), "v1beta/models"));
        if !api_key.is_empty() {
            url.query_pairs_mut().append_pair("key", api_key);
        }

        let payload = get_json(http, self.name(), url, None).await?;
        let models = payload
            .get("models")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));
        let listed: Vec<ListedModel> = serde_json::from_value(models)
            .map_err(|e| GatewayError::transform("google", format!("invalid models payload: {e}")))?;

        Ok(listed
            .into_iter()
            .filter(|model| !model.name.is_empty())
            .map(|model| {
                let name = model.display_name.unwrap_or_else(|| model.name.clone());
                ModelEntry {
                    id: model.name,
                    name,
                    extra: model.extra,
                }
            })
            .collect())
    }
}
