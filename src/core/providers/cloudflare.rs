//! Cloudflare Workers AI adapter.
//!
//! Chat runs against `/run/<model>` with the model stripped from the body.
//! The catalog lives at `/models/search` behind either cursor-based or
//! page-based pagination depending on the account; the fetch follows
//! whichever mode the response advertises, with a hard iteration cap as a
//! backstop against a misbehaving upstream.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::core::http::{
    join_path, rewrite_request_body, rewrite_response_body, transform_body_chunks,
    UpstreamRequest, UpstreamResponse,
};
use crate::core::transform;
use crate::core::types::ModelEntry;
use crate::error::Result;

use super::{get_json, ProviderAdapter};

/// Hard upper bound on pagination rounds.
const MAX_PAGES: usize = 1000;

/// Page size requested in page-number mode.
const PER_PAGE: usize = 100;

/// Adapter for Cloudflare Workers AI.
#[derive(Debug, Clone, Copy, Default)]
pub struct CloudflareAdapter;

#[derive(Debug, Default, Deserialize)]
struct SearchPage {
    #[serde(default)]
    result: Vec<SearchEntry>,
    #[serde(default)]
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct SearchEntry {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    total_pages: usize,
    #[serde(default)]
    count: usize,
    #[serde(default)]
    cursors: Option<Cursors>,
}

#[derive(Debug, Default, Deserialize)]
struct Cursors {
    #[serde(default)]
    after: String,
}

/// What to request next while walking the catalog.
#[derive(Debug, PartialEq, Eq)]
enum PageStep {
    /// Follow a server-provided cursor.
    Cursor(String),
    /// Request the given page number.
    Page(usize),
    /// Pagination is complete.
    Done,
}

/// Decide the next pagination step from one response page.
///
/// Cursor mode wins when the server offers an `after` cursor. Otherwise page
/// numbers advance until `total_pages` is reached; when the server reports
/// no totals, a short page signals the end.
fn next_step(info: Option<&ResultInfo>, page: usize, fetched: usize) -> PageStep {
    let Some(info) = info else {
        // No paging metadata at all: single-page catalog.
        return PageStep::Done;
    };

    if let Some(after) = info
        .cursors
        .as_ref()
        .map(|c| c.after.as_str())
        .filter(|after| !after.is_empty())
    {
        return PageStep::Cursor(after.to_string());
    }

    if info.total_pages > 0 {
        if page >= info.total_pages {
            return PageStep::Done;
        }
        return PageStep::Page(page + 1);
    }

    if info.count < PER_PAGE || fetched < PER_PAGE {
        return PageStep::Done;
    }
    PageStep::Page(page + 1)
}

#[async_trait]
impl ProviderAdapter for CloudflareAdapter {
    fn name(&self) -> &'static str {
        "cloudflare"
    }

    fn modify_request(&self, req: &mut UpstreamRequest, model: &str) -> Result<()> {
        req.push_path(&format!("/run/{model}"));
        req.headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        rewrite_request_body(req, |body| {
            transform::cloudflare::adapt_request(body, model)
        })
    }

    async fn modify_response(&self, resp: &mut UpstreamResponse) -> Result<()> {
        let content_type = resp.content_type().map(str::to_owned);
        rewrite_response_body(resp, |body| {
            transform_body_chunks(
                content_type.as_deref(),
                body,
                transform::cloudflare::adapt_response,
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
        let search_path = join_path(base_url.path(), "models/search");

        let mut all = Vec::new();
        let mut page = 1usize;
        let mut cursor = String::new();

        for round in 0..MAX_PAGES {
            let mut url = base_url.clone();
            url.set_path(&search_path);
            {
                let mut query = url.query_pairs_mut();
                if cursor.is_empty() {
                    query.append_pair("page", &page.to_string());
                    query.append_pair("per_page", &PER_PAGE.to_string());
                } else {
                    query.append_pair("cursor", &cursor);
                }
            }

            let payload = get_json(http, self.name(), url, Some(api_key)).await?;
            let parsed: SearchPage = serde_json::from_value(payload).unwrap_or_default();

            let fetched = parsed.result.len();
            for entry in parsed.result {
                // Workers AI models are addressed by name; surface it as the id.
                if let Some(name) = entry.name {
                    all.push(ModelEntry::new(name.clone(), name));
                }
            }

            match next_step(parsed.result_info.as_ref(), page, fetched) {
                PageStep::Cursor(after) => cursor = after,
                PageStep::Page(next) => {
                    cursor.clear();
                    page = next;
                }
                PageStep::Done => break,
            }

            debug!(round, total = all.len(), "continuing Cloudflare catalog pagination");
        }

        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::{json, Value};

    #[test]
    fn test_run_path_and_model_strip() {
        let mut req = UpstreamRequest::post(
            Url::parse("https://api.cloudflare.com/client/v4/accounts/abc/ai").unwrap(),
        );
        req.body = Bytes::from(
            serde_json::to_vec(&json!({
                "model": "@cf/meta/llama-3",
                "messages": [{"role": "user", "content": "hi"}]
            }))
            .unwrap(),
        );

        CloudflareAdapter
            .modify_request(&mut req, "@cf/meta/llama-3")
            .unwrap();

        assert_eq!(
            req.url.as_str(),
            "https://api.cloudflare.com/client/v4/accounts/abc/ai/run/@cf/meta/llama-3"
        );
        let body: Value = serde_json::from_slice(&req.body).unwrap();
        assert!(body.get("model").is_none());
    }

    #[tokio::test]
    async fn test_sse_response_chunks_are_unified() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("text/event-stream"),
        );
        let mut resp = UpstreamResponse {
            status: reqwest::StatusCode::OK,
            headers,
            body: crate::core::http::Body::Buffered(Bytes::from_static(
                b"data: {\"response\":\"A\"}\n\ndata: {\"response\":\"B\"}\n\ndata: [DONE]\n\n",
            )),
        };

        CloudflareAdapter.modify_response(&mut resp).await.unwrap();

        let bytes = resp.buffer().await.unwrap();
        let text = std::str::from_utf8(bytes).unwrap();
        let chunks: Vec<&str> = text.split("\n\n").collect();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with("data: "));
        assert!(text.contains("\"content\":\"A\""));
        assert!(text.contains("\"content\":\"B\""));
        assert!(!text.contains("[DONE]"));
    }

    #[test]
    fn test_cursor_mode_wins_over_page_mode() {
        let info = ResultInfo {
            total_pages: 7,
            count: PER_PAGE,
            cursors: Some(Cursors {
                after: "abc".into(),
            }),
        };
        assert_eq!(
            next_step(Some(&info), 1, PER_PAGE),
            PageStep::Cursor("abc".into())
        );
    }

    #[test]
    fn test_empty_cursor_falls_back_to_pages() {
        let info = ResultInfo {
            total_pages: 3,
            count: PER_PAGE,
            cursors: Some(Cursors { after: String::new() }),
        };
        assert_eq!(next_step(Some(&info), 1, PER_PAGE), PageStep::Page(2));
        assert_eq!(next_step(Some(&info), 3, PER_PAGE), PageStep::Done);
    }

    #[test]
    fn test_short_page_terminates_without_totals() {
        let info = ResultInfo {
            total_pages: 0,
            count: 40,
            cursors: None,
        };
        assert_eq!(next_step(Some(&info), 2, 40), PageStep::Done);

        let info = ResultInfo {
            total_pages: 0,
            count: PER_PAGE,
            cursors: None,
        };
        assert_eq!(next_step(Some(&info), 2, PER_PAGE), PageStep::Page(3));
    }

    #[test]
    fn test_missing_result_info_stops_after_first_page() {
        assert_eq!(next_step(None, 1, 12), PageStep::Done);
    }
}
