//! HTTP wire types and body hooks.
//!
//! The gateway is framework-neutral: inbound requests arrive as buffered
//! bytes plus headers, outbound traffic is described by [`UpstreamRequest`]
//! and [`UpstreamResponse`]. Response bodies stream by default; a body is
//! only buffered when a translation has to run over it.
//!
//! The hooks at the bottom are the buffer-and-rewrite helpers shared by all
//! adapters, including the chunk-wise rewrite of `text/event-stream` bodies.

use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use url::Url;

use crate::error::Result;

/// Sentinel terminating an SSE stream.
pub const SSE_DONE: &str = "[DONE]";

/// An outbound request about to be proxied upstream.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    /// HTTP method.
    pub method: Method,
    /// Fully-resolved upstream URL.
    pub url: Url,
    /// Headers to send upstream.
    pub headers: HeaderMap,
    /// Buffered request body.
    pub body: Bytes,
}

impl UpstreamRequest {
    /// Build a POST request against a base URL with an empty body.
    pub fn post(url: Url) -> Self {
        UpstreamRequest {
            method: Method::POST,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Append a path segment to the URL, collapsing duplicate slashes.
    pub fn push_path(&mut self, suffix: &str) {
        let joined = join_path(self.url.path(), suffix);
        self.url.set_path(&joined);
    }
}

/// Response body: streamed through untouched, or buffered for translation.
pub enum Body {
    /// Fully-buffered body.
    Buffered(Bytes),
    /// Pass-through byte stream from the upstream connection.
    Streaming(BoxStream<'static, reqwest::Result<Bytes>>),
}

impl Body {
    /// Consume the body, collecting a stream into contiguous bytes.
    pub async fn into_bytes(self) -> Result<Bytes> {
        match self {
            Body::Buffered(bytes) => Ok(bytes),
            Body::Streaming(mut stream) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
        }
    }

    /// Whether the body is still a live stream.
    pub fn is_streaming(&self) -> bool {
        matches!(self, Body::Streaming(_))
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Body::Buffered(bytes) => f.debug_tuple("Buffered").field(&bytes.len()).finish(),
            Body::Streaming(_) => f.write_str("Streaming"),
        }
    }
}

/// A response on its way back to the client.
#[derive(Debug)]
pub struct UpstreamResponse {
    /// HTTP status, upstream's unless the gateway produced the response.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Body,
}

impl UpstreamResponse {
    /// A plain-text response, used for gateway-generated errors.
    pub fn plain_text(status: StatusCode, message: impl Into<String>) -> Self {
        let body = Bytes::from(message.into());
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        UpstreamResponse {
            status,
            headers,
            body: Body::Buffered(body),
        }
    }

    /// A JSON response from a serializable payload.
    pub fn json<T: serde::Serialize>(status: StatusCode, payload: &T) -> Result<Self> {
        let body = Bytes::from(serde_json::to_vec(payload)?);
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        Ok(UpstreamResponse {
            status,
            headers,
            body: Body::Buffered(body),
        })
    }

    /// Essence of the `Content-Type` header, parameters stripped.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim())
    }

    /// Buffer a streaming body in place and return the bytes.
    pub async fn buffer(&mut self) -> Result<&Bytes> {
        if self.body.is_streaming() {
            let body = std::mem::replace(&mut self.body, Body::Buffered(Bytes::new()));
            self.body = Body::Buffered(body.into_bytes().await?);
        }
        match &self.body {
            Body::Buffered(bytes) => Ok(bytes),
            Body::Streaming(_) => unreachable!("body buffered above"),
        }
    }
}

/// Join two URL path fragments with exactly one slash between them.
pub fn join_path(base: &str, suffix: &str) -> String {
    let base = base.trim_end_matches('/');
    let suffix = suffix.trim_start_matches('/');
    if suffix.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base, suffix)
}

/// Rewrite a buffered request body and fix the length header.
pub fn rewrite_request_body<F>(req: &mut UpstreamRequest, transform: F) -> Result<()>
where
    F: FnOnce(&[u8]) -> Result<Vec<u8>>,
{
    let rewritten = transform(&req.body)?;
    req.headers
        .insert(CONTENT_LENGTH, HeaderValue::from(rewritten.len()));
    req.body = Bytes::from(rewritten);
    Ok(())
}

/// Buffer and rewrite a response body, fixing the length header.
pub async fn rewrite_response_body<F>(resp: &mut UpstreamResponse, transform: F) -> Result<()>
where
    F: FnOnce(&[u8]) -> Result<Vec<u8>>,
{
    resp.buffer().await?;
    let Body::Buffered(bytes) = &resp.body else {
        unreachable!("body buffered above")
    };
    let rewritten = transform(bytes)?;
    resp.headers
        .insert(CONTENT_LENGTH, HeaderValue::from(rewritten.len()));
    resp.body = Body::Buffered(Bytes::from(rewritten));
    Ok(())
}

/// Apply a JSON-chunk translation to a body, honoring its content type.
///
/// `application/json` bodies are translated once. `text/event-stream` bodies
/// are split on the `data: ` marker; blanks and the `[DONE]` sentinel are
/// dropped, each remaining chunk is translated independently, and the result
/// is rejoined with blank-line separators. Anything else passes through
/// untouched.
pub fn transform_body_chunks<F>(
    content_type: Option<&str>,
    body: &[u8],
    transform: F,
) -> Result<Vec<u8>>
where
    F: Fn(&[u8]) -> Result<Vec<u8>>,
{
    match content_type {
        Some("application/json") => transform(body),
        Some("text/event-stream") => {
            let text = String::from_utf8_lossy(body);
            let mut out: Vec<String> = Vec::new();
            for chunk in text.split("data: ") {
                let chunk = chunk.trim();
                if chunk.is_empty() || chunk == SSE_DONE {
                    continue;
                }
                let rewritten = transform(chunk.as_bytes())?;
                out.push(format!("data: {}", String::from_utf8_lossy(&rewritten)));
            }
            Ok(out.join("\n\n").into_bytes())
        }
        _ => Ok(body.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn upper(body: &[u8]) -> Result<Vec<u8>> {
        Ok(body.to_ascii_uppercase())
    }

    #[test]
    fn test_join_path_single_slash() {
        assert_eq!(join_path("/v1/", "/chat/completions"), "/v1/chat/completions");
        assert_eq!(join_path("/v1", "chat/completions"), "/v1/chat/completions");
        assert_eq!(join_path("/", ""), "");
        assert_eq!(join_path("", "models"), "/models");
    }

    #[test]
    fn test_push_path_keeps_base_prefix() {
        let mut req = UpstreamRequest::post(Url::parse("https://api.openai.com/v1").unwrap());
        req.push_path("/chat/completions");
        assert_eq!(req.url.as_str(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_json_body_transformed_once() {
        let out = transform_body_chunks(Some("application/json"), b"abc", upper).unwrap();
        assert_eq!(out, b"ABC");
    }

    #[test]
    fn test_sse_chunks_transformed_independently() {
        let body = b"data: one\n\ndata: two\n\ndata: [DONE]\n\n";
        let out = transform_body_chunks(Some("text/event-stream"), body, upper).unwrap();
        assert_eq!(out, b"data: ONE\n\ndata: TWO");
    }

    #[test]
    fn test_sse_chunk_count_and_order_preserved() {
        let chunks = ["a", "b", "c", "d"];
        let body = chunks
            .iter()
            .map(|c| format!("data: {}\n\n", c))
            .collect::<String>();
        let out =
            transform_body_chunks(Some("text/event-stream"), body.as_bytes(), |c| {
                Ok(c.to_vec())
            })
            .unwrap();
        let out = String::from_utf8(out).unwrap();
        let rejoined: Vec<&str> = out.split("\n\n").collect();
        assert_eq!(rejoined.len(), chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(rejoined[i], format!("data: {}", chunk));
        }
    }

    #[test]
    fn test_unknown_content_type_passes_through() {
        let out = transform_body_chunks(Some("text/html"), b"<p>hi</p>", upper).unwrap();
        assert_eq!(out, b"<p>hi</p>");
        let out = transform_body_chunks(None, b"raw", upper).unwrap();
        assert_eq!(out, b"raw");
    }

    #[test]
    fn test_request_rewrite_updates_content_length() {
        let mut req = UpstreamRequest::post(Url::parse("https://x.example").unwrap());
        req.body = Bytes::from_static(b"hello");
        rewrite_request_body(&mut req, |b| Ok([b, b" world"].concat())).unwrap();
        assert_eq!(&req.body[..], b"hello world");
        assert_eq!(req.headers[CONTENT_LENGTH], HeaderValue::from(11));
    }

    #[tokio::test]
    async fn test_streamed_body_buffers_in_order() {
        let parts: Vec<reqwest::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"ab")),
            Ok(Bytes::from_static(b"cd")),
        ];
        let mut resp = UpstreamResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Body::Streaming(stream::iter(parts).boxed()),
        };
        let bytes = resp.buffer().await.unwrap();
        assert_eq!(&bytes[..], b"abcd");
        assert!(!resp.body.is_streaming());
    }

    #[tokio::test]
    async fn test_response_rewrite_sets_length() {
        let mut resp = UpstreamResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Body::Buffered(Bytes::from_static(b"xy")),
        };
        rewrite_response_body(&mut resp, upper).await.unwrap();
        let Body::Buffered(bytes) = &resp.body else {
            panic!("buffered")
        };
        assert_eq!(&bytes[..], b"XY");
        assert_eq!(resp.headers[CONTENT_LENGTH], HeaderValue::from(2));
    }

    #[test]
    fn test_content_type_strips_parameters() {
        let resp = UpstreamResponse::plain_text(StatusCode::OK, "ok");
        assert_eq!(resp.content_type(), Some("text/plain"));
    }
}
