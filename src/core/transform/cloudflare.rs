//! Cloudflare Workers AI translation.
//!
//! The model id lives in the `/run/<model>` URL, so the request body is the
//! unified shape minus its `model` key. Responses come in two shapes,
//! `{"response": ...}` directly or wrapped as `{"result": {"response": ...}}`;
//! both collapse to a single assistant choice. The same rewrite runs per
//! chunk on streamed responses.

use serde_json::{json, Map, Value};
use tracing::warn;

use crate::error::{GatewayError, Result};

/// Strip the `model` key from the unified request body.
pub fn adapt_request(body: &[u8], _model: &str) -> Result<Vec<u8>> {
    let mut payload: Map<String, Value> = serde_json::from_slice(body)
        .map_err(|e| GatewayError::transform("cloudflare", format!("invalid request body: {e}")))?;

    payload.remove("model");

    serde_json::to_vec(&payload).map_err(Into::into)
}

/// Rewrite a Workers AI response (or stream chunk) to the unified shape.
///
/// Bodies in neither known shape pass through unchanged.
pub fn adapt_response(body: &[u8]) -> Result<Vec<u8>> {
    let payload: Value = match serde_json::from_slice(body) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(%err, "unparseable Cloudflare response body, passing through");
            return Ok(body.to_vec());
        }
    };

    let response_text = payload
        .get("response")
        .and_then(Value::as_str)
        .or_else(|| {
            payload
                .get("result")
                .and_then(|r| r.get("response"))
                .and_then(Value::as_str)
        });

    let Some(text) = response_text else {
        return Ok(body.to_vec());
    };

    let unified = json!({
        "choices": [{
            "message": {"role": "assistant", "content": text},
            "index": 0,
            "logprobs": null,
            "finish_reason": ""
        }]
    });

    serde_json::to_vec(&unified).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::http::transform_body_chunks;

    #[test]
    fn test_model_key_is_removed() {
        let body = serde_json::to_vec(&json!({
            "model": "@cf/meta/llama-3",
            "messages": [{"role": "user", "content": "hi"}],
            "stream": true
        }))
        .unwrap();

        let out = adapt_request(&body, "@cf/meta/llama-3").unwrap();
        let out: Value = serde_json::from_slice(&out).unwrap();
        assert!(out.get("model").is_none());
        assert_eq!(out["stream"], true);
        assert_eq!(out["messages"][0]["content"], "hi");
    }

    #[test]
    fn test_request_without_model_unchanged() {
        let body = serde_json::to_vec(&json!({"messages": []})).unwrap();
        let out = adapt_request(&body, "m").unwrap();
        let out: Value = serde_json::from_slice(&out).unwrap();
        assert!(out.get("model").is_none());
        assert!(out["messages"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_direct_response_shape() {
        let out = adapt_response(br#"{"response":"A","usage":{"prompt_tokens":1}}"#).unwrap();
        let out: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(out["choices"][0]["message"]["content"], "A");
        assert_eq!(out["choices"][0]["message"]["role"], "assistant");
        assert_eq!(out["choices"][0]["index"], 0);
    }

    #[test]
    fn test_wrapped_response_shape() {
        let out = adapt_response(br#"{"result":{"response":"B"}}"#).unwrap();
        let out: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(out["choices"][0]["message"]["content"], "B");
    }

    #[test]
    fn test_unknown_shape_passes_through() {
        let body = br#"{"result":{"data":[1,2,3]}}"#;
        let out = adapt_response(body).unwrap();
        assert_eq!(out, body);
    }

    #[test]
    fn test_streamed_chunks_rewrite_individually() {
        let body = b"data: {\"response\":\"A\"}\n\ndata: {\"response\":\"B\"}\n\ndata: [DONE]\n\n";
        let out = transform_body_chunks(Some("text/event-stream"), body, adapt_response).unwrap();
        let out = String::from_utf8(out).unwrap();

        let chunks: Vec<&str> = out.split("\n\n").collect();
        assert_eq!(chunks.len(), 2);
        for (chunk, expected) in chunks.iter().zip(["A", "B"]) {
            let payload: Value =
                serde_json::from_str(chunk.strip_prefix("data: ").unwrap()).unwrap();
            assert_eq!(payload["choices"][0]["message"]["content"], expected);
        }
        assert!(!out.contains("[DONE]"));
    }
}
