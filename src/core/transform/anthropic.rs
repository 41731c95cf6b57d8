//! Anthropic Messages API translation.
//!
//! Requests: system messages are pulled out of the conversation and
//! concatenated into the top-level `system` field; remaining messages keep
//! the user/assistant alternation Anthropic expects. `max_tokens` is
//! mandatory upstream, so an omitted value falls back to 1024.
//!
//! Responses: the single content block becomes the single unified choice,
//! `stop_reason` is surfaced as `finish_reason` unchanged, and input/output
//! token counts are folded into the unified usage triple.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::transform::now_unix;
use crate::core::types::{ChatChoice, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Usage};
use crate::error::{GatewayError, Result};

/// `max_tokens` sent upstream when the client omits one. Anthropic rejects
/// requests without it; truncation is the lesser evil.
const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    messages: Vec<OutboundMessage>,
    #[serde(skip_serializing_if = "String::is_empty")]
    system: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Serialize)]
struct OutboundMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: MessagesUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct MessagesUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

/// Translate a unified chat request into a Messages API request.
pub fn adapt_request(body: &[u8], model: &str) -> Result<Vec<u8>> {
    let unified: ChatCompletionRequest = serde_json::from_slice(body)
        .map_err(|e| GatewayError::transform("anthropic", format!("invalid request body: {e}")))?;

    let mut system = String::new();
    let mut messages = Vec::with_capacity(unified.messages.len());
    for msg in &unified.messages {
        match msg.role.as_str() {
            "system" => {
                if !system.is_empty() {
                    system.push('\n');
                }
                system.push_str(&msg.content);
            }
            "assistant" => messages.push(OutboundMessage {
                role: "assistant",
                content: msg.content.clone(),
            }),
            other => {
                if other != "user" {
                    warn!(role = other, "unsupported role for Anthropic, coercing to 'user'");
                }
                messages.push(OutboundMessage {
                    role: "user",
                    content: msg.content.clone(),
                });
            }
        }
    }

    let request = MessagesRequest {
        model: model.to_string(),
        messages,
        system,
        max_tokens: unified.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        stream: unified.stream,
        temperature: unified.temperature,
    };

    serde_json::to_vec(&request).map_err(Into::into)
}

/// Translate a Messages API response into the unified shape.
///
/// Bodies that do not parse as a Messages response (error envelopes, stream
/// events this translator does not model) pass through unchanged.
pub fn adapt_response(body: &[u8]) -> Result<Vec<u8>> {
    let upstream: MessagesResponse = match serde_json::from_slice(body) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(%err, "unparseable Anthropic response body, passing through");
            return Ok(body.to_vec());
        }
    };

    let mut choices = Vec::with_capacity(1);
    if let Some(block) = upstream.content.first() {
        choices.push(ChatChoice {
            index: 0,
            message: ChatMessage::new("assistant", block.text.clone()),
            finish_reason: upstream.stop_reason,
        });
    }

    let unified = ChatCompletionResponse {
        id: upstream.id,
        object: ChatCompletionResponse::OBJECT.to_string(),
        created: now_unix(),
        model: upstream.model,
        choices,
        usage: Some(Usage {
            prompt_tokens: upstream.usage.input_tokens,
            completion_tokens: upstream.usage.output_tokens,
            total_tokens: upstream.usage.input_tokens + upstream.usage.output_tokens,
        }),
    };

    serde_json::to_vec(&unified).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn request_value(body: Value, model: &str) -> Value {
        let bytes = serde_json::to_vec(&body).unwrap();
        let out = adapt_request(&bytes, model).unwrap();
        serde_json::from_slice(&out).unwrap()
    }

    #[test]
    fn test_system_messages_concatenate_and_vanish() {
        let out = request_value(
            json!({
                "model": "claude-3-opus-20240229",
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "hi"},
                    {"role": "system", "content": "be kind"}
                ]
            }),
            "claude-3-opus-20240229",
        );

        assert_eq!(out["system"], "be brief\nbe kind");
        let messages = out["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages.iter().all(|m| m["role"] != "system"));
    }

    #[test]
    fn test_system_field_absent_without_system_messages() {
        let out = request_value(
            json!({"model": "m", "messages": [{"role": "user", "content": "hi"}]}),
            "m",
        );
        assert!(out.get("system").is_none());
    }

    #[test]
    fn test_max_tokens_defaults_to_1024() {
        let out = request_value(json!({"model": "m", "messages": []}), "m");
        assert_eq!(out["max_tokens"], 1024);

        let out = request_value(
            json!({"model": "m", "messages": [], "max_tokens": 9}),
            "m",
        );
        assert_eq!(out["max_tokens"], 9);
    }

    #[test]
    fn test_unknown_role_coerced_to_user() {
        let out = request_value(
            json!({"model": "m", "messages": [{"role": "tool", "content": "x"}]}),
            "m",
        );
        assert_eq!(out["messages"][0]["role"], "user");
    }

    #[test]
    fn test_stream_and_temperature_forwarded() {
        let out = request_value(
            json!({"model": "m", "messages": [], "stream": true, "temperature": 0.25}),
            "m",
        );
        assert_eq!(out["stream"], true);
        assert_eq!(out["temperature"], 0.25);
    }

    #[test]
    fn test_response_maps_to_single_choice_with_usage() {
        let body = serde_json::to_vec(&json!({
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "model": "claude-3-opus-20240229",
            "content": [{"type": "text", "text": "hello there"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 11, "output_tokens": 7}
        }))
        .unwrap();

        let out = adapt_response(&body).unwrap();
        let out: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(out["object"], "chat.completion");
        assert_eq!(out["choices"].as_array().unwrap().len(), 1);
        assert_eq!(out["choices"][0]["message"]["role"], "assistant");
        assert_eq!(out["choices"][0]["message"]["content"], "hello there");
        assert_eq!(out["choices"][0]["finish_reason"], "end_turn");
        assert_eq!(out["usage"]["prompt_tokens"], 11);
        assert_eq!(out["usage"]["completion_tokens"], 7);
        assert_eq!(out["usage"]["total_tokens"], 18);
    }

    #[test]
    fn test_unparseable_response_passes_through() {
        let body = b"event: ping";
        let out = adapt_response(body).unwrap();
        assert_eq!(out, body);
    }
}
