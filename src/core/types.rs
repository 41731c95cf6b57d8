//! Unified data model.
//!
//! The gateway's external contract is the OpenAI chat-completions schema;
//! these types are the canonical request/response shapes every provider
//! translation starts from or ends at. Roles are kept as plain strings so
//! unknown roles survive the proxy hop and can be coerced (with a warning)
//! by the adapters that need a closed role set.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `system`, `user` or `assistant`. Unknown roles pass through.
    pub role: String,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Build a message from role and content.
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        ChatMessage {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Chat completion request in the unified (OpenAI-compatible) shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// Requested model: bare (`gpt-4o`), prefixed (`openai/gpt-4o`), or any
    /// string for fuzzy fallback.
    pub model: String,

    /// Conversation messages, in order.
    pub messages: Vec<ChatMessage>,

    /// Whether the client asked for a streamed response.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,

    /// Maximum completion tokens. Absent is not the same as zero.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// One completion choice in a unified response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    /// Position of this choice.
    pub index: u32,
    /// The generated message.
    pub message: ChatMessage,
    /// Provider-reported finish reason, surfaced unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Token usage for a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u32,
    /// Tokens produced by the completion.
    pub completion_tokens: u32,
    /// Sum of prompt and completion tokens.
    pub total_tokens: u32,
}

/// Chat completion response in the unified shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    /// Response id, provider-assigned or generated.
    pub id: String,
    /// Always `chat.completion`.
    pub object: String,
    /// Unix seconds.
    pub created: i64,
    /// Model that produced the completion.
    #[serde(default)]
    pub model: String,
    /// Completion choices, in order.
    pub choices: Vec<ChatChoice>,
    /// Token usage, when the provider reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatCompletionResponse {
    /// The canonical `object` tag for completions.
    pub const OBJECT: &'static str = "chat.completion";
}

/// A catalog entry as surfaced by the model aggregator.
///
/// Only `id` and `name` are required; richer provider-specific attributes
/// are carried through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Model identifier, unique within the aggregate.
    pub id: String,
    /// Display name. Falls back to empty when the provider omits it.
    #[serde(default)]
    pub name: String,
    /// Any additional provider attributes, preserved as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModelEntry {
    /// Build a minimal entry from id and name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        ModelEntry {
            id: id.into(),
            name: name.into(),
            extra: Map::new(),
        }
    }
}

/// Aggregated catalog response: `{"data": [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelCatalog {
    /// Entries in first-seen order.
    pub data: Vec<ModelEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_tokens_absent_is_not_zero() {
        let req: ChatCompletionRequest = serde_json::from_value(serde_json::json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .unwrap();
        assert_eq!(req.max_tokens, None);

        let req: ChatCompletionRequest = serde_json::from_value(serde_json::json!({
            "model": "gpt-4o",
            "messages": [],
            "max_tokens": 0
        }))
        .unwrap();
        assert_eq!(req.max_tokens, Some(0));
    }

    #[test]
    fn test_stream_defaults_false_and_is_omitted() {
        let req: ChatCompletionRequest = serde_json::from_value(serde_json::json!({
            "model": "m",
            "messages": []
        }))
        .unwrap();
        assert!(!req.stream);
        let out = serde_json::to_value(&req).unwrap();
        assert!(out.get("stream").is_none());
    }

    #[test]
    fn test_unknown_role_passes_through() {
        let msg: ChatMessage =
            serde_json::from_value(serde_json::json!({"role": "tool", "content": "x"})).unwrap();
        assert_eq!(msg.role, "tool");
    }

    #[test]
    fn test_model_entry_preserves_extra_attributes() {
        let entry: ModelEntry = serde_json::from_value(serde_json::json!({
            "id": "gpt-4o",
            "name": "GPT-4o",
            "context_length": 128000
        }))
        .unwrap();
        assert_eq!(entry.extra["context_length"], 128000);
        let out = serde_json::to_value(&entry).unwrap();
        assert_eq!(out["context_length"], 128000);
    }

    #[test]
    fn test_response_omits_absent_usage() {
        let resp = ChatCompletionResponse {
            id: "r1".into(),
            object: ChatCompletionResponse::OBJECT.into(),
            created: 0,
            model: "m".into(),
            choices: vec![],
            usage: None,
        };
        let out = serde_json::to_value(&resp).unwrap();
        assert!(out.get("usage").is_none());
    }
}
