//! Google Gemini `generateContent` translation.
//!
//! Gemini has no `assistant` role and no first-class system prompt in the
//! base API: `assistant` maps to `model`, and a `system` message becomes the
//! opening `user` turn when it leads the conversation, or a `model` turn
//! when it appears mid-history. The model id travels in the URL, not the
//! body.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::transform::now_unix;
use crate::core::types::{ChatChoice, ChatCompletionRequest, ChatCompletionResponse, ChatMessage};
use crate::error::{GatewayError, Result};

#[derive(Debug, Serialize, Deserialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
    #[serde(default, rename = "finishReason")]
    finish_reason: Option<String>,
}

/// Translate a unified chat request into a `generateContent` body.
pub fn adapt_request(body: &[u8], _model: &str) -> Result<Vec<u8>> {
    let unified: ChatCompletionRequest = serde_json::from_slice(body)
        .map_err(|e| GatewayError::transform("google", format!("invalid request body: {e}")))?;

    let mut contents = Vec::with_capacity(unified.messages.len());
    for msg in &unified.messages {
        let role = match msg.role.as_str() {
            "assistant" => "model",
            "system" => {
                info!(content = %msg.content, "folding system message into Gemini contents");
                if contents.is_empty() {
                    "user"
                } else {
                    "model"
                }
            }
            "user" => "user",
            other => {
                warn!(role = other, "unsupported role for Gemini, coercing to 'user'");
                "user"
            }
        };
        contents.push(Content {
            role: role.to_string(),
            parts: vec![Part {
                text: msg.content.clone(),
            }],
        });
    }

    serde_json::to_vec(&GenerateContentRequest { contents }).map_err(Into::into)
}

/// Translate a `generateContent` response into the unified shape.
///
/// Token usage is not mapped: the base response carries none. Bodies that do
/// not parse as a candidate list pass through unchanged.
pub fn adapt_response(body: &[u8]) -> Result<Vec<u8>> {
    let upstream: GenerateContentResponse = match serde_json::from_slice(body) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(%err, "unparseable Gemini response body, passing through");
            return Ok(body.to_vec());
        }
    };

    let mut choices = Vec::with_capacity(1);
    if let Some(candidate) = upstream.candidates.first() {
        let text = candidate
            .content
            .parts
            .first()
            .map(|part| part.text.clone())
            .unwrap_or_default();
        choices.push(ChatChoice {
            index: 0,
            message: ChatMessage::new("assistant", text),
            finish_reason: candidate.finish_reason.clone(),
        });
    }

    let unified = ChatCompletionResponse {
        id: format!("gen-{}", uuid::Uuid::new_v4()),
        object: ChatCompletionResponse::OBJECT.to_string(),
        created: now_unix(),
        model: String::new(),
        choices,
        usage: None,
    };

    serde_json::to_vec(&unified).map_err(Into::into)
}
