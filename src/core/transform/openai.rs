//! OpenAI-style translation.
//!
//! The unified shape *is* the OpenAI shape, so the only rewrite is stamping
//! the resolved model id into the body. All other fields, known or not, pass
//! through untouched. Responses need no translation at all.

use serde_json::{Map, Value};

use crate::error::{GatewayError, Result};

/// Re-marshal the unified request with the resolved model name.
pub fn adapt_request(body: &[u8], model: &str) -> Result<Vec<u8>> {
    let mut payload: Map<String, Value> = serde_json::from_slice(body)
        .map_err(|e| GatewayError::transform("openai", format!("invalid request body: {e}")))?;

    if payload.contains_key("model") {
        payload.insert("model".to_string(), Value::String(model.to_string()));
    }

    serde_json::to_vec(&payload).map_err(Into::into)
}
