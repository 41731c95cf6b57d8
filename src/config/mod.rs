//! Gateway configuration.
//!
//! The host framework parses its own config format (YAML, directives, flags)
//! and hands the gateway an already-structured [`RouterConfig`]. Validation
//! beyond basic shape happens at provision time in
//! [`Gateway::new`](crate::Gateway::new).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Wire-format family of a provider entry.
///
/// The style selects which adapter backs the entry: URL layout, auth header
/// shaping and body translation all key off it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStyle {
    /// OpenAI-compatible chat completions (also OpenRouter, Groq, etc.).
    #[default]
    OpenAi,
    /// Anthropic Messages API.
    Anthropic,
    /// Google Gemini `generateContent`.
    Google,
    /// Cloudflare Workers AI.
    Cloudflare,
}

impl ProviderStyle {
    /// Canonical style tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderStyle::OpenAi => "openai",
            ProviderStyle::Anthropic => "anthropic",
            ProviderStyle::Google => "google",
            ProviderStyle::Cloudflare => "cloudflare",
        }
    }
}

impl std::fmt::Display for ProviderStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for a single upstream provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Upstream base URL, e.g. `https://api.openai.com/v1`.
    pub api_base_url: String,

    /// Wire-format family. Defaults to OpenAI-compatible.
    #[serde(default)]
    pub style: ProviderStyle,
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Instance identifier, used when multiple gateways coexist in one host.
    #[serde(default = "default_router_name")]
    pub name: String,

    /// Configured providers, keyed by name. Names are lowercased at
    /// provision.
    #[serde(default)]
    pub providers: HashMap<String, ProviderSettings>,

    /// Per-model routing defaults: model name to an ordered, non-empty list
    /// of candidate provider names.
    #[serde(default)]
    pub default_provider_for_model: HashMap<String, Vec<String>>,

    /// Fall-through precedence across providers. Providers omitted here are
    /// appended at provision in configuration iteration order.
    #[serde(default)]
    pub provider_order: Vec<String>,
}

fn default_router_name() -> String {
    "default".to_string()
}

impl RouterConfig {
    /// Create an empty configuration with the given instance name.
    pub fn named(name: impl Into<String>) -> Self {
        RouterConfig {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a provider entry. Convenience for hosts that build config in code.
    pub fn with_provider(
        mut self,
        name: impl Into<String>,
        api_base_url: impl Into<String>,
        style: ProviderStyle,
    ) -> Self {
        self.providers.insert(
            name.into(),
            ProviderSettings {
                api_base_url: api_base_url.into(),
                style,
            },
        );
        self
    }

    /// Declare a per-model default provider list.
    pub fn with_model_default(
        mut self,
        model: impl Into<String>,
        providers: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.default_provider_for_model.insert(
            model.into(),
            providers.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Set the fall-through provider order.
    pub fn with_order(mut self, order: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.provider_order = order.into_iter().map(Into::into).collect();
        self
    }
}
