//! # modelmux
//!
//! A protocol-normalizing gateway core: one OpenAI-compatible
//! chat-completions and model-listing surface in front of heterogeneous
//! generative-AI providers (OpenAI-family, OpenRouter, Anthropic, Google
//! Gemini, Cloudflare Workers AI).
//!
//! Clients send one request shape; the gateway resolves which upstream to
//! call, rewrites the request into that upstream's wire format, injects the
//! upstream credential, proxies the body (streamed responses included) and
//! rewrites the reply back into the unified shape.
//!
//! This crate is a library. It does not open a listening socket or parse a
//! config file; a host HTTP framework dispatches the two endpoints into
//! [`Gateway::handle_models`] and [`Gateway::handle_chat`] with
//! already-parsed configuration.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use modelmux::{Gateway, ProviderStyle, RequestContext, RouterConfig};
//!
//! # async fn serve() -> modelmux::Result<()> {
//! let gateway = Gateway::new(
//!     RouterConfig::named("default")
//!         .with_provider("openai", "https://api.openai.com/v1", ProviderStyle::OpenAi)
//!         .with_provider("anthropic", "https://api.anthropic.com", ProviderStyle::Anthropic)
//!         .with_model_default("claude-3-opus-20240229", ["anthropic"])
//!         .with_order(["openai", "anthropic"]),
//! )?;
//!
//! // In the host's POST /chat/completions handler:
//! let ctx = RequestContext::new().with_user_id("user-1");
//! let body = bytes::Bytes::from_static(
//!     br#"{"model":"openai/gpt-4o","messages":[{"role":"user","content":"hi"}]}"#,
//! );
//! let response = gateway
//!     .handle_chat(&reqwest::header::HeaderMap::new(), body, &ctx)
//!     .await;
//! # let _ = response;
//! # Ok(())
//! # }
//! ```
//!
//! Upstream credentials come from an [`ApiKeyProvider`]; the default reads
//! `<PROVIDER>_API_KEY` environment variables. Model routing accepts an
//! explicit `provider/model` prefix, declared per-model defaults, and falls
//! back to a live catalog search with fuzzy matching, cached for the life of
//! the process.

pub mod config;
pub mod core;
pub mod error;

pub use config::{ProviderSettings, ProviderStyle, RouterConfig};
pub use error::{GatewayError, Result};

pub use core::context::RequestContext;
pub use core::credentials::{ApiKeyProvider, EnvKeyProvider, KeyError};
pub use core::http::{Body, UpstreamRequest, UpstreamResponse};
pub use core::observability::{fire_event, init_sink, set_sink, EventSink, PostHogSink};
pub use core::providers::{Adapter, ProviderAdapter};
pub use core::resolver::Resolution;
pub use core::router::{Gateway, ProviderEntry, MODEL_NAME_HEADER, PROVIDER_NAME_HEADER};
pub use core::types::{
    ChatChoice, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ModelCatalog,
    ModelEntry, Usage,
};
