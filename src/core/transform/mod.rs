//! Bidirectional wire-format translators.
//!
//! Each submodule translates between the unified (OpenAI-compatible) shape
//! and one provider's native JSON, as pure `bytes -> bytes` functions. The
//! same response translators serve both single-JSON bodies and individual
//! SSE chunks; chunk framing is handled by
//! [`transform_body_chunks`](crate::core::http::transform_body_chunks).

pub mod anthropic;
pub mod cloudflare;
pub mod google;
pub mod openai;

/// Current time as unix seconds, for generated `created` stamps.
pub(crate) fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}
