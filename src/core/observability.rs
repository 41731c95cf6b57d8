//! Observability event emission.
//!
//! The gateway narrates its routing decisions as named events with property
//! maps. Events flow to an abstract [`EventSink`]; the bundled sink posts
//! them to PostHog when `POSTHOG_API_KEY` is configured, and everything
//! degrades to a no-op when no sink is installed.

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use tracing::debug;

/// Destination for gateway events.
pub trait EventSink: Send + Sync {
    /// Record one event for a user. `user_id` may be empty.
    fn capture(&self, user_id: &str, event: &str, properties: Map<String, Value>);
}

static SINK: Lazy<RwLock<Option<Arc<dyn EventSink>>>> = Lazy::new(|| RwLock::new(None));

/// Install the process-wide sink if none is present yet.
///
/// Returns `false` when a sink was already installed.
pub fn init_sink(sink: Arc<dyn EventSink>) -> bool {
    let mut slot = SINK.write();
    if slot.is_some() {
        return false;
    }
    *slot = Some(sink);
    true
}

/// Replace the process-wide sink unconditionally. Intended for tests and
/// hosts that manage sink lifecycle themselves.
pub fn set_sink(sink: Arc<dyn EventSink>) {
    *SINK.write() = Some(sink);
}

/// Install a [`PostHogSink`] from `POSTHOG_API_KEY` / `POSTHOG_BASE_URL`,
/// when configured. Returns whether instrumentation is active afterwards.
pub fn try_init_from_env() -> bool {
    if SINK.read().is_some() {
        return true;
    }
    match PostHogSink::from_env() {
        Some(sink) => init_sink(Arc::new(sink)),
        None => false,
    }
}

/// Emit one event to the installed sink, if any.
pub fn fire_event(user_id: &str, event: &str, properties: Map<String, Value>) {
    let sink = SINK.read().clone();
    if let Some(sink) = sink {
        sink.capture(user_id, event, properties);
    }
}

/// PostHog capture-API sink.
///
/// Delivery is fire-and-forget on the ambient runtime; a request path never
/// waits on the analytics backend.
pub struct PostHogSink {
    api_key: String,
    endpoint: String,
    client: reqwest::Client,
}

impl PostHogSink {
    /// Build a sink for an explicit key and base URL.
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        PostHogSink {
            api_key: api_key.into(),
            endpoint: format!("{}/capture/", base_url.trim_end_matches('/')),
            client: reqwest::Client::new(),
        }
    }

    /// Build a sink from `POSTHOG_API_KEY` and `POSTHOG_BASE_URL`.
    ///
    /// Returns `None` when the key is unset or empty.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("POSTHOG_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())?;
        let base_url = std::env::var("POSTHOG_BASE_URL")
            .ok()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| "https://us.i.posthog.com".to_string());
        Some(PostHogSink::new(api_key, base_url))
    }
}

impl EventSink for PostHogSink {
    fn capture(&self, user_id: &str, event: &str, properties: Map<String, Value>) {
        let distinct_id = if user_id.is_empty() { "unknown" } else { user_id };
        let payload = json!({
            "api_key": self.api_key,
            "event": event,
            "distinct_id": distinct_id,
            "properties": Value::Object(properties),
        });

        // Without a runtime there is nowhere to run the request; drop the
        // event rather than block or panic.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(event, "no async runtime available, dropping observability event");
            return;
        };

        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let event = event.to_string();
        handle.spawn(async move {
            if let Err(err) = client.post(&endpoint).json(&payload).send().await {
                debug!(%err, event, "failed to deliver observability event");
            }
        });
    }
}
