//! Router core.
//!
//! [`Gateway`] is the aggregate the host mounts: the provider registry,
//! the fall-through order, the per-model defaults, the correction cache and
//! the shared HTTP clients. Provisioning validates the configuration once
//! behind an exclusive lock; every request path reads through a shared lock.
//!
//! The reverse-proxy orchestration lives here too: the director rewrites the
//! outbound request for the chosen provider, the response mutator stamps
//! routing headers and runs the adapter's translation, and the error handler
//! renders transport failures as `502 Bad Gateway`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, HOST, TRANSFER_ENCODING};
use reqwest::{Method, StatusCode};
use serde_json::{json, Map};
use tracing::{error, info, warn};
use url::Url;

use crate::config::RouterConfig;
use crate::core::context::RequestContext;
use crate::core::credentials::ApiKeyProvider;
use crate::core::http::{Body, UpstreamRequest, UpstreamResponse};
use crate::core::observability::{fire_event, try_init_from_env};
use crate::core::providers::Adapter;
use crate::core::resolver::{self, CorrectionCache, Resolution};
use crate::error::{GatewayError, Result};

/// Crate version, stamped into provisioning events.
pub(crate) const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Response header naming the provider that served a request.
pub const PROVIDER_NAME_HEADER: HeaderName = HeaderName::from_static("x-provider-name");
/// Response header naming the model that served a request.
pub const MODEL_NAME_HEADER: HeaderName = HeaderName::from_static("x-model-name");

/// Whole-request timeout for catalog fetches. Proxied chat traffic has no
/// gateway-imposed ceiling.
const CATALOG_TIMEOUT: Duration = Duration::from_secs(15);

/// One fully-provisioned provider: parsed base URL plus its adapter.
#[derive(Debug)]
pub struct ProviderEntry {
    /// Registered name, lowercase.
    pub name: String,
    /// Parsed upstream base URL.
    pub base_url: Url,
    /// Configured wire-format family.
    pub style: crate::config::ProviderStyle,
    /// Adapter backing this entry.
    pub adapter: Adapter,
}

/// Registry state guarded by the provisioning lock.
#[derive(Debug, Default)]
pub(crate) struct RouterState {
    pub(crate) providers: HashMap<String, Arc<ProviderEntry>>,
    pub(crate) provider_order: Vec<String>,
    pub(crate) model_defaults: HashMap<String, Vec<String>>,
}

/// The gateway core: registry, resolution state and proxy orchestration.
pub struct Gateway {
    name: String,
    state: RwLock<RouterState>,
    corrections: CorrectionCache,
    catalog_http: reqwest::Client,
    proxy_http: reqwest::Client,
}

impl Gateway {
    /// Provision a gateway from parsed configuration.
    ///
    /// Fails when no providers are defined, a base URL is missing or does
    /// not parse as an absolute URL, the provider order is inconsistent, or
    /// a per-model default references an undefined provider.
    pub fn new(config: RouterConfig) -> Result<Self> {
        if config.providers.is_empty() {
            return Err(GatewayError::Config(
                "at least one provider must be configured".to_string(),
            ));
        }

        let mut state = RouterState::default();

        for (raw_name, settings) in &config.providers {
            let name = raw_name.to_lowercase();
            if settings.api_base_url.is_empty() {
                return Err(GatewayError::Config(format!(
                    "provider {name}: api_base_url is required"
                )));
            }
            let base_url = Url::parse(&settings.api_base_url).map_err(|err| {
                GatewayError::Config(format!(
                    "provider {name}: invalid api_base_url '{}': {err}",
                    settings.api_base_url
                ))
            })?;

            let entry = Arc::new(ProviderEntry {
                name: name.clone(),
                base_url,
                style: settings.style,
                adapter: Adapter::for_style(settings.style),
            });
            info!(provider = %name, base_url = %settings.api_base_url, style = %settings.style, "provisioned provider");
            state.providers.insert(name, entry);
        }

        // The fall-through order must name each provider exactly once.
        // Providers omitted from the configured order are appended
        // alphabetically so the order is total and deterministic.
        for raw_name in &config.provider_order {
            let name = raw_name.to_lowercase();
            if !state.providers.contains_key(&name) {
                return Err(GatewayError::Config(format!(
                    "provider_order names undefined provider '{name}'"
                )));
            }
            if state.provider_order.contains(&name) {
                return Err(GatewayError::Config(format!(
                    "provider_order lists provider '{name}' more than once"
                )));
            }
            state.provider_order.push(name);
        }
        let mut missing: Vec<String> = state
            .providers
            .keys()
            .filter(|name| !state.provider_order.contains(name))
            .cloned()
            .collect();
        missing.sort();
        state.provider_order.extend(missing);

        for (model, candidates) in &config.default_provider_for_model {
            if candidates.is_empty() {
                return Err(GatewayError::Config(format!(
                    "default_provider_for_model entry for '{model}' lists no providers"
                )));
            }
            let mut normalized = Vec::with_capacity(candidates.len());
            for candidate in candidates {
                let candidate = candidate.to_lowercase();
                if !state.providers.contains_key(&candidate) {
                    return Err(GatewayError::Config(format!(
                        "default provider '{candidate}' for model '{model}' is not a configured provider"
                    )));
                }
                normalized.push(candidate);
            }
            state.model_defaults.insert(model.clone(), normalized);
        }

        if try_init_from_env() {
            info!("observability instrumentation enabled");
        }

        let num_providers = state.providers.len();
        let num_model_defaults = state.model_defaults.len();
        info!(
            version = APP_VERSION,
            name = %config.name,
            num_providers,
            num_model_defaults,
            "gateway provisioned"
        );
        let mut props = Map::new();
        props.insert("version".to_string(), json!(APP_VERSION));
        props.insert("num_providers".to_string(), json!(num_providers));
        props.insert("num_model_defaults".to_string(), json!(num_model_defaults));
        fire_event("system", "router_start", props);

        Ok(Gateway {
            name: config.name,
            state: RwLock::new(state),
            corrections: CorrectionCache::new(),
            catalog_http: reqwest::Client::builder()
                .timeout(CATALOG_TIMEOUT)
                .build()?,
            proxy_http: reqwest::Client::new(),
        })
    }

    /// Instance name, as configured.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up one provisioned provider by (lowercased) name.
    pub fn provider(&self, name: &str) -> Option<Arc<ProviderEntry>> {
        self.state.read().providers.get(name).cloned()
    }

    /// Providers in fall-through order.
    pub fn providers_in_order(&self) -> Vec<Arc<ProviderEntry>> {
        let state = self.state.read();
        state
            .provider_order
            .iter()
            .filter_map(|name| state.providers.get(name).cloned())
            .collect()
    }

    /// The shared catalog-fetch client (15 s whole-request timeout).
    pub(crate) fn catalog_http(&self) -> &reqwest::Client {
        &self.catalog_http
    }

    /// Resolve (provider, actual model) for a requested model string.
    ///
    /// Returns `Ok(None)` when nothing matches; key failures during the live
    /// search abort with the corresponding credential error.
    pub async fn resolve(
        &self,
        requested: &str,
        keys: &dyn ApiKeyProvider,
        user_id: &str,
    ) -> Result<Option<Resolution>> {
        {
            let state = self.state.read();
            if let Some(resolution) = resolver::resolve_static(
                &state.providers,
                &state.model_defaults,
                &self.corrections,
                requested,
            ) {
                return Ok(Some(resolution));
            }
        }

        let order = self.providers_in_order();
        resolver::resolve_live(
            &order,
            &self.corrections,
            &self.catalog_http,
            keys,
            user_id,
            requested,
        )
        .await
    }

    /// Proxy one chat request to its resolved provider.
    ///
    /// Director, upstream execution, response mutation and the 502 error
    /// path all run here; the returned response is ready for the client.
    pub(crate) async fn forward(
        &self,
        entry: &ProviderEntry,
        inbound_headers: &HeaderMap,
        body: Bytes,
        ctx: &RequestContext,
        model: &str,
    ) -> UpstreamResponse {
        // Director: rebase onto the provider and shape the request.
        let mut request = UpstreamRequest {
            method: Method::POST,
            url: entry.base_url.clone(),
            headers: strip_forwarding_headers(inbound_headers),
            body,
        };
        if let Err(err) = entry.adapter.modify_request(&mut request, model) {
            // The proxy still runs; the upstream will reject a bad body
            // with a diagnosable status of its own.
            error!(provider = %entry.name, %err, "failed to modify request");
        }

        info!(
            provider = %entry.name,
            target_url = %request.url,
            model,
            "proxying request to provider"
        );
        let mut props = Map::new();
        props.insert("$ip".to_string(), json!(ctx.client_ip));
        props.insert("provider".to_string(), json!(entry.name));
        props.insert("model".to_string(), json!(model));
        props.insert("user_id".to_string(), json!(ctx.user_id_str()));
        props.insert("api_key_id".to_string(), json!(ctx.api_key_id_str()));
        fire_event(ctx.user_id_str(), "inference_proxy_request", props);

        let outcome = self
            .proxy_http
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .body(request.body.clone())
            .send()
            .await;

        match outcome {
            Ok(upstream) => {
                let mut response = UpstreamResponse {
                    status: upstream.status(),
                    headers: upstream.headers().clone(),
                    body: Body::Streaming(upstream.bytes_stream().boxed()),
                };
                self.mutate_response(entry, &mut response, ctx, model).await;
                response
            }
            Err(err) => self.render_proxy_error(entry, &request.url, ctx, model, err),
        }
    }

    /// Response mutator: stamp routing headers, emit the proxy-response
    /// event, then run the adapter's translation. Idempotent via the
    /// provider-name marker header.
    async fn mutate_response(
        &self,
        entry: &ProviderEntry,
        response: &mut UpstreamResponse,
        ctx: &RequestContext,
        model: &str,
    ) {
        if response.headers.contains_key(PROVIDER_NAME_HEADER) {
            return;
        }
        if let Ok(value) = HeaderValue::from_str(&entry.name) {
            response.headers.insert(PROVIDER_NAME_HEADER, value);
        }
        if let Ok(value) = HeaderValue::from_str(model) {
            response.headers.insert(MODEL_NAME_HEADER, value);
        }

        let mut props = Map::new();
        props.insert("$ip".to_string(), json!(ctx.client_ip));
        props.insert("status_code".to_string(), json!(response.status.as_u16()));
        props.insert(
            "content_type".to_string(),
            json!(response.content_type().unwrap_or_default()),
        );
        props.insert("provider".to_string(), json!(entry.name));
        props.insert("model".to_string(), json!(model));
        props.insert("user_id".to_string(), json!(ctx.user_id_str()));
        props.insert("api_key_id".to_string(), json!(ctx.api_key_id_str()));
        if response.status.as_u16() >= 299 {
            // Error bodies are small; capture them for diagnostics.
            match response.buffer().await {
                Ok(bytes) => {
                    props.insert(
                        "body".to_string(),
                        json!(String::from_utf8_lossy(bytes).into_owned()),
                    );
                }
                Err(err) => {
                    warn!(provider = %entry.name, %err, "failed to capture upstream error body");
                }
            }
        }
        fire_event(ctx.user_id_str(), "inference_proxy_response", props);

        if let Err(err) = entry.adapter.modify_response(response).await {
            error!(provider = %entry.name, %err, "failed to modify response");
        }
    }

    /// Error handler: render a transport failure as `502 Bad Gateway`.
    fn render_proxy_error(
        &self,
        entry: &ProviderEntry,
        target_url: &Url,
        ctx: &RequestContext,
        model: &str,
        err: reqwest::Error,
    ) -> UpstreamResponse {
        let mut target = target_url.clone();
        target.set_query(None);
        error!(
            provider = %entry.name,
            target_url = %target,
            %err,
            "upstream proxy error"
        );

        let gateway_err = GatewayError::upstream(entry.name.as_str(), &err);
        let mut props = Map::new();
        props.insert(
            "$exception_list".to_string(),
            json!([{
                "type": "ProxyError",
                "value": err.to_string(),
                "mechanism": {"handled": true, "synthetic": false},
            }]),
        );
        props.insert("provider".to_string(), json!(entry.name));
        props.insert("model".to_string(), json!(model));
        props.insert("user_id".to_string(), json!(ctx.user_id_str()));
        props.insert("api_key_id".to_string(), json!(ctx.api_key_id_str()));
        fire_event(ctx.user_id_str(), "$exception", props);

        UpstreamResponse::plain_text(StatusCode::BAD_GATEWAY, gateway_err.to_string())
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Gateway")
            .field("name", &self.name)
            .field("providers", &state.provider_order)
            .field("corrections", &self.corrections.len())
            .finish()
    }
}

/// Copy inbound headers for the upstream hop, dropping the original host
/// and forwarding metadata.
fn strip_forwarding_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = inbound.clone();
    headers.remove(HOST);
    headers.remove(TRANSFER_ENCODING);
    let forwarded: Vec<HeaderName> = headers
        .keys()
        .filter(|name| name.as_str().starts_with("x-forwarded-"))
        .cloned()
        .collect();
    for name in forwarded {
        headers.remove(name);
    }
    headers
}
