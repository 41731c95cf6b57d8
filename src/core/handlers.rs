//! Endpoint handlers.
//!
//! The two request entry points the host mounts: catalog aggregation
//! (`GET /models`) and chat completion (`POST /chat/completions`). Both are
//! thin dispatchers over the resolver, the credential provider and the
//! per-provider proxy; both always return a renderable response rather than
//! an error, so the host never has to invent a status code.

use std::collections::HashSet;
use std::time::Instant;

use bytes::Bytes;
use futures::future::join_all;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map};
use tracing::{debug, error, info, warn};

use crate::core::context::RequestContext;
use crate::core::credentials::KeyError;
use crate::core::http::UpstreamResponse;
use crate::core::observability::fire_event;
use crate::core::router::Gateway;
use crate::core::types::{ModelCatalog, ModelEntry};
use crate::error::GatewayError;

/// The only request field the chat handler inspects before proxying.
#[derive(Debug, Deserialize)]
struct ModelProbe {
    #[serde(default)]
    model: String,
}

/// Convert a credential failure into the crate error for a provider.
pub(crate) fn credential_error(provider: &str, err: KeyError) -> GatewayError {
    match err {
        KeyError::NotFound { .. } => GatewayError::CredentialNotFound {
            provider: provider.to_string(),
        },
        KeyError::Lookup { message, .. } => GatewayError::CredentialLookup {
            provider: provider.to_string(),
            message,
        },
    }
}

/// Render a gateway error as the client-facing plain-text response.
fn error_response(err: &GatewayError) -> UpstreamResponse {
    let message = match err {
        GatewayError::CredentialNotFound { .. } => {
            "Forbidden: Upstream API credentials not found or access denied.".to_string()
        }
        GatewayError::CredentialLookup { .. } => {
            "Service Unavailable: Could not retrieve API credentials for upstream provider."
                .to_string()
        }
        other => other.to_string(),
    };
    UpstreamResponse::plain_text(err.status_code(), message)
}

/// Merge per-provider catalogs, keeping first-seen order and dropping
/// duplicate ids.
pub(crate) fn merge_catalogs(batches: Vec<Vec<ModelEntry>>) -> Vec<ModelEntry> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged = Vec::new();
    for batch in batches {
        for entry in batch {
            if seen.insert(entry.id.clone()) {
                merged.push(entry);
            }
        }
    }
    merged
}

impl Gateway {
    /// Serve the aggregated model catalog.
    ///
    /// Fans out one fetch task per provider; a provider without credentials
    /// is queried without auth, and any per-provider failure is logged and
    /// dropped so a single outage never empties the aggregate. Always
    /// responds `200` with `{"data": [...]}`.
    pub async fn handle_models(&self, ctx: &RequestContext) -> UpstreamResponse {
        let mut props = Map::new();
        props.insert("$ip".to_string(), json!(ctx.client_ip));
        fire_event(ctx.user_id_str(), "$pageview", props);

        let keys = ctx.key_provider();
        let entries = self.providers_in_order();

        let mut tasks = Vec::with_capacity(entries.len());
        for entry in entries {
            let keys = keys.clone();
            let http = self.catalog_http().clone();
            tasks.push(tokio::spawn(async move {
                // Tenant-wide key; some catalog endpoints are public, so a
                // missing key downgrades to an unauthenticated fetch.
                let key = match keys.api_key(&entry.name, "").await {
                    Ok(key) => key,
                    Err(err) => {
                        warn!(
                            provider = %entry.name,
                            %err,
                            "no API key for catalog fetch, proceeding without auth"
                        );
                        String::new()
                    }
                };
                let result = entry.adapter.fetch_models(&entry.base_url, &key, &http).await;
                (entry.name.clone(), result)
            }));
        }

        let mut batches = Vec::new();
        for joined in join_all(tasks).await {
            match joined {
                Ok((_, Ok(models))) => batches.push(models),
                Ok((provider, Err(err))) => {
                    error!(%provider, %err, "failed to fetch models from provider");
                }
                Err(err) => {
                    error!(%err, "catalog fetch task aborted");
                }
            }
        }

        let data = merge_catalogs(batches);
        info!(total_unique_models = data.len(), "aggregated models from providers");

        UpstreamResponse::json(StatusCode::OK, &ModelCatalog { data }).unwrap_or_else(|err| {
            error!(%err, "failed to encode aggregated models response");
            UpstreamResponse::plain_text(
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to encode models response",
            )
        })
    }

    /// Serve one chat completion.
    ///
    /// Parses only the `model` field, resolves the provider, fetches the
    /// upstream credential and hands the buffered body to the provider's
    /// proxy. Client errors come back as plain-text `4xx`/`5xx` responses.
    pub async fn handle_chat(
        &self,
        inbound_headers: &HeaderMap,
        body: Bytes,
        ctx: &RequestContext,
    ) -> UpstreamResponse {
        let started = Instant::now();
        let mut props = Map::new();
        props.insert("$ip".to_string(), json!(ctx.client_ip));
        fire_event(ctx.user_id_str(), "$pageview", props.clone());
        fire_event(ctx.user_id_str(), "inference-start", props);

        let response = self.chat_inner(inbound_headers, body, ctx).await;

        let mut props = Map::new();
        props.insert("$ip".to_string(), json!(ctx.client_ip));
        props.insert(
            "duration_ms".to_string(),
            json!(started.elapsed().as_millis() as u64),
        );
        props.insert("status_code".to_string(), json!(response.status.as_u16()));
        fire_event(ctx.user_id_str(), "inference-stop", props);

        response
    }

    async fn chat_inner(
        &self,
        inbound_headers: &HeaderMap,
        body: Bytes,
        ctx: &RequestContext,
    ) -> UpstreamResponse {
        let probe: ModelProbe = match serde_json::from_slice(&body) {
            Ok(probe) => probe,
            Err(err) => {
                error!(%err, "failed to parse JSON request body");
                return error_response(&GatewayError::InvalidBody(err.to_string()));
            }
        };
        if probe.model.is_empty() {
            error!("request body missing 'model' field");
            return error_response(&GatewayError::MissingModel);
        }
        debug!(model_requested = %probe.model, "received chat completion request");

        let keys = ctx.key_provider();

        let resolution = match self
            .resolve(&probe.model, keys.as_ref(), ctx.user_id_str())
            .await
        {
            Ok(Some(resolution)) => resolution,
            Ok(None) => {
                error!(requested_model = %probe.model, "could not determine provider for model");
                return error_response(&GatewayError::Unresolved(probe.model));
            }
            Err(err) => {
                error!(requested_model = %probe.model, %err, "model resolution failed");
                return error_response(&err);
            }
        };

        let Some(entry) = self.provider(&resolution.provider) else {
            error!(provider = %resolution.provider, "resolved provider missing from registry");
            return UpstreamResponse::plain_text(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error: provider configuration missing",
            );
        };

        let api_key = match keys
            .api_key(&resolution.provider, ctx.user_id_str())
            .await
        {
            Ok(key) if !key.is_empty() => key,
            Ok(_) => {
                return error_response(&GatewayError::CredentialNotFound {
                    provider: resolution.provider.clone(),
                })
            }
            Err(err) => {
                error!(
                    provider = %resolution.provider,
                    user_id = ctx.user_id_str(),
                    %err,
                    "failed to fetch upstream API key"
                );
                return error_response(&credential_error(&resolution.provider, err));
            }
        };

        info!(
            original_model = %probe.model,
            target_provider = %entry.name,
            actual_model = %resolution.model,
            target_upstream_base = %entry.base_url,
            user_id = ctx.user_id_str(),
            api_key_id = ctx.api_key_id_str(),
            "routing chat completion"
        );

        let mut headers = inbound_headers.clone();
        match reqwest::header::HeaderValue::from_str(&format!("Bearer {api_key}")) {
            Ok(value) => {
                headers.insert(reqwest::header::AUTHORIZATION, value);
            }
            Err(err) => {
                error!(provider = %entry.name, %err, "upstream API key is not a valid header value");
                return error_response(&GatewayError::CredentialLookup {
                    provider: entry.name.clone(),
                    message: "credential is not a valid header value".to_string(),
                });
            }
        }

        self.forward(&entry, &headers, body, ctx, &resolution.model)
            .await
    }
}
