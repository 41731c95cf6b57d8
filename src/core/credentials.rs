//! Upstream credential resolution.
//!
//! Every upstream call needs a provider credential resolved for the
//! (target, user) pair. The trait is intentionally tiny so hosts can plug in
//! a vault, a database or a per-tenant service; the default reads process
//! environment variables.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

/// Failure modes of a credential lookup.
///
/// The distinction matters to callers: a missing key is the client's problem
/// (403), a failing credential service is an infrastructure problem (503).
#[derive(Error, Debug, Clone)]
pub enum KeyError {
    /// No key exists for the (target, user) pair.
    #[error("API key not found for target {target}")]
    NotFound {
        /// Target identifier the lookup used.
        target: String,
    },

    /// The lookup itself failed (external service error, bad input).
    #[error("API key lookup failed for target {target}: {message}")]
    Lookup {
        /// Target identifier the lookup used.
        target: String,
        /// Underlying failure description.
        message: String,
    },
}

impl KeyError {
    /// Whether this is a plain "no such key" result.
    pub fn is_not_found(&self) -> bool {
        matches!(self, KeyError::NotFound { .. })
    }
}

/// A service that can produce API keys for upstream providers.
///
/// `user_id` may be empty, in which case the provider should return a
/// tenant-wide key if it has one. Implementations are invoked per request
/// and per catalog fetch; they should be cheap or cache internally.
#[async_trait]
pub trait ApiKeyProvider: Send + Sync {
    /// Fetch an API key for a target identifier (usually the provider name)
    /// and an optional user id.
    async fn api_key(&self, target: &str, user_id: &str) -> Result<String, KeyError>;
}

/// Default credential source: process environment.
///
/// For target `openai` it reads `OPENAI_API_KEY`. A variable that is unset
/// or empty counts as not found.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvKeyProvider;

impl EnvKeyProvider {
    /// Environment variable name for a target, e.g. `openai` ->
    /// `OPENAI_API_KEY`.
    pub fn env_var_name(target: &str) -> String {
        format!("{}_API_KEY", target.to_uppercase())
    }
}

#[async_trait]
impl ApiKeyProvider for EnvKeyProvider {
    async fn api_key(&self, target: &str, user_id: &str) -> Result<String, KeyError> {
        if target.is_empty() {
            return Err(KeyError::Lookup {
                target: String::new(),
                message: "target identifier cannot be empty".to_string(),
            });
        }

        let var = Self::env_var_name(target);
        match std::env::var(&var) {
            Ok(key) if !key.is_empty() => {
                debug!(env_var = %var, target, "resolved upstream API key from environment");
                Ok(key)
            }
            _ => {
                warn!(env_var = %var, target, user_id, "upstream API key not set in environment");
                Err(KeyError::NotFound {
                    target: target.to_string(),
                })
            }
        }
    }
}
