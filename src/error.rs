//! Error handling for the gateway core.
//!
//! A single crate-level error enum keeps the routing, translation and
//! credential layers on one `Result` type. Client-observable variants map
//! onto HTTP statuses via [`GatewayError::status_code`].

use reqwest::StatusCode;
use thiserror::Error;

/// Result type alias for the gateway core.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Main error type for the gateway core.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration errors. Fatal at provision time.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The request body could not be parsed as JSON.
    #[error("Invalid JSON request body: {0}")]
    InvalidBody(String),

    /// The request body carried no `model` field.
    #[error("'model' field is required in JSON request body")]
    MissingModel,

    /// No provider could be determined for the requested model.
    #[error("Could not determine provider for model: {0}")]
    Unresolved(String),

    /// Upstream credentials are missing for the resolved provider.
    #[error("Upstream API credentials not found for provider {provider}")]
    CredentialNotFound {
        /// Provider the lookup targeted.
        provider: String,
    },

    /// The credential service itself failed.
    #[error("Could not retrieve API credentials for provider {provider}: {message}")]
    CredentialLookup {
        /// Provider the lookup targeted.
        provider: String,
        /// Underlying failure description.
        message: String,
    },

    /// Proxying to the upstream provider failed at the transport level.
    #[error("Error proxying to upstream provider {provider}: {message}")]
    Upstream {
        /// Provider the request was bound for.
        provider: String,
        /// Underlying failure description.
        message: String,
    },

    /// Translating a request or response body between wire formats failed.
    #[error("Transform error for {provider}: {message}")]
    Transform {
        /// Provider style the translation targeted.
        provider: &'static str,
        /// Underlying failure description.
        message: String,
    },

    /// HTTP client errors (catalog fetches).
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization errors.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GatewayError {
    /// Shorthand for an upstream proxy failure.
    pub fn upstream(provider: impl Into<String>, message: impl ToString) -> Self {
        GatewayError::Upstream {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    /// Shorthand for a wire-format translation failure.
    pub fn transform(provider: &'static str, message: impl ToString) -> Self {
        GatewayError::Transform {
            provider,
            message: message.to_string(),
        }
    }

    /// The HTTP status a client should observe for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::InvalidBody(_)
            | GatewayError::MissingModel
            | GatewayError::Unresolved(_) => StatusCode::BAD_REQUEST,
            GatewayError::CredentialNotFound { .. } => StatusCode::FORBIDDEN,
            GatewayError::CredentialLookup { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::Transform { .. }
            | GatewayError::Http(_)
            | GatewayError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
