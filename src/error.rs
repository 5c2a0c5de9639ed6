//! Error types for the MongoDB Atlas provider.

use thiserror::Error;

use crate::atlas::AtlasError;
use crate::config::ConfigError;
use crate::poll::PollError;
use crate::schema::Diagnostic;
use crate::state_id::StateIdError;

/// Errors returned by provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested resource was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// A lifecycle call arrived before `configure`.
    #[error("Provider not configured: call configure before managing resources")]
    NotConfigured,

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored `id` could not be decoded.
    #[error("Invalid resource id: {0}")]
    StateId(#[from] StateIdError),

    /// An import id did not match the resource's import format.
    #[error("Invalid import id for {resource_type}: {source}")]
    InvalidImportId {
        /// The resource being imported.
        resource_type: String,
        /// Why the id was rejected.
        #[source]
        source: StateIdError,
    },

    /// The state was written by a schema version this provider cannot upgrade.
    #[error("Cannot upgrade {resource_type} state from schema version {version}")]
    UnsupportedStateVersion {
        /// The resource type.
        resource_type: String,
        /// The stored schema version.
        version: i64,
    },

    /// An Atlas API call failed.
    #[error("{context}: {source}")]
    Api {
        /// What the provider was doing, including the resource id.
        context: String,
        /// The Atlas error.
        #[source]
        source: AtlasError,
    },

    /// Waiting for Atlas to converge failed or timed out.
    #[error("{context}: {source}")]
    Wait {
        /// What the provider was waiting for, including the resource id.
        context: String,
        /// The poll error.
        #[source]
        source: PollError<AtlasError>,
    },
}

impl ProviderError {
    /// Wrap an Atlas error with what the provider was doing.
    pub fn api(context: impl Into<String>, source: AtlasError) -> Self {
        Self::Api {
            context: context.into(),
            source,
        }
    }

    /// Wrap a poll error with what the provider was waiting for.
    ///
    /// A probe error is unwrapped into [`ProviderError::Api`], so callers
    /// see the Atlas error exactly as the probe returned it.
    pub fn wait(context: impl Into<String>, source: PollError<AtlasError>) -> Self {
        match source {
            PollError::Probe(source) => Self::api(context, source),
            source => Self::Wait {
                context: context.into(),
                source,
            },
        }
    }

    /// The Atlas error behind this error, if any.
    pub fn atlas_error(&self) -> Option<&AtlasError> {
        match self {
            Self::Api { source, .. } => Some(source),
            Self::Wait { source, .. } => source.probe_error(),
            _ => None,
        }
    }

    /// Whether a poll gave up while Atlas was still converging.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Wait { source, .. } if source.is_timeout())
    }

    /// Render the error for the host framework.
    pub fn to_diagnostics(&self) -> Vec<Diagnostic> {
        match self {
            Self::Configuration(e) => vec![e.to_diagnostic()],
            Self::Api { context, source } => {
                vec![Diagnostic::error(context.clone()).with_detail(source.to_string())]
            }
            Self::Wait { context, source } => {
                vec![Diagnostic::error(context.clone()).with_detail(source.to_string())]
            }
            Self::StateId(_) => vec![Diagnostic::error(self.to_string()).with_attribute("id")],
            other => vec![Diagnostic::error(other.to_string())],
        }
    }
}
