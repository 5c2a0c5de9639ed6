//! Resource handlers.
//!
//! Each Atlas resource kind implements [`ResourceHandler`]. The provider
//! dispatches lifecycle calls to the handler registered for the resource type
//! and passes the shared [`ProviderContext`] explicitly.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ProviderError;
use crate::provider::ProviderContext;
use crate::schema::{Diagnostic, Schema};
use crate::validation;

pub mod custom_db_role;
pub mod encryption_at_rest;
pub mod privatelink_endpoint_service_serverless;
pub mod project;

pub use custom_db_role::CustomDbRoleResource;
pub use encryption_at_rest::EncryptionAtRestResource;
pub use privatelink_endpoint_service_serverless::ServerlessEndpointServiceResource;
pub use project::ProjectResource;

/// Lifecycle of one resource kind.
///
/// State values are JSON snapshots shaped by [`ResourceHandler::schema`].
#[async_trait::async_trait]
pub trait ResourceHandler: Send + Sync + 'static {
    /// The resource type name, e.g. `mongodbatlas_project`.
    fn type_name(&self) -> &'static str;

    /// The resource schema.
    fn schema(&self) -> Schema;

    /// Validate a configuration against the schema.
    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        validation::validate(&self.schema(), config)
    }

    /// Upgrade state written under an older schema version.
    ///
    /// The default accepts only the current version.
    fn upgrade_state(&self, version: i64, state: Value) -> Result<Value, ProviderError> {
        if version == self.schema().version as i64 {
            Ok(state)
        } else {
            Err(ProviderError::UnsupportedStateVersion {
                resource_type: self.type_name().to_string(),
                version,
            })
        }
    }

    /// Create the resource and return its state.
    async fn create(&self, ctx: &ProviderContext, planned: Value) -> Result<Value, ProviderError>;

    /// Refresh the state. `None` means the resource no longer exists.
    async fn read(&self, ctx: &ProviderContext, current: Value)
        -> Result<Option<Value>, ProviderError>;

    /// Apply an in-place update and return the new state.
    async fn update(
        &self,
        ctx: &ProviderContext,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete the resource. Deleting a resource that is already gone succeeds.
    async fn delete(&self, ctx: &ProviderContext, current: Value) -> Result<(), ProviderError>;

    /// Look up an existing resource by its import id and return its state.
    async fn import(&self, ctx: &ProviderContext, id: &str) -> Result<Value, ProviderError>;
}

/// Every resource kind the provider serves.
pub fn all() -> Vec<Arc<dyn ResourceHandler>> {
    vec![
        Arc::new(CustomDbRoleResource),
        Arc::new(EncryptionAtRestResource),
        Arc::new(ServerlessEndpointServiceResource),
        Arc::new(ProjectResource),
    ]
}

/// Deserialize an explicit `null` as the type's default.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub(crate) fn require_id<'a>(
    resource_type: &str,
    id: &'a Option<String>,
) -> Result<&'a str, ProviderError> {
    id.as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ProviderError::Validation(format!("{} state has no id", resource_type)))
}

pub(crate) fn from_state<T: DeserializeOwned>(state: Value) -> Result<T, ProviderError> {
    Ok(serde_json::from_value(state)?)
}

pub(crate) fn to_state<T: Serialize>(state: &T) -> Result<Value, ProviderError> {
    Ok(serde_json::to_value(state)?)
}

/// Turn a refreshed state that vanished right after a write into an error.
pub(crate) fn require_present(
    resource_type: &str,
    id: &str,
    state: Option<Value>,
) -> Result<Value, ProviderError> {
    state.ok_or_else(|| {
        ProviderError::NotFound(format!("{} {} disappeared after it was written", resource_type, id))
    })
}
