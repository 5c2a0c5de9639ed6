//! The provider surface the plugin host talks to.
//!
//! [`ProviderService`] is the lifecycle a host drives: schema, configuration,
//! validation, planning and CRUD per resource type. [`AtlasProvider`]
//! implements it by dispatching to the registered
//! [`ResourceHandler`](crate::resources::ResourceHandler)s and handing each of
//! them the shared [`ProviderContext`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::atlas::AtlasClient;
use crate::config::{Operation, PollSettings, ProviderConfig};
use crate::error::ProviderError;
use crate::locks::ResourceLocks;
use crate::poll::{Clock, PollConfig, TokioClock};
use crate::resources::{self, ResourceHandler};
use crate::schema::{
    Attribute, AttributeType, Block, BlockNestingMode, Diagnostic, NestedBlock, ProviderSchema,
    Schema,
};
use crate::types::{
    AttributeChange, ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities,
};
use crate::validation;

/// Lifecycle operations a provider exposes to its host.
///
/// # Example
///
/// ```ignore
/// use mongodbatlas_provider::{AtlasProvider, ProviderService};
///
/// let provider = AtlasProvider::with_client(client);
/// provider.configure(serde_json::json!({"public_key": "pk", "private_key": "sk"})).await?;
/// let state = provider.create("mongodbatlas_project", planned).await?;
/// ```
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Return the provider's schema including all resources.
    fn schema(&self) -> ProviderSchema;

    /// Return provider metadata. By default, this is derived from the schema.
    fn metadata(&self) -> ProviderMetadata {
        let mut resources: Vec<String> = self.schema().resources.keys().cloned().collect();
        resources.sort();
        ProviderMetadata {
            resources,
            capabilities: Default::default(),
        }
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate the provider configuration before configuring.
    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = config;
        Ok(vec![])
    }

    /// Configure the provider. Returns diagnostics; errors among them leave
    /// the provider unconfigured.
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Stop the provider gracefully.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource's configuration before planning.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (resource_type, config);
        Ok(vec![])
    }

    /// Upgrade resource state from an older schema version.
    async fn upgrade_resource_state(
        &self,
        resource_type: &str,
        version: i64,
        state: Value,
    ) -> Result<Value, ProviderError> {
        let _ = (resource_type, version);
        Ok(state)
    }

    /// Plan changes for a resource. A null `proposed_state` plans a destroy.
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError>;

    /// Create a new resource.
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError>;

    /// Read the current state of a resource. Null means it no longer exists.
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError>;

    /// Update an existing resource.
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete a resource.
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError>;

    /// Import existing infrastructure into management.
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let _ = id;
        Err(ProviderError::UnknownResource(format!(
            "Import not supported for resource type: {}",
            resource_type
        )))
    }
}

/// Everything a resource handler needs to talk to Atlas.
///
/// Built once per successful `configure` and passed explicitly to every
/// handler call.
#[derive(Clone)]
pub struct ProviderContext {
    /// The Atlas API client.
    pub client: Arc<dyn AtlasClient>,
    /// Time source for polling.
    pub clock: Arc<dyn Clock>,
    /// Per-resource-kind write locks.
    pub locks: ResourceLocks,
    /// Poll timing per resource kind and operation.
    pub polls: PollSettings,
}

impl ProviderContext {
    /// A context with the real clock and default poll timing.
    pub fn new(client: Arc<dyn AtlasClient>) -> Self {
        Self {
            client,
            clock: Arc::new(TokioClock),
            locks: ResourceLocks::new(),
            polls: PollSettings::default(),
        }
    }

    /// Replace the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the poll timing.
    pub fn with_poll_settings(mut self, polls: PollSettings) -> Self {
        self.polls = polls;
        self
    }

    /// Poll timing for `operation` on `resource_type`.
    pub fn poll_config(&self, resource_type: &str, operation: Operation) -> PollConfig {
        self.polls.get(resource_type, operation)
    }
}

impl fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderContext")
            .field("clock", &self.clock)
            .field("locks", &self.locks)
            .field("polls", &self.polls)
            .finish_non_exhaustive()
    }
}

/// Builds the Atlas client from the resolved provider configuration.
pub type ClientFactory =
    Arc<dyn Fn(&ProviderConfig) -> Result<Arc<dyn AtlasClient>, ProviderError> + Send + Sync>;

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// The MongoDB Atlas provider.
pub struct AtlasProvider {
    factory: ClientFactory,
    env: EnvLookup,
    clock: Arc<dyn Clock>,
    polls: PollSettings,
    handlers: BTreeMap<&'static str, Arc<dyn ResourceHandler>>,
    context: RwLock<Option<Arc<ProviderContext>>>,
}

impl AtlasProvider {
    /// Create a provider that builds its client with `factory` on configure.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&ProviderConfig) -> Result<Arc<dyn AtlasClient>, ProviderError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            factory: Arc::new(factory),
            env: Arc::new(|key| std::env::var(key).ok()),
            clock: Arc::new(TokioClock),
            polls: PollSettings::default(),
            handlers: resources::all()
                .into_iter()
                .map(|h| (h.type_name(), h))
                .collect(),
            context: RwLock::new(None),
        }
    }

    /// Create a provider that uses `client` regardless of configuration.
    pub fn with_client(client: Arc<dyn AtlasClient>) -> Self {
        Self::new(move |_| Ok(client.clone()))
    }

    /// Replace the clock used by configured contexts.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the poll timing used by configured contexts.
    pub fn with_poll_settings(mut self, polls: PollSettings) -> Self {
        self.polls = polls;
        self
    }

    /// Replace the environment lookup used for credential fallback.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(lookup);
        self
    }

    /// Whether `configure` has succeeded and `stop` has not been called since.
    pub async fn is_configured(&self) -> bool {
        self.context.read().await.is_some()
    }

    fn handler(&self, resource_type: &str) -> Result<&Arc<dyn ResourceHandler>, ProviderError> {
        self.handlers
            .get(resource_type)
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
    }

    async fn context(&self) -> Result<Arc<ProviderContext>, ProviderError> {
        self.context
            .read()
            .await
            .clone()
            .ok_or(ProviderError::NotConfigured)
    }

    fn resolve_config(&self, config: &Value) -> Result<ProviderConfig, Vec<Diagnostic>> {
        let parsed = ProviderConfig::from_value(config).map_err(|e| vec![e.to_diagnostic()])?;
        let env = self.env.clone();
        let resolved = parsed.with_env_fallback(|key| env(key));

        let missing: Vec<Diagnostic> = resolved.check().iter().map(|e| e.to_diagnostic()).collect();
        if missing.is_empty() {
            Ok(resolved)
        } else {
            Err(missing)
        }
    }
}

#[async_trait::async_trait]
impl ProviderService for AtlasProvider {
    fn schema(&self) -> ProviderSchema {
        self.handlers.values().fold(
            ProviderSchema::new().with_provider_config(ProviderConfig::schema()),
            |schema, handler| schema.with_resource(handler.type_name(), handler.schema()),
        )
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            resources: self.handlers.keys().map(|k| k.to_string()).collect(),
            capabilities: ServerCapabilities { plan_destroy: true },
        }
    }

    #[instrument(skip_all, name = "provider.validate_provider_config")]
    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let mut diagnostics = validation::validate(&ProviderConfig::schema(), &config);
        if let Err(e) = ProviderConfig::from_value(&config) {
            diagnostics.push(e.to_diagnostic());
        }
        debug!(count = diagnostics.len(), "Validated provider configuration");
        Ok(diagnostics)
    }

    #[instrument(skip_all, name = "provider.configure")]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let resolved = match self.resolve_config(&config) {
            Ok(resolved) => resolved,
            Err(diagnostics) => {
                warn!(count = diagnostics.len(), "Provider configuration is incomplete");
                return Ok(diagnostics);
            }
        };

        let client = (self.factory)(&resolved)?;
        let context = ProviderContext::new(client)
            .with_clock(self.clock.clone())
            .with_poll_settings(self.polls.clone());
        *self.context.write().await = Some(Arc::new(context));

        info!(base_url = resolved.base_url(), "Provider configured");
        Ok(vec![])
    }

    #[instrument(skip_all, name = "provider.stop")]
    async fn stop(&self) -> Result<(), ProviderError> {
        self.context.write().await.take();
        info!("Provider stopped");
        Ok(())
    }

    #[instrument(skip(self, config), name = "provider.validate_resource_config")]
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let diagnostics = self.handler(resource_type)?.validate(&config);
        debug!(count = diagnostics.len(), "Validated resource configuration");
        Ok(diagnostics)
    }

    #[instrument(skip(self, state), name = "provider.upgrade_resource_state")]
    async fn upgrade_resource_state(
        &self,
        resource_type: &str,
        version: i64,
        state: Value,
    ) -> Result<Value, ProviderError> {
        self.handler(resource_type)?.upgrade_state(version, state)
    }

    #[instrument(skip(self, prior_state, proposed_state, config), name = "provider.plan")]
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let schema = self.handler(resource_type)?.schema();

        if proposed_state.is_null() {
            let changes = match &prior_state {
                Some(prior) => field_changes(&schema, Some(prior), None),
                None => Vec::new(),
            };
            debug!(changes = changes.len(), "Planned destroy");
            return Ok(PlanResult::destroy(changes));
        }

        if !config.is_null() {
            if let Err(diagnostics) = validation::validate_result(&schema, &config) {
                let message = diagnostics
                    .iter()
                    .map(|d| match &d.attribute {
                        Some(attribute) => format!("{} ({})", d.summary, attribute),
                        None => d.summary.clone(),
                    })
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(ProviderError::Validation(message));
            }
        }

        let plan = match prior_state.as_ref().filter(|p| !p.is_null()) {
            None => {
                let changes = field_changes(&schema, None, Some(&proposed_state));
                PlanResult::with_changes(proposed_state, changes, false)
            }
            Some(prior) => {
                let planned = carry_computed(&schema, prior, proposed_state);
                let changes = field_changes(&schema, Some(prior), Some(&planned));
                let requires_replace = changes.iter().any(|c| forces_new(&schema, &c.path));
                if changes.is_empty() {
                    PlanResult::no_change(planned)
                } else {
                    PlanResult::with_changes(planned, changes, requires_replace)
                }
            }
        };

        debug!(
            changes = plan.changes.len(),
            requires_replace = plan.requires_replace,
            "Planned resource"
        );
        Ok(plan)
    }

    #[instrument(skip(self, planned_state), name = "provider.create")]
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        info!("Create called");
        let handler = self.handler(resource_type)?;
        let ctx = self.context().await?;

        match handler.create(&ctx, planned_state).await {
            Ok(state) => {
                info!("Create completed successfully");
                Ok(state)
            }
            Err(e) => {
                error!(error = %e, "Create failed");
                Err(e)
            }
        }
    }

    #[instrument(skip(self, current_state), name = "provider.read")]
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        debug!("Read called");
        let handler = self.handler(resource_type)?;
        let ctx = self.context().await?;

        match handler.read(&ctx, current_state).await {
            Ok(Some(state)) => {
                debug!("Read completed successfully");
                Ok(state)
            }
            Ok(None) => {
                info!("Resource no longer exists, removing it from state");
                Ok(Value::Null)
            }
            Err(e) => {
                error!(error = %e, "Read failed");
                Err(e)
            }
        }
    }

    #[instrument(skip(self, prior_state, planned_state), name = "provider.update")]
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        info!("Update called");
        let handler = self.handler(resource_type)?;
        let ctx = self.context().await?;

        match handler.update(&ctx, prior_state, planned_state).await {
            Ok(state) => {
                info!("Update completed successfully");
                Ok(state)
            }
            Err(e) => {
                error!(error = %e, "Update failed");
                Err(e)
            }
        }
    }

    #[instrument(skip(self, current_state), name = "provider.delete")]
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        info!("Delete called");
        let handler = self.handler(resource_type)?;
        let ctx = self.context().await?;

        match handler.delete(&ctx, current_state).await {
            Ok(()) => {
                info!("Delete completed successfully");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Delete failed");
                Err(e)
            }
        }
    }

    #[instrument(skip(self), name = "provider.import_resource")]
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        info!("Import called");
        let handler = self.handler(resource_type)?;
        let ctx = self.context().await?;

        match handler.import(&ctx, id).await {
            Ok(state) => {
                info!("Import completed successfully");
                Ok(vec![ImportedResource::new(resource_type, state)])
            }
            Err(e) => {
                error!(error = %e, "Import failed");
                Err(e)
            }
        }
    }
}

// =============================================================================
// Plan computation
// =============================================================================

enum Field<'a> {
    Attribute(&'a Attribute),
    Block(&'a NestedBlock),
}

fn field<'a>(block: &'a Block, name: &str) -> Option<Field<'a>> {
    block
        .attributes
        .get(name)
        .map(Field::Attribute)
        .or_else(|| block.blocks.get(name).map(Field::Block))
}

/// Copy computed values the configuration leaves unset from the prior state.
fn carry_computed(schema: &Schema, prior: &Value, proposed: Value) -> Value {
    let Value::Object(mut planned) = proposed else {
        return proposed;
    };
    for (name, attr) in &schema.block.attributes {
        if !attr.flags.computed {
            continue;
        }
        let unset = planned.get(name).map_or(true, Value::is_null);
        if attr.flags.is_computed_only() || unset {
            if let Some(value) = prior.get(name) {
                planned.insert(name.clone(), value.clone());
            }
        }
    }
    Value::Object(planned)
}

/// Top-level changes between two states, compared after normalization.
fn field_changes(schema: &Schema, before: Option<&Value>, after: Option<&Value>) -> Vec<AttributeChange> {
    let mut changes = Vec::new();
    for name in schema.block.field_names() {
        let Some(kind) = field(&schema.block, name) else {
            continue;
        };
        let old = before.and_then(|v| v.get(name)).and_then(|v| normalize(v, &kind));
        let new = after.and_then(|v| v.get(name)).and_then(|v| normalize(v, &kind));
        match (old, new) {
            (None, None) => {}
            (None, Some(new)) => changes.push(AttributeChange::added(name, new)),
            (Some(old), None) => changes.push(AttributeChange::removed(name, old)),
            (Some(old), Some(new)) if old != new => {
                changes.push(AttributeChange::modified(name, old, new))
            }
            _ => {}
        }
    }
    changes
}

fn forces_new(schema: &Schema, name: &str) -> bool {
    match field(&schema.block, name) {
        Some(Field::Attribute(attr)) => attr.force_new,
        Some(Field::Block(block)) => block.force_new,
        None => false,
    }
}

/// Drop nulls and empty collections and sort set elements, so that values
/// Terraform considers equal compare equal.
fn normalize(value: &Value, kind: &Field<'_>) -> Option<Value> {
    match (value, kind) {
        (Value::Null, _) => None,
        (Value::Array(items), _) if items.is_empty() => None,
        (Value::Array(items), Field::Attribute(attr)) => {
            let mut items = items.clone();
            if matches!(attr.attr_type, AttributeType::Set(_)) {
                sort_values(&mut items);
            }
            Some(Value::Array(items))
        }
        (Value::Array(items), Field::Block(nested)) => {
            let mut items: Vec<Value> = items
                .iter()
                .filter_map(|item| normalize_object(item, &nested.block))
                .collect();
            if nested.nesting_mode == BlockNestingMode::Set {
                sort_values(&mut items);
            }
            (!items.is_empty()).then_some(Value::Array(items))
        }
        (Value::Object(_), Field::Block(nested)) => normalize_object(value, &nested.block),
        (other, _) => Some(other.clone()),
    }
}

fn normalize_object(value: &Value, block: &Block) -> Option<Value> {
    let Value::Object(fields) = value else {
        return None;
    };
    let normalized: Map<String, Value> = block
        .field_names()
        .into_iter()
        .filter_map(|name| {
            let kind = field(block, name)?;
            // Nested values reported by Atlas never drive a change.
            if let Field::Attribute(attr) = &kind {
                if attr.flags.is_computed_only() {
                    return None;
                }
            }
            let value = normalize(fields.get(name)?, &kind)?;
            Some((name.to_string(), value))
        })
        .collect();
    Some(Value::Object(normalized))
}

fn sort_values(items: &mut [Value]) {
    items.sort_by_cached_key(|v| v.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::{FakeAtlas, Op};
    use crate::resources::{custom_db_role, project};
    use crate::testing::{fake_provider, test_config};
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    fn role_config() -> Value {
        json!({
            "project_id": "p1",
            "role_name": "reader",
            "actions": [{"action": "FIND", "resources": [{"database_name": "sales"}]}],
            "inherited_roles": [
                {"database_name": "admin", "role_name": "read"},
                {"database_name": "admin", "role_name": "clusterMonitor"}
            ]
        })
    }

    #[test]
    fn test_schema_lists_every_resource() {
        let provider = fake_provider(Arc::new(FakeAtlas::new()));
        let schema = provider.schema();

        assert_eq!(schema.resources.len(), 4);
        assert!(schema.provider.block.attributes["private_key"].flags.sensitive);
        assert_eq!(schema.resources["mongodbatlas_encryption_at_rest"].version, 1);

        let metadata = provider.metadata();
        assert_eq!(metadata.resources[0], "mongodbatlas_custom_db_role");
        assert!(metadata.capabilities.plan_destroy);
    }

    #[tokio::test]
    async fn test_operations_require_configure() {
        let provider = fake_provider(Arc::new(FakeAtlas::new()));

        let err = provider
            .create(custom_db_role::TYPE_NAME, role_config())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured));
        assert!(!provider.is_configured().await);
    }

    #[tokio::test]
    async fn test_configure_reports_missing_credentials() {
        let provider = fake_provider(Arc::new(FakeAtlas::new()));

        let diagnostics = provider
            .configure(json!({"public_key": "pk"}))
            .await
            .unwrap();

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("private_key"));
        assert!(!provider.is_configured().await);
    }

    #[tokio::test]
    async fn test_configure_falls_back_to_environment() {
        let provider = fake_provider(Arc::new(FakeAtlas::new())).with_env(|key| match key {
            crate::config::ENV_PUBLIC_KEY => Some("env-pk".to_string()),
            crate::config::ENV_PRIVATE_KEY => Some("env-sk".to_string()),
            _ => None,
        });

        let diagnostics = provider.configure(Value::Null).await.unwrap();
        assert!(diagnostics.is_empty());
        assert!(provider.is_configured().await);

        assert_ok!(provider.stop().await);
        assert!(!provider.is_configured().await);
    }

    #[tokio::test]
    async fn test_configure_passes_resolved_config_to_factory() {
        let atlas = Arc::new(FakeAtlas::new());
        let provider = AtlasProvider::new(move |config: &ProviderConfig| {
            if config.base_url() != "https://cloud-qa.mongodb.com/" {
                return Err(ProviderError::Validation("wrong base url".to_string()));
            }
            Ok(atlas.clone() as Arc<dyn AtlasClient>)
        })
        .with_env(|_| None);

        let mut config = test_config();
        config["base_url"] = json!("https://cloud-qa.mongodb.com/");
        assert!(provider.configure(config).await.unwrap().is_empty());

        let err = provider.configure(test_config()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }

    #[tokio::test]
    async fn test_validate_provider_config_flags_wrong_types() {
        let provider = fake_provider(Arc::new(FakeAtlas::new()));

        let diagnostics = provider
            .validate_provider_config(json!({"public_key": 42}))
            .await
            .unwrap();
        assert!(diagnostics.iter().any(|d| d.is_error()));

        let diagnostics = provider.validate_provider_config(test_config()).await.unwrap();
        assert!(diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_resource_type() {
        let provider = fake_provider(Arc::new(FakeAtlas::new()));
        provider.configure(test_config()).await.unwrap();

        let err = provider
            .read("mongodbatlas_cluster", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnknownResource(_)));
    }

    #[tokio::test]
    async fn test_plan_create_lists_added_fields() {
        let provider = fake_provider(Arc::new(FakeAtlas::new()));

        let plan = provider
            .plan(custom_db_role::TYPE_NAME, None, role_config(), role_config())
            .await
            .unwrap();

        let paths: Vec<&str> = plan.changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["actions", "inherited_roles", "project_id", "role_name"]);
        assert!(!plan.requires_replace);
    }

    #[tokio::test]
    async fn test_plan_rejects_invalid_config() {
        let provider = fake_provider(Arc::new(FakeAtlas::new()));
        let mut config = role_config();
        config["role_name"] = json!("xgen-internal");

        let err = provider
            .plan(custom_db_role::TYPE_NAME, None, config.clone(), config)
            .await
            .unwrap_err();
        match err {
            ProviderError::Validation(message) => assert!(message.contains("role_name")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_plan_ignores_set_order_and_keeps_computed_id() {
        let provider = fake_provider(Arc::new(FakeAtlas::new()));
        let mut prior = role_config();
        prior["id"] = json!("encoded-id");
        let mut proposed = role_config();
        proposed["inherited_roles"] = json!([
            {"database_name": "admin", "role_name": "clusterMonitor"},
            {"database_name": "admin", "role_name": "read"}
        ]);

        let plan = provider
            .plan(custom_db_role::TYPE_NAME, Some(prior), proposed.clone(), proposed)
            .await
            .unwrap();

        assert!(plan.changes.is_empty());
        assert_eq!(plan.planned_state["id"], "encoded-id");
    }

    #[tokio::test]
    async fn test_plan_ignores_reported_limit_fields() {
        let provider = fake_provider(Arc::new(FakeAtlas::new()));
        let proposed = json!({
            "name": "analytics",
            "org_id": "org1",
            "limits": [{"name": "atlas.project.deployment.clusters", "value": 1}]
        });
        let mut prior = proposed.clone();
        prior["id"] = json!("5f0000000000000000000001");
        prior["limits"] = json!([{
            "name": "atlas.project.deployment.clusters",
            "value": 1,
            "current_usage": 0,
            "default_limit": 25,
            "maximum_limit": 90
        }]);

        let plan = provider
            .plan(project::TYPE_NAME, Some(prior.clone()), proposed.clone(), proposed.clone())
            .await
            .unwrap();
        assert!(plan.changes.is_empty());

        let mut proposed = proposed;
        proposed["limits"][0]["value"] = json!(2);
        let plan = provider
            .plan(project::TYPE_NAME, Some(prior), proposed.clone(), proposed)
            .await
            .unwrap();
        let paths: Vec<&str> = plan.changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["limits"]);
        assert!(!plan.requires_replace);
    }

    #[tokio::test]
    async fn test_plan_force_new_requires_replace() {
        let provider = fake_provider(Arc::new(FakeAtlas::new()));
        let prior = role_config();
        let mut proposed = role_config();
        proposed["role_name"] = json!("writer");

        let plan = provider
            .plan(custom_db_role::TYPE_NAME, Some(prior.clone()), proposed.clone(), proposed)
            .await
            .unwrap();
        assert!(plan.requires_replace);

        let mut proposed = role_config();
        proposed["actions"] = json!([{"action": "INSERT", "resources": [{"database_name": "sales"}]}]);
        let plan = provider
            .plan(custom_db_role::TYPE_NAME, Some(prior), proposed.clone(), proposed)
            .await
            .unwrap();
        assert_eq!(plan.changes.len(), 1);
        assert!(!plan.requires_replace);
    }

    #[tokio::test]
    async fn test_plan_destroy() {
        let provider = fake_provider(Arc::new(FakeAtlas::new()));

        let plan = provider
            .plan(custom_db_role::TYPE_NAME, Some(role_config()), Value::Null, Value::Null)
            .await
            .unwrap();

        assert!(plan.planned_state.is_null());
        assert!(plan.changes.iter().all(|c| c.after.is_none()));
        assert_eq!(plan.changes.len(), 4);
    }

    #[tokio::test]
    async fn test_lifecycle_through_provider() {
        let atlas = Arc::new(FakeAtlas::new());
        let provider = fake_provider(atlas.clone());
        provider.configure(test_config()).await.unwrap();

        let state = provider
            .create(custom_db_role::TYPE_NAME, role_config())
            .await
            .unwrap();
        assert_eq!(atlas.calls(Op::CreateCustomDbRole), 1);

        let read = provider
            .read(custom_db_role::TYPE_NAME, state.clone())
            .await
            .unwrap();
        assert_eq!(read, state);

        assert_ok!(provider.delete(custom_db_role::TYPE_NAME, state.clone()).await);
        let gone = provider.read(custom_db_role::TYPE_NAME, state).await.unwrap();
        assert!(gone.is_null());
    }

    #[tokio::test]
    async fn test_import_through_provider() {
        let atlas = Arc::new(FakeAtlas::new());
        let provider = fake_provider(atlas.clone());
        provider.configure(test_config()).await.unwrap();
        provider
            .create(custom_db_role::TYPE_NAME, role_config())
            .await
            .unwrap();

        let imported = provider
            .import_resource(custom_db_role::TYPE_NAME, "p1-reader")
            .await
            .unwrap();
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].resource_type, custom_db_role::TYPE_NAME);
        assert_eq!(imported[0].state["role_name"], "reader");

        assert_err!(
            provider
                .import_resource(custom_db_role::TYPE_NAME, "p1-missing")
                .await
        );
    }

    #[tokio::test]
    async fn test_upgrade_resource_state_dispatches() {
        let provider = fake_provider(Arc::new(FakeAtlas::new()));

        let upgraded = provider
            .upgrade_resource_state(
                "mongodbatlas_encryption_at_rest",
                0,
                json!({"project_id": "p1", "aws_kms": {"enabled": "true"}}),
            )
            .await
            .unwrap();
        assert_eq!(upgraded["aws_kms_config"][0]["enabled"], true);

        let err = provider
            .upgrade_resource_state(custom_db_role::TYPE_NAME, 3, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedStateVersion { .. }));
    }
}
