//! `mongodbatlas_encryption_at_rest`: customer key management for a project.
//!
//! Atlas never returns key material (AWS secret access key, Azure secret,
//! GCP service account key), so those values are carried over from the
//! configuration or prior state. Writes are retried while Atlas reports
//! that it cannot yet use the supplied cloud credentials, which happens
//! right after an IAM role or key was created.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use super::{from_state, null_as_default, require_id, require_present, to_state, ResourceHandler};
use crate::atlas::{AwsKms, AzureKeyVault, EncryptionAtRest, ErrorPolicy, GoogleCloudKms};
use crate::config::Operation;
use crate::error::ProviderError;
use crate::poll::{Observation, StateConf};
use crate::provider::ProviderContext;
use crate::schema::{Attribute, Block, NestedBlock, Schema};

/// Resource type name.
pub const TYPE_NAME: &str = "mongodbatlas_encryption_at_rest";

const SCHEMA_VERSION: u64 = 1;

const WRITE_PENDING: ErrorPolicy =
    ErrorPolicy::new(&[500], &["CANNOT_ASSUME_ROLE", "INVALID_AWS_CREDENTIALS"]);

/// Version 0 map attributes and the list blocks that replaced them.
const LEGACY_ATTRIBUTES: [(&str, &str); 3] = [
    ("aws_kms", "aws_kms_config"),
    ("azure_key_vault", "azure_key_vault_config"),
    ("google_cloud_kms", "google_cloud_kms_config"),
];

/// Terraform state of the encryption settings.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionAtRestState {
    #[serde(default)]
    pub id: Option<String>,
    pub project_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub aws_kms_config: Vec<AwsKmsConfig>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub azure_key_vault_config: Vec<AzureKeyVaultConfig>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub google_cloud_kms_config: Vec<GoogleCloudKmsConfig>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsKmsConfig {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub customer_master_key_id: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub role_id: Option<String>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureKeyVaultConfig {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub azure_environment: Option<String>,
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub resource_group_name: Option<String>,
    #[serde(default)]
    pub key_vault_name: Option<String>,
    #[serde(default)]
    pub key_identifier: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleCloudKmsConfig {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub service_account_key: Option<String>,
    #[serde(default)]
    pub key_version_resource_id: Option<String>,
}

impl From<&AwsKmsConfig> for AwsKms {
    fn from(c: &AwsKmsConfig) -> Self {
        Self {
            enabled: c.enabled,
            access_key_id: c.access_key_id.clone(),
            secret_access_key: c.secret_access_key.clone(),
            customer_master_key_id: c.customer_master_key_id.clone(),
            region: c.region.clone(),
            role_id: c.role_id.clone(),
            valid: None,
        }
    }
}

impl From<&AzureKeyVaultConfig> for AzureKeyVault {
    fn from(c: &AzureKeyVaultConfig) -> Self {
        Self {
            enabled: c.enabled,
            client_id: c.client_id.clone(),
            azure_environment: c.azure_environment.clone(),
            subscription_id: c.subscription_id.clone(),
            resource_group_name: c.resource_group_name.clone(),
            key_vault_name: c.key_vault_name.clone(),
            key_identifier: c.key_identifier.clone(),
            secret: c.secret.clone(),
            tenant_id: c.tenant_id.clone(),
        }
    }
}

impl From<&GoogleCloudKmsConfig> for GoogleCloudKms {
    fn from(c: &GoogleCloudKmsConfig) -> Self {
        Self {
            enabled: c.enabled,
            service_account_key: c.service_account_key.clone(),
            key_version_resource_id: c.key_version_resource_id.clone(),
        }
    }
}

impl EncryptionAtRestState {
    /// The PATCH body for this state. Providers present in `prior` but
    /// dropped from this state are disabled.
    fn to_request(&self, prior: Option<&EncryptionAtRestState>) -> EncryptionAtRest {
        let had = |pick: fn(&EncryptionAtRestState) -> bool| prior.is_some_and(pick);

        EncryptionAtRest {
            aws_kms: match self.aws_kms_config.first() {
                Some(c) => Some(c.into()),
                None if had(|p| !p.aws_kms_config.is_empty()) => Some(disabled_aws()),
                None => None,
            },
            azure_key_vault: match self.azure_key_vault_config.first() {
                Some(c) => Some(c.into()),
                None if had(|p| !p.azure_key_vault_config.is_empty()) => Some(disabled_azure()),
                None => None,
            },
            google_cloud_kms: match self.google_cloud_kms_config.first() {
                Some(c) => Some(c.into()),
                None if had(|p| !p.google_cloud_kms_config.is_empty()) => Some(disabled_gcp()),
                None => None,
            },
        }
    }

    /// Build state from what Atlas returned, taking secrets from `known`.
    ///
    /// A provider appears in state when it is enabled in Atlas or was
    /// already managed in `known`.
    fn from_settings(project_id: &str, settings: EncryptionAtRest, known: &Self) -> Self {
        let aws_kms_config = settings
            .aws_kms
            .filter(|a| a.enabled == Some(true) || !known.aws_kms_config.is_empty())
            .map(|a| {
                let secret = known.aws_kms_config.first().and_then(|k| k.secret_access_key.clone());
                AwsKmsConfig {
                    enabled: a.enabled,
                    access_key_id: a.access_key_id,
                    secret_access_key: a.secret_access_key.or(secret),
                    customer_master_key_id: a.customer_master_key_id,
                    region: a.region,
                    role_id: a.role_id,
                }
            });

        let azure_key_vault_config = settings
            .azure_key_vault
            .filter(|a| a.enabled == Some(true) || !known.azure_key_vault_config.is_empty())
            .map(|a| {
                let secret = known.azure_key_vault_config.first().and_then(|k| k.secret.clone());
                AzureKeyVaultConfig {
                    enabled: a.enabled,
                    client_id: a.client_id,
                    azure_environment: a.azure_environment,
                    subscription_id: a.subscription_id,
                    resource_group_name: a.resource_group_name,
                    key_vault_name: a.key_vault_name,
                    key_identifier: a.key_identifier,
                    secret: a.secret.or(secret),
                    tenant_id: a.tenant_id,
                }
            });

        let google_cloud_kms_config = settings
            .google_cloud_kms
            .filter(|g| g.enabled == Some(true) || !known.google_cloud_kms_config.is_empty())
            .map(|g| {
                let key = known
                    .google_cloud_kms_config
                    .first()
                    .and_then(|k| k.service_account_key.clone());
                GoogleCloudKmsConfig {
                    enabled: g.enabled,
                    service_account_key: g.service_account_key.or(key),
                    key_version_resource_id: g.key_version_resource_id,
                }
            });

        Self {
            id: Some(project_id.to_string()),
            project_id: project_id.to_string(),
            aws_kms_config: aws_kms_config.into_iter().collect(),
            azure_key_vault_config: azure_key_vault_config.into_iter().collect(),
            google_cloud_kms_config: google_cloud_kms_config.into_iter().collect(),
        }
    }
}

fn disabled_aws() -> AwsKms {
    AwsKms {
        enabled: Some(false),
        ..Default::default()
    }
}

fn disabled_azure() -> AzureKeyVault {
    AzureKeyVault {
        enabled: Some(false),
        ..Default::default()
    }
}

fn disabled_gcp() -> GoogleCloudKms {
    GoogleCloudKms {
        enabled: Some(false),
        ..Default::default()
    }
}

fn is_enabled(settings: &EncryptionAtRest) -> bool {
    settings.aws_kms.as_ref().and_then(|a| a.enabled) == Some(true)
        || settings.azure_key_vault.as_ref().and_then(|a| a.enabled) == Some(true)
        || settings.google_cloud_kms.as_ref().and_then(|g| g.enabled) == Some(true)
}

/// Fold a version 0 state into the version 1 shape.
///
/// Legacy map attributes held string values, so `"true"`/`"false"` become
/// booleans for `enabled`.
fn upgrade_v0(state: Value) -> Result<Value, ProviderError> {
    let Value::Object(mut fields) = state else {
        return Err(ProviderError::Validation(format!(
            "{} state must be an object",
            TYPE_NAME
        )));
    };

    for (legacy, current) in LEGACY_ATTRIBUTES {
        let Some(old) = fields.remove(legacy) else {
            continue;
        };
        let current_is_empty = match fields.get(current) {
            None | Some(Value::Null) => true,
            Some(Value::Array(items)) => items.is_empty(),
            Some(_) => false,
        };
        if !current_is_empty {
            continue;
        }
        match old {
            Value::Object(map) if !map.is_empty() => {
                debug!(attribute = legacy, "Folding legacy attribute into {}", current);
                fields.insert(current.to_string(), Value::Array(vec![convert_legacy_map(map)]));
            }
            _ => {}
        }
    }

    Ok(Value::Object(fields))
}

fn convert_legacy_map(map: Map<String, Value>) -> Value {
    let converted = map
        .into_iter()
        .map(|(key, value)| {
            let value = match (key.as_str(), value) {
                ("enabled", Value::String(s)) => Value::Bool(s.eq_ignore_ascii_case("true")),
                (_, Value::String(s)) if s.is_empty() => Value::Null,
                (_, other) => other,
            };
            (key, value)
        })
        .collect();
    Value::Object(converted)
}

/// Handler for `mongodbatlas_encryption_at_rest`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncryptionAtRestResource;

impl EncryptionAtRestResource {
    /// PATCH the settings, retrying while Atlas cannot use the credentials yet.
    async fn apply(
        &self,
        ctx: &ProviderContext,
        operation: Operation,
        project_id: &str,
        settings: &EncryptionAtRest,
    ) -> Result<(), ProviderError> {
        let conf = StateConf::new(&["retrying"], &["applied"])
            .with_config(ctx.poll_config(TYPE_NAME, operation));
        let client = ctx.client.as_ref();

        conf.wait(ctx.clock.as_ref(), move || async move {
            match client.update_encryption_at_rest(project_id, settings).await {
                Ok(_) => Ok(Observation::new((), "applied")),
                Err(e) if WRITE_PENDING.is_pending(&e) => {
                    warn!(error = %e, "Atlas cannot use the key yet, retrying");
                    Ok(Observation::new((), "retrying"))
                }
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(|e| {
            ProviderError::wait(
                format!("error updating encryption at rest for project {}", project_id),
                e,
            )
        })
    }

    async fn fetch(
        &self,
        ctx: &ProviderContext,
        project_id: &str,
        known: &EncryptionAtRestState,
    ) -> Result<Option<EncryptionAtRestState>, ProviderError> {
        let settings = match ctx.client.get_encryption_at_rest(project_id).await {
            Ok(settings) => settings,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => {
                return Err(ProviderError::api(
                    format!("error getting encryption at rest for project {}", project_id),
                    e,
                ))
            }
        };
        if !is_enabled(&settings) {
            return Ok(None);
        }
        Ok(Some(EncryptionAtRestState::from_settings(
            project_id, settings, known,
        )))
    }

    async fn fetch_written(
        &self,
        ctx: &ProviderContext,
        plan: &EncryptionAtRestState,
    ) -> Result<Value, ProviderError> {
        let state = self.fetch(ctx, &plan.project_id, plan).await?;
        let state = state.map(|s| to_state(&s)).transpose()?;
        require_present(TYPE_NAME, &plan.project_id, state)
    }
}

#[async_trait::async_trait]
impl ResourceHandler for EncryptionAtRestResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        let aws = Block::new()
            .with_attribute("enabled", Attribute::optional_bool())
            .with_attribute("access_key_id", Attribute::optional_string().sensitive())
            .with_attribute("secret_access_key", Attribute::optional_string().sensitive())
            .with_attribute("customer_master_key_id", Attribute::optional_string().sensitive())
            .with_attribute("region", Attribute::optional_string())
            .with_attribute("role_id", Attribute::optional_string());

        let azure = Block::new()
            .with_attribute("enabled", Attribute::required_bool())
            .with_attribute("client_id", Attribute::optional_string().sensitive())
            .with_attribute("azure_environment", Attribute::optional_string())
            .with_attribute("subscription_id", Attribute::optional_string().sensitive())
            .with_attribute("resource_group_name", Attribute::optional_string())
            .with_attribute("key_vault_name", Attribute::optional_string())
            .with_attribute("key_identifier", Attribute::optional_string().sensitive())
            .with_attribute("secret", Attribute::optional_string().sensitive())
            .with_attribute("tenant_id", Attribute::optional_string().sensitive());

        let gcp = Block::new()
            .with_attribute("enabled", Attribute::optional_bool())
            .with_attribute("service_account_key", Attribute::optional_string().sensitive())
            .with_attribute("key_version_resource_id", Attribute::optional_string().sensitive());

        Schema::new(SCHEMA_VERSION)
            .with_description("Encryption at rest with customer managed keys")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("project_id", Attribute::required_string().with_force_new())
            .with_block("aws_kms_config", NestedBlock::list(aws).with_max_items(1))
            .with_block("azure_key_vault_config", NestedBlock::list(azure).with_max_items(1))
            .with_block("google_cloud_kms_config", NestedBlock::list(gcp).with_max_items(1))
    }

    fn upgrade_state(&self, version: i64, state: Value) -> Result<Value, ProviderError> {
        match version {
            0 => upgrade_v0(state),
            1 => Ok(state),
            _ => Err(ProviderError::UnsupportedStateVersion {
                resource_type: TYPE_NAME.to_string(),
                version,
            }),
        }
    }

    #[instrument(skip_all, fields(resource_type = TYPE_NAME))]
    async fn create(&self, ctx: &ProviderContext, planned: Value) -> Result<Value, ProviderError> {
        let plan: EncryptionAtRestState = from_state(planned)?;
        let request = plan.to_request(None);

        self.apply(ctx, Operation::Create, &plan.project_id, &request)
            .await?;
        info!(project_id = %plan.project_id, "Enabled encryption at rest");

        self.fetch_written(ctx, &plan).await
    }

    #[instrument(skip_all, fields(resource_type = TYPE_NAME))]
    async fn read(
        &self,
        ctx: &ProviderContext,
        current: Value,
    ) -> Result<Option<Value>, ProviderError> {
        let current: EncryptionAtRestState = from_state(current)?;
        let project_id = require_id(TYPE_NAME, &current.id)?;

        match self.fetch(ctx, project_id, &current).await? {
            Some(state) => Ok(Some(to_state(&state)?)),
            None => {
                debug!(project_id, "Encryption at rest is disabled");
                Ok(None)
            }
        }
    }

    #[instrument(skip_all, fields(resource_type = TYPE_NAME))]
    async fn update(
        &self,
        ctx: &ProviderContext,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior: EncryptionAtRestState = from_state(prior)?;
        let plan: EncryptionAtRestState = from_state(planned)?;
        let request = plan.to_request(Some(&prior));

        self.apply(ctx, Operation::Update, &plan.project_id, &request)
            .await?;
        info!(project_id = %plan.project_id, "Updated encryption at rest");

        self.fetch_written(ctx, &plan).await
    }

    #[instrument(skip_all, fields(resource_type = TYPE_NAME))]
    async fn delete(&self, ctx: &ProviderContext, current: Value) -> Result<(), ProviderError> {
        let current: EncryptionAtRestState = from_state(current)?;
        let project_id = require_id(TYPE_NAME, &current.id)?;
        let request = EncryptionAtRest {
            aws_kms: Some(disabled_aws()),
            azure_key_vault: Some(disabled_azure()),
            google_cloud_kms: Some(disabled_gcp()),
        };

        self.apply(ctx, Operation::Delete, project_id, &request)
            .await?;
        info!(project_id, "Disabled encryption at rest");
        Ok(())
    }

    #[instrument(skip_all, fields(resource_type = TYPE_NAME, id))]
    async fn import(&self, ctx: &ProviderContext, id: &str) -> Result<Value, ProviderError> {
        match self.fetch(ctx, id, &EncryptionAtRestState::default()).await? {
            Some(state) => to_state(&state),
            None => Err(ProviderError::NotFound(format!(
                "couldn't import encryption at rest for project {}: it is not enabled",
                id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::{AtlasError, FakeAtlas, Op};
    use crate::testing::ManualClock;
    use serde_json::json;
    use std::sync::Arc;

    fn setup() -> (Arc<FakeAtlas>, ProviderContext) {
        let atlas = Arc::new(FakeAtlas::new());
        let ctx = ProviderContext::new(atlas.clone()).with_clock(Arc::new(ManualClock::new()));
        (atlas, ctx)
    }

    fn planned() -> Value {
        json!({
            "project_id": "p1",
            "aws_kms_config": [{
                "enabled": true,
                "customer_master_key_id": "cmk-1",
                "region": "US_EAST_1",
                "role_id": "role-1"
            }],
            "google_cloud_kms_config": [{
                "enabled": true,
                "service_account_key": "{\"type\":\"service_account\"}",
                "key_version_resource_id": "projects/p/keyRings/r/cryptoKeys/k/cryptoKeyVersions/1"
            }]
        })
    }

    #[tokio::test]
    async fn test_create_keeps_secrets_from_plan() {
        let (atlas, ctx) = setup();

        let state = EncryptionAtRestResource.create(&ctx, planned()).await.unwrap();

        assert_eq!(state["id"], "p1");
        assert_eq!(state["aws_kms_config"][0]["region"], "US_EAST_1");
        assert_eq!(
            state["google_cloud_kms_config"][0]["service_account_key"],
            "{\"type\":\"service_account\"}"
        );
        assert_eq!(state["azure_key_vault_config"], json!([]));
        assert!(atlas.encryption_at_rest("p1").unwrap().azure_key_vault.is_none());
    }

    #[tokio::test]
    async fn test_create_retries_while_role_is_not_assumable() {
        let (atlas, ctx) = setup();
        atlas.fail_times(
            Op::UpdateEncryptionAtRest,
            AtlasError::new(400, "cannot assume role").with_code("CANNOT_ASSUME_ROLE"),
            3,
        );

        EncryptionAtRestResource.create(&ctx, planned()).await.unwrap();
        assert_eq!(atlas.calls(Op::UpdateEncryptionAtRest), 4);
    }

    #[tokio::test]
    async fn test_create_fails_on_invalid_key() {
        let (atlas, ctx) = setup();
        atlas.fail_next(
            Op::UpdateEncryptionAtRest,
            AtlasError::new(400, "bad key").with_code("INVALID_KEY_VERSION"),
        );

        let err = EncryptionAtRestResource.create(&ctx, planned()).await.unwrap_err();
        assert!(err.atlas_error().unwrap().has_code("INVALID_KEY_VERSION"));
    }

    #[tokio::test]
    async fn test_read_keeps_prior_secrets() {
        let (_atlas, ctx) = setup();
        let state = EncryptionAtRestResource.create(&ctx, planned()).await.unwrap();

        let refreshed = EncryptionAtRestResource
            .read(&ctx, state.clone())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(refreshed, state);
    }

    #[tokio::test]
    async fn test_update_disables_dropped_provider() {
        let (atlas, ctx) = setup();
        let prior = EncryptionAtRestResource.create(&ctx, planned()).await.unwrap();

        let mut plan = prior.clone();
        plan["google_cloud_kms_config"] = json!([]);
        let state = EncryptionAtRestResource.update(&ctx, prior, plan).await.unwrap();

        let gcp = atlas.encryption_at_rest("p1").unwrap().google_cloud_kms.unwrap();
        assert_eq!(gcp.enabled, Some(false));
        assert_eq!(state["google_cloud_kms_config"], json!([]));
        assert_eq!(state["aws_kms_config"][0]["enabled"], true);
    }

    #[tokio::test]
    async fn test_delete_disables_everything() {
        let (atlas, ctx) = setup();
        let state = EncryptionAtRestResource.create(&ctx, planned()).await.unwrap();

        EncryptionAtRestResource.delete(&ctx, state.clone()).await.unwrap();

        let stored = atlas.encryption_at_rest("p1").unwrap();
        assert_eq!(stored.aws_kms.unwrap().enabled, Some(false));
        assert!(EncryptionAtRestResource.read(&ctx, state).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_import_requires_enabled_provider() {
        let (_atlas, ctx) = setup();
        let err = EncryptionAtRestResource.import(&ctx, "p1").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));

        EncryptionAtRestResource.create(&ctx, planned()).await.unwrap();
        let state = EncryptionAtRestResource.import(&ctx, "p1").await.unwrap();
        assert_eq!(state["aws_kms_config"][0]["role_id"], "role-1");
        assert!(state["google_cloud_kms_config"][0]["service_account_key"].is_null());
    }

    #[test]
    fn test_upgrade_folds_legacy_maps() {
        let v0 = json!({
            "id": "p1",
            "project_id": "p1",
            "aws_kms": {"enabled": "true", "region": "US_EAST_1", "role_id": "r1", "access_key_id": ""},
            "azure_key_vault": {},
            "google_cloud_kms_config": [{"enabled": true, "key_version_resource_id": "k"}],
            "google_cloud_kms": {"enabled": "false"}
        });

        let upgraded = EncryptionAtRestResource.upgrade_state(0, v0).unwrap();

        assert!(upgraded.get("aws_kms").is_none());
        assert!(upgraded.get("azure_key_vault").is_none());
        assert!(upgraded.get("google_cloud_kms").is_none());
        assert_eq!(
            upgraded["aws_kms_config"],
            json!([{"enabled": true, "region": "US_EAST_1", "role_id": "r1", "access_key_id": null}])
        );
        assert!(upgraded.get("azure_key_vault_config").is_none());
        assert_eq!(upgraded["google_cloud_kms_config"][0]["key_version_resource_id"], "k");

        let state: EncryptionAtRestState = from_state(upgraded).unwrap();
        assert_eq!(state.aws_kms_config[0].enabled, Some(true));
    }

    #[test]
    fn test_upgrade_rejects_future_versions() {
        let state = json!({"project_id": "p1"});
        assert_eq!(
            EncryptionAtRestResource.upgrade_state(1, state.clone()).unwrap(),
            state
        );
        assert!(matches!(
            EncryptionAtRestResource.upgrade_state(2, state),
            Err(ProviderError::UnsupportedStateVersion { version: 2, .. })
        ));
    }

    #[test]
    fn test_schema_limits_each_provider_to_one_block() {
        let mut config = planned();
        config["aws_kms_config"] = json!([{"enabled": true}, {"enabled": false}]);
        assert_eq!(EncryptionAtRestResource.validate(&config).len(), 1);
    }
}
