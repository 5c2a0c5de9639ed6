//! `mongodbatlas_privatelink_endpoint_service_serverless`: the Atlas side of
//! a private endpoint into a serverless instance.
//!
//! The endpoint itself is reserved by `mongodbatlas_privatelink_endpoint_serverless`;
//! this resource attaches the cloud provider's endpoint to it and waits for
//! Atlas to report it `AVAILABLE`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};

use super::{from_state, require_id, require_present, to_state, ResourceHandler};
use crate::atlas::{AtlasError, ServerlessPrivateEndpoint, ServerlessPrivateEndpointUpdate};
use crate::config::Operation;
use crate::error::ProviderError;
use crate::poll::{Observation, StateConf};
use crate::provider::ProviderContext;
use crate::schema::{Attribute, Schema};
use crate::state_id::{parse_import_id, IdLayout, StateId};

/// Resource type name.
pub const TYPE_NAME: &str = "mongodbatlas_privatelink_endpoint_service_serverless";

const ID_LAYOUT: IdLayout = IdLayout::new(&["endpoint_id", "instance_name", "project_id"]);

const PROVISIONING: &[&str] = &["RESERVATION_REQUESTED", "RESERVED", "INITIATING"];

/// Terraform state of a serverless endpoint service.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerlessEndpointServiceState {
    #[serde(default)]
    pub id: Option<String>,
    pub project_id: String,
    pub instance_name: String,
    pub endpoint_id: String,
    pub provider_name: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub cloud_provider_endpoint_id: Option<String>,
    #[serde(default)]
    pub private_endpoint_ip_address: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Where an endpoint lives.
#[derive(Debug, Clone, PartialEq, Eq)]
struct EndpointKey {
    project_id: String,
    instance_name: String,
    endpoint_id: String,
}

impl EndpointKey {
    fn decode(id: &str) -> Result<Self, ProviderError> {
        let ids = StateId::decode(&ID_LAYOUT, id)?;
        let part = |key: &str| ids.get(key).unwrap_or_default().to_string();
        Ok(Self {
            project_id: part("project_id"),
            instance_name: part("instance_name"),
            endpoint_id: part("endpoint_id"),
        })
    }

    fn encode(&self) -> Result<String, ProviderError> {
        let id = StateId::new(
            &ID_LAYOUT,
            [
                self.endpoint_id.as_str(),
                self.instance_name.as_str(),
                self.project_id.as_str(),
            ],
        )?;
        Ok(id.encode())
    }
}

impl ServerlessEndpointServiceState {
    fn key(&self) -> EndpointKey {
        EndpointKey {
            project_id: self.project_id.clone(),
            instance_name: self.instance_name.clone(),
            endpoint_id: self.endpoint_id.clone(),
        }
    }

    fn to_update(&self) -> ServerlessPrivateEndpointUpdate {
        ServerlessPrivateEndpointUpdate {
            provider_name: self.provider_name.clone(),
            comment: self.comment.clone(),
            cloud_provider_endpoint_id: self.cloud_provider_endpoint_id.clone(),
            private_endpoint_ip_address: self.private_endpoint_ip_address.clone(),
        }
    }

    fn from_endpoint(key: &EndpointKey, endpoint: ServerlessPrivateEndpoint) -> Result<Self, ProviderError> {
        Ok(Self {
            id: Some(key.encode()?),
            project_id: key.project_id.clone(),
            instance_name: key.instance_name.clone(),
            endpoint_id: key.endpoint_id.clone(),
            provider_name: endpoint.provider_name,
            comment: endpoint.comment,
            cloud_provider_endpoint_id: endpoint.cloud_provider_endpoint_id,
            private_endpoint_ip_address: endpoint.private_endpoint_ip_address,
            status: Some(endpoint.status),
        })
    }
}

/// Handler for `mongodbatlas_privatelink_endpoint_service_serverless`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerlessEndpointServiceResource;

impl ServerlessEndpointServiceResource {
    async fn fetch(
        &self,
        ctx: &ProviderContext,
        key: &EndpointKey,
    ) -> Result<Option<ServerlessEndpointServiceState>, ProviderError> {
        let endpoint = ctx
            .client
            .get_serverless_private_endpoint(&key.project_id, &key.instance_name, &key.endpoint_id)
            .await;
        match endpoint {
            Ok(endpoint) => Ok(Some(ServerlessEndpointServiceState::from_endpoint(key, endpoint)?)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(ProviderError::api(
                format!(
                    "error getting serverless private endpoint {} of instance {}",
                    key.endpoint_id, key.instance_name
                ),
                e,
            )),
        }
    }

    async fn write(
        &self,
        ctx: &ProviderContext,
        operation: Operation,
        key: &EndpointKey,
        update: &ServerlessPrivateEndpointUpdate,
    ) -> Result<Value, ProviderError> {
        ctx.client
            .update_serverless_private_endpoint(
                &key.project_id,
                &key.instance_name,
                &key.endpoint_id,
                update,
            )
            .await
            .map_err(|e| {
                ProviderError::api(
                    format!("error updating serverless private endpoint {}", key.endpoint_id),
                    e,
                )
            })?;

        let conf = StateConf::new(PROVISIONING, &["AVAILABLE"])
            .with_failure(&["FAILED"])
            .with_config(ctx.poll_config(TYPE_NAME, operation));
        let client = ctx.client.as_ref();

        let endpoint = conf
            .wait(ctx.clock.as_ref(), move || async move {
                let endpoint = client
                    .get_serverless_private_endpoint(&key.project_id, &key.instance_name, &key.endpoint_id)
                    .await?;
                if let Some(error_message) = endpoint.error_message.as_deref() {
                    debug!(status = %endpoint.status, error_message, "Endpoint reported an error");
                }
                let status = endpoint.status.clone();
                let detail = endpoint.error_message.clone();
                Ok::<_, AtlasError>(Observation::new(endpoint, status).with_detail(detail))
            })
            .await
            .map_err(|e| {
                ProviderError::wait(
                    format!(
                        "error waiting for serverless private endpoint {} to become available",
                        key.endpoint_id
                    ),
                    e,
                )
            })?;

        to_state(&ServerlessEndpointServiceState::from_endpoint(key, endpoint)?)
    }
}

#[async_trait::async_trait]
impl ResourceHandler for ServerlessEndpointServiceResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Connects a cloud provider endpoint to a serverless instance")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("project_id", Attribute::required_string().with_force_new())
            .with_attribute("instance_name", Attribute::required_string().with_force_new())
            .with_attribute("endpoint_id", Attribute::required_string().with_force_new())
            .with_attribute(
                "provider_name",
                Attribute::required_string()
                    .with_force_new()
                    .one_of(&["AWS", "AZURE"]),
            )
            .with_attribute("comment", Attribute::optional_string())
            .with_attribute(
                "cloud_provider_endpoint_id",
                Attribute::optional_computed_string().with_force_new(),
            )
            .with_attribute(
                "private_endpoint_ip_address",
                Attribute::optional_computed_string().with_force_new(),
            )
            .with_attribute("status", Attribute::computed_string())
    }

    #[instrument(skip_all, fields(resource_type = TYPE_NAME))]
    async fn create(&self, ctx: &ProviderContext, planned: Value) -> Result<Value, ProviderError> {
        let plan: ServerlessEndpointServiceState = from_state(planned)?;
        let key = plan.key();

        let state = self
            .write(ctx, Operation::Create, &key, &plan.to_update())
            .await?;
        info!(endpoint_id = %key.endpoint_id, instance_name = %key.instance_name, "Serverless private endpoint is available");
        Ok(state)
    }

    #[instrument(skip_all, fields(resource_type = TYPE_NAME))]
    async fn read(
        &self,
        ctx: &ProviderContext,
        current: Value,
    ) -> Result<Option<Value>, ProviderError> {
        let current: ServerlessEndpointServiceState = from_state(current)?;
        let key = EndpointKey::decode(require_id(TYPE_NAME, &current.id)?)?;

        match self.fetch(ctx, &key).await? {
            Some(state) => Ok(Some(to_state(&state)?)),
            None => {
                debug!(endpoint_id = %key.endpoint_id, "Serverless private endpoint is gone");
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
        let prior: ServerlessEndpointServiceState = from_state(prior)?;
        let plan: ServerlessEndpointServiceState = from_state(planned)?;
        let key = EndpointKey::decode(require_id(TYPE_NAME, &prior.id)?)?;

        if plan.comment == prior.comment {
            let state = self.fetch(ctx, &key).await?;
            let state = state.map(|s| to_state(&s)).transpose()?;
            return require_present(TYPE_NAME, &key.endpoint_id, state);
        }

        let update = ServerlessPrivateEndpointUpdate {
            comment: plan.comment.clone(),
            ..prior.to_update()
        };
        let state = self.write(ctx, Operation::Update, &key, &update).await?;
        info!(endpoint_id = %key.endpoint_id, "Updated serverless private endpoint comment");
        Ok(state)
    }

    #[instrument(skip_all, fields(resource_type = TYPE_NAME))]
    async fn delete(&self, ctx: &ProviderContext, current: Value) -> Result<(), ProviderError> {
        let current: ServerlessEndpointServiceState = from_state(current)?;
        let key = EndpointKey::decode(require_id(TYPE_NAME, &current.id)?)?;
        let conf = StateConf::new(&["DELETING"], &["DELETED"])
            .with_config(ctx.poll_config(TYPE_NAME, Operation::Delete));

        let client = ctx.client.as_ref();
        let key = &key;
        conf.wait(ctx.clock.as_ref(), move || async move {
            let (project, instance, endpoint) = (
                key.project_id.as_str(),
                key.instance_name.as_str(),
                key.endpoint_id.as_str(),
            );
            match client.get_serverless_private_endpoint(project, instance, endpoint).await {
                Err(e) if e.is_not_found() => Ok(Observation::new((), "DELETED")),
                Err(e) => Err(e),
                Ok(found) if found.status == "DELETING" => Ok(Observation::new((), "DELETING")),
                Ok(_) => {
                    client
                        .delete_serverless_private_endpoint(project, instance, endpoint)
                        .await?;
                    Ok(Observation::new((), "DELETING"))
                }
            }
        })
        .await
        .map_err(|e| {
            ProviderError::wait(
                format!("error deleting serverless private endpoint {}", key.endpoint_id),
                e,
            )
        })?;

        info!(endpoint_id = %key.endpoint_id, "Deleted serverless private endpoint");
        Ok(())
    }

    #[instrument(skip_all, fields(resource_type = TYPE_NAME, id))]
    async fn import(&self, ctx: &ProviderContext, id: &str) -> Result<Value, ProviderError> {
        let parts = parse_import_id(id, "--", &["project_id", "instance_name", "endpoint_id"])
            .map_err(|source| ProviderError::InvalidImportId {
                resource_type: TYPE_NAME.to_string(),
                source,
            })?;
        let key = EndpointKey {
            project_id: parts[0].to_string(),
            instance_name: parts[1].to_string(),
            endpoint_id: parts[2].to_string(),
        };

        match self.fetch(ctx, &key).await? {
            Some(state) => to_state(&state),
            None => Err(ProviderError::NotFound(format!(
                "couldn't import serverless private endpoint {} of instance {} in project {}",
                key.endpoint_id, key.instance_name, key.project_id
            ))),
        }
    }
}
