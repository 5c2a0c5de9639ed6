//! `mongodbatlas_custom_db_role`: a user-defined database role in a project.
//!
//! Creating a role that inherits another freshly created role often fails
//! with a 500 or a role-not-found error until Atlas has propagated the
//! inherited role, so the create request is retried until it is accepted.
//! Role writes within a provider are serialized through the
//! `mongodbatlas_custom_db_role` resource lock.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::{from_state, null_as_default, require_id, require_present, to_state, ResourceHandler};
use crate::atlas::{Action, ActionResource, AtlasError, CustomDbRole, ErrorPolicy, InheritedRole};
use crate::config::Operation;
use crate::error::ProviderError;
use crate::poll::{Observation, StateConf};
use crate::provider::ProviderContext;
use crate::schema::{Attribute, Block, NestedBlock, Schema};
use crate::state_id::{parse_import_id, IdLayout, StateId};

/// Resource type name.
pub const TYPE_NAME: &str = "mongodbatlas_custom_db_role";

const ID_LAYOUT: IdLayout = IdLayout::new(&["project_id", "role_name"]);

/// Errors that mean "not accepted yet" while creating a role.
const CREATE_PENDING: ErrorPolicy = ErrorPolicy::new(
    &[404, 500],
    &["UNEXPECTED_ERROR", "ATLAS_CUSTOM_ROLE_NOT_FOUND"],
);

/// Terraform state of a custom role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomDbRoleState {
    /// Composite id of `project_id` and `role_name`.
    #[serde(default)]
    pub id: Option<String>,
    /// Project the role belongs to.
    pub project_id: String,
    /// Role name.
    pub role_name: String,
    /// Granted privileges.
    #[serde(default, deserialize_with = "null_as_default")]
    pub actions: Vec<ActionState>,
    /// Inherited roles.
    #[serde(default, deserialize_with = "null_as_default")]
    pub inherited_roles: Vec<InheritedRoleState>,
}

/// One privilege of a custom role.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionState {
    pub action: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub resources: Vec<ResourceState>,
}

/// What a privilege applies to: the cluster, or a database and collection.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<bool>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InheritedRoleState {
    pub database_name: String,
    pub role_name: String,
}

impl CustomDbRoleState {
    fn to_request(&self) -> CustomDbRole {
        CustomDbRole {
            role_name: self.role_name.clone(),
            actions: expand_actions(&self.actions),
            inherited_roles: expand_inherited_roles(&self.inherited_roles),
        }
    }

    fn from_role(project_id: &str, role: CustomDbRole) -> Result<Self, ProviderError> {
        let id = StateId::new(&ID_LAYOUT, [project_id, role.role_name.as_str()])?.encode();
        Ok(Self {
            id: Some(id),
            project_id: project_id.to_string(),
            role_name: role.role_name,
            actions: flatten_actions(role.actions),
            inherited_roles: flatten_inherited_roles(role.inherited_roles),
        })
    }
}

fn expand_actions(actions: &[ActionState]) -> Vec<Action> {
    actions
        .iter()
        .map(|a| Action {
            action: a.action.clone(),
            resources: a.resources.iter().map(expand_action_resource).collect(),
        })
        .collect()
}

fn expand_action_resource(resource: &ResourceState) -> ActionResource {
    if resource.cluster == Some(true) {
        ActionResource {
            cluster: Some(true),
            ..Default::default()
        }
    } else {
        ActionResource {
            db: Some(resource.database_name.clone().unwrap_or_default()),
            collection: Some(resource.collection_name.clone().unwrap_or_default()),
            cluster: None,
        }
    }
}

fn expand_inherited_roles(roles: &[InheritedRoleState]) -> Vec<InheritedRole> {
    roles
        .iter()
        .map(|r| InheritedRole {
            db: r.database_name.clone(),
            role: r.role_name.clone(),
        })
        .collect()
}

fn flatten_actions(actions: Vec<Action>) -> Vec<ActionState> {
    actions
        .into_iter()
        .map(|a| ActionState {
            action: a.action,
            resources: a.resources.into_iter().map(flatten_action_resource).collect(),
        })
        .collect()
}

/// A cluster-wide resource flattens to `{cluster}` alone.
fn flatten_action_resource(resource: ActionResource) -> ResourceState {
    match resource.cluster {
        Some(cluster) => ResourceState {
            cluster: Some(cluster),
            ..Default::default()
        },
        None => ResourceState {
            database_name: Some(resource.db.unwrap_or_default()),
            collection_name: Some(resource.collection.unwrap_or_default()),
            cluster: None,
        },
    }
}

fn flatten_inherited_roles(roles: Vec<InheritedRole>) -> Vec<InheritedRoleState> {
    roles
        .into_iter()
        .map(|r| InheritedRoleState {
            database_name: r.db,
            role_name: r.role,
        })
        .collect()
}

fn is_role_gone(err: &AtlasError) -> bool {
    err.is_not_found() || err.has_code("ATLAS_CUSTOM_ROLE_NOT_FOUND")
}

fn decode_id(id: &str) -> Result<(String, String), ProviderError> {
    let ids = StateId::decode(&ID_LAYOUT, id)?;
    let project_id = ids.get("project_id").unwrap_or_default().to_string();
    let role_name = ids.get("role_name").unwrap_or_default().to_string();
    Ok((project_id, role_name))
}

/// Handler for `mongodbatlas_custom_db_role`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CustomDbRoleResource;

impl CustomDbRoleResource {
    async fn fetch(
        &self,
        ctx: &ProviderContext,
        project_id: &str,
        role_name: &str,
    ) -> Result<Option<CustomDbRoleState>, ProviderError> {
        match ctx.client.get_custom_db_role(project_id, role_name).await {
            Ok(role) => Ok(Some(CustomDbRoleState::from_role(project_id, role)?)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(ProviderError::api(
                format!(
                    "error getting custom db role {} in project {}",
                    role_name, project_id
                ),
                e,
            )),
        }
    }
}

#[async_trait::async_trait]
impl ResourceHandler for CustomDbRoleResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        let resource = Block::new()
            .with_attribute("collection_name", Attribute::optional_string())
            .with_attribute("database_name", Attribute::optional_string())
            .with_attribute("cluster", Attribute::optional_bool());

        let action = Block::new()
            .with_attribute("action", Attribute::required_string())
            .with_block("resources", NestedBlock::set(resource).with_min_items(1));

        let inherited_role = Block::new()
            .with_attribute("database_name", Attribute::required_string())
            .with_attribute("role_name", Attribute::required_string());

        Schema::v0()
            .with_description("A custom MongoDB role in an Atlas project")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "project_id",
                Attribute::required_string().with_force_new(),
            )
            .with_attribute(
                "role_name",
                Attribute::required_string()
                    .with_force_new()
                    .with_pattern(r"^[\w-]+$")
                    .without_prefix("xgen-")
                    .with_description(
                        "Role name; letters, digits, underscores and dashes, not starting with xgen-",
                    ),
            )
            .with_block("actions", NestedBlock::list(action))
            .with_block("inherited_roles", NestedBlock::set(inherited_role))
    }

    #[instrument(skip_all, fields(resource_type = TYPE_NAME))]
    async fn create(&self, ctx: &ProviderContext, planned: Value) -> Result<Value, ProviderError> {
        let plan: CustomDbRoleState = from_state(planned)?;
        let request = plan.to_request();
        let conf = StateConf::new(&["pending"], &["created"])
            .with_failure(&["failed"])
            .with_config(ctx.poll_config(TYPE_NAME, Operation::Create));

        let client = ctx.client.as_ref();
        let locks = &ctx.locks;
        let project_id = plan.project_id.as_str();
        let request = &request;

        conf.wait(ctx.clock.as_ref(), move || async move {
            let _guard = locks.lock(TYPE_NAME).await;
            match client.create_custom_db_role(project_id, request).await {
                Ok(_) => Ok(Observation::new((), "created")),
                Err(e) if CREATE_PENDING.is_pending(&e) => {
                    warn!(error = %e, "Custom db role not accepted yet, retrying");
                    Ok(Observation::new((), "pending"))
                }
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(|e| {
            ProviderError::wait(
                format!(
                    "error creating custom db role {} in project {}",
                    plan.role_name, project_id
                ),
                e,
            )
        })?;

        info!(project_id, role_name = %plan.role_name, "Created custom db role");
        let state = self.fetch(ctx, &plan.project_id, &plan.role_name).await?;
        let state = state.map(|s| to_state(&s)).transpose()?;
        require_present(TYPE_NAME, &plan.role_name, state)
    }

    #[instrument(skip_all, fields(resource_type = TYPE_NAME))]
    async fn read(
        &self,
        ctx: &ProviderContext,
        current: Value,
    ) -> Result<Option<Value>, ProviderError> {
        let current: CustomDbRoleState = from_state(current)?;
        let (project_id, role_name) = decode_id(require_id(TYPE_NAME, &current.id)?)?;

        match self.fetch(ctx, &project_id, &role_name).await? {
            Some(state) => Ok(Some(to_state(&state)?)),
            None => {
                debug!(project_id, role_name, "Custom db role is gone");
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
        let prior: CustomDbRoleState = from_state(prior)?;
        let plan: CustomDbRoleState = from_state(planned)?;
        let (project_id, role_name) = decode_id(require_id(TYPE_NAME, &prior.id)?)?;

        {
            let _guard = ctx.locks.lock(TYPE_NAME).await;

            let mut role = ctx
                .client
                .get_custom_db_role(&project_id, &role_name)
                .await
                .map_err(|e| {
                    ProviderError::api(
                        format!("error getting custom db role {} in project {}", role_name, project_id),
                        e,
                    )
                })?;

            // The name is in the path; repeating it in the body makes Atlas answer 500.
            role.role_name.clear();
            if plan.actions != prior.actions {
                role.actions = expand_actions(&plan.actions);
            }
            if plan.inherited_roles != prior.inherited_roles {
                role.inherited_roles = expand_inherited_roles(&plan.inherited_roles);
            }

            ctx.client
                .update_custom_db_role(&project_id, &role_name, &role)
                .await
                .map_err(|e| {
                    ProviderError::api(format!("error updating custom db role {}", role_name), e)
                })?;
        }

        info!(project_id, role_name, "Updated custom db role");
        let state = self.fetch(ctx, &project_id, &role_name).await?;
        let state = state.map(|s| to_state(&s)).transpose()?;
        require_present(TYPE_NAME, &role_name, state)
    }

    #[instrument(skip_all, fields(resource_type = TYPE_NAME))]
    async fn delete(&self, ctx: &ProviderContext, current: Value) -> Result<(), ProviderError> {
        let current: CustomDbRoleState = from_state(current)?;
        let (project_id, role_name) = decode_id(require_id(TYPE_NAME, &current.id)?)?;
        let conf = StateConf::new(&["deleting"], &["deleted"])
            .with_failure(&["failed"])
            .with_config(ctx.poll_config(TYPE_NAME, Operation::Delete));

        let client = ctx.client.as_ref();
        let (project, role) = (project_id.as_str(), role_name.as_str());

        conf.wait(ctx.clock.as_ref(), move || async move {
            match client.get_custom_db_role(project, role).await {
                Err(e) if is_role_gone(&e) => Ok(Observation::new((), "deleted")),
                Err(e) => Err(e),
                Ok(_) => {
                    client.delete_custom_db_role(project, role).await?;
                    Ok(Observation::new((), "deleting"))
                }
            }
        })
        .await
        .map_err(|e| ProviderError::wait(format!("error deleting custom db role {}", role_name), e))?;

        info!(project_id, role_name, "Deleted custom db role");
        Ok(())
    }

    #[instrument(skip_all, fields(resource_type = TYPE_NAME, id))]
    async fn import(&self, ctx: &ProviderContext, id: &str) -> Result<Value, ProviderError> {
        let parts = parse_import_id(id, "-", &["project_id", "role_name"]).map_err(|source| {
            ProviderError::InvalidImportId {
                resource_type: TYPE_NAME.to_string(),
                source,
            }
        })?;
        let (project_id, role_name) = (parts[0], parts[1]);

        let role = ctx
            .client
            .get_custom_db_role(project_id, role_name)
            .await
            .map_err(|e| {
                ProviderError::api(
                    format!(
                        "couldn't import custom db role {} in project {}",
                        role_name, project_id
                    ),
                    e,
                )
            })?;

        to_state(&CustomDbRoleState::from_role(project_id, role)?)
    }
}
