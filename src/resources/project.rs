//! `mongodbatlas_project`: an Atlas project and its team assignments.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::{from_state, null_as_default, require_id, require_present, to_state, ResourceHandler};
use crate::atlas::{ErrorPolicy, Project, ProjectLimit, ProjectRequest, ProjectTeam};
use crate::config::Operation;
use crate::error::ProviderError;
use crate::poll::{Observation, StateConf};
use crate::provider::ProviderContext;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Block, NestedBlock, Schema};

/// Resource type name.
pub const TYPE_NAME: &str = "mongodbatlas_project";

/// Atlas refuses to close a project while clusters or peering connections
/// are still being torn down.
const DELETE_PENDING: ErrorPolicy = ErrorPolicy::new(
    &[],
    &[
        "CANNOT_CLOSE_GROUP_ACTIVE_ATLAS_CLUSTERS",
        "CANNOT_CLOSE_GROUP_ACTIVE_PEERING_CONNECTIONS",
    ],
);

/// Terraform state of a project.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectState {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub org_id: String,
    #[serde(default)]
    pub with_default_alerts_settings: Option<bool>,
    #[serde(default)]
    pub project_owner_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub teams: Vec<TeamState>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub limits: Vec<LimitState>,
    #[serde(default)]
    pub cluster_count: Option<i64>,
    #[serde(default)]
    pub created: Option<String>,
}

/// A team assigned to the project.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamState {
    pub team_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub role_names: Vec<String>,
}

impl TeamState {
    fn to_team(&self) -> ProjectTeam {
        ProjectTeam {
            team_id: self.team_id.clone(),
            role_names: self.role_names.clone(),
        }
    }
}

fn flatten_teams(teams: Vec<ProjectTeam>) -> Vec<TeamState> {
    let mut teams: Vec<TeamState> = teams
        .into_iter()
        .map(|t| {
            let mut role_names = t.role_names;
            role_names.sort();
            TeamState {
                team_id: t.team_id,
                role_names,
            }
        })
        .collect();
    teams.sort_by(|a, b| a.team_id.cmp(&b.team_id));
    teams
}

/// A project limit set through the resource.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitState {
    pub name: String,
    pub value: i64,
    #[serde(default)]
    pub current_usage: Option<i64>,
    #[serde(default)]
    pub default_limit: Option<i64>,
    #[serde(default)]
    pub maximum_limit: Option<i64>,
}

impl From<ProjectLimit> for LimitState {
    fn from(limit: ProjectLimit) -> Self {
        Self {
            name: limit.name,
            value: limit.value,
            current_usage: limit.current_usage,
            default_limit: limit.default_limit,
            maximum_limit: limit.maximum_limit,
        }
    }
}

/// Limits to write and limit names to reset, moving from `prior` to `planned`.
fn diff_limits(prior: &[LimitState], planned: &[LimitState]) -> (Vec<ProjectLimit>, Vec<String>) {
    let before: BTreeMap<&str, i64> = prior.iter().map(|l| (l.name.as_str(), l.value)).collect();
    let after: BTreeMap<&str, i64> = planned.iter().map(|l| (l.name.as_str(), l.value)).collect();

    let set = after
        .iter()
        .filter(|(name, value)| before.get(*name) != Some(*value))
        .map(|(name, value)| ProjectLimit::new(*name, *value))
        .collect();
    let reset = before
        .keys()
        .filter(|name| !after.contains_key(*name))
        .map(|name| name.to_string())
        .collect();
    (set, reset)
}

fn sorted_roles(roles: &[String]) -> Vec<String> {
    let mut roles = roles.to_vec();
    roles.sort();
    roles
}

/// What has to happen to move team assignments from `prior` to `planned`.
#[derive(Debug, Default, PartialEq, Eq)]
struct TeamDiff {
    removed: Vec<String>,
    added: Vec<ProjectTeam>,
    changed: Vec<ProjectTeam>,
}

fn diff_teams(prior: &[TeamState], planned: &[TeamState]) -> TeamDiff {
    let before: BTreeMap<&str, &TeamState> =
        prior.iter().map(|t| (t.team_id.as_str(), t)).collect();
    let after: BTreeMap<&str, &TeamState> =
        planned.iter().map(|t| (t.team_id.as_str(), t)).collect();

    let mut diff = TeamDiff::default();
    for (id, team) in &after {
        match before.get(id) {
            None => diff.added.push(team.to_team()),
            Some(old) if sorted_roles(&old.role_names) != sorted_roles(&team.role_names) => {
                diff.changed.push(team.to_team())
            }
            Some(_) => {}
        }
    }
    diff.removed = before
        .keys()
        .filter(|id| !after.contains_key(*id))
        .map(|id| id.to_string())
        .collect();
    diff
}

/// Handler for `mongodbatlas_project`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectResource;

impl ProjectResource {
    /// Read a project, its teams and the limits `known` tracks.
    ///
    /// `with_default_alerts_settings` and `project_owner_id` are write-only
    /// in Atlas, so they are carried over from `known`. Atlas reports every
    /// limit, set or not, so only those named in `known` are kept.
    async fn fetch(
        &self,
        ctx: &ProviderContext,
        project_id: &str,
        known: Option<&ProjectState>,
    ) -> Result<Option<ProjectState>, ProviderError> {
        let project: Project = match ctx.client.get_project(project_id).await {
            Ok(project) => project,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => {
                return Err(ProviderError::api(
                    format!("error getting project {}", project_id),
                    e,
                ))
            }
        };

        let teams = ctx.client.get_project_teams(project_id).await.map_err(|e| {
            ProviderError::api(format!("error getting teams of project {}", project_id), e)
        })?;

        let tracked: BTreeSet<&str> = known
            .map(|k| k.limits.iter().map(|l| l.name.as_str()).collect())
            .unwrap_or_default();
        let mut limits = Vec::new();
        if !tracked.is_empty() {
            limits = ctx
                .client
                .get_project_limits(project_id)
                .await
                .map_err(|e| {
                    ProviderError::api(format!("error getting limits of project {}", project_id), e)
                })?
                .into_iter()
                .filter(|l| tracked.contains(l.name.as_str()))
                .map(LimitState::from)
                .collect::<Vec<_>>();
            limits.sort_by(|a, b| a.name.cmp(&b.name));
        }

        Ok(Some(ProjectState {
            id: Some(project.id),
            name: project.name,
            org_id: project.org_id,
            with_default_alerts_settings: known.and_then(|k| k.with_default_alerts_settings),
            project_owner_id: known.and_then(|k| k.project_owner_id.clone()),
            teams: flatten_teams(teams),
            limits,
            cluster_count: Some(project.cluster_count),
            created: Some(project.created),
        }))
    }

    async fn set_limits(
        &self,
        ctx: &ProviderContext,
        project_id: &str,
        limits: &[ProjectLimit],
    ) -> Result<(), ProviderError> {
        for limit in limits {
            ctx.client
                .set_project_limit(project_id, limit)
                .await
                .map_err(|e| {
                    ProviderError::api(
                        format!("error setting limit {} of project {}", limit.name, project_id),
                        e,
                    )
                })?;
            debug!(project_id, limit = %limit.name, value = limit.value, "Set project limit");
        }
        Ok(())
    }

    async fn fetch_written(
        &self,
        ctx: &ProviderContext,
        project_id: &str,
        known: &ProjectState,
    ) -> Result<Value, ProviderError> {
        let state = self.fetch(ctx, project_id, Some(known)).await?;
        let state = state.map(|s| to_state(&s)).transpose()?;
        require_present(TYPE_NAME, project_id, state)
    }
}

#[async_trait::async_trait]
impl ResourceHandler for ProjectResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        let team = Block::new()
            .with_attribute("team_id", Attribute::required_string())
            .with_attribute(
                "role_names",
                Attribute::new(
                    AttributeType::set(AttributeType::String),
                    AttributeFlags::required(),
                ),
            );
        let limit = Block::new()
            .with_attribute("name", Attribute::required_string())
            .with_attribute("value", Attribute::required_int64())
            .with_attribute("current_usage", Attribute::computed_int64())
            .with_attribute("default_limit", Attribute::computed_int64())
            .with_attribute("maximum_limit", Attribute::computed_int64());

        Schema::v0()
            .with_description("An Atlas project")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("name", Attribute::required_string())
            .with_attribute("org_id", Attribute::required_string().with_force_new())
            .with_attribute("with_default_alerts_settings", Attribute::optional_bool())
            .with_attribute("project_owner_id", Attribute::optional_string())
            .with_attribute("cluster_count", Attribute::computed_int64())
            .with_attribute("created", Attribute::computed_string())
            .with_block("teams", NestedBlock::set(team))
            .with_block("limits", NestedBlock::set(limit))
    }

    #[instrument(skip_all, fields(resource_type = TYPE_NAME))]
    async fn create(&self, ctx: &ProviderContext, planned: Value) -> Result<Value, ProviderError> {
        let plan: ProjectState = from_state(planned)?;
        let request = ProjectRequest {
            name: plan.name.clone(),
            org_id: plan.org_id.clone(),
            with_default_alerts_settings: plan.with_default_alerts_settings,
            project_owner_id: plan.project_owner_id.clone(),
        };

        let project = ctx
            .client
            .create_project(&request)
            .await
            .map_err(|e| {
                ProviderError::api(
                    format!("error creating project {} in organization {}", plan.name, plan.org_id),
                    e,
                )
            })?;
        info!(project_id = %project.id, name = %project.name, "Created project");

        if !plan.teams.is_empty() {
            let teams: Vec<ProjectTeam> = plan.teams.iter().map(TeamState::to_team).collect();
            ctx.client
                .add_project_teams(&project.id, &teams)
                .await
                .map_err(|e| {
                    ProviderError::api(format!("error adding teams to project {}", project.id), e)
                })?;
            debug!(project_id = %project.id, count = teams.len(), "Assigned teams");
        }

        let (limits, _) = diff_limits(&[], &plan.limits);
        self.set_limits(ctx, &project.id, &limits).await?;

        self.fetch_written(ctx, &project.id, &plan).await
    }

    #[instrument(skip_all, fields(resource_type = TYPE_NAME))]
    async fn read(
        &self,
        ctx: &ProviderContext,
        current: Value,
    ) -> Result<Option<Value>, ProviderError> {
        let current: ProjectState = from_state(current)?;
        let project_id = require_id(TYPE_NAME, &current.id)?;

        match self.fetch(ctx, project_id, Some(&current)).await? {
            Some(state) => Ok(Some(to_state(&state)?)),
            None => {
                debug!(project_id, "Project is gone");
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
        let prior: ProjectState = from_state(prior)?;
        let plan: ProjectState = from_state(planned)?;
        let project_id = require_id(TYPE_NAME, &prior.id)?;

        if plan.name != prior.name {
            ctx.client
                .update_project_name(project_id, &plan.name)
                .await
                .map_err(|e| ProviderError::api(format!("error renaming project {}", project_id), e))?;
        }

        let diff = diff_teams(&prior.teams, &plan.teams);
        for team_id in &diff.removed {
            ctx.client
                .remove_project_team(project_id, team_id)
                .await
                .map_err(|e| {
                    ProviderError::api(
                        format!("error removing team {} from project {}", team_id, project_id),
                        e,
                    )
                })?;
        }
        if !diff.added.is_empty() {
            ctx.client
                .add_project_teams(project_id, &diff.added)
                .await
                .map_err(|e| {
                    ProviderError::api(format!("error adding teams to project {}", project_id), e)
                })?;
        }
        for team in &diff.changed {
            ctx.client
                .update_project_team_roles(project_id, &team.team_id, &team.role_names)
                .await
                .map_err(|e| {
                    ProviderError::api(
                        format!("error updating roles of team {} in project {}", team.team_id, project_id),
                        e,
                    )
                })?;
        }

        let (limits, reset) = diff_limits(&prior.limits, &plan.limits);
        self.set_limits(ctx, project_id, &limits).await?;
        for name in &reset {
            ctx.client
                .delete_project_limit(project_id, name)
                .await
                .map_err(|e| {
                    ProviderError::api(
                        format!("error resetting limit {} of project {}", name, project_id),
                        e,
                    )
                })?;
        }

        info!(
            project_id,
            removed = diff.removed.len(),
            added = diff.added.len(),
            changed = diff.changed.len(),
            limits_set = limits.len(),
            limits_reset = reset.len(),
            "Updated project"
        );
        self.fetch_written(ctx, project_id, &plan).await
    }

    #[instrument(skip_all, fields(resource_type = TYPE_NAME))]
    async fn delete(&self, ctx: &ProviderContext, current: Value) -> Result<(), ProviderError> {
        let current: ProjectState = from_state(current)?;
        let project_id = require_id(TYPE_NAME, &current.id)?;
        let conf = StateConf::new(&["deleting"], &["deleted"])
            .with_config(ctx.poll_config(TYPE_NAME, Operation::Delete));

        let client = ctx.client.as_ref();
        conf.wait(ctx.clock.as_ref(), move || async move {
            match client.get_project(project_id).await {
                Err(e) if e.is_not_found() => return Ok(Observation::new((), "deleted")),
                Err(e) => return Err(e),
                Ok(_) => {}
            }
            match client.delete_project(project_id).await {
                Ok(()) => Ok(Observation::new((), "deleting")),
                Err(e) if DELETE_PENDING.is_pending(&e) => {
                    warn!(error = %e, "Project still has active resources, retrying");
                    Ok(Observation::new((), "deleting"))
                }
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(|e| ProviderError::wait(format!("error deleting project {}", project_id), e))?;

        info!(project_id, "Deleted project");
        Ok(())
    }

    #[instrument(skip_all, fields(resource_type = TYPE_NAME, id))]
    async fn import(&self, ctx: &ProviderContext, id: &str) -> Result<Value, ProviderError> {
        match self.fetch(ctx, id, None).await? {
            Some(state) => to_state(&state),
            None => Err(ProviderError::NotFound(format!(
                "couldn't import project {}: it does not exist",
                id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::{AtlasClient, AtlasError, FakeAtlas, Op};
    use crate::testing::ManualClock;
    use serde_json::json;
    use std::sync::Arc;

    fn setup(atlas: FakeAtlas) -> (Arc<FakeAtlas>, ProviderContext) {
        let atlas = Arc::new(atlas);
        let ctx = ProviderContext::new(atlas.clone()).with_clock(Arc::new(ManualClock::new()));
        (atlas, ctx)
    }

    fn planned() -> Value {
        json!({
            "name": "analytics",
            "org_id": "org1",
            "with_default_alerts_settings": false,
            "teams": [
                {"team_id": "t2", "role_names": ["GROUP_READ_ONLY"]},
                {"team_id": "t1", "role_names": ["GROUP_OWNER", "GROUP_DATA_ACCESS_ADMIN"]}
            ]
        })
    }

    fn team(id: &str, roles: &[&str]) -> TeamState {
        TeamState {
            team_id: id.to_string(),
            role_names: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_teams() {
        let (atlas, ctx) = setup(FakeAtlas::new());

        let state = ProjectResource.create(&ctx, planned()).await.unwrap();
        let id = state["id"].as_str().unwrap();

        assert_eq!(id.len(), 24);
        assert_eq!(state["cluster_count"], 0);
        assert_eq!(state["with_default_alerts_settings"], false);
        assert_eq!(state["teams"][0]["team_id"], "t1");
        assert_eq!(
            state["teams"][0]["role_names"],
            json!(["GROUP_DATA_ACCESS_ADMIN", "GROUP_OWNER"])
        );
        assert_eq!(atlas.project_teams(id).len(), 2);
    }

    #[tokio::test]
    async fn test_create_duplicate_name_fails() {
        let (_atlas, ctx) = setup(FakeAtlas::new());
        ProjectResource.create(&ctx, planned()).await.unwrap();

        let err = ProjectResource.create(&ctx, planned()).await.unwrap_err();
        assert!(err.atlas_error().unwrap().has_code("GROUP_ALREADY_EXISTS"));
        assert!(err
            .to_string()
            .starts_with("error creating project analytics in organization org1"));
    }

    fn limited() -> Value {
        let mut plan = planned();
        plan["project_owner_id"] = json!("5f00000000000000000000aa");
        plan["limits"] = json!([
            {"name": "atlas.project.deployment.nodesPerPrivateLinkRegion", "value": 2},
            {"name": "atlas.project.deployment.clusters", "value": 1}
        ]);
        plan
    }

    #[tokio::test]
    async fn test_create_sets_limits_and_owner() {
        let (atlas, ctx) = setup(FakeAtlas::new());

        let state = ProjectResource.create(&ctx, limited()).await.unwrap();
        let id = state["id"].as_str().unwrap();

        assert_eq!(atlas.project_owner(id).as_deref(), Some("5f00000000000000000000aa"));
        assert_eq!(state["project_owner_id"], "5f00000000000000000000aa");
        assert_eq!(atlas.calls(Op::SetProjectLimit), 2);
        let stored = atlas.project_limits(id);
        assert_eq!(stored["atlas.project.deployment.clusters"], 1);
        assert_eq!(stored["atlas.project.deployment.nodesPerPrivateLinkRegion"], 2);

        assert_eq!(state["limits"][0]["name"], "atlas.project.deployment.clusters");
        assert_eq!(state["limits"][0]["value"], 1);
        assert_eq!(state["limits"][0]["default_limit"], 25);
        assert_eq!(state["limits"][1]["value"], 2);
    }

    #[tokio::test]
    async fn test_create_rejected_limit_fails() {
        let (_atlas, ctx) = setup(FakeAtlas::new());
        let mut plan = planned();
        plan["limits"] = json!([{"name": "atlas.project.deployment.clusters", "value": 500}]);

        let err = ProjectResource.create(&ctx, plan).await.unwrap_err();
        assert!(err.atlas_error().unwrap().has_code("INVALID_ATTRIBUTE"));
        assert!(err
            .to_string()
            .starts_with("error setting limit atlas.project.deployment.clusters of project"));
    }

    #[tokio::test]
    async fn test_create_without_limits_skips_limit_calls() {
        let (atlas, ctx) = setup(FakeAtlas::new());

        let state = ProjectResource.create(&ctx, planned()).await.unwrap();

        assert_eq!(state["limits"], json!([]));
        assert!(state["project_owner_id"].is_null());
        assert_eq!(atlas.calls(Op::GetProjectLimits), 0);
        assert_eq!(atlas.calls(Op::SetProjectLimit), 0);
    }

    #[tokio::test]
    async fn test_read_keeps_tracked_limits_and_owner() {
        let (atlas, ctx) = setup(FakeAtlas::new());
        let state = ProjectResource.create(&ctx, limited()).await.unwrap();
        let id = state["id"].as_str().unwrap().to_string();
        atlas
            .set_project_limit(&id, &ProjectLimit::new("atlas.project.deployment.clusters", 7))
            .await
            .unwrap();

        let read = ProjectResource.read(&ctx, state).await.unwrap().unwrap();

        let names: Vec<&str> = read["limits"]
            .as_array()
            .unwrap()
            .iter()
            .map(|l| l["name"].as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            vec![
                "atlas.project.deployment.clusters",
                "atlas.project.deployment.nodesPerPrivateLinkRegion"
            ]
        );
        assert_eq!(read["limits"][0]["value"], 7);
        assert_eq!(read["limits"][0]["maximum_limit"], 90);
        assert_eq!(read["project_owner_id"], "5f00000000000000000000aa");
    }

    #[tokio::test]
    async fn test_update_sets_and_resets_limits() {
        let (atlas, ctx) = setup(FakeAtlas::new());
        let prior = ProjectResource.create(&ctx, limited()).await.unwrap();
        let id = prior["id"].as_str().unwrap().to_string();

        let mut plan = prior.clone();
        plan["limits"] = json!([
            {"name": "atlas.project.deployment.clusters", "value": 3},
            {"name": "atlas.project.security.databaseAccess.customRoles", "value": 50}
        ]);

        let state = ProjectResource.update(&ctx, prior, plan).await.unwrap();

        assert_eq!(atlas.calls(Op::SetProjectLimit), 4);
        assert_eq!(atlas.calls(Op::DeleteProjectLimit), 1);
        let stored = atlas.project_limits(&id);
        assert_eq!(stored.len(), 2);
        assert_eq!(stored["atlas.project.deployment.clusters"], 3);
        assert_eq!(stored["atlas.project.security.databaseAccess.customRoles"], 50);
        assert_eq!(state["limits"].as_array().unwrap().len(), 2);
        assert_eq!(state["limits"][1]["default_limit"], 100);
    }

    #[tokio::test]
    async fn test_update_leaves_unchanged_limits_alone() {
        let (atlas, ctx) = setup(FakeAtlas::new());
        let prior = ProjectResource.create(&ctx, limited()).await.unwrap();

        ProjectResource.update(&ctx, prior.clone(), prior).await.unwrap();

        assert_eq!(atlas.calls(Op::SetProjectLimit), 2);
        assert_eq!(atlas.calls(Op::DeleteProjectLimit), 0);
    }

    #[test]
    fn test_diff_limits() {
        let limit = |name: &str, value: i64| LimitState {
            name: name.to_string(),
            value,
            current_usage: Some(0),
            default_limit: None,
            maximum_limit: None,
        };
        let prior = vec![limit("a", 1), limit("b", 2)];
        let planned = vec![limit("b", 3), limit("c", 4)];

        let (set, reset) = diff_limits(&prior, &planned);

        assert_eq!(set, vec![ProjectLimit::new("b", 3), ProjectLimit::new("c", 4)]);
        assert_eq!(reset, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_read_missing_project_returns_none() {
        let (_atlas, ctx) = setup(FakeAtlas::new());
        let mut state = planned();
        state["id"] = json!("000000000000000000000042");

        assert!(ProjectResource.read(&ctx, state).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_renames_and_syncs_teams() {
        let (atlas, ctx) = setup(FakeAtlas::new());
        let prior = ProjectResource.create(&ctx, planned()).await.unwrap();
        let id = prior["id"].as_str().unwrap().to_string();

        let mut plan = prior.clone();
        plan["name"] = json!("analytics-prod");
        plan["teams"] = json!([
            {"team_id": "t1", "role_names": ["GROUP_OWNER"]},
            {"team_id": "t3", "role_names": ["GROUP_READ_ONLY"]}
        ]);

        let state = ProjectResource.update(&ctx, prior, plan).await.unwrap();

        assert_eq!(state["name"], "analytics-prod");
        assert_eq!(atlas.project(&id).unwrap().name, "analytics-prod");
        let teams = atlas.project_teams(&id);
        let ids: Vec<&str> = teams.iter().map(|t| t.team_id.as_str()).collect();
        assert!(ids.contains(&"t1") && ids.contains(&"t3") && !ids.contains(&"t2"));
        assert_eq!(atlas.calls(Op::RemoveProjectTeam), 1);
        assert_eq!(atlas.calls(Op::UpdateProjectTeamRoles), 1);
        assert_eq!(atlas.calls(Op::UpdateProjectName), 1);
    }

    #[tokio::test]
    async fn test_update_without_changes_makes_no_writes() {
        let (atlas, ctx) = setup(FakeAtlas::new());
        let prior = ProjectResource.create(&ctx, planned()).await.unwrap();

        ProjectResource.update(&ctx, prior.clone(), prior).await.unwrap();

        assert_eq!(atlas.calls(Op::UpdateProjectName), 0);
        assert_eq!(atlas.calls(Op::RemoveProjectTeam), 0);
        assert_eq!(atlas.calls(Op::AddProjectTeams), 1);
        assert_eq!(atlas.calls(Op::UpdateProjectTeamRoles), 0);
    }

    #[tokio::test]
    async fn test_delete_retries_while_clusters_are_active() {
        let (atlas, ctx) = setup(FakeAtlas::new());
        let state = ProjectResource.create(&ctx, planned()).await.unwrap();
        let id = state["id"].as_str().unwrap().to_string();
        atlas.fail_times(
            Op::DeleteProject,
            AtlasError::new(409, "active clusters")
                .with_code("CANNOT_CLOSE_GROUP_ACTIVE_ATLAS_CLUSTERS"),
            2,
        );

        ProjectResource.delete(&ctx, state).await.unwrap();

        assert_eq!(atlas.calls(Op::DeleteProject), 3);
        assert!(atlas.project(&id).is_none());
    }

    #[tokio::test]
    async fn test_delete_fails_on_other_conflicts() {
        let (atlas, ctx) = setup(FakeAtlas::new());
        let state = ProjectResource.create(&ctx, planned()).await.unwrap();
        atlas.fail_next(
            Op::DeleteProject,
            AtlasError::new(409, "other").with_code("CANNOT_CLOSE_GROUP_ACTIVE_ONLINE_ARCHIVES"),
        );

        let err = ProjectResource.delete(&ctx, state).await.unwrap_err();
        assert_eq!(err.atlas_error().unwrap().status, 409);
    }

    #[tokio::test]
    async fn test_import_by_project_id() {
        let (atlas, ctx) = setup(FakeAtlas::new());
        atlas.insert_project(Project {
            id: "5f0000000000000000000001".to_string(),
            name: "legacy".to_string(),
            org_id: "org1".to_string(),
            cluster_count: 2,
            created: "2020-01-01T00:00:00Z".to_string(),
        });

        let state = ProjectResource
            .import(&ctx, "5f0000000000000000000001")
            .await
            .unwrap();
        assert_eq!(state["name"], "legacy");
        assert_eq!(state["cluster_count"], 2);
        assert!(state["with_default_alerts_settings"].is_null());

        let err = ProjectResource.import(&ctx, "missing").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
    }

    #[test]
    fn test_diff_teams() {
        let prior = vec![team("a", &["R1"]), team("b", &["R1", "R2"])];
        let planned = vec![team("b", &["R2", "R1"]), team("c", &["R3"])];

        let diff = diff_teams(&prior, &planned);

        assert_eq!(diff.removed, vec!["a".to_string()]);
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].team_id, "c");
        assert!(diff.changed.is_empty());
    }
}
