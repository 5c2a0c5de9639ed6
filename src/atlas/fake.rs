//! An in-process Atlas for tests.
//!
//! [`FakeAtlas`] keeps resources in memory and reproduces the eventual
//! consistency the provider has to cope with: deleted resources stay visible
//! for a configurable number of reads, endpoints pass through `INITIATING`
//! before becoming `AVAILABLE`, and any operation can be scripted to fail.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use super::models::{
    CustomDbRole, EncryptionAtRest, Project, ProjectLimit, ProjectRequest, ProjectTeam,
    ServerlessPrivateEndpoint, ServerlessPrivateEndpointUpdate,
};
use super::{AtlasClient, AtlasError, AtlasResult};

/// Identifies an [`AtlasClient`] method, for call counting and failure injection.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    GetCustomDbRole,
    CreateCustomDbRole,
    UpdateCustomDbRole,
    DeleteCustomDbRole,
    CreateProject,
    GetProject,
    UpdateProjectName,
    DeleteProject,
    GetProjectTeams,
    AddProjectTeams,
    UpdateProjectTeamRoles,
    RemoveProjectTeam,
    GetProjectLimits,
    SetProjectLimit,
    DeleteProjectLimit,
    GetEncryptionAtRest,
    UpdateEncryptionAtRest,
    GetServerlessPrivateEndpoint,
    UpdateServerlessPrivateEndpoint,
    DeleteServerlessPrivateEndpoint,
}

type RoleKey = (String, String);

/// Limits every fake project knows about: name, default and maximum.
const PROJECT_LIMITS: &[(&str, i64, i64)] = &[
    ("atlas.project.deployment.clusters", 25, 90),
    ("atlas.project.deployment.nodesPerPrivateLinkRegion", 50, 90),
    ("atlas.project.security.databaseAccess.customRoles", 100, 1400),
];
type EndpointKey = (String, String, String);

#[derive(Debug)]
struct Stored<T> {
    value: T,
    /// Reads left before a deleted entry disappears. `None` while live.
    vanishing_in: Option<u32>,
}

impl<T> Stored<T> {
    fn live(value: T) -> Self {
        Self {
            value,
            vanishing_in: None,
        }
    }

    fn is_live(&self) -> bool {
        self.vanishing_in.is_none()
    }
}

#[derive(Debug)]
struct StoredEndpoint {
    endpoint: ServerlessPrivateEndpoint,
    reads_until_available: u32,
}

#[derive(Debug, Default)]
struct FakeState {
    roles: BTreeMap<RoleKey, Stored<CustomDbRole>>,
    projects: BTreeMap<String, Stored<Project>>,
    teams: BTreeMap<String, Vec<ProjectTeam>>,
    owners: BTreeMap<String, String>,
    limits: BTreeMap<String, BTreeMap<String, i64>>,
    encryption: BTreeMap<String, EncryptionAtRest>,
    endpoints: BTreeMap<EndpointKey, Stored<StoredEndpoint>>,
    injected: HashMap<Op, VecDeque<AtlasError>>,
    calls: HashMap<Op, u32>,
    next_project: u64,
}

impl FakeState {
    fn record(&mut self, op: Op) -> AtlasResult<()> {
        *self.calls.entry(op).or_insert(0) += 1;
        match self.injected.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Advance a vanishing entry by one read. Returns `false` once it is gone.
fn observe<K: Ord, T>(map: &mut BTreeMap<K, Stored<T>>, key: &K) -> bool {
    let gone = match map.get_mut(key) {
        None => return false,
        Some(stored) => match stored.vanishing_in {
            None => false,
            Some(0) => true,
            Some(ref mut left) => {
                *left -= 1;
                false
            }
        },
    };
    if gone {
        map.remove(key);
    }
    !gone
}

fn role_not_found(role_name: &str) -> AtlasError {
    AtlasError::not_found(
        "ATLAS_CUSTOM_ROLE_NOT_FOUND",
        format!("The custom role {} was not found", role_name),
    )
}

fn project_not_found(project_id: &str) -> AtlasError {
    AtlasError::not_found(
        "GROUP_NOT_FOUND",
        format!("No group with ID {} exists", project_id),
    )
}

fn limit_view(name: &str, default: i64, maximum: i64, value: Option<i64>) -> ProjectLimit {
    ProjectLimit {
        name: name.to_string(),
        value: value.unwrap_or(default),
        current_usage: Some(0),
        default_limit: Some(default),
        maximum_limit: Some(maximum),
    }
}

fn endpoint_not_found(endpoint_id: &str) -> AtlasError {
    AtlasError::not_found(
        "SERVERLESS_PRIVATE_ENDPOINT_NOT_FOUND",
        format!("Private endpoint {} not found", endpoint_id),
    )
}

/// In-memory [`AtlasClient`] with scriptable failures and lag.
#[derive(Debug, Default)]
pub struct FakeAtlas {
    state: Mutex<FakeState>,
    delete_lag: u32,
    provision_reads: u32,
    fail_provisioning: bool,
}

impl FakeAtlas {
    /// Create an empty fake that converges immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep deleted roles, projects and endpoints visible for `reads` more reads.
    pub fn with_delete_lag(mut self, reads: u32) -> Self {
        self.delete_lag = reads;
        self
    }

    /// Report updated endpoints as `INITIATING` for `reads` reads.
    pub fn with_provision_reads(mut self, reads: u32) -> Self {
        self.provision_reads = reads;
        self
    }

    /// Make endpoint provisioning end in `FAILED`.
    pub fn with_failed_provisioning(mut self) -> Self {
        self.fail_provisioning = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fail the next call to `op` with `err`.
    pub fn fail_next(&self, op: Op, err: AtlasError) {
        self.fail_times(op, err, 1);
    }

    /// Fail the next `times` calls to `op` with `err`.
    pub fn fail_times(&self, op: Op, err: AtlasError, times: usize) {
        let mut state = self.lock();
        let queue = state.injected.entry(op).or_default();
        queue.extend(std::iter::repeat(err).take(times));
    }

    /// Number of calls made to `op`, including failed ones.
    pub fn calls(&self, op: Op) -> u32 {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Seed a custom role.
    pub fn insert_custom_db_role(&self, project_id: &str, role: CustomDbRole) {
        let key = (project_id.to_string(), role.role_name.clone());
        self.lock().roles.insert(key, Stored::live(role));
    }

    /// Current role, bypassing lag and call counting.
    pub fn custom_db_role(&self, project_id: &str, role_name: &str) -> Option<CustomDbRole> {
        let key = (project_id.to_string(), role_name.to_string());
        self.lock().roles.get(&key).map(|s| s.value.clone())
    }

    /// Seed a project.
    pub fn insert_project(&self, project: Project) {
        self.lock()
            .projects
            .insert(project.id.clone(), Stored::live(project));
    }

    /// Current project, bypassing lag and call counting.
    pub fn project(&self, project_id: &str) -> Option<Project> {
        self.lock().projects.get(project_id).map(|s| s.value.clone())
    }

    /// Current teams of a project.
    pub fn project_teams(&self, project_id: &str) -> Vec<ProjectTeam> {
        self.lock()
            .teams
            .get(project_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Owner requested when the project was created.
    pub fn project_owner(&self, project_id: &str) -> Option<String> {
        self.lock().owners.get(project_id).cloned()
    }

    /// Limits explicitly set on a project, by name.
    pub fn project_limits(&self, project_id: &str) -> BTreeMap<String, i64> {
        self.lock()
            .limits
            .get(project_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Stored encryption settings, secrets included.
    pub fn encryption_at_rest(&self, project_id: &str) -> Option<EncryptionAtRest> {
        self.lock().encryption.get(project_id).cloned()
    }

    /// Seed a serverless private endpoint in `RESERVED` status.
    pub fn insert_serverless_private_endpoint(
        &self,
        project_id: &str,
        instance_name: &str,
        endpoint_id: &str,
        provider_name: &str,
    ) {
        let key = (
            project_id.to_string(),
            instance_name.to_string(),
            endpoint_id.to_string(),
        );
        let endpoint = ServerlessPrivateEndpoint {
            id: endpoint_id.to_string(),
            endpoint_service_name: Some(format!("com.amazonaws.vpce.{}", endpoint_id)),
            provider_name: provider_name.to_string(),
            status: "RESERVED".to_string(),
            ..Default::default()
        };
        self.lock().endpoints.insert(
            key,
            Stored::live(StoredEndpoint {
                endpoint,
                reads_until_available: 0,
            }),
        );
    }

    /// Current endpoint, bypassing lag and call counting.
    pub fn serverless_private_endpoint(
        &self,
        project_id: &str,
        instance_name: &str,
        endpoint_id: &str,
    ) -> Option<ServerlessPrivateEndpoint> {
        let key = (
            project_id.to_string(),
            instance_name.to_string(),
            endpoint_id.to_string(),
        );
        self.lock()
            .endpoints
            .get(&key)
            .map(|s| s.value.endpoint.clone())
    }

    fn vanishing(&self) -> Option<u32> {
        Some(self.delete_lag)
    }
}

/// Atlas never returns key material.
fn redact(mut settings: EncryptionAtRest) -> EncryptionAtRest {
    if let Some(aws) = settings.aws_kms.as_mut() {
        aws.secret_access_key = None;
    }
    if let Some(azure) = settings.azure_key_vault.as_mut() {
        azure.secret = None;
    }
    if let Some(gcp) = settings.google_cloud_kms.as_mut() {
        gcp.service_account_key = None;
    }
    settings
}

#[async_trait::async_trait]
impl AtlasClient for FakeAtlas {
    async fn get_custom_db_role(
        &self,
        project_id: &str,
        role_name: &str,
    ) -> AtlasResult<CustomDbRole> {
        let mut state = self.lock();
        state.record(Op::GetCustomDbRole)?;
        let key = (project_id.to_string(), role_name.to_string());
        if !observe(&mut state.roles, &key) {
            return Err(role_not_found(role_name));
        }
        state
            .roles
            .get(&key)
            .map(|s| s.value.clone())
            .ok_or_else(|| role_not_found(role_name))
    }

    async fn create_custom_db_role(
        &self,
        project_id: &str,
        role: &CustomDbRole,
    ) -> AtlasResult<CustomDbRole> {
        let mut state = self.lock();
        state.record(Op::CreateCustomDbRole)?;
        let key = (project_id.to_string(), role.role_name.clone());
        if state.roles.contains_key(&key) {
            return Err(AtlasError::new(
                409,
                format!("A custom role named {} already exists", role.role_name),
            )
            .with_code("DUPLICATE_DATABASE_ROLE"));
        }
        state.roles.insert(key, Stored::live(role.clone()));
        Ok(role.clone())
    }

    async fn update_custom_db_role(
        &self,
        project_id: &str,
        role_name: &str,
        role: &CustomDbRole,
    ) -> AtlasResult<CustomDbRole> {
        let mut state = self.lock();
        state.record(Op::UpdateCustomDbRole)?;
        // Atlas answers 500 when the body repeats the role name.
        if !role.role_name.is_empty() {
            return Err(AtlasError::new(500, "Unexpected error.").with_code("UNEXPECTED_ERROR"));
        }
        let key = (project_id.to_string(), role_name.to_string());
        match state.roles.get_mut(&key) {
            Some(stored) if stored.is_live() => {
                stored.value.actions = role.actions.clone();
                stored.value.inherited_roles = role.inherited_roles.clone();
                Ok(stored.value.clone())
            }
            _ => Err(role_not_found(role_name)),
        }
    }

    async fn delete_custom_db_role(&self, project_id: &str, role_name: &str) -> AtlasResult<()> {
        let vanishing = self.vanishing();
        let mut state = self.lock();
        state.record(Op::DeleteCustomDbRole)?;
        let key = (project_id.to_string(), role_name.to_string());
        match state.roles.get_mut(&key) {
            Some(stored) => {
                if stored.is_live() {
                    stored.vanishing_in = vanishing;
                }
                Ok(())
            }
            None => Err(role_not_found(role_name)),
        }
    }

    async fn create_project(&self, request: &ProjectRequest) -> AtlasResult<Project> {
        let mut state = self.lock();
        state.record(Op::CreateProject)?;
        let duplicate = state.projects.values().any(|p| {
            p.is_live() && p.value.org_id == request.org_id && p.value.name == request.name
        });
        if duplicate {
            return Err(AtlasError::new(
                409,
                format!("A group with name \"{}\" already exists", request.name),
            )
            .with_code("GROUP_ALREADY_EXISTS"));
        }

        state.next_project += 1;
        let project = Project {
            id: format!("{:024x}", state.next_project),
            name: request.name.clone(),
            org_id: request.org_id.clone(),
            cluster_count: 0,
            created: "2024-01-01T00:00:00Z".to_string(),
        };
        if let Some(owner) = &request.project_owner_id {
            state.owners.insert(project.id.clone(), owner.clone());
        }
        state
            .projects
            .insert(project.id.clone(), Stored::live(project.clone()));
        Ok(project)
    }

    async fn get_project(&self, project_id: &str) -> AtlasResult<Project> {
        let mut state = self.lock();
        state.record(Op::GetProject)?;
        let key = project_id.to_string();
        if !observe(&mut state.projects, &key) {
            return Err(project_not_found(project_id));
        }
        state
            .projects
            .get(&key)
            .map(|s| s.value.clone())
            .ok_or_else(|| project_not_found(project_id))
    }

    async fn update_project_name(&self, project_id: &str, name: &str) -> AtlasResult<Project> {
        let mut state = self.lock();
        state.record(Op::UpdateProjectName)?;
        match state.projects.get_mut(project_id) {
            Some(stored) if stored.is_live() => {
                stored.value.name = name.to_string();
                Ok(stored.value.clone())
            }
            _ => Err(project_not_found(project_id)),
        }
    }

    async fn delete_project(&self, project_id: &str) -> AtlasResult<()> {
        let vanishing = self.vanishing();
        let mut state = self.lock();
        state.record(Op::DeleteProject)?;
        match state.projects.get_mut(project_id) {
            Some(stored) => {
                if stored.is_live() {
                    stored.vanishing_in = vanishing;
                }
                state.teams.remove(project_id);
                state.limits.remove(project_id);
                Ok(())
            }
            None => Err(project_not_found(project_id)),
        }
    }

    async fn get_project_teams(&self, project_id: &str) -> AtlasResult<Vec<ProjectTeam>> {
        let mut state = self.lock();
        state.record(Op::GetProjectTeams)?;
        if !state.projects.contains_key(project_id) {
            return Err(project_not_found(project_id));
        }
        Ok(state.teams.get(project_id).cloned().unwrap_or_default())
    }

    async fn add_project_teams(&self, project_id: &str, teams: &[ProjectTeam]) -> AtlasResult<()> {
        let mut state = self.lock();
        state.record(Op::AddProjectTeams)?;
        if !state.projects.contains_key(project_id) {
            return Err(project_not_found(project_id));
        }
        let assigned = state.teams.entry(project_id.to_string()).or_default();
        for team in teams {
            assigned.retain(|t| t.team_id != team.team_id);
            assigned.push(team.clone());
        }
        Ok(())
    }

    async fn update_project_team_roles(
        &self,
        project_id: &str,
        team_id: &str,
        role_names: &[String],
    ) -> AtlasResult<()> {
        let mut state = self.lock();
        state.record(Op::UpdateProjectTeamRoles)?;
        let team = state
            .teams
            .get_mut(project_id)
            .and_then(|teams| teams.iter_mut().find(|t| t.team_id == team_id));
        match team {
            Some(team) => {
                team.role_names = role_names.to_vec();
                Ok(())
            }
            None => Err(AtlasError::not_found(
                "USER_UNAUTHORIZED",
                format!("Team {} is not assigned to project {}", team_id, project_id),
            )),
        }
    }

    async fn remove_project_team(&self, project_id: &str, team_id: &str) -> AtlasResult<()> {
        let mut state = self.lock();
        state.record(Op::RemoveProjectTeam)?;
        if let Some(teams) = state.teams.get_mut(project_id) {
            teams.retain(|t| t.team_id != team_id);
        }
        Ok(())
    }

    async fn get_project_limits(&self, project_id: &str) -> AtlasResult<Vec<ProjectLimit>> {
        let mut state = self.lock();
        state.record(Op::GetProjectLimits)?;
        if !state.projects.contains_key(project_id) {
            return Err(project_not_found(project_id));
        }
        let set = state.limits.get(project_id);
        Ok(PROJECT_LIMITS
            .iter()
            .map(|&(name, default, maximum)| {
                let value = set.and_then(|limits| limits.get(name)).copied();
                limit_view(name, default, maximum, value)
            })
            .collect())
    }

    async fn set_project_limit(
        &self,
        project_id: &str,
        limit: &ProjectLimit,
    ) -> AtlasResult<ProjectLimit> {
        let mut state = self.lock();
        state.record(Op::SetProjectLimit)?;
        if !state.projects.contains_key(project_id) {
            return Err(project_not_found(project_id));
        }
        let Some(&(name, default, maximum)) =
            PROJECT_LIMITS.iter().find(|(name, _, _)| *name == limit.name)
        else {
            return Err(AtlasError::new(
                400,
                format!("Limit {} is not a valid project limit", limit.name),
            )
            .with_code("INVALID_LIMIT_NAME"));
        };
        if limit.value < 0 || limit.value > maximum {
            return Err(AtlasError::new(
                400,
                format!("Limit {} must be between 0 and {}", name, maximum),
            )
            .with_code("INVALID_ATTRIBUTE"));
        }
        state
            .limits
            .entry(project_id.to_string())
            .or_default()
            .insert(name.to_string(), limit.value);
        Ok(limit_view(name, default, maximum, Some(limit.value)))
    }

    async fn delete_project_limit(&self, project_id: &str, limit_name: &str) -> AtlasResult<()> {
        let mut state = self.lock();
        state.record(Op::DeleteProjectLimit)?;
        if !state.projects.contains_key(project_id) {
            return Err(project_not_found(project_id));
        }
        if let Some(limits) = state.limits.get_mut(project_id) {
            limits.remove(limit_name);
        }
        Ok(())
    }

    async fn get_encryption_at_rest(&self, project_id: &str) -> AtlasResult<EncryptionAtRest> {
        let mut state = self.lock();
        state.record(Op::GetEncryptionAtRest)?;
        Ok(redact(
            state.encryption.get(project_id).cloned().unwrap_or_default(),
        ))
    }

    async fn update_encryption_at_rest(
        &self,
        project_id: &str,
        settings: &EncryptionAtRest,
    ) -> AtlasResult<EncryptionAtRest> {
        let mut state = self.lock();
        state.record(Op::UpdateEncryptionAtRest)?;
        let stored = state.encryption.entry(project_id.to_string()).or_default();
        if settings.aws_kms.is_some() {
            stored.aws_kms = settings.aws_kms.clone();
        }
        if settings.azure_key_vault.is_some() {
            stored.azure_key_vault = settings.azure_key_vault.clone();
        }
        if settings.google_cloud_kms.is_some() {
            stored.google_cloud_kms = settings.google_cloud_kms.clone();
        }
        Ok(redact(stored.clone()))
    }

    async fn get_serverless_private_endpoint(
        &self,
        project_id: &str,
        instance_name: &str,
        endpoint_id: &str,
    ) -> AtlasResult<ServerlessPrivateEndpoint> {
        let fail_provisioning = self.fail_provisioning;
        let mut state = self.lock();
        state.record(Op::GetServerlessPrivateEndpoint)?;
        let key = (
            project_id.to_string(),
            instance_name.to_string(),
            endpoint_id.to_string(),
        );
        if !observe(&mut state.endpoints, &key) {
            return Err(endpoint_not_found(endpoint_id));
        }
        let stored = state
            .endpoints
            .get_mut(&key)
            .ok_or_else(|| endpoint_not_found(endpoint_id))?;

        if !stored.is_live() {
            stored.value.endpoint.status = "DELETING".to_string();
        } else if stored.value.endpoint.status == "INITIATING" {
            if stored.value.reads_until_available > 0 {
                stored.value.reads_until_available -= 1;
            } else if fail_provisioning {
                stored.value.endpoint.status = "FAILED".to_string();
                stored.value.endpoint.error_message =
                    Some("Private endpoint could not be created".to_string());
            } else {
                stored.value.endpoint.status = "AVAILABLE".to_string();
            }
        }
        Ok(stored.value.endpoint.clone())
    }

    async fn update_serverless_private_endpoint(
        &self,
        project_id: &str,
        instance_name: &str,
        endpoint_id: &str,
        update: &ServerlessPrivateEndpointUpdate,
    ) -> AtlasResult<ServerlessPrivateEndpoint> {
        let provision_reads = self.provision_reads;
        let mut state = self.lock();
        state.record(Op::UpdateServerlessPrivateEndpoint)?;
        let key = (
            project_id.to_string(),
            instance_name.to_string(),
            endpoint_id.to_string(),
        );
        let stored = match state.endpoints.get_mut(&key) {
            Some(stored) if stored.is_live() => stored,
            _ => return Err(endpoint_not_found(endpoint_id)),
        };

        let endpoint = &mut stored.value.endpoint;
        endpoint.provider_name = update.provider_name.clone();
        endpoint.comment = update.comment.clone();
        if update.cloud_provider_endpoint_id.is_some() {
            endpoint.cloud_provider_endpoint_id = update.cloud_provider_endpoint_id.clone();
        }
        if update.private_endpoint_ip_address.is_some() {
            endpoint.private_endpoint_ip_address = update.private_endpoint_ip_address.clone();
        }
        if endpoint.status != "AVAILABLE" {
            endpoint.status = "INITIATING".to_string();
            stored.value.reads_until_available = provision_reads;
        }
        Ok(stored.value.endpoint.clone())
    }

    async fn delete_serverless_private_endpoint(
        &self,
        project_id: &str,
        instance_name: &str,
        endpoint_id: &str,
    ) -> AtlasResult<()> {
        let vanishing = self.vanishing();
        let mut state = self.lock();
        state.record(Op::DeleteServerlessPrivateEndpoint)?;
        let key = (
            project_id.to_string(),
            instance_name.to_string(),
            endpoint_id.to_string(),
        );
        match state.endpoints.get_mut(&key) {
            Some(stored) => {
                if stored.is_live() {
                    stored.vanishing_in = vanishing;
                }
                Ok(())
            }
            None => Err(endpoint_not_found(endpoint_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::ProjectRequest;

    #[tokio::test]
    async fn test_deleted_role_lingers_for_lag_reads() {
        let atlas = FakeAtlas::new().with_delete_lag(2);
        atlas.insert_custom_db_role(
            "p1",
            CustomDbRole {
                role_name: "r1".to_string(),
                ..Default::default()
            },
        );

        atlas.delete_custom_db_role("p1", "r1").await.unwrap();
        assert!(atlas.get_custom_db_role("p1", "r1").await.is_ok());
        assert!(atlas.get_custom_db_role("p1", "r1").await.is_ok());
        let err = atlas.get_custom_db_role("p1", "r1").await.unwrap_err();
        assert!(err.has_code("ATLAS_CUSTOM_ROLE_NOT_FOUND"));
        assert_eq!(atlas.calls(Op::GetCustomDbRole), 3);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed_in_order() {
        let atlas = FakeAtlas::new();
        atlas.fail_times(Op::CreateProject, AtlasError::new(500, "boom"), 2);

        let request = ProjectRequest {
            name: "proj".to_string(),
            org_id: "org".to_string(),
            with_default_alerts_settings: None,
            project_owner_id: None,
        };
        assert_eq!(atlas.create_project(&request).await.unwrap_err().status, 500);
        assert_eq!(atlas.create_project(&request).await.unwrap_err().status, 500);
        let project = atlas.create_project(&request).await.unwrap();
        assert_eq!(project.id.len(), 24);
        assert_eq!(atlas.calls(Op::CreateProject), 3);
    }

    #[tokio::test]
    async fn test_project_limits_report_defaults_until_set() {
        let atlas = FakeAtlas::new();
        let request = ProjectRequest {
            name: "proj".to_string(),
            org_id: "org".to_string(),
            with_default_alerts_settings: None,
            project_owner_id: None,
        };
        let project = atlas.create_project(&request).await.unwrap();

        let limits = atlas.get_project_limits(&project.id).await.unwrap();
        assert_eq!(limits.len(), 3);
        assert_eq!(limits[0].value, 25);

        let set = atlas
            .set_project_limit(&project.id, &ProjectLimit::new("atlas.project.deployment.clusters", 1))
            .await
            .unwrap();
        assert_eq!(set.value, 1);
        assert_eq!(set.default_limit, Some(25));

        let err = atlas
            .set_project_limit(&project.id, &ProjectLimit::new("atlas.bogus", 1))
            .await
            .unwrap_err();
        assert!(err.has_code("INVALID_LIMIT_NAME"));

        atlas
            .delete_project_limit(&project.id, "atlas.project.deployment.clusters")
            .await
            .unwrap();
        assert!(atlas.project_limits(&project.id).is_empty());
    }

    #[tokio::test]
    async fn test_endpoint_provisioning_progression() {
        let atlas = FakeAtlas::new().with_provision_reads(1);
        atlas.insert_serverless_private_endpoint("p1", "srv", "ep1", "AWS");

        let update = ServerlessPrivateEndpointUpdate {
            provider_name: "AWS".to_string(),
            comment: Some("hello".to_string()),
            ..Default::default()
        };
        let updated = atlas
            .update_serverless_private_endpoint("p1", "srv", "ep1", &update)
            .await
            .unwrap();
        assert_eq!(updated.status, "INITIATING");

        let first = atlas
            .get_serverless_private_endpoint("p1", "srv", "ep1")
            .await
            .unwrap();
        assert_eq!(first.status, "INITIATING");
        let second = atlas
            .get_serverless_private_endpoint("p1", "srv", "ep1")
            .await
            .unwrap();
        assert_eq!(second.status, "AVAILABLE");
    }

    #[tokio::test]
    async fn test_encryption_secrets_are_not_returned() {
        let atlas = FakeAtlas::new();
        let settings = EncryptionAtRest {
            google_cloud_kms: Some(crate::atlas::GoogleCloudKms {
                enabled: Some(true),
                service_account_key: Some("{}".to_string()),
                key_version_resource_id: Some("projects/x".to_string()),
            }),
            ..Default::default()
        };

        let returned = atlas.update_encryption_at_rest("p1", &settings).await.unwrap();
        let gcp = returned.google_cloud_kms.unwrap();
        assert!(gcp.service_account_key.is_none());
        assert_eq!(gcp.key_version_resource_id.as_deref(), Some("projects/x"));

        let stored = atlas.encryption_at_rest("p1").unwrap();
        assert_eq!(
            stored.google_cloud_kms.unwrap().service_account_key.as_deref(),
            Some("{}")
        );
    }
}
