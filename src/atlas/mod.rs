//! The Atlas API as seen by the provider.
//!
//! [`AtlasClient`] is the outbound seam: one method per endpoint the resources
//! call. The HTTP implementation (digest authentication, base URL, retries on
//! the transport level) lives outside this crate and is handed to
//! [`AtlasProvider`](crate::provider::AtlasProvider) through a factory.
//! [`FakeAtlas`] is an in-process implementation with scriptable failures for
//! tests.

mod error;
mod fake;
mod models;

pub use error::{AtlasError, ErrorClass, ErrorPolicy};
pub use fake::{FakeAtlas, Op};
pub use models::{
    Action, ActionResource, AwsKms, AzureKeyVault, CustomDbRole, EncryptionAtRest,
    GoogleCloudKms, InheritedRole, Project, ProjectLimit, ProjectRequest, ProjectTeam,
    ServerlessPrivateEndpoint, ServerlessPrivateEndpointUpdate,
};

/// Result type of every [`AtlasClient`] call.
pub type AtlasResult<T> = Result<T, AtlasError>;

/// Client for the Atlas Admin API endpoints used by the provider's resources.
#[async_trait::async_trait]
pub trait AtlasClient: Send + Sync + 'static {
    // =========================================================================
    // Custom database roles
    // =========================================================================

    /// `GET /groups/{project_id}/customDBRoles/roles/{role_name}`
    async fn get_custom_db_role(&self, project_id: &str, role_name: &str)
        -> AtlasResult<CustomDbRole>;

    /// `POST /groups/{project_id}/customDBRoles/roles`
    async fn create_custom_db_role(
        &self,
        project_id: &str,
        role: &CustomDbRole,
    ) -> AtlasResult<CustomDbRole>;

    /// `PATCH /groups/{project_id}/customDBRoles/roles/{role_name}`
    async fn update_custom_db_role(
        &self,
        project_id: &str,
        role_name: &str,
        role: &CustomDbRole,
    ) -> AtlasResult<CustomDbRole>;

    /// `DELETE /groups/{project_id}/customDBRoles/roles/{role_name}`
    async fn delete_custom_db_role(&self, project_id: &str, role_name: &str) -> AtlasResult<()>;

    // =========================================================================
    // Projects
    // =========================================================================

    /// `POST /groups`
    async fn create_project(&self, request: &ProjectRequest) -> AtlasResult<Project>;

    /// `GET /groups/{project_id}`
    async fn get_project(&self, project_id: &str) -> AtlasResult<Project>;

    /// `PATCH /groups/{project_id}` (rename)
    async fn update_project_name(&self, project_id: &str, name: &str) -> AtlasResult<Project>;

    /// `DELETE /groups/{project_id}`
    async fn delete_project(&self, project_id: &str) -> AtlasResult<()>;

    /// `GET /groups/{project_id}/teams`
    async fn get_project_teams(&self, project_id: &str) -> AtlasResult<Vec<ProjectTeam>>;

    /// `POST /groups/{project_id}/teams`
    async fn add_project_teams(&self, project_id: &str, teams: &[ProjectTeam]) -> AtlasResult<()>;

    /// `PATCH /groups/{project_id}/teams/{team_id}`
    async fn update_project_team_roles(
        &self,
        project_id: &str,
        team_id: &str,
        role_names: &[String],
    ) -> AtlasResult<()>;

    /// `DELETE /groups/{project_id}/teams/{team_id}`
    async fn remove_project_team(&self, project_id: &str, team_id: &str) -> AtlasResult<()>;

    /// `GET /groups/{project_id}/limits`, every limit including unset ones.
    async fn get_project_limits(&self, project_id: &str) -> AtlasResult<Vec<ProjectLimit>>;

    /// `PATCH /groups/{project_id}/limits/{limit_name}`
    async fn set_project_limit(
        &self,
        project_id: &str,
        limit: &ProjectLimit,
    ) -> AtlasResult<ProjectLimit>;

    /// `DELETE /groups/{project_id}/limits/{limit_name}`, restoring the default.
    async fn delete_project_limit(&self, project_id: &str, limit_name: &str) -> AtlasResult<()>;

    // =========================================================================
    // Encryption at rest
    // =========================================================================

    /// `GET /groups/{project_id}/encryptionAtRest`
    async fn get_encryption_at_rest(&self, project_id: &str) -> AtlasResult<EncryptionAtRest>;

    /// `PATCH /groups/{project_id}/encryptionAtRest`
    async fn update_encryption_at_rest(
        &self,
        project_id: &str,
        settings: &EncryptionAtRest,
    ) -> AtlasResult<EncryptionAtRest>;

    // =========================================================================
    // Serverless private endpoints
    // =========================================================================

    /// `GET /groups/{project_id}/privateEndpoint/serverless/instance/{instance}/endpoint/{endpoint_id}`
    async fn get_serverless_private_endpoint(
        &self,
        project_id: &str,
        instance_name: &str,
        endpoint_id: &str,
    ) -> AtlasResult<ServerlessPrivateEndpoint>;

    /// `PATCH .../instance/{instance}/endpoint/{endpoint_id}`
    async fn update_serverless_private_endpoint(
        &self,
        project_id: &str,
        instance_name: &str,
        endpoint_id: &str,
        update: &ServerlessPrivateEndpointUpdate,
    ) -> AtlasResult<ServerlessPrivateEndpoint>;

    /// `DELETE .../instance/{instance}/endpoint/{endpoint_id}`
    async fn delete_serverless_private_endpoint(
        &self,
        project_id: &str,
        instance_name: &str,
        endpoint_id: &str,
    ) -> AtlasResult<()>;
}
