//! Request and response bodies of the Atlas API endpoints the provider uses.
//!
//! Field names follow the Atlas JSON (camelCase).

use serde::{Deserialize, Serialize};

/// A user-defined database role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomDbRole {
    /// Role name. Left empty on update requests, where the name is in the path.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role_name: String,
    /// Privileges granted by the role.
    #[serde(default)]
    pub actions: Vec<Action>,
    /// Roles whose privileges this role inherits.
    #[serde(default)]
    pub inherited_roles: Vec<InheritedRole>,
}

/// A privilege action and the resources it applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Action name, e.g. `FIND` or `INSERT`.
    pub action: String,
    /// Resources the action is granted on.
    #[serde(default)]
    pub resources: Vec<ActionResource>,
}

/// The target of a privilege action: a cluster, or a database/collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResource {
    /// Database name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db: Option<String>,
    /// Collection name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Whether the action applies to the whole cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<bool>,
}

/// A role inherited by a custom role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InheritedRole {
    /// Database the role is defined on.
    pub db: String,
    /// Role name.
    pub role: String,
}

/// An Atlas project (group).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Project id.
    pub id: String,
    /// Project name.
    pub name: String,
    /// Owning organization.
    pub org_id: String,
    /// Number of clusters in the project.
    #[serde(default)]
    pub cluster_count: i64,
    /// Creation timestamp (ISO 8601).
    #[serde(default)]
    pub created: String,
}

/// Body of a project create request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRequest {
    /// Project name.
    pub name: String,
    /// Owning organization.
    pub org_id: String,
    /// Whether Atlas creates the default alert configurations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with_default_alerts_settings: Option<bool>,
    /// User who becomes the project owner. Sent as the `projectOwnerId`
    /// query parameter, not in the body.
    #[serde(skip)]
    pub project_owner_id: Option<String>,
}

/// A configurable project limit, e.g. `atlas.project.deployment.clusters`.
///
/// Only `name` and `value` are sent; the rest is reported by Atlas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectLimit {
    /// Limit name.
    pub name: String,
    /// Configured value.
    pub value: i64,
    /// Amount of the limit in use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_usage: Option<i64>,
    /// Value Atlas applies when the limit is not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_limit: Option<i64>,
    /// Highest value the limit accepts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_limit: Option<i64>,
}

impl ProjectLimit {
    /// A limit to be written.
    pub fn new(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            value,
            ..Default::default()
        }
    }
}

/// A team's roles within a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectTeam {
    /// Team id.
    pub team_id: String,
    /// Project roles granted to the team, e.g. `GROUP_OWNER`.
    pub role_names: Vec<String>,
}

/// Encryption-at-rest settings of a project, one entry per key provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionAtRest {
    /// AWS KMS settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_kms: Option<AwsKms>,
    /// Azure Key Vault settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_key_vault: Option<AzureKeyVault>,
    /// Google Cloud KMS settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_cloud_kms: Option<GoogleCloudKms>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsKms {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_master_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureKeyVault {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_vault_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleCloudKms {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_version_resource_id: Option<String>,
}

/// A private endpoint attached to a serverless instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerlessPrivateEndpoint {
    /// Endpoint id.
    #[serde(rename = "_id")]
    pub id: String,
    /// Cloud-side endpoint id (AWS VPC endpoint or Azure private endpoint).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_provider_endpoint_id: Option<String>,
    /// Free-form comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Name of the Atlas endpoint service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_service_name: Option<String>,
    /// Why provisioning failed, when it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Private IP address (Azure only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_endpoint_ip_address: Option<String>,
    /// `AWS` or `AZURE`.
    #[serde(default)]
    pub provider_name: String,
    /// Provisioning status, e.g. `INITIATING` or `AVAILABLE`.
    #[serde(default)]
    pub status: String,
}

/// Body of a serverless private endpoint update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerlessPrivateEndpointUpdate {
    /// `AWS` or `AZURE`.
    pub provider_name: String,
    /// Free-form comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Cloud-side endpoint id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_provider_endpoint_id: Option<String>,
    /// Private IP address (Azure only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_endpoint_ip_address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_custom_role_wire_format() {
        let role = CustomDbRole {
            role_name: "reader".to_string(),
            actions: vec![Action {
                action: "FIND".to_string(),
                resources: vec![ActionResource {
                    db: Some("sales".to_string()),
                    collection: Some(String::new()),
                    cluster: None,
                }],
            }],
            inherited_roles: vec![InheritedRole {
                db: "admin".to_string(),
                role: "read".to_string(),
            }],
        };

        assert_eq!(
            serde_json::to_value(&role).unwrap(),
            json!({
                "roleName": "reader",
                "actions": [{"action": "FIND", "resources": [{"db": "sales", "collection": ""}]}],
                "inheritedRoles": [{"db": "admin", "role": "read"}]
            })
        );
    }

    #[test]
    fn test_update_body_omits_role_name() {
        let body = serde_json::to_value(CustomDbRole::default()).unwrap();
        assert!(body.get("roleName").is_none());
    }

    #[test]
    fn test_endpoint_id_field() {
        let endpoint: ServerlessPrivateEndpoint = serde_json::from_value(json!({
            "_id": "ep1",
            "providerName": "AWS",
            "status": "AVAILABLE"
        }))
        .unwrap();
        assert_eq!(endpoint.id, "ep1");
        assert!(endpoint.comment.is_none());
    }
}
