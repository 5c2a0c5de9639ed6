//! Provider configuration.
//!
//! [`ProviderConfig`] is the provider block as written by the user. Any
//! attribute left out falls back to its `MONGODB_ATLAS_*` environment
//! variable. [`PollSettings`] holds the timing used by each resource's
//! polling call sites.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::poll::PollConfig;
use crate::schema::{Attribute, Diagnostic, Schema};

/// Atlas endpoint used when neither the configuration nor the environment
/// names one.
pub const DEFAULT_BASE_URL: &str = "https://cloud.mongodb.com/";

/// Environment variable for [`ProviderConfig::public_key`].
pub const ENV_PUBLIC_KEY: &str = "MONGODB_ATLAS_PUBLIC_KEY";
/// Environment variable for [`ProviderConfig::private_key`].
pub const ENV_PRIVATE_KEY: &str = "MONGODB_ATLAS_PRIVATE_KEY";
/// Environment variable for [`ProviderConfig::base_url`].
pub const ENV_BASE_URL: &str = "MONGODB_ATLAS_BASE_URL";

/// Errors in the provider configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration value does not have the expected shape.
    #[error("invalid provider configuration: {0}")]
    Invalid(#[from] serde_json::Error),

    /// A credential is set neither in the configuration nor the environment.
    #[error("missing required attribute '{attribute}'")]
    Missing {
        /// The provider attribute.
        attribute: &'static str,
        /// The environment variable that was also checked.
        env: &'static str,
    },
}

impl ConfigError {
    /// Render the error as a diagnostic pointing at the offending attribute.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Self::Invalid(e) => Diagnostic::error("Invalid provider configuration").with_detail(e.to_string()),
            Self::Missing { attribute, env } => {
                Diagnostic::error(format!("Missing required attribute '{}'", attribute))
                    .with_detail(format!(
                        "Set '{}' in the provider configuration or the {} environment variable",
                        attribute, env
                    ))
                    .with_attribute(*attribute)
            }
        }
    }
}

/// Credentials and endpoint of the Atlas Admin API.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Programmatic API public key.
    #[serde(default)]
    pub public_key: Option<String>,
    /// Programmatic API private key.
    #[serde(default)]
    pub private_key: Option<String>,
    /// API base URL.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("public_key", &self.public_key)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ProviderConfig {
    /// The schema of the provider block.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_attribute(
                "public_key",
                Attribute::optional_string()
                    .with_description("Atlas programmatic API public key"),
            )
            .with_attribute(
                "private_key",
                Attribute::optional_string()
                    .sensitive()
                    .with_description("Atlas programmatic API private key"),
            )
            .with_attribute(
                "base_url",
                Attribute::optional_string().with_description("Atlas Admin API base URL"),
            )
    }

    /// Parse the provider block. A null value is an empty configuration.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, ConfigError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(Self::deserialize(value)?)
    }

    /// Fill unset attributes from the environment, read through `lookup`.
    ///
    /// Empty strings count as unset on both sides.
    pub fn with_env_fallback(self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let pick = |configured: Option<String>, env: &str| {
            configured
                .filter(|v| !v.is_empty())
                .or_else(|| lookup(env).filter(|v| !v.is_empty()))
        };

        Self {
            public_key: pick(self.public_key, ENV_PUBLIC_KEY),
            private_key: pick(self.private_key, ENV_PRIVATE_KEY),
            base_url: pick(self.base_url, ENV_BASE_URL),
        }
    }

    /// The base URL, or [`DEFAULT_BASE_URL`].
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    /// Check that both credentials are present.
    pub fn check(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.public_key.is_none() {
            errors.push(ConfigError::Missing {
                attribute: "public_key",
                env: ENV_PUBLIC_KEY,
            });
        }
        if self.private_key.is_none() {
            errors.push(ConfigError::Missing {
                attribute: "private_key",
                env: ENV_PRIVATE_KEY,
            });
        }
        errors
    }
}

/// The lifecycle step a poll belongs to.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

/// Poll timing per resource kind and operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSettings {
    /// Timing used where no override applies.
    #[serde(default)]
    pub default: PollConfig,
    /// Overrides keyed by resource type name.
    #[serde(default)]
    pub overrides: HashMap<String, HashMap<Operation, PollConfig>>,
}

impl PollSettings {
    /// Use `default` everywhere.
    pub fn new(default: PollConfig) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    /// Override the timing of one operation of one resource kind.
    pub fn with_override(
        mut self,
        resource_type: impl Into<String>,
        operation: Operation,
        config: PollConfig,
    ) -> Self {
        self.overrides
            .entry(resource_type.into())
            .or_default()
            .insert(operation, config);
        self
    }

    /// Timing for `operation` on `resource_type`.
    pub fn get(&self, resource_type: &str, operation: Operation) -> PollConfig {
        self.overrides
            .get(resource_type)
            .and_then(|ops| ops.get(&operation))
            .copied()
            .unwrap_or(self.default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn env(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_from_value() {
        let config = ProviderConfig::from_value(&json!({
            "public_key": "pub",
            "private_key": "priv"
        }))
        .unwrap();

        assert_eq!(config.public_key.as_deref(), Some("pub"));
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
        assert!(config.check().is_empty());
    }

    #[test]
    fn test_null_is_empty() {
        let config = ProviderConfig::from_value(&serde_json::Value::Null).unwrap();
        assert_eq!(config, ProviderConfig::default());
    }

    #[test]
    fn test_wrong_type_is_invalid() {
        let err = ProviderConfig::from_value(&json!({"public_key": 42})).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_env_fallback() {
        let config = ProviderConfig::from_value(&json!({"public_key": "from-config"}))
            .unwrap()
            .with_env_fallback(env(&[
                (ENV_PUBLIC_KEY, "from-env"),
                (ENV_PRIVATE_KEY, "secret"),
                (ENV_BASE_URL, "https://cloud-qa.mongodb.com/"),
            ]));

        assert_eq!(config.public_key.as_deref(), Some("from-config"));
        assert_eq!(config.private_key.as_deref(), Some("secret"));
        assert_eq!(config.base_url(), "https://cloud-qa.mongodb.com/");
    }

    #[test]
    fn test_empty_strings_fall_back() {
        let config = ProviderConfig::from_value(&json!({"public_key": ""}))
            .unwrap()
            .with_env_fallback(env(&[(ENV_PUBLIC_KEY, "from-env")]));
        assert_eq!(config.public_key.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_missing_credentials_point_at_attribute() {
        let config = ProviderConfig::default().with_env_fallback(env(&[]));
        let diagnostics: Vec<_> = config.check().iter().map(ConfigError::to_diagnostic).collect();

        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("public_key"));
        assert_eq!(diagnostics[1].attribute.as_deref(), Some("private_key"));
        assert!(diagnostics[1]
            .detail
            .as_deref()
            .unwrap()
            .contains(ENV_PRIVATE_KEY));
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let config = ProviderConfig {
            public_key: Some("pub".to_string()),
            private_key: Some("super-secret".to_string()),
            base_url: None,
        };
        let debug = format!("{:?}", config);
        assert!(debug.contains("pub"));
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_poll_settings_overrides() {
        let fast = PollConfig::with_timeout(Duration::from_secs(30));
        let settings = PollSettings::default().with_override(
            "mongodbatlas_project",
            Operation::Delete,
            fast,
        );

        assert_eq!(settings.get("mongodbatlas_project", Operation::Delete), fast);
        assert_eq!(
            settings.get("mongodbatlas_project", Operation::Create),
            PollConfig::default()
        );
        assert_eq!(
            settings.get("mongodbatlas_custom_db_role", Operation::Delete),
            PollConfig::default()
        );
    }
}
