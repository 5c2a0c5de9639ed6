//! Value types exchanged with the plugin host.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One top-level field that differs between prior and planned state.
///
/// `before` is `None` when the field is being set for the first time and
/// `after` is `None` when it is being cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// Field name.
    pub path: String,
    /// Normalized value in the prior state.
    pub before: Option<Value>,
    /// Normalized value in the planned state.
    pub after: Option<Value>,
}

impl AttributeChange {
    /// A field that gains a value.
    pub fn added(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            before: None,
            after: Some(value),
        }
    }

    /// A field that loses its value.
    pub fn removed(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            before: Some(value),
            after: None,
        }
    }

    /// A field whose value changes.
    pub fn modified(path: impl Into<String>, before: Value, after: Value) -> Self {
        Self {
            path: path.into(),
            before: Some(before),
            after: Some(after),
        }
    }
}

/// Outcome of planning one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// State the resource is expected to have after apply; `Null` for a destroy.
    pub planned_state: Value,
    /// Fields that differ from the prior state.
    pub changes: Vec<AttributeChange>,
    /// The resource must be destroyed and recreated.
    pub requires_replace: bool,
}

impl PlanResult {
    /// Nothing to apply.
    pub fn no_change(state: Value) -> Self {
        Self {
            planned_state: state,
            changes: Vec::new(),
            requires_replace: false,
        }
    }

    /// Apply `changes`, replacing the resource if `requires_replace`.
    pub fn with_changes(planned_state: Value, changes: Vec<AttributeChange>, requires_replace: bool) -> Self {
        Self {
            planned_state,
            changes,
            requires_replace,
        }
    }

    /// Remove the resource; `changes` lists the fields that go away.
    pub fn destroy(changes: Vec<AttributeChange>) -> Self {
        Self::with_changes(Value::Null, changes, false)
    }

    /// Whether applying this plan removes the resource.
    pub fn is_destroy(&self) -> bool {
        self.planned_state.is_null()
    }
}

/// A resource found by import, ready to be written to state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedResource {
    /// Resource type name.
    pub resource_type: String,
    /// State as read from Atlas.
    pub state: Value,
}

impl ImportedResource {
    /// Pair `state` with its resource type.
    pub fn new(resource_type: impl Into<String>, state: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
        }
    }
}

/// Provider metadata: the resource types it serves and what it supports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// Resource type names, sorted.
    pub resources: Vec<String>,
    /// Optional protocol features.
    pub capabilities: ServerCapabilities,
}

/// Optional protocol features the provider implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServerCapabilities {
    /// `plan` accepts a null proposed state and returns a destroy plan.
    pub plan_destroy: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_change_constructors() {
        let added = AttributeChange::added("name", json!("test"));
        assert!(added.before.is_none());
        assert_eq!(added.after, Some(json!("test")));

        let removed = AttributeChange::removed("name", json!("old"));
        assert_eq!(removed.before, Some(json!("old")));
        assert!(removed.after.is_none());

        let modified = AttributeChange::modified("comment", json!("a"), json!("b"));
        assert_eq!(modified.before, Some(json!("a")));
        assert_eq!(modified.after, Some(json!("b")));
    }

    #[test]
    fn test_plan_result() {
        let no_change = PlanResult::no_change(json!({"id": "123"}));
        assert!(no_change.changes.is_empty());
        assert!(!no_change.requires_replace);
        assert!(!no_change.is_destroy());

        let replace = PlanResult::with_changes(
            json!({"org_id": "o2"}),
            vec![AttributeChange::modified("org_id", json!("o1"), json!("o2"))],
            true,
        );
        assert_eq!(replace.changes.len(), 1);
        assert!(replace.requires_replace);

        let destroy = PlanResult::destroy(vec![AttributeChange::removed("name", json!("p"))]);
        assert!(destroy.is_destroy());
        assert!(!destroy.requires_replace);
    }

    #[test]
    fn test_imported_resource() {
        let imported = ImportedResource::new("mongodbatlas_project", json!({"id": "5f1"}));
        assert_eq!(imported.resource_type, "mongodbatlas_project");
        assert_eq!(imported.state["id"], "5f1");
    }
}
