//! Testing utilities for the provider.
//!
//! [`ProviderTester`] drives a [`ProviderService`] through plan and CRUD
//! without a plugin host. [`ManualClock`] replaces wall-clock time so polls
//! finish instantly, and [`fake_provider`] wires an [`AtlasProvider`] to a
//! [`FakeAtlas`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mongodbatlas_provider::atlas::FakeAtlas;
//! use mongodbatlas_provider::testing::{fake_provider, test_config, ProviderTester};
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_create_project() {
//!     let tester = ProviderTester::new(fake_provider(Arc::new(FakeAtlas::new())));
//!     tester.configure(test_config()).await.unwrap();
//!
//!     let state = tester
//!         .lifecycle_create("mongodbatlas_project", json!({"name": "p", "org_id": "o"}))
//!         .await
//!         .unwrap();
//!     assert_eq!(state["name"], "p");
//! }
//! ```

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use crate::atlas::FakeAtlas;
use crate::error::ProviderError;
use crate::poll::Clock;
use crate::provider::{AtlasProvider, ProviderService};
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::types::{ImportedResource, PlanResult};

// =========================================================================
// Clock
// =========================================================================

/// A clock whose `sleep` returns immediately after advancing virtual time.
///
/// Every sleep is recorded, so tests can assert on the exact poll cadence.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    state: Mutex<ManualClockState>,
}

#[derive(Debug, Default)]
struct ManualClockState {
    offset: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    /// A clock at virtual time zero.
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            state: Mutex::new(ManualClockState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ManualClockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Virtual time passed since creation.
    pub fn elapsed(&self) -> Duration {
        self.state().offset
    }

    /// Every duration slept so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state().sleeps.clone()
    }

    /// Move virtual time forward without recording a sleep.
    pub fn advance(&self, duration: Duration) {
        self.state().offset += duration;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        {
            let mut state = self.state();
            state.offset += duration;
            state.sleeps.push(duration);
        }
        tokio::task::yield_now().await;
    }
}

// =========================================================================
// Fixtures
// =========================================================================

/// An [`AtlasProvider`] backed by `atlas`, with a [`ManualClock`] and no
/// environment fallback.
pub fn fake_provider(atlas: Arc<FakeAtlas>) -> AtlasProvider {
    AtlasProvider::with_client(atlas)
        .with_clock(Arc::new(ManualClock::new()))
        .with_env(|_| None)
}

/// A provider configuration with both credentials set.
pub fn test_config() -> Value {
    json!({
        "public_key": "test-public-key",
        "private_key": "test-private-key"
    })
}

// =========================================================================
// Tester
// =========================================================================

/// Drives a [`ProviderService`] the way a host would, turning error
/// diagnostics into `Err`.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Wrap `provider`.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The provider schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Resource type names from the provider metadata.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    /// Validate provider configuration. Error diagnostics become `Err`.
    pub async fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.validate_provider_config(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Configure the provider. Error diagnostics become `Err`.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Stop the provider, dropping its client.
    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    /// Validate a resource configuration. Error diagnostics become `Err`.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Plan with no prior state; `proposed_state` doubles as the config.
    pub async fn plan_create(
        &self,
        resource_type: &str,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, None, proposed_state.clone(), proposed_state)
            .await
    }

    /// Plan from `prior_state` to `proposed_state`.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(
                resource_type,
                Some(prior_state),
                proposed_state.clone(),
                proposed_state,
            )
            .await
    }

    /// Plan removal of `prior_state`.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null, Value::Null)
            .await
    }

    /// Forward to [`ProviderService::create`].
    pub async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Forward to [`ProviderService::read`].
    pub async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    /// Forward to [`ProviderService::update`].
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Forward to [`ProviderService::delete`].
    pub async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Import by the human-entered id.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    /// Forward to [`ProviderService::upgrade_resource_state`].
    pub async fn upgrade_resource_state(
        &self,
        resource_type: &str,
        version: i64,
        state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .upgrade_resource_state(resource_type, version, state)
            .await
    }

    // =========================================================================
    // Lifecycle Helpers
    // =========================================================================

    /// Run plan → create → read and return the state after read.
    pub async fn lifecycle_create(&self, resource_type: &str, config: Value) -> Result<Value, ProviderError> {
        let plan = self.plan_create(resource_type, config).await?;
        let created = self.create(resource_type, plan.planned_state).await?;
        self.read(resource_type, created).await
    }

    /// Run plan → update → read and return the state after read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self
            .plan_update(resource_type, prior_state.clone(), proposed_state)
            .await?;
        let updated = self
            .update(resource_type, prior_state, plan.planned_state)
            .await?;
        self.read(resource_type, updated).await
    }

    /// Run plan → delete.
    pub async fn lifecycle_delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        self.plan_delete(resource_type, current_state.clone()).await?;
        self.delete(resource_type, current_state).await
    }

    /// Run create → update → delete and return the state after the update.
    pub async fn lifecycle_crud(
        &self,
        resource_type: &str,
        initial_config: Value,
        updated_config: Value,
    ) -> Result<Value, ProviderError> {
        let created = self.lifecycle_create(resource_type, initial_config).await?;
        let updated = self
            .lifecycle_update(resource_type, created, updated_config)
            .await?;
        self.lifecycle_delete(resource_type, updated.clone()).await?;
        Ok(updated)
    }
}

/// Failure of a [`ProviderTester`] call.
#[derive(Debug, thiserror::Error)]
pub enum TestError {
    /// Error diagnostics returned by the provider.
    #[error("{}", render_diagnostics(.0))]
    Diagnostics(Vec<Diagnostic>),
    /// The call itself failed.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
}

fn render_diagnostics(diagnostics: &[Diagnostic]) -> String {
    let lines: Vec<String> = diagnostics
        .iter()
        .map(|d| {
            let mut line = format!("[{:?}] {}", d.severity, d.summary);
            if let Some(detail) = &d.detail {
                line.push_str(&format!(": {detail}"));
            }
            if let Some(attribute) = &d.attribute {
                line.push_str(&format!(" (at {attribute})"));
            }
            line
        })
        .collect();
    format!("{} diagnostic(s): {}", diagnostics.len(), lines.join("; "))
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that a plan creates the resource in place.
///
/// # Panics
///
/// Panics if the plan has no changes or requires replacement.
pub fn assert_plan_creates(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to have changes for create, but got no changes"
    );
    assert!(!plan.requires_replace, "Expected plan to create, not replace");
}

/// Assert that a plan removes the resource.
///
/// # Panics
///
/// Panics if the planned state is not null.
pub fn assert_plan_destroys(plan: &PlanResult) {
    assert!(
        plan.is_destroy(),
        "Expected a destroy plan, but planned state is {}",
        plan.planned_state
    );
}

/// Assert that a plan has no changes.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan requires resource replacement.
///
/// # Panics
///
/// Panics if the plan does not require replacement.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "Expected plan to require replacement, but it does not"
    );
}

/// Assert that a plan changes something without replacing the resource.
///
/// # Panics
///
/// Panics if the plan has no changes or requires replacement.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(
        !plan.changes.is_empty(),
        "Expected plan to have changes, but got no changes"
    );
    assert!(
        !plan.requires_replace,
        "Expected plan to update in place, but it requires replacement"
    );
}

/// Assert that a plan has a change for a specific attribute path.
///
/// # Panics
///
/// Panics if the plan does not have a change for the given path.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    assert!(
        plan.changes.iter().any(|c| c.path == path),
        "Expected plan to change attribute '{}', but it was not changed. Changed attributes: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics.iter().filter(|d| d.is_error()).collect();
    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain an error whose summary contains
/// `substring` or that is attached to the attribute `substring`.
///
/// # Panics
///
/// Panics if no error diagnostic matches.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let matches = diagnostics.iter().any(|d| {
        d.severity == DiagnosticSeverity::Error
            && (d.summary.contains(substring) || d.attribute.as_deref() == Some(substring))
    });
    assert!(
        matches,
        "Expected an error containing '{}', but no matching error found. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| d.is_error())
            .map(|d| &d.summary)
            .collect::<Vec<_>>()
    );
}
