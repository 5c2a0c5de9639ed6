//! MongoDB Atlas Provider
//!
//! Lifecycle handlers for four MongoDB Atlas resource kinds, written against
//! an abstract [`atlas::AtlasClient`] so they can run against the live API
//! or the in-memory [`atlas::FakeAtlas`].
//!
//! # Overview
//!
//! The crate provides:
//!
//! - **Eventual-consistency poller**: [`StateConf`] waits for a remote object
//!   to settle in a target state within a bounded time
//! - **Composite IDs**: [`StateId`] packs several key fields into one opaque
//!   base64 string, and [`state_id::parse_import_id`] splits import strings
//! - **Resources**: custom database roles, projects, encryption at rest and
//!   serverless private endpoint services, each a [`resources::ResourceHandler`]
//! - **Provider surface**: [`AtlasProvider`] implements [`ProviderService`],
//!   the host-facing lifecycle trait (configure, plan, CRUD, import, upgrade)
//! - **Error types**: [`ProviderError`] and the classified [`atlas::AtlasError`]
//! - **Logging**: Integration with `tracing` for structured logging
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use mongodbatlas_provider::{AtlasProvider, ProviderService};
//! use mongodbatlas_provider::atlas::FakeAtlas;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     mongodbatlas_provider::init_logging();
//!
//!     let provider = AtlasProvider::with_client(Arc::new(FakeAtlas::new()));
//!     provider
//!         .configure(json!({"public_key": "pk", "private_key": "sk"}))
//!         .await?;
//!
//!     let state = provider
//!         .create(
//!             "mongodbatlas_project",
//!             json!({"name": "analytics", "org_id": "5f1e"}),
//!         )
//!         .await?;
//!     println!("created project {}", state["id"]);
//!     Ok(())
//! }
//! ```
//!
//! # Timing
//!
//! Every wait goes through [`poll::Clock`]. Production code uses
//! [`poll::TokioClock`]; tests use [`testing::ManualClock`], which advances
//! virtual time instead of sleeping.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod atlas;
pub mod config;
pub mod error;
pub mod locks;
pub mod logging;
pub mod poll;
pub mod provider;
pub mod resources;
pub mod schema;
pub mod state_id;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use config::{Operation, PollSettings, ProviderConfig};
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use poll::{Observation, PollConfig, PollError, StateConf};
pub use provider::{AtlasProvider, ProviderContext, ProviderService};
pub use schema::ProviderSchema;
pub use state_id::{IdLayout, StateId, StateIdError};
pub use types::{AttributeChange, ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities};
pub use validation::{is_valid, validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
