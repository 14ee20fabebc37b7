//! Hemmer Legacy Provider
//!
//! This crate adapts providers written against the legacy, flatmap-based
//! plugin interface to the typed-value provider protocol used by Hemmer.
//!
//! # Overview
//!
//! A legacy provider implements [`LegacyProvider`]: it declares its schema
//! with [`legacy::LegacyAttribute`] definitions and reads and writes state as
//! flat `key → string` maps. Wrapping it in a [`Provider`] gives the engine:
//!
//! - **Schema translation**: legacy schemas become typed [`schema::Block`]s,
//!   translated once and shared between concurrent callers
//! - **Config preparation**: provider defaults, coercion and null checks
//! - **State upgrades**: flatmap migrations, JSON upgrader chains, pruning of
//!   attributes the schema no longer has
//! - **Value reconciliation**: repairing the null/empty and unknown/known
//!   distinctions the legacy representation loses
//! - **Resource and data source operations**: read, plan, apply, import
//!
//! # Quick Start
//!
//! ```ignore
//! use hemmer_legacy_provider::{
//!     async_trait, LegacyProvider, Provider, ProviderError, Value,
//!     legacy::{InstanceState, LegacyAttribute, LegacyResource, LegacySchema, ResourceConfig, ValueKind},
//! };
//!
//! struct MyProvider {
//!     schema: LegacySchema,
//! }
//!
//! #[async_trait]
//! impl LegacyProvider for MyProvider {
//!     fn schema(&self) -> &LegacySchema {
//!         &self.schema
//!     }
//!
//!     async fn configure(&self, config: &ResourceConfig, engine_version: &str) -> Result<(), ProviderError> {
//!         Ok(())
//!     }
//!
//!     async fn refresh(
//!         &self,
//!         type_name: &str,
//!         state: InstanceState,
//!     ) -> Result<Option<InstanceState>, ProviderError> {
//!         Ok(Some(state))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     hemmer_legacy_provider::init_logging();
//!
//!     let schema = LegacySchema::new().with_resource(
//!         "example_server",
//!         LegacyResource::new()
//!             .with_attribute("name", LegacyAttribute::new(ValueKind::String).required()),
//!     );
//!     let provider = Provider::new(MyProvider { schema });
//!     let resp = provider.get_schema().await;
//!     assert!(resp.schema.is_some());
//! }
//! ```
//!
//! # Error Reporting
//!
//! Problems with configuration, state or the legacy provider are returned
//! as [`schema::Diagnostic`]s on each response. Operations return
//! `Err(ProviderError)` only for requests the engine should never send, such
//! as an undeclared resource type.

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod flatmap;
pub mod json;
pub mod legacy;
pub mod logging;
pub mod provider;
pub mod reconcile;
pub mod schema;
pub mod testing;
pub mod types;
pub mod upgrade;
pub mod validation;
pub mod value;

// Re-export main types at crate root
pub use error::ProviderError;
pub use legacy::LegacyProvider;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::{Provider, SchemaCache, ShimOptions};
pub use schema::{Diagnostic, ProviderSchema};
pub use types::{ImportedResource, ProviderMetadata, WithDiagnostics};
pub use validation::validate_config_nulls;
pub use value::{Type, Value};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
