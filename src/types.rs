//! Request and response types for the [`Provider`](crate::Provider) facade.
//!
//! Responses carry user-facing problems as diagnostics. A response with an
//! error diagnostic usually has no value set.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::flatmap::Flatmap;
use crate::schema::{has_errors, Diagnostic, ProviderSchema};
use crate::value::Value;

/// The translated provider schema.
#[derive(Debug, Clone, Default)]
pub struct GetSchemaResponse {
    /// The schema, absent if translation failed.
    pub schema: Option<Arc<ProviderSchema>>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Provider configuration ready to be passed to `configure`.
#[derive(Debug, Clone, Default)]
pub struct PrepareProviderConfigResponse {
    /// The configuration with defaults applied, absent on error.
    pub prepared_config: Option<Value>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Persisted instance state in one of its two stored forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawState {
    /// State written as a legacy flatmap.
    Flatmap(Flatmap),
    /// State written as a JSON object.
    Json(Vec<u8>),
}

/// A request to bring stored state up to the current schema version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeResourceStateRequest {
    pub type_name: String,
    /// The schema version the state was written with.
    pub version: u64,
    /// The stored state. Empty state upgrades to nothing.
    pub raw_state: Option<RawState>,
}

impl UpgradeResourceStateRequest {
    /// Upgrade a flatmap state.
    pub fn flatmap(type_name: impl Into<String>, version: u64, attributes: Flatmap) -> Self {
        Self {
            type_name: type_name.into(),
            version,
            raw_state: (!attributes.is_empty()).then_some(RawState::Flatmap(attributes)),
        }
    }

    /// Upgrade a JSON state.
    pub fn json(type_name: impl Into<String>, version: u64, raw: impl Into<Vec<u8>>) -> Self {
        let raw = raw.into();
        Self {
            type_name: type_name.into(),
            version,
            raw_state: (!raw.is_empty()).then_some(RawState::Json(raw)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpgradeResourceStateResponse {
    /// The state decoded against the current schema.
    pub upgraded_state: Option<Value>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigureRequest {
    /// Engine version reported to the legacy provider. Falls back to the
    /// version in [`ShimOptions`](crate::ShimOptions) when absent.
    pub engine_version: Option<String>,
    pub config: Value,
}

impl ConfigureRequest {
    pub fn new(config: Value) -> Self {
        Self {
            engine_version: None,
            config,
        }
    }

    pub fn with_engine_version(mut self, version: impl Into<String>) -> Self {
        self.engine_version = Some(version.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadResourceRequest {
    pub type_name: String,
    pub prior_state: Value,
    /// Provider-private JSON stored alongside the state.
    pub private: Vec<u8>,
}

impl ReadResourceRequest {
    pub fn new(type_name: impl Into<String>, prior_state: Value) -> Self {
        Self {
            type_name: type_name.into(),
            prior_state,
            private: Vec::new(),
        }
    }

    pub fn with_private(mut self, private: impl Into<Vec<u8>>) -> Self {
        self.private = private.into();
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReadResourceResponse {
    /// The refreshed state. Null when the instance no longer exists.
    pub new_state: Option<Value>,
    pub private: Vec<u8>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanResourceChangeRequest {
    pub type_name: String,
    /// Null when the instance is being created.
    pub prior_state: Value,
    /// Null when the instance is being destroyed.
    pub proposed_new_state: Value,
    pub config: Value,
    pub prior_private: Vec<u8>,
}

impl PlanResourceChangeRequest {
    pub fn new(
        type_name: impl Into<String>,
        prior_state: Value,
        proposed_new_state: Value,
        config: Value,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            prior_state,
            proposed_new_state,
            config,
            prior_private: Vec::new(),
        }
    }

    pub fn with_prior_private(mut self, private: impl Into<Vec<u8>>) -> Self {
        self.prior_private = private.into();
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlanResourceChangeResponse {
    pub planned_state: Option<Value>,
    /// Attribute paths whose change forces the instance to be replaced.
    pub requires_replace: Vec<String>,
    pub planned_private: Vec<u8>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApplyResourceChangeRequest {
    pub type_name: String,
    pub prior_state: Value,
    /// Null when the instance is being destroyed.
    pub planned_state: Value,
    pub config: Value,
    pub planned_private: Vec<u8>,
}

impl ApplyResourceChangeRequest {
    pub fn new(type_name: impl Into<String>, prior_state: Value, planned_state: Value, config: Value) -> Self {
        Self {
            type_name: type_name.into(),
            prior_state,
            planned_state,
            config,
            planned_private: Vec::new(),
        }
    }

    pub fn with_planned_private(mut self, private: impl Into<Vec<u8>>) -> Self {
        self.planned_private = private.into();
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApplyResourceChangeResponse {
    /// The applied state. Null when the instance was destroyed.
    pub new_state: Option<Value>,
    pub private: Vec<u8>,
    pub diagnostics: Vec<Diagnostic>,
}

/// An imported resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedResource {
    /// The resource type.
    pub type_name: String,
    /// The imported state.
    pub state: Value,
    pub private: Vec<u8>,
}

impl ImportedResource {
    /// Create a new imported resource.
    pub fn new(type_name: impl Into<String>, state: Value) -> Self {
        Self {
            type_name: type_name.into(),
            state,
            private: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImportResourceStateResponse {
    pub imported_resources: Vec<ImportedResource>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Default)]
pub struct ReadDataSourceResponse {
    pub state: Option<Value>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Names of the resources and data sources a provider declares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// List of resource type names.
    pub resources: Vec<String>,
    /// List of data source type names.
    pub data_sources: Vec<String>,
}

/// Shared accessor for responses that carry diagnostics.
pub trait WithDiagnostics {
    /// The diagnostics of this response.
    fn diagnostics(&self) -> &[Diagnostic];

    /// Whether any diagnostic is an error.
    fn has_errors(&self) -> bool {
        has_errors(self.diagnostics())
    }
}

macro_rules! impl_with_diagnostics {
    ($($ty:ty),* $(,)?) => {
        $(
            impl WithDiagnostics for $ty {
                fn diagnostics(&self) -> &[Diagnostic] {
                    &self.diagnostics
                }
            }
        )*
    };
}

impl_with_diagnostics!(
    GetSchemaResponse,
    PrepareProviderConfigResponse,
    UpgradeResourceStateResponse,
    ReadResourceResponse,
    PlanResourceChangeResponse,
    ApplyResourceChangeResponse,
    ImportResourceStateResponse,
    ReadDataSourceResponse,
);

impl WithDiagnostics for Vec<Diagnostic> {
    fn diagnostics(&self) -> &[Diagnostic] {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Type;

    #[test]
    fn test_upgrade_request_constructors() {
        let flat = UpgradeResourceStateRequest::flatmap(
            "example_disk",
            1,
            [("id".to_string(), "d-1".to_string())].into_iter().collect(),
        );
        assert!(matches!(flat.raw_state, Some(RawState::Flatmap(_))));

        let json = UpgradeResourceStateRequest::json("example_disk", 2, r#"{"id":"d-1"}"#);
        assert_eq!(json.raw_state, Some(RawState::Json(br#"{"id":"d-1"}"#.to_vec())));

        let empty = UpgradeResourceStateRequest::json("example_disk", 2, "");
        assert!(empty.raw_state.is_none());
    }

    #[test]
    fn test_imported_resource() {
        let imported = ImportedResource::new(
            "example_bucket",
            Value::object([("id", Value::string("my-bucket"))]),
        );
        assert_eq!(imported.type_name, "example_bucket");
        assert_eq!(
            imported.state.get_attr("id"),
            Some(&Value::string("my-bucket"))
        );
        assert!(imported.private.is_empty());
    }

    #[test]
    fn test_response_errors() {
        let mut resp = ReadResourceResponse::default();
        assert!(!resp.has_errors());

        resp.diagnostics.push(Diagnostic::warning("slow API"));
        assert!(!resp.has_errors());

        resp.diagnostics.push(Diagnostic::error("refresh failed"));
        assert!(resp.has_errors());
    }

    #[test]
    fn test_configure_request() {
        let req = ConfigureRequest::new(Value::null(Type::Dynamic)).with_engine_version("1.4.0");
        assert_eq!(req.engine_version.as_deref(), Some("1.4.0"));
    }
}
