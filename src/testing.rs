//! Testing utilities for legacy provider implementations.
//!
//! [`ProviderTester`] drives a [`LegacyProvider`] through the typed
//! [`Provider`] facade the way the orchestration engine would, so a legacy
//! provider can be tested end to end without an engine.
//!
//! # Example
//!
//! ```ignore
//! use hemmer_legacy_provider::testing::{assert_plan_unknown, ProviderTester};
//! use hemmer_legacy_provider::Value;
//!
//! #[tokio::test]
//! async fn test_create_bucket() {
//!     let tester = ProviderTester::new(MyLegacyProvider::new());
//!
//!     let config = Value::object([("name", Value::string("logs"))]);
//!     let plan = tester.plan_create("example_bucket", config.clone()).await.unwrap();
//!     assert_plan_unknown(&plan, "id");
//!
//!     let state = tester.lifecycle_create("example_bucket", config).await.unwrap();
//!     assert_eq!(state.get_attr("name"), Some(&Value::string("logs")));
//! }
//! ```

use std::sync::Arc;

use crate::error::ProviderError;
use crate::flatmap::Flatmap;
use crate::legacy::LegacyProvider;
use crate::provider::{Provider, ShimOptions};
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::types::{
    ApplyResourceChangeRequest, ApplyResourceChangeResponse, ConfigureRequest,
    ImportedResource, PlanResourceChangeRequest, PlanResourceChangeResponse,
    ReadResourceRequest, UpgradeResourceStateRequest, WithDiagnostics,
};
use crate::value::{Type, Value};

/// A test harness for legacy provider implementations.
pub struct ProviderTester<P: LegacyProvider> {
    provider: Provider<P>,
}

impl<P: LegacyProvider> ProviderTester<P> {
    /// Create a new tester for the given legacy provider.
    pub fn new(legacy: P) -> Self {
        Self {
            provider: Provider::new(legacy),
        }
    }

    /// Create a new tester with custom shim options.
    pub fn with_options(legacy: P, options: ShimOptions) -> Self {
        Self {
            provider: Provider::with_options(legacy, options),
        }
    }

    /// The facade under test.
    pub fn provider(&self) -> &Provider<P> {
        &self.provider
    }

    /// The wrapped legacy provider.
    pub fn legacy(&self) -> &P {
        self.provider.legacy()
    }

    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// The translated schema, or the diagnostics explaining why translation
    /// failed.
    pub async fn schema(&self) -> Result<Arc<ProviderSchema>, TestError> {
        let resp = check_response(self.provider.get_schema().await)?;
        resp.schema
            .ok_or_else(|| TestError::Diagnostics(Vec::new()))
    }

    /// The state type of a resource.
    pub async fn state_type(&self, resource_type: &str) -> Result<Type, TestError> {
        let schema = self.schema().await?;
        schema
            .resources
            .get(resource_type)
            .map(|s| s.block.implied_type())
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()).into())
    }

    /// Get the list of resource type names.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    /// Get the list of data source type names.
    pub fn data_source_types(&self) -> Vec<String> {
        self.provider.metadata().data_sources
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Apply provider defaults and return the prepared configuration.
    pub async fn prepare_provider_config(&self, config: Value) -> Result<Value, TestError> {
        let resp = check_response(self.provider.prepare_provider_config(config).await?)?;
        resp.prepared_config
            .ok_or_else(|| TestError::Diagnostics(Vec::new()))
    }

    /// Configure the provider.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .configure(ConfigureRequest::new(config))
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Stop the provider.
    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource configuration.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_type_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Upgrade flatmap state written at `version`.
    pub async fn upgrade_flatmap(
        &self,
        resource_type: &str,
        version: u64,
        attributes: Flatmap,
    ) -> Result<Value, TestError> {
        let req = UpgradeResourceStateRequest::flatmap(resource_type, version, attributes);
        self.upgrade(req).await
    }

    /// Upgrade JSON state written at `version`.
    pub async fn upgrade_json(
        &self,
        resource_type: &str,
        version: u64,
        raw: impl Into<Vec<u8>>,
    ) -> Result<Value, TestError> {
        let req = UpgradeResourceStateRequest::json(resource_type, version, raw);
        self.upgrade(req).await
    }

    async fn upgrade(&self, req: UpgradeResourceStateRequest) -> Result<Value, TestError> {
        let resource_type = req.type_name.clone();
        let resp = check_response(self.provider.upgrade_resource_state(req).await?)?;
        match resp.upgraded_state {
            Some(state) => Ok(state),
            None => Ok(Value::null(self.state_type(&resource_type).await?)),
        }
    }

    /// Plan a resource creation (no prior state).
    pub async fn plan_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<PlanResourceChangeResponse, TestError> {
        let prior = Value::null(self.state_type(resource_type).await?);
        self.plan(resource_type, prior, config.clone(), config, Vec::new())
            .await
    }

    /// Plan an update of an existing resource.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        config: Value,
    ) -> Result<PlanResourceChangeResponse, TestError> {
        self.plan(resource_type, prior_state, config.clone(), config, Vec::new())
            .await
    }

    /// Plan the destruction of a resource.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResourceChangeResponse, TestError> {
        let null = Value::null(self.state_type(resource_type).await?);
        self.plan(resource_type, prior_state, null.clone(), null, Vec::new())
            .await
    }

    /// Full plan operation with explicit proposed state and config.
    pub async fn plan(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
        config: Value,
        prior_private: Vec<u8>,
    ) -> Result<PlanResourceChangeResponse, TestError> {
        let req = PlanResourceChangeRequest::new(resource_type, prior_state, proposed_state, config)
            .with_prior_private(prior_private);
        check_response(self.provider.plan_resource_change(req).await?)
    }

    /// Apply a plan produced by one of the `plan_*` methods.
    pub async fn apply(
        &self,
        resource_type: &str,
        prior_state: Value,
        plan: PlanResourceChangeResponse,
        config: Value,
    ) -> Result<ApplyResourceChangeResponse, TestError> {
        let planned = plan
            .planned_state
            .ok_or_else(|| TestError::Diagnostics(Vec::new()))?;
        let req = ApplyResourceChangeRequest::new(resource_type, prior_state, planned, config)
            .with_planned_private(plan.planned_private);
        check_response(self.provider.apply_resource_change(req).await?)
    }

    /// Read the current state of a resource. Null if it no longer exists.
    pub async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
        private: Vec<u8>,
    ) -> Result<Value, TestError> {
        let req = ReadResourceRequest::new(resource_type, current_state).with_private(private);
        let resp = check_response(self.provider.read_resource(req).await?)?;
        resp.new_state
            .ok_or_else(|| TestError::Diagnostics(Vec::new()))
    }

    /// Import an existing resource.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, TestError> {
        let resp = check_response(
            self.provider
                .import_resource_state(resource_type, id)
                .await?,
        )?;
        Ok(resp.imported_resources)
    }

    // =========================================================================
    // Data Source Operations
    // =========================================================================

    /// Validate a data source configuration.
    pub async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_data_source_config(data_source_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Read data from a data source.
    pub async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, TestError> {
        let resp = check_response(
            self.provider
                .read_data_source(data_source_type, config)
                .await?,
        )?;
        resp.state
            .ok_or_else(|| TestError::Diagnostics(Vec::new()))
    }

    // =========================================================================
    // Lifecycle Helpers
    // =========================================================================

    /// Run a full create lifecycle: plan → apply → read.
    ///
    /// Returns the final state after read.
    pub async fn lifecycle_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Value, TestError> {
        let prior = Value::null(self.state_type(resource_type).await?);
        let plan = self.plan_create(resource_type, config.clone()).await?;
        let applied = self
            .apply(resource_type, prior, plan, config)
            .await?;

        let state = applied
            .new_state
            .ok_or_else(|| TestError::Diagnostics(Vec::new()))?;
        self.read(resource_type, state, applied.private).await
    }

    /// Run a full update lifecycle: plan → apply → read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        config: Value,
    ) -> Result<Value, TestError> {
        let plan = self
            .plan_update(resource_type, prior_state.clone(), config.clone())
            .await?;
        let applied = self
            .apply(resource_type, prior_state, plan, config)
            .await?;

        let state = applied
            .new_state
            .ok_or_else(|| TestError::Diagnostics(Vec::new()))?;
        self.read(resource_type, state, applied.private).await
    }

    /// Run a full delete lifecycle: plan → apply.
    ///
    /// Returns the state after apply, which is null when the legacy
    /// provider destroyed the instance.
    pub async fn lifecycle_delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Value, TestError> {
        let plan = self
            .plan_delete(resource_type, current_state.clone())
            .await?;
        let config = Value::null(self.state_type(resource_type).await?);
        let applied = self
            .apply(resource_type, current_state, plan, config)
            .await?;

        applied
            .new_state
            .ok_or_else(|| TestError::Diagnostics(Vec::new()))
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation failed with diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed with a provider error.
    Provider(ProviderError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) if diags.is_empty() => {
                write!(f, "Operation returned no value")
            },
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            },
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

fn check_response<R: WithDiagnostics>(resp: R) -> Result<R, TestError> {
    if resp.has_errors() {
        return Err(TestError::Diagnostics(errors_of(resp.diagnostics())));
    }
    Ok(resp)
}

/// Check diagnostics and return an error if there are any errors.
fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors = errors_of(&diagnostics);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

fn errors_of(diagnostics: &[Diagnostic]) -> Vec<Diagnostic> {
    diagnostics
        .iter()
        .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
        .cloned()
        .collect()
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that a plan destroys the resource.
///
/// # Panics
///
/// Panics if the planned state is not null.
pub fn assert_plan_destroys(plan: &PlanResourceChangeResponse) {
    assert!(
        plan.planned_state.as_ref().is_some_and(Value::is_null),
        "Expected plan to destroy, but planned state is {:?}",
        plan.planned_state
    );
}

/// Assert that a plan requires resource replacement.
///
/// # Panics
///
/// Panics if the plan does not require replacement.
pub fn assert_plan_replaces(plan: &PlanResourceChangeResponse) {
    assert!(
        !plan.requires_replace.is_empty(),
        "Expected plan to require replacement, but it does not"
    );
}

/// Assert that a plan does not require resource replacement.
///
/// # Panics
///
/// Panics if the plan requires replacement.
pub fn assert_plan_updates_in_place(plan: &PlanResourceChangeResponse) {
    assert!(
        plan.requires_replace.is_empty(),
        "Expected plan to update in place, but it requires replacement of {:?}",
        plan.requires_replace
    );
}

/// Assert that a top-level attribute is unknown in the planned state.
///
/// # Panics
///
/// Panics if the attribute is absent or known.
pub fn assert_plan_unknown(plan: &PlanResourceChangeResponse, attribute: &str) {
    let value = plan
        .planned_state
        .as_ref()
        .and_then(|state| state.get_attr(attribute));
    assert!(
        value.is_some_and(|v| !v.is_known()),
        "Expected '{}' to be unknown after plan, but got {:?}",
        attribute,
        value
    );
}

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors = errors_of(diagnostics);
    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain at least one error.
///
/// # Panics
///
/// Panics if there are no error diagnostics.
pub fn assert_has_errors(diagnostics: &[Diagnostic]) {
    assert!(
        !errors_of(diagnostics).is_empty(),
        "Expected at least one error, but got none"
    );
}

/// Assert that diagnostics contain an error with the given summary substring.
///
/// # Panics
///
/// Panics if no error diagnostic contains the given substring.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let errors = errors_of(diagnostics);
    assert!(
        errors.iter().any(|d| d.summary.contains(substring)),
        "Expected an error containing '{}', but no matching error found. Errors: {:?}",
        substring,
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::flatmap::{flatmap_from_value, UNKNOWN_VALUE};
    use crate::legacy::{
        InstanceState, LegacyAttribute, LegacyResource, LegacySchema, PlannedState,
        ResourceConfig, ValueKind,
    };

    const BUCKET: &str = "example_bucket";

    // An in-memory bucket store behind the legacy interface
    struct BucketProvider {
        schema: LegacySchema,
        buckets: Mutex<BTreeMap<String, InstanceState>>,
    }

    impl BucketProvider {
        fn new() -> Self {
            let bucket = LegacyResource::new()
                .with_attribute("name", LegacyAttribute::new(ValueKind::String).required())
                .with_attribute(
                    "versioning",
                    LegacyAttribute::new(ValueKind::Bool).optional(),
                )
                .with_attribute("arn", LegacyAttribute::new(ValueKind::String).computed());

            Self {
                schema: LegacySchema::new()
                    .with_provider_attribute(
                        "endpoint",
                        LegacyAttribute::new(ValueKind::String)
                            .optional()
                            .with_default(json!("http://localhost:9000")),
                    )
                    .with_resource(BUCKET, bucket),
                buckets: Mutex::new(BTreeMap::new()),
            }
        }
    }

    #[async_trait]
    impl LegacyProvider for BucketProvider {
        fn schema(&self) -> &LegacySchema {
            &self.schema
        }

        async fn configure(&self, _config: &ResourceConfig, _engine_version: &str) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn refresh(
            &self,
            _type_name: &str,
            state: InstanceState,
        ) -> Result<Option<InstanceState>, ProviderError> {
            Ok(self.buckets.lock().unwrap().get(&state.id).cloned())
        }

        async fn plan(
            &self,
            _type_name: &str,
            prior: Option<&InstanceState>,
            config: &ResourceConfig,
        ) -> Result<PlannedState, ProviderError> {
            let mut attributes = flatmap_from_value(config.value());
            for computed in ["id", "arn"] {
                let value = prior
                    .and_then(|p| p.attributes.get(computed).cloned())
                    .unwrap_or_else(|| UNKNOWN_VALUE.to_string());
                attributes.insert(computed.to_string(), value);
            }

            let requires_replace = match prior {
                Some(p) if p.attributes.get("name") != attributes.get("name") => {
                    vec!["name".to_string()]
                },
                _ => Vec::new(),
            };

            Ok(PlannedState {
                attributes,
                requires_replace,
                ..Default::default()
            })
        }

        async fn apply(
            &self,
            _type_name: &str,
            prior: Option<&InstanceState>,
            planned: Option<&InstanceState>,
        ) -> Result<Option<InstanceState>, ProviderError> {
            let mut buckets = self.buckets.lock().unwrap();
            if let Some(prior) = prior {
                buckets.remove(&prior.id);
            }
            let Some(planned) = planned else {
                return Ok(None);
            };

            let name = planned.attributes.get("name").cloned().unwrap_or_default();
            let mut state = planned.clone();
            state.id = format!("bucket-{}", name);
            state.attributes.insert("id".to_string(), state.id.clone());
            state
                .attributes
                .insert("arn".to_string(), format!("arn:bucket:{}", name));
            buckets.insert(state.id.clone(), state.clone());
            Ok(Some(state))
        }

        async fn import(&self, _type_name: &str, id: &str) -> Result<Vec<InstanceState>, ProviderError> {
            match self.buckets.lock().unwrap().get(id) {
                Some(state) => Ok(vec![state.clone()]),
                None => Err(ProviderError::Legacy(format!("bucket {} not found", id))),
            }
        }
    }

    fn config(name: &str) -> Value {
        Value::object([("name", Value::string(name))])
    }

    #[tokio::test]
    async fn test_tester_schema() {
        let tester = ProviderTester::new(BucketProvider::new());
        let schema = tester.schema().await.unwrap();
        assert!(schema.resources.contains_key(BUCKET));
        assert_eq!(tester.resource_types(), vec![BUCKET.to_string()]);
        assert!(tester.data_source_types().is_empty());
    }

    #[tokio::test]
    async fn test_tester_prepare_and_configure() {
        let tester = ProviderTester::new(BucketProvider::new());
        let prepared = tester
            .prepare_provider_config(Value::object([("endpoint", Value::null(Type::String))]))
            .await
            .unwrap();
        assert_eq!(
            prepared.get_attr("endpoint"),
            Some(&Value::string("http://localhost:9000"))
        );
        tester.configure(prepared).await.unwrap();
    }

    #[tokio::test]
    async fn test_tester_plan_create() {
        let tester = ProviderTester::new(BucketProvider::new());
        let plan = tester.plan_create(BUCKET, config("logs")).await.unwrap();

        assert_plan_unknown(&plan, "id");
        assert_plan_unknown(&plan, "arn");
        assert_plan_updates_in_place(&plan);
    }

    #[tokio::test]
    async fn test_tester_lifecycle() {
        let tester = ProviderTester::new(BucketProvider::new());

        let created = tester.lifecycle_create(BUCKET, config("logs")).await.unwrap();
        assert_eq!(created.get_attr("id"), Some(&Value::string("bucket-logs")));
        assert_eq!(created.get_attr("arn"), Some(&Value::string("arn:bucket:logs")));
        assert_eq!(created.get_attr("versioning"), Some(&Value::null(Type::Bool)));

        let plan = tester
            .plan_update(BUCKET, created.clone(), config("audit"))
            .await
            .unwrap();
        assert_plan_replaces(&plan);

        let imported = tester.import_resource(BUCKET, "bucket-logs").await.unwrap();
        assert_eq!(imported[0].state, created);

        let plan = tester.plan_delete(BUCKET, created.clone()).await.unwrap();
        assert_plan_destroys(&plan);

        let destroyed = tester.lifecycle_delete(BUCKET, created.clone()).await.unwrap();
        assert!(destroyed.is_null());

        let gone = tester.read(BUCKET, created, Vec::new()).await.unwrap();
        assert!(gone.is_null());
    }

    #[tokio::test]
    async fn test_tester_reports_diagnostics() {
        let tester = ProviderTester::new(BucketProvider::new());

        let err = tester.import_resource(BUCKET, "missing").await.unwrap_err();
        assert!(matches!(&err, TestError::Diagnostics(diags) if diags.len() == 1));
        assert!(err.to_string().contains("bucket missing not found"));

        let err = tester
            .validate_resource_config("example_unknown", config("logs"))
            .await
            .unwrap_err();
        assert!(matches!(err, TestError::Provider(ProviderError::UnknownResource(_))));
    }

    #[test]
    fn test_tester_upgrade_blocking() {
        let tester = ProviderTester::new(BucketProvider::new());
        let state = tokio_test::block_on(tester.upgrade_json(
            BUCKET,
            0,
            r#"{"id":"bucket-logs","name":"logs","region":"eu-west-1"}"#,
        ))
        .unwrap();

        assert_eq!(state.get_attr("name"), Some(&Value::string("logs")));
        assert_eq!(state.get_attr("region"), None);
        assert_eq!(state.get_attr("arn"), Some(&Value::null(Type::String)));
    }

    #[test]
    fn test_assert_no_errors() {
        let diagnostics = vec![Diagnostic::warning("Just a warning")];
        assert_no_errors(&diagnostics);
    }

    #[test]
    #[should_panic(expected = "Expected no errors")]
    fn test_assert_no_errors_fails() {
        let diagnostics = vec![Diagnostic::error("An error")];
        assert_no_errors(&diagnostics);
    }

    #[test]
    fn test_assert_has_errors() {
        let diagnostics = vec![Diagnostic::error("An error")];
        assert_has_errors(&diagnostics);
    }

    #[test]
    fn test_assert_error_contains() {
        let diagnostics = vec![Diagnostic::error("Invalid configuration value")];
        assert_error_contains(&diagnostics, "Invalid");
        assert_error_contains(&diagnostics, "configuration");
    }

    #[test]
    #[should_panic(expected = "to be unknown after plan")]
    fn test_assert_plan_unknown_fails() {
        let plan = PlanResourceChangeResponse {
            planned_state: Some(Value::object([("id", Value::string("b-1"))])),
            ..Default::default()
        };
        assert_plan_unknown(&plan, "id");
    }

    #[test]
    fn test_test_error_display() {
        let err = TestError::Diagnostics(vec![
            Diagnostic::error("First error").with_attribute("field1"),
            Diagnostic::error("Second error").with_detail("More info"),
        ]);

        let display = format!("{}", err);
        assert!(display.contains("First error"));
        assert!(display.contains("Second error"));
        assert!(display.contains("field1"));
        assert!(display.contains("More info"));
    }
}
