//! The typed provider facade over a legacy provider.
//!
//! [`Provider`] exposes the typed-value operations the orchestration engine
//! calls and translates each of them into calls on the wrapped
//! [`LegacyProvider`]. Values the legacy provider returns are decoded from
//! flatmaps and repaired with the reconciler before they are handed back.
//!
//! Problems caused by configuration, state or the legacy provider itself are
//! reported as diagnostics on the response. A request naming a resource or
//! data source type the provider never declared is an inconsistent request
//! and fails with [`ProviderError::UnknownResource`].

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error, info, instrument, warn};

use crate::config;
use crate::error::ProviderError;
use crate::flatmap::{flatmap_from_value, value_from_flatmap};
use crate::legacy::{InstanceState, JsonMap, LegacyProvider, LegacyResource, ResourceConfig, TIMEOUTS_CONFIG_KEY};
use crate::reconcile::{copy_timeout_values, normalize_null_values};
use crate::schema::{has_errors, Block, Diagnostic, ProviderSchema};
use crate::types::{
    ApplyResourceChangeRequest, ApplyResourceChangeResponse, ConfigureRequest, GetSchemaResponse,
    ImportResourceStateResponse, ImportedResource, PlanResourceChangeRequest,
    PlanResourceChangeResponse, PrepareProviderConfigResponse, ProviderMetadata,
    ReadDataSourceResponse, ReadResourceRequest, ReadResourceResponse,
    UpgradeResourceStateRequest, UpgradeResourceStateResponse,
};
use crate::upgrade;
use crate::validation::validate_config_nulls;
use crate::value::Value;

/// Unwrap a result, or record the error as a diagnostic on `$resp` and
/// return the response.
macro_rules! or_diagnose {
    ($resp:ident, $result:expr) => {
        match $result {
            Ok(value) => value,
            Err(err) => {
                let err: ProviderError = err.into();
                error!(error = %err, "operation failed");
                $resp.diagnostics.push(Diagnostic::from(err));
                return Ok($resp);
            },
        }
    };
}

/// Options for adapting a legacy provider.
#[derive(Debug, Clone)]
pub struct ShimOptions {
    /// Name of the reserved block holding resource timeouts.
    /// Default: `timeouts`.
    pub timeouts_key: String,
    /// Engine version reported to the legacy provider when a configure
    /// request does not carry one. Default: empty.
    pub engine_version: String,
}

impl Default for ShimOptions {
    fn default() -> Self {
        Self {
            timeouts_key: TIMEOUTS_CONFIG_KEY.to_string(),
            engine_version: String::new(),
        }
    }
}

impl ShimOptions {
    /// Create new shim options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the name of the reserved timeouts block.
    pub fn with_timeouts_key(mut self, key: impl Into<String>) -> Self {
        self.timeouts_key = key.into();
        self
    }

    /// Set the engine version reported to the legacy provider.
    pub fn with_engine_version(mut self, version: impl Into<String>) -> Self {
        self.engine_version = version.into();
        self
    }
}

/// A lazily computed, shared provider schema.
///
/// The first successful computation is stored and handed out to every later
/// caller. Computation happens under the lock, so concurrent first callers
/// never translate the schema twice. Failures are not stored.
#[derive(Debug, Default)]
pub struct SchemaCache {
    schema: Mutex<Option<Arc<ProviderSchema>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached schema, computing it with `init` if there is none yet.
    pub fn get_or_try_init<F>(&self, init: F) -> Result<Arc<ProviderSchema>, ProviderError>
    where
        F: FnOnce() -> Result<ProviderSchema, ProviderError>,
    {
        let mut cached = self.schema.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(schema) = cached.as_ref() {
            return Ok(Arc::clone(schema));
        }

        let schema = Arc::new(init()?);
        *cached = Some(Arc::clone(&schema));
        Ok(schema)
    }

    /// The cached schema, if it has been computed.
    pub fn get(&self) -> Option<Arc<ProviderSchema>> {
        self.schema
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// A typed provider backed by a legacy provider.
///
/// # Example
///
/// ```ignore
/// use hemmer_legacy_provider::{Provider, ShimOptions};
///
/// let provider = Provider::with_options(MyLegacyProvider::new(), ShimOptions::new());
/// let schema = provider.get_schema().await;
/// ```
pub struct Provider<P: LegacyProvider> {
    legacy: P,
    options: ShimOptions,
    schema: SchemaCache,
}

impl<P: LegacyProvider> Provider<P> {
    /// Wrap a legacy provider with default options.
    pub fn new(legacy: P) -> Self {
        Self::with_options(legacy, ShimOptions::default())
    }

    pub fn with_options(legacy: P, options: ShimOptions) -> Self {
        Self {
            legacy,
            options,
            schema: SchemaCache::new(),
        }
    }

    /// The wrapped legacy provider.
    pub fn legacy(&self) -> &P {
        &self.legacy
    }

    pub fn options(&self) -> &ShimOptions {
        &self.options
    }

    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Return the translated provider schema.
    #[instrument(skip(self), name = "shim.get_schema")]
    pub async fn get_schema(&self) -> GetSchemaResponse {
        match self.provider_schema() {
            Ok(schema) => {
                debug!(
                    resources = schema.resources.len(),
                    data_sources = schema.data_sources.len(),
                    "GetSchema completed"
                );
                GetSchemaResponse {
                    schema: Some(schema),
                    diagnostics: Vec::new(),
                }
            },
            Err(err) => {
                error!(error = %err, "legacy schema could not be translated");
                GetSchemaResponse {
                    schema: None,
                    diagnostics: vec![err.into()],
                }
            },
        }
    }

    /// Names of the declared resources and data sources.
    pub fn metadata(&self) -> ProviderMetadata {
        let schema = self.legacy.schema();
        ProviderMetadata {
            resources: schema.resources.keys().cloned().collect(),
            data_sources: schema.data_sources.keys().cloned().collect(),
        }
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Apply defaults to the provider configuration and validate it.
    #[instrument(skip(self, config), name = "shim.prepare_provider_config")]
    pub async fn prepare_provider_config(
        &self,
        config: Value,
    ) -> Result<PrepareProviderConfigResponse, ProviderError> {
        let schema = self.provider_schema()?;

        let mut resp = config::prepare_provider_config(
            &config,
            &self.legacy.schema().provider,
            &schema.provider.block,
        );

        if let Some(prepared) = &resp.prepared_config {
            let diags = self
                .legacy
                .validate(&ResourceConfig::new(prepared.clone()))
                .into_diagnostics();
            if has_errors(&diags) {
                resp.prepared_config = None;
            }
            resp.diagnostics.extend(diags);
        }

        log_outcome("PrepareProviderConfig", &resp.diagnostics);
        Ok(resp)
    }

    /// Configure the legacy provider.
    #[instrument(skip(self, req), name = "shim.configure")]
    pub async fn configure(&self, req: ConfigureRequest) -> Result<Vec<Diagnostic>, ProviderError> {
        let diagnostics = validate_config_nulls(&req.config, "");
        if !diagnostics.is_empty() {
            return Ok(diagnostics);
        }

        let engine_version = req
            .engine_version
            .as_deref()
            .unwrap_or(&self.options.engine_version);

        let config = ResourceConfig::new(req.config);
        match self.legacy.configure(&config, engine_version).await {
            Ok(()) => {
                info!("Configure completed successfully");
                Ok(Vec::new())
            },
            Err(err) => {
                error!(error = %err, "Configure failed");
                Ok(vec![err.into()])
            },
        }
    }

    /// Ask the legacy provider to halt in-flight operations.
    #[instrument(skip(self), name = "shim.stop")]
    pub async fn stop(&self) -> Result<(), ProviderError> {
        info!("Stop called");
        self.legacy.stop().await
    }

    /// Nothing to release: the legacy provider runs in process.
    pub async fn close(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource's configuration.
    #[instrument(skip(self, config), name = "shim.validate_resource_type_config")]
    pub async fn validate_resource_type_config(
        &self,
        type_name: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        self.resource_block(type_name)?;

        let diagnostics = validate_config_nulls(&config, "");
        if !diagnostics.is_empty() {
            return Ok(diagnostics);
        }

        let diagnostics = self
            .legacy
            .validate_resource(type_name, &ResourceConfig::new(config))
            .into_diagnostics();
        log_outcome("ValidateResourceTypeConfig", &diagnostics);
        Ok(diagnostics)
    }

    /// Upgrade stored state to the current schema of its resource type.
    #[instrument(
        skip(self, req),
        fields(type_name = %req.type_name, version = req.version),
        name = "shim.upgrade_resource_state"
    )]
    pub async fn upgrade_resource_state(
        &self,
        req: UpgradeResourceStateRequest,
    ) -> Result<UpgradeResourceStateResponse, ProviderError> {
        let block = self.resource_block(&req.type_name)?;
        let resource = self.legacy_resource(&req.type_name)?;
        let meta = self.legacy.meta();

        let resp = upgrade::upgrade_resource_state(
            req.version,
            req.raw_state.as_ref(),
            resource,
            &block,
            meta.as_deref(),
        );
        log_outcome("UpgradeResourceState", &resp.diagnostics);
        Ok(resp)
    }

    /// Refresh a resource and return its current state.
    #[instrument(skip(self, req), fields(type_name = %req.type_name), name = "shim.read_resource")]
    pub async fn read_resource(
        &self,
        req: ReadResourceRequest,
    ) -> Result<ReadResourceResponse, ProviderError> {
        let block = self.resource_block(&req.type_name)?;
        let ty = block.implied_type();

        let mut resp = ReadResourceResponse {
            private: req.private.clone(),
            ..Default::default()
        };

        let meta = or_diagnose!(resp, decode_private(&req.private));
        let state = instance_state_from_value(&req.prior_state, meta);

        let refreshed = or_diagnose!(resp, self.legacy.refresh(&req.type_name, state).await);
        let Some(mut refreshed) = refreshed.filter(|s| !s.is_empty()) else {
            debug!("resource no longer exists");
            resp.new_state = Some(Value::Null(ty));
            return Ok(resp);
        };

        refreshed
            .attributes
            .insert("id".to_string(), refreshed.id.clone());
        let new_state = or_diagnose!(resp, value_from_flatmap(&refreshed.attributes, &ty));
        let new_state = normalize_null_values(new_state, &req.prior_state, false);
        let new_state = copy_timeout_values(new_state, &req.prior_state, &self.options.timeouts_key);

        resp.new_state = Some(new_state);
        Ok(resp)
    }

    /// Plan the change from the prior to the proposed state.
    #[instrument(
        skip(self, req),
        fields(type_name = %req.type_name),
        name = "shim.plan_resource_change"
    )]
    pub async fn plan_resource_change(
        &self,
        req: PlanResourceChangeRequest,
    ) -> Result<PlanResourceChangeResponse, ProviderError> {
        let block = self.resource_block(&req.type_name)?;
        let ty = block.implied_type();

        let mut resp = PlanResourceChangeResponse::default();

        if req.proposed_new_state.is_null() {
            debug!("planning destroy");
            resp.planned_state = Some(Value::Null(ty));
            resp.planned_private = req.prior_private;
            return Ok(resp);
        }

        let prior = if req.prior_state.is_null() {
            None
        } else {
            let meta = or_diagnose!(resp, decode_private(&req.prior_private));
            Some(instance_state_from_value(&req.prior_state, meta))
        };

        let config = ResourceConfig::new(req.config);
        let planned = or_diagnose!(
            resp,
            self.legacy
                .plan(&req.type_name, prior.as_ref(), &config)
                .await
        );

        let planned_state = or_diagnose!(resp, value_from_flatmap(&planned.attributes, &ty));
        let planned_state = normalize_null_values(planned_state, &req.proposed_new_state, false);
        let planned_state = copy_timeout_values(
            planned_state,
            &req.proposed_new_state,
            &self.options.timeouts_key,
        );

        resp.planned_private = if planned.meta.is_empty() {
            req.prior_private
        } else {
            or_diagnose!(resp, encode_private(&planned.meta))
        };
        resp.requires_replace = planned.requires_replace;
        resp.planned_state = Some(planned_state);
        Ok(resp)
    }

    /// Apply a planned change and return the resulting state.
    #[instrument(
        skip(self, req),
        fields(type_name = %req.type_name),
        name = "shim.apply_resource_change"
    )]
    pub async fn apply_resource_change(
        &self,
        req: ApplyResourceChangeRequest,
    ) -> Result<ApplyResourceChangeResponse, ProviderError> {
        let block = self.resource_block(&req.type_name)?;
        let ty = block.implied_type();

        if req.prior_state.is_null() && req.planned_state.is_null() {
            return Err(ProviderError::InvalidRequest(format!(
                "apply for {} has neither prior nor planned state",
                req.type_name
            )));
        }

        let mut resp = ApplyResourceChangeResponse::default();

        let meta = or_diagnose!(resp, decode_private(&req.planned_private));
        let prior = (!req.prior_state.is_null())
            .then(|| instance_state_from_value(&req.prior_state, meta.clone()));
        let planned = (!req.planned_state.is_null())
            .then(|| instance_state_from_value(&req.planned_state, meta));

        let applied = or_diagnose!(
            resp,
            self.legacy
                .apply(&req.type_name, prior.as_ref(), planned.as_ref())
                .await
        );

        let Some(mut applied) = applied.filter(|s| !s.is_empty()) else {
            info!("resource destroyed");
            resp.new_state = Some(Value::Null(ty));
            return Ok(resp);
        };

        applied
            .attributes
            .insert("id".to_string(), applied.id.clone());
        let new_state = or_diagnose!(resp, value_from_flatmap(&applied.attributes, &ty));
        let new_state = normalize_null_values(new_state, &req.planned_state, true);
        let new_state = copy_timeout_values(new_state, &req.planned_state, &self.options.timeouts_key);

        resp.private = or_diagnose!(resp, encode_private(&applied.meta));
        resp.new_state = Some(new_state);
        info!("ApplyResourceChange completed");
        Ok(resp)
    }

    /// Import existing instances of a resource type by id.
    #[instrument(skip(self), name = "shim.import_resource_state")]
    pub async fn import_resource_state(
        &self,
        type_name: &str,
        id: &str,
    ) -> Result<ImportResourceStateResponse, ProviderError> {
        let block = self.resource_block(type_name)?;
        let ty = block.implied_type();

        let mut resp = ImportResourceStateResponse::default();

        let states = or_diagnose!(resp, self.legacy.import(type_name, id).await);
        for mut state in states {
            state.attributes.insert("id".to_string(), state.id.clone());
            let value = or_diagnose!(resp, value_from_flatmap(&state.attributes, &ty));
            let value = block.normalize_from_legacy(value);
            let value = copy_timeout_values(value, &Value::Null(ty.clone()), &self.options.timeouts_key);

            let mut imported = ImportedResource::new(type_name, value);
            imported.private = or_diagnose!(resp, encode_private(&state.meta));
            resp.imported_resources.push(imported);
        }

        info!(count = resp.imported_resources.len(), "ImportResourceState completed");
        Ok(resp)
    }

    // =========================================================================
    // Data Source Operations
    // =========================================================================

    /// Validate a data source's configuration.
    #[instrument(skip(self, config), name = "shim.validate_data_source_config")]
    pub async fn validate_data_source_config(
        &self,
        type_name: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        self.data_source_block(type_name)?;

        let diagnostics = validate_config_nulls(&config, "");
        if !diagnostics.is_empty() {
            return Ok(diagnostics);
        }

        let diagnostics = self
            .legacy
            .validate_data_source(type_name, &ResourceConfig::new(config))
            .into_diagnostics();
        log_outcome("ValidateDataSourceConfig", &diagnostics);
        Ok(diagnostics)
    }

    /// Read a data source.
    #[instrument(skip(self, config), name = "shim.read_data_source")]
    pub async fn read_data_source(
        &self,
        type_name: &str,
        config: Value,
    ) -> Result<ReadDataSourceResponse, ProviderError> {
        let block = self.data_source_block(type_name)?;
        let ty = block.implied_type();

        let mut resp = ReadDataSourceResponse {
            diagnostics: validate_config_nulls(&config, ""),
            ..Default::default()
        };
        if !resp.diagnostics.is_empty() {
            return Ok(resp);
        }

        let resource_config = ResourceConfig::new(config.clone());
        let mut state = or_diagnose!(
            resp,
            self.legacy
                .read_data_source(type_name, &resource_config)
                .await
        );

        state.attributes.insert("id".to_string(), state.id.clone());
        let new_state = or_diagnose!(resp, value_from_flatmap(&state.attributes, &ty));
        let new_state = normalize_null_values(new_state, &config, false);
        let new_state = copy_timeout_values(new_state, &config, &self.options.timeouts_key);

        resp.state = Some(new_state);
        Ok(resp)
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    fn provider_schema(&self) -> Result<Arc<ProviderSchema>, ProviderError> {
        self.schema.get_or_try_init(|| {
            debug!("translating legacy schema");
            self.legacy
                .schema()
                .core_config_schema(&self.options.timeouts_key)
        })
    }

    fn resource_block(&self, type_name: &str) -> Result<Block, ProviderError> {
        self.provider_schema()?
            .resources
            .get(type_name)
            .map(|schema| schema.block.clone())
            .ok_or_else(|| ProviderError::UnknownResource(type_name.to_string()))
    }

    fn data_source_block(&self, type_name: &str) -> Result<Block, ProviderError> {
        self.provider_schema()?
            .data_sources
            .get(type_name)
            .map(|schema| schema.block.clone())
            .ok_or_else(|| ProviderError::UnknownResource(format!("data source {}", type_name)))
    }

    fn legacy_resource(&self, type_name: &str) -> Result<&LegacyResource, ProviderError> {
        self.legacy
            .schema()
            .resources
            .get(type_name)
            .ok_or_else(|| ProviderError::UnknownResource(type_name.to_string()))
    }
}

/// The legacy form of a state value. The id is taken from the `id` attribute.
fn instance_state_from_value(value: &Value, meta: JsonMap) -> InstanceState {
    let attributes = flatmap_from_value(value);
    InstanceState {
        id: attributes.get("id").cloned().unwrap_or_default(),
        attributes,
        meta,
    }
}

fn decode_private(raw: &[u8]) -> Result<JsonMap, ProviderError> {
    if raw.is_empty() {
        return Ok(JsonMap::new());
    }
    Ok(serde_json::from_slice(raw)?)
}

fn encode_private(meta: &JsonMap) -> Result<Vec<u8>, ProviderError> {
    if meta.is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::to_vec(meta)?)
}

fn log_outcome(operation: &str, diagnostics: &[Diagnostic]) {
    if has_errors(diagnostics) {
        warn!(
            operation,
            diagnostics = diagnostics.len(),
            "completed with errors"
        );
    } else {
        debug!(operation, "completed successfully");
    }
}
