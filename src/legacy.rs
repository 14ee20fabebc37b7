//! The boundary with a legacy, flatmap-based provider plugin.
//!
//! Legacy plugins describe their configuration with loosely-typed attribute
//! definitions ([`LegacyAttribute`]) and exchange state as string-keyed
//! flatmaps ([`InstanceState`]). This module defines those shapes, the
//! [`LegacyProvider`] trait a plugin implements, and the translation of the
//! legacy definitions into typed schema [`Block`]s.
//!
//! # Example
//!
//! ```
//! use hemmer_legacy_provider::legacy::{LegacyAttribute, LegacyResource, ValueKind};
//!
//! let server = LegacyResource::new()
//!     .with_attribute("name", LegacyAttribute::new(ValueKind::String).required())
//!     .with_attribute(
//!         "ports",
//!         LegacyAttribute::new(ValueKind::List)
//!             .optional()
//!             .with_elem_schema(LegacyAttribute::new(ValueKind::Int)),
//!     );
//!
//! let block = server.core_config_schema("timeouts").unwrap();
//! assert!(block.attributes.contains_key("id"));
//! ```

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::flatmap::Flatmap;
use crate::schema::{Attribute, AttributeFlags, Block, Diagnostic, NestedBlock, ProviderSchema, Schema};
use crate::value::{Type, Value};

/// The default name of the reserved timeouts block.
pub const TIMEOUTS_CONFIG_KEY: &str = "timeouts";

/// A JSON object, as used for upgraded state and instance metadata.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// The opaque client value a legacy provider builds during `configure`.
pub type ProviderMeta = Arc<dyn Any + Send + Sync>;

/// A legacy `MigrateState` function: rewrites a flatmap state written at the
/// given schema version.
pub type MigrateStateFn = Arc<
    dyn Fn(u64, InstanceState, Option<&(dyn Any + Send + Sync)>) -> Result<InstanceState, ProviderError>
        + Send
        + Sync,
>;

/// A state upgrade function: advances a JSON state by one schema version.
pub type StateUpgradeFn = Arc<
    dyn Fn(JsonMap, Option<&(dyn Any + Send + Sync)>) -> Result<JsonMap, ProviderError> + Send + Sync,
>;

/// The kind of value a legacy attribute holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// A string.
    String,
    /// An integer.
    Int,
    /// A floating point number.
    Float,
    /// A boolean.
    Bool,
    /// An ordered list, see [`LegacyAttribute::elem`].
    List,
    /// An unordered set, see [`LegacyAttribute::elem`].
    Set,
    /// A string-keyed map, see [`LegacyAttribute::elem`].
    Map,
}

impl ValueKind {
    fn is_primitive(self) -> bool {
        matches!(
            self,
            ValueKind::String | ValueKind::Int | ValueKind::Float | ValueKind::Bool
        )
    }
}

/// The element of a legacy collection attribute.
#[derive(Debug, Clone)]
pub enum Elem {
    /// Every element is a value described by another attribute definition.
    Schema(Box<LegacyAttribute>),
    /// Every element is a nested resource, which becomes a nested block.
    Resource(Box<LegacyResource>),
}

/// A legacy attribute definition.
#[derive(Debug, Clone)]
pub struct LegacyAttribute {
    pub kind: ValueKind,
    pub elem: Option<Elem>,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub sensitive: bool,
    /// Default value, in the plugin's loose JSON form.
    pub default: Option<serde_json::Value>,
    pub deprecated: Option<String>,
    pub removed: Option<String>,
    pub min_items: u32,
    pub max_items: u32,
    pub description: Option<String>,
}

impl LegacyAttribute {
    /// Create an attribute of the given kind with no flags set.
    pub fn new(kind: ValueKind) -> Self {
        Self {
            kind,
            elem: None,
            required: false,
            optional: false,
            computed: false,
            sensitive: false,
            default: None,
            deprecated: None,
            removed: None,
            min_items: 0,
            max_items: 0,
            description: None,
        }
    }

    /// Mark the attribute as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Mark the attribute as optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Mark the attribute as computed.
    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    /// Mark the attribute as sensitive.
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Set the element definition of a collection attribute.
    pub fn with_elem_schema(mut self, elem: LegacyAttribute) -> Self {
        self.elem = Some(Elem::Schema(Box::new(elem)));
        self
    }

    /// Set a nested resource as the element of a list or set attribute.
    pub fn with_elem_resource(mut self, elem: LegacyResource) -> Self {
        self.elem = Some(Elem::Resource(Box::new(elem)));
        self
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_deprecated(mut self, message: impl Into<String>) -> Self {
        self.deprecated = Some(message.into());
        self
    }

    pub fn with_removed(mut self, message: impl Into<String>) -> Self {
        self.removed = Some(message.into());
        self
    }

    pub fn with_min_items(mut self, min: u32) -> Self {
        self.min_items = min;
        self
    }

    pub fn with_max_items(mut self, max: u32) -> Self {
        self.max_items = max;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Whether the attribute is deprecated or removed and should not be
    /// populated from its default.
    pub fn is_retired(&self) -> bool {
        self.deprecated.is_some() || self.removed.is_some()
    }

    fn validate(&self, name: &str) -> Result<(), ProviderError> {
        let fail = |msg: &str| Err(ProviderError::Schema(format!("{}: {}", name, msg)));

        if self.required && self.computed {
            return fail("Required and Computed are mutually exclusive");
        }
        if self.required && self.default.is_some() {
            return fail("Default must be nil if Required");
        }
        if !self.required && !self.optional && !self.computed {
            return fail("one of Required, Optional or Computed must be set");
        }
        if self.kind.is_primitive() && self.elem.is_some() {
            return fail("Elem may only be set for list, set and map attributes");
        }
        match (&self.kind, &self.elem) {
            (ValueKind::List | ValueKind::Set, None) => fail("Elem must be set for lists and sets"),
            (ValueKind::Map, Some(Elem::Resource(_))) => {
                fail("a map Elem must be an attribute definition")
            },
            _ => Ok(()),
        }
    }

    /// The typed value type this attribute holds.
    fn core_config_type(&self, name: &str) -> Result<Type, ProviderError> {
        self.validate(name)?;

        let elem_type = match &self.elem {
            Some(Elem::Schema(attr)) => Some(attr.element_type(name)?),
            Some(Elem::Resource(res)) => Some(res.nested_block(name)?.implied_type()),
            None => None,
        };

        Ok(match self.kind {
            ValueKind::String => Type::String,
            ValueKind::Int | ValueKind::Float => Type::Number,
            ValueKind::Bool => Type::Bool,
            ValueKind::List => Type::list(elem_type.unwrap_or(Type::String)),
            ValueKind::Set => Type::set(elem_type.unwrap_or(Type::String)),
            ValueKind::Map => Type::map(elem_type.unwrap_or(Type::String)),
        })
    }

    /// Element definitions carry no flags of their own, so they are typed
    /// without the flag checks applied to top-level attributes.
    fn element_type(&self, parent: &str) -> Result<Type, ProviderError> {
        let mut elem = self.clone();
        elem.optional = true;
        elem.required = false;
        elem.computed = false;
        elem.default = None;
        elem.core_config_type(parent)
    }

    fn core_config_attribute(&self, name: &str) -> Result<Attribute, ProviderError> {
        let attr_type = self.core_config_type(name)?;
        Ok(Attribute {
            attr_type,
            flags: AttributeFlags {
                required: self.required,
                optional: self.optional,
                computed: self.computed,
                sensitive: self.sensitive,
            },
            description: self.description.clone(),
            default: self.default.clone(),
            deprecated: self.deprecated.clone(),
            removed: self.removed.clone(),
        })
    }

    fn core_config_nested_block(&self, name: &str, res: &LegacyResource) -> Result<NestedBlock, ProviderError> {
        let block = res.nested_block(name)?;
        let nested = match self.kind {
            ValueKind::Set => NestedBlock::set(block),
            _ => NestedBlock::list(block),
        };
        Ok(nested
            .with_min_items(self.min_items)
            .with_max_items(self.max_items))
    }
}

/// Per-operation timeouts declared by a legacy resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceTimeout {
    pub create: Option<Duration>,
    pub read: Option<Duration>,
    pub update: Option<Duration>,
    pub delete: Option<Duration>,
    pub default: Option<Duration>,
}

impl ResourceTimeout {
    fn declared(&self) -> impl Iterator<Item = &'static str> + '_ {
        [
            ("create", self.create),
            ("read", self.read),
            ("update", self.update),
            ("delete", self.delete),
            ("default", self.default),
        ]
        .into_iter()
        .filter(|(_, timeout)| timeout.is_some())
        .map(|(name, _)| name)
    }
}

/// One step of a resource's JSON state upgrade chain.
#[derive(Clone)]
pub struct StateUpgrader {
    /// The schema version this upgrader reads.
    pub version: u64,
    /// The object type of state at `version`.
    pub ty: Type,
    /// Produces state for `version + 1`.
    pub upgrade: StateUpgradeFn,
}

impl StateUpgrader {
    pub fn new(
        version: u64,
        ty: Type,
        upgrade: impl Fn(JsonMap, Option<&(dyn Any + Send + Sync)>) -> Result<JsonMap, ProviderError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            version,
            ty,
            upgrade: Arc::new(upgrade),
        }
    }
}

impl fmt::Debug for StateUpgrader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateUpgrader")
            .field("version", &self.version)
            .field("ty", &self.ty)
            .finish_non_exhaustive()
    }
}

/// A legacy resource or data source definition.
#[derive(Clone, Default)]
pub struct LegacyResource {
    pub schema: BTreeMap<String, LegacyAttribute>,
    /// Current schema version of the resource's state.
    pub schema_version: u64,
    /// Migration for flatmap states older than the first state upgrader.
    pub migrate_state: Option<MigrateStateFn>,
    /// JSON upgrade chain, in strictly increasing version order.
    pub state_upgraders: Vec<StateUpgrader>,
    pub timeouts: Option<ResourceTimeout>,
    pub description: Option<String>,
}

impl LegacyResource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, name: impl Into<String>, attr: LegacyAttribute) -> Self {
        self.schema.insert(name.into(), attr);
        self
    }

    pub fn with_schema_version(mut self, version: u64) -> Self {
        self.schema_version = version;
        self
    }

    pub fn with_migrate_state(
        mut self,
        migrate: impl Fn(u64, InstanceState, Option<&(dyn Any + Send + Sync)>) -> Result<InstanceState, ProviderError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.migrate_state = Some(Arc::new(migrate));
        self
    }

    pub fn with_state_upgrader(mut self, upgrader: StateUpgrader) -> Self {
        self.state_upgraders.push(upgrader);
        self
    }

    pub fn with_timeouts(mut self, timeouts: ResourceTimeout) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The schema block of this resource at the top level of a provider.
    ///
    /// On top of the declared attributes, the block carries a computed `id`
    /// attribute (unless one is declared) and, when the resource declares
    /// timeouts, a single nested block named `timeouts_key`.
    ///
    /// State upgraders must be declared with strictly increasing versions.
    pub fn core_config_schema(&self, timeouts_key: &str) -> Result<Block, ProviderError> {
        if let Some(pair) = self
            .state_upgraders
            .windows(2)
            .find(|pair| pair[1].version <= pair[0].version)
        {
            return Err(ProviderError::Schema(format!(
                "state upgrader for version {} declared after version {}; versions must strictly increase",
                pair[1].version, pair[0].version
            )));
        }

        let mut block = core_config_schema(&self.schema)?;

        block
            .attributes
            .entry("id".to_string())
            .or_insert_with(|| Attribute::new(Type::String, AttributeFlags::optional_computed()));

        if let Some(timeouts) = &self.timeouts {
            let mut timeouts_block = Block::new();
            for op in timeouts.declared() {
                timeouts_block = timeouts_block.with_attribute(op, Attribute::optional_string());
            }
            block
                .blocks
                .insert(timeouts_key.to_string(), NestedBlock::single(timeouts_block));
        }

        block.description = self.description.clone();
        Ok(block)
    }

    fn nested_block(&self, parent: &str) -> Result<Block, ProviderError> {
        core_config_schema(&self.schema).map_err(|e| match e {
            ProviderError::Schema(msg) => ProviderError::Schema(format!("{}.{}", parent, msg)),
            other => other,
        })
    }
}

impl fmt::Debug for LegacyResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LegacyResource")
            .field("schema", &self.schema)
            .field("schema_version", &self.schema_version)
            .field("migrate_state", &self.migrate_state.is_some())
            .field("state_upgraders", &self.state_upgraders)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

/// Translate a legacy attribute map into a schema block.
///
/// Collections of nested resources become nested blocks, unless the
/// attribute is computed-only, in which case it never appears in
/// configuration and is kept as a plain attribute.
pub fn core_config_schema(schema: &BTreeMap<String, LegacyAttribute>) -> Result<Block, ProviderError> {
    let mut block = Block::new();

    for (name, attr) in schema {
        match &attr.elem {
            Some(Elem::Resource(res)) if !(attr.computed && !attr.optional) => {
                attr.validate(name)?;
                block
                    .blocks
                    .insert(name.clone(), attr.core_config_nested_block(name, res)?);
            },
            _ => {
                block
                    .attributes
                    .insert(name.clone(), attr.core_config_attribute(name)?);
            },
        }
    }

    Ok(block)
}

/// Everything a legacy provider declares.
#[derive(Debug, Clone, Default)]
pub struct LegacySchema {
    /// Provider configuration attributes.
    pub provider: BTreeMap<String, LegacyAttribute>,
    pub resources: BTreeMap<String, LegacyResource>,
    pub data_sources: BTreeMap<String, LegacyResource>,
}

impl LegacySchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider_attribute(mut self, name: impl Into<String>, attr: LegacyAttribute) -> Self {
        self.provider.insert(name.into(), attr);
        self
    }

    pub fn with_resource(mut self, name: impl Into<String>, resource: LegacyResource) -> Self {
        self.resources.insert(name.into(), resource);
        self
    }

    pub fn with_data_source(mut self, name: impl Into<String>, data_source: LegacyResource) -> Self {
        self.data_sources.insert(name.into(), data_source);
        self
    }

    /// Translate every declaration into a typed [`ProviderSchema`].
    pub fn core_config_schema(&self, timeouts_key: &str) -> Result<ProviderSchema, ProviderError> {
        let mut schema = ProviderSchema::new().with_provider_config(Schema {
            version: 0,
            block: core_config_schema(&self.provider)?,
        });

        for (name, res) in &self.resources {
            let block = res
                .core_config_schema(timeouts_key)
                .map_err(|e| prefix_schema_error(name, e))?;
            schema = schema.with_resource(
                name,
                Schema {
                    version: res.schema_version,
                    block,
                },
            );
        }

        for (name, data) in &self.data_sources {
            let block = data
                .core_config_schema(timeouts_key)
                .map_err(|e| prefix_schema_error(name, e))?;
            schema = schema.with_data_source(name, Schema { version: 0, block });
        }

        Ok(schema)
    }
}

fn prefix_schema_error(type_name: &str, err: ProviderError) -> ProviderError {
    match err {
        ProviderError::Schema(msg) => ProviderError::Schema(format!("{}: {}", type_name, msg)),
        other => other,
    }
}

/// The legacy representation of a resource instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceState {
    pub id: String,
    pub attributes: Flatmap,
    /// Provider-private metadata, such as the stored schema version and
    /// timeouts.
    #[serde(default)]
    pub meta: JsonMap,
}

impl InstanceState {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Whether the instance is gone, which legacy plugins signal with an
    /// empty id.
    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }
}

/// The result of a legacy plan: the planned flatmap, with unknown computed
/// values marked by [`UNKNOWN_VALUE`](crate::flatmap::UNKNOWN_VALUE).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlannedState {
    pub attributes: Flatmap,
    /// Attribute paths whose change forces replacement.
    pub requires_replace: Vec<String>,
    pub meta: JsonMap,
}

/// Configuration as the legacy plugin sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceConfig {
    value: Value,
}

impl ResourceConfig {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    /// The full typed configuration.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// A configured, non-null top-level value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.value.get_attr(name).filter(|v| !v.is_null())
    }

    /// Whether the value is not known until apply.
    pub fn is_computed(&self, name: &str) -> bool {
        self.value
            .get_attr(name)
            .map(|v| !v.is_wholly_known())
            .unwrap_or(false)
    }
}

/// Warnings and errors returned by a legacy validate call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyValidation {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl LegacyValidation {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.errors.push(error.into());
        self
    }

    /// Warnings first, then errors; each message doubles as its detail.
    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        let warnings = self
            .warnings
            .into_iter()
            .map(|w| Diagnostic::warning(w.clone()).with_detail(w));
        let errors = self
            .errors
            .into_iter()
            .map(|e| Diagnostic::error(e.clone()).with_detail(e));
        warnings.chain(errors).collect()
    }
}

/// A provider plugin written against the legacy flatmap model.
///
/// Only the declarations, `configure` and `refresh` are mandatory; the
/// remaining operations default to no-ops or "not supported" errors.
#[async_trait]
pub trait LegacyProvider: Send + Sync + 'static {
    /// Declared provider, resource and data source definitions.
    fn schema(&self) -> &LegacySchema;

    /// The client built by `configure`, handed to migrations and upgraders.
    fn meta(&self) -> Option<ProviderMeta> {
        None
    }

    fn validate(&self, config: &ResourceConfig) -> LegacyValidation {
        let _ = config;
        LegacyValidation::ok()
    }

    fn validate_resource(&self, type_name: &str, config: &ResourceConfig) -> LegacyValidation {
        let _ = (type_name, config);
        LegacyValidation::ok()
    }

    fn validate_data_source(&self, type_name: &str, config: &ResourceConfig) -> LegacyValidation {
        let _ = (type_name, config);
        LegacyValidation::ok()
    }

    /// Configure the provider. `engine_version` is the version of the
    /// orchestration engine making the call.
    async fn configure(&self, config: &ResourceConfig, engine_version: &str) -> Result<(), ProviderError>;

    /// Signal in-flight operations to halt. Must not block on them.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Refresh an instance. `None` or an empty id means it no longer exists.
    async fn refresh(
        &self,
        type_name: &str,
        state: InstanceState,
    ) -> Result<Option<InstanceState>, ProviderError>;

    /// Plan a change from `prior` (absent on create) to `config`.
    async fn plan(
        &self,
        type_name: &str,
        prior: Option<&InstanceState>,
        config: &ResourceConfig,
    ) -> Result<PlannedState, ProviderError> {
        let _ = (prior, config);
        Err(ProviderError::Legacy(format!(
            "plan not supported for resource type: {}",
            type_name
        )))
    }

    /// Apply a planned change. `planned` is absent when destroying; returning
    /// `None` or an empty id means the instance is gone.
    async fn apply(
        &self,
        type_name: &str,
        prior: Option<&InstanceState>,
        planned: Option<&InstanceState>,
    ) -> Result<Option<InstanceState>, ProviderError> {
        let _ = (prior, planned);
        Err(ProviderError::Legacy(format!(
            "apply not supported for resource type: {}",
            type_name
        )))
    }

    /// Import existing instances by id.
    async fn import(&self, type_name: &str, id: &str) -> Result<Vec<InstanceState>, ProviderError> {
        let _ = id;
        Err(ProviderError::Legacy(format!(
            "import not supported for resource type: {}",
            type_name
        )))
    }

    async fn read_data_source(
        &self,
        type_name: &str,
        config: &ResourceConfig,
    ) -> Result<InstanceState, ProviderError> {
        let _ = config;
        Err(ProviderError::Legacy(format!(
            "read not supported for data source: {}",
            type_name
        )))
    }
}
