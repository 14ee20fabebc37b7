//! Schema types for describing provider and resource structure.
//!
//! Schemas describe the shape of provider configuration, resources, and data sources.
//! A [`Block`] knows the object [`Type`] it implies and can coerce a [`Value`]
//! into that shape, which is how configuration and upgraded state are brought
//! in line with the current schema.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::value::{convert, join_path, ConvertError, Type, Value};

/// Describes how an attribute can be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AttributeFlags {
    /// The attribute is required in configuration.
    pub required: bool,
    /// The attribute is optional in configuration.
    pub optional: bool,
    /// The attribute is computed by the provider (read-only).
    pub computed: bool,
    /// The attribute is sensitive and should be hidden in logs/UI.
    pub sensitive: bool,
}

impl AttributeFlags {
    /// Create flags for a required attribute.
    pub fn required() -> Self {
        Self {
            required: true,
            ..Default::default()
        }
    }

    /// Create flags for an optional attribute.
    pub fn optional() -> Self {
        Self {
            optional: true,
            ..Default::default()
        }
    }

    /// Create flags for a computed attribute (read-only, set by provider).
    pub fn computed() -> Self {
        Self {
            computed: true,
            ..Default::default()
        }
    }

    /// Create flags for an optional+computed attribute (can be set, but has default from provider).
    pub fn optional_computed() -> Self {
        Self {
            optional: true,
            computed: true,
            ..Default::default()
        }
    }

    /// Mark the attribute as sensitive.
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }
}

/// Describes a single attribute in a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// The type of the attribute.
    #[serde(rename = "type")]
    pub attr_type: Type,
    /// Flags describing how the attribute can be used.
    #[serde(flatten)]
    pub flags: AttributeFlags,
    /// Human-readable description of the attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Default value for the attribute (JSON-encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Deprecation message, if the attribute is deprecated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<String>,
    /// Removal message, if the attribute has been removed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed: Option<String>,
}

impl Attribute {
    /// Create a new attribute with the given type and flags.
    pub fn new(attr_type: Type, flags: AttributeFlags) -> Self {
        Self {
            attr_type,
            flags,
            description: None,
            default: None,
            deprecated: None,
            removed: None,
        }
    }

    /// Create a required string attribute.
    pub fn required_string() -> Self {
        Self::new(Type::String, AttributeFlags::required())
    }

    /// Create an optional string attribute.
    pub fn optional_string() -> Self {
        Self::new(Type::String, AttributeFlags::optional())
    }

    /// Create a computed string attribute.
    pub fn computed_string() -> Self {
        Self::new(Type::String, AttributeFlags::computed())
    }

    /// Create an optional number attribute.
    pub fn optional_number() -> Self {
        Self::new(Type::Number, AttributeFlags::optional())
    }

    /// Create an optional bool attribute.
    pub fn optional_bool() -> Self {
        Self::new(Type::Bool, AttributeFlags::optional())
    }

    /// Set the description for this attribute.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set a default value for this attribute.
    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Mark this attribute as deprecated.
    pub fn with_deprecated(mut self, message: impl Into<String>) -> Self {
        self.deprecated = Some(message.into());
        self
    }
}

/// The nesting mode for a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlockNestingMode {
    /// A single nested block (at most one).
    #[default]
    Single,
    /// A list of nested blocks (zero or more, ordered).
    List,
    /// A set of nested blocks (zero or more, unordered, unique).
    Set,
    /// A map of nested blocks keyed by string.
    Map,
}

/// A block of attributes and nested blocks.
///
/// Blocks are used for the root of every schema and for complex nested
/// structures that have their own set of attributes (e.g., `ingress` blocks
/// in a security group).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// The attributes within this block.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, Attribute>,
    /// Nested blocks within this block.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub blocks: HashMap<String, NestedBlock>,
    /// Human-readable description of the block.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Block {
    /// Create a new empty block.
    pub fn new() -> Self {
        Self {
            attributes: HashMap::new(),
            blocks: HashMap::new(),
            description: None,
        }
    }

    /// Add an attribute to this block.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }

    /// Add a nested block to this block.
    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlock) -> Self {
        self.blocks.insert(name.into(), block);
        self
    }

    /// Set the description for this block.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The object type implied by this block.
    ///
    /// Every attribute contributes its own type and every nested block
    /// contributes the type implied by its nesting mode.
    pub fn implied_type(&self) -> Type {
        let mut attrs: BTreeMap<String, Type> = self
            .attributes
            .iter()
            .map(|(name, attr)| (name.clone(), attr.attr_type.clone()))
            .collect();
        for (name, nested) in &self.blocks {
            attrs.insert(name.clone(), nested.implied_type());
        }
        Type::Object(attrs)
    }

    /// Coerce a value into the shape of this block.
    ///
    /// Absent attributes become null. Absent list, set and map blocks become
    /// empty collections, while absent single blocks become null. Members the
    /// block does not declare are rejected.
    pub fn coerce_value(&self, value: &Value) -> Result<Value, ConvertError> {
        coerce_block(self, value, "")
    }

    /// Replace null list, set and map blocks with empty collections.
    ///
    /// Legacy providers cannot tell an unconfigured block from an empty one,
    /// so state they produce has to be normalized before it is handed back.
    pub fn normalize_from_legacy(&self, value: Value) -> Value {
        let mut members = match value {
            Value::Object(members) => members,
            other => return other,
        };

        for (name, nested) in &self.blocks {
            let Some(current) = members.remove(name) else {
                members.insert(name.clone(), nested.empty_value());
                continue;
            };
            members.insert(name.clone(), nested.normalize_from_legacy(current));
        }

        Value::Object(members)
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::new()
    }
}

fn coerce_block(block: &Block, value: &Value, path: &str) -> Result<Value, ConvertError> {
    match value {
        Value::Null(_) => return Ok(Value::Null(block.implied_type())),
        Value::Unknown(_) => return Ok(Value::Unknown(block.implied_type())),
        _ => {},
    }

    let members = value.members().ok_or_else(|| {
        ConvertError::new(path, format!("an object is required, got {}", value.ty()))
    })?;

    if let Some(extra) = members
        .keys()
        .find(|k| !block.attributes.contains_key(*k) && !block.blocks.contains_key(*k))
    {
        return Err(ConvertError::new(
            join_path(path, extra),
            "unsupported argument",
        ));
    }

    let mut out = BTreeMap::new();
    for (name, attr) in &block.attributes {
        let coerced = match members.get(name) {
            Some(v) => convert(v, &attr.attr_type).map_err(|e| nest_error(path, name, e))?,
            None => Value::Null(attr.attr_type.clone()),
        };
        out.insert(name.clone(), coerced);
    }
    for (name, nested) in &block.blocks {
        let coerced = match members.get(name) {
            Some(v) => nested.coerce_value(v, &join_path(path, name))?,
            None => nested.empty_value(),
        };
        out.insert(name.clone(), coerced);
    }

    Ok(Value::Object(out))
}

fn nest_error(path: &str, name: &str, err: ConvertError) -> ConvertError {
    let base = join_path(path, name);
    let full = if err.path.is_empty() {
        base
    } else {
        join_path(&base, &err.path)
    };
    ConvertError::new(full, err.message)
}

/// A nested block with its nesting mode and constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedBlock {
    /// The block definition.
    #[serde(flatten)]
    pub block: Block,
    /// How the block is nested (single, list, set, map).
    #[serde(default)]
    pub nesting_mode: BlockNestingMode,
    /// Minimum number of blocks required.
    #[serde(default)]
    pub min_items: u32,
    /// Maximum number of blocks allowed (0 = unlimited).
    #[serde(default)]
    pub max_items: u32,
}

impl NestedBlock {
    /// Create a single nested block (0 or 1 allowed).
    pub fn single(block: Block) -> Self {
        Self {
            block,
            nesting_mode: BlockNestingMode::Single,
            min_items: 0,
            max_items: 1,
        }
    }

    /// Create a list of nested blocks.
    pub fn list(block: Block) -> Self {
        Self {
            block,
            nesting_mode: BlockNestingMode::List,
            min_items: 0,
            max_items: 0,
        }
    }

    /// Create a set of nested blocks.
    pub fn set(block: Block) -> Self {
        Self {
            block,
            nesting_mode: BlockNestingMode::Set,
            min_items: 0,
            max_items: 0,
        }
    }

    /// Create a map of nested blocks.
    pub fn map(block: Block) -> Self {
        Self {
            block,
            nesting_mode: BlockNestingMode::Map,
            min_items: 0,
            max_items: 0,
        }
    }

    /// Set the minimum number of blocks required.
    pub fn with_min_items(mut self, min: u32) -> Self {
        self.min_items = min;
        self
    }

    /// Set the maximum number of blocks allowed.
    pub fn with_max_items(mut self, max: u32) -> Self {
        self.max_items = max;
        self
    }

    /// The type this nested block contributes to its parent's object type.
    pub fn implied_type(&self) -> Type {
        let block_type = self.block.implied_type();
        match self.nesting_mode {
            BlockNestingMode::Single => block_type,
            BlockNestingMode::List => Type::list(block_type),
            BlockNestingMode::Set => Type::set(block_type),
            BlockNestingMode::Map => Type::map(block_type),
        }
    }

    /// The value used for a block that is absent: null for single blocks,
    /// an empty collection otherwise.
    pub fn empty_value(&self) -> Value {
        let block_type = self.block.implied_type();
        match self.nesting_mode {
            BlockNestingMode::Single => Value::Null(block_type),
            BlockNestingMode::List => Value::List(block_type, Vec::new()),
            BlockNestingMode::Set => Value::Set(block_type, Vec::new()),
            BlockNestingMode::Map => Value::Map(block_type, BTreeMap::new()),
        }
    }

    fn coerce_value(&self, value: &Value, path: &str) -> Result<Value, ConvertError> {
        if self.nesting_mode == BlockNestingMode::Single {
            return coerce_block(&self.block, value, path);
        }

        match value {
            Value::Null(_) => return Ok(Value::Null(self.implied_type())),
            Value::Unknown(_) => return Ok(Value::Unknown(self.implied_type())),
            _ => {},
        }

        let block_type = self.block.implied_type();
        match self.nesting_mode {
            BlockNestingMode::List | BlockNestingMode::Set => {
                let elems = value.elements().ok_or_else(|| {
                    ConvertError::new(path, format!("a list is required, got {}", value.ty()))
                })?;
                let coerced = elems
                    .iter()
                    .enumerate()
                    .map(|(i, elem)| coerce_block(&self.block, elem, &join_path(path, &i.to_string())))
                    .collect::<Result<Vec<_>, _>>()?;
                if self.nesting_mode == BlockNestingMode::Set {
                    Ok(Value::set(block_type, coerced))
                } else {
                    Ok(Value::List(block_type, coerced))
                }
            },
            _ => {
                let members = value.members().ok_or_else(|| {
                    ConvertError::new(path, format!("a map is required, got {}", value.ty()))
                })?;
                let mut coerced = BTreeMap::new();
                for (key, elem) in members {
                    coerced.insert(
                        key.clone(),
                        coerce_block(&self.block, elem, &join_path(path, key))?,
                    );
                }
                Ok(Value::Map(block_type, coerced))
            },
        }
    }

    fn normalize_from_legacy(&self, value: Value) -> Value {
        match (self.nesting_mode, value) {
            (BlockNestingMode::Single, value) => self.block.normalize_from_legacy(value),
            (BlockNestingMode::List | BlockNestingMode::Set | BlockNestingMode::Map, Value::Null(_)) => {
                self.empty_value()
            },
            (_, Value::List(ety, elems)) => Value::List(
                ety,
                elems
                    .into_iter()
                    .map(|e| self.block.normalize_from_legacy(e))
                    .collect(),
            ),
            (_, Value::Set(ety, elems)) => Value::set(
                ety,
                elems
                    .into_iter()
                    .map(|e| self.block.normalize_from_legacy(e))
                    .collect(),
            ),
            (_, Value::Map(ety, members)) => Value::Map(
                ety,
                members
                    .into_iter()
                    .map(|(k, e)| (k, self.block.normalize_from_legacy(e)))
                    .collect(),
            ),
            (_, other) => other,
        }
    }
}

/// Schema for a resource or data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// The version of this schema (for state upgrades).
    #[serde(default)]
    pub version: u64,
    /// The root block containing all attributes and nested blocks.
    #[serde(flatten)]
    pub block: Block,
}

impl Schema {
    /// Create a new schema with the given version.
    pub fn new(version: u64) -> Self {
        Self {
            version,
            block: Block::new(),
        }
    }

    /// Create a schema at version 0.
    pub fn v0() -> Self {
        Self::new(0)
    }

    /// Add an attribute to the schema.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.block.attributes.insert(name.into(), attr);
        self
    }

    /// Add a nested block to the schema.
    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlock) -> Self {
        self.block.blocks.insert(name.into(), block);
        self
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::v0()
    }
}

/// The complete schema of a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProviderSchema {
    /// Schema for provider configuration.
    #[serde(default)]
    pub provider: Schema,
    /// Schemas for each resource type.
    #[serde(default)]
    pub resources: HashMap<String, Schema>,
    /// Schemas for each data source type.
    #[serde(default)]
    pub data_sources: HashMap<String, Schema>,
}

impl ProviderSchema {
    /// Create a new empty provider schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the provider configuration schema.
    pub fn with_provider_config(mut self, schema: Schema) -> Self {
        self.provider = schema;
        self
    }

    /// Add a resource schema.
    pub fn with_resource(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.resources.insert(name.into(), schema);
        self
    }

    /// Add a data source schema.
    pub fn with_data_source(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.data_sources.insert(name.into(), schema);
        self
    }
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// An error that prevents the operation from completing.
    Error,
    /// A warning that doesn't prevent the operation but should be addressed.
    Warning,
}

/// A diagnostic message from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity of the diagnostic.
    pub severity: DiagnosticSeverity,
    /// A short summary of the issue.
    pub summary: String,
    /// A detailed description of the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// The attribute path where the issue occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    /// Create an error diagnostic.
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Create a warning diagnostic.
    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Add detail to this diagnostic.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Set the attribute path for this diagnostic.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Whether this diagnostic is an error.
    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}

impl From<ConvertError> for Diagnostic {
    fn from(err: ConvertError) -> Self {
        let diag = Diagnostic::error(err.to_string());
        if err.path.is_empty() {
            diag
        } else {
            diag.with_attribute(err.path)
        }
    }
}

impl From<crate::error::ProviderError> for Diagnostic {
    fn from(err: crate::error::ProviderError) -> Self {
        let diag = Diagnostic::error(err.to_string());
        match &err {
            crate::error::ProviderError::Conversion(e) if !e.path.is_empty() => {
                diag.with_attribute(e.path.clone())
            },
            _ => diag,
        }
    }
}

/// Whether any of the diagnostics is an error.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}
