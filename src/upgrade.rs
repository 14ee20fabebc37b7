//! Upgrading persisted instance state to the current schema.
//!
//! Stored state is either a legacy flatmap or a JSON object, written at some
//! older schema version. Flatmap state is first brought up to the oldest
//! version the JSON upgrade chain understands, then every upgrader from the
//! stored version onwards is applied. Attributes the current schema no longer
//! declares are pruned before the result is decoded against the current
//! schema block.

use std::any::Any;

use serde_json::Value as Json;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::flatmap::{value_from_flatmap, Flatmap};
use crate::json::{value_from_json, value_to_json};
use crate::legacy::{InstanceState, JsonMap, LegacyResource};
use crate::schema::{Block, Diagnostic};
use crate::types::{RawState, UpgradeResourceStateResponse};
use crate::value::{Type, Value};

/// Upgrade stored state written at `version` to the current schema `block`.
///
/// Any decoding, migration or coercion failure is reported as a single error
/// diagnostic with no upgraded state. Absent state yields an empty response.
pub fn upgrade_resource_state(
    version: u64,
    raw_state: Option<&RawState>,
    resource: &LegacyResource,
    block: &Block,
    meta: Option<&(dyn Any + Send + Sync)>,
) -> UpgradeResourceStateResponse {
    let mut resp = UpgradeResourceStateResponse::default();

    let Some(raw_state) = raw_state else {
        debug!("no state provided to upgrade");
        return resp;
    };

    match upgrade(version, raw_state, resource, block, meta) {
        Ok(value) => resp.upgraded_state = Some(value),
        Err(err) => resp.diagnostics.push(Diagnostic::from(err)),
    }
    resp
}

fn upgrade(
    version: u64,
    raw_state: &RawState,
    resource: &LegacyResource,
    block: &Block,
    meta: Option<&(dyn Any + Send + Sync)>,
) -> Result<Value, ProviderError> {
    let (json_map, version) = match raw_state {
        RawState::Flatmap(attributes) => upgrade_flatmap_state(version, attributes, resource, block, meta)?,
        RawState::Json(raw) => (serde_json::from_slice::<JsonMap>(raw)?, version),
    };

    let json_map = upgrade_json_state(version, json_map, resource, meta)?;

    let ty = block.implied_type();
    let mut json = Json::Object(json_map);
    remove_attributes(&mut json, &ty);

    let value = value_from_json(&json, &ty)?;
    let value = block.coerce_value(&value)?;
    Ok(block.normalize_from_legacy(value))
}

/// Bring a flatmap state up to the first version handled by the JSON
/// upgrade chain and decode it. Returns the JSON form and its version.
fn upgrade_flatmap_state(
    version: u64,
    attributes: &Flatmap,
    resource: &LegacyResource,
    block: &Block,
    meta: Option<&(dyn Any + Send + Sync)>,
) -> Result<(JsonMap, u64), ProviderError> {
    let first_upgrader = resource.state_upgraders.first();
    let requires_migrate = match first_upgrader {
        Some(upgrader) => version < upgrader.version,
        None => version < resource.schema_version,
    };

    let mut upgraded_version = version;
    let mut schema_type = block.implied_type();
    let mut attributes = attributes.clone();

    if requires_migrate {
        match &resource.migrate_state {
            Some(migrate) => {
                let mut state_meta = JsonMap::new();
                state_meta.insert("schema_version".to_string(), Json::String(version.to_string()));
                let state = InstanceState {
                    id: attributes.get("id").cloned().unwrap_or_default(),
                    attributes,
                    meta: state_meta,
                };

                let migrated = migrate(version, state, meta)?;
                attributes = migrated.attributes;
                attributes.insert("id".to_string(), migrated.id);
                debug!(from_version = version, "migrated flatmap state");
            },
            // older providers could bump the version without a migration
            None => debug!(from_version = version, "no state migration declared"),
        }

        if let Some(upgrader) = first_upgrader {
            schema_type = upgrader.ty.clone();
            upgraded_version = upgrader.version;
        }
    } else if let Some(upgrader) = resource
        .state_upgraders
        .iter()
        .find(|u| u.version == version)
    {
        // stored as flatmap, but newer than anything the migration handled
        schema_type = upgrader.ty.clone();
    }

    let value = value_from_flatmap(&attributes, &schema_type)?;
    match value_to_json(&value)? {
        Json::Object(map) => Ok((map, upgraded_version)),
        other => Err(ProviderError::Upgrade(format!(
            "flatmap state decoded to {} instead of an object",
            other
        ))),
    }
}

fn upgrade_json_state(
    mut version: u64,
    mut state: JsonMap,
    resource: &LegacyResource,
    meta: Option<&(dyn Any + Send + Sync)>,
) -> Result<JsonMap, ProviderError> {
    for upgrader in &resource.state_upgraders {
        if upgrader.version != version {
            continue;
        }
        state = (upgrader.upgrade)(state, meta)?;
        debug!(from_version = version, "applied state upgrader");
        version += 1;
    }
    Ok(state)
}

/// Delete object keys the type does not declare, in place.
///
/// Arrays are walked with the element type of list and set types, and map
/// entries with the map's element type. Objects at `Dynamic` positions are
/// left alone.
pub fn remove_attributes(value: &mut Json, ty: &Type) {
    match value {
        Json::Array(elems) => {
            if let Type::List(ety) | Type::Set(ety) = ty {
                for elem in elems {
                    remove_attributes(elem, ety);
                }
            }
        },
        Json::Object(members) => match ty {
            Type::Map(ety) => {
                for member in members.values_mut() {
                    remove_attributes(member, ety);
                }
            },
            Type::Dynamic => debug!("ignoring dynamic block in JSON state"),
            Type::Object(attrs) => {
                members.retain(|name, _| {
                    let keep = attrs.contains_key(name);
                    if !keep {
                        debug!(attribute = %name, "attribute no longer present in schema");
                    }
                    keep
                });
                for (name, member) in members.iter_mut() {
                    if let Some(aty) = attrs.get(name) {
                        remove_attributes(member, aty);
                    }
                }
            },
            other => warn!(ty = %other, "unexpected type for object in JSON state"),
        },
        _ => {},
    }
}
