//! Conversion between typed values and plain JSON.
//!
//! JSON is how upgraded state travels between upgrade steps and how defaults
//! and private data are declared. Decoding is always done against a [`Type`]
//! so that nulls and empty collections come back with the right shape.

use std::collections::BTreeMap;

use serde_json::Value as Json;

use crate::value::{convert, join_path, ConvertError, Type, Value};

/// Encode a wholly known value as plain JSON.
///
/// Unknown values have no JSON form and are rejected.
pub fn value_to_json(value: &Value) -> Result<Json, ConvertError> {
    to_json_at(value, "")
}

fn to_json_at(value: &Value, path: &str) -> Result<Json, ConvertError> {
    match value {
        Value::Null(_) => Ok(Json::Null),
        Value::Unknown(_) => Err(ConvertError::new(path, "value is not known")),
        Value::String(s) => Ok(Json::String(s.clone())),
        Value::Number(n) => Ok(Json::Number(n.clone())),
        Value::Bool(b) => Ok(Json::Bool(*b)),
        Value::List(_, elems) | Value::Set(_, elems) | Value::Tuple(elems) => elems
            .iter()
            .enumerate()
            .map(|(i, elem)| to_json_at(elem, &join_path(path, &i.to_string())))
            .collect::<Result<Vec<_>, _>>()
            .map(Json::Array),
        Value::Map(_, members) | Value::Object(members) => {
            let mut out = serde_json::Map::new();
            for (k, v) in members {
                out.insert(k.clone(), to_json_at(v, &join_path(path, k))?);
            }
            Ok(Json::Object(out))
        },
    }
}

/// Decode plain JSON into a value of the given type.
///
/// Object attributes missing from the JSON become null; attributes the type
/// does not declare are rejected. `Dynamic` positions take the shape of the
/// JSON itself.
pub fn value_from_json(json: &Json, ty: &Type) -> Result<Value, ConvertError> {
    from_json_at(json, ty, "")
}

fn from_json_at(json: &Json, ty: &Type, path: &str) -> Result<Value, ConvertError> {
    if json.is_null() {
        return Ok(Value::Null(ty.clone()));
    }

    match ty {
        Type::Dynamic => Ok(infer(json)),
        Type::String | Type::Number | Type::Bool => {
            let primitive = match json {
                Json::String(s) => Value::String(s.clone()),
                Json::Number(n) => Value::Number(n.clone()),
                Json::Bool(b) => Value::Bool(*b),
                other => {
                    return Err(ConvertError::new(
                        path,
                        format!("{} required, got {}", ty, json_kind(other)),
                    ))
                },
            };
            convert(&primitive, ty).map_err(|e| ConvertError::new(path, e.message))
        },
        Type::List(ety) | Type::Set(ety) => {
            let arr = json
                .as_array()
                .ok_or_else(|| ConvertError::new(path, format!("{} required, got {}", ty, json_kind(json))))?;
            let elems = arr
                .iter()
                .enumerate()
                .map(|(i, elem)| from_json_at(elem, ety, &join_path(path, &i.to_string())))
                .collect::<Result<Vec<_>, _>>()?;
            if matches!(ty, Type::Set(_)) {
                Ok(Value::set((**ety).clone(), elems))
            } else {
                Ok(Value::List((**ety).clone(), elems))
            }
        },
        Type::Tuple(etys) => {
            let arr = json
                .as_array()
                .ok_or_else(|| ConvertError::new(path, format!("tuple required, got {}", json_kind(json))))?;
            if arr.len() != etys.len() {
                return Err(ConvertError::new(
                    path,
                    format!("tuple requires {} elements, got {}", etys.len(), arr.len()),
                ));
            }
            let elems = arr
                .iter()
                .zip(etys)
                .enumerate()
                .map(|(i, (elem, ety))| from_json_at(elem, ety, &join_path(path, &i.to_string())))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Tuple(elems))
        },
        Type::Map(ety) => {
            let obj = json
                .as_object()
                .ok_or_else(|| ConvertError::new(path, format!("{} required, got {}", ty, json_kind(json))))?;
            let mut entries = BTreeMap::new();
            for (k, v) in obj {
                entries.insert(k.clone(), from_json_at(v, ety, &join_path(path, k))?);
            }
            Ok(Value::Map((**ety).clone(), entries))
        },
        Type::Object(attrs) => {
            let obj = json
                .as_object()
                .ok_or_else(|| ConvertError::new(path, format!("object required, got {}", json_kind(json))))?;
            if let Some(extra) = obj.keys().find(|k| !attrs.contains_key(*k)) {
                return Err(ConvertError::new(
                    join_path(path, extra),
                    "unsupported attribute",
                ));
            }
            let mut members = BTreeMap::new();
            for (name, aty) in attrs {
                let member = match obj.get(name) {
                    Some(v) => from_json_at(v, aty, &join_path(path, name))?,
                    None => Value::Null(aty.clone()),
                };
                members.insert(name.clone(), member);
            }
            Ok(Value::Object(members))
        },
    }
}

fn infer(json: &Json) -> Value {
    match json {
        Json::Null => Value::Null(Type::Dynamic),
        Json::String(s) => Value::String(s.clone()),
        Json::Number(n) => Value::Number(n.clone()),
        Json::Bool(b) => Value::Bool(*b),
        Json::Array(arr) => Value::Tuple(arr.iter().map(infer).collect()),
        Json::Object(obj) => Value::Object(obj.iter().map(|(k, v)| (k.clone(), infer(v))).collect()),
    }
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}
