//! The legacy flat attribute encoding.
//!
//! Legacy providers store state as a flat map of string keys to string
//! values. Nested positions are addressed with dotted paths:
//!
//! - object attributes at `parent.name`
//! - list, set and tuple lengths at `name.#`, elements at `name.<index>`
//! - map lengths at `name.%`, entries at `name.<key>`
//!
//! Absent keys decode to null. The [`UNKNOWN_VALUE`] sentinel marks a value
//! that is not known yet. Set elements may live under any index (legacy
//! providers use element hash codes), so they are discovered by scanning keys.
//!
//! ```
//! use std::collections::BTreeMap;
//! use hemmer_legacy_provider::flatmap::value_from_flatmap;
//! use hemmer_legacy_provider::value::{Type, Value};
//!
//! let ty = Type::object([("ports", Type::list(Type::Number))]);
//! let mut m = BTreeMap::new();
//! m.insert("ports.#".to_string(), "1".to_string());
//! m.insert("ports.0".to_string(), "80".to_string());
//!
//! let v = value_from_flatmap(&m, &ty).unwrap();
//! assert_eq!(v.get_attr("ports").and_then(Value::length), Some(1));
//! ```

use std::collections::{BTreeMap, BTreeSet};

use crate::value::{convert, ConvertError, Type, Value};

/// Sentinel string legacy providers use for values that are not known yet.
pub const UNKNOWN_VALUE: &str = "74D93920-ED26-11E3-AC10-0800200C9A66";

/// A legacy flat attribute map.
pub type Flatmap = BTreeMap<String, String>;

/// Decode a flatmap into a value of the given object type.
pub fn value_from_flatmap(m: &Flatmap, ty: &Type) -> Result<Value, ConvertError> {
    match ty {
        Type::Object(attrs) => object_from_flatmap(m, "", attrs),
        other => Err(ConvertError::new(
            "",
            format!("a flatmap can only decode an object, not {}", other),
        )),
    }
}

fn object_from_flatmap(
    m: &Flatmap,
    prefix: &str,
    attrs: &BTreeMap<String, Type>,
) -> Result<Value, ConvertError> {
    let mut out = BTreeMap::new();
    for (name, aty) in attrs {
        let key = format!("{}{}", prefix, name);
        out.insert(name.clone(), value_at(m, &key, aty)?);
    }
    Ok(Value::Object(out))
}

fn value_at(m: &Flatmap, key: &str, ty: &Type) -> Result<Value, ConvertError> {
    match ty {
        Type::String | Type::Number | Type::Bool => primitive_at(m, key, ty),
        // There is no marker for a nested object, so one is always produced
        // and only its attributes can be null.
        Type::Object(attrs) => {
            if m.get(key).map(String::as_str) == Some(UNKNOWN_VALUE) {
                return Ok(Value::Unknown(ty.clone()));
            }
            object_from_flatmap(m, &format!("{}.", key), attrs)
        },
        Type::List(ety) => {
            let Some(count) = count_at(m, key, "#", ty)? else {
                return Ok(absent_or_unknown(m, key, ty));
            };
            let elems = (0..count)
                .map(|i| value_at(m, &format!("{}.{}", key, i), ety))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::List((**ety).clone(), elems))
        },
        Type::Tuple(etys) => {
            let Some(count) = count_at(m, key, "#", ty)? else {
                return Ok(absent_or_unknown(m, key, ty));
            };
            if count != etys.len() {
                return Err(ConvertError::new(
                    key,
                    format!("tuple requires {} elements, got {}", etys.len(), count),
                ));
            }
            let elems = etys
                .iter()
                .enumerate()
                .map(|(i, ety)| value_at(m, &format!("{}.{}", key, i), ety))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Tuple(elems))
        },
        Type::Set(ety) => {
            let Some(count) = count_at(m, key, "#", ty)? else {
                return Ok(absent_or_unknown(m, key, ty));
            };
            if count == 0 {
                return Ok(Value::Set((**ety).clone(), Vec::new()));
            }
            let prefix = format!("{}.", key);
            let count_key = format!("{}#", prefix);
            let indices: BTreeSet<&str> = m
                .keys()
                .filter(|k| k.starts_with(&prefix) && **k != count_key)
                .filter_map(|k| k[prefix.len()..].split('.').next())
                .collect();
            let elems = indices
                .into_iter()
                .map(|idx| value_at(m, &format!("{}{}", prefix, idx), ety))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::set((**ety).clone(), elems))
        },
        Type::Map(ety) => {
            let Some(_) = count_at(m, key, "%", ty)? else {
                return Ok(absent_or_unknown(m, key, ty));
            };
            let prefix = format!("{}.", key);
            let count_key = format!("{}%", prefix);
            let entry_keys: BTreeSet<&str> = m
                .keys()
                .filter(|k| k.starts_with(&prefix) && **k != count_key)
                .filter_map(|k| {
                    let rest = &k[prefix.len()..];
                    // primitive entries may themselves contain dots
                    if ety.is_primitive() {
                        Some(rest)
                    } else {
                        rest.split('.').next()
                    }
                })
                .collect();
            let mut entries = BTreeMap::new();
            for entry in entry_keys {
                let v = value_at(m, &format!("{}{}", prefix, entry), ety)?;
                entries.insert(entry.to_string(), v);
            }
            Ok(Value::Map((**ety).clone(), entries))
        },
        Type::Dynamic => Err(ConvertError::new(
            key,
            "dynamic values cannot be stored in a flatmap",
        )),
    }
}

fn primitive_at(m: &Flatmap, key: &str, ty: &Type) -> Result<Value, ConvertError> {
    match m.get(key) {
        None => Ok(Value::Null(ty.clone())),
        Some(raw) if raw == UNKNOWN_VALUE => Ok(Value::Unknown(ty.clone())),
        Some(raw) => convert(&Value::String(raw.clone()), ty)
            .map_err(|e| ConvertError::new(key, e.message)),
    }
}

/// Read a collection length. `None` means the collection is absent or unknown.
fn count_at(m: &Flatmap, key: &str, marker: &str, ty: &Type) -> Result<Option<usize>, ConvertError> {
    let count_key = format!("{}.{}", key, marker);
    match m.get(&count_key) {
        None => Ok(None),
        Some(raw) if raw == UNKNOWN_VALUE => Ok(None),
        Some(raw) => raw.parse::<usize>().map(Some).map_err(|_| {
            ConvertError::new(
                count_key.clone(),
                format!("invalid {} length {:?}", ty, raw),
            )
        }),
    }
}

fn absent_or_unknown(m: &Flatmap, key: &str, ty: &Type) -> Value {
    let count_marker = if matches!(ty, Type::Map(_)) { "%" } else { "#" };
    let whole = m.get(key).map(String::as_str);
    let count = m.get(&format!("{}.{}", key, count_marker)).map(String::as_str);
    if whole == Some(UNKNOWN_VALUE) || count == Some(UNKNOWN_VALUE) {
        Value::Unknown(ty.clone())
    } else {
        Value::Null(ty.clone())
    }
}

/// Encode an object value as a flatmap.
///
/// Null positions are omitted and unknown positions are written as
/// [`UNKNOWN_VALUE`]. Set elements are written at positional indices.
pub fn flatmap_from_value(value: &Value) -> Flatmap {
    let mut m = Flatmap::new();
    if let Value::Object(attrs) = value {
        for (name, attr) in attrs {
            flatten_into(&mut m, name, attr);
        }
    }
    m
}

fn flatten_into(m: &mut Flatmap, key: &str, value: &Value) {
    match value {
        Value::Null(_) => {},
        Value::Unknown(ty) => {
            let unknown_key = match ty {
                Type::List(_) | Type::Set(_) | Type::Tuple(_) => format!("{}.#", key),
                Type::Map(_) => format!("{}.%", key),
                _ => key.to_string(),
            };
            m.insert(unknown_key, UNKNOWN_VALUE.to_string());
        },
        Value::String(s) => {
            m.insert(key.to_string(), s.clone());
        },
        Value::Number(n) => {
            m.insert(key.to_string(), n.to_string());
        },
        Value::Bool(b) => {
            m.insert(key.to_string(), b.to_string());
        },
        Value::List(_, elems) | Value::Set(_, elems) | Value::Tuple(elems) => {
            m.insert(format!("{}.#", key), elems.len().to_string());
            for (i, elem) in elems.iter().enumerate() {
                flatten_into(m, &format!("{}.{}", key, i), elem);
            }
        },
        Value::Map(_, entries) => {
            m.insert(format!("{}.%", key), entries.len().to_string());
            for (k, entry) in entries {
                flatten_into(m, &format!("{}.{}", key, k), entry);
            }
        },
        Value::Object(attrs) => {
            for (name, attr) in attrs {
                flatten_into(m, &format!("{}.{}", key, name), attr);
            }
        },
    }
}
