//! Typed value tree exchanged with the orchestration engine.
//!
//! A [`Value`] is a tagged union that always knows its [`Type`]. Nullness and
//! "known-ness" are carried by the dedicated [`Value::Null`] and
//! [`Value::Unknown`] variants, both of which remember the type they stand in
//! for, so every position in a tree can be resolved against a schema even when
//! it holds no concrete data.
//!
//! # Example
//!
//! ```
//! use hemmer_legacy_provider::value::{Type, Value};
//!
//! let tags = Value::list(Type::String, vec![Value::string("a"), Value::string("b")]);
//! let obj = Value::object([("name", Value::string("web")), ("tags", tags)]);
//!
//! assert!(obj.is_wholly_known());
//! assert_eq!(obj.get_attr("tags").and_then(Value::length), Some(2));
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Number;
use thiserror::Error;

/// The structural type of a [`Value`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Type {
    /// A string value.
    String,
    /// A number, integer or floating point.
    Number,
    /// A boolean value.
    Bool,
    /// An ordered sequence of values of a single type.
    List(Box<Type>),
    /// An unordered collection of unique values of a single type.
    Set(Box<Type>),
    /// A map from string keys to values of a single type.
    Map(Box<Type>),
    /// An object with a fixed set of named attributes.
    Object(BTreeMap<String, Type>),
    /// A fixed-length sequence where each position has its own type.
    Tuple(Vec<Type>),
    /// An open type whose content is opaque to the adapter.
    Dynamic,
}

impl Type {
    /// Create a list type.
    pub fn list(element_type: Type) -> Self {
        Self::List(Box::new(element_type))
    }

    /// Create a set type.
    pub fn set(element_type: Type) -> Self {
        Self::Set(Box::new(element_type))
    }

    /// Create a map type.
    pub fn map(element_type: Type) -> Self {
        Self::Map(Box::new(element_type))
    }

    /// Create an object type from attribute name/type pairs.
    pub fn object<K: Into<String>>(attributes: impl IntoIterator<Item = (K, Type)>) -> Self {
        Self::Object(
            attributes
                .into_iter()
                .map(|(name, ty)| (name.into(), ty))
                .collect(),
        )
    }

    /// Whether this is a primitive (string, number or bool) type.
    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::String | Type::Number | Type::Bool)
    }

    /// Whether this is a list, set or map type.
    pub fn is_collection(&self) -> bool {
        matches!(self, Type::List(_) | Type::Set(_) | Type::Map(_))
    }

    /// The element type of a list, set or map type.
    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::List(ety) | Type::Set(ety) | Type::Map(ety) => Some(ety),
            _ => None,
        }
    }

    /// The attribute types of an object type.
    pub fn attribute_types(&self) -> Option<&BTreeMap<String, Type>> {
        match self {
            Type::Object(attrs) => Some(attrs),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::String => write!(f, "string"),
            Type::Number => write!(f, "number"),
            Type::Bool => write!(f, "bool"),
            Type::List(ety) => write!(f, "list of {}", ety),
            Type::Set(ety) => write!(f, "set of {}", ety),
            Type::Map(ety) => write!(f, "map of {}", ety),
            Type::Object(_) => write!(f, "object"),
            Type::Tuple(_) => write!(f, "tuple"),
            Type::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// A typed configuration or state value.
#[derive(Debug, Clone)]
pub enum Value {
    /// A null value of the given type.
    Null(Type),
    /// A value of the given type that is not known yet.
    Unknown(Type),
    /// A known string.
    String(String),
    /// A known number.
    Number(Number),
    /// A known boolean.
    Bool(bool),
    /// A known list with its element type.
    List(Type, Vec<Value>),
    /// A known set with its element type. Elements are unique.
    Set(Type, Vec<Value>),
    /// A known map with its element type.
    Map(Type, BTreeMap<String, Value>),
    /// A known object.
    Object(BTreeMap<String, Value>),
    /// A known tuple.
    Tuple(Vec<Value>),
}

impl Value {
    /// A null value of the given type.
    pub fn null(ty: Type) -> Self {
        Self::Null(ty)
    }

    /// An unknown value of the given type.
    pub fn unknown(ty: Type) -> Self {
        Self::Unknown(ty)
    }

    /// A known string value.
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    /// A known number value.
    pub fn number(n: impl Into<Number>) -> Self {
        Self::Number(n.into())
    }

    /// A known boolean value.
    pub fn bool(b: bool) -> Self {
        Self::Bool(b)
    }

    /// A list of values sharing `element_type`.
    pub fn list(element_type: Type, elements: Vec<Value>) -> Self {
        Self::List(element_type, elements)
    }

    /// A set of values sharing `element_type`. Duplicates are dropped.
    pub fn set(element_type: Type, elements: Vec<Value>) -> Self {
        let mut unique: Vec<Value> = Vec::with_capacity(elements.len());
        for elem in elements {
            if !unique.contains(&elem) {
                unique.push(elem);
            }
        }
        Self::Set(element_type, unique)
    }

    /// A map of values sharing `element_type`.
    pub fn map<K: Into<String>>(
        element_type: Type,
        entries: impl IntoIterator<Item = (K, Value)>,
    ) -> Self {
        Self::Map(
            element_type,
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        )
    }

    /// An object from attribute name/value pairs.
    pub fn object<K: Into<String>>(attributes: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Object(
            attributes
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect(),
        )
    }

    /// A tuple of values.
    pub fn tuple(elements: Vec<Value>) -> Self {
        Self::Tuple(elements)
    }

    /// The type of this value.
    pub fn ty(&self) -> Type {
        match self {
            Value::Null(ty) | Value::Unknown(ty) => ty.clone(),
            Value::String(_) => Type::String,
            Value::Number(_) => Type::Number,
            Value::Bool(_) => Type::Bool,
            Value::List(ety, _) => Type::list(ety.clone()),
            Value::Set(ety, _) => Type::set(ety.clone()),
            Value::Map(ety, _) => Type::map(ety.clone()),
            Value::Object(attrs) => {
                Type::Object(attrs.iter().map(|(k, v)| (k.clone(), v.ty())).collect())
            },
            Value::Tuple(elems) => Type::Tuple(elems.iter().map(Value::ty).collect()),
        }
    }

    /// Whether this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null(_))
    }

    /// Whether this value itself is known. Nested elements may still be unknown.
    pub fn is_known(&self) -> bool {
        !matches!(self, Value::Unknown(_))
    }

    /// Whether neither this value nor anything nested inside it is unknown.
    pub fn is_wholly_known(&self) -> bool {
        match self {
            Value::Unknown(_) => false,
            Value::List(_, elems) | Value::Set(_, elems) | Value::Tuple(elems) => {
                elems.iter().all(Value::is_wholly_known)
            },
            Value::Map(_, members) | Value::Object(members) => {
                members.values().all(Value::is_wholly_known)
            },
            _ => true,
        }
    }

    /// The number of elements of a known, non-null collection, object or tuple.
    pub fn length(&self) -> Option<usize> {
        match self {
            Value::List(_, elems) | Value::Set(_, elems) | Value::Tuple(elems) => Some(elems.len()),
            Value::Map(_, members) | Value::Object(members) => Some(members.len()),
            _ => None,
        }
    }

    /// The string content of a known string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The content of a known boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The content of a known number.
    pub fn as_number(&self) -> Option<&Number> {
        match self {
            Value::Number(n) => Some(n),
            _ => None,
        }
    }

    /// The elements of a known list, set or tuple.
    pub fn elements(&self) -> Option<&[Value]> {
        match self {
            Value::List(_, elems) | Value::Set(_, elems) | Value::Tuple(elems) => Some(elems),
            _ => None,
        }
    }

    /// The members of a known map or object.
    pub fn members(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(_, members) | Value::Object(members) => Some(members),
            _ => None,
        }
    }

    /// Look up an attribute of a known object (or an entry of a known map).
    pub fn get_attr(&self, name: &str) -> Option<&Value> {
        self.members().and_then(|m| m.get(name))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null(a), Value::Null(b)) => a == b,
            (Value::Unknown(a), Value::Unknown(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::List(ta, a), Value::List(tb, b)) => ta == tb && a == b,
            // sets are deduplicated on construction, so equal length plus
            // containment is structural equality
            (Value::Set(ta, a), Value::Set(tb, b)) => {
                ta == tb && a.len() == b.len() && a.iter().all(|v| b.contains(v))
            },
            (Value::Map(ta, a), Value::Map(tb, b)) => ta == tb && a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::number(n)
    }
}

/// An error converting a value to another type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}{}", path_prefix(.path), .message)]
pub struct ConvertError {
    /// Dotted path to the offending position, empty for the root.
    pub path: String,
    /// What went wrong.
    pub message: String,
}

impl ConvertError {
    /// Create a conversion error at the given path.
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

fn path_prefix(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!("{}: ", path)
    }
}

/// Convert a value to the wanted type.
///
/// Null and unknown values keep their status and take on the wanted type.
/// Object targets accept objects and maps; attributes missing from the input
/// become null, while attributes the target does not declare are rejected.
pub fn convert(value: &Value, want: &Type) -> Result<Value, ConvertError> {
    convert_at(value, want, "")
}

fn convert_at(value: &Value, want: &Type, path: &str) -> Result<Value, ConvertError> {
    if *want == Type::Dynamic {
        return Ok(value.clone());
    }

    match value {
        Value::Null(_) => return Ok(Value::Null(want.clone())),
        Value::Unknown(_) => return Ok(Value::Unknown(want.clone())),
        _ => {},
    }

    match want {
        Type::String => match value {
            Value::String(s) => Ok(Value::String(s.clone())),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            _ => Err(mismatch(path, want, value)),
        },
        Type::Number => match value {
            Value::Number(n) => Ok(Value::Number(n.clone())),
            Value::String(s) => s
                .parse::<Number>()
                .map(Value::Number)
                .map_err(|_| ConvertError::new(path, format!("a number is required, got {:?}", s))),
            _ => Err(mismatch(path, want, value)),
        },
        Type::Bool => match value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::String(s) if s == "true" => Ok(Value::Bool(true)),
            Value::String(s) if s == "false" => Ok(Value::Bool(false)),
            Value::String(s) => Err(ConvertError::new(
                path,
                format!("a bool is required, got {:?}", s),
            )),
            _ => Err(mismatch(path, want, value)),
        },
        Type::List(ety) | Type::Set(ety) => {
            let elems = value.elements().ok_or_else(|| mismatch(path, want, value))?;
            let converted = elems
                .iter()
                .enumerate()
                .map(|(i, elem)| convert_at(elem, ety, &join_path(path, &i.to_string())))
                .collect::<Result<Vec<_>, _>>()?;
            if matches!(want, Type::Set(_)) {
                Ok(Value::set((**ety).clone(), converted))
            } else {
                Ok(Value::List((**ety).clone(), converted))
            }
        },
        Type::Tuple(etys) => {
            let elems = match value {
                Value::List(_, elems) | Value::Tuple(elems) => elems,
                _ => return Err(mismatch(path, want, value)),
            };
            if elems.len() != etys.len() {
                return Err(ConvertError::new(
                    path,
                    format!("tuple requires {} elements, got {}", etys.len(), elems.len()),
                ));
            }
            let converted = elems
                .iter()
                .zip(etys)
                .enumerate()
                .map(|(i, (elem, ety))| convert_at(elem, ety, &join_path(path, &i.to_string())))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Tuple(converted))
        },
        Type::Map(ety) => {
            let members = value.members().ok_or_else(|| mismatch(path, want, value))?;
            let converted = members
                .iter()
                .map(|(k, v)| -> Result<(String, Value), ConvertError> {
                    Ok((k.clone(), convert_at(v, ety, &join_path(path, k))?))
                })
                .collect::<Result<BTreeMap<_, _>, _>>()?;
            Ok(Value::Map((**ety).clone(), converted))
        },
        Type::Object(attrs) => {
            let members = value.members().ok_or_else(|| mismatch(path, want, value))?;
            if let Some(extra) = members.keys().find(|k| !attrs.contains_key(*k)) {
                return Err(ConvertError::new(
                    join_path(path, extra),
                    "unsupported attribute",
                ));
            }
            let converted = attrs
                .iter()
                .map(|(name, aty)| -> Result<(String, Value), ConvertError> {
                    let converted = match members.get(name) {
                        Some(v) => convert_at(v, aty, &join_path(path, name))?,
                        None => Value::Null(aty.clone()),
                    };
                    Ok((name.clone(), converted))
                })
                .collect::<Result<BTreeMap<_, _>, _>>()?;
            Ok(Value::Object(converted))
        },
        Type::Dynamic => Ok(value.clone()),
    }
}

fn mismatch(path: &str, want: &Type, got: &Value) -> ConvertError {
    ConvertError::new(path, format!("{} required, got {}", want, got.ty()))
}

/// Join a dotted attribute path with one more step.
pub(crate) fn join_path(base: &str, step: &str) -> String {
    if base.is_empty() {
        step.to_string()
    } else {
        format!("{}.{}", base, step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_types() {
        assert_eq!(Value::string("x").ty(), Type::String);
        assert_eq!(Value::null(Type::Bool).ty(), Type::Bool);
        assert_eq!(
            Value::list(Type::String, vec![]).ty(),
            Type::list(Type::String)
        );

        let obj = Value::object([("a", Value::number(1)), ("b", Value::null(Type::String))]);
        assert_eq!(
            obj.ty(),
            Type::object([("a", Type::Number), ("b", Type::String)])
        );
    }

    #[test]
    fn test_set_deduplicates_and_ignores_order() {
        let a = Value::set(
            Type::String,
            vec![Value::string("x"), Value::string("y"), Value::string("x")],
        );
        assert_eq!(a.length(), Some(2));

        let b = Value::set(Type::String, vec![Value::string("y"), Value::string("x")]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_wholly_known() {
        let v = Value::list(
            Type::String,
            vec![Value::string("a"), Value::unknown(Type::String)],
        );
        assert!(v.is_known());
        assert!(!v.is_wholly_known());
        assert!(Value::null(Type::String).is_wholly_known());
    }

    #[test]
    fn test_convert_primitives() {
        assert_eq!(
            convert(&Value::string("42"), &Type::Number).unwrap(),
            Value::number(42)
        );
        assert_eq!(
            convert(&Value::string("true"), &Type::Bool).unwrap(),
            Value::bool(true)
        );
        assert_eq!(
            convert(&Value::bool(false), &Type::String).unwrap(),
            Value::string("false")
        );
        assert!(convert(&Value::string(""), &Type::Bool).is_err());
        assert!(convert(&Value::string("abc"), &Type::Number).is_err());
    }

    #[test]
    fn test_convert_null_and_unknown_keep_status() {
        assert_eq!(
            convert(&Value::null(Type::String), &Type::Number).unwrap(),
            Value::null(Type::Number)
        );
        assert_eq!(
            convert(&Value::unknown(Type::Dynamic), &Type::list(Type::String)).unwrap(),
            Value::unknown(Type::list(Type::String))
        );
    }

    #[test]
    fn test_convert_object_fills_missing_and_rejects_extra() {
        let ty = Type::object([("name", Type::String), ("count", Type::Number)]);

        let v = convert(&Value::object([("name", Value::string("a"))]), &ty).unwrap();
        assert_eq!(v.get_attr("count"), Some(&Value::null(Type::Number)));

        let err = convert(
            &Value::object([("name", Value::string("a")), ("old", Value::bool(true))]),
            &ty,
        )
        .unwrap_err();
        assert_eq!(err.path, "old");
        assert_eq!(err.to_string(), "old: unsupported attribute");

        let err = convert(&Value::string("abc"), &Type::Number).unwrap_err();
        assert!(err.path.is_empty());
        assert!(err.to_string().starts_with("a number is required"));
        assert!(std::error::Error::source(&err).is_none());
    }

    #[test]
    fn test_convert_nested_error_path() {
        let ty = Type::object([("ports", Type::list(Type::Number))]);
        let v = Value::object([(
            "ports",
            Value::list(Type::String, vec![Value::string("80"), Value::string("http")]),
        )]);
        let err = convert(&v, &ty).unwrap_err();
        assert_eq!(err.path, "ports.1");
    }

    #[test]
    fn test_convert_list_to_set_deduplicates() {
        let v = Value::list(Type::String, vec![Value::string("a"), Value::string("a")]);
        let set = convert(&v, &Type::set(Type::String)).unwrap();
        assert_eq!(set.length(), Some(1));
    }
}
