//! Null checks for configuration handed to a legacy provider.
//!
//! Legacy providers have no notion of a null element inside a list, set or
//! tuple and fail on one. Configuration is therefore checked before it crosses
//! the legacy boundary. Null object attributes and map entries are fine, as
//! the legacy model simply treats them as unset.
//!
//! # Example
//!
//! ```
//! use hemmer_legacy_provider::validation::validate_config_nulls;
//! use hemmer_legacy_provider::value::{Type, Value};
//!
//! let config = Value::object([(
//!     "tags",
//!     Value::list(Type::String, vec![Value::string("a"), Value::null(Type::String)]),
//! )]);
//!
//! let diagnostics = validate_config_nulls(&config, "");
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("tags.1".to_string()));
//! ```

use crate::schema::Diagnostic;
use crate::value::{join_path, Value};

const NULL_IN_LIST_SUMMARY: &str = "Null value found in list";
const NULL_IN_LIST_DETAIL: &str = "Null values are not allowed for this attribute value.";

/// Check a configuration value for null elements inside list-like values.
///
/// `path` is the dotted path of `value` itself, empty for the root. Null or
/// unknown values are not inspected.
///
/// # Rules
///
/// - A null list or tuple element is reported at `path.<index>`
/// - A null set element is reported at the set's own path, since set
///   elements have no index
/// - Map and object members are recursed into, but a null member is never
///   reported
pub fn validate_config_nulls(value: &Value, path: &str) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    check_nulls(value, path, &mut diagnostics);
    diagnostics
}

fn check_nulls(value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    match value {
        Value::List(_, elems) | Value::Tuple(elems) => {
            for (i, elem) in elems.iter().enumerate() {
                let elem_path = join_path(path, &i.to_string());
                if elem.is_null() {
                    diagnostics.push(null_in_list(&elem_path));
                    continue;
                }
                check_nulls(elem, &elem_path, diagnostics);
            }
        },
        Value::Set(_, elems) => {
            for elem in elems {
                if elem.is_null() {
                    diagnostics.push(null_in_list(path));
                    continue;
                }
                // set elements have no index of their own
                check_nulls(elem, path, diagnostics);
            }
        },
        Value::Map(_, members) | Value::Object(members) => {
            for (name, member) in members {
                check_nulls(member, &join_path(path, name), diagnostics);
            }
        },
        _ => {},
    }
}

fn null_in_list(path: &str) -> Diagnostic {
    let diag = Diagnostic::error(NULL_IN_LIST_SUMMARY).with_detail(NULL_IN_LIST_DETAIL);
    if path.is_empty() {
        diag
    } else {
        diag.with_attribute(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Type;

    fn rule_type() -> Type {
        Type::object([("port", Type::Number), ("cidr", Type::String)])
    }

    #[test]
    fn test_null_in_list_inside_object() {
        let config = Value::object([
            ("name", Value::string("web")),
            (
                "ingress",
                Value::object([(
                    "ports",
                    Value::list(
                        Type::Number,
                        vec![Value::number(80), Value::null(Type::Number), Value::number(443)],
                    ),
                )]),
            ),
        ]);

        let diagnostics = validate_config_nulls(&config, "");
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].is_error());
        assert_eq!(diagnostics[0].summary, "Null value found in list");
        assert_eq!(
            diagnostics[0].detail.as_deref(),
            Some("Null values are not allowed for this attribute value.")
        );
        assert_eq!(diagnostics[0].attribute, Some("ingress.ports.1".to_string()));
    }

    #[test]
    fn test_null_string_attribute_not_flagged() {
        let config = Value::object([
            ("name", Value::null(Type::String)),
            ("tags", Value::map(Type::String, [("env", Value::null(Type::String))])),
        ]);
        assert!(validate_config_nulls(&config, "").is_empty());
    }

    #[test]
    fn test_null_and_unknown_not_inspected() {
        assert!(validate_config_nulls(&Value::null(Type::list(Type::String)), "x").is_empty());
        assert!(validate_config_nulls(&Value::unknown(Type::list(Type::String)), "x").is_empty());

        let partly_unknown = Value::list(
            Type::String,
            vec![Value::unknown(Type::String), Value::string("a")],
        );
        assert!(validate_config_nulls(&partly_unknown, "x").is_empty());
    }

    #[test]
    fn test_null_in_set_reported_at_set_path() {
        let config = Value::object([(
            "zones",
            Value::set(Type::String, vec![Value::string("a"), Value::null(Type::String)]),
        )]);

        let diagnostics = validate_config_nulls(&config, "");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("zones".to_string()));
    }

    #[test]
    fn test_nested_blocks_and_tuples() {
        let config = Value::object([
            (
                "rule",
                Value::list(
                    rule_type(),
                    vec![
                        Value::object([
                            ("port", Value::number(22)),
                            ("cidr", Value::null(Type::String)),
                        ]),
                        Value::null(rule_type()),
                    ],
                ),
            ),
            (
                "pair",
                Value::tuple(vec![Value::null(Type::String), Value::bool(true)]),
            ),
        ]);

        let diagnostics = validate_config_nulls(&config, "");
        let mut paths: Vec<_> = diagnostics
            .iter()
            .filter_map(|d| d.attribute.clone())
            .collect();
        paths.sort();
        assert_eq!(paths, vec!["pair.0", "rule.1"]);
    }

    #[test]
    fn test_base_path_is_prefixed() {
        let tags = Value::list(Type::String, vec![Value::null(Type::String)]);
        let diagnostics = validate_config_nulls(&tags, "tags");
        assert_eq!(diagnostics[0].attribute, Some("tags.0".to_string()));
    }

    #[test]
    fn test_root_collections() {
        let list = Value::list(Type::String, vec![Value::null(Type::String)]);
        assert_eq!(
            validate_config_nulls(&list, "")[0].attribute,
            Some("0".to_string())
        );

        let set = Value::set(Type::String, vec![Value::null(Type::String)]);
        let diagnostics = validate_config_nulls(&set, "");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, None);
    }
}
