//! Reconciliation of values produced by a legacy provider.
//!
//! A legacy provider cannot tell null from empty, drops unknown placeholders
//! and strips timeouts into private metadata. The functions here repair the
//! value it returns by comparing it with the value it was derived from.

use std::collections::BTreeMap;

use crate::value::{Type, Value};

/// Resolve null, unknown and empty-collection differences between `dst`, the
/// value computed by the legacy provider, and `src`, the value it started from.
///
/// With `apply` unset (plan and read) placeholders in `src` are preserved and
/// `dst` decides the shape of maps and sets. With `apply` set, `src` wins
/// null/empty disagreements and wholly known sets are taken from `src`.
pub fn normalize_null_values(dst: Value, src: &Value, apply: bool) -> Value {
    let ty = dst.ty();

    if !src.is_null() && !src.is_known() {
        // keep unknown placeholders during plan; apply must not produce any
        if dst.is_null() && !apply {
            return src.clone();
        }
        return dst;
    }

    if ty.is_collection() && apply {
        let dst_empty = dst.length() == Some(0);
        let src_empty = src.length() == Some(0);
        if (src.is_null() && dst_empty) || (src_empty && dst.is_null()) {
            return src.clone();
        }
    }

    if src.is_null() || !src.is_known() || !dst.is_known() {
        return dst;
    }

    match &ty {
        Type::Map(_) | Type::Object(_) => normalize_members(dst, src, &ty, apply),
        Type::Set(_) => {
            // set elements cannot be correlated after apply, trust the source
            if src.is_wholly_known() && apply {
                return src.clone();
            }
            dst
        },
        Type::List(_) | Type::Tuple(_) => normalize_elements(dst, src, apply),
        Type::String => {
            // legacy providers equate unset with the empty string
            if dst.is_null() && src.as_str() == Some("") {
                return src.clone();
            }
            dst
        },
        _ => dst,
    }
}

fn normalize_members(dst: Value, src: &Value, ty: &Type, apply: bool) -> Value {
    let Some(src_members) = src.members() else {
        return dst;
    };
    let is_map = matches!(ty, Type::Map(_));
    let dst_was_null = dst.is_null();

    let mut members = match dst {
        Value::Map(_, members) | Value::Object(members) => members,
        _ => BTreeMap::new(),
    };

    for (key, src_val) in src_members {
        let dst_val = match members.remove(key) {
            Some(v) => v,
            // map entries missing from dst stay missing: stale entries must
            // not come back during apply, and plan shapes maps freely
            None if is_map => continue,
            None => Value::Null(src_val.ty()),
        };
        members.insert(key.clone(), normalize_null_values(dst_val, src_val, apply));
    }

    if members.is_empty() {
        if dst_was_null && src.is_wholly_known() && apply {
            return src.clone();
        }
        return empty_or_null(ty, dst_was_null);
    }

    match ty {
        Type::Map(ety) => {
            // optional+computed maps come back from legacy providers marked
            // unknown; a known source value is restored
            for (key, src_val) in src_members {
                if src_val.is_null() || !src_val.is_known() {
                    continue;
                }
                if let Some(dst_val) = members.get_mut(key) {
                    if !dst_val.is_null() && !dst_val.is_known() {
                        *dst_val = src_val.clone();
                    }
                }
            }
            Value::Map((**ety).clone(), members)
        },
        _ => Value::Object(members),
    }
}

fn normalize_elements(dst: Value, src: &Value, apply: bool) -> Value {
    if dst.is_null() {
        // an empty list lost by the legacy provider
        if src.is_wholly_known() && src.length() == Some(0) && apply {
            return src.clone();
        }
        if !apply {
            if let Some(elems) = src.elements() {
                if elems.iter().all(|e| !e.is_known()) {
                    return src.clone();
                }
            }
        }
        return dst;
    }

    let Some(src_elems) = src.elements() else {
        return dst;
    };
    if dst.length() != Some(src_elems.len()) || src_elems.is_empty() {
        return dst;
    }

    let merge = |elems: Vec<Value>| -> Vec<Value> {
        elems
            .into_iter()
            .zip(src_elems)
            .map(|(d, s)| normalize_null_values(d, s, apply))
            .collect()
    };

    match dst {
        Value::List(ety, elems) => Value::List(ety, merge(elems)),
        Value::Tuple(elems) => Value::Tuple(merge(elems)),
        other => other,
    }
}

fn empty_or_null(ty: &Type, null: bool) -> Value {
    if null {
        return Value::Null(ty.clone());
    }
    match ty {
        Type::Map(ety) => Value::Map((**ety).clone(), BTreeMap::new()),
        _ => Value::Object(BTreeMap::new()),
    }
}

/// Stitch the timeouts block back into a value produced by a legacy provider.
///
/// Legacy providers move timeouts out of the configuration into private
/// metadata, so the `key` member of `to` is reset to null and then replaced
/// with the member of `from` when that one is non-null and wholly known. A
/// null `to` is returned unchanged.
pub fn copy_timeout_values(to: Value, from: &Value, key: &str) -> Value {
    let mut attrs = match to {
        Value::Object(attrs) => attrs,
        other => return other,
    };

    if let Some(timeouts) = attrs.get_mut(key) {
        *timeouts = Value::Null(timeouts.ty());
    }

    if from.is_null() {
        return Value::Object(attrs);
    }

    if let Some(timeouts) = from.get_attr(key) {
        if !timeouts.is_null() && timeouts.is_wholly_known() {
            attrs.insert(key.to_string(), timeouts.clone());
        }
    }

    Value::Object(attrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule_type() -> Type {
        Type::object([("port", Type::Number), ("cidr", Type::String)])
    }

    fn timeouts_type() -> Type {
        Type::object([("create", Type::String)])
    }

    fn sample_values() -> Vec<Value> {
        vec![
            Value::null(Type::String),
            Value::unknown(Type::list(Type::String)),
            Value::string(""),
            Value::number(5),
            Value::list(Type::String, vec![]),
            Value::list(Type::String, vec![Value::string("a"), Value::null(Type::String)]),
            Value::set(Type::Number, vec![Value::number(1), Value::number(2)]),
            Value::map(
                Type::String,
                [("a", Value::string("x")), ("b", Value::unknown(Type::String))],
            ),
            Value::map(Type::String, Vec::<(String, Value)>::new()),
            Value::object([
                ("name", Value::string("web")),
                ("id", Value::null(Type::String)),
                (
                    "rule",
                    Value::list(
                        rule_type(),
                        vec![Value::object([
                            ("port", Value::number(22)),
                            ("cidr", Value::unknown(Type::String)),
                        ])],
                    ),
                ),
                ("tags", Value::null(Type::map(Type::String))),
            ]),
            Value::tuple(vec![Value::bool(true), Value::string("x")]),
            Value::null(rule_type()),
        ]
    }

    #[test]
    fn test_identity_in_both_phases() {
        for v in sample_values() {
            for apply in [false, true] {
                assert_eq!(
                    normalize_null_values(v.clone(), &v, apply),
                    v,
                    "apply={}",
                    apply
                );
            }
        }
    }

    #[test]
    fn test_apply_recovers_empty_list() {
        let dst = Value::null(Type::list(Type::String));
        let src = Value::list(Type::String, vec![]);
        assert_eq!(normalize_null_values(dst.clone(), &src, true), src);
        assert_eq!(normalize_null_values(dst.clone(), &src, false), dst);
    }

    #[test]
    fn test_apply_keeps_null_over_empty() {
        let dst = Value::set(Type::String, vec![]);
        let src = Value::null(Type::set(Type::String));
        assert_eq!(normalize_null_values(dst, &src, true), src);
    }

    #[test]
    fn test_map_unknown_forced_to_known_source() {
        let dst = Value::map(Type::String, [("a", Value::unknown(Type::String))]);
        let src = Value::map(Type::String, [("a", Value::string("x"))]);
        let want = Value::map(Type::String, [("a", Value::string("x"))]);

        assert_eq!(normalize_null_values(dst.clone(), &src, false), want);
        assert_eq!(normalize_null_values(dst, &src, true), want);
    }

    #[test]
    fn test_object_unknown_member_not_forced() {
        let dst = Value::object([("a", Value::unknown(Type::String))]);
        let src = Value::object([("a", Value::string("x"))]);
        assert_eq!(normalize_null_values(dst.clone(), &src, false), dst);
    }

    #[test]
    fn test_plan_preserves_unknown_placeholder() {
        let dst = Value::null(Type::String);
        let src = Value::unknown(Type::String);
        assert_eq!(normalize_null_values(dst.clone(), &src, false), src);
        assert_eq!(normalize_null_values(dst, &src, true), Value::null(Type::String));

        let known = Value::string("computed");
        assert_eq!(normalize_null_values(known.clone(), &src, false), known);
    }

    #[test]
    fn test_empty_string_restored() {
        let dst = Value::object([("description", Value::null(Type::String))]);
        let src = Value::object([("description", Value::string(""))]);
        assert_eq!(normalize_null_values(dst, &src, false), src);
    }

    #[test]
    fn test_map_entries_not_resurrected() {
        let dst = Value::map(Type::String, [("a", Value::string("1"))]);
        let src = Value::map(
            Type::String,
            [("a", Value::string("1")), ("stale", Value::string("2"))],
        );
        for apply in [false, true] {
            assert_eq!(normalize_null_values(dst.clone(), &src, apply), dst);
        }
    }

    #[test]
    fn test_object_missing_member_gets_placeholder() {
        let dst = Value::object([("name", Value::string("web"))]);
        let src = Value::object([("name", Value::string("web")), ("note", Value::string(""))]);
        let got = normalize_null_values(dst, &src, false);
        assert_eq!(got.get_attr("note"), Some(&Value::string("")));
    }

    #[test]
    fn test_apply_recovers_null_object_from_source() {
        let ty = Type::map(Type::String);
        let dst = Value::null(ty);
        let src = Value::map(Type::String, [("env", Value::string("dev"))]);
        assert_eq!(normalize_null_values(dst.clone(), &src, true), src);
        assert_eq!(normalize_null_values(dst.clone(), &src, false), dst);
    }

    #[test]
    fn test_set_taken_from_source_on_apply() {
        let dst = Value::set(Type::String, vec![Value::string("b")]);
        let src = Value::set(Type::String, vec![Value::string("a")]);
        assert_eq!(normalize_null_values(dst.clone(), &src, true), src);
        assert_eq!(normalize_null_values(dst.clone(), &src, false), dst);
    }

    #[test]
    fn test_list_elementwise() {
        let dst = Value::list(
            Type::String,
            vec![Value::null(Type::String), Value::string("b")],
        );
        let src = Value::list(Type::String, vec![Value::string(""), Value::string("b")]);
        assert_eq!(normalize_null_values(dst, &src, true), src);

        let longer = Value::list(
            Type::String,
            vec![Value::null(Type::String), Value::string("b"), Value::string("c")],
        );
        assert_eq!(normalize_null_values(longer.clone(), &src, true), longer);
    }

    #[test]
    fn test_plan_keeps_all_unknown_list() {
        let dst = Value::null(Type::list(Type::String));
        let src = Value::list(
            Type::String,
            vec![Value::unknown(Type::String), Value::unknown(Type::String)],
        );
        assert_eq!(normalize_null_values(dst.clone(), &src, false), src);
        assert_eq!(normalize_null_values(dst.clone(), &src, true), dst);
    }

    #[test]
    fn test_copy_timeouts() {
        let timeouts = Value::object([("create", Value::string("10m"))]);
        let to = Value::object([
            ("id", Value::string("i-1")),
            ("timeouts", Value::object([("create", Value::null(Type::String))])),
        ]);
        let from = Value::object([("id", Value::string("i-1")), ("timeouts", timeouts.clone())]);

        let got = copy_timeout_values(to, &from, "timeouts");
        assert_eq!(got.get_attr("timeouts"), Some(&timeouts));
    }

    #[test]
    fn test_copy_timeouts_nulls_without_source() {
        let to = Value::object([
            ("id", Value::string("i-1")),
            ("timeouts", Value::object([("create", Value::null(Type::String))])),
        ]);

        let got = copy_timeout_values(to.clone(), &Value::null(Type::Dynamic), "timeouts");
        assert_eq!(got.get_attr("timeouts"), Some(&Value::null(timeouts_type())));

        let unknown_from = Value::object([("timeouts", Value::unknown(timeouts_type()))]);
        let got = copy_timeout_values(to, &unknown_from, "timeouts");
        assert!(got.get_attr("timeouts").unwrap().is_null());
    }

    #[test]
    fn test_copy_timeouts_null_target_unchanged() {
        let to = Value::null(Type::object([("timeouts", timeouts_type())]));
        let from = Value::object([("timeouts", Value::object([("create", Value::string("1m"))]))]);
        assert_eq!(copy_timeout_values(to.clone(), &from, "timeouts"), to);
    }
}
