//! Preparation of provider configuration before it reaches a legacy provider.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::json::value_from_json;
use crate::legacy::LegacyAttribute;
use crate::schema::{Block, Diagnostic};
use crate::types::PrepareProviderConfigResponse;
use crate::validation::validate_config_nulls;
use crate::value::{convert, Type, Value};

/// Fill in defaults for unset provider attributes, coerce the result to the
/// provider block and reject nulls the legacy provider cannot handle.
///
/// Only top-level attributes that are null or omitted are defaulted, and
/// deprecated or removed attributes are left unset. A bool attribute with an empty string
/// default is set to `false` with a warning. Any error aborts preparation, in
/// which case no prepared config is returned.
pub fn prepare_provider_config(
    raw: &Value,
    attributes: &BTreeMap<String, LegacyAttribute>,
    block: &Block,
) -> PrepareProviderConfigResponse {
    let mut resp = PrepareProviderConfigResponse::default();

    // coerce first so attributes the caller omitted are present as nulls
    let config = match block.coerce_value(raw) {
        Ok(config) => config,
        Err(err) => {
            resp.diagnostics.push(err.into());
            return resp;
        },
    };

    let config = match config {
        Value::Object(members) => {
            let mut defaulted = BTreeMap::new();
            for (name, member) in &members {
                match apply_default(name, member, attributes.get(name), &mut resp.diagnostics) {
                    Some(value) => {
                        defaulted.insert(name.clone(), value);
                    },
                    None => return resp,
                }
            }
            Value::Object(defaulted)
        },
        other => other,
    };

    let null_diags = validate_config_nulls(&config, "");
    if !null_diags.is_empty() {
        resp.diagnostics.extend(null_diags);
        return resp;
    }

    resp.prepared_config = Some(config);
    resp
}

/// Returns the member with its default applied, or `None` after recording an
/// error diagnostic.
fn apply_default(
    name: &str,
    member: &Value,
    attr: Option<&LegacyAttribute>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<Value> {
    if !member.is_null() {
        return Some(member.clone());
    }
    let Some(attr) = attr else {
        return Some(member.clone());
    };
    if attr.is_retired() {
        return Some(member.clone());
    }
    let Some(default) = &attr.default else {
        return Some(member.clone());
    };

    let ty = member.ty();
    let mut default_value = match value_from_json(default, &Type::Dynamic) {
        Ok(v) => v,
        Err(err) => {
            diagnostics.push(Diagnostic::error(format!(
                "error getting default for {:?}: {}",
                name, err
            )));
            return None;
        },
    };

    if ty == Type::Bool && default_value == Value::string("") {
        warn!(attribute = %name, "empty string default for bool attribute");
        diagnostics.push(Diagnostic::warning(format!(
            "provider set empty string as default value for bool {}",
            name
        )));
        default_value = Value::bool(false);
    }

    match convert(&default_value, &ty) {
        Ok(value) => {
            debug!(attribute = %name, "applied provider config default");
            Some(value)
        },
        Err(err) => {
            diagnostics.push(
                Diagnostic::error(format!("error setting default for {:?}: {}", name, err))
                    .with_attribute(name),
            );
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legacy::{core_config_schema, ValueKind};
    use crate::schema::has_errors;
    use serde_json::json;

    fn provider_attributes() -> BTreeMap<String, LegacyAttribute> {
        [
            (
                "region",
                LegacyAttribute::new(ValueKind::String)
                    .optional()
                    .with_default(json!("us-west-2")),
            ),
            (
                "retries",
                LegacyAttribute::new(ValueKind::Int)
                    .optional()
                    .with_default(json!(3)),
            ),
            (
                "insecure",
                LegacyAttribute::new(ValueKind::Bool)
                    .optional()
                    .with_default(json!("")),
            ),
            (
                "endpoint",
                LegacyAttribute::new(ValueKind::String)
                    .optional()
                    .with_default(json!("https://old.example.com"))
                    .with_deprecated("use `endpoints`"),
            ),
            (
                "zones",
                LegacyAttribute::new(ValueKind::List)
                    .optional()
                    .with_elem_schema(LegacyAttribute::new(ValueKind::String)),
            ),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    fn prepare(raw: Value) -> PrepareProviderConfigResponse {
        let attributes = provider_attributes();
        let block = core_config_schema(&attributes).unwrap();
        prepare_provider_config(&raw, &attributes, &block)
    }

    #[test]
    fn test_region_default_applied() {
        let resp = prepare(Value::object([("region", Value::null(Type::String))]));

        assert!(!has_errors(&resp.diagnostics));
        let config = resp.prepared_config.unwrap();
        assert_eq!(config.get_attr("region"), Some(&Value::string("us-west-2")));
    }

    #[test]
    fn test_set_values_are_kept() {
        let resp = prepare(Value::object([
            ("region", Value::string("eu-central-1")),
            ("retries", Value::number(7)),
        ]));

        let config = resp.prepared_config.unwrap();
        assert_eq!(config.get_attr("region"), Some(&Value::string("eu-central-1")));
        assert_eq!(config.get_attr("retries"), Some(&Value::number(7)));
    }

    #[test]
    fn test_default_converted_to_attribute_type() {
        let resp = prepare(Value::object([("retries", Value::null(Type::Number))]));
        let config = resp.prepared_config.unwrap();
        assert_eq!(config.get_attr("retries"), Some(&Value::number(3)));
    }

    #[test]
    fn test_bool_empty_string_default_warns() {
        let resp = prepare(Value::object([("insecure", Value::null(Type::Bool))]));

        assert_eq!(resp.diagnostics.len(), 1);
        assert!(!has_errors(&resp.diagnostics));
        assert!(resp.diagnostics[0].summary.contains("insecure"));
        let config = resp.prepared_config.unwrap();
        assert_eq!(config.get_attr("insecure"), Some(&Value::bool(false)));
    }

    #[test]
    fn test_deprecated_default_not_applied() {
        let resp = prepare(Value::object([("endpoint", Value::null(Type::String))]));
        let config = resp.prepared_config.unwrap();
        assert!(config.get_attr("endpoint").unwrap().is_null());
    }

    #[test]
    fn test_absent_attributes_get_defaults() {
        let resp = prepare(Value::Object(BTreeMap::new()));
        assert!(!has_errors(&resp.diagnostics));

        let config = resp.prepared_config.unwrap();
        assert_eq!(config.get_attr("region"), Some(&Value::string("us-west-2")));
        assert_eq!(config.get_attr("retries"), Some(&Value::number(3)));
        assert!(config.get_attr("zones").unwrap().is_null());
        assert!(config.get_attr("endpoint").unwrap().is_null());
    }

    #[test]
    fn test_unsupported_argument_aborts() {
        let resp = prepare(Value::object([("bogus", Value::string("x"))]));
        assert!(resp.prepared_config.is_none());
        assert!(has_errors(&resp.diagnostics));
        assert_eq!(resp.diagnostics[0].attribute, Some("bogus".to_string()));
    }

    #[test]
    fn test_null_in_list_aborts() {
        let resp = prepare(Value::object([(
            "zones",
            Value::list(Type::String, vec![Value::null(Type::String)]),
        )]));
        assert!(resp.prepared_config.is_none());
        assert!(resp
            .diagnostics
            .iter()
            .any(|d| d.is_error() && d.attribute.as_deref() == Some("zones.0")));
    }

    #[test]
    fn test_unconvertible_default_aborts() {
        let mut attributes = provider_attributes();
        attributes.insert(
            "port".to_string(),
            LegacyAttribute::new(ValueKind::Int)
                .optional()
                .with_default(json!("eighty")),
        );
        let block = core_config_schema(&attributes).unwrap();

        let raw = Value::object([("port", Value::null(Type::Number))]);
        let resp = prepare_provider_config(&raw, &attributes, &block);
        assert!(resp.prepared_config.is_none());
        assert!(resp
            .diagnostics
            .iter()
            .any(|d| d.summary.contains("error setting default for \"port\"")));
    }
}
