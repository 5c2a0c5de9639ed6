//! Schema validation helpers.
//!
//! Validates a `serde_json::Value` against a [`Schema`] and reports every
//! problem as a [`Diagnostic`] carrying the attribute path.
//!
//! # Example
//!
//! ```
//! use mongodbatlas_provider::schema::{Schema, Attribute};
//! use mongodbatlas_provider::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("role_name", Attribute::required_string().with_pattern(r"^[\w-]+$"));
//!
//! assert!(validate(&schema, &json!({"role_name": "reader"})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"role_name": "read only"}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("role_name".to_string()));
//! ```

use crate::schema::{
    Attribute, AttributeType, Block, Diagnostic, NestedBlock, Schema, StringRule,
};
use regex::Regex;
use serde_json::Value;

/// Validate a JSON value against a schema.
///
/// Returns a list of diagnostics for any validation errors found.
/// An empty list means the value is valid.
///
/// # Validation Rules
///
/// - Required attributes must be present and non-null
/// - Optional attributes may be absent or null
/// - Computed attributes are skipped (provider sets these)
/// - Attribute types must match the schema
/// - String values must satisfy the attribute's [`StringRule`]s
/// - Nested blocks are validated recursively with min/max item constraints
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    validate_block(&schema.block, value, "", &mut diagnostics);
    diagnostics
}

/// Validate a JSON value against a schema, returning Ok if valid or Err with diagnostics.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Check if a JSON value is valid against a schema.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

fn validate_block(block: &Block, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let obj = match value {
        Value::Object(map) => map,
        Value::Null => return,
        _ => {
            let diagnostic =
                Diagnostic::error("Expected object").with_detail(format!("Got {}", value_type_name(value)));
            diagnostics.push(if path.is_empty() {
                diagnostic
            } else {
                diagnostic.with_attribute(path)
            });
            return;
        }
    };

    for name in block.field_names() {
        let field_path = join_path(path, name);
        if let Some(attr) = block.attributes.get(name) {
            validate_attribute(attr, obj.get(name), &field_path, diagnostics);
        } else if let Some(nested) = block.blocks.get(name) {
            validate_nested_block(nested, obj.get(name), &field_path, diagnostics);
        }
    }
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.flags.is_computed_only() {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        }
        Some(v) => {
            let before = diagnostics.len();
            validate_attribute_type(&attr.attr_type, v, path, diagnostics);
            if diagnostics.len() == before {
                if let Some(s) = v.as_str() {
                    validate_rules(&attr.rules, s, path, diagnostics);
                }
            }
        }
    }
}

fn validate_attribute_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        }
        AttributeType::Int64 => {
            if !is_int64(value) {
                diagnostics.push(type_error(path, "int64", value));
            }
        }
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        }
        AttributeType::List(element_type) | AttributeType::Set(element_type) => {
            if let Some(arr) = value.as_array() {
                for (i, elem) in arr.iter().enumerate() {
                    let elem_path = format!("{}.{}", path, i);
                    validate_attribute_type(element_type, elem, &elem_path, diagnostics);
                }
            } else {
                let expected = if matches!(attr_type, AttributeType::Set(_)) {
                    "set"
                } else {
                    "list"
                };
                diagnostics.push(type_error(path, expected, value));
            }
        }
    }
}

fn validate_rules(rules: &[StringRule], value: &str, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    for rule in rules {
        let violation = match rule {
            StringRule::Pattern(pattern) => match Regex::new(pattern) {
                Ok(re) if re.is_match(value) => None,
                Ok(_) => Some(format!("must match the pattern {}", pattern)),
                Err(e) => Some(format!("cannot be checked against pattern {}: {}", pattern, e)),
            },
            StringRule::NotPrefix(prefix) => value
                .starts_with(prefix.as_str())
                .then(|| format!("cannot start with \"{}\"", prefix)),
            StringRule::OneOf(allowed) => (!allowed.iter().any(|a| a == value))
                .then(|| format!("must be one of {}", allowed.join(", "))),
        };

        if let Some(detail) = violation {
            diagnostics.push(
                Diagnostic::error(format!("Invalid value for attribute '{}'", path))
                    .with_detail(format!("\"{}\" {}", value, detail))
                    .with_attribute(path),
            );
        }
    }
}

fn validate_nested_block(
    nested: &NestedBlock,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let items: &[Value] = match value {
        None | Some(Value::Null) => &[],
        Some(Value::Array(arr)) => arr,
        Some(v) => {
            diagnostics.push(
                Diagnostic::error(format!("Expected list for block '{}'", path))
                    .with_detail(format!("Got {}", value_type_name(v)))
                    .with_attribute(path),
            );
            return;
        }
    };

    let len = items.len() as u32;
    if len < nested.min_items {
        diagnostics.push(
            Diagnostic::error(format!(
                "Block '{}' requires at least {} item(s), got {}",
                path, nested.min_items, len
            ))
            .with_attribute(path),
        );
    }

    // 0 means unlimited
    if nested.max_items > 0 && len > nested.max_items {
        diagnostics.push(
            Diagnostic::error(format!(
                "Block '{}' allows at most {} item(s), got {}",
                path, nested.max_items, len
            ))
            .with_attribute(path),
        );
    }

    for (i, item) in items.iter().enumerate() {
        let item_path = format!("{}.{}", path, i);
        validate_block(&nested.block, item, &item_path, diagnostics);
    }
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_int64(value: &Value) -> bool {
    match value {
        Value::Number(n) => {
            n.is_i64()
                || n.as_f64()
                    .is_some_and(|f| f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64)
        }
        _ => false,
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(got)))
        .with_attribute(path)
}
