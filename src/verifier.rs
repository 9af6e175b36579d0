// src/verifier.rs
// ============================================================================
// Module: Kora Verifier
// Description: JSON-Schema validation and required/range rule evaluation.
// Purpose: Gate task output acceptance before it is recorded and before any
//          downstream task consumes it.
// Dependencies: jsonschema, serde_json, crate::task_ir, crate::error
// ============================================================================

//! ## Overview
//! Verification is schema-first, then rules in declaration order. A schema
//! failure and a rule failure are both terminal for the attempt; neither
//! mutates the output.

use serde_json::Value;

use crate::error::VerifierError;
use crate::task_ir::Task;
use crate::task_ir::VerifyRule;

/// Validates `output` against a JSON-Schema.
///
/// # Errors
///
/// Returns [`VerifierError::SchemaCompile`] if `schema` does not itself
/// compile, or [`VerifierError::SchemaValidation`] if `output` does not
/// satisfy it.
pub fn validate_schema(output: &Value, schema: &Value) -> Result<(), VerifierError> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|err| VerifierError::SchemaCompile(err.to_string()))?;
    validator
        .validate(output)
        .map_err(|err| VerifierError::SchemaValidation(err.to_string()))
}

/// Applies `required`/`range` rules to `output`, in list order.
///
/// # Errors
///
/// Returns the first rule failure encountered.
pub fn apply_rules(output: &Value, rules: &[VerifyRule]) -> Result<(), VerifierError> {
    let Some(object) = output.as_object() else {
        return Ok(());
    };

    for rule in rules {
        match rule {
            VerifyRule::Required { paths } => {
                let missing: Vec<String> = paths
                    .iter()
                    .filter(|path| !object.contains_key(path.as_str()))
                    .cloned()
                    .collect();
                if !missing.is_empty() {
                    return Err(VerifierError::RequiredRule(missing));
                }
            }
            VerifyRule::Range { path, min, max } => {
                let Some(value) = object.get(path) else {
                    continue;
                };
                let Some(number) = value.as_f64() else {
                    return Err(VerifierError::RangeRuleNotNumeric(path.clone()));
                };
                if number < *min || number > *max {
                    return Err(VerifierError::RangeRuleOutOfBounds {
                        path: path.clone(),
                        value: number,
                        min: *min,
                        max: *max,
                    });
                }
            }
        }
    }

    Ok(())
}

/// Validates a task's output against its schema, then its rules.
///
/// # Errors
///
/// Returns [`VerifierError::MissingSchema`] when the task has no
/// `verify.schema` after normalization, or a schema/rule failure.
pub fn verify_output(task: &Task, output: &Value) -> Result<(), VerifierError> {
    let schema = task
        .verify
        .as_ref()
        .and_then(|verify| verify.schema.as_ref())
        .ok_or_else(|| VerifierError::MissingSchema(task.id.clone()))?;

    validate_schema(output, schema)?;

    if let Some(verify) = &task.verify {
        apply_rules(output, &verify.rules)?;
    }

    Ok(())
}

/// Deep, pure, idempotent transformation that sets `additionalProperties:
/// false` on every object schema it finds, recursing into `properties`,
/// `items`, and `anyOf`/`oneOf`/`allOf`.
///
/// Required for responder APIs that demand closed object shapes.
#[must_use]
pub fn harden_schema(schema: &Value) -> Value {
    let mut hardened = schema.clone();
    harden_in_place(&mut hardened);
    hardened
}

fn harden_in_place(schema: &mut Value) {
    let Value::Object(object) = schema else {
        return;
    };

    let is_object_schema = object
        .get("type")
        .map(|t| t == "object" || (t.is_array() && t.as_array().is_some_and(|items| items.contains(&Value::String("object".to_string())))))
        .unwrap_or_else(|| object.contains_key("properties"));

    if is_object_schema && !object.contains_key("additionalProperties") {
        object.insert("additionalProperties".to_string(), Value::Bool(false));
    }

    if let Some(Value::Object(properties)) = object.get_mut("properties") {
        for value in properties.values_mut() {
            harden_in_place(value);
        }
    }

    if let Some(items) = object.get_mut("items") {
        harden_in_place(items);
    }

    for key in ["anyOf", "oneOf", "allOf"] {
        if let Some(Value::Array(variants)) = object.get_mut(key) {
            for variant in variants {
                harden_in_place(variant);
            }
        }
    }
}
