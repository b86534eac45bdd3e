//! Trust boundary between generated JSON and the scene.
//!
//! Anything that reaches the scene store or the animation engine has gone
//! through [`validate`]. A candidate is accepted whole or rejected whole:
//! there is no clamping and no partial fill-in from defaults.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::model::{HexColor, PatternKind, PatternMovement, VisualParameters};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationFailure {
    /// The text is not JSON, or the top-level value is not an object.
    #[error("payload is not a JSON object: {message}")]
    Malformed { message: String },
    #[error("{path} is missing")]
    Missing { path: &'static str },
    /// Wrong primitive type or unknown enum value.
    #[error("{path}: {message}")]
    WrongType { path: &'static str, message: String },
    #[error("{field} = {value:?} is not a #RRGGBB color")]
    BadColor { field: &'static str, value: String },
    #[error("{field} = {value} is outside [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

#[derive(Debug, Clone, Copy)]
enum Leaf {
    Text,
    Number,
    Color,
    Kind,
    Movement,
}

/// Every required leaf, by dotted wire path.
const LEAVES: [(&str, Leaf); 18] = [
    ("text", Leaf::Text),
    ("subtitle", Leaf::Text),
    ("color.primary", Leaf::Color),
    ("color.accent", Leaf::Color),
    ("color.glow", Leaf::Color),
    ("material.transparency", Leaf::Number),
    ("material.roughness", Leaf::Number),
    ("material.metalness", Leaf::Number),
    ("material.refractiveIndex", Leaf::Number),
    ("animation.rotationSpeed", Leaf::Number),
    ("animation.floatAmplitude", Leaf::Number),
    ("animation.floatSpeed", Leaf::Number),
    ("pattern.type", Leaf::Kind),
    ("pattern.density", Leaf::Number),
    ("pattern.movement", Leaf::Movement),
    ("lighting.ambient", Leaf::Number),
    ("lighting.directional", Leaf::Number),
    ("lighting.spotlightColor", Leaf::Color),
];

/// Validate an arbitrary JSON value into [`VisualParameters`].
pub fn validate(candidate: &Value) -> Result<VisualParameters, ValidationFailure> {
    check_shape(candidate)?;
    let params = VisualParameters::deserialize(candidate).map_err(|e| ValidationFailure::Malformed {
        message: e.to_string(),
    })?;
    check_ranges(&params)?;
    Ok(params)
}

/// Validate JSON text. Decoding errors are reported as malformed payloads.
pub fn validate_str(candidate: &str) -> Result<VisualParameters, ValidationFailure> {
    let value: Value = serde_json::from_str(candidate).map_err(|e| ValidationFailure::Malformed {
        message: e.to_string(),
    })?;
    validate(&value)
}

/// Walk the candidate against [`LEAVES`] so a failure names the offending field.
fn check_shape(candidate: &Value) -> Result<(), ValidationFailure> {
    if !candidate.is_object() {
        return Err(ValidationFailure::Malformed {
            message: format!("found {}", describe(candidate)),
        });
    }
    for (path, leaf) in LEAVES {
        check_leaf(path, leaf, lookup(candidate, path)?)?;
    }
    Ok(())
}

fn lookup<'v>(root: &'v Value, path: &'static str) -> Result<&'v Value, ValidationFailure> {
    let mut cursor = root;
    let mut end = 0;
    for (i, key) in path.split('.').enumerate() {
        let parent = path.get(..end).unwrap_or(path);
        if i > 0 {
            end += 1;
        }
        end += key.len();
        let object = cursor.as_object().ok_or_else(|| ValidationFailure::WrongType {
            path: parent,
            message: format!("expected an object, found {}", describe(cursor)),
        })?;
        cursor = object.get(key).ok_or(ValidationFailure::Missing {
            path: path.get(..end).unwrap_or(path),
        })?;
    }
    Ok(cursor)
}

fn check_leaf(path: &'static str, leaf: Leaf, value: &Value) -> Result<(), ValidationFailure> {
    let wrong = |expected: &str| ValidationFailure::WrongType {
        path,
        message: format!("expected {expected}, found {}", describe(value)),
    };
    let unknown = |e: serde_json::Error| ValidationFailure::WrongType {
        path,
        message: e.to_string(),
    };
    match leaf {
        Leaf::Text => value.as_str().map(drop).ok_or_else(|| wrong("a string")),
        Leaf::Number if value.is_number() => Ok(()),
        Leaf::Number => Err(wrong("a number")),
        Leaf::Color => {
            let text = value.as_str().ok_or_else(|| wrong("a color string"))?;
            match HexColor::parse(text) {
                Some(_) => Ok(()),
                None => Err(ValidationFailure::BadColor {
                    field: path,
                    value: text.to_string(),
                }),
            }
        }
        Leaf::Kind => PatternKind::deserialize(value).map(drop).map_err(unknown),
        Leaf::Movement => PatternMovement::deserialize(value).map(drop).map_err(unknown),
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Range-check an already typed value. Types cannot express the numeric
/// intervals, so this is the part of validation that survives deserialisation.
pub fn check_ranges(params: &VisualParameters) -> Result<(), ValidationFailure> {
    for (field, value, range) in params.numeric_fields() {
        // `contains` is false for NaN, so non-finite values fail here too.
        if !value.is_finite() || !range.contains(&value) {
            return Err(ValidationFailure::OutOfRange {
                field,
                value,
                min: *range.start(),
                max: *range.end(),
            });
        }
    }
    Ok(())
}
