//! Scalar-or-list field values.
//!
//! The EPrints JSON export wraps nearly every field in a list, even when the
//! field is semantically a single value. Modelling that ambiguity as an
//! explicit tagged value keeps the folding rules total functions instead of
//! runtime type checks scattered through the normalizer.

use serde_json::Value;

/// Delimiter used when folding multi-valued fields for CSV import.
pub const LIST_DELIMITER: &str = "|";
/// Escape prefix applied to literal delimiters found inside values.
pub const ESCAPE_CHARACTER: &str = "\\";

/// A raw field value: either a single string or an ordered list of strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Scalar(String),
    List(Vec<String>),
}

impl FieldValue {
    /// Interpret a JSON value from the export as a field value.
    ///
    /// Numbers and booleans occur occasionally in the data; they are carried
    /// through in their display form. Nulls and nested objects have no
    /// field-value interpretation and yield `None`.
    pub fn from_json(value: &Value) -> Option<FieldValue> {
        match value {
            Value::String(s) => Some(FieldValue::Scalar(s.clone())),
            Value::Number(n) => Some(FieldValue::Scalar(n.to_string())),
            Value::Bool(b) => Some(FieldValue::Scalar(b.to_string())),
            Value::Array(items) => {
                let mut list = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(s) => list.push(s.clone()),
                        Value::Number(n) => list.push(n.to_string()),
                        Value::Bool(b) => list.push(b.to_string()),
                        _ => return None,
                    }
                }
                Some(FieldValue::List(list))
            }
            _ => None,
        }
    }

    pub fn into_json(self) -> Value {
        match self {
            FieldValue::Scalar(s) => Value::String(s),
            FieldValue::List(items) => {
                Value::Array(items.into_iter().map(Value::String).collect())
            }
        }
    }

    /// Collapse a single-element list to its scalar element. Multi-element
    /// lists and scalars pass through unchanged.
    pub fn collapse(self) -> FieldValue {
        match self {
            FieldValue::List(mut items) if items.len() == 1 => {
                FieldValue::Scalar(items.remove(0))
            }
            other => other,
        }
    }

    /// The scalar itself, or the first element of a list.
    pub fn first(&self) -> Option<&str> {
        match self {
            FieldValue::Scalar(s) => Some(s),
            FieldValue::List(items) => items.first().map(String::as_str),
        }
    }

    /// True for the empty scalar and the empty list. Required-field
    /// defaulting treats both the same as an absent field.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Scalar(s) => s.is_empty(),
            FieldValue::List(items) => items.is_empty(),
        }
    }

    /// Final folding pass: multi-element lists become a single delimited
    /// string with embedded delimiters escaped, single-element lists collapse
    /// to their scalar. Idempotent on scalars.
    pub fn fold(self) -> FieldValue {
        match self {
            FieldValue::List(mut items) if items.len() == 1 => {
                FieldValue::Scalar(items.remove(0))
            }
            FieldValue::List(items) if items.len() > 1 => {
                FieldValue::Scalar(stringify_list(LIST_DELIMITER, &items, ESCAPE_CHARACTER))
            }
            other => other,
        }
    }
}

/// Join a list into a delimited string for CSV import, escaping any literal
/// occurrence of the delimiter inside a value first.
pub fn stringify_list(delimiter: &str, values: &[String], escape_character: &str) -> String {
    let escaped_delimiter = format!("{}{}", escape_character, delimiter);
    let mut new_string = String::new();
    for value in values {
        let value = if value.contains(delimiter) {
            value.replace(delimiter, &escaped_delimiter)
        } else {
            value.clone()
        };
        if new_string.is_empty() {
            new_string = value;
        } else {
            new_string.push_str(delimiter);
            new_string.push_str(&value);
        }
    }
    new_string
}
