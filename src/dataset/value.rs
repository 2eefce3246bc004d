//! Cell values of a [`crate::DataSet`] and the column types inferred from them.

use ordered_float::OrderedFloat;
use std::fmt;
use std::hash::{Hash, Hasher};

/// The type resolved for a whole column once all rows are loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Integer,
    Double,
    String,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Integer => "Integer",
            FieldType::Double => "Double",
            FieldType::String => "String",
        };
        write!(f, "{name}")
    }
}

/// A single cell.
///
/// Floats compare and hash through [`OrderedFloat`] so that values can key the
/// nested maps produced by [`crate::DataSet::to_map`].
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Opportunistically types a raw reply token.
    ///
    /// Tokens holding `.`, `e` or `E` are tried as floats (a lowercase exponent
    /// marker is upper-cased first), the others as integers. A token that fails
    /// to parse stays text. The exponent sign is kept as is: `1e-7` reads as
    /// `1E-7`, never `1E+7`.
    pub fn coerce(token: &str) -> Value {
        if token.contains(['.', 'e', 'E']) {
            let normalized = token.trim().replace("e+", "E+").replace("e-", "E-");
            match normalized.parse::<f64>() {
                Ok(value) => Value::Float(value),
                Err(_) => Value::Text(token.to_string()),
            }
        } else {
            match token.parse::<i64>() {
                Ok(value) => Value::Int(value),
                Err(_) => Value::Text(token.to_string()),
            }
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            Value::Int(_) => FieldType::Integer,
            Value::Float(_) => FieldType::Double,
            Value::Text(_) => FieldType::String,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(value) => Some(*value as f64),
            Value::Float(value) => Some(*value),
            Value::Text(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Widens an integer to a float, leaving other values untouched.
    pub(crate) fn widened(self) -> Value {
        match self {
            Value::Int(value) => Value::Float(value as f64),
            other => other,
        }
    }

    /// Turns a number back into its textual form, leaving text untouched.
    pub(crate) fn stringified(self) -> Value {
        match self {
            Value::Text(_) => self,
            number => Value::Text(number.to_string()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => OrderedFloat(*a) == OrderedFloat(*b),
            (Value::Text(a), Value::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Int(value) => value.hash(state),
            Value::Float(value) => OrderedFloat(*value).hash(state),
            Value::Text(text) => text.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(value) => write!(f, "{value}"),
            // Debug keeps the decimal point on whole floats ("3.0", not "3").
            Value::Float(value) => write!(f, "{value:?}"),
            Value::Text(text) => write!(f, "{text}"),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}
