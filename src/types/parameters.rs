//! Model parameters sent along a weather-generation or model request, and
//! parsed back from the server's default-parameter reply.

use indexmap::IndexMap;
use std::fmt;

const PAIR_SEPARATOR: char = '*';
const KEY_VALUE_SEPARATOR: char = ':';

/// A single parameter value. The service only understands text and numbers.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Text(text) => write!(f, "{}", text.trim()),
            ParameterValue::Integer(value) => write!(f, "{value}"),
            ParameterValue::Float(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        ParameterValue::Text(value.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(value: String) -> Self {
        ParameterValue::Text(value)
    }
}

impl From<i64> for ParameterValue {
    fn from(value: i64) -> Self {
        ParameterValue::Integer(value)
    }
}

impl From<i32> for ParameterValue {
    fn from(value: i32) -> Self {
        ParameterValue::Integer(value.into())
    }
}

impl From<f64> for ParameterValue {
    fn from(value: f64) -> Self {
        ParameterValue::Float(value)
    }
}

/// An insertion-ordered set of named model parameters.
///
/// Serializes as `key1:value1*key2:value2`. An empty value serializes as nothing
/// after the colon (`key:`), never as `null`.
///
/// # Examples
///
/// ```
/// use biosim::ParameterMap;
///
/// let mut parms = ParameterMap::new();
/// parms.add_parameter("LowerThreshold", 5);
/// parms.add_parameter("Method", "");
/// assert_eq!(parms.to_string(), "LowerThreshold:5*Method:");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterMap {
    entries: IndexMap<String, ParameterValue>,
}

impl ParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a parameter. The name is trimmed.
    pub fn add_parameter(&mut self, name: &str, value: impl Into<ParameterValue>) {
        self.entries.insert(name.trim().to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.entries.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParameterValue)> {
        self.entries.iter()
    }

    /// Parses a `key:value*key:value` string as returned by the
    /// `BioSimModelDefaultParameters` endpoint. Every value is kept as text.
    pub fn parse(reply: &str) -> Self {
        let mut map = Self::new();
        for pair in reply.split(PAIR_SEPARATOR).filter(|p| !p.trim().is_empty()) {
            let (key, value) = pair.split_once(KEY_VALUE_SEPARATOR).unwrap_or((pair, ""));
            map.add_parameter(key, value.trim());
        }
        map
    }
}

impl fmt::Display for ParameterMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, "{PAIR_SEPARATOR}")?;
            }
            write!(f, "{key}{KEY_VALUE_SEPARATOR}{value}")?;
        }
        Ok(())
    }
}
