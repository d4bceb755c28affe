//! Log event model consumed by the deduplication filter.
//!
//! A [`LogEvent`] carries a severity, the raw (unrendered) message template,
//! and a set of named properties. Property values are either scalars or
//! composites; scalars render without quoting when they take part in a
//! deduplication key.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::severity::Severity;

/// A single primitive property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    /// Absent or null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer value.
    I64(i64),
    /// Unsigned integer value.
    U64(u64),
    /// Floating point value.
    F64(f64),
    /// Text value.
    Str(String),
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => f.write_str("null"),
            ScalarValue::Bool(v) => write!(f, "{}", v),
            ScalarValue::I64(v) => write!(f, "{}", v),
            ScalarValue::U64(v) => write!(f, "{}", v),
            ScalarValue::F64(v) => write!(f, "{}", v),
            ScalarValue::Str(v) => f.write_str(v),
        }
    }
}

/// A property value attached to a log event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    /// A wrapped primitive.
    Scalar(ScalarValue),
    /// An ordered list of values.
    Sequence(Vec<PropertyValue>),
    /// A named set of values.
    Structure(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    /// Returns the wrapped scalar, if this is one.
    pub fn as_scalar(&self) -> Option<&ScalarValue> {
        match self {
            PropertyValue::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }
}

/// Generic rendering: strings are quoted, composites are bracketed.
impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Scalar(ScalarValue::Str(s)) => write!(f, "{:?}", s),
            PropertyValue::Scalar(scalar) => write!(f, "{}", scalar),
            PropertyValue::Sequence(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            PropertyValue::Structure(fields) => {
                f.write_str("{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, " {}: {}", name, value)?;
                }
                f.write_str(" }")
            }
        }
    }
}

impl From<ScalarValue> for PropertyValue {
    fn from(value: ScalarValue) -> Self {
        PropertyValue::Scalar(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Scalar(ScalarValue::Str(value.to_string()))
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Scalar(ScalarValue::Str(value))
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Scalar(ScalarValue::Bool(value))
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Scalar(ScalarValue::I64(value))
    }
}

impl From<u64> for PropertyValue {
    fn from(value: u64) -> Self {
        PropertyValue::Scalar(ScalarValue::U64(value))
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Scalar(ScalarValue::F64(value))
    }
}

/// A discrete log event as seen by the filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Severity tier.
    pub severity: Severity,
    /// Raw message template text, before property substitution.
    pub message_template: String,
    /// Named properties.
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

impl LogEvent {
    /// Creates an event with no properties.
    pub fn new(severity: Severity, message_template: impl Into<String>) -> Self {
        Self {
            severity,
            message_template: message_template.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Adds or replaces a property.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Looks up a property by exact name.
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_display_is_unquoted() {
        assert_eq!(ScalarValue::Str("App".to_string()).to_string(), "App");
        assert_eq!(ScalarValue::I64(-7).to_string(), "-7");
        assert_eq!(ScalarValue::Null.to_string(), "null");
    }

    #[test]
    fn test_property_display_quotes_strings() {
        let value = PropertyValue::from("123");
        assert_eq!(value.to_string(), "\"123\"");
    }

    #[test]
    fn test_sequence_display() {
        let value = PropertyValue::Sequence(vec![1i64.into(), "a".into()]);
        assert_eq!(value.to_string(), "[1, \"a\"]");
    }

    #[test]
    fn test_structure_display() {
        let mut fields = BTreeMap::new();
        fields.insert("id".to_string(), PropertyValue::from(5u64));
        fields.insert("name".to_string(), PropertyValue::from("disk"));
        let value = PropertyValue::Structure(fields);
        assert_eq!(value.to_string(), "{ id: 5, name: \"disk\" }");
    }

    #[test]
    fn test_with_property_and_lookup() {
        let event = LogEvent::new(Severity::Error, "Disk {Device} full")
            .with_property("Device", "sda")
            .with_property("Code", 42i64);
        assert_eq!(event.property("Device"), Some(&PropertyValue::from("sda")));
        assert!(event.property("Missing").is_none());
        assert_eq!(
            event.property("Code").and_then(PropertyValue::as_scalar),
            Some(&ScalarValue::I64(42))
        );
    }

    #[test]
    fn test_event_from_json() {
        let json = r#"{
            "severity": "Warning",
            "message_template": "Retrying {Attempt}",
            "properties": { "Attempt": { "Scalar": { "U64": 3 } } }
        }"#;
        let event: LogEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.severity, Severity::Warning);
        assert_eq!(event.property("Attempt"), Some(&PropertyValue::from(3u64)));
    }
}
