//! Cacheable values and their string serialization.
//!
//! Every value is stored as a string plus a [`ValueType`] tag; the tag is
//! what restores the original type on read. Scalars use their literal form,
//! objects and arrays go through `serde_json`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while converting values to or from their stored form
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValueError {
    #[error("value cannot be cached: {0}")]
    NonCachable(&'static str),

    #[error("unknown value type tag: {0}")]
    UnknownType(String),

    #[error("stored value does not parse as {expected}: {reason}")]
    Malformed {
        expected: ValueType,
        reason: String,
    },
}

/// Type tag persisted next to every stored value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Boolean,
    BigInt,
    Object,
    Array,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Number => "number",
            ValueType::Boolean => "boolean",
            ValueType::BigInt => "bigint",
            ValueType::Object => "object",
            ValueType::Array => "array",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = ValueError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "string" => Ok(ValueType::String),
            "number" => Ok(ValueType::Number),
            "boolean" => Ok(ValueType::Boolean),
            "bigint" => Ok(ValueType::BigInt),
            "object" => Ok(ValueType::Object),
            "array" => Ok(ValueType::Array),
            other => Err(ValueError::UnknownType(other.to_string())),
        }
    }
}

/// A value the cache can hold
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    String(String),
    Number(f64),
    Boolean(bool),
    BigInt(i128),
    Object(Map<String, Value>),
    Array(Vec<Value>),
}

impl CacheValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            CacheValue::String(_) => ValueType::String,
            CacheValue::Number(_) => ValueType::Number,
            CacheValue::Boolean(_) => ValueType::Boolean,
            CacheValue::BigInt(_) => ValueType::BigInt,
            CacheValue::Object(_) => ValueType::Object,
            CacheValue::Array(_) => ValueType::Array,
        }
    }

    /// Reject values that would not survive a serialize/restore cycle
    pub fn validate(&self) -> Result<(), ValueError> {
        match self {
            CacheValue::Number(n) if !n.is_finite() => {
                Err(ValueError::NonCachable("non-finite number"))
            }
            _ => Ok(()),
        }
    }

    /// Serialize to the stored string form (the tag is kept separately)
    pub fn serialize(&self) -> Result<String, ValueError> {
        self.validate()?;
        let raw = match self {
            CacheValue::String(s) => s.clone(),
            CacheValue::Number(n) => n.to_string(),
            CacheValue::Boolean(b) => b.to_string(),
            CacheValue::BigInt(i) => i.to_string(),
            CacheValue::Object(map) => to_json(map, ValueType::Object)?,
            CacheValue::Array(items) => to_json(items, ValueType::Array)?,
        };
        Ok(raw)
    }

    /// Restore a value from its stored string and tag
    pub fn deserialize(raw: &str, value_type: ValueType) -> Result<Self, ValueError> {
        let malformed = |reason: String| ValueError::Malformed {
            expected: value_type,
            reason,
        };

        match value_type {
            ValueType::String => Ok(CacheValue::String(raw.to_string())),
            ValueType::Number => raw
                .parse::<f64>()
                .map(CacheValue::Number)
                .map_err(|e| malformed(e.to_string())),
            ValueType::Boolean => raw
                .parse::<bool>()
                .map(CacheValue::Boolean)
                .map_err(|e| malformed(e.to_string())),
            ValueType::BigInt => raw
                .parse::<i128>()
                .map(CacheValue::BigInt)
                .map_err(|e| malformed(e.to_string())),
            ValueType::Object => serde_json::from_str(raw)
                .map(CacheValue::Object)
                .map_err(|e| malformed(e.to_string())),
            ValueType::Array => serde_json::from_str(raw)
                .map(CacheValue::Array)
                .map_err(|e| malformed(e.to_string())),
        }
    }

    /// Convert into a JSON value; big integers become JSON strings
    pub fn into_json(self) -> Value {
        match self {
            CacheValue::String(s) => Value::String(s),
            CacheValue::Number(n) => serde_json::Number::from_f64(n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            CacheValue::Boolean(b) => Value::Bool(b),
            CacheValue::BigInt(i) => Value::String(i.to_string()),
            CacheValue::Object(map) => Value::Object(map),
            CacheValue::Array(items) => Value::Array(items),
        }
    }
}

fn to_json<T: Serialize>(value: &T, value_type: ValueType) -> Result<String, ValueError> {
    serde_json::to_string(value).map_err(|e| ValueError::Malformed {
        expected: value_type,
        reason: e.to_string(),
    })
}

impl From<String> for CacheValue {
    fn from(s: String) -> Self {
        CacheValue::String(s)
    }
}

impl From<&str> for CacheValue {
    fn from(s: &str) -> Self {
        CacheValue::String(s.to_string())
    }
}

impl From<f64> for CacheValue {
    fn from(n: f64) -> Self {
        CacheValue::Number(n)
    }
}

impl From<i32> for CacheValue {
    fn from(n: i32) -> Self {
        CacheValue::Number(f64::from(n))
    }
}

impl From<i128> for CacheValue {
    fn from(i: i128) -> Self {
        CacheValue::BigInt(i)
    }
}

impl From<bool> for CacheValue {
    fn from(b: bool) -> Self {
        CacheValue::Boolean(b)
    }
}

impl From<Vec<Value>> for CacheValue {
    fn from(items: Vec<Value>) -> Self {
        CacheValue::Array(items)
    }
}

impl From<Map<String, Value>> for CacheValue {
    fn from(map: Map<String, Value>) -> Self {
        CacheValue::Object(map)
    }
}

impl TryFrom<Value> for CacheValue {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Err(ValueError::NonCachable("null has no cacheable representation")),
            Value::Bool(b) => Ok(CacheValue::Boolean(b)),
            Value::Number(n) => n
                .as_f64()
                .map(CacheValue::Number)
                .ok_or(ValueError::NonCachable("number outside f64 range")),
            Value::String(s) => Ok(CacheValue::String(s)),
            Value::Array(items) => Ok(CacheValue::Array(items)),
            Value::Object(map) => Ok(CacheValue::Object(map)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn restore(value: &CacheValue) -> CacheValue {
        let raw = value.serialize().unwrap();
        CacheValue::deserialize(&raw, value.value_type()).unwrap()
    }

    #[test]
    fn test_scalar_literals() {
        assert_eq!(CacheValue::Number(1.5).serialize().unwrap(), "1.5");
        assert_eq!(CacheValue::Boolean(false).serialize().unwrap(), "false");
        assert_eq!(
            CacheValue::BigInt(170141183460469231731687303715884105727).serialize().unwrap(),
            "170141183460469231731687303715884105727"
        );
        assert_eq!(CacheValue::from("plain").serialize().unwrap(), "plain");
    }

    #[test]
    fn test_structured_values_restore() {
        let object = CacheValue::try_from(json!({"a": 1, "b": [true, null]})).unwrap();
        let array = CacheValue::try_from(json!([1, "two", {"three": 3}])).unwrap();

        assert_eq!(restore(&object), object);
        assert_eq!(restore(&array), array);
    }

    #[test]
    fn test_string_that_looks_like_number_stays_string() {
        let value = CacheValue::from("42");
        assert_eq!(restore(&value), CacheValue::String("42".into()));
    }

    #[test]
    fn test_null_is_not_cachable() {
        assert!(matches!(
            CacheValue::try_from(Value::Null),
            Err(ValueError::NonCachable(_))
        ));
    }

    #[test]
    fn test_non_finite_number_is_not_cachable() {
        assert!(matches!(
            CacheValue::Number(f64::NAN).validate(),
            Err(ValueError::NonCachable(_))
        ));
        assert!(CacheValue::Number(f64::INFINITY).serialize().is_err());
    }

    #[test]
    fn test_type_tag_roundtrip() {
        for tag in ["string", "number", "boolean", "bigint", "object", "array"] {
            assert_eq!(tag.parse::<ValueType>().unwrap().as_str(), tag);
        }
        assert!(matches!(
            "symbol".parse::<ValueType>(),
            Err(ValueError::UnknownType(_))
        ));
    }

    #[test]
    fn test_malformed_stored_value() {
        let result = CacheValue::deserialize("not-a-bool", ValueType::Boolean);
        assert!(matches!(
            result,
            Err(ValueError::Malformed {
                expected: ValueType::Boolean,
                ..
            })
        ));
    }
}
