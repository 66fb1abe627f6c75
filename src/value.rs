//! Script value model and JSON boundary
//!
//! [`Value`] is the only type that crosses the host/script boundary. Integers
//! and floats are distinct tags; Lua's unified number type is disambiguated on
//! re-entry by [`Value::canonicalize`]. Strings are UTF-8 throughout.

use std::collections::BTreeMap;

use crate::error::{RedirsError, Result};

/// A value flowing between host code and scripts
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent / nil
    Null,

    /// UTF-8 string
    Str(String),

    /// Signed integer
    Int(i64),

    /// Double precision float
    Float(f64),

    /// Boolean
    Bool(bool),

    /// Ordered sequence
    List(Vec<Value>),

    /// String-keyed mapping (ordered for deterministic encoding)
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Host truthiness: `Null`, `false`, `0`, `0.0` and the empty string are
    /// falsy, everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(_) | Value::Map(_) => true,
        }
    }

    /// Redis-style stringification. Integral floats carry no trailing `.0`,
    /// booleans become `1`/`0`, `Null` becomes the empty string.
    pub fn redis_str(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Str(s) => s.clone(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Bool(b) => {
                if *b {
                    "1".to_string()
                } else {
                    "0".to_string()
                }
            }
            Value::List(_) => "list".to_string(),
            Value::Map(_) => "map".to_string(),
        }
    }

    /// Numeric view of this value, coercing strings by parsing.
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Int(n) => Some(Number::Int(*n)),
            Value::Float(f) => Some(Number::Float(*f)),
            Value::Str(s) => {
                let s = s.trim();
                if let Ok(n) = s.parse::<i64>() {
                    Some(Number::Int(n))
                } else {
                    s.parse::<f64>().ok().map(Number::Float)
                }
            }
            Value::Bool(b) => Some(Number::Int(i64::from(*b))),
            _ => None,
        }
    }

    /// Convert to the serde_json representation used on the wire.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Build a value from decoded JSON. Numbers without a fractional part
    /// become `Int`, all others `Float`.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Strict JSON encoding (no trailing commas, `null` for `Null`).
    pub fn encode(&self) -> String {
        self.to_json().to_string()
    }

    /// Decode a JSON string into a value.
    pub fn decode(text: &str) -> Result<Value> {
        let json: serde_json::Value = serde_json::from_str(text)?;
        Ok(Value::from_json(&json))
    }

    /// Boundary canonicalization applied to every script return value:
    /// integral floats collapse to integers recursively (Lua has a single
    /// number type), and at the outermost level only, empty containers
    /// collapse to `Null`.
    pub fn canonicalize(self) -> Value {
        let v = self.unify_numbers();
        match v {
            Value::List(ref items) if items.is_empty() => Value::Null,
            Value::Map(ref map) if map.is_empty() => Value::Null,
            other => other,
        }
    }

    fn unify_numbers(self) -> Value {
        match self {
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() && in_i64_range(f) => {
                Value::Int(f as i64)
            }
            Value::List(items) => {
                Value::List(items.into_iter().map(Value::unify_numbers).collect())
            }
            Value::Map(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (k, v.unify_numbers()))
                    .collect(),
            ),
            other => other,
        }
    }

    // Shape accessors used by the client facade. The backends uphold the
    // reply shapes, so a mismatch is an internal contract violation and
    // surfaces as a parse error.

    pub(crate) fn into_opt_string(self) -> Result<Option<String>> {
        match self {
            Value::Null => Ok(None),
            Value::Str(s) => Ok(Some(s)),
            other => Err(shape_error("string or null", &other)),
        }
    }

    pub(crate) fn into_int(self) -> Result<i64> {
        match self {
            Value::Int(n) => Ok(n),
            other => Err(shape_error("integer", &other)),
        }
    }

    pub(crate) fn into_bool(self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(b),
            other => Err(shape_error("boolean", &other)),
        }
    }

    pub(crate) fn into_string_list(self) -> Result<Vec<String>> {
        match self {
            Value::Null => Ok(Vec::new()),
            Value::List(items) => items
                .into_iter()
                .map(|v| match v {
                    Value::Str(s) => Ok(s),
                    other => Err(shape_error("string", &other)),
                })
                .collect(),
            other => Err(shape_error("list of strings", &other)),
        }
    }

    pub(crate) fn into_opt_string_list(self) -> Result<Vec<Option<String>>> {
        match self {
            Value::Null => Ok(Vec::new()),
            Value::List(items) => items
                .into_iter()
                .map(|v| match v {
                    Value::Null => Ok(None),
                    Value::Str(s) => Ok(Some(s)),
                    other => Err(shape_error("string or null", &other)),
                })
                .collect(),
            other => Err(shape_error("list", &other)),
        }
    }

    pub(crate) fn into_string_map(self) -> Result<BTreeMap<String, String>> {
        match self {
            Value::Null => Ok(BTreeMap::new()),
            Value::Map(map) => map
                .into_iter()
                .map(|(k, v)| match v {
                    Value::Str(s) => Ok((k, s)),
                    other => Err(shape_error("string", &other)),
                })
                .collect(),
            other => Err(shape_error("map", &other)),
        }
    }

    pub(crate) fn into_scored_pairs(self) -> Result<Vec<(String, f64)>> {
        match self {
            Value::Null => Ok(Vec::new()),
            Value::List(items) => items
                .into_iter()
                .map(|pair| match pair {
                    Value::List(entry) if entry.len() == 2 => {
                        let mut entry = entry.into_iter();
                        let member = match entry.next() {
                            Some(Value::Str(member)) => member,
                            other => {
                                return Err(shape_error(
                                    "member",
                                    other.as_ref().unwrap_or(&Value::Null),
                                ))
                            }
                        };
                        let score = entry
                            .next()
                            .and_then(|v| v.as_number())
                            .map(Number::as_f64)
                            .ok_or_else(|| shape_error("score", &Value::Null))?;
                        Ok((member, score))
                    }
                    other => Err(shape_error("member/score pair", &other)),
                })
                .collect(),
            other => Err(shape_error("list of pairs", &other)),
        }
    }
}

fn shape_error(expected: &str, got: &Value) -> RedirsError {
    RedirsError::Parse(format!("expected {expected}, got {got:?}"))
}

fn in_i64_range(f: f64) -> bool {
    f >= i64::MIN as f64 && f <= i64::MAX as f64
}

/// Format a float the way Redis prints scores: shortest form, no trailing
/// `.0` for integral values.
pub fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.is_finite() && in_i64_range(f) {
        format!("{}", f as i64)
    } else {
        format!("{f}")
    }
}

/// A number with the integer/float distinction preserved
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(f) => f,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Number::Int(n) => Value::Int(n),
            Number::Float(f) => Value::Float(f),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());

        assert!(Value::Int(-1).is_truthy());
        assert!(Value::Str(" ".to_string()).is_truthy());
        assert!(Value::List(vec![]).is_truthy());
    }

    #[test]
    fn test_redis_str() {
        assert_eq!(Value::Int(42).redis_str(), "42");
        assert_eq!(Value::Float(3.0).redis_str(), "3");
        assert_eq!(Value::Float(3.5).redis_str(), "3.5");
        assert_eq!(Value::Bool(true).redis_str(), "1");
        assert_eq!(Value::Null.redis_str(), "");
    }

    #[test]
    fn test_json_round_trip() {
        let v = Value::List(vec![
            Value::Int(1),
            Value::Float(2.5),
            Value::Str("x".to_string()),
            Value::Null,
            Value::Bool(true),
        ]);
        assert_eq!(Value::decode(&v.encode()).unwrap(), v);
    }

    #[test]
    fn test_json_number_split() {
        assert_eq!(Value::decode("7").unwrap(), Value::Int(7));
        assert_eq!(Value::decode("7.5").unwrap(), Value::Float(7.5));
    }

    #[test]
    fn test_canonicalize_collapses_outermost_empty() {
        assert_eq!(Value::List(vec![]).canonicalize(), Value::Null);
        assert_eq!(Value::Map(BTreeMap::new()).canonicalize(), Value::Null);

        // Nested empties are kept, only the outermost collapses.
        let nested = Value::List(vec![Value::List(vec![])]);
        assert_eq!(
            nested.canonicalize(),
            Value::List(vec![Value::List(vec![])])
        );
    }

    #[test]
    fn test_canonicalize_unifies_numbers() {
        let v = Value::List(vec![Value::Float(2.0), Value::Float(2.5)]);
        assert_eq!(
            v.canonicalize(),
            Value::List(vec![Value::Int(2), Value::Float(2.5)])
        );
    }

    #[test]
    fn test_number_coercion() {
        assert_eq!(Value::Str("12".into()).as_number(), Some(Number::Int(12)));
        assert_eq!(
            Value::Str("1.5".into()).as_number(),
            Some(Number::Float(1.5))
        );
        assert_eq!(Value::Str("abc".into()).as_number(), None);
    }
}
