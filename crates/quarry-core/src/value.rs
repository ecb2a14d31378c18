//! Dynamic field values and rows
//!
//! Rows flow between records, drivers and the filter language as ordered
//! maps of field name to [`Value`]. Comparison and truthiness follow the
//! loose scripting semantics the filter language is specified against.

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// A single row: field name to value, in insertion order
pub type Row = IndexMap<String, Value>;

/// Textual date layout used for storage and display
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Build a [`Row`] from `key => value` pairs
///
/// ```
/// use quarry_core::{row, Value};
///
/// let r = row! { "name" => "Ada", "age" => 36 };
/// assert_eq!(r.get("age"), Some(&Value::Int(36)));
/// ```
#[macro_export]
macro_rules! row {
    () => { $crate::value::Row::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut row = $crate::value::Row::new();
        $( row.insert(::std::string::String::from($key), $crate::value::Value::from($value)); )+
        row
    }};
}

/// A dynamically typed field value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDateTime),
    /// Opaque structured value (arrays, objects)
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Truthiness: null, false, zero, NaN and the empty string are falsy
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::Text(s) => !s.is_empty(),
            Value::Date(_) | Value::Json(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Float(_) => "number",
            Value::Text(_) => "string",
            Value::Date(_) => "date",
            Value::Json(_) => "structured",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view of the value; text is parsed, integral floats are narrowed
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(*f as i64),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Numeric view of the value; blank text reads as zero
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    Some(0.0)
                } else {
                    trimmed.parse().ok()
                }
            }
            _ => None,
        }
    }

    /// Identity comparison: same type and same value; ints and floats are one number type
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (a, b) if a.is_number() && b.is_number() => a.as_f64() == b.as_f64(),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Json(a), Value::Json(b)) => a == b,
            _ => false,
        }
    }

    /// Coercing comparison: numbers, numeric text and booleans compare numerically
    pub fn loose_eq(&self, other: &Value) -> bool {
        if self.strict_eq(other) {
            return true;
        }
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Json(_), _) | (_, Value::Json(_)) => false,
            (Value::Text(_), Value::Text(_)) => false,
            (Value::Date(d), Value::Text(s)) | (Value::Text(s), Value::Date(d)) => {
                d.format(DATE_FORMAT).to_string() == *s
            }
            (Value::Date(_), _) | (_, Value::Date(_)) => false,
            _ => matches!((self.as_f64(), other.as_f64()), (Some(a), Some(b)) if a == b),
        }
    }

    /// Relational comparison; `None` when the pair has no meaningful order
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Json(_), _) | (_, Value::Json(_)) => None,
            (Value::Date(_), _) | (_, Value::Date(_)) => None,
            _ => {
                let (a, b) = (self.as_f64()?, other.as_f64()?);
                a.partial_cmp(&b)
            }
        }
    }

    /// Total order used for sorting; unordered pairs fall back to a type rank
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        self.compare(other)
            .unwrap_or_else(|| self.rank().cmp(&other.rank()))
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Text(_) => 3,
            Value::Date(_) => 4,
            Value::Json(_) => 5,
        }
    }

    /// String key used to index rows and registries by primary key
    pub fn key(&self) -> String {
        self.to_string()
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Date(d) => serde_json::Value::String(d.format(DATE_FORMAT).to_string()),
            Value::Json(v) => v.clone(),
        }
    }

    /// Scalars map to their native variant; arrays and objects stay structured
    pub fn from_json(value: serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::Text(s),
            other => Value::Json(other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e15 => {
                write!(f, "{}", *x as i64)
            }
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => f.write_str(s),
            Value::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Value::Json(v) => write!(f, "{}", v),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        i64::try_from(v)
            .map(Value::Int)
            .unwrap_or(Value::Float(v as f64))
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::from(v as u64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Date(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl From<&Value> for Value {
    fn from(v: &Value) -> Self {
        v.clone()
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Serialize a row to a JSON object
pub fn row_to_json(row: &Row) -> serde_json::Value {
    serde_json::Value::Object(
        row.iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

/// Read a JSON object into a row; non-objects yield an empty row
pub fn row_from_json(value: serde_json::Value) -> Row {
    match value {
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| (k, Value::from_json(v)))
            .collect(),
        _ => Row::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Float(f64::NAN).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("0").is_truthy());
        assert!(Value::Json(serde_json::json!([])).is_truthy());
    }

    #[test]
    fn test_strict_eq_treats_int_and_float_as_number() {
        assert!(Value::Int(3).strict_eq(&Value::Float(3.0)));
        assert!(!Value::Int(3).strict_eq(&Value::from("3")));
        assert!(!Value::Null.strict_eq(&Value::Bool(false)));
    }

    #[test]
    fn test_loose_eq_coerces_numeric_text() {
        assert!(Value::Int(3).loose_eq(&Value::from("3")));
        assert!(Value::Bool(true).loose_eq(&Value::Int(1)));
        assert!(!Value::from("1").loose_eq(&Value::from("1.0")));
        assert!(!Value::Null.loose_eq(&Value::Int(0)));
    }

    #[test]
    fn test_compare_mixed_types_is_unordered() {
        assert_eq!(Value::Int(2).compare(&Value::Float(2.5)), Some(Ordering::Less));
        assert_eq!(Value::from("b").compare(&Value::from("a")), Some(Ordering::Greater));
        assert_eq!(Value::from("abc").compare(&Value::Int(5)), None);
        assert_eq!(Value::Null.compare(&Value::Int(5)), None);
    }

    #[test]
    fn test_display_of_integral_float_matches_int() {
        assert_eq!(Value::Float(4.0).to_string(), "4");
        assert_eq!(Value::Int(4).key(), Value::Float(4.0).key());
        assert_eq!(Value::Float(4.5).to_string(), "4.5");
    }

    #[test]
    fn test_row_macro_and_json() {
        let r = row! { "name" => "Ada", "tags" => serde_json::json!(["x"]) };
        let json = row_to_json(&r);
        assert_eq!(json["name"], "Ada");
        let back = row_from_json(json);
        assert_eq!(back.get("tags"), Some(&Value::Json(serde_json::json!(["x"]))));
    }
}
