//! Runtime values carried by events
//!
//! This module defines the `Value` enum that every attribute of every event
//! holds at runtime, together with the `AttributeType` that a stream
//! definition declares for it.
//!
//! Two orderings exist:
//! - [`Value::compare`] is the partial comparison used by evaluators. It is
//!   `None` whenever either side is null or the two sides are not comparable.
//! - The total [`Ord`] implementation is used by indexes. It agrees with
//!   `compare` for every non-null, type-compatible pair, ranks `Null` lowest
//!   and groups values by kind (bool, numeric, string).

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Declared type of a stream or table attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeType {
    String,
    Int,
    Long,
    Float,
    Double,
    Bool,
    /// Untyped; the static type of a null constant
    Object,
}

impl AttributeType {
    /// Check if this is one of the numeric types
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::Long | Self::Float | Self::Double)
    }

    /// Numeric widening rank (int < long < float < double)
    const fn numeric_rank(&self) -> Option<u8> {
        match self {
            Self::Int => Some(0),
            Self::Long => Some(1),
            Self::Float => Some(2),
            Self::Double => Some(3),
            _ => None,
        }
    }

    /// The wider of two numeric types, `None` if either is not numeric
    pub fn widen(self, other: AttributeType) -> Option<AttributeType> {
        let (a, b) = (self.numeric_rank()?, other.numeric_rank()?);
        Some(if a >= b { self } else { other })
    }

    /// Name as used in error messages
    pub const fn name(&self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Int => "INT",
            Self::Long => "LONG",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::Bool => "BOOL",
            Self::Object => "OBJECT",
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A runtime attribute value
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

/// Comparison class of a value; `Ord` ranks kinds before comparing contents
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Kind {
    Null,
    Bool,
    Numeric,
    String,
}

impl Value {
    /// Check if this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Check if this value is boolean `true`. Null and non-booleans are not.
    pub fn is_true(&self) -> bool {
        matches!(self, Self::Bool(true))
    }

    /// Runtime type of this value (`Object` for null)
    pub fn attribute_type(&self) -> AttributeType {
        match self {
            Self::Null => AttributeType::Object,
            Self::Bool(_) => AttributeType::Bool,
            Self::Int(_) => AttributeType::Int,
            Self::Long(_) => AttributeType::Long,
            Self::Float(_) => AttributeType::Float,
            Self::Double(_) => AttributeType::Double,
            Self::String(_) => AttributeType::String,
        }
    }

    fn kind(&self) -> Kind {
        match self {
            Self::Null => Kind::Null,
            Self::Bool(_) => Kind::Bool,
            Self::Int(_) | Self::Long(_) | Self::Float(_) | Self::Double(_) => Kind::Numeric,
            Self::String(_) => Kind::String,
        }
    }

    /// Try to get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as a 64-bit integer (integral types only)
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(i64::from(*i)),
            Self::Long(l) => Some(*l),
            _ => None,
        }
    }

    /// Try to get as a double (any numeric type)
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(f64::from(*i)),
            Self::Long(l) => Some(*l as f64),
            Self::Float(f) => Some(f64::from(*f)),
            Self::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Try to get as a string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Create a string value
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    /// Convert a numeric value to the given numeric type.
    ///
    /// Returns `None` when either the value or the target is not numeric.
    pub fn cast_numeric(&self, target: AttributeType) -> Option<Value> {
        match target {
            AttributeType::Int => match self {
                Self::Int(i) => Some(Self::Int(*i)),
                Self::Long(l) => Some(Self::Int(*l as i32)),
                Self::Float(f) => Some(Self::Int(*f as i32)),
                Self::Double(d) => Some(Self::Int(*d as i32)),
                _ => None,
            },
            AttributeType::Long => match self {
                Self::Float(f) => Some(Self::Long(*f as i64)),
                Self::Double(d) => Some(Self::Long(*d as i64)),
                other => other.as_long().map(Self::Long),
            },
            AttributeType::Float => self.as_double().map(|d| Self::Float(d as f32)),
            AttributeType::Double => self.as_double().map(Self::Double),
            _ => None,
        }
    }

    /// Evaluator comparison.
    ///
    /// `None` when either side is null or the kinds differ.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        if self.is_null() || other.is_null() || self.kind() != other.kind() {
            return None;
        }
        Some(self.cmp(other))
    }
}

fn compare_numeric(a: &Value, b: &Value) -> Ordering {
    // Both sides are numeric here, so as_double always succeeds
    match (a.as_long(), b.as_long()) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(x), None) => compare_long_double(x, b.as_double().unwrap_or_default()),
        (None, Some(y)) => compare_long_double(y, a.as_double().unwrap_or_default()).reverse(),
        (None, None) => {
            let x = a.as_double().unwrap_or_default();
            let y = b.as_double().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or_else(|| x.total_cmp(&y))
        }
    }
}

/// Exact order of an integer and a double, without rounding the integer
fn compare_long_double(x: i64, y: f64) -> Ordering {
    const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;
    if y.is_nan() {
        return (x as f64).total_cmp(&y);
    }
    if y >= TWO_POW_63 {
        return Ordering::Less;
    }
    if y < -TWO_POW_63 {
        return Ordering::Greater;
    }
    let whole = y.trunc();
    x.cmp(&(whole as i64))
        .then_with(|| 0.0_f64.partial_cmp(&(y - whole)).unwrap_or(Ordering::Equal))
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        let (ka, kb) = (self.kind(), other.kind());
        if ka != kb {
            return ka.cmp(&kb);
        }
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Null, Self::Null) => Ordering::Equal,
            _ => compare_numeric(self, other),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        match self {
            Self::Null => {}
            Self::Bool(b) => b.hash(state),
            Self::String(s) => s.hash(state),
            // Numerics equal across widths must hash alike
            numeric => {
                let d = numeric.as_double().unwrap_or_default();
                let d = if d == 0.0 { 0.0 } else { d };
                d.to_bits().hash(state);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Long(l) => write!(f, "{l}L"),
            Self::Float(v) => write!(f, "{v}f"),
            Self::Double(d) => write!(f, "{d}"),
            Self::String(s) => write!(f, "'{s}'"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_numeric_cross_width_equality() {
        assert_eq!(Value::Int(5), Value::Long(5));
        assert_eq!(Value::Int(5), Value::Double(5.0));
        assert!(Value::Float(2.5) < Value::Long(3));
    }

    #[test]
    fn test_long_and_double_order_exactly() {
        let big = 1_i64 << 53;
        let rounded = Value::Double(big as f64);
        assert!(Value::Long(big + 1) > rounded);
        assert_ne!(Value::Long(big + 1), rounded);
        assert_eq!(Value::Long(big), rounded);
        assert!(Value::Long(i64::MAX) < Value::Double(9.3e18));
        assert!(Value::Long(i64::MIN) > Value::Double(f64::NEG_INFINITY));
        assert!(Value::Long(-3) > Value::Double(-3.5));
        assert!(Value::Int(2) < Value::Double(2.25));

        let keys: std::collections::BTreeSet<Value> =
            [Value::Long(big + 1), rounded.clone(), Value::Long(big)].into_iter().collect();
        assert_eq!(keys.into_iter().collect::<Vec<_>>(), vec![rounded, Value::Long(big + 1)]);
    }

    #[test]
    fn test_hash_agrees_with_equality() {
        let keys: indexmap::IndexSet<Value> = [
            Value::Int(5),
            Value::Long(5),
            Value::Double(5.0),
            Value::Double(-0.0),
            Value::Int(0),
        ]
        .into_iter()
        .collect();
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_null_ranks_lowest() {
        assert!(Value::Null < Value::Bool(false));
        assert!(Value::Null < Value::Int(i32::MIN));
        assert!(Value::Null < Value::string(""));
    }

    #[test]
    fn test_compare_rejects_null_and_mixed_kinds() {
        assert_eq!(Value::Null.compare(&Value::Int(1)), None);
        assert_eq!(Value::Int(1).compare(&Value::string("1")), None);
        assert_eq!(Value::Int(1).compare(&Value::Long(2)), Some(Ordering::Less));
    }

    #[test]
    fn test_cast_numeric() {
        assert_eq!(Value::Int(3).cast_numeric(AttributeType::Double), Some(Value::Double(3.0)));
        assert_eq!(Value::Double(3.9).cast_numeric(AttributeType::Long), Some(Value::Long(3)));
        assert_eq!(Value::string("x").cast_numeric(AttributeType::Int), None);
    }

    #[test]
    fn test_widen() {
        assert_eq!(AttributeType::Int.widen(AttributeType::Long), Some(AttributeType::Long));
        assert_eq!(AttributeType::Double.widen(AttributeType::Float), Some(AttributeType::Double));
        assert_eq!(AttributeType::Bool.widen(AttributeType::Int), None);
    }
}
