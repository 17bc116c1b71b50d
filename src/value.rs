//! Canonical scalar value representation shared across the storage,
//! execution, and serialization layers.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Typed scalar value tagged with explicit type information so the wire
/// format remains unambiguous across snapshot versions.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Value {
    /// Null literal.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Signed 64-bit integer literal.
    Int(i64),
    /// 64-bit floating point literal.
    Float(f64),
    /// UTF-8 string literal.
    String(String),
    /// Geographic point as (latitude, longitude).
    Point { lat: f64, lon: f64 },
    /// Ordered sequence of values.
    Array(Vec<Value>),
    /// Ordered string-keyed mapping.
    Map(Vec<(String, Value)>),
    /// Fixed-dimension float32 vector.
    Vector(Vec<f32>),
}

/// Rank of a value's type in the cross-variant total order used by index
/// key encoding.
fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Int(_) | Value::Float(_) => 2,
        Value::String(_) => 3,
        Value::Point { .. } => 4,
        Value::Array(_) => 5,
        Value::Map(_) => 6,
        Value::Vector(_) => 7,
    }
}

impl Value {
    /// Human-readable type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Point { .. } => "point",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Vector(_) => "vector",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view; `Int` and `Float` only.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    /// Total order across all variants: values order first by type rank,
    /// numerics compare numerically regardless of `Int`/`Float` variant,
    /// and `Float` NaN sorts greatest among numerics.
    pub fn cmp_total(&self, other: &Value) -> Ordering {
        let (ra, rb) = (type_rank(self), type_rank(other));
        if ra != rb {
            return ra.cmp(&rb);
        }
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (a, b) if ra == 2 => {
                let x = a.as_f64().unwrap_or(f64::NAN);
                let y = b.as_f64().unwrap_or(f64::NAN);
                cmp_f64_total(x, y)
            }
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Point { lat: la, lon: lo }, Value::Point { lat: lb, lon: ob }) => {
                cmp_f64_total(*la, *lb).then(cmp_f64_total(*lo, *ob))
            }
            (Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.cmp_total(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Map(a), Value::Map(b)) => {
                for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                    let ord = ka.cmp(kb).then_with(|| va.cmp_total(vb));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Vector(a), Value::Vector(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = cmp_f64_total(*x as f64, *y as f64);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => unreachable!("variants share a type rank"),
        }
    }

    /// Appends an order-preserving byte encoding of this value to `buf`.
    /// Byte-wise comparison of two encodings agrees with `cmp_total`.
    pub fn encode_index_key(&self, buf: &mut Vec<u8>) {
        buf.push(type_rank(self));
        match self {
            Value::Null => {}
            Value::Bool(v) => buf.push(u8::from(*v)),
            Value::Int(_) | Value::Float(_) => {
                encode_ordered_f64(self.as_f64().unwrap_or(f64::NAN), buf);
            }
            Value::String(v) => encode_terminated_bytes(v.as_bytes(), buf),
            Value::Point { lat, lon } => {
                encode_ordered_f64(*lat, buf);
                encode_ordered_f64(*lon, buf);
            }
            Value::Array(items) => {
                for item in items {
                    buf.push(0x01);
                    item.encode_index_key(buf);
                }
                buf.push(0x00);
            }
            Value::Map(pairs) => {
                for (key, val) in pairs {
                    buf.push(0x01);
                    encode_terminated_bytes(key.as_bytes(), buf);
                    val.encode_index_key(buf);
                }
                buf.push(0x00);
            }
            Value::Vector(items) => {
                for item in items {
                    buf.push(0x01);
                    encode_ordered_f64(*item as f64, buf);
                }
                buf.push(0x00);
            }
        }
    }

    /// Map lookup preserving insertion order.
    pub fn map_get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(pairs) => pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}

fn cmp_f64_total(a: f64, b: f64) -> Ordering {
    // NaN sorts greatest; -0.0 and 0.0 compare equal.
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

fn encode_ordered_f64(v: f64, buf: &mut Vec<u8>) {
    // Canonicalize NaN so it sorts above every finite value.
    let v = if v.is_nan() { f64::NAN } else { v };
    let bits = v.to_bits();
    let ordered = if bits & (1 << 63) != 0 {
        !bits
    } else {
        bits | (1 << 63)
    };
    buf.extend_from_slice(&ordered.to_be_bytes());
}

/// NUL-terminated with interior-NUL escaping so encoded strings remain
/// prefix-comparable.
fn encode_terminated_bytes(bytes: &[u8], buf: &mut Vec<u8>) {
    for &b in bytes {
        if b == 0x00 {
            buf.push(0x00);
            buf.push(0xFF);
        } else {
            buf.push(b);
        }
    }
    buf.push(0x00);
    buf.push(0x00);
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp_total(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Hash through the order-preserving encoding so Int(1) and
        // Float(1.0) collapse to the same key.
        let mut buf = Vec::with_capacity(16);
        self.encode_index_key(&mut buf);
        buf.hash(state);
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v}"),
            Value::Point { lat, lon } => write!(f, "point({lat}, {lon})"),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(pairs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Vector(items) => write!(f, "vecf32(dim={})", items.len()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_variants_compare_numerically() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_eq!(
            Value::Int(2).cmp_total(&Value::Float(1.5)),
            Ordering::Greater
        );
        assert_eq!(
            Value::Float(f64::NAN).cmp_total(&Value::Int(i64::MAX)),
            Ordering::Greater
        );
    }

    #[test]
    fn index_key_order_matches_cmp_total() {
        let values = [
            Value::Null,
            Value::Bool(false),
            Value::Bool(true),
            Value::Int(-5),
            Value::Float(-1.5),
            Value::Int(0),
            Value::Float(2.5),
            Value::Int(100),
            Value::String("a".into()),
            Value::String("ab".into()),
            Value::Point { lat: 1.0, lon: 2.0 },
            Value::Array(vec![Value::Int(1)]),
            Value::Map(vec![("k".into(), Value::Int(1))]),
            Value::Vector(vec![0.5, 1.5]),
        ];
        for a in &values {
            for b in &values {
                let mut ka = Vec::new();
                let mut kb = Vec::new();
                a.encode_index_key(&mut ka);
                b.encode_index_key(&mut kb);
                assert_eq!(ka.cmp(&kb), a.cmp_total(b), "{a} vs {b}");
            }
        }
    }

    #[test]
    fn string_with_interior_nul_stays_ordered() {
        let a = Value::String("a\u{0}b".into());
        let b = Value::String("a".into());
        let mut ka = Vec::new();
        let mut kb = Vec::new();
        a.encode_index_key(&mut ka);
        b.encode_index_key(&mut kb);
        assert_eq!(ka.cmp(&kb), a.cmp_total(&b));
    }
}
