//! Versioned binary snapshots.
//!
//! A graph is persisted as a sequence of virtual keys so large graphs can
//! stream through the host's snapshot mechanism without a full in-memory
//! image. Every key carries the header and a set of tagged payloads, each
//! prefixed by its entity count so decode proceeds without buffering.

mod decode;
mod encode;
mod io;

pub use decode::GraphDecoder;
pub use encode::encode_graph;
pub use io::{SerReader, SerWriter};

use crate::error::{GraphError, Result};
use crate::value::Value;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u64 = 14;

/// Oldest version this decoder understands.
pub const MIN_SNAPSHOT_VERSION: u64 = 9;

/// Payload tags within a virtual key.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u64)]
pub enum PayloadKind {
    Nodes = 0,
    DeletedNodes = 1,
    Edges = 2,
    DeletedEdges = 3,
    GraphSchema = 4,
}

impl PayloadKind {
    pub fn from_u64(v: u64) -> Result<Self> {
        Ok(match v {
            0 => PayloadKind::Nodes,
            1 => PayloadKind::DeletedNodes,
            2 => PayloadKind::Edges,
            3 => PayloadKind::DeletedEdges,
            4 => PayloadKind::GraphSchema,
            other => {
                return Err(GraphError::Corruption(format!(
                    "unknown payload tag {other}"
                )))
            }
        })
    }
}

// value type tags on the wire
const T_NULL: u64 = 0;
const T_BOOL: u64 = 1;
const T_INT: u64 = 2;
const T_DOUBLE: u64 = 3;
const T_STRING: u64 = 4;
const T_POINT: u64 = 5;
const T_ARRAY: u64 = 6;
const T_MAP: u64 = 7;
const T_VECTOR: u64 = 8;

/// Writes `type tag` then the variant body.
pub(crate) fn write_value(w: &mut SerWriter, value: &Value) {
    match value {
        Value::Null => w.write_u64(T_NULL),
        Value::Bool(v) => {
            w.write_u64(T_BOOL);
            w.write_i64(i64::from(*v));
        }
        Value::Int(v) => {
            w.write_u64(T_INT);
            w.write_i64(*v);
        }
        Value::Float(v) => {
            w.write_u64(T_DOUBLE);
            w.write_f64(*v);
        }
        Value::String(v) => {
            w.write_u64(T_STRING);
            w.write_str(v);
        }
        Value::Point { lat, lon } => {
            w.write_u64(T_POINT);
            w.write_f64(*lat);
            w.write_f64(*lon);
        }
        Value::Array(items) => {
            w.write_u64(T_ARRAY);
            w.write_u64(items.len() as u64);
            for item in items {
                write_value(w, item);
            }
        }
        Value::Map(pairs) => {
            w.write_u64(T_MAP);
            w.write_u64(pairs.len() as u64);
            for (key, val) in pairs {
                write_value(w, &Value::String(key.clone()));
                write_value(w, val);
            }
        }
        Value::Vector(items) => {
            w.write_u64(T_VECTOR);
            w.write_u64(items.len() as u64);
            for item in items {
                w.write_f32(*item);
            }
        }
    }
}

pub(crate) fn read_value(r: &mut SerReader<'_>) -> Result<Value> {
    Ok(match r.read_u64()? {
        T_NULL => Value::Null,
        T_BOOL => Value::Bool(r.read_i64()? != 0),
        T_INT => Value::Int(r.read_i64()?),
        T_DOUBLE => Value::Float(r.read_f64()?),
        T_STRING => Value::String(r.read_str()?),
        T_POINT => Value::Point {
            lat: r.read_f64()?,
            lon: r.read_f64()?,
        },
        T_ARRAY => {
            let len = r.read_u64()? as usize;
            let mut items = Vec::with_capacity(len.min(1 << 16));
            for _ in 0..len {
                items.push(read_value(r)?);
            }
            Value::Array(items)
        }
        T_MAP => {
            let len = r.read_u64()? as usize;
            let mut pairs = Vec::with_capacity(len.min(1 << 16));
            for _ in 0..len {
                let key = match read_value(r)? {
                    Value::String(key) => key,
                    other => {
                        return Err(GraphError::Corruption(format!(
                            "map key of type {}",
                            other.type_name()
                        )))
                    }
                };
                pairs.push((key, read_value(r)?));
            }
            Value::Map(pairs)
        }
        T_VECTOR => {
            let dim = r.read_u64()? as usize;
            let mut items = Vec::with_capacity(dim.min(1 << 16));
            for _ in 0..dim {
                items.push(r.read_f32()?);
            }
            Value::Vector(items)
        }
        other => {
            return Err(GraphError::Corruption(format!(
                "unknown value type tag {other}"
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_wire_roundtrip() {
        let values = [
            Value::Null,
            Value::Bool(true),
            Value::Int(-42),
            Value::Float(2.75),
            Value::String("répertoire".into()),
            Value::Point { lat: 31.7, lon: 35.2 },
            Value::Array(vec![Value::Int(1), Value::String("x".into())]),
            Value::Map(vec![
                ("a".into(), Value::Int(1)),
                ("b".into(), Value::Array(vec![Value::Null])),
            ]),
            Value::Vector(vec![0.5, -1.5, 3.25]),
        ];
        for value in &values {
            let mut w = SerWriter::new();
            write_value(&mut w, value);
            let bytes = w.into_bytes();
            let mut r = SerReader::new(&bytes);
            assert_eq!(&read_value(&mut r).unwrap(), value);
            assert_eq!(r.remaining(), 0);
        }
    }
}
