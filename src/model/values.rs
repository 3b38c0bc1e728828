/*!
Typed single values for statistics, partition tuples and bounds.

Bounds and partition summaries are stored as the Iceberg single-value
serialization: little-endian for fixed-width numerics, UTF-8 for strings,
minimal two's-complement big-endian for decimals.
*/

use std::cmp::Ordering;

use num_bigint::BigInt;
use uuid::Uuid;

use crate::avro::{AvroType, AvroValue};
use crate::error::{Error, Result};
use crate::model::schema::PrimitiveType;

/// A single typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean value.
    Boolean(bool),
    /// 32-bit integer.
    Int(i32),
    /// 64-bit integer.
    Long(i64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit double.
    Double(f64),
    /// Days since the unix epoch.
    Date(i32),
    /// Microseconds since midnight.
    Time(i64),
    /// Microseconds since the unix epoch, no timezone.
    Timestamp(i64),
    /// Microseconds since the unix epoch, UTC.
    Timestamptz(i64),
    /// UTF-8 string.
    String(String),
    /// UUID value.
    Uuid(Uuid),
    /// Fixed-length bytes.
    Fixed(Vec<u8>),
    /// Variable-length bytes.
    Binary(Vec<u8>),
    /// Unscaled decimal value; scale comes from the field type.
    Decimal(BigInt),
}

impl Value {
    /// Serialize to the Iceberg single-value byte form.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Value::Boolean(b) => vec![*b as u8],
            Value::Int(i) => i.to_le_bytes().to_vec(),
            Value::Long(l) => l.to_le_bytes().to_vec(),
            Value::Float(f) => f.to_le_bytes().to_vec(),
            Value::Double(d) => d.to_le_bytes().to_vec(),
            Value::Date(d) => d.to_le_bytes().to_vec(),
            Value::Time(t) => t.to_le_bytes().to_vec(),
            Value::Timestamp(t) => t.to_le_bytes().to_vec(),
            Value::Timestamptz(t) => t.to_le_bytes().to_vec(),
            Value::String(s) => s.as_bytes().to_vec(),
            Value::Uuid(u) => u.as_bytes().to_vec(),
            Value::Fixed(b) => b.clone(),
            Value::Binary(b) => b.clone(),
            Value::Decimal(d) => d.to_signed_bytes_be(),
        }
    }

    /// Deserialize from the Iceberg single-value byte form.
    pub fn try_from_bytes(bytes: &[u8], field_type: &PrimitiveType) -> Result<Value> {
        match field_type {
            PrimitiveType::Boolean => match bytes {
                [0] => Ok(Value::Boolean(false)),
                [1] => Ok(Value::Boolean(true)),
                _ => Err(Error::MetadataParse("invalid boolean bytes".to_string())),
            },
            PrimitiveType::Int => Ok(Value::Int(i32::from_le_bytes(bytes.try_into()?))),
            PrimitiveType::Long => Ok(Value::Long(i64::from_le_bytes(bytes.try_into()?))),
            PrimitiveType::Float => Ok(Value::Float(f32::from_le_bytes(bytes.try_into()?))),
            PrimitiveType::Double => Ok(Value::Double(f64::from_le_bytes(bytes.try_into()?))),
            PrimitiveType::Date => Ok(Value::Date(i32::from_le_bytes(bytes.try_into()?))),
            PrimitiveType::Time => Ok(Value::Time(i64::from_le_bytes(bytes.try_into()?))),
            PrimitiveType::Timestamp | PrimitiveType::TimestampNs => {
                Ok(Value::Timestamp(i64::from_le_bytes(bytes.try_into()?)))
            }
            PrimitiveType::Timestamptz | PrimitiveType::TimestamptzNs => {
                Ok(Value::Timestamptz(i64::from_le_bytes(bytes.try_into()?)))
            }
            PrimitiveType::String => Ok(Value::String(std::str::from_utf8(bytes)?.to_string())),
            PrimitiveType::Uuid => Ok(Value::Uuid(Uuid::from_slice(bytes).map_err(|_| {
                Error::MetadataParse("invalid uuid bytes".to_string())
            })?)),
            PrimitiveType::Fixed(_) => Ok(Value::Fixed(bytes.to_vec())),
            PrimitiveType::Binary => Ok(Value::Binary(bytes.to_vec())),
            PrimitiveType::Decimal { .. } => {
                Ok(Value::Decimal(BigInt::from_signed_bytes_be(bytes)))
            }
            other => Err(Error::NotSupported(format!(
                "single-value serialization for {other}"
            ))),
        }
    }

    /// Compare two values of the same type. Strings use lexicographic byte
    /// order, booleans order false before true, NaN compares as unordered.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Long(a), Value::Long(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Timestamptz(a), Value::Timestamptz(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            (Value::Uuid(a), Value::Uuid(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            (Value::Fixed(a), Value::Fixed(b)) => Some(a.cmp(b)),
            (Value::Binary(a), Value::Binary(b)) => Some(a.cmp(b)),
            (Value::Decimal(a), Value::Decimal(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Convert into the Avro value used inside manifest partition tuples.
    pub fn to_avro(&self) -> AvroValue {
        match self {
            Value::Boolean(b) => AvroValue::Boolean(*b),
            Value::Int(i) => AvroValue::Int(*i),
            Value::Long(l) => AvroValue::Long(*l),
            Value::Float(f) => AvroValue::Float(*f),
            Value::Double(d) => AvroValue::Double(*d),
            Value::Date(d) => AvroValue::Int(*d),
            Value::Time(t) => AvroValue::Long(*t),
            Value::Timestamp(t) => AvroValue::Long(*t),
            Value::Timestamptz(t) => AvroValue::Long(*t),
            Value::String(s) => AvroValue::String(s.clone()),
            Value::Uuid(u) => AvroValue::Fixed(u.as_bytes().to_vec()),
            Value::Fixed(b) => AvroValue::Fixed(b.clone()),
            Value::Binary(b) => AvroValue::Bytes(b.clone()),
            Value::Decimal(d) => AvroValue::Bytes(d.to_signed_bytes_be()),
        }
    }

    /// Convert back from the Avro value of a manifest partition tuple.
    pub fn from_avro(avro: &AvroValue, field_type: &PrimitiveType) -> Result<Value> {
        match (field_type, avro) {
            (PrimitiveType::Boolean, AvroValue::Boolean(b)) => Ok(Value::Boolean(*b)),
            (PrimitiveType::Int, AvroValue::Int(i)) => Ok(Value::Int(*i)),
            (PrimitiveType::Long, AvroValue::Long(l)) => Ok(Value::Long(*l)),
            (PrimitiveType::Float, AvroValue::Float(f)) => Ok(Value::Float(*f)),
            (PrimitiveType::Double, AvroValue::Double(d)) => Ok(Value::Double(*d)),
            (PrimitiveType::Date, AvroValue::Int(d)) => Ok(Value::Date(*d)),
            (PrimitiveType::Time, AvroValue::Long(t)) => Ok(Value::Time(*t)),
            (PrimitiveType::Timestamp, AvroValue::Long(t)) => Ok(Value::Timestamp(*t)),
            (PrimitiveType::Timestamptz, AvroValue::Long(t)) => Ok(Value::Timestamptz(*t)),
            (PrimitiveType::String, AvroValue::String(s)) => Ok(Value::String(s.clone())),
            (PrimitiveType::Uuid, AvroValue::Fixed(b)) => Ok(Value::Uuid(
                Uuid::from_slice(b).map_err(|_| {
                    Error::MetadataParse("invalid uuid bytes".to_string())
                })?,
            )),
            (PrimitiveType::Fixed(_), AvroValue::Fixed(b)) => Ok(Value::Fixed(b.clone())),
            (PrimitiveType::Binary, AvroValue::Bytes(b)) => Ok(Value::Binary(b.clone())),
            (PrimitiveType::Decimal { .. }, AvroValue::Bytes(b)) => {
                Ok(Value::Decimal(BigInt::from_signed_bytes_be(b)))
            }
            (field_type, avro) => Err(Error::Avro(format!(
                "avro value {avro:?} does not fit type {field_type}"
            ))),
        }
    }

    /// The Avro schema node for a primitive value in a partition tuple.
    pub fn avro_type_of(field_type: &PrimitiveType) -> Result<AvroType> {
        match field_type {
            PrimitiveType::Boolean => Ok(AvroType::Boolean),
            PrimitiveType::Int | PrimitiveType::Date => Ok(AvroType::Int),
            PrimitiveType::Long
            | PrimitiveType::Time
            | PrimitiveType::Timestamp
            | PrimitiveType::Timestamptz
            | PrimitiveType::TimestampNs
            | PrimitiveType::TimestamptzNs => Ok(AvroType::Long),
            PrimitiveType::Float => Ok(AvroType::Float),
            PrimitiveType::Double => Ok(AvroType::Double),
            PrimitiveType::String => Ok(AvroType::String),
            PrimitiveType::Uuid => Ok(AvroType::Fixed {
                name: "uuid_fixed".to_string(),
                size: 16,
            }),
            PrimitiveType::Fixed(size) => Ok(AvroType::Fixed {
                name: format!("fixed_{size}"),
                size: *size as usize,
            }),
            PrimitiveType::Binary | PrimitiveType::Decimal { .. } => Ok(AvroType::Bytes),
            other => Err(Error::NotSupported(format!("{other} in partition tuples"))),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Long(l) => write!(f, "{l}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::Date(d) => write!(f, "date({d})"),
            Value::Time(t) => write!(f, "time({t})"),
            Value::Timestamp(t) => write!(f, "ts({t})"),
            Value::Timestamptz(t) => write!(f, "tstz({t})"),
            Value::String(s) => write!(f, "\"{s}\""),
            Value::Uuid(u) => write!(f, "{u}"),
            Value::Fixed(b) | Value::Binary(b) => write!(f, "0x{}", hex(b)),
            Value::Decimal(d) => write!(f, "{d}"),
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// A partition tuple: one optional value per partition field, in spec order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructValue {
    /// Field name and value pairs in partition-spec order.
    pub fields: Vec<(String, Option<Value>)>,
}

impl StructValue {
    /// Look up a field value by name.
    pub fn get(&self, name: &str) -> Option<&Option<Value>> {
        self.fields
            .iter()
            .find(|(field_name, _)| field_name == name)
            .map(|(_, value)| value)
    }
}

impl FromIterator<(String, Option<Value>)> for StructValue {
    fn from_iter<I: IntoIterator<Item = (String, Option<Value>)>>(iter: I) -> Self {
        StructValue {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Truncate a lower-bound string to at most `len` bytes. Dropping trailing
/// characters keeps the result `<=` every value it bounds.
pub fn truncate_lower(value: &str, len: usize) -> String {
    if value.len() <= len {
        return value.to_string();
    }
    let mut end = len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}

/// Truncate an upper-bound string to at most `len` bytes. The truncated
/// prefix must be incremented to stay `>=` every value it bounds; returns
/// `None` when no character can be incremented.
pub fn truncate_upper(value: &str, len: usize) -> Option<String> {
    if value.len() <= len {
        return Some(value.to_string());
    }
    let mut prefix: Vec<char> = truncate_lower(value, len).chars().collect();
    while let Some(last) = prefix.pop() {
        if last == char::MAX {
            continue;
        }
        let mut code = last as u32 + 1;
        // skip the surrogate gap
        while char::from_u32(code).is_none() && code <= char::MAX as u32 {
            code += 1;
        }
        if let Some(next) = char::from_u32(code) {
            prefix.push(next);
            return Some(prefix.into_iter().collect());
        }
    }
    None
}
