/*!
Runtime values for the Avro codec, mirroring [AvroType](super::AvroType).
*/

use crate::error::{Error, Result};

/// A decoded or to-be-encoded Avro value.
#[derive(Debug, Clone, PartialEq)]
pub enum AvroValue {
    /// Null, zero bytes on the wire.
    Null,
    /// Boolean.
    Boolean(bool),
    /// 32-bit int.
    Int(i32),
    /// 64-bit long.
    Long(i64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit double.
    Double(f64),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// UTF-8 string.
    String(String),
    /// Fixed-size bytes.
    Fixed(Vec<u8>),
    /// Enum ordinal.
    Enum(i32),
    /// Array elements.
    Array(Vec<AvroValue>),
    /// Map entries in insertion order.
    Map(Vec<(String, AvroValue)>),
    /// Union branch index and value.
    Union(usize, Box<AvroValue>),
    /// Record fields in schema order.
    Record(Vec<(String, AvroValue)>),
}

impl AvroValue {
    /// Encode an option as the uniform `[null, T]` union.
    pub fn option(value: Option<AvroValue>) -> AvroValue {
        match value {
            None => AvroValue::Union(0, Box::new(AvroValue::Null)),
            Some(inner) => AvroValue::Union(1, Box::new(inner)),
        }
    }

    /// Unwrap a `[null, T]` union back into an option.
    pub fn into_option(self) -> Result<Option<AvroValue>> {
        match self {
            AvroValue::Union(0, _) | AvroValue::Null => Ok(None),
            AvroValue::Union(_, inner) => Ok(Some(*inner)),
            other => Ok(Some(other)),
        }
    }

    /// Look up a record field by name.
    pub fn field(&self, name: &str) -> Option<&AvroValue> {
        match self {
            AvroValue::Record(fields) => fields
                .iter()
                .find(|(field_name, _)| field_name == name)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    /// Take a record field by name, consuming the record entry.
    pub fn take_field(&mut self, name: &str) -> Option<AvroValue> {
        match self {
            AvroValue::Record(fields) => fields
                .iter()
                .position(|(field_name, _)| field_name == name)
                .map(|index| fields.swap_remove(index).1),
            _ => None,
        }
    }

    /// The value as a long, if it is one.
    pub fn as_long(&self) -> Result<i64> {
        match self {
            AvroValue::Long(value) => Ok(*value),
            other => Err(Error::Avro(format!("expected long, got {other:?}"))),
        }
    }

    /// The value as an int, if it is one.
    pub fn as_int(&self) -> Result<i32> {
        match self {
            AvroValue::Int(value) => Ok(*value),
            other => Err(Error::Avro(format!("expected int, got {other:?}"))),
        }
    }

    /// The value as a string slice, if it is one.
    pub fn as_str(&self) -> Result<&str> {
        match self {
            AvroValue::String(value) => Ok(value),
            other => Err(Error::Avro(format!("expected string, got {other:?}"))),
        }
    }

    /// The value as a bool, if it is one.
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            AvroValue::Boolean(value) => Ok(*value),
            other => Err(Error::Avro(format!("expected boolean, got {other:?}"))),
        }
    }

    /// The value as raw bytes, if it is a bytes or fixed value.
    pub fn as_bytes(&self) -> Result<&[u8]> {
        match self {
            AvroValue::Bytes(value) | AvroValue::Fixed(value) => Ok(value),
            other => Err(Error::Avro(format!("expected bytes, got {other:?}"))),
        }
    }
}
