/*!
Binary encoder for the Avro subset Iceberg writes.

Ints and longs use the zig-zag transform followed by an unsigned varint in
7-bit groups. Arrays and maps are written as a single block followed by a
zero-count terminator; the negative block-count form is accepted by the
[decoder](super::decode) but never emitted.
*/

use crate::avro::schema::AvroType;
use crate::avro::value::AvroValue;
use crate::error::{Error, Result};

/// Zig-zag transform for 32-bit ints.
pub fn zigzag_i32(n: i32) -> u32 {
    (n.wrapping_shl(1) ^ (n >> 31)) as u32
}

/// Zig-zag transform for 64-bit longs.
pub fn zigzag_i64(n: i64) -> u64 {
    (n.wrapping_shl(1) ^ (n >> 63)) as u64
}

fn write_varint(buf: &mut Vec<u8>, mut n: u64) {
    loop {
        let mut byte = (n & 0x7f) as u8;
        n >>= 7;
        if n != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if n == 0 {
            break;
        }
    }
}

/// Write an Avro int: zig-zag then varint, at most 5 bytes.
pub fn write_int(buf: &mut Vec<u8>, value: i32) {
    write_varint(buf, zigzag_i32(value) as u64);
}

/// Write an Avro long: zig-zag then varint, at most 10 bytes.
pub fn write_long(buf: &mut Vec<u8>, value: i64) {
    write_varint(buf, zigzag_i64(value));
}

/// Write an Avro boolean as a single byte.
pub fn write_bool(buf: &mut Vec<u8>, value: bool) {
    buf.push(value as u8);
}

/// Write an Avro float, IEEE-754 little-endian.
pub fn write_float(buf: &mut Vec<u8>, value: f32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Write an Avro double, IEEE-754 little-endian.
pub fn write_double(buf: &mut Vec<u8>, value: f64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Write length-prefixed bytes.
pub fn write_bytes(buf: &mut Vec<u8>, value: &[u8]) {
    write_long(buf, value.len() as i64);
    buf.extend_from_slice(value);
}

/// Write a length-prefixed UTF-8 string.
pub fn write_str(buf: &mut Vec<u8>, value: &str) {
    write_bytes(buf, value.as_bytes());
}

/// Encode `value` against `schema` into `buf`.
pub fn encode(value: &AvroValue, schema: &AvroType, buf: &mut Vec<u8>) -> Result<()> {
    match (schema, value) {
        (AvroType::Null, AvroValue::Null) => Ok(()),
        (AvroType::Boolean, AvroValue::Boolean(b)) => {
            write_bool(buf, *b);
            Ok(())
        }
        (AvroType::Int, AvroValue::Int(i)) => {
            write_int(buf, *i);
            Ok(())
        }
        (AvroType::Long, AvroValue::Long(l)) => {
            write_long(buf, *l);
            Ok(())
        }
        (AvroType::Float, AvroValue::Float(f)) => {
            write_float(buf, *f);
            Ok(())
        }
        (AvroType::Double, AvroValue::Double(d)) => {
            write_double(buf, *d);
            Ok(())
        }
        (AvroType::Bytes, AvroValue::Bytes(b)) => {
            write_bytes(buf, b);
            Ok(())
        }
        (AvroType::String, AvroValue::String(s)) => {
            write_str(buf, s);
            Ok(())
        }
        (AvroType::Fixed { size, name }, AvroValue::Fixed(b)) => {
            if b.len() != *size {
                return Err(Error::Avro(format!(
                    "fixed {} expects {} bytes, got {}",
                    name,
                    size,
                    b.len()
                )));
            }
            buf.extend_from_slice(b);
            Ok(())
        }
        (AvroType::Enum { symbols, name }, AvroValue::Enum(ordinal)) => {
            if *ordinal < 0 || *ordinal as usize >= symbols.len() {
                return Err(Error::Avro(format!(
                    "enum {} has no ordinal {}",
                    name, ordinal
                )));
            }
            write_int(buf, *ordinal);
            Ok(())
        }
        (AvroType::Array { element, .. }, AvroValue::Array(items)) => {
            if !items.is_empty() {
                write_long(buf, items.len() as i64);
                for item in items {
                    encode(item, element, buf)?;
                }
            }
            write_long(buf, 0);
            Ok(())
        }
        (AvroType::Map { values }, AvroValue::Map(entries)) => {
            if !entries.is_empty() {
                write_long(buf, entries.len() as i64);
                for (key, entry) in entries {
                    write_str(buf, key);
                    encode(entry, values, buf)?;
                }
            }
            write_long(buf, 0);
            Ok(())
        }
        (AvroType::Union(branches), AvroValue::Union(branch, inner)) => {
            let branch_schema = branches.get(*branch).ok_or_else(|| {
                Error::Avro(format!(
                    "union branch {} out of range for {} branches",
                    branch,
                    branches.len()
                ))
            })?;
            write_long(buf, *branch as i64);
            encode(inner, branch_schema, buf)
        }
        (AvroType::Record(record), AvroValue::Record(values)) => {
            for field in &record.fields {
                let value = values
                    .iter()
                    .find(|(name, _)| *name == field.name)
                    .map(|(_, value)| value)
                    .ok_or_else(|| {
                        Error::Avro(format!(
                            "record {} is missing field {}",
                            record.name, field.name
                        ))
                    })?;
                encode(value, &field.field_type, buf)?;
            }
            Ok(())
        }
        (schema, value) => Err(Error::Avro(format!(
            "value {value:?} does not match schema {schema:?}"
        ))),
    }
}
