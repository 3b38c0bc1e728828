/*!
Binary decoder for the Avro subset Iceberg reads.
*/

use crate::avro::schema::AvroType;
use crate::avro::value::AvroValue;
use crate::error::{Error, Result};

/// A positioned reader over an Avro-encoded byte slice.
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    /// Create a decoder over `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Decoder { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Whether the input is fully consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn read_byte(&mut self) -> Result<u8> {
        let byte = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| Error::Avro("unexpected end of input".to_string()))?;
        self.pos += 1;
        Ok(byte)
    }

    /// Read `len` raw bytes.
    pub fn read_exact(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(Error::Avro(format!(
                "need {} bytes but only {} remain",
                len,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_varint(&mut self, max_bytes: usize) -> Result<u64> {
        let mut value = 0u64;
        let mut shift = 0u32;
        for _ in 0..max_bytes {
            let byte = self.read_byte()?;
            value |= ((byte & 0x7f) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
        Err(Error::Avro(format!(
            "varint did not terminate within {} bytes",
            max_bytes
        )))
    }

    /// Read an Avro long.
    pub fn read_long(&mut self) -> Result<i64> {
        let encoded = self.read_varint(10)?;
        Ok((encoded >> 1) as i64 ^ -((encoded & 1) as i64))
    }

    /// Read an Avro int.
    pub fn read_int(&mut self) -> Result<i32> {
        let encoded = self.read_varint(5)?;
        Ok((encoded >> 1) as i32 ^ -((encoded & 1) as i32))
    }

    /// Read an Avro boolean.
    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_byte()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::Avro(format!("invalid boolean byte {other}"))),
        }
    }

    /// Read an Avro float.
    pub fn read_float(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.read_exact(4)?.try_into()?))
    }

    /// Read an Avro double.
    pub fn read_double(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.read_exact(8)?.try_into()?))
    }

    /// Read length-prefixed bytes.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_long()?;
        if len < 0 {
            return Err(Error::Avro(format!("negative byte length {len}")));
        }
        Ok(self.read_exact(len as usize)?.to_vec())
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn read_str(&mut self) -> Result<String> {
        Ok(String::from_utf8(self.read_bytes()?)?)
    }

    /// Decode one value of `schema` from the input.
    pub fn decode(&mut self, schema: &AvroType) -> Result<AvroValue> {
        match schema {
            AvroType::Null => Ok(AvroValue::Null),
            AvroType::Boolean => Ok(AvroValue::Boolean(self.read_bool()?)),
            AvroType::Int => Ok(AvroValue::Int(self.read_int()?)),
            AvroType::Long => Ok(AvroValue::Long(self.read_long()?)),
            AvroType::Float => Ok(AvroValue::Float(self.read_float()?)),
            AvroType::Double => Ok(AvroValue::Double(self.read_double()?)),
            AvroType::Bytes => Ok(AvroValue::Bytes(self.read_bytes()?)),
            AvroType::String => Ok(AvroValue::String(self.read_str()?)),
            AvroType::Fixed { size, .. } => {
                Ok(AvroValue::Fixed(self.read_exact(*size)?.to_vec()))
            }
            AvroType::Enum { symbols, name } => {
                let ordinal = self.read_int()?;
                if ordinal < 0 || ordinal as usize >= symbols.len() {
                    return Err(Error::Avro(format!(
                        "enum {} has no ordinal {}",
                        name, ordinal
                    )));
                }
                Ok(AvroValue::Enum(ordinal))
            }
            AvroType::Array { element, .. } => {
                let mut items = Vec::new();
                loop {
                    let count = self.read_block_count()?;
                    if count == 0 {
                        break;
                    }
                    for _ in 0..count {
                        items.push(self.decode(element)?);
                    }
                }
                Ok(AvroValue::Array(items))
            }
            AvroType::Map { values } => {
                let mut entries = Vec::new();
                loop {
                    let count = self.read_block_count()?;
                    if count == 0 {
                        break;
                    }
                    for _ in 0..count {
                        let key = self.read_str()?;
                        entries.push((key, self.decode(values)?));
                    }
                }
                Ok(AvroValue::Map(entries))
            }
            AvroType::Union(branches) => {
                let branch = self.read_long()?;
                if branch < 0 || branch as usize >= branches.len() {
                    return Err(Error::Avro(format!(
                        "union branch {} out of range for {} branches",
                        branch,
                        branches.len()
                    )));
                }
                let inner = self.decode(&branches[branch as usize])?;
                Ok(AvroValue::Union(branch as usize, Box::new(inner)))
            }
            AvroType::Record(record) => {
                let mut fields = Vec::with_capacity(record.fields.len());
                for field in &record.fields {
                    let value = self.decode(&field.field_type)?;
                    fields.push((field.name.clone(), value));
                }
                Ok(AvroValue::Record(fields))
            }
        }
    }

    // A negative count signals a sized block: flip the sign and skip the
    // byte-size long that follows.
    fn read_block_count(&mut self) -> Result<u64> {
        let count = self.read_long()?;
        if count < 0 {
            self.read_long()?;
            Ok(count.unsigned_abs())
        } else {
            Ok(count as u64)
        }
    }
}
