/*!
Avro Object Container File framing.

An OCF is the four magic bytes `Obj\x01`, a header map carrying at least
`avro.schema` and `avro.codec`, a 16-byte sync marker, then data blocks of
`count, byte size, data, sync`. Iceberg stores the writer schema JSON in the
header so manifest files are self-describing, and adds its own header keys
for the table schema and partition spec.
*/

use std::collections::HashMap;

use crate::avro::decode::Decoder;
use crate::avro::encode::{encode, write_bytes, write_long, write_str};
use crate::avro::schema::AvroType;
use crate::avro::value::AvroValue;
use crate::error::{Error, Result};

/// The four magic bytes opening every Object Container File.
pub const OCF_MAGIC: [u8; 4] = [b'O', b'b', b'j', 1];

/// Writes values into an Object Container File with a `null` codec.
pub struct OcfWriter {
    schema: AvroType,
    sync: [u8; 16],
    metadata: Vec<(String, Vec<u8>)>,
    block: Vec<u8>,
    count: i64,
}

impl OcfWriter {
    /// Create a writer for `schema` with a random sync marker.
    pub fn new(schema: AvroType) -> Result<Self> {
        let mut sync = [0u8; 16];
        getrandom::getrandom(&mut sync)
            .map_err(|err| Error::Avro(format!("sync marker: {err}")))?;
        Ok(OcfWriter {
            schema,
            sync,
            metadata: Vec::new(),
            block: Vec::new(),
            count: 0,
        })
    }

    /// Add a user metadata entry to the file header.
    pub fn add_metadata(&mut self, key: &str, value: impl Into<Vec<u8>>) {
        self.metadata.push((key.to_string(), value.into()));
    }

    /// Append one value to the current data block.
    pub fn append(&mut self, value: &AvroValue) -> Result<()> {
        encode(value, &self.schema, &mut self.block)?;
        self.count += 1;
        Ok(())
    }

    /// Number of values appended so far.
    pub fn len(&self) -> usize {
        self.count as usize
    }

    /// Whether no values were appended.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Finish the file and return its bytes.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&OCF_MAGIC);

        let schema_json = serde_json::to_string(&self.schema.to_json())?;
        let entries = 2 + self.metadata.len();
        write_long(&mut buf, entries as i64);
        write_str(&mut buf, "avro.schema");
        write_bytes(&mut buf, schema_json.as_bytes());
        write_str(&mut buf, "avro.codec");
        write_bytes(&mut buf, b"null");
        for (key, value) in &self.metadata {
            write_str(&mut buf, key);
            write_bytes(&mut buf, value);
        }
        write_long(&mut buf, 0);

        buf.extend_from_slice(&self.sync);

        if self.count > 0 {
            write_long(&mut buf, self.count);
            write_long(&mut buf, self.block.len() as i64);
            buf.extend_from_slice(&self.block);
            buf.extend_from_slice(&self.sync);
        }
        Ok(buf)
    }
}

/// Reads an Object Container File, decoding with a caller-supplied schema.
pub struct OcfReader {
    metadata: HashMap<String, Vec<u8>>,
    values: Vec<AvroValue>,
}

impl OcfReader {
    /// Read only the header metadata of a container, without decoding any
    /// data blocks. Used to discover the schema needed to decode them.
    pub fn read_header(bytes: &[u8]) -> Result<HashMap<String, Vec<u8>>> {
        let mut decoder = Decoder::new(bytes);
        Self::header_map(&mut decoder)
    }

    fn header_map(decoder: &mut Decoder) -> Result<HashMap<String, Vec<u8>>> {
        let magic = decoder.read_exact(4)?;
        if magic != OCF_MAGIC.as_slice() {
            return Err(Error::Avro(format!("bad container magic {magic:?}")));
        }
        let mut metadata = HashMap::new();
        loop {
            let count = decoder.read_long()?;
            if count == 0 {
                break;
            }
            let count = if count < 0 {
                decoder.read_long()?;
                count.unsigned_abs()
            } else {
                count as u64
            };
            for _ in 0..count {
                let key = decoder.read_str()?;
                let value = decoder.read_bytes()?;
                metadata.insert(key, value);
            }
        }
        Ok(metadata)
    }

    /// Parse `bytes`, decoding every value against `schema`.
    ///
    /// The writer schema JSON from the header is exposed via
    /// [OcfReader::schema_json]; callers that derive the expected schema
    /// from table metadata pass it here, the way manifest readers do.
    pub fn new(bytes: &[u8], schema: &AvroType) -> Result<Self> {
        let mut decoder = Decoder::new(bytes);
        let metadata = Self::header_map(&mut decoder)?;
        match metadata.get("avro.codec").map(|codec| codec.as_slice()) {
            None | Some(b"null") => {}
            Some(other) => {
                return Err(Error::Avro(format!(
                    "unsupported avro.codec {:?}",
                    String::from_utf8_lossy(other)
                )))
            }
        }

        let sync: [u8; 16] = decoder.read_exact(16)?.try_into()?;

        let mut values = Vec::new();
        while !decoder.is_empty() {
            let count = decoder.read_long()?;
            let size = decoder.read_long()?;
            if count < 0 || size < 0 {
                return Err(Error::Avro(format!(
                    "invalid data block header count={count} size={size}"
                )));
            }
            let block = decoder.read_exact(size as usize)?;
            let mut block_decoder = Decoder::new(block);
            for _ in 0..count {
                values.push(block_decoder.decode(schema)?);
            }
            if !block_decoder.is_empty() {
                return Err(Error::Avro(format!(
                    "{} trailing bytes in data block",
                    block_decoder.remaining()
                )));
            }
            let block_sync = decoder.read_exact(16)?;
            if block_sync != sync.as_slice() {
                return Err(Error::Avro("sync marker mismatch".to_string()));
            }
        }

        Ok(OcfReader { metadata, values })
    }

    /// Header metadata entries.
    pub fn metadata(&self) -> &HashMap<String, Vec<u8>> {
        &self.metadata
    }

    /// A header metadata entry as UTF-8.
    pub fn metadata_str(&self, key: &str) -> Result<Option<String>> {
        self.metadata
            .get(key)
            .map(|value| String::from_utf8(value.clone()).map_err(Error::from))
            .transpose()
    }

    /// The writer schema JSON from the header.
    pub fn schema_json(&self) -> Result<String> {
        self.metadata_str("avro.schema")?
            .ok_or_else(|| Error::Avro("missing avro.schema header".to_string()))
    }

    /// The decoded values.
    pub fn values(&self) -> &[AvroValue] {
        &self.values
    }

    /// Consume the reader, returning the decoded values.
    pub fn into_values(self) -> Vec<AvroValue> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avro::schema::{RecordField, RecordSchema};

    fn entry_schema() -> AvroType {
        AvroType::Record(RecordSchema {
            name: "entry".to_string(),
            fields: vec![
                RecordField {
                    name: "id".to_string(),
                    field_type: AvroType::Long,
                    field_id: Some(1),
                },
                RecordField {
                    name: "name".to_string(),
                    field_type: AvroType::String,
                    field_id: Some(2),
                },
            ],
        })
    }

    fn entry(id: i64, name: &str) -> AvroValue {
        AvroValue::Record(vec![
            ("id".to_string(), AvroValue::Long(id)),
            ("name".to_string(), AvroValue::String(name.to_string())),
        ])
    }

    #[test]
    fn test_magic_bytes() {
        let writer = OcfWriter::new(entry_schema()).unwrap();
        let bytes = writer.into_bytes().unwrap();
        assert_eq!(&bytes[0..4], &[0x4F, 0x62, 0x6A, 0x01]);
    }

    #[test]
    fn test_roundtrip_with_metadata() {
        let mut writer = OcfWriter::new(entry_schema()).unwrap();
        writer.add_metadata("format-version", b"2".to_vec());
        writer.append(&entry(1, "one")).unwrap();
        writer.append(&entry(2, "two")).unwrap();
        let bytes = writer.into_bytes().unwrap();

        let reader = OcfReader::new(&bytes, &entry_schema()).unwrap();
        assert_eq!(
            reader.metadata_str("format-version").unwrap(),
            Some("2".to_string())
        );
        assert!(reader.schema_json().unwrap().contains("\"record\""));
        assert_eq!(reader.values(), &[entry(1, "one"), entry(2, "two")]);
    }

    #[test]
    fn test_empty_file_has_no_blocks() {
        let writer = OcfWriter::new(entry_schema()).unwrap();
        let bytes = writer.into_bytes().unwrap();
        let reader = OcfReader::new(&bytes, &entry_schema()).unwrap();
        assert!(reader.values().is_empty());
    }

    #[test]
    fn test_bad_magic_fails() {
        let err = OcfReader::new(b"Not\x01an avro file", &entry_schema());
        assert!(err.is_err());
    }

    #[test]
    fn test_corrupt_sync_fails() {
        let mut writer = OcfWriter::new(entry_schema()).unwrap();
        writer.append(&entry(1, "one")).unwrap();
        let mut bytes = writer.into_bytes().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(OcfReader::new(&bytes, &entry_schema()).is_err());
    }

    // The reference implementation must be able to read our container
    // framing and values.
    #[test]
    fn test_reference_avro_reads_our_output() {
        let mut writer = OcfWriter::new(entry_schema()).unwrap();
        writer.append(&entry(7, "seven")).unwrap();
        let bytes = writer.into_bytes().unwrap();

        let reader = apache_avro::Reader::new(&bytes[..]).unwrap();
        let records: Vec<_> = reader.collect::<std::result::Result<_, _>>().unwrap();
        assert_eq!(records.len(), 1);
        if let apache_avro::types::Value::Record(fields) = &records[0] {
            assert_eq!(
                fields[0],
                ("id".to_string(), apache_avro::types::Value::Long(7))
            );
            assert_eq!(
                fields[1],
                (
                    "name".to_string(),
                    apache_avro::types::Value::String("seven".to_string())
                )
            );
        } else {
            panic!("expected record");
        }
    }
}
