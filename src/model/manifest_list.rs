/*!
Manifest lists.

A manifest list is an Avro file with one entry per manifest belonging to a
snapshot. It carries summary metadata that lets scan planning avoid opening
manifests: file and row counts, sequence number ranges and per-partition
bounds.
*/

use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::avro::{AvroType, AvroValue, OcfReader, OcfWriter, RecordField, RecordSchema};
use crate::error::{Error, Result};
use crate::model::metadata::FormatVersion;

#[derive(Debug, Serialize_repr, Deserialize_repr, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
/// The type of files tracked by a manifest.
pub enum ManifestContent {
    /// Data files.
    Data = 0,
    /// Delete files.
    Deletes = 1,
}

#[derive(Debug, PartialEq, Eq, Clone, Default)]
/// Summary of a partition field across all files in a manifest.
pub struct FieldSummary {
    /// Whether the manifest contains at least one partition with a null value for the field.
    pub contains_null: bool,
    /// Whether the manifest contains at least one partition with a NaN value for the field.
    pub contains_nan: Option<bool>,
    /// Lower bound for the non-null, non-NaN values in the partition field,
    /// as Iceberg-serialized bytes.
    pub lower_bound: Option<Vec<u8>>,
    /// Upper bound for the non-null, non-NaN values in the partition field,
    /// as Iceberg-serialized bytes.
    pub upper_bound: Option<Vec<u8>>,
}

#[derive(Debug, PartialEq, Eq, Clone)]
/// An entry in a manifest list, referencing one manifest file.
pub struct ManifestListEntry {
    /// Location of the manifest file.
    pub manifest_path: String,
    /// Length of the manifest file in bytes.
    pub manifest_length: i64,
    /// ID of the partition spec used to write the manifest.
    pub partition_spec_id: i32,
    /// The type of files tracked by the manifest.
    pub content: ManifestContent,
    /// The sequence number when the manifest was added to the table.
    pub sequence_number: i64,
    /// The minimum data sequence number of all entries in the manifest.
    pub min_sequence_number: i64,
    /// ID of the snapshot where the manifest file was added.
    pub added_snapshot_id: i64,
    /// Number of entries with status ADDED.
    pub added_files_count: i32,
    /// Number of entries with status EXISTING.
    pub existing_files_count: i32,
    /// Number of entries with status DELETED.
    pub deleted_files_count: i32,
    /// Number of rows in files with status ADDED.
    pub added_rows_count: i64,
    /// Number of rows in files with status EXISTING.
    pub existing_rows_count: i64,
    /// Number of rows in files with status DELETED.
    pub deleted_rows_count: i64,
    /// One summary per partition field of the manifest's spec.
    pub partitions: Option<Vec<FieldSummary>>,
    /// The first row id assigned to a row in this manifest. Format v3.
    pub first_row_id: Option<i64>,
}

/// The `manifest_file` writer schema with the fixed Iceberg field ids.
pub fn manifest_list_schema(format_version: FormatVersion) -> AvroType {
    let field_summary = AvroType::Record(RecordSchema {
        name: "r508".to_string(),
        fields: vec![
            RecordField {
                name: "contains_null".to_string(),
                field_type: AvroType::Boolean,
                field_id: Some(509),
            },
            RecordField {
                name: "contains_nan".to_string(),
                field_type: AvroType::optional(AvroType::Boolean),
                field_id: Some(518),
            },
            RecordField {
                name: "lower_bound".to_string(),
                field_type: AvroType::optional(AvroType::Bytes),
                field_id: Some(510),
            },
            RecordField {
                name: "upper_bound".to_string(),
                field_type: AvroType::optional(AvroType::Bytes),
                field_id: Some(511),
            },
        ],
    });
    let mut fields = vec![
        RecordField {
            name: "manifest_path".to_string(),
            field_type: AvroType::String,
            field_id: Some(500),
        },
        RecordField {
            name: "manifest_length".to_string(),
            field_type: AvroType::Long,
            field_id: Some(501),
        },
        RecordField {
            name: "partition_spec_id".to_string(),
            field_type: AvroType::Int,
            field_id: Some(502),
        },
        RecordField {
            name: "content".to_string(),
            field_type: AvroType::Int,
            field_id: Some(517),
        },
        RecordField {
            name: "sequence_number".to_string(),
            field_type: AvroType::Long,
            field_id: Some(515),
        },
        RecordField {
            name: "min_sequence_number".to_string(),
            field_type: AvroType::Long,
            field_id: Some(516),
        },
        RecordField {
            name: "added_snapshot_id".to_string(),
            field_type: AvroType::Long,
            field_id: Some(503),
        },
        RecordField {
            name: "added_files_count".to_string(),
            field_type: AvroType::Int,
            field_id: Some(504),
        },
        RecordField {
            name: "existing_files_count".to_string(),
            field_type: AvroType::Int,
            field_id: Some(505),
        },
        RecordField {
            name: "deleted_files_count".to_string(),
            field_type: AvroType::Int,
            field_id: Some(506),
        },
        RecordField {
            name: "added_rows_count".to_string(),
            field_type: AvroType::Long,
            field_id: Some(512),
        },
        RecordField {
            name: "existing_rows_count".to_string(),
            field_type: AvroType::Long,
            field_id: Some(513),
        },
        RecordField {
            name: "deleted_rows_count".to_string(),
            field_type: AvroType::Long,
            field_id: Some(514),
        },
        RecordField {
            name: "partitions".to_string(),
            field_type: AvroType::optional(AvroType::Array {
                element: Box::new(field_summary),
                element_id: Some(508),
            }),
            field_id: Some(507),
        },
    ];
    if format_version >= FormatVersion::V3 {
        fields.push(RecordField {
            name: "first_row_id".to_string(),
            field_type: AvroType::optional(AvroType::Long),
            field_id: Some(519),
        });
    }
    AvroType::Record(RecordSchema {
        name: "manifest_file".to_string(),
        fields,
    })
}

impl FieldSummary {
    fn to_avro(&self) -> AvroValue {
        AvroValue::Record(vec![
            (
                "contains_null".to_string(),
                AvroValue::Boolean(self.contains_null),
            ),
            (
                "contains_nan".to_string(),
                AvroValue::option(self.contains_nan.map(AvroValue::Boolean)),
            ),
            (
                "lower_bound".to_string(),
                AvroValue::option(self.lower_bound.clone().map(AvroValue::Bytes)),
            ),
            (
                "upper_bound".to_string(),
                AvroValue::option(self.upper_bound.clone().map(AvroValue::Bytes)),
            ),
        ])
    }

    fn from_avro(value: &AvroValue) -> Result<FieldSummary> {
        let missing = |name: &str| Error::Avro(format!("field summary is missing {name}"));
        Ok(FieldSummary {
            contains_null: value
                .field("contains_null")
                .ok_or_else(|| missing("contains_null"))?
                .as_bool()?,
            contains_nan: value
                .field("contains_nan")
                .cloned()
                .ok_or_else(|| missing("contains_nan"))?
                .into_option()?
                .map(|inner| inner.as_bool())
                .transpose()?,
            lower_bound: value
                .field("lower_bound")
                .cloned()
                .ok_or_else(|| missing("lower_bound"))?
                .into_option()?
                .map(|inner| inner.as_bytes().map(<[u8]>::to_vec))
                .transpose()?,
            upper_bound: value
                .field("upper_bound")
                .cloned()
                .ok_or_else(|| missing("upper_bound"))?
                .into_option()?
                .map(|inner| inner.as_bytes().map(<[u8]>::to_vec))
                .transpose()?,
        })
    }
}

impl ManifestListEntry {
    /// Convert into the Avro record for the given format version.
    pub fn to_avro(&self, format_version: FormatVersion) -> AvroValue {
        let mut fields = vec![
            (
                "manifest_path".to_string(),
                AvroValue::String(self.manifest_path.clone()),
            ),
            (
                "manifest_length".to_string(),
                AvroValue::Long(self.manifest_length),
            ),
            (
                "partition_spec_id".to_string(),
                AvroValue::Int(self.partition_spec_id),
            ),
            ("content".to_string(), AvroValue::Int(self.content as i32)),
            (
                "sequence_number".to_string(),
                AvroValue::Long(self.sequence_number),
            ),
            (
                "min_sequence_number".to_string(),
                AvroValue::Long(self.min_sequence_number),
            ),
            (
                "added_snapshot_id".to_string(),
                AvroValue::Long(self.added_snapshot_id),
            ),
            (
                "added_files_count".to_string(),
                AvroValue::Int(self.added_files_count),
            ),
            (
                "existing_files_count".to_string(),
                AvroValue::Int(self.existing_files_count),
            ),
            (
                "deleted_files_count".to_string(),
                AvroValue::Int(self.deleted_files_count),
            ),
            (
                "added_rows_count".to_string(),
                AvroValue::Long(self.added_rows_count),
            ),
            (
                "existing_rows_count".to_string(),
                AvroValue::Long(self.existing_rows_count),
            ),
            (
                "deleted_rows_count".to_string(),
                AvroValue::Long(self.deleted_rows_count),
            ),
            (
                "partitions".to_string(),
                AvroValue::option(self.partitions.as_ref().map(|summaries| {
                    AvroValue::Array(summaries.iter().map(FieldSummary::to_avro).collect())
                })),
            ),
        ];
        if format_version >= FormatVersion::V3 {
            fields.push((
                "first_row_id".to_string(),
                AvroValue::option(self.first_row_id.map(AvroValue::Long)),
            ));
        }
        AvroValue::Record(fields)
    }

    /// Convert back from the Avro record.
    pub fn from_avro(value: &AvroValue) -> Result<ManifestListEntry> {
        let missing = |name: &str| Error::Avro(format!("manifest_file is missing {name}"));
        let long = |name: &str| value.field(name).ok_or_else(|| missing(name))?.as_long();
        let int = |name: &str| value.field(name).ok_or_else(|| missing(name))?.as_int();
        let content = match int("content")? {
            0 => ManifestContent::Data,
            1 => ManifestContent::Deletes,
            other => {
                return Err(Error::Avro(format!("invalid manifest content {other}")));
            }
        };
        let partitions = value
            .field("partitions")
            .cloned()
            .ok_or_else(|| missing("partitions"))?
            .into_option()?
            .map(|inner| match inner {
                AvroValue::Array(items) => {
                    items.iter().map(FieldSummary::from_avro).collect::<Result<Vec<_>>>()
                }
                other => Err(Error::Avro(format!("expected array, got {other:?}"))),
            })
            .transpose()?;
        let first_row_id = value
            .field("first_row_id")
            .cloned()
            .map(AvroValue::into_option)
            .transpose()?
            .flatten()
            .map(|inner| inner.as_long())
            .transpose()?;
        Ok(ManifestListEntry {
            manifest_path: value
                .field("manifest_path")
                .ok_or_else(|| missing("manifest_path"))?
                .as_str()?
                .to_string(),
            manifest_length: long("manifest_length")?,
            partition_spec_id: int("partition_spec_id")?,
            content,
            sequence_number: long("sequence_number")?,
            min_sequence_number: long("min_sequence_number")?,
            added_snapshot_id: long("added_snapshot_id")?,
            added_files_count: int("added_files_count")?,
            existing_files_count: int("existing_files_count")?,
            deleted_files_count: int("deleted_files_count")?,
            added_rows_count: long("added_rows_count")?,
            existing_rows_count: long("existing_rows_count")?,
            deleted_rows_count: long("deleted_rows_count")?,
            partitions,
            first_row_id,
        })
    }
}

/// Writes a snapshot's manifest list.
pub struct ManifestListWriter {
    format_version: FormatVersion,
    writer: OcfWriter,
}

impl ManifestListWriter {
    /// Create a writer for the given format version.
    pub fn new(format_version: FormatVersion) -> Result<Self> {
        let writer = OcfWriter::new(manifest_list_schema(format_version))?;
        Ok(ManifestListWriter {
            format_version,
            writer,
        })
    }

    /// Append one manifest entry.
    pub fn append(&mut self, entry: &ManifestListEntry) -> Result<()> {
        self.writer.append(&entry.to_avro(self.format_version))
    }

    /// Finish and return the Avro file bytes.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        self.writer.into_bytes()
    }
}

/// Reads a snapshot's manifest list.
pub struct ManifestListReader {
    entries: Vec<ManifestListEntry>,
}

impl ManifestListReader {
    /// Parse a manifest list file.
    pub fn new(bytes: &[u8], format_version: FormatVersion) -> Result<Self> {
        let reader = OcfReader::new(bytes, &manifest_list_schema(format_version))?;
        let entries = reader
            .values()
            .iter()
            .map(ManifestListEntry::from_avro)
            .collect::<Result<Vec<_>>>()?;
        Ok(ManifestListReader { entries })
    }

    /// The decoded entries.
    pub fn entries(&self) -> &[ManifestListEntry] {
        &self.entries
    }

    /// Consume the reader, returning the entries.
    pub fn into_entries(self) -> Vec<ManifestListEntry> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_entry() -> ManifestListEntry {
        ManifestListEntry {
            manifest_path: "s3://bucket/wh/t/metadata/abc-m0.avro".to_string(),
            manifest_length: 5432,
            partition_spec_id: 0,
            content: ManifestContent::Data,
            sequence_number: 3,
            min_sequence_number: 1,
            added_snapshot_id: 638933773299822130,
            added_files_count: 2,
            existing_files_count: 3,
            deleted_files_count: 0,
            added_rows_count: 100,
            existing_rows_count: 3000,
            deleted_rows_count: 0,
            partitions: Some(vec![FieldSummary {
                contains_null: false,
                contains_nan: Some(false),
                lower_bound: Some(2000i32.to_le_bytes().to_vec()),
                upper_bound: Some(2010i32.to_le_bytes().to_vec()),
            }]),
            first_row_id: None,
        }
    }

    #[test]
    fn test_roundtrip_v2() {
        let mut writer = ManifestListWriter::new(FormatVersion::V2).unwrap();
        writer.append(&test_entry()).unwrap();
        let bytes = writer.into_bytes().unwrap();

        let reader = ManifestListReader::new(&bytes, FormatVersion::V2).unwrap();
        assert_eq!(reader.entries(), &[test_entry()]);
    }

    #[test]
    fn test_roundtrip_v3_first_row_id() {
        let mut entry = test_entry();
        entry.first_row_id = Some(4000);
        let mut writer = ManifestListWriter::new(FormatVersion::V3).unwrap();
        writer.append(&entry).unwrap();
        let bytes = writer.into_bytes().unwrap();

        let reader = ManifestListReader::new(&bytes, FormatVersion::V3).unwrap();
        assert_eq!(reader.entries()[0].first_row_id, Some(4000));
    }

    #[test]
    fn test_schema_field_ids() {
        let schema = manifest_list_schema(FormatVersion::V2);
        let json = schema.to_json();
        assert_eq!(json["name"], "manifest_file");
        assert_eq!(json["fields"][0]["field-id"], 500);
        let partition_field = &json["fields"][13];
        assert_eq!(partition_field["field-id"], 507);
        assert_eq!(
            partition_field["type"][1]["items"]["name"],
            "r508"
        );
    }

    #[test]
    fn test_reference_avro_reads_manifest_list() {
        let mut writer = ManifestListWriter::new(FormatVersion::V2).unwrap();
        writer.append(&test_entry()).unwrap();
        let bytes = writer.into_bytes().unwrap();

        let reader = apache_avro::Reader::new(&bytes[..]).unwrap();
        let values: Vec<_> = reader.collect::<std::result::Result<_, _>>().unwrap();
        assert_eq!(values.len(), 1);
    }
}
