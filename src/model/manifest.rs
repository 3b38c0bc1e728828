/*!
Manifest files.

A manifest lists data or delete files, along with each file's partition
tuple, metrics and tracking information. Entries are stored in an Avro
container whose `data_file` record is specialised for the partition spec in
use, and whose header carries the table schema and partition spec so the
file is self-describing.
*/
use std::collections::HashMap;

use serde_repr::{Deserialize_repr, Serialize_repr};

type StdByteMap = HashMap<String, Vec<u8>>;

use crate::avro::{AvroType, AvroValue, OcfReader, OcfWriter, RecordField, RecordSchema};
use crate::error::{Error, Result};
use crate::model::manifest_list::{FieldSummary, ManifestContent, ManifestListEntry};
use crate::model::metadata::{FormatVersion, TableMetadata};
use crate::model::partition::{PartitionField, PartitionSpec, Transform};
use crate::model::schema::{PrimitiveType, Schema};
use crate::model::values::{StructValue, Value};

#[derive(Debug, Serialize_repr, Deserialize_repr, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
/// Used to track additions and deletions.
pub enum Status {
    /// The file carried over from a previous snapshot.
    Existing = 0,
    /// The file was added by this snapshot.
    Added = 1,
    /// The file was removed by this snapshot.
    Deleted = 2,
}

#[derive(Debug, Serialize_repr, Deserialize_repr, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
/// Type of content stored by the data file.
pub enum Content {
    /// Data.
    Data = 0,
    /// Deletes at position.
    PositionDeletes = 1,
    /// Delete by equality.
    EqualityDeletes = 2,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
/// Name of file format
pub enum FileFormat {
    /// Avro file
    Avro,
    /// Orc file
    Orc,
    /// Parquet file
    Parquet,
}

impl FileFormat {
    fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Avro => "AVRO",
            FileFormat::Orc => "ORC",
            FileFormat::Parquet => "PARQUET",
        }
    }

    fn parse(value: &str) -> Result<FileFormat> {
        match value.to_ascii_uppercase().as_str() {
            "AVRO" => Ok(FileFormat::Avro),
            "ORC" => Ok(FileFormat::Orc),
            "PARQUET" => Ok(FileFormat::Parquet),
            other => Err(Error::Avro(format!("unknown file format {other}"))),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
/// A data or delete file tracked by a manifest entry.
pub struct DataFile {
    /// Type of content in the file.
    pub content: Content,
    /// Full URI for the file with an FS scheme.
    pub file_path: String,
    /// Format of the file.
    pub file_format: FileFormat,
    /// Partition tuple, one value per field of the writing spec.
    pub partition: StructValue,
    /// Number of records in this file.
    pub record_count: i64,
    /// Total file size in bytes.
    pub file_size_in_bytes: i64,
    /// Map from column id to total size on disk.
    pub column_sizes: Option<HashMap<i32, i64>>,
    /// Map from column id to number of values, including nulls and NaN.
    pub value_counts: Option<HashMap<i32, i64>>,
    /// Map from column id to number of null values.
    pub null_value_counts: Option<HashMap<i32, i64>>,
    /// Map from column id to number of NaN values.
    pub nan_value_counts: Option<HashMap<i32, i64>>,
    /// Map from column id to lower bound in the column, serialized.
    pub lower_bounds: Option<HashMap<i32, Vec<u8>>>,
    /// Map from column id to upper bound in the column, serialized.
    pub upper_bounds: Option<HashMap<i32, Vec<u8>>>,
    /// Implementation specific key metadata for encryption.
    pub key_metadata: Option<Vec<u8>>,
    /// Split offsets for the data file.
    pub split_offsets: Option<Vec<i64>>,
    /// Field ids used to determine row equality in equality delete files.
    pub equality_ids: Option<Vec<i32>>,
    /// ID representing sort order for this file.
    pub sort_order_id: Option<i32>,
    /// The first row id assigned to rows in this file. Format v3.
    pub first_row_id: Option<i64>,
    /// The data file a deletion vector applies to. Format v3.
    pub referenced_data_file: Option<String>,
    /// Offset of a deletion vector blob in the file. Format v3.
    pub content_offset: Option<i64>,
    /// Size of a deletion vector blob in the file. Format v3.
    pub content_size_in_bytes: Option<i64>,
}

impl DataFile {
    /// A data file with no statistics.
    pub fn new(file_path: &str, file_format: FileFormat, record_count: i64, file_size_in_bytes: i64) -> Self {
        DataFile {
            content: Content::Data,
            file_path: file_path.to_string(),
            file_format,
            partition: StructValue::default(),
            record_count,
            file_size_in_bytes,
            column_sizes: None,
            value_counts: None,
            null_value_counts: None,
            nan_value_counts: None,
            lower_bounds: None,
            upper_bounds: None,
            key_metadata: None,
            split_offsets: None,
            equality_ids: None,
            sort_order_id: None,
            first_row_id: None,
            referenced_data_file: None,
            content_offset: None,
            content_size_in_bytes: None,
        }
    }

    /// Fold collected shredded-column statistics into this file's stats
    /// maps. Entries for schema columns are left untouched; the caller
    /// guarantees the shredded field-id space starts above the table's
    /// `last-column-id`.
    pub fn merge_collected_stats(
        &mut self,
        value_counts: &HashMap<i32, i64>,
        null_value_counts: &HashMap<i32, i64>,
        lower_bounds: &HashMap<i32, Vec<u8>>,
        upper_bounds: &HashMap<i32, Vec<u8>>,
    ) {
        self.value_counts
            .get_or_insert_with(HashMap::new)
            .extend(value_counts.iter().map(|(k, v)| (*k, *v)));
        self.null_value_counts
            .get_or_insert_with(HashMap::new)
            .extend(null_value_counts.iter().map(|(k, v)| (*k, *v)));
        self.lower_bounds
            .get_or_insert_with(HashMap::new)
            .extend(lower_bounds.iter().map(|(k, v)| (*k, v.clone())));
        self.upper_bounds
            .get_or_insert_with(HashMap::new)
            .extend(upper_bounds.iter().map(|(k, v)| (*k, v.clone())));
    }
}

#[derive(Debug, PartialEq, Clone)]
/// Entry in a manifest.
pub struct ManifestEntry {
    /// Used to track additions and deletions.
    pub status: Status,
    /// Snapshot id where the file was added, or deleted if status is Deleted.
    /// Inherited from the manifest list when null.
    pub snapshot_id: Option<i64>,
    /// Data sequence number of the file. Inherited when null and status is Added.
    pub sequence_number: Option<i64>,
    /// File sequence number indicating when the file was added. Inherited
    /// when null and status is Added.
    pub file_sequence_number: Option<i64>,
    /// The file this entry tracks.
    pub data_file: DataFile,
}

/// The result type a transform produces from a primitive source type.
pub fn transform_result_type(transform: &Transform, source: &PrimitiveType) -> PrimitiveType {
    match transform {
        Transform::Identity | Transform::Void | Transform::Truncate(_) => source.clone(),
        Transform::Bucket(_) | Transform::Year | Transform::Month | Transform::Hour => {
            PrimitiveType::Int
        }
        Transform::Day => PrimitiveType::Date,
    }
}

/// Resolve the name and value type of every partition field of a spec
/// against the schema it was written with.
pub fn partition_field_types(
    spec: &PartitionSpec,
    schema: &Schema,
) -> Result<Vec<(String, PrimitiveType)>> {
    spec.fields
        .iter()
        .map(|field| {
            let source = schema
                .struct_fields
                .field_by_id(field.source_id)
                .ok_or_else(|| {
                    Error::NotFound("Partition source field".to_string(), field.source_id.to_string())
                })?;
            let primitive = source.field_type.as_primitive().ok_or_else(|| {
                Error::Validation(format!(
                    "partition source {} is not a primitive column",
                    source.name
                ))
            })?;
            Ok((
                field.name.clone(),
                transform_result_type(&field.transform, primitive),
            ))
        })
        .collect()
}

/// The `r102` partition record schema for a spec.
pub fn partition_avro_schema(spec: &PartitionSpec, schema: &Schema) -> Result<AvroType> {
    let types = partition_field_types(spec, schema)?;
    let fields = spec
        .fields
        .iter()
        .zip(types.iter())
        .map(|(field, (name, primitive))| {
            Ok(RecordField {
                name: name.clone(),
                field_type: AvroType::optional(Value::avro_type_of(primitive)?),
                field_id: Some(field.field_id),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(AvroType::Record(RecordSchema {
        name: "r102".to_string(),
        fields,
    }))
}

fn keyed_map_schema(name: &str, key_id: i32, value_id: i32, value_type: AvroType) -> AvroType {
    AvroType::Array {
        element: Box::new(AvroType::Record(RecordSchema {
            name: name.to_string(),
            fields: vec![
                RecordField {
                    name: "key".to_string(),
                    field_type: AvroType::Int,
                    field_id: Some(key_id),
                },
                RecordField {
                    name: "value".to_string(),
                    field_type: value_type,
                    field_id: Some(value_id),
                },
            ],
        })),
        element_id: None,
    }
}

/// The `r2` data file record schema.
fn data_file_schema(partition: AvroType, format_version: FormatVersion) -> AvroType {
    let mut fields = vec![
        RecordField {
            name: "content".to_string(),
            field_type: AvroType::Int,
            field_id: Some(134),
        },
        RecordField {
            name: "file_path".to_string(),
            field_type: AvroType::String,
            field_id: Some(100),
        },
        RecordField {
            name: "file_format".to_string(),
            field_type: AvroType::String,
            field_id: Some(101),
        },
        RecordField {
            name: "partition".to_string(),
            field_type: partition,
            field_id: Some(102),
        },
        RecordField {
            name: "record_count".to_string(),
            field_type: AvroType::Long,
            field_id: Some(103),
        },
        RecordField {
            name: "file_size_in_bytes".to_string(),
            field_type: AvroType::Long,
            field_id: Some(104),
        },
        RecordField {
            name: "column_sizes".to_string(),
            field_type: AvroType::optional(keyed_map_schema("k117_v118", 117, 118, AvroType::Long)),
            field_id: Some(108),
        },
        RecordField {
            name: "value_counts".to_string(),
            field_type: AvroType::optional(keyed_map_schema("k119_v120", 119, 120, AvroType::Long)),
            field_id: Some(109),
        },
        RecordField {
            name: "null_value_counts".to_string(),
            field_type: AvroType::optional(keyed_map_schema("k121_v122", 121, 122, AvroType::Long)),
            field_id: Some(110),
        },
        RecordField {
            name: "nan_value_counts".to_string(),
            field_type: AvroType::optional(keyed_map_schema("k138_v139", 138, 139, AvroType::Long)),
            field_id: Some(137),
        },
        RecordField {
            name: "lower_bounds".to_string(),
            field_type: AvroType::optional(keyed_map_schema("k126_v127", 126, 127, AvroType::Bytes)),
            field_id: Some(125),
        },
        RecordField {
            name: "upper_bounds".to_string(),
            field_type: AvroType::optional(keyed_map_schema("k129_v130", 129, 130, AvroType::Bytes)),
            field_id: Some(128),
        },
        RecordField {
            name: "key_metadata".to_string(),
            field_type: AvroType::optional(AvroType::Bytes),
            field_id: Some(131),
        },
        RecordField {
            name: "split_offsets".to_string(),
            field_type: AvroType::optional(AvroType::Array {
                element: Box::new(AvroType::Long),
                element_id: Some(133),
            }),
            field_id: Some(132),
        },
        RecordField {
            name: "equality_ids".to_string(),
            field_type: AvroType::optional(AvroType::Array {
                element: Box::new(AvroType::Int),
                element_id: Some(136),
            }),
            field_id: Some(135),
        },
        RecordField {
            name: "sort_order_id".to_string(),
            field_type: AvroType::optional(AvroType::Int),
            field_id: Some(140),
        },
    ];
    if format_version >= FormatVersion::V3 {
        fields.push(RecordField {
            name: "first_row_id".to_string(),
            field_type: AvroType::optional(AvroType::Long),
            field_id: Some(142),
        });
        fields.push(RecordField {
            name: "referenced_data_file".to_string(),
            field_type: AvroType::optional(AvroType::String),
            field_id: Some(143),
        });
        fields.push(RecordField {
            name: "content_offset".to_string(),
            field_type: AvroType::optional(AvroType::Long),
            field_id: Some(144),
        });
        fields.push(RecordField {
            name: "content_size_in_bytes".to_string(),
            field_type: AvroType::optional(AvroType::Long),
            field_id: Some(145),
        });
    }
    AvroType::Record(RecordSchema {
        name: "r2".to_string(),
        fields,
    })
}

/// The `manifest_entry` writer schema for a partition record schema.
pub fn manifest_entry_schema(partition: AvroType, format_version: FormatVersion) -> AvroType {
    AvroType::Record(RecordSchema {
        name: "manifest_entry".to_string(),
        fields: vec![
            RecordField {
                name: "status".to_string(),
                field_type: AvroType::Int,
                field_id: Some(0),
            },
            RecordField {
                name: "snapshot_id".to_string(),
                field_type: AvroType::optional(AvroType::Long),
                field_id: Some(1),
            },
            RecordField {
                name: "sequence_number".to_string(),
                field_type: AvroType::optional(AvroType::Long),
                field_id: Some(3),
            },
            RecordField {
                name: "file_sequence_number".to_string(),
                field_type: AvroType::optional(AvroType::Long),
                field_id: Some(4),
            },
            RecordField {
                name: "data_file".to_string(),
                field_type: data_file_schema(partition, format_version),
                field_id: Some(2),
            },
        ],
    })
}

fn long_map_to_avro(map: &Option<HashMap<i32, i64>>) -> AvroValue {
    AvroValue::option(map.as_ref().map(|map| {
        let mut entries: Vec<_> = map.iter().collect();
        entries.sort_by_key(|(key, _)| **key);
        AvroValue::Array(
            entries
                .into_iter()
                .map(|(key, value)| {
                    AvroValue::Record(vec![
                        ("key".to_string(), AvroValue::Int(*key)),
                        ("value".to_string(), AvroValue::Long(*value)),
                    ])
                })
                .collect(),
        )
    }))
}

fn bytes_map_to_avro(map: &Option<HashMap<i32, Vec<u8>>>) -> AvroValue {
    AvroValue::option(map.as_ref().map(|map| {
        let mut entries: Vec<_> = map.iter().collect();
        entries.sort_by_key(|(key, _)| **key);
        AvroValue::Array(
            entries
                .into_iter()
                .map(|(key, value)| {
                    AvroValue::Record(vec![
                        ("key".to_string(), AvroValue::Int(*key)),
                        ("value".to_string(), AvroValue::Bytes(value.clone())),
                    ])
                })
                .collect(),
        )
    }))
}

fn long_map_from_avro(value: Option<AvroValue>) -> Result<Option<HashMap<i32, i64>>> {
    value
        .map(|inner| match inner {
            AvroValue::Array(items) => items
                .iter()
                .map(|item| {
                    let key = item
                        .field("key")
                        .ok_or_else(|| Error::Avro("map entry is missing key".to_string()))?
                        .as_int()?;
                    let value = item
                        .field("value")
                        .ok_or_else(|| Error::Avro("map entry is missing value".to_string()))?
                        .as_long()?;
                    Ok((key, value))
                })
                .collect::<Result<HashMap<_, _>>>(),
            other => Err(Error::Avro(format!("expected array, got {other:?}"))),
        })
        .transpose()
}

fn bytes_map_from_avro(value: Option<AvroValue>) -> Result<Option<HashMap<i32, Vec<u8>>>> {
    value
        .map(|inner| match inner {
            AvroValue::Array(items) => items
                .iter()
                .map(|item| {
                    let key = item
                        .field("key")
                        .ok_or_else(|| Error::Avro("map entry is missing key".to_string()))?
                        .as_int()?;
                    let value = item
                        .field("value")
                        .ok_or_else(|| Error::Avro("map entry is missing value".to_string()))?
                        .as_bytes()?
                        .to_vec();
                    Ok((key, value))
                })
                .collect::<Result<HashMap<_, _>>>(),
            other => Err(Error::Avro(format!("expected array, got {other:?}"))),
        })
        .transpose()
}

impl ManifestEntry {
    /// Convert into the Avro record, converting the partition tuple using
    /// the spec's field value types.
    pub fn to_avro(
        &self,
        partition_types: &[(String, PrimitiveType)],
        format_version: FormatVersion,
    ) -> Result<AvroValue> {
        let partition = AvroValue::Record(
            partition_types
                .iter()
                .map(|(name, _)| {
                    let value = self
                        .data_file
                        .partition
                        .get(name)
                        .cloned()
                        .flatten();
                    (
                        name.clone(),
                        AvroValue::option(value.map(|value| value.to_avro())),
                    )
                })
                .collect(),
        );
        let file = &self.data_file;
        let mut data_file = vec![
            ("content".to_string(), AvroValue::Int(file.content as i32)),
            (
                "file_path".to_string(),
                AvroValue::String(file.file_path.clone()),
            ),
            (
                "file_format".to_string(),
                AvroValue::String(file.file_format.as_str().to_string()),
            ),
            ("partition".to_string(), partition),
            (
                "record_count".to_string(),
                AvroValue::Long(file.record_count),
            ),
            (
                "file_size_in_bytes".to_string(),
                AvroValue::Long(file.file_size_in_bytes),
            ),
            (
                "column_sizes".to_string(),
                long_map_to_avro(&file.column_sizes),
            ),
            (
                "value_counts".to_string(),
                long_map_to_avro(&file.value_counts),
            ),
            (
                "null_value_counts".to_string(),
                long_map_to_avro(&file.null_value_counts),
            ),
            (
                "nan_value_counts".to_string(),
                long_map_to_avro(&file.nan_value_counts),
            ),
            (
                "lower_bounds".to_string(),
                bytes_map_to_avro(&file.lower_bounds),
            ),
            (
                "upper_bounds".to_string(),
                bytes_map_to_avro(&file.upper_bounds),
            ),
            (
                "key_metadata".to_string(),
                AvroValue::option(file.key_metadata.clone().map(AvroValue::Bytes)),
            ),
            (
                "split_offsets".to_string(),
                AvroValue::option(file.split_offsets.as_ref().map(|offsets| {
                    AvroValue::Array(offsets.iter().map(|offset| AvroValue::Long(*offset)).collect())
                })),
            ),
            (
                "equality_ids".to_string(),
                AvroValue::option(file.equality_ids.as_ref().map(|ids| {
                    AvroValue::Array(ids.iter().map(|id| AvroValue::Int(*id)).collect())
                })),
            ),
            (
                "sort_order_id".to_string(),
                AvroValue::option(file.sort_order_id.map(AvroValue::Int)),
            ),
        ];
        if format_version >= FormatVersion::V3 {
            data_file.push((
                "first_row_id".to_string(),
                AvroValue::option(file.first_row_id.map(AvroValue::Long)),
            ));
            data_file.push((
                "referenced_data_file".to_string(),
                AvroValue::option(
                    file.referenced_data_file
                        .clone()
                        .map(AvroValue::String),
                ),
            ));
            data_file.push((
                "content_offset".to_string(),
                AvroValue::option(file.content_offset.map(AvroValue::Long)),
            ));
            data_file.push((
                "content_size_in_bytes".to_string(),
                AvroValue::option(file.content_size_in_bytes.map(AvroValue::Long)),
            ));
        }
        Ok(AvroValue::Record(vec![
            ("status".to_string(), AvroValue::Int(self.status as i32)),
            (
                "snapshot_id".to_string(),
                AvroValue::option(self.snapshot_id.map(AvroValue::Long)),
            ),
            (
                "sequence_number".to_string(),
                AvroValue::option(self.sequence_number.map(AvroValue::Long)),
            ),
            (
                "file_sequence_number".to_string(),
                AvroValue::option(self.file_sequence_number.map(AvroValue::Long)),
            ),
            ("data_file".to_string(), AvroValue::Record(data_file)),
        ]))
    }

    /// Convert back from the Avro record.
    pub fn from_avro(
        value: &AvroValue,
        partition_types: &[(String, PrimitiveType)],
    ) -> Result<ManifestEntry> {
        let missing = |name: &str| Error::Avro(format!("manifest_entry is missing {name}"));
        let status = match value.field("status").ok_or_else(|| missing("status"))?.as_int()? {
            0 => Status::Existing,
            1 => Status::Added,
            2 => Status::Deleted,
            other => return Err(Error::Avro(format!("invalid entry status {other}"))),
        };
        let opt_long = |name: &str| -> Result<Option<i64>> {
            value
                .field(name)
                .cloned()
                .map(AvroValue::into_option)
                .transpose()?
                .flatten()
                .map(|inner| inner.as_long())
                .transpose()
        };
        let snapshot_id = opt_long("snapshot_id")?;
        let sequence_number = opt_long("sequence_number")?;
        let file_sequence_number = opt_long("file_sequence_number")?;

        let data_file = value.field("data_file").ok_or_else(|| missing("data_file"))?;
        let file_missing = |name: &str| Error::Avro(format!("data_file is missing {name}"));
        let content = match data_file
            .field("content")
            .ok_or_else(|| file_missing("content"))?
            .as_int()?
        {
            0 => Content::Data,
            1 => Content::PositionDeletes,
            2 => Content::EqualityDeletes,
            other => return Err(Error::Avro(format!("invalid data file content {other}"))),
        };
        let partition_record = data_file
            .field("partition")
            .ok_or_else(|| file_missing("partition"))?;
        let partition = partition_types
            .iter()
            .map(|(name, primitive)| {
                let field = partition_record
                    .field(name)
                    .cloned()
                    .ok_or_else(|| file_missing(name))?
                    .into_option()?
                    .map(|inner| Value::from_avro(&inner, primitive))
                    .transpose()?;
                Ok((name.clone(), field))
            })
            .collect::<Result<StructValue>>()?;

        let file_opt_long = |name: &str| -> Result<Option<i64>> {
            data_file
                .field(name)
                .cloned()
                .map(AvroValue::into_option)
                .transpose()?
                .flatten()
                .map(|inner| inner.as_long())
                .transpose()
        };
        let split_offsets = data_file
            .field("split_offsets")
            .cloned()
            .ok_or_else(|| file_missing("split_offsets"))?
            .into_option()?
            .map(|inner| match inner {
                AvroValue::Array(items) => {
                    items.iter().map(AvroValue::as_long).collect::<Result<Vec<_>>>()
                }
                other => Err(Error::Avro(format!("expected array, got {other:?}"))),
            })
            .transpose()?;
        let equality_ids = data_file
            .field("equality_ids")
            .cloned()
            .ok_or_else(|| file_missing("equality_ids"))?
            .into_option()?
            .map(|inner| match inner {
                AvroValue::Array(items) => {
                    items.iter().map(AvroValue::as_int).collect::<Result<Vec<_>>>()
                }
                other => Err(Error::Avro(format!("expected array, got {other:?}"))),
            })
            .transpose()?;

        Ok(ManifestEntry {
            status,
            snapshot_id,
            sequence_number,
            file_sequence_number,
            data_file: DataFile {
                content,
                file_path: data_file
                    .field("file_path")
                    .ok_or_else(|| file_missing("file_path"))?
                    .as_str()?
                    .to_string(),
                file_format: FileFormat::parse(
                    data_file
                        .field("file_format")
                        .ok_or_else(|| file_missing("file_format"))?
                        .as_str()?,
                )?,
                partition,
                record_count: data_file
                    .field("record_count")
                    .ok_or_else(|| file_missing("record_count"))?
                    .as_long()?,
                file_size_in_bytes: data_file
                    .field("file_size_in_bytes")
                    .ok_or_else(|| file_missing("file_size_in_bytes"))?
                    .as_long()?,
                column_sizes: long_map_from_avro(
                    data_file
                        .field("column_sizes")
                        .cloned()
                        .ok_or_else(|| file_missing("column_sizes"))?
                        .into_option()?,
                )?,
                value_counts: long_map_from_avro(
                    data_file
                        .field("value_counts")
                        .cloned()
                        .ok_or_else(|| file_missing("value_counts"))?
                        .into_option()?,
                )?,
                null_value_counts: long_map_from_avro(
                    data_file
                        .field("null_value_counts")
                        .cloned()
                        .ok_or_else(|| file_missing("null_value_counts"))?
                        .into_option()?,
                )?,
                nan_value_counts: long_map_from_avro(
                    data_file
                        .field("nan_value_counts")
                        .cloned()
                        .ok_or_else(|| file_missing("nan_value_counts"))?
                        .into_option()?,
                )?,
                lower_bounds: bytes_map_from_avro(
                    data_file
                        .field("lower_bounds")
                        .cloned()
                        .ok_or_else(|| file_missing("lower_bounds"))?
                        .into_option()?,
                )?,
                upper_bounds: bytes_map_from_avro(
                    data_file
                        .field("upper_bounds")
                        .cloned()
                        .ok_or_else(|| file_missing("upper_bounds"))?
                        .into_option()?,
                )?,
                key_metadata: data_file
                    .field("key_metadata")
                    .cloned()
                    .ok_or_else(|| file_missing("key_metadata"))?
                    .into_option()?
                    .map(|inner| inner.as_bytes().map(<[u8]>::to_vec))
                    .transpose()?,
                split_offsets,
                equality_ids,
                sort_order_id: data_file
                    .field("sort_order_id")
                    .cloned()
                    .ok_or_else(|| file_missing("sort_order_id"))?
                    .into_option()?
                    .map(|inner| inner.as_int())
                    .transpose()?,
                first_row_id: file_opt_long("first_row_id")?,
                referenced_data_file: data_file
                    .field("referenced_data_file")
                    .cloned()
                    .map(AvroValue::into_option)
                    .transpose()?
                    .flatten()
                    .map(|inner| inner.as_str().map(str::to_string))
                    .transpose()?,
                content_offset: file_opt_long("content_offset")?,
                content_size_in_bytes: file_opt_long("content_size_in_bytes")?,
            },
        })
    }
}

/// Writes a manifest file and computes its manifest-list entry.
pub struct ManifestWriter {
    manifest_path: String,
    snapshot_id: i64,
    sequence_number: i64,
    spec_id: i32,
    content: ManifestContent,
    format_version: FormatVersion,
    partition_types: Vec<(String, PrimitiveType)>,
    writer: OcfWriter,
    summaries: Vec<FieldSummary>,
    partition_mins: Vec<Option<Value>>,
    partition_maxs: Vec<Option<Value>>,
    added_files: i32,
    existing_files: i32,
    deleted_files: i32,
    added_rows: i64,
    existing_rows: i64,
    deleted_rows: i64,
    min_sequence_number: Option<i64>,
}

impl ManifestWriter {
    /// Create a writer for the table's default spec and current schema.
    ///
    /// `sequence_number` is the data sequence number the containing
    /// snapshot will commit with; entries with inherited (null) sequence
    /// numbers count against it in the manifest-list summary.
    pub fn new(
        manifest_path: &str,
        snapshot_id: i64,
        sequence_number: i64,
        table_metadata: &TableMetadata,
        content: ManifestContent,
    ) -> Result<Self> {
        let schema = table_metadata.current_schema()?;
        let spec = table_metadata.default_partition_spec()?;
        let partition_types = partition_field_types(spec, schema)?;
        let entry_schema = manifest_entry_schema(
            partition_avro_schema(spec, schema)?,
            table_metadata.format_version,
        );
        let mut writer = OcfWriter::new(entry_schema)?;
        writer.add_metadata("schema", serde_json::to_vec(schema)?);
        writer.add_metadata("schema-id", schema.schema_id.to_string().into_bytes());
        writer.add_metadata("partition-spec", serde_json::to_vec(&spec.fields)?);
        writer.add_metadata(
            "partition-spec-id",
            spec.spec_id.to_string().into_bytes(),
        );
        writer.add_metadata(
            "format-version",
            (table_metadata.format_version as u8).to_string().into_bytes(),
        );
        writer.add_metadata(
            "content",
            match content {
                ManifestContent::Data => b"data".to_vec(),
                ManifestContent::Deletes => b"deletes".to_vec(),
            },
        );
        let field_count = partition_types.len();
        Ok(ManifestWriter {
            manifest_path: manifest_path.to_string(),
            snapshot_id,
            sequence_number,
            spec_id: spec.spec_id,
            content,
            format_version: table_metadata.format_version,
            partition_types,
            writer,
            summaries: vec![FieldSummary::default(); field_count],
            partition_mins: vec![None; field_count],
            partition_maxs: vec![None; field_count],
            added_files: 0,
            existing_files: 0,
            deleted_files: 0,
            added_rows: 0,
            existing_rows: 0,
            deleted_rows: 0,
            min_sequence_number: None,
        })
    }

    /// Append an entry, folding it into the running summary.
    pub fn append(&mut self, entry: ManifestEntry) -> Result<()> {
        match entry.status {
            Status::Added => {
                self.added_files += 1;
                self.added_rows += entry.data_file.record_count;
            }
            Status::Existing => {
                self.existing_files += 1;
                self.existing_rows += entry.data_file.record_count;
            }
            Status::Deleted => {
                self.deleted_files += 1;
                self.deleted_rows += entry.data_file.record_count;
            }
        }
        let entry_sequence = entry.sequence_number.unwrap_or(self.sequence_number);
        self.min_sequence_number = Some(match self.min_sequence_number {
            Some(min) => min.min(entry_sequence),
            None => entry_sequence,
        });

        for (index, (name, _)) in self.partition_types.iter().enumerate() {
            match entry.data_file.partition.get(name).cloned().flatten() {
                None => self.summaries[index].contains_null = true,
                Some(value) => {
                    let is_nan = matches!(&value, Value::Float(f) if f.is_nan())
                        || matches!(&value, Value::Double(d) if d.is_nan());
                    if is_nan {
                        self.summaries[index].contains_nan = Some(true);
                        continue;
                    }
                    if self.summaries[index].contains_nan.is_none() {
                        self.summaries[index].contains_nan = Some(false);
                    }
                    let min = &mut self.partition_mins[index];
                    match min {
                        Some(current)
                            if value.compare(current) == Some(std::cmp::Ordering::Less) =>
                        {
                            *min = Some(value.clone())
                        }
                        None => *min = Some(value.clone()),
                        _ => {}
                    }
                    let max = &mut self.partition_maxs[index];
                    match max {
                        Some(current)
                            if value.compare(current) == Some(std::cmp::Ordering::Greater) =>
                        {
                            *max = Some(value.clone())
                        }
                        None => *max = Some(value.clone()),
                        _ => {}
                    }
                }
            }
        }

        let avro = entry.to_avro(&self.partition_types, self.format_version)?;
        self.writer.append(&avro)
    }

    /// Finish the manifest, returning its bytes and the summary entry for
    /// the manifest list.
    pub fn finish(self) -> Result<(Vec<u8>, ManifestListEntry)> {
        let mut summaries = self.summaries;
        for (index, summary) in summaries.iter_mut().enumerate() {
            summary.lower_bound = self.partition_mins[index].as_ref().map(Value::to_bytes);
            summary.upper_bound = self.partition_maxs[index].as_ref().map(Value::to_bytes);
        }
        let bytes = self.writer.into_bytes()?;
        let entry = ManifestListEntry {
            manifest_path: self.manifest_path,
            manifest_length: bytes.len() as i64,
            partition_spec_id: self.spec_id,
            content: self.content,
            sequence_number: self.sequence_number,
            min_sequence_number: self.min_sequence_number.unwrap_or(self.sequence_number),
            added_snapshot_id: self.snapshot_id,
            added_files_count: self.added_files,
            existing_files_count: self.existing_files,
            deleted_files_count: self.deleted_files,
            added_rows_count: self.added_rows,
            existing_rows_count: self.existing_rows,
            deleted_rows_count: self.deleted_rows,
            partitions: if summaries.is_empty() {
                None
            } else {
                Some(summaries)
            },
            first_row_id: None,
        };
        Ok((bytes, entry))
    }
}

/// Reads a manifest file using the schema and spec stored in its header.
pub struct ManifestReader {
    schema: Schema,
    partition_fields: Vec<PartitionField>,
    entries: Vec<ManifestEntry>,
    content: ManifestContent,
}

impl ManifestReader {
    /// Parse a manifest file.
    pub fn new(bytes: &[u8]) -> Result<Self> {
        // The table schema and partition spec needed to decode entries are
        // stored as user metadata, so read the header on its own first.
        let header = OcfReader::read_header(bytes)?;
        let (schema, partition_fields, format_version, content) = Self::header(&header)?;

        let spec = PartitionSpec {
            spec_id: 0,
            fields: partition_fields.clone(),
        };
        let partition_types = partition_field_types(&spec, &schema)?;
        let entry_schema =
            manifest_entry_schema(partition_avro_schema(&spec, &schema)?, format_version);
        let reader = OcfReader::new(bytes, &entry_schema)?;
        let entries = reader
            .values()
            .iter()
            .map(|value| ManifestEntry::from_avro(value, &partition_types))
            .collect::<Result<Vec<_>>>()?;
        Ok(ManifestReader {
            schema,
            partition_fields,
            entries,
            content,
        })
    }

    fn header(
        header: &StdByteMap,
    ) -> Result<(Schema, Vec<PartitionField>, FormatVersion, ManifestContent)> {
        let metadata_str = |key: &str| -> Result<Option<String>> {
            header
                .get(key)
                .map(|value| String::from_utf8(value.clone()).map_err(Error::from))
                .transpose()
        };
        let schema_json = metadata_str("schema")?
            .ok_or_else(|| Error::Avro("manifest is missing schema metadata".to_string()))?;
        let schema: Schema = serde_json::from_str(&schema_json)
            .map_err(|err| Error::MetadataParse(err.to_string()))?;
        let spec_json = metadata_str("partition-spec")?
            .ok_or_else(|| Error::Avro("manifest is missing partition-spec metadata".to_string()))?;
        let partition_fields: Vec<PartitionField> = serde_json::from_str(&spec_json)
            .map_err(|err| Error::MetadataParse(err.to_string()))?;
        let format_version = match metadata_str("format-version")?.as_deref() {
            Some("3") => FormatVersion::V3,
            Some("2") | None => FormatVersion::V2,
            Some(other) => {
                return Err(Error::MetadataParse(format!(
                    "unsupported manifest format-version {other}"
                )))
            }
        };
        let content = match metadata_str("content")?.as_deref() {
            Some("deletes") => ManifestContent::Deletes,
            _ => ManifestContent::Data,
        };
        Ok((schema, partition_fields, format_version, content))
    }

    /// The table schema the manifest was written with.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The partition fields the manifest was written with.
    pub fn partition_fields(&self) -> &[PartitionField] {
        &self.partition_fields
    }

    /// The type of files tracked by this manifest.
    pub fn content(&self) -> ManifestContent {
        self.content
    }

    /// The decoded entries.
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Consume the reader, returning the entries.
    pub fn into_entries(self) -> Vec<ManifestEntry> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::metadata::TableMetadataBuilder;
    use crate::model::partition::{PartitionField, Transform};
    use crate::model::schema::{FieldType, StructField, StructType};
    use crate::model::sort::SortOrder;
    use std::collections::HashMap as StdHashMap;

    fn table_metadata() -> TableMetadata {
        let schema = Schema {
            schema_id: 0,
            identifier_field_ids: None,
            struct_fields: StructType {
                fields: vec![
                    StructField {
                        id: 1,
                        name: "id".to_string(),
                        required: true,
                        field_type: FieldType::Primitive(PrimitiveType::Long),
                        doc: None,
                        initial_default: None,
                        write_default: None,
                    },
                    StructField {
                        id: 2,
                        name: "ts".to_string(),
                        required: false,
                        field_type: FieldType::Primitive(PrimitiveType::Timestamptz),
                        doc: None,
                        initial_default: None,
                        write_default: None,
                    },
                ],
            },
        };
        let spec = PartitionSpec {
            spec_id: 0,
            fields: vec![PartitionField {
                source_id: 2,
                field_id: 1000,
                name: "ts_day".to_string(),
                transform: Transform::Day,
            }],
        };
        TableMetadataBuilder::new(
            "s3://bucket/wh/t",
            schema,
            spec,
            SortOrder::unsorted(),
            FormatVersion::V2,
            StdHashMap::new(),
        )
        .unwrap()
        .build()
        .unwrap()
    }

    fn entry(path: &str, status: Status, day: i32, rows: i64) -> ManifestEntry {
        let mut file = DataFile::new(path, FileFormat::Parquet, rows, 4096);
        file.partition = StructValue {
            fields: vec![("ts_day".to_string(), Some(Value::Date(day)))],
        };
        file.value_counts = Some(StdHashMap::from([(1, rows), (2, rows)]));
        file.null_value_counts = Some(StdHashMap::from([(1, 0i64), (2, 3)]));
        file.lower_bounds = Some(StdHashMap::from([(1, 1i64.to_le_bytes().to_vec())]));
        file.upper_bounds = Some(StdHashMap::from([(1, rows.to_le_bytes().to_vec())]));
        ManifestEntry {
            status,
            snapshot_id: None,
            sequence_number: None,
            file_sequence_number: None,
            data_file: file,
        }
    }

    #[test]
    fn test_manifest_roundtrip() {
        let metadata = table_metadata();
        let mut writer = ManifestWriter::new(
            "s3://bucket/wh/t/metadata/x-m0.avro",
            77,
            1,
            &metadata,
            ManifestContent::Data,
        )
        .unwrap();
        let first = entry("s3://bucket/wh/t/data/f1.parquet", Status::Added, 19000, 100);
        let second = entry("s3://bucket/wh/t/data/f2.parquet", Status::Added, 19003, 50);
        writer.append(first.clone()).unwrap();
        writer.append(second.clone()).unwrap();
        let (bytes, list_entry) = writer.finish().unwrap();

        let reader = ManifestReader::new(&bytes).unwrap();
        assert_eq!(reader.entries(), &[first, second]);
        assert_eq!(reader.schema().schema_id, 0);
        assert_eq!(reader.partition_fields()[0].name, "ts_day");
        assert_eq!(list_entry.added_files_count, 2);
        assert_eq!(list_entry.added_rows_count, 150);
        assert_eq!(list_entry.manifest_length, bytes.len() as i64);
    }

    #[test]
    fn test_summary_counts_by_status() {
        let metadata = table_metadata();
        let mut writer = ManifestWriter::new(
            "s3://bucket/wh/t/metadata/x-m0.avro",
            77,
            5,
            &metadata,
            ManifestContent::Data,
        )
        .unwrap();
        let mut existing = entry("s3://b/t/data/old.parquet", Status::Existing, 18990, 10);
        existing.sequence_number = Some(2);
        writer.append(existing).unwrap();
        writer
            .append(entry("s3://b/t/data/new.parquet", Status::Added, 19000, 20))
            .unwrap();
        writer
            .append(entry("s3://b/t/data/gone.parquet", Status::Deleted, 18980, 5))
            .unwrap();
        let (_, list_entry) = writer.finish().unwrap();
        assert_eq!(list_entry.added_files_count, 1);
        assert_eq!(list_entry.existing_files_count, 1);
        assert_eq!(list_entry.deleted_files_count, 1);
        assert_eq!(list_entry.added_rows_count, 20);
        assert_eq!(list_entry.existing_rows_count, 10);
        assert_eq!(list_entry.deleted_rows_count, 5);
        // min over the existing entry's own sequence and the inherited ones
        assert_eq!(list_entry.min_sequence_number, 2);
        assert_eq!(list_entry.sequence_number, 5);
    }

    #[test]
    fn test_partition_summary_bounds() {
        let metadata = table_metadata();
        let mut writer = ManifestWriter::new(
            "s3://bucket/wh/t/metadata/x-m0.avro",
            77,
            1,
            &metadata,
            ManifestContent::Data,
        )
        .unwrap();
        writer
            .append(entry("s3://b/t/data/a.parquet", Status::Added, 19005, 1))
            .unwrap();
        writer
            .append(entry("s3://b/t/data/b.parquet", Status::Added, 18995, 1))
            .unwrap();
        let (_, list_entry) = writer.finish().unwrap();
        let summary = &list_entry.partitions.unwrap()[0];
        assert!(!summary.contains_null);
        assert_eq!(
            summary.lower_bound,
            Some(18995i32.to_le_bytes().to_vec())
        );
        assert_eq!(
            summary.upper_bound,
            Some(19005i32.to_le_bytes().to_vec())
        );
    }

    #[test]
    fn test_merge_collected_stats_keeps_existing() {
        let mut file = DataFile::new("s3://b/t/data/a.parquet", FileFormat::Parquet, 10, 1);
        file.value_counts = Some(StdHashMap::from([(1, 10i64)]));
        let shredded_values = StdHashMap::from([(101, 10i64)]);
        let shredded_nulls = StdHashMap::from([(101, 2i64)]);
        let shredded_lower = StdHashMap::from([(101, 5i32.to_le_bytes().to_vec())]);
        let shredded_upper = StdHashMap::from([(101, 9i32.to_le_bytes().to_vec())]);
        file.merge_collected_stats(
            &shredded_values,
            &shredded_nulls,
            &shredded_lower,
            &shredded_upper,
        );
        let counts = file.value_counts.as_ref().unwrap();
        assert_eq!(counts.get(&1), Some(&10));
        assert_eq!(counts.get(&101), Some(&10));
        assert_eq!(file.null_value_counts.unwrap().get(&101), Some(&2));
        assert_eq!(
            file.lower_bounds.unwrap().get(&101),
            Some(&5i32.to_le_bytes().to_vec())
        );
    }

    #[test]
    fn test_reference_avro_reads_manifest() {
        let metadata = table_metadata();
        let mut writer = ManifestWriter::new(
            "s3://bucket/wh/t/metadata/x-m0.avro",
            77,
            1,
            &metadata,
            ManifestContent::Data,
        )
        .unwrap();
        writer
            .append(entry("s3://b/t/data/a.parquet", Status::Added, 19005, 4))
            .unwrap();
        let (bytes, _) = writer.finish().unwrap();

        let reader = apache_avro::Reader::new(&bytes[..]).unwrap();
        assert_eq!(
            reader.user_metadata().get("content"),
            Some(&b"data".to_vec())
        );
        let values: Vec<_> = reader.collect::<std::result::Result<_, _>>().unwrap();
        assert_eq!(values.len(), 1);
    }
}
