/*!
Avro writer schemas as a closed sum type.

[AvroType] models exactly the schema shapes Iceberg writes into its
manifests. [AvroType::to_json] renders the schema JSON stored in an Object
Container File header, including the Iceberg `field-id` / `element-id`
attributes that engines use to map columns.
*/

use serde_json::{json, Value as JsonValue};

/// An Avro schema node.
#[derive(Debug, Clone, PartialEq)]
pub enum AvroType {
    /// Encoded as zero bytes.
    Null,
    /// Single byte, 0 or 1.
    Boolean,
    /// Zig-zag varint, at most 5 bytes.
    Int,
    /// Zig-zag varint, at most 10 bytes.
    Long,
    /// IEEE-754, 4 bytes little-endian.
    Float,
    /// IEEE-754, 8 bytes little-endian.
    Double,
    /// Length-prefixed raw bytes.
    Bytes,
    /// Length-prefixed UTF-8.
    String,
    /// Raw bytes of a declared size.
    Fixed {
        /// Schema name of the fixed type.
        name: String,
        /// Number of bytes every value must have.
        size: usize,
    },
    /// Int ordinal into the symbol list.
    Enum {
        /// Schema name of the enum type.
        name: String,
        /// Ordered symbols.
        symbols: Vec<String>,
    },
    /// Block-framed sequence of elements.
    Array {
        /// Element schema.
        element: Box<AvroType>,
        /// Iceberg element id emitted into the schema JSON.
        element_id: Option<i32>,
    },
    /// Block-framed sequence of string keys and values.
    Map {
        /// Value schema; keys are always strings.
        values: Box<AvroType>,
    },
    /// Long branch index followed by the branch value.
    Union(Vec<AvroType>),
    /// Named record with ordered fields.
    Record(RecordSchema),
}

/// A named record schema.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSchema {
    /// Record name, e.g. `manifest_entry` or `r102`.
    pub name: String,
    /// Ordered fields.
    pub fields: Vec<RecordField>,
}

/// A single record field.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordField {
    /// Field name.
    pub name: String,
    /// Field schema.
    pub field_type: AvroType,
    /// Iceberg field id emitted into the schema JSON.
    pub field_id: Option<i32>,
}

impl AvroType {
    /// The uniform encoding of a nullable value: union `[null, T]` with
    /// branch 0 meaning absent.
    pub fn optional(inner: AvroType) -> AvroType {
        AvroType::Union(vec![AvroType::Null, inner])
    }

    /// Whether this schema is a `[null, T]` union.
    pub fn is_optional(&self) -> bool {
        matches!(self, AvroType::Union(branches)
            if branches.len() == 2 && branches[0] == AvroType::Null)
    }

    /// Render the schema JSON for an Object Container File header.
    pub fn to_json(&self) -> JsonValue {
        match self {
            AvroType::Null => json!("null"),
            AvroType::Boolean => json!("boolean"),
            AvroType::Int => json!("int"),
            AvroType::Long => json!("long"),
            AvroType::Float => json!("float"),
            AvroType::Double => json!("double"),
            AvroType::Bytes => json!("bytes"),
            AvroType::String => json!("string"),
            AvroType::Fixed { name, size } => {
                json!({"type": "fixed", "name": name, "size": size})
            }
            AvroType::Enum { name, symbols } => {
                json!({"type": "enum", "name": name, "symbols": symbols})
            }
            AvroType::Array {
                element,
                element_id,
            } => match element_id {
                Some(id) => json!({
                    "type": "array",
                    "items": element.to_json(),
                    "element-id": id
                }),
                None => json!({"type": "array", "items": element.to_json()}),
            },
            AvroType::Map { values } => {
                json!({"type": "map", "values": values.to_json()})
            }
            AvroType::Union(branches) => {
                JsonValue::Array(branches.iter().map(AvroType::to_json).collect())
            }
            AvroType::Record(record) => {
                let fields: Vec<JsonValue> = record
                    .fields
                    .iter()
                    .map(|field| {
                        let mut json = serde_json::Map::new();
                        json.insert("name".to_string(), json!(field.name));
                        json.insert("type".to_string(), field.field_type.to_json());
                        if let Some(id) = field.field_id {
                            json.insert("field-id".to_string(), json!(id));
                        }
                        if field.field_type.is_optional() {
                            json.insert("default".to_string(), JsonValue::Null);
                        }
                        JsonValue::Object(json)
                    })
                    .collect();
                json!({"type": "record", "name": record.name, "fields": fields})
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_shape() {
        let optional = AvroType::optional(AvroType::Long);
        assert!(optional.is_optional());
        assert!(!AvroType::Long.is_optional());
        assert_eq!(optional.to_json(), serde_json::json!(["null", "long"]));
    }

    #[test]
    fn test_record_json_carries_field_ids() {
        let record = AvroType::Record(RecordSchema {
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
            ],
        });
        let json = record.to_json();
        assert_eq!(json["name"], "manifest_entry");
        assert_eq!(json["fields"][0]["field-id"], 0);
        assert_eq!(json["fields"][1]["default"], serde_json::Value::Null);
        assert_eq!(
            json["fields"][1]["type"],
            serde_json::json!(["null", "long"])
        );
    }

    #[test]
    fn test_array_json_carries_element_id() {
        let array = AvroType::Array {
            element: Box::new(AvroType::Long),
            element_id: Some(133),
        };
        assert_eq!(array.to_json()["element-id"], 133);
    }
}
