/*!
Table schemas: named, typed columns with table-wide unique field ids.

A [Schema] is a struct of [StructField]s. Each field carries an id, a name,
a required flag and a [FieldType], where types are either [primitives](PrimitiveType)
or the nested [StructType], [List] and [Map] shapes. Field ids identify
columns everywhere else in the format (manifest statistics, partition
sources, sort keys), so an id is never reused once assigned; schema
evolution appends a whole new schema rather than editing one in place.
*/

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Primitive column types, including the format v3 additions.
///
/// On the wire a primitive is a lowercase tag; `decimal` and `fixed` carry
/// their parameters inside the tag (`decimal(9,2)`, `fixed[16]`).
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum PrimitiveType {
    /// true/false
    Boolean,
    /// 32-bit signed integers
    Int,
    /// 64-bit signed integers
    Long,
    /// Single-precision IEEE 754 floats
    Float,
    /// Double-precision IEEE 754 floats
    Double,
    /// Exact numerics with a fixed precision and scale
    Decimal {
        /// Total number of digits the type can hold.
        precision: i32,
        /// Digits to the right of the decimal point.
        scale: u8,
    },
    /// Days since 1970-01-01, no time or zone
    Date,
    /// Microseconds since midnight
    Time,
    /// Microsecond timestamps without a zone
    Timestamp,
    /// Microsecond timestamps in UTC
    Timestamptz,
    /// Nanosecond timestamps without a zone. Format v3.
    TimestampNs,
    /// Nanosecond timestamps in UTC. Format v3.
    TimestamptzNs,
    /// UTF-8 text of any length
    String,
    /// 128-bit universally unique identifiers
    Uuid,
    /// Byte arrays of a declared length
    Fixed(u64),
    /// Byte arrays of any length
    Binary,
    /// Self-describing semi-structured values. Format v3.
    Variant,
    /// The type of a column whose values are all null. Format v3.
    Unknown,
    /// Geospatial geometries. Format v3.
    Geometry,
    /// Geospatial geographies. Format v3.
    Geography,
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PrimitiveType::Boolean => write!(f, "boolean"),
            PrimitiveType::Int => write!(f, "int"),
            PrimitiveType::Long => write!(f, "long"),
            PrimitiveType::Float => write!(f, "float"),
            PrimitiveType::Double => write!(f, "double"),
            PrimitiveType::Decimal { precision, scale } => {
                write!(f, "decimal({precision},{scale})")
            }
            PrimitiveType::Date => write!(f, "date"),
            PrimitiveType::Time => write!(f, "time"),
            PrimitiveType::Timestamp => write!(f, "timestamp"),
            PrimitiveType::Timestamptz => write!(f, "timestamptz"),
            PrimitiveType::TimestampNs => write!(f, "timestamp_ns"),
            PrimitiveType::TimestamptzNs => write!(f, "timestamptz_ns"),
            PrimitiveType::String => write!(f, "string"),
            PrimitiveType::Uuid => write!(f, "uuid"),
            PrimitiveType::Fixed(len) => write!(f, "fixed[{len}]"),
            PrimitiveType::Binary => write!(f, "binary"),
            PrimitiveType::Variant => write!(f, "variant"),
            PrimitiveType::Unknown => write!(f, "unknown"),
            PrimitiveType::Geometry => write!(f, "geometry"),
            PrimitiveType::Geography => write!(f, "geography"),
        }
    }
}

impl FromStr for PrimitiveType {
    type Err = Error;

    fn from_str(tag: &str) -> Result<Self> {
        // the two parameterised forms first, then the bare tags
        if let Some(args) = tag
            .strip_prefix("decimal(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let (precision, scale) = args.split_once(',').ok_or_else(|| {
                Error::MetadataParse(format!(
                    "decimal type {tag:?} needs a precision and a scale"
                ))
            })?;
            let precision = precision.trim().parse().map_err(|_| {
                Error::MetadataParse(format!("decimal precision in {tag:?} is not an integer"))
            })?;
            let scale = scale.trim().parse().map_err(|_| {
                Error::MetadataParse(format!("decimal scale in {tag:?} is out of range"))
            })?;
            return Ok(PrimitiveType::Decimal { precision, scale });
        }
        if let Some(len) = tag
            .strip_prefix("fixed[")
            .and_then(|rest| rest.strip_suffix(']'))
        {
            let len = len.trim().parse().map_err(|_| {
                Error::MetadataParse(format!("fixed length in {tag:?} is not an integer"))
            })?;
            return Ok(PrimitiveType::Fixed(len));
        }
        match tag {
            "boolean" => Ok(PrimitiveType::Boolean),
            "int" => Ok(PrimitiveType::Int),
            "long" => Ok(PrimitiveType::Long),
            "float" => Ok(PrimitiveType::Float),
            "double" => Ok(PrimitiveType::Double),
            "date" => Ok(PrimitiveType::Date),
            "time" => Ok(PrimitiveType::Time),
            "timestamp" => Ok(PrimitiveType::Timestamp),
            "timestamptz" => Ok(PrimitiveType::Timestamptz),
            "timestamp_ns" => Ok(PrimitiveType::TimestampNs),
            "timestamptz_ns" => Ok(PrimitiveType::TimestamptzNs),
            "string" => Ok(PrimitiveType::String),
            "uuid" => Ok(PrimitiveType::Uuid),
            "binary" => Ok(PrimitiveType::Binary),
            "variant" => Ok(PrimitiveType::Variant),
            "unknown" => Ok(PrimitiveType::Unknown),
            "geometry" => Ok(PrimitiveType::Geometry),
            "geography" => Ok(PrimitiveType::Geography),
            other => Err(Error::MetadataParse(format!(
                "unknown primitive type {other:?}"
            ))),
        }
    }
}

// The wire form is the display form, so serde rides on Display/FromStr.
impl Serialize for PrimitiveType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PrimitiveType {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let tag = std::string::String::deserialize(deserializer)?;
        tag.parse().map_err(de::Error::custom)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(untagged)]
/// Any type a field can have: a primitive or one of the nested shapes.
pub enum FieldType {
    /// A primitive type, encoded as its tag string.
    Primitive(PrimitiveType),
    /// A nested struct.
    Struct(StructType),
    /// A list of elements.
    List(List),
    /// A map of keys to values.
    Map(Map),
}

impl FieldType {
    /// The primitive type, if this is a primitive field.
    pub fn as_primitive(&self) -> Option<&PrimitiveType> {
        match self {
            FieldType::Primitive(primitive) => Some(primitive),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldType::Primitive(primitive) => write!(f, "{}", primitive),
            FieldType::Struct(_) => write!(f, "struct"),
            FieldType::List(_) => write!(f, "list"),
            FieldType::Map(_) => write!(f, "map"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(tag = "type", rename = "struct")]
/// An ordered tuple of named, typed fields. The table schema itself is a
/// struct type, and structs can nest to any depth.
pub struct StructType {
    /// The fields of the struct, in schema order.
    pub fields: Vec<StructField>,
}

impl StructType {
    /// Get the field with the given id.
    pub fn field_by_id(&self, id: i32) -> Option<&StructField> {
        self.fields.iter().find(|field| field.id == id)
    }

    /// Get the field with the given name.
    pub fn field_by_name(&self, name: &str) -> Option<&StructField> {
        self.fields.iter().find(|field| field.name == name)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
/// One column of a struct.
pub struct StructField {
    /// Field id, at least 1 and unique across the whole schema.
    pub id: i32,
    /// Column name, unique among its siblings.
    pub name: String,
    /// Whether every row must carry a non-null value.
    pub required: bool,
    /// The field's type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Free-form column documentation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    /// Default applied to rows written before the field existed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_default: Option<serde_json::Value>,
    /// Default applied when a writer omits the field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_default: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
/// A table schema: a struct type with an id and optional row-identity
/// columns.
pub struct Schema {
    /// Identifier of the schema, unique within the table.
    pub schema_id: i32,
    /// Ids of the primitive fields that identify a row.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier_field_ids: Option<Vec<i32>>,
    #[serde(flatten)]
    /// The columns.
    pub struct_fields: StructType,
}

impl Schema {
    /// The highest field id assigned anywhere in this schema, including
    /// nested fields.
    pub fn highest_field_id(&self) -> i32 {
        fn walk(field_type: &FieldType, mut max: i32) -> i32 {
            match field_type {
                FieldType::Primitive(_) => max,
                FieldType::Struct(fields) => {
                    for field in &fields.fields {
                        max = max.max(field.id);
                        max = walk(&field.field_type, max);
                    }
                    max
                }
                FieldType::List(list) => {
                    max = max.max(list.element_id);
                    walk(&list.element, max)
                }
                FieldType::Map(map) => {
                    max = max.max(map.key_id).max(map.value_id);
                    max = walk(&map.key, max);
                    walk(&map.value, max)
                }
            }
        }
        let mut max = 0;
        for field in &self.struct_fields.fields {
            max = max.max(field.id);
            max = walk(&field.field_type, max);
        }
        max
    }

    /// All field ids assigned in this schema mapped to their names.
    pub fn field_ids(&self) -> HashMap<i32, String> {
        fn walk(field_type: &FieldType, out: &mut HashMap<i32, String>) {
            match field_type {
                FieldType::Primitive(_) => {}
                FieldType::Struct(fields) => {
                    for field in &fields.fields {
                        out.insert(field.id, field.name.clone());
                        walk(&field.field_type, out);
                    }
                }
                FieldType::List(list) => {
                    out.insert(list.element_id, "element".to_string());
                    walk(&list.element, out);
                }
                FieldType::Map(map) => {
                    out.insert(map.key_id, "key".to_string());
                    out.insert(map.value_id, "value".to_string());
                    walk(&map.key, out);
                    walk(&map.value, out);
                }
            }
        }
        let mut out = HashMap::new();
        for field in &self.struct_fields.fields {
            out.insert(field.id, field.name.clone());
            walk(&field.field_type, &mut out);
        }
        out
    }

    /// Check structural invariants: field ids unique across the schema,
    /// names unique at each struct level.
    pub fn validate(&self) -> Result<()> {
        fn check_struct(fields: &[StructField], seen: &mut HashMap<i32, String>) -> Result<()> {
            let mut names = Vec::new();
            for field in fields {
                if names.contains(&&field.name) {
                    return Err(Error::Validation(format!(
                        "duplicate field name {}",
                        field.name
                    )));
                }
                names.push(&field.name);
                check_id(field.id, &field.name, seen)?;
                check_type(&field.field_type, seen)?;
            }
            Ok(())
        }
        fn check_id(id: i32, name: &str, seen: &mut HashMap<i32, String>) -> Result<()> {
            if id < 1 {
                return Err(Error::Validation(format!(
                    "field id {id} for {name} must be positive"
                )));
            }
            if seen.insert(id, name.to_string()).is_some() {
                return Err(Error::Validation(format!("duplicate field id {id}")));
            }
            Ok(())
        }
        fn check_type(field_type: &FieldType, seen: &mut HashMap<i32, String>) -> Result<()> {
            match field_type {
                FieldType::Primitive(_) => Ok(()),
                FieldType::Struct(fields) => check_struct(&fields.fields, seen),
                FieldType::List(list) => {
                    check_id(list.element_id, "element", seen)?;
                    check_type(&list.element, seen)
                }
                FieldType::Map(map) => {
                    check_id(map.key_id, "key", seen)?;
                    check_id(map.value_id, "value", seen)?;
                    check_type(&map.key, seen)?;
                    check_type(&map.value, seen)
                }
            }
        }
        let mut seen = HashMap::new();
        check_struct(&self.struct_fields.fields, &mut seen)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case", tag = "type", rename = "list")]
/// A sequence of elements of one type. The element has its own field id
/// and may itself be nested.
pub struct List {
    /// Field id of the element.
    pub element_id: i32,
    /// Whether elements may be null.
    pub element_required: bool,
    /// Type of the elements.
    pub element: Box<FieldType>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case", tag = "type", rename = "map")]
/// Key/value pairs. Keys are always required; values may be optional.
/// Keys and values each carry their own field id and may be nested.
pub struct Map {
    /// Field id of the keys.
    pub key_id: i32,
    /// Type of the keys.
    pub key: Box<FieldType>,
    /// Field id of the values.
    pub value_id: i32,
    /// Whether values must be non-null.
    pub value_required: bool,
    /// Type of the values.
    pub value: Box<FieldType>,
}
