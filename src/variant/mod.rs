/*!
Variant shredding: configuration, predicate rewriting, statistics
collection and scan-time file pruning.

A variant column stores self-describing semi-structured values. Shredding
extracts configured fields into typed sub-columns whose statistics live at
the path `{column}.typed_value.{field}.typed_value`. Writers collect per
file bounds for those paths ([stats]), scan planning rewrites user
predicates onto them ([filter]) and prunes files whose bounds cannot match
([prune]).
*/

pub mod filter;
pub mod prune;
pub mod stats;

use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::model::schema::PrimitiveType;
use crate::model::values::Value;

/// Table property listing the shredded variant columns.
pub const SHRED_COLUMNS_PROPERTY: &str = "write.variant.shred-columns";

/// Table property naming the shredded fields of one column.
pub fn shred_fields_property(column: &str) -> String {
    format!("write.variant.{column}.shred-fields")
}

/// Table property carrying the field type map of one column.
pub fn field_types_property(column: &str) -> String {
    format!("write.variant.{column}.field-types")
}

/// The statistics path of a shredded field.
pub fn stats_path(column: &str, field: &str) -> String {
    format!("{column}.typed_value.{field}.typed_value")
}

/// Split a statistics path back into `(column, field)`.
pub fn split_stats_path(path: &str) -> Option<(&str, &str)> {
    let rest = path.strip_suffix(".typed_value")?;
    let (column, field) = rest.split_once(".typed_value.")?;
    if column.is_empty() || field.is_empty() {
        None
    } else {
        Some((column, field))
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Shredding configuration for one variant column.
pub struct ShredConfig {
    /// The variant column name.
    pub column_name: String,
    /// The shredded fields, in configured order.
    pub fields: Vec<String>,
    /// The value type of each shredded field.
    pub field_types: HashMap<String, PrimitiveType>,
}

impl ShredConfig {
    /// The configured type of a shredded field.
    pub fn field_type(&self, field: &str) -> Option<&PrimitiveType> {
        self.field_types.get(field)
    }
}

/// Extract the shred configs from table properties.
///
/// `write.variant.shred-columns` holds a comma-separated column list; per
/// column, `write.variant.<col>.shred-fields` holds a comma-separated field
/// list and `write.variant.<col>.field-types` a JSON object mapping each
/// field to a primitive type name.
pub fn parse_shred_configs(properties: &HashMap<String, String>) -> Result<Vec<ShredConfig>> {
    let Some(columns) = properties.get(SHRED_COLUMNS_PROPERTY) else {
        return Ok(vec![]);
    };
    let mut configs = Vec::new();
    for column in columns.split(',') {
        let column = column.trim();
        if column.is_empty() {
            continue;
        }
        let Some(fields_value) = properties.get(&shred_fields_property(column)) else {
            tracing::warn!(column, "shredded column has no shred-fields property, skipping");
            continue;
        };
        let fields: Vec<String> = fields_value
            .split(',')
            .map(str::trim)
            .filter(|field| !field.is_empty())
            .map(str::to_string)
            .collect();
        let types_value = properties.get(&field_types_property(column)).ok_or_else(|| {
            Error::Validation(format!("shredded column {column} has no field-types property"))
        })?;
        let field_types: HashMap<String, PrimitiveType> = serde_json::from_str(types_value)
            .map_err(|err| {
                Error::Validation(format!("invalid field-types for column {column}: {err}"))
            })?;
        for field in &fields {
            if !field_types.contains_key(field) {
                return Err(Error::Validation(format!(
                    "shredded field {column}.{field} has no configured type"
                )));
            }
        }
        configs.push(ShredConfig {
            column_name: column.to_string(),
            fields,
            field_types,
        });
    }
    Ok(configs)
}

/// Assign a dense block of field ids to every shredded field, starting at
/// `start`, which the caller chooses strictly above the table's
/// `last-column-id` so shredded statistics never collide with schema
/// columns. Assignment order is the configured column and field order, so
/// readers and writers agree.
pub fn assign_shredded_field_ids(
    configs: &[ShredConfig],
    start: i32,
) -> BTreeMap<String, i32> {
    let mut ids = BTreeMap::new();
    let mut next = start;
    for config in configs {
        for field in &config.fields {
            ids.insert(stats_path(&config.column_name, field), next);
            next += 1;
        }
    }
    ids
}

/// The value types of every statistics path.
pub fn shredded_path_types(configs: &[ShredConfig]) -> HashMap<String, PrimitiveType> {
    let mut types = HashMap::new();
    for config in configs {
        for field in &config.fields {
            if let Some(field_type) = config.field_type(field) {
                types.insert(
                    stats_path(&config.column_name, field),
                    field_type.clone(),
                );
            }
        }
    }
    types
}

/// Convert a JSON literal into a typed [Value].
///
/// Timestamps accept integer microseconds or RFC 3339 strings and are
/// normalised to microseconds; dates accept integer epoch days or
/// `YYYY-MM-DD`. Returns `None` when the literal does not fit the type
/// (including NaN, which is excluded from bounds and comparisons).
pub fn json_to_value(json: &serde_json::Value, field_type: &PrimitiveType) -> Option<Value> {
    use serde_json::Value as Json;
    match (field_type, json) {
        (PrimitiveType::Boolean, Json::Bool(b)) => Some(Value::Boolean(*b)),
        (PrimitiveType::Int, Json::Number(n)) => {
            n.as_i64().and_then(|i| i32::try_from(i).ok()).map(Value::Int)
        }
        (PrimitiveType::Long, Json::Number(n)) => n.as_i64().map(Value::Long),
        (PrimitiveType::Float, Json::Number(n)) => n
            .as_f64()
            .filter(|f| !f.is_nan())
            .map(|f| Value::Float(f as f32)),
        (PrimitiveType::Double, Json::Number(n)) => {
            n.as_f64().filter(|f| !f.is_nan()).map(Value::Double)
        }
        (PrimitiveType::String, Json::String(s)) => Some(Value::String(s.clone())),
        (PrimitiveType::Date, Json::Number(n)) => {
            n.as_i64().and_then(|i| i32::try_from(i).ok()).map(Value::Date)
        }
        (PrimitiveType::Date, Json::String(s)) => {
            let date = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
            let epoch = chrono::NaiveDate::from_ymd_opt(1970, 1, 1)?;
            Some(Value::Date((date - epoch).num_days() as i32))
        }
        (PrimitiveType::Timestamp | PrimitiveType::Timestamptz, Json::Number(n)) => {
            n.as_i64().map(|micros| match field_type {
                PrimitiveType::Timestamptz => Value::Timestamptz(micros),
                _ => Value::Timestamp(micros),
            })
        }
        (PrimitiveType::Timestamp | PrimitiveType::Timestamptz, Json::String(s)) => {
            let parsed = chrono::DateTime::parse_from_rfc3339(s).ok()?;
            let micros = parsed.timestamp_micros();
            Some(match field_type {
                PrimitiveType::Timestamptz => Value::Timestamptz(micros),
                _ => Value::Timestamp(micros),
            })
        }
        (PrimitiveType::Decimal { .. }, Json::Number(n)) => n
            .as_i64()
            .map(|i| Value::Decimal(num_bigint::BigInt::from(i))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties() -> HashMap<String, String> {
        HashMap::from([
            (
                SHRED_COLUMNS_PROPERTY.to_string(),
                "data, attrs".to_string(),
            ),
            (
                shred_fields_property("data"),
                "year,name".to_string(),
            ),
            (
                field_types_property("data"),
                r#"{"year": "int", "name": "string"}"#.to_string(),
            ),
            (shred_fields_property("attrs"), "size".to_string()),
            (
                field_types_property("attrs"),
                r#"{"size": "long"}"#.to_string(),
            ),
        ])
    }

    #[test]
    fn test_parse_configs() {
        let configs = parse_shred_configs(&properties()).unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].column_name, "data");
        assert_eq!(configs[0].fields, vec!["year", "name"]);
        assert_eq!(
            configs[0].field_type("year"),
            Some(&PrimitiveType::Int)
        );
        assert_eq!(configs[1].column_name, "attrs");
    }

    #[test]
    fn test_no_properties_no_configs() {
        assert!(parse_shred_configs(&HashMap::new()).unwrap().is_empty());
    }

    #[test]
    fn test_field_without_type_rejected() {
        let mut props = properties();
        props.insert(
            field_types_property("data"),
            r#"{"year": "int"}"#.to_string(),
        );
        assert!(parse_shred_configs(&props).is_err());
    }

    #[test]
    fn test_stats_path_roundtrip() {
        let path = stats_path("data", "year");
        assert_eq!(path, "data.typed_value.year.typed_value");
        assert_eq!(split_stats_path(&path), Some(("data", "year")));
        assert_eq!(split_stats_path("data.year"), None);
    }

    #[test]
    fn test_id_assignment_is_dense_and_deterministic() {
        let configs = parse_shred_configs(&properties()).unwrap();
        let ids = assign_shredded_field_ids(&configs, 100);
        assert_eq!(ids.get("data.typed_value.year.typed_value"), Some(&100));
        assert_eq!(ids.get("data.typed_value.name.typed_value"), Some(&101));
        assert_eq!(ids.get("attrs.typed_value.size.typed_value"), Some(&102));
        // same input, same assignment
        assert_eq!(ids, assign_shredded_field_ids(&configs, 100));
    }

    #[test]
    fn test_json_to_value_timestamps_normalised() {
        let from_string = json_to_value(
            &serde_json::json!("2021-01-01T00:00:00Z"),
            &PrimitiveType::Timestamptz,
        )
        .unwrap();
        let from_micros =
            json_to_value(&serde_json::json!(1609459200000000i64), &PrimitiveType::Timestamptz)
                .unwrap();
        assert_eq!(from_string, from_micros);
    }

    #[test]
    fn test_json_to_value_nan_excluded() {
        // JSON numbers cannot be NaN, but a float-typed field fed a
        // non-number is still rejected
        assert_eq!(
            json_to_value(&serde_json::json!("oops"), &PrimitiveType::Double),
            None
        );
    }

    #[test]
    fn test_json_to_value_date_forms() {
        assert_eq!(
            json_to_value(&serde_json::json!("2000-01-01"), &PrimitiveType::Date),
            Some(Value::Date(10957))
        );
        assert_eq!(
            json_to_value(&serde_json::json!(10957), &PrimitiveType::Date),
            Some(Value::Date(10957))
        );
    }
}
