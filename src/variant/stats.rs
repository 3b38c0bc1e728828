/*!
Writer-side statistics collection for shredded variant fields.

A collector walks the variant column values of one data file, tracking per
configured field the total count, null count and typed min/max. String
bounds are truncated to the configured prefix, NaN never enters numeric
bounds, timestamps are normalised to microseconds. The finished stats fold
into the manifest entry under the assigned shredded field ids.
*/

use std::collections::{BTreeMap, HashMap};

use serde_json::Value as Json;

use crate::model::manifest::DataFile;
use crate::model::values::{truncate_lower, truncate_upper, Value};
use crate::variant::{json_to_value, stats_path, ShredConfig};

/// Default byte length string bounds are truncated to.
pub const DEFAULT_TRUNCATION_LENGTH: usize = 16;

// Running aggregate of one shredded field.
#[derive(Debug, Default, Clone)]
struct FieldAggregate {
    value_count: i64,
    null_count: i64,
    lower: Option<Value>,
    upper: Option<Value>,
}

impl FieldAggregate {
    fn observe(&mut self, value: Option<Value>) {
        self.value_count += 1;
        let Some(value) = value else {
            self.null_count += 1;
            return;
        };
        let is_nan = matches!(&value, Value::Float(f) if f.is_nan())
            || matches!(&value, Value::Double(d) if d.is_nan());
        if is_nan {
            return;
        }
        let lower_stale = match &self.lower {
            Some(lower) => value.compare(lower) == Some(std::cmp::Ordering::Less),
            None => true,
        };
        if lower_stale {
            self.lower = Some(value.clone());
        }
        let upper_stale = match &self.upper {
            Some(upper) => value.compare(upper) == Some(std::cmp::Ordering::Greater),
            None => true,
        };
        if upper_stale {
            self.upper = Some(value);
        }
    }
}

/// Final statistics of one shredded field.
#[derive(Debug, PartialEq, Clone)]
pub struct FieldStats {
    /// Total values observed, including nulls.
    pub value_count: i64,
    /// Null values observed.
    pub null_value_count: i64,
    /// Lower bound, truncated for strings.
    pub lower: Option<Value>,
    /// Upper bound, truncated for strings.
    pub upper: Option<Value>,
}

/// Statistics for every configured field, keyed by statistics path.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct CollectedStats {
    /// Per-path statistics.
    pub by_path: BTreeMap<String, FieldStats>,
}

impl CollectedStats {
    /// Fold into a data file's stats maps under the assigned field ids.
    /// Paths without an assigned id are dropped.
    pub fn apply_to(&self, file: &mut DataFile, field_ids: &BTreeMap<String, i32>) {
        let mut value_counts = HashMap::new();
        let mut null_value_counts = HashMap::new();
        let mut lower_bounds = HashMap::new();
        let mut upper_bounds = HashMap::new();
        for (path, stats) in &self.by_path {
            let Some(id) = field_ids.get(path) else {
                tracing::warn!(path, "collected stats for unassigned shredded path");
                continue;
            };
            value_counts.insert(*id, stats.value_count);
            null_value_counts.insert(*id, stats.null_value_count);
            if let Some(lower) = &stats.lower {
                lower_bounds.insert(*id, lower.to_bytes());
            }
            if let Some(upper) = &stats.upper {
                upper_bounds.insert(*id, upper.to_bytes());
            }
        }
        file.merge_collected_stats(
            &value_counts,
            &null_value_counts,
            &lower_bounds,
            &upper_bounds,
        );
    }
}

/// Collects shredded-field statistics over one data file's variant values.
pub struct VariantStatsCollector {
    config: ShredConfig,
    truncate_len: usize,
    aggregates: Vec<FieldAggregate>,
}

impl VariantStatsCollector {
    /// A collector for one configured variant column.
    pub fn new(config: ShredConfig) -> Self {
        let aggregates = vec![FieldAggregate::default(); config.fields.len()];
        VariantStatsCollector {
            config,
            truncate_len: DEFAULT_TRUNCATION_LENGTH,
            aggregates,
        }
    }

    /// Override the string bound truncation length.
    pub fn with_truncation_length(mut self, truncate_len: usize) -> Self {
        self.truncate_len = truncate_len;
        self
    }

    /// Observe one row's variant column value.
    ///
    /// A missing field, JSON null, or a value that does not fit the
    /// configured type counts as null for that field.
    pub fn observe(&mut self, variant: &Json) {
        for (index, field) in self.config.fields.iter().enumerate() {
            let value = variant
                .get(field)
                .filter(|value| !value.is_null())
                .and_then(|value| {
                    self.config
                        .field_type(field)
                        .and_then(|field_type| json_to_value(value, field_type))
                });
            self.aggregates[index].observe(value);
        }
    }

    /// Finish the file, truncating string bounds.
    pub fn finish(self) -> CollectedStats {
        let mut by_path = BTreeMap::new();
        for (field, aggregate) in self.config.fields.iter().zip(self.aggregates) {
            let lower = aggregate.lower.map(|lower| match lower {
                Value::String(s) => Value::String(truncate_lower(&s, self.truncate_len)),
                other => other,
            });
            let upper = aggregate.upper.and_then(|upper| match upper {
                Value::String(s) => truncate_upper(&s, self.truncate_len).map(Value::String),
                other => Some(other),
            });
            by_path.insert(
                stats_path(&self.config.column_name, field),
                FieldStats {
                    value_count: aggregate.value_count,
                    null_value_count: aggregate.null_count,
                    lower,
                    upper,
                },
            );
        }
        CollectedStats { by_path }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::schema::PrimitiveType;
    use crate::variant::assign_shredded_field_ids;
    use serde_json::json;

    fn config() -> ShredConfig {
        ShredConfig {
            column_name: "data".to_string(),
            fields: vec![
                "year".to_string(),
                "name".to_string(),
                "score".to_string(),
                "at".to_string(),
            ],
            field_types: HashMap::from([
                ("year".to_string(), PrimitiveType::Int),
                ("name".to_string(), PrimitiveType::String),
                ("score".to_string(), PrimitiveType::Double),
                ("at".to_string(), PrimitiveType::Timestamptz),
            ]),
        }
    }

    #[test]
    fn test_counts_and_bounds() {
        let mut collector = VariantStatsCollector::new(config());
        collector.observe(&json!({"year": 2004, "name": "beta", "score": 1.5}));
        collector.observe(&json!({"year": 2001, "name": "alpha"}));
        collector.observe(&json!({"year": null, "name": "gamma", "score": 0.5}));
        let stats = collector.finish();

        let year = &stats.by_path["data.typed_value.year.typed_value"];
        assert_eq!(year.value_count, 3);
        assert_eq!(year.null_value_count, 1);
        assert_eq!(year.lower, Some(Value::Int(2001)));
        assert_eq!(year.upper, Some(Value::Int(2004)));

        let name = &stats.by_path["data.typed_value.name.typed_value"];
        assert_eq!(name.lower, Some(Value::String("alpha".to_string())));
        assert_eq!(name.upper, Some(Value::String("gamma".to_string())));

        let score = &stats.by_path["data.typed_value.score.typed_value"];
        assert_eq!(score.null_value_count, 1);
        assert_eq!(score.lower, Some(Value::Double(0.5)));
    }

    #[test]
    fn test_missing_field_counts_as_null() {
        let mut collector = VariantStatsCollector::new(config());
        collector.observe(&json!({"name": "only"}));
        let stats = collector.finish();
        let year = &stats.by_path["data.typed_value.year.typed_value"];
        assert_eq!(year.value_count, 1);
        assert_eq!(year.null_value_count, 1);
        assert_eq!(year.lower, None);
    }

    #[test]
    fn test_nan_excluded_from_bounds_but_counted() {
        let mut collector = VariantStatsCollector::new(config());
        collector.observe(&json!({"score": 2.0}));
        // a non-numeric value cannot enter bounds either, it counts as null
        collector.observe(&json!({"score": "not-a-number"}));
        let stats = collector.finish();
        let score = &stats.by_path["data.typed_value.score.typed_value"];
        assert_eq!(score.value_count, 2);
        assert_eq!(score.null_value_count, 1);
        assert_eq!(score.lower, Some(Value::Double(2.0)));
        assert_eq!(score.upper, Some(Value::Double(2.0)));
    }

    #[test]
    fn test_string_bounds_truncated() {
        let mut collector = VariantStatsCollector::new(config()).with_truncation_length(4);
        collector.observe(&json!({"name": "aaaaaaaaaa"}));
        collector.observe(&json!({"name": "zzzzzzzzzz"}));
        let stats = collector.finish();
        let name = &stats.by_path["data.typed_value.name.typed_value"];
        assert_eq!(name.lower, Some(Value::String("aaaa".to_string())));
        // upper bound is truncated and incremented to stay an upper bound
        assert_eq!(name.upper, Some(Value::String("zzz{".to_string())));
    }

    #[test]
    fn test_timestamps_normalised_to_micros() {
        let mut collector = VariantStatsCollector::new(config());
        collector.observe(&json!({"at": "2021-01-01T00:00:00Z"}));
        collector.observe(&json!({"at": 1640995200000000i64}));
        let stats = collector.finish();
        let at = &stats.by_path["data.typed_value.at.typed_value"];
        assert_eq!(at.lower, Some(Value::Timestamptz(1609459200000000)));
        assert_eq!(at.upper, Some(Value::Timestamptz(1640995200000000)));
    }

    #[test]
    fn test_apply_to_data_file() {
        use crate::model::manifest::{DataFile, FileFormat};
        let mut collector = VariantStatsCollector::new(config());
        collector.observe(&json!({"year": 2004}));
        collector.observe(&json!({"year": 2001}));
        let stats = collector.finish();

        let ids = assign_shredded_field_ids(&[config()], 100);
        let mut file = DataFile::new("s3://b/t/data/a.parquet", FileFormat::Parquet, 2, 64);
        file.value_counts = Some(HashMap::from([(1, 2i64)]));
        stats.apply_to(&mut file, &ids);

        let year_id = ids["data.typed_value.year.typed_value"];
        assert_eq!(
            file.value_counts.as_ref().unwrap().get(&year_id),
            Some(&2)
        );
        // schema column stats are untouched
        assert_eq!(file.value_counts.as_ref().unwrap().get(&1), Some(&2));
        assert_eq!(
            file.lower_bounds.unwrap().get(&year_id),
            Some(&2001i32.to_le_bytes().to_vec())
        );
    }
}
