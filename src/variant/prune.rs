/*!
Scan-time file pruning against shredded statistics.

The evaluator is sound, not complete: a file is skipped only when its
bounds prove that no row can satisfy the predicate, and kept whenever the
statistics are missing or inconclusive. `$not` and `$nor` skip only when
the inner predicate provably matches every row, a soundness-preserving
approximation under missing stats.
*/

use std::collections::{BTreeMap, HashMap};

use serde_json::Value as Json;

use crate::model::manifest::DataFile;
use crate::model::schema::PrimitiveType;
use crate::model::values::Value;
use crate::variant::{
    assign_shredded_field_ids, json_to_value, shredded_path_types, split_stats_path, ShredConfig,
};

/// The per-file statistics the evaluator consults, keyed by field id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileColumnStats {
    /// Total value counts, including nulls.
    pub value_counts: HashMap<i32, i64>,
    /// Null value counts.
    pub null_value_counts: HashMap<i32, i64>,
    /// Serialized lower bounds.
    pub lower_bounds: HashMap<i32, Vec<u8>>,
    /// Serialized upper bounds.
    pub upper_bounds: HashMap<i32, Vec<u8>>,
}

impl From<&DataFile> for FileColumnStats {
    fn from(file: &DataFile) -> Self {
        FileColumnStats {
            value_counts: file.value_counts.clone().unwrap_or_default(),
            null_value_counts: file.null_value_counts.clone().unwrap_or_default(),
            lower_bounds: file.lower_bounds.clone().unwrap_or_default(),
            upper_bounds: file.upper_bounds.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, PartialEq)]
/// The pruning verdict for one file.
pub struct SkipDecision {
    /// Whether no row of the file can satisfy the predicate.
    pub skip: bool,
    /// For a skipped file, which fields and bounds proved it.
    pub reasons: Vec<String>,
}

impl SkipDecision {
    fn keep() -> Self {
        SkipDecision {
            skip: false,
            reasons: vec![],
        }
    }
}

// Decoded stats of one field.
struct FieldStats {
    name: String,
    lower: Option<Value>,
    upper: Option<Value>,
    value_count: Option<i64>,
    null_count: Option<i64>,
}

/// Evaluates rewritten predicates against per-file bounds.
pub struct FilePruner {
    ids: BTreeMap<String, i32>,
    types: HashMap<String, PrimitiveType>,
}

impl FilePruner {
    /// Build a pruner for the configured shredded columns, assigning field
    /// ids from `start_field_id` (strictly above the table's
    /// `last-column-id`).
    pub fn new(configs: &[ShredConfig], start_field_id: i32) -> Self {
        FilePruner {
            ids: assign_shredded_field_ids(configs, start_field_id),
            types: shredded_path_types(configs),
        }
    }

    /// The assigned `stats path → field id` map.
    pub fn field_ids(&self) -> &BTreeMap<String, i32> {
        &self.ids
    }

    /// Decide whether a file can be skipped for a rewritten predicate.
    pub fn should_skip(&self, filter: &Json, stats: &FileColumnStats) -> SkipDecision {
        match self.eval(filter, stats) {
            Some(reasons) => {
                tracing::debug!(?reasons, "pruning file");
                SkipDecision {
                    skip: true,
                    reasons,
                }
            }
            None => SkipDecision::keep(),
        }
    }

    // Some(reasons) = no row can match; None = must keep.
    fn eval(&self, node: &Json, stats: &FileColumnStats) -> Option<Vec<String>> {
        let Json::Object(entries) = node else {
            return None;
        };
        // multiple keys compose as AND: any skipping component suffices
        let mut reasons = Vec::new();
        for (key, value) in entries {
            let skipped = match key.as_str() {
                "$and" => self.eval_and(value, stats),
                "$or" => self.eval_or(value, stats),
                "$not" => self
                    .must_match_all(value, stats)
                    .then(|| vec![format!("$not: inner predicate matches every row")]),
                "$nor" => self.eval_nor(value, stats),
                _ => self.eval_leaf(key, value, stats),
            };
            if let Some(mut skip_reasons) = skipped {
                reasons.append(&mut skip_reasons);
            }
        }
        if reasons.is_empty() {
            None
        } else {
            Some(reasons)
        }
    }

    fn eval_and(&self, branches: &Json, stats: &FileColumnStats) -> Option<Vec<String>> {
        let Json::Array(branches) = branches else {
            return None;
        };
        let mut reasons = Vec::new();
        for branch in branches {
            if let Some(mut branch_reasons) = self.eval(branch, stats) {
                reasons.append(&mut branch_reasons);
            }
        }
        if reasons.is_empty() {
            None
        } else {
            Some(reasons)
        }
    }

    // skip iff every branch skips and the branch list is non-empty
    fn eval_or(&self, branches: &Json, stats: &FileColumnStats) -> Option<Vec<String>> {
        let Json::Array(branches) = branches else {
            return None;
        };
        if branches.is_empty() {
            return None;
        }
        let mut reasons = Vec::new();
        for branch in branches {
            match self.eval(branch, stats) {
                Some(mut branch_reasons) => reasons.append(&mut branch_reasons),
                None => return None,
            }
        }
        Some(reasons)
    }

    // $nor skips only when some branch provably matches every row
    fn eval_nor(&self, branches: &Json, stats: &FileColumnStats) -> Option<Vec<String>> {
        let Json::Array(branches) = branches else {
            return None;
        };
        branches
            .iter()
            .any(|branch| self.must_match_all(branch, stats))
            .then(|| vec!["$nor: a branch matches every row".to_string()])
    }

    fn field_stats(&self, path: &str, stats: &FileColumnStats) -> Option<FieldStats> {
        let id = *self.ids.get(path)?;
        let field_type = self.types.get(path)?;
        let decode = |bytes: Option<&Vec<u8>>| {
            bytes.and_then(|bytes| Value::try_from_bytes(bytes, field_type).ok())
        };
        Some(FieldStats {
            name: split_stats_path(path)
                .map(|(_, field)| field.to_string())
                .unwrap_or_else(|| path.to_string()),
            lower: decode(stats.lower_bounds.get(&id)),
            upper: decode(stats.upper_bounds.get(&id)),
            value_count: stats.value_counts.get(&id).copied(),
            null_count: stats.null_value_counts.get(&id).copied(),
        })
    }

    fn eval_leaf(&self, path: &str, spec: &Json, stats: &FileColumnStats) -> Option<Vec<String>> {
        let field = self.field_stats(path, stats)?;
        let field_type = self.types.get(path)?;
        let mut reasons = Vec::new();
        for (operator, operand) in operator_entries(spec) {
            if let Some(reason) = eval_operator(&field, field_type, operator, operand) {
                reasons.push(reason);
            }
        }
        if reasons.is_empty() {
            None
        } else {
            Some(reasons)
        }
    }

    // Proof that every row of the file matches the predicate. Used to
    // invert $not and $nor without breaking soundness.
    fn must_match_all(&self, node: &Json, stats: &FileColumnStats) -> bool {
        let Json::Object(entries) = node else {
            return false;
        };
        if entries.is_empty() {
            return false;
        }
        entries.iter().all(|(key, value)| match key.as_str() {
            "$and" => matches!(value, Json::Array(branches)
                if !branches.is_empty()
                    && branches.iter().all(|branch| self.must_match_all(branch, stats))),
            "$or" => matches!(value, Json::Array(branches)
                if branches.iter().any(|branch| self.must_match_all(branch, stats))),
            "$not" => self.eval(value, stats).is_some(),
            "$nor" => matches!(value, Json::Array(branches)
                if !branches.is_empty()
                    && branches.iter().all(|branch| self.eval(branch, stats).is_some())),
            _ => self.leaf_must_match_all(key, value, stats),
        })
    }

    fn leaf_must_match_all(&self, path: &str, spec: &Json, stats: &FileColumnStats) -> bool {
        let Some(field) = self.field_stats(path, stats) else {
            return false;
        };
        let Some(field_type) = self.types.get(path) else {
            return false;
        };
        let entries = operator_entries(spec);
        !entries.is_empty()
            && entries
                .iter()
                .all(|(operator, operand)| operator_must_match_all(&field, field_type, operator, operand))
    }
}

// A leaf value is either an operator map or a bare literal meaning $eq.
fn operator_entries(spec: &Json) -> Vec<(&str, &Json)> {
    match spec {
        Json::Object(entries)
            if entries.keys().all(|key| key.starts_with('$')) && !entries.is_empty() =>
        {
            entries
                .iter()
                .map(|(operator, operand)| (operator.as_str(), operand))
                .collect()
        }
        literal => vec![("$eq", literal)],
    }
}

fn bounds_reason(field: &FieldStats, operator: &str, operand: &Json) -> String {
    let render = |bound: &Option<Value>| match bound {
        Some(value) => value.to_string(),
        None => "?".to_string(),
    };
    format!(
        "field '{}' bounds [{}, {}] cannot satisfy {} {}",
        field.name,
        render(&field.lower),
        render(&field.upper),
        operator,
        operand
    )
}

// Some(reason) when the bounds prove no row can match the operator.
fn eval_operator(
    field: &FieldStats,
    field_type: &PrimitiveType,
    operator: &str,
    operand: &Json,
) -> Option<String> {
    use std::cmp::Ordering::*;

    if operand.is_null() || operator == "$exists" {
        return eval_null_operator(field, operator, operand);
    }
    if operator == "$in" || operator == "$nin" {
        return eval_set_operator(field, field_type, operator, operand);
    }
    if operator == "$regex" {
        return None;
    }

    let value = json_to_value(operand, field_type)?;
    let below = |bound: &Option<Value>| {
        bound
            .as_ref()
            .and_then(|bound| bound.compare(&value))
    };
    let lower = below(&field.lower);
    let upper = below(&field.upper);
    let skip = match operator {
        // skip iff U < v or L > v
        "$eq" => upper == Some(Less) || lower == Some(Greater),
        // skip iff U <= v
        "$gt" => matches!(upper, Some(Less) | Some(Equal)),
        // skip iff U < v
        "$gte" => upper == Some(Less),
        // skip iff L >= v
        "$lt" => matches!(lower, Some(Greater) | Some(Equal)),
        // skip iff L > v
        "$lte" => lower == Some(Greater),
        // skip iff L = U = v
        "$ne" => lower == Some(Equal) && upper == Some(Equal),
        _ => false,
    };
    skip.then(|| bounds_reason(field, operator, operand))
}

fn eval_null_operator(field: &FieldStats, operator: &str, operand: &Json) -> Option<String> {
    let wants_null = match (operator, operand) {
        ("$eq", Json::Null) => true,
        ("$ne", Json::Null) => false,
        ("$exists", Json::Bool(exists)) => !exists,
        _ => return None,
    };
    if wants_null {
        // no nulls in this file
        (field.null_count == Some(0)).then(|| {
            format!(
                "field '{}' has no null values but the predicate requires null",
                field.name
            )
        })
    } else {
        // every value in this file is null
        match (field.value_count, field.null_count) {
            (Some(values), Some(nulls)) if values == nulls => Some(format!(
                "field '{}' is null in all {} rows",
                field.name, values
            )),
            _ => None,
        }
    }
}

fn eval_set_operator(
    field: &FieldStats,
    field_type: &PrimitiveType,
    operator: &str,
    operand: &Json,
) -> Option<String> {
    use std::cmp::Ordering::*;
    let Json::Array(items) = operand else {
        return None;
    };
    match operator {
        "$in" => {
            if items.is_empty() {
                return Some(format!("field '{}': $in over an empty set", field.name));
            }
            let (lower, upper) = (field.lower.as_ref()?, field.upper.as_ref()?);
            for item in items {
                let Some(value) = json_to_value(item, field_type) else {
                    return None;
                };
                let above_lower = matches!(lower.compare(&value), Some(Less) | Some(Equal));
                let below_upper = matches!(upper.compare(&value), Some(Greater) | Some(Equal));
                if above_lower && below_upper {
                    return None;
                }
            }
            Some(bounds_reason(field, "$in", operand))
        }
        "$nin" => {
            // only provable when the file holds a single value in the set
            let (lower, upper) = (field.lower.as_ref()?, field.upper.as_ref()?);
            for item in items {
                let Some(value) = json_to_value(item, field_type) else {
                    continue;
                };
                if lower.compare(&value) == Some(Equal) && upper.compare(&value) == Some(Equal) {
                    return Some(bounds_reason(field, "$nin", operand));
                }
            }
            None
        }
        _ => None,
    }
}

fn operator_must_match_all(
    field: &FieldStats,
    field_type: &PrimitiveType,
    operator: &str,
    operand: &Json,
) -> bool {
    use std::cmp::Ordering::*;

    match (operator, operand) {
        ("$eq", Json::Null) => field
            .value_count
            .zip(field.null_count)
            .map(|(values, nulls)| values == nulls)
            .unwrap_or(false),
        ("$ne", Json::Null) => field.null_count == Some(0),
        ("$exists", Json::Bool(true)) => field.null_count == Some(0),
        ("$exists", Json::Bool(false)) => field
            .value_count
            .zip(field.null_count)
            .map(|(values, nulls)| values == nulls)
            .unwrap_or(false),
        _ => {
            // comparisons never match null rows
            if field.null_count != Some(0) {
                return false;
            }
            let (Some(lower), Some(upper)) = (field.lower.as_ref(), field.upper.as_ref()) else {
                return false;
            };
            match operator {
                "$in" => match operand {
                    Json::Array(items) => items.iter().any(|item| {
                        json_to_value(item, field_type)
                            .map(|value| {
                                lower.compare(&value) == Some(Equal)
                                    && upper.compare(&value) == Some(Equal)
                            })
                            .unwrap_or(false)
                    }),
                    _ => false,
                },
                "$nin" => match operand {
                    Json::Array(items) => items.iter().all(|item| {
                        json_to_value(item, field_type)
                            .map(|value| {
                                upper.compare(&value) == Some(Less)
                                    || lower.compare(&value) == Some(Greater)
                            })
                            .unwrap_or(false)
                    }),
                    _ => false,
                },
                _ => {
                    let Some(value) = json_to_value(operand, field_type) else {
                        return false;
                    };
                    match operator {
                        "$eq" => {
                            lower.compare(&value) == Some(Equal)
                                && upper.compare(&value) == Some(Equal)
                        }
                        "$gt" => lower.compare(&value) == Some(Greater),
                        "$gte" => {
                            matches!(lower.compare(&value), Some(Greater) | Some(Equal))
                        }
                        "$lt" => upper.compare(&value) == Some(Less),
                        "$lte" => matches!(upper.compare(&value), Some(Less) | Some(Equal)),
                        "$ne" => {
                            upper.compare(&value) == Some(Less)
                                || lower.compare(&value) == Some(Greater)
                        }
                        _ => false,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::schema::PrimitiveType;
    use serde_json::json;

    fn configs() -> Vec<ShredConfig> {
        vec![ShredConfig {
            column_name: "data".to_string(),
            fields: vec!["year".to_string(), "name".to_string()],
            field_types: HashMap::from([
                ("year".to_string(), PrimitiveType::Int),
                ("name".to_string(), PrimitiveType::String),
            ]),
        }]
    }

    fn pruner() -> FilePruner {
        FilePruner::new(&configs(), 100)
    }

    const YEAR: i32 = 100;
    const NAME: i32 = 101;

    fn year_stats(lower: i32, upper: i32) -> FileColumnStats {
        FileColumnStats {
            value_counts: HashMap::from([(YEAR, 1000)]),
            null_value_counts: HashMap::from([(YEAR, 0)]),
            lower_bounds: HashMap::from([(YEAR, lower.to_le_bytes().to_vec())]),
            upper_bounds: HashMap::from([(YEAR, upper.to_le_bytes().to_vec())]),
        }
    }

    #[test]
    fn test_gt_above_upper_bound_skips() {
        let decision = pruner().should_skip(
            &json!({"data.typed_value.year.typed_value": {"$gt": 2020}}),
            &year_stats(2000, 2010),
        );
        assert!(decision.skip);
        let reason = &decision.reasons[0];
        assert!(reason.contains("year"), "reason was {reason}");
        assert!(reason.contains("2000") && reason.contains("2010"));
    }

    #[test]
    fn test_gte_at_upper_bound_keeps() {
        let decision = pruner().should_skip(
            &json!({"data.typed_value.year.typed_value": {"$gte": 2010}}),
            &year_stats(2000, 2010),
        );
        assert!(!decision.skip);
    }

    #[test]
    fn test_eq_outside_range_skips() {
        let stats = year_stats(2000, 2010);
        let pruner = pruner();
        assert!(pruner
            .should_skip(&json!({"data.typed_value.year.typed_value": 1999}), &stats)
            .skip);
        assert!(pruner
            .should_skip(&json!({"data.typed_value.year.typed_value": 2011}), &stats)
            .skip);
        assert!(!pruner
            .should_skip(&json!({"data.typed_value.year.typed_value": 2005}), &stats)
            .skip);
    }

    #[test]
    fn test_lt_and_lte_at_lower_bound() {
        let stats = year_stats(2000, 2010);
        let pruner = pruner();
        assert!(pruner
            .should_skip(
                &json!({"data.typed_value.year.typed_value": {"$lt": 2000}}),
                &stats
            )
            .skip);
        assert!(!pruner
            .should_skip(
                &json!({"data.typed_value.year.typed_value": {"$lte": 2000}}),
                &stats
            )
            .skip);
    }

    #[test]
    fn test_ne_only_skips_constant_files() {
        let pruner = pruner();
        assert!(pruner
            .should_skip(
                &json!({"data.typed_value.year.typed_value": {"$ne": 2005}}),
                &year_stats(2005, 2005)
            )
            .skip);
        assert!(!pruner
            .should_skip(
                &json!({"data.typed_value.year.typed_value": {"$ne": 2005}}),
                &year_stats(2000, 2010)
            )
            .skip);
    }

    #[test]
    fn test_in_empty_set_skips_every_file() {
        let decision = pruner().should_skip(
            &json!({"data.typed_value.year.typed_value": {"$in": []}}),
            &year_stats(2000, 2010),
        );
        assert!(decision.skip);
    }

    #[test]
    fn test_in_set_inside_and_outside_range() {
        let stats = year_stats(2000, 2010);
        let pruner = pruner();
        assert!(pruner
            .should_skip(
                &json!({"data.typed_value.year.typed_value": {"$in": [1990, 2020]}}),
                &stats
            )
            .skip);
        assert!(!pruner
            .should_skip(
                &json!({"data.typed_value.year.typed_value": {"$in": [1990, 2005]}}),
                &stats
            )
            .skip);
    }

    #[test]
    fn test_missing_bounds_keep() {
        let stats = FileColumnStats {
            value_counts: HashMap::from([(YEAR, 1000)]),
            null_value_counts: HashMap::from([(YEAR, 0)]),
            lower_bounds: HashMap::new(),
            upper_bounds: HashMap::new(),
        };
        let decision = pruner().should_skip(
            &json!({"data.typed_value.year.typed_value": {"$gt": 2020}}),
            &stats,
        );
        assert!(!decision.skip);
    }

    #[test]
    fn test_unknown_field_keeps() {
        let decision = pruner().should_skip(
            &json!({"data.typed_value.unknown.typed_value": {"$gt": 2020}}),
            &year_stats(2000, 2010),
        );
        assert!(!decision.skip);
    }

    #[test]
    fn test_eq_null_with_no_nulls_skips() {
        let decision = pruner().should_skip(
            &json!({"data.typed_value.year.typed_value": {"$eq": null}}),
            &year_stats(2000, 2010),
        );
        assert!(decision.skip);
    }

    #[test]
    fn test_ne_null_all_null_skips() {
        let stats = FileColumnStats {
            value_counts: HashMap::from([(YEAR, 1000)]),
            null_value_counts: HashMap::from([(YEAR, 1000)]),
            lower_bounds: HashMap::new(),
            upper_bounds: HashMap::new(),
        };
        let decision = pruner().should_skip(
            &json!({"data.typed_value.year.typed_value": {"$ne": null}}),
            &stats,
        );
        assert!(decision.skip);
        assert!(!pruner()
            .should_skip(
                &json!({"data.typed_value.year.typed_value": {"$ne": null}}),
                &year_stats(2000, 2010)
            )
            .skip);
    }

    #[test]
    fn test_exists_follows_null_counts() {
        let pruner = pruner();
        let all_null = FileColumnStats {
            value_counts: HashMap::from([(YEAR, 10)]),
            null_value_counts: HashMap::from([(YEAR, 10)]),
            lower_bounds: HashMap::new(),
            upper_bounds: HashMap::new(),
        };
        assert!(pruner
            .should_skip(
                &json!({"data.typed_value.year.typed_value": {"$exists": true}}),
                &all_null
            )
            .skip);
        assert!(pruner
            .should_skip(
                &json!({"data.typed_value.year.typed_value": {"$exists": false}}),
                &year_stats(2000, 2010)
            )
            .skip);
    }

    #[test]
    fn test_regex_never_skips() {
        let stats = FileColumnStats {
            value_counts: HashMap::from([(NAME, 10)]),
            null_value_counts: HashMap::from([(NAME, 0)]),
            lower_bounds: HashMap::from([(NAME, b"aaa".to_vec())]),
            upper_bounds: HashMap::from([(NAME, b"bbb".to_vec())]),
        };
        let decision = pruner().should_skip(
            &json!({"data.typed_value.name.typed_value": {"$regex": "^zzz"}}),
            &stats,
        );
        assert!(!decision.skip);
    }

    #[test]
    fn test_string_bounds_lexicographic() {
        let stats = FileColumnStats {
            value_counts: HashMap::from([(NAME, 10)]),
            null_value_counts: HashMap::from([(NAME, 0)]),
            lower_bounds: HashMap::from([(NAME, b"apple".to_vec())]),
            upper_bounds: HashMap::from([(NAME, b"mango".to_vec())]),
        };
        let pruner = pruner();
        assert!(pruner
            .should_skip(
                &json!({"data.typed_value.name.typed_value": {"$gt": "zebra"}}),
                &stats
            )
            .skip);
        assert!(!pruner
            .should_skip(
                &json!({"data.typed_value.name.typed_value": {"$eq": "grape"}}),
                &stats
            )
            .skip);
    }

    #[test]
    fn test_implicit_and_skips_when_any_field_skips() {
        let mut stats = year_stats(2000, 2010);
        stats.value_counts.insert(NAME, 1000);
        stats.null_value_counts.insert(NAME, 0);
        stats.lower_bounds.insert(NAME, b"aaa".to_vec());
        stats.upper_bounds.insert(NAME, b"zzz".to_vec());
        let decision = pruner().should_skip(
            &json!({
                "data.typed_value.name.typed_value": {"$gte": "middle"},
                "data.typed_value.year.typed_value": {"$gt": 2020}
            }),
            &stats,
        );
        assert!(decision.skip);
    }

    #[test]
    fn test_or_skips_only_when_all_branches_skip() {
        let stats = year_stats(2000, 2010);
        let pruner = pruner();
        assert!(pruner
            .should_skip(
                &json!({"$or": [
                    {"data.typed_value.year.typed_value": {"$gt": 2020}},
                    {"data.typed_value.year.typed_value": {"$lt": 1990}}
                ]}),
                &stats
            )
            .skip);
        assert!(!pruner
            .should_skip(
                &json!({"$or": [
                    {"data.typed_value.year.typed_value": {"$gt": 2020}},
                    {"data.typed_value.year.typed_value": {"$eq": 2005}}
                ]}),
                &stats
            )
            .skip);
        // an empty $or cannot skip
        assert!(!pruner.should_skip(&json!({"$or": []}), &stats).skip);
    }

    #[test]
    fn test_and_monotonicity() {
        // adding a predicate to an AND can only grow the skip set
        let stats = year_stats(2000, 2010);
        let pruner = pruner();
        let narrow = json!({"$and": [
            {"data.typed_value.year.typed_value": {"$gt": 2020}}
        ]});
        let narrower = json!({"$and": [
            {"data.typed_value.year.typed_value": {"$gt": 2020}},
            {"data.typed_value.year.typed_value": {"$lt": 2030}}
        ]});
        assert!(pruner.should_skip(&narrow, &stats).skip);
        assert!(pruner.should_skip(&narrower, &stats).skip);
    }

    #[test]
    fn test_not_conservative() {
        let stats = year_stats(2000, 2010);
        let pruner = pruner();
        // every row is > 1990, so NOT(> 1990) matches nothing
        assert!(pruner
            .should_skip(
                &json!({"$not": {"data.typed_value.year.typed_value": {"$gt": 1990}}}),
                &stats
            )
            .skip);
        // some rows may be > 2005, cannot invert
        assert!(!pruner
            .should_skip(
                &json!({"$not": {"data.typed_value.year.typed_value": {"$gt": 2005}}}),
                &stats
            )
            .skip);
    }

    #[test]
    fn test_nor_as_not_or() {
        let stats = year_stats(2000, 2010);
        let pruner = pruner();
        assert!(pruner
            .should_skip(
                &json!({"$nor": [
                    {"data.typed_value.year.typed_value": {"$gte": 1990}}
                ]}),
                &stats
            )
            .skip);
        assert!(!pruner
            .should_skip(
                &json!({"$nor": [
                    {"data.typed_value.year.typed_value": {"$gte": 2005}}
                ]}),
                &stats
            )
            .skip);
    }

    #[test]
    fn test_stats_from_data_file() {
        use crate::model::manifest::{DataFile, FileFormat};
        let mut file = DataFile::new("s3://b/t/data/a.parquet", FileFormat::Parquet, 10, 1);
        file.value_counts = Some(HashMap::from([(YEAR, 10)]));
        file.null_value_counts = Some(HashMap::from([(YEAR, 0)]));
        file.lower_bounds = Some(HashMap::from([(YEAR, 2000i32.to_le_bytes().to_vec())]));
        file.upper_bounds = Some(HashMap::from([(YEAR, 2010i32.to_le_bytes().to_vec())]));
        let stats = FileColumnStats::from(&file);
        assert!(pruner()
            .should_skip(
                &json!({"data.typed_value.year.typed_value": {"$gt": 2020}}),
                &stats
            )
            .skip);
    }
}
