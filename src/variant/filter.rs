/*!
Rewrites user predicates onto shredded statistics paths.

Predicates arrive in a MongoDB-style shape: field paths as keys, values
either a literal (equality) or an object of operators. Variant fields are
addressed as `$column.field`; when the column and field are configured for
shredding the key is rewritten to the statistics path, otherwise it is left
alone. Operator values pass through verbatim and logical nodes recurse.
*/

use serde_json::{Map, Value as Json};

use crate::variant::{split_stats_path, stats_path, ShredConfig};

/// Comparison and membership operators recognised in predicate leaves.
pub const COMPARISON_OPERATORS: [&str; 10] = [
    "$eq", "$gt", "$gte", "$lt", "$lte", "$ne", "$in", "$nin", "$exists", "$regex",
];

/// Logical operators recognised at any level of the tree.
pub const LOGICAL_OPERATORS: [&str; 4] = ["$and", "$or", "$not", "$nor"];

#[derive(Debug, PartialEq, Default)]
/// The outcome of rewriting a predicate tree.
pub struct RewrittenFilter {
    /// The rewritten tree.
    pub filter: Json,
    /// Variant paths (`$column.field`) rewritten to statistics paths.
    pub transformed: Vec<String>,
    /// Variant-shaped paths left unchanged because the column or field is
    /// not configured for shredding.
    pub untransformed: Vec<String>,
}

/// Split a `$column.field` key into its parts.
fn variant_key(key: &str) -> Option<(&str, &str)> {
    let rest = key.strip_prefix('$')?;
    let (column, field) = rest.split_once('.')?;
    if column.is_empty() || field.is_empty() {
        None
    } else {
        Some((column, field))
    }
}

/// Rewrite a predicate tree against the configured shredded columns.
pub fn rewrite_filter(filter: &Json, configs: &[ShredConfig]) -> RewrittenFilter {
    let mut result = RewrittenFilter {
        filter: Json::Null,
        transformed: vec![],
        untransformed: vec![],
    };
    result.filter = rewrite_node(filter, configs, &mut result.transformed, &mut result.untransformed);
    result
}

fn rewrite_node(
    node: &Json,
    configs: &[ShredConfig],
    transformed: &mut Vec<String>,
    untransformed: &mut Vec<String>,
) -> Json {
    let Json::Object(entries) = node else {
        return node.clone();
    };
    let mut rewritten = Map::new();
    for (key, value) in entries {
        match key.as_str() {
            "$and" | "$or" | "$nor" => {
                let branches = match value {
                    Json::Array(branches) => Json::Array(
                        branches
                            .iter()
                            .map(|branch| {
                                rewrite_node(branch, configs, transformed, untransformed)
                            })
                            .collect(),
                    ),
                    other => other.clone(),
                };
                rewritten.insert(key.clone(), branches);
            }
            "$not" => {
                rewritten.insert(
                    key.clone(),
                    rewrite_node(value, configs, transformed, untransformed),
                );
            }
            _ => match variant_key(key) {
                Some((column, field)) => {
                    let config = configs
                        .iter()
                        .find(|config| config.column_name == column);
                    match config {
                        Some(config) if config.fields.iter().any(|f| f == field) => {
                            transformed.push(key.clone());
                            rewritten.insert(stats_path(column, field), value.clone());
                        }
                        _ => {
                            untransformed.push(key.clone());
                            rewritten.insert(key.clone(), value.clone());
                        }
                    }
                }
                // plain column predicates pass through unchanged
                None => {
                    rewritten.insert(key.clone(), value.clone());
                }
            },
        }
    }
    Json::Object(rewritten)
}

/// Map a statistics path back to the `$column.field` form it was rewritten
/// from, when the column and field are configured.
pub fn original_path(path: &str, configs: &[ShredConfig]) -> Option<String> {
    let (column, field) = split_stats_path(path)?;
    configs
        .iter()
        .find(|config| config.column_name == column)
        .filter(|config| config.fields.iter().any(|f| f == field))
        .map(|_| format!("${column}.{field}"))
}
