/*!
Sort orders: the write-time ordering of rows in data files.

A [SortOrder] lists the columns writers sort by. Each [SortField] derives
its key from a schema field through a [Transform], orders it ascending or
descending, and says where nulls land. Order id 0 is reserved for the
unsorted order; like schemas and partition specs, sort orders are kept as
an append-only set and looked up by id.
*/
use serde::{Deserialize, Serialize};

use crate::model::partition::Transform;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
/// Which way a sort key is ordered.
pub enum SortDirection {
    /// Smallest keys first.
    Asc,
    /// Largest keys first.
    Desc,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "kebab-case")]
/// Where nulls are placed relative to non-null keys.
pub enum NullOrder {
    /// Nulls come before every non-null key.
    NullsFirst,
    /// Nulls come after every non-null key.
    NullsLast,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
/// One sort key of a sort order.
pub struct SortField {
    /// The schema field the key is computed from.
    pub source_id: i32,
    /// Transform applied to the source value before comparing.
    pub transform: Transform,
    /// Which way the keys are ordered.
    pub direction: SortDirection,
    /// Placement of nulls within that direction.
    pub null_order: NullOrder,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
/// An ordered list of sort keys under an order id, most significant key
/// first.
pub struct SortOrder {
    /// Identifier, unique among the table's sort orders. 0 means unsorted.
    pub order_id: i32,
    /// The sort keys.
    pub fields: Vec<SortField>,
}

impl SortOrder {
    /// The unsorted order, id 0 with no fields.
    pub fn unsorted() -> Self {
        SortOrder {
            order_id: 0,
            fields: vec![],
        }
    }

    /// Whether this is the unsorted order.
    pub fn is_unsorted(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_sort_field_wire_form() {
        let data = r#"
            {
                "source-id": 7,
                "transform": "identity",
                "direction": "asc",
                "null-order": "nulls-first"
            }
        "#;

        let field: SortField = serde_json::from_str(data).unwrap();
        assert_eq!(7, field.source_id);
        assert_eq!(Transform::Identity, field.transform);
        assert_eq!(SortDirection::Asc, field.direction);
        assert_eq!(NullOrder::NullsFirst, field.null_order);
    }

    #[test]
    fn test_sort_order_roundtrip() {
        let order = SortOrder {
            order_id: 2,
            fields: vec![
                SortField {
                    source_id: 3,
                    transform: Transform::Day,
                    direction: SortDirection::Desc,
                    null_order: NullOrder::NullsLast,
                },
                SortField {
                    source_id: 1,
                    transform: Transform::Identity,
                    direction: SortDirection::Asc,
                    null_order: NullOrder::NullsFirst,
                },
            ],
        };
        let json = serde_json::to_string(&order).unwrap();
        assert!(json.contains("\"direction\":\"desc\""));
        assert!(json.contains("\"null-order\":\"nulls-last\""));
        let parsed: SortOrder = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, order);
        assert!(!parsed.is_unsorted());
    }

    #[test]
    fn test_unsorted() {
        let order = SortOrder::unsorted();
        assert_eq!(0, order.order_id);
        assert!(order.is_unsorted());
        let json = serde_json::to_string(&order).unwrap();
        assert_eq!(json, r#"{"order-id":0,"fields":[]}"#);
    }
}
