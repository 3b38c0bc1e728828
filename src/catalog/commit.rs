/*!
The atomic commit protocol: requirements asserted against the current table
state and updates applied to produce the next metadata version.

Both kinds are closed sum types tagged by the REST `type` / `action`
discriminators; unknown tags are decode errors. Requirements are evaluated
in order against a snapshot of the loaded metadata, then updates are applied
in order through a [TableMetadataBuilder].
*/

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::identifier::TableIdentifier;
use crate::error::{Error, Result};
use crate::model::metadata::{FormatVersion, TableMetadata, TableMetadataBuilder};
use crate::model::partition::PartitionSpec;
use crate::model::schema::Schema;
use crate::model::snapshot::{Snapshot, SnapshotReference};
use crate::model::sort::SortOrder;

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
/// An assertion about the table's pre-commit state.
pub enum TableRequirement {
    /// The table must not yet exist.
    AssertCreate,
    /// The current table UUID must match.
    #[serde(rename_all = "kebab-case")]
    AssertTableUuid {
        /// The expected UUID.
        uuid: Uuid,
    },
    /// The named branch or tag must point at the given snapshot, or be
    /// absent when the snapshot id is null.
    #[serde(rename_all = "kebab-case")]
    AssertRefSnapshotId {
        /// The reference name.
        r#ref: String,
        /// The expected snapshot id, or None for "ref must not exist".
        snapshot_id: Option<i64>,
    },
    /// The highest assigned column id must match.
    #[serde(rename_all = "kebab-case")]
    AssertLastAssignedFieldId {
        /// The expected value.
        last_assigned_field_id: i32,
    },
    /// The current schema id must match.
    #[serde(rename_all = "kebab-case")]
    AssertCurrentSchemaId {
        /// The expected value.
        current_schema_id: i32,
    },
    /// The highest assigned partition field id must match.
    #[serde(rename_all = "kebab-case")]
    AssertLastAssignedPartitionId {
        /// The expected value.
        last_assigned_partition_id: i32,
    },
    /// The default partition spec id must match.
    #[serde(rename_all = "kebab-case")]
    AssertDefaultSpecId {
        /// The expected value.
        default_spec_id: i32,
    },
    /// The default sort order id must match.
    #[serde(rename_all = "kebab-case")]
    AssertDefaultSortOrderId {
        /// The expected value.
        default_sort_order_id: i32,
    },
}

impl TableRequirement {
    /// The REST `type` tag, used in conflict errors.
    pub fn kind(&self) -> &'static str {
        match self {
            TableRequirement::AssertCreate => "assert-create",
            TableRequirement::AssertTableUuid { .. } => "assert-table-uuid",
            TableRequirement::AssertRefSnapshotId { .. } => "assert-ref-snapshot-id",
            TableRequirement::AssertLastAssignedFieldId { .. } => "assert-last-assigned-field-id",
            TableRequirement::AssertCurrentSchemaId { .. } => "assert-current-schema-id",
            TableRequirement::AssertLastAssignedPartitionId { .. } => {
                "assert-last-assigned-partition-id"
            }
            TableRequirement::AssertDefaultSpecId { .. } => "assert-default-spec-id",
            TableRequirement::AssertDefaultSortOrderId { .. } => "assert-default-sort-order-id",
        }
    }

    /// Evaluate the requirement against the current table state. `None`
    /// means the table does not exist.
    pub fn check(&self, metadata: Option<&TableMetadata>) -> Result<()> {
        let conflict = |message: String| {
            Err(Error::CommitConflict {
                requirement: self.kind().to_string(),
                message,
            })
        };
        match (self, metadata) {
            (TableRequirement::AssertCreate, None) => Ok(()),
            (TableRequirement::AssertCreate, Some(_)) => {
                conflict("table already exists".to_string())
            }
            (_, None) => conflict("table does not exist".to_string()),
            (TableRequirement::AssertTableUuid { uuid }, Some(metadata)) => {
                if metadata.table_uuid == *uuid {
                    Ok(())
                } else {
                    conflict(format!(
                        "expected table uuid {uuid}, found {}",
                        metadata.table_uuid
                    ))
                }
            }
            (
                TableRequirement::AssertRefSnapshotId { r#ref, snapshot_id },
                Some(metadata),
            ) => {
                let actual = metadata
                    .refs
                    .get(r#ref)
                    .map(|reference| reference.snapshot_id);
                if actual == *snapshot_id {
                    Ok(())
                } else {
                    conflict(format!(
                        "ref {} expected to point at {:?}, found {:?}",
                        r#ref, snapshot_id, actual
                    ))
                }
            }
            (
                TableRequirement::AssertLastAssignedFieldId {
                    last_assigned_field_id,
                },
                Some(metadata),
            ) => {
                if metadata.last_column_id == *last_assigned_field_id {
                    Ok(())
                } else {
                    conflict(format!(
                        "expected last-column-id {}, found {}",
                        last_assigned_field_id, metadata.last_column_id
                    ))
                }
            }
            (
                TableRequirement::AssertCurrentSchemaId { current_schema_id },
                Some(metadata),
            ) => {
                if metadata.current_schema_id == *current_schema_id {
                    Ok(())
                } else {
                    conflict(format!(
                        "expected current-schema-id {}, found {}",
                        current_schema_id, metadata.current_schema_id
                    ))
                }
            }
            (
                TableRequirement::AssertLastAssignedPartitionId {
                    last_assigned_partition_id,
                },
                Some(metadata),
            ) => {
                if metadata.last_partition_id == *last_assigned_partition_id {
                    Ok(())
                } else {
                    conflict(format!(
                        "expected last-partition-id {}, found {}",
                        last_assigned_partition_id, metadata.last_partition_id
                    ))
                }
            }
            (TableRequirement::AssertDefaultSpecId { default_spec_id }, Some(metadata)) => {
                if metadata.default_spec_id == *default_spec_id {
                    Ok(())
                } else {
                    conflict(format!(
                        "expected default-spec-id {}, found {}",
                        default_spec_id, metadata.default_spec_id
                    ))
                }
            }
            (
                TableRequirement::AssertDefaultSortOrderId {
                    default_sort_order_id,
                },
                Some(metadata),
            ) => {
                if metadata.default_sort_order_id == *default_sort_order_id {
                    Ok(())
                } else {
                    conflict(format!(
                        "expected default-sort-order-id {}, found {}",
                        default_sort_order_id, metadata.default_sort_order_id
                    ))
                }
            }
        }
    }

    /// Rewrite the requirement to the value observed in the current state.
    /// Used by the server-side rebase when every update is rebase-safe.
    pub fn rebased(&self, metadata: &TableMetadata) -> TableRequirement {
        match self {
            TableRequirement::AssertCreate => self.clone(),
            TableRequirement::AssertTableUuid { .. } => TableRequirement::AssertTableUuid {
                uuid: metadata.table_uuid,
            },
            TableRequirement::AssertRefSnapshotId { r#ref, .. } => {
                TableRequirement::AssertRefSnapshotId {
                    r#ref: r#ref.clone(),
                    snapshot_id: metadata
                        .refs
                        .get(r#ref)
                        .map(|reference| reference.snapshot_id),
                }
            }
            TableRequirement::AssertLastAssignedFieldId { .. } => {
                TableRequirement::AssertLastAssignedFieldId {
                    last_assigned_field_id: metadata.last_column_id,
                }
            }
            TableRequirement::AssertCurrentSchemaId { .. } => {
                TableRequirement::AssertCurrentSchemaId {
                    current_schema_id: metadata.current_schema_id,
                }
            }
            TableRequirement::AssertLastAssignedPartitionId { .. } => {
                TableRequirement::AssertLastAssignedPartitionId {
                    last_assigned_partition_id: metadata.last_partition_id,
                }
            }
            TableRequirement::AssertDefaultSpecId { .. } => TableRequirement::AssertDefaultSpecId {
                default_spec_id: metadata.default_spec_id,
            },
            TableRequirement::AssertDefaultSortOrderId { .. } => {
                TableRequirement::AssertDefaultSortOrderId {
                    default_sort_order_id: metadata.default_sort_order_id,
                }
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(tag = "action", rename_all = "kebab-case")]
/// A change applied to table metadata during a commit.
pub enum TableUpdate {
    /// Assign a new table UUID.
    #[serde(rename_all = "kebab-case")]
    AssignUuid {
        /// The UUID to assign.
        uuid: Uuid,
    },
    /// Upgrade the format version.
    #[serde(rename_all = "kebab-case")]
    UpgradeFormatVersion {
        /// The target version.
        format_version: FormatVersion,
    },
    /// Add a schema.
    #[serde(rename_all = "kebab-case")]
    AddSchema {
        /// The schema to add.
        schema: Schema,
        /// The writer's observed column-id high-water mark.
        #[serde(skip_serializing_if = "Option::is_none")]
        last_column_id: Option<i32>,
    },
    /// Set the current schema. `-1` means the schema added last.
    #[serde(rename_all = "kebab-case")]
    SetCurrentSchema {
        /// The schema id to make current.
        schema_id: i32,
    },
    /// Add a partition spec.
    #[serde(rename = "add-spec", rename_all = "kebab-case")]
    AddSpec {
        /// The spec to add.
        spec: PartitionSpec,
    },
    /// Set the default partition spec. `-1` means the spec added last.
    #[serde(rename_all = "kebab-case")]
    SetDefaultSpec {
        /// The spec id to make default.
        spec_id: i32,
    },
    /// Add a sort order.
    #[serde(rename_all = "kebab-case")]
    AddSortOrder {
        /// The sort order to add.
        sort_order: SortOrder,
    },
    /// Set the default sort order. `-1` means the order added last.
    #[serde(rename_all = "kebab-case")]
    SetDefaultSortOrder {
        /// The sort order id to make default.
        sort_order_id: i32,
    },
    /// Add a snapshot.
    #[serde(rename_all = "kebab-case")]
    AddSnapshot {
        /// The snapshot to add.
        snapshot: Snapshot,
    },
    /// Remove snapshots.
    #[serde(rename_all = "kebab-case")]
    RemoveSnapshots {
        /// Ids of the snapshots to remove.
        snapshot_ids: Vec<i64>,
    },
    /// Remove a branch or tag.
    #[serde(rename_all = "kebab-case")]
    RemoveSnapshotRef {
        /// The reference name.
        ref_name: String,
    },
    /// Create or move a branch or tag.
    #[serde(rename_all = "kebab-case")]
    SetSnapshotRef {
        /// The reference name.
        ref_name: String,
        /// The target snapshot and retention overrides.
        #[serde(flatten)]
        reference: SnapshotReference,
    },
    /// Set table properties.
    #[serde(rename_all = "kebab-case")]
    SetProperties {
        /// Keys to set with their values.
        updates: HashMap<String, String>,
    },
    /// Remove table properties.
    #[serde(rename_all = "kebab-case")]
    RemoveProperties {
        /// Keys to remove.
        removals: Vec<String>,
    },
    /// Set the table base location.
    #[serde(rename_all = "kebab-case")]
    SetLocation {
        /// The new location.
        location: String,
    },
}

impl TableUpdate {
    /// Apply this update through the metadata builder.
    pub fn apply(self, builder: &mut TableMetadataBuilder) -> Result<()> {
        match self {
            TableUpdate::AssignUuid { uuid } => builder.assign_uuid(uuid)?,
            TableUpdate::UpgradeFormatVersion { format_version } => {
                builder.upgrade_format_version(format_version)?
            }
            TableUpdate::AddSchema {
                schema,
                last_column_id,
            } => builder.add_schema(schema, last_column_id)?,
            TableUpdate::SetCurrentSchema { schema_id } => builder.set_current_schema(schema_id)?,
            TableUpdate::AddSpec { spec } => builder.add_partition_spec(spec)?,
            TableUpdate::SetDefaultSpec { spec_id } => builder.set_default_spec(spec_id)?,
            TableUpdate::AddSortOrder { sort_order } => builder.add_sort_order(sort_order)?,
            TableUpdate::SetDefaultSortOrder { sort_order_id } => {
                builder.set_default_sort_order(sort_order_id)?
            }
            TableUpdate::AddSnapshot { snapshot } => builder.add_snapshot(snapshot)?,
            TableUpdate::RemoveSnapshots { snapshot_ids } => {
                builder.remove_snapshots(&snapshot_ids)?
            }
            TableUpdate::RemoveSnapshotRef { ref_name } => builder.remove_ref(&ref_name)?,
            TableUpdate::SetSnapshotRef {
                ref_name,
                reference,
            } => builder.set_ref(&ref_name, reference)?,
            TableUpdate::SetProperties { updates } => builder.set_properties(updates)?,
            TableUpdate::RemoveProperties { removals } => builder.remove_properties(&removals)?,
            TableUpdate::SetLocation { location } => builder.set_location(&location)?,
        };
        Ok(())
    }

    /// Whether a failed requirement may be rebased onto the current state
    /// when this update is part of the commit.
    ///
    /// An update is rebase-safe when its semantics do not depend on the
    /// specific value a requirement asserted: additive updates and the
    /// "last added" (`-1`) forms. Updates that name existing objects or
    /// move refs are not.
    pub fn is_rebase_safe(&self) -> bool {
        match self {
            TableUpdate::AddSchema { .. }
            | TableUpdate::AddSpec { .. }
            | TableUpdate::AddSortOrder { .. }
            | TableUpdate::AddSnapshot { .. }
            | TableUpdate::SetProperties { .. }
            | TableUpdate::RemoveProperties { .. } => true,
            TableUpdate::SetCurrentSchema { schema_id } => *schema_id == -1,
            TableUpdate::SetDefaultSpec { spec_id } => *spec_id == -1,
            TableUpdate::SetDefaultSortOrder { sort_order_id } => *sort_order_id == -1,
            _ => false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
/// A table commit: requirements to assert and updates to apply.
pub struct CommitTableRequest {
    /// The table to commit to.
    pub identifier: TableIdentifier,
    /// Assertions about the pre-commit state, evaluated in order.
    pub requirements: Vec<TableRequirement>,
    /// Changes to apply, in order.
    pub updates: Vec<TableUpdate>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
/// The committed table state returned to the client.
pub struct CommitTableResponse {
    /// Location of the current metadata file.
    pub metadata_location: String,
    /// The current table metadata.
    pub metadata: TableMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requirement_tags() {
        let requirement: TableRequirement = serde_json::from_str(
            r#"{"type": "assert-ref-snapshot-id", "ref": "main", "snapshot-id": 7}"#,
        )
        .unwrap();
        assert_eq!(
            requirement,
            TableRequirement::AssertRefSnapshotId {
                r#ref: "main".to_string(),
                snapshot_id: Some(7)
            }
        );
        assert_eq!(requirement.kind(), "assert-ref-snapshot-id");
    }

    #[test]
    fn test_unknown_requirement_tag_rejected() {
        let result = serde_json::from_str::<TableRequirement>(
            r#"{"type": "assert-something-else"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_update_tags() {
        let update: TableUpdate = serde_json::from_str(
            r#"{"action": "set-properties", "updates": {"owner": "root"}}"#,
        )
        .unwrap();
        assert!(matches!(update, TableUpdate::SetProperties { .. }));

        let update: TableUpdate =
            serde_json::from_str(r#"{"action": "set-current-schema", "schema-id": -1}"#).unwrap();
        assert!(update.is_rebase_safe());
    }

    #[test]
    fn test_unknown_update_tag_rejected() {
        let result = serde_json::from_str::<TableUpdate>(r#"{"action": "explode"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_set_snapshot_ref_flattens_reference() {
        let update: TableUpdate = serde_json::from_str(
            r#"{
                "action": "set-snapshot-ref",
                "ref-name": "main",
                "snapshot-id": 42,
                "type": "branch"
            }"#,
        )
        .unwrap();
        match &update {
            TableUpdate::SetSnapshotRef {
                ref_name,
                reference,
            } => {
                assert_eq!(ref_name, "main");
                assert_eq!(reference.snapshot_id, 42);
                assert!(reference.is_branch());
            }
            other => panic!("unexpected update {other:?}"),
        }
        assert!(!update.is_rebase_safe());
    }

    #[test]
    fn test_assert_create_against_existing() {
        use crate::model::metadata::{FormatVersion, TableMetadataBuilder};
        use crate::model::partition::PartitionSpec;
        use crate::model::schema::{Schema, StructType};
        use crate::model::sort::SortOrder;
        let metadata = TableMetadataBuilder::new(
            "s3://b/t",
            Schema {
                schema_id: 0,
                identifier_field_ids: None,
                struct_fields: StructType { fields: vec![] },
            },
            PartitionSpec::unpartitioned(),
            SortOrder::unsorted(),
            FormatVersion::V2,
            HashMap::new(),
        )
        .unwrap()
        .build()
        .unwrap();
        assert!(TableRequirement::AssertCreate.check(None).is_ok());
        assert!(TableRequirement::AssertCreate.check(Some(&metadata)).is_err());
    }

    #[test]
    fn test_rebase_rewrites_observed_value() {
        use crate::model::metadata::{FormatVersion, TableMetadataBuilder};
        use crate::model::partition::PartitionSpec;
        use crate::model::schema::{Schema, StructType};
        use crate::model::sort::SortOrder;
        let metadata = TableMetadataBuilder::new(
            "s3://b/t",
            Schema {
                schema_id: 0,
                identifier_field_ids: None,
                struct_fields: StructType { fields: vec![] },
            },
            PartitionSpec::unpartitioned(),
            SortOrder::unsorted(),
            FormatVersion::V2,
            HashMap::new(),
        )
        .unwrap()
        .build()
        .unwrap();
        let stale = TableRequirement::AssertDefaultSortOrderId {
            default_sort_order_id: 99,
        };
        assert!(stale.check(Some(&metadata)).is_err());
        let rebased = stale.rebased(&metadata);
        assert!(rebased.check(Some(&metadata)).is_ok());
    }
}
