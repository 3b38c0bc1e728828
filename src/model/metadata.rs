/*!
Defines the [table metadata](https://iceberg.apache.org/spec/#table-metadata).
The main struct here is [TableMetadata] which defines the data for a table,
and [TableMetadataBuilder] which applies the discrete mutation operations
used by commits.

[TableMetadata] is a value type; it is never mutated in place. Commits build
a new version with [TableMetadataBuilder] and persist it under the next
`v<N>.metadata.json` name.
*/
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{
    partition::{PartitionSpec, PARTITION_FIELD_ID_START},
    schema::Schema,
    snapshot::{Snapshot, SnapshotReference},
    sort::SortOrder,
};

/// The name of the default branch.
pub const MAIN_BRANCH: &str = "main";

#[derive(Debug, Clone, Copy, Serialize_repr, Deserialize_repr, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
/// Supported table format versions.
pub enum FormatVersion {
    /// Format version 2.
    V2 = 2,
    /// Format version 3, adds row lineage and new column types.
    V3 = 3,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
/// Metadata of an iceberg table.
///
/// Field order matters: `format-version` must be the first key in the
/// serialized JSON, and `current-snapshot-id` is always present, `null`
/// when the table has no snapshot.
pub struct TableMetadata {
    /// Integer version for the format, 2 or 3.
    pub format_version: FormatVersion,
    /// A UUID that identifies the table.
    pub table_uuid: Uuid,
    /// The table's base location.
    pub location: String,
    /// The table's highest assigned sequence number.
    pub last_sequence_number: i64,
    /// Timestamp in milliseconds from the unix epoch when the table was last updated.
    pub last_updated_ms: i64,
    /// An integer; the highest assigned column ID for the table.
    pub last_column_id: i32,
    /// A list of schemas, stored as objects with schema-id.
    pub schemas: Vec<Schema>,
    /// ID of the table's current schema.
    pub current_schema_id: i32,
    /// A list of partition specs, stored as full partition spec objects.
    pub partition_specs: Vec<PartitionSpec>,
    /// ID of the "current" spec that writers should use by default.
    pub default_spec_id: i32,
    /// The highest assigned partition field ID across all partition specs.
    pub last_partition_id: i32,
    /// A string to string map of table properties. This is used to control
    /// settings that affect reading and writing, it is not intended for
    /// arbitrary metadata.
    #[serde(default)]
    pub properties: HashMap<String, String>,
    /// ID of the current table snapshot; must be the same as the current
    /// ID of the main branch in refs. Always serialized, null when the
    /// table has no snapshot.
    #[serde(default)]
    pub current_snapshot_id: Option<i64>,
    /// A list of valid snapshots.
    #[serde(default)]
    pub snapshots: Vec<Snapshot>,
    /// A list of timestamp and snapshot ID pairs that encodes changes to
    /// the current snapshot for the table. Append-only.
    #[serde(default)]
    pub snapshot_log: Vec<SnapshotLog>,
    /// A list of timestamp and metadata file location pairs that encodes
    /// the previous metadata files for the table.
    #[serde(default)]
    pub metadata_log: Vec<MetadataLog>,
    /// A list of sort orders, stored as full sort order objects.
    pub sort_orders: Vec<SortOrder>,
    /// Default sort order id of the table.
    pub default_sort_order_id: i32,
    /// A map of snapshot references. The map keys are the unique snapshot
    /// reference names in the table.
    #[serde(default)]
    pub refs: HashMap<String, SnapshotReference>,
    /// The next row id to assign to newly added rows. Format v3.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_row_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
/// Encodes changes to the previous metadata files for the table.
pub struct MetadataLog {
    /// The file for the log.
    pub metadata_file: String,
    /// Time new metadata was created.
    pub timestamp_ms: i64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
/// A log of when each snapshot was made current.
pub struct SnapshotLog {
    /// Id of the snapshot.
    pub snapshot_id: i64,
    /// Timestamp when the snapshot became current.
    pub timestamp_ms: i64,
}

impl TableMetadata {
    /// Parse table metadata JSON.
    ///
    /// Unknown or unsupported format versions (including v1) fail with
    /// [Error::MetadataParse].
    pub fn parse(bytes: &[u8]) -> Result<TableMetadata> {
        serde_json::from_slice(bytes)
            .map_err(|err| Error::MetadataParse(err.to_string()))
    }

    /// Serialize to the persisted JSON form.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Get the current schema of the table.
    pub fn current_schema(&self) -> Result<&Schema> {
        self.schema_by_id(self.current_schema_id)
    }

    /// Get a schema by id.
    pub fn schema_by_id(&self, schema_id: i32) -> Result<&Schema> {
        self.schemas
            .iter()
            .find(|schema| schema.schema_id == schema_id)
            .ok_or_else(|| Error::NotFound("Schema".to_string(), schema_id.to_string()))
    }

    /// Get the default partition spec for the table.
    pub fn default_partition_spec(&self) -> Result<&PartitionSpec> {
        self.partition_spec_by_id(self.default_spec_id)
    }

    /// Get a partition spec by id.
    pub fn partition_spec_by_id(&self, spec_id: i32) -> Result<&PartitionSpec> {
        self.partition_specs
            .iter()
            .find(|spec| spec.spec_id == spec_id)
            .ok_or_else(|| Error::NotFound("Partition spec".to_string(), spec_id.to_string()))
    }

    /// Get a sort order by id.
    pub fn sort_order_by_id(&self, order_id: i32) -> Result<&SortOrder> {
        self.sort_orders
            .iter()
            .find(|order| order.order_id == order_id)
            .ok_or_else(|| Error::NotFound("Sort order".to_string(), order_id.to_string()))
    }

    /// Get the current snapshot of the table, if it has one.
    pub fn current_snapshot(&self) -> Option<&Snapshot> {
        self.current_snapshot_id
            .and_then(|snapshot_id| self.snapshot_by_id(snapshot_id))
    }

    /// Get a snapshot by id.
    pub fn snapshot_by_id(&self, snapshot_id: i64) -> Option<&Snapshot> {
        self.snapshots
            .iter()
            .find(|snapshot| snapshot.snapshot_id == snapshot_id)
    }

    /// The snapshot a branch or tag points at.
    pub fn snapshot_by_ref(&self, ref_name: &str) -> Option<&Snapshot> {
        self.refs
            .get(ref_name)
            .and_then(|reference| self.snapshot_by_id(reference.snapshot_id))
    }

    /// All partition field ids used across the spec history, with the
    /// fields they belong to.
    fn partition_fields_by_id(&self) -> HashMap<i32, crate::model::partition::PartitionField> {
        let mut fields = HashMap::new();
        for spec in &self.partition_specs {
            for field in &spec.fields {
                fields.insert(field.field_id, field.clone());
            }
        }
        fields
    }
}

/// Applies mutation operations to produce a new [TableMetadata] version.
///
/// Every mutating call refreshes `last-updated-ms`. IDs are assigned
/// monotonically: sequence numbers by [add_snapshot](Self::add_snapshot),
/// partition field ids from `last-partition-id + 1`, schema and spec ids
/// from the highest existing id.
pub struct TableMetadataBuilder {
    metadata: TableMetadata,
    last_added_schema_id: Option<i32>,
    last_added_spec_id: Option<i32>,
    last_added_order_id: Option<i32>,
}

impl TableMetadataBuilder {
    /// Start building a brand new table.
    pub fn new(
        location: &str,
        schema: Schema,
        spec: PartitionSpec,
        sort_order: SortOrder,
        format_version: FormatVersion,
        properties: HashMap<String, String>,
    ) -> Result<Self> {
        schema.validate()?;
        let last_column_id = schema.highest_field_id();
        let last_partition_id = spec
            .fields
            .iter()
            .map(|field| field.field_id)
            .max()
            .unwrap_or(PARTITION_FIELD_ID_START - 1)
            .max(PARTITION_FIELD_ID_START - 1);
        let metadata = TableMetadata {
            format_version,
            table_uuid: Uuid::new_v4(),
            location: location.trim_end_matches('/').to_string(),
            last_sequence_number: 0,
            last_updated_ms: chrono::Utc::now().timestamp_millis(),
            last_column_id,
            current_schema_id: schema.schema_id,
            schemas: vec![schema],
            default_spec_id: spec.spec_id,
            partition_specs: vec![spec],
            last_partition_id,
            properties,
            current_snapshot_id: None,
            snapshots: vec![],
            snapshot_log: vec![],
            metadata_log: vec![],
            default_sort_order_id: sort_order.order_id,
            sort_orders: vec![sort_order],
            refs: HashMap::new(),
            next_row_id: match format_version {
                FormatVersion::V2 => None,
                FormatVersion::V3 => Some(0),
            },
        };
        Ok(TableMetadataBuilder {
            metadata,
            last_added_schema_id: None,
            last_added_spec_id: None,
            last_added_order_id: None,
        })
    }

    /// The base for create-table commits: no schemas, specs or orders yet.
    /// [build](Self::build) fails unless the applied updates add a schema,
    /// spec and sort order and make them current.
    pub fn empty(format_version: FormatVersion) -> Self {
        TableMetadataBuilder {
            metadata: TableMetadata {
                format_version,
                table_uuid: Uuid::new_v4(),
                location: String::new(),
                last_sequence_number: 0,
                last_updated_ms: chrono::Utc::now().timestamp_millis(),
                last_column_id: 0,
                schemas: vec![],
                current_schema_id: -1,
                partition_specs: vec![],
                default_spec_id: -1,
                last_partition_id: PARTITION_FIELD_ID_START - 1,
                properties: HashMap::new(),
                current_snapshot_id: None,
                snapshots: vec![],
                snapshot_log: vec![],
                metadata_log: vec![],
                sort_orders: vec![],
                default_sort_order_id: -1,
                refs: HashMap::new(),
                next_row_id: match format_version {
                    FormatVersion::V2 => None,
                    FormatVersion::V3 => Some(0),
                },
            },
            last_added_schema_id: None,
            last_added_spec_id: None,
            last_added_order_id: None,
        }
    }

    /// Start from an existing metadata version.
    pub fn from_metadata(metadata: TableMetadata) -> Self {
        TableMetadataBuilder {
            metadata,
            last_added_schema_id: None,
            last_added_spec_id: None,
            last_added_order_id: None,
        }
    }

    fn touch(&mut self) {
        self.metadata.last_updated_ms = chrono::Utc::now().timestamp_millis();
    }

    /// Assign a new table UUID.
    pub fn assign_uuid(&mut self, uuid: Uuid) -> Result<&mut Self> {
        self.metadata.table_uuid = uuid;
        self.touch();
        Ok(self)
    }

    /// Upgrade the format version. Downgrades are invalid.
    pub fn upgrade_format_version(&mut self, version: FormatVersion) -> Result<&mut Self> {
        if version < self.metadata.format_version {
            return Err(Error::Validation(format!(
                "cannot downgrade format version from {:?} to {:?}",
                self.metadata.format_version, version
            )));
        }
        if version == FormatVersion::V3 && self.metadata.next_row_id.is_none() {
            self.metadata.next_row_id = Some(0);
        }
        self.metadata.format_version = version;
        self.touch();
        Ok(self)
    }

    /// Set the table base location.
    pub fn set_location(&mut self, location: &str) -> Result<&mut Self> {
        self.metadata.location = location.trim_end_matches('/').to_string();
        self.touch();
        Ok(self)
    }

    /// Add a schema. `last_column_id` is the high-water mark the writer
    /// observed; the table tracks the maximum of it, the current mark, and
    /// the schema's own highest field id.
    pub fn add_schema(&mut self, schema: Schema, last_column_id: Option<i32>) -> Result<&mut Self> {
        schema.validate()?;
        let highest = schema.highest_field_id();
        if let Some(provided) = last_column_id {
            if provided < highest {
                return Err(Error::Validation(format!(
                    "last-column-id {provided} is below the schema's highest field id {highest}"
                )));
            }
        }

        // reuse the id of a structurally identical schema
        if let Some(existing) = self
            .metadata
            .schemas
            .iter()
            .find(|existing| existing.struct_fields == schema.struct_fields)
        {
            self.last_added_schema_id = Some(existing.schema_id);
            self.touch();
            return Ok(self);
        }

        let mut schema = schema;
        let taken: HashSet<i32> = self
            .metadata
            .schemas
            .iter()
            .map(|existing| existing.schema_id)
            .collect();
        if taken.contains(&schema.schema_id) {
            schema.schema_id = taken.iter().max().copied().unwrap_or(0) + 1;
        }

        self.metadata.last_column_id = self
            .metadata
            .last_column_id
            .max(highest)
            .max(last_column_id.unwrap_or(0));
        self.last_added_schema_id = Some(schema.schema_id);
        self.metadata.schemas.push(schema);
        self.touch();
        Ok(self)
    }

    /// Set the current schema. `-1` means the schema added last in this
    /// change set.
    pub fn set_current_schema(&mut self, schema_id: i32) -> Result<&mut Self> {
        let schema_id = if schema_id == -1 {
            self.last_added_schema_id.ok_or_else(|| {
                Error::Validation("set-current-schema -1 without a prior add-schema".to_string())
            })?
        } else {
            schema_id
        };
        self.metadata.schema_by_id(schema_id)?;
        self.metadata.current_schema_id = schema_id;
        self.touch();
        Ok(self)
    }

    /// Add a partition spec. Fields without an id (0) are assigned
    /// `last-partition-id + 1` in order.
    pub fn add_partition_spec(&mut self, spec: PartitionSpec) -> Result<&mut Self> {
        let mut spec = spec;
        let existing_fields = self.metadata.partition_fields_by_id();
        let mut existing_ids: HashSet<i32> = existing_fields.keys().copied().collect();

        for field in &mut spec.fields {
            if field.field_id == 0 {
                field.field_id = self.metadata.last_partition_id + 1;
                self.metadata.last_partition_id = field.field_id;
            } else if let Some(existing) = existing_fields.get(&field.field_id) {
                // a field id may recur across specs only for the same field
                if existing.source_id != field.source_id
                    || existing.transform != field.transform
                {
                    return Err(Error::Validation(format!(
                        "partition field id {} is already assigned to a different field",
                        field.field_id
                    )));
                }
            } else if field.field_id < PARTITION_FIELD_ID_START {
                return Err(Error::Validation(format!(
                    "partition field id {} is below {}",
                    field.field_id, PARTITION_FIELD_ID_START
                )));
            }
            if !existing_ids.insert(field.field_id)
                && !existing_fields.contains_key(&field.field_id)
            {
                return Err(Error::Validation(format!(
                    "duplicate partition field id {} in spec",
                    field.field_id
                )));
            }
            self.metadata.last_partition_id = self.metadata.last_partition_id.max(field.field_id);
        }

        if let Some(existing) = self
            .metadata
            .partition_specs
            .iter()
            .find(|existing| existing.fields == spec.fields)
        {
            self.last_added_spec_id = Some(existing.spec_id);
            self.touch();
            return Ok(self);
        }

        let taken: HashSet<i32> = self
            .metadata
            .partition_specs
            .iter()
            .map(|existing| existing.spec_id)
            .collect();
        if taken.contains(&spec.spec_id) {
            spec.spec_id = taken.iter().max().copied().unwrap_or(0) + 1;
        }
        self.last_added_spec_id = Some(spec.spec_id);
        self.metadata.partition_specs.push(spec);
        self.touch();
        Ok(self)
    }

    /// Set the default partition spec. `-1` means the spec added last.
    pub fn set_default_spec(&mut self, spec_id: i32) -> Result<&mut Self> {
        let spec_id = if spec_id == -1 {
            self.last_added_spec_id.ok_or_else(|| {
                Error::Validation("set-default-spec -1 without a prior add-spec".to_string())
            })?
        } else {
            spec_id
        };
        self.metadata.partition_spec_by_id(spec_id)?;
        self.metadata.default_spec_id = spec_id;
        self.touch();
        Ok(self)
    }

    /// Add a sort order.
    pub fn add_sort_order(&mut self, order: SortOrder) -> Result<&mut Self> {
        if let Some(existing) = self
            .metadata
            .sort_orders
            .iter()
            .find(|existing| existing.fields == order.fields)
        {
            self.last_added_order_id = Some(existing.order_id);
            self.touch();
            return Ok(self);
        }
        let mut order = order;
        let taken: HashSet<i32> = self
            .metadata
            .sort_orders
            .iter()
            .map(|existing| existing.order_id)
            .collect();
        if taken.contains(&order.order_id) {
            order.order_id = taken.iter().max().copied().unwrap_or(0) + 1;
        }
        self.last_added_order_id = Some(order.order_id);
        self.metadata.sort_orders.push(order);
        self.touch();
        Ok(self)
    }

    /// Set the default sort order. `-1` means the order added last.
    pub fn set_default_sort_order(&mut self, order_id: i32) -> Result<&mut Self> {
        let order_id = if order_id == -1 {
            self.last_added_order_id.ok_or_else(|| {
                Error::Validation(
                    "set-default-sort-order -1 without a prior add-sort-order".to_string(),
                )
            })?
        } else {
            order_id
        };
        self.metadata.sort_order_by_id(order_id)?;
        self.metadata.default_sort_order_id = order_id;
        self.touch();
        Ok(self)
    }

    /// Add a snapshot. The sequence number is assigned here: the table's
    /// `last-sequence-number` is incremented and stamped onto the snapshot.
    /// For v3 tables the snapshot's `first-row-id` is the table's
    /// `next-row-id`, which advances by the snapshot's added rows.
    pub fn add_snapshot(&mut self, snapshot: Snapshot) -> Result<&mut Self> {
        if self.metadata.snapshot_by_id(snapshot.snapshot_id).is_some() {
            return Err(Error::AlreadyExists(
                "Snapshot".to_string(),
                snapshot.snapshot_id.to_string(),
            ));
        }
        if let Some(parent) = snapshot.parent_snapshot_id {
            if self.metadata.snapshot_by_id(parent).is_none() {
                return Err(Error::Validation(format!(
                    "parent snapshot {parent} does not exist"
                )));
            }
        }
        let mut snapshot = snapshot;
        self.metadata.last_sequence_number += 1;
        snapshot.sequence_number = self.metadata.last_sequence_number;
        if self.metadata.format_version >= FormatVersion::V3 {
            let next_row_id = self.metadata.next_row_id.unwrap_or(0);
            snapshot.first_row_id = Some(next_row_id);
            self.metadata.next_row_id = Some(next_row_id + snapshot.added_rows.unwrap_or(0));
        }
        self.metadata.snapshots.push(snapshot);
        self.touch();
        Ok(self)
    }

    /// Remove snapshots along with log entries and refs that point at them.
    pub fn remove_snapshots(&mut self, snapshot_ids: &[i64]) -> Result<&mut Self> {
        self.metadata
            .snapshots
            .retain(|snapshot| !snapshot_ids.contains(&snapshot.snapshot_id));
        self.metadata
            .snapshot_log
            .retain(|entry| !snapshot_ids.contains(&entry.snapshot_id));
        self.metadata
            .refs
            .retain(|_, reference| !snapshot_ids.contains(&reference.snapshot_id));
        if let Some(current) = self.metadata.current_snapshot_id {
            if snapshot_ids.contains(&current) {
                self.metadata.current_snapshot_id = None;
            }
        }
        self.touch();
        Ok(self)
    }

    /// Set a branch or tag. Moving `main` also moves the current snapshot
    /// and appends to the snapshot log.
    pub fn set_ref(&mut self, ref_name: &str, reference: SnapshotReference) -> Result<&mut Self> {
        if self.metadata.snapshot_by_id(reference.snapshot_id).is_none() {
            return Err(Error::Validation(format!(
                "ref {} points at missing snapshot {}",
                ref_name, reference.snapshot_id
            )));
        }
        if ref_name == MAIN_BRANCH {
            self.metadata.current_snapshot_id = Some(reference.snapshot_id);
            self.metadata.snapshot_log.push(SnapshotLog {
                snapshot_id: reference.snapshot_id,
                timestamp_ms: chrono::Utc::now().timestamp_millis(),
            });
        }
        self.metadata.refs.insert(ref_name.to_string(), reference);
        self.touch();
        Ok(self)
    }

    /// Remove a branch or tag. Removing `main` clears the current snapshot.
    pub fn remove_ref(&mut self, ref_name: &str) -> Result<&mut Self> {
        if self.metadata.refs.remove(ref_name).is_none() {
            return Err(Error::NotFound("Ref".to_string(), ref_name.to_string()));
        }
        if ref_name == MAIN_BRANCH {
            self.metadata.current_snapshot_id = None;
        }
        self.touch();
        Ok(self)
    }

    /// Set table properties, overwriting existing keys.
    pub fn set_properties(&mut self, updates: HashMap<String, String>) -> Result<&mut Self> {
        self.metadata.properties.extend(updates);
        self.touch();
        Ok(self)
    }

    /// Remove table properties. Missing keys are ignored.
    pub fn remove_properties(&mut self, removals: &[String]) -> Result<&mut Self> {
        for key in removals {
            self.metadata.properties.remove(key);
        }
        self.touch();
        Ok(self)
    }

    /// Record the previous metadata file in the metadata log.
    pub fn push_metadata_log(&mut self, metadata_file: &str, timestamp_ms: i64) -> &mut Self {
        self.metadata.metadata_log.push(MetadataLog {
            metadata_file: metadata_file.to_string(),
            timestamp_ms,
        });
        self
    }

    /// Validate cross-references and produce the new metadata.
    pub fn build(self) -> Result<TableMetadata> {
        let metadata = self.metadata;
        if metadata.location.is_empty() {
            return Err(Error::Validation("table location is not set".to_string()));
        }
        metadata.current_schema()?;
        metadata.default_partition_spec()?;
        metadata.sort_order_by_id(metadata.default_sort_order_id)?;
        if let Some(current) = metadata.current_snapshot_id {
            if metadata.snapshot_by_id(current).is_none() {
                return Err(Error::Validation(format!(
                    "current-snapshot-id {current} does not exist"
                )));
            }
        }
        for (name, reference) in &metadata.refs {
            if metadata.snapshot_by_id(reference.snapshot_id).is_none() {
                return Err(Error::Validation(format!(
                    "ref {} points at missing snapshot {}",
                    name, reference.snapshot_id
                )));
            }
        }
        for snapshot in &metadata.snapshots {
            if snapshot.sequence_number > metadata.last_sequence_number {
                return Err(Error::Validation(format!(
                    "snapshot {} has sequence number {} above last-sequence-number {}",
                    snapshot.snapshot_id, snapshot.sequence_number, metadata.last_sequence_number
                )));
            }
        }
        for schema in &metadata.schemas {
            if schema.highest_field_id() > metadata.last_column_id {
                return Err(Error::Validation(format!(
                    "schema {} exceeds last-column-id {}",
                    schema.schema_id, metadata.last_column_id
                )));
            }
        }
        Ok(metadata)
    }

    /// A read-only view of the metadata being built.
    pub fn metadata(&self) -> &TableMetadata {
        &self.metadata
    }
}
