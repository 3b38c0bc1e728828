/*!
Defines the different [Operation]s on a [Table](crate::table::Table).

Each operation turns into the requirement and updates it commits with;
appends additionally write the new manifest and manifest list before the
commit is attempted.
*/

use std::collections::HashMap;
use std::sync::Arc;

use object_store::{path::Path, ObjectStore};
use uuid::Uuid;

use crate::catalog::commit::{TableRequirement, TableUpdate};
use crate::error::Result;
use crate::model::manifest::{DataFile, ManifestEntry, ManifestWriter, Status};
use crate::model::manifest_list::{ManifestContent, ManifestListReader, ManifestListWriter};
use crate::model::metadata::{FormatVersion, TableMetadata};
use crate::model::partition::PartitionSpec;
use crate::model::schema::Schema;
use crate::model::snapshot::{generate_snapshot_id, Operation as SnapshotOperation, Snapshot, SnapshotReference, Summary};
use crate::model::sort::SortOrder;
use crate::util::strip_prefix;
use crate::variant::stats::CollectedStats;
use crate::variant::{assign_shredded_field_ids, parse_shred_configs};

///Table operations
pub enum Operation {
    /// Append new files to the table, with optional collected variant
    /// statistics per file.
    Append {
        /// The files to append and their shredded statistics.
        files: Vec<(DataFile, Option<CollectedStats>)>,
    },
    /// Add a schema.
    AddSchema {
        /// The schema to add and make current.
        schema: Schema,
        /// The writer's observed column-id high-water mark.
        last_column_id: Option<i32>,
    },
    /// Add a partition spec and make it the default.
    AddPartitionSpec(PartitionSpec),
    /// Set the default partition spec.
    SetDefaultSpec(i32),
    /// Add a sort order and make it the default.
    AddSortOrder(SortOrder),
    /// Update table properties.
    UpdateProperties(Vec<(String, String)>),
    /// Remove table properties.
    RemoveProperties(Vec<String>),
    /// Create or move a branch or tag.
    SetSnapshotRef(String, SnapshotReference),
    /// Expire snapshots.
    RemoveSnapshots(Vec<i64>),
    /// Move the table base location.
    SetLocation(String),
}

impl Operation {
    /// Execute the operation against a snapshot of the table state,
    /// producing the requirement and updates to commit plus the paths of
    /// any files written ahead of the commit.
    pub async fn execute(
        self,
        table_metadata: &TableMetadata,
        object_store: Arc<dyn ObjectStore>,
        branch: &str,
    ) -> Result<(Option<TableRequirement>, Vec<TableUpdate>, Vec<String>)> {
        match self {
            Operation::Append { files } => {
                append(files, table_metadata, object_store, branch).await
            }
            Operation::AddSchema {
                schema,
                last_column_id,
            } => Ok((
                None,
                vec![
                    TableUpdate::AddSchema {
                        schema,
                        last_column_id,
                    },
                    TableUpdate::SetCurrentSchema { schema_id: -1 },
                ],
                vec![],
            )),
            Operation::AddPartitionSpec(spec) => Ok((
                None,
                vec![
                    TableUpdate::AddSpec { spec },
                    TableUpdate::SetDefaultSpec { spec_id: -1 },
                ],
                vec![],
            )),
            Operation::SetDefaultSpec(spec_id) => {
                Ok((None, vec![TableUpdate::SetDefaultSpec { spec_id }], vec![]))
            }
            Operation::AddSortOrder(sort_order) => Ok((
                None,
                vec![
                    TableUpdate::AddSortOrder { sort_order },
                    TableUpdate::SetDefaultSortOrder { sort_order_id: -1 },
                ],
                vec![],
            )),
            Operation::UpdateProperties(entries) => Ok((
                None,
                vec![TableUpdate::SetProperties {
                    updates: entries.into_iter().collect(),
                }],
                vec![],
            )),
            Operation::RemoveProperties(removals) => Ok((
                None,
                vec![TableUpdate::RemoveProperties { removals }],
                vec![],
            )),
            Operation::SetSnapshotRef(ref_name, reference) => Ok((
                Some(TableRequirement::AssertRefSnapshotId {
                    r#ref: ref_name.clone(),
                    snapshot_id: table_metadata
                        .refs
                        .get(&ref_name)
                        .map(|existing| existing.snapshot_id),
                }),
                vec![TableUpdate::SetSnapshotRef {
                    ref_name,
                    reference,
                }],
                vec![],
            )),
            Operation::RemoveSnapshots(snapshot_ids) => Ok((
                None,
                vec![TableUpdate::RemoveSnapshots { snapshot_ids }],
                vec![],
            )),
            Operation::SetLocation(location) => {
                Ok((None, vec![TableUpdate::SetLocation { location }], vec![]))
            }
        }
    }
}

// Sum an old summary counter with this snapshot's contribution.
fn total(old_snapshot: Option<&Snapshot>, key: &str, added: i64) -> String {
    let previous = old_snapshot
        .and_then(|snapshot| snapshot.summary.other.get(key))
        .and_then(|value| value.parse::<i64>().ok())
        .unwrap_or(0);
    (previous + added).to_string()
}

async fn append(
    files: Vec<(DataFile, Option<CollectedStats>)>,
    table_metadata: &TableMetadata,
    object_store: Arc<dyn ObjectStore>,
    branch: &str,
) -> Result<(Option<TableRequirement>, Vec<TableUpdate>, Vec<String>)> {
    let old_snapshot = table_metadata.snapshot_by_ref(branch);
    let snapshot_id = generate_snapshot_id();
    let snapshot_uuid = Uuid::new_v4();
    // the sequence number this snapshot expects to commit with; entries
    // inherit it through their null sequence numbers
    let sequence_number = table_metadata.last_sequence_number + 1;

    let configs = parse_shred_configs(&table_metadata.properties)?;
    let shredded_ids = assign_shredded_field_ids(&configs, table_metadata.last_column_id + 1);

    let manifest_location = format!(
        "{}/metadata/{}-m0.avro",
        table_metadata.location, snapshot_uuid
    );
    let mut manifest_writer = ManifestWriter::new(
        &manifest_location,
        snapshot_id,
        sequence_number,
        table_metadata,
        ManifestContent::Data,
    )?;

    let mut added_files = 0i64;
    let mut added_records = 0i64;
    let mut added_files_size = 0i64;
    for (mut file, collected) in files {
        if let Some(collected) = collected {
            collected.apply_to(&mut file, &shredded_ids);
        }
        added_files += 1;
        added_records += file.record_count;
        added_files_size += file.file_size_in_bytes;
        manifest_writer.append(ManifestEntry {
            status: Status::Added,
            snapshot_id: Some(snapshot_id),
            sequence_number: None,
            file_sequence_number: None,
            data_file: file,
        })?;
    }
    let (manifest_bytes, list_entry) = manifest_writer.finish()?;
    object_store
        .put(
            &Path::from(strip_prefix(&manifest_location)),
            manifest_bytes.into(),
        )
        .await?;

    let mut list_writer = ManifestListWriter::new(table_metadata.format_version)?;
    if let Some(old_snapshot) = old_snapshot {
        let old_bytes = object_store
            .get(&Path::from(strip_prefix(&old_snapshot.manifest_list)))
            .await?
            .bytes()
            .await?;
        for entry in
            ManifestListReader::new(&old_bytes, table_metadata.format_version)?.into_entries()
        {
            list_writer.append(&entry)?;
        }
    }
    list_writer.append(&list_entry)?;
    let manifest_list_location = format!(
        "{}/metadata/snap-{}-{}.avro",
        table_metadata.location, snapshot_id, snapshot_uuid
    );
    object_store
        .put(
            &Path::from(strip_prefix(&manifest_list_location)),
            list_writer.into_bytes()?.into(),
        )
        .await?;
    tracing::debug!(
        snapshot_id,
        files = added_files,
        records = added_records,
        "staged append manifests"
    );

    let summary = Summary {
        operation: SnapshotOperation::Append,
        other: HashMap::from([
            ("added-data-files".to_string(), added_files.to_string()),
            ("added-records".to_string(), added_records.to_string()),
            (
                "added-files-size".to_string(),
                added_files_size.to_string(),
            ),
            (
                "total-data-files".to_string(),
                total(old_snapshot, "total-data-files", added_files),
            ),
            (
                "total-records".to_string(),
                total(old_snapshot, "total-records", added_records),
            ),
            (
                "total-files-size".to_string(),
                total(old_snapshot, "total-files-size", added_files_size),
            ),
        ]),
    };
    let snapshot = Snapshot {
        snapshot_id,
        parent_snapshot_id: old_snapshot.map(|snapshot| snapshot.snapshot_id),
        // assigned at commit time by the metadata builder
        sequence_number: 0,
        timestamp_ms: chrono::Utc::now().timestamp_millis(),
        manifest_list: manifest_list_location.clone(),
        summary,
        schema_id: Some(table_metadata.current_schema_id),
        first_row_id: None,
        added_rows: match table_metadata.format_version {
            FormatVersion::V2 => None,
            FormatVersion::V3 => Some(added_records),
        },
    };

    Ok((
        Some(TableRequirement::AssertRefSnapshotId {
            r#ref: branch.to_string(),
            snapshot_id: old_snapshot.map(|snapshot| snapshot.snapshot_id),
        }),
        vec![
            TableUpdate::AddSnapshot { snapshot },
            TableUpdate::SetSnapshotRef {
                ref_name: branch.to_string(),
                reference: SnapshotReference::branch(snapshot_id),
            },
        ],
        vec![manifest_location, manifest_list_location],
    ))
}
