/*!
Details of [snapshots](https://iceberg.apache.org/spec/#snapshots) for a table.

A [Snapshot] contains a pointer to the manifest list as well as supporting data for the snapshot.

A [SnapshotReference] is a named pointer to a [Snapshot] stored in the refs field of the
table metadata. A reference is either a [Branch](SnapshotRetention::Branch) or a
[Tag](SnapshotRetention::Tag).

Snapshots are immutable once created; they are referenced until expired.
*/
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "lowercase")]
/// The type of operation in the snapshot, this allows
/// certain snapshots to be skipped during planning.
pub enum Operation {
    /// Only data files were added and no files were removed.
    Append,
    /// Data and delete files were added and removed without changing
    /// table data; i.e., compaction, changing the data file format,
    /// or relocating data files.
    Replace,
    /// Data and delete files were added and removed in a logical
    /// overwrite operation.
    Overwrite,
    /// Data files were removed and their contents logically deleted
    /// and/or delete files were added to delete rows.
    Delete,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
/// Summarises the changes in the snapshot.
pub struct Summary {
    /// The type of operation in the snapshot
    pub operation: Operation,
    /// Metric counters and other summary data, stringly typed per the spec.
    #[serde(flatten)]
    pub other: HashMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
/// A snapshot of the table state, format v2/v3.
pub struct Snapshot {
    /// A unique long ID, typically derived from a millisecond timestamp.
    pub snapshot_id: i64,
    /// The snapshot ID of the snapshot's parent.
    /// Omitted for any snapshot with no parent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_snapshot_id: Option<i64>,
    /// A monotonically increasing long that tracks the order of
    /// changes to a table.
    pub sequence_number: i64,
    /// A timestamp when the snapshot was created, used for garbage
    /// collection and table inspection.
    pub timestamp_ms: i64,
    /// The location of the manifest list for this snapshot that
    /// tracks manifest files with additional metadata.
    pub manifest_list: String,
    /// A string map that summarizes the snapshot changes, including operation.
    pub summary: Summary,
    /// ID of the table's current schema when the snapshot was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<i32>,
    /// The row id assigned to the first row added by this snapshot. Format v3.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_row_id: Option<i64>,
    /// Number of rows added by this snapshot. Format v3.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_rows: Option<i64>,
}

/// Generate a snapshot id from the current time with randomised low bits,
/// the way the reference implementation does.
pub fn generate_snapshot_id() -> i64 {
    let mut random = [0u8; 4];
    // falls back to the bare timestamp if the entropy source fails
    let _ = getrandom::getrandom(&mut random);
    let millis = chrono::Utc::now().timestamp_millis();
    (millis << 20) ^ (u32::from_le_bytes(random) as i64 & 0xfffff)
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
/// Iceberg tables keep track of branches and tags using snapshot references.
pub struct SnapshotReference {
    /// A reference's snapshot ID. The tagged snapshot or latest snapshot of a branch.
    pub snapshot_id: i64,
    #[serde(flatten)]
    /// The retention policy for the reference.
    pub retention: SnapshotRetention,
}

impl SnapshotReference {
    /// A branch with no retention overrides.
    pub fn branch(snapshot_id: i64) -> Self {
        SnapshotReference {
            snapshot_id,
            retention: SnapshotRetention::Branch {
                min_snapshots_to_keep: None,
                max_snapshot_age_ms: None,
                max_ref_age_ms: None,
            },
        }
    }

    /// Whether this reference is a branch.
    pub fn is_branch(&self) -> bool {
        matches!(self.retention, SnapshotRetention::Branch { .. })
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "lowercase", tag = "type")]
/// Retention policy field, which differs based on whether the reference
/// is a Branch or a Tag.
pub enum SnapshotRetention {
    #[serde(rename_all = "kebab-case")]
    /// A branch reference
    Branch {
        /// A positive number for the minimum number of snapshots to keep in a
        /// branch while expiring snapshots.
        #[serde(skip_serializing_if = "Option::is_none")]
        min_snapshots_to_keep: Option<i32>,
        /// A positive number for the max age of snapshots to keep when expiring,
        /// including the latest snapshot.
        #[serde(skip_serializing_if = "Option::is_none")]
        max_snapshot_age_ms: Option<i64>,
        /// A positive number for the max age of the snapshot reference to
        /// keep while expiring snapshots.
        #[serde(skip_serializing_if = "Option::is_none")]
        max_ref_age_ms: Option<i64>,
    },
    #[serde(rename_all = "kebab-case")]
    /// A tag reference.
    Tag {
        /// A positive number for the max age of the snapshot reference to
        /// keep while expiring snapshots.
        #[serde(skip_serializing_if = "Option::is_none")]
        max_ref_age_ms: Option<i64>,
    },
}
