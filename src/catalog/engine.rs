/*!
The commit engine: the single serialization point for all table mutations.

A commit is a load → validate → apply → write cycle run under a per-table
lock. The metadata file is written with a conditional put and the catalog
pointer is advanced with compare-and-swap, so two engines racing on the same
table resolve to exactly one winner. Requirement failures are rebased onto
the observed state when every update in the commit is rebase-safe; otherwise
the commit fails with a conflict for the client to retry.
*/

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::lock::Mutex;
use object_store::{path::Path, ObjectStore, PutMode, PutOptions};

use crate::catalog::commit::{
    CommitTableRequest, CommitTableResponse, TableRequirement, TableUpdate,
};
use crate::catalog::identifier::TableIdentifier;
use crate::error::{Error, Result};
use crate::model::metadata::{FormatVersion, TableMetadata, TableMetadataBuilder};
use crate::util::strip_prefix;

/// Commits whose requirements keep failing are abandoned after this many
/// load → validate → write attempts.
pub const MAX_COMMIT_RETRIES: u32 = 4;

/// The catalog pointer store: maps a table to its current metadata file and
/// a version used for optimistic concurrency. Atomicity of the
/// compare-and-swap is the implementation's responsibility.
#[async_trait]
pub trait PointerStore: Send + Sync {
    /// The current metadata location and version of a table, or `None`
    /// when the table does not exist.
    async fn load_pointer(&self, table: &TableIdentifier) -> Result<Option<(String, u64)>>;

    /// Atomically advance the pointer from `expected_version` (None for
    /// table creation) to the new location and version. Returns false when
    /// the current version does not match.
    async fn compare_and_swap_pointer(
        &self,
        table: &TableIdentifier,
        expected_version: Option<u64>,
        new_location: &str,
        new_version: u64,
    ) -> Result<bool>;
}

/// The metadata file name for a version.
pub fn metadata_location(table_location: &str, version: u64) -> String {
    format!("{table_location}/metadata/v{version}.metadata.json")
}

/// The optional pointer hint file holding the current version.
pub fn version_hint_location(table_location: &str) -> String {
    format!("{table_location}/metadata/version-hint.text")
}

/// Commits table changes with optimistic concurrency.
pub struct CommitEngine {
    object_store: Arc<dyn ObjectStore>,
    pointers: Arc<dyn PointerStore>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CommitEngine {
    /// Create an engine over a storage backend and pointer store.
    pub fn new(object_store: Arc<dyn ObjectStore>, pointers: Arc<dyn PointerStore>) -> Self {
        CommitEngine {
            object_store,
            pointers,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The storage backend the engine writes metadata through.
    pub fn object_store(&self) -> Arc<dyn ObjectStore> {
        Arc::clone(&self.object_store)
    }

    // One lock per table; at most one table is locked per operation, so
    // there is no lock ordering to get wrong.
    async fn table_lock(&self, table: &TableIdentifier) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(table.to_string()).or_default())
    }

    /// Read and parse a metadata file.
    pub async fn read_metadata(&self, location: &str) -> Result<TableMetadata> {
        let bytes = self
            .object_store
            .get(&Path::from(strip_prefix(location)))
            .await?
            .bytes()
            .await?;
        TableMetadata::parse(&bytes)
    }

    /// Load the current state of a table.
    pub async fn load(&self, table: &TableIdentifier) -> Result<CommitTableResponse> {
        let (location, _) = self
            .pointers
            .load_pointer(table)
            .await?
            .ok_or_else(|| Error::NotFound("Table".to_string(), table.to_string()))?;
        let metadata = self.read_metadata(&location).await?;
        Ok(CommitTableResponse {
            metadata_location: location,
            metadata,
        })
    }

    /// Create a table from fully built metadata, failing if it exists.
    pub async fn create(
        &self,
        table: &TableIdentifier,
        metadata: TableMetadata,
    ) -> Result<CommitTableResponse> {
        let lock = self.table_lock(table).await;
        let _guard = lock.lock().await;
        if self.pointers.load_pointer(table).await?.is_some() {
            return Err(Error::AlreadyExists("Table".to_string(), table.to_string()));
        }
        let location = metadata_location(&metadata.location, 0);
        self.write_metadata(&location, &metadata).await?;
        let swapped = self
            .pointers
            .compare_and_swap_pointer(table, None, &location, 0)
            .await?;
        if !swapped {
            return Err(Error::AlreadyExists("Table".to_string(), table.to_string()));
        }
        self.write_version_hint(&metadata.location, 0).await;
        Ok(CommitTableResponse {
            metadata_location: location,
            metadata,
        })
    }

    /// Commit requirements and updates against a table.
    ///
    /// The per-table lock is held for the duration of one load → validate →
    /// write cycle and never across I/O back to the caller. Cancellation is
    /// safe up to the compare-and-swap; after a failed swap the staged file
    /// is removed best-effort.
    pub async fn commit(&self, request: CommitTableRequest) -> Result<CommitTableResponse> {
        let lock = self.table_lock(&request.identifier).await;
        let _guard = lock.lock().await;

        let mut requirements = request.requirements.clone();
        for attempt in 0..=MAX_COMMIT_RETRIES {
            let pointer = self.pointers.load_pointer(&request.identifier).await?;
            let current = match &pointer {
                Some((location, _)) => Some(self.read_metadata(location).await?),
                None => None,
            };
            if current.is_none()
                && !requirements
                    .iter()
                    .any(|r| matches!(r, TableRequirement::AssertCreate))
            {
                return Err(Error::NotFound(
                    "Table".to_string(),
                    request.identifier.to_string(),
                ));
            }

            // requirement validation runs on the loaded snapshot; no
            // suspension happens until the write below
            let failed = requirements.iter().find_map(|requirement| {
                requirement
                    .check(current.as_ref())
                    .err()
                    .map(|err| (requirement.clone(), err))
            });
            if let Some((failing, err)) = failed {
                // identity assertions are never rebased: a mismatch means
                // the table itself was created or replaced underneath us
                let rebasable = !matches!(
                    failing,
                    TableRequirement::AssertCreate | TableRequirement::AssertTableUuid { .. }
                );
                let rebase_safe = rebasable
                    && request.updates.iter().all(TableUpdate::is_rebase_safe);
                match &current {
                    Some(metadata) if rebase_safe => {
                        tracing::debug!(
                            table = %request.identifier,
                            attempt,
                            requirement = failing.kind(),
                            "rebasing stale requirements onto observed state"
                        );
                        requirements = requirements
                            .iter()
                            .map(|requirement| requirement.rebased(metadata))
                            .collect();
                        continue;
                    }
                    _ => return Err(err),
                }
            }

            let mut builder = match current {
                Some(metadata) => TableMetadataBuilder::from_metadata(metadata),
                None => TableMetadataBuilder::empty(FormatVersion::V2),
            };
            if let Some((previous_location, _)) = &pointer {
                let timestamp = builder.metadata().last_updated_ms;
                builder.push_metadata_log(previous_location, timestamp);
            }
            for update in request.updates.clone() {
                update.apply(&mut builder)?;
            }
            let metadata = builder.build()?;

            let version = pointer.as_ref().map(|(_, version)| version + 1).unwrap_or(0);
            let location = metadata_location(&metadata.location, version);
            match self.write_metadata(&location, &metadata).await {
                Ok(()) => {}
                Err(Error::ObjectStore(object_store::Error::AlreadyExists { .. })) => {
                    // another writer took this version's file name
                    tracing::warn!(table = %request.identifier, version, "metadata version already written, retrying");
                    continue;
                }
                Err(err) => return Err(err),
            }

            let expected = pointer.as_ref().map(|(_, version)| *version);
            match self
                .pointers
                .compare_and_swap_pointer(&request.identifier, expected, &location, version)
                .await
            {
                Ok(true) => {
                    self.write_version_hint(&metadata.location, version).await;
                    tracing::debug!(
                        table = %request.identifier,
                        version,
                        sequence = metadata.last_sequence_number,
                        "commit succeeded"
                    );
                    return Ok(CommitTableResponse {
                        metadata_location: location,
                        metadata,
                    });
                }
                Ok(false) => {
                    // the pointer moved under us; unstage and retry
                    let _ = self
                        .object_store
                        .delete(&Path::from(strip_prefix(&location)))
                        .await;
                    continue;
                }
                Err(err) => {
                    // the file is written but the pointer state is unknown
                    return Err(Error::CommitTransaction {
                        orphans: vec![location],
                        message: err.to_string(),
                    });
                }
            }
        }
        Err(Error::CommitRetryExhausted(MAX_COMMIT_RETRIES))
    }

    async fn write_metadata(&self, location: &str, metadata: &TableMetadata) -> Result<()> {
        let payload = metadata.to_json()?.into_bytes();
        self.object_store
            .put_opts(
                &Path::from(strip_prefix(location)),
                payload.into(),
                PutOptions::from(PutMode::Create),
            )
            .await?;
        Ok(())
    }

    // The hint file is advisory; failures to write it never fail a commit.
    async fn write_version_hint(&self, table_location: &str, version: u64) {
        let hint = version_hint_location(table_location);
        let _ = self
            .object_store
            .put(
                &Path::from(strip_prefix(&hint)),
                version.to_string().into_bytes().into(),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::memory::MemoryPointerStore;
    use crate::model::partition::PartitionSpec;
    use crate::model::schema::{FieldType, PrimitiveType, Schema, StructField, StructType};
    use crate::model::snapshot::{Operation, Snapshot, SnapshotReference, Summary};
    use crate::model::sort::SortOrder;
    use object_store::memory::InMemory;

    fn test_schema(schema_id: i32) -> Schema {
        Schema {
            schema_id,
            identifier_field_ids: None,
            struct_fields: StructType {
                fields: vec![StructField {
                    id: 1,
                    name: "id".to_string(),
                    required: true,
                    field_type: FieldType::Primitive(PrimitiveType::Long),
                    doc: None,
                    initial_default: None,
                    write_default: None,
                }],
            },
        }
    }

    fn test_metadata() -> TableMetadata {
        TableMetadataBuilder::new(
            "s3://bucket/wh/db/t",
            test_schema(0),
            PartitionSpec::unpartitioned(),
            SortOrder::unsorted(),
            FormatVersion::V2,
            HashMap::new(),
        )
        .unwrap()
        .build()
        .unwrap()
    }

    fn snapshot(snapshot_id: i64, parent: Option<i64>) -> Snapshot {
        Snapshot {
            snapshot_id,
            parent_snapshot_id: parent,
            sequence_number: 0,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            manifest_list: format!("s3://bucket/wh/db/t/metadata/snap-{snapshot_id}.avro"),
            summary: Summary {
                operation: Operation::Append,
                other: HashMap::new(),
            },
            schema_id: Some(0),
            first_row_id: None,
            added_rows: None,
        }
    }

    fn engine() -> CommitEngine {
        CommitEngine::new(
            Arc::new(InMemory::new()),
            Arc::new(MemoryPointerStore::default()),
        )
    }

    fn append_request(
        identifier: &TableIdentifier,
        snapshot_id: i64,
        parent: Option<i64>,
    ) -> CommitTableRequest {
        CommitTableRequest {
            identifier: identifier.clone(),
            requirements: vec![TableRequirement::AssertRefSnapshotId {
                r#ref: "main".to_string(),
                snapshot_id: parent,
            }],
            updates: vec![
                TableUpdate::AddSnapshot {
                    snapshot: snapshot(snapshot_id, parent),
                },
                TableUpdate::SetSnapshotRef {
                    ref_name: "main".to_string(),
                    reference: SnapshotReference::branch(snapshot_id),
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_append_commits_advance_sequence() {
        let engine = engine();
        let identifier = TableIdentifier::parse("db.t").unwrap();
        engine.create(&identifier, test_metadata()).await.unwrap();

        let first = engine
            .commit(append_request(&identifier, 1001, None))
            .await
            .unwrap();
        assert_eq!(first.metadata.current_snapshot_id, Some(1001));
        assert_eq!(first.metadata.last_sequence_number, 1);
        assert_eq!(first.metadata.snapshot_log.len(), 1);
        assert!(first.metadata_location.ends_with("v1.metadata.json"));

        let second = engine
            .commit(append_request(&identifier, 1002, Some(1001)))
            .await
            .unwrap();
        assert_eq!(second.metadata.current_snapshot_id, Some(1002));
        assert_eq!(second.metadata.last_sequence_number, 2);
        let loaded = engine.load(&identifier).await.unwrap();
        assert_eq!(loaded.metadata, second.metadata);
    }

    #[tokio::test]
    async fn test_stale_ref_requirement_conflicts() {
        let engine = engine();
        let identifier = TableIdentifier::parse("db.t").unwrap();
        engine.create(&identifier, test_metadata()).await.unwrap();
        engine
            .commit(append_request(&identifier, 1001, None))
            .await
            .unwrap();

        // a second writer that still believes main is unset
        let err = engine
            .commit(append_request(&identifier, 1002, None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CommitConflict { .. }));
        assert_eq!(err.status_code(), 409);

        let loaded = engine.load(&identifier).await.unwrap();
        assert_eq!(loaded.metadata.current_snapshot_id, Some(1001));
    }

    #[tokio::test]
    async fn test_concurrent_appends_one_wins() {
        let engine = Arc::new(engine());
        let identifier = TableIdentifier::parse("db.t").unwrap();
        engine.create(&identifier, test_metadata()).await.unwrap();

        let first = {
            let engine = Arc::clone(&engine);
            let request = append_request(&identifier, 2001, None);
            tokio::spawn(async move { engine.commit(request).await })
        };
        let second = {
            let engine = Arc::clone(&engine);
            let request = append_request(&identifier, 2002, None);
            tokio::spawn(async move { engine.commit(request).await })
        };
        let results = [first.await.unwrap(), second.await.unwrap()];
        let succeeded = results.iter().filter(|result| result.is_ok()).count();
        assert_eq!(succeeded, 1);
        let failed = results.iter().find(|result| result.is_err()).unwrap();
        assert!(matches!(
            failed.as_ref().unwrap_err(),
            Error::CommitConflict { .. }
        ));

        let loaded = engine.load(&identifier).await.unwrap();
        assert_eq!(loaded.metadata.last_sequence_number, 1);
    }

    #[tokio::test]
    async fn test_add_schema_rebases_over_stale_requirement() {
        let engine = engine();
        let identifier = TableIdentifier::parse("db.t").unwrap();
        engine.create(&identifier, test_metadata()).await.unwrap();
        // move the table forward so the stale assertion below fails
        engine
            .commit(append_request(&identifier, 1001, None))
            .await
            .unwrap();

        let mut evolved = test_schema(1);
        evolved.struct_fields.fields.push(StructField {
            id: 2,
            name: "payload".to_string(),
            required: false,
            field_type: FieldType::Primitive(PrimitiveType::Variant),
            doc: None,
            initial_default: None,
            write_default: None,
        });
        let response = engine
            .commit(CommitTableRequest {
                identifier: identifier.clone(),
                requirements: vec![
                    TableRequirement::AssertRefSnapshotId {
                        r#ref: "main".to_string(),
                        // stale: main points at 1001 now
                        snapshot_id: None,
                    },
                    TableRequirement::AssertDefaultSortOrderId {
                        default_sort_order_id: 99,
                    },
                ],
                updates: vec![TableUpdate::AddSchema {
                    schema: evolved,
                    last_column_id: Some(2),
                }],
            })
            .await
            .unwrap();
        assert_eq!(response.metadata.schemas.len(), 2);
        assert_eq!(response.metadata.last_column_id, 2);
        // the rebase must not have touched the branch
        assert_eq!(response.metadata.current_snapshot_id, Some(1001));
    }

    #[tokio::test]
    async fn test_table_uuid_mismatch_never_rebases() {
        let engine = engine();
        let identifier = TableIdentifier::parse("db.t").unwrap();
        engine.create(&identifier, test_metadata()).await.unwrap();

        // the update set is rebase-safe, but identity assertions are not
        let err = engine
            .commit(CommitTableRequest {
                identifier: identifier.clone(),
                requirements: vec![TableRequirement::AssertTableUuid {
                    uuid: uuid::Uuid::new_v4(),
                }],
                updates: vec![TableUpdate::AddSchema {
                    schema: test_schema(1),
                    last_column_id: None,
                }],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CommitConflict { .. }));
    }

    #[tokio::test]
    async fn test_set_current_schema_to_missing_id_fails() {
        let engine = engine();
        let identifier = TableIdentifier::parse("db.t").unwrap();
        engine.create(&identifier, test_metadata()).await.unwrap();

        let err = engine
            .commit(CommitTableRequest {
                identifier: identifier.clone(),
                requirements: vec![],
                updates: vec![TableUpdate::SetCurrentSchema { schema_id: 42 }],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(..)));
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let engine = engine();
        let identifier = TableIdentifier::parse("db.t").unwrap();
        engine.create(&identifier, test_metadata()).await.unwrap();
        let err = engine.create(&identifier, test_metadata()).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(..)));
    }

    #[tokio::test]
    async fn test_commit_against_missing_table_fails() {
        let engine = engine();
        let identifier = TableIdentifier::parse("db.missing").unwrap();
        let err = engine
            .commit(append_request(&identifier, 1, None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(..)));
        assert_eq!(err.error_type(), "NoSuchTableException");
    }

    #[tokio::test]
    async fn test_metadata_files_are_versioned() {
        let engine = engine();
        let identifier = TableIdentifier::parse("db.t").unwrap();
        engine.create(&identifier, test_metadata()).await.unwrap();
        engine
            .commit(append_request(&identifier, 1001, None))
            .await
            .unwrap();
        let loaded = engine.load(&identifier).await.unwrap();
        assert!(loaded.metadata_location.ends_with("/metadata/v1.metadata.json"));
        // v0 is still readable and recorded in the metadata log
        assert_eq!(loaded.metadata.metadata_log.len(), 1);
        assert!(loaded.metadata.metadata_log[0]
            .metadata_file
            .ends_with("v0.metadata.json"));
    }
}
