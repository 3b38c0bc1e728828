/*!
Defines the [Transaction] type that commits multiple [Operation]s atomically.

A transaction accumulates operations, stages their manifest files, and
commits the combined requirements and updates through the catalog in one
`updateTable` call. Either every operation lands in the new metadata
version or none does.
*/

use crate::catalog::commit::CommitTableRequest;
use crate::error::{Error, Result};
use crate::model::manifest::DataFile;
use crate::model::metadata::MAIN_BRANCH;
use crate::model::partition::PartitionSpec;
use crate::model::schema::Schema;
use crate::model::snapshot::SnapshotReference;
use crate::model::sort::SortOrder;
use crate::table::Table;
use crate::variant::stats::CollectedStats;

use self::operation::Operation;

pub mod operation;

/// Accumulates operations to commit against a table with ACID guarantees.
pub struct Transaction<'table> {
    table: &'table mut Table,
    branch: String,
    operations: Vec<Operation>,
}

impl<'table> Transaction<'table> {
    /// Create a transaction for the given table and branch; `None` targets
    /// `main`.
    pub fn new(table: &'table mut Table, branch: Option<&str>) -> Self {
        Transaction {
            table,
            branch: branch.unwrap_or(MAIN_BRANCH).to_string(),
            operations: vec![],
        }
    }

    /// Append data files to the table.
    pub fn append(mut self, files: Vec<DataFile>) -> Self {
        self.operations.push(Operation::Append {
            files: files.into_iter().map(|file| (file, None)).collect(),
        });
        self
    }

    /// Append data files along with their collected variant statistics.
    pub fn append_with_stats(mut self, files: Vec<(DataFile, CollectedStats)>) -> Self {
        self.operations.push(Operation::Append {
            files: files
                .into_iter()
                .map(|(file, stats)| (file, Some(stats)))
                .collect(),
        });
        self
    }

    /// Add a schema and make it current.
    pub fn update_schema(mut self, schema: Schema, last_column_id: Option<i32>) -> Self {
        self.operations.push(Operation::AddSchema {
            schema,
            last_column_id,
        });
        self
    }

    /// Add a partition spec and make it the default.
    pub fn update_spec(mut self, spec: PartitionSpec) -> Self {
        self.operations.push(Operation::AddPartitionSpec(spec));
        self
    }

    /// Set the default partition spec.
    pub fn set_default_spec(mut self, spec_id: i32) -> Self {
        self.operations.push(Operation::SetDefaultSpec(spec_id));
        self
    }

    /// Add a sort order and make it the default.
    pub fn update_sort_order(mut self, sort_order: SortOrder) -> Self {
        self.operations.push(Operation::AddSortOrder(sort_order));
        self
    }

    /// Update table properties.
    pub fn update_properties(mut self, entries: Vec<(String, String)>) -> Self {
        self.operations.push(Operation::UpdateProperties(entries));
        self
    }

    /// Remove table properties.
    pub fn remove_properties(mut self, keys: Vec<String>) -> Self {
        self.operations.push(Operation::RemoveProperties(keys));
        self
    }

    /// Create or move a branch or tag.
    pub fn set_snapshot_ref(mut self, name: &str, reference: SnapshotReference) -> Self {
        self.operations
            .push(Operation::SetSnapshotRef(name.to_string(), reference));
        self
    }

    /// Expire snapshots.
    pub fn remove_snapshots(mut self, snapshot_ids: Vec<i64>) -> Self {
        self.operations.push(Operation::RemoveSnapshots(snapshot_ids));
        self
    }

    /// Move the table base location.
    pub fn set_location(mut self, location: &str) -> Self {
        self.operations
            .push(Operation::SetLocation(location.to_string()));
        self
    }

    /// Commit the accumulated operations.
    ///
    /// Conflicts surface as [Error::CommitConflict] for the caller to
    /// re-read and retry; failures after manifests were staged surface as
    /// [Error::CommitTransaction] listing the orphaned paths.
    pub async fn commit(self) -> Result<()> {
        let object_store = self.table.object_store();
        let metadata = self.table.metadata().clone();

        let mut requirements = Vec::new();
        let mut updates = Vec::new();
        let mut written = Vec::new();
        for operation in self.operations {
            let (requirement, mut operation_updates, mut paths) = operation
                .execute(&metadata, object_store.clone(), &self.branch)
                .await?;
            if let Some(requirement) = requirement {
                // one assertion per ref is enough for the whole transaction
                if !requirements.contains(&requirement) {
                    requirements.push(requirement);
                }
            }
            updates.append(&mut operation_updates);
            written.append(&mut paths);
        }

        let request = CommitTableRequest {
            identifier: self.table.identifier().clone(),
            requirements,
            updates,
        };
        match self.table.catalog().update_table(request).await {
            Ok(response) => {
                self.table
                    .update_state(response.metadata, response.metadata_location);
                Ok(())
            }
            Err(err) => match err {
                Error::CommitConflict { .. } | Error::CommitRetryExhausted(_) => Err(err),
                err if written.is_empty() => Err(err),
                err => Err(Error::CommitTransaction {
                    orphans: written,
                    message: err.to_string(),
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use object_store::memory::InMemory;
    use serde_json::json;

    use crate::catalog::identifier::TableIdentifier;
    use crate::catalog::memory::MemoryCatalog;
    use crate::catalog::namespace::Namespace;
    use crate::catalog::Catalog;
    use crate::model::manifest::{DataFile, FileFormat, Status};
    use crate::model::schema::{FieldType, PrimitiveType, Schema, StructField, StructType};
    use crate::table::table_builder::TableBuilder;
    use crate::table::Table;
    use crate::variant::stats::VariantStatsCollector;
    use crate::variant::{
        field_types_property, shred_fields_property, SHRED_COLUMNS_PROPERTY,
    };

    fn schema() -> Schema {
        Schema {
            schema_id: 0,
            identifier_field_ids: None,
            struct_fields: StructType {
                fields: vec![
                    StructField {
                        id: 1,
                        name: "id".to_string(),
                        required: true,
                        field_type: FieldType::Primitive(PrimitiveType::Long),
                        doc: None,
                        initial_default: None,
                        write_default: None,
                    },
                    StructField {
                        id: 2,
                        name: "data".to_string(),
                        required: false,
                        field_type: FieldType::Primitive(PrimitiveType::Variant),
                        doc: None,
                        initial_default: None,
                        write_default: None,
                    },
                ],
            },
        }
    }

    async fn new_table() -> Table {
        let catalog: Arc<dyn Catalog> = Arc::new(MemoryCatalog::new(Arc::new(InMemory::new())));
        catalog
            .create_namespace(&Namespace::try_new(&["db".to_string()]).unwrap())
            .await
            .unwrap();
        TableBuilder::new(
            TableIdentifier::parse("db.events").unwrap(),
            "s3://bucket/wh/db/events",
            schema(),
            catalog,
        )
        .unwrap()
        .with_properties(HashMap::from([
            (SHRED_COLUMNS_PROPERTY.to_string(), "data".to_string()),
            (shred_fields_property("data"), "year".to_string()),
            (
                field_types_property("data"),
                r#"{"year": "int"}"#.to_string(),
            ),
        ]))
        .commit()
        .await
        .unwrap()
    }

    fn data_file(path: &str, rows: i64) -> DataFile {
        DataFile::new(path, FileFormat::Parquet, rows, rows * 128)
    }

    #[tokio::test]
    async fn test_append_then_load() {
        let mut table = new_table().await;
        table
            .new_transaction()
            .append(vec![
                data_file("s3://bucket/wh/db/events/data/f1.parquet", 100),
                data_file("s3://bucket/wh/db/events/data/f2.parquet", 50),
            ])
            .commit()
            .await
            .unwrap();

        assert_eq!(table.metadata().last_sequence_number, 1);
        let snapshot = table.metadata().current_snapshot().unwrap();
        assert_eq!(snapshot.sequence_number, 1);
        assert_eq!(
            snapshot.summary.other.get("added-records"),
            Some(&"150".to_string())
        );
        assert_eq!(table.metadata().snapshot_log.len(), 1);

        let files = table.files().await.unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|entry| entry.status == Status::Added));
    }

    #[tokio::test]
    async fn test_second_append_carries_manifests_forward() {
        let mut table = new_table().await;
        table
            .new_transaction()
            .append(vec![data_file(
                "s3://bucket/wh/db/events/data/f1.parquet",
                100,
            )])
            .commit()
            .await
            .unwrap();
        let first_snapshot = table.metadata().current_snapshot_id.unwrap();

        table
            .new_transaction()
            .append(vec![data_file(
                "s3://bucket/wh/db/events/data/f2.parquet",
                70,
            )])
            .commit()
            .await
            .unwrap();

        let snapshot = table.metadata().current_snapshot().unwrap();
        assert_eq!(snapshot.parent_snapshot_id, Some(first_snapshot));
        assert_eq!(snapshot.sequence_number, 2);
        assert_eq!(table.metadata().last_sequence_number, 2);
        assert_eq!(
            snapshot.summary.other.get("total-records"),
            Some(&"170".to_string())
        );
        assert_eq!(table.manifests().await.unwrap().len(), 2);
        assert_eq!(table.files().await.unwrap().len(), 2);
        // both log entries survive, in commit order
        assert_eq!(table.metadata().snapshot_log.len(), 2);
        assert_eq!(table.metadata().snapshot_log[0].snapshot_id, first_snapshot);
    }

    #[tokio::test]
    async fn test_append_with_stats_enables_pruning() {
        let mut table = new_table().await;

        let mut old_stats = VariantStatsCollector::new(table.shred_configs().unwrap()[0].clone());
        for year in [2000, 2005, 2010] {
            old_stats.observe(&json!({"year": year}));
        }
        let mut new_stats = VariantStatsCollector::new(table.shred_configs().unwrap()[0].clone());
        for year in [2021, 2022] {
            new_stats.observe(&json!({"year": year}));
        }
        table
            .new_transaction()
            .append_with_stats(vec![
                (
                    data_file("s3://bucket/wh/db/events/data/old.parquet", 3),
                    old_stats.finish(),
                ),
                (
                    data_file("s3://bucket/wh/db/events/data/new.parquet", 2),
                    new_stats.finish(),
                ),
            ])
            .commit()
            .await
            .unwrap();

        let planned = table
            .plan_files(&json!({"$data.year": {"$gt": 2020}}))
            .await
            .unwrap();
        assert_eq!(planned.len(), 1);
        assert!(planned[0].data_file.file_path.ends_with("new.parquet"));

        // the boundary year keeps the older file too
        let planned = table
            .plan_files(&json!({"$data.year": {"$gte": 2010}}))
            .await
            .unwrap();
        assert_eq!(planned.len(), 2);
    }

    #[tokio::test]
    async fn test_update_properties_roundtrip() {
        let mut table = new_table().await;
        table
            .new_transaction()
            .update_properties(vec![("owner".to_string(), "root".to_string())])
            .commit()
            .await
            .unwrap();
        assert_eq!(
            table.metadata().properties.get("owner"),
            Some(&"root".to_string())
        );
        table
            .new_transaction()
            .remove_properties(vec!["owner".to_string()])
            .commit()
            .await
            .unwrap();
        assert!(!table.metadata().properties.contains_key("owner"));
    }

    #[tokio::test]
    async fn test_schema_evolution_transaction() {
        let mut table = new_table().await;
        let mut evolved = schema();
        evolved.schema_id = 1;
        evolved.struct_fields.fields.push(StructField {
            id: 3,
            name: "region".to_string(),
            required: false,
            field_type: FieldType::Primitive(PrimitiveType::String),
            doc: None,
            initial_default: None,
            write_default: None,
        });
        table
            .new_transaction()
            .update_schema(evolved, Some(3))
            .commit()
            .await
            .unwrap();
        assert_eq!(table.metadata().current_schema_id, 1);
        assert_eq!(table.metadata().last_column_id, 3);
        assert_eq!(table.metadata().schemas.len(), 2);
    }

    #[tokio::test]
    async fn test_branch_transaction_leaves_main_alone() {
        let mut table = new_table().await;
        table
            .new_transaction()
            .append(vec![data_file(
                "s3://bucket/wh/db/events/data/f1.parquet",
                10,
            )])
            .commit()
            .await
            .unwrap();
        let main_snapshot = table.metadata().current_snapshot_id.unwrap();

        table
            .new_branch_transaction("audit")
            .append(vec![data_file(
                "s3://bucket/wh/db/events/data/audit.parquet",
                5,
            )])
            .commit()
            .await
            .unwrap();

        assert_eq!(table.metadata().current_snapshot_id, Some(main_snapshot));
        let audit = table.metadata().snapshot_by_ref("audit").unwrap();
        assert_ne!(audit.snapshot_id, main_snapshot);
        assert_eq!(audit.sequence_number, 2);
    }
}
