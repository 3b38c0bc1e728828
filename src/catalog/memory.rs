/*!
An in-memory catalog over any [ObjectStore], for tests and embedding.

The pointer store holds `table → (metadata location, version)` under a
mutex, which makes its compare-and-swap trivially atomic. Namespaces are a
plain set with properties.
*/

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use futures::lock::Mutex;
use object_store::ObjectStore;

use crate::catalog::commit::{CommitTableRequest, CommitTableResponse};
use crate::catalog::engine::{CommitEngine, PointerStore};
use crate::catalog::identifier::TableIdentifier;
use crate::catalog::namespace::Namespace;
use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::model::metadata::TableMetadata;

/// A mutex-guarded pointer map.
#[derive(Default)]
pub struct MemoryPointerStore {
    pointers: Mutex<HashMap<String, (String, u64)>>,
}

impl MemoryPointerStore {
    async fn remove(&self, table: &TableIdentifier) -> Option<(String, u64)> {
        self.pointers.lock().await.remove(&table.to_string())
    }

    async fn rename(&self, from: &TableIdentifier, to: &TableIdentifier) -> Result<()> {
        let mut pointers = self.pointers.lock().await;
        if pointers.contains_key(&to.to_string()) {
            return Err(Error::AlreadyExists("Table".to_string(), to.to_string()));
        }
        match pointers.remove(&from.to_string()) {
            Some(pointer) => {
                pointers.insert(to.to_string(), pointer);
                Ok(())
            }
            None => Err(Error::NotFound("Table".to_string(), from.to_string())),
        }
    }

    async fn keys(&self) -> Vec<String> {
        self.pointers.lock().await.keys().cloned().collect()
    }
}

#[async_trait]
impl PointerStore for MemoryPointerStore {
    async fn load_pointer(&self, table: &TableIdentifier) -> Result<Option<(String, u64)>> {
        Ok(self.pointers.lock().await.get(&table.to_string()).cloned())
    }

    async fn compare_and_swap_pointer(
        &self,
        table: &TableIdentifier,
        expected_version: Option<u64>,
        new_location: &str,
        new_version: u64,
    ) -> Result<bool> {
        let mut pointers = self.pointers.lock().await;
        let key = table.to_string();
        let current = pointers.get(&key).map(|(_, version)| *version);
        if current != expected_version {
            return Ok(false);
        }
        pointers.insert(key, (new_location.to_string(), new_version));
        Ok(true)
    }
}

/// An in-memory implementation of [Catalog].
pub struct MemoryCatalog {
    engine: CommitEngine,
    pointers: Arc<MemoryPointerStore>,
    namespaces: Mutex<HashSet<Namespace>>,
}

impl MemoryCatalog {
    /// Create a catalog over the given storage backend.
    pub fn new(object_store: Arc<dyn ObjectStore>) -> Self {
        let pointers = Arc::new(MemoryPointerStore::default());
        MemoryCatalog {
            engine: CommitEngine::new(object_store, Arc::clone(&pointers) as Arc<dyn PointerStore>),
            pointers,
            namespaces: Mutex::new(HashSet::new()),
        }
    }

    async fn require_namespace(&self, namespace: &Namespace) -> Result<()> {
        if self.namespaces.lock().await.contains(namespace) {
            Ok(())
        } else {
            Err(Error::NotFound(
                "Namespace".to_string(),
                namespace.to_string(),
            ))
        }
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn create_namespace(&self, namespace: &Namespace) -> Result<()> {
        let mut namespaces = self.namespaces.lock().await;
        if !namespaces.insert(namespace.clone()) {
            return Err(Error::AlreadyExists(
                "Namespace".to_string(),
                namespace.to_string(),
            ));
        }
        Ok(())
    }

    async fn drop_namespace(&self, namespace: &Namespace) -> Result<()> {
        if !self.list_tables(namespace).await?.is_empty() {
            return Err(Error::NotEmpty(namespace.to_string()));
        }
        let mut namespaces = self.namespaces.lock().await;
        if !namespaces.remove(namespace) {
            return Err(Error::NotFound(
                "Namespace".to_string(),
                namespace.to_string(),
            ));
        }
        Ok(())
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        Ok(self.namespaces.lock().await.iter().cloned().collect())
    }

    async fn namespace_exists(&self, namespace: &Namespace) -> Result<bool> {
        Ok(self.namespaces.lock().await.contains(namespace))
    }

    async fn list_tables(&self, namespace: &Namespace) -> Result<Vec<TableIdentifier>> {
        let mut tables = Vec::new();
        for key in self.pointers.keys().await {
            let identifier = TableIdentifier::parse(&key)?;
            if identifier.namespace() == namespace {
                tables.push(identifier);
            }
        }
        Ok(tables)
    }

    async fn table_exists(&self, identifier: &TableIdentifier) -> Result<bool> {
        Ok(self.pointers.load_pointer(identifier).await?.is_some())
    }

    async fn create_table(
        &self,
        identifier: &TableIdentifier,
        metadata: TableMetadata,
    ) -> Result<CommitTableResponse> {
        self.require_namespace(identifier.namespace()).await?;
        self.engine.create(identifier, metadata).await
    }

    async fn register_table(
        &self,
        identifier: &TableIdentifier,
        metadata_location: &str,
    ) -> Result<CommitTableResponse> {
        self.require_namespace(identifier.namespace()).await?;
        let metadata = self.engine.read_metadata(metadata_location).await?;
        if self.pointers.load_pointer(identifier).await?.is_some() {
            return Err(Error::AlreadyExists(
                "Table".to_string(),
                identifier.to_string(),
            ));
        }
        let swapped = self
            .pointers
            .compare_and_swap_pointer(identifier, None, metadata_location, 0)
            .await?;
        if !swapped {
            return Err(Error::AlreadyExists(
                "Table".to_string(),
                identifier.to_string(),
            ));
        }
        Ok(CommitTableResponse {
            metadata_location: metadata_location.to_string(),
            metadata,
        })
    }

    async fn load_table(&self, identifier: &TableIdentifier) -> Result<CommitTableResponse> {
        self.engine.load(identifier).await
    }

    async fn drop_table(&self, identifier: &TableIdentifier) -> Result<()> {
        match self.pointers.remove(identifier).await {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(
                "Table".to_string(),
                identifier.to_string(),
            )),
        }
    }

    async fn rename_table(
        &self,
        from: &TableIdentifier,
        to: &TableIdentifier,
    ) -> Result<()> {
        self.require_namespace(to.namespace()).await?;
        self.pointers.rename(from, to).await
    }

    async fn update_table(&self, request: CommitTableRequest) -> Result<CommitTableResponse> {
        self.engine.commit(request).await
    }

    fn object_store(&self) -> Arc<dyn ObjectStore> {
        self.engine.object_store()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::metadata::{FormatVersion, TableMetadataBuilder};
    use crate::model::partition::PartitionSpec;
    use crate::model::schema::{FieldType, PrimitiveType, Schema, StructField, StructType};
    use crate::model::sort::SortOrder;
    use object_store::memory::InMemory;

    fn metadata() -> TableMetadata {
        TableMetadataBuilder::new(
            "s3://bucket/wh/db/t",
            Schema {
                schema_id: 0,
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
            },
            PartitionSpec::unpartitioned(),
            SortOrder::unsorted(),
            FormatVersion::V2,
            HashMap::new(),
        )
        .unwrap()
        .build()
        .unwrap()
    }

    fn catalog() -> MemoryCatalog {
        MemoryCatalog::new(Arc::new(InMemory::new()))
    }

    #[tokio::test]
    async fn test_namespace_lifecycle() {
        let catalog = catalog();
        let namespace = Namespace::try_new(&["db".to_string()]).unwrap();
        catalog.create_namespace(&namespace).await.unwrap();
        assert!(catalog.namespace_exists(&namespace).await.unwrap());
        assert!(matches!(
            catalog.create_namespace(&namespace).await.unwrap_err(),
            Error::AlreadyExists(..)
        ));
        catalog.drop_namespace(&namespace).await.unwrap();
        assert!(!catalog.namespace_exists(&namespace).await.unwrap());
    }

    #[tokio::test]
    async fn test_drop_non_empty_namespace_fails() {
        let catalog = catalog();
        let namespace = Namespace::try_new(&["db".to_string()]).unwrap();
        catalog.create_namespace(&namespace).await.unwrap();
        let identifier = TableIdentifier::parse("db.t").unwrap();
        catalog.create_table(&identifier, metadata()).await.unwrap();
        assert!(matches!(
            catalog.drop_namespace(&namespace).await.unwrap_err(),
            Error::NotEmpty(..)
        ));
    }

    #[tokio::test]
    async fn test_table_lifecycle() {
        let catalog = catalog();
        let namespace = Namespace::try_new(&["db".to_string()]).unwrap();
        catalog.create_namespace(&namespace).await.unwrap();
        let identifier = TableIdentifier::parse("db.t").unwrap();
        catalog.create_table(&identifier, metadata()).await.unwrap();

        assert!(catalog.table_exists(&identifier).await.unwrap());
        assert_eq!(catalog.list_tables(&namespace).await.unwrap().len(), 1);

        let renamed = TableIdentifier::parse("db.t2").unwrap();
        catalog.rename_table(&identifier, &renamed).await.unwrap();
        assert!(!catalog.table_exists(&identifier).await.unwrap());
        let loaded = catalog.load_table(&renamed).await.unwrap();
        assert_eq!(loaded.metadata.current_snapshot_id, None);

        catalog.drop_table(&renamed).await.unwrap();
        assert!(matches!(
            catalog.load_table(&renamed).await.unwrap_err(),
            Error::NotFound(..)
        ));
    }

    #[tokio::test]
    async fn test_create_in_missing_namespace_fails() {
        let catalog = catalog();
        let identifier = TableIdentifier::parse("db.t").unwrap();
        let err = catalog.create_table(&identifier, metadata()).await.unwrap_err();
        assert_eq!(err.error_type(), "NoSuchNamespaceException");
    }

    #[tokio::test]
    async fn test_register_existing_metadata() {
        let catalog = catalog();
        let namespace = Namespace::try_new(&["db".to_string()]).unwrap();
        catalog.create_namespace(&namespace).await.unwrap();
        let identifier = TableIdentifier::parse("db.t").unwrap();
        let created = catalog.create_table(&identifier, metadata()).await.unwrap();

        catalog.drop_table(&identifier).await.unwrap();
        let registered = catalog
            .register_table(&identifier, &created.metadata_location)
            .await
            .unwrap();
        assert_eq!(registered.metadata, created.metadata);
    }
}
