/*!
Defines traits to communicate with an iceberg catalog.

The [Catalog] trait carries the request/response semantics behind the REST
surface: namespace CRUD and table create/load/commit/drop/rename/register.
[engine::CommitEngine] implements the commit protocol itself and is shared
by catalog implementations that bring their own [engine::PointerStore].
*/

pub mod commit;
pub mod engine;
pub mod identifier;
pub mod memory;
pub mod namespace;
pub mod permission;

use std::sync::Arc;

use async_trait::async_trait;
use object_store::ObjectStore;

use crate::catalog::commit::{CommitTableRequest, CommitTableResponse};
use crate::catalog::identifier::TableIdentifier;
use crate::catalog::namespace::Namespace;
use crate::error::Result;
use crate::model::metadata::TableMetadata;

/// Trait to create, load, mutate and drop tables in an iceberg catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Create a namespace.
    async fn create_namespace(&self, namespace: &Namespace) -> Result<()>;
    /// Drop a namespace. Fails with `NotEmpty` while it contains tables.
    async fn drop_namespace(&self, namespace: &Namespace) -> Result<()>;
    /// List all namespaces.
    async fn list_namespaces(&self) -> Result<Vec<Namespace>>;
    /// Whether the namespace exists.
    async fn namespace_exists(&self, namespace: &Namespace) -> Result<bool>;
    /// List the tables in a namespace.
    async fn list_tables(&self, namespace: &Namespace) -> Result<Vec<TableIdentifier>>;
    /// Whether the table exists.
    async fn table_exists(&self, identifier: &TableIdentifier) -> Result<bool>;
    /// Create a table from fully built metadata.
    async fn create_table(
        &self,
        identifier: &TableIdentifier,
        metadata: TableMetadata,
    ) -> Result<CommitTableResponse>;
    /// Register an existing metadata file as a table.
    async fn register_table(
        &self,
        identifier: &TableIdentifier,
        metadata_location: &str,
    ) -> Result<CommitTableResponse>;
    /// Load the current state of a table.
    async fn load_table(&self, identifier: &TableIdentifier) -> Result<CommitTableResponse>;
    /// Drop a table from the catalog. Data and metadata files are retained.
    async fn drop_table(&self, identifier: &TableIdentifier) -> Result<()>;
    /// Rename a table.
    async fn rename_table(&self, from: &TableIdentifier, to: &TableIdentifier) -> Result<()>;
    /// Commit requirements and updates against a table.
    async fn update_table(&self, request: CommitTableRequest) -> Result<CommitTableResponse>;
    /// The storage backend tables of this catalog live on.
    fn object_store(&self) -> Arc<dyn ObjectStore>;
}
