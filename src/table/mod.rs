/*!
Defining the [Table] struct that represents an iceberg table.

A table is loaded metadata plus the catalog it came from. Reads walk the
current snapshot's manifest list and manifests; mutations go through a
[Transaction](transaction::Transaction) which commits requirements and
updates back to the catalog.
*/

use std::sync::Arc;

use object_store::{path::Path, ObjectStore};
use serde_json::Value as Json;

use crate::catalog::identifier::TableIdentifier;
use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::model::manifest::{ManifestEntry, ManifestReader};
use crate::model::manifest_list::{ManifestListEntry, ManifestListReader};
use crate::model::metadata::TableMetadata;
use crate::table::transaction::Transaction;
use crate::util::strip_prefix;
use crate::variant::filter::rewrite_filter;
use crate::variant::prune::{FileColumnStats, FilePruner};
use crate::variant::{parse_shred_configs, ShredConfig};

pub mod table_builder;
pub mod transaction;

///Iceberg table
pub struct Table {
    identifier: TableIdentifier,
    catalog: Arc<dyn Catalog>,
    metadata: TableMetadata,
    metadata_location: String,
}

impl Table {
    /// Create a table handle from already loaded state.
    pub fn new(
        identifier: TableIdentifier,
        catalog: Arc<dyn Catalog>,
        metadata: TableMetadata,
        metadata_location: &str,
    ) -> Self {
        Table {
            identifier,
            catalog,
            metadata,
            metadata_location: metadata_location.to_string(),
        }
    }

    /// Load a table from its catalog.
    pub async fn load(identifier: TableIdentifier, catalog: Arc<dyn Catalog>) -> Result<Table> {
        let response = catalog.load_table(&identifier).await?;
        Ok(Table {
            identifier,
            catalog,
            metadata: response.metadata,
            metadata_location: response.metadata_location,
        })
    }

    /// The table identifier.
    pub fn identifier(&self) -> &TableIdentifier {
        &self.identifier
    }

    /// The catalog this table belongs to.
    pub fn catalog(&self) -> Arc<dyn Catalog> {
        Arc::clone(&self.catalog)
    }

    /// The storage backend holding this table's files.
    pub fn object_store(&self) -> Arc<dyn ObjectStore> {
        self.catalog.object_store()
    }

    /// The current table metadata.
    pub fn metadata(&self) -> &TableMetadata {
        &self.metadata
    }

    /// The location of the current metadata file.
    pub fn metadata_location(&self) -> &str {
        &self.metadata_location
    }

    pub(crate) fn update_state(&mut self, metadata: TableMetadata, metadata_location: String) {
        self.metadata = metadata;
        self.metadata_location = metadata_location;
    }

    /// Start a transaction on the main branch.
    pub fn new_transaction(&mut self) -> Transaction<'_> {
        Transaction::new(self, None)
    }

    /// Start a transaction on a named branch.
    pub fn new_branch_transaction(&mut self, branch: &str) -> Transaction<'_> {
        Transaction::new(self, Some(branch))
    }

    /// The manifest list of the current snapshot. An unsnapshotted table
    /// has no manifests.
    pub async fn manifests(&self) -> Result<Vec<ManifestListEntry>> {
        let Some(snapshot) = self.metadata.current_snapshot() else {
            return Ok(vec![]);
        };
        let bytes = self
            .object_store()
            .get(&Path::from(strip_prefix(&snapshot.manifest_list)))
            .await?
            .bytes()
            .await?;
        Ok(ManifestListReader::new(&bytes, self.metadata.format_version)?.into_entries())
    }

    /// All manifest entries of the current snapshot.
    pub async fn files(&self) -> Result<Vec<ManifestEntry>> {
        let mut entries = Vec::new();
        for manifest in self.manifests().await? {
            let bytes = self
                .object_store()
                .get(&Path::from(strip_prefix(&manifest.manifest_path)))
                .await?
                .bytes()
                .await?;
            entries.extend(ManifestReader::new(&bytes)?.into_entries());
        }
        Ok(entries)
    }

    /// The variant shred configuration from table properties.
    pub fn shred_configs(&self) -> Result<Vec<ShredConfig>> {
        parse_shred_configs(&self.metadata.properties)
    }

    /// A pruner over the shredded statistics of this table. The shredded
    /// field-id block starts directly above `last-column-id`.
    pub fn pruner(&self) -> Result<FilePruner> {
        Ok(FilePruner::new(
            &self.shred_configs()?,
            self.metadata.last_column_id + 1,
        ))
    }

    /// Plan a scan: rewrite the user predicate onto shredded statistics
    /// paths and keep only the data files whose bounds might match.
    pub async fn plan_files(&self, filter: &Json) -> Result<Vec<ManifestEntry>> {
        let configs = self.shred_configs()?;
        let rewritten = rewrite_filter(filter, &configs);
        let pruner = self.pruner()?;
        let mut planned = Vec::new();
        for entry in self.files().await? {
            let stats = FileColumnStats::from(&entry.data_file);
            let decision = pruner.should_skip(&rewritten.filter, &stats);
            if decision.skip {
                tracing::debug!(
                    file = %entry.data_file.file_path,
                    reasons = ?decision.reasons,
                    "pruned data file"
                );
            } else {
                planned.push(entry);
            }
        }
        Ok(planned)
    }

    /// Refresh the table state from the catalog.
    pub async fn refresh(&mut self) -> Result<()> {
        let response = self.catalog.load_table(&self.identifier).await?;
        self.metadata = response.metadata;
        self.metadata_location = response.metadata_location;
        Ok(())
    }

    /// The current snapshot's manifest list location, if any.
    pub fn current_manifest_list(&self) -> Option<&str> {
        self.metadata
            .current_snapshot()
            .map(|snapshot| snapshot.manifest_list.as_str())
    }

    /// Fail unless the table's format version is at least `version`.
    pub fn require_format_version(
        &self,
        version: crate::model::metadata::FormatVersion,
    ) -> Result<()> {
        if self.metadata.format_version >= version {
            Ok(())
        } else {
            Err(Error::NotSupported(format!(
                "format version {:?} required, table is {:?}",
                version, self.metadata.format_version
            )))
        }
    }
}
