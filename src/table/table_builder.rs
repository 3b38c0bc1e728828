/*!
Defining the [TableBuilder] struct for creating catalog tables.
*/

use std::collections::HashMap;
use std::sync::Arc;

use crate::catalog::identifier::TableIdentifier;
use crate::catalog::Catalog;
use crate::error::Result;
use crate::model::metadata::{FormatVersion, TableMetadataBuilder};
use crate::model::partition::PartitionSpec;
use crate::model::schema::Schema;
use crate::model::sort::SortOrder;
use crate::table::Table;

///Builder pattern to create a table
pub struct TableBuilder {
    identifier: TableIdentifier,
    catalog: Arc<dyn Catalog>,
    location: String,
    schema: Schema,
    partition_spec: PartitionSpec,
    sort_order: SortOrder,
    format_version: FormatVersion,
    properties: HashMap<String, String>,
}

impl TableBuilder {
    /// Creates a new [TableBuilder] for an unpartitioned, unsorted v2
    /// table with the given schema.
    pub fn new(
        identifier: TableIdentifier,
        location: &str,
        schema: Schema,
        catalog: Arc<dyn Catalog>,
    ) -> Result<Self> {
        schema.validate()?;
        Ok(TableBuilder {
            identifier,
            catalog,
            location: location.to_string(),
            schema,
            partition_spec: PartitionSpec::unpartitioned(),
            sort_order: SortOrder::unsorted(),
            format_version: FormatVersion::V2,
            properties: HashMap::new(),
        })
    }

    /// Sets a partition spec for the table.
    pub fn with_partition_spec(mut self, partition_spec: PartitionSpec) -> Self {
        self.partition_spec = partition_spec;
        self
    }

    /// Sets a sort order for the table.
    pub fn with_sort_order(mut self, sort_order: SortOrder) -> Self {
        self.sort_order = sort_order;
        self
    }

    /// Sets the format version. v3 tables start tracking row lineage.
    pub fn with_format_version(mut self, format_version: FormatVersion) -> Self {
        self.format_version = format_version;
        self
    }

    /// Adds table properties.
    pub fn with_properties(mut self, properties: HashMap<String, String>) -> Self {
        self.properties.extend(properties);
        self
    }

    /// Build the initial metadata and register the table in the catalog.
    pub async fn commit(self) -> Result<Table> {
        let metadata = TableMetadataBuilder::new(
            &self.location,
            self.schema,
            self.partition_spec,
            self.sort_order,
            self.format_version,
            self.properties,
        )?
        .build()?;
        let response = self
            .catalog
            .create_table(&self.identifier, metadata)
            .await?;
        Ok(Table::new(
            self.identifier,
            self.catalog,
            response.metadata,
            &response.metadata_location,
        ))
    }
}
