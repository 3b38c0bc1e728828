/*!
Data structures that model the Iceberg spec: table metadata, schemas,
partition specs, sort orders, snapshots, manifests and typed values.
*/

pub mod manifest;
pub mod manifest_list;
pub mod metadata;
pub mod partition;
pub mod schema;
pub mod snapshot;
pub mod sort;
pub mod values;
