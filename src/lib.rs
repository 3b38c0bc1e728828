#![deny(missing_docs)]
/*!
# Iceberg-core

Iceberg-core is a library implementing the core of the
[Apache Iceberg](https://iceberg.apache.org/) table format, versions 2 and 3.

The [model] package holds the data structures that serialise and deserialise
the table format: table metadata, schemas, partition specs, sort orders,
snapshots and manifests. The [avro] package is the binary codec behind
manifest files and manifest lists. The [catalog] package carries the atomic
commit protocol with optimistic concurrency and server-side rebase, plus the
namespace/table surface behind a REST catalog. The [variant] package
implements variant shredding: predicate rewriting, per-file statistics and
scan-time pruning. The [table] package ties them together for reading and
transactional writing.

Currently supported:
* Table metadata v2 and v3, including row lineage.
* Manifest files and manifest lists, readable by the reference engines.
* Atomic commits with requirements, updates and rebase.
* Variant shredding statistics and file pruning.
*/
pub mod avro;
pub mod catalog;
pub mod error;
pub mod model;
pub mod table;
pub mod util;
pub mod variant;

pub use error::{Error, Result};
pub use object_store;
