/*!
Avro binary codec used for manifest files and manifest lists.

The codec produces byte-exact output for the subset of Avro that Iceberg
uses: primitives, fixed, enum, union, block-framed arrays and maps, records,
and the [Object Container File](ocf) framing. Table metadata itself is JSON
and does not go through this module.
*/

pub mod decode;
pub mod encode;
pub mod ocf;
pub mod schema;
pub mod value;

pub use decode::Decoder;
pub use ocf::{OcfReader, OcfWriter};
pub use schema::{AvroType, RecordField, RecordSchema};
pub use value::AvroValue;
