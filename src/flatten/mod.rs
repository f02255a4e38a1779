//! Schema-driven JSON flattening
//!
//! Each model declares, per field, an alias path locating the value inside a
//! source document. The engine walks every document once, indexes only the
//! paths some model reads, and emits one validated, hashed row per model at
//! the node where that model's repeating context is complete.
//!
//! ## Pipeline
//!
//! - [`path`]: alias grammar (`root.items[*].sku`)
//! - [`plan`]: per-model specs and emission patterns, compiled once
//! - [`extractor`]: the single-pass walker and record builder ([`Flattener`])
//! - [`resolver`]: wildcard-to-index resolution at emission time
//! - [`validate`]: typing and nullability checks
//! - [`hash`]: deterministic row hashes

pub mod error;
pub mod extractor;
pub mod hash;
pub mod path;
pub mod plan;
pub mod resolver;
pub mod types;
pub mod validate;
pub mod writer;

pub use error::{ConfigError, FlattenError, PathError, ValidationError};
pub use extractor::{Flattener, IndexedPaths};
pub use hash::{RowHasher, Xxh3RowHasher};
pub use path::{AliasPath, Segment};
pub use plan::{EmissionPattern, FieldSpec, ModelSpec};
pub use types::{
    FieldDescriptor, FieldType, FieldValue, FlattenConfig, ModelDescriptor, RawRecord, Record,
    RecordField, ResultSet, RowHash,
};
pub use validate::{RecordValidator, SchemaValidator};
pub use writer::{RecordWriter, SingleWriter};
