//! # Crucible - Schema-Driven JSON Flattening
//!
//! Flattens arbitrarily nested JSON documents into sets of typed, linked
//! records. Each target record type (model) declares, per field, an alias
//! path locating its value; parent/child links come from fields that share
//! the same ancestor alias.
//!
//! ## Quick Start
//!
//! ```rust
//! use crucible::{FieldDescriptor, FieldType, FlattenConfig, Flattener, ModelDescriptor};
//! use serde_json::json;
//!
//! # fn main() -> anyhow::Result<()> {
//! let models = vec![
//!     ModelDescriptor::new("User", vec![
//!         FieldDescriptor::new("id", "root.id", FieldType::Integer),
//!         FieldDescriptor::new("name", "root.name", FieldType::String),
//!     ]),
//!     ModelDescriptor::new("Post", vec![
//!         FieldDescriptor::new("user_id", "root.id", FieldType::Integer),
//!         FieldDescriptor::new("id", "root.posts[*].id", FieldType::Integer),
//!         FieldDescriptor::new("title", "root.posts[*].title", FieldType::String),
//!     ]),
//! ];
//!
//! let flattener = Flattener::new(&models, FlattenConfig::default())?;
//! let results = flattener.parse(&json!({
//!     "id": 1,
//!     "name": "Alice",
//!     "posts": [
//!         {"id": 10, "title": "First Post"},
//!         {"id": 11, "title": "Second Post"}
//!     ]
//! }))?;
//!
//! assert_eq!(results.get("User").len(), 1);
//! assert_eq!(results.get("Post").len(), 2);
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufWriter};

pub mod flatten;

// Re-export commonly used types for convenience
pub use flatten::{
    FieldDescriptor, FieldType, FieldValue, FlattenConfig, FlattenError, Flattener,
    ModelDescriptor, Record, RecordWriter, ResultSet, SingleWriter,
};

/// Main entry point: flatten a newline-delimited JSON stream into per-model files
///
/// Each line is parsed and flattened on its own; returns the number of
/// records written.
pub fn flatten_json<R: BufRead>(
    reader: R,
    writer: &mut RecordWriter<BufWriter<File>>,
    flattener: &Flattener,
) -> Result<usize> {
    let mut written = 0;

    for (number, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read line")?;
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(&line)
            .with_context(|| format!("Failed to parse JSON on line {}", number + 1))?;

        let results = flattener
            .parse(&value)
            .with_context(|| format!("Failed to flatten line {}", number + 1))?;
        written += results.total();
        writer.write_results(&results)?;
    }

    Ok(written)
}
