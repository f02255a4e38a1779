//! Row content hashing
//!
//! A row hash depends only on a record's values taken in canonical
//! (sorted field name) order, so re-running the same input always yields the
//! same hashes and downstream loads can upsert on them.

use crate::flatten::types::{Record, RowHash};
use xxhash_rust::xxh3::xxh3_128;

/// Separator between field values in the canonical row text.
pub const DELIMITER: char = '|';

/// Fixed-width digest over the canonical row bytes.
pub trait RowHasher: Send + Sync {
    fn digest(&self, bytes: &[u8]) -> RowHash;
}

/// XXH3-128, the default row hasher
#[derive(Debug, Clone, Copy, Default)]
pub struct Xxh3RowHasher;

impl RowHasher for Xxh3RowHasher {
    fn digest(&self, bytes: &[u8]) -> RowHash {
        RowHash(xxh3_128(bytes))
    }
}

/// Join the record's values in `sorted_names` order.
///
/// Null or missing values contribute an empty segment. Backslashes and
/// delimiters inside values are escaped so distinct rows never collide on
/// their canonical text.
pub fn canonical_row(sorted_names: &[String], record: &Record) -> String {
    let mut out = String::new();
    for (position, name) in sorted_names.iter().enumerate() {
        if position > 0 {
            out.push(DELIMITER);
        }
        if let Some(text) = record.get(name).and_then(|value| value.canonical_text()) {
            push_escaped(&mut out, &text);
        }
    }
    out
}

pub fn hash_record(hasher: &dyn RowHasher, sorted_names: &[String], record: &Record) -> RowHash {
    hasher.digest(canonical_row(sorted_names, record).as_bytes())
}

fn push_escaped(out: &mut String, text: &str) {
    for c in text.chars() {
        if c == '\\' || c == DELIMITER {
            out.push('\\');
        }
        out.push(c);
    }
}
