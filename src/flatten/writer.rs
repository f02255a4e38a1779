use crate::flatten::types::ResultSet;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes records to JSON Lines files, one `<model>.jsonl` per model
pub struct RecordWriter<W: Write> {
    writers: HashMap<String, W>,
    output_dir: PathBuf,
    hash_field: String,
}

impl RecordWriter<BufWriter<File>> {
    /// Create a writer appending to files in `output_dir`
    pub fn new_file_writer<P: AsRef<Path>>(
        output_dir: P,
        hash_field: impl Into<String>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&output_dir)
            .context("Failed to create output directory")?;

        Ok(RecordWriter {
            writers: HashMap::new(),
            output_dir: output_dir.as_ref().to_path_buf(),
            hash_field: hash_field.into(),
        })
    }

    /// Write every record of `results` to its model's file
    pub fn write_results(&mut self, results: &ResultSet) -> Result<()> {
        for (model, records) in results.iter() {
            if records.is_empty() {
                continue;
            }

            let writer = match self.writers.entry(model.to_string()) {
                std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
                std::collections::hash_map::Entry::Vacant(entry) => {
                    let path = self.output_dir.join(format!("{model}.jsonl"));
                    let file = std::fs::OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&path)
                        .with_context(|| format!("Failed to open file: {}", path.display()))?;
                    entry.insert(BufWriter::new(file))
                }
            };

            for record in records {
                let json = serde_json::to_string(&record.to_row(&self.hash_field))
                    .context("Failed to serialize record")?;
                writeln!(writer, "{}", json)
                    .context("Failed to write record")?;
            }
        }
        Ok(())
    }
}

impl<W: Write> RecordWriter<W> {
    /// Flush all writers
    pub fn flush(&mut self) -> Result<()> {
        for writer in self.writers.values_mut() {
            writer.flush().context("Failed to flush writer")?;
        }
        Ok(())
    }
}

/// Writes records of all models to a single output, tagged with `_model`
pub struct SingleWriter<W: Write> {
    writer: W,
    hash_field: String,
}

impl<W: Write> SingleWriter<W> {
    pub fn new(writer: W, hash_field: impl Into<String>) -> Self {
        SingleWriter {
            writer,
            hash_field: hash_field.into(),
        }
    }

    pub fn write_results(&mut self, results: &ResultSet) -> Result<()> {
        for (model, records) in results.iter() {
            for record in records {
                let mut line = serde_json::Map::new();
                line.insert(
                    "_model".to_string(),
                    serde_json::Value::String(model.to_string()),
                );
                line.extend(record.to_row(&self.hash_field));

                let json = serde_json::to_string(&line)
                    .context("Failed to serialize record")?;
                writeln!(self.writer, "{}", json)
                    .context("Failed to write record")?;
            }
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush writer")
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::types::{FieldValue, Record, RecordField, RowHash};

    fn results() -> ResultSet {
        let mut results = ResultSet::with_models(["Invoice", "InvoiceItem"]);
        results.push(
            Record::new(
                "Invoice",
                vec![RecordField {
                    name: "id".to_string(),
                    alias: "root.id".to_string(),
                    value: FieldValue::Text("INV-1".to_string()),
                }],
            )
            .with_hash(RowHash(1)),
        );
        results
    }

    #[test]
    fn test_single_writer() {
        let mut writer = SingleWriter::new(Vec::new(), "etl_row_hash");
        writer.write_results(&results()).unwrap();

        let output = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(
            output,
            "{\"_model\":\"Invoice\",\"id\":\"INV-1\",\"etl_row_hash\":\"00000000000000000000000000000001\"}\n"
        );
    }

    #[test]
    fn test_file_writer_one_file_per_model() {
        let dir = std::env::temp_dir().join(format!("crucible-writer-{}", std::process::id()));
        let mut writer = RecordWriter::new_file_writer(&dir, "etl_row_hash").unwrap();
        writer.write_results(&results()).unwrap();
        writer.write_results(&results()).unwrap();
        writer.flush().unwrap();

        let invoices = std::fs::read_to_string(dir.join("Invoice.jsonl")).unwrap();
        assert_eq!(invoices.lines().count(), 2);
        assert!(invoices.contains("\"id\":\"INV-1\""));
        // no rows, no file
        assert!(!dir.join("InvoiceItem.jsonl").exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
