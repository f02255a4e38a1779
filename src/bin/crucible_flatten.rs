//! crucible-flatten: Flatten nested JSON into typed tables driven by a model file
//!
//! Usage:
//!   # Read documents from a file, output to stdout
//!   crucible-flatten --models models.json invoices.json
//!
//!   # Read from stdin
//!   cat invoices.json | crucible-flatten --models models.json
//!
//!   # Process NDJSON, write one .jsonl file per model
//!   crucible-flatten --models models.json --ndjson events.jsonl --output-dir ./tables
//!
//! The models file is a JSON array of model descriptors:
//!
//!   [{"name": "Invoice", "fields": [
//!       {"name": "id", "alias": "root.id", "type": "string"},
//!       {"name": "latitude", "alias": "root.geo.latitude", "type": "float", "nullable": true}
//!   ]}]

// Use MiMalloc allocator for better performance (recommended by simd-json)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use crucible::{FlattenConfig, Flattener, ModelDescriptor, RecordWriter, ResultSet, SingleWriter};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Stdout};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "crucible-flatten")]
#[command(about = "Flatten nested JSON into typed tables", long_about = None)]
struct Args {
    /// Input file (use stdin if omitted)
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// JSON file with the model descriptors
    #[arg(long, short = 'm')]
    models: PathBuf,

    /// Process newline-delimited JSON (one document per line)
    #[arg(long)]
    ndjson: bool,

    /// Output directory for separate .jsonl files per model
    /// If omitted, writes to stdout as a single stream tagged with `_model`
    #[arg(long, short = 'o')]
    output_dir: Option<PathBuf>,

    /// Name of the row hash column (default: etl_row_hash)
    #[arg(long)]
    hash_field: Option<String>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,
}

/// Where flattened records go
enum Sink {
    Files(RecordWriter<BufWriter<File>>),
    Stream(SingleWriter<BufWriter<Stdout>>),
}

impl Sink {
    fn write(&mut self, results: &ResultSet) -> Result<()> {
        match self {
            Sink::Files(writer) => writer.write_results(results),
            Sink::Stream(writer) => writer.write_results(results),
        }
    }

    fn flush(&mut self) -> Result<()> {
        match self {
            Sink::Files(writer) => writer.flush(),
            Sink::Stream(writer) => writer.flush(),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = FlattenConfig::default();
    if let Some(hash_field) = args.hash_field {
        config.hash_field = hash_field;
    }

    let models_file = File::open(&args.models)
        .with_context(|| format!("Failed to open models file: {}", args.models.display()))?;
    let models: Vec<ModelDescriptor> = serde_json::from_reader(BufReader::new(models_file))
        .context("Failed to parse models file")?;
    let flattener = Flattener::new(&models, config)
        .context("Invalid model definitions")?;

    let hash_field = &flattener.config().hash_field;
    let mut sink = match &args.output_dir {
        Some(dir) => Sink::Files(RecordWriter::new_file_writer(dir, hash_field)?),
        None => Sink::Stream(SingleWriter::new(BufWriter::new(std::io::stdout()), hash_field)),
    };

    let reader = if let Some(file_path) = &args.input {
        let file = File::open(file_path)
            .with_context(|| format!("Failed to open input: {}", file_path.display()))?;
        Box::new(BufReader::new(file)) as Box<dyn Read>
    } else {
        Box::new(std::io::stdin()) as Box<dyn Read>
    };

    let counts = if args.ndjson {
        process_ndjson(reader, &flattener, &mut sink)?
    } else {
        process_document(reader, &flattener, &mut sink)?
    };
    sink.flush()?;

    for (model, count) in counts {
        eprintln!("{model}: {count} records");
    }

    Ok(())
}

/// Process one JSON value (an object or an array of objects) using SIMD-accelerated parsing
fn process_document(
    reader: Box<dyn Read>,
    flattener: &Flattener,
    sink: &mut Sink,
) -> Result<BTreeMap<String, usize>> {
    let mut content = Vec::new();
    let mut buf_reader = BufReader::new(reader);
    buf_reader.read_to_end(&mut content)?;

    // simd-json parses in place, so keep an untouched copy for the fallback
    let mut scratch = content.clone();
    let value: Value = match simd_json::serde::from_slice(&mut scratch) {
        Ok(value) => value,
        Err(err) => {
            tracing::debug!(error = %err, "SIMD parse failed, falling back to serde_json");
            serde_json::from_slice(&content).context("Failed to parse input JSON")?
        }
    };

    let results = flattener.parse(&value)?;
    sink.write(&results)?;
    Ok(tally(BTreeMap::new(), &results))
}

/// Process newline-delimited JSON, flattening each line on its own
fn process_ndjson(
    reader: Box<dyn Read>,
    flattener: &Flattener,
    sink: &mut Sink,
) -> Result<BTreeMap<String, usize>> {
    let mut counts = BTreeMap::new();

    for (number, line) in BufReader::new(reader).lines().enumerate() {
        let line = line.context("Failed to read line")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let value: Value = serde_json::from_str(line)
            .with_context(|| format!("Failed to parse JSON on line {}", number + 1))?;
        let results = flattener
            .parse(&value)
            .with_context(|| format!("Failed to flatten line {}", number + 1))?;
        sink.write(&results)?;
        counts = tally(counts, &results);
    }

    Ok(counts)
}

fn tally(mut counts: BTreeMap<String, usize>, results: &ResultSet) -> BTreeMap<String, usize> {
    for (model, count) in results.counts() {
        *counts.entry(model.to_string()).or_insert(0) += count;
    }
    counts
}
