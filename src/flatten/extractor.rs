use crate::flatten::error::{ConfigError, FlattenError};
use crate::flatten::hash::{hash_record, RowHasher, Xxh3RowHasher};
use crate::flatten::path::ROOT;
use crate::flatten::plan::{FieldSpec, ModelSpec, NeededPaths};
use crate::flatten::resolver::ConcretePath;
use crate::flatten::types::{FlattenConfig, ModelDescriptor, RawRecord, Record, ResultSet};
use crate::flatten::validate::{json_kind, RecordValidator, SchemaValidator};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashSet;

/// Concrete path -> raw value for the paths some model reads, scoped to one
/// top-level document.
#[derive(Debug, Clone, Default)]
pub struct IndexedPaths<'a> {
    values: IndexMap<String, &'a Value>,
}

impl<'a> IndexedPaths<'a> {
    pub fn get(&self, path: &str) -> Option<&'a Value> {
        self.values.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Entries in the order the walker indexed them
    pub fn iter(&self) -> impl Iterator<Item = (&str, &'a Value)> + '_ {
        self.values.iter().map(|(path, value)| (path.as_str(), *value))
    }

    fn insert(&mut self, path: &str, value: &'a Value) {
        self.values.insert(path.to_string(), value);
    }
}

/// The schema-driven flattening engine
///
/// Built once from a list of model descriptors, then fed documents. Each
/// document is walked exactly once; rows are emitted at the object nodes
/// matching a model's emission pattern.
pub struct Flattener {
    models: Vec<ModelSpec>,
    needed: NeededPaths,
    config: FlattenConfig,
    validator: Box<dyn RecordValidator>,
    hasher: Box<dyn RowHasher>,
}

impl Flattener {
    pub fn new(models: &[ModelDescriptor], config: FlattenConfig) -> Result<Self, FlattenError> {
        let mut names = HashSet::new();
        let mut specs = Vec::with_capacity(models.len());
        for descriptor in models {
            if !names.insert(descriptor.name.as_str()) {
                return Err(ConfigError::DuplicateModel(descriptor.name.clone()).into());
            }
            specs.push(ModelSpec::from_descriptor(descriptor, &config)?);
        }
        let needed = NeededPaths::compile(&specs)?;

        Ok(Flattener {
            models: specs,
            needed,
            config,
            validator: Box::new(SchemaValidator),
            hasher: Box::new(Xxh3RowHasher),
        })
    }

    /// Replace the default [`SchemaValidator`]
    pub fn with_validator(mut self, validator: impl RecordValidator + 'static) -> Self {
        self.validator = Box::new(validator);
        self
    }

    /// Replace the default XXH3-128 row hasher
    pub fn with_hasher(mut self, hasher: impl RowHasher + 'static) -> Self {
        self.hasher = Box::new(hasher);
        self
    }

    pub fn config(&self) -> &FlattenConfig {
        &self.config
    }

    pub fn models(&self) -> &[ModelSpec] {
        &self.models
    }

    pub fn model(&self, name: &str) -> Option<&ModelSpec> {
        self.models.iter().find(|m| m.name() == name)
    }

    /// Flatten one document (an object) or a sequence of documents (an
    /// array of objects) into records for every model.
    ///
    /// Any validation failure aborts the whole call; no records are returned
    /// for any model in that case.
    pub fn parse(&self, input: &Value) -> Result<ResultSet, FlattenError> {
        let documents = match input {
            Value::Object(_) => std::slice::from_ref(input),
            Value::Array(items) => {
                let stray = items.iter().enumerate().find(|(_, v)| !v.is_object());
                if let Some((position, item)) = stray {
                    return Err(FlattenError::InputType {
                        found: format!("{} at array position {position}", json_kind(item)),
                    });
                }
                items.as_slice()
            }
            other => {
                return Err(FlattenError::InputType {
                    found: json_kind(other).to_string(),
                })
            }
        };

        let mut results = ResultSet::with_models(self.models.iter().map(ModelSpec::name));
        for (position, document) in documents.iter().enumerate() {
            let indexed = self.walk_document(document, Some(&mut results))?;
            tracing::debug!(document = position, indexed_paths = indexed.len(), "walked document");
        }

        Ok(results)
    }

    pub fn parse_str(&self, input: &str) -> Result<ResultSet, FlattenError> {
        let value: Value = serde_json::from_str(input)?;
        self.parse(&value)
    }

    /// Index one document without emitting records. Useful to see which
    /// paths the models pick up.
    pub fn index_document<'a>(&self, document: &'a Value) -> IndexedPaths<'a> {
        let mut walk = DocumentWalk {
            flattener: self,
            indexed: IndexedPaths::default(),
            results: None,
        };
        let mut path = String::from(ROOT);
        // Nothing can fail without emission.
        let _ = walk.walk(document, &mut path);
        walk.indexed
    }

    fn walk_document<'a>(
        &self,
        document: &'a Value,
        results: Option<&mut ResultSet>,
    ) -> Result<IndexedPaths<'a>, FlattenError> {
        let mut walk = DocumentWalk {
            flattener: self,
            indexed: IndexedPaths::default(),
            results,
        };
        let mut path = String::from(ROOT);
        walk.walk(document, &mut path)?;
        Ok(walk.indexed)
    }

    /// Assemble, validate and hash one row of `model` at concrete `path`.
    fn build_record(
        &self,
        model: &ModelSpec,
        path: &str,
        concrete: &ConcretePath<'_>,
        indexed: &IndexedPaths<'_>,
    ) -> Result<Record, FlattenError> {
        let mut raw = RawRecord::new(path);
        for field in model.fields() {
            raw.insert(field.alias_str(), field_value(field, concrete, indexed));
        }

        let record = self.validator.validate(model, &raw).map_err(|err| {
            tracing::error!(model = model.name(), path, error = %err, "record failed validation");
            err
        })?;

        let hash = hash_record(self.hasher.as_ref(), model.sorted_field_names(), &record);
        Ok(record.with_hash(hash))
    }
}

/// Raw value of `field` for the row emitted at `concrete`.
fn field_value(
    field: &FieldSpec,
    concrete: &ConcretePath<'_>,
    indexed: &IndexedPaths<'_>,
) -> Option<Value> {
    if !field.has_wildcard() {
        return indexed.get(field.alias_str()).cloned();
    }

    // `name[*]` over a list of scalars is one value, not one row per element.
    if let Some(container) = field.alias().list_container() {
        let list = concrete
            .resolve(&container)
            .and_then(|path| indexed.get(&path));
        if let Some(list @ Value::Array(items)) = list {
            if items.first().map_or(true, |first| !first.is_object()) {
                return Some(list.clone());
            }
        }
    }

    let resolved = concrete.resolve(field.alias().segments())?;
    indexed.get(&resolved).cloned()
}

/// State of one pass over one top-level document
struct DocumentWalk<'f, 'a, 'r> {
    flattener: &'f Flattener,
    indexed: IndexedPaths<'a>,
    results: Option<&'r mut ResultSet>,
}

impl<'f, 'a, 'r> DocumentWalk<'f, 'a, 'r> {
    fn walk(&mut self, value: &'a Value, path: &mut String) -> Result<(), FlattenError> {
        match value {
            Value::Object(map) => {
                let base = path.len();

                // Index direct children, then nested objects, then arrays, so
                // everything outside a repeating branch is visible to the rows
                // emitted inside it, whatever the key order.
                for (key, child) in map {
                    push_key(path, key);
                    self.record(path, child);
                    path.truncate(base);
                }
                for pass in [Value::is_object, Value::is_array] {
                    for (key, child) in map.iter().filter(|(_, child)| pass(child)) {
                        push_key(path, key);
                        self.walk(child, path)?;
                        path.truncate(base);
                    }
                }

                // Post-order: the whole subtree is indexed before emission.
                self.emit(path)?;
            }
            Value::Array(items) => {
                let base = path.len();
                for (index, child) in items.iter().enumerate() {
                    push_index(path, index);
                    self.record(path, child);
                    if is_container(child) {
                        self.walk(child, path)?;
                    }
                    path.truncate(base);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn record(&mut self, path: &str, value: &'a Value) {
        if self.flattener.needed.contains(path) {
            self.indexed.insert(path, value);
        }
    }

    fn emit(&mut self, path: &str) -> Result<(), FlattenError> {
        let Some(results) = self.results.as_deref_mut() else {
            return Ok(());
        };

        let mut concrete = None;
        for model in &self.flattener.models {
            if !model.emits_at(path) {
                continue;
            }
            let concrete = concrete.get_or_insert_with(|| ConcretePath::parse(path));
            let record = self
                .flattener
                .build_record(model, path, concrete, &self.indexed)?;
            results.push(record);
        }
        Ok(())
    }
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

fn push_key(path: &mut String, key: &str) {
    path.push('.');
    path.push_str(key);
}

fn push_index(path: &mut String, index: usize) {
    path.push('[');
    path.push_str(&index.to_string());
    path.push(']');
}
