use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Number, Value};
use std::borrow::Cow;
use std::fmt;

/// Declared type of a model field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    /// RFC 3339 timestamp
    DateTime,
    /// Any JSON value, kept as-is
    Json,
}

/// A field as declared by the caller, before its alias is parsed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,

    /// Where the value lives in the source document, e.g. `root.items[*].sku`
    #[serde(default)]
    pub alias: Option<String>,

    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Whether an absent or null value is acceptable
    #[serde(default)]
    pub nullable: bool,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, alias: impl Into<String>, field_type: FieldType) -> Self {
        FieldDescriptor {
            name: name.into(),
            alias: Some(alias.into()),
            field_type,
            nullable: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// A target record type (one output table)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

impl ModelDescriptor {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        ModelDescriptor {
            name: name.into(),
            fields,
        }
    }
}

/// Configuration for the flattening engine
#[derive(Debug, Clone)]
pub struct FlattenConfig {
    /// Name of the column carrying the row hash in emitted rows
    pub hash_field: String,
}

impl Default for FlattenConfig {
    fn default() -> Self {
        FlattenConfig {
            hash_field: String::from("etl_row_hash"),
        }
    }
}

/// A coerced, typed field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    DateTime(DateTime<FixedOffset>),
    Json(Value),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Canonical text used for row hashing; `None` for null.
    pub fn canonical_text(&self) -> Option<Cow<'_, str>> {
        match self {
            FieldValue::Null => None,
            FieldValue::Boolean(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
            FieldValue::Integer(n) => Some(Cow::Owned(n.to_string())),
            FieldValue::Float(f) => Some(Cow::Owned(f.to_string())),
            FieldValue::Text(s) => Some(Cow::Borrowed(s)),
            FieldValue::DateTime(dt) => Some(Cow::Owned(dt.to_rfc3339())),
            FieldValue::Json(v) => Some(Cow::Owned(v.to_string())),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Boolean(b) => Value::Bool(*b),
            FieldValue::Integer(n) => Value::Number((*n).into()),
            FieldValue::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::DateTime(dt) => Value::String(dt.to_rfc3339()),
            FieldValue::Json(v) => v.clone(),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Null => serializer.serialize_none(),
            FieldValue::Boolean(b) => serializer.serialize_bool(*b),
            FieldValue::Integer(n) => serializer.serialize_i64(*n),
            FieldValue::Float(f) => serializer.serialize_f64(*f),
            FieldValue::Text(s) => serializer.serialize_str(s),
            FieldValue::DateTime(dt) => serializer.serialize_str(&dt.to_rfc3339()),
            FieldValue::Json(v) => v.serialize(serializer),
        }
    }
}

/// 128-bit content hash of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RowHash(pub u128);

impl fmt::Display for RowHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl Serialize for RowHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Raw, unvalidated field values gathered at one emission point, keyed by alias.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    path: String,
    values: IndexMap<String, Option<Value>>,
}

impl RawRecord {
    pub fn new(path: impl Into<String>) -> Self {
        RawRecord {
            path: path.into(),
            values: IndexMap::new(),
        }
    }

    /// The concrete document path of the emission event.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn insert(&mut self, alias: impl Into<String>, value: Option<Value>) {
        self.values.insert(alias.into(), value);
    }

    /// The value found at `alias`; `None` when the path was absent.
    pub fn get(&self, alias: &str) -> Option<&Value> {
        self.values.get(alias).and_then(Option::as_ref)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordField {
    pub name: String,
    pub alias: String,
    pub value: FieldValue,
}

/// One finalized row of a model
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// The model (table) this row belongs to
    pub model: String,

    /// Field values in model declaration order
    pub fields: Vec<RecordField>,

    /// Content hash, stamped after validation
    pub hash: Option<RowHash>,
}

impl Record {
    pub fn new(model: impl Into<String>, fields: Vec<RecordField>) -> Self {
        Record {
            model: model.into(),
            fields,
            hash: None,
        }
    }

    pub fn with_hash(mut self, hash: RowHash) -> Self {
        self.hash = Some(hash);
        self
    }

    /// Value of the field named `name`.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    /// Value of the field declared with `alias`.
    pub fn get_by_alias(&self, alias: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.alias == alias).map(|f| &f.value)
    }

    /// The row as a JSON object keyed by field name, hash column last.
    pub fn to_row(&self, hash_field: &str) -> Map<String, Value> {
        let mut row = Map::new();
        for field in &self.fields {
            row.insert(field.name.clone(), field.value.to_json());
        }
        if let Some(hash) = self.hash {
            row.insert(hash_field.to_string(), Value::String(hash.to_string()));
        }
        row
    }
}

/// Records produced by one parse call, grouped by model in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    records: IndexMap<String, Vec<Record>>,
}

impl ResultSet {
    /// An empty set with a (possibly empty) list for every model name.
    pub fn with_models<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        ResultSet {
            records: names
                .into_iter()
                .map(|name| (name.to_string(), Vec::new()))
                .collect(),
        }
    }

    pub fn push(&mut self, record: Record) {
        self.records
            .entry(record.model.clone())
            .or_default()
            .push(record);
    }

    pub fn get(&self, model: &str) -> &[Record] {
        self.records.get(model).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn counts(&self) -> Vec<(&str, usize)> {
        self.records
            .iter()
            .map(|(name, records)| (name.as_str(), records.len()))
            .collect()
    }

    pub fn total(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Record])> {
        self.records
            .iter()
            .map(|(name, records)| (name.as_str(), records.as_slice()))
    }

    /// Append `other` after the records already held, model by model.
    pub fn merge(&mut self, other: ResultSet) {
        for (name, records) in other.records {
            self.records.entry(name).or_default().extend(records);
        }
    }}
