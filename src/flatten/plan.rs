//! Pre-computed model specs for schema-driven flattening
//!
//! Every model descriptor is compiled once into a [`ModelSpec`]: parsed
//! aliases, the canonical field order used for row hashing, and the emission
//! pattern telling the walker at which document node a row of the model is
//! complete. The walk itself never inspects descriptors again.

use crate::flatten::error::ConfigError;
use crate::flatten::path::{self, AliasPath, Segment};
use crate::flatten::types::{FieldType, FlattenConfig, ModelDescriptor};
use indexmap::IndexSet;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;

/// A validated model field
#[derive(Debug, Clone)]
pub struct FieldSpec {
    name: String,
    alias: AliasPath,
    field_type: FieldType,
    nullable: bool,
}

impl FieldSpec {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alias(&self) -> &AliasPath {
        &self.alias
    }

    pub fn alias_str(&self) -> &str {
        self.alias.as_str()
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn has_wildcard(&self) -> bool {
        self.alias.has_wildcard()
    }
}

/// Where in the document a model's rows are emitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmissionPattern {
    segments: Vec<Segment>,
    ambiguous: bool,
}

impl EmissionPattern {
    /// Derive the emission point from a model's aliases.
    ///
    /// With wildcards, rows are emitted at the deepest repeating container
    /// (first one wins on equal depth). Without, at the longest common parent
    /// prefix, comparing segments by key name only.
    pub fn derive(aliases: &[&AliasPath]) -> Self {
        let wildcard_parents: Vec<&[Segment]> = aliases
            .iter()
            .filter(|alias| alias.has_wildcard())
            .map(|alias| alias.parent())
            .collect();

        if !wildcard_parents.is_empty() {
            let deepest = wildcard_parents
                .iter()
                .copied()
                .fold(wildcard_parents[0], |deepest, parent| {
                    if parent.len() > deepest.len() {
                        parent
                    } else {
                        deepest
                    }
                });
            return EmissionPattern {
                segments: deepest.to_vec(),
                ambiguous: false,
            };
        }

        Self::common_prefix(aliases.iter().map(|alias| alias.parent()).collect())
    }

    fn common_prefix(parents: Vec<&[Segment]>) -> Self {
        let mut segments = Vec::new();
        let mut ambiguous = false;
        let Some(first) = parents.first() else {
            return EmissionPattern { segments, ambiguous };
        };
        let shortest = parents.iter().map(|p| p.len()).min().unwrap_or(0);

        for position in 0..shortest {
            let candidate = &first[position];
            if !parents.iter().all(|p| p[position].name() == candidate.name()) {
                break;
            }
            // Same key, different index: one pattern can't cover both.
            if parents.iter().any(|p| &p[position] != candidate) {
                ambiguous = true;
            }
            segments.push(candidate.clone());
        }

        EmissionPattern { segments, ambiguous }
    }

    /// True when fields disagreed on an index at a shared key, so the
    /// derived point silently favors the first declared field.
    pub fn is_ambiguous(&self) -> bool {
        self.ambiguous
    }

    fn compile(&self) -> Result<Regex, regex::Error> {
        Regex::new(&format!("^{}$", path::pattern_source(&self.segments)))
    }
}

impl fmt::Display for EmissionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&path::render(&self.segments))
    }
}

/// Immutable description of one target record type
#[derive(Debug, Clone)]
pub struct ModelSpec {
    name: String,
    fields: Vec<FieldSpec>,
    sorted_field_names: Vec<String>,
    emission: EmissionPattern,
    matcher: Regex,
}

impl ModelSpec {
    pub fn from_descriptor(
        descriptor: &ModelDescriptor,
        config: &FlattenConfig,
    ) -> Result<Self, ConfigError> {
        let model = descriptor.name.as_str();
        if descriptor.fields.is_empty() {
            return Err(ConfigError::EmptyModel {
                model: model.to_string(),
            });
        }

        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(descriptor.fields.len());
        for field in &descriptor.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(ConfigError::DuplicateField {
                    model: model.to_string(),
                    field: field.name.clone(),
                });
            }
            if field.name == config.hash_field {
                return Err(ConfigError::ReservedField {
                    model: model.to_string(),
                    field: field.name.clone(),
                });
            }

            let raw = match field.alias.as_deref() {
                Some(alias) if !alias.is_empty() => alias,
                _ => {
                    return Err(ConfigError::MissingAlias {
                        model: model.to_string(),
                        field: field.name.clone(),
                    })
                }
            };
            let alias = AliasPath::parse(raw).map_err(|source| ConfigError::InvalidAlias {
                model: model.to_string(),
                field: field.name.clone(),
                source,
            })?;
            if alias.segments().is_empty() {
                return Err(ConfigError::RootAlias {
                    model: model.to_string(),
                    field: field.name.clone(),
                    alias: raw.to_string(),
                });
            }

            fields.push(FieldSpec {
                name: field.name.clone(),
                alias,
                field_type: field.field_type,
                nullable: field.nullable,
            });
        }

        let mut sorted_field_names: Vec<String> = fields.iter().map(|f| f.name.clone()).collect();
        sorted_field_names.sort();

        let aliases: Vec<&AliasPath> = fields.iter().map(|f| &f.alias).collect();
        let emission = EmissionPattern::derive(&aliases);
        if emission.is_ambiguous() {
            tracing::warn!(
                model,
                pattern = %emission,
                "field aliases disagree on an index below the emission point; rows follow the first field"
            );
        }
        tracing::debug!(model, pattern = %emission, "derived emission pattern");

        let matcher = emission.compile().map_err(|source| ConfigError::Matcher {
            scope: format!("model '{model}'"),
            source,
        })?;

        Ok(ModelSpec {
            name: model.to_string(),
            fields,
            sorted_field_names,
            emission,
            matcher,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Field names in the canonical order used for row hashing
    pub fn sorted_field_names(&self) -> &[String] {
        &self.sorted_field_names
    }

    pub fn emission_pattern(&self) -> &EmissionPattern {
        &self.emission
    }

    pub fn emission_is_ambiguous(&self) -> bool {
        self.emission.is_ambiguous()
    }

    /// Whether an object at concrete `path` completes a row of this model
    pub fn emits_at(&self, path: &str) -> bool {
        self.matcher.is_match(path)
    }
}

/// Union matcher over every concrete path any model reads
#[derive(Debug, Clone)]
pub struct NeededPaths {
    matcher: Regex,
}

impl NeededPaths {
    pub fn compile(models: &[ModelSpec]) -> Result<Self, ConfigError> {
        let mut patterns = IndexSet::new();
        for field in models.iter().flat_map(ModelSpec::fields) {
            patterns.insert(path::pattern_source(field.alias.segments()));
            // Scalar lists are read whole from their container.
            if let Some(container) = field.alias.list_container() {
                patterns.insert(path::pattern_source(&container));
            }
        }

        let source = patterns.into_iter().collect::<Vec<_>>().join("|");
        let matcher = Regex::new(&format!("^(?:{source})$")).map_err(|source| {
            ConfigError::Matcher {
                scope: "needed paths".to_string(),
                source,
            }
        })?;

        Ok(NeededPaths { matcher })
    }

    pub fn contains(&self, path: &str) -> bool {
        self.matcher.is_match(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::types::FieldDescriptor;

    fn aliases(raw: &[&str]) -> Vec<AliasPath> {
        raw.iter().map(|a| AliasPath::parse(a).unwrap()).collect()
    }

    fn derive(raw: &[&str]) -> EmissionPattern {
        let parsed = aliases(raw);
        let refs: Vec<&AliasPath> = parsed.iter().collect();
        EmissionPattern::derive(&refs)
    }

    fn transaction_model() -> ModelDescriptor {
        ModelDescriptor::new(
            "InvoiceItemTransaction",
            vec![
                FieldDescriptor::new(
                    "tx_id",
                    "root.invoice_items[*].transactions[*].tx_id",
                    FieldType::String,
                ),
                FieldDescriptor::new(
                    "invoice_item_id",
                    "root.invoice_items[*].id",
                    FieldType::String,
                ),
                FieldDescriptor::new("invoice_id", "root.id", FieldType::String),
                FieldDescriptor::new(
                    "amount",
                    "root.invoice_items[*].transactions[*].amount",
                    FieldType::Float,
                ),
            ],
        )
    }

    #[test]
    fn test_deepest_wildcard_wins() {
        let pattern = derive(&[
            "root.invoice_items[*].id",
            "root.id",
            "root.invoice_items[*].transactions[*].tx_id",
        ]);
        assert_eq!(pattern.to_string(), "root.invoice_items[*].transactions[*]");
        assert!(!pattern.is_ambiguous());
    }

    #[test]
    fn test_equal_depth_keeps_first() {
        let pattern = derive(&["root.a[*].x", "root.b[*].y"]);
        assert_eq!(pattern.to_string(), "root.a[*]");
    }

    #[test]
    fn test_common_prefix_without_wildcards() {
        let pattern = derive(&["root.id", "root.geo.latitude", "root.geo.longitude"]);
        assert_eq!(pattern.to_string(), "root");

        let pattern = derive(&[
            "root.meta.geo.latitude",
            "root.meta.geo.longitude",
            "root.meta.name",
        ]);
        assert_eq!(pattern.to_string(), "root.meta");
        assert!(!pattern.is_ambiguous());
    }

    #[test]
    fn test_common_prefix_ignores_index_but_flags_it() {
        let pattern = derive(&["root.items[0].sku", "root.items[1].sku"]);
        assert_eq!(pattern.to_string(), "root.items[0]");
        assert!(pattern.is_ambiguous());
    }

    #[test]
    fn test_model_spec_compiles() {
        let config = FlattenConfig::default();
        let spec = ModelSpec::from_descriptor(&transaction_model(), &config).unwrap();

        assert_eq!(spec.name(), "InvoiceItemTransaction");
        assert_eq!(
            spec.sorted_field_names(),
            &["amount", "invoice_id", "invoice_item_id", "tx_id"]
        );
        assert!(spec.emits_at("root.invoice_items[0].transactions[1]"));
        assert!(!spec.emits_at("root.invoice_items[0]"));
        assert!(!spec.emits_at("root.invoice_items[0].transactions[1].meta"));
        assert!(spec.field("tx_id").unwrap().has_wildcard());
        assert!(!spec.field("invoice_id").unwrap().has_wildcard());
    }

    #[test]
    fn test_missing_alias_is_fatal() {
        let mut model = transaction_model();
        model.fields[1].alias = None;
        let err = ModelSpec::from_descriptor(&model, &FlattenConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingAlias { ref field, .. } if field == "invoice_item_id"
        ));

        model.fields[1].alias = Some(String::new());
        assert!(ModelSpec::from_descriptor(&model, &FlattenConfig::default()).is_err());
    }

    #[test]
    fn test_invalid_alias_is_fatal() {
        let mut model = transaction_model();
        model.fields[0].alias = Some("root.invoice_items[?].tx_id".to_string());
        let err = ModelSpec::from_descriptor(&model, &FlattenConfig::default()).unwrap_err();
        assert!(err.to_string().contains("tx_id"));
        assert!(matches!(err, ConfigError::InvalidAlias { .. }));
    }

    #[test]
    fn test_rejects_bad_field_sets() {
        let config = FlattenConfig::default();

        let empty = ModelDescriptor::new("Empty", vec![]);
        assert!(matches!(
            ModelSpec::from_descriptor(&empty, &config),
            Err(ConfigError::EmptyModel { .. })
        ));

        let mut dup = transaction_model();
        dup.fields.push(FieldDescriptor::new("tx_id", "root.other", FieldType::String));
        assert!(matches!(
            ModelSpec::from_descriptor(&dup, &config),
            Err(ConfigError::DuplicateField { .. })
        ));

        let reserved = ModelDescriptor::new(
            "Reserved",
            vec![FieldDescriptor::new("etl_row_hash", "root.hash", FieldType::String)],
        );
        assert!(matches!(
            ModelSpec::from_descriptor(&reserved, &config),
            Err(ConfigError::ReservedField { .. })
        ));

        let bare = ModelDescriptor::new(
            "Bare",
            vec![FieldDescriptor::new("doc", "root", FieldType::Json)],
        );
        assert!(matches!(
            ModelSpec::from_descriptor(&bare, &config),
            Err(ConfigError::RootAlias { .. })
        ));
    }

    #[test]
    fn test_needed_paths_cover_aliases_and_list_containers() {
        let tags = ModelDescriptor::new(
            "Tagged",
            vec![
                FieldDescriptor::new("id", "root.id", FieldType::String),
                FieldDescriptor::new("tags", "root.tags[*]", FieldType::String),
            ],
        );
        let config = FlattenConfig::default();
        let models = vec![
            ModelSpec::from_descriptor(&transaction_model(), &config).unwrap(),
            ModelSpec::from_descriptor(&tags, &config).unwrap(),
        ];
        let needed = NeededPaths::compile(&models).unwrap();

        assert!(needed.contains("root.id"));
        assert!(needed.contains("root.invoice_items[3].id"));
        assert!(needed.contains("root.invoice_items[0].transactions[12].amount"));
        assert!(needed.contains("root.tags"));
        assert!(needed.contains("root.tags[0]"));
        assert!(!needed.contains("root.invoice_items[0].sku"));
        assert!(!needed.contains("root.invoice_items[0]"));
        assert!(!needed.contains("root"));
    }
}
