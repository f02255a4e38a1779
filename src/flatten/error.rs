use thiserror::Error;

/// An alias string that does not follow the path grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid alias path '{alias}' at byte {offset}: {reason}")]
pub struct PathError {
    pub alias: String,
    pub offset: usize,
    pub reason: String,
}

impl PathError {
    pub fn new(alias: &str, offset: usize, reason: impl Into<String>) -> Self {
        PathError {
            alias: alias.to_string(),
            offset,
            reason: reason.into(),
        }
    }
}

/// Problems with the model descriptors handed to [`crate::Flattener::new`].
///
/// All of these are raised while building the engine; an engine is never
/// returned in a half-configured state.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("alias (path) is required for field '{field}' in model '{model}'")]
    MissingAlias { model: String, field: String },

    #[error("field '{field}' in model '{model}' has an invalid alias: {source}")]
    InvalidAlias {
        model: String,
        field: String,
        source: PathError,
    },

    #[error("field '{field}' in model '{model}': alias '{alias}' must name a value below root")]
    RootAlias {
        model: String,
        field: String,
        alias: String,
    },

    #[error("model '{model}' declares no fields")]
    EmptyModel { model: String },

    #[error("model '{0}' is declared more than once")]
    DuplicateModel(String),

    #[error("field '{field}' is declared more than once in model '{model}'")]
    DuplicateField { model: String, field: String },

    #[error("field '{field}' in model '{model}' collides with the row hash field")]
    ReservedField { model: String, field: String },

    #[error("failed to compile path matcher for {scope}: {source}")]
    Matcher {
        scope: String,
        source: regex::Error,
    },
}

/// A record assembled at an emission point that failed type or nullability checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation error for model '{model}' at path {path}: field '{field}': {reason}")]
pub struct ValidationError {
    pub model: String,
    pub path: String,
    pub field: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum FlattenError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// The parse argument was neither an object nor an array of objects.
    #[error("input JSON must be an object or an array of objects, found {found}")]
    InputType { found: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
}
