//! Alias path grammar
//!
//! An alias is `root` followed by zero or more `.segment`, where a segment is
//! one of:
//!
//! - `name` - a literal object key
//! - `name[*]` - any element of the array stored under `name`
//! - `name[n]` - the element at literal index `n`
//!
//! Aliases are tokenized once, when models are built. The walker produces
//! concrete paths in the same notation (`root.items[0].sku`), so a parsed
//! alias can be rendered back into a regex that matches the concrete paths it
//! stands for.

use crate::flatten::error::PathError;
use std::fmt;

/// The name every path starts with.
pub const ROOT: &str = "root";

/// A single dotted segment of an alias path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Literal(String),
    Wildcard(String),
    Index(String, usize),
}

impl Segment {
    /// The key this segment looks up, without any bracket suffix.
    pub fn name(&self) -> &str {
        match self {
            Segment::Literal(name) | Segment::Wildcard(name) | Segment::Index(name, _) => name,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Segment::Wildcard(_))
    }

    /// Regex source matching the concrete form of this segment.
    /// Wildcards match any digit run in index position.
    fn pattern_source(&self) -> String {
        let name = regex::escape(self.name());
        match self {
            Segment::Literal(_) => name,
            Segment::Wildcard(_) => format!(r"{name}\[\d+\]"),
            Segment::Index(_, index) => format!(r"{name}\[{index}\]"),
        }
    }

    fn parse(text: &str) -> Result<Self, (usize, String)> {
        let (name, open) = match text.find('[') {
            Some(at) => (&text[..at], Some(at)),
            None => (text, None),
        };

        if name.is_empty() {
            return Err((0, "empty segment name".to_string()));
        }
        if let Some(at) = name.find(']') {
            return Err((at, "unexpected ']'".to_string()));
        }

        let Some(open) = open else {
            return Ok(Segment::Literal(name.to_string()));
        };

        let Some(inner) = text[open + 1..].strip_suffix(']') else {
            return Err((text.len(), "expected ']' at end of segment".to_string()));
        };

        if inner == "*" {
            return Ok(Segment::Wildcard(name.to_string()));
        }
        if inner.is_empty() || !inner.bytes().all(|b| b.is_ascii_digit()) {
            return Err((
                open + 1,
                format!("expected '*' or digits inside brackets, found '{inner}'"),
            ));
        }

        inner
            .parse::<usize>()
            .map(|index| Segment::Index(name.to_string(), index))
            .map_err(|_| (open + 1, format!("index '{inner}' is out of range")))
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Literal(name) => write!(f, "{name}"),
            Segment::Wildcard(name) => write!(f, "{name}[*]"),
            Segment::Index(name, index) => write!(f, "{name}[{index}]"),
        }
    }
}

/// A parsed alias. `root` is implicit and not stored in `segments`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AliasPath {
    raw: String,
    segments: Vec<Segment>,
}

impl AliasPath {
    pub fn parse(alias: &str) -> Result<Self, PathError> {
        let mut parts = alias.split('.');
        let head = parts.next().unwrap_or_default();
        if head != ROOT {
            return Err(PathError::new(
                alias,
                0,
                format!("path must start with '{ROOT}'"),
            ));
        }

        let mut offset = head.len();
        let mut segments = Vec::new();
        for part in parts {
            // skip the dot
            offset += 1;
            let segment = Segment::parse(part)
                .map_err(|(at, reason)| PathError::new(alias, offset + at, reason))?;
            segments.push(segment);
            offset += part.len();
        }

        // Canonical spelling, so literal indices line up with walker paths.
        Ok(AliasPath {
            raw: render(&segments),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn has_wildcard(&self) -> bool {
        self.segments.iter().any(Segment::is_wildcard)
    }

    /// Segments of the container holding the addressed value: the alias
    /// without its final segment. Empty means the document root.
    pub fn parent(&self) -> &[Segment] {
        let end = self.segments.len().saturating_sub(1);
        &self.segments[..end]
    }

    /// For an alias ending in `name[*]`, the path of the list itself
    /// (`...name`). Earlier wildcards are kept and resolved later.
    pub fn list_container(&self) -> Option<Vec<Segment>> {
        match self.segments.split_last() {
            Some((Segment::Wildcard(name), rest)) => {
                let mut container = rest.to_vec();
                container.push(Segment::Literal(name.clone()));
                Some(container)
            }
            _ => None,
        }
    }
}

impl fmt::Display for AliasPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Render segments back into alias notation, `root` included.
pub fn render(segments: &[Segment]) -> String {
    let mut out = String::from(ROOT);
    for segment in segments {
        out.push('.');
        out.push_str(&segment.to_string());
    }
    out
}

/// Unanchored regex source for the concrete paths `segments` can stand for.
pub fn pattern_source(segments: &[Segment]) -> String {
    let mut out = regex::escape(ROOT);
    for segment in segments {
        out.push_str(r"\.");
        out.push_str(&segment.pattern_source());
    }
    out
}
