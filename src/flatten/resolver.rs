//! Wildcard resolution
//!
//! Substitutes each `name[*]` segment of an alias with the concrete index
//! active at the current walk position, so a field under
//! `items[*].transactions[*]` reads from the item and transaction the walker
//! is actually standing in.

use crate::flatten::path::{Segment, ROOT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ConcreteSegment<'p> {
    text: &'p str,
    base: &'p str,
    index: Option<&'p str>,
}

impl<'p> ConcreteSegment<'p> {
    fn parse(text: &'p str) -> Self {
        let Some(open) = text.find('[') else {
            return ConcreteSegment {
                text,
                base: text,
                index: None,
            };
        };

        let index = text[open + 1..]
            .split_once(']')
            .map(|(digits, _)| digits)
            .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()));

        ConcreteSegment {
            text,
            base: &text[..open],
            index,
        }
    }
}

/// A walker-produced path such as `root.items[0].transactions[1]`, split once
/// so every field of a record can be resolved against it.
#[derive(Debug, Clone)]
pub struct ConcretePath<'p> {
    segments: Vec<ConcreteSegment<'p>>,
}

impl<'p> ConcretePath<'p> {
    pub fn parse(path: &'p str) -> Self {
        ConcretePath {
            segments: path.split('.').map(ConcreteSegment::parse).collect(),
        }
    }

    /// Resolve `alias` (segments below root) against this path.
    ///
    /// Literal segments advance through the concrete path when they match
    /// the segment under the cursor. A wildcard scans forward for the first
    /// segment with the same key that carries an index, takes that index and
    /// moves past it. Returns `None` when some wildcard finds no such segment.
    pub fn resolve(&self, alias: &[Segment]) -> Option<String> {
        let mut cursor = 0;
        if self.segments.first().is_some_and(|s| s.text == ROOT) {
            cursor = 1;
        }

        let mut resolved = String::from(ROOT);
        for segment in alias {
            resolved.push('.');
            match segment {
                Segment::Wildcard(name) => {
                    let (offset, index) = self.segments[cursor..]
                        .iter()
                        .enumerate()
                        .find_map(|(offset, s)| match s.index {
                            Some(index) if s.base == name => Some((offset, index)),
                            _ => None,
                        })?;
                    resolved.push_str(name);
                    resolved.push('[');
                    resolved.push_str(index);
                    resolved.push(']');
                    cursor += offset + 1;
                }
                literal => {
                    let text = literal.to_string();
                    if self.segments.get(cursor).is_some_and(|s| s.text == text) {
                        cursor += 1;
                    }
                    resolved.push_str(&text);
                }
            }
        }

        Some(resolved)
    }
}

/// One-shot form of [`ConcretePath::resolve`].
pub fn resolve_wildcards(alias: &[Segment], concrete_path: &str) -> Option<String> {
    ConcretePath::parse(concrete_path).resolve(alias)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::path::AliasPath;

    fn resolve(alias: &str, concrete: &str) -> Option<String> {
        let alias = AliasPath::parse(alias).unwrap();
        resolve_wildcards(alias.segments(), concrete)
    }

    #[test]
    fn test_single_wildcard() {
        assert_eq!(
            resolve("root.invoice_items[*].sku", "root.invoice_items[1]").as_deref(),
            Some("root.invoice_items[1].sku")
        );
    }

    #[test]
    fn test_nested_wildcards_take_ancestor_and_current_index() {
        assert_eq!(
            resolve(
                "root.invoice_items[*].transactions[*].tx_id",
                "root.invoice_items[1].transactions[0]"
            )
            .as_deref(),
            Some("root.invoice_items[1].transactions[0].tx_id")
        );
        // ancestor-only field resolved from the deeper emission point
        assert_eq!(
            resolve("root.invoice_items[*].id", "root.invoice_items[1].transactions[0]").as_deref(),
            Some("root.invoice_items[1].id")
        );
    }

    #[test]
    fn test_siblings_differ_only_in_innermost_index() {
        let alias = "root.orders[*].lines[*].amount";
        let first = resolve(alias, "root.orders[4].lines[0]").unwrap();
        let second = resolve(alias, "root.orders[4].lines[1]").unwrap();

        assert_eq!(first, "root.orders[4].lines[0].amount");
        assert_eq!(second, "root.orders[4].lines[1].amount");
    }

    #[test]
    fn test_wildcard_through_literal_segments() {
        assert_eq!(
            resolve("root.data.rows[*].value", "root.data.rows[7]").as_deref(),
            Some("root.data.rows[7].value")
        );
    }

    #[test]
    fn test_unmatched_wildcard_is_unresolved() {
        assert_eq!(resolve("root.items[*].sku", "root"), None);
        assert_eq!(resolve("root.items[*].sku", "root.other[0]"), None);
        assert_eq!(resolve("root.items[*].sku", "root.items"), None);
    }

    #[test]
    fn test_literal_index_passes_through() {
        assert_eq!(
            resolve("root.items[0].tags[*]", "root.items[0].tags[2]").as_deref(),
            Some("root.items[0].tags[2]")
        );
    }

    #[test]
    fn test_no_wildcards_is_identity() {
        assert_eq!(
            resolve("root.geo.latitude", "root.items[3]").as_deref(),
            Some("root.geo.latitude")
        );
    }
}
