//! Concrete syntax trees as produced by a parser artifact.
//!
//! A [`SyntaxNode`] is the raw Parse Result: it keeps anonymous tokens,
//! positions and error flags exactly as the parser reported them. The
//! runner normalizes it into a [`Tree`](crate::tree::Tree) before comparing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// A zero-based (row, column) position in the source text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Point {
    pub row: usize,
    pub column: usize,
}

impl Point {
    pub fn new(row: usize, column: usize) -> Self {
        Point { row, column }
    }
}

/// One node of a concrete syntax tree.
///
/// This is also the JSON wire format spoken by command artifacts, so every
/// field except `kind` has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxNode {
    pub kind: String,
    #[serde(default = "default_named")]
    pub named: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_missing: bool,
    #[serde(default)]
    pub start: Point,
    #[serde(default)]
    pub end: Point,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SyntaxNode>,
}

fn default_named() -> bool {
    true
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl SyntaxNode {
    /// A named node with no children and zero positions.
    pub fn named(kind: impl Into<String>) -> Self {
        SyntaxNode {
            kind: kind.into(),
            named: true,
            field: None,
            is_error: false,
            is_missing: false,
            start: Point::default(),
            end: Point::default(),
            children: Vec::new(),
        }
    }

    /// An anonymous token such as `"FROM"` or `"="`.
    pub fn anonymous(kind: impl Into<String>) -> Self {
        SyntaxNode {
            named: false,
            ..SyntaxNode::named(kind)
        }
    }

    /// An `ERROR` node wrapping whatever the parser could not place.
    pub fn error(children: Vec<SyntaxNode>) -> Self {
        SyntaxNode {
            is_error: true,
            children,
            ..SyntaxNode::named("ERROR")
        }
    }

    /// A zero-width node the parser inserted to recover.
    pub fn missing(kind: impl Into<String>) -> Self {
        SyntaxNode {
            is_missing: true,
            ..SyntaxNode::named(kind)
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_children(mut self, children: Vec<SyntaxNode>) -> Self {
        self.children = children;
        self
    }

    pub fn at(mut self, start: Point, end: Point) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// Levels of nesting, counting this node as one. Walks with an explicit
    /// stack so it is safe on trees too deep to recurse over.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 1)];
        while let Some((node, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            stack.extend(node.children.iter().map(|c| (c, depth + 1)));
        }
        deepest
    }

    /// True if this node or any descendant is an error or missing node.
    pub fn has_error(&self) -> bool {
        self.is_error || self.is_missing || self.children.iter().any(SyntaxNode::has_error)
    }
}

/// The capability every loaded parser artifact exposes.
///
/// Implementations must be deterministic: parsing the same text twice
/// yields the same tree. A parser is shared read-only across concurrently
/// running fixture checks, so `parse` takes `&self`.
#[async_trait]
pub trait GrammarParser: Send + Sync {
    /// Parse `source` into a concrete syntax tree.
    async fn parse(&self, source: &str) -> Result<SyntaxNode, ParseError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_defaults() {
        let node: SyntaxNode = serde_json::from_str(
            r#"{"kind":"source_file","children":[{"kind":"FROM","named":false},{"kind":"ERROR","is_error":true}]}"#,
        )
        .unwrap();
        assert!(node.named);
        assert_eq!(node.start, Point::default());
        assert!(!node.children[0].named);
        assert!(node.children[1].is_error);
        assert!(node.has_error());
    }

    #[test]
    fn serialization_omits_defaults() {
        let node = SyntaxNode::named("image_spec").with_field("image");
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["field"], "image");
        assert!(json.get("is_error").is_none());
        assert!(json.get("children").is_none());
    }

    #[test]
    fn depth_counts_the_deepest_branch() {
        let node = SyntaxNode::named("source_file").with_children(vec![
            SyntaxNode::named("comment"),
            SyntaxNode::named("from_instruction")
                .with_children(vec![SyntaxNode::named("image_spec")]),
        ]);
        assert_eq!(node.depth(), 3);
        assert_eq!(SyntaxNode::named("source_file").depth(), 1);
    }
}
