//! The normalized tree shape shared by fixture annotations and parse results.
//!
//! A [`Tree`] keeps only what a conformance check compares: node kind,
//! field labels, child order, and (when the fixture opts in) spans.
//! Anonymous tokens are dropped during [`normalize`].

use std::fmt;

use serde::Serialize;

use crate::syntax::{Point, SyntaxNode};

/// Start and end positions of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: Point,
    pub end: Point,
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}] - [{}, {}]",
            self.start.row, self.start.column, self.end.row, self.end.column
        )
    }
}

/// A child slot: an optional field label and the subtree in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Child {
    pub field: Option<String>,
    pub tree: Tree,
}

impl Child {
    pub fn new(tree: Tree) -> Self {
        Child { field: None, tree }
    }

    pub fn field(field: impl Into<String>, tree: Tree) -> Self {
        Child {
            field: Some(field.into()),
            tree,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tree {
    Node {
        kind: String,
        span: Option<Span>,
        children: Vec<Child>,
    },
    Error {
        span: Option<Span>,
        children: Vec<Child>,
    },
    Missing {
        kind: Option<String>,
        span: Option<Span>,
    },
}

impl Tree {
    /// A node without span or children; see [`Tree::with_children`].
    pub fn node(kind: impl Into<String>) -> Self {
        Tree::Node {
            kind: kind.into(),
            span: None,
            children: Vec::new(),
        }
    }

    pub fn with_children(self, new_children: Vec<Child>) -> Self {
        match self {
            Tree::Node { kind, span, .. } => Tree::Node {
                kind,
                span,
                children: new_children,
            },
            Tree::Error { span, .. } => Tree::Error {
                span,
                children: new_children,
            },
            missing @ Tree::Missing { .. } => missing,
        }
    }

    /// The label a node is printed and compared under.
    pub fn label(&self) -> String {
        match self {
            Tree::Node { kind, .. } => kind.clone(),
            Tree::Error { .. } => "ERROR".to_string(),
            Tree::Missing { kind: Some(k), .. } => format!("MISSING {}", quote_kind(k)),
            Tree::Missing { kind: None, .. } => "MISSING".to_string(),
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            Tree::Node { span, .. } | Tree::Error { span, .. } | Tree::Missing { span, .. } => {
                *span
            }
        }
    }

    pub fn children(&self) -> &[Child] {
        match self {
            Tree::Node { children, .. } | Tree::Error { children, .. } => children,
            Tree::Missing { .. } => &[],
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Tree::Error { .. })
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Tree::Missing { .. })
    }

    /// True if any node in the tree carries a span.
    pub fn has_spans(&self) -> bool {
        self.span().is_some() || self.children().iter().any(|c| c.tree.has_spans())
    }

    /// True if any node in the tree is an `ERROR` or `MISSING` node.
    pub fn contains_errors(&self) -> bool {
        self.is_error()
            || self.is_missing()
            || self.children().iter().any(|c| c.tree.contains_errors())
    }

    /// Multi-line rendering, two spaces per level, as corpus files lay it out.
    pub fn pretty(&self) -> String {
        let mut out = String::new();
        self.write_sexp(&mut out, Some(0));
        out
    }

    fn write_sexp(&self, out: &mut String, indent: Option<usize>) {
        out.push('(');
        out.push_str(&self.label());
        if let Some(span) = self.span() {
            out.push(' ');
            out.push_str(&span.to_string());
        }
        for child in self.children() {
            match indent {
                Some(level) => {
                    out.push('\n');
                    out.push_str(&"  ".repeat(level + 1));
                }
                None => out.push(' '),
            }
            if let Some(field) = &child.field {
                out.push_str(field);
                out.push_str(": ");
            }
            child.tree.write_sexp(out, indent.map(|l| l + 1));
        }
        out.push(')');
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.write_sexp(&mut out, None);
        f.write_str(&out)
    }
}

impl Serialize for Tree {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn quote_kind(kind: &str) -> String {
    if !kind.is_empty() && kind.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        kind.to_string()
    } else {
        format!("{:?}", kind)
    }
}

/// Deepest nesting accepted in an expected annotation or a parse tree.
/// Normalizing and comparing recurse once per level.
pub const MAX_DEPTH: usize = 256;

/// Convert a concrete parse result into the comparison shape.
///
/// Anonymous nodes are dropped, but any named descendants they carry are
/// hoisted into their parent. Error and missing nodes are always kept.
/// Spans are recorded only when `positions` is set.
pub fn normalize(node: &SyntaxNode, positions: bool) -> Tree {
    let span = positions.then_some(Span {
        start: node.start,
        end: node.end,
    });
    if node.is_missing {
        return Tree::Missing {
            kind: Some(node.kind.clone()).filter(|k| !k.is_empty()),
            span,
        };
    }
    let mut children = Vec::new();
    collect_children(&node.children, positions, &mut children);
    if node.is_error {
        Tree::Error { span, children }
    } else {
        Tree::Node {
            kind: node.kind.clone(),
            span,
            children,
        }
    }
}

fn collect_children(nodes: &[SyntaxNode], positions: bool, out: &mut Vec<Child>) {
    for child in nodes {
        if child.named || child.is_error || child.is_missing {
            out.push(Child {
                field: child.field.clone(),
                tree: normalize(child, positions),
            });
        } else {
            collect_children(&child.children, positions, out);
        }
    }
}
