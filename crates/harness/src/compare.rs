//! Structural comparison of an expected tree against a parse result.
//!
//! Two trees are equal iff their kinds match, their field labels match in
//! order, every span the expected tree specifies matches, and all children
//! match recursively. `ERROR` and `MISSING` nodes in the actual tree only
//! match an `ERROR`/`MISSING` node written out in the expected tree.
//!
//! Comparison stops at the first divergence in pre-order and reports it
//! as a [`Mismatch`] with the path that leads there.

use std::fmt;

use serde::Serialize;

use crate::tree::{Child, Span, Tree};

/// What differs at the point of divergence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MismatchKind {
    KindDiffers {
        expected: String,
        actual: String,
    },
    FieldDiffers {
        index: usize,
        expected: Option<String>,
        actual: Option<String>,
    },
    MissingChild {
        index: usize,
        expected: String,
    },
    UnexpectedChild {
        index: usize,
        actual: String,
    },
    SpanDiffers {
        expected: Span,
        actual: Option<Span>,
    },
    UnexpectedError,
    UnexpectedMissing {
        kind: Option<String>,
    },
    /// An `:error` fixture parsed cleanly.
    NoErrorNodes,
}

impl fmt::Display for MismatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MismatchKind::KindDiffers { expected, actual } => {
                write!(f, "expected node ({}), got ({})", expected, actual)
            }
            MismatchKind::FieldDiffers {
                index,
                expected,
                actual,
            } => write!(
                f,
                "child {} expected field {}, got {}",
                index,
                field_label(expected),
                field_label(actual)
            ),
            MismatchKind::MissingChild { index, expected } => {
                write!(f, "missing child {} at position {}", expected, index)
            }
            MismatchKind::UnexpectedChild { index, actual } => {
                write!(f, "unexpected child {} at position {}", actual, index)
            }
            MismatchKind::SpanDiffers { expected, actual } => match actual {
                Some(actual) => write!(f, "expected span {}, got {}", expected, actual),
                None => write!(f, "expected span {}, parse result has none", expected),
            },
            MismatchKind::UnexpectedError => write!(f, "parse result contains an ERROR node"),
            MismatchKind::UnexpectedMissing { kind } => match kind {
                Some(kind) => write!(f, "parse result contains a MISSING {} node", kind),
                None => write!(f, "parse result contains a MISSING node"),
            },
            MismatchKind::NoErrorNodes => {
                write!(f, "expected the parse to contain ERROR or MISSING nodes")
            }
        }
    }
}

fn field_label(field: &Option<String>) -> String {
    match field {
        Some(name) => format!("'{}'", name),
        None => "(none)".to_string(),
    }
}

/// The first point where two trees diverge, plus surrounding context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    /// Path from the root to the divergent node, e.g.
    /// `["source_file", "from_instruction[0]"]`.
    pub path: Vec<String>,
    pub kind: MismatchKind,
    /// Expected subtree around the divergence, pretty-printed.
    pub expected_context: String,
    /// Actual subtree around the divergence, pretty-printed.
    pub actual_context: String,
}

impl Mismatch {
    /// A mismatch for a tree that should contain errors but does not.
    pub fn no_error_nodes(actual: &Tree) -> Self {
        Mismatch {
            path: vec![actual.label()],
            kind: MismatchKind::NoErrorNodes,
            expected_context: String::new(),
            actual_context: actual.pretty(),
        }
    }

    pub fn path_string(&self) -> String {
        self.path.join(" > ")
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {}: {}", self.path_string(), self.kind)?;
        if !self.expected_context.is_empty() {
            writeln!(f)?;
            writeln!(f, "  expected:")?;
            write!(f, "{}", indent(&self.expected_context, 4))?;
        }
        if !self.actual_context.is_empty() {
            writeln!(f)?;
            writeln!(f, "  actual:")?;
            write!(f, "{}", indent(&self.actual_context, 4))?;
        }
        Ok(())
    }
}

fn indent(text: &str, by: usize) -> String {
    let pad = " ".repeat(by);
    text.lines()
        .map(|line| format!("{}{}", pad, line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Compare `actual` against `expected`.
pub fn compare(expected: &Tree, actual: &Tree) -> Result<(), Mismatch> {
    let mut path = vec![actual.label()];
    compare_node(expected, actual, None, &mut path)
}

fn segment(child: &Child, index: usize) -> String {
    match &child.field {
        Some(field) => format!("{}: {}[{}]", field, child.tree.label(), index),
        None => format!("{}[{}]", child.tree.label(), index),
    }
}

fn mismatch(kind: MismatchKind, path: &[String], context: (&Tree, &Tree)) -> Mismatch {
    Mismatch {
        path: path.to_vec(),
        kind,
        expected_context: context.0.pretty(),
        actual_context: context.1.pretty(),
    }
}

fn compare_node(
    expected: &Tree,
    actual: &Tree,
    parents: Option<(&Tree, &Tree)>,
    path: &mut Vec<String>,
) -> Result<(), Mismatch> {
    // Node-level divergences are shown with the parent as context,
    // child-level ones with this node.
    let node_context = parents.unwrap_or((expected, actual));
    let child_context = (expected, actual);

    match actual {
        Tree::Error { .. } if !expected.is_error() => {
            return Err(mismatch(MismatchKind::UnexpectedError, path, node_context));
        }
        Tree::Missing { kind, .. } if !expected.is_missing() => {
            return Err(mismatch(
                MismatchKind::UnexpectedMissing { kind: kind.clone() },
                path,
                node_context,
            ));
        }
        _ => {}
    }

    let (expected_label, actual_label) = (expected.label(), actual.label());
    let labels_match = match (expected, actual) {
        // A bare `(MISSING)` in the annotation accepts any missing kind.
        (Tree::Missing { kind: None, .. }, Tree::Missing { .. }) => true,
        _ => expected_label == actual_label,
    };
    if !labels_match {
        return Err(mismatch(
            MismatchKind::KindDiffers {
                expected: expected_label,
                actual: actual_label,
            },
            path,
            node_context,
        ));
    }

    if let Some(expected_span) = expected.span() {
        if actual.span() != Some(expected_span) {
            return Err(mismatch(
                MismatchKind::SpanDiffers {
                    expected: expected_span,
                    actual: actual.span(),
                },
                path,
                node_context,
            ));
        }
    }

    let (expected_children, actual_children) = (expected.children(), actual.children());
    let longest = expected_children.len().max(actual_children.len());
    for index in 0..longest {
        match (expected_children.get(index), actual_children.get(index)) {
            (Some(e), Some(a)) => {
                if e.field != a.field {
                    return Err(mismatch(
                        MismatchKind::FieldDiffers {
                            index,
                            expected: e.field.clone(),
                            actual: a.field.clone(),
                        },
                        path,
                        child_context,
                    ));
                }
                path.push(segment(a, index));
                compare_node(&e.tree, &a.tree, Some(child_context), path)?;
                path.pop();
            }
            (Some(e), None) => {
                return Err(mismatch(
                    MismatchKind::MissingChild {
                        index,
                        expected: short(&e.tree),
                    },
                    path,
                    child_context,
                ));
            }
            (None, Some(a)) => {
                return Err(mismatch(
                    MismatchKind::UnexpectedChild {
                        index,
                        actual: short(&a.tree),
                    },
                    path,
                    child_context,
                ));
            }
            (None, None) => unreachable!("index is below the longer child list"),
        }
    }

    Ok(())
}

/// One-line rendering, truncated for deep subtrees.
fn short(tree: &Tree) -> String {
    const LIMIT: usize = 80;
    let text = tree.to_string();
    if text.chars().count() <= LIMIT {
        text
    } else {
        let cut: String = text.chars().take(LIMIT).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sexp::parse_annotation;
    use pretty_assertions::assert_eq;

    fn tree(src: &str) -> Tree {
        parse_annotation(src).unwrap()
    }

    #[test]
    fn identical_trees_match() {
        let t = tree("(source_file (from_instruction image: (image_spec)))");
        assert_eq!(compare(&t, &t.clone()), Ok(()));
    }

    #[test]
    fn missing_child_is_named() {
        let expected = tree("(source_file (from_instruction (image_spec)))");
        let actual = tree("(source_file (from_instruction))");
        let m = compare(&expected, &actual).unwrap_err();
        assert_eq!(m.path, vec!["source_file", "from_instruction[0]"]);
        assert_eq!(
            m.kind,
            MismatchKind::MissingChild {
                index: 0,
                expected: "(image_spec)".into()
            }
        );
        let text = m.to_string();
        assert!(text.contains("missing child (image_spec)"), "{}", text);
        assert!(text.contains("expected:\n    (from_instruction\n      (image_spec))"), "{}", text);
    }

    #[test]
    fn unexpected_child_is_reported() {
        let expected = tree("(source_file)");
        let actual = tree("(source_file (comment))");
        let m = compare(&expected, &actual).unwrap_err();
        assert!(matches!(m.kind, MismatchKind::UnexpectedChild { index: 0, .. }));
    }

    #[test]
    fn kind_difference_uses_parent_context() {
        let expected = tree("(source_file (from_instruction) (run_instruction))");
        let actual = tree("(source_file (from_instruction) (cmd_instruction))");
        let m = compare(&expected, &actual).unwrap_err();
        assert_eq!(m.path_string(), "source_file > cmd_instruction[1]");
        assert!(m.expected_context.starts_with("(source_file"));
        assert_eq!(
            m.kind,
            MismatchKind::KindDiffers {
                expected: "run_instruction".into(),
                actual: "cmd_instruction".into()
            }
        );
    }

    #[test]
    fn field_labels_and_order_matter() {
        let expected = tree("(pair key: (string) value: (number))");
        let swapped = tree("(pair value: (string) key: (number))");
        let m = compare(&expected, &swapped).unwrap_err();
        assert!(matches!(m.kind, MismatchKind::FieldDiffers { index: 0, .. }));

        let unlabeled = tree("(pair (string) value: (number))");
        assert!(compare(&expected, &unlabeled).is_err());
    }

    #[test]
    fn error_nodes_are_mismatches_unless_expected() {
        let actual = tree("(source_file (ERROR (image_spec)))");
        let m = compare(&tree("(source_file (from_instruction))"), &actual).unwrap_err();
        assert_eq!(m.kind, MismatchKind::UnexpectedError);
        assert_eq!(m.path_string(), "source_file > ERROR[0]");

        assert_eq!(compare(&tree("(source_file (ERROR (image_spec)))"), &actual), Ok(()));
    }

    #[test]
    fn missing_nodes_are_mismatches_unless_expected() {
        let actual = tree("(source_file (from_instruction (MISSING image_spec)))");
        let m = compare(&tree("(source_file (from_instruction (image_spec)))"), &actual).unwrap_err();
        assert_eq!(
            m.kind,
            MismatchKind::UnexpectedMissing {
                kind: Some("image_spec".into())
            }
        );
        assert_eq!(compare(&tree("(source_file (from_instruction (MISSING)))"), &actual), Ok(()));
        assert!(compare(&tree("(source_file (from_instruction (MISSING image_name)))"), &actual).is_err());
    }

    #[test]
    fn spans_compared_only_where_expected() {
        let actual = tree("(source_file [0, 0] - [1, 0] (comment [0, 0] - [0, 5]))");
        assert_eq!(compare(&tree("(source_file (comment [0, 0] - [0, 5]))"), &actual), Ok(()));
        let m = compare(&tree("(source_file (comment [0, 0] - [0, 6]))"), &actual).unwrap_err();
        assert!(matches!(m.kind, MismatchKind::SpanDiffers { .. }));
    }

    #[test]
    fn first_divergence_wins() {
        let expected = tree("(a (b (c)) (d))");
        let actual = tree("(a (b (x)) (y))");
        let m = compare(&expected, &actual).unwrap_err();
        assert_eq!(m.path_string(), "a > b[0] > x[0]");
    }
}
