//! Fixture corpus discovery and the corpus file format.
//!
//! Convention: every file with the format's extension in a language's
//! corpus directory is a corpus file; files are read in name order and
//! fixtures keep their order within a file.
//!
//! The default [`TreeSitterCorpus`] format:
//!
//! ```text
//! ==================
//! FROM with a tag
//! :skip
//! ==================
//! FROM alpine:3.19
//! ---
//!
//! (source_file (from_instruction (image_spec (image_name) (image_tag))))
//! ```
//!
//! A header is a line of three or more `=` optionally followed by a suffix
//! (`===|||`), the fixture name and attribute lines, and a closing `=`
//! line with the same suffix. The last line of three or more `-` carrying
//! that suffix separates source text from the expected tree.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::SuiteError;
use crate::sexp::parse_annotation;
use crate::tree::Tree;

/// Where a fixture came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Origin {
    pub file: PathBuf,
    /// 1-based line of the fixture's opening header.
    pub line: usize,
}

/// Per-fixture switches written as `:name` lines in the header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Attributes {
    /// Do not run this fixture.
    pub skip: bool,
    /// The source is invalid: pass iff the parse contains error nodes.
    pub error: bool,
}

/// One named example: source text plus its expected tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixture {
    pub name: String,
    pub source: String,
    /// Raw annotation text; parsed lazily so a bad annotation only fails
    /// its own fixture.
    pub expected: String,
    /// 1-based line in the corpus file where `expected` starts.
    pub expected_line: usize,
    pub attributes: Attributes,
    pub origin: Origin,
    /// Set when the fixture block itself could not be split.
    pub malformed: Option<String>,
}

/// All fixtures for one language.
#[derive(Debug, Clone)]
pub struct Corpus {
    pub language: String,
    pub dir: PathBuf,
    pub fixtures: Vec<Fixture>,
}

/// A corpus file format. The tree-sitter layout is the default; other
/// toolchains can plug in their own.
pub trait CorpusFormat: Send + Sync {
    /// File extension (without the dot) of corpus files.
    fn extension(&self) -> &str;

    /// Split one corpus file into fixtures, in file order.
    fn split(&self, file: &Path, text: &str) -> Vec<Fixture>;

    /// Parse a fixture's expected annotation.
    fn parse_expected(&self, fixture: &Fixture) -> Result<Tree, String>;
}

/// The canonical tree-sitter `test/corpus` format.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeSitterCorpus;

impl CorpusFormat for TreeSitterCorpus {
    fn extension(&self) -> &str {
        "txt"
    }

    fn split(&self, file: &Path, text: &str) -> Vec<Fixture> {
        split_fixtures(file, text)
    }

    fn parse_expected(&self, fixture: &Fixture) -> Result<Tree, String> {
        parse_annotation(&fixture.expected).map_err(|e| {
            format!(
                "expected tree at {}:{}: {}",
                fixture.origin.file.display(),
                fixture.expected_line + e.line - 1,
                e
            )
        })
    }
}

// ──────────────────────────────────────────────
// Discovery
// ──────────────────────────────────────────────

/// Read every corpus file in `dir` for `language`.
///
/// A missing directory, or one without a single corpus file, is a
/// configuration fault reported once for the whole language.
pub async fn discover(
    language: &str,
    dir: &Path,
    format: &dyn CorpusFormat,
) -> Result<Corpus, SuiteError> {
    let not_found = || SuiteError::CorpusNotFound {
        language: language.to_string(),
        dir: dir.to_path_buf(),
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(|_| not_found())?;
    let mut files = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                return Err(SuiteError::CorpusUnreadable {
                    path: dir.to_path_buf(),
                    message: e.to_string(),
                })
            }
        };
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some(format.extension()) && path.is_file()
        {
            files.push(path);
        }
    }
    if files.is_empty() {
        return Err(not_found());
    }
    files.sort();

    let mut fixtures = Vec::new();
    for file in &files {
        let text =
            tokio::fs::read_to_string(file)
                .await
                .map_err(|e| SuiteError::CorpusUnreadable {
                    path: file.clone(),
                    message: e.to_string(),
                })?;
        let found = format.split(file, &text);
        debug!(file = %file.display(), fixtures = found.len(), "read corpus file");
        fixtures.extend(found);
    }

    Ok(Corpus {
        language: language.to_string(),
        dir: dir.to_path_buf(),
        fixtures,
    })
}

// ──────────────────────────────────────────────
// Tree-sitter corpus splitting
// ──────────────────────────────────────────────

/// If `line` is a header line (`===` + optional suffix), return the suffix.
fn header_suffix(line: &str) -> Option<&str> {
    let line = line.trim_end();
    let rest = line.trim_start_matches('=');
    (line.len() - rest.len() >= 3).then_some(rest)
}

fn is_divider(line: &str, suffix: &str) -> bool {
    let line = line.trim_end();
    let rest = line.trim_start_matches('-');
    line.len() - rest.len() >= 3 && rest == suffix
}

fn split_fixtures(file: &Path, text: &str) -> Vec<Fixture> {
    let lines: Vec<&str> = text.lines().collect();
    let mut fixtures = Vec::new();
    let mut i = 0usize;

    // Anything before the first header is ignored.
    while i < lines.len() && header_suffix(lines[i]).is_none() {
        i += 1;
    }

    while i < lines.len() {
        let Some(suffix) = header_suffix(lines[i]) else {
            i += 1;
            continue;
        };
        let header_line = i + 1;
        i += 1;

        // Name and attribute lines up to the closing header.
        let mut title = Vec::new();
        let mut closed = false;
        while i < lines.len() {
            if header_suffix(lines[i]) == Some(suffix) {
                closed = true;
                i += 1;
                break;
            }
            title.push(lines[i].trim());
            i += 1;
        }

        let mut fixture = Fixture {
            name: String::new(),
            source: String::new(),
            expected: String::new(),
            expected_line: header_line,
            attributes: Attributes::default(),
            origin: Origin {
                file: file.to_path_buf(),
                line: header_line,
            },
            malformed: None,
        };
        read_title(&title, &mut fixture);

        if !closed {
            fixture
                .malformed
                .get_or_insert_with(|| "header is never closed".to_string());
            fixtures.push(fixture);
            break;
        }

        // Body runs until the next header that opens a fixture.
        let body_start = i;
        while i < lines.len() && !opens_fixture(&lines, i) {
            i += 1;
        }
        let body = &lines[body_start..i];

        match body.iter().rposition(|l| is_divider(l, suffix)) {
            Some(div) => {
                let rest = &body[div + 1..];
                let first = rest.iter().position(|l| !l.trim().is_empty()).unwrap_or(0);
                fixture.source = body[..div].join("\n");
                fixture.expected = rest.join("\n").trim().to_string();
                fixture.expected_line = body_start + div + first + 2;
            }
            None => {
                fixture.source = body.join("\n");
                fixture
                    .malformed
                    .get_or_insert_with(|| "no '---' divider before the expected tree".to_string());
            }
        }
        fixtures.push(fixture);
    }

    fixtures
}

/// A header line opens a new fixture only if a closing header with its own
/// suffix follows before any divider with that suffix; a stray `===` inside
/// source text does not. Neighbouring fixtures may use different suffixes.
fn opens_fixture(lines: &[&str], at: usize) -> bool {
    let Some(suffix) = header_suffix(lines[at]) else {
        return false;
    };
    for line in &lines[at + 1..] {
        if header_suffix(line) == Some(suffix) {
            return true;
        }
        if is_divider(line, suffix) {
            return false;
        }
    }
    false
}

fn read_title(title: &[&str], fixture: &mut Fixture) {
    let mut name_parts = Vec::new();
    for line in title {
        if let Some(attr) = line.strip_prefix(':') {
            match attr.trim() {
                "skip" => fixture.attributes.skip = true,
                "error" => fixture.attributes.error = true,
                other => {
                    fixture
                        .malformed
                        .get_or_insert_with(|| format!("unknown attribute ':{}'", other));
                }
            }
        } else if !line.is_empty() {
            name_parts.push(*line);
        }
    }
    fixture.name = name_parts.join(" ");
    if fixture.name.is_empty() {
        fixture.name = format!("<unnamed fixture at line {}>", fixture.origin.line);
        fixture
            .malformed
            .get_or_insert_with(|| "fixture has no name".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn split(text: &str) -> Vec<Fixture> {
        split_fixtures(Path::new("corpus/basic.txt"), text)
    }

    const TWO: &str = "\
==================
FROM alpine
==================
FROM alpine
---

(source_file (from_instruction (image_spec)))

==================
Comment
:skip
==================
# hello

---
(source_file (comment))
";

    #[test]
    fn splits_fixtures_in_order() {
        let fixtures = split(TWO);
        assert_eq!(fixtures.len(), 2);

        let first = &fixtures[0];
        assert_eq!(first.name, "FROM alpine");
        assert_eq!(first.source, "FROM alpine");
        assert_eq!(first.expected, "(source_file (from_instruction (image_spec)))");
        assert_eq!(first.origin.line, 1);
        assert_eq!(first.expected_line, 7);
        assert!(first.malformed.is_none());

        let second = &fixtures[1];
        assert_eq!(second.name, "Comment");
        assert!(second.attributes.skip);
        assert_eq!(second.source, "# hello\n");
        assert_eq!(second.origin.line, 9);
    }

    #[test]
    fn suffixed_delimiters_allow_dashes_in_source() {
        let text = "\
===|||
YAML in a heredoc
===|||
RUN <<EOF
---
EOF
---|||
(source_file (run_instruction (heredoc)))
";
        let fixtures = split(text);
        assert_eq!(fixtures.len(), 1);
        assert_eq!(fixtures[0].source, "RUN <<EOF\n---\nEOF");
        assert_eq!(fixtures[0].expected, "(source_file (run_instruction (heredoc)))");
    }

    #[test]
    fn missing_divider_marks_only_that_fixture() {
        let text = "\
===
broken
===
FROM alpine
===
fine
===
FROM alpine
---
(source_file)
";
        let fixtures = split(text);
        assert_eq!(fixtures.len(), 2);
        assert!(fixtures[0].malformed.as_deref().unwrap().contains("divider"));
        assert!(fixtures[1].malformed.is_none());
        assert_eq!(fixtures[1].name, "fine");
    }

    #[test]
    fn neighbouring_fixtures_may_use_different_suffixes() {
        let text = "\
===
plain
===
FROM a
---
(source_file)

===|||
suffixed
===|||
FROM b
---|||
(source_file)
";
        let fixtures = split(text);
        assert_eq!(fixtures.len(), 2);
        assert_eq!(fixtures[0].name, "plain");
        assert_eq!(fixtures[0].expected, "(source_file)");
        assert!(fixtures[0].malformed.is_none());
        assert!(TreeSitterCorpus.parse_expected(&fixtures[0]).is_ok());
        assert_eq!(fixtures[1].name, "suffixed");
        assert_eq!(fixtures[1].source, "FROM b");
        assert_eq!(fixtures[1].expected, "(source_file)");
        assert_eq!(fixtures[1].origin.line, 8);
        assert!(fixtures[1].malformed.is_none());
    }

    #[test]
    fn unknown_attribute_is_malformed() {
        let fixtures = split("===\nweird\n:fail-fast\n===\nFROM x\n---\n(source_file)\n");
        assert!(fixtures[0].malformed.as_deref().unwrap().contains(":fail-fast"));
    }

    #[test]
    fn preamble_is_ignored() {
        let fixtures = split("notes for authors\n\n===\nonly\n===\nx\n---\n(a)\n");
        assert_eq!(fixtures.len(), 1);
        assert_eq!(fixtures[0].name, "only");
    }

    #[test]
    fn expected_parse_errors_point_into_the_file() {
        let fixtures = split("===\nbad\n===\nFROM x\n---\n\n(source_file\n");
        let err = TreeSitterCorpus.parse_expected(&fixtures[0]).unwrap_err();
        assert!(err.starts_with("expected tree at corpus/basic.txt:7"), "{}", err);
    }

    #[tokio::test]
    async fn discover_reads_files_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "===\nsecond\n===\nx\n---\n(a)\n").unwrap();
        std::fs::write(dir.path().join("a.txt"), "===\nfirst\n===\nx\n---\n(a)\n").unwrap();
        std::fs::write(dir.path().join("notes.md"), "===\nignored\n===\nx\n---\n(a)\n").unwrap();

        let corpus = discover("dockerfile", dir.path(), &TreeSitterCorpus)
            .await
            .unwrap();
        let names: Vec<_> = corpus.fixtures.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn discover_without_corpus_files_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover("dockerfile", dir.path(), &TreeSitterCorpus)
            .await
            .unwrap_err();
        assert!(matches!(err, SuiteError::CorpusNotFound { .. }));

        let err = discover("dockerfile", &dir.path().join("nope"), &TreeSitterCorpus)
            .await
            .unwrap_err();
        assert!(matches!(err, SuiteError::CorpusNotFound { .. }));
    }
}
