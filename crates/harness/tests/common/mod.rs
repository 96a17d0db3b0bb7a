//! Shared fixtures for harness integration tests.
//!
//! Parser artifacts here are `.grammar` text files whose contents pick the
//! behavior of an in-process parser for a tiny Dockerfile subset:
//!
//! - `dockerfile`: well-behaved
//! - `dockerfile omit-image-spec`: forgets the `image_spec` child
//! - `dockerfile panic-on <needle>`: panics on sources containing needle
//! - `dockerfile hang-on <needle>`: never returns for those sources
//! - `dockerfile nest-on <needle>`: buries those sources under more
//!   levels of nodes than the harness accepts

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use grammar_conformance::{
    Artifact, ArtifactFormat, GrammarParser, LoadError, ParseError, ParserLoader, Point,
    RunContext, RunnerConfig, SyntaxNode, MAX_DEPTH,
};

// ──────────────────────────────────────────────
// Dockerfile stub parser
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct DockerfileStub {
    pub omit_image_spec: bool,
    pub panic_on: Option<String>,
    pub hang_on: Option<String>,
    pub nest_on: Option<String>,
}

impl DockerfileStub {
    fn line(&self, row: usize, line: &str) -> SyntaxNode {
        let start = Point::new(row, 0);
        let end = Point::new(row, line.len());
        if let Some(image) = line.strip_prefix("FROM ") {
            let mut children = vec![SyntaxNode::anonymous("FROM").at(start, Point::new(row, 4))];
            if !self.omit_image_spec {
                children.push(
                    SyntaxNode::named("image_spec")
                        .at(Point::new(row, 5), end)
                        .with_children(vec![SyntaxNode::anonymous(image.trim())]),
                );
            }
            SyntaxNode::named("from_instruction")
                .at(start, end)
                .with_children(children)
        } else if line.starts_with('#') {
            SyntaxNode::named("comment").at(start, end)
        } else if let Some(command) = line.strip_prefix("RUN ") {
            SyntaxNode::named("run_instruction").at(start, end).with_children(vec![
                SyntaxNode::anonymous("RUN"),
                SyntaxNode::named("shell_command")
                    .at(Point::new(row, 4), end)
                    .with_children(vec![SyntaxNode::anonymous(command)]),
            ])
        } else if line == "FROM" {
            SyntaxNode::named("from_instruction")
                .at(start, end)
                .with_children(vec![
                    SyntaxNode::anonymous("FROM"),
                    SyntaxNode::missing("image_spec").at(end, end),
                ])
        } else {
            SyntaxNode::error(vec![SyntaxNode::anonymous(line)]).at(start, end)
        }
    }
}

#[async_trait]
impl GrammarParser for DockerfileStub {
    async fn parse(&self, source: &str) -> Result<SyntaxNode, ParseError> {
        if let Some(needle) = &self.panic_on {
            if source.contains(needle.as_str()) {
                panic!("scanner blew up on {}", needle);
            }
        }
        if let Some(needle) = &self.hang_on {
            if source.contains(needle.as_str()) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
        let rows: Vec<&str> = source.lines().collect();
        let mut children: Vec<SyntaxNode> = rows
            .iter()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty())
            .map(|(row, l)| self.line(row, l))
            .collect();
        if let Some(needle) = &self.nest_on {
            if source.contains(needle.as_str()) {
                for _ in 0..MAX_DEPTH {
                    children = vec![SyntaxNode::named("block").with_children(children)];
                }
            }
        }
        Ok(SyntaxNode::named("source_file")
            .at(Point::new(0, 0), Point::new(rows.len(), 0))
            .with_children(children))
    }
}

// ──────────────────────────────────────────────
// Artifact format
// ──────────────────────────────────────────────

/// Loads `.grammar` files into [`DockerfileStub`]s, counting loads.
#[derive(Debug, Default)]
pub struct StubFormat {
    pub loads: Arc<AtomicUsize>,
    pub delay: Duration,
}

impl StubFormat {
    pub fn slow(delay: Duration) -> Self {
        StubFormat {
            delay,
            ..StubFormat::default()
        }
    }
}

#[async_trait]
impl ArtifactFormat for StubFormat {
    fn format_id(&self) -> &str {
        "stub"
    }

    fn accepts(&self, artifact: &Artifact) -> bool {
        artifact.path.extension().and_then(|e| e.to_str()) == Some("grammar")
    }

    async fn load(&self, artifact: &Artifact) -> Result<Arc<dyn GrammarParser>, LoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let text = tokio::fs::read_to_string(&artifact.path)
            .await
            .map_err(|e| LoadError::ArtifactLoadError {
                path: artifact.path.clone(),
                message: e.to_string(),
            })?;
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.first() != Some(&"dockerfile") {
            return Err(LoadError::ArtifactLoadError {
                path: artifact.path.clone(),
                message: "bad magic".to_string(),
            });
        }
        let mut stub = DockerfileStub::default();
        let mut rest = words[1..].iter();
        while let Some(word) = rest.next() {
            match *word {
                "omit-image-spec" => stub.omit_image_spec = true,
                "panic-on" => stub.panic_on = rest.next().map(|s| s.to_string()),
                "hang-on" => stub.hang_on = rest.next().map(|s| s.to_string()),
                "nest-on" => stub.nest_on = rest.next().map(|s| s.to_string()),
                _ => {}
            }
        }
        Ok(Arc::new(stub))
    }
}

// ──────────────────────────────────────────────
// Workspace helpers
// ──────────────────────────────────────────────

/// Checked-in corpus root (`tests/corpus/<language>/corpus/*.txt`).
pub fn checked_in_corpus() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/corpus")
}

/// Checked-in well-behaved artifact.
pub fn checked_in_artifact() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/artifacts/dockerfile.grammar")
}

pub fn write_artifact(dir: &Path, name: &str, behavior: &str) -> PathBuf {
    let path = dir.join(format!("{}.grammar", name));
    std::fs::write(&path, behavior).unwrap();
    path
}

pub fn write_corpus(root: &Path, language: &str, file: &str, text: &str) {
    let dir = root.join(language).join("corpus");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(file), text).unwrap();
}

/// One fixture block in tree-sitter corpus syntax.
pub fn fixture(name: &str, source: &str, expected: &str) -> String {
    format!(
        "==================\n{}\n==================\n{}\n---\n\n{}\n\n",
        name, source, expected
    )
}

pub fn stub_loader() -> (ParserLoader, Arc<AtomicUsize>) {
    let format = StubFormat::default();
    let loads = Arc::clone(&format.loads);
    (ParserLoader::with_formats(vec![Arc::new(format)]), loads)
}

pub fn context(corpus_root: &Path) -> RunContext {
    let (loader, _) = stub_loader();
    let mut config = RunnerConfig::new(corpus_root);
    config.jobs = 4;
    RunContext::new(loader, config)
}
