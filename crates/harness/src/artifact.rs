//! Parser artifacts and the formats that know how to load them.
//!
//! An [`ArtifactFormat`] turns a file on disk into a live [`GrammarParser`].
//! The loader asks each registered format in turn whether it accepts an
//! artifact; the first one that does performs the load.
//!
//! Built-in: [`CommandFormat`], for artifacts that are executables speaking
//! a stdin/stdout protocol. The executable receives the source text on
//! stdin and writes the concrete syntax tree to stdout as JSON in the
//! [`SyntaxNode`] shape. A non-zero exit status is a parser crash.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{LoadError, ParseError};
use crate::syntax::{GrammarParser, SyntaxNode};

/// A located, not yet initialized parser artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Artifact {
    /// Identifying name: the file stem (`tree-sitter-dockerfile`).
    pub name: String,
    /// Resolved path of the artifact.
    pub path: PathBuf,
}

impl Artifact {
    /// Check that `path` exists and describe it.
    pub async fn locate(path: &Path) -> Result<Self, LoadError> {
        match tokio::fs::metadata(path).await {
            Ok(_) => Ok(Artifact {
                name: path
                    .file_stem()
                    .unwrap_or_default()
                    .to_string_lossy()
                    .to_string(),
                path: path.to_path_buf(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(LoadError::ArtifactNotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => Err(LoadError::load(path, e.to_string())),
        }
    }

    /// SHA-256 of the artifact bytes, hex encoded.
    ///
    /// Identifies exactly which build of a grammar produced an outcome.
    pub async fn fingerprint(&self) -> Result<String, LoadError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| LoadError::load(&self.path, format!("cannot read artifact: {}", e)))?;
        if bytes.is_empty() {
            return Err(LoadError::load(&self.path, "artifact is empty"));
        }
        let digest = Sha256::digest(&bytes);
        Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
    }
}

/// A strategy for initializing one kind of parser artifact.
#[async_trait]
pub trait ArtifactFormat: Send + Sync {
    /// Short identifier used in logs and reports (e.g. "command").
    fn format_id(&self) -> &str;

    /// Whether this format knows how to load `artifact`.
    fn accepts(&self, artifact: &Artifact) -> bool;

    /// Perform the (possibly expensive) initialization.
    async fn load(&self, artifact: &Artifact) -> Result<Arc<dyn GrammarParser>, LoadError>;
}

// ──────────────────────────────────────────────
// CommandFormat
// ──────────────────────────────────────────────

/// Loads executables that speak the JSON tree protocol.
#[derive(Debug, Clone, Default)]
pub struct CommandFormat {
    args: Vec<String>,
}

impl CommandFormat {
    pub fn new() -> Self {
        CommandFormat::default()
    }

    /// Extra arguments passed on every invocation (e.g. `["parse", "--json"]`).
    pub fn with_args(args: Vec<String>) -> Self {
        CommandFormat { args }
    }
}

#[async_trait]
impl ArtifactFormat for CommandFormat {
    fn format_id(&self) -> &str {
        "command"
    }

    fn accepts(&self, artifact: &Artifact) -> bool {
        artifact.path.is_file()
    }

    async fn load(&self, artifact: &Artifact) -> Result<Arc<dyn GrammarParser>, LoadError> {
        let metadata = tokio::fs::metadata(&artifact.path)
            .await
            .map_err(|e| LoadError::load(&artifact.path, e.to_string()))?;
        if !is_executable(&metadata) {
            return Err(LoadError::load(&artifact.path, "artifact is not executable"));
        }
        Ok(Arc::new(CommandParser {
            program: artifact.path.clone(),
            args: self.args.clone(),
        }))
    }
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.is_file() && metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    metadata.is_file()
}

/// A parser backed by one process invocation per parse.
#[derive(Debug, Clone)]
pub struct CommandParser {
    program: PathBuf,
    args: Vec<String>,
}

#[async_trait]
impl GrammarParser for CommandParser {
    async fn parse(&self, source: &str) -> Result<SyntaxNode, ParseError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ParseError::new(format!("cannot start parser: {}", e)))?;

        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                // A parser may exit before draining its input; its exit
                // status and output decide the outcome, not the pipe.
                let _ = stdin.write_all(source.as_bytes()).await;
                let _ = stdin.shutdown().await;
            }
        };
        let (_, output) = tokio::join!(feed, child.wait_with_output());
        let output =
            output.map_err(|e| ParseError::new(format!("parser did not complete: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.lines().next().unwrap_or("").trim();
            return Err(ParseError::new(if detail.is_empty() {
                format!("parser exited with {}", output.status)
            } else {
                format!("parser exited with {}: {}", output.status, detail)
            }));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| ParseError::new(format!("parser printed an invalid tree: {}", e)))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &Path, name: &str, body: &str, mode: u32) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[tokio::test]
    async fn locate_reports_missing_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let err = Artifact::locate(&dir.path().join("nope.so")).await.unwrap_err();
        assert!(matches!(err, LoadError::ArtifactNotFound { .. }));
    }

    #[tokio::test]
    async fn fingerprint_is_stable_and_rejects_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "grammar", "true", 0o755);
        let artifact = Artifact::locate(&path).await.unwrap();
        assert_eq!(artifact.name, "grammar");
        let a = artifact.fingerprint().await.unwrap();
        assert_eq!(a.len(), 64);
        assert_eq!(a, artifact.fingerprint().await.unwrap());

        let empty = dir.path().join("empty");
        std::fs::write(&empty, "").unwrap();
        let err = Artifact::locate(&empty).await.unwrap().fingerprint().await.unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[tokio::test]
    async fn command_format_requires_executable() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "grammar", "true", 0o644);
        let artifact = Artifact::locate(&path).await.unwrap();
        assert!(CommandFormat::new().accepts(&artifact));
        let err = CommandFormat::new().load(&artifact).await.err().unwrap();
        assert!(err.to_string().contains("not executable"), "{}", err);
    }

    #[tokio::test]
    async fn command_parser_round_trips_source_through_the_process() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(
            dir.path(),
            "echo-grammar",
            r#"src=$(cat); printf '{"kind":"source_file","children":[{"kind":"comment","field":"%s"}]}' "$src""#,
            0o755,
        );
        let artifact = Artifact::locate(&path).await.unwrap();
        let parser = CommandFormat::new().load(&artifact).await.unwrap();
        let tree = parser.parse("body").await.unwrap();
        assert_eq!(tree.kind, "source_file");
        assert_eq!(tree.children[0].field.as_deref(), Some("body"));
    }

    #[tokio::test]
    async fn command_parser_failures_carry_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "boom", "cat >/dev/null; echo 'segfault in scanner' >&2; exit 3", 0o755);
        let artifact = Artifact::locate(&path).await.unwrap();
        let parser = CommandFormat::new().load(&artifact).await.unwrap();
        let err = parser.parse("FROM alpine").await.unwrap_err();
        assert!(err.message.contains("segfault in scanner"), "{}", err);

        let garbage = script(dir.path(), "garbage", "cat >/dev/null; echo not-json", 0o755);
        let artifact = Artifact::locate(&garbage).await.unwrap();
        let parser = CommandFormat::new().load(&artifact).await.unwrap();
        let err = parser.parse("FROM alpine").await.unwrap_err();
        assert!(err.message.contains("invalid tree"), "{}", err);
    }
}
