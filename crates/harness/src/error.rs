use std::path::PathBuf;

use serde::Serialize;

use crate::compare::Mismatch;

/// Errors raised while turning an artifact path into a live parser.
///
/// Either variant aborts the whole suite for the language: without a
/// working parser no fixture can meaningfully run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// Nothing exists at the artifact path.
    #[error("parser artifact not found: {}", path.display())]
    ArtifactNotFound { path: PathBuf },

    /// The artifact exists but could not be initialized (no format accepts
    /// it, wrong permissions, corrupt or empty file, failed handshake).
    #[error("failed to load parser artifact {}: {message}", path.display())]
    ArtifactLoadError { path: PathBuf, message: String },
}

impl LoadError {
    pub(crate) fn load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        LoadError::ArtifactLoadError {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Suite-level failures, reported once per language rather than per fixture.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SuiteError {
    /// The loader rejected the artifact for this language.
    #[error("parser for '{language}' unavailable: {source}")]
    ParserUnavailable {
        language: String,
        #[source]
        source: LoadError,
    },

    /// The conventional corpus location is missing or holds no corpus files.
    #[error("no corpus for '{language}' at {}", dir.display())]
    CorpusNotFound { language: String, dir: PathBuf },

    /// A corpus file exists but could not be read.
    #[error("cannot read corpus file {}: {message}", path.display())]
    CorpusUnreadable { path: PathBuf, message: String },
}

impl SuiteError {
    pub fn language(&self) -> Option<&str> {
        match self {
            SuiteError::ParserUnavailable { language, .. }
            | SuiteError::CorpusNotFound { language, .. } => Some(language),
            SuiteError::CorpusUnreadable { .. } => None,
        }
    }
}

/// A failure reported by a parser while parsing one source text.
///
/// The runner treats it the same way as a panic inside the parser.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        ParseError {
            message: message.into(),
        }
    }
}

/// Why a single fixture check failed. Never aborts sibling fixtures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FixtureFailure {
    /// The normalized parse tree differs from the expected annotation.
    #[error("structural mismatch {0}")]
    StructuralMismatch(Mismatch),

    /// The parser panicked, reported an error, or timed out.
    #[error("parser crash: {0}")]
    ParserCrash(String),

    /// The fixture itself could not be understood.
    #[error("malformed fixture: {0}")]
    FixtureMalformed(String),
}

/// Errors loading a harness configuration file.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read '{}': {message}", path.display())]
    Read { path: PathBuf, message: String },

    #[error("could not parse '{}': {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("language '{0}' is not configured")]
    UnknownLanguage(String),
}
