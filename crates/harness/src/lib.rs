//! Grammar conformance harness.
//!
//! Loads compiled, language-specific parsers as pluggable artifacts and
//! checks them against annotated fixture corpora: every fixture's source is
//! parsed, the concrete tree is normalized and structurally compared with
//! the expected tree, and the outcomes are collected into a report.
//!
//! ```rust,ignore
//! let ctx = RunContext::new(ParserLoader::new(), RunnerConfig::new("grammars"));
//! let pending = ctx.loader().create_parser("build/dockerfile-parser");
//! let report = test_parser(&ctx, "dockerfile", &pending).await?;
//! assert!(report.is_success(), "{report}");
//! ```

pub mod artifact;
pub mod compare;
pub mod config;
pub mod corpus;
pub mod error;
pub mod loader;
pub mod logging;
pub mod report;
pub mod runner;
pub mod sexp;
pub mod suite;
pub mod syntax;
pub mod tap;
pub mod tree;

pub use artifact::{Artifact, ArtifactFormat, CommandFormat};
pub use compare::{compare, Mismatch, MismatchKind};
pub use config::{read_harness_config, HarnessConfig};
pub use corpus::{CorpusFormat, Fixture, TreeSitterCorpus};
pub use error::{ConfigError, FixtureFailure, LoadError, ParseError, SuiteError};
pub use loader::{HandleId, ParserHandle, ParserLoader, PendingParser};
pub use report::{FixtureOutcome, RunReport, SuiteReport, Verdict};
pub use runner::{test_parser, RunContext, RunnerConfig};
pub use syntax::{GrammarParser, Point, SyntaxNode};
pub use tree::{normalize, Tree, MAX_DEPTH};
