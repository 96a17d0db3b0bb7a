//! The Conformance Runner.
//!
//! [`test_parser`] resolves a pending parser, discovers the language's
//! corpus and checks every fixture against it. Each check is its own tokio
//! task and each parse runs in a nested task, so a panicking or hanging
//! parser is reported against one fixture and never takes down its
//! siblings. Outcomes are put back into corpus order before reporting.

use std::any::Any;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::compare::{compare, Mismatch};
use crate::config::HarnessConfig;
use crate::corpus::{self, CorpusFormat, Fixture, TreeSitterCorpus};
use crate::error::{ConfigError, FixtureFailure, SuiteError};
use crate::loader::{ParserHandle, ParserLoader, PendingParser};
use crate::report::{FixtureOutcome, SuiteReport, Verdict};
use crate::syntax::SyntaxNode;
use crate::tree::{normalize, MAX_DEPTH};

/// How suites are located and run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    pub corpus_root: PathBuf,
    /// Corpus directory relative to `corpus_root`; `{language}` is replaced
    /// by the language id.
    pub corpus_dir: String,
    /// Explicit corpus directories for individual languages.
    pub corpus_overrides: BTreeMap<String, PathBuf>,
    /// Maximum number of fixtures parsed at once.
    pub jobs: usize,
    pub parse_timeout: Option<Duration>,
    /// Substring a fixture name must contain to be run.
    pub filter: Option<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig::new(".")
    }
}

impl RunnerConfig {
    pub fn new(corpus_root: impl Into<PathBuf>) -> Self {
        RunnerConfig {
            corpus_root: corpus_root.into(),
            corpus_dir: "{language}/corpus".to_string(),
            corpus_overrides: BTreeMap::new(),
            jobs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            parse_timeout: None,
            filter: None,
        }
    }

    pub fn corpus_dir_for(&self, language: &str) -> PathBuf {
        match self.corpus_overrides.get(language) {
            Some(dir) => dir.clone(),
            None => self
                .corpus_root
                .join(self.corpus_dir.replace("{language}", language)),
        }
    }
}

/// Everything a suite run needs besides the language and its parser.
///
/// Owns the loader; there is no process-wide parser cache.
#[derive(Clone)]
pub struct RunContext {
    loader: ParserLoader,
    config: RunnerConfig,
    corpus_format: Arc<dyn CorpusFormat>,
}

impl RunContext {
    pub fn new(loader: ParserLoader, config: RunnerConfig) -> Self {
        RunContext {
            loader,
            config,
            corpus_format: Arc::new(TreeSitterCorpus),
        }
    }

    /// A fresh loader with settings from the environment's config file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = HarnessConfig::from_env()?;
        Ok(RunContext::new(ParserLoader::new(), config.runner_config()))
    }

    pub fn with_corpus_format(mut self, format: Arc<dyn CorpusFormat>) -> Self {
        self.corpus_format = format;
        self
    }

    pub fn loader(&self) -> &ParserLoader {
        &self.loader
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut RunnerConfig {
        &mut self.config
    }
}

/// Run the conformance suite for `language` against `pending`.
///
/// Only suite-level problems are errors; every fixture failure is an
/// outcome in the returned report.
pub async fn test_parser(
    ctx: &RunContext,
    language: &str,
    pending: &PendingParser,
) -> Result<SuiteReport, SuiteError> {
    let handle = pending
        .resolve()
        .await
        .map_err(|source| SuiteError::ParserUnavailable {
            language: language.to_string(),
            source,
        })?;

    let dir = ctx.config.corpus_dir_for(language);
    let corpus = corpus::discover(language, &dir, ctx.corpus_format.as_ref()).await?;
    let found = corpus.fixtures.len();
    let fixtures: Vec<Fixture> = match &ctx.config.filter {
        Some(needle) => corpus
            .fixtures
            .into_iter()
            .filter(|f| f.name.contains(needle.as_str()))
            .collect(),
        None => corpus.fixtures,
    };

    info!(
        language,
        handle = %handle.id(),
        fixtures = fixtures.len(),
        filtered_out = found - fixtures.len(),
        "running conformance suite"
    );

    let outcomes = run_fixtures(ctx, &handle, fixtures).await;
    let report = SuiteReport::new(language, &handle, outcomes);

    info!(
        language,
        passed = report.passed,
        failed = report.failed,
        crashed = report.crashed,
        malformed = report.malformed,
        skipped = report.skipped,
        "conformance suite finished"
    );
    Ok(report)
}

async fn run_fixtures(
    ctx: &RunContext,
    handle: &ParserHandle,
    fixtures: Vec<Fixture>,
) -> Vec<FixtureOutcome> {
    let semaphore = Arc::new(Semaphore::new(ctx.config.jobs.max(1)));
    let identities: Vec<_> = fixtures
        .iter()
        .map(|f| (f.name.clone(), f.origin.clone()))
        .collect();

    let mut set = JoinSet::new();
    for (index, fixture) in fixtures.into_iter().enumerate() {
        let check = Check {
            state: CheckState::Pending,
            handle: handle.clone(),
            format: Arc::clone(&ctx.corpus_format),
            timeout: ctx.config.parse_timeout,
            fixture,
        };
        let semaphore = Arc::clone(&semaphore);
        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            (index, check.run().await)
        });
    }

    let mut slots: Vec<Option<FixtureOutcome>> = vec![None; identities.len()];
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, outcome)) => slots[index] = Some(outcome),
            Err(e) => warn!(error = %e, "fixture check task failed"),
        }
    }

    slots
        .into_iter()
        .zip(identities)
        .map(|(slot, (name, origin))| {
            slot.unwrap_or_else(|| FixtureOutcome {
                name,
                origin,
                handle: handle.id(),
                verdict: Verdict::Failed {
                    failure: FixtureFailure::ParserCrash(
                        "fixture check did not complete".to_string(),
                    ),
                },
            })
        })
        .collect()
}

// ──────────────────────────────────────────────
// Per-fixture check
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckState {
    Pending,
    Parsing,
    Comparing,
    Passed,
    Failed,
    Crashed,
    Skipped,
}

impl CheckState {
    fn can_advance_to(self, next: CheckState) -> bool {
        use CheckState::*;
        matches!(
            (self, next),
            (Pending, Parsing | Skipped | Failed)
                | (Parsing, Comparing | Crashed)
                | (Comparing, Passed | Failed)
        )
    }
}

struct Check {
    state: CheckState,
    handle: ParserHandle,
    format: Arc<dyn CorpusFormat>,
    timeout: Option<Duration>,
    fixture: Fixture,
}

impl Check {
    fn advance(&mut self, next: CheckState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "invalid check transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(fixture = %self.fixture.name, from = ?self.state, to = ?next, "check");
        self.state = next;
    }

    fn fail(&mut self, failure: FixtureFailure) -> Verdict {
        self.advance(CheckState::Failed);
        Verdict::Failed { failure }
    }

    async fn run(mut self) -> FixtureOutcome {
        let verdict = self.verdict().await;
        FixtureOutcome {
            name: self.fixture.name,
            origin: self.fixture.origin,
            handle: self.handle.id(),
            verdict,
        }
    }

    async fn verdict(&mut self) -> Verdict {
        if let Some(reason) = self.fixture.malformed.clone() {
            return self.fail(FixtureFailure::FixtureMalformed(reason));
        }
        if self.fixture.attributes.skip {
            self.advance(CheckState::Skipped);
            return Verdict::Skipped;
        }

        // `:error` fixtures only assert that error recovery reported something.
        let expected = if self.fixture.attributes.error {
            None
        } else {
            match self.format.parse_expected(&self.fixture) {
                Ok(tree) => Some(tree),
                Err(message) => return self.fail(FixtureFailure::FixtureMalformed(message)),
            }
        };

        self.advance(CheckState::Parsing);
        let node = match self.parse().await {
            Ok(node) => node,
            Err(message) => {
                warn!(fixture = %self.fixture.name, %message, "parser crashed");
                self.advance(CheckState::Crashed);
                return Verdict::Failed {
                    failure: FixtureFailure::ParserCrash(message),
                };
            }
        };

        self.advance(CheckState::Comparing);
        let result = match &expected {
            Some(expected) => compare(expected, &normalize(&node, expected.has_spans())),
            None => {
                let actual = normalize(&node, false);
                if actual.contains_errors() {
                    Ok(())
                } else {
                    Err(Mismatch::no_error_nodes(&actual))
                }
            }
        };
        match result {
            Ok(()) => {
                self.advance(CheckState::Passed);
                Verdict::Passed
            }
            Err(mismatch) => self.fail(FixtureFailure::StructuralMismatch(mismatch)),
        }
    }

    /// Parse in a task of its own so a panic is caught at the join, and
    /// dropping the check aborts the parse.
    async fn parse(&self) -> Result<SyntaxNode, String> {
        let parser = self.handle.parser();
        let source = self.fixture.source.clone();
        let mut task = JoinSet::new();
        task.spawn(async move { parser.parse(&source).await });

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, task.join_next()).await {
                Ok(joined) => joined,
                Err(_) => return Err(format!("parse timed out after {} ms", limit.as_millis())),
            },
            None => task.join_next().await,
        };

        match joined {
            Some(Ok(Ok(node))) if node.depth() > MAX_DEPTH => Err(format!(
                "parse tree nests deeper than {} levels",
                MAX_DEPTH
            )),
            Some(Ok(Ok(node))) => Ok(node),
            Some(Ok(Err(e))) => Err(e.message),
            Some(Err(e)) if e.is_panic() => Err(format!(
                "parser panicked: {}",
                panic_message(e.into_panic())
            )),
            Some(Err(e)) => Err(format!("parse task failed: {}", e)),
            None => Err("parse task was never started".to_string()),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
