//! Suite and run reports: text summary, JSON and TAP.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::corpus::Origin;
use crate::error::{FixtureFailure, SuiteError};
use crate::loader::{HandleId, ParserHandle};
use crate::tap::Tap;

/// The result of one fixture check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Skipped,
    Failed { failure: FixtureFailure },
}

impl Verdict {
    pub fn is_failure(&self) -> bool {
        matches!(self, Verdict::Failed { .. })
    }

    pub fn failure(&self) -> Option<&FixtureFailure> {
        match self {
            Verdict::Failed { failure } => Some(failure),
            _ => None,
        }
    }
}

/// One fixture's outcome, tied to the handle that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixtureOutcome {
    pub name: String,
    pub origin: Origin,
    pub handle: HandleId,
    pub verdict: Verdict,
}

impl FixtureOutcome {
    fn location(&self) -> String {
        format!("{}:{}", self.origin.file.display(), self.origin.line)
    }
}

/// Every outcome of one language's suite, in corpus order.
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub language: String,
    pub artifact: PathBuf,
    pub handle: HandleId,
    pub fingerprint: String,
    pub outcomes: Vec<FixtureOutcome>,
    pub total: usize,
    pub passed: usize,
    /// Structural mismatches.
    pub failed: usize,
    pub crashed: usize,
    pub malformed: usize,
    pub skipped: usize,
}

impl SuiteReport {
    pub fn new(language: &str, handle: &ParserHandle, outcomes: Vec<FixtureOutcome>) -> Self {
        SuiteReport::tally(
            language,
            handle.artifact().path.clone(),
            handle.id(),
            handle.fingerprint().to_string(),
            outcomes,
        )
    }

    fn tally(
        language: &str,
        artifact: PathBuf,
        handle: HandleId,
        fingerprint: String,
        outcomes: Vec<FixtureOutcome>,
    ) -> Self {
        let mut report = SuiteReport {
            language: language.to_string(),
            artifact,
            handle,
            fingerprint,
            total: outcomes.len(),
            outcomes: Vec::new(),
            passed: 0,
            failed: 0,
            crashed: 0,
            malformed: 0,
            skipped: 0,
        };
        for outcome in &outcomes {
            match &outcome.verdict {
                Verdict::Passed => report.passed += 1,
                Verdict::Skipped => report.skipped += 1,
                Verdict::Failed { failure } => match failure {
                    FixtureFailure::StructuralMismatch(_) => report.failed += 1,
                    FixtureFailure::ParserCrash(_) => report.crashed += 1,
                    FixtureFailure::FixtureMalformed(_) => report.malformed += 1,
                },
            }
        }
        report.outcomes = outcomes;
        report
    }

    /// Failures of any kind.
    pub fn failure_count(&self) -> usize {
        self.failed + self.crashed + self.malformed
    }

    pub fn is_success(&self) -> bool {
        self.failure_count() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = (&FixtureOutcome, &FixtureFailure)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.verdict.failure().map(|f| (o, f)))
    }

    pub fn outcome(&self, name: &str) -> Option<&FixtureOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Add one TAP test per fixture to `tap`.
    pub fn write_tap(&self, tap: &mut Tap) {
        for outcome in &self.outcomes {
            let desc = format!("{}: {}", self.language, outcome.name);
            match &outcome.verdict {
                Verdict::Passed => tap.ok(desc),
                Verdict::Skipped => tap.skip(desc),
                Verdict::Failed { failure } => {
                    tap.not_ok(desc, format!("{}\n{}", outcome.location(), failure))
                }
            }
        }
    }

    pub fn to_tap(&self) -> String {
        let mut tap = Tap::new();
        self.write_tap(&mut tap);
        tap.render()
    }
}

impl fmt::Display for SuiteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance [{}]: {}/{} passed ({} failed, {} crashed, {} malformed, {} skipped)",
            self.language,
            self.passed,
            self.total,
            self.failed,
            self.crashed,
            self.malformed,
            self.skipped
        )?;
        for (outcome, failure) in self.failures() {
            writeln!(f, "  FAIL [{}] {}", outcome.location(), outcome.name)?;
            for line in failure.to_string().lines() {
                writeln!(f, "    {}", line)?;
            }
        }
        Ok(())
    }
}

// ──────────────────────────────────────────────
// RunReport
// ──────────────────────────────────────────────

/// One language's entry in a [`RunReport`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SuiteEntry {
    Completed(SuiteReport),
    Errored { language: String, error: String },
}

/// Several suites run together, as the CLI does for a config file.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// RFC 3339 timestamp of when the run started.
    pub started_at: String,
    pub suites: Vec<SuiteEntry>,
}

impl Default for RunReport {
    fn default() -> Self {
        RunReport::new()
    }
}

impl RunReport {
    pub fn new() -> Self {
        let started_at = time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string());
        RunReport {
            started_at,
            suites: Vec::new(),
        }
    }

    pub fn record(&mut self, language: &str, result: Result<SuiteReport, SuiteError>) {
        self.suites.push(match result {
            Ok(report) => SuiteEntry::Completed(report),
            Err(e) => SuiteEntry::Errored {
                language: language.to_string(),
                error: e.to_string(),
            },
        });
    }

    pub fn errored(&self) -> usize {
        self.suites
            .iter()
            .filter(|s| matches!(s, SuiteEntry::Errored { .. }))
            .count()
    }

    fn completed(&self) -> impl Iterator<Item = &SuiteReport> {
        self.suites.iter().filter_map(|s| match s {
            SuiteEntry::Completed(r) => Some(r),
            SuiteEntry::Errored { .. } => None,
        })
    }

    pub fn failure_count(&self) -> usize {
        self.completed().map(SuiteReport::failure_count).sum()
    }

    pub fn is_success(&self) -> bool {
        self.errored() == 0 && self.failure_count() == 0
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// One TAP stream for the whole run. An errored suite is a single
    /// failing test so the plan still accounts for it.
    pub fn to_tap(&self) -> String {
        let mut tap = Tap::new();
        for suite in &self.suites {
            match suite {
                SuiteEntry::Completed(report) => report.write_tap(&mut tap),
                SuiteEntry::Errored { language, error } => {
                    tap.not_ok(format!("{}: suite", language), error.clone())
                }
            }
        }
        tap.render()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for suite in &self.suites {
            match suite {
                SuiteEntry::Completed(report) => write!(f, "{}", report)?,
                SuiteEntry::Errored { language, error } => {
                    writeln!(f, "Conformance [{}]: ERROR {}", language, error)?
                }
            }
        }
        let (total, passed) = self
            .completed()
            .fold((0, 0), |(t, p), r| (t + r.total, p + r.passed));
        writeln!(
            f,
            "Total: {}/{} passed across {} suite(s), {} failing fixture(s), {} errored suite(s)",
            passed,
            total,
            self.suites.len(),
            self.failure_count(),
            self.errored()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::{compare, MismatchKind};
    use crate::sexp::parse_annotation;
    use std::path::Path;

    fn outcome(name: &str, line: usize, verdict: Verdict) -> FixtureOutcome {
        FixtureOutcome {
            name: name.to_string(),
            origin: Origin {
                file: PathBuf::from("corpus/basic.txt"),
                line,
            },
            handle: HandleId::new(1),
            verdict,
        }
    }

    fn report(outcomes: Vec<FixtureOutcome>) -> SuiteReport {
        SuiteReport::tally(
            "dockerfile",
            Path::new("dockerfile.grammar").into(),
            HandleId::new(1),
            "ab".repeat(32),
            outcomes,
        )
    }

    fn mismatch() -> FixtureFailure {
        let expected = parse_annotation("(source_file (from_instruction (image_spec)))").unwrap();
        let actual = parse_annotation("(source_file (from_instruction))").unwrap();
        let m = compare(&expected, &actual).unwrap_err();
        assert!(matches!(m.kind, MismatchKind::MissingChild { .. }));
        FixtureFailure::StructuralMismatch(m)
    }

    #[test]
    fn display_lists_each_failure_with_location() {
        let r = report(vec![
            outcome("FROM alpine", 1, Verdict::Failed { failure: mismatch() }),
            outcome("comment", 9, Verdict::Passed),
            outcome("heredoc", 15, Verdict::Skipped),
            outcome(
                "boom",
                21,
                Verdict::Failed {
                    failure: FixtureFailure::ParserCrash("panicked".into()),
                },
            ),
        ]);
        let text = r.to_string();
        assert!(text.starts_with(
            "Conformance [dockerfile]: 1/4 passed (1 failed, 1 crashed, 0 malformed, 1 skipped)"
        ));
        assert!(text.contains("FAIL [corpus/basic.txt:1] FROM alpine"));
        assert!(text.contains("image_spec"));
        assert!(text.contains("FAIL [corpus/basic.txt:21] boom"));
        assert!(!r.is_success());
        assert_eq!(r.failure_count(), 2);
    }

    #[test]
    fn json_tags_verdicts_and_failures() {
        let r = report(vec![
            outcome("ok", 1, Verdict::Passed),
            outcome(
                "bad",
                5,
                Verdict::Failed {
                    failure: FixtureFailure::FixtureMalformed("no divider".into()),
                },
            ),
        ]);
        let json: serde_json::Value = serde_json::from_str(&r.to_json().unwrap()).unwrap();
        assert_eq!(json["handle"], 1);
        assert_eq!(json["outcomes"][0]["verdict"]["status"], "passed");
        assert_eq!(json["outcomes"][1]["verdict"]["status"], "failed");
        assert_eq!(
            json["outcomes"][1]["verdict"]["failure"]["kind"],
            "fixture_malformed"
        );
        assert_eq!(json["malformed"], 1);
    }

    #[test]
    fn run_report_counts_errored_suites() {
        let mut run = RunReport::new();
        run.record("dockerfile", Ok(report(vec![outcome("ok", 1, Verdict::Passed)])));
        run.record(
            "yaml",
            Err(SuiteError::CorpusNotFound {
                language: "yaml".into(),
                dir: PathBuf::from("yaml/corpus"),
            }),
        );
        assert!(!run.is_success());
        assert_eq!(run.errored(), 1);
        assert_ne!(run.started_at, "unknown");

        let tap = run.to_tap();
        assert!(tap.contains("ok 1 - dockerfile: ok"));
        assert!(tap.contains("not ok 2 - yaml: suite"));
        assert!(run.to_string().contains("Conformance [yaml]: ERROR no corpus"));
    }
}
