//! The `grammar_conformance_tests!` macro.
//!
//! Turns a grammar's test file into a one-line declaration: which language,
//! which artifact. The generated `#[tokio::test]` builds a fresh loader and
//! context from the environment config (see [`crate::config`]), runs the
//! suite and fails with the full report if anything went wrong.
//!
//! # Usage
//!
//! ```rust,ignore
//! use grammar_conformance::grammar_conformance_tests;
//!
//! grammar_conformance_tests!(
//!     dockerfile,
//!     "dockerfile",
//!     concat!(env!("CARGO_MANIFEST_DIR"), "/build/dockerfile-parser")
//! );
//! ```
//!
//! A fourth argument supplies the [`RunContext`](crate::RunContext)
//! instead of reading it from the environment:
//!
//! ```rust,ignore
//! grammar_conformance_tests!(dockerfile, "dockerfile", "build/parser", my_context());
//! ```
//!
//! The calling crate needs `tokio` with the `macros` and `rt-multi-thread`
//! features as a dev-dependency.

/// Generate a conformance test for one grammar.
#[macro_export]
macro_rules! grammar_conformance_tests {
    ($name:ident, $language:expr, $artifact:expr) => {
        $crate::grammar_conformance_tests!(
            $name,
            $language,
            $artifact,
            $crate::RunContext::from_env()
                .unwrap_or_else(|e| panic!("grammar conformance config: {}", e))
        );
    };
    ($name:ident, $language:expr, $artifact:expr, $context:expr) => {
        #[tokio::test]
        async fn $name() {
            $crate::logging::init_tracing(false);
            let ctx: $crate::RunContext = $context;
            let pending = ctx.loader().create_parser($artifact);
            match $crate::test_parser(&ctx, $language, &pending).await {
                Ok(report) => assert!(report.is_success(), "{}", report),
                Err(e) => panic!("{}", e),
            }
        }
    };
}
