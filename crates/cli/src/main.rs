mod commands;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

/// Report format for `grammar-test test`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum ReportFormat {
    Text,
    Json,
    Tap,
}

/// Conformance test runner for grammar parser artifacts.
#[derive(Parser)]
#[command(
    name = "grammar-test",
    version,
    about = "Conformance test runner for grammar parser artifacts"
)]
struct Cli {
    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Log loader and runner activity to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run conformance suites against parser artifacts
    Test {
        /// Harness config file (default: $GRAMMAR_CONFORMANCE_CONFIG or ./grammar-conformance.toml)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Run only this language
        #[arg(long)]
        language: Option<String>,
        /// Parser artifact for --language, overriding the config
        #[arg(long, requires = "language")]
        artifact: Option<PathBuf>,
        /// Directory holding `<language>/corpus`
        #[arg(long)]
        corpus_root: Option<PathBuf>,
        /// Only run fixtures whose name contains this text
        #[arg(long)]
        filter: Option<String>,
        /// Fixtures parsed concurrently
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        jobs: Option<u64>,
        /// Report a parse that takes longer than this as a crash
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Report format
        #[arg(long, default_value = "text", value_enum)]
        format: ReportFormat,
    },

    /// Print the normalized tree a parser artifact produces for a file
    Parse {
        /// Parser artifact
        #[arg(long)]
        artifact: PathBuf,
        /// Source file to parse
        file: PathBuf,
        /// Include [row, column] spans
        #[arg(long)]
        positions: bool,
        /// Print the concrete tree as JSON instead
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    grammar_conformance::logging::init_tracing(cli.verbose);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create tokio runtime: {}", e);
            process::exit(1);
        }
    };

    match cli.command {
        Commands::Test {
            config,
            language,
            artifact,
            corpus_root,
            filter,
            jobs,
            timeout_ms,
            format,
        } => {
            let opts = commands::test::TestOptions {
                config,
                language,
                artifact,
                corpus_root,
                filter,
                jobs: jobs.map(|j| j as usize),
                timeout_ms,
                format,
            };
            rt.block_on(commands::test::cmd_test(opts, cli.quiet));
        }
        Commands::Parse {
            artifact,
            file,
            positions,
            json,
        } => {
            rt.block_on(commands::parse::cmd_parse(&artifact, &file, positions, json));
        }
    }
}
