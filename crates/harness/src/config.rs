//! Harness configuration file.
//!
//! # Example
//!
//! ```toml
//! [harness]
//! corpus_root = "grammars"
//! corpus_dir = "{language}/test/corpus"
//! jobs = 8
//! parse_timeout_ms = 5000
//!
//! [languages.dockerfile]
//! artifact = "target/parsers/dockerfile"
//!
//! [languages.yaml]
//! artifact = "target/parsers/yaml"
//! corpus = "vendor/yaml/corpus"
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::runner::RunnerConfig;

/// Environment variable naming the config file used by
/// [`HarnessConfig::from_env`].
pub const CONFIG_ENV: &str = "GRAMMAR_CONFORMANCE_CONFIG";

/// File looked up in the working directory when [`CONFIG_ENV`] is unset.
pub const DEFAULT_CONFIG_FILE: &str = "grammar-conformance.toml";

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub harness: HarnessSettings,
    /// Per-language settings, keyed by language id.
    #[serde(default)]
    pub languages: BTreeMap<String, LanguageConfig>,
}

/// `[harness]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessSettings {
    /// Directory the corpus template is resolved against.
    #[serde(default = "default_corpus_root")]
    pub corpus_root: PathBuf,
    /// Per-language corpus directory; `{language}` is replaced by the id.
    #[serde(default = "default_corpus_dir")]
    pub corpus_dir: String,
    /// Fixtures parsed concurrently. Defaults to the available parallelism.
    pub jobs: Option<usize>,
    /// A parse running longer than this is reported as a crash.
    pub parse_timeout_ms: Option<u64>,
    /// Only run fixtures whose name contains this text.
    pub filter: Option<String>,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        HarnessSettings {
            corpus_root: default_corpus_root(),
            corpus_dir: default_corpus_dir(),
            jobs: None,
            parse_timeout_ms: None,
            filter: None,
        }
    }
}

fn default_corpus_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_corpus_dir() -> String {
    "{language}/corpus".to_string()
}

/// `[languages.<id>]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageConfig {
    /// Path to the compiled parser artifact.
    pub artifact: PathBuf,
    /// Corpus directory, overriding the `[harness]` template.
    pub corpus: Option<PathBuf>,
}

// ── Functions ─────────────────────────────────────────────────────────────────

/// Read and parse a harness config TOML file from `path`.
pub fn read_harness_config(path: &Path) -> Result<HarnessConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    HarnessConfig::parse(&content, base).map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

impl HarnessConfig {
    /// Parse config text, resolving relative paths against `base`.
    pub fn parse(content: &str, base: &Path) -> Result<Self, String> {
        let mut config: HarnessConfig = toml::from_str(content).map_err(|e| e.to_string())?;
        if config.harness.jobs == Some(0) {
            return Err("harness.jobs must be at least 1".to_string());
        }
        config.resolve_paths(base);
        Ok(config)
    }

    /// The file named by [`CONFIG_ENV`], else [`DEFAULT_CONFIG_FILE`] if it
    /// exists, else defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => read_harness_config(Path::new(&path)),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                read_harness_config(Path::new(DEFAULT_CONFIG_FILE))
            }
            None => Ok(HarnessConfig::default()),
        }
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.harness.corpus_root);
        for language in self.languages.values_mut() {
            resolve(&mut language.artifact);
            if let Some(corpus) = &mut language.corpus {
                resolve(corpus);
            }
        }
    }

    pub fn language(&self, id: &str) -> Result<&LanguageConfig, ConfigError> {
        self.languages
            .get(id)
            .ok_or_else(|| ConfigError::UnknownLanguage(id.to_string()))
    }

    pub fn runner_config(&self) -> RunnerConfig {
        let settings = &self.harness;
        let mut runner = RunnerConfig::new(settings.corpus_root.clone());
        runner.corpus_dir = settings.corpus_dir.clone();
        runner.corpus_overrides = self
            .languages
            .iter()
            .filter_map(|(id, lang)| lang.corpus.clone().map(|dir| (id.clone(), dir)))
            .collect();
        if let Some(jobs) = settings.jobs {
            runner.jobs = jobs;
        }
        runner.parse_timeout = settings.parse_timeout_ms.map(Duration::from_millis);
        runner.filter = settings.filter.clone();
        runner
    }
}
