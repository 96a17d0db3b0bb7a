//! The Parser Loader: memoized, deferred initialization of parser artifacts.
//!
//! [`ParserLoader::create_parser`] returns a [`PendingParser`] right away.
//! The artifact is only initialized when someone calls
//! [`PendingParser::resolve`]; concurrent resolvers of the same resolved
//! path share a single initialization through a pending-initialization
//! cell, and the outcome (handle or error) is kept for the lifetime of the
//! loader.
//!
//! A loader is a plain value. Two loaders never share handles, so parallel
//! runs with their own loaders cannot interfere.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::artifact::{Artifact, ArtifactFormat, CommandFormat};
use crate::error::{LoadError, ParseError};
use crate::syntax::{GrammarParser, SyntaxNode};

/// Identifies one initialized handle within a loader.
///
/// Reloading an artifact (after [`ParserLoader::evict`]) yields a new id,
/// so outcomes can always be traced back to the exact handle that
/// produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct HandleId(u64);

impl HandleId {
    pub(crate) fn new(id: u64) -> Self {
        HandleId(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A live parser bound to one artifact. Cheap to clone; never mutated.
#[derive(Clone)]
pub struct ParserHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    id: HandleId,
    artifact: Artifact,
    format: String,
    fingerprint: String,
    parser: Arc<dyn GrammarParser>,
}

impl ParserHandle {
    pub fn id(&self) -> HandleId {
        self.inner.id
    }

    pub fn artifact(&self) -> &Artifact {
        &self.inner.artifact
    }

    pub fn format_id(&self) -> &str {
        &self.inner.format
    }

    /// SHA-256 of the artifact bytes at load time.
    pub fn fingerprint(&self) -> &str {
        &self.inner.fingerprint
    }

    /// The underlying parser, for callers that need to move it into a task.
    pub fn parser(&self) -> Arc<dyn GrammarParser> {
        Arc::clone(&self.inner.parser)
    }

    pub async fn parse(&self, source: &str) -> Result<SyntaxNode, ParseError> {
        self.inner.parser.parse(source).await
    }
}

impl fmt::Debug for ParserHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserHandle")
            .field("id", &self.inner.id)
            .field("artifact", &self.inner.artifact)
            .field("format", &self.inner.format)
            .field("fingerprint", &self.inner.fingerprint)
            .finish_non_exhaustive()
    }
}

type Slot = Arc<OnceCell<Result<ParserHandle, LoadError>>>;

struct LoaderInner {
    formats: Vec<Arc<dyn ArtifactFormat>>,
    slots: Mutex<HashMap<PathBuf, Slot>>,
    next_id: AtomicU64,
    loads: AtomicUsize,
}

/// Creates parser handles from artifact paths, memoized by resolved path.
#[derive(Clone)]
pub struct ParserLoader {
    inner: Arc<LoaderInner>,
}

impl Default for ParserLoader {
    fn default() -> Self {
        ParserLoader::new()
    }
}

impl ParserLoader {
    /// A loader that understands command artifacts.
    pub fn new() -> Self {
        ParserLoader::with_formats(vec![Arc::new(CommandFormat::new())])
    }

    /// A loader with an explicit list of formats, tried in order.
    pub fn with_formats(formats: Vec<Arc<dyn ArtifactFormat>>) -> Self {
        ParserLoader {
            inner: Arc::new(LoaderInner {
                formats,
                slots: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                loads: AtomicUsize::new(0),
            }),
        }
    }

    /// Return a deferred handle for the artifact at `path`.
    ///
    /// Never fails and never initializes anything; errors surface from
    /// [`PendingParser::resolve`].
    pub fn create_parser(&self, path: impl AsRef<Path>) -> PendingParser {
        let requested = path.as_ref().to_path_buf();
        let key = resolve_key(&requested);
        let slot = {
            let mut slots = self
                .inner
                .slots
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(key.clone()).or_default())
        };
        PendingParser {
            requested,
            key,
            slot,
            loader: Arc::clone(&self.inner),
        }
    }

    /// Forget the memoized handle for `path`; the next `create_parser`
    /// for it initializes the artifact again under a new [`HandleId`].
    ///
    /// Pending parsers created earlier keep resolving to the old handle.
    pub fn evict(&self, path: impl AsRef<Path>) -> bool {
        let key = resolve_key(path.as_ref());
        self.inner
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key)
            .is_some()
    }

    /// How many artifact initializations have actually run.
    pub fn load_count(&self) -> usize {
        self.inner.loads.load(Ordering::SeqCst)
    }
}

/// Canonical path when the artifact exists, the path as given otherwise
/// (so a missing artifact is reported under the name the caller used).
fn resolve_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

impl LoaderInner {
    async fn load(&self, key: &Path) -> Result<ParserHandle, LoadError> {
        let artifact = Artifact::locate(key).await?;
        let format = self
            .formats
            .iter()
            .find(|f| f.accepts(&artifact))
            .ok_or_else(|| LoadError::load(key, "no artifact format accepts this file"))?;

        self.loads.fetch_add(1, Ordering::SeqCst);
        debug!(
            artifact = %artifact.path.display(),
            format = format.format_id(),
            "initializing parser artifact"
        );

        let fingerprint = artifact.fingerprint().await?;
        let parser = format.load(&artifact).await?;
        let id = HandleId(self.next_id.fetch_add(1, Ordering::SeqCst));

        info!(
            artifact = %artifact.name,
            handle = %id,
            fingerprint = &fingerprint[..12],
            "parser ready"
        );
        Ok(ParserHandle {
            inner: Arc::new(HandleInner {
                id,
                artifact,
                format: format.format_id().to_string(),
                fingerprint,
                parser,
            }),
        })
    }
}

/// A parser that will be available once its artifact is initialized.
///
/// Clones share the same initialization.
#[derive(Clone)]
pub struct PendingParser {
    requested: PathBuf,
    key: PathBuf,
    slot: Slot,
    loader: Arc<LoaderInner>,
}

impl PendingParser {
    /// The path as the caller passed it.
    pub fn path(&self) -> &Path {
        &self.requested
    }

    /// The memoization key: the canonical artifact path.
    pub fn resolved_path(&self) -> &Path {
        &self.key
    }

    /// Wait for the artifact to be initialized, initializing it if nobody
    /// has yet.
    ///
    /// Dropping this future mid-initialization leaves the slot empty, so a
    /// later call starts over instead of seeing a half-built handle.
    pub async fn resolve(&self) -> Result<ParserHandle, LoadError> {
        self.slot
            .get_or_init(|| self.loader.load(&self.key))
            .await
            .clone()
    }

    /// The handle if initialization already finished successfully.
    pub fn ready(&self) -> Option<ParserHandle> {
        self.slot.get().and_then(|r| r.as_ref().ok()).cloned()
    }
}

impl fmt::Debug for PendingParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingParser")
            .field("path", &self.requested)
            .field("resolved", &self.slot.initialized())
            .finish()
    }
}
