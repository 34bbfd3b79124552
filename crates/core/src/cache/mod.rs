//! The file cache manager.
//!
//! [`FileCacheManager`] keeps sound bank payloads resident in a bounded heap.
//! It is split into cooperating parts that all operate on the same manager:
//!
//! - `registry`: the id → [`FileEntry`] map and scope-based registration
//! - `admission`: the byte ledger, `fits` and the eviction sweep
//! - `streaming`: the per-entry state machine driven by stream completions
//! - `preload`: named preload requests and batch status aggregation
//! - `localized`: re-resolving localized entries after a language switch
//! - `report`: a data snapshot for debug overlays and the CLI
//!
//! The manager is single-owner. Control-plane calls take `&mut self`; the
//! only concurrency is the stream engine, which reports completions over a
//! channel that the manager drains in [`FileCacheManager::process_completions`]
//! or while blocking in a synchronous load.
//!
//! ```rust
//! use bankcache_core::backend::{DirectoryBackend, InMemoryFileSystem};
//! use bankcache_core::cache::FileCacheManager;
//! use bankcache_core::config::CacheConfig;
//! use bankcache_core::entry::{DataScope, EntryStatus};
//! use bankcache_core::manifest::FileNode;
//! use bankcache_core::stream::ManualStreamEngine;
//!
//! # fn main() -> bankcache_core::Result<()> {
//! let fs = InMemoryFileSystem::new();
//! fs.insert("/banks/ui.bank", 2048);
//!
//! let mut fcm = FileCacheManager::builder(CacheConfig::default(), DirectoryBackend::new("/banks", "english"))
//!     .with_file_system(fs)
//!     .with_stream_engine(ManualStreamEngine::auto_completing())
//!     .build()?;
//!
//! let id = fcm.register(&FileNode::new("ui.bank"), DataScope::Global, true)?;
//! assert!(fcm.cache_entry(id, true));
//! assert_eq!(fcm.entry(id).map(|e| e.status()), Some(EntryStatus::Cached));
//! # Ok(())
//! # }
//! ```

mod admission;
mod localized;
mod preload;
mod registry;
mod report;
mod streaming;

pub use admission::Ledger;
pub use preload::{PreloadRequest, RequestStatus};
pub use registry::FileEntryRegistry;
pub use report::{CacheReport, EntryReport};

use crate::Result;
use crate::arena::{BudgetArena, ByteArena};
use crate::backend::{AudioBackend, FileSystem, LocalFileSystem};
use crate::config::CacheConfig;
use crate::entry::{FileEntry, FileEntryId, PreloadRequestId};
use crate::stream::{
    CompletionReceiver, CompletionSender, StreamEngine, StreamId, TokioStreamEngine,
    completion_channel,
};
use bankcache_events::{CacheEvent, CacheEventKind, EventSink, TracingSink};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Bounded-memory, use-counted streaming cache for audio files.
pub struct FileCacheManager<B: AudioBackend> {
    config: CacheConfig,
    registry: FileEntryRegistry,
    preloads: IndexMap<PreloadRequestId, PreloadRequest>,
    ledger: Ledger,
    arena: Box<dyn ByteArena>,
    backend: B,
    fs: Arc<dyn FileSystem>,
    engine: Arc<dyn StreamEngine>,
    events: Arc<dyn EventSink>,
    completions_tx: CompletionSender,
    completions_rx: CompletionReceiver,
    next_stream: u64,
    // Streams aborted by an uncache, waiting for their confirming completion.
    aborted: HashMap<StreamId, String>,
}

impl<B: AudioBackend> FileCacheManager<B> {
    /// Start building a manager around `backend`.
    #[must_use]
    pub fn builder(config: CacheConfig, backend: B) -> FileCacheManagerBuilder<B> {
        FileCacheManagerBuilder::new(config, backend)
    }

    /// Configuration the manager was built with.
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Bytes currently held by loading and cached entries.
    #[must_use]
    pub const fn current_bytes(&self) -> u64 {
        self.ledger.current()
    }

    /// Byte budget.
    #[must_use]
    pub const fn max_bytes(&self) -> u64 {
        self.ledger.max()
    }

    /// The byte ledger.
    #[must_use]
    pub const fn ledger(&self) -> Ledger {
        self.ledger
    }

    /// Look up an entry.
    #[must_use]
    pub fn entry(&self, id: FileEntryId) -> Option<&FileEntry> {
        self.registry.get(id)
    }

    /// All entries in registration order.
    #[must_use]
    pub const fn registry(&self) -> &FileEntryRegistry {
        &self.registry
    }

    /// The audio backend.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable access to the audio backend, e.g. to switch language before
    /// [`FileCacheManager::update_localized_entries`].
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    fn emit(&self, kind: CacheEventKind) {
        self.events.emit(CacheEvent::new(kind));
    }

    fn next_stream_id(&mut self) -> StreamId {
        self.next_stream += 1;
        StreamId::new(self.next_stream)
    }
}

impl<B: AudioBackend + fmt::Debug> fmt::Debug for FileCacheManager<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileCacheManager")
            .field("config", &self.config)
            .field("ledger", &self.ledger)
            .field("entries", &self.registry.len())
            .field("preloads", &self.preloads.len())
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

/// Builder for [`FileCacheManager`].
///
/// Every collaborator has a default: the local filesystem, a tokio stream
/// engine with `ioWorkers` threads, a [`BudgetArena`] sized to the byte
/// budget and a [`TracingSink`].
pub struct FileCacheManagerBuilder<B: AudioBackend> {
    config: CacheConfig,
    backend: B,
    fs: Option<Arc<dyn FileSystem>>,
    engine: Option<Arc<dyn StreamEngine>>,
    arena: Option<Box<dyn ByteArena>>,
    events: Option<Arc<dyn EventSink>>,
}

impl<B: AudioBackend> FileCacheManagerBuilder<B> {
    /// Create a builder with default collaborators.
    #[must_use]
    pub fn new(config: CacheConfig, backend: B) -> Self {
        Self {
            config,
            backend,
            fs: None,
            engine: None,
            arena: None,
            events: None,
        }
    }

    /// Use `fs` for file size queries.
    #[must_use]
    pub fn with_file_system<F>(mut self, fs: F) -> Self
    where
        F: FileSystem + 'static,
    {
        self.fs = Some(Arc::new(fs));
        self
    }

    /// Use `engine` for reads.
    #[must_use]
    pub fn with_stream_engine<E>(mut self, engine: E) -> Self
    where
        E: StreamEngine + 'static,
    {
        self.engine = Some(Arc::new(engine));
        self
    }

    /// Allocate payload blocks from `arena`.
    #[must_use]
    pub fn with_arena<A>(mut self, arena: A) -> Self
    where
        A: ByteArena + 'static,
    {
        self.arena = Some(Box::new(arena));
        self
    }

    /// Send events to `sink`.
    #[must_use]
    pub fn with_event_sink<S>(mut self, sink: S) -> Self
    where
        S: EventSink + 'static,
    {
        self.events = Some(Arc::new(sink));
        self
    }

    /// Build the manager.
    ///
    /// # Errors
    ///
    /// Returns an error if the default stream engine cannot start its runtime.
    pub fn build(self) -> Result<FileCacheManager<B>> {
        let max_bytes = self.config.max_bytes();
        let engine: Arc<dyn StreamEngine> = match self.engine {
            Some(engine) => engine,
            None => Arc::new(TokioStreamEngine::new(self.config.io_workers)?),
        };
        let (completions_tx, completions_rx) = completion_channel();

        Ok(FileCacheManager {
            registry: FileEntryRegistry::new(),
            preloads: IndexMap::new(),
            ledger: Ledger::new(max_bytes),
            arena: self
                .arena
                .unwrap_or_else(|| Box::new(BudgetArena::new(max_bytes))),
            backend: self.backend,
            fs: self.fs.unwrap_or_else(|| Arc::new(LocalFileSystem)),
            engine,
            events: self.events.unwrap_or_else(|| Arc::new(TracingSink)),
            completions_tx,
            completions_rx,
            next_stream: 0,
            aborted: HashMap::new(),
            config: self.config,
        })
    }
}
