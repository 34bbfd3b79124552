//! Event type definitions for structured cache events.
//!
//! Every diagnostic the file cache produces is a [`CacheEvent`]: a typed
//! [`CacheEventKind`] plus the time it was raised. Severity is derived from the
//! kind so sinks never disagree on how loud an event is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How loudly an event should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Bookkeeping noise, normally filtered out.
    Trace,
    /// State transitions useful while debugging the cache.
    Debug,
    /// Expected but noteworthy situations (always logged).
    Info,
    /// Suspicious situations that are not failures.
    Warn,
    /// Failures the user should be made aware of.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// The payload of a cache event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheEventKind {
    /// A new file entry was added to the registry.
    EntryRegistered {
        /// Normalized entry path.
        path: String,
        /// Size on disk in bytes.
        size: u64,
    },
    /// An entry was removed from the registry.
    EntryUnregistered {
        /// Normalized entry path.
        path: String,
    },
    /// The file backing a new entry does not exist.
    FileNotFound {
        /// Normalized entry path.
        path: String,
    },
    /// A use-counted entry was re-registered by an auto-loading request.
    UpgradedToAutoLoading {
        /// Normalized entry path.
        path: String,
    },
    /// Level teardown restored manual loading on an upgraded entry.
    DowngradedToManualLoading {
        /// Normalized entry path.
        path: String,
    },
    /// A cache attempt targeted an entry whose file was never found.
    CacheTargetMissing {
        /// Normalized entry path.
        path: String,
    },
    /// Neither the byte budget nor the arena could hold the entry.
    OutOfMemory {
        /// Normalized entry path.
        path: String,
        /// Requested size in bytes.
        size: u64,
    },
    /// A cache request hit an entry that is already streaming in.
    AlreadyLoading {
        /// Normalized entry path.
        path: String,
    },
    /// An uncache request aborted an in-flight load.
    RemovingLoadingEntry {
        /// Normalized entry path.
        path: String,
    },
    /// A previously failed allocation was reset so it can be retried.
    ResettingMemAllocFail {
        /// Normalized entry path.
        path: String,
    },
    /// An asynchronous read was issued.
    StreamStarted {
        /// Normalized entry path.
        path: String,
        /// Bytes requested.
        size: u64,
    },
    /// The I/O engine refused to start a read.
    StreamStartFailed {
        /// Normalized entry path.
        path: String,
        /// Engine supplied reason.
        reason: String,
    },
    /// A read finished with the user-abort sentinel.
    StreamAborted {
        /// Normalized entry path.
        path: String,
    },
    /// A read finished with an I/O error.
    StreamFailed {
        /// Normalized entry path.
        path: String,
        /// Engine error code.
        code: u32,
    },
    /// A completion arrived for a stream the entry no longer waits on.
    StaleCompletion {
        /// Normalized entry path.
        path: String,
        /// Identifier of the superseded stream.
        stream: u64,
    },
    /// An entry finished loading and is resident.
    EntryCached {
        /// Normalized entry path.
        path: String,
        /// Resident bytes.
        size: u64,
    },
    /// An entry released its memory block.
    EntryUncached {
        /// Normalized entry path.
        path: String,
        /// Bytes returned to the budget.
        size: u64,
    },
    /// A full sweep over removable entries ran.
    EvictionSweep {
        /// Number of entries evicted.
        evicted: usize,
        /// Bytes freed by the sweep.
        freed: u64,
    },
    /// A localized entry picked up its locale specific path and size.
    LocalizedEntryRefreshed {
        /// Normalized entry path after the refresh.
        path: String,
        /// Size on disk after the refresh.
        size: u64,
    },
}

impl CacheEventKind {
    /// Severity this kind of event is reported at.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::StaleCompletion { .. } => Severity::Trace,
            Self::EntryRegistered { .. }
            | Self::EntryUnregistered { .. }
            | Self::StreamStarted { .. }
            | Self::EntryCached { .. }
            | Self::EntryUncached { .. }
            | Self::EvictionSweep { .. }
            | Self::LocalizedEntryRefreshed { .. } => Severity::Debug,
            Self::UpgradedToAutoLoading { .. }
            | Self::DowngradedToManualLoading { .. }
            | Self::RemovingLoadingEntry { .. }
            | Self::ResettingMemAllocFail { .. }
            | Self::StreamAborted { .. } => Severity::Info,
            Self::FileNotFound { .. } | Self::AlreadyLoading { .. } => Severity::Warn,
            Self::CacheTargetMissing { .. }
            | Self::OutOfMemory { .. }
            | Self::StreamStartFailed { .. }
            | Self::StreamFailed { .. } => Severity::Error,
        }
    }

    /// Stable dotted identifier, used as the `event_type` tracing field.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::EntryRegistered { .. } => "entry.registered",
            Self::EntryUnregistered { .. } => "entry.unregistered",
            Self::FileNotFound { .. } => "entry.file_not_found",
            Self::UpgradedToAutoLoading { .. } => "entry.upgraded",
            Self::DowngradedToManualLoading { .. } => "entry.downgraded",
            Self::CacheTargetMissing { .. } => "cache.target_missing",
            Self::OutOfMemory { .. } => "cache.out_of_memory",
            Self::AlreadyLoading { .. } => "cache.already_loading",
            Self::RemovingLoadingEntry { .. } => "cache.removing_loading",
            Self::ResettingMemAllocFail { .. } => "cache.reset_mem_alloc_fail",
            Self::StreamStarted { .. } => "stream.started",
            Self::StreamStartFailed { .. } => "stream.start_failed",
            Self::StreamAborted { .. } => "stream.aborted",
            Self::StreamFailed { .. } => "stream.failed",
            Self::StaleCompletion { .. } => "stream.stale",
            Self::EntryCached { .. } => "cache.cached",
            Self::EntryUncached { .. } => "cache.uncached",
            Self::EvictionSweep { .. } => "cache.eviction_sweep",
            Self::LocalizedEntryRefreshed { .. } => "entry.localized_refresh",
        }
    }

    /// Path of the entry the event is about, if it concerns a single entry.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::EntryRegistered { path, .. }
            | Self::EntryUnregistered { path }
            | Self::FileNotFound { path }
            | Self::UpgradedToAutoLoading { path }
            | Self::DowngradedToManualLoading { path }
            | Self::CacheTargetMissing { path }
            | Self::OutOfMemory { path, .. }
            | Self::AlreadyLoading { path }
            | Self::RemovingLoadingEntry { path }
            | Self::ResettingMemAllocFail { path }
            | Self::StreamStarted { path, .. }
            | Self::StreamStartFailed { path, .. }
            | Self::StreamAborted { path }
            | Self::StreamFailed { path, .. }
            | Self::StaleCompletion { path, .. }
            | Self::EntryCached { path, .. }
            | Self::EntryUncached { path, .. }
            | Self::LocalizedEntryRefreshed { path, .. } => Some(path),
            Self::EvictionSweep { .. } => None,
        }
    }
}

impl fmt::Display for CacheEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EntryRegistered { path, size } => {
                write!(f, "registered file entry {path} ({size} bytes)")
            }
            Self::EntryUnregistered { path } => write!(f, "removed file entry {path}"),
            Self::FileNotFound { path } => {
                write!(f, "couldn't find audio file {path} for pre-loading")
            }
            Self::UpgradedToAutoLoading { path } => write!(
                f,
                "upgraded file entry from \"manual loading\" to \"auto loading\": {path}"
            ),
            Self::DowngradedToManualLoading { path } => write!(
                f,
                "downgraded file entry from \"auto loading\" to \"manual loading\": {path}"
            ),
            Self::CacheTargetMissing { path } => write!(
                f,
                "could not cache \"{path}\" as it was not found at the target location"
            ),
            Self::OutOfMemory { path, size } => write!(
                f,
                "could not cache \"{path}\" ({size} bytes) as we are out of memory"
            ),
            Self::AlreadyLoading { path } => {
                write!(f, "could not cache \"{path}\" as it's already loading")
            }
            Self::RemovingLoadingEntry { path } => {
                write!(f, "trying to remove a loading file cache entry {path}")
            }
            Self::ResettingMemAllocFail { path } => {
                write!(f, "resetting a memalloc-failed file cache entry {path}")
            }
            Self::StreamStarted { path, size } => {
                write!(f, "streaming {size} bytes from {path}")
            }
            Self::StreamStartFailed { path, reason } => {
                write!(f, "failed to start streaming {path}: {reason}")
            }
            Self::StreamAborted { path } => write!(f, "user aborted stream for file {path}"),
            Self::StreamFailed { path, code } => {
                write!(f, "failed to stream in file {path} (error: {code})")
            }
            Self::StaleCompletion { path, stream } => {
                write!(f, "ignored completion of superseded stream {stream} for {path}")
            }
            Self::EntryCached { path, size } => write!(f, "cached {path} ({size} bytes)"),
            Self::EntryUncached { path, size } => write!(f, "uncached {path} ({size} bytes)"),
            Self::EvictionSweep { evicted, freed } => {
                write!(f, "evicted {evicted} removable entries, freed {freed} bytes")
            }
            Self::LocalizedEntryRefreshed { path, size } => {
                write!(f, "refreshed localized entry {path} ({size} bytes)")
            }
        }
    }
}

/// A cache event with its timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEvent {
    /// When the event was raised.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub kind: CacheEventKind,
}

impl CacheEvent {
    /// Create an event stamped with the current time.
    #[must_use]
    pub fn new(kind: CacheEventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
        }
    }

    /// Severity of the underlying kind.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        self.kind.severity()
    }
}

impl From<CacheEventKind> for CacheEvent {
    fn from(kind: CacheEventKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for CacheEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}
