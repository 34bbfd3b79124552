//! Bounded-memory, use-counted streaming file cache for audio sound banks.
//!
//! The crate is organised around [`cache::FileCacheManager`]:
//!
//! - [`entry`]: identifiers, scopes, flags and the per-entry state
//! - [`arena`]: the byte arena payload blocks are allocated from
//! - [`backend`]: the audio backend and filesystem capabilities
//! - [`stream`]: asynchronous read engines and their completion channel
//! - [`manifest`]: authored preload requests
//! - [`config`]: cache configuration
//! - [`cache`]: registry, admission, streaming, preload and reporting
//!
//! Per-entry failures (missing files, out of memory, stream errors) never
//! surface as [`Error`]s. They are statuses plus events sent to the
//! injected [`bankcache_events::EventSink`].

pub mod arena;
pub mod backend;
pub mod cache;
pub mod config;
pub mod entry;
pub mod error;
pub mod manifest;
pub mod stream;

#[cfg(test)]
mod test_utils;

pub use cache::{CacheReport, FileCacheManager, RequestStatus};
pub use config::CacheConfig;
pub use entry::{DataScope, EntryStatus, FileEntryId, PreloadRequestId};
pub use error::{Error, Result};
