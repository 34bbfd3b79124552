//! Configuration for the file cache
//!
//! The cache is configured from a small TOML document:
//!
//! ```toml
//! cacheSizeKib = 65536
//! debugFilter = "GLOBALS | USE_COUNTED"
//! ioWorkers = 4
//! streamPriority = "urgent"
//! ```
//!
//! Every field is optional. Environment variables override the file.

use crate::stream::StreamPriority;
use crate::{Error, Result};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable overriding [`CacheConfig::cache_size_kib`].
pub const ENV_CACHE_SIZE_KIB: &str = "BANKCACHE_CACHE_SIZE_KIB";
/// Environment variable overriding [`CacheConfig::io_workers`].
pub const ENV_IO_WORKERS: &str = "BANKCACHE_IO_WORKERS";

const DEFAULT_CACHE_SIZE_KIB: u64 = 128 * 1024;
const DEFAULT_IO_WORKERS: usize = 2;

bitflags! {
    /// Which entries show up in a cache report.
    ///
    /// The empty set means "everything".
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct DebugFilter: u8 {
        /// Entries registered with global scope.
        const GLOBALS = 1 << 0;
        /// Entries registered with level specific scope.
        const LEVEL_SPECIFICS = 1 << 1;
        /// Use-counted entries of any scope.
        const USE_COUNTED = 1 << 2;
    }
}

impl DebugFilter {
    /// Filter that lets every entry through.
    pub const ALL: Self = Self::empty();
}

/// File cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Byte budget of the cache heap, in KiB. Zero disables caching.
    pub cache_size_kib: u64,
    /// Report filter.
    pub debug_filter: DebugFilter,
    /// Worker threads used by the tokio stream engine.
    pub io_workers: usize,
    /// Priority attached to every read request.
    pub stream_priority: StreamPriority,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_size_kib: DEFAULT_CACHE_SIZE_KIB,
            debug_filter: DebugFilter::ALL,
            io_workers: DEFAULT_IO_WORKERS,
            stream_priority: StreamPriority::Urgent,
        }
    }
}

impl CacheConfig {
    /// Byte budget in bytes.
    #[must_use]
    pub const fn max_bytes(&self) -> u64 {
        self.cache_size_kib.saturating_mul(1024)
    }

    /// Parse a configuration document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::configuration(format!("Failed to parse cache config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(e, path, "read"))?;
        Self::from_toml_str(&content)
    }

    /// Apply `BANKCACHE_*` environment overrides.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides looked up through `lookup`.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(raw) = lookup(ENV_CACHE_SIZE_KIB).filter(|s| !s.trim().is_empty()) {
            self.cache_size_kib = raw.trim().parse().map_err(|e| {
                Error::configuration(format!("{ENV_CACHE_SIZE_KIB}={raw} is not a size: {e}"))
            })?;
        }
        if let Some(raw) = lookup(ENV_IO_WORKERS).filter(|s| !s.trim().is_empty()) {
            self.io_workers = raw.trim().parse().map_err(|e| {
                Error::configuration(format!("{ENV_IO_WORKERS}={raw} is not a count: {e}"))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if self.io_workers == 0 {
            return Err(Error::configuration("ioWorkers must be at least 1"));
        }
        Ok(())
    }
}
