//! Snapshot of the cache for debug overlays and tooling.

use super::FileCacheManager;
use crate::backend::AudioBackend;
use crate::config::DebugFilter;
use crate::entry::{DataScope, EntryFlags, EntryStatus, FileEntry, FileEntryId};
use chrono::Utc;
use serde::Serialize;
use std::fmt;

/// One row of a [`CacheReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryReport {
    /// Entry id.
    pub id: FileEntryId,
    /// Normalized path.
    pub path: String,
    /// Size on disk in bytes.
    pub size: u64,
    /// Current state.
    pub status: EntryStatus,
    /// Registration scope.
    pub scope: DataScope,
    /// Use count, for use-counted entries only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_count: Option<u32>,
    /// Cached with no users.
    pub removable: bool,
    /// Language dependent.
    pub localized: bool,
    /// Seconds since the entry became resident.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_for_secs: Option<f64>,
}

impl EntryReport {
    fn from_entry(entry: &FileEntry) -> Self {
        let use_counted = entry.flags().contains(EntryFlags::USE_COUNTED);
        #[allow(clippy::cast_precision_loss)]
        let cached_for_secs = entry
            .cached_at()
            .map(|at| (Utc::now() - at).num_milliseconds() as f64 / 1000.0);
        Self {
            id: entry.id(),
            path: entry.display_path(),
            size: entry.size(),
            status: entry.status(),
            scope: entry.scope(),
            use_count: use_counted.then(|| entry.use_count()),
            removable: entry.flags().contains(EntryFlags::REMOVABLE),
            localized: entry.flags().contains(EntryFlags::LOCALIZED),
            cached_for_secs,
        }
    }
}

impl fmt::Display for EntryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.size < 1024 {
            write!(f, "{} ({} Byte)", self.path, self.size)?;
        } else {
            write!(f, "{} ({} KiB)", self.path, self.size >> 10)?;
        }
        if let Some(use_count) = self.use_count {
            write!(f, " [{use_count}]")?;
        }
        write!(f, " {}", self.status)?;
        if self.removable {
            f.write_str(", removable")?;
        }
        Ok(())
    }
}

/// State of the whole cache at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheReport {
    /// Bytes held by loading and cached entries.
    pub current_bytes: u64,
    /// Byte budget.
    pub max_bytes: u64,
    /// Number of registered entries, filtered or not.
    pub entry_count: usize,
    /// Rows passing the filter, global entries first.
    pub entries: Vec<EntryReport>,
}

impl fmt::Display for CacheReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "FileCacheManager ({} of {} KiB) [Entries: {}]",
            self.current_bytes >> 10,
            self.max_bytes >> 10,
            self.entry_count
        )?;
        for entry in &self.entries {
            writeln!(f, "  {entry}")?;
        }
        Ok(())
    }
}

fn passes(filter: DebugFilter, entry: &FileEntry) -> bool {
    let scope_flag = match entry.scope() {
        DataScope::Global => DebugFilter::GLOBALS,
        DataScope::LevelSpecific => DebugFilter::LEVEL_SPECIFICS,
    };
    filter == DebugFilter::ALL
        || filter.contains(scope_flag)
        || (filter.contains(DebugFilter::USE_COUNTED)
            && entry.flags().contains(EntryFlags::USE_COUNTED))
}

impl<B: AudioBackend> FileCacheManager<B> {
    /// Snapshot the entries passing `filter`.
    #[must_use]
    pub fn report(&self, filter: DebugFilter) -> CacheReport {
        CacheReport {
            current_bytes: self.ledger.current(),
            max_bytes: self.ledger.max(),
            entry_count: self.registry.len(),
            entries: self
                .rows(DataScope::Global, filter)
                .chain(self.rows(DataScope::LevelSpecific, filter))
                .collect(),
        }
    }

    fn rows(
        &self,
        scope: DataScope,
        filter: DebugFilter,
    ) -> impl Iterator<Item = EntryReport> + '_ {
        self.registry
            .iter()
            .filter(move |e| e.scope() == scope && passes(filter, e))
            .map(EntryReport::from_entry)
    }

    /// Snapshot using the configured filter.
    #[must_use]
    pub fn default_report(&self) -> CacheReport {
        self.report(self.config.debug_filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{Fixture, KIB};

    fn populated() -> Fixture {
        let mut fx = Fixture::new(64);
        fx.register("level.bank", 2 * KIB, DataScope::LevelSpecific, true);
        let vo = fx.register("vo.bank", KIB, DataScope::Global, false);
        fx.register("ui.bank", 512, DataScope::Global, true);
        fx.cache_now(vo);
        fx
    }

    #[test]
    fn test_report_lists_globals_first() {
        let fx = populated();
        let report = fx.manager.report(DebugFilter::ALL);
        assert_eq!(report.entry_count, 3);
        let scopes: Vec<_> = report.entries.iter().map(|e| e.scope).collect();
        assert_eq!(
            scopes,
            vec![DataScope::Global, DataScope::Global, DataScope::LevelSpecific]
        );
        assert_eq!(report.current_bytes, KIB);
    }

    #[test]
    fn test_report_filters() {
        let fx = populated();
        assert_eq!(fx.manager.report(DebugFilter::GLOBALS).entries.len(), 2);
        assert_eq!(fx.manager.report(DebugFilter::LEVEL_SPECIFICS).entries.len(), 1);

        let use_counted = fx.manager.report(DebugFilter::USE_COUNTED);
        assert_eq!(use_counted.entries.len(), 1);
        assert_eq!(use_counted.entries[0].use_count, Some(1));
        assert!(use_counted.entries[0].cached_for_secs.is_some());
    }

    #[test]
    fn test_report_display() {
        let fx = populated();
        let text = fx.manager.report(DebugFilter::ALL).to_string();
        assert!(text.starts_with("FileCacheManager (1 of 64 KiB) [Entries: 3]"));
        assert!(text.contains("vo.bank (1 KiB) [1] cached"));
        assert!(text.contains("ui.bank (512 Byte) not cached"));
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let fx = populated();
        let json = serde_json::to_value(fx.manager.report(DebugFilter::ALL)).unwrap();
        assert_eq!(json["maxBytes"], 64 * 1024);
        assert_eq!(json["entries"][2]["scope"], "level-specific");
    }
}
