//! Injectable destinations for cache events.
//!
//! Components never log through a process-wide logger. They are handed an
//! [`EventSink`] at construction and push every [`CacheEvent`] into it.

use crate::event::{CacheEvent, Severity};
use std::sync::{Arc, Mutex};

/// Tracing target used by [`TracingSink`].
pub const TARGET: &str = "bankcache::fcm";

/// Destination for cache events.
pub trait EventSink: Send + Sync {
    /// Deliver one event.
    fn emit(&self, event: CacheEvent);
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn emit(&self, event: CacheEvent) {
        (**self).emit(event);
    }
}

macro_rules! forward {
    ($level:expr, $event:expr) => {
        ::tracing::event!(
            target: TARGET,
            $level,
            event_type = $event.kind.event_type(),
            path = $event.kind.path().unwrap_or_default(),
            "{}",
            $event
        )
    };
}

/// Forwards events to `tracing`, one tracing event per cache event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: CacheEvent) {
        match event.severity() {
            Severity::Trace => forward!(::tracing::Level::TRACE, event),
            Severity::Debug => forward!(::tracing::Level::DEBUG, event),
            Severity::Info => forward!(::tracing::Level::INFO, event),
            Severity::Warn => forward!(::tracing::Level::WARN, event),
            Severity::Error => forward!(::tracing::Level::ERROR, event),
        }
    }
}

/// Keeps every event in memory.
///
/// Cloning shares the underlying buffer, so a clone handed to the cache can
/// be inspected from the outside.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<CacheEvent>>>,
}

impl RecordingSink {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<CacheEvent> {
        self.events
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Recorded events at or above `severity`.
    #[must_use]
    pub fn at_least(&self, severity: Severity) -> Vec<CacheEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.severity() >= severity)
            .collect()
    }

    /// Number of recorded events at [`Severity::Error`].
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    /// Number of recorded events with exactly `severity`.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.events
            .lock()
            .map(|guard| guard.iter().filter(|e| e.severity() == severity).count())
            .unwrap_or(0)
    }

    /// Drop everything recorded so far.
    pub fn clear(&self) {
        if let Ok(mut guard) = self.events.lock() {
            guard.clear();
        }
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: CacheEvent) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event);
        }
    }
}

/// Fans every event out to several sinks.
#[derive(Default, Clone)]
pub struct TeeSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl TeeSink {
    /// Create a tee with no outputs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an output.
    #[must_use]
    pub fn with(mut self, sink: impl EventSink + 'static) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }
}

impl std::fmt::Debug for TeeSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeeSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl EventSink for TeeSink {
    fn emit(&self, event: CacheEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(event.clone());
            }
            last.emit(event);
        }
    }
}
