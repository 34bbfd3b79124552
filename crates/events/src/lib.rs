//! Structured event system for bankcache.
//!
//! The file cache reports everything it does as typed [`CacheEvent`] values
//! instead of writing to a global logger. Callers decide where events go by
//! injecting an [`EventSink`]:
//!
//! - [`TracingSink`] forwards to `tracing` under the `bankcache::fcm` target
//! - [`RecordingSink`] keeps events in memory for assertions and summaries
//! - [`TeeSink`] fans out to several sinks
//!
//! # Usage
//!
//! ```rust
//! use bankcache_events::{CacheEvent, CacheEventKind, EventSink, RecordingSink, Severity};
//!
//! let sink = RecordingSink::new();
//! sink.emit(CacheEvent::new(CacheEventKind::StreamFailed {
//!     path: "sfx/ui.bank".into(),
//!     code: 5,
//! }));
//! assert_eq!(sink.count(Severity::Error), 1);
//! ```

pub mod event;
pub mod sink;

pub use event::{CacheEvent, CacheEventKind, Severity};
pub use sink::{EventSink, RecordingSink, TARGET, TeeSink, TracingSink};
