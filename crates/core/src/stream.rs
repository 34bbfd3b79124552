//! Asynchronous read engines and the completion channel they report on.
//!
//! An engine reads a whole file into the arena buffer it was handed and sends
//! exactly one [`StreamCompletion`] per started stream. The cache manager owns the
//! receiving end and applies completions on its own thread, so engines never
//! touch cache state.

use crate::entry::FileEntryId;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::AsyncReadExt;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// The file could not be opened.
pub const ERROR_CANT_OPEN_FILE: u32 = 0xF000_0003;
/// The file was shorter or longer than announced.
pub const ERROR_SIZE_OUT_OF_RANGE: u32 = 0xF000_0007;
/// The stream was aborted on request.
pub const ERROR_USER_ABORT: u32 = 0xF000_000D;

/// Identifier of one read, unique for the lifetime of a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId(u64);

impl StreamId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Scheduling hint passed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamPriority {
    /// Needed right now.
    #[default]
    Urgent,
    /// Regular background loading.
    Normal,
    /// Only when nothing else is queued.
    Idle,
}

/// How a stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// All bytes were read. Carries the buffer back.
    Completed(Box<[u8]>),
    /// The stream was cancelled before it finished.
    Aborted,
    /// The read failed with an engine error code.
    Failed {
        /// Engine error code.
        code: u32,
    },
}

impl StreamOutcome {
    /// Build an outcome from a raw engine error code, zero meaning success.
    #[must_use]
    pub fn from_code(code: u32, data: Box<[u8]>) -> Self {
        match code {
            0 => Self::Completed(data),
            ERROR_USER_ABORT => Self::Aborted,
            code => Self::Failed { code },
        }
    }

    /// Raw engine error code, zero for success.
    #[must_use]
    pub const fn code(&self) -> u32 {
        match self {
            Self::Completed(_) => 0,
            Self::Aborted => ERROR_USER_ABORT,
            Self::Failed { code } => *code,
        }
    }
}

/// Message an engine sends when a stream ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamCompletion {
    /// Stream that ended.
    pub stream: StreamId,
    /// Entry the stream was started for.
    pub entry: FileEntryId,
    /// Result of the read.
    pub outcome: StreamOutcome,
}

/// Sending half of the completion channel.
pub type CompletionSender = mpsc::UnboundedSender<StreamCompletion>;
/// Receiving half of the completion channel.
pub type CompletionReceiver = mpsc::UnboundedReceiver<StreamCompletion>;

/// Create a completion channel.
#[must_use]
pub fn completion_channel() -> (CompletionSender, CompletionReceiver) {
    mpsc::unbounded_channel()
}

/// A read the manager asks an engine to perform.
pub struct ReadRequest {
    /// Stream id allocated by the manager.
    pub stream: StreamId,
    /// Entry being loaded.
    pub entry: FileEntryId,
    /// File to read.
    pub path: PathBuf,
    /// Arena buffer to read into. Its length is the number of bytes to read.
    pub buffer: Box<[u8]>,
    /// Scheduling hint.
    pub priority: StreamPriority,
    /// Where to report the outcome.
    pub completions: CompletionSender,
}

impl fmt::Debug for ReadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadRequest")
            .field("stream", &self.stream)
            .field("entry", &self.entry)
            .field("path", &self.path)
            .field("size", &self.size())
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

impl ReadRequest {
    /// Number of bytes to read.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.buffer.len() as u64
    }

    /// Report success, handing the buffer back as it is.
    fn complete_ok(mut self) {
        let buffer = std::mem::take(&mut self.buffer);
        self.complete(StreamOutcome::Completed(buffer));
    }

    fn complete(self, outcome: StreamOutcome) {
        // A closed channel means the manager is gone; nobody is left to care.
        let _ = self.completions.send(StreamCompletion {
            stream: self.stream,
            entry: self.entry,
            outcome,
        });
    }
}

/// Performs whole-file reads.
pub trait StreamEngine: Send + Sync {
    /// Start a read. On `Ok` exactly one completion is sent for the stream.
    ///
    /// # Errors
    ///
    /// Returns an error when the read cannot be started; no completion is
    /// sent in that case.
    fn start_read(&self, request: ReadRequest) -> Result<()>;

    /// Cancel a stream. Unknown or finished streams are ignored.
    fn abort(&self, stream: StreamId);
}

/// Stream engine backed by a dedicated tokio runtime.
pub struct TokioStreamEngine {
    runtime: Runtime,
    in_flight: Arc<Mutex<HashMap<StreamId, CancellationToken>>>,
}

impl TokioStreamEngine {
    /// Start an engine with `workers` I/O threads.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the runtime cannot be built.
    pub fn new(workers: usize) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(workers.max(1))
            .thread_name("bankcache-io")
            .enable_all()
            .build()
            .map_err(|e| Error::configuration(format!("failed to start I/O runtime: {e}")))?;
        Ok(Self {
            runtime,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Number of streams that have not finished yet.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl fmt::Debug for TokioStreamEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioStreamEngine")
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl StreamEngine for TokioStreamEngine {
    fn start_read(&self, mut request: ReadRequest) -> Result<()> {
        let token = CancellationToken::new();
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request.stream, token.clone());

        let in_flight = Arc::clone(&self.in_flight);
        tracing::trace!(
            stream = request.stream.get(),
            path = %request.path.display(),
            size = request.size(),
            priority = ?request.priority,
            "Starting read"
        );
        self.runtime.spawn(async move {
            let buffer = std::mem::take(&mut request.buffer);
            // A cancelled read drops its buffer; the arena block keeps the reservation.
            let outcome = tokio::select! {
                biased;
                () = token.cancelled() => StreamOutcome::Aborted,
                outcome = read_into(&request.path, buffer) => outcome,
            };
            in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&request.stream);
            request.complete(outcome);
        });
        Ok(())
    }

    fn abort(&self, stream: StreamId) {
        let token = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&stream);
        if let Some(token) = token {
            token.cancel();
        }
    }
}

/// Fill `buffer` with the whole file. The file must be exactly as long as the buffer.
async fn read_into(path: &Path, mut buffer: Box<[u8]>) -> StreamOutcome {
    let size_mismatch = StreamOutcome::Failed {
        code: ERROR_SIZE_OUT_OF_RANGE,
    };
    let mut file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Open failed");
            return StreamOutcome::Failed {
                code: ERROR_CANT_OPEN_FILE,
            };
        }
    };
    if let Err(e) = file.read_exact(&mut buffer).await {
        tracing::debug!(path = %path.display(), error = %e, "Read failed");
        return size_mismatch;
    }
    let mut extra = [0u8; 1];
    match file.read(&mut extra).await {
        Ok(0) => StreamOutcome::Completed(buffer),
        Ok(_) => {
            tracing::debug!(
                path = %path.display(),
                expected = buffer.len(),
                "File grew since it was registered"
            );
            size_mismatch
        }
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Read failed");
            size_mismatch
        }
    }
}

#[derive(Debug, Default)]
struct ManualState {
    pending: Vec<ReadRequest>,
    started: Vec<StreamId>,
    aborted: Vec<StreamId>,
    auto_complete: bool,
    refuse_start: bool,
}

/// Engine whose streams finish only when told to. Clones share state.
///
/// Aborting a pending stream sends an `Aborted` completion right away, the
/// way a real engine confirms a cancel through its callback.
#[derive(Debug, Clone, Default)]
pub struct ManualStreamEngine {
    state: Arc<Mutex<ManualState>>,
}

impl ManualStreamEngine {
    /// Engine that holds every stream until completed by hand.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine that completes every stream as it starts, handing back the
    /// untouched arena buffer.
    #[must_use]
    pub fn auto_completing() -> Self {
        let engine = Self::default();
        engine.set_auto_complete(true);
        engine
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Toggle immediate completion of new streams.
    pub fn set_auto_complete(&self, enabled: bool) {
        self.lock().auto_complete = enabled;
    }

    /// Make `start_read` fail.
    pub fn set_refuse_start(&self, refuse: bool) {
        self.lock().refuse_start = refuse;
    }

    /// Streams started so far, in order.
    #[must_use]
    pub fn started(&self) -> Vec<StreamId> {
        self.lock().started.clone()
    }

    /// Streams aborted so far, in order.
    #[must_use]
    pub fn aborted(&self) -> Vec<StreamId> {
        self.lock().aborted.clone()
    }

    /// Streams still waiting for completion, with their entries.
    #[must_use]
    pub fn pending(&self) -> Vec<(StreamId, FileEntryId)> {
        self.lock()
            .pending
            .iter()
            .map(|r| (r.stream, r.entry))
            .collect()
    }

    /// Pending stream of an entry, if any.
    #[must_use]
    pub fn pending_for(&self, entry: FileEntryId) -> Option<StreamId> {
        self.lock()
            .pending
            .iter()
            .find(|r| r.entry == entry)
            .map(|r| r.stream)
    }

    fn take(&self, stream: StreamId) -> Option<ReadRequest> {
        let mut state = self.lock();
        let index = state.pending.iter().position(|r| r.stream == stream)?;
        Some(state.pending.remove(index))
    }

    /// Finish a pending stream with the given outcome.
    pub fn complete(&self, stream: StreamId, outcome: StreamOutcome) -> bool {
        self.take(stream).is_some_and(|request| {
            request.complete(outcome);
            true
        })
    }

    /// Finish a pending stream successfully, handing back its buffer.
    pub fn complete_ok(&self, stream: StreamId) -> bool {
        self.take(stream).is_some_and(|request| {
            request.complete_ok();
            true
        })
    }

    /// Finish a pending stream with an error code.
    pub fn fail(&self, stream: StreamId, code: u32) -> bool {
        self.complete(stream, StreamOutcome::Failed { code })
    }

    /// Finish every pending stream successfully. Returns how many finished.
    pub fn complete_all_ok(&self) -> usize {
        let drained: Vec<ReadRequest> = self.lock().pending.drain(..).collect();
        let count = drained.len();
        for request in drained {
            request.complete_ok();
        }
        count
    }
}

impl StreamEngine for ManualStreamEngine {
    fn start_read(&self, request: ReadRequest) -> Result<()> {
        let mut state = self.lock();
        if state.refuse_start {
            return Err(Error::stream(
                request.path.display().to_string(),
                "engine refused the read",
            ));
        }
        state.started.push(request.stream);
        if state.auto_complete {
            drop(state);
            request.complete_ok();
        } else {
            state.pending.push(request);
        }
        Ok(())
    }

    fn abort(&self, stream: StreamId) {
        self.lock().aborted.push(stream);
        if let Some(request) = self.take(stream) {
            request.complete(StreamOutcome::Aborted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn request(stream: u64, path: PathBuf, size: usize, tx: &CompletionSender) -> ReadRequest {
        ReadRequest {
            stream: StreamId::new(stream),
            entry: FileEntryId::from_path(&path),
            path,
            buffer: vec![0u8; size].into_boxed_slice(),
            priority: StreamPriority::Normal,
            completions: tx.clone(),
        }
    }

    #[test]
    fn test_outcome_codes() {
        assert_eq!(
            StreamOutcome::from_code(0, Box::new([1])),
            StreamOutcome::Completed(Box::new([1]))
        );
        assert_eq!(
            StreamOutcome::from_code(ERROR_USER_ABORT, Box::default()),
            StreamOutcome::Aborted
        );
        assert_eq!(
            StreamOutcome::from_code(7, Box::default()),
            StreamOutcome::Failed { code: 7 }
        );
        assert_eq!(StreamOutcome::Aborted.code(), ERROR_USER_ABORT);
    }

    #[test]
    fn test_manual_engine_completes_on_demand() {
        let engine = ManualStreamEngine::new();
        let (tx, mut rx) = completion_channel();
        engine
            .start_read(request(1, PathBuf::from("a.bank"), 4, &tx))
            .unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(engine.pending().len(), 1);

        assert!(engine.complete_ok(StreamId::new(1)));
        let completion = rx.try_recv().unwrap();
        assert_eq!(completion.outcome, StreamOutcome::Completed(Box::new([0; 4])));
        assert!(!engine.complete_ok(StreamId::new(1)));
    }

    #[test]
    fn test_manual_engine_abort_sends_confirmation() {
        let engine = ManualStreamEngine::new();
        let (tx, mut rx) = completion_channel();
        engine
            .start_read(request(3, PathBuf::from("a.bank"), 4, &tx))
            .unwrap();
        engine.abort(StreamId::new(3));
        assert_eq!(rx.try_recv().unwrap().outcome, StreamOutcome::Aborted);
        assert_eq!(engine.aborted(), vec![StreamId::new(3)]);
        assert!(engine.pending().is_empty());
    }

    #[test]
    fn test_manual_engine_refuses() {
        let engine = ManualStreamEngine::new();
        engine.set_refuse_start(true);
        let (tx, _rx) = completion_channel();
        assert!(
            engine
                .start_read(request(1, PathBuf::from("a.bank"), 4, &tx))
                .is_err()
        );
        assert!(engine.started().is_empty());
    }

    #[test]
    fn test_tokio_engine_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"soundbank").unwrap();
        let engine = TokioStreamEngine::new(1).unwrap();
        let (tx, mut rx) = completion_channel();
        engine
            .start_read(request(1, file.path().to_path_buf(), 9, &tx))
            .unwrap();
        let completion = rx.blocking_recv().unwrap();
        assert_eq!(completion.stream, StreamId::new(1));
        assert_eq!(
            completion.outcome,
            StreamOutcome::Completed(b"soundbank".to_vec().into_boxed_slice())
        );
    }

    #[test]
    fn test_tokio_engine_reports_missing_and_short_files() {
        let dir = tempfile::tempdir().unwrap();
        let engine = TokioStreamEngine::new(1).unwrap();
        let (tx, mut rx) = completion_channel();
        engine
            .start_read(request(1, dir.path().join("missing.bank"), 4, &tx))
            .unwrap();
        assert_eq!(
            rx.blocking_recv().unwrap().outcome,
            StreamOutcome::Failed {
                code: ERROR_CANT_OPEN_FILE
            }
        );

        let short = dir.path().join("short.bank");
        std::fs::write(&short, b"ab").unwrap();
        engine.start_read(request(2, short, 4, &tx)).unwrap();
        assert_eq!(
            rx.blocking_recv().unwrap().outcome,
            StreamOutcome::Failed {
                code: ERROR_SIZE_OUT_OF_RANGE
            }
        );
    }

    #[test]
    fn test_tokio_engine_rejects_file_that_grew() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grown.bank");
        std::fs::write(&path, b"soundbank").unwrap();
        let engine = TokioStreamEngine::new(1).unwrap();
        let (tx, mut rx) = completion_channel();
        engine.start_read(request(1, path, 5, &tx)).unwrap();
        assert_eq!(
            rx.blocking_recv().unwrap().outcome,
            StreamOutcome::Failed {
                code: ERROR_SIZE_OUT_OF_RANGE
            }
        );
    }

    #[test]
    fn test_tokio_engine_abort_in_flight_read_completes_once() {
        const SIZE: usize = 16 * 1024 * 1024;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("large.bank");
        std::fs::write(&path, vec![3u8; SIZE]).unwrap();

        let engine = TokioStreamEngine::new(2).unwrap();
        let (tx, mut rx) = completion_channel();
        engine.start_read(request(1, path, SIZE, &tx)).unwrap();
        engine.abort(StreamId::new(1));
        assert_eq!(engine.in_flight(), 0);

        let completion = rx.blocking_recv().unwrap();
        assert_eq!(completion.stream, StreamId::new(1));
        assert_eq!(completion.outcome, StreamOutcome::Aborted);

        // Once every sender is gone the channel closes with nothing else on it.
        drop(tx);
        drop(engine);
        assert!(rx.blocking_recv().is_none());
    }

    #[test]
    fn test_tokio_engine_abort_unknown_stream_is_noop() {
        let engine = TokioStreamEngine::new(1).unwrap();
        engine.abort(StreamId::new(42));
        assert_eq!(engine.in_flight(), 0);
    }
}
