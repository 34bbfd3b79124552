//! `bankcache preload`

use super::{EventSummary, Session};
use crate::cli::{CliError, PreloadArgs};
use bankcache_core::entry::EntryStatus;
use bankcache_core::{CacheReport, PreloadRequestId, RequestStatus};
use serde::Serialize;
use std::fmt;
use std::time::Instant;
use tracing::instrument;

/// How one preload request went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOutcome {
    /// Request name.
    pub name: String,
    /// Status returned when the loads were issued.
    pub status: RequestStatus,
    /// Number of files in the request.
    pub files: usize,
    /// Files resident once every stream finished.
    pub cached: usize,
}

impl RequestOutcome {
    /// Whether the request left anything behind.
    #[must_use]
    pub fn failed(&self) -> bool {
        match self.status {
            RequestStatus::Skipped => false,
            RequestStatus::Success => self.cached < self.files,
            RequestStatus::PartialSuccess | RequestStatus::Failure => true,
        }
    }
}

impl fmt::Display for RequestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.status)?;
        if self.status != RequestStatus::Skipped {
            write!(f, " ({}/{} cached)", self.cached, self.files)?;
        }
        Ok(())
    }
}

/// Per-request results and the final cache state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloadOutput {
    /// Loaded requests in the order they were issued.
    pub requests: Vec<RequestOutcome>,
    /// Cache state after every stream finished.
    pub report: CacheReport,
    /// Notable events seen during the run.
    pub events: EventSummary,
    /// Wall time of the load phase in milliseconds.
    pub elapsed_ms: u128,
}

impl PreloadOutput {
    /// Names of the requests that failed.
    #[must_use]
    pub fn failed_requests(&self) -> Vec<&str> {
        self.requests
            .iter()
            .filter(|r| r.failed())
            .map(|r| r.name.as_str())
            .collect()
    }
}

impl fmt::Display for PreloadOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for request in &self.requests {
            writeln!(f, "{request}")?;
        }
        write!(f, "{}", self.report)?;
        writeln!(
            f,
            "{} error(s), {} warning(s) in {} ms",
            self.events.errors, self.events.warnings, self.elapsed_ms
        )
    }
}

/// Register the manifest, load the selected requests and wait for every stream.
///
/// # Errors
///
/// Returns a configuration error if the manifest or configuration is invalid
/// or a requested name is not in the manifest. Load failures are not errors
/// here, see [`PreloadOutput::failed_requests`].
#[instrument(
    name = "preload",
    skip_all,
    fields(manifest = %args.source.manifest.display(), sync = args.sync)
)]
pub fn execute(args: &PreloadArgs) -> Result<PreloadOutput, CliError> {
    let mut session = Session::open(&args.source)?;
    let selected = select(&session, &args.requests)?;

    let start = Instant::now();
    let mut issued = Vec::with_capacity(selected.len());
    for id in selected {
        let status = session.fcm.load_request(id, args.sync, args.auto_load_only);
        tracing::debug!(%id, %status, "Issued preload request");
        issued.push((id, status));
    }
    let drained = session.fcm.wait_for_pending();
    tracing::debug!(completions = drained, "All streams finished");
    let elapsed_ms = start.elapsed().as_millis();

    let requests = issued
        .into_iter()
        .filter_map(|(id, status)| outcome(&session, id, status))
        .collect();

    Ok(PreloadOutput {
        requests,
        report: session.report(),
        events: session.summary(),
        elapsed_ms,
    })
}

fn select(session: &Session, names: &[String]) -> Result<Vec<PreloadRequestId>, CliError> {
    if names.is_empty() {
        return Ok(session.requests.clone());
    }
    names
        .iter()
        .map(|name| {
            session
                .fcm
                .preload_request_by_name(name)
                .map(|request| request.id)
                .ok_or_else(|| CliError::from(bankcache_core::Error::unknown_request(name)))
        })
        .collect()
}

fn outcome(
    session: &Session,
    id: PreloadRequestId,
    status: RequestStatus,
) -> Option<RequestOutcome> {
    let request = session.fcm.preload_request(id)?;
    let cached = request
        .file_ids
        .iter()
        .filter(|&&file| {
            session
                .fcm
                .entry(file)
                .is_some_and(|entry| entry.status() == EntryStatus::Cached)
        })
        .count();
    Some(RequestOutcome {
        name: request.name.clone(),
        status,
        files: request.file_ids.len(),
        cached,
    })
}
