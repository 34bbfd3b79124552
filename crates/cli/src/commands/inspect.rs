//! `bankcache inspect`

use super::{EventSummary, Session};
use crate::cli::{CliError, InspectArgs};
use bankcache_core::CacheReport;
use serde::Serialize;
use std::fmt;
use tracing::instrument;

/// Registered requests and the resulting cache state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectOutput {
    /// Request names in manifest order.
    pub requests: Vec<String>,
    /// Cache state after registration.
    pub report: CacheReport,
    /// Notable events seen while registering.
    pub events: EventSummary,
}

impl fmt::Display for InspectOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Requests: {}", self.requests.join(", "))?;
        write!(f, "{}", self.report)?;
        if self.events.warnings > 0 {
            writeln!(f, "{} file(s) not found", self.events.warnings)?;
        }
        Ok(())
    }
}

/// Register the manifest and report without loading anything.
///
/// # Errors
///
/// Returns a configuration error if the manifest or configuration is invalid.
#[instrument(name = "inspect", skip_all, fields(manifest = %args.source.manifest.display()))]
pub fn execute(args: &InspectArgs) -> Result<InspectOutput, CliError> {
    let session = Session::open(&args.source)?;
    let requests = session
        .fcm
        .preload_requests()
        .map(|request| request.name.clone())
        .collect();

    Ok(InspectOutput {
        requests,
        report: session.report(),
        events: session.summary(),
    })
}
