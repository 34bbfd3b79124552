//! Command implementations.
//!
//! Each command builds a cache over the real filesystem, registers the
//! manifest and returns a serializable summary. Printing is left to
//! [`render`] so commands stay testable.

pub mod inspect;
pub mod preload;

use crate::cli::{CliError, SourceArgs};
use bankcache_core::backend::DirectoryBackend;
use bankcache_core::manifest::PreloadManifest;
use bankcache_core::{CacheConfig, CacheReport, DataScope, FileCacheManager, PreloadRequestId};
use bankcache_events::{RecordingSink, Severity, TeeSink, TracingSink};
use serde::Serialize;

/// A command to run.
#[derive(Debug, Clone)]
pub enum Command {
    /// Register and report.
    Inspect(crate::cli::InspectArgs),
    /// Register, load and report.
    Preload(crate::cli::PreloadArgs),
}

impl From<crate::cli::Commands> for Command {
    fn from(cmd: crate::cli::Commands) -> Self {
        match cmd {
            crate::cli::Commands::Inspect(args) => Self::Inspect(args),
            crate::cli::Commands::Preload(args) => Self::Preload(args),
        }
    }
}

impl Command {
    /// Name used in spans and logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Inspect(_) => "inspect",
            Self::Preload(_) => "preload",
        }
    }

    /// Whether output should be JSON.
    #[must_use]
    pub const fn json(&self) -> bool {
        match self {
            Self::Inspect(args) => args.source.json,
            Self::Preload(args) => args.source.json,
        }
    }

    /// Run the command.
    ///
    /// # Errors
    ///
    /// Returns a [`CliError`] for setup failures and, for `preload`, when a
    /// request did not fully succeed.
    pub fn execute(self) -> Result<CommandOutput, CliError> {
        match self {
            Self::Inspect(args) => inspect::execute(&args).map(CommandOutput::Inspect),
            Self::Preload(args) => preload::execute(&args).map(CommandOutput::Preload),
        }
    }
}

/// Result of a command, printed by [`render`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum CommandOutput {
    /// See [`inspect::InspectOutput`].
    Inspect(inspect::InspectOutput),
    /// See [`preload::PreloadOutput`].
    Preload(preload::PreloadOutput),
}

/// Counts of notable cache events during a command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventSummary {
    /// Events at error severity.
    pub errors: usize,
    /// Events at warning severity.
    pub warnings: usize,
}

impl EventSummary {
    fn from_recorder(recorder: &RecordingSink) -> Self {
        Self {
            errors: recorder.count(Severity::Error),
            warnings: recorder.count(Severity::Warn),
        }
    }
}

/// A cache over a manifest, with the events it emitted.
pub(crate) struct Session {
    pub fcm: FileCacheManager<DirectoryBackend>,
    pub requests: Vec<PreloadRequestId>,
    pub recorder: RecordingSink,
}

impl Session {
    /// Load configuration and manifest, build the cache and register the manifest.
    pub fn open(source: &SourceArgs) -> Result<Self, CliError> {
        let config = load_config(source)?;
        let manifest = PreloadManifest::load(&source.manifest)?;
        if !source.root.is_dir() {
            return Err(CliError::config_with_help(
                format!("bank root {} is not a directory", source.root.display()),
                "Pass the directory the manifest's banks live in with --root",
            ));
        }

        let recorder = RecordingSink::new();
        let sink = TeeSink::new().with(TracingSink).with(recorder.clone());
        let backend = DirectoryBackend::new(&source.root, source.language.as_str());
        let mut fcm = FileCacheManager::builder(config, backend)
            .with_event_sink(sink)
            .build()?;

        let scope = DataScope::from(source.scope);
        let requests = fcm.register_manifest(&manifest, scope)?;
        tracing::info!(
            manifest = %source.manifest.display(),
            requests = requests.len(),
            entries = fcm.registry().len(),
            %scope,
            "Registered manifest"
        );

        Ok(Self {
            fcm,
            requests,
            recorder,
        })
    }

    pub fn report(&self) -> CacheReport {
        self.fcm.default_report()
    }

    pub fn summary(&self) -> EventSummary {
        EventSummary::from_recorder(&self.recorder)
    }
}

/// Configuration file, then `BANKCACHE_*` variables, then flags.
pub(crate) fn load_config(source: &SourceArgs) -> Result<CacheConfig, CliError> {
    let config = match &source.config {
        Some(path) => CacheConfig::load(path)?,
        None => CacheConfig::default(),
    };
    let mut config = config.with_env_overrides()?;
    if let Some(kib) = source.cache_size_kib {
        config.cache_size_kib = kib;
    }
    Ok(config)
}

/// Print a command result on stdout.
///
/// # Errors
///
/// Returns an error if the result cannot be serialized.
pub fn render(output: &CommandOutput, json: bool) -> Result<(), CliError> {
    if json {
        let text = serde_json::to_string_pretty(output)
            .map_err(|e| CliError::config(format!("Failed to serialize output: {e}")))?;
        println!("{text}");
        return Ok(());
    }
    match output {
        CommandOutput::Inspect(out) => print!("{out}"),
        CommandOutput::Preload(out) => print!("{out}"),
    }
    Ok(())
}
