//! Argument parsing, CLI errors and exit codes.

use crate::tracing::{LogLevel, TracingFormat};
use bankcache_core::DataScope;
use clap::{Args, Parser, Subcommand, ValueEnum};
use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Successful exit code
pub const EXIT_OK: i32 = 0;
/// CLI, configuration or manifest error exit code
pub const EXIT_CLI: i32 = 2;
/// At least one preload request failed
pub const EXIT_LOAD: i32 = 3;

/// Language localized banks are resolved for when none is given.
pub const DEFAULT_LANGUAGE: &str = "english";

#[derive(Parser, Debug)]
#[command(name = "bankcache")]
#[command(about = "Register, preload and inspect audio sound banks in a bounded file cache")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        long,
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub log_level: LogLevel,

    #[arg(
        long,
        global = true,
        help = "Log output format",
        default_value = "compact",
        value_enum
    )]
    pub log_format: TracingFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Register a manifest and print the cache report without loading")]
    Inspect(InspectArgs),
    #[command(about = "Register a manifest, load its requests and print the cache report")]
    Preload(PreloadArgs),
}

/// Scope the manifest is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ScopeArg {
    /// Kept across levels
    #[default]
    Global,
    /// Torn down with the level
    Level,
}

impl From<ScopeArg> for DataScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::Global => Self::Global,
            ScopeArg::Level => Self::LevelSpecific,
        }
    }
}

/// Where the manifest and its banks live.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    #[arg(long, short = 'm', help = "Preload manifest (TOML)")]
    pub manifest: PathBuf,

    #[arg(long, short = 'r', help = "Directory containing the sound banks")]
    pub root: PathBuf,

    #[arg(long, value_enum, default_value = "global", help = "Registration scope")]
    pub scope: ScopeArg,

    #[arg(
        long,
        default_value = DEFAULT_LANGUAGE,
        help = "Language localized banks are resolved for"
    )]
    pub language: String,

    #[arg(long, help = "Cache configuration file (TOML)")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Cache budget in KiB, overrides the configuration")]
    pub cache_size_kib: Option<u64>,

    #[arg(long, help = "Print the result as JSON")]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

#[derive(Args, Debug, Clone)]
pub struct PreloadArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[arg(
        long = "request",
        value_name = "NAME",
        help = "Request to load, repeatable (default: every request)"
    )]
    pub requests: Vec<String>,

    #[arg(long, help = "Load each bank before moving on to the next")]
    pub sync: bool,

    #[arg(long, help = "Only load requests marked autoLoad")]
    pub auto_load_only: bool,
}

/// CLI-specific error types with proper exit code mapping
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum CliError {
    /// Bad arguments, configuration or manifest (exit code 2)
    #[error("CLI/configuration error: {message}")]
    #[diagnostic(code(bankcache::cli::config))]
    Config {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// One or more preload requests failed (exit code 3)
    #[error("Preload failed: {message}")]
    #[diagnostic(code(bankcache::cli::load))]
    Load {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
}

impl CliError {
    /// Create a new configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new configuration error with help text
    #[must_use]
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a new load error with help text
    #[must_use]
    pub fn load_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Load {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

/// Every core error reaching the CLI is a setup problem.
impl From<bankcache_core::Error> for CliError {
    fn from(err: bankcache_core::Error) -> Self {
        match err {
            bankcache_core::Error::Configuration { message } => Self::config(message),
            bankcache_core::Error::Io {
                source,
                path,
                operation,
            } => {
                let path_str = path
                    .as_ref()
                    .map_or(String::new(), |p| format!(" on {}", p.display()));
                Self::config_with_help(
                    format!("I/O {operation} failed{path_str}: {source}"),
                    "Check file permissions and ensure the path exists",
                )
            }
            other => Self::config(other.to_string()),
        }
    }
}

/// Map CLI error to appropriate exit code
#[must_use]
pub const fn exit_code_for(err: &CliError) -> i32 {
    match err {
        CliError::Config { .. } => EXIT_CLI,
        CliError::Load { .. } => EXIT_LOAD,
    }
}

/// Render an error on stderr, as JSON when requested.
pub fn render_error(err: &CliError, json_mode: bool) {
    if json_mode {
        let (code, message, help) = match err {
            CliError::Config { message, help } => ("config", message, help),
            CliError::Load { message, help } => ("load", message, help),
        };
        let envelope = serde_json::json!({
            "status": "error",
            "error": { "code": code, "message": message, "help": help },
        });
        eprintln!("{envelope}");
    } else {
        eprintln!("{:?}", miette::Report::new(err.clone()));
    }
}

/// Parse `std::env::args`.
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::try_parse_from(["bankcache", "inspect", "-m", "banks.toml", "-r", "banks"])
            .unwrap();

        assert_eq!(cli.log_level, LogLevel::Warn);
        assert_eq!(cli.log_format, TracingFormat::Compact);
        let Commands::Inspect(args) = cli.command else {
            panic!("expected inspect");
        };
        assert_eq!(args.source.manifest, PathBuf::from("banks.toml"));
        assert_eq!(args.source.scope, ScopeArg::Global);
        assert_eq!(args.source.language, DEFAULT_LANGUAGE);
        assert!(args.source.cache_size_kib.is_none());
        assert!(!args.source.json);
    }

    #[test]
    fn test_preload_arguments() {
        let cli = Cli::try_parse_from([
            "bankcache",
            "--log-level",
            "debug",
            "preload",
            "--manifest",
            "banks.toml",
            "--root",
            "banks",
            "--request",
            "menu",
            "--request",
            "level1",
            "--sync",
            "--auto-load-only",
            "--scope",
            "level",
            "--cache-size-kib",
            "512",
            "--json",
        ])
        .unwrap();

        assert_eq!(cli.log_level, LogLevel::Debug);
        let Commands::Preload(args) = cli.command else {
            panic!("expected preload");
        };
        assert_eq!(args.requests, vec!["menu", "level1"]);
        assert!(args.sync);
        assert!(args.auto_load_only);
        assert_eq!(args.source.scope, ScopeArg::Level);
        assert_eq!(args.source.cache_size_kib, Some(512));
        assert!(args.source.json);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "bankcache",
            "inspect",
            "-m",
            "banks.toml",
            "-r",
            "banks",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.log_format, TracingFormat::Json);
    }

    #[test]
    fn test_missing_manifest_is_rejected() {
        assert!(Cli::try_parse_from(["bankcache", "preload", "--root", "banks"]).is_err());
    }

    #[test]
    fn test_scope_conversion() {
        assert_eq!(DataScope::from(ScopeArg::Global), DataScope::Global);
        assert_eq!(DataScope::from(ScopeArg::Level), DataScope::LevelSpecific);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(EXIT_OK, 0);
        assert_eq!(exit_code_for(&CliError::config("bad")), EXIT_CLI);
        assert_eq!(
            exit_code_for(&CliError::load_with_help("failed", "check the banks")),
            EXIT_LOAD
        );
    }

    #[test]
    fn test_core_errors_map_to_config() {
        let err: CliError = bankcache_core::Error::configuration("ioWorkers must be at least 1").into();
        assert!(matches!(err, CliError::Config { .. }));
        // No doubled prefix
        assert_eq!(
            err.to_string(),
            "CLI/configuration error: ioWorkers must be at least 1"
        );

        let err: CliError = bankcache_core::Error::manifest("missing name").into();
        assert!(err.to_string().contains("missing name"));
    }
}
