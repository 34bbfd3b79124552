//! bankcache command line front end
//!
//! Registers a preload manifest against a directory of sound banks, drives
//! the loads through the tokio stream engine and prints the cache report.
//!
//! ```text
//! bankcache inspect --manifest banks.toml --root assets/banks
//! bankcache preload --manifest banks.toml --root assets/banks --request menu --sync
//! ```

// The CLI's job is to write to stdout and stderr
#![allow(clippy::print_stdout, clippy::print_stderr)]

/// Argument parsing, CLI errors and exit codes.
pub mod cli;
/// Command implementations.
pub mod commands;
/// Subscriber setup and correlation ids.
pub mod tracing;

use crate::cli::{CliError, EXIT_OK, exit_code_for, render_error};
use crate::commands::{Command, CommandOutput, render};

/// Execute a command and print its result.
///
/// Returns the process exit code.
#[must_use]
pub fn run(command: Command) -> i32 {
    let json = command.json();
    let span = crate::command_span!(command.name());
    let _entered = span.enter();

    match command.execute().and_then(|output| finish(&output, json)) {
        Ok(()) => EXIT_OK,
        Err(err) => {
            ::tracing::debug!(error = %err, "Command failed");
            render_error(&err, json);
            exit_code_for(&err)
        }
    }
}

fn finish(output: &CommandOutput, json: bool) -> Result<(), CliError> {
    render(output, json)?;
    if let CommandOutput::Preload(preload) = output {
        let failed = preload.failed_requests();
        if !failed.is_empty() {
            return Err(CliError::load_with_help(
                format!(
                    "{} request(s) did not fully load: {}",
                    failed.len(),
                    failed.join(", ")
                ),
                "Check the report above for missing banks or an exhausted cache budget",
            ));
        }
    }
    Ok(())
}
