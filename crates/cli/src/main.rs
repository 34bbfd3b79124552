//! `bankcache` binary.

use bankcache_cli::cli;
use bankcache_cli::commands::Command;
use bankcache_cli::tracing::{TracingConfig, init_tracing};

fn main() {
    // Tracing may be unusable during a panic.
    #[allow(clippy::print_stderr)]
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let args = cli::parse();
    let tracing_config = TracingConfig {
        format: args.log_format,
        level: args.log_level.into(),
    };
    if let Err(error) = init_tracing(tracing_config) {
        #[allow(clippy::print_stderr)]
        {
            eprintln!("{error:?}");
        }
        std::process::exit(cli::EXIT_CLI);
    }

    std::process::exit(bankcache_cli::run(Command::from(args.command)));
}
