//! modsync - command-line interface to the sync engine.

mod args;
mod commands;
mod error;
mod progress;

use clap::Parser;

use args::Cli;

fn main() {
    let cli = Cli::parse();

    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(modsync::config::default_data_dir);
    // Guard must outlive all logging; dropped on exit to flush.
    let _log_guard = match modsync::logging::init(&data_dir, cli.verbose) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("warning: file logging disabled: {e}");
            None
        }
    };

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "modsync starting");

    if let Err(e) = commands::run(&cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
