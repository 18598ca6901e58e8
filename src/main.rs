//! Sonodream CLI - Audio Deep Dream
//!
//! Command-line interface for the sonodream spectrogram deep dream tool.

use clap::Parser;
use env_logger::Env;
use log::info;

use sonodream::cli::{commands, Cli};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    info!("Sonodream v{}", env!("CARGO_PKG_VERSION"));

    // Reported once by anyhow: the report as headline, the error as cause
    if let Err(e) = commands::dream(&cli) {
        let report = cli.failure_report(&e);
        return Err(anyhow::Error::new(e).context(report));
    }

    Ok(())
}
