//! Splitter CLI - operate a payment splitter against a simulated asset rail
//!
//! State lives in a home directory: the splitter config, the committed
//! ledger snapshot, the rail's balances and the hash-chained event journal.
//! Deposits credit the splitter's account on the rail directly; every other
//! command goes through the splitter's public operations.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use maple_splitter::SplitterError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod home;
mod output;

use home::Home;
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "splitter")]
#[command(about = "Pull-based payment splitter", long_about = None)]
#[command(version)]
struct Cli {
    /// Splitter home directory
    #[arg(long, env = "SPLITTER_HOME", default_value = ".splitter")]
    home: PathBuf,

    /// Output format
    #[arg(short, long, default_value = "text")]
    output: OutputFormat,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: commands::Command,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so JSON output stays machine-readable.
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();

    let home = Home::new(cli.home);
    match commands::execute(cli.command, &home, cli.output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<SplitterError>() {
                Some(splitter_err) => output::print_error(&format!(
                    "{splitter_err} [{:?}]",
                    splitter_err.class()
                )),
                None => output::print_error(&format!("{err:#}")),
            }
            ExitCode::FAILURE
        }
    }
}
