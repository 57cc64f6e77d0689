use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;
mod expr;
mod flatten;
mod git;
mod templates;
mod util;
mod workflows;

use cli::{Command, RootArgs};

fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_tracing(args.verbose);

    match args.command {
        Command::Run(args) => commands::run_all(args),
        Command::Flatten(args) => commands::run_flatten(args),
        Command::Workflows(args) => commands::run_workflows(args),
        Command::Publish(args) => commands::run_publish(args),
        Command::Render(args) => commands::run_render(args),
    }
}

/// Logs go to stderr so `render` and `run --json` keep stdout clean.
/// `RUST_LOG` takes precedence over `--verbose`.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
