//! Command-line entry point for converge.
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use converge::cli::{Cli, Command};
use converge::commands;
use converge::logging::{self, Log, Logger};
use converge::tasks::CancelToken;

fn main() -> Result<()> {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = Cli::parse();

    let command = match &args.command {
        Command::Apply(_) => "apply",
        Command::Plan(_) => "plan",
        Command::Detect(_) => "detect",
        Command::Version => "version",
    };
    logging::init_subscriber(args.verbose, command);
    let log = Arc::new(Logger::new(command));

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        log.warn(&format!("cannot install Ctrl-C handler: {e}"));
    }

    match args.command {
        Command::Apply(opts) => commands::apply::run(&args.global, &opts, false, &log, cancel),
        Command::Plan(opts) => commands::apply::run(&args.global, &opts, true, &log, cancel),
        Command::Detect(opts) => commands::detect::run(&opts, log.as_ref()),
        Command::Version => commands::version::run(),
    }
}
