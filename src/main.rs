mod cli;
mod config;
mod dupes;
mod error;
mod hash;
mod index;
mod logging;
mod progress;
mod reconcile;
mod report;
mod run;
mod scan;
mod signal;
mod snapshot;
mod tui;

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;

use cli::Cli;
use config::{Config, Settings};

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = cli::usage_exit_code(&e);
            let _ = e.print();
            std::process::exit(code);
        }
    };
    logging::init(cli.debug);

    if let Err(e) = try_main(&cli) {
        let _ = std::io::stdout().flush();
        eprintln!("fatal error: {e:#}");
        let code = e.downcast_ref::<error::Error>().map_or(1, error::Error::exit_code);
        std::process::exit(code);
    }
}

fn try_main(cli: &Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let settings = Settings::from_args_and_config(cli, &config)?;
    tracing::debug!("mode: {:?}", settings.mode());

    let cancel = signal::install_handler().context("cannot install the Ctrl+C handler")?;

    let stdout = std::io::stdout();
    let summary = run::run(&settings, &cancel, stdout.lock())?;
    if summary.warnings > 0 {
        tracing::warn!("finished with {} warning(s)", summary.warnings);
    }
    Ok(())
}
