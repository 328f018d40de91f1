mod cli;
mod commands;
mod config;

use crate::{
    cli::{Args, Commands},
    config::AppConfig,
};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::process;
use tracing::{Level, error};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Application error: {:#}", e);
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();
    // flushes the log file on exit
    let _guard = init_logging(args.verbose, args.quiet, args.log_file.as_deref())?;

    let config = AppConfig::load(args.config.as_deref())?;

    match args.command {
        Commands::Run {
            channels,
            poll_interval,
        } => commands::run(&config, &channels, poll_interval).await?,

        Commands::Catalog {
            provider,
            settings,
            output,
            check,
        } => commands::catalog(&config, &provider, settings, output, check).await?,

        Commands::RotateKey { slug } => commands::rotate_key(&config, &slug)?,

        Commands::Args { channels, slug } => commands::print_args(&config, &channels, &slug)?,
    }

    Ok(())
}

fn init_logging(verbose: bool, quiet: bool, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file_name = path.file_name().context("Log file path has no file name")?;
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(verbose))
        .with(file_layer)
        .with(filter)
        .init();

    Ok(guard)
}
