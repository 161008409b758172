//! fleet-events binary entrypoint.

use std::error::Error;
use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use fleet_cli::commands;
use fleet_cli::{Cli, CliError, Config};

fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing; RUST_LOG overrides the verbosity flags
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("fleet-events error: failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let verbose = cli.verbose > 0;
    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        // Reader went away (e.g. piped into head)
        Err(e) if e.is_broken_pipe() => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("fleet-events error: {e}");
            if verbose {
                let mut cause = e.source();
                while let Some(err) = cause {
                    eprintln!("  caused by: {err}");
                    cause = err.source();
                }
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;

    if cli.list_sources {
        let registry = config.registry()?;
        return commands::list_sources(&registry, &mut io::stdout().lock());
    }

    let mut stdout = tokio::io::stdout();
    commands::search(&cli, &config, &mut stdout).await?;
    Ok(())
}
