//! Command implementations.

use std::io::Write;
use std::sync::Arc;

use chrono::Utc;
use fleet_search::{
    EventSearch, LogSourceRegistry, PipelineStats, SearchExecutor, SearchRequest, SourceScope,
};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::cli::Cli;
use crate::config::Config;
use crate::error::CliError;
use crate::ssh::SshExecutor;

/// Writes one line per known source: name, scope and live file.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn list_sources<W: Write>(registry: &LogSourceRegistry, out: &mut W) -> Result<(), CliError> {
    for source in registry.iter() {
        let scope = match source.scope() {
            SourceScope::Global => "global".to_string(),
            SourceScope::PerInstance { service } => format!("instance:{service}"),
        };
        writeln!(out, "{:<16} {:<20} {}", source.name(), scope, source.current())?;
    }
    out.flush()?;
    Ok(())
}

/// Runs the search described by `cli` against the configured fleet.
///
/// # Errors
///
/// Returns configuration and argument errors before anything is searched,
/// then the first search or output error.
pub async fn search<W>(cli: &Cli, config: &Config, out: &mut W) -> Result<PipelineStats, CliError>
where
    W: AsyncWrite + Unpin + Send,
{
    let registry = config.registry()?;
    let now = Utc::now();
    let request = SearchRequest::new(cli.start(now)?)
        .with_now(now)
        .with_sources(cli.sources.clone())
        .with_filters(cli.filters())
        .with_format(cli.output_format());

    let remote = Arc::new(SshExecutor::new(&config.ssh));
    let executor = SearchExecutor::new(config.exec_config(), remote);
    let search = EventSearch::new(registry, Arc::new(config.inventory()), executor);

    let stats = search.run(&request, out).await?;
    out.flush().await?;
    Ok(stats)
}
