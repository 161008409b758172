//! Command-line argument parsing with clap.

use std::path::PathBuf;

use chrono::{DateTime, TimeDelta, Utc};
use clap::{ArgAction, Parser, ValueEnum};
use fleet_search::segment::DEFAULT_LOOKBACK_SECS;
use fleet_search::{Filter, OutputFormat, parse_start_time};

use crate::error::CliError;

/// fleet-events - search structured events across the fleet's logs.
#[derive(Parser, Debug, Clone)]
#[command(name = "fleet-events")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Search start: a duration ago (90s, 30m, 2h, 1d) or a date. Defaults to 1h ago.
    #[arg(short = 't', long = "time", value_name = "TIME")]
    pub time: Option<String>,

    /// Log source to search; repeatable. All sources when omitted.
    #[arg(short = 's', long = "source", value_name = "NAME")]
    pub sources: Vec<String>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Json)]
    pub format: Format,

    /// Render a trace-event array (same as --format trace).
    #[arg(short = 'E', long = "event-trace")]
    pub event_trace: bool,

    /// More logging; repeat for more detail.
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short, long)]
    pub quiet: bool,

    /// Search for a raw pattern instead of events.
    #[arg(short = 'x', long = "raw", value_name = "PATTERN", hide = true)]
    pub raw: Option<String>,

    /// Configuration file.
    #[arg(short, long, env = "FLEET_EVENTS_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// List the known log sources and exit.
    #[arg(long)]
    pub list_sources: bool,

    /// Request ids to filter on.
    #[arg(value_name = "REQ_ID")]
    pub req_ids: Vec<String>,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum Format {
    /// One JSON record per line.
    #[default]
    Json,
    /// Trace-event JSON array for trace viewers.
    Trace,
}

impl Cli {
    /// The output encoding to render.
    #[must_use]
    pub fn output_format(&self) -> OutputFormat {
        if self.event_trace || self.format == Format::Trace {
            OutputFormat::TraceEvent
        } else {
            OutputFormat::JsonLines
        }
    }

    /// Filters for this invocation.
    ///
    /// Events only by default, narrowed to the given request ids; a raw
    /// pattern replaces both.
    #[must_use]
    pub fn filters(&self) -> Vec<Filter> {
        if let Some(raw) = &self.raw {
            return vec![Filter::raw(raw.clone())];
        }
        let mut filters = vec![Filter::exists("evt")];
        if !self.req_ids.is_empty() {
            filters.push(Filter::any_of("req_id", self.req_ids.iter().cloned()));
        }
        filters
    }

    /// Search start relative to `now`.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Search`] if `--time` cannot be parsed.
    pub fn start(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, CliError> {
        match &self.time {
            Some(arg) => Ok(parse_start_time(arg, now)?),
            None => Ok(now - TimeDelta::seconds(DEFAULT_LOOKBACK_SECS)),
        }
    }

    /// Default log filter directive for the verbosity flags.
    #[must_use]
    pub const fn log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    }
}
