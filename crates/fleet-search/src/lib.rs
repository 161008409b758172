//! # fleet-search
//!
//! Time-bounded search across structured logs spread over a fleet of hosts
//! and service instances, merged into one time-ordered stream.
//!
//! This crate provides:
//!
//! - [`LogSourceRegistry`]: Catalog of known log sources and their file layout
//! - [`compile`]: Filter compiler producing a [`PatternChain`]
//! - [`resolve_targets`]: Expands sources against a [`Topology`]
//! - [`SearchExecutor`]: Local or remote search of one target
//! - [`SegmentMerger`]: Bounded fan-out and chronological merge of one segment
//! - [`SegmentPipeline`]: Sequential segment driver feeding a [`Renderer`]
//! - [`EventSearch`]: End-to-end search entry point
//!
//! ## Example
//!
//! ```rust
//! use fleet_search::{Filter, LogSourceRegistry, Segment, compile};
//! use fleet_search::target::Scope;
//!
//! let registry = LogSourceRegistry::builtin();
//! let vmapi = registry.get("vmapi").expect("builtin source");
//! let glob = vmapi
//!     .location(&Scope::Instance("7d0c".into()), &Segment::Current)
//!     .expect("live file");
//! assert_eq!(glob, "/zones/7d0c/root/var/svc/log/smartdc-site-vmapi:default.log");
//!
//! let chain = compile(&[Filter::exists("evt"), Filter::any_of("req_id", ["abc"])])
//!     .expect("valid filters");
//! assert!(chain.is_match(r#"{"evt":{"name":"x"},"req_id":"abc"}"#));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod exec;
pub mod filter;
pub mod merge;
pub mod pipeline;
pub mod render;
pub mod search;
pub mod segment;
pub mod source;
pub mod target;
pub mod topology;

// Re-export main types
pub use error::{Result, SearchError};
pub use exec::{
    ExecConfig, RemoteCommand, RemoteExecutor, RemoteOutput, SearchExecutor, TransportError,
    local_command, remote_script, shell_quote,
};
pub use filter::{Filter, PatternChain, compile};
pub use merge::{Hit, SegmentMerger, parse_hits};
pub use pipeline::{PipelineStats, SegmentPipeline};
pub use render::{JsonLinesRenderer, OutputFormat, Renderer, TraceEventRenderer};
pub use search::{EventSearch, SearchPlan, SearchRequest};
pub use segment::{SearchWindow, Segment, human_duration, parse_start_time};
pub use source::{LogSource, LogSourceRegistry, RotationPolicy, SourceConfig, SourceScope};
pub use target::{Scope, SearchTarget, resolve_targets};
pub use topology::{Host, Instance, Inventory, Topology};
