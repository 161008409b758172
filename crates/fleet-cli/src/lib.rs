//! # fleet-cli
//!
//! `fleet-events` command-line interface.
//!
//! Searches the structured logs of a fleet for events in a time window and
//! prints them as JSON lines or as a trace-event array:
//! - [`config`] loads the inventory, transport and extra sources
//! - [`ssh`] runs search scripts on remote hosts
//! - [`commands`] drives a search or lists the source catalog
//!
//! ```text
//! ┌──────────────┐   bash -s over ssh   ┌────────────┐
//! │ fleet-events │─────────────────────►│ fleet host │
//! └──────────────┘                      └────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod ssh;

pub use cli::{Cli, Format};
pub use config::Config;
pub use error::CliError;
pub use ssh::SshExecutor;
