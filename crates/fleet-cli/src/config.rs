//! fleet-events configuration.
//!
//! Configuration comes from a TOML file:
//! - Which host we run on (its targets are searched locally)
//! - Search execution settings (shell, grep, remote timeout)
//! - SSH transport settings
//! - The fleet inventory (hosts and service instances)
//! - Extra or overriding log sources

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fleet_search::exec::{DEFAULT_GREP, DEFAULT_REMOTE_TIMEOUT, DEFAULT_SHELL};
use fleet_search::{
    ExecConfig, Host, Instance, Inventory, LogSource, LogSourceRegistry, SourceConfig,
};
use serde::Deserialize;
use tracing::warn;

use crate::error::CliError;

/// Config file read when none is given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/fleet-events/config.toml";

/// Search execution settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ExecSettings {
    /// Shell for local search pipelines.
    pub shell: String,
    /// Grep command (program and flags).
    pub grep: String,
    /// Per-host remote timeout in seconds.
    pub remote_timeout_secs: u64,
}

impl Default for ExecSettings {
    fn default() -> Self {
        Self {
            shell: DEFAULT_SHELL.to_string(),
            grep: DEFAULT_GREP.to_string(),
            remote_timeout_secs: DEFAULT_REMOTE_TIMEOUT.as_secs(),
        }
    }
}

/// SSH transport settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SshSettings {
    /// ssh program.
    pub program: String,
    /// Remote user; ssh's default when unset.
    pub user: Option<String>,
    /// Extra ssh options, placed before the destination.
    pub options: Vec<String>,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            program: "ssh".to_string(),
            user: None,
            options: vec!["-o".to_string(), "BatchMode=yes".to_string()],
        }
    }
}

/// Main configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Id of the host this tool runs on.
    #[serde(default)]
    pub local_host: Option<String>,
    /// Execution settings.
    #[serde(default)]
    pub exec: ExecSettings,
    /// SSH settings.
    #[serde(default)]
    pub ssh: SshSettings,
    /// Fleet hosts.
    #[serde(default)]
    pub hosts: Vec<Host>,
    /// Deployed service instances.
    #[serde(default)]
    pub instances: Vec<Instance>,
    /// Extra log sources; same-named built-ins are replaced.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Loads the configuration.
    ///
    /// An explicit path must exist. Without one the default path is used if
    /// present, otherwise the empty configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: Option<&Path>) -> Result<Self, CliError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CliError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            CliError::Config(format!(
                "failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, CliError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| CliError::Config(format!("invalid TOML: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<(), CliError> {
        if self.exec.shell.trim().is_empty() {
            return Err(CliError::Config("exec.shell cannot be empty".to_string()));
        }
        if self.exec.grep.trim().is_empty() {
            return Err(CliError::Config("exec.grep cannot be empty".to_string()));
        }
        if self.exec.remote_timeout_secs == 0 {
            return Err(CliError::Config(
                "exec.remote_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.ssh.program.trim().is_empty() {
            return Err(CliError::Config("ssh.program cannot be empty".to_string()));
        }

        let mut host_ids = HashSet::new();
        for host in &self.hosts {
            if host.id.trim().is_empty() {
                return Err(CliError::Config("host id cannot be empty".to_string()));
            }
            if !host_ids.insert(host.id.as_str()) {
                return Err(CliError::Config(format!("duplicate host id: {}", host.id)));
            }
        }

        // Stale inventory is tolerated; the resolver drops these instances.
        for instance in &self.instances {
            if !host_ids.contains(instance.host.as_str()) {
                warn!(
                    instance = %instance.id,
                    host = %instance.host,
                    "instance references an unknown host"
                );
            }
        }

        if let Some(local) = &self.local_host {
            if !self.hosts.is_empty() && !host_ids.contains(local.as_str()) {
                warn!(local_host = %local, "local_host is not in the inventory");
            }
        }

        self.registry()?;
        Ok(())
    }

    /// Execution settings for the search engine.
    #[must_use]
    pub fn exec_config(&self) -> ExecConfig {
        ExecConfig {
            shell: self.exec.shell.clone(),
            grep: self.exec.grep.clone(),
            local_host: self.local_host.clone(),
            remote_timeout: Duration::from_secs(self.exec.remote_timeout_secs),
        }
    }

    /// The configured fleet inventory.
    #[must_use]
    pub fn inventory(&self) -> Inventory {
        Inventory::new(self.hosts.clone(), self.instances.clone())
    }

    /// The built-in catalog with configured sources applied.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured source is invalid or repeated.
    pub fn registry(&self) -> Result<LogSourceRegistry, CliError> {
        Ok(LogSourceRegistry::builtin().with_overrides(self.source_overrides()?)?)
    }

    fn source_overrides(&self) -> Result<Vec<LogSource>, CliError> {
        Ok(self
            .sources
            .iter()
            .cloned()
            .map(LogSource::try_from)
            .collect::<Result<Vec<_>, _>>()?)
    }
}
