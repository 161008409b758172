//! Fleet topology.
//!
//! The resolver only needs two questions answered: which hosts are up, and
//! where the instances of a service are deployed. [`Topology`] abstracts the
//! discovery backend; [`Inventory`] is a static in-memory implementation.

use serde::{Deserialize, Serialize};

/// A compute host in the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Host {
    /// Stable host identifier.
    pub id: String,
    /// Human-readable host name.
    #[serde(default)]
    pub hostname: String,
    /// Network address used to reach the host.
    #[serde(default)]
    pub address: String,
    /// Whether the host is currently running.
    #[serde(default = "default_true")]
    pub running: bool,
    /// Whether the host has finished provisioning.
    #[serde(default = "default_true")]
    pub provisioned: bool,
}

const fn default_true() -> bool {
    true
}

impl Host {
    /// Creates a running, provisioned host.
    #[must_use]
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            hostname: id.clone(),
            id,
            address: address.into(),
            running: true,
            provisioned: true,
        }
    }

    /// Returns true if searches may be sent to this host.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.running && self.provisioned
    }
}

/// A deployed service instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instance {
    /// Instance identifier; also names its filesystem root on the host.
    pub id: String,
    /// Service the instance belongs to.
    pub service: String,
    /// Id of the host the instance runs on.
    pub host: String,
}

impl Instance {
    /// Creates an instance record.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        service: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            service: service.into(),
            host: host.into(),
        }
    }
}

/// Source of fleet topology.
pub trait Topology: Send + Sync {
    /// Lists hosts that are running and provisioned.
    fn running_hosts(&self) -> Vec<Host>;

    /// Lists deployed instances of `service`.
    fn instances_of(&self, service: &str) -> Vec<Instance>;
}

/// Static topology snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    /// Known hosts, live or not.
    #[serde(default)]
    pub hosts: Vec<Host>,
    /// Known instances.
    #[serde(default)]
    pub instances: Vec<Instance>,
}

impl Inventory {
    /// Creates an inventory.
    #[must_use]
    pub const fn new(hosts: Vec<Host>, instances: Vec<Instance>) -> Self {
        Self { hosts, instances }
    }

    /// Looks up a host by id.
    #[must_use]
    pub fn host(&self, id: &str) -> Option<&Host> {
        self.hosts.iter().find(|h| h.id == id)
    }
}

impl Topology for Inventory {
    fn running_hosts(&self) -> Vec<Host> {
        self.hosts.iter().filter(|h| h.is_live()).cloned().collect()
    }

    fn instances_of(&self, service: &str) -> Vec<Instance> {
        self.instances
            .iter()
            .filter(|i| i.service == service)
            .cloned()
            .collect()
    }
}
