//! Search target resolution.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::source::{LogSource, SourceScope};
use crate::topology::{Host, Topology};

/// Filesystem scope a target is searched in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    /// The host's own filesystem.
    Global,
    /// An instance's isolated filesystem, by instance id.
    Instance(String),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Instance(id) => f.write_str(id),
        }
    }
}

/// One unit of fan-out work: a source on a host, in a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTarget {
    /// The source being searched.
    pub source: Arc<LogSource>,
    /// The host holding the files.
    pub host: Host,
    /// Host-wide or a specific instance.
    pub scope: Scope,
}

impl SearchTarget {
    /// Creates a target.
    #[must_use]
    pub const fn new(source: Arc<LogSource>, host: Host, scope: Scope) -> Self {
        Self {
            source,
            host,
            scope,
        }
    }
}

impl fmt::Display for SearchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/{}", self.source.name(), self.host.id, self.scope)
    }
}

/// Expands sources into targets against `topology`.
///
/// Global sources yield one target per live host. Per-instance sources yield
/// one target per instance of their service whose host is live; instances on
/// unknown or down hosts are dropped.
#[must_use]
pub fn resolve_targets(sources: &[Arc<LogSource>], topology: &dyn Topology) -> Vec<SearchTarget> {
    let hosts = topology.running_hosts();
    let by_id: HashMap<&str, &Host> = hosts.iter().map(|h| (h.id.as_str(), h)).collect();

    let mut targets = Vec::new();
    for source in sources {
        match source.scope() {
            SourceScope::Global => {
                targets.extend(
                    hosts
                        .iter()
                        .map(|h| SearchTarget::new(Arc::clone(source), h.clone(), Scope::Global)),
                );
            }
            SourceScope::PerInstance { service } => {
                for instance in topology.instances_of(service) {
                    match by_id.get(instance.host.as_str()) {
                        Some(host) => targets.push(SearchTarget::new(
                            Arc::clone(source),
                            (*host).clone(),
                            Scope::Instance(instance.id),
                        )),
                        None => debug!(
                            source = source.name(),
                            instance = %instance.id,
                            host = %instance.host,
                            "dropping instance on unresolvable host"
                        ),
                    }
                }
            }
        }
    }
    targets
}
