//! Log source catalog.
//!
//! This module provides:
//! - [`LogSource`]: A logical family of log files sharing naming and rotation
//! - [`SourceConfig`]: Validated configuration form of a source
//! - [`LogSourceRegistry`]: The read-only catalog searches select from
//!
//! A source resolves to a shell glob for a given host scope and time
//! segment; see [`LogSource::location`].

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};
use crate::segment::Segment;
use crate::target::Scope;

/// Filesystem prefix under which each instance's root is visible from its host.
pub const INSTANCE_ROOT_PREFIX: &str = "/zones";

/// How a source's files are rotated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    /// Rotated hourly into `<dir>/<name>_<id>_<YYYY-MM-DDTHH>:...log`.
    #[default]
    Hourly,
    /// Never rotated; only the live file exists.
    None,
}

impl RotationPolicy {
    /// Returns the policy tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::None => "none",
        }
    }
}

impl fmt::Display for RotationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a source's files live in the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "scope", rename_all = "kebab-case")]
pub enum SourceScope {
    /// One log per host.
    Global,
    /// One log per deployed instance of `service`.
    PerInstance {
        /// Service whose instances write this log.
        service: String,
    },
}

/// A logical log stream family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogSource {
    name: String,
    #[serde(flatten)]
    scope: SourceScope,
    current: String,
    rotation: RotationPolicy,
    rotated_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    rotated_name: Option<String>,
}

impl LogSource {
    /// Creates a source from its parts.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        scope: SourceScope,
        current: impl Into<String>,
        rotated_dir: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            scope,
            current: current.into(),
            rotation: RotationPolicy::Hourly,
            rotated_dir: rotated_dir.into(),
            rotated_name: None,
        }
    }

    /// Preset for a service running in its own instance, logging through the
    /// site service manager and uploading rotated logs to the shared upload dir.
    #[must_use]
    pub fn service_zone(name: &str) -> Self {
        Self::new(
            name,
            SourceScope::PerInstance {
                service: name.to_string(),
            },
            format!("/var/svc/log/smartdc-site-{name}:default.log"),
            "/var/log/sdc/upload",
        )
    }

    /// Preset for an agent running once per host.
    #[must_use]
    pub fn host_agent(name: &str) -> Self {
        Self::new(
            name,
            SourceScope::Global,
            format!("/var/svc/log/smartdc-agent-{name}:default.log"),
            format!("/var/log/sdc/{name}"),
        )
    }

    /// Makes the source per-instance for the given service.
    #[must_use]
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.scope = SourceScope::PerInstance {
            service: service.into(),
        };
        self
    }

    /// Sets the live-file pattern.
    #[must_use]
    pub fn with_current(mut self, current: impl Into<String>) -> Self {
        self.current = current.into();
        self
    }

    /// Sets the rotated-archive directory.
    #[must_use]
    pub fn with_rotated_dir(mut self, dir: impl Into<String>) -> Self {
        self.rotated_dir = dir.into();
        self
    }

    /// Sets the rotated file name prefix (defaults to the source name).
    #[must_use]
    pub fn with_rotated_name(mut self, name: impl Into<String>) -> Self {
        self.rotated_name = Some(name.into());
        self
    }

    /// Sets the rotation policy.
    #[must_use]
    pub const fn with_rotation(mut self, rotation: RotationPolicy) -> Self {
        self.rotation = rotation;
        self
    }

    /// Source name (catalog key).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Where the source's files live.
    #[must_use]
    pub const fn scope(&self) -> &SourceScope {
        &self.scope
    }

    /// Returns true for one-per-host sources.
    #[must_use]
    pub const fn is_global(&self) -> bool {
        matches!(self.scope, SourceScope::Global)
    }

    /// Service this source belongs to, for per-instance sources.
    #[must_use]
    pub fn service(&self) -> Option<&str> {
        match &self.scope {
            SourceScope::Global => None,
            SourceScope::PerInstance { service } => Some(service),
        }
    }

    /// Live-file pattern.
    #[must_use]
    pub fn current(&self) -> &str {
        &self.current
    }

    /// Rotation policy.
    #[must_use]
    pub const fn rotation(&self) -> RotationPolicy {
        self.rotation
    }

    /// Resolves the file glob to search for `segment` within `scope`.
    ///
    /// Instance scopes are rooted under `/zones/<instance>/root` so the glob
    /// can be evaluated from the instance's host.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::UnsupportedRotation`] when a rotated hour is
    /// requested from a source that does not rotate hourly.
    pub fn location(&self, scope: &Scope, segment: &Segment) -> Result<String> {
        let pattern = match segment.hour_key() {
            None => self.current.clone(),
            Some(hour) => {
                if self.rotation != RotationPolicy::Hourly {
                    return Err(SearchError::UnsupportedRotation {
                        source_name: self.name.clone(),
                        rotation: self.rotation.to_string(),
                    });
                }
                let prefix = self.rotated_name.as_deref().unwrap_or(&self.name);
                join_path(&self.rotated_dir, &format!("{prefix}_*_{hour}*.log"))
            }
        };

        Ok(match scope {
            Scope::Global => pattern,
            Scope::Instance(instance) => join_path(
                &format!("{INSTANCE_ROOT_PREFIX}/{instance}/root"),
                &pattern,
            ),
        })
    }
}

fn join_path(base: &str, rest: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        rest.trim_start_matches('/')
    )
}

/// Scope tag used in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScopeKind {
    /// One log per host.
    Global,
    /// One log per service instance.
    PerInstance,
}

/// A source as written in a configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Catalog key.
    pub name: String,
    /// Host-wide or per-instance.
    pub scope: ScopeKind,
    /// Owning service; defaults to `name` for per-instance sources.
    #[serde(default)]
    pub service: Option<String>,
    /// Live-file pattern.
    pub current: String,
    /// Rotation policy; hourly when omitted.
    #[serde(default)]
    pub rotation: RotationPolicy,
    /// Rotated-archive directory.
    pub rotated_dir: String,
    /// Rotated file name prefix; defaults to `name`.
    #[serde(default)]
    pub rotated_name: Option<String>,
}

impl TryFrom<SourceConfig> for LogSource {
    type Error = SearchError;

    fn try_from(config: SourceConfig) -> Result<Self> {
        let invalid = |reason: &str| SearchError::InvalidSource {
            name: config.name.clone(),
            reason: reason.to_string(),
        };

        if config.name.trim().is_empty() {
            return Err(invalid("name cannot be empty"));
        }
        if config.current.trim().is_empty() {
            return Err(invalid("current file pattern cannot be empty"));
        }
        if config.rotated_dir.trim().is_empty() {
            return Err(invalid("rotated_dir cannot be empty"));
        }

        let scope = match (config.scope, &config.service) {
            (ScopeKind::Global, Some(_)) => {
                return Err(invalid("a global source cannot name a service"));
            }
            (ScopeKind::Global, None) => SourceScope::Global,
            (ScopeKind::PerInstance, Some(service)) if service.trim().is_empty() => {
                return Err(invalid("service cannot be empty"));
            }
            (ScopeKind::PerInstance, service) => SourceScope::PerInstance {
                service: service.clone().unwrap_or_else(|| config.name.clone()),
            },
        };

        Ok(Self {
            name: config.name,
            scope,
            current: config.current,
            rotation: config.rotation,
            rotated_dir: config.rotated_dir,
            rotated_name: config.rotated_name,
        })
    }
}

/// Read-only catalog of log sources, in declaration order.
#[derive(Debug, Clone)]
pub struct LogSourceRegistry {
    sources: Vec<Arc<LogSource>>,
}

impl LogSourceRegistry {
    /// Builds a registry from sources.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::DuplicateSource`] if two sources share a name.
    pub fn from_sources(sources: Vec<LogSource>) -> Result<Self> {
        let mut seen = HashSet::new();
        for source in &sources {
            if !seen.insert(source.name.clone()) {
                return Err(SearchError::DuplicateSource(source.name.clone()));
            }
        }
        Ok(Self {
            sources: sources.into_iter().map(Arc::new).collect(),
        })
    }

    /// The built-in catalog of well-known fleet logs.
    #[must_use]
    pub fn builtin() -> Self {
        let sources = vec![
            LogSource::service_zone("imgapi"),
            LogSource::service_zone("napi"),
            LogSource::service_zone("cnapi"),
            LogSource::service_zone("vmapi"),
            LogSource::service_zone("docker")
                .with_current("/var/svc/log/smartdc-application-docker:default.log"),
            LogSource::service_zone("sapi"),
            LogSource::service_zone("papi"),
            LogSource::service_zone("fwapi"),
            LogSource::service_zone("amon-master").with_service("amon"),
            LogSource::service_zone("wf-api")
                .with_service("workflow")
                .with_current("/var/svc/log/smartdc-application-wf-api:default.log"),
            LogSource::service_zone("wf-runner")
                .with_service("workflow")
                .with_current("/var/svc/log/smartdc-application-wf-runner:default.log"),
            LogSource::service_zone("cloudapi")
                .with_current("/var/svc/log/smartdc-application-cloudapi:cloudapi-*.log")
                .with_rotated_name("cloudapi-*"),
            LogSource::service_zone("ufds-master")
                .with_service("ufds")
                .with_current("/var/svc/log/smartdc-application-ufds-master:ufds-*.log")
                .with_rotated_name("ufds-master-*"),
            LogSource::host_agent("vm-agent"),
            LogSource::host_agent("net-agent"),
            LogSource::host_agent("firewaller").with_rotated_dir("/var/log/sdc/upload"),
            LogSource::host_agent("cn-agent"),
            LogSource::new(
                "cn-agent-tasks",
                SourceScope::Global,
                "/var/log/cn-agent/logs/*.log",
                "/var/log/cn-agent",
            ),
            LogSource::host_agent("provisioner"),
            LogSource::new(
                "provisioner-tasks",
                SourceScope::Global,
                "/var/log/provisioner/logs/*.log",
                "/var/log/provisioner",
            )
            .with_rotated_name("provisioner_tasks"),
            LogSource::new(
                "vmadm",
                SourceScope::Global,
                "/var/log/vm/logs/*.log",
                "/var/log/vm",
            ),
            LogSource::new(
                "vmadmd",
                SourceScope::Global,
                "/var/svc/log/system-smartdc-vmadmd:default.log",
                "/var/log/vm",
            ),
            LogSource::new(
                "fwadm",
                SourceScope::Global,
                "/var/log/fw/logs/*.log",
                "/var/log/fw",
            ),
        ];

        Self {
            sources: sources.into_iter().map(Arc::new).collect(),
        }
    }

    /// Returns a new registry where `overrides` replace same-named sources
    /// and any other entries are appended.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::DuplicateSource`] if `overrides` repeats a name.
    pub fn with_overrides(self, overrides: Vec<LogSource>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut sources = self.sources;
        for source in overrides {
            if !seen.insert(source.name.clone()) {
                return Err(SearchError::DuplicateSource(source.name));
            }
            let source = Arc::new(source);
            match sources.iter_mut().find(|s| s.name == source.name) {
                Some(slot) => *slot = source,
                None => sources.push(source),
            }
        }
        Ok(Self { sources })
    }

    /// Looks up a source by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<LogSource>> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Selects sources by name; no selectors means every source.
    ///
    /// Repeated selectors are searched once.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::UnknownLogSource`] for a name not in the catalog.
    pub fn select(&self, names: &[String]) -> Result<Vec<Arc<LogSource>>> {
        if names.is_empty() {
            return Ok(self.sources.clone());
        }

        let mut seen = HashSet::new();
        let mut selected = Vec::with_capacity(names.len());
        for name in names {
            let source = self
                .get(name)
                .ok_or_else(|| SearchError::UnknownLogSource(name.clone()))?;
            if seen.insert(name.as_str()) {
                selected.push(Arc::clone(source));
            }
        }
        Ok(selected)
    }

    /// Iterates sources in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<LogSource>> {
        self.sources.iter()
    }

    /// Sorted source names, for help text.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sources.iter().map(|s| s.name()).collect();
        names.sort_unstable();
        names
    }

    /// Number of sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Returns true if the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Default for LogSourceRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn hour() -> Segment {
        Segment::hour(
            Utc.with_ymd_and_hms(2015, 2, 13, 21, 0, 0)
                .single()
                .expect("valid time"),
        )
    }

    fn config(name: &str, scope: ScopeKind, service: Option<&str>) -> SourceConfig {
        SourceConfig {
            name: name.to_string(),
            scope,
            service: service.map(str::to_string),
            current: "/var/log/app.log".to_string(),
            rotation: RotationPolicy::Hourly,
            rotated_dir: "/var/log/app".to_string(),
            rotated_name: None,
        }
    }

    #[test]
    fn service_zone_preset_defaults() {
        let source = LogSource::service_zone("vmapi");
        assert_eq!(source.service(), Some("vmapi"));
        assert!(!source.is_global());
        assert_eq!(source.current(), "/var/svc/log/smartdc-site-vmapi:default.log");
        assert_eq!(source.rotation(), RotationPolicy::Hourly);
    }

    #[test]
    fn host_agent_preset_defaults() {
        let source = LogSource::host_agent("cn-agent");
        assert!(source.is_global());
        assert_eq!(source.service(), None);
        assert_eq!(
            source.current(),
            "/var/svc/log/smartdc-agent-cn-agent:default.log"
        );
    }

    #[test]
    fn location_current_global() {
        let source = LogSource::host_agent("cn-agent");
        let glob = source.location(&Scope::Global, &Segment::Current).expect("glob");
        assert_eq!(glob, "/var/svc/log/smartdc-agent-cn-agent:default.log");
    }

    #[test]
    fn location_rotated_hour() {
        let source = LogSource::host_agent("cn-agent");
        let glob = source.location(&Scope::Global, &hour()).expect("glob");
        assert_eq!(glob, "/var/log/sdc/cn-agent/cn-agent_*_2015-02-13T21:*.log");
    }

    #[test]
    fn location_uses_rotated_name() {
        let registry = LogSourceRegistry::builtin();
        let source = registry.get("provisioner-tasks").expect("builtin");
        let glob = source.location(&Scope::Global, &hour()).expect("glob");
        assert_eq!(
            glob,
            "/var/log/provisioner/provisioner_tasks_*_2015-02-13T21:*.log"
        );
    }

    #[test]
    fn location_instance_is_rooted_under_zone() {
        let source = LogSource::service_zone("vmapi");
        let scope = Scope::Instance("7d0c1e2f".to_string());

        let current = source.location(&scope, &Segment::Current).expect("glob");
        assert_eq!(
            current,
            "/zones/7d0c1e2f/root/var/svc/log/smartdc-site-vmapi:default.log"
        );

        let rotated = source.location(&scope, &hour()).expect("glob");
        assert_eq!(
            rotated,
            "/zones/7d0c1e2f/root/var/log/sdc/upload/vmapi_*_2015-02-13T21:*.log"
        );
    }

    #[test]
    fn location_rejects_unrotated_hours() {
        let source = LogSource::host_agent("smartlogin").with_rotation(RotationPolicy::None);
        let err = source.location(&Scope::Global, &hour()).expect_err("unsupported");
        assert!(matches!(err, SearchError::UnsupportedRotation { .. }));

        let live = source.location(&Scope::Global, &Segment::Current);
        assert!(live.is_ok());
    }

    #[test]
    fn config_per_instance_defaults_service_to_name() {
        let source = LogSource::try_from(config("myapp", ScopeKind::PerInstance, None))
            .expect("valid");
        assert_eq!(source.service(), Some("myapp"));
    }

    #[test]
    fn config_global_rejects_service() {
        let err = LogSource::try_from(config("agent", ScopeKind::Global, Some("svc")))
            .expect_err("invalid");
        assert!(matches!(err, SearchError::InvalidSource { .. }));
    }

    #[test]
    fn config_rejects_empty_fields() {
        let mut cfg = config("myapp", ScopeKind::Global, None);
        cfg.current = String::new();
        assert!(LogSource::try_from(cfg).is_err());

        let cfg = config(" ", ScopeKind::Global, None);
        assert!(LogSource::try_from(cfg).is_err());
    }

    #[test]
    fn builtin_catalog_is_consistent() {
        let registry = LogSourceRegistry::builtin();
        assert!(!registry.is_empty());
        assert!(LogSourceRegistry::from_sources(
            registry.iter().map(|s| (**s).clone()).collect()
        )
        .is_ok());

        let wf = registry.get("wf-runner").expect("builtin");
        assert_eq!(wf.service(), Some("workflow"));
        let fwadm = registry.get("fwadm").expect("builtin");
        assert!(fwadm.is_global());
    }

    #[test]
    fn registry_rejects_duplicates() {
        let result = LogSourceRegistry::from_sources(vec![
            LogSource::host_agent("a"),
            LogSource::service_zone("a"),
        ]);
        assert!(matches!(result, Err(SearchError::DuplicateSource(name)) if name == "a"));
    }

    #[test]
    fn select_all_when_empty() {
        let registry = LogSourceRegistry::builtin();
        let selected = registry.select(&[]).expect("select");
        assert_eq!(selected.len(), registry.len());
    }

    #[test]
    fn select_unknown_fails() {
        let registry = LogSourceRegistry::builtin();
        let err = registry
            .select(&["vmapi".to_string(), "nope".to_string()])
            .expect_err("unknown");
        assert!(matches!(err, SearchError::UnknownLogSource(name) if name == "nope"));
    }

    #[test]
    fn select_dedupes_and_keeps_order() {
        let registry = LogSourceRegistry::builtin();
        let names = ["vmapi", "cnapi", "vmapi"].map(String::from);
        let selected = registry.select(&names).expect("select");
        let got: Vec<&str> = selected.iter().map(|s| s.name()).collect();
        assert_eq!(got, vec!["vmapi", "cnapi"]);
    }

    #[test]
    fn overrides_replace_and_append() {
        let registry = LogSourceRegistry::builtin();
        let before = registry.len();
        let registry = registry
            .with_overrides(vec![
                LogSource::service_zone("vmapi").with_current("/custom/vmapi.log"),
                LogSource::host_agent("new-agent"),
            ])
            .expect("overrides");

        assert_eq!(registry.len(), before + 1);
        assert_eq!(
            registry.get("vmapi").map(|s| s.current()),
            Some("/custom/vmapi.log")
        );
        assert!(registry.get("new-agent").is_some());
    }

    #[test]
    fn names_are_sorted() {
        let registry = LogSourceRegistry::builtin();
        let names = registry.names();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }
}
