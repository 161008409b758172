//! Per-target search execution.
//!
//! A target is searched either with a local shell pipeline (when it lives on
//! the host we run on) or by sending an equivalent script to the host through
//! a [`RemoteExecutor`]. Both strategies return raw newline-delimited text.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, trace};

use crate::error::{Result, SearchError};
use crate::filter::PatternChain;
use crate::segment::Segment;
use crate::target::SearchTarget;
use crate::topology::Host;

/// Default per-target remote timeout.
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default shell used to run search pipelines.
pub const DEFAULT_SHELL: &str = "/bin/bash";

/// Default extended-regex grep invocation.
pub const DEFAULT_GREP: &str = "grep -E";

/// Execution settings shared by every target of a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecConfig {
    /// Shell used for local pipelines.
    pub shell: String,
    /// Grep command (program plus flags) for each stage.
    pub grep: String,
    /// Id of the host we are running on; its targets are searched locally.
    pub local_host: Option<String>,
    /// Per-target timeout for remote execution.
    pub remote_timeout: Duration,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            shell: DEFAULT_SHELL.to_string(),
            grep: DEFAULT_GREP.to_string(),
            local_host: None,
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }
}

/// A script to run on a remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    /// Shell script text.
    pub script: String,
    /// Deadline the transport should enforce.
    pub timeout: Duration,
    /// Environment for the script; searches send an empty one.
    pub env: BTreeMap<String, String>,
}

/// What came back from a remote script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteOutput {
    /// Exit status of the script.
    pub exit_status: i32,
    /// Captured standard output.
    pub stdout: Vec<u8>,
    /// Captured standard error.
    pub stderr: Vec<u8>,
}

/// Error reported by a remote transport.
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// Capability to run a script on a fleet host.
///
/// Implementations report transport failures as errors; a script that ran
/// and failed is a successful call with a non-zero exit status.
pub trait RemoteExecutor: Send + Sync {
    /// Runs `command` on `host`.
    fn exec<'a>(
        &'a self,
        host: &'a Host,
        command: &'a RemoteCommand,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<RemoteOutput, TransportError>> + Send + 'a>>;
}

/// Runs one target's search for one segment.
#[derive(Clone)]
pub struct SearchExecutor {
    config: ExecConfig,
    remote: Arc<dyn RemoteExecutor>,
}

impl std::fmt::Debug for SearchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SearchExecutor {
    /// Creates an executor.
    #[must_use]
    pub fn new(config: ExecConfig, remote: Arc<dyn RemoteExecutor>) -> Self {
        Self { config, remote }
    }

    /// Execution settings.
    #[must_use]
    pub const fn config(&self) -> &ExecConfig {
        &self.config
    }

    /// Returns true if `target` is searched on this host.
    #[must_use]
    pub fn is_local(&self, target: &SearchTarget) -> bool {
        self.config.local_host.as_deref() == Some(target.host.id.as_str())
    }

    /// Searches `target` for `segment`, returning raw matching lines.
    ///
    /// # Errors
    ///
    /// Fails when the location cannot be resolved, the local pipeline cannot
    /// be started, or the remote transport errors, times out or reports a
    /// non-zero exit status.
    pub async fn execute(
        &self,
        target: &SearchTarget,
        segment: &Segment,
        chain: &PatternChain,
    ) -> Result<String> {
        let glob = target.source.location(&target.scope, segment)?;
        if self.is_local(target) {
            self.execute_local(&glob, chain).await
        } else {
            self.execute_remote(&target.host, &glob, chain).await
        }
    }

    async fn execute_local(&self, glob: &str, chain: &PatternChain) -> Result<String> {
        let cmdline = local_command(&self.config.grep, glob, chain);
        trace!(shell = %self.config.shell, cmd = %cmdline, "running local search");

        let output = Command::new(&self.config.shell)
            .arg("-c")
            .arg(&cmdline)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(SearchError::LocalExecution)?;

        // grep exits 1 on no matches and 2 on missing files; both are empty results.
        if !output.status.success() && !output.stderr.is_empty() {
            debug!(
                status = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "local search reported"
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn execute_remote(&self, host: &Host, glob: &str, chain: &PatternChain) -> Result<String> {
        let command = RemoteCommand {
            script: remote_script(&self.config.grep, glob, chain),
            timeout: self.config.remote_timeout,
            env: BTreeMap::new(),
        };
        trace!(host = %host.id, script = %command.script, "running remote search");

        let result = tokio::time::timeout(command.timeout, self.remote.exec(host, &command))
            .await
            .map_err(|_| SearchError::ExecutionTimeout {
                host: host.id.clone(),
                timeout: command.timeout,
            })?;

        let output = result.map_err(|e| SearchError::RemoteExecution {
            host: host.id.clone(),
            message: e.to_string(),
        })?;

        if output.exit_status != 0 {
            return Err(SearchError::RemoteExit {
                host: host.id.clone(),
                status: output.exit_status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Quotes `s` as a single shell word.
#[must_use]
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Builds the grep pipeline reading from `files` (already shell syntax).
fn grep_pipeline(grep: &str, files: &str, chain: &PatternChain) -> String {
    let mut stages = chain.patterns().iter();
    let Some(first) = stages.next() else {
        return format!("cat -- {files}");
    };

    let mut cmd = format!("{grep} -h -- {} {files}", shell_quote(first));
    for pattern in stages {
        cmd.push_str(&format!(" | {grep} -- {}", shell_quote(pattern)));
    }
    cmd
}

/// Builds the local search command line for `glob`.
///
/// The glob is left unquoted so the shell expands it.
#[must_use]
pub fn local_command(grep: &str, glob: &str, chain: &PatternChain) -> String {
    grep_pipeline(grep, glob, chain)
}

/// Builds the remote search script for `glob`.
///
/// Each glob match is searched separately and non-files are skipped, so an
/// unmatched glob is an empty result rather than an error. The script always
/// exits 0 when it runs to completion.
#[must_use]
pub fn remote_script(grep: &str, glob: &str, chain: &PatternChain) -> String {
    let per_file = grep_pipeline(grep, "\"${file}\"", chain);
    format!(
        "#!/bin/bash\n\
         for file in {glob}; do\n    \
             if [[ -f \"${{file}}\" ]]; then\n        \
                 {per_file}\n    \
             fi\n\
         done\n\
         exit 0\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Filter, compile};
    use crate::source::{LogSource, SourceScope};
    use crate::target::Scope;
    use std::sync::Mutex;

    struct ScriptedRemote {
        output: std::result::Result<RemoteOutput, String>,
        delay: Option<Duration>,
        seen: Mutex<Vec<RemoteCommand>>,
    }

    impl ScriptedRemote {
        fn ok(stdout: &str) -> Self {
            Self {
                output: Ok(RemoteOutput {
                    exit_status: 0,
                    stdout: stdout.as_bytes().to_vec(),
                    stderr: Vec::new(),
                }),
                delay: None,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl RemoteExecutor for ScriptedRemote {
        fn exec<'a>(
            &'a self,
            _host: &'a Host,
            command: &'a RemoteCommand,
        ) -> Pin<Box<dyn Future<Output = std::result::Result<RemoteOutput, TransportError>> + Send + 'a>>
        {
            Box::pin(async move {
                self.seen.lock().expect("lock").push(command.clone());
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                self.output.clone().map_err(TransportError::from)
            })
        }
    }

    fn chain() -> PatternChain {
        compile(&[Filter::exists("evt"), Filter::any_of("req_id", ["abc"])]).expect("compile")
    }

    fn remote_target() -> SearchTarget {
        SearchTarget::new(
            Arc::new(LogSource::service_zone("vmapi")),
            Host::new("cn-1", "10.0.0.5"),
            Scope::Instance("z1".to_string()),
        )
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("abc"), "'abc'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(r#""evt":"#), r#"'"evt":'"#);
    }

    #[test]
    fn local_command_chains_stages() {
        let cmd = local_command("grep -E", "/var/log/a*.log", &chain());
        assert_eq!(
            cmd,
            r#"grep -E -h -- '"evt":' /var/log/a*.log | grep -E -- '"req_id":"(abc)"'"#
        );
    }

    #[test]
    fn local_command_without_patterns_reads_files() {
        let empty = compile(&[]).expect("compile");
        assert_eq!(local_command("grep -E", "/x.log", &empty), "cat -- /x.log");
    }

    #[test]
    fn remote_script_iterates_files() {
        let script = remote_script("grep -E", "/zones/z1/root/var/log/x_*.log", &chain());
        assert!(script.starts_with("#!/bin/bash\n"));
        assert!(script.contains("for file in /zones/z1/root/var/log/x_*.log; do"));
        assert!(script.contains(r#"if [[ -f "${file}" ]]; then"#));
        assert!(script.contains(r#"grep -E -h -- '"evt":' "${file}" | grep -E -- '"req_id":"(abc)"'"#));
        assert!(script.trim_end().ends_with("exit 0"));
    }

    #[tokio::test]
    async fn remote_success_returns_stdout() {
        let remote = Arc::new(ScriptedRemote::ok("{\"a\":1}\n"));
        let executor = SearchExecutor::new(ExecConfig::default(), remote.clone());

        let out = executor
            .execute(&remote_target(), &Segment::Current, &chain())
            .await
            .expect("execute");
        assert_eq!(out, "{\"a\":1}\n");

        let seen = remote.seen.lock().expect("lock");
        assert_eq!(seen.len(), 1);
        assert!(seen[0].env.is_empty());
        assert_eq!(seen[0].timeout, DEFAULT_REMOTE_TIMEOUT);
        assert!(seen[0].script.contains("/zones/z1/root/var/svc/log/smartdc-site-vmapi:default.log"));
    }

    #[tokio::test]
    async fn remote_non_zero_exit_fails() {
        let remote = Arc::new(ScriptedRemote {
            output: Ok(RemoteOutput {
                exit_status: 1,
                stdout: Vec::new(),
                stderr: b"bash: grep: command not found\n".to_vec(),
            }),
            delay: None,
            seen: Mutex::new(Vec::new()),
        });
        let executor = SearchExecutor::new(ExecConfig::default(), remote);

        let err = executor
            .execute(&remote_target(), &Segment::Current, &chain())
            .await
            .expect_err("exit 1");
        assert!(matches!(
            &err,
            SearchError::RemoteExit { host, status: 1, stderr }
                if host == "cn-1" && stderr == "bash: grep: command not found"
        ));
    }

    #[tokio::test]
    async fn remote_transport_error_fails() {
        let remote = Arc::new(ScriptedRemote {
            output: Err("connection refused".to_string()),
            delay: None,
            seen: Mutex::new(Vec::new()),
        });
        let executor = SearchExecutor::new(ExecConfig::default(), remote);

        let err = executor
            .execute(&remote_target(), &Segment::Current, &chain())
            .await
            .expect_err("transport");
        assert!(matches!(err, SearchError::RemoteExecution { ref message, .. } if message == "connection refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn remote_timeout_fails() {
        let mut remote = ScriptedRemote::ok("");
        remote.delay = Some(Duration::from_secs(60));
        let executor = SearchExecutor::new(ExecConfig::default(), Arc::new(remote));

        let err = executor
            .execute(&remote_target(), &Segment::Current, &chain())
            .await
            .expect_err("timeout");
        assert!(matches!(err, SearchError::ExecutionTimeout { timeout, .. } if timeout == DEFAULT_REMOTE_TIMEOUT));
    }

    #[tokio::test]
    async fn unsupported_rotation_fails_before_execution() {
        use crate::source::RotationPolicy;
        use chrono::Utc;

        let remote = Arc::new(ScriptedRemote::ok(""));
        let executor = SearchExecutor::new(ExecConfig::default(), remote.clone());
        let target = SearchTarget::new(
            Arc::new(LogSource::host_agent("x").with_rotation(RotationPolicy::None)),
            Host::new("cn-1", "10.0.0.5"),
            Scope::Global,
        );

        let err = executor
            .execute(&target, &Segment::hour(Utc::now()), &chain())
            .await
            .expect_err("unsupported");
        assert!(matches!(err, SearchError::UnsupportedRotation { .. }));
        assert!(remote.seen.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn local_search_greps_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = dir.path().join("app.log");
        std::fs::write(
            &log,
            concat!(
                "{\"evt\":{\"name\":\"a\"},\"req_id\":\"abc\",\"time\":\"2015-02-13T20:00:00Z\"}\n",
                "{\"evt\":{\"name\":\"b\"},\"req_id\":\"zzz\",\"time\":\"2015-02-13T20:00:01Z\"}\n",
                "{\"msg\":\"no event\",\"req_id\":\"abc\"}\n",
            ),
        )
        .expect("write");

        let source = LogSource::new(
            "app",
            SourceScope::Global,
            log.display().to_string(),
            dir.path().display().to_string(),
        );
        let target = SearchTarget::new(Arc::new(source), Host::new("local", ""), Scope::Global);
        let config = ExecConfig {
            shell: "sh".to_string(),
            local_host: Some("local".to_string()),
            ..ExecConfig::default()
        };
        let executor = SearchExecutor::new(config, Arc::new(ScriptedRemote::ok("")));
        assert!(executor.is_local(&target));

        let out = executor
            .execute(&target, &Segment::Current, &chain())
            .await
            .expect("execute");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("\"name\":\"a\""));
    }

    #[tokio::test]
    async fn local_search_missing_files_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = LogSource::new(
            "app",
            SourceScope::Global,
            dir.path().join("missing-*.log").display().to_string(),
            dir.path().display().to_string(),
        );
        let target = SearchTarget::new(Arc::new(source), Host::new("local", ""), Scope::Global);
        let config = ExecConfig {
            shell: "sh".to_string(),
            local_host: Some("local".to_string()),
            ..ExecConfig::default()
        };
        let executor = SearchExecutor::new(config, Arc::new(ScriptedRemote::ok("")));

        let out = executor
            .execute(&target, &Segment::Current, &chain())
            .await
            .expect("execute");
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn cancelled_local_search_kills_pipeline() {
        let dir = tempfile::tempdir().expect("tempdir");
        let marker = dir.path().join("finished");
        let source = LogSource::new(
            "app",
            SourceScope::Global,
            dir.path().join("app.log").display().to_string(),
            dir.path().display().to_string(),
        );
        let target = SearchTarget::new(Arc::new(source), Host::new("local", ""), Scope::Global);
        let config = ExecConfig {
            shell: "sh".to_string(),
            grep: format!("sleep 1; touch {}; grep -E", marker.display()),
            local_host: Some("local".to_string()),
            ..ExecConfig::default()
        };
        let executor = SearchExecutor::new(config, Arc::new(ScriptedRemote::ok("")));

        let chain = chain();
        let cancelled = tokio::time::timeout(
            std::time::Duration::from_millis(200),
            executor.execute(&target, &Segment::Current, &chain),
        )
        .await;
        assert!(cancelled.is_err());

        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }
}
