//! SSH transport for remote searches.
//!
//! Each search script is fed to `bash -s` on the target host over stdin,
//! under an emptied environment.

use std::pin::Pin;
use std::process::Stdio;

use fleet_search::{Host, RemoteCommand, RemoteExecutor, RemoteOutput, TransportError, shell_quote};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::config::SshSettings;

/// Exit status ssh reserves for its own failures.
const SSH_FAILURE_STATUS: i32 = 255;

/// Remote interpreter for search scripts.
const REMOTE_SHELL: &str = "/bin/bash";

/// [`RemoteExecutor`] that shells out to the `ssh` client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshExecutor {
    program: String,
    user: Option<String>,
    options: Vec<String>,
}

impl SshExecutor {
    /// Creates an executor from the SSH settings.
    #[must_use]
    pub fn new(settings: &SshSettings) -> Self {
        Self {
            program: settings.program.clone(),
            user: settings.user.clone(),
            options: settings.options.clone(),
        }
    }

    /// The ssh program.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// ssh arguments that run `command` on `host`.
    #[must_use]
    pub fn args_for(&self, host: &Host, command: &RemoteCommand) -> Vec<String> {
        let mut args = self.options.clone();
        let dest = destination(host);
        args.push(match &self.user {
            Some(user) => format!("{user}@{dest}"),
            None => dest.to_string(),
        });

        let mut remote = vec!["env".to_string(), "-i".to_string()];
        remote.extend(
            command
                .env
                .iter()
                .map(|(k, v)| shell_quote(&format!("{k}={v}"))),
        );
        remote.push(REMOTE_SHELL.to_string());
        remote.push("-s".to_string());
        args.push(remote.join(" "));
        args
    }

    async fn run(&self, host: &Host, command: &RemoteCommand) -> Result<RemoteOutput, TransportError> {
        let args = self.args_for(host, command);
        debug!(host = %host.id, program = %self.program, "running remote search");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("failed to spawn {}: {e}", self.program))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(command.script.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        let exit_status = output.status.code().unwrap_or(-1);
        if exit_status == SSH_FAILURE_STATUS {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("ssh to {} failed: {}", destination(host), stderr.trim()).into());
        }

        Ok(RemoteOutput {
            exit_status,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

impl RemoteExecutor for SshExecutor {
    fn exec<'a>(
        &'a self,
        host: &'a Host,
        command: &'a RemoteCommand,
    ) -> Pin<Box<dyn Future<Output = Result<RemoteOutput, TransportError>> + Send + 'a>> {
        Box::pin(self.run(host, command))
    }
}

/// Address to connect to: address, then hostname, then id.
fn destination(host: &Host) -> &str {
    [host.address.as_str(), host.hostname.as_str()]
        .into_iter()
        .find(|s| !s.is_empty())
        .unwrap_or(host.id.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn command() -> RemoteCommand {
        RemoteCommand {
            script: "exit 0\n".to_string(),
            timeout: Duration::from_secs(5),
            env: BTreeMap::new(),
        }
    }

    #[test]
    fn args_use_address_and_defaults() {
        let ssh = SshExecutor::new(&SshSettings::default());
        let host = Host::new("cn-1", "10.0.0.2");
        let args = ssh.args_for(&host, &command());
        assert_eq!(args, vec!["-o", "BatchMode=yes", "10.0.0.2", "env -i /bin/bash -s"]);
    }

    #[test]
    fn args_include_user_and_env() {
        let settings = SshSettings {
            user: Some("root".to_string()),
            options: Vec::new(),
            ..SshSettings::default()
        };
        let ssh = SshExecutor::new(&settings);
        let mut cmd = command();
        cmd.env.insert("LC_ALL".to_string(), "C".to_string());
        let args = ssh.args_for(&Host::new("cn-1", "10.0.0.2"), &cmd);
        assert_eq!(args, vec!["root@10.0.0.2", "env -i 'LC_ALL=C' /bin/bash -s"]);
    }

    #[test]
    fn destination_falls_back_to_hostname_then_id() {
        let mut host = Host::new("cn-1", "");
        host.hostname = "compute1".to_string();
        assert_eq!(destination(&host), "compute1");
        host.hostname.clear();
        assert_eq!(destination(&host), "cn-1");
    }

    #[tokio::test]
    async fn missing_program_is_transport_error() {
        let settings = SshSettings {
            program: "/nonexistent/fleet-ssh".to_string(),
            ..SshSettings::default()
        };
        let ssh = SshExecutor::new(&settings);
        let err = ssh
            .exec(&Host::new("cn-1", "10.0.0.2"), &command())
            .await
            .expect_err("spawn fails");
        assert!(err.to_string().contains("failed to spawn"));
    }

    #[tokio::test]
    async fn exit_255_is_transport_error() {
        // `sh -c <script> <args...>` stands in for ssh; the script ignores its args.
        let settings = SshSettings {
            program: "sh".to_string(),
            user: None,
            options: vec!["-c".to_string(), "cat >/dev/null; echo nope >&2; exit 255".to_string()],
        };
        let ssh = SshExecutor::new(&settings);
        let err = ssh
            .exec(&Host::new("cn-1", "10.0.0.2"), &command())
            .await
            .expect_err("ssh failure");
        assert!(err.to_string().contains("nope"));
    }

    #[tokio::test]
    async fn script_output_is_returned() {
        let settings = SshSettings {
            program: "sh".to_string(),
            user: None,
            options: vec!["-c".to_string(), "cat; echo oops >&2; exit 2".to_string()],
        };
        let ssh = SshExecutor::new(&settings);
        let output = ssh
            .exec(&Host::new("cn-1", "10.0.0.2"), &command())
            .await
            .expect("ran");
        assert_eq!(output.exit_status, 2);
        assert_eq!(output.stdout, b"exit 0\n");
        assert_eq!(String::from_utf8_lossy(&output.stderr).trim(), "oops");
    }
}
