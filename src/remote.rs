//! Running commands on the machines of the fleet.
//!
//! The dispatcher only needs one capability, [`RemoteExecutor::execute`]. Blocking calls are
//! used for resets and return the command's output; non-blocking calls are used to launch
//! workers and return as soon as the launch has been issued. Nothing reports when a launched
//! worker ends: progress is only observable by reading the dumps.

use std::{process::Command, time::Duration};

use anyhow::{bail, Context};
use tracing::{debug, instrument};

use crate::{fleet_config::RemoteConfig, process::ManagedProcess};

/// Exit code of `ssh` when the connection itself failed.
const SSH_FAILURE: i32 = 255;

/// Executes shell commands on a named machine as a given user.
pub trait RemoteExecutor {
    /// Run `command` on `machine` as `user`.
    ///
    /// When `blocking`, waits for the command and returns its output (stdout and stderr).
    /// Otherwise returns `None` once the command has been started.
    ///
    /// # Errors
    /// The machine could not be reached, or a blocking command did not finish in time.
    fn execute(
        &self,
        machine: &str,
        user: &str,
        command: &str,
        blocking: bool,
    ) -> anyhow::Result<Option<String>>;
}

/// [`RemoteExecutor`] going through `ssh`.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    remote: RemoteConfig,
    timeout: Option<Duration>,
}

impl SshExecutor {
    /// Reach machines as described by `remote`, without timeout.
    pub fn new(remote: RemoteConfig) -> Self {
        Self {
            remote,
            timeout: None,
        }
    }

    /// Give up on blocking commands after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn ssh_command(&self, machine: &str, user: &str, remote_command: &str) -> Command {
        let mut command = Command::new(&self.remote.ssh);
        command
            .args(&self.remote.options)
            .arg("-l")
            .arg(user)
            .arg(machine)
            .arg(remote_command);
        command
    }
}

/// Wrap `command` so it survives the end of the remote session.
pub fn detached(command: &str) -> String {
    format!("nohup {command} < /dev/null &")
}

impl RemoteExecutor for SshExecutor {
    #[instrument(skip(self))]
    fn execute(
        &self,
        machine: &str,
        user: &str,
        command: &str,
        blocking: bool,
    ) -> anyhow::Result<Option<String>> {
        if !blocking {
            let mut ssh = self.ssh_command(machine, user, &detached(command));
            ssh.stdin(std::process::Stdio::null())
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null());
            let child = ssh
                .spawn()
                .with_context(|| format!("could not start '{}'", self.remote.ssh))?;
            // never waited for: the launch is fire-and-forget
            debug!(pid = child.id(), "launch issued");
            return Ok(None);
        }

        let mut ssh = self.ssh_command(machine, user, &format!("{command} 2>&1"));
        let output = ManagedProcess::launch(&mut ssh, false)?
            .wait_with_timeout(self.timeout)
            .with_context(|| format!("'{command}' on {machine}"))?;
        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(status = %output.status, output = %text.trim());
        // ssh reserves 255 for its own failures; other codes belong to the remote command
        if output.status.code() == Some(SSH_FAILURE) {
            bail!("could not reach {machine}: {}", text.trim());
        }
        Ok(Some(text))
    }
}
