use std::{
    io::Read,
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    sync::mpsc::{self, Receiver, RecvTimeoutError},
    thread,
    time::{Duration, Instant},
};

use anyhow::{bail, Context};
use tracing::warn;

#[derive(Debug)]
pub struct TimeoutError {
    pub after: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Timeout Error (after {:?})", self.after)
    }
}

impl std::error::Error for TimeoutError {}

/// Split a configured command line on whitespace.
///
/// Quotes are refused instead of being half-interpreted.
pub fn split_command_line(line: &str) -> anyhow::Result<Vec<String>> {
    if line.contains('"') || line.contains('\'') || line.contains('`') {
        bail!("command line should not contain any quote: {line:?}")
    }
    let words = line.split_whitespace().map(String::from).collect::<Vec<_>>();
    if words.is_empty() {
        bail!("empty command line");
    }
    Ok(words)
}

/// Locate the executable a command line starts with, the way a shell would.
pub fn resolve_executable(command_line: &str) -> anyhow::Result<PathBuf> {
    let words = split_command_line(command_line)?;
    let program = Path::new(&words[0]);
    if program.components().count() > 1 {
        if program.is_file() {
            return Ok(program.to_path_buf());
        }
        bail!("executable '{}' not found", program.display());
    }
    let path = std::env::var_os("PATH").unwrap_or_default();
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
        .with_context(|| format!("executable '{}' not found in PATH", program.display()))
}

/// A child process that is killed when dropped before being waited for.
#[derive(Debug)]
pub struct ManagedProcess {
    child: Child,
    stdout: Option<Receiver<Vec<u8>>>,
    cleaned_up: bool,
}

/// What a finished process left behind.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
}

impl ManagedProcess {
    /// Spawn `command` with its stdout captured (read on a separate thread so a chatty child
    /// never blocks on a full pipe).
    pub fn launch(command: &mut Command, allow_stderr: bool) -> anyhow::Result<ManagedProcess> {
        command.stdin(Stdio::null()).stdout(Stdio::piped());
        if !allow_stderr {
            command.stderr(Stdio::null());
        }
        let program = command.get_program().to_string_lossy().into_owned();
        let mut child = command
            .spawn()
            .with_context(|| format!("command '{program}' could not be started"))?;
        let stdout = child.stdout.take().map(|mut pipe| {
            let (sender, receiver) = mpsc::channel();
            thread::spawn(move || {
                let mut buf = Vec::new();
                if let Err(e) = pipe.read_to_end(&mut buf) {
                    warn!("could not read child output: {e}");
                }
                let _ = sender.send(buf);
            });
            receiver
        });
        Ok(ManagedProcess {
            child,
            stdout,
            cleaned_up: false,
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Wait for the process to exit, killing it once `timeout` has elapsed.
    ///
    /// The deadline also covers reading the output to its end: a descendant still holding the
    /// pipe after the process exited makes the wait fail with [`TimeoutError`] too.
    pub fn wait_with_timeout(mut self, timeout: Option<Duration>) -> anyhow::Result<ProcessOutput> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let status = loop {
            if let Some(status) = self.child.try_wait().context("could not wait for process")? {
                break status;
            }
            if let (Some(deadline), Some(after)) = (deadline, timeout) {
                if Instant::now() > deadline {
                    self.try_kill()?;
                    return Err(TimeoutError { after }.into());
                }
            }
            thread::sleep(Duration::from_millis(10));
        };
        self.cleaned_up = true;
        let stdout = match self.stdout.take() {
            Some(receiver) => match (deadline, timeout) {
                (Some(deadline), Some(after)) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    match receiver.recv_timeout(remaining) {
                        Ok(buf) => buf,
                        Err(RecvTimeoutError::Timeout) => {
                            warn!("process exited but its output is still held open");
                            return Err(TimeoutError { after }.into());
                        }
                        Err(RecvTimeoutError::Disconnected) => Vec::new(),
                    }
                }
                _ => receiver.recv().unwrap_or_default(),
            },
            None => Vec::new(),
        };
        Ok(ProcessOutput { status, stdout })
    }

    fn try_kill(&mut self) -> anyhow::Result<()> {
        self.child.kill().context("could not kill process")?;
        self.child.wait().context("could not reap killed process")?;
        self.cleaned_up = true;
        Ok(())
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        if !self.cleaned_up {
            if let Err(e) = self.try_kill() {
                warn!("could not kill process {}: {e:#}", self.child.id());
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn split_refuses_quotes() {
        assert_eq!(
            split_command_line("gnugo --mode gtp").unwrap(),
            vec!["gnugo", "--mode", "gtp"]
        );
        assert!(split_command_line("sh -c 'echo hi'").is_err());
        assert!(split_command_line("   ").is_err());
    }

    #[test]
    fn resolves_from_path_and_absolute() {
        assert!(resolve_executable("sh -c true").is_ok());
        assert!(resolve_executable("/bin/sh").is_ok());
        assert!(resolve_executable("/nonexistent/engine --gtp").is_err());
        assert!(resolve_executable("surely-not-an-installed-engine-42").is_err());
    }

    #[test]
    fn captures_output() {
        let mut command = Command::new("sh");
        command.args(["-c", "echo hello; echo world"]);
        let output = ManagedProcess::launch(&mut command, false)
            .unwrap()
            .wait_with_timeout(Some(Duration::from_secs(10)))
            .unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout), "hello\nworld\n");
    }

    #[test]
    fn kills_on_timeout() {
        let mut command = Command::new("sleep");
        command.arg("30");
        let started = Instant::now();
        let err = ManagedProcess::launch(&mut command, false)
            .unwrap()
            .wait_with_timeout(Some(Duration::from_millis(100)))
            .unwrap_err();
        assert!(err.downcast_ref::<TimeoutError>().is_some());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn output_held_by_a_descendant_times_out() {
        let mut command = Command::new("sh");
        command.args(["-c", "sleep 8 & echo '(;RE[B+R])'"]);
        let started = Instant::now();
        let err = ManagedProcess::launch(&mut command, false)
            .unwrap()
            .wait_with_timeout(Some(Duration::from_secs(1)))
            .unwrap_err();
        assert!(err.downcast_ref::<TimeoutError>().is_some());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn missing_program_fails_to_launch() {
        let mut command = Command::new("/nonexistent/referee");
        assert!(ManagedProcess::launch(&mut command, false).is_err());
    }
}
