//! Starting a run on the whole fleet.
//!
//! A dispatch goes through three phases, strictly in this order:
//!
//! 1. **reset**: every machine gets the reset command (by default, kill every process of the
//!    experiment user), one machine at a time. A machine that cannot be reset is reported and
//!    skipped.
//! 2. **cleanup**: the artifacts of the previous run are removed from the results directory,
//!    once. Nothing is launched if this fails, since a worker started before the cleanup
//!    could have its fresh dump deleted.
//! 3. **launch**: the worker loop is started on every machine without waiting for it, its own
//!    output going to `<results-dir>/<machine>.batch`.
//!
//! Re-running a dispatch is safe: whatever the previous run left behind is killed and
//! removed before the new workers start.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Context;
use tracing::{error, info, instrument, warn};

use crate::{
    configuration::Configuration,
    dump::DUMP_EXTENSION,
    fleet_config::{FleetConfig, CONFIG_ENV_VAR},
    match_runner::RECORD_EXTENSION,
    remote::RemoteExecutor,
};

/// Extension of the files receiving a worker's own stdout and stderr.
pub const BATCH_EXTENSION: &str = "batch";

/// Copy of the configuration written next to the results.
pub const CONFIG_SNAPSHOT: &str = "experiment.toml";

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const RESET: &str = "\x1b[0m";

/// What a dispatch did, machine by machine.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Machines whose reset command ran.
    pub reset: Vec<String>,
    /// Machines that could not be reset.
    pub reset_failed: Vec<String>,
    /// Files of the previous run removed from the results directory.
    pub removed: usize,
    /// Machines on which the worker launch was issued.
    pub launched: Vec<String>,
    /// Machines on which the worker could not be launched.
    pub launch_failed: Vec<String>,
}

/// Resets the fleet and launches one worker per machine.
pub struct Dispatcher<'a, E: RemoteExecutor> {
    config: &'a FleetConfig,
    executor: E,
    settings: Configuration,
}

impl<'a, E: RemoteExecutor> Dispatcher<'a, E> {
    /// Dispatch the fleet of `config`, reaching machines through `executor`.
    pub fn new(config: &'a FleetConfig, executor: E, settings: Configuration) -> Self {
        Self {
            config,
            executor,
            settings,
        }
    }

    /// Reset, clean up, then launch.
    ///
    /// # Errors
    /// Only when the results directory cannot be cleaned up; no worker is launched then.
    /// Unreachable machines are reported in the summary instead.
    #[instrument(skip_all)]
    pub fn dispatch(&self) -> anyhow::Result<DispatchSummary> {
        let (reset, reset_failed) = self.reset_fleet();

        let removed = clear_results(&self.config.results_dir)?;
        info!(removed, "previous results cleared");
        self.write_config_snapshot();

        match self.config.total_games() {
            Ok(total) => {
                info!(total, "launching games");
                if self.settings.verbose {
                    println!(
                        "Preparing to launch {total} games on {} machines. Results will be stored in {}",
                        self.config.machines.len(),
                        self.config.results_dir.display()
                    );
                }
            }
            Err(e) => warn!("could not count games: {e:#}"),
        }

        let (launched, launch_failed) = self.launch_fleet();
        Ok(DispatchSummary {
            reset,
            reset_failed,
            removed,
            launched,
            launch_failed,
        })
    }

    /// Run the reset command on every machine, the first listed machine last.
    ///
    /// Returns the machines that were reset and those that were not.
    pub fn reset_fleet(&self) -> (Vec<String>, Vec<String>) {
        let command = self.config.reset_command_line();
        let order = reset_order(&self.config.machines);
        self.for_each_machine("Resetting", &order, |machine| {
            self.executor
                .execute(machine, &self.config.user, &command, true)
                .map(|_| ())
        })
    }

    fn launch_fleet(&self) -> (Vec<String>, Vec<String>) {
        let machines = self.config.machines.iter().map(String::as_str).collect::<Vec<_>>();
        self.for_each_machine("Launching", &machines, |machine| {
            let command = worker_launch_command(self.config, machine);
            self.executor
                .execute(machine, &self.config.user, &command, false)
                .map(|_| ())
        })
    }

    fn for_each_machine(
        &self,
        action: &str,
        machines: &[&str],
        mut run: impl FnMut(&str) -> anyhow::Result<()>,
    ) -> (Vec<String>, Vec<String>) {
        let verbose = self.settings.verbose;
        let longest_name = machines.iter().map(|m| m.len()).max().unwrap_or(0) + 3;
        let mut ok = vec![];
        let mut failed = vec![];
        for &machine in machines {
            if verbose {
                print!("{action} {machine:·<longest_name$} ");
                let _ = std::io::stdout().flush();
            }
            match run(machine) {
                Ok(()) => {
                    if verbose {
                        println!("{GREEN}Ok{RESET}");
                    }
                    ok.push(machine.to_string());
                }
                Err(e) => {
                    error!(machine, "{action} failed: {e:#}");
                    if verbose {
                        println!("{RED}{e:#}{RESET}");
                    }
                    failed.push(machine.to_string());
                }
            }
        }
        (ok, failed)
    }

    fn write_config_snapshot(&self) {
        let path = self.config.results_dir.join(CONFIG_SNAPSHOT);
        let written = toml::to_string(self.config)
            .context("could not serialize configuration")
            .and_then(|text| fs::write(&path, text).context("could not write"));
        if let Err(e) = written {
            warn!("configuration snapshot '{}' not written: {e:#}", path.display());
        }
    }
}

/// Machines in reset order: the first listed machine, presumably the one the experiment is
/// controlled from, comes last.
pub fn reset_order(machines: &[String]) -> Vec<&str> {
    let mut order = machines.iter().map(String::as_str).collect::<Vec<_>>();
    if !order.is_empty() {
        order.rotate_left(1);
    }
    order
}

/// Create `results_dir` if needed and remove the dumps, batch outputs and game records of the
/// previous run. Returns how many files were removed.
#[instrument]
pub fn clear_results(results_dir: &Path) -> anyhow::Result<usize> {
    fs::create_dir_all(results_dir)
        .with_context(|| format!("could not create '{}'", results_dir.display()))?;
    let entries = fs::read_dir(results_dir)
        .with_context(|| format!("could not read '{}'", results_dir.display()))?;
    let mut removed = 0;
    for entry in entries {
        let path = entry.context("could not read directory entry")?.path();
        if !path.is_file() || !is_run_artifact(&path) {
            continue;
        }
        fs::remove_file(&path).with_context(|| format!("could not remove '{}'", path.display()))?;
        removed += 1;
    }
    Ok(removed)
}

fn is_run_artifact(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| [DUMP_EXTENSION, BATCH_EXTENSION, RECORD_EXTENSION].contains(&e))
}

/// Path receiving the worker's own output on `machine`.
pub fn batch_path(results_dir: &Path, machine: &str) -> PathBuf {
    results_dir.join(format!("{machine}.{BATCH_EXTENSION}"))
}

/// Shell command starting the worker on `machine`.
///
/// The worker is pointed at the same configuration file as the dispatcher, which therefore
/// has to live on a filesystem every machine sees.
pub fn worker_launch_command(config: &FleetConfig, machine: &str) -> String {
    let env = match &config.source {
        Some(source) => {
            let source = fs::canonicalize(source).unwrap_or_else(|_| source.clone());
            format!("env {CONFIG_ENV_VAR}={} ", source.display())
        }
        None => String::new(),
    };
    format!(
        "{env}{} > {} 2>&1",
        config.worker_command,
        batch_path(&config.results_dir, machine).display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet_config::tests::SAMPLE;

    #[test]
    fn controlling_machine_is_reset_last() {
        let machines = ["fido", "n001", "n002"].map(String::from);
        assert_eq!(reset_order(&machines), vec!["n001", "n002", "fido"]);
        assert!(reset_order(&[]).is_empty());
    }

    #[test]
    fn cleanup_removes_only_run_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["m1.dump", "m1.batch", "m1condition1black-1.sgf", "notes.txt", "experiment.toml"] {
            fs::write(dir.path().join(name), "old").unwrap();
        }
        fs::create_dir(dir.path().join("archive.dump")).unwrap();

        assert_eq!(clear_results(dir.path()).unwrap(), 3);
        let mut left = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect::<Vec<_>>();
        left.sort();
        assert_eq!(left, vec!["archive.dump", "experiment.toml", "notes.txt"]);
    }

    #[test]
    fn cleanup_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let results = dir.path().join("a/b");
        assert_eq!(clear_results(&results).unwrap(), 0);
        assert!(results.is_dir());
    }

    #[test]
    fn launch_command_redirects_to_batch_file() {
        let config = FleetConfig::parse(SAMPLE).unwrap();
        assert_eq!(
            worker_launch_command(&config, "m2"),
            "/opt/fleet/fleet-worker > /tmp/results/m2.batch 2>&1"
        );

        let mut config = config;
        config.source = Some(PathBuf::from("/nonexistent/fleet.toml"));
        assert_eq!(
            worker_launch_command(&config, "m2"),
            "env FLEET_CONFIG=/nonexistent/fleet.toml /opt/fleet/fleet-worker > /tmp/results/m2.batch 2>&1"
        );
    }
}
