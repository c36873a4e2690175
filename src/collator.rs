//! Turning the dumps of a run into win rates.
//!
//! Each dump is read line by line into [`DumpRecord`]s, then folded by a small state machine:
//!
//! - a condition marker sets the current condition and resets the role to black;
//! - a role marker sets the color of the program under test;
//! - a score line credits the program with the score of its color, counts both scores as
//!   runs for the machine and the current condition, then flips the role;
//! - `DONE`, anywhere, marks the machine as finished.
//!
//! Score lines without a condition, and lines that are not records, are skipped. Only complete
//! (newline-terminated) lines are read, so a dump can be collated while its worker is still
//! writing it. A dump that cannot be read is reported and counts for nothing.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use tracing::{debug, info, instrument, warn};

use crate::{
    dump::{dump_path, Color, DumpRecord},
    fleet_config::FleetConfig,
};

/// Wins of the program under test out of the games that had a winner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    /// Games won by the program under test.
    pub wins: u64,
    /// Games with a winner.
    pub runs: u64,
}

impl Tally {
    /// Accumulate `other` into this tally.
    pub fn add(&mut self, other: Tally) {
        self.wins += other.wins;
        self.runs += other.runs;
    }

    /// Games lost by the program under test.
    pub fn losses(&self) -> u64 {
        self.runs - self.wins
    }

    /// Win rate, 0 when nothing ran.
    pub fn rate(&self) -> f64 {
        self.wins as f64 / self.runs.max(1) as f64
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3} = {}/{}", self.rate(), self.wins, self.runs)
    }
}

/// How far a machine got.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineStatus {
    /// The dump ends with `DONE` (or contains it).
    Finished,
    /// The dump has no `DONE`: the worker is still running or stopped early.
    NotFinished,
    /// The dump is missing or unreadable.
    Unreadable(PathBuf),
}

/// Results of one machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineReport {
    /// Machine name, as listed in the fleet.
    pub machine: String,
    /// How far the machine got.
    pub status: MachineStatus,
    /// Everything the machine played.
    pub tally: Tally,
}

impl fmt::Display for MachineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            MachineStatus::Finished => write!(f, "{} finished, wins: {}", self.machine, self.tally),
            MachineStatus::NotFinished => {
                write!(f, "{} NOT finished, wins: {}", self.machine, self.tally)
            }
            MachineStatus::Unreadable(path) => {
                write!(f, "{} could not be opened ({})", self.machine, path.display())
            }
        }
    }
}

/// Results accumulated over the dumps of a fleet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collation {
    machines: Vec<MachineReport>,
    // in order of first appearance
    conditions: Vec<(String, Tally)>,
}

impl Collation {
    /// An empty collation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold the text of `machine`'s dump into the results.
    pub fn add_dump(&mut self, machine: &str, text: &str) -> &MachineReport {
        let mut tally = Tally::default();
        let mut finished = false;
        let mut condition: Option<String> = None;
        let mut role = Color::Black;

        let complete_lines = text.split_inclusive('\n').filter(|line| line.ends_with('\n'));
        for (number, line) in complete_lines.enumerate() {
            let Some(record) = DumpRecord::parse(line) else {
                continue;
            };
            match record {
                DumpRecord::Condition(text) => {
                    condition = Some(text);
                    role = Color::Black;
                }
                DumpRecord::Role(color) => role = color,
                DumpRecord::Score(score) => {
                    let Some(condition) = &condition else {
                        warn!(machine, line = number + 1, "score before any condition, skipped");
                        continue;
                    };
                    let session = Tally {
                        wins: u64::from(score.wins_for(role)),
                        runs: score.decided(),
                    };
                    tally.add(session);
                    self.condition_tally(condition).add(session);
                    role = role.opposite();
                }
                DumpRecord::Done => finished = true,
            }
        }

        let status = if finished {
            MachineStatus::Finished
        } else {
            MachineStatus::NotFinished
        };
        debug!(machine, ?status, wins = tally.wins, runs = tally.runs);
        self.push(MachineReport {
            machine: machine.to_string(),
            status,
            tally,
        })
    }

    /// Record that `machine`'s dump at `path` could not be read.
    pub fn add_unreadable(&mut self, machine: &str, path: PathBuf) -> &MachineReport {
        self.push(MachineReport {
            machine: machine.to_string(),
            status: MachineStatus::Unreadable(path),
            tally: Tally::default(),
        })
    }

    fn push(&mut self, report: MachineReport) -> &MachineReport {
        self.machines.push(report);
        &self.machines[self.machines.len() - 1]
    }

    fn condition_tally(&mut self, condition: &str) -> &mut Tally {
        let index = match self.conditions.iter().position(|(c, _)| c == condition) {
            Some(index) => index,
            None => {
                self.conditions.push((condition.to_string(), Tally::default()));
                self.conditions.len() - 1
            }
        };
        &mut self.conditions[index].1
    }

    /// Reports of every machine, in the order they were added.
    pub fn machines(&self) -> &[MachineReport] {
        &self.machines
    }

    /// Report of `machine`, if it was collated.
    pub fn machine(&self, machine: &str) -> Option<&MachineReport> {
        self.machines.iter().find(|m| m.machine == machine)
    }

    /// Conditions with their tallies, in order of first appearance.
    pub fn conditions(&self) -> impl Iterator<Item = (&str, Tally)> {
        self.conditions.iter().map(|(c, t)| (c.as_str(), *t))
    }

    /// Tally of `condition`, zero if it never appeared.
    pub fn condition(&self, condition: &str) -> Tally {
        self.conditions
            .iter()
            .find(|(c, _)| c == condition)
            .map(|(_, t)| *t)
            .unwrap_or_default()
    }

    /// Everything every included machine played.
    pub fn overall(&self) -> Tally {
        let mut overall = Tally::default();
        for report in &self.machines {
            overall.add(report.tally);
        }
        overall
    }
}

impl fmt::Display for Collation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for report in &self.machines {
            writeln!(f, "{report}")?;
        }
        for (condition, tally) in self.conditions() {
            writeln!(f, "{condition}: {tally}")?;
        }
        writeln!(f, "overall: {}", self.overall())
    }
}

/// Collate the dumps of every machine of the fleet except `excluded`, in fleet order.
///
/// Never fails: unreadable dumps are reported in the result.
#[instrument(skip(config))]
pub fn collate(config: &FleetConfig, excluded: &[String]) -> Collation {
    for name in excluded.iter().filter(|e| !config.machines.contains(*e)) {
        warn!("excluded machine '{name}' is not part of the fleet");
    }
    let mut collation = Collation::new();
    for machine in &config.machines {
        if excluded.contains(machine) {
            info!(%machine, "excluded");
            continue;
        }
        collate_machine(&mut collation, &config.results_dir, machine);
    }
    collation
}

fn collate_machine(collation: &mut Collation, results_dir: &Path, machine: &str) {
    let path = dump_path(results_dir, machine);
    match fs::read(&path) {
        Ok(bytes) => {
            collation.add_dump(machine, &String::from_utf8_lossy(&bytes));
        }
        Err(e) => {
            warn!(machine, "could not open '{}': {e}", path.display());
            collation.add_unreadable(machine, path);
        }
    }
}
