//! The loop each machine of the fleet runs.
//!
//! For every condition, in configured order, the worker plays one session with the program
//! under test as black, then one as white, and appends to its dump:
//!
//! ```text
//! CONDITION: <condition>
//! Tested program black
//! Black <b>, White <w>
//! Tested program white
//! Black <b>, White <w>
//! ```
//!
//! followed by a single `DONE` once every condition went through. Every line is flushed as soon
//! as it is written so the collator can read a dump while the worker is still running.
//!
//! A failed session stops the loop: what was written stays, `DONE` is never written, and the
//! collator reports the machine as not finished.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::Context;
use tracing::{error, info, instrument};

use crate::{
    dump::{dump_path, Color, DumpRecord},
    fleet_config::FleetConfig,
    match_runner::{Session, SessionRunner},
};

/// Drives the sessions of one machine and writes its dump.
pub struct WorkerLoop<'a, R: SessionRunner> {
    machine: String,
    conditions: &'a [String],
    games_per_color: u32,
    runner: R,
}

impl<'a, R: SessionRunner> WorkerLoop<'a, R> {
    /// Create the loop of `machine` for the conditions of `config`.
    pub fn new(machine: impl Into<String>, config: &'a FleetConfig, runner: R) -> anyhow::Result<Self> {
        Ok(Self::with_conditions(
            machine,
            &config.conditions,
            config.games_per_color()?,
            runner,
        ))
    }

    /// Create the loop of `machine` for explicit conditions and session length.
    pub fn with_conditions(
        machine: impl Into<String>,
        conditions: &'a [String],
        games_per_color: u32,
        runner: R,
    ) -> Self {
        Self {
            machine: machine.into(),
            conditions,
            games_per_color,
            runner,
        }
    }

    /// Truncate `<results_dir>/<machine>.dump` and run every condition into it.
    pub fn run_to_results_dir(&mut self, results_dir: &Path) -> anyhow::Result<()> {
        let path = dump_path(results_dir, &self.machine);
        let file = File::create(&path)
            .with_context(|| format!("could not create dump '{}'", path.display()))?;
        info!(dump = %path.display(), "dump opened");
        self.run(&mut BufWriter::new(file))
    }

    /// Run every condition, writing the dump to `out`.
    #[instrument(skip_all, fields(machine = %self.machine))]
    pub fn run<W: Write>(&mut self, out: &mut W) -> anyhow::Result<()> {
        let games = self.games_per_color;
        let conditions = self.conditions.len() as u64;
        write_line(
            out,
            &format!(
                "{games} games * 2 colors * {conditions} conditions = {} total games per machine",
                u64::from(games) * 2 * conditions
            ),
        )?;

        for (index, condition) in self.conditions.iter().enumerate() {
            info!(%condition, "starting condition {}/{}", index + 1, conditions);
            write_record(out, &DumpRecord::Condition(condition.clone()))?;
            for color in [Color::Black, Color::White] {
                write_record(out, &DumpRecord::Role(color))?;
                let session = Session {
                    condition,
                    color,
                    games,
                    record_base: format!("{}condition{}{color}", self.machine, index + 1),
                };
                let score = self.runner.run_session(&session).map_err(|e| {
                    error!("session failed, stopping: {e:#}");
                    e.context(format!("condition '{condition}' as {color} failed"))
                })?;
                write_record(out, &DumpRecord::Score(score))?;
            }
        }

        write_record(out, &DumpRecord::Done)?;
        info!("all conditions done");
        Ok(())
    }
}

fn write_record<W: Write>(out: &mut W, record: &DumpRecord) -> anyhow::Result<()> {
    write_line(out, &record.to_string())
}

fn write_line<W: Write>(out: &mut W, line: &str) -> anyhow::Result<()> {
    writeln!(out, "{line}").context("could not write to dump")?;
    out.flush().context("could not flush dump")
}
