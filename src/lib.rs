//! # Fleet Experiment
//!
//! Runs many independent match trials of a game-playing program against an opponent on a
//! fleet of machines, then collates the outcomes into win rates per experimental condition.
//!
//! It provides:
//! - Resetting the fleet and launching one worker per machine (`Dispatcher`)
//! - The per-machine loop playing every condition with both colors (`WorkerLoop`)
//! - Session execution through an external referee (`MatchRunner`)
//! - Parsing and aggregating the per-machine dumps, even incomplete ones (`collate`)
//!
//! Each component has its own binary: `fleet-dispatch`, `fleet-worker`, `fleet-collate`, and
//! `fleet-reset` for the reset phase alone. None of them takes flags; they all read the same
//! [`FleetConfig`](crate::fleet_config::FleetConfig) file, named by the `FLEET_CONFIG`
//! environment variable. `fleet-collate` treats its arguments as machines to leave out.
//!
//! # Documentation Overview
//!
//! - For the dump line format shared by workers and the collator, see the [`dump`] module.
//! - For what a dispatch does and in which order, see the [`dispatcher`] module.
//! - For the referee command line protocol, see the [`match_runner`] module.
//! - For how dumps are folded into win rates, see the [`collator`] module.
//!
//! # Usage Example
//!
//! Collating the results of a run, leaving one machine out:
//!
//! ```no_run
//! use fleet_experiment::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = FleetConfig::load("fleet.toml".as_ref())?;
//!     let collation = collate(&config, &["n003".to_string()]);
//!     print!("{collation}");
//!     for (condition, tally) in collation.conditions() {
//!         println!("{condition} won {} of {} games", tally.wins, tally.runs);
//!     }
//!     Ok(())
//! }
//! ```
#![warn(missing_docs)]

pub use anyhow;
pub mod collator;
pub mod configuration;
pub mod dispatcher;
pub mod dump;
pub mod fleet_config;
#[allow(missing_docs)]
pub mod logger;
pub mod match_runner;
#[allow(missing_docs)]
pub mod process;
pub mod remote;
pub mod worker;

/// Name this machine goes by in the fleet.
pub fn hostname() -> anyhow::Result<String> {
    let name = sysinfo::System::host_name()
        .ok_or_else(|| anyhow::anyhow!("could not determine the host name"))?;
    // the fleet is usually listed by short name
    Ok(name.split('.').next().unwrap_or(&name).to_string())
}

/// Commonly used types and functions for quick access.
///
/// Import this prelude to get started easily:
/// ```rust
/// use fleet_experiment::prelude::*;
/// ```
pub mod prelude {
    pub use crate::collator::{collate, Collation, MachineReport, MachineStatus, Tally};
    pub use crate::configuration::Configuration;
    pub use crate::dispatcher::{DispatchSummary, Dispatcher};
    pub use crate::dump::{Color, DumpRecord, SessionScore};
    pub use crate::fleet_config::FleetConfig;
    pub use crate::match_runner::{MatchRunner, Session, SessionRunner};
    pub use crate::remote::{RemoteExecutor, SshExecutor};
    pub use crate::worker::WorkerLoop;
}
