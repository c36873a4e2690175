//! Static description of an experiment: the fleet, the conditions and the engines.
//!
//! The configuration is a TOML file, read once at startup by every entry point. Its path is
//! taken from the `FLEET_CONFIG` environment variable, `fleet.toml` otherwise.
//!
//! ```toml
//! user = "drake"
//! results_dir = "/home/drake/results"
//! machines = ["fido", "n001", "n002"]
//! games_per_condition = 600
//! worker_command = "/home/drake/bin/fleet-worker"
//! conditions = [
//!     "threads=2 timeformula=uniform c=0.50",
//!     "threads=2 timeformula=basic c=60",
//! ]
//!
//! [engine]
//! referee = "/home/drake/bin/gtp-referee"
//! program = "java -Xmx1024M -cp /home/drake/orego/bin orego.ui.Orego"
//! opponent = "/usr/local/bin/gnugo --mode gtp --quiet --chinese-rules"
//! always = "book=FusekiBook"
//! board_size = 19
//! komi = 7.5
//! niceness = 19
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "FLEET_CONFIG";

/// Configuration file used when [`CONFIG_ENV_VAR`] is not set.
pub const DEFAULT_CONFIG_FILE: &str = "fleet.toml";

/// Everything a dispatch, a worker and a collation need to agree on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FleetConfig {
    /// Remote user owning the experiment processes.
    pub user: String,
    /// Directory holding the dumps, shared by every machine.
    pub results_dir: PathBuf,
    /// Machine identifiers. A worker identifies itself by its hostname, so these must match.
    pub machines: Vec<String>,
    /// Engine arguments of each condition, in run order.
    pub conditions: Vec<String>,
    /// Total games wanted per condition, spread over the fleet and both colors.
    #[serde(default)]
    pub games_per_condition: Option<u32>,
    /// Games per session. Derived from `games_per_condition` when absent.
    #[serde(default)]
    pub games_per_color: Option<u32>,
    /// Command starting the worker loop on a machine.
    pub worker_command: String,
    /// Command terminating stale processes. `{user}` is replaced by the configured user.
    #[serde(default = "default_reset_command")]
    pub reset_command: String,
    /// Seconds to wait for the reset of one machine.
    #[serde(default = "default_reset_timeout_secs")]
    pub reset_timeout_secs: u64,
    /// How sessions are played.
    pub engine: EngineConfig,
    /// How machines are reached.
    #[serde(default)]
    pub remote: RemoteConfig,
    /// File this configuration was read from.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// Engines and game rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Referee program playing one game between two GTP engines.
    pub referee: String,
    /// Extra arguments given to the referee before the per-game ones.
    #[serde(default)]
    pub referee_args: Vec<String>,
    /// Command line of the program under test, without condition arguments.
    pub program: String,
    /// Command line of the opponent.
    pub opponent: String,
    /// Arguments given to the program under test in every condition.
    #[serde(default)]
    pub always: String,
    /// Board width.
    #[serde(default = "default_board_size")]
    pub board_size: u32,
    /// Compensation given to white.
    #[serde(default = "default_komi")]
    pub komi: f64,
    /// Run the referee through `nice -n <niceness>`.
    #[serde(default)]
    pub niceness: Option<i32>,
    /// Kill a game still running after this many seconds.
    #[serde(default)]
    pub game_timeout_secs: Option<u64>,
}

/// Transport used to reach the machines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    /// Remote shell program.
    #[serde(default = "default_ssh")]
    pub ssh: String,
    /// Options given to the remote shell before the destination.
    #[serde(default = "default_ssh_options")]
    pub options: Vec<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            ssh: default_ssh(),
            options: default_ssh_options(),
        }
    }
}

fn default_reset_command() -> String {
    "pkill -KILL -u {user}".to_string()
}

fn default_reset_timeout_secs() -> u64 {
    30
}

fn default_board_size() -> u32 {
    19
}

fn default_komi() -> f64 {
    7.5
}

fn default_ssh() -> String {
    "ssh".to_string()
}

fn default_ssh_options() -> Vec<String> {
    [
        "-o",
        "StrictHostKeyChecking=no",
        "-o",
        "UserKnownHostsFile=/dev/null",
        "-o",
        "BatchMode=yes",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl FleetConfig {
    /// Load the file named by `FLEET_CONFIG`, or `fleet.toml`.
    pub fn from_env() -> anyhow::Result<FleetConfig> {
        let path = std::env::var_os(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load(&path)
    }

    /// Read, parse and validate a configuration file.
    #[instrument]
    pub fn load(path: &Path) -> anyhow::Result<FleetConfig> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("could not read configuration '{}'", path.display()))?;
        let mut config = Self::parse(&text)
            .with_context(|| format!("invalid configuration '{}'", path.display()))?;
        config.source = Some(path.to_path_buf());
        debug!(?config);
        Ok(config)
    }

    /// Parse and validate configuration text.
    pub fn parse(text: &str) -> anyhow::Result<FleetConfig> {
        let config: FleetConfig = toml::from_str(text).context("TOML error")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.user.trim().is_empty() {
            bail!("'user' is empty");
        }
        if self.machines.is_empty() {
            bail!("no machine in 'machines'");
        }
        if let Some(machine) = self.machines.iter().find(|m| m.trim().is_empty()) {
            bail!("invalid machine name {machine:?}");
        }
        if self.conditions.is_empty() {
            bail!("no condition in 'conditions'");
        }
        if self.worker_command.trim().is_empty() {
            bail!("'worker_command' is empty");
        }
        if self.engine.referee.trim().is_empty()
            || self.engine.program.trim().is_empty()
            || self.engine.opponent.trim().is_empty()
        {
            bail!("'engine.referee', 'engine.program' and 'engine.opponent' must all be set");
        }
        self.games_per_color()?;
        Ok(())
    }

    /// Games played in each session.
    ///
    /// An explicit `games_per_color` wins. Otherwise `games_per_condition` is split over the
    /// fleet and both colors and must divide evenly.
    pub fn games_per_color(&self) -> anyhow::Result<u32> {
        let games = match (self.games_per_color, self.games_per_condition) {
            (Some(games), _) => games,
            (None, Some(total)) => {
                let share = 2 * self.machines.len() as u32;
                if total % share != 0 {
                    bail!(
                        "games per condition ({total}) must be a multiple of 2 * <# of machines> ({share})"
                    );
                }
                total / share
            }
            (None, None) => bail!("either 'games_per_color' or 'games_per_condition' is required"),
        };
        if games == 0 {
            bail!("games per color must be positive");
        }
        Ok(games)
    }

    /// Games played over the whole fleet.
    pub fn total_games(&self) -> anyhow::Result<u64> {
        Ok(u64::from(self.games_per_color()?)
            * 2
            * self.conditions.len() as u64
            * self.machines.len() as u64)
    }

    /// Reset command with the user filled in.
    pub fn reset_command_line(&self) -> String {
        self.reset_command.replace("{user}", &self.user)
    }
}
