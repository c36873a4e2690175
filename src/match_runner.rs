//! Plays the sessions of one worker.
//!
//! A session is a batch of games between the program under test and its opponent, under one
//! condition, with colors fixed for the whole batch. Each game is refereed by an external
//! program started as
//!
//! ```text
//! [nice -n <niceness>] <referee> [referee args] --black <cmd> --white <cmd> --size <n> --komi <k>
//! ```
//!
//! which prints the SGF record of the game on stdout. The winner is read from the record's
//! `RE[...]` property. Games without a winner (jigo, void, unreadable result) are not counted.

use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
    time::Duration,
};

use anyhow::{bail, Context};
use tracing::{debug, info, instrument, trace, warn};

use crate::{
    configuration::Configuration,
    dump::{Color, SessionScore},
    fleet_config::EngineConfig,
    process::{resolve_executable, split_command_line, ManagedProcess},
};

/// Extension of the game records.
pub const RECORD_EXTENSION: &str = "sgf";

/// One batch of games to play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session<'a> {
    /// Condition arguments given to the program under test.
    pub condition: &'a str,
    /// Color of the program under test for every game of the session.
    pub color: Color,
    /// Number of games.
    pub games: u32,
    /// Game records are saved as `<record_base>-<game number>.sgf`.
    pub record_base: String,
}

/// Something able to play a [`Session`].
///
/// Implemented by [`MatchRunner`]; the worker loop only depends on this trait.
pub trait SessionRunner {
    /// Play every game of `session` and count the wins of each color.
    ///
    /// # Errors
    /// Any error aborts the whole session: no partial score is returned.
    fn run_session(&mut self, session: &Session<'_>) -> anyhow::Result<SessionScore>;
}

impl<R: SessionRunner + ?Sized> SessionRunner for &mut R {
    fn run_session(&mut self, session: &Session<'_>) -> anyhow::Result<SessionScore> {
        (**self).run_session(session)
    }
}

/// Runs sessions through the configured referee.
#[derive(Debug, Clone)]
pub struct MatchRunner {
    engine: EngineConfig,
    records_dir: PathBuf,
    config: Configuration,
}

impl MatchRunner {
    /// Play with `engine`, saving game records in `records_dir`.
    pub fn new(engine: EngineConfig, records_dir: impl Into<PathBuf>, config: Configuration) -> Self {
        Self {
            engine,
            records_dir: records_dir.into(),
            config,
        }
    }

    /// Command line of the program under test for `condition`.
    pub fn program_command(&self, condition: &str) -> String {
        [self.engine.program.as_str(), self.engine.always.as_str(), condition]
            .into_iter()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn referee_command(&self, black: &str, white: &str) -> anyhow::Result<Command> {
        let referee = split_command_line(&self.engine.referee).context("invalid referee")?;
        let mut command = match self.engine.niceness {
            Some(niceness) => {
                let mut command = Command::new("nice");
                command.arg("-n").arg(niceness.to_string()).args(&referee);
                command
            }
            None => {
                let mut command = Command::new(&referee[0]);
                command.args(&referee[1..]);
                command
            }
        };
        command
            .args(&self.engine.referee_args)
            .arg("--black")
            .arg(black)
            .arg("--white")
            .arg(white)
            .arg("--size")
            .arg(self.engine.board_size.to_string())
            .arg("--komi")
            .arg(self.engine.komi.to_string());
        Ok(command)
    }

    /// Play one game and return its record.
    fn play_game(&self, black: &str, white: &str) -> anyhow::Result<String> {
        let mut command = self.referee_command(black, white)?;
        let process = ManagedProcess::launch(&mut command, self.config.debug_engine_stderr)?;
        trace!(pid = process.id(), "referee started");
        let output = process.wait_with_timeout(self.engine.game_timeout_secs.map(Duration::from_secs))?;
        if !output.status.success() {
            bail!("referee failed with {}", output.status);
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn save_record(&self, record_base: &str, game: u32, record: &str) {
        let path = record_path(&self.records_dir, record_base, game);
        if let Err(e) = fs::write(&path, record) {
            warn!("could not save game record '{}': {e}", path.display());
        }
    }
}

impl SessionRunner for MatchRunner {
    #[instrument(skip_all, fields(condition = session.condition, color = %session.color))]
    fn run_session(&mut self, session: &Session<'_>) -> anyhow::Result<SessionScore> {
        let program = self.program_command(session.condition);
        resolve_executable(&program).context("program under test cannot be started")?;
        resolve_executable(&self.engine.opponent).context("opponent cannot be started")?;

        let (black, white) = match session.color {
            Color::Black => (program.as_str(), self.engine.opponent.as_str()),
            Color::White => (self.engine.opponent.as_str(), program.as_str()),
        };

        let mut score = SessionScore::default();
        let mut undecided = 0;
        for game in 1..=session.games {
            let record = self
                .play_game(black, white)
                .with_context(|| format!("game {game}/{} of {}", session.games, session.record_base))?;
            self.save_record(&session.record_base, game, &record);
            match game_winner(&record) {
                Some(Color::Black) => score.black += 1,
                Some(Color::White) => score.white += 1,
                None => undecided += 1,
            }
            debug!(game, black = score.black, white = score.white);
        }
        if undecided > 0 {
            warn!(undecided, games = session.games, "games without a winner are left out of the score");
        }
        info!(black = score.black, white = score.white, "session finished");
        Ok(score)
    }
}

/// Path of the record of game number `game` of a session.
pub fn record_path(records_dir: &Path, record_base: &str, game: u32) -> PathBuf {
    records_dir.join(format!("{record_base}-{game}.{RECORD_EXTENSION}"))
}

/// Winner written in the `RE` property of an SGF record.
///
/// `B+...` and `W+...` name a winner; draws (`0`), void games and unknown results do not.
pub fn game_winner(record: &str) -> Option<Color> {
    let start = record
        .match_indices("RE[")
        .map(|(i, _)| i)
        .find(|&i| i == 0 || !record.as_bytes()[i - 1].is_ascii_uppercase())?
        + 3;
    let end = start + record[start..].find(']')?;
    let result = record[start..end].trim();
    if result.starts_with("B+") {
        Some(Color::Black)
    } else if result.starts_with("W+") {
        Some(Color::White)
    } else {
        None
    }
}
