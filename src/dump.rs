//! Line format of the per-machine dump files.
//!
//! A worker appends lines to `<results-dir>/<machine>.dump` while it runs; the collator reads
//! them back, possibly while the worker is still writing. Every line is turned into an
//! optional [`DumpRecord`] before any aggregation happens. Lines that are not records (the
//! header line, a half-written last line) parse to `None`.

use std::{
    fmt,
    path::{Path, PathBuf},
};

/// Extension of the per-machine dump files.
pub const DUMP_EXTENSION: &str = "dump";

const CONDITION_PREFIX: &str = "CONDITION: ";
const BLACK_MARKER: &str = "Tested program black";
const WHITE_MARKER: &str = "Tested program white";
const DONE_MARKER: &str = "DONE";

/// Stone color, used for the program-under-test's role in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    /// Plays first.
    Black,
    /// Plays second.
    White,
}

impl Color {
    /// The other color.
    pub fn opposite(self) -> Color {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Black => write!(f, "black"),
            Color::White => write!(f, "white"),
        }
    }
}

/// Games won by each color during one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionScore {
    /// Games won by black.
    pub black: u32,
    /// Games won by white.
    pub white: u32,
}

impl SessionScore {
    /// Wins of the player holding `color`.
    pub fn wins_for(&self, color: Color) -> u32 {
        match color {
            Color::Black => self.black,
            Color::White => self.white,
        }
    }

    /// Games with a winner.
    pub fn decided(&self) -> u64 {
        u64::from(self.black) + u64::from(self.white)
    }
}

/// One meaningful line of a dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpRecord {
    /// Starts the section of a condition.
    Condition(String),
    /// Color of the program-under-test for the next score line.
    Role(Color),
    /// Outcome of one session.
    Score(SessionScore),
    /// The worker went through every condition.
    Done,
}

impl DumpRecord {
    /// Parse one line (with or without its line terminator).
    ///
    /// Score lines are recognized by their comma: `Black <int>, White <int>`. The second token
    /// without its trailing comma is black's score and the fourth token is white's.
    pub fn parse(line: &str) -> Option<DumpRecord> {
        let line = line.trim_end_matches(['\n', '\r']);
        if let Some(condition) = line.strip_prefix(CONDITION_PREFIX) {
            return Some(DumpRecord::Condition(condition.to_string()));
        }
        match line.trim() {
            BLACK_MARKER => return Some(DumpRecord::Role(Color::Black)),
            WHITE_MARKER => return Some(DumpRecord::Role(Color::White)),
            DONE_MARKER => return Some(DumpRecord::Done),
            _ => {}
        }
        if line.contains(',') {
            return parse_score(line).map(DumpRecord::Score);
        }
        None
    }
}

fn parse_score(line: &str) -> Option<SessionScore> {
    let tokens = line.split_whitespace().collect::<Vec<_>>();
    let [black_label, black, white_label, white] = tokens.as_slice() else {
        return None;
    };
    if *black_label != "Black" || *white_label != "White" {
        return None;
    }
    let black = black.strip_suffix(',')?.parse().ok()?;
    let white = white.parse().ok()?;
    Some(SessionScore { black, white })
}

impl fmt::Display for DumpRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DumpRecord::Condition(text) => write!(f, "{CONDITION_PREFIX}{text}"),
            DumpRecord::Role(Color::Black) => write!(f, "{BLACK_MARKER}"),
            DumpRecord::Role(Color::White) => write!(f, "{WHITE_MARKER}"),
            DumpRecord::Score(score) => write!(f, "Black {}, White {}", score.black, score.white),
            DumpRecord::Done => write!(f, "{DONE_MARKER}"),
        }
    }
}

/// Path of the dump written by `machine`.
pub fn dump_path(results_dir: &Path, machine: &str) -> PathBuf {
    results_dir.join(format!("{machine}.{DUMP_EXTENSION}"))
}
