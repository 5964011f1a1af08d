use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::{CellCount, Coord2, WorkerId};

/// Faults that suggest tampering or resource abuse. Always fatal to the
/// session, never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecurityFault {
    #[error("Layout search did not finish within {budget:?}")]
    Timeout { budget: Duration },
    #[error("Could not exclusively create handoff artifact {} ({kind})", .path.display())]
    ArtifactCreate { path: PathBuf, kind: io::ErrorKind },
    #[error("Handoff slot of {worker} was already written")]
    DuplicateArtifact { worker: WorkerId },
    #[error("Handoff artifact of {worker} is malformed")]
    MalformedArtifact { worker: WorkerId },
    #[error("Field area {area} exceeds the configured maximum of {max}")]
    AreaTooLarge { area: u32, max: u32 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("Invalid coordinates")]
    InvalidCoords,
    #[error("Field must be at least one cell wide and high")]
    InvalidSize,
    #[error("At least one mine is required")]
    NoMines,
    #[error("Too many mines, requested {requested} but only {placeable} cells can hold one")]
    TooManyMines {
        requested: CellCount,
        placeable: CellCount,
    },
    #[error("Mine listed twice at {0:?}")]
    DuplicateMine(Coord2),
    #[error("Unknown topology {0:?}")]
    UnknownTopology(String),
    #[error("Game has not started, reveal a cell first")]
    NotStarted,
    #[error("Game already ended, no new moves are accepted")]
    AlreadyEnded,
    #[error("Aborted by the player")]
    Aborted,
    #[error("Security fault: {0}")]
    Security(#[from] SecurityFault),
    #[error("Every layout worker failed")]
    WorkersExhausted,
    #[error("The only possible layout cannot be solved without guessing")]
    Unsolvable,
    #[error("Nothing was handed off by {worker}")]
    MissingArtifact { worker: WorkerId },
    #[error("I/O failure while trying to {op}: {kind}")]
    Io { op: &'static str, kind: io::ErrorKind },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Ledger entry is malformed: {0:?}")]
    MalformedEntry(String),
    #[error("Ledger would grow beyond {max_size} bytes")]
    LedgerTooLarge { max_size: u64 },
    #[error("Nickname is longer than {max} characters")]
    NicknameTooLong { max: usize },
}

impl GameError {
    pub fn io(op: &'static str, err: &io::Error) -> Self {
        Self::Io {
            op,
            kind: err.kind(),
        }
    }

    /// Whether this error must be treated as a suspected attack rather than
    /// an ordinary failure.
    pub const fn is_security(&self) -> bool {
        matches!(self, Self::Security(_))
    }
}

pub type Result<T> = core::result::Result<T, GameError>;
