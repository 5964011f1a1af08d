use chrono::prelude::*;
use core::fmt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use web_time::Instant;

use crate::*;

/// Valid transitions:
/// - PreGame -> PlayGame
/// - PreGame -> GameWon (the first reveal already opened every safe cell)
/// - PlayGame -> GameWon
/// - PlayGame -> GameLost
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameStatus {
    /// No mines placed yet, waiting for the first reveal
    #[default]
    PreGame,
    PlayGame,
    GameWon,
    GameLost,
}

impl GameStatus {
    pub const fn is_initial(self) -> bool {
        matches!(self, Self::PreGame)
    }

    /// Indicates the game has ended and no moves can be made anymore
    pub const fn is_final(self) -> bool {
        matches!(self, Self::GameWon | Self::GameLost)
    }
}

/// What the player asked for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct GameParams {
    pub width: Coord,
    pub height: Coord,
    pub mines: CellCount,
    pub topology: Topology,
    pub guessless: bool,
}

impl Default for GameParams {
    fn default() -> Self {
        Self {
            width: 10,
            height: 10,
            mines: 10,
            topology: Topology::Moore,
            guessless: true,
        }
    }
}

impl GameParams {
    pub const fn size(&self) -> Coord2 {
        (self.width, self.height)
    }

    /// Identifies the ranking a finished game competes in, e.g.
    /// `10@9x9-moore` or `10@9x9-hex+losable`.
    pub fn signature(&self) -> String {
        format!(
            "{}@{}x{}-{}{}",
            self.mines,
            self.width,
            self.height,
            self.topology,
            if self.guessless { "" } else { "+losable" }
        )
    }
}

/// Presentation layer driven by [`Game::play`].
pub trait Interface {
    /// Reads one player action and applies it with [`Game::reveal`] or
    /// [`Game::flag`]. Returning [`GameError::Aborted`] ends the game
    /// without a summary.
    fn input(&mut self, game: &mut Game) -> Result<()>;

    fn output(&mut self, game: &Game);

    /// Lets the player look at the final screen.
    fn anykey_cont(&mut self) {}
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Won {
        elapsed: Duration,
    },
    /// `mines_left` counts mines that were not flagged.
    Lost {
        mines_left: CellCount,
        elapsed: Duration,
    },
}

impl Outcome {
    pub const fn is_won(&self) -> bool {
        matches!(self, Self::Won { .. })
    }

    pub const fn elapsed(&self) -> Duration {
        match self {
            Self::Won { elapsed } | Self::Lost { elapsed, .. } => *elapsed,
        }
    }
}

/// Result record of a finished game, ready for the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSummary {
    /// The parameter signature, prefixed with `lost/` for losses.
    pub signature: String,
    pub outcome: Outcome,
    pub completed_at: DateTime<Utc>,
}

/// Represents a game from the first reveal to a win or a loss.
///
/// Mines are placed lazily: the first reveal picks the layout, keeping the
/// revealed cell and its neighbours free of mines. In guessless mode the
/// layout comes from a [`LayoutSearch`] and is guaranteed to be finishable
/// by the oracle without guessing.
pub struct Game {
    params: GameParams,
    config: EngineConfig,
    oracle: Box<dyn SolvabilityOracle>,
    field: Field,
    status: GameStatus,
    started_at: Option<Instant>,
    ended_at: Option<Instant>,
    completed_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Game")
            .field("params", &self.params)
            .field("status", &self.status)
            .field("field", &self.field)
            .finish_non_exhaustive()
    }
}

impl Game {
    pub fn new(params: GameParams, config: EngineConfig) -> Result<Self> {
        Self::with_oracle(params, config, DeductionOracle::default())
    }

    pub fn with_oracle(
        params: GameParams,
        config: EngineConfig,
        oracle: impl SolvabilityOracle + 'static,
    ) -> Result<Self> {
        config.check_area(params.size())?;
        let field = Field::new(params.size(), params.topology)?;
        if params.mines == 0 {
            return Err(GameError::NoMines);
        }

        // wherever the first reveal lands, this many cells stay placeable
        let reserved = 1 + params.topology.max_neighbors() as CellCount;
        let placeable = field.total_cells().saturating_sub(reserved);
        if params.mines > placeable {
            return Err(GameError::TooManyMines {
                requested: params.mines,
                placeable,
            });
        }

        Ok(Self {
            params,
            config,
            oracle: Box::new(oracle),
            field,
            status: GameStatus::PreGame,
            started_at: None,
            ended_at: None,
            completed_at: None,
        })
    }

    pub fn params(&self) -> &GameParams {
        &self.params
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn field(&self) -> &Field {
        &self.field
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    /// Time since the first reveal, frozen once the game ends
    pub fn elapsed(&self) -> Duration {
        match self.started_at {
            Some(started_at) => self
                .ended_at
                .unwrap_or_else(Instant::now)
                .duration_since(started_at),
            None => Duration::ZERO,
        }
    }

    /// How many mines have not been flagged yet
    pub fn mines_left(&self) -> CellCount {
        self.field.flags_left()
    }

    pub fn reveal(&mut self, coords: Coord2) -> Result<RevealOutcome> {
        match self.status {
            GameStatus::PreGame => self.start(coords),
            GameStatus::PlayGame => {
                let outcome = self.field.reveal(coords)?;
                self.settle(outcome);
                Ok(outcome)
            }
            GameStatus::GameWon | GameStatus::GameLost => Ok(RevealOutcome::NoChange),
        }
    }

    /// Toggles a flag on a hidden cell.
    pub fn flag(&mut self, coords: Coord2) -> Result<MarkOutcome> {
        match self.status {
            GameStatus::PreGame => Err(GameError::NotStarted),
            GameStatus::PlayGame => self.field.toggle_flag(coords),
            GameStatus::GameWon | GameStatus::GameLost => Err(GameError::AlreadyEnded),
        }
    }

    /// Places the mines around the first reveal and starts the clock.
    ///
    /// Nothing changes if no layout can be produced.
    fn start(&mut self, coords: Coord2) -> Result<RevealOutcome> {
        let request = LayoutRequest::new(
            self.params.size(),
            self.params.topology,
            self.params.mines,
            coords,
        )?;

        let layout = if self.params.guessless {
            GuesslessGenerator::new(self.oracle.as_ref(), &self.config.search).generate(&request)?
        } else {
            let seed = self.config.search.seed.unwrap_or_else(rand::random);
            RandomLayoutGenerator::new(seed).generate(&request)?
        };

        let outcome = request.install(&mut self.field, &layout)?;
        let now = Instant::now();
        log::debug!("Game started at {:?} from {:?}", now, coords);
        self.started_at = Some(now);
        self.status = GameStatus::PlayGame;

        self.settle(outcome);
        Ok(outcome)
    }

    fn settle(&mut self, outcome: RevealOutcome) {
        match outcome {
            RevealOutcome::Won => self.finish(GameStatus::GameWon),
            RevealOutcome::HitMine => self.finish(GameStatus::GameLost),
            RevealOutcome::NoChange | RevealOutcome::Revealed => {}
        }
    }

    fn finish(&mut self, status: GameStatus) {
        if self.status != GameStatus::PlayGame {
            return;
        }

        self.status = status;
        self.ended_at = Some(Instant::now());
        self.completed_at = Some(Utc::now());
        log::debug!("Game ended {:?} after {:?}", status, self.elapsed());

        if status == GameStatus::GameLost {
            self.field.reveal_all();
        }
    }

    /// The result record, once the game has ended.
    pub fn summary(&self) -> Option<GameSummary> {
        let completed_at = self.completed_at?;
        let elapsed = self.elapsed();

        let (signature, outcome) = match self.status {
            GameStatus::GameWon => (self.params.signature(), Outcome::Won { elapsed }),
            GameStatus::GameLost => (
                format!("lost/{}", self.params.signature()),
                Outcome::Lost {
                    mines_left: self.scored_mines_left(),
                    elapsed,
                },
            ),
            GameStatus::PreGame | GameStatus::PlayGame => return None,
        };

        Some(GameSummary {
            signature,
            outcome,
            completed_at,
        })
    }

    /// Unflagged mines, or every mine when more than a fifth of the mine
    /// count was flagged wrongly.
    fn scored_mines_left(&self) -> CellCount {
        let mut unflagged = 0;
        let mut misflagged: CellCount = 0;
        for coords in self.field.all_cells() {
            let flagged = self.field.cell_at(coords) == Cell::Flagged;
            match (self.field.has_mine_at(coords), flagged) {
                (true, false) => unflagged += 1,
                (false, true) => misflagged += 1,
                _ => {}
            }
        }

        if u32::from(misflagged) * 5 > u32::from(self.params.mines) {
            log::debug!("{} wrong flags, no credit for flagged mines", misflagged);
            self.params.mines
        } else {
            unflagged
        }
    }

    /// Runs the game loop until it ends or the interface aborts.
    pub fn play(&mut self, interface: &mut impl Interface) -> Result<GameSummary> {
        while !self.status.is_final() {
            interface.output(self);
            interface.input(self)?;
        }
        interface.output(self);

        let summary = self.summary().ok_or(GameError::NotStarted)?;
        interface.anykey_cont();
        Ok(summary)
    }
}
