//! Core data model for Combate: identities, board coordinates, pieces,
//! and the authoritative game snapshot.
//!
//! Everything in this module is plain data. The rules that govern how a
//! [`GameState`] may change live in `combate-rules`; this module only
//! describes what a state *is* and how it looks on the wire.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a player.
///
/// Newtype over `u64` so a `PlayerId` can never be confused with a
/// [`MatchId`] or [`PieceId`]. `#[serde(transparent)]` keeps the wire form
/// a bare number: `PlayerId(42)` is just `42` in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

/// `tracing::info!(%player_id, ...)` prints "P-42".
impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A unique identifier for a match (one pairing of two players).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(pub u64);

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M-{}", self.0)
    }
}

/// A unique identifier for a piece.
///
/// Piece ids are allocated when the piece is staged during placement and
/// reissued once, in shuffled order, when the game starts. From then on
/// they never change, even when the piece moves.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PieceId(pub u64);

impl fmt::Display for PieceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pc-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Board coordinates
// ---------------------------------------------------------------------------

/// A cell on the 10×10 board.
///
/// Coordinates are signed so that a client sending `-1` or `12` produces
/// an "out of bounds" rule error instead of a decode failure. Whether a
/// position is actually on the board is decided by `combate-rules`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub row: i32,
    pub col: i32,
}

impl Position {
    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

// ---------------------------------------------------------------------------
// Teams and ranks
// ---------------------------------------------------------------------------

/// One side of the board.
///
/// `Red` is the first player to arrive. Red deploys on rows 6–9 and moves
/// first. `Blue` deploys on rows 0–3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    Red,
    Blue,
}

impl Team {
    /// The other side.
    pub fn opponent(self) -> Team {
        match self {
            Team::Red => Team::Blue,
            Team::Blue => Team::Red,
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Team::Red => f.write_str("red"),
            Team::Blue => f.write_str("blue"),
        }
    }
}

/// A piece rank.
///
/// Only the identity lives here. Strength, army counts and mobility are
/// looked up in the rank catalog of `combate-rules`, so there is exactly
/// one place that decides how ranks behave.
///
/// Declaration order follows strength, which makes `Ord` (and therefore
/// `BTreeMap<Rank, _>` iteration) go weakest to strongest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum Rank {
    Flag,
    Spy,
    Scout,
    Miner,
    Sergeant,
    Lieutenant,
    Captain,
    Major,
    Colonel,
    General,
    Marshal,
    Bomb,
}

impl Rank {
    /// Every rank, weakest first.
    pub const ALL: [Rank; 12] = [
        Rank::Flag,
        Rank::Spy,
        Rank::Scout,
        Rank::Miner,
        Rank::Sergeant,
        Rank::Lieutenant,
        Rank::Captain,
        Rank::Major,
        Rank::Colonel,
        Rank::General,
        Rank::Marshal,
        Rank::Bomb,
    ];

    /// The wire identifier, e.g. `"scout"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Rank::Flag => "flag",
            Rank::Spy => "spy",
            Rank::Scout => "scout",
            Rank::Miner => "miner",
            Rank::Sergeant => "sergeant",
            Rank::Lieutenant => "lieutenant",
            Rank::Captain => "captain",
            Rank::Major => "major",
            Rank::Colonel => "colonel",
            Rank::General => "general",
            Rank::Marshal => "marshal",
            Rank::Bomb => "bomb",
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses a wire identifier. Placement requests carry the rank as a raw
/// string so that an unknown rank becomes a placement error with its own
/// code rather than a dropped frame.
impl FromStr for Rank {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rank::ALL
            .into_iter()
            .find(|rank| rank.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownRank(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Pieces and players
// ---------------------------------------------------------------------------

/// A piece on the board (or staged during placement).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Piece {
    pub id: PieceId,
    pub rank: Rank,
    pub team: Team,
    pub position: Position,
    /// Becomes `true` the first time the piece takes part in combat and
    /// never goes back.
    pub revealed: bool,
}

/// Public information about a seated player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub display_name: String,
    pub team: Team,
}

/// A player's progress through the placement phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementStatus {
    #[default]
    Placing,
    Ready,
}

// ---------------------------------------------------------------------------
// GameState
// ---------------------------------------------------------------------------

/// The authoritative snapshot of an active (or finished) game.
///
/// Invariants maintained by the rule engine:
/// - at most one piece per cell;
/// - `turn_player_id` is the id of one of the two `players`;
/// - `winner_id` is `Some` only when `finished` is `true`.
///
/// A `GameState` is replaced wholesale after each accepted move; it is
/// never edited in place by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub match_id: MatchId,
    pub players: [PlayerInfo; 2],
    pub pieces: Vec<Piece>,
    pub turn_player_id: PlayerId,
    pub finished: bool,
    pub winner_id: Option<PlayerId>,
}

impl GameState {
    /// The piece occupying `position`, if any.
    pub fn piece_at(&self, position: Position) -> Option<&Piece> {
        self.pieces.iter().find(|p| p.position == position)
    }

    /// The piece with the given id, if it is still on the board.
    pub fn piece(&self, id: PieceId) -> Option<&Piece> {
        self.pieces.iter().find(|p| p.id == id)
    }

    /// The seated player with the given id.
    pub fn player(&self, id: PlayerId) -> Option<&PlayerInfo> {
        self.players.iter().find(|p| p.id == id)
    }

    /// Builds the redacted view a member of `viewer` is allowed to see.
    ///
    /// Opposing pieces keep their id, team and position, but their rank
    /// is withheld until combat has revealed them.
    pub fn view_for(&self, viewer: Team) -> GameView {
        GameView {
            match_id: self.match_id,
            your_team: viewer,
            players: self.players.clone(),
            pieces: self
                .pieces
                .iter()
                .map(|piece| PieceView::of(piece, viewer))
                .collect(),
            turn_player_id: self.turn_player_id,
            finished: self.finished,
            winner_id: self.winner_id,
        }
    }
}

/// A piece as seen by one of the two players.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceView {
    pub id: PieceId,
    /// `None` for unrevealed opposing pieces.
    pub rank: Option<Rank>,
    pub team: Team,
    pub position: Position,
    pub revealed: bool,
}

impl PieceView {
    fn of(piece: &Piece, viewer: Team) -> Self {
        let visible = piece.team == viewer || piece.revealed;
        Self {
            id: piece.id,
            rank: visible.then_some(piece.rank),
            team: piece.team,
            position: piece.position,
            revealed: piece.revealed,
        }
    }
}

/// The per-player projection of a [`GameState`] sent in `STATE_UPDATE`
/// and `GAME_START`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameView {
    pub match_id: MatchId,
    pub your_team: Team,
    pub players: [PlayerInfo; 2],
    pub pieces: Vec<PieceView>,
    pub turn_player_id: PlayerId,
    pub finished: bool,
    pub winner_id: Option<PlayerId>,
}

// =========================================================================
// Tests
// =========================================================================
