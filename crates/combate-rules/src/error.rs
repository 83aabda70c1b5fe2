//! Error types for the rule engine.

use combate_protocol::{PieceId, PlayerId, Position, Rank};

/// Why a move was rejected.
///
/// The `Display` text is sent verbatim to the mover in `MOVE_ERROR`, so
/// it describes the problem from the player's point of view.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    #[error("the game is already over")]
    GameFinished,

    #[error("player {0} is not seated in this game")]
    UnknownPlayer(PlayerId),

    #[error("piece {0} not found")]
    PieceNotFound(PieceId),

    #[error("piece does not belong to player")]
    NotYourPiece,

    #[error("not your turn")]
    NotYourTurn,

    /// Flag and bomb never move.
    #[error("{0} cannot move")]
    Immobile(Rank),

    #[error("piece must move to a different cell")]
    NoMovement,

    #[error("target {0} is off the board")]
    OutOfBounds(Position),

    #[error("pieces move along rows and columns only")]
    Diagonal,

    #[error("target {0} is a lake")]
    Lake(Position),

    #[error("target {0} holds one of your pieces")]
    FriendlyOccupied(Position),

    /// Only the scout moves more than one cell.
    #[error("{0} moves one cell at a time")]
    TooFar(Rank),

    /// A scout's path crosses an occupied cell.
    #[error("path blocked at {0}")]
    PathBlocked(Position),
}
