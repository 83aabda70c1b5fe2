//! Error types for the placement layer.
//!
//! Every variant maps to a stable code (`P4xxx`/`P5xxx`) and a message
//! suitable for display, both of which end up in `PLACEMENT_ERROR`.

use std::time::Duration;

use combate_protocol::{MatchId, PieceId, PlayerId, Position, Rank, Team};

/// Errors that can occur while negotiating a deployment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlacementError {
    // -- Validation ---------------------------------------------------------
    #[error("position {position} is outside the {team} deployment rows")]
    OutsideHomeArea { position: Position, team: Team },

    #[error("position {0} is a lake")]
    Lake(Position),

    #[error("no {0} left to place")]
    PieceNotAvailable(Rank),

    /// The update names neither a rank nor a piece.
    #[error("missing rank or piece id")]
    MissingPiece,

    /// A move or place request without a target cell.
    #[error("missing position")]
    MissingPosition,

    #[error("{remaining} pieces still to place")]
    IncompletePlacement { remaining: u32 },

    #[error("expected {expected} pieces, found {actual}")]
    WrongPieceCount { expected: u32, actual: u32 },

    /// One entry per rank whose staged count is off, e.g.
    /// `"scout: expected 8, actual 7"`.
    #[error("composition mismatch: {}", .0.join("; "))]
    InvalidComposition(Vec<String>),

    #[error("position {0} is off the board")]
    OutOfBounds(Position),

    #[error("position {0} is already occupied")]
    PositionOccupied(Position),

    #[error("unknown rank {0:?}")]
    InvalidRank(String),

    // -- Game state ---------------------------------------------------------
    #[error("piece {0} is not staged")]
    PieceNotFound(PieceId),

    #[error("player {0} not found")]
    PlayerNotFound(PlayerId),

    #[error("match {0} not found")]
    MatchNotFound(MatchId),

    #[error("match is not in the placement phase")]
    WrongPhase,

    /// Edits after `PLACEMENT_READY` are not allowed.
    #[error("placement already confirmed")]
    AlreadyConfirmed,

    // -- Throttling ---------------------------------------------------------
    #[error("rate limit exceeded, retry in {}ms", .retry_after.as_millis())]
    RateLimited { retry_after: Duration },

    // -- Server -------------------------------------------------------------
    #[error("internal error: {0}")]
    Internal(String),
}

impl PlacementError {
    /// The stable error code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::OutsideHomeArea { .. } | Self::Lake(_) | Self::MissingPosition => "P4001",
            Self::PieceNotAvailable(_) | Self::MissingPiece => "P4002",
            Self::IncompletePlacement { .. } => "P4003",
            Self::WrongPieceCount { .. } | Self::InvalidComposition(_) => "P4004",
            Self::OutOfBounds(_) => "P4005",
            Self::PositionOccupied(_) => "P4006",
            Self::InvalidRank(_) => "P4007",
            Self::PieceNotFound(_) => "P4101",
            Self::PlayerNotFound(_) => "P4102",
            Self::MatchNotFound(_) => "P4103",
            Self::WrongPhase | Self::AlreadyConfirmed => "P4104",
            Self::RateLimited { .. } => "P4301",
            Self::Internal(_) => "P5001",
        }
    }

    /// A short message meant to be shown to the player.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::OutsideHomeArea { .. } => "Pieces must be placed in your own rows",
            Self::Lake(_) => "Pieces cannot be placed on a lake",
            Self::MissingPosition => "Choose a cell for the piece",
            Self::PieceNotAvailable(_) => "No more pieces of this rank are available",
            Self::MissingPiece => "Choose a piece to place",
            Self::IncompletePlacement { .. } => "Place all your pieces before confirming",
            Self::WrongPieceCount { .. } | Self::InvalidComposition(_) => {
                "Your army does not have the right pieces"
            }
            Self::OutOfBounds(_) => "That cell is off the board",
            Self::PositionOccupied(_) => "That cell is already taken",
            Self::InvalidRank(_) => "Unknown piece type",
            Self::PieceNotFound(_) => "That piece is not on your board",
            Self::PlayerNotFound(_) => "You are not part of this game",
            Self::MatchNotFound(_) => "Game not found",
            Self::WrongPhase => "The placement phase is over",
            Self::AlreadyConfirmed => "You already confirmed your placement",
            Self::RateLimited { .. } => "Too many requests, slow down",
            Self::Internal(_) => "Something went wrong, try again",
        }
    }

    /// Milliseconds until a rate-limited request may be retried.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after } => Some(retry_after.as_millis() as u64),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_groups_validation_and_state_errors() {
        assert_eq!(PlacementError::Lake(Position::new(4, 2)).code(), "P4001");
        assert_eq!(PlacementError::PieceNotAvailable(Rank::Flag).code(), "P4002");
        assert_eq!(
            PlacementError::PositionOccupied(Position::new(6, 0)).code(),
            "P4006"
        );
        assert_eq!(PlacementError::InvalidRank("x".into()).code(), "P4007");
        assert_eq!(PlacementError::AlreadyConfirmed.code(), "P4104");
        assert_eq!(PlacementError::Internal("x".into()).code(), "P5001");
    }

    #[test]
    fn test_rate_limited_reports_retry_after() {
        let err = PlacementError::RateLimited {
            retry_after: Duration::from_millis(2500),
        };
        assert_eq!(err.code(), "P4301");
        assert_eq!(err.retry_after_ms(), Some(2500));
        assert_eq!(err.to_string(), "rate limit exceeded, retry in 2500ms");
    }

    #[test]
    fn test_invalid_composition_lists_every_mismatch() {
        let err = PlacementError::InvalidComposition(vec![
            "scout: expected 8, actual 7".into(),
            "bomb: expected 6, actual 7".into(),
        ]);
        assert_eq!(
            err.to_string(),
            "composition mismatch: scout: expected 8, actual 7; bomb: expected 6, actual 7"
        );
    }
}
