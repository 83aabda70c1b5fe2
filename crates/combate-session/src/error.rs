//! Error types for the session layer.

use combate_protocol::{MatchId, PlayerId};

/// Errors that can occur while pairing, tracking or reconnecting players.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The player is not seated in any session.
    #[error("no session for player {0}")]
    NotFound(PlayerId),

    #[error("match {0} not found")]
    MatchNotFound(MatchId),

    /// The reconnection token doesn't match anything the server issued,
    /// or the match it belonged to has already been torn down.
    #[error("invalid reconnection token")]
    InvalidToken,

    /// The abandonment grace period elapsed before the player came back.
    #[error("session expired for player {0}")]
    SessionExpired(PlayerId),

    /// A token was presented for a player that is still connected.
    #[error("player {0} already has an active connection")]
    AlreadyConnected(PlayerId),

    /// Reconnection for a player with no recorded disconnect.
    #[error("player {0} is not disconnected")]
    NotDisconnected(PlayerId),

    /// The operation doesn't apply to the session's current phase.
    #[error("operation not allowed in the {0} phase")]
    WrongPhase(&'static str),

    #[error("invalid display name: {0}")]
    InvalidName(String),
}
