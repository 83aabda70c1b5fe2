//! Wire messages: the envelope and the closed sets of inbound and
//! outbound message kinds.
//!
//! Every frame is a JSON object of the form
//!
//! ```json
//! { "type": "MOVE_PIECE", "matchId": 3, "playerId": 7, "payload": { ... } }
//! ```
//!
//! `type` + `payload` come from an *adjacently tagged* enum
//! (`#[serde(tag = "type", content = "payload")]`), flattened into the
//! [`Envelope`] next to the optional routing fields. Because the inbound
//! and outbound sets are closed enums, a frame with an unrecognized
//! `type` fails to decode and never reaches game state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{
    GameView, MatchId, Piece, PieceId, PlacementStatus, PlayerId, Position, Rank,
    Team,
};

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A framed message with optional routing metadata.
///
/// `M` is either [`ClientMessage`] (inbound) or [`ServerMessage`]
/// (outbound).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<M> {
    #[serde(flatten)]
    pub message: M,

    /// The match this frame refers to. Clients may omit it; the server
    /// always resolves the match from the sender's identity and only uses
    /// this field to reject frames aimed at a different match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_id: Option<MatchId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<PlayerId>,
}

impl<M> Envelope<M> {
    /// Wraps a message with no routing metadata.
    pub fn new(message: M) -> Self {
        Self {
            message,
            match_id: None,
            player_id: None,
        }
    }

    /// Tags the envelope with a match id.
    pub fn with_match(mut self, match_id: MatchId) -> Self {
        self.match_id = Some(match_id);
        self
    }

    /// Tags the envelope with a player id.
    pub fn with_player(mut self, player_id: PlayerId) -> Self {
        self.player_id = Some(player_id);
        self
    }
}

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// Everything a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Choose a display name.
    SetName(SetName),
    /// Move (and possibly attack with) a piece during the active phase.
    MovePiece(MoveRequest),
    /// Stage, relocate or remove a piece during placement.
    PlacementUpdate(PlacementUpdate),
    /// Declare the deployment complete.
    PlacementReady(PlacementReady),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetName {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub piece_id: PieceId,
    pub target: Position,
}

/// A placement edit. Which operation it means depends on the fields set:
///
/// | fields                         | operation          |
/// |--------------------------------|--------------------|
/// | `pieceId` + `remove: true`     | remove             |
/// | `pieceId` + `position`         | move (swap if occupied) |
/// | `rank` + `position`            | place              |
///
/// `rank` is a raw string so that an unknown rank is reported with its
/// own placement error code instead of failing to decode.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementUpdate {
    #[serde(default)]
    pub rank: Option<String>,
    #[serde(default)]
    pub piece_id: Option<PieceId>,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub remove: bool,
}

/// Confirms the deployment. When `allPieces` is present the staged
/// pieces are replaced by that list before validation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementReady {
    #[serde(default)]
    pub all_pieces: Option<Vec<StagedPieceSpec>>,
}

/// One entry of a full deployment submitted with `PLACEMENT_READY`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedPieceSpec {
    pub rank: String,
    pub position: Position,
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// Everything the server may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// Free-form informational text (matchmaking progress, opponent left).
    #[serde(rename = "SERVER_MESSAGE")]
    Announcement(TextMessage),
    /// Sent once per connection: who you are and how to come back.
    SessionAssigned(SessionAssigned),
    /// The receiver's view of the game after a move or on reconnection.
    StateUpdate(GameView),
    /// A rejected move. Game state is unchanged.
    MoveError(Notice),
    /// The receiver's placement progress.
    PlacementStatus(PlacementSnapshot),
    /// A rejected placement operation. Placement state is unchanged.
    PlacementError(PlacementErrorReport),
    /// Both players are ready (or the instant setup ran); the game begins.
    GameStart(GameView),
    PlacementOpponentDisconnected(Notice),
    PlacementOpponentReconnected(Notice),
    PlacementOpponentAbandoned(Notice),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextMessage {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionAssigned {
    pub player_id: PlayerId,
    /// Present this as `?token=` when reconnecting.
    pub reconnect_token: String,
}

/// What a player sees of their own placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementSnapshot {
    pub status: PlacementStatus,
    pub team: Team,
    pub staged_pieces: Vec<Piece>,
    pub remaining_inventory: BTreeMap<Rank, u32>,
    pub opponent_status: PlacementStatus,
}

/// A structured placement rejection.
///
/// `code` is a stable identifier such as `"P4006"`; `userMessage` is
/// meant for display, `message` for logs and debugging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementErrorReport {
    pub code: String,
    pub message: String,
    pub user_message: String,
    pub context: ErrorContext,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_id: Option<MatchId>,
    pub player_id: PlayerId,
    pub operation: String,
    pub request_id: String,
    /// Milliseconds until the rate-limit window resets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

// =========================================================================
// Tests
// =========================================================================
