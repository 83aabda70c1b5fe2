//! Wire protocol for Combate.
//!
//! This crate defines the "language" spoken between the game server and
//! its browser clients:
//!
//! - **Types** ([`GameState`], [`Piece`], [`Rank`], [`Position`], etc.) —
//!   the game data model shared by every other crate.
//! - **Messages** ([`Envelope`], [`ClientMessage`], [`ServerMessage`]) —
//!   the tagged JSON frames that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how those frames are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]) — what can go wrong during
//!   encoding/decoding.
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Dispatcher → Rules / Placement / Session
//! ```
//!
//! Nothing here knows about connections or timers. The rule engine and
//! placement engine consume these types; they never produce bytes.

mod codec;
mod error;
mod messages;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use messages::{
    ClientMessage, Envelope, ErrorContext, MoveRequest, Notice,
    PlacementErrorReport, PlacementReady, PlacementSnapshot, PlacementUpdate,
    ServerMessage, SessionAssigned, SetName, StagedPieceSpec, TextMessage,
};
pub use types::{
    GameState, GameView, MatchId, Piece, PieceId, PieceView, PlacementStatus,
    PlayerId, PlayerInfo, Position, Rank, Team,
};
