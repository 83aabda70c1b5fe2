//! # Combate
//!
//! Authoritative server for a two-player, hidden-information board game
//! played on a 10×10 grid with eight lakes.
//!
//! The server pairs anonymous connections, runs a placement phase in
//! which each player deploys 40 pieces, then referees moves and combat
//! until one side loses its flag or every piece that can move. Each
//! player only ever sees the ranks of opposing pieces that combat has
//! revealed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use combate::prelude::*;
//!
//! # async fn start() -> Result<(), CombateError> {
//! let server = CombateServer::builder()
//!     .bind("0.0.0.0:8082")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```
//!
//! ## Layers
//!
//! | Crate | Role |
//! |---|---|
//! | `combate-protocol` | ids, board types, wire messages, codec |
//! | `combate-rules` | move legality, combat, victory |
//! | `combate-placement` | deployment staging and throttling |
//! | `combate-session` | matchmaking, reconnect tokens, abandonment |
//! | `combate-transport` | WebSocket connections |
//! | `combate` (this crate) | core loop, dispatcher, server |

mod config;
mod dispatcher;
mod error;
mod event_loop;
mod handler;
mod server;
mod store;

pub use config::{DEFAULT_BIND, ServerConfig};
pub use dispatcher::{Dispatcher, ErrorStatistics, Outbound, new_request_id};
pub use error::CombateError;
pub use server::{CombateServer, CombateServerBuilder};
pub use store::Store;

/// Everything needed to start a server and talk to it.
pub mod prelude {
    pub use crate::{CombateError, CombateServer, CombateServerBuilder, ServerConfig};
    pub use combate_placement::{RateLimit, RateLimits};
    pub use combate_protocol::{
        ClientMessage, Envelope, GameView, MatchId, PieceId, PlayerId, Position, Rank,
        ServerMessage, Team,
    };
    pub use combate_session::{DisconnectPolicy, LifecycleConfig, SetupMode};
}
