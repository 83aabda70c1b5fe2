//! Piece placement negotiation for Combate.
//!
//! Before a match becomes playable each player deploys their 40 pieces
//! on their own four rows. This crate owns that phase:
//!
//! 1. **State** — [`PlacementState`]: inventory, staged pieces, status
//! 2. **Engine** — [`PlacementEngine`]: decodes requests, applies them
//!    behind a [`RateLimiter`], journals rejections in an [`ErrorJournal`]
//! 3. **Promotion** — [`both_ready`] / [`promote`]: two confirmed
//!    deployments become the opening [`GameState`](combate_protocol::GameState)
//!
//! # How it fits in the stack
//!
//! ```text
//! Session layer (above)  ← owns one PlacementState per player
//!     ↕
//! Placement (this crate) ← validates edits, throttles, promotes
//!     ↕
//! Rules (below)          ← board geometry and the rank catalog
//! ```

mod engine;
mod error;
mod journal;
mod limiter;
mod state;

pub use engine::{PlacementEngine, PlacementOp, parse_rank};
pub use error::PlacementError;
pub use journal::{DEFAULT_JOURNAL_CAPACITY, ErrorJournal, ErrorRecord};
pub use limiter::{LimiterStats, OperationClass, RateLimit, RateLimiter, RateLimits};
pub use state::{PlacementState, both_ready, promote};
