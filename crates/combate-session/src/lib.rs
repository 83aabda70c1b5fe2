//! Matchmaking and session management for Combate.
//!
//! This crate tracks who is playing whom and what happens when a
//! connection goes away:
//!
//! 1. **Matchmaking** — [`SessionRegistry::arrive`] pairs connections
//!    two by two (first = red, second = blue)
//! 2. **Sessions** — [`Session`] holds both players and the match phase
//!    (placement, active, finished)
//! 3. **Lifecycle** — [`ConnectionLifecycleManager`] decides between
//!    waiting for a reconnection and abandoning the match, with
//!    cancellable per-player timers
//!
//! # How it fits in the stack
//!
//! ```text
//! Dispatcher (above)       ← asks who a connection is and which match they're in
//!     ↕
//! Session (this crate)     ← pairing, reconnect tokens, abandonment
//!     ↕
//! Placement / Rules (below) ← phase data
//! ```

mod config;
mod error;
mod lifecycle;
mod registry;
mod session;

pub use config::{DisconnectPolicy, LifecycleConfig, SetupMode};
pub use error::SessionError;
pub use lifecycle::{AbandonmentExpired, ConnectionLifecycleManager, DisconnectOutcome};
pub use registry::{Arrival, Departure, MAX_NAME_LEN, SessionRegistry};
pub use session::{Phase, PhaseKind, Player, Session};
