//! Unified error type for the Combate server.
//!
//! Only failures that end a task surface here. Rejected moves and
//! placements never do: the dispatcher turns them into `MOVE_ERROR` and
//! `PLACEMENT_ERROR` replies.

use combate_transport::TransportError;

/// Top-level error that wraps the errors a server task can die of.
///
/// Malformed frames are logged and dropped by the core loop, so the
/// transport is the only layer that can fail a task.
#[derive(Debug, thiserror::Error)]
pub enum CombateError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),
}
