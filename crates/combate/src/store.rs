//! The process-wide state owned by the core loop.

use combate_placement::PlacementEngine;
use combate_protocol::MatchId;
use combate_session::{
    AbandonmentExpired, ConnectionLifecycleManager, Phase, Session, SessionRegistry,
};
use combate_transport::ConnectionId;
use tokio::sync::mpsc;

use crate::ServerConfig;

/// Registry, lifecycle manager and placement engine, side by side.
///
/// Exactly one task owns the `Store`, so none of its parts need locks.
pub struct Store {
    pub registry: SessionRegistry,
    pub lifecycle: ConnectionLifecycleManager,
    pub engine: PlacementEngine,
    /// Connections left without a match by a teardown. The core loop
    /// closes them once their last messages are queued.
    closing: Vec<ConnectionId>,
}

impl Store {
    /// `expired_tx` is handed to the lifecycle manager's timer tasks.
    pub fn new(
        config: &ServerConfig,
        expired_tx: mpsc::UnboundedSender<AbandonmentExpired>,
    ) -> Self {
        Self {
            registry: SessionRegistry::new(config.setup),
            lifecycle: ConnectionLifecycleManager::new(config.lifecycle.clone(), expired_tx),
            engine: PlacementEngine::new(config.rate_limits.clone()),
            closing: Vec::new(),
        }
    }

    /// Removes a match everywhere: its pending timers, its index entries
    /// and tokens, and the rate-limit windows of its players. Players still
    /// connected are queued for closing.
    pub fn teardown(&mut self, match_id: MatchId) -> Option<Session> {
        self.lifecycle.cancel_match(match_id);
        let session = self.registry.teardown(match_id)?;
        if let Phase::Placement { states } = &session.phase {
            for state in states {
                self.engine.release(state);
            }
        }
        self.closing
            .extend(session.players.iter().filter_map(|player| player.connection));
        Some(session)
    }

    /// Drains the connections queued for closing.
    pub fn take_closing(&mut self) -> Vec<ConnectionId> {
        std::mem::take(&mut self.closing)
    }
}
