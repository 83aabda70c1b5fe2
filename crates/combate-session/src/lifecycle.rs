//! Connection lifecycle: disconnect records and abandonment timers.
//!
//! Per seated player:
//!
//! ```text
//!   Connected ──(close)──→ Disconnected ──(timer fires)──→ Abandoned
//!       ↑                       │
//!       └─────(reconnect)───────┘
//! ```
//!
//! Timers are Tokio tasks that sleep for the grace period and then send
//! an [`AbandonmentExpired`] event back to the core loop over an mpsc
//! channel. They never touch session state themselves: the core loop
//! processes the event like any other and asks
//! [`take_expired`](ConnectionLifecycleManager::take_expired) whether it
//! is still current. A timer cancelled by reconnection or teardown is
//! aborted; one whose event was already queued is recognized as stale by
//! its timer id and ignored.

use std::collections::HashMap;
use std::time::Duration;

use combate_protocol::{MatchId, PlayerId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::{DisconnectPolicy, LifecycleConfig, PhaseKind, SessionError};

/// Sent by a timer task when a grace period runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbandonmentExpired {
    pub match_id: MatchId,
    pub player_id: PlayerId,
    pub timer_id: u64,
}

/// What the caller should do after a seated player disconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectOutcome {
    /// A timer is running; tell the opponent and wait.
    Grace(Duration),
    /// No grace for this phase; tear the match down now.
    AbandonNow,
}

#[derive(Debug, Clone, Copy)]
struct DisconnectRecord {
    match_id: MatchId,
    since: Instant,
    grace: Duration,
}

#[derive(Debug)]
struct PendingTimer {
    id: u64,
    handle: JoinHandle<()>,
}

/// Tracks disconnected players and owns their abandonment timers.
///
/// Not thread-safe; owned by the core loop alongside the registry.
pub struct ConnectionLifecycleManager {
    config: LifecycleConfig,
    disconnected: HashMap<PlayerId, DisconnectRecord>,
    timers: HashMap<(MatchId, PlayerId), PendingTimer>,
    next_timer_id: u64,
    expired_tx: mpsc::UnboundedSender<AbandonmentExpired>,
}

impl ConnectionLifecycleManager {
    /// `expired_tx` is where timer tasks report expiry; the core loop
    /// holds the receiving end.
    pub fn new(
        config: LifecycleConfig,
        expired_tx: mpsc::UnboundedSender<AbandonmentExpired>,
    ) -> Self {
        Self {
            config,
            disconnected: HashMap::new(),
            timers: HashMap::new(),
            next_timer_id: 1,
            expired_tx,
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Records a disconnect and applies the phase's policy.
    ///
    /// Must be called from within a Tokio runtime when the policy has a
    /// grace period, since it spawns the timer task.
    pub fn on_disconnect(
        &mut self,
        match_id: MatchId,
        player_id: PlayerId,
        phase: PhaseKind,
    ) -> DisconnectOutcome {
        let grace = match self.config.policy_for(phase) {
            DisconnectPolicy::Immediate => {
                tracing::info!(
                    %match_id,
                    %player_id,
                    phase = phase.as_str(),
                    "player left, no grace"
                );
                return DisconnectOutcome::AbandonNow;
            }
            DisconnectPolicy::GracePeriod(grace) => grace,
        };

        let since = Instant::now();
        self.disconnected.insert(
            player_id,
            DisconnectRecord {
                match_id,
                since,
                grace,
            },
        );

        let timer_id = self.next_timer_id;
        self.next_timer_id += 1;
        let tx = self.expired_tx.clone();
        // Deadline fixed here, not when the task is first polled.
        let deadline = since + grace;
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            // The receiver is gone only when the server is shutting down.
            let _ = tx.send(AbandonmentExpired {
                match_id,
                player_id,
                timer_id,
            });
        });

        if let Some(old) = self.timers.insert(
            (match_id, player_id),
            PendingTimer {
                id: timer_id,
                handle,
            },
        ) {
            old.handle.abort();
        }

        tracing::info!(
            %match_id,
            %player_id,
            grace_secs = grace.as_secs(),
            "player disconnected, grace period started"
        );
        DisconnectOutcome::Grace(grace)
    }

    /// Ends a player's disconnect: cancels their timer and returns the
    /// match they belong to.
    ///
    /// # Errors
    /// - [`SessionError::NotDisconnected`] — no disconnect on record
    /// - [`SessionError::SessionExpired`] — the grace period has already
    ///   elapsed; the pending expiry event will tear the match down
    pub fn on_reconnect(&mut self, player_id: PlayerId) -> Result<MatchId, SessionError> {
        let record = *self
            .disconnected
            .get(&player_id)
            .ok_or(SessionError::NotDisconnected(player_id))?;

        if record.since.elapsed() >= record.grace {
            return Err(SessionError::SessionExpired(player_id));
        }

        self.disconnected.remove(&player_id);
        if let Some(timer) = self.timers.remove(&(record.match_id, player_id)) {
            timer.handle.abort();
        }
        tracing::info!(
            match_id = %record.match_id,
            %player_id,
            "player reconnected, timer cancelled"
        );
        Ok(record.match_id)
    }

    /// Consumes an expiry event.
    ///
    /// Returns `true` if the event belongs to the timer currently pending
    /// for that player, in which case the match must be torn down.
    /// Returns `false` for stale events (the player reconnected, the
    /// match was already torn down, or a newer timer replaced this one).
    pub fn take_expired(&mut self, event: &AbandonmentExpired) -> bool {
        let key = (event.match_id, event.player_id);
        match self.timers.get(&key) {
            Some(timer) if timer.id == event.timer_id => {
                self.timers.remove(&key);
                self.disconnected.remove(&event.player_id);
                tracing::info!(
                    match_id = %event.match_id,
                    player_id = %event.player_id,
                    "grace period elapsed, match abandoned"
                );
                true
            }
            _ => {
                tracing::debug!(
                    match_id = %event.match_id,
                    player_id = %event.player_id,
                    timer_id = event.timer_id,
                    "ignoring stale abandonment timer"
                );
                false
            }
        }
    }

    /// Cancels every timer and record belonging to a match. Called on
    /// every teardown path.
    pub fn cancel_match(&mut self, match_id: MatchId) {
        self.timers.retain(|(timer_match, _), timer| {
            if *timer_match == match_id {
                timer.handle.abort();
                false
            } else {
                true
            }
        });
        self.disconnected.retain(|_, record| record.match_id != match_id);
    }

    pub fn is_disconnected(&self, player_id: PlayerId) -> bool {
        self.disconnected.contains_key(&player_id)
    }

    /// Number of timers currently pending.
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }
}

// =========================================================================
// Tests
// =========================================================================
