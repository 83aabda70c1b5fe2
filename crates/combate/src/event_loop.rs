//! The core event loop: the only task that touches game state.
//!
//! Connection tasks and timer tasks never share memory with it. They
//! send events:
//!
//! ```text
//!  connection tasks ──CoreEvent──┐
//!                                ├──→ run_core ──→ Dispatcher ──→ outboxes
//!  abandonment timers ──Expired──┘
//! ```
//!
//! Each event is processed to completion before the next is received.
//! Dropping a connection's outbox tells its task to close the socket once
//! the queued frames are written.

use std::collections::HashMap;
use std::time::Duration;

use combate_protocol::{ClientMessage, Codec, Envelope};
use combate_session::AbandonmentExpired;
use combate_transport::ConnectionId;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::dispatcher::{Dispatcher, Outbound};

/// How often the core loop logs its statistics.
const STATS_INTERVAL: Duration = Duration::from_secs(300);

/// Sender half of a connection's outbound queue.
pub(crate) type Outbox = mpsc::UnboundedSender<Vec<u8>>;

/// What a connection task reports to the core.
#[derive(Debug)]
pub(crate) enum CoreEvent {
    Connected {
        conn: ConnectionId,
        token: Option<String>,
        outbox: Outbox,
    },
    Message {
        conn: ConnectionId,
        data: Vec<u8>,
    },
    Closed {
        conn: ConnectionId,
    },
}

/// Runs until every connection-event sender is gone.
pub(crate) async fn run_core<C: Codec>(
    mut dispatcher: Dispatcher,
    codec: C,
    mut events: mpsc::UnboundedReceiver<CoreEvent>,
    mut expired: mpsc::UnboundedReceiver<AbandonmentExpired>,
) {
    let mut outboxes: HashMap<ConnectionId, Outbox> = HashMap::new();
    let mut stats = tokio::time::interval_at(Instant::now() + STATS_INTERVAL, STATS_INTERVAL);
    stats.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let outbound = tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    CoreEvent::Connected { conn, token, outbox } => {
                        outboxes.insert(conn, outbox);
                        dispatcher.on_connect(conn, token.as_deref())
                    }
                    CoreEvent::Message { conn, data } => {
                        match codec.decode::<Envelope<ClientMessage>>(&data) {
                            Ok(envelope) => dispatcher.on_message(conn, envelope),
                            Err(e) => {
                                tracing::debug!(%conn, error = %e, "dropping malformed message");
                                Vec::new()
                            }
                        }
                    }
                    CoreEvent::Closed { conn } => {
                        outboxes.remove(&conn);
                        dispatcher.on_close(conn)
                    }
                }
            }
            Some(expiry) = expired.recv() => dispatcher.on_abandon_expired(expiry),
            _ = stats.tick() => {
                log_statistics(&dispatcher, outboxes.len());
                continue;
            }
        };
        deliver(&codec, &outboxes, outbound);
        for conn in dispatcher.store_mut().take_closing() {
            tracing::debug!(%conn, "closing connection after teardown");
            outboxes.remove(&conn);
        }
    }

    tracing::info!("core loop stopped");
}

fn log_statistics(dispatcher: &Dispatcher, connections: usize) {
    let stats = dispatcher.error_statistics(10);
    let recent_codes: Vec<&str> = stats.recent_errors.iter().map(|r| r.code).collect();
    tracing::info!(
        connections,
        placement_matches = stats.placement_matches,
        active_matches = stats.active_matches,
        abandonment_timers = dispatcher.store().lifecycle.pending_timers(),
        tracked_players = stats.rate_limits.players,
        journaled_errors = dispatcher.store().engine.journal().len(),
        ?recent_codes,
        "core statistics"
    );
}

/// Encodes and queues each envelope. Envelopes for connections that are
/// already gone are dropped.
fn deliver<C: Codec>(
    codec: &C,
    outboxes: &HashMap<ConnectionId, Outbox>,
    outbound: Vec<Outbound>,
) {
    for Outbound { conn, envelope } in outbound {
        let Some(outbox) = outboxes.get(&conn) else {
            tracing::trace!(%conn, "recipient already disconnected");
            continue;
        };
        match codec.encode(&envelope) {
            // A closed receiver means the connection task is exiting; its
            // `Closed` event is already on the way.
            Ok(bytes) => {
                let _ = outbox.send(bytes);
            }
            Err(e) => tracing::error!(%conn, error = %e, "failed to encode outbound message"),
        }
    }
}
