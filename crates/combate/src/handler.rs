//! Per-connection task: shuttles frames between the socket and the core.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Register with the core (`Connected`, with the `?token=` if any)
//!   2. Loop: forward inbound frames, write queued outbound frames
//!   3. Close the socket if the core drops the outbox (match torn down)
//!   4. Report `Closed` (from a drop guard, so it also fires on panic)

use combate_transport::{Connection, ConnectionId, WebSocketConnection};
use tokio::sync::mpsc;

use crate::CombateError;
use crate::event_loop::CoreEvent;

/// Drop guard that reports the connection as closed when the handler
/// exits, however it exits.
struct CloseGuard {
    conn: ConnectionId,
    events: mpsc::UnboundedSender<CoreEvent>,
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        let _ = self.events.send(CoreEvent::Closed { conn: self.conn });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    conn: WebSocketConnection,
    events: mpsc::UnboundedSender<CoreEvent>,
) -> Result<(), CombateError> {
    let conn_id = conn.id();
    let (outbox, mut queued) = mpsc::unbounded_channel::<Vec<u8>>();
    tracing::debug!(%conn_id, "handling new connection");

    let registered = events.send(CoreEvent::Connected {
        conn: conn_id,
        token: conn.reconnect_token().map(str::to_owned),
        outbox,
    });
    if registered.is_err() {
        tracing::warn!(%conn_id, "core loop is gone, dropping connection");
        return Ok(());
    }
    let _guard = CloseGuard {
        conn: conn_id,
        events: events.clone(),
    };

    loop {
        tokio::select! {
            frame = conn.recv() => match frame {
                Ok(Some(data)) => {
                    if events.send(CoreEvent::Message { conn: conn_id, data }).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    tracing::info!(%conn_id, "connection closed cleanly");
                    break;
                }
                Err(e) => {
                    tracing::debug!(%conn_id, error = %e, "recv error");
                    return Err(e.into());
                }
            },
            bytes = queued.recv() => match bytes {
                Some(bytes) => conn.send(&bytes).await?,
                None => {
                    tracing::info!(%conn_id, "match over, closing connection");
                    conn.close().await?;
                    break;
                }
            },
        }
    }

    // _guard drops here → Closed reaches the core.
    Ok(())
}
