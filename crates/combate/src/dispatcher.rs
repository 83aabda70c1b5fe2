//! Routes inbound events to the game layers and decides who hears what.
//!
//! The dispatcher is synchronous: every entry point takes one event,
//! mutates the [`Store`], and returns the envelopes to deliver. The core
//! loop does the encoding and the actual sends. That keeps every rule
//! about *who is told what* testable without a socket.
//!
//! ```text
//! on_connect ──→ reconnect? ──yes──→ snapshot to player, notice to opponent
//!                    │no
//!                    ▼
//!                 arrive ──→ waiting | match started
//! on_message ──→ SET_NAME | MOVE_PIECE | PLACEMENT_UPDATE | PLACEMENT_READY
//! on_close ───→ grace timer | immediate teardown
//! on_abandon_expired ──→ teardown if the timer is still current
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use combate_placement::{
    ErrorRecord, LimiterStats, PlacementEngine, PlacementError, PlacementOp, both_ready,
};
use combate_protocol::{
    ClientMessage, Envelope, ErrorContext, GameView, MatchId, MoveRequest, Notice,
    PlacementErrorReport, PlacementReady, PlacementStatus, PlacementUpdate, PlayerId,
    ServerMessage, SessionAssigned, TextMessage,
};
use combate_rules::apply_move;
use combate_session::{
    AbandonmentExpired, Arrival, Departure, DisconnectOutcome, PhaseKind, Session, SessionError,
    SessionRegistry,
};
use combate_transport::ConnectionId;
use rand::Rng;
use rand::distr::Alphanumeric;
use tokio::time::Instant;

use crate::Store;

const WAITING_TEXT: &str = "Waiting for an opponent...";
const INTERNAL_ERROR_TEXT: &str = "Internal server error. Please try again.";
const OPPONENT_DISCONNECTED_TEXT: &str = "Your opponent disconnected. The match is over.";

/// One envelope addressed to one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub conn: ConnectionId,
    pub envelope: Envelope<ServerMessage>,
}

impl Outbound {
    fn new(conn: ConnectionId, message: ServerMessage) -> Self {
        Self {
            conn,
            envelope: Envelope::new(message),
        }
    }

    fn with_player(mut self, player_id: PlayerId) -> Self {
        self.envelope = self.envelope.with_player(player_id);
        self
    }

    /// Stamps the match and the recipient onto the envelope.
    fn routed(mut self, match_id: MatchId, player_id: PlayerId) -> Self {
        self.envelope = self.envelope.with_match(match_id).with_player(player_id);
        self
    }
}

/// What the placement layer has been rejecting lately, plus match counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorStatistics {
    /// Newest last.
    pub recent_errors: Vec<ErrorRecord>,
    pub rate_limits: LimiterStats,
    pub placement_matches: usize,
    pub active_matches: usize,
}

/// The message-routing layer between the core loop and the [`Store`].
pub struct Dispatcher {
    store: Store,
}

impl Dispatcher {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    /// The `count` most recent placement rejections and the state of the
    /// rate limiter.
    pub fn error_statistics(&self, count: usize) -> ErrorStatistics {
        let Store {
            registry, engine, ..
        } = &self.store;
        ErrorStatistics {
            recent_errors: engine.journal().recent(count).cloned().collect(),
            rate_limits: engine.limiter().stats(),
            placement_matches: registry.count(PhaseKind::Placement),
            active_matches: registry.count(PhaseKind::Active),
        }
    }

    /// Clears the placement error journal and every rate-limit window.
    pub fn clear_error_data(&mut self) {
        self.store.engine.clear_error_data();
    }

    // -- Connections ---------------------------------------------------------

    /// A new connection, optionally presenting a reconnect token.
    ///
    /// A token that cannot be honoured is reported with a
    /// `SERVER_MESSAGE` and the connection then joins matchmaking like
    /// any other.
    pub fn on_connect(&mut self, conn: ConnectionId, token: Option<&str>) -> Vec<Outbound> {
        let mut out = Vec::new();
        if let Some(token) = token {
            match self.reconnect(conn, token) {
                Ok(restored) => return restored,
                Err(e) => {
                    tracing::info!(%conn, error = %e, "reconnection refused");
                    out.push(announce(
                        conn,
                        format!("Reconnection failed ({e}). Looking for a new match."),
                    ));
                }
            }
        }
        out.extend(self.arrive(conn));
        out
    }

    fn reconnect(
        &mut self,
        conn: ConnectionId,
        token: &str,
    ) -> Result<Vec<Outbound>, SessionError> {
        let Store {
            registry, lifecycle, ..
        } = &mut self.store;

        let player_id = registry
            .player_for_token(token)
            .ok_or(SessionError::InvalidToken)?;
        // Checked before the lifecycle manager is touched, so a refused
        // attempt leaves any running timer alone.
        if registry.connection_of(player_id).is_some() {
            return Err(SessionError::AlreadyConnected(player_id));
        }
        lifecycle.on_reconnect(player_id)?;
        let (match_id, _) = registry.reattach(token, conn)?;
        let session = registry
            .session(match_id)
            .ok_or(SessionError::MatchNotFound(match_id))?;

        let mut out = vec![session_assigned(conn, Some(match_id), player_id, token)];
        let opponent = connected_opponent(session, player_id);
        match session.kind() {
            PhaseKind::Placement => {
                if let Some(state) = session.placement(player_id) {
                    out.push(
                        Outbound::new(conn, ServerMessage::PlacementStatus(state.snapshot()))
                            .routed(match_id, player_id),
                    );
                }
                if let Some((opp_conn, opp_id)) = opponent {
                    out.push(
                        Outbound::new(
                            opp_conn,
                            ServerMessage::PlacementOpponentReconnected(notice(
                                "Your opponent is back.",
                            )),
                        )
                        .routed(match_id, opp_id),
                    );
                }
            }
            PhaseKind::Active | PhaseKind::Finished => {
                if let Some(view) = view_of(session, player_id) {
                    out.push(
                        Outbound::new(conn, ServerMessage::StateUpdate(view))
                            .routed(match_id, player_id),
                    );
                }
                if let Some((opp_conn, opp_id)) = opponent {
                    out.push(
                        announce(opp_conn, "Your opponent reconnected.").routed(match_id, opp_id),
                    );
                }
            }
        }
        Ok(out)
    }

    fn arrive(&mut self, conn: ConnectionId) -> Vec<Outbound> {
        match self.store.registry.arrive(conn) {
            Arrival::Waiting { player_id, token } => vec![
                session_assigned(conn, None, player_id, &token),
                announce(conn, WAITING_TEXT).with_player(player_id),
            ],
            Arrival::Paired {
                match_id,
                player_id,
                token,
            } => {
                let mut out = vec![session_assigned(conn, Some(match_id), player_id, &token)];
                match self.store.registry.session(match_id) {
                    Some(session) => out.extend(match_started(session)),
                    None => out.push(internal_error(conn, "paired match has no session")),
                }
                out
            }
        }
    }

    /// A connection closed.
    ///
    /// Pending players simply vanish. A seated player's match either
    /// waits for them (grace period) or ends on the spot, depending on
    /// the policy for its phase.
    pub fn on_close(&mut self, conn: ConnectionId) -> Vec<Outbound> {
        let Store {
            registry, lifecycle, ..
        } = &mut self.store;

        let Departure::Seated {
            match_id,
            player_id,
        } = registry.release_connection(conn)
        else {
            return Vec::new();
        };
        let Some(session) = registry.session(match_id) else {
            return Vec::new();
        };
        let kind = session.kind();
        let opponent = connected_opponent(session, player_id);

        match lifecycle.on_disconnect(match_id, player_id, kind) {
            DisconnectOutcome::Grace(grace) => {
                let Some((opp_conn, opp_id)) = opponent else {
                    return Vec::new();
                };
                let text = format!(
                    "Your opponent disconnected. Waiting {} seconds for them to return.",
                    grace.as_secs()
                );
                let outbound = match kind {
                    PhaseKind::Placement => Outbound::new(
                        opp_conn,
                        ServerMessage::PlacementOpponentDisconnected(notice(text)),
                    ),
                    PhaseKind::Active | PhaseKind::Finished => announce(opp_conn, text),
                };
                vec![outbound.routed(match_id, opp_id)]
            }
            DisconnectOutcome::AbandonNow => {
                self.store.teardown(match_id);
                opponent
                    .map(|(opp_conn, opp_id)| {
                        abandonment_notice(opp_conn, kind, OPPONENT_DISCONNECTED_TEXT)
                            .routed(match_id, opp_id)
                    })
                    .into_iter()
                    .collect()
            }
        }
    }

    /// An abandonment timer fired.
    ///
    /// Stale events (the player came back, or the match is already gone)
    /// produce nothing.
    pub fn on_abandon_expired(&mut self, event: AbandonmentExpired) -> Vec<Outbound> {
        if !self.store.lifecycle.take_expired(&event) {
            return Vec::new();
        }
        let notify = self.store.registry.session(event.match_id).and_then(|session| {
            connected_opponent(session, event.player_id).map(|opp| (opp, session.kind()))
        });
        self.store.teardown(event.match_id);

        notify
            .map(|((opp_conn, opp_id), kind)| {
                abandonment_notice(opp_conn, kind, "Your opponent left the match.")
                    .routed(event.match_id, opp_id)
            })
            .into_iter()
            .collect()
    }

    // -- Messages ------------------------------------------------------------

    /// A decoded inbound envelope.
    ///
    /// Messages from a connection with no player behind it (for example
    /// one whose match was torn down) are dropped.
    pub fn on_message(
        &mut self,
        conn: ConnectionId,
        envelope: Envelope<ClientMessage>,
    ) -> Vec<Outbound> {
        let Some(player_id) = self.store.registry.player_for_connection(conn) else {
            tracing::debug!(%conn, "message from unbound connection dropped");
            return Vec::new();
        };
        let claimed = envelope.match_id;

        match envelope.message {
            ClientMessage::SetName(request) => self.set_name(conn, player_id, &request.name),
            ClientMessage::MovePiece(request) => self.move_piece(conn, player_id, claimed, request),
            ClientMessage::PlacementUpdate(update) => {
                self.placement_update(conn, player_id, claimed, update)
            }
            ClientMessage::PlacementReady(ready) => {
                self.placement_ready(conn, player_id, claimed, ready)
            }
        }
    }

    fn set_name(&mut self, conn: ConnectionId, player_id: PlayerId, name: &str) -> Vec<Outbound> {
        let registry = &mut self.store.registry;
        match registry.rename(player_id, name) {
            Ok(name) => {
                tracing::info!(%player_id, %name, "player renamed");
                match registry.session_of(player_id) {
                    Some(session) if session.game().is_some() => {
                        state_updates(session, ServerMessage::StateUpdate)
                    }
                    _ => {
                        let text = format!("You are now known as {name}.");
                        vec![announce(conn, text).with_player(player_id)]
                    }
                }
            }
            Err(e) => vec![announce(conn, format!("Name rejected: {e}")).with_player(player_id)],
        }
    }

    fn move_piece(
        &mut self,
        conn: ConnectionId,
        player_id: PlayerId,
        claimed: Option<MatchId>,
        request: MoveRequest,
    ) -> Vec<Outbound> {
        let registry = &mut self.store.registry;
        let Some(match_id) = registry.match_of(player_id) else {
            return vec![move_error(conn, "You are not in a match.")];
        };
        if let Some(claimed) = claimed.filter(|claimed| *claimed != match_id) {
            let text = format!("match {claimed} not found");
            return vec![move_error(conn, text).routed(match_id, player_id)];
        }
        let Some(session) = registry.session_mut(match_id) else {
            return vec![internal_error(conn, "indexed match has no session")];
        };
        let Some(game) = session.game() else {
            return vec![
                move_error(conn, "The game has not started yet.").routed(match_id, player_id),
            ];
        };

        match apply_move(game, request.piece_id, request.target, player_id) {
            Ok(next) => {
                let finished = next.finished;
                if finished {
                    tracing::info!(%match_id, winner = ?next.winner_id, "game finished");
                }
                session.set_game(next);
                let out = state_updates(session, ServerMessage::StateUpdate);
                // The final state is the last thing either player receives.
                if finished {
                    self.store.teardown(match_id);
                }
                out
            }
            Err(e) => {
                tracing::debug!(%match_id, %player_id, error = %e, "move rejected");
                vec![move_error(conn, e.to_string()).routed(match_id, player_id)]
            }
        }
    }

    fn placement_update(
        &mut self,
        conn: ConnectionId,
        player_id: PlayerId,
        claimed: Option<MatchId>,
        update: PlacementUpdate,
    ) -> Vec<Outbound> {
        let current = self.store.registry.match_of(player_id);
        let op = match PlacementOp::from_update(&update) {
            Ok(op) => op,
            Err(e) => {
                let engine = &mut self.store.engine;
                return vec![placement_error(engine, conn, player_id, current, "update", e)];
            }
        };
        let Store {
            registry, engine, ..
        } = &mut self.store;

        let result = placement_session(registry, player_id, claimed).and_then(|session| {
            let match_id = session.id;
            let (own, _) = session
                .placement_pair_mut(player_id)
                .map_err(placement_phase_error)?;
            engine.apply(own, op)?;
            Ok(vec![
                Outbound::new(conn, ServerMessage::PlacementStatus(own.snapshot()))
                    .routed(match_id, player_id),
            ])
        });
        result.unwrap_or_else(|e| {
            vec![placement_error(engine, conn, player_id, current, op.name(), e)]
        })
    }

    fn placement_ready(
        &mut self,
        conn: ConnectionId,
        player_id: PlayerId,
        claimed: Option<MatchId>,
        ready: PlacementReady,
    ) -> Vec<Outbound> {
        let current = self.store.registry.match_of(player_id);
        let Store {
            registry, engine, ..
        } = &mut self.store;

        let result = placement_session(registry, player_id, claimed).and_then(|session| {
            let match_id = session.id;
            let (own, opponent) = session
                .placement_pair_mut(player_id)
                .map_err(placement_phase_error)?;
            engine.confirm(own, ready.all_pieces.as_deref())?;
            opponent.set_opponent_status(PlacementStatus::Ready);

            if both_ready(own, opponent) {
                engine.release(own);
                engine.release(opponent);
                session.promote_if_ready()?;
                return Ok(match_started(session));
            }

            let own_status = Outbound::new(conn, ServerMessage::PlacementStatus(own.snapshot()))
                .routed(match_id, player_id);
            let opponent_id = opponent.player_id();
            let opponent_snapshot = opponent.snapshot();
            let mut out = vec![own_status];
            if let Some(opp_conn) = session.player(opponent_id).and_then(|p| p.connection) {
                out.push(
                    Outbound::new(opp_conn, ServerMessage::PlacementStatus(opponent_snapshot))
                        .routed(match_id, opponent_id),
                );
            }
            Ok(out)
        });
        result.unwrap_or_else(|e| {
            vec![placement_error(engine, conn, player_id, current, "confirm", e)]
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A random request id, `req_<unix millis>_<9 alphanumerics>`.
pub fn new_request_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let suffix: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(9)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("req_{millis}_{suffix}")
}

/// The session a placement request is about.
fn placement_session<'a>(
    registry: &'a mut SessionRegistry,
    player_id: PlayerId,
    claimed: Option<MatchId>,
) -> Result<&'a mut Session, PlacementError> {
    let Some(match_id) = registry.match_of(player_id) else {
        return Err(match claimed {
            Some(claimed) => PlacementError::MatchNotFound(claimed),
            None => PlacementError::PlayerNotFound(player_id),
        });
    };
    if let Some(claimed) = claimed.filter(|claimed| *claimed != match_id) {
        return Err(PlacementError::MatchNotFound(claimed));
    }
    registry
        .session_mut(match_id)
        .ok_or_else(|| {
            PlacementError::Internal(format!("match {match_id} indexed without a session"))
        })
}

fn placement_phase_error(error: SessionError) -> PlacementError {
    match error {
        SessionError::WrongPhase(_) => PlacementError::WrongPhase,
        SessionError::NotFound(player_id) => PlacementError::PlayerNotFound(player_id),
        other => PlacementError::Internal(other.to_string()),
    }
}

/// Journals a rejected placement request and builds the reply.
fn placement_error(
    engine: &mut PlacementEngine,
    conn: ConnectionId,
    player_id: PlayerId,
    match_id: Option<MatchId>,
    operation: &str,
    error: PlacementError,
) -> Outbound {
    let request_id = new_request_id();
    engine.record_error(ErrorRecord {
        code: error.code(),
        message: error.to_string(),
        match_id,
        player_id,
        operation: operation.to_string(),
        request_id: request_id.clone(),
        at: Instant::now(),
    });
    if let PlacementError::Internal(detail) = &error {
        return internal_error(conn, detail);
    }
    tracing::debug!(
        %player_id,
        code = error.code(),
        operation,
        %request_id,
        error = %error,
        "placement rejected"
    );
    let report = PlacementErrorReport {
        code: error.code().to_string(),
        message: error.to_string(),
        user_message: error.user_message().to_string(),
        context: ErrorContext {
            match_id,
            player_id,
            operation: operation.to_string(),
            request_id,
            retry_after_ms: error.retry_after_ms(),
        },
    };
    let outbound = Outbound::new(conn, ServerMessage::PlacementError(report));
    match match_id {
        Some(match_id) => outbound.routed(match_id, player_id),
        None => outbound.with_player(player_id),
    }
}

/// Logs a broken invariant; the requester only learns that something
/// went wrong.
fn internal_error(conn: ConnectionId, detail: &str) -> Outbound {
    tracing::error!(%conn, detail, "internal error while dispatching");
    announce(conn, INTERNAL_ERROR_TEXT)
}

fn announce(conn: ConnectionId, text: impl Into<String>) -> Outbound {
    Outbound::new(conn, ServerMessage::Announcement(TextMessage { text: text.into() }))
}

fn notice(message: impl Into<String>) -> Notice {
    Notice {
        message: message.into(),
    }
}

fn move_error(conn: ConnectionId, message: impl Into<String>) -> Outbound {
    Outbound::new(conn, ServerMessage::MoveError(notice(message)))
}

fn session_assigned(
    conn: ConnectionId,
    match_id: Option<MatchId>,
    player_id: PlayerId,
    token: &str,
) -> Outbound {
    let outbound = Outbound::new(
        conn,
        ServerMessage::SessionAssigned(SessionAssigned {
            player_id,
            reconnect_token: token.to_string(),
        }),
    );
    match match_id {
        Some(match_id) => outbound.routed(match_id, player_id),
        None => outbound.with_player(player_id),
    }
}

/// Placement-phase matches hear about abandonment through the placement
/// channel; running games through a plain announcement.
fn abandonment_notice(conn: ConnectionId, kind: PhaseKind, text: &str) -> Outbound {
    match kind {
        PhaseKind::Placement => Outbound::new(
            conn,
            ServerMessage::PlacementOpponentAbandoned(notice(text)),
        ),
        PhaseKind::Active | PhaseKind::Finished => announce(conn, text),
    }
}

fn connected_opponent(session: &Session, player_id: PlayerId) -> Option<(ConnectionId, PlayerId)> {
    let opponent = session.opponent(player_id)?;
    opponent.connection.map(|conn| (conn, opponent.id()))
}

fn view_of(session: &Session, player_id: PlayerId) -> Option<GameView> {
    let team = session.player(player_id)?.info.team;
    Some(session.game()?.view_for(team))
}

/// One game view per connected player, wrapped by `wrap`.
fn state_updates(session: &Session, wrap: fn(GameView) -> ServerMessage) -> Vec<Outbound> {
    let Some(game) = session.game() else {
        return Vec::new();
    };
    session
        .players
        .iter()
        .filter_map(|player| {
            let conn = player.connection?;
            Some(
                Outbound::new(conn, wrap(game.view_for(player.info.team)))
                    .routed(session.id, player.id()),
            )
        })
        .collect()
}

/// What both players receive when a match enters its first playable
/// phase: placement status during placement, `GAME_START` otherwise.
fn match_started(session: &Session) -> Vec<Outbound> {
    if session.kind() != PhaseKind::Placement {
        return state_updates(session, ServerMessage::GameStart);
    }
    let mut out = Vec::new();
    for player in &session.players {
        let (Some(conn), Some(state)) = (player.connection, session.placement(player.id())) else {
            continue;
        };
        let opponent_name = session
            .opponent(player.id())
            .map(|p| p.info.display_name.as_str())
            .unwrap_or("unknown");
        out.push(
            announce(
                conn,
                format!(
                    "Matched against {opponent_name}. You play {}: deploy your pieces.",
                    player.info.team
                ),
            )
            .routed(session.id, player.id()),
        );
        out.push(
            Outbound::new(conn, ServerMessage::PlacementStatus(state.snapshot()))
                .routed(session.id, player.id()),
        );
    }
    out
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use combate_protocol::{
        GameState, Piece, PieceId, Position, Rank, SetName, StagedPieceSpec, Team,
    };
    use combate_rules::{board, catalog};
    use combate_session::SetupMode;
    use tokio::sync::mpsc;

    use super::*;
    use crate::ServerConfig;

    const RED: ConnectionId = ConnectionId::new(1);
    const BLUE: ConnectionId = ConnectionId::new(2);

    fn dispatcher(setup: SetupMode) -> (Dispatcher, mpsc::UnboundedReceiver<AbandonmentExpired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = ServerConfig {
            setup,
            ..ServerConfig::default()
        };
        (Dispatcher::new(Store::new(&config, tx)), rx)
    }

    struct Pair {
        match_id: MatchId,
        red: PlayerId,
        blue: PlayerId,
        blue_token: String,
    }

    fn pair(d: &mut Dispatcher) -> Pair {
        let (red, _) = assigned(&d.on_connect(RED, None));
        let (blue, blue_token) = assigned(&d.on_connect(BLUE, None));
        let match_id = d.store().registry.match_of(red).expect("paired");
        Pair {
            match_id,
            red,
            blue,
            blue_token,
        }
    }

    fn assigned(out: &[Outbound]) -> (PlayerId, String) {
        out.iter()
            .find_map(|o| match &o.envelope.message {
                ServerMessage::SessionAssigned(a) => Some((a.player_id, a.reconnect_token.clone())),
                _ => None,
            })
            .expect("SESSION_ASSIGNED")
    }

    fn to(out: &[Outbound], conn: ConnectionId) -> Vec<&ServerMessage> {
        out.iter()
            .filter(|o| o.conn == conn)
            .map(|o| &o.envelope.message)
            .collect()
    }

    /// The single message addressed to `conn`.
    fn only(out: &[Outbound], conn: ConnectionId) -> &ServerMessage {
        let messages = to(out, conn);
        assert_eq!(messages.len(), 1, "expected one message for {conn}: {messages:?}");
        messages[0]
    }

    fn send(d: &mut Dispatcher, conn: ConnectionId, message: ClientMessage) -> Vec<Outbound> {
        d.on_message(conn, Envelope::new(message))
    }

    fn place(rank: &str, row: i32, col: i32) -> ClientMessage {
        ClientMessage::PlacementUpdate(PlacementUpdate {
            rank: Some(rank.into()),
            position: Some(Position::new(row, col)),
            ..PlacementUpdate::default()
        })
    }

    fn ready_with_army(team: Team) -> ClientMessage {
        let all_pieces = catalog::army()
            .into_iter()
            .zip(board::home_cells(team))
            .map(|(rank, position)| StagedPieceSpec {
                rank: rank.as_str().to_string(),
                position,
            })
            .collect();
        ClientMessage::PlacementReady(PlacementReady {
            all_pieces: Some(all_pieces),
        })
    }

    fn error_report(message: &ServerMessage) -> &PlacementErrorReport {
        match message {
            ServerMessage::PlacementError(report) => report,
            other => panic!("expected PLACEMENT_ERROR, got {other:?}"),
        }
    }

    fn piece(id: u64, rank: Rank, team: Team, row: i32, col: i32) -> Piece {
        Piece {
            id: PieceId(id),
            rank,
            team,
            position: Position::new(row, col),
            revealed: false,
        }
    }

    /// Replaces the random deployment with a tiny known board.
    fn small_board(d: &mut Dispatcher, pair: &Pair) {
        let session = d.store_mut().registry.session_mut(pair.match_id).unwrap();
        let game = GameState {
            match_id: pair.match_id,
            players: session.player_infos(),
            pieces: vec![
                piece(9001, Rank::Scout, Team::Red, 6, 0),
                piece(9002, Rank::Flag, Team::Red, 9, 9),
                piece(9003, Rank::Flag, Team::Blue, 0, 0),
                piece(9004, Rank::Miner, Team::Blue, 0, 9),
            ],
            turn_player_id: pair.red,
            finished: false,
            winner_id: None,
        };
        session.set_game(game);
    }

    fn move_piece(id: u64, row: i32, col: i32) -> ClientMessage {
        ClientMessage::MovePiece(MoveRequest {
            piece_id: PieceId(id),
            target: Position::new(row, col),
        })
    }

    // -- Matchmaking --------------------------------------------------------

    #[tokio::test]
    async fn test_on_connect_first_arrival_waits() {
        let (mut d, _rx) = dispatcher(SetupMode::Placement);
        let out = d.on_connect(RED, None);

        let messages = to(&out, RED);
        assert!(matches!(messages[0], ServerMessage::SessionAssigned(_)));
        assert_eq!(
            messages[1],
            &ServerMessage::Announcement(TextMessage {
                text: WAITING_TEXT.into()
            })
        );
        assert!(d.store().registry.is_empty());
    }

    #[tokio::test]
    async fn test_on_connect_second_arrival_starts_placement_for_both() {
        let (mut d, _rx) = dispatcher(SetupMode::Placement);
        d.on_connect(RED, None);
        let out = d.on_connect(BLUE, None);

        for (conn, team) in [(RED, Team::Red), (BLUE, Team::Blue)] {
            let status = to(&out, conn)
                .into_iter()
                .find_map(|m| match m {
                    ServerMessage::PlacementStatus(s) => Some(s),
                    _ => None,
                })
                .expect("PLACEMENT_STATUS");
            assert_eq!(status.team, team);
            assert_eq!(status.status, PlacementStatus::Placing);
            assert_eq!(status.remaining_inventory.values().sum::<u32>(), 40);
        }
        assert_eq!(d.store().registry.len(), 1);
    }

    #[tokio::test]
    async fn test_on_connect_unknown_token_falls_back_to_fresh_arrival() {
        let (mut d, _rx) = dispatcher(SetupMode::Placement);
        let out = d.on_connect(RED, Some("not-a-token"));

        let messages = to(&out, RED);
        let ServerMessage::Announcement(TextMessage { text }) = messages[0] else {
            panic!("expected SERVER_MESSAGE first");
        };
        assert!(text.starts_with("Reconnection failed"));
        assert!(matches!(messages[1], ServerMessage::SessionAssigned(_)));
        assert!(d.store().registry.pending().is_some());
    }

    #[tokio::test]
    async fn test_on_message_set_name_trims_and_confirms() {
        let (mut d, _rx) = dispatcher(SetupMode::Placement);
        d.on_connect(RED, None);
        let out = send(
            &mut d,
            RED,
            ClientMessage::SetName(SetName {
                name: "  Ana ".into(),
            }),
        );
        assert_eq!(
            to(&out, RED),
            vec![&ServerMessage::Announcement(TextMessage {
                text: "You are now known as Ana.".into()
            })]
        );
        assert_eq!(d.store().registry.pending().unwrap().info.display_name, "Ana");
    }

    // -- Placement ----------------------------------------------------------

    #[tokio::test]
    async fn test_on_message_placement_update_returns_status_to_sender_only() {
        let (mut d, _rx) = dispatcher(SetupMode::Placement);
        let pair = pair(&mut d);

        let out = send(&mut d, RED, place("flag", 9, 0));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].envelope.match_id, Some(pair.match_id));
        assert_eq!(out[0].envelope.player_id, Some(pair.red));
        let ServerMessage::PlacementStatus(status) = &out[0].envelope.message else {
            panic!("expected PLACEMENT_STATUS");
        };
        assert_eq!(status.staged_pieces.len(), 1);
        assert_eq!(status.remaining_inventory[&Rank::Flag], 0);
    }

    #[tokio::test]
    async fn test_on_message_placement_outside_home_rows_returns_p4001() {
        let (mut d, _rx) = dispatcher(SetupMode::Placement);
        let pair = pair(&mut d);

        let out = send(&mut d, RED, place("flag", 0, 0));
        let report = error_report(&out[0].envelope.message);
        assert_eq!(report.code, "P4001");
        assert_eq!(report.context.operation, "place");
        assert_eq!(report.context.player_id, pair.red);
        assert_eq!(report.context.match_id, Some(pair.match_id));
        assert!(report.context.request_id.starts_with("req_"));
        assert_eq!(report.context.retry_after_ms, None);
    }

    #[tokio::test]
    async fn test_error_statistics_journals_rejections_with_request_id() {
        let (mut d, _rx) = dispatcher(SetupMode::Placement);
        let pair = pair(&mut d);
        send(&mut d, RED, place("marshal", 6, 0));

        let out = send(&mut d, RED, place("flag", 0, 0));
        let report = error_report(&out[0].envelope.message);
        let out = send(&mut d, RED, place("dragon", 6, 1));
        let second = error_report(&out[0].envelope.message);

        let stats = d.error_statistics(50);
        assert_eq!(stats.placement_matches, 1);
        assert_eq!(stats.active_matches, 0);
        assert_eq!(stats.rate_limits.players, 1);
        assert_eq!(stats.recent_errors.len(), 2);
        let first = &stats.recent_errors[0];
        assert_eq!(first.code, "P4001");
        assert_eq!(first.request_id, report.context.request_id);
        assert_eq!(first.player_id, pair.red);
        assert_eq!(first.match_id, Some(pair.match_id));
        assert_eq!(first.operation, "place");
        assert_eq!(stats.recent_errors[1].code, "P4007");
        assert_eq!(stats.recent_errors[1].operation, "update");
        assert_eq!(stats.recent_errors[1].request_id, second.context.request_id);

        assert_eq!(d.error_statistics(1).recent_errors.len(), 1);
        d.clear_error_data();
        let stats = d.error_statistics(50);
        assert!(stats.recent_errors.is_empty());
        assert_eq!(stats.rate_limits.windows, 0);
    }

    #[tokio::test]
    async fn test_on_message_placement_update_without_piece_returns_p4002() {
        let (mut d, _rx) = dispatcher(SetupMode::Placement);
        pair(&mut d);

        let update = ClientMessage::PlacementUpdate(PlacementUpdate {
            position: Some(Position::new(9, 0)),
            ..PlacementUpdate::default()
        });
        let out = send(&mut d, RED, update);
        let report = error_report(&out[0].envelope.message);
        assert_eq!(report.code, "P4002");
        assert_eq!(report.context.operation, "update");
    }

    #[tokio::test]
    async fn test_on_message_placement_for_other_match_returns_p4103() {
        let (mut d, _rx) = dispatcher(SetupMode::Placement);
        pair(&mut d);

        let envelope = Envelope::new(place("flag", 9, 0)).with_match(MatchId(u64::MAX));
        let out = d.on_message(RED, envelope);
        assert_eq!(error_report(&out[0].envelope.message).code, "P4103");
    }

    #[tokio::test]
    async fn test_on_message_first_ready_tells_opponent() {
        let (mut d, _rx) = dispatcher(SetupMode::Placement);
        pair(&mut d);

        let out = send(&mut d, RED, ready_with_army(Team::Red));
        let ServerMessage::PlacementStatus(own) = only(&out, RED) else {
            panic!("expected one PLACEMENT_STATUS for red");
        };
        assert_eq!(own.status, PlacementStatus::Ready);
        assert_eq!(own.staged_pieces.len(), 40);

        let ServerMessage::PlacementStatus(other) = only(&out, BLUE) else {
            panic!("expected one PLACEMENT_STATUS for blue");
        };
        assert_eq!(other.status, PlacementStatus::Placing);
        assert_eq!(other.opponent_status, PlacementStatus::Ready);
    }

    #[tokio::test]
    async fn test_on_message_both_ready_sends_game_start_with_hidden_ranks() {
        let (mut d, _rx) = dispatcher(SetupMode::Placement);
        let pair = pair(&mut d);

        send(&mut d, RED, ready_with_army(Team::Red));
        let out = send(&mut d, BLUE, ready_with_army(Team::Blue));

        for (conn, team) in [(RED, Team::Red), (BLUE, Team::Blue)] {
            let ServerMessage::GameStart(view) = only(&out, conn) else {
                panic!("expected GAME_START");
            };
            assert_eq!(view.your_team, team);
            assert_eq!(view.turn_player_id, pair.red);
            assert_eq!(view.pieces.len(), 80);
            assert!(view.pieces.iter().all(|p| (p.team == team) == p.rank.is_some()));
        }
        let session = d.store().registry.session(pair.match_id).unwrap();
        assert_eq!(session.kind(), PhaseKind::Active);
        // Placement windows are released once the game starts.
        assert_eq!(d.store().engine.limiter().stats().players, 0);
    }

    #[tokio::test]
    async fn test_on_message_confirmation_flood_is_rate_limited() {
        let (mut d, _rx) = dispatcher(SetupMode::Placement);
        pair(&mut d);
        let empty = || ClientMessage::PlacementReady(PlacementReady::default());

        for _ in 0..10 {
            let out = send(&mut d, RED, empty());
            assert_eq!(error_report(&out[0].envelope.message).code, "P4003");
        }
        let out = send(&mut d, RED, empty());
        let report = error_report(&out[0].envelope.message);
        assert_eq!(report.code, "P4301");
        assert_eq!(report.context.operation, "confirm");
        assert!(report.context.retry_after_ms.is_some_and(|ms| ms > 0));
    }

    #[tokio::test]
    async fn test_on_message_move_during_placement_returns_move_error() {
        let (mut d, _rx) = dispatcher(SetupMode::Placement);
        pair(&mut d);

        let out = send(&mut d, RED, move_piece(1, 5, 0));
        assert!(matches!(out[0].envelope.message, ServerMessage::MoveError(_)));
    }

    // -- Active game --------------------------------------------------------

    #[tokio::test]
    async fn test_on_connect_instant_mode_starts_game_for_both() {
        let (mut d, _rx) = dispatcher(SetupMode::Instant);
        d.on_connect(RED, None);
        let out = d.on_connect(BLUE, None);

        assert!(matches!(to(&out, RED)[..], [ServerMessage::GameStart(_)]));
        assert!(matches!(
            to(&out, BLUE)[..],
            [ServerMessage::SessionAssigned(_), ServerMessage::GameStart(_)]
        ));
    }

    #[tokio::test]
    async fn test_on_message_moves_alternate_until_flag_captured() {
        let (mut d, _rx) = dispatcher(SetupMode::Instant);
        let pair = pair(&mut d);
        small_board(&mut d, &pair);

        // Scout runs up the open first column.
        let out = send(&mut d, RED, move_piece(9001, 1, 0));
        let ServerMessage::StateUpdate(blue_view) = only(&out, BLUE) else {
            panic!("expected STATE_UPDATE for blue");
        };
        let scout = blue_view.pieces.iter().find(|p| p.id == PieceId(9001)).unwrap();
        assert_eq!(scout.position, Position::new(1, 0));
        assert_eq!(scout.rank, None);
        assert_eq!(blue_view.turn_player_id, pair.blue);

        let out = send(&mut d, RED, move_piece(9001, 0, 0));
        assert_eq!(
            to(&out, RED),
            vec![&ServerMessage::MoveError(Notice {
                message: "not your turn".into()
            })]
        );

        send(&mut d, BLUE, move_piece(9004, 1, 9));
        let out = send(&mut d, RED, move_piece(9001, 0, 0));
        let ServerMessage::StateUpdate(red_view) = only(&out, RED) else {
            panic!("expected STATE_UPDATE for red");
        };
        assert!(red_view.finished);
        assert_eq!(red_view.winner_id, Some(pair.red));
        let ServerMessage::StateUpdate(blue_view) = only(&out, BLUE) else {
            panic!("expected final STATE_UPDATE for blue");
        };
        assert_eq!(blue_view.winner_id, Some(pair.red));

        // The finished match is gone and both sockets are queued for closing.
        assert!(d.store().registry.is_empty());
        assert_eq!(d.store_mut().take_closing(), vec![RED, BLUE]);
        assert!(send(&mut d, BLUE, move_piece(9004, 2, 9)).is_empty());
    }

    #[tokio::test]
    async fn test_on_message_set_name_in_game_broadcasts_state() {
        let (mut d, _rx) = dispatcher(SetupMode::Instant);
        let pair = pair(&mut d);

        let out = send(
            &mut d,
            BLUE,
            ClientMessage::SetName(SetName { name: "Bia".into() }),
        );
        assert_eq!(out.len(), 2);
        for o in &out {
            let ServerMessage::StateUpdate(view) = &o.envelope.message else {
                panic!("expected STATE_UPDATE");
            };
            let blue = view.players.iter().find(|p| p.id == pair.blue).unwrap();
            assert_eq!(blue.display_name, "Bia");
        }
    }

    // -- Disconnects --------------------------------------------------------

    #[tokio::test]
    async fn test_on_close_active_game_tears_down_immediately() {
        let (mut d, _rx) = dispatcher(SetupMode::Instant);
        pair(&mut d);

        let out = d.on_close(RED);
        assert!(matches!(to(&out, BLUE)[..], [ServerMessage::Announcement(_)]));
        assert!(d.store().registry.is_empty());
        assert_eq!(d.store_mut().take_closing(), vec![BLUE]);
        assert!(send(&mut d, BLUE, move_piece(1, 5, 0)).is_empty());
        // The survivor's own close is a no-op.
        assert!(d.on_close(BLUE).is_empty());
    }

    #[tokio::test]
    async fn test_on_close_pending_player_clears_slot() {
        let (mut d, _rx) = dispatcher(SetupMode::Placement);
        d.on_connect(RED, None);
        assert!(d.on_close(RED).is_empty());
        assert!(d.store().registry.pending().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_connect_with_token_during_grace_restores_placement() {
        let (mut d, _rx) = dispatcher(SetupMode::Placement);
        let pair = pair(&mut d);
        send(&mut d, BLUE, place("bomb", 0, 4));

        let out = d.on_close(BLUE);
        assert!(matches!(
            to(&out, RED)[..],
            [ServerMessage::PlacementOpponentDisconnected(_)]
        ));

        tokio::time::advance(Duration::from_secs(60)).await;
        let rejoined = ConnectionId::new(3);
        let out = d.on_connect(rejoined, Some(&pair.blue_token));

        let messages = to(&out, rejoined);
        assert!(matches!(messages[0], ServerMessage::SessionAssigned(_)));
        let ServerMessage::PlacementStatus(status) = messages[1] else {
            panic!("expected PLACEMENT_STATUS");
        };
        assert_eq!(status.staged_pieces.len(), 1);
        assert_eq!(status.staged_pieces[0].rank, Rank::Bomb);
        assert!(matches!(
            to(&out, RED)[..],
            [ServerMessage::PlacementOpponentReconnected(_)]
        ));
        assert_eq!(d.store().lifecycle.pending_timers(), 0);
        assert_eq!(d.store().registry.player_for_connection(rejoined), Some(pair.blue));
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_abandon_expired_tears_down_and_notifies_opponent() {
        let (mut d, mut rx) = dispatcher(SetupMode::Placement);
        let pair = pair(&mut d);

        d.on_close(BLUE);
        tokio::time::advance(Duration::from_secs(300)).await;
        let event = rx.recv().await.expect("timer fired");
        assert_eq!(event.player_id, pair.blue);

        let out = d.on_abandon_expired(event);
        assert!(matches!(
            to(&out, RED)[..],
            [ServerMessage::PlacementOpponentAbandoned(_)]
        ));
        assert!(d.store().registry.is_empty());

        // The token died with the match.
        let out = d.on_connect(ConnectionId::new(3), Some(&pair.blue_token));
        assert!(matches!(out[0].envelope.message, ServerMessage::Announcement(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_abandon_expired_stale_event_is_ignored() {
        let (mut d, _rx) = dispatcher(SetupMode::Placement);
        let pair = pair(&mut d);

        d.on_close(BLUE);
        d.on_connect(ConnectionId::new(3), Some(&pair.blue_token));

        let stale = AbandonmentExpired {
            match_id: pair.match_id,
            player_id: pair.blue,
            timer_id: 1,
        };
        assert!(d.on_abandon_expired(stale).is_empty());
        assert!(d.store().registry.session(pair.match_id).is_some());
    }

    // -- Helpers ------------------------------------------------------------

    #[test]
    fn test_new_request_id_format() {
        let id = new_request_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "req");
        assert!(parts[1].parse::<u128>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2].chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_ne!(new_request_id(), id);
    }
}
