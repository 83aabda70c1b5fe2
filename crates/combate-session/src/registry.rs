//! The session registry and matchmaker.
//!
//! Tracks every player the server knows about and pairs new arrivals:
//!
//! ```text
//! arrive(A) ──→ pending = A
//! arrive(B) ──→ Session { players: [A (red), B (blue)] }   pending = ∅
//! ```
//!
//! # Concurrency note
//!
//! `SessionRegistry` is NOT thread-safe — plain `HashMap`s, owned by the
//! server's single core task. All mutation happens one event at a time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use combate_placement::PlacementState;
use combate_protocol::{MatchId, PlayerId, PlayerInfo, Team};
use combate_rules::random_deployment;
use combate_transport::ConnectionId;
use rand::Rng;

use crate::{Phase, PhaseKind, Player, Session, SessionError, SetupMode};

/// Counter for generating unique player IDs.
static NEXT_PLAYER_ID: AtomicU64 = AtomicU64::new(1);

/// Counter for generating unique match IDs.
static NEXT_MATCH_ID: AtomicU64 = AtomicU64::new(1);

/// Longest accepted display name, in characters.
pub const MAX_NAME_LEN: usize = 24;

/// What happened to a new connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arrival {
    /// No one was waiting; this player now holds the pending slot.
    Waiting { player_id: PlayerId, token: String },
    /// Paired with the pending player; a new match exists.
    Paired {
        match_id: MatchId,
        player_id: PlayerId,
        token: String,
    },
}

/// What a closed connection was attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// The connection never had a player (or was already released).
    Unknown,
    /// The waiting player left; the pending slot is empty again.
    PendingCleared(PlayerId),
    /// A seated player dropped; their session stays until the lifecycle
    /// manager decides otherwise.
    Seated {
        match_id: MatchId,
        player_id: PlayerId,
    },
}

/// All sessions, the pending slot, and the indices that find them.
pub struct SessionRegistry {
    /// The single unpaired player, if any.
    pending: Option<Player>,

    sessions: HashMap<MatchId, Session>,

    /// Seated player → their match.
    player_matches: HashMap<PlayerId, MatchId>,

    /// Bound connection → player. Kept in sync with `Player::connection`.
    connections: HashMap<ConnectionId, PlayerId>,

    /// Reconnect token → player, for seated players only.
    tokens: HashMap<String, PlayerId>,

    setup: SetupMode,
}

impl SessionRegistry {
    pub fn new(setup: SetupMode) -> Self {
        Self {
            pending: None,
            sessions: HashMap::new(),
            player_matches: HashMap::new(),
            connections: HashMap::new(),
            tokens: HashMap::new(),
            setup,
        }
    }

    // -- Matchmaking --------------------------------------------------------

    /// Registers a new connection as a fresh player and pairs it if
    /// someone is waiting.
    ///
    /// The first player of a pair plays Red, the second Blue.
    pub fn arrive(&mut self, conn: ConnectionId) -> Arrival {
        let player_id = PlayerId(NEXT_PLAYER_ID.fetch_add(1, Ordering::Relaxed));
        let token = generate_token();
        self.connections.insert(conn, player_id);

        let Some(first) = self.pending.take() else {
            self.pending = Some(new_player(player_id, Team::Red, conn, token.clone()));
            tracing::info!(%player_id, %conn, "player waiting for opponent");
            return Arrival::Waiting { player_id, token };
        };

        let second = new_player(player_id, Team::Blue, conn, token.clone());
        let match_id = MatchId(NEXT_MATCH_ID.fetch_add(1, Ordering::Relaxed));
        let session = self.open_session(match_id, [first, second]);

        for player in &session.players {
            self.player_matches.insert(player.id(), match_id);
            self.tokens.insert(player.reconnect_token.clone(), player.id());
        }
        tracing::info!(
            %match_id,
            red = %session.players[0].id(),
            blue = %session.players[1].id(),
            phase = session.kind().as_str(),
            "match created"
        );
        self.sessions.insert(match_id, session);

        Arrival::Paired {
            match_id,
            player_id,
            token,
        }
    }

    fn open_session(&self, match_id: MatchId, players: [Player; 2]) -> Session {
        let phase = match self.setup {
            SetupMode::Placement => Phase::Placement {
                states: [
                    PlacementState::new(match_id, players[0].id(), players[0].info.team),
                    PlacementState::new(match_id, players[1].id(), players[1].info.team),
                ],
            },
            SetupMode::Instant => {
                let infos = [players[0].info.clone(), players[1].info.clone()];
                Phase::Active {
                    game: random_deployment(match_id, infos, &mut rand::rng()),
                }
            }
        };
        Session {
            id: match_id,
            players,
            phase,
        }
    }

    /// The player waiting for an opponent.
    pub fn pending(&self) -> Option<&Player> {
        self.pending.as_ref()
    }

    // -- Connections --------------------------------------------------------

    /// The player bound to a connection.
    pub fn player_for_connection(&self, conn: ConnectionId) -> Option<PlayerId> {
        self.connections.get(&conn).copied()
    }

    /// The connection bound to a player, pending or seated.
    pub fn connection_of(&self, player: PlayerId) -> Option<ConnectionId> {
        if let Some(pending) = self.pending.as_ref().filter(|p| p.id() == player) {
            return pending.connection;
        }
        self.session_of(player)?.player(player)?.connection
    }

    /// Detaches a closed connection from whatever it was bound to.
    pub fn release_connection(&mut self, conn: ConnectionId) -> Departure {
        let Some(player_id) = self.connections.remove(&conn) else {
            return Departure::Unknown;
        };

        if self.pending.as_ref().is_some_and(|p| p.id() == player_id) {
            self.pending = None;
            tracing::info!(%player_id, "pending player left before pairing");
            return Departure::PendingCleared(player_id);
        }

        let Some(&match_id) = self.player_matches.get(&player_id) else {
            return Departure::Unknown;
        };
        if let Some(player) = self
            .sessions
            .get_mut(&match_id)
            .and_then(|s| s.player_mut(player_id))
        {
            player.connection = None;
        }
        Departure::Seated {
            match_id,
            player_id,
        }
    }

    /// The seated player a reconnect token belongs to.
    pub fn player_for_token(&self, token: &str) -> Option<PlayerId> {
        self.tokens.get(token).copied()
    }

    /// Binds a new connection to the seated player owning `token`.
    ///
    /// # Errors
    /// - [`SessionError::InvalidToken`] — unknown token or torn-down match
    /// - [`SessionError::AlreadyConnected`] — the player still has a live
    ///   connection
    pub fn reattach(
        &mut self,
        token: &str,
        conn: ConnectionId,
    ) -> Result<(MatchId, PlayerId), SessionError> {
        let player_id = self.player_for_token(token).ok_or(SessionError::InvalidToken)?;
        let match_id = *self
            .player_matches
            .get(&player_id)
            .ok_or(SessionError::InvalidToken)?;
        let player = self
            .sessions
            .get_mut(&match_id)
            .and_then(|s| s.player_mut(player_id))
            .ok_or(SessionError::InvalidToken)?;

        if player.connection.is_some() {
            return Err(SessionError::AlreadyConnected(player_id));
        }
        player.connection = Some(conn);
        self.connections.insert(conn, player_id);
        tracing::info!(%match_id, %player_id, %conn, "player reattached");
        Ok((match_id, player_id))
    }

    // -- Lookup -------------------------------------------------------------

    pub fn session(&self, match_id: MatchId) -> Option<&Session> {
        self.sessions.get(&match_id)
    }

    pub fn session_mut(&mut self, match_id: MatchId) -> Option<&mut Session> {
        self.sessions.get_mut(&match_id)
    }

    pub fn match_of(&self, player: PlayerId) -> Option<MatchId> {
        self.player_matches.get(&player).copied()
    }

    pub fn session_of(&self, player: PlayerId) -> Option<&Session> {
        self.sessions.get(self.player_matches.get(&player)?)
    }

    pub fn session_of_mut(&mut self, player: PlayerId) -> Option<&mut Session> {
        let match_id = self.player_matches.get(&player)?;
        self.sessions.get_mut(match_id)
    }

    // -- Mutation -----------------------------------------------------------

    /// Sets a player's display name, pending or seated.
    ///
    /// # Errors
    /// - [`SessionError::InvalidName`] — empty after trimming, or longer
    ///   than [`MAX_NAME_LEN`] characters
    /// - [`SessionError::NotFound`] — unknown player
    pub fn rename(&mut self, player: PlayerId, name: &str) -> Result<String, SessionError> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            return Err(SessionError::InvalidName(name.to_string()));
        }

        if let Some(pending) = self.pending.as_mut().filter(|p| p.id() == player) {
            pending.info.display_name = name.to_string();
            return Ok(name.to_string());
        }
        self.session_of_mut(player)
            .ok_or(SessionError::NotFound(player))?
            .rename(player, name)?;
        Ok(name.to_string())
    }

    /// Removes a session and every index entry pointing into it.
    ///
    /// Returns the removed session so the caller can notify players and
    /// release per-player resources.
    pub fn teardown(&mut self, match_id: MatchId) -> Option<Session> {
        let session = self.sessions.remove(&match_id)?;
        for player in &session.players {
            self.player_matches.remove(&player.id());
            self.tokens.remove(&player.reconnect_token);
            if let Some(conn) = player.connection {
                self.connections.remove(&conn);
            }
        }
        tracing::info!(%match_id, "match torn down");
        Some(session)
    }

    /// Number of live sessions in the given phase.
    pub fn count(&self, kind: PhaseKind) -> usize {
        self.sessions.values().filter(|s| s.kind() == kind).count()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

fn new_player(id: PlayerId, team: Team, conn: ConnectionId, token: String) -> Player {
    Player {
        info: PlayerInfo {
            id,
            display_name: format!("Player {}", id.0),
            team,
        },
        connection: Some(conn),
        reconnect_token: token,
    }
}

/// Generates a random 32-character hex string (128 bits of entropy).
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// =========================================================================
// Tests
// =========================================================================
