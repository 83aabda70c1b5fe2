//! Session types: one match between two seated players.
//!
//! A session moves through three phases:
//!
//! ```text
//!   Placement ──(both ready)──→ Active ──(victory)──→ Finished
//! ```
//!
//! (With `SetupMode::Instant` a session is born `Active`.)

use combate_placement::{PlacementError, PlacementState, both_ready, promote};
use combate_protocol::{GameState, MatchId, PlayerId, PlayerInfo};
use combate_transport::ConnectionId;

use crate::SessionError;

/// A player known to the server: seated in a session or waiting for one.
#[derive(Debug, Clone)]
pub struct Player {
    pub info: PlayerInfo,

    /// The connection currently bound to this player. `None` while the
    /// player is disconnected and the match waits for them.
    pub connection: Option<ConnectionId>,

    /// Secret the client presents to rebind a new connection.
    /// A 32-character hex string (128 bits of randomness).
    pub reconnect_token: String,
}

impl Player {
    pub fn id(&self) -> PlayerId {
        self.info.id
    }
}

/// Which phase a session is in, without the phase data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    Placement,
    Active,
    Finished,
}

impl PhaseKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PhaseKind::Placement => "placement",
            PhaseKind::Active => "active",
            PhaseKind::Finished => "finished",
        }
    }
}

/// Phase data. `states[i]` belongs to `players[i]`.
#[derive(Debug, Clone)]
pub enum Phase {
    Placement { states: [PlacementState; 2] },
    Active { game: GameState },
    Finished { game: GameState },
}

/// One match.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: MatchId,
    /// Seat 0 is Red and moves first; seat 1 is Blue.
    pub players: [Player; 2],
    pub phase: Phase,
}

impl Session {
    pub fn kind(&self) -> PhaseKind {
        match self.phase {
            Phase::Placement { .. } => PhaseKind::Placement,
            Phase::Active { .. } => PhaseKind::Active,
            Phase::Finished { .. } => PhaseKind::Finished,
        }
    }

    /// The seat index (0 or 1) of a player.
    pub fn seat(&self, player: PlayerId) -> Option<usize> {
        self.players.iter().position(|p| p.id() == player)
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id() == id)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id() == id)
    }

    /// The other seated player.
    pub fn opponent(&self, id: PlayerId) -> Option<&Player> {
        self.seat(id).map(|seat| &self.players[1 - seat])
    }

    pub fn player_infos(&self) -> [PlayerInfo; 2] {
        [self.players[0].info.clone(), self.players[1].info.clone()]
    }

    /// The game snapshot, once placement is over.
    pub fn game(&self) -> Option<&GameState> {
        match &self.phase {
            Phase::Active { game } | Phase::Finished { game } => Some(game),
            Phase::Placement { .. } => None,
        }
    }

    /// A player's placement state, during placement.
    pub fn placement(&self, player: PlayerId) -> Option<&PlacementState> {
        let seat = self.seat(player)?;
        match &self.phase {
            Phase::Placement { states } => Some(&states[seat]),
            _ => None,
        }
    }

    /// `(own, opponent)` placement states for a seated player.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`] — the player is not seated here
    /// - [`SessionError::WrongPhase`] — placement is over
    pub fn placement_pair_mut(
        &mut self,
        player: PlayerId,
    ) -> Result<(&mut PlacementState, &mut PlacementState), SessionError> {
        let seat = self.seat(player).ok_or(SessionError::NotFound(player))?;
        let kind = self.kind();
        match &mut self.phase {
            Phase::Placement { states } => {
                let [a, b] = states;
                Ok(if seat == 0 { (a, b) } else { (b, a) })
            }
            _ => Err(SessionError::WrongPhase(kind.as_str())),
        }
    }

    /// Moves the session to `Active` once both deployments are confirmed.
    ///
    /// Returns `Ok(true)` when the transition happened, `Ok(false)` when
    /// at least one player is still placing.
    pub fn promote_if_ready(&mut self) -> Result<bool, PlacementError> {
        let Phase::Placement { states } = &self.phase else {
            return Ok(false);
        };
        if !both_ready(&states[0], &states[1]) {
            return Ok(false);
        }
        let game = promote(&states[0], &states[1], self.player_infos())?;
        tracing::info!(match_id = %self.id, "placement complete, game active");
        self.phase = Phase::Active { game };
        Ok(true)
    }

    /// Stores the snapshot produced by an accepted move.
    pub fn set_game(&mut self, game: GameState) {
        self.phase = if game.finished {
            Phase::Finished { game }
        } else {
            Phase::Active { game }
        };
    }

    /// Updates a player's display name everywhere it is shown.
    pub(crate) fn rename(&mut self, player: PlayerId, name: &str) -> Result<(), SessionError> {
        let seated = self.player_mut(player).ok_or(SessionError::NotFound(player))?;
        seated.info.display_name = name.to_string();
        if let Phase::Active { game } | Phase::Finished { game } = &mut self.phase {
            if let Some(info) = game.players.iter_mut().find(|p| p.id == player) {
                info.display_name = name.to_string();
            }
        }
        Ok(())
    }
}
