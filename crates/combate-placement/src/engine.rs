//! The placement engine: decodes placement requests into operations and
//! applies them behind the rate limiter.

use combate_protocol::{PieceId, PlacementUpdate, Position, Rank, StagedPieceSpec};

use crate::journal::{ErrorJournal, ErrorRecord};
use crate::limiter::{OperationClass, RateLimiter, RateLimits};
use crate::{PlacementError, PlacementState};

/// A decoded `PLACEMENT_UPDATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementOp {
    Place { rank: Rank, position: Position },
    Move { piece_id: PieceId, position: Position },
    Remove { piece_id: PieceId },
}

impl PlacementOp {
    /// Interprets the optional fields of an update.
    ///
    /// `pieceId` wins over `rank`, matching how clients drag an existing
    /// piece while the palette still shows its rank.
    pub fn from_update(update: &PlacementUpdate) -> Result<Self, PlacementError> {
        match (update.piece_id, update.rank.as_deref(), update.position) {
            (Some(piece_id), _, _) if update.remove => Ok(Self::Remove { piece_id }),
            (Some(piece_id), _, Some(position)) => Ok(Self::Move { piece_id, position }),
            (None, Some(rank), Some(position)) => Ok(Self::Place {
                rank: parse_rank(rank)?,
                position,
            }),
            (None, None, _) => Err(PlacementError::MissingPiece),
            _ => Err(PlacementError::MissingPosition),
        }
    }

    /// Name used in error contexts and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Place { .. } => "place",
            Self::Move { .. } => "move",
            Self::Remove { .. } => "remove",
        }
    }

    fn class(&self) -> OperationClass {
        match self {
            Self::Place { .. } => OperationClass::Placement,
            Self::Move { .. } | Self::Remove { .. } => OperationClass::Movement,
        }
    }
}

/// Parses a wire rank identifier into a catalog rank.
pub fn parse_rank(raw: &str) -> Result<Rank, PlacementError> {
    raw.parse()
        .map_err(|_| PlacementError::InvalidRank(raw.to_string()))
}

/// Applies placement operations on behalf of players, throttled per
/// player and operation class.
///
/// The engine holds no placement states itself; the session that owns
/// the states passes them in. That keeps a single owner for each
/// `PlacementState` and lets the engine be shared by every match.
#[derive(Debug)]
pub struct PlacementEngine {
    limiter: RateLimiter,
    journal: ErrorJournal,
}

impl PlacementEngine {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limiter: RateLimiter::new(limits),
            journal: ErrorJournal::default(),
        }
    }

    /// Applies one edit to `state`.
    ///
    /// # Errors
    /// `RateLimited` before anything else, then whatever the operation
    /// itself rejects. The state is unchanged on error.
    pub fn apply(
        &mut self,
        state: &mut PlacementState,
        op: PlacementOp,
    ) -> Result<(), PlacementError> {
        self.throttle(state, op.class())?;
        match op {
            PlacementOp::Place { rank, position } => state.place(rank, position).map(|_| ()),
            PlacementOp::Move { piece_id, position } => state.move_piece(piece_id, position),
            PlacementOp::Remove { piece_id } => state.remove(piece_id).map(|_| ()),
        }
    }

    /// Confirms the deployment, optionally replacing it first with a
    /// complete list sent by the client.
    ///
    /// If the replacement list is rejected nothing changes; if the list is
    /// accepted but incomplete the new staging is kept and the completion
    /// error returned.
    pub fn confirm(
        &mut self,
        state: &mut PlacementState,
        all_pieces: Option<&[StagedPieceSpec]>,
    ) -> Result<(), PlacementError> {
        self.throttle(state, OperationClass::Confirmation)?;

        if let Some(specs) = all_pieces {
            let pieces = specs
                .iter()
                .map(|spec| Ok((parse_rank(&spec.rank)?, spec.position)))
                .collect::<Result<Vec<_>, PlacementError>>()?;
            state.replace_all(&pieces)?;
        }
        state.confirm()
    }

    /// Drops rate-limit windows of a player who left.
    pub fn release(&mut self, state: &PlacementState) {
        self.limiter.forget(state.player_id());
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Journals a rejection reported to a client.
    pub fn record_error(&mut self, record: ErrorRecord) {
        self.journal.record(record);
    }

    pub fn journal(&self) -> &ErrorJournal {
        &self.journal
    }

    /// Forgets journaled errors and every rate-limit window.
    pub fn clear_error_data(&mut self) {
        self.journal.clear();
        self.limiter.clear();
        tracing::info!("placement error data cleared");
    }

    fn throttle(
        &mut self,
        state: &PlacementState,
        class: OperationClass,
    ) -> Result<(), PlacementError> {
        self.limiter
            .check(state.player_id(), class)
            .map_err(|retry_after| PlacementError::RateLimited { retry_after })
    }
}

impl Default for PlacementEngine {
    fn default() -> Self {
        Self::new(RateLimits::default())
    }
}
