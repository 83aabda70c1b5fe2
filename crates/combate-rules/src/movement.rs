//! Move validation and the full turn transition.

use combate_protocol::{GameState, Piece, PieceId, PlayerId, Position, Rank, Team};

use crate::catalog::{self, Mobility};
use crate::combat::{CombatOutcome, resolve_combat};
use crate::{MoveError, board};

/// Checks whether `piece` may move to `target` given the pieces on the
/// board. Ownership and turn order are not checked here; see
/// [`apply_move`].
///
/// # Errors
/// Rejections are checked in this order: immobile rank, no movement,
/// off the board, diagonal, lake, friendly occupant, too far for the rank,
/// blocked scout path.
pub fn validate_move(
    piece: &Piece,
    target: Position,
    pieces: &[Piece],
) -> Result<(), MoveError> {
    let mobility = catalog::info(piece.rank).mobility;
    if mobility == Mobility::Immobile {
        return Err(MoveError::Immobile(piece.rank));
    }

    let origin = piece.position;
    if target == origin {
        return Err(MoveError::NoMovement);
    }
    if !board::in_bounds(target) {
        return Err(MoveError::OutOfBounds(target));
    }

    let d_row = target.row - origin.row;
    let d_col = target.col - origin.col;
    if d_row != 0 && d_col != 0 {
        return Err(MoveError::Diagonal);
    }
    if board::is_lake(target) {
        return Err(MoveError::Lake(target));
    }

    let occupant = pieces.iter().find(|p| p.position == target);
    if occupant.is_some_and(|p| p.team == piece.team) {
        return Err(MoveError::FriendlyOccupied(target));
    }

    let distance = d_row.abs() + d_col.abs();
    if distance > 1 {
        if mobility != Mobility::Line {
            return Err(MoveError::TooFar(piece.rank));
        }
        // Every cell strictly between origin and target must be free of
        // pieces. Lakes only matter as a destination.
        let step = Position::new(d_row.signum(), d_col.signum());
        for i in 1..distance {
            let cell = Position::new(origin.row + step.row * i, origin.col + step.col * i);
            if pieces.iter().any(|p| p.position == cell) {
                return Err(MoveError::PathBlocked(cell));
            }
        }
    }

    Ok(())
}

/// `true` if `team` has lost: no flag left, or nothing left that can move.
pub fn is_defeated(pieces: &[Piece], team: Team) -> bool {
    let mut has_flag = false;
    let mut has_mobile = false;
    for piece in pieces.iter().filter(|p| p.team == team) {
        match piece.rank {
            Rank::Flag => has_flag = true,
            Rank::Bomb => {}
            _ => has_mobile = true,
        }
    }
    !has_flag || !has_mobile
}

/// Plays one move and returns the next snapshot.
///
/// The input state is never modified; on error the caller keeps it as is.
/// On success the turn passes to the other player, combat participants
/// are revealed, and `finished`/`winner_id` are set if the mover has just
/// beaten the opponent.
///
/// # Errors
/// - [`MoveError::GameFinished`] — the game already has a result
/// - [`MoveError::UnknownPlayer`] — `requester` is not seated
/// - [`MoveError::PieceNotFound`] — no piece with that id on the board
/// - [`MoveError::NotYourPiece`] — the piece belongs to the other team
/// - [`MoveError::NotYourTurn`] — it is the opponent's turn
/// - any error from [`validate_move`]
pub fn apply_move(
    state: &GameState,
    piece_id: PieceId,
    target: Position,
    requester: PlayerId,
) -> Result<GameState, MoveError> {
    if state.finished {
        return Err(MoveError::GameFinished);
    }
    let mover = state
        .player(requester)
        .ok_or(MoveError::UnknownPlayer(requester))?;
    let piece = state
        .piece(piece_id)
        .ok_or(MoveError::PieceNotFound(piece_id))?;
    if piece.team != mover.team {
        return Err(MoveError::NotYourPiece);
    }
    if state.turn_player_id != requester {
        return Err(MoveError::NotYourTurn);
    }
    validate_move(piece, target, &state.pieces)?;

    let mover_team = mover.team;
    let mut next = state.clone();

    match state.piece_at(target).map(|p| (p.id, p.rank)) {
        Some((defender_id, defender_rank)) => {
            let outcome = resolve_combat(piece.rank, defender_rank);
            tracing::debug!(
                match_id = %state.match_id,
                attacker = %piece.rank,
                defender = %defender_rank,
                ?outcome,
                "combat"
            );
            match outcome {
                CombatOutcome::AttackerWins => {
                    next.pieces.retain(|p| p.id != defender_id);
                    if let Some(attacker) = next.pieces.iter_mut().find(|p| p.id == piece_id) {
                        attacker.position = target;
                        attacker.revealed = true;
                    }
                }
                CombatOutcome::DefenderWins => {
                    next.pieces.retain(|p| p.id != piece_id);
                    if let Some(defender) = next.pieces.iter_mut().find(|p| p.id == defender_id) {
                        defender.revealed = true;
                    }
                }
                CombatOutcome::Tie => {
                    next.pieces.retain(|p| p.id != piece_id && p.id != defender_id);
                }
            }
        }
        None => {
            if let Some(moving) = next.pieces.iter_mut().find(|p| p.id == piece_id) {
                moving.position = target;
            }
        }
    }

    if let Some(opponent) = state.players.iter().find(|p| p.id != requester) {
        next.turn_player_id = opponent.id;
    }

    if is_defeated(&next.pieces, mover_team.opponent()) {
        next.finished = true;
        next.winner_id = Some(requester);
        tracing::info!(
            match_id = %state.match_id,
            winner = %requester,
            "game finished"
        );
    }

    Ok(next)
}

// =========================================================================
// Tests
// =========================================================================
