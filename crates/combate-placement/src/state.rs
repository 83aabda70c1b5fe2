//! Per-player placement state and its transitions.
//!
//! A `PlacementState` tracks one player's deployment while the match is
//! in the placement phase:
//!
//! ```text
//!   Placing ──(confirm: complete & valid)──→ Ready
//!      ↑  │
//!      └──┘ place / move / remove / replace_all
//! ```
//!
//! Invariant: `sum(remaining) + staged.len() == 40` after every
//! operation, successful or not. Failed operations leave the state
//! untouched.

use std::collections::BTreeMap;

use combate_protocol::{
    GameState, MatchId, Piece, PieceId, PlacementSnapshot, PlacementStatus, PlayerId,
    PlayerInfo, Position, Rank, Team,
};
use combate_rules::{board, catalog, conceal_order, next_piece_id};

use crate::PlacementError;

/// One player's deployment in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementState {
    match_id: MatchId,
    player_id: PlayerId,
    team: Team,
    remaining: BTreeMap<Rank, u32>,
    staged: Vec<Piece>,
    local_status: PlacementStatus,
    opponent_status: PlacementStatus,
}

impl PlacementState {
    /// Fresh state: full inventory, nothing staged, both sides placing.
    pub fn new(match_id: MatchId, player_id: PlayerId, team: Team) -> Self {
        Self {
            match_id,
            player_id,
            team,
            remaining: catalog::composition(),
            staged: Vec::with_capacity(catalog::ARMY_SIZE as usize),
            local_status: PlacementStatus::Placing,
            opponent_status: PlacementStatus::Placing,
        }
    }

    // -- Accessors ----------------------------------------------------------

    pub fn match_id(&self) -> MatchId {
        self.match_id
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub fn team(&self) -> Team {
        self.team
    }

    pub fn staged(&self) -> &[Piece] {
        &self.staged
    }

    pub fn remaining(&self) -> &BTreeMap<Rank, u32> {
        &self.remaining
    }

    pub fn local_status(&self) -> PlacementStatus {
        self.local_status
    }

    pub fn opponent_status(&self) -> PlacementStatus {
        self.opponent_status
    }

    /// The four rows this player may deploy on.
    pub fn home_rows(&self) -> [i32; 4] {
        let rows = board::home_rows(self.team);
        let first = *rows.start();
        [first, first + 1, first + 2, first + 3]
    }

    /// Mirrors the opponent's status so the next snapshot shows it.
    pub fn set_opponent_status(&mut self, status: PlacementStatus) {
        self.opponent_status = status;
    }

    /// The payload for `PLACEMENT_STATUS`.
    pub fn snapshot(&self) -> PlacementSnapshot {
        PlacementSnapshot {
            status: self.local_status,
            team: self.team,
            staged_pieces: self.staged.clone(),
            remaining_inventory: self.remaining.clone(),
            opponent_status: self.opponent_status,
        }
    }

    // -- Validation ---------------------------------------------------------

    /// Checks that `rank` may be placed at `position` right now.
    ///
    /// # Errors
    /// `AlreadyConfirmed`, `PieceNotAvailable`, `OutOfBounds`,
    /// `OutsideHomeArea`, `Lake`, `PositionOccupied` — in that order.
    pub fn validate_placement(&self, rank: Rank, position: Position) -> Result<(), PlacementError> {
        self.ensure_editable()?;
        if self.remaining.get(&rank).copied().unwrap_or(0) == 0 {
            return Err(PlacementError::PieceNotAvailable(rank));
        }
        self.validate_cell(position)?;
        if self.staged.iter().any(|p| p.position == position) {
            return Err(PlacementError::PositionOccupied(position));
        }
        Ok(())
    }

    /// Bounds, deployment rows and lakes. Occupancy is the caller's
    /// concern because `move_piece` swaps instead of rejecting.
    fn validate_cell(&self, position: Position) -> Result<(), PlacementError> {
        if !board::in_bounds(position) {
            return Err(PlacementError::OutOfBounds(position));
        }
        if !board::in_home_area(self.team, position) {
            return Err(PlacementError::OutsideHomeArea {
                position,
                team: self.team,
            });
        }
        if board::is_lake(position) {
            return Err(PlacementError::Lake(position));
        }
        Ok(())
    }

    fn ensure_editable(&self) -> Result<(), PlacementError> {
        match self.local_status {
            PlacementStatus::Placing => Ok(()),
            PlacementStatus::Ready => Err(PlacementError::AlreadyConfirmed),
        }
    }

    // -- Edits --------------------------------------------------------------

    /// Stages a new piece of `rank` at `position`.
    ///
    /// Returns the id allocated to the new piece.
    pub fn place(&mut self, rank: Rank, position: Position) -> Result<PieceId, PlacementError> {
        self.validate_placement(rank, position)?;

        if let Some(count) = self.remaining.get_mut(&rank) {
            *count -= 1;
        }
        let id = next_piece_id();
        self.staged.push(Piece {
            id,
            rank,
            team: self.team,
            position,
            revealed: false,
        });
        Ok(id)
    }

    /// Moves a staged piece to `position`. If another staged piece is
    /// already there the two swap cells.
    pub fn move_piece(
        &mut self,
        piece_id: PieceId,
        position: Position,
    ) -> Result<(), PlacementError> {
        self.ensure_editable()?;
        self.validate_cell(position)?;

        let from = self
            .staged
            .iter()
            .find(|p| p.id == piece_id)
            .map(|p| p.position)
            .ok_or(PlacementError::PieceNotFound(piece_id))?;

        for piece in &mut self.staged {
            if piece.id == piece_id {
                piece.position = position;
            } else if piece.position == position {
                piece.position = from;
            }
        }
        Ok(())
    }

    /// Unstages a piece and returns it to the inventory.
    pub fn remove(&mut self, piece_id: PieceId) -> Result<Piece, PlacementError> {
        self.ensure_editable()?;
        let index = self
            .staged
            .iter()
            .position(|p| p.id == piece_id)
            .ok_or(PlacementError::PieceNotFound(piece_id))?;

        let piece = self.staged.remove(index);
        *self.remaining.entry(piece.rank).or_insert(0) += 1;
        Ok(piece)
    }

    /// Replaces the whole deployment with `pieces`.
    ///
    /// Each entry is placed in order on a fresh inventory. If any entry
    /// is rejected the previous deployment is kept and the error returned.
    pub fn replace_all(&mut self, pieces: &[(Rank, Position)]) -> Result<(), PlacementError> {
        self.ensure_editable()?;

        let mut scratch = PlacementState::new(self.match_id, self.player_id, self.team);
        scratch.opponent_status = self.opponent_status;
        for &(rank, position) in pieces {
            scratch.place(rank, position)?;
        }
        *self = scratch;
        Ok(())
    }

    // -- Completion ---------------------------------------------------------

    /// Checks that the deployment is complete and matches the army
    /// composition exactly.
    ///
    /// # Errors
    /// - `IncompletePlacement` — inventory not empty
    /// - `WrongPieceCount` — staged count is not 40
    /// - `InvalidComposition` — one entry per mismatched rank
    /// - `OutsideHomeArea` — a staged piece outside the home rows
    pub fn validate_completion(&self) -> Result<(), PlacementError> {
        let remaining: u32 = self.remaining.values().sum();
        if remaining > 0 {
            return Err(PlacementError::IncompletePlacement { remaining });
        }

        let actual = self.staged.len() as u32;
        if actual != catalog::ARMY_SIZE {
            return Err(PlacementError::WrongPieceCount {
                expected: catalog::ARMY_SIZE,
                actual,
            });
        }

        let mismatches: Vec<String> = catalog::CATALOG
            .iter()
            .filter_map(|row| {
                let staged = self.staged.iter().filter(|p| p.rank == row.rank).count() as u32;
                (staged != row.count).then(|| {
                    format!("{}: expected {}, actual {}", row.rank, row.count, staged)
                })
            })
            .collect();
        if !mismatches.is_empty() {
            return Err(PlacementError::InvalidComposition(mismatches));
        }

        if let Some(stray) = self
            .staged
            .iter()
            .find(|p| !board::in_home_area(self.team, p.position))
        {
            return Err(PlacementError::OutsideHomeArea {
                position: stray.position,
                team: self.team,
            });
        }

        Ok(())
    }

    /// Marks the deployment ready if it passes
    /// [`validate_completion`](Self::validate_completion).
    pub fn confirm(&mut self) -> Result<(), PlacementError> {
        self.ensure_editable()?;
        self.validate_completion()?;
        self.local_status = PlacementStatus::Ready;
        tracing::info!(
            match_id = %self.match_id,
            player_id = %self.player_id,
            "placement confirmed"
        );
        Ok(())
    }
}

/// `true` once both players have confirmed.
pub fn both_ready(a: &PlacementState, b: &PlacementState) -> bool {
    a.local_status == PlacementStatus::Ready && b.local_status == PlacementStatus::Ready
}

/// Merges two confirmed deployments into the opening game state.
///
/// The player at index 0 moves first. Pieces are shuffled and get fresh
/// ids so the opponent cannot read ranks from the order they were staged.
///
/// # Errors
/// Returns `WrongPhase` unless both states are ready.
pub fn promote(
    a: &PlacementState,
    b: &PlacementState,
    players: [PlayerInfo; 2],
) -> Result<GameState, PlacementError> {
    if !both_ready(a, b) {
        return Err(PlacementError::WrongPhase);
    }

    let mut pieces: Vec<Piece> = a.staged.iter().chain(&b.staged).cloned().collect();
    conceal_order(&mut pieces, &mut rand::rng());
    let turn_player_id = players[0].id;
    Ok(GameState {
        match_id: a.match_id,
        players,
        pieces,
        turn_player_id,
        finished: false,
        winner_id: None,
    })
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn red_state() -> PlacementState {
        PlacementState::new(MatchId(1), PlayerId(1), Team::Red)
    }

    fn inventory_total(state: &PlacementState) -> u32 {
        state.remaining().values().sum::<u32>() + state.staged().len() as u32
    }

    /// Places a complete, valid Red army: ranks in catalog order over the
    /// home cells in row-major order.
    fn fill(state: &mut PlacementState) {
        let cells = board::home_cells(state.team());
        for (rank, cell) in catalog::army().into_iter().zip(cells) {
            state.place(rank, cell).unwrap();
        }
    }

    // =====================================================================
    // new() / place()
    // =====================================================================

    #[test]
    fn test_new_has_full_inventory_and_red_home_rows() {
        let state = red_state();
        assert_eq!(state.remaining().values().sum::<u32>(), 40);
        assert!(state.staged().is_empty());
        assert_eq!(state.home_rows(), [6, 7, 8, 9]);
        assert_eq!(state.local_status(), PlacementStatus::Placing);
    }

    #[test]
    fn test_place_valid_cell_decrements_inventory() {
        let mut state = red_state();
        let id = state.place(Rank::Flag, Position::new(9, 0)).unwrap();

        assert_eq!(state.remaining()[&Rank::Flag], 0);
        assert_eq!(state.staged().len(), 1);
        assert_eq!(state.staged()[0].id, id);
        assert!(!state.staged()[0].revealed);
        assert_eq!(inventory_total(&state), 40);
    }

    #[test]
    fn test_place_exhausted_rank_rejected() {
        let mut state = red_state();
        state.place(Rank::Flag, Position::new(9, 0)).unwrap();
        assert_eq!(
            state.place(Rank::Flag, Position::new(9, 1)),
            Err(PlacementError::PieceNotAvailable(Rank::Flag))
        );
        assert_eq!(inventory_total(&state), 40);
    }

    #[test]
    fn test_place_outside_home_rows_rejected() {
        let mut state = red_state();
        assert_eq!(
            state.place(Rank::Scout, Position::new(5, 0)),
            Err(PlacementError::OutsideHomeArea {
                position: Position::new(5, 0),
                team: Team::Red,
            })
        );
    }

    #[test]
    fn test_place_off_board_rejected() {
        let mut state = red_state();
        assert_eq!(
            state.place(Rank::Scout, Position::new(10, 0)),
            Err(PlacementError::OutOfBounds(Position::new(10, 0)))
        );
    }

    #[test]
    fn test_place_occupied_cell_rejected() {
        let mut state = red_state();
        state.place(Rank::Scout, Position::new(6, 0)).unwrap();
        assert_eq!(
            state.place(Rank::Scout, Position::new(6, 0)),
            Err(PlacementError::PositionOccupied(Position::new(6, 0)))
        );
        assert_eq!(inventory_total(&state), 40);
    }

    // =====================================================================
    // move_piece() / remove()
    // =====================================================================

    #[test]
    fn test_move_piece_to_empty_cell_relocates() {
        let mut state = red_state();
        let id = state.place(Rank::Scout, Position::new(6, 0)).unwrap();
        state.move_piece(id, Position::new(7, 4)).unwrap();
        assert_eq!(state.staged()[0].position, Position::new(7, 4));
    }

    #[test]
    fn test_move_piece_onto_staged_piece_swaps() {
        let mut state = red_state();
        let scout = state.place(Rank::Scout, Position::new(6, 0)).unwrap();
        let bomb = state.place(Rank::Bomb, Position::new(9, 9)).unwrap();

        state.move_piece(scout, Position::new(9, 9)).unwrap();

        let find = |id| state.staged().iter().find(|p| p.id == id).unwrap().position;
        assert_eq!(find(scout), Position::new(9, 9));
        assert_eq!(find(bomb), Position::new(6, 0));
    }

    #[test]
    fn test_move_piece_unknown_id_rejected() {
        let mut state = red_state();
        assert_eq!(
            state.move_piece(PieceId(999_999), Position::new(6, 0)),
            Err(PlacementError::PieceNotFound(PieceId(999_999)))
        );
    }

    #[test]
    fn test_move_piece_outside_home_rows_rejected() {
        let mut state = red_state();
        let id = state.place(Rank::Scout, Position::new(6, 0)).unwrap();
        assert!(matches!(
            state.move_piece(id, Position::new(0, 0)),
            Err(PlacementError::OutsideHomeArea { .. })
        ));
        assert_eq!(state.staged()[0].position, Position::new(6, 0));
    }

    #[test]
    fn test_remove_returns_piece_to_inventory() {
        let mut state = red_state();
        let id = state.place(Rank::Marshal, Position::new(6, 5)).unwrap();
        let removed = state.remove(id).unwrap();

        assert_eq!(removed.rank, Rank::Marshal);
        assert_eq!(state.remaining()[&Rank::Marshal], 1);
        assert!(state.staged().is_empty());
        assert_eq!(inventory_total(&state), 40);
    }

    // =====================================================================
    // validate_completion() / confirm()
    // =====================================================================

    #[test]
    fn test_validate_completion_incomplete_rejected() {
        let mut state = red_state();
        state.place(Rank::Flag, Position::new(9, 0)).unwrap();
        assert_eq!(
            state.validate_completion(),
            Err(PlacementError::IncompletePlacement { remaining: 39 })
        );
    }

    #[test]
    fn test_validate_completion_reports_each_rank_mismatch() {
        let mut state = red_state();
        fill(&mut state);
        // Force a composition error the public API can't produce: swap a
        // scout for an extra bomb without touching the inventory.
        let scout = state
            .staged
            .iter_mut()
            .find(|p| p.rank == Rank::Scout)
            .unwrap();
        scout.rank = Rank::Bomb;

        assert_eq!(
            state.validate_completion(),
            Err(PlacementError::InvalidComposition(vec![
                "scout: expected 8, actual 7".to_string(),
                "bomb: expected 6, actual 7".to_string(),
            ]))
        );
    }

    #[test]
    fn test_confirm_complete_army_becomes_ready() {
        let mut state = red_state();
        fill(&mut state);
        state.confirm().unwrap();
        assert_eq!(state.local_status(), PlacementStatus::Ready);
    }

    #[test]
    fn test_confirm_incomplete_leaves_status_placing() {
        let mut state = red_state();
        assert!(state.confirm().is_err());
        assert_eq!(state.local_status(), PlacementStatus::Placing);
    }

    #[test]
    fn test_edits_after_confirm_rejected() {
        let mut state = red_state();
        fill(&mut state);
        state.confirm().unwrap();
        let any = state.staged()[0].id;

        assert_eq!(state.remove(any), Err(PlacementError::AlreadyConfirmed));
        assert_eq!(
            state.move_piece(any, Position::new(6, 0)),
            Err(PlacementError::AlreadyConfirmed)
        );
    }

    // =====================================================================
    // replace_all()
    // =====================================================================

    #[test]
    fn test_replace_all_valid_list_replaces_staging() {
        let mut state = red_state();
        state.place(Rank::Flag, Position::new(9, 0)).unwrap();

        let list: Vec<_> = catalog::army()
            .into_iter()
            .zip(board::home_cells(Team::Red).into_iter().rev())
            .collect();
        state.replace_all(&list).unwrap();

        assert_eq!(state.staged().len(), 40);
        assert!(state.validate_completion().is_ok());
    }

    #[test]
    fn test_replace_all_bad_entry_keeps_previous_staging() {
        let mut state = red_state();
        let kept = state.place(Rank::Flag, Position::new(9, 0)).unwrap();
        let before = state.clone();

        let list = vec![
            (Rank::Scout, Position::new(6, 0)),
            (Rank::Scout, Position::new(6, 0)),
        ];
        assert_eq!(
            state.replace_all(&list),
            Err(PlacementError::PositionOccupied(Position::new(6, 0)))
        );
        assert_eq!(state, before);
        assert_eq!(state.staged()[0].id, kept);
    }

    // =====================================================================
    // both_ready() / promote()
    // =====================================================================

    #[test]
    fn test_promote_merges_armies_and_first_player_moves() {
        let mut red = red_state();
        let mut blue = PlacementState::new(MatchId(1), PlayerId(2), Team::Blue);
        fill(&mut red);
        fill(&mut blue);
        red.confirm().unwrap();

        let players = [
            PlayerInfo {
                id: PlayerId(1),
                display_name: "a".into(),
                team: Team::Red,
            },
            PlayerInfo {
                id: PlayerId(2),
                display_name: "b".into(),
                team: Team::Blue,
            },
        ];
        assert!(!both_ready(&red, &blue));
        assert_eq!(
            promote(&red, &blue, players.clone()),
            Err(PlacementError::WrongPhase)
        );

        blue.confirm().unwrap();
        let game = promote(&red, &blue, players).unwrap();
        assert_eq!(game.pieces.len(), 80);
        assert_eq!(game.turn_player_id, PlayerId(1));
        assert!(!game.finished);
    }

    #[test]
    fn test_promote_reissues_ids_so_staging_order_is_hidden() {
        let mut red = red_state();
        let mut blue = PlacementState::new(MatchId(1), PlayerId(2), Team::Blue);
        fill(&mut red);
        fill(&mut blue);
        red.confirm().unwrap();
        blue.confirm().unwrap();
        let staged_flag = blue.staged().iter().find(|p| p.rank == Rank::Flag).unwrap().clone();
        let players = [
            PlayerInfo {
                id: PlayerId(1),
                display_name: "a".into(),
                team: Team::Red,
            },
            PlayerInfo {
                id: PlayerId(2),
                display_name: "b".into(),
                team: Team::Blue,
            },
        ];

        let game = promote(&red, &blue, players).unwrap();

        // Positions survive, staging ids do not.
        let flag = game
            .pieces
            .iter()
            .find(|p| p.team == Team::Blue && p.rank == Rank::Flag)
            .unwrap();
        assert_eq!(flag.position, staged_flag.position);
        assert!(game.piece(staged_flag.id).is_none());
        assert!(game.pieces.windows(2).all(|w| w[0].id < w[1].id));
    }
}
