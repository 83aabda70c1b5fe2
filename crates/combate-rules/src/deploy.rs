//! Piece id allocation and the instant random setup.

use std::sync::atomic::{AtomicU64, Ordering};

use combate_protocol::{GameState, MatchId, Piece, PieceId, PlayerInfo, Team};
use rand::Rng;
use rand::seq::SliceRandom;

use crate::{board, catalog};

/// Counter for generating unique piece IDs across all matches.
static NEXT_PIECE_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates a fresh piece id.
pub fn next_piece_id() -> PieceId {
    PieceId(NEXT_PIECE_ID.fetch_add(1, Ordering::Relaxed))
}

/// Shuffles `pieces` and gives them fresh ids in the shuffled order.
///
/// Ids are visible to the opponent, so neither their order nor the order
/// of the list may follow rank order or the order pieces were placed in.
pub fn conceal_order<R: Rng + ?Sized>(pieces: &mut [Piece], rng: &mut R) {
    pieces.shuffle(rng);
    for piece in pieces.iter_mut() {
        piece.id = next_piece_id();
    }
}

/// Builds an active game with both armies shuffled across their home rows.
///
/// This is the setup mode that skips the placement phase entirely. The
/// player at index 0 moves first, matching the placement flow.
pub fn random_deployment<R: Rng + ?Sized>(
    match_id: MatchId,
    players: [PlayerInfo; 2],
    rng: &mut R,
) -> GameState {
    let mut pieces = Vec::with_capacity(2 * catalog::ARMY_SIZE as usize);
    for team in [Team::Red, Team::Blue] {
        let mut cells = board::home_cells(team);
        cells.shuffle(rng);
        pieces.extend(catalog::army().into_iter().zip(cells).map(|(rank, position)| {
            Piece {
                id: next_piece_id(),
                rank,
                team,
                position,
                revealed: false,
            }
        }));
    }
    conceal_order(&mut pieces, rng);

    let turn_player_id = players[0].id;
    GameState {
        match_id,
        players,
        pieces,
        turn_player_id,
        finished: false,
        winner_id: None,
    }
}
