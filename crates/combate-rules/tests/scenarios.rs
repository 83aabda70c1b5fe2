//! Multi-move scenarios played through `apply_move`.
//!
//! Unit tests in `movement.rs` check one rule at a time; these play short
//! sequences to verify that turn order, reveals and victory compose.

use combate_protocol::{
    GameState, MatchId, Piece, PieceId, PlayerId, PlayerInfo, Position, Rank, Team,
};
use combate_rules::{MoveError, apply_move, random_deployment};

const RED: PlayerId = PlayerId(10);
const BLUE: PlayerId = PlayerId(20);

fn piece(id: u64, rank: Rank, team: Team, row: i32, col: i32) -> Piece {
    Piece {
        id: PieceId(id),
        rank,
        team,
        position: Position::new(row, col),
        revealed: false,
    }
}

fn game(pieces: Vec<Piece>) -> GameState {
    GameState {
        match_id: MatchId(1),
        players: [
            PlayerInfo {
                id: RED,
                display_name: "red".into(),
                team: Team::Red,
            },
            PlayerInfo {
                id: BLUE,
                display_name: "blue".into(),
                team: Team::Blue,
            },
        ],
        pieces,
        turn_player_id: RED,
        finished: false,
        winner_id: None,
    }
}

/// Flags and spare sergeants so that the scenarios don't end early.
fn reserves() -> Vec<Piece> {
    vec![
        piece(900, Rank::Flag, Team::Red, 9, 9),
        piece(901, Rank::Sergeant, Team::Red, 9, 8),
        piece(910, Rank::Flag, Team::Blue, 0, 9),
        piece(911, Rank::Sergeant, Team::Blue, 0, 8),
    ]
}

#[test]
fn test_miner_clears_bomb_then_marshal_walks_through() {
    let mut pieces = reserves();
    pieces.push(piece(1, Rank::Miner, Team::Red, 4, 0));
    pieces.push(piece(2, Rank::Marshal, Team::Red, 6, 0));
    pieces.push(piece(3, Rank::Bomb, Team::Blue, 3, 0));
    pieces.push(piece(4, Rank::Scout, Team::Blue, 0, 0));
    let state = game(pieces);

    let state = apply_move(&state, PieceId(1), Position::new(3, 0), RED).unwrap();
    assert!(state.piece(PieceId(3)).is_none(), "bomb defused");
    assert!(state.piece(PieceId(1)).unwrap().revealed);

    let state = apply_move(&state, PieceId(4), Position::new(0, 1), BLUE).unwrap();
    let state = apply_move(&state, PieceId(2), Position::new(5, 0), RED).unwrap();
    assert_eq!(state.turn_player_id, BLUE);
    assert!(!state.finished);
}

#[test]
fn test_marshal_into_bomb_loses_and_bomb_is_revealed() {
    let mut pieces = reserves();
    pieces.push(piece(1, Rank::Marshal, Team::Red, 4, 0));
    pieces.push(piece(3, Rank::Bomb, Team::Blue, 3, 0));
    let state = game(pieces);

    let next = apply_move(&state, PieceId(1), Position::new(3, 0), RED).unwrap();
    assert!(next.piece(PieceId(1)).is_none());
    let bomb = next.piece(PieceId(3)).unwrap();
    assert!(bomb.revealed);

    // The revealed bomb is visible to Red from now on.
    let red_view = next.view_for(Team::Red);
    let seen = red_view.pieces.iter().find(|p| p.id == PieceId(3)).unwrap();
    assert_eq!(seen.rank, Some(Rank::Bomb));
}

#[test]
fn test_spy_takes_marshal_only_when_attacking() {
    let mut pieces = reserves();
    pieces.push(piece(1, Rank::Spy, Team::Red, 4, 0));
    pieces.push(piece(2, Rank::Marshal, Team::Blue, 3, 0));
    pieces.push(piece(3, Rank::Spy, Team::Red, 4, 5));
    pieces.push(piece(4, Rank::Marshal, Team::Blue, 3, 5));
    let state = game(pieces);

    let state = apply_move(&state, PieceId(1), Position::new(3, 0), RED).unwrap();
    assert!(state.piece(PieceId(2)).is_none(), "spy wins when attacking");

    let state = apply_move(&state, PieceId(4), Position::new(4, 5), BLUE).unwrap();
    assert!(state.piece(PieceId(3)).is_none(), "marshal wins when attacking");
    assert_eq!(
        state.piece(PieceId(4)).unwrap().position,
        Position::new(4, 5)
    );
}

#[test]
fn test_rejected_move_keeps_turn_with_mover() {
    let mut pieces = reserves();
    pieces.push(piece(1, Rank::Captain, Team::Red, 6, 0));
    let state = game(pieces);

    let err = apply_move(&state, PieceId(1), Position::new(4, 0), RED).unwrap_err();
    assert_eq!(err, MoveError::TooFar(Rank::Captain));

    // Still Red's turn: the same player may try again.
    let next = apply_move(&state, PieceId(1), Position::new(5, 0), RED).unwrap();
    assert_eq!(next.turn_player_id, BLUE);
}

#[test]
fn test_turn_alternates_across_sequence() {
    let mut pieces = reserves();
    pieces.push(piece(1, Rank::Captain, Team::Red, 6, 0));
    pieces.push(piece(2, Rank::Captain, Team::Blue, 3, 9));
    let mut state = game(pieces);

    for step in 0..6 {
        let (id, mover, row_a, row_b, col) = if step % 2 == 0 {
            (PieceId(1), RED, 6, 5, 0)
        } else {
            (PieceId(2), BLUE, 3, 2, 9)
        };
        let current = state.piece(id).unwrap().position.row;
        let target_row = if current == row_a { row_b } else { row_a };
        assert_eq!(state.turn_player_id, mover);
        state = apply_move(&state, id, Position::new(target_row, col), mover).unwrap();
    }
    assert_eq!(state.turn_player_id, RED);
}

#[test]
fn test_random_deployment_game_accepts_a_scout_move() {
    let players = [
        PlayerInfo {
            id: RED,
            display_name: "red".into(),
            team: Team::Red,
        },
        PlayerInfo {
            id: BLUE,
            display_name: "blue".into(),
            team: Team::Blue,
        },
    ];
    let state = random_deployment(MatchId(9), players, &mut rand::rng());

    // Any Red piece on row 6 outside the lake columns can step forward
    // into the empty middle rows, unless it's immobile.
    let mover = state
        .pieces
        .iter()
        .find(|p| {
            p.team == Team::Red
                && p.position.row == 6
                && ![2, 3, 6, 7].contains(&p.position.col)
                && !matches!(p.rank, Rank::Flag | Rank::Bomb)
        })
        .expect("row 6 has at least one mobile piece outside the lake columns");
    let target = Position::new(5, mover.position.col);

    let next = apply_move(&state, mover.id, target, RED).unwrap();
    assert_eq!(next.turn_player_id, BLUE);
}
