//! Board geometry: bounds, lakes and deployment areas.

use std::ops::RangeInclusive;

use combate_protocol::{Position, Team};

/// Rows and columns per side.
pub const BOARD_SIZE: i32 = 10;

/// The eight lake cells: two 2×2 blocks in the middle rows. No piece may
/// stop on one.
pub const LAKES: [Position; 8] = [
    Position::new(4, 2),
    Position::new(4, 3),
    Position::new(5, 2),
    Position::new(5, 3),
    Position::new(4, 6),
    Position::new(4, 7),
    Position::new(5, 6),
    Position::new(5, 7),
];

/// `true` if the position is on the 10×10 board.
pub fn in_bounds(position: Position) -> bool {
    (0..BOARD_SIZE).contains(&position.row) && (0..BOARD_SIZE).contains(&position.col)
}

/// `true` if the position is a lake.
pub fn is_lake(position: Position) -> bool {
    LAKES.contains(&position)
}

/// The four rows a team deploys on. Red holds the bottom rows, Blue the top.
pub fn home_rows(team: Team) -> RangeInclusive<i32> {
    match team {
        Team::Red => 6..=9,
        Team::Blue => 0..=3,
    }
}

/// `true` if the position lies inside the team's deployment rows.
pub fn in_home_area(team: Team, position: Position) -> bool {
    in_bounds(position) && home_rows(team).contains(&position.row)
}

/// Every deployable cell for a team (the home rows minus lakes).
pub fn home_cells(team: Team) -> Vec<Position> {
    home_rows(team)
        .flat_map(|row| (0..BOARD_SIZE).map(move |col| Position::new(row, col)))
        .filter(|pos| !is_lake(*pos))
        .collect()
}
