//! The rank catalog.
//!
//! One table decides strength, how many of each rank an army holds, and
//! how a rank moves. Placement inventories, combat and move validation
//! all read from here.
//!
//! | rank       | strength | count | mobility |
//! |------------|----------|-------|----------|
//! | flag       | 0        | 1     | immobile |
//! | spy        | 1        | 1     | step     |
//! | scout      | 2        | 8     | line     |
//! | miner      | 3        | 5     | step     |
//! | sergeant   | 4        | 4     | step     |
//! | lieutenant | 5        | 4     | step     |
//! | captain    | 6        | 4     | step     |
//! | major      | 7        | 3     | step     |
//! | colonel    | 8        | 2     | step     |
//! | general    | 9        | 1     | step     |
//! | marshal    | 10       | 1     | step     |
//! | bomb       | 11       | 6     | immobile |

use std::collections::BTreeMap;

use combate_protocol::Rank;

/// Pieces per army.
pub const ARMY_SIZE: u32 = 40;

/// How a rank moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mobility {
    /// Never moves.
    Immobile,
    /// One orthogonal cell per turn.
    Step,
    /// Any distance along a row or column through empty cells.
    Line,
}

/// A row of the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankInfo {
    pub rank: Rank,
    pub strength: u8,
    pub display_name: &'static str,
    pub count: u32,
    pub mobility: Mobility,
}

/// Catalog rows, indexed in [`Rank::ALL`] order.
pub const CATALOG: [RankInfo; 12] = [
    entry(Rank::Flag, 0, "Flag", 1, Mobility::Immobile),
    entry(Rank::Spy, 1, "Spy", 1, Mobility::Step),
    entry(Rank::Scout, 2, "Scout", 8, Mobility::Line),
    entry(Rank::Miner, 3, "Miner", 5, Mobility::Step),
    entry(Rank::Sergeant, 4, "Sergeant", 4, Mobility::Step),
    entry(Rank::Lieutenant, 5, "Lieutenant", 4, Mobility::Step),
    entry(Rank::Captain, 6, "Captain", 4, Mobility::Step),
    entry(Rank::Major, 7, "Major", 3, Mobility::Step),
    entry(Rank::Colonel, 8, "Colonel", 2, Mobility::Step),
    entry(Rank::General, 9, "General", 1, Mobility::Step),
    entry(Rank::Marshal, 10, "Marshal", 1, Mobility::Step),
    entry(Rank::Bomb, 11, "Bomb", 6, Mobility::Immobile),
];

const fn entry(
    rank: Rank,
    strength: u8,
    display_name: &'static str,
    count: u32,
    mobility: Mobility,
) -> RankInfo {
    RankInfo {
        rank,
        strength,
        display_name,
        count,
        mobility,
    }
}

/// Looks up a rank's catalog row.
pub fn info(rank: Rank) -> &'static RankInfo {
    // `Rank` is declared in catalog order, so the discriminant is the index.
    &CATALOG[rank as usize]
}

/// The full army composition: rank → count.
pub fn composition() -> BTreeMap<Rank, u32> {
    CATALOG.iter().map(|row| (row.rank, row.count)).collect()
}

/// Every rank in an army, one entry per piece (40 entries).
pub fn army() -> Vec<Rank> {
    CATALOG
        .iter()
        .flat_map(|row| std::iter::repeat_n(row.rank, row.count as usize))
        .collect()
}
