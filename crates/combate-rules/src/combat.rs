//! Combat resolution.

use combate_protocol::Rank;

use crate::catalog;

/// The result of one piece attacking another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombatOutcome {
    /// The defender is removed and the attacker takes its cell.
    AttackerWins,
    /// The attacker is removed; the defender stays.
    DefenderWins,
    /// Both pieces are removed.
    Tie,
}

/// Decides a fight between an attacking and a defending rank.
///
/// Total and deterministic. Overrides are checked before strength:
///
/// 1. a spy attacking the marshal wins;
/// 2. a bomb beats every attacker except a miner;
/// 3. otherwise the stronger rank wins and equal ranks tie.
///
/// The spy override only applies when the spy attacks. A marshal
/// attacking a spy wins on strength.
pub fn resolve_combat(attacker: Rank, defender: Rank) -> CombatOutcome {
    if attacker == Rank::Spy && defender == Rank::Marshal {
        return CombatOutcome::AttackerWins;
    }

    if defender == Rank::Bomb {
        return if attacker == Rank::Miner {
            CombatOutcome::AttackerWins
        } else {
            CombatOutcome::DefenderWins
        };
    }

    let a = catalog::info(attacker).strength;
    let d = catalog::info(defender).strength;
    match a.cmp(&d) {
        std::cmp::Ordering::Greater => CombatOutcome::AttackerWins,
        std::cmp::Ordering::Less => CombatOutcome::DefenderWins,
        std::cmp::Ordering::Equal => CombatOutcome::Tie,
    }
}
