//! Configuration for matchmaking and disconnect handling.

use std::time::Duration;

use crate::PhaseKind;

/// How a freshly paired match starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetupMode {
    /// Both players deploy their pieces by hand.
    #[default]
    Placement,
    /// Armies are shuffled onto the home rows and play starts at once.
    Instant,
}

/// What happens when a seated player's connection closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectPolicy {
    /// Tell the opponent and tear the match down right away.
    Immediate,
    /// Keep the match for this long, then declare it abandoned.
    GracePeriod(Duration),
}

/// Disconnect policies per phase.
///
/// The two phases are configured independently. A finished game uses
/// the `active` policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleConfig {
    pub placement: DisconnectPolicy,
    pub active: DisconnectPolicy,
}

impl LifecycleConfig {
    pub fn policy_for(&self, phase: PhaseKind) -> DisconnectPolicy {
        match phase {
            PhaseKind::Placement => self.placement,
            PhaseKind::Active | PhaseKind::Finished => self.active,
        }
    }
}

/// Five minutes to come back during placement; no grace once the game
/// is running.
impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            placement: DisconnectPolicy::GracePeriod(Duration::from_secs(5 * 60)),
            active: DisconnectPolicy::Immediate,
        }
    }
}
