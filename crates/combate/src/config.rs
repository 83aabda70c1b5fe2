//! Server configuration.

use combate_placement::RateLimits;
use combate_session::{LifecycleConfig, SetupMode};

/// Address the binary binds to when `COMBATE_BIND` is unset.
pub const DEFAULT_BIND: &str = "0.0.0.0:8082";

/// Everything the server needs to start.
///
/// Use [`CombateServerBuilder`](crate::CombateServerBuilder) to set only
/// the parts that differ from the defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: String,
    /// Disconnect policies for the placement and active phases.
    pub lifecycle: LifecycleConfig,
    /// Per-player throttling of placement requests.
    pub rate_limits: RateLimits,
    /// Whether new matches start with placement or a random deployment.
    pub setup: SetupMode,
}

impl ServerConfig {
    /// Defaults, with the bind address taken from `COMBATE_BIND`.
    pub fn from_env() -> Self {
        let bind = std::env::var("COMBATE_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
        Self {
            bind,
            ..Self::default()
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            lifecycle: LifecycleConfig::default(),
            rate_limits: RateLimits::default(),
            setup: SetupMode::default(),
        }
    }
}
