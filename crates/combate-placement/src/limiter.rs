//! Fixed-window rate limiting for placement operations.
//!
//! Each `(player, operation class)` pair gets its own window. The first
//! request opens the window; requests are counted until the limit is
//! hit; once the window's duration has elapsed the count resets
//! wholesale on the next request.
//!
//! ```text
//! |<------------- window ------------->|
//! ✓ ✓ ✓ ... ✓ (limit)  ✗ ✗ ✗           | ✓ (new window)
//! ```
//!
//! Time comes from `tokio::time::Instant` so tests can drive it with a
//! paused clock.

use std::collections::HashMap;
use std::time::Duration;

use combate_protocol::PlayerId;
use tokio::time::Instant;

/// Which bucket an operation is counted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationClass {
    /// Staging a new piece.
    Placement,
    /// Relocating, swapping or removing a staged piece.
    Movement,
    /// `PLACEMENT_READY`.
    Confirmation,
}

/// A single limit: at most `max_requests` per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimit {
    pub const fn per_minute(max_requests: u32) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(60),
        }
    }
}

/// Limits for every operation class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimits {
    pub placement: RateLimit,
    pub movement: RateLimit,
    pub confirmation: RateLimit,
}

impl RateLimits {
    /// The limit that applies to `class`.
    pub fn for_class(&self, class: OperationClass) -> RateLimit {
        match class {
            OperationClass::Placement => self.placement,
            OperationClass::Movement => self.movement,
            OperationClass::Confirmation => self.confirmation,
        }
    }
}

/// 100 placements, 200 moves/removals and 10 confirmations per minute.
impl Default for RateLimits {
    fn default() -> Self {
        Self {
            placement: RateLimit::per_minute(100),
            movement: RateLimit::per_minute(200),
            confirmation: RateLimit::per_minute(10),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Snapshot of the limiter's bookkeeping, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterStats {
    /// Open windows across all players and classes.
    pub windows: usize,
    /// Distinct players with at least one open window.
    pub players: usize,
}

/// Per-player, per-class fixed-window counter.
///
/// Not thread-safe; owned by the single task that drives placement.
#[derive(Debug)]
pub struct RateLimiter {
    limits: RateLimits,
    windows: HashMap<(PlayerId, OperationClass), Window>,
}

impl RateLimiter {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limits,
            windows: HashMap::new(),
        }
    }

    /// Counts one request against the current clock.
    ///
    /// # Errors
    /// Returns the time left until the window resets when the limit has
    /// already been reached. A rejected request is not counted.
    pub fn check(&mut self, player: PlayerId, class: OperationClass) -> Result<(), Duration> {
        self.check_at(player, class, Instant::now())
    }

    /// Like [`check`](Self::check) with an explicit clock reading.
    pub fn check_at(
        &mut self,
        player: PlayerId,
        class: OperationClass,
        now: Instant,
    ) -> Result<(), Duration> {
        let limit = self.limits.for_class(class);
        let window = self.windows.entry((player, class)).or_insert(Window {
            started: now,
            count: 0,
        });

        let elapsed = now.saturating_duration_since(window.started);
        if elapsed >= limit.window {
            *window = Window {
                started: now,
                count: 0,
            };
        }

        if window.count >= limit.max_requests {
            let retry_after = limit.window.saturating_sub(elapsed);
            tracing::debug!(%player, ?class, ?retry_after, "rate limit exceeded");
            return Err(retry_after);
        }

        window.count += 1;
        Ok(())
    }

    /// Drops every window belonging to `player`.
    pub fn forget(&mut self, player: PlayerId) {
        self.windows.retain(|(owner, _), _| *owner != player);
    }

    /// Drops all windows.
    pub fn clear(&mut self) {
        self.windows.clear();
    }

    pub fn stats(&self) -> LimiterStats {
        let mut players: Vec<PlayerId> = self.windows.keys().map(|(p, _)| *p).collect();
        players.sort_by_key(|p| p.0);
        players.dedup();
        LimiterStats {
            windows: self.windows.len(),
            players: players.len(),
        }
    }
}
