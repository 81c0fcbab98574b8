//! Per-IP generation record.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Generation history for a single client IP.
///
/// An entry only exists once the IP has generated at least once, so there is
/// no "empty" state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitEntry {
    /// When the most recent accepted generation happened
    last_generation: DateTime<Utc>,
    /// Number of accepted generations since the entry was created
    generation_count: u64,
}

impl RateLimitEntry {
    /// Create the entry for a first generation at `now`.
    pub fn first(now: DateTime<Utc>) -> Self {
        Self {
            last_generation: now,
            generation_count: 1,
        }
    }

    /// Register another accepted generation at `now`.
    pub fn record(&mut self, now: DateTime<Utc>) {
        self.last_generation = now;
        self.generation_count = self.generation_count.saturating_add(1);
    }

    /// Time elapsed since the last generation.
    ///
    /// A clock reading earlier than the stored instant yields zero.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_generation).to_std().unwrap_or(Duration::ZERO)
    }

    /// Cooldown time still left at `now`, or `None` once it has passed.
    pub fn remaining_cooldown(&self, now: DateTime<Utc>, cooldown: Duration) -> Option<Duration> {
        let elapsed = self.elapsed(now);
        if elapsed >= cooldown {
            None
        } else {
            Some(cooldown - elapsed)
        }
    }

    /// Whether the last generation is strictly older than `retention`.
    pub fn is_stale(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        self.elapsed(now) > retention
    }

    pub fn last_generation(&self) -> DateTime<Utc> {
        self.last_generation
    }

    pub fn generation_count(&self) -> u64 {
        self.generation_count
    }
}
