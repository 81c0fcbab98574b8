//! Per-IP generation cooldown limiter.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::entry::RateLimitEntry;
use crate::error::{GateError, Result};

/// Default minimum time between two unpaid generations from one IP.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(3 * 60 * 60);
/// Default age after which an entry is purged by cleanup.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

const MILLIS_PER_MINUTE: u128 = 60_000;

/// Timing parameters for the limiter.
///
/// Retention is never shorter than the cooldown, so cleanup only ever
/// removes entries that are already past their cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownPolicy {
    /// Minimum time between unpaid generations
    cooldown: Duration,
    /// Entries whose last generation is older than this are removed by cleanup
    retention: Duration,
}

impl CooldownPolicy {
    pub fn new(cooldown: Duration, retention: Duration) -> Result<Self> {
        if cooldown.is_zero() {
            return Err(GateError::Config("cooldown must be positive".to_string()));
        }
        if retention < cooldown {
            return Err(GateError::Config(format!(
                "retention ({}s) must not be shorter than cooldown ({}s)",
                retention.as_secs(),
                cooldown.as_secs()
            )));
        }
        Ok(Self { cooldown, retention })
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            retention: DEFAULT_RETENTION,
        }
    }
}

/// Outcome of a generation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationDecision {
    /// The generation may proceed.
    Allowed,
    /// The IP is still cooling down.
    Denied {
        /// Remaining cooldown rounded up to whole minutes, at least 1
        remaining_wait_minutes: u64,
        /// Exact remaining cooldown
        retry_after: Duration,
    },
}

impl GenerationDecision {
    fn denied(remaining: Duration) -> Self {
        let minutes = remaining.as_millis().div_ceil(MILLIS_PER_MINUTE).max(1);
        GenerationDecision::Denied {
            remaining_wait_minutes: u64::try_from(minutes).unwrap_or(u64::MAX),
            retry_after: remaining,
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, GenerationDecision::Allowed)
    }

    /// Remaining wait in minutes, `None` when allowed.
    pub fn remaining_wait_minutes(&self) -> Option<u64> {
        match self {
            GenerationDecision::Allowed => None,
            GenerationDecision::Denied {
                remaining_wait_minutes,
                ..
            } => Some(*remaining_wait_minutes),
        }
    }
}

/// Snapshot of an IP's generation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationStats {
    pub generation_count: u64,
    pub last_generation_timestamp: Option<DateTime<Utc>>,
}

impl From<&RateLimitEntry> for GenerationStats {
    fn from(entry: &RateLimitEntry) -> Self {
        Self {
            generation_count: entry.generation_count(),
            last_generation_timestamp: Some(entry.last_generation()),
        }
    }
}

/// Gates video generations per client IP with a fixed cooldown window.
///
/// Paid requests bypass the cooldown. The table is safe to share across
/// tasks behind an `Arc`; every operation is synchronous and in-memory.
///
/// `can_generate` followed by `record_generation` is a check-then-commit
/// sequence with no atomicity between the two calls, so two concurrent
/// requests from one IP may both be admitted. Use [`try_acquire`] when that
/// matters.
///
/// [`try_acquire`]: GenerationLimiter::try_acquire
pub struct GenerationLimiter<C: Clock = SystemClock> {
    /// Generation history indexed by client IP
    entries: DashMap<String, RateLimitEntry>,
    policy: CooldownPolicy,
    clock: C,
}

impl GenerationLimiter<SystemClock> {
    /// Create a limiter on the system clock.
    pub fn new(policy: CooldownPolicy) -> Self {
        Self::with_clock(policy, SystemClock)
    }
}

impl Default for GenerationLimiter<SystemClock> {
    fn default() -> Self {
        Self::new(CooldownPolicy::default())
    }
}

impl<C: Clock> GenerationLimiter<C> {
    /// Create a limiter that reads time from `clock`.
    pub fn with_clock(policy: CooldownPolicy, clock: C) -> Self {
        Self {
            entries: DashMap::new(),
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> CooldownPolicy {
        self.policy
    }

    /// Decide whether `ip` may generate now.
    ///
    /// Never creates or updates an entry. The caller records the generation
    /// separately once it has actually happened.
    pub fn can_generate(&self, ip: &str, is_paid: bool) -> GenerationDecision {
        if is_paid {
            trace!(ip = %ip, "Paid generation bypasses cooldown");
            return GenerationDecision::Allowed;
        }

        let Some(entry) = self.entries.get(ip) else {
            trace!(ip = %ip, "No previous generation");
            return GenerationDecision::Allowed;
        };

        let now = self.clock.now();
        match entry.remaining_cooldown(now, self.policy.cooldown) {
            None => GenerationDecision::Allowed,
            Some(remaining) => {
                let decision = GenerationDecision::denied(remaining);
                debug!(
                    ip = %ip,
                    remaining_wait_minutes = ?decision.remaining_wait_minutes(),
                    "Generation still cooling down"
                );
                decision
            }
        }
    }

    /// Register an accepted generation for `ip`.
    ///
    /// Unconditional: creates the entry on first use, otherwise moves the
    /// timestamp to now and bumps the count.
    pub fn record_generation(&self, ip: &str) -> GenerationStats {
        let now = self.clock.now();
        let entry = self
            .entries
            .entry(ip.to_string())
            .and_modify(|entry| entry.record(now))
            .or_insert_with(|| {
                debug!(ip = %ip, "Creating generation entry");
                RateLimitEntry::first(now)
            });

        let stats = GenerationStats::from(&*entry);
        trace!(ip = %ip, generation_count = stats.generation_count, "Generation recorded");
        stats
    }

    /// Check and record in one step.
    ///
    /// The decision and the update happen under the table's lock for `ip`,
    /// so concurrent callers for the same IP cannot both pass the cooldown.
    /// Paid acquisitions always succeed and are recorded.
    pub fn try_acquire(&self, ip: &str, is_paid: bool) -> GenerationDecision {
        let now = self.clock.now();
        let cooldown = self.policy.cooldown;

        match self.entries.entry(ip.to_string()) {
            Entry::Occupied(mut occupied) => {
                if !is_paid {
                    if let Some(remaining) = occupied.get().remaining_cooldown(now, cooldown) {
                        let decision = GenerationDecision::denied(remaining);
                        debug!(
                            ip = %ip,
                            remaining_wait_minutes = ?decision.remaining_wait_minutes(),
                            "Generation acquire denied"
                        );
                        return decision;
                    }
                }
                occupied.get_mut().record(now);
            }
            Entry::Vacant(vacant) => {
                debug!(ip = %ip, "Creating generation entry");
                vacant.insert(RateLimitEntry::first(now));
            }
        }

        GenerationDecision::Allowed
    }

    /// Generation history for `ip`; zero and `None` when unknown.
    pub fn get_stats(&self, ip: &str) -> GenerationStats {
        self.entries
            .get(ip)
            .map(|entry| GenerationStats::from(&*entry))
            .unwrap_or_default()
    }

    /// Drop every entry whose last generation is older than the retention
    /// window. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let retention = self.policy.retention;
        let mut removed = 0;

        self.entries.retain(|_, entry| {
            let stale = entry.is_stale(now, retention);
            if stale {
                removed += 1;
            }
            !stale
        });

        removed
    }

    /// Number of IPs currently tracked.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Forget every IP.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;
    use chrono::Duration as ChronoDuration;
    use std::sync::Arc;

    const IP: &str = "1.2.3.4";

    fn limiter() -> (GenerationLimiter<Arc<ManualClock>>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let limiter = GenerationLimiter::with_clock(CooldownPolicy::default(), clock.clone());
        (limiter, clock)
    }

    #[test]
    fn test_first_time_ip_is_allowed() {
        let (limiter, _) = limiter();
        assert_eq!(limiter.can_generate(IP, false), GenerationDecision::Allowed);
        assert_eq!(limiter.entry_count(), 0);
    }

    #[test]
    fn test_empty_ip_is_a_valid_key() {
        let (limiter, _) = limiter();
        assert!(limiter.can_generate("", false).is_allowed());

        limiter.record_generation("");
        assert!(!limiter.can_generate("", false).is_allowed());
        assert_eq!(limiter.get_stats("").generation_count, 1);
    }

    #[test]
    fn test_paid_always_allowed() {
        let (limiter, _) = limiter();
        limiter.record_generation(IP);

        assert!(!limiter.can_generate(IP, false).is_allowed());
        assert!(limiter.can_generate(IP, true).is_allowed());
    }

    #[test]
    fn test_can_generate_does_not_mutate() {
        let (limiter, clock) = limiter();
        limiter.record_generation(IP);
        let before = limiter.get_stats(IP);

        clock.advance(ChronoDuration::minutes(5));
        limiter.can_generate(IP, false);
        limiter.can_generate(IP, true);
        limiter.can_generate("5.6.7.8", false);

        assert_eq!(limiter.get_stats(IP), before);
        assert_eq!(limiter.entry_count(), 1);
    }

    #[test]
    fn test_cooldown_boundary() {
        let (limiter, clock) = limiter();
        limiter.record_generation(IP);

        clock.advance(ChronoDuration::hours(2) + ChronoDuration::minutes(59));
        assert_eq!(
            limiter.can_generate(IP, false).remaining_wait_minutes(),
            Some(1)
        );

        clock.advance(ChronoDuration::minutes(1));
        assert_eq!(limiter.can_generate(IP, false), GenerationDecision::Allowed);
    }

    #[test]
    fn test_remaining_minutes_rounds_up() {
        let (limiter, clock) = limiter();
        limiter.record_generation(IP);

        assert_eq!(limiter.can_generate(IP, false).remaining_wait_minutes(), Some(180));

        clock.advance(ChronoDuration::milliseconds(1));
        assert_eq!(limiter.can_generate(IP, false).remaining_wait_minutes(), Some(180));

        clock.advance(ChronoDuration::minutes(1));
        assert_eq!(limiter.can_generate(IP, false).remaining_wait_minutes(), Some(179));

        // one millisecond left
        clock.set(DateTime::<Utc>::UNIX_EPOCH + ChronoDuration::hours(3) - ChronoDuration::milliseconds(1));
        let decision = limiter.can_generate(IP, false);
        assert_eq!(decision.remaining_wait_minutes(), Some(1));
        match decision {
            GenerationDecision::Denied { retry_after, .. } => {
                assert_eq!(retry_after, Duration::from_millis(1));
            }
            GenerationDecision::Allowed => panic!("expected denial"),
        }
    }

    #[test]
    fn test_record_is_cumulative() {
        let (limiter, clock) = limiter();
        for i in 1..=5u64 {
            let stats = limiter.record_generation(IP);
            assert_eq!(stats.generation_count, i);
            clock.advance(ChronoDuration::minutes(1));
        }

        let stats = limiter.get_stats(IP);
        assert_eq!(stats.generation_count, 5);
        assert_eq!(
            stats.last_generation_timestamp,
            Some(DateTime::<Utc>::UNIX_EPOCH + ChronoDuration::minutes(4))
        );
    }

    #[test]
    fn test_stats_for_unknown_ip() {
        let (limiter, _) = limiter();
        let stats = limiter.get_stats("9.9.9.9");
        assert_eq!(stats.generation_count, 0);
        assert_eq!(stats.last_generation_timestamp, None);
    }

    #[test]
    fn test_record_restarts_cooldown() {
        let (limiter, clock) = limiter();
        limiter.record_generation(IP);

        clock.advance(ChronoDuration::hours(3));
        assert!(limiter.can_generate(IP, false).is_allowed());
        limiter.record_generation(IP);

        clock.advance(ChronoDuration::hours(1));
        assert_eq!(limiter.can_generate(IP, false).remaining_wait_minutes(), Some(120));
    }

    #[test]
    fn test_try_acquire_admits_once() {
        let (limiter, _) = limiter();

        assert!(limiter.try_acquire(IP, false).is_allowed());
        assert!(!limiter.try_acquire(IP, false).is_allowed());
        assert_eq!(limiter.get_stats(IP).generation_count, 1);
    }

    #[test]
    fn test_try_acquire_paid_records_during_cooldown() {
        let (limiter, _) = limiter();
        limiter.try_acquire(IP, false);

        assert!(limiter.try_acquire(IP, true).is_allowed());
        assert_eq!(limiter.get_stats(IP).generation_count, 2);
    }

    #[test]
    fn test_try_acquire_after_cooldown() {
        let (limiter, clock) = limiter();
        limiter.try_acquire(IP, false);

        clock.advance(ChronoDuration::hours(3));
        assert!(limiter.try_acquire(IP, false).is_allowed());
        assert_eq!(limiter.get_stats(IP).generation_count, 2);
    }

    #[test]
    fn test_cleanup_removes_only_stale_entries() {
        let (limiter, clock) = limiter();
        limiter.record_generation("old");
        clock.advance(ChronoDuration::hours(12));
        limiter.record_generation("recent");
        limiter.record_generation("recent");
        let recent_before = limiter.get_stats("recent");

        clock.advance(ChronoDuration::hours(12));
        // "old" is exactly at the retention boundary
        assert_eq!(limiter.cleanup(), 0);

        clock.advance(ChronoDuration::seconds(1));
        assert_eq!(limiter.cleanup(), 1);
        assert_eq!(limiter.entry_count(), 1);
        assert_eq!(limiter.get_stats("old"), GenerationStats::default());
        assert_eq!(limiter.get_stats("recent"), recent_before);

        assert_eq!(limiter.cleanup(), 0);
    }

    #[test]
    fn test_cleanup_on_empty_table() {
        let (limiter, _) = limiter();
        assert_eq!(limiter.cleanup(), 0);
    }

    #[test]
    fn test_clear() {
        let (limiter, _) = limiter();
        limiter.record_generation("a");
        limiter.record_generation("b");
        assert_eq!(limiter.entry_count(), 2);

        limiter.clear();
        assert_eq!(limiter.entry_count(), 0);
    }

    #[test]
    fn test_policy_rejects_retention_shorter_than_cooldown() {
        let hour = Duration::from_secs(3600);
        assert!(matches!(
            CooldownPolicy::new(3 * hour, hour),
            Err(GateError::Config(_))
        ));
        assert!(matches!(
            CooldownPolicy::new(Duration::ZERO, hour),
            Err(GateError::Config(_))
        ));

        let policy = CooldownPolicy::new(3 * hour, 3 * hour).unwrap();
        assert_eq!(policy.cooldown(), policy.retention());
    }

    #[test]
    fn test_cleanup_never_frees_a_cooling_down_ip() {
        let clock = Arc::new(ManualClock::default());
        let policy = CooldownPolicy::new(
            Duration::from_secs(3 * 3600),
            Duration::from_secs(3 * 3600),
        )
        .unwrap();
        let limiter = GenerationLimiter::with_clock(policy, clock.clone());
        limiter.record_generation(IP);

        clock.advance(ChronoDuration::hours(2) + ChronoDuration::minutes(59));
        assert_eq!(limiter.cleanup(), 0);
        assert_eq!(limiter.can_generate(IP, false).remaining_wait_minutes(), Some(1));
    }

    #[test]
    fn test_cleanup_concurrent_with_records_and_checks() {
        let clock = Arc::new(ManualClock::default());
        let limiter = Arc::new(GenerationLimiter::with_clock(
            CooldownPolicy::default(),
            clock.clone(),
        ));
        for i in 0..50 {
            limiter.record_generation(&format!("stale-{}", i));
        }
        clock.advance(ChronoDuration::hours(25));

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        limiter.record_generation(IP);
                        assert!(!limiter.can_generate(IP, false).is_allowed());
                    }
                })
            })
            .collect();
        let sweepers: Vec<_> = (0..2)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    let mut removed = 0;
                    for _ in 0..50 {
                        removed += limiter.cleanup();
                    }
                    removed
                })
            })
            .collect();

        for writer in writers {
            writer.join().unwrap();
        }
        let removed: usize = sweepers.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(removed, 50);
        assert_eq!(limiter.entry_count(), 1);
        assert_eq!(limiter.get_stats(IP).generation_count, 400);
    }

    #[test]
    fn test_concurrent_records_are_counted() {
        let limiter = Arc::new(GenerationLimiter::new(CooldownPolicy::default()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        limiter.record_generation(IP);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(limiter.get_stats(IP).generation_count, 800);
    }
}
