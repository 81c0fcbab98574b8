//! Background cleanup of stale limiter entries.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::clock::Clock;
use super::limiter::GenerationLimiter;

/// Run [`GenerationLimiter::cleanup`] every `interval` until the returned
/// handle is aborted.
///
/// The first sweep happens one full interval after spawning.
pub fn spawn_cleanup_task<C>(limiter: Arc<GenerationLimiter<C>>, interval: Duration) -> JoinHandle<()>
where
    C: Clock + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = interval.as_secs(), "Limiter cleanup task started");

        loop {
            ticker.tick().await;
            let removed = limiter.cleanup();
            if removed > 0 {
                info!(
                    removed = removed,
                    remaining = limiter.entry_count(),
                    "Removed stale generation entries"
                );
            } else {
                debug!(remaining = limiter.entry_count(), "No stale generation entries");
            }
        }
    })
}
