//! Generation rate limiting and state management.

mod clock;
mod entry;
mod limiter;
mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::RateLimitEntry;
pub use limiter::{
    CooldownPolicy, GenerationDecision, GenerationLimiter, GenerationStats, DEFAULT_COOLDOWN,
    DEFAULT_RETENTION,
};
pub use sweeper::spawn_cleanup_task;
