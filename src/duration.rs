//! Dialogue duration estimation.
//!
//! Maps a line of dialogue to one of the video lengths the generation API
//! accepts, assuming a constant speaking pace. The estimate ignores pauses,
//! emphasis and non-English tokenization; dialogue longer than the largest
//! bucket is silently truncated by the video.

use serde::Serialize;

use crate::error::{GateError, Result};

/// Assumed speaking pace.
pub const DEFAULT_WORDS_PER_MINUTE: f64 = 140.0;
/// Video lengths, in seconds, accepted by the generation API.
pub const DEFAULT_BUCKETS: [u32; 3] = [4, 6, 8];

/// Result of estimating a piece of dialogue.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DurationEstimate {
    pub word_count: usize,
    pub estimated_seconds: f64,
    /// Chosen video length in seconds
    pub duration_seconds: u32,
    /// The estimate exceeds the largest bucket
    pub may_truncate: bool,
}

/// Picks the shortest permitted video length that fits spoken dialogue.
#[derive(Debug, Clone, PartialEq)]
pub struct DurationEstimator {
    words_per_minute: f64,
    /// Sorted ascending, deduplicated, never empty, no zero-length entries
    buckets: Vec<u32>,
    /// Extra seconds added to every estimate
    buffer_seconds: f64,
}

impl DurationEstimator {
    /// Build an estimator from a pace and a set of permitted lengths.
    ///
    /// Buckets may be given in any order; duplicates are dropped.
    pub fn new(words_per_minute: f64, buckets: impl IntoIterator<Item = u32>) -> Result<Self> {
        if !words_per_minute.is_finite() || words_per_minute <= 0.0 {
            return Err(GateError::Config(format!(
                "words per minute must be positive, got {}",
                words_per_minute
            )));
        }

        let mut buckets: Vec<u32> = buckets.into_iter().collect();
        buckets.sort_unstable();
        buckets.dedup();

        if buckets.is_empty() {
            return Err(GateError::Config(
                "at least one duration bucket is required".to_string(),
            ));
        }
        if buckets.first() == Some(&0) {
            return Err(GateError::Config(
                "duration buckets must be at least one second long".to_string(),
            ));
        }

        Ok(Self {
            words_per_minute,
            buckets,
            buffer_seconds: 0.0,
        })
    }

    /// Pad every estimate by `buffer_seconds`.
    pub fn with_buffer(mut self, buffer_seconds: f64) -> Result<Self> {
        if !buffer_seconds.is_finite() || buffer_seconds < 0.0 {
            return Err(GateError::Config(format!(
                "buffer seconds must be non-negative, got {}",
                buffer_seconds
            )));
        }
        self.buffer_seconds = buffer_seconds;
        Ok(self)
    }

    pub fn words_per_minute(&self) -> f64 {
        self.words_per_minute
    }

    pub fn buckets(&self) -> &[u32] {
        &self.buckets
    }

    pub fn buffer_seconds(&self) -> f64 {
        self.buffer_seconds
    }

    /// Number of whitespace-separated tokens.
    pub fn word_count(&self, dialogue: &str) -> usize {
        dialogue.split_whitespace().count()
    }

    /// Expected spoken length of `dialogue` in seconds.
    pub fn estimated_seconds(&self, dialogue: &str) -> f64 {
        self.seconds_for_words(self.word_count(dialogue))
    }

    /// Shortest bucket that holds the dialogue, or the longest bucket when
    /// none does.
    pub fn select_duration(&self, dialogue: &str) -> u32 {
        self.estimate(dialogue).duration_seconds
    }

    pub fn estimate(&self, dialogue: &str) -> DurationEstimate {
        let word_count = self.word_count(dialogue);
        let estimated_seconds = self.seconds_for_words(word_count);

        let fitting = self
            .buckets
            .iter()
            .copied()
            .find(|&bucket| f64::from(bucket) >= estimated_seconds);

        let (duration_seconds, may_truncate) = match fitting {
            Some(bucket) => (bucket, false),
            None => (self.largest_bucket(), true),
        };

        DurationEstimate {
            word_count,
            estimated_seconds,
            duration_seconds,
            may_truncate,
        }
    }

    fn seconds_for_words(&self, words: usize) -> f64 {
        // multiply first so boundary word counts land exactly on the bucket
        (words as f64 * 60.0) / self.words_per_minute + self.buffer_seconds
    }

    fn largest_bucket(&self) -> u32 {
        self.buckets.last().copied().unwrap_or_default()
    }
}

impl Default for DurationEstimator {
    fn default() -> Self {
        Self {
            words_per_minute: DEFAULT_WORDS_PER_MINUTE,
            buckets: DEFAULT_BUCKETS.to_vec(),
            buffer_seconds: 0.0,
        }
    }
}
