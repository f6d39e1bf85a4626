use std::time::Duration;

use crate::types::Mode;

/// Longest username accepted as a record identity or owner path segment.
pub const MAX_USERNAME_LEN: usize = 40;

/// Per-mode engine tuning. The following-list mode renders incrementally and
/// much slower than the post grid, so it gets a higher stable-round limit and
/// a far higher round cap.
#[derive(Debug, Clone)]
pub struct Tuning {
    /// Queued records required before a non-forced flush sends a chunk.
    pub batch_size: usize,
    /// Hard cap on scroll rounds. Reaching it flags possible truncation.
    pub max_rounds: u32,
    /// Rounds of height stability required (with bottom reached) to converge.
    pub stable_round_limit: u32,
    /// Height growth below this is treated as no growth.
    pub height_slack_px: i64,
    /// Within this of the scroll extent counts as "at bottom".
    pub bottom_slack_px: i64,
    /// Content must exceed the viewport by more than this to count as
    /// scrollable.
    pub overflow_slack_px: i64,
    /// Base pacing delay after each scroll step.
    pub scroll_delay: Duration,
    /// Short settle delay on top of the base delay.
    pub settle_delay: Duration,
    /// Chunk send attempts before the run fails.
    pub chunk_retry_limit: u32,
    /// Linear backoff unit between chunk retries (unit x attempt number).
    pub chunk_retry_backoff: Duration,
    /// Route-stabilization poll interval.
    pub route_poll_interval: Duration,
    /// Give up waiting for a target route after this long.
    pub route_timeout: Duration,
    /// A held path match with a non-zero link count is accepted after this
    /// long even without count stability.
    pub route_quick_settle: Duration,
}

impl Tuning {
    pub fn for_mode(mode: Mode) -> Self {
        let (batch_size, max_rounds, stable_round_limit) = match mode {
            Mode::Saved => (400, 300, 8),
            Mode::Following => (500, 3000, 12),
        };
        Self {
            batch_size,
            max_rounds,
            stable_round_limit,
            height_slack_px: 16,
            bottom_slack_px: 16,
            overflow_slack_px: 24,
            scroll_delay: Duration::from_millis(700),
            settle_delay: Duration::from_millis(180),
            chunk_retry_limit: 3,
            chunk_retry_backoff: Duration::from_millis(120),
            route_poll_interval: Duration::from_millis(300),
            route_timeout: Duration::from_secs(12),
            route_quick_settle: Duration::from_millis(1200),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Zero delays for deterministic tests.
    pub fn instant(mut self) -> Self {
        self.scroll_delay = Duration::ZERO;
        self.settle_delay = Duration::ZERO;
        self.chunk_retry_backoff = Duration::ZERO;
        self.route_poll_interval = Duration::ZERO;
        self.route_quick_settle = Duration::ZERO;
        self.route_timeout = Duration::from_millis(50);
        self
    }
}
