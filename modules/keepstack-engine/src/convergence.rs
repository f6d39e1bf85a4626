//! Convergence detector: per-round height and stability tracking.

/// Tracks scrollable-extent growth across rounds. Scrolling is exhausted
/// when the surface is at its bottom and the extent has been stable for a
/// mode-specific number of rounds.
#[derive(Debug)]
pub struct ConvergenceTracker {
    prev_height: i64,
    stable_rounds: u32,
}

impl ConvergenceTracker {
    pub fn new() -> Self {
        Self {
            prev_height: -1,
            stable_rounds: 0,
        }
    }

    /// Record this round's extent. Growth beyond `slack_px` resets the
    /// stability counter.
    pub fn observe(&mut self, height: i64, slack_px: i64) {
        if height > self.prev_height + slack_px {
            self.stable_rounds = 0;
            self.prev_height = height;
        } else {
            self.stable_rounds += 1;
        }
    }

    pub fn stable_rounds(&self) -> u32 {
        self.stable_rounds
    }

    pub fn converged(&self, at_bottom: bool, stable_round_limit: u32) -> bool {
        at_bottom && self.stable_rounds >= stable_round_limit
    }
}

impl Default for ConvergenceTracker {
    fn default() -> Self {
        Self::new()
    }
}
