//! Run metadata: per-invocation and aggregated run statistics.

use serde::{Deserialize, Serialize};

/// Stats from one single-target engine invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineMeta {
    /// Raw candidates returned by the extractor, summed over rounds.
    pub total_checked: usize,
    /// Of those, the sightings that carried a usable identity.
    pub total_candidates: usize,
    /// Unique identities collected.
    pub collected: usize,
    pub rounds: u32,
    pub max_rounds_reached: bool,
    pub reached_bottom: bool,
    pub batch_size: usize,
    pub chunk_calls: u32,
    /// Records the store reported as newly added / merged into existing.
    pub appended: usize,
    pub updated: usize,
    /// Collection size the store reported after the last chunk.
    pub stored_total: usize,
    /// Size of the final forced flush.
    pub last_payload: usize,
    pub stopped: bool,
}

/// One orchestrator target's outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TargetMeta {
    pub target: String,
    /// Why the target was skipped, if it was.
    pub skipped: Option<String>,
    pub count: usize,
    pub meta: EngineMeta,
}

/// Aggregated stats for a whole collection run, surfaced to the control
/// surface and logged at run end.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunMeta {
    pub run_id: String,
    pub mode: String,
    pub total_checked: usize,
    pub total_candidates: usize,
    pub collected: usize,
    pub rounds: u32,
    pub max_rounds_reached: bool,
    pub stopped: bool,
    pub batch_size: usize,
    pub chunk_calls: u32,
    pub appended: usize,
    pub updated: usize,
    pub stored_total: usize,
    /// Per-target history for multi-folder runs, empty otherwise.
    pub targets: Vec<TargetMeta>,
}

impl RunMeta {
    pub fn from_engine(run_id: String, mode: &str, meta: &EngineMeta) -> Self {
        Self {
            run_id,
            mode: mode.to_string(),
            total_checked: meta.total_checked,
            total_candidates: meta.total_candidates,
            collected: meta.collected,
            rounds: meta.rounds,
            max_rounds_reached: meta.max_rounds_reached,
            stopped: meta.stopped,
            batch_size: meta.batch_size,
            chunk_calls: meta.chunk_calls,
            appended: meta.appended,
            updated: meta.updated,
            stored_total: meta.stored_total,
            targets: Vec::new(),
        }
    }
}

impl std::fmt::Display for RunMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Collection Run Complete ===")?;
        writeln!(f, "Mode:             {}", self.mode)?;
        writeln!(f, "Candidates seen:  {}", self.total_candidates)?;
        writeln!(f, "Unique collected: {}", self.collected)?;
        writeln!(f, "Rounds:           {}", self.rounds)?;
        writeln!(f, "Chunks sent:      {}", self.chunk_calls)?;
        writeln!(f, "Store added:      {}", self.appended)?;
        writeln!(f, "Store updated:    {}", self.updated)?;
        writeln!(f, "Store total:      {}", self.stored_total)?;
        if self.max_rounds_reached {
            writeln!(f, "Round cap reached, results may be truncated")?;
        }
        if self.stopped {
            writeln!(f, "Stopped by user request")?;
        }
        if !self.targets.is_empty() {
            writeln!(f, "\nTargets:")?;
            for target in &self.targets {
                match &target.skipped {
                    Some(reason) => {
                        writeln!(f, "  {} skipped ({reason})", target.target)?
                    }
                    None => writeln!(
                        f,
                        "  {}: {} records in {} rounds",
                        target.target, target.count, target.meta.rounds
                    )?,
                }
            }
        }
        Ok(())
    }
}
