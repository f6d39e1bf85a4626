//! Single-target collection engine: the round loop.
//!
//! One round is extract → merge → flush-check → scroll → delay. The loop
//! exits on convergence (bottom reached and height stable long enough), a
//! stop request, the hard round cap, or scroller loss. Whatever the exit
//! reason, a final forced flush runs so nothing collected is lost.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use url::Url;

use keepstack_common::{CollectedRecord, KeepstackError, Mode, Result, Tuning};

use crate::cancel::StopToken;
use crate::convergence::ConvergenceTracker;
use crate::dispatcher::ChunkedDispatcher;
use crate::normalize::normalize_candidate;
use crate::scroller;
use crate::stats::EngineMeta;
use crate::traits::{Extractor, MergeStore, Page};

pub struct EngineResult {
    /// Unique records in first-seen order.
    pub records: Vec<CollectedRecord>,
    /// Where the shared crawl-order counter ended up, for the next target.
    pub next_crawl_order: u64,
    pub meta: EngineMeta,
}

pub struct CollectEngine {
    mode: Mode,
    tuning: Tuning,
    page: Arc<dyn Page>,
    extractor: Arc<dyn Extractor>,
    store: Arc<dyn MergeStore>,
}

impl CollectEngine {
    pub fn new(
        mode: Mode,
        tuning: Tuning,
        page: Arc<dyn Page>,
        extractor: Arc<dyn Extractor>,
        store: Arc<dyn MergeStore>,
    ) -> Self {
        Self {
            mode,
            tuning,
            page,
            extractor,
            store,
        }
    }

    /// Run the round loop against the current route. `crawl_at` and
    /// `crawl_order_start` are shared across targets of one logical run so
    /// cross-target ordering stays well-defined.
    pub async fn run(
        &self,
        token: &StopToken,
        crawl_at: i64,
        crawl_order_start: u64,
    ) -> Result<EngineResult> {
        let base = parse_base(&self.page.base_url().await);
        let mut dispatcher = ChunkedDispatcher::new(
            self.mode,
            self.tuning.clone(),
            self.store.clone(),
            crawl_at,
            crawl_order_start,
        );
        let mut tracker = ConvergenceTracker::new();
        let mut rounds: u32 = 0;
        let mut total_checked = 0;
        let mut total_candidates = 0;
        let mut reached_bottom = false;
        let mut stopped = false;

        for i in 0..self.tuning.max_rounds {
            // Checkpoint: before extracting.
            if token.is_requested_durable().await {
                stopped = true;
                break;
            }

            let surfaces = self.page.surfaces().await;
            let surface = match scroller::locate(self.mode, &surfaces, &self.tuning) {
                Some(surface) => surface,
                None => {
                    warn!(mode = %self.mode, "No scroll surface found, ending collection");
                    break;
                }
            };
            rounds = i + 1;
            tracker.observe(surface.content_height, self.tuning.height_slack_px);

            let batch = match self.extractor.extract().await {
                Ok(batch) => batch,
                Err(e) => {
                    // An unavailable extractor yields an empty round, not a
                    // run failure.
                    let e = KeepstackError::ExtractionUnavailable(e.to_string());
                    warn!(mode = %self.mode, error = %e, "Skipping extraction this round");
                    Vec::new()
                }
            };
            total_checked += batch.len();

            let now = Utc::now();
            let normalized: Vec<CollectedRecord> = batch
                .into_iter()
                .filter_map(|raw| normalize_candidate(raw, &base, now))
                .collect();
            total_candidates += dispatcher.absorb(normalized);

            dispatcher.flush(false).await?;

            // Checkpoint: after flushing.
            if token.is_requested_durable().await {
                stopped = true;
                break;
            }

            reached_bottom = scroller::at_bottom(&surface, &self.tuning);
            if tracker.converged(reached_bottom, self.tuning.stable_round_limit) {
                debug!(
                    mode = %self.mode,
                    rounds,
                    stable = tracker.stable_rounds(),
                    "Scrolling converged"
                );
                break;
            }

            // Checkpoint: before the next scroll step.
            if token.is_requested_durable().await {
                stopped = true;
                break;
            }

            self.page
                .scroll_by(&surface.id, scroller::scroll_step(&surface))
                .await;
            tokio::time::sleep(self.tuning.scroll_delay).await;
            tokio::time::sleep(self.tuning.settle_delay).await;
        }

        // Final forced flush, whatever ended the loop.
        let last_payload = dispatcher.flush(true).await?;
        let max_rounds_reached = rounds >= self.tuning.max_rounds;

        let meta = EngineMeta {
            total_checked,
            total_candidates,
            collected: dispatcher.collected(),
            rounds,
            max_rounds_reached,
            reached_bottom,
            batch_size: self.tuning.batch_size,
            chunk_calls: dispatcher.chunk_calls(),
            appended: dispatcher.added(),
            updated: dispatcher.updated(),
            stored_total: dispatcher.stored_total(),
            last_payload,
            stopped,
        };
        info!(
            mode = %self.mode,
            collected = meta.collected,
            rounds = meta.rounds,
            stopped = meta.stopped,
            max_rounds_reached = meta.max_rounds_reached,
            "Collection pass finished"
        );
        Ok(EngineResult {
            records: dispatcher.records(),
            next_crawl_order: dispatcher.next_crawl_order(),
            meta,
        })
    }
}

fn parse_base(base_url: &str) -> Url {
    Url::parse(base_url).unwrap_or_else(|_| {
        // A page that cannot name its own origin still gets working
        // relative-link resolution against a placeholder.
        Url::parse("https://localhost/").expect("static URL parses")
    })
}
