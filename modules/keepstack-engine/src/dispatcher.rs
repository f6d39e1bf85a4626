//! Chunked dispatcher: in-memory running set plus the flush pipeline.
//!
//! Holds two identity-keyed maps: `merged` (everything seen this invocation)
//! and `queued` (new or changed since the last successful flush). Chunks are
//! sent whole once the queue crosses the batch threshold, with bounded
//! linear-backoff retry; retry exhaustion aborts the run rather than
//! silently dropping records.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use keepstack_common::{CollectedRecord, KeepstackError, Mode, Result, Tuning};

use crate::traits::MergeStore;

pub struct ChunkedDispatcher {
    mode: Mode,
    tuning: Tuning,
    store: Arc<dyn MergeStore>,
    merged: HashMap<String, CollectedRecord>,
    seen_order: Vec<String>,
    queued: HashMap<String, CollectedRecord>,
    queued_order: Vec<String>,
    crawl_at: i64,
    next_crawl_order: u64,
    chunk_calls: u32,
    added: usize,
    updated: usize,
    stored_total: usize,
    last_payload: usize,
}

impl ChunkedDispatcher {
    pub fn new(
        mode: Mode,
        tuning: Tuning,
        store: Arc<dyn MergeStore>,
        crawl_at: i64,
        crawl_order_start: u64,
    ) -> Self {
        Self {
            mode,
            tuning,
            store,
            merged: HashMap::new(),
            seen_order: Vec::new(),
            queued: HashMap::new(),
            queued_order: Vec::new(),
            crawl_at,
            next_crawl_order: crawl_order_start,
            chunk_calls: 0,
            added: 0,
            updated: 0,
            stored_total: 0,
            last_payload: 0,
        }
    }

    /// Merge one round's normalized candidates into the running set. Records
    /// that are new, or whose merged content differs from before, join the
    /// flush queue. Returns how many candidates carried a usable identity.
    pub fn absorb(&mut self, candidates: Vec<CollectedRecord>) -> usize {
        let mut absorbed = 0;
        for mut record in candidates {
            let key = record.identity().to_string();
            if key.is_empty() {
                continue;
            }
            absorbed += 1;
            match self.merged.get_mut(&key) {
                None => {
                    record.set_run_stamp(self.crawl_at, self.next_crawl_order);
                    self.next_crawl_order += 1;
                    self.merged.insert(key.clone(), record.clone());
                    self.seen_order.push(key.clone());
                    Self::queue(&mut self.queued, &mut self.queued_order, key, record);
                }
                Some(existing) => {
                    // crawl_order is assigned once per identity and sticks
                    // through every later sighting.
                    let order = match existing.crawl_order() {
                        Some(order) => order,
                        None => {
                            let order = self.next_crawl_order;
                            self.next_crawl_order += 1;
                            order
                        }
                    };
                    record.set_run_stamp(self.crawl_at, order);
                    let before = content_view(existing);
                    existing.merge_from(&record);
                    if content_view(existing) != before {
                        Self::queue(
                            &mut self.queued,
                            &mut self.queued_order,
                            key,
                            existing.clone(),
                        );
                    }
                }
            }
        }
        absorbed
    }

    fn queue(
        queued: &mut HashMap<String, CollectedRecord>,
        order: &mut Vec<String>,
        key: String,
        record: CollectedRecord,
    ) {
        if !queued.contains_key(&key) {
            order.push(key.clone());
        }
        queued.insert(key, record);
    }

    /// Send the queue to the store if due (or forced). Returns the payload
    /// size, zero when nothing was sent.
    pub async fn flush(&mut self, force: bool) -> Result<usize> {
        if self.queued.is_empty() {
            return Ok(0);
        }
        if !force && self.queued.len() < self.tuning.batch_size {
            return Ok(0);
        }
        let payload: Vec<CollectedRecord> = self
            .queued_order
            .iter()
            .filter_map(|key| self.queued.get(key).cloned())
            .collect();

        let mut last_error = "background merge failed".to_string();
        for attempt in 1..=self.tuning.chunk_retry_limit {
            match self.store.merge_chunk(self.mode, payload.clone()).await {
                Ok(outcome) => {
                    self.added += outcome.added;
                    self.updated += outcome.updated;
                    self.stored_total = outcome.count;
                    self.last_payload = payload.len();
                    self.chunk_calls += 1;
                    self.queued.clear();
                    self.queued_order.clear();
                    debug!(
                        mode = %self.mode,
                        sent = payload.len(),
                        added = outcome.added,
                        updated = outcome.updated,
                        stored_total = outcome.count,
                        "Chunk merged"
                    );
                    return Ok(payload.len());
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(
                        mode = %self.mode,
                        attempt,
                        error = %last_error,
                        "Chunk send failed"
                    );
                    if attempt < self.tuning.chunk_retry_limit {
                        tokio::time::sleep(self.tuning.chunk_retry_backoff * attempt).await;
                    }
                }
            }
        }
        info!(
            mode = %self.mode,
            queued = self.queued.len(),
            "Chunk retries exhausted, aborting run"
        );
        Err(KeepstackError::BackgroundMergeFailure(last_error))
    }

    /// Records in first-seen order.
    pub fn records(&self) -> Vec<CollectedRecord> {
        self.seen_order
            .iter()
            .filter_map(|key| self.merged.get(key).cloned())
            .collect()
    }

    pub fn collected(&self) -> usize {
        self.merged.len()
    }

    pub fn next_crawl_order(&self) -> u64 {
        self.next_crawl_order
    }

    pub fn chunk_calls(&self) -> u32 {
        self.chunk_calls
    }

    pub fn added(&self) -> usize {
        self.added
    }

    pub fn updated(&self) -> usize {
        self.updated
    }

    pub fn stored_total(&self) -> usize {
        self.stored_total
    }

    pub fn last_payload(&self) -> usize {
        self.last_payload
    }
}

/// Structural content view: the record as JSON minus `last_seen_at`, which
/// moves on every sighting and must not count as a change.
fn content_view(record: &CollectedRecord) -> Value {
    let mut value = serde_json::to_value(record).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut value {
        map.remove("last_seen_at");
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{post_candidate, MockStore};

    fn dispatcher(store: Arc<MockStore>, batch_size: usize) -> ChunkedDispatcher {
        let tuning = Tuning::for_mode(Mode::Saved)
            .instant()
            .with_batch_size(batch_size);
        ChunkedDispatcher::new(Mode::Saved, tuning, store, 1_700_000_000_000, 0)
    }

    #[tokio::test]
    async fn crawl_order_is_first_seen_and_sticky() {
        let store = Arc::new(MockStore::new());
        let mut d = dispatcher(store, 100);

        d.absorb(vec![post_candidate("a"), post_candidate("b")]);
        d.absorb(vec![post_candidate("b"), post_candidate("c")]);

        let records = d.records();
        let orders: Vec<u64> = records.iter().filter_map(|r| r.crawl_order()).collect();
        assert_eq!(orders, vec![0, 1, 2]);
        assert_eq!(records[1].identity(), "b");
        assert_eq!(d.next_crawl_order(), 3);
    }

    #[tokio::test]
    async fn identical_resighting_does_not_requeue() {
        let store = Arc::new(MockStore::new());
        let mut d = dispatcher(store.clone(), 100);

        d.absorb(vec![post_candidate("a")]);
        d.flush(true).await.unwrap();

        // Same content again: nothing new to send.
        d.absorb(vec![post_candidate("a")]);
        let sent = d.flush(true).await.unwrap();
        assert_eq!(sent, 0);
        assert_eq!(store.chunk_log().len(), 1);
    }

    #[tokio::test]
    async fn enriched_resighting_requeues_the_record() {
        let store = Arc::new(MockStore::new());
        let mut d = dispatcher(store.clone(), 100);

        d.absorb(vec![post_candidate("a")]);
        d.flush(true).await.unwrap();

        let mut richer = post_candidate("a");
        if let CollectedRecord::Post(p) = &mut richer {
            p.caption = "now with a caption".to_string();
        }
        d.absorb(vec![richer]);
        let sent = d.flush(true).await.unwrap();
        assert_eq!(sent, 1);
    }

    #[tokio::test]
    async fn below_threshold_flush_is_a_no_op_unless_forced() {
        let store = Arc::new(MockStore::new());
        let mut d = dispatcher(store.clone(), 10);
        d.absorb(vec![post_candidate("a"), post_candidate("b")]);

        assert_eq!(d.flush(false).await.unwrap(), 0);
        assert_eq!(store.chunk_log().len(), 0);
        assert_eq!(d.flush(true).await.unwrap(), 2);
        assert_eq!(store.chunk_log().len(), 1);
    }

    #[tokio::test]
    async fn transient_failures_retry_then_succeed() {
        let store = Arc::new(MockStore::new().fail_times(2));
        let mut d = dispatcher(store.clone(), 1);
        d.absorb(vec![post_candidate("a")]);

        let sent = d.flush(false).await.unwrap();
        assert_eq!(sent, 1);
        assert_eq!(d.chunk_calls(), 1);
    }

    #[tokio::test]
    async fn retry_exhaustion_is_a_merge_failure() {
        let store = Arc::new(MockStore::new().fail_times(3));
        let mut d = dispatcher(store, 1);
        d.absorb(vec![post_candidate("a")]);

        let err = d.flush(false).await.unwrap_err();
        assert!(matches!(err, KeepstackError::BackgroundMergeFailure(_)));
    }
}
