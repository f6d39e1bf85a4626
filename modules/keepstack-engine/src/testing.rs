//! Test doubles shared by this crate's tests and by downstream crates via
//! the `test-support` feature.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;

use keepstack_common::{CollectedRecord, Mode, PostKind, PostRecord};
use keepstack_vault::MergeOutcome;

use crate::traits::MergeStore;

#[derive(Default)]
struct MockState {
    records: HashMap<String, CollectedRecord>,
    chunks: Vec<Vec<CollectedRecord>>,
    failures_remaining: u32,
    stops: HashSet<Mode>,
}

/// In-memory `MergeStore` with the same merge semantics as the vault, plus
/// scripted transient failures and inspectable chunk history.
#[derive(Default)]
pub struct MockStore {
    state: Mutex<MockState>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` merge calls before succeeding.
    pub fn fail_times(self, n: u32) -> Self {
        self.state.lock().unwrap().failures_remaining = n;
        self
    }

    /// Every successfully merged chunk payload, in send order.
    pub fn chunk_log(&self) -> Vec<Vec<CollectedRecord>> {
        self.state.lock().unwrap().chunks.clone()
    }

    /// Records currently held, in no particular order.
    pub fn records(&self) -> Vec<CollectedRecord> {
        self.state.lock().unwrap().records.values().cloned().collect()
    }

    pub fn record(&self, identity: &str) -> Option<CollectedRecord> {
        self.state.lock().unwrap().records.get(identity).cloned()
    }

    pub fn stored_count(&self) -> usize {
        self.state.lock().unwrap().records.len()
    }

    pub fn durable_stop(&self, mode: Mode) -> bool {
        self.state.lock().unwrap().stops.contains(&mode)
    }

    pub fn set_durable_stop(&self, mode: Mode, requested: bool) {
        let mut state = self.state.lock().unwrap();
        if requested {
            state.stops.insert(mode);
        } else {
            state.stops.remove(&mode);
        }
    }
}

#[async_trait]
impl MergeStore for MockStore {
    async fn merge_chunk(&self, _mode: Mode, items: Vec<CollectedRecord>) -> Result<MergeOutcome> {
        let mut state = self.state.lock().unwrap();
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            bail!("simulated merge failure");
        }
        let mut added = 0;
        let mut updated = 0;
        for item in &items {
            let key = item.identity().to_string();
            if key.is_empty() {
                continue;
            }
            match state.records.get_mut(&key) {
                Some(existing) => {
                    existing.merge_from(item);
                    updated += 1;
                }
                None => {
                    state.records.insert(key, item.clone());
                    added += 1;
                }
            }
        }
        state.chunks.push(items);
        Ok(MergeOutcome {
            count: state.records.len(),
            added,
            updated,
        })
    }

    async fn stop_requested(&self, mode: Mode) -> bool {
        self.durable_stop(mode)
    }

    async fn set_stop_request(&self, mode: Mode, requested: bool) -> Result<()> {
        self.set_durable_stop(mode, requested);
        Ok(())
    }
}

/// A minimal post record with the given id, ready for dispatcher absorption.
pub fn post_candidate(id: &str) -> CollectedRecord {
    let now = Utc::now();
    CollectedRecord::Post(PostRecord {
        id: id.to_string(),
        kind: PostKind::Photo,
        link: format!("https://sim.page/p/{id}/"),
        username: String::new(),
        caption: String::new(),
        thumbnail: String::new(),
        source_folder: String::new(),
        saved_at: String::new(),
        discovered_at: now,
        last_seen_at: now,
        crawl_at: None,
        crawl_order: None,
    })
}
