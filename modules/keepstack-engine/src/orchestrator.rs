//! Multi-target orchestrator for the saved-post mode.
//!
//! Saved posts live under per-folder sub-views plus a canonical "all-posts"
//! view. The orchestrator enumerates reachable folder targets, navigates to
//! each, waits for the route to stabilize, and runs the single-target engine
//! with one shared crawl-order counter so cross-target ordering holds. The
//! all-posts view always runs last: a record first seen in a specific folder
//! keeps that folder tag through the catch-all pass.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn};

use keepstack_common::{CollectedRecord, KeepstackError, Mode, Result, Tuning, MAX_USERNAME_LEN};

use crate::cancel::StopToken;
use crate::engine::CollectEngine;
use crate::stats::{EngineMeta, TargetMeta};
use crate::traits::{Extractor, MergeStore, Page};

const SAVED_SEGMENT: &str = "saved";
const ALL_POSTS_SEGMENT: &str = "all-posts";

/// Reserved path segments that can never be an owner profile.
const BLOCKED_PROFILE_SEGMENTS: &[&str] = &[
    "accounts", "account", "about", "explore", "reels", "reel", "p", "tags", "tv", "developers",
    "directory", "legal", "help", "stories", "support", "login", "logout", "terms", "privacy",
];

pub struct OrchestratorOutcome {
    pub records: Vec<CollectedRecord>,
    pub meta: EngineMeta,
    pub targets: Vec<TargetMeta>,
}

pub struct SavedOrchestrator {
    tuning: Tuning,
    page: Arc<dyn Page>,
    engine: CollectEngine,
}

impl SavedOrchestrator {
    pub fn new(
        tuning: Tuning,
        page: Arc<dyn Page>,
        extractor: Arc<dyn Extractor>,
        store: Arc<dyn MergeStore>,
    ) -> Self {
        let engine = CollectEngine::new(
            Mode::Saved,
            tuning.clone(),
            page.clone(),
            extractor,
            store,
        );
        Self {
            tuning,
            page,
            engine,
        }
    }

    pub async fn run(&self, token: &StopToken) -> Result<OrchestratorOutcome> {
        let targets = self.folder_targets().await;
        if targets.is_empty() {
            // Not on a saved directory: plain single-target collection.
            let result = self.engine.run(token, now_ms(), 0).await?;
            return Ok(OrchestratorOutcome {
                records: result.records,
                meta: result.meta,
                targets: Vec::new(),
            });
        }
        info!(targets = targets.len(), "Saved-folder targets enumerated");

        let crawl_at = now_ms();
        let mut crawl_order = 0;
        let mut seen: HashSet<String> = HashSet::new();
        let mut records: Vec<CollectedRecord> = Vec::new();
        let mut target_history: Vec<TargetMeta> = Vec::new();
        let mut aggregate = EngineMeta {
            batch_size: self.tuning.batch_size,
            ..EngineMeta::default()
        };

        for target in targets {
            // Checkpoint: before navigating to a new target.
            if token.is_requested_durable().await {
                aggregate.stopped = true;
                break;
            }

            if !self.navigate_to(&target).await {
                let reason = KeepstackError::NavigationTimeout(target.clone()).to_string();
                warn!(target = target.as_str(), "Target skipped: route never stabilized");
                target_history.push(TargetMeta {
                    target,
                    skipped: Some(reason),
                    count: 0,
                    meta: EngineMeta::default(),
                });
                continue;
            }

            let result = self.engine.run(token, crawl_at, crawl_order).await?;
            crawl_order = result.next_crawl_order;

            // First-seen wins across targets: a folder-tagged record beats
            // its later all-posts sighting.
            for record in &result.records {
                if seen.insert(record.identity().to_string()) {
                    records.push(record.clone());
                }
            }

            aggregate.total_checked += result.meta.total_checked;
            aggregate.total_candidates += result.meta.total_candidates;
            aggregate.rounds = aggregate.rounds.max(result.meta.rounds);
            aggregate.max_rounds_reached |= result.meta.max_rounds_reached;
            aggregate.chunk_calls += result.meta.chunk_calls;
            aggregate.appended += result.meta.appended;
            aggregate.updated += result.meta.updated;
            aggregate.stored_total = result.meta.stored_total;
            aggregate.last_payload = result.meta.last_payload;
            aggregate.reached_bottom = result.meta.reached_bottom;
            let stopped = result.meta.stopped;
            target_history.push(TargetMeta {
                target,
                skipped: None,
                count: result.records.len(),
                meta: result.meta,
            });
            if stopped {
                aggregate.stopped = true;
                break;
            }
        }

        aggregate.collected = records.len();
        Ok(OrchestratorOutcome {
            records,
            meta: aggregate,
            targets: target_history,
        })
    }

    /// Targets in run order: current folder first, then folders reachable by
    /// link, with the canonical all-posts view last.
    async fn folder_targets(&self) -> Vec<String> {
        let current = self.page.current_path().await;
        let owner = match saved_owner_from_path(&current) {
            Some(owner) => owner,
            None => return Vec::new(),
        };

        let mut targets: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for link in self.page.link_paths().await {
            let Some((link_owner, folder)) = saved_folder_from_path(&link) else {
                continue;
            };
            if link_owner != owner || folder == ALL_POSTS_SEGMENT {
                continue;
            }
            let path = folder_path(&owner, &folder);
            if seen.insert(path.clone()) {
                targets.push(path);
            }
        }

        if let Some((_, folder)) = saved_folder_from_path(&current) {
            if folder != ALL_POSTS_SEGMENT {
                let path = folder_path(&owner, &folder);
                if seen.insert(path.clone()) {
                    targets.insert(0, path);
                }
            }
        }

        targets.push(folder_path(&owner, ALL_POSTS_SEGMENT));
        targets
    }

    async fn navigate_to(&self, target: &str) -> bool {
        if self.page.current_path().await == target {
            return self.wait_route_ready(target).await;
        }
        if !self.page.click_link(target).await {
            self.page.navigate(target).await;
        }
        self.wait_route_ready(target).await
    }

    /// Poll until the route points at `target` and its rendered link count
    /// settles: stable across two polls, zero links, or a held path match
    /// past the quick-settle window.
    async fn wait_route_ready(&self, target: &str) -> bool {
        let start = Instant::now();
        let mut last_count: Option<usize> = None;

        while start.elapsed() < self.tuning.route_timeout {
            if self.page.current_path().await == target {
                let count = self.page.identity_link_count().await;
                if count == 0 {
                    return true;
                }
                if last_count == Some(count) {
                    return true;
                }
                if start.elapsed() >= self.tuning.route_quick_settle {
                    return true;
                }
                last_count = Some(count);
            } else {
                last_count = None;
            }
            tokio::time::sleep(self.tuning.route_poll_interval).await;
        }
        self.page.current_path().await == target
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn folder_path(owner: &str, folder: &str) -> String {
    format!("/{owner}/{SAVED_SEGMENT}/{folder}/")
}

fn valid_profile_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment.len() <= MAX_USERNAME_LEN
        && !BLOCKED_PROFILE_SEGMENTS.contains(&segment)
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
}

/// Owner profile of a `/{owner}/saved/...` path, if this is one.
pub fn saved_owner_from_path(path: &str) -> Option<String> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [owner, seg, ..] if *seg == SAVED_SEGMENT && valid_profile_segment(owner) => {
            Some((*owner).to_string())
        }
        _ => None,
    }
}

/// `(owner, folder)` of a `/{owner}/saved/{folder}/` path, if this is one.
pub fn saved_folder_from_path(path: &str) -> Option<(String, String)> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [owner, seg, folder] if *seg == SAVED_SEGMENT && valid_profile_segment(owner) => {
            Some(((*owner).to_string(), folder.trim().to_lowercase()))
        }
        _ => None,
    }
}
