use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use keepstack_common::{
    meaningful, CollectedRecord, FollowRecord, KeepstackError, Mode, PostRecord, Result,
};

/// Root data directory, controlled by `DATA_DIR` env var (default: `"data"`).
pub fn data_dir() -> PathBuf {
    PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()))
}

const VAULT_FILE: &str = "vault.json";

/// Result of merging one chunk into a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    /// Total records in the collection after the merge.
    pub count: usize,
    pub added: usize,
    pub updated: usize,
}

/// Read-only view of the vault contents.
#[derive(Debug, Clone, Serialize)]
pub struct VaultSnapshot {
    pub saved_posts: Vec<PostRecord>,
    pub friends: Vec<FollowRecord>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct VaultState {
    #[serde(default)]
    saved_posts: Vec<PostRecord>,
    #[serde(default)]
    friends: Vec<FollowRecord>,
    #[serde(default)]
    stop_requests: HashMap<String, bool>,
}

/// JSON-file-backed merge store. All writes are merge-read-then-write
/// round-trips; the single-run-per-mode rule upstream makes the engine the
/// only writer in practice.
pub struct Vault {
    path: PathBuf,
    state: Mutex<VaultState>,
}

impl Vault {
    /// Open (or create) the vault under `dir`. A missing file starts empty;
    /// a corrupt file is logged and replaced rather than failing the run.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .map_err(|e| KeepstackError::Storage(format!("create {}: {e}", dir.display())))?;
        let path = dir.join(VAULT_FILE);
        let state = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<VaultState>(&bytes) {
                Ok(state) => state,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Corrupt vault file, starting empty");
                    VaultState::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => VaultState::default(),
            Err(e) => {
                return Err(KeepstackError::Storage(format!(
                    "read {}: {e}",
                    path.display()
                )))
            }
        };
        info!(
            path = %path.display(),
            saved = state.saved_posts.len(),
            friends = state.friends.len(),
            "Vault opened"
        );
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Merge a chunk of records into the mode's collection. Records whose
    /// identity cannot be derived are skipped. Returns post-merge totals.
    pub async fn merge_chunk(
        &self,
        mode: Mode,
        items: Vec<CollectedRecord>,
    ) -> Result<MergeOutcome> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let outcome = match mode {
            Mode::Saved => {
                let posts = items.into_iter().filter_map(|r| match r {
                    CollectedRecord::Post(p) => Some(p),
                    CollectedRecord::Follow(_) => None,
                });
                let outcome = merge_posts(&mut state.saved_posts, posts, now);
                sort_derived(&mut state.saved_posts, |p| {
                    (p.crawl_at, p.crawl_order, p.last_seen_at)
                });
                outcome
            }
            Mode::Following => {
                let follows = items.into_iter().filter_map(|r| match r {
                    CollectedRecord::Follow(f) => Some(f),
                    CollectedRecord::Post(_) => None,
                });
                let outcome = merge_follows(&mut state.friends, follows, now);
                sort_derived(&mut state.friends, |f| {
                    (f.crawl_at, f.crawl_order, f.last_seen_at)
                });
                outcome
            }
        };
        self.persist(&state)?;
        Ok(outcome)
    }

    /// Durable stop flag for a mode. Absent means not requested.
    pub async fn stop_requested(&self, mode: Mode) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state
            .stop_requests
            .get(mode.as_str())
            .copied()
            .unwrap_or(false))
    }

    /// Set or clear the durable stop flag. Idempotent.
    pub async fn set_stop_request(&self, mode: Mode, requested: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        if requested {
            state.stop_requests.insert(mode.as_str().to_string(), true);
        } else {
            state.stop_requests.remove(mode.as_str());
        }
        self.persist(&state)
    }

    /// Bulk clear of both collections. Stop flags are left alone so a
    /// pending stop request still reaches its run.
    pub async fn clear_all(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.saved_posts.clear();
        state.friends.clear();
        self.persist(&state)
    }

    pub async fn snapshot(&self) -> VaultSnapshot {
        let state = self.state.lock().await;
        VaultSnapshot {
            saved_posts: state.saved_posts.clone(),
            friends: state.friends.clone(),
        }
    }

    /// Atomic write: temp file in the same directory, then rename.
    fn persist(&self, state: &VaultState) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| KeepstackError::Storage(format!("serialize vault: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &bytes)
            .map_err(|e| KeepstackError::Storage(format!("write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| KeepstackError::Storage(format!("rename {}: {e}", self.path.display())))?;
        Ok(())
    }
}

fn merge_posts(
    existing: &mut Vec<PostRecord>,
    incoming: impl Iterator<Item = PostRecord>,
    now: chrono::DateTime<Utc>,
) -> MergeOutcome {
    let mut added = 0;
    let mut updated = 0;
    for mut post in incoming {
        post.id = post.id.trim().to_string();
        if !meaningful(&post.id) {
            continue;
        }
        post.last_seen_at = now;
        match existing.iter_mut().find(|p| p.id == post.id) {
            Some(current) => {
                current.merge_from(&post);
                updated += 1;
            }
            None => {
                existing.push(post);
                added += 1;
            }
        }
    }
    MergeOutcome {
        count: existing.len(),
        added,
        updated,
    }
}

fn merge_follows(
    existing: &mut Vec<FollowRecord>,
    incoming: impl Iterator<Item = FollowRecord>,
    now: chrono::DateTime<Utc>,
) -> MergeOutcome {
    let mut added = 0;
    let mut updated = 0;
    for mut follow in incoming {
        follow.username = follow
            .username
            .trim()
            .trim_start_matches('@')
            .to_lowercase();
        if !meaningful(&follow.username) {
            continue;
        }
        follow.last_seen_at = now;
        if !meaningful(&follow.display_name) {
            follow.display_name = follow.username.clone();
        }
        match existing.iter_mut().find(|f| f.username == follow.username) {
            Some(current) => {
                current.merge_from(&follow);
                updated += 1;
            }
            None => {
                existing.push(follow);
                added += 1;
            }
        }
    }
    MergeOutcome {
        count: existing.len(),
        added,
        updated,
    }
}

/// Derived ordering: `crawl_at` descending (falling back to `last_seen_at`
/// in epoch-ms), then `crawl_order` ascending with missing orders last, then
/// `last_seen_at` descending.
fn sort_derived<T>(
    records: &mut [T],
    key: impl Fn(&T) -> (Option<i64>, Option<u64>, chrono::DateTime<Utc>),
) {
    records.sort_by(|a, b| {
        let (a_at, a_order, a_seen) = key(a);
        let (b_at, b_order, b_seen) = key(b);
        let a_stamp = a_at.unwrap_or_else(|| a_seen.timestamp_millis());
        let b_stamp = b_at.unwrap_or_else(|| b_seen.timestamp_millis());
        b_stamp
            .cmp(&a_stamp)
            .then_with(|| {
                a_order
                    .unwrap_or(u64::MAX)
                    .cmp(&b_order.unwrap_or(u64::MAX))
            })
            .then_with(|| b_seen.cmp(&a_seen))
    });
}
