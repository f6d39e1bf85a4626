//! Cancellation channel and run registry.
//!
//! A stop request must reach a run even when the surface that issued it has
//! no direct channel to the running engine. The token therefore keeps the
//! flag in three places: its own atomic, a process-wide per-mode set, and
//! the durable store flag. Requests and clears propagate to all three; the
//! effective state is their OR. Cancellation stays cooperative: the engine
//! observes the flag at its round checkpoints and still performs its final
//! forced flush.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tracing::{info, warn};

use keepstack_common::{KeepstackError, Mode, Result};

use crate::traits::MergeStore;

static PROCESS_FLAGS: OnceLock<Mutex<HashSet<(usize, Mode)>>> = OnceLock::new();

fn process_flags() -> &'static Mutex<HashSet<(usize, Mode)>> {
    PROCESS_FLAGS.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Mode-keyed cooperative stop flag with a durable fallback.
pub struct StopToken {
    mode: Mode,
    /// Context key for the process-wide flag set. Tokens sharing a store
    /// belong to the same page context and see each other's requests.
    ctx: usize,
    local: AtomicBool,
    store: Arc<dyn MergeStore>,
}

impl StopToken {
    pub fn new(mode: Mode, store: Arc<dyn MergeStore>) -> Arc<Self> {
        let ctx = Arc::as_ptr(&store) as *const () as usize;
        Arc::new(Self {
            mode,
            ctx,
            local: AtomicBool::new(false),
            store,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Idempotent: sets the local, process-wide and durable flags.
    pub async fn request(&self) {
        self.local.store(true, Ordering::SeqCst);
        if let Ok(mut flags) = process_flags().lock() {
            flags.insert((self.ctx, self.mode));
        }
        if let Err(e) = self.store.set_stop_request(self.mode, true).await {
            warn!(mode = %self.mode, error = %e, "Durable stop flag write failed");
        }
        info!(mode = %self.mode, "Stop requested");
    }

    /// Clears all three locations.
    pub async fn clear(&self) {
        self.local.store(false, Ordering::SeqCst);
        if let Ok(mut flags) = process_flags().lock() {
            flags.remove(&(self.ctx, self.mode));
        }
        if let Err(e) = self.store.set_stop_request(self.mode, false).await {
            warn!(mode = %self.mode, error = %e, "Durable stop flag clear failed");
        }
    }

    /// Fast in-memory check: local or process-wide flag.
    pub fn is_requested(&self) -> bool {
        if self.local.load(Ordering::SeqCst) {
            return true;
        }
        process_flags()
            .lock()
            .map(|flags| flags.contains(&(self.ctx, self.mode)))
            .unwrap_or(false)
    }

    /// Round-checkpoint check: additionally consults the durable flag, so a
    /// request issued from a disconnected surface still lands.
    pub async fn is_requested_durable(&self) -> bool {
        if self.is_requested() {
            return true;
        }
        self.store.stop_requested(self.mode).await
    }
}

/// Per-mode run ownership. One engine run per mode; different modes run
/// independently.
#[derive(Default)]
pub struct RunRegistry {
    runs: Mutex<HashMap<Mode, Arc<StopToken>>>,
}

impl RunRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim a mode for a new run. Fails with `AlreadyRunning` without
    /// touching the in-flight run.
    pub fn begin(
        self: &Arc<Self>,
        mode: Mode,
        store: Arc<dyn MergeStore>,
    ) -> Result<RunGuard> {
        let mut runs = self
            .runs
            .lock()
            .map_err(|_| KeepstackError::Storage("run registry poisoned".to_string()))?;
        if runs.contains_key(&mode) {
            return Err(KeepstackError::AlreadyRunning(mode));
        }
        let token = StopToken::new(mode, store);
        runs.insert(mode, token.clone());
        Ok(RunGuard {
            registry: self.clone(),
            mode,
            token,
        })
    }

    /// The running token for a mode, if any.
    pub fn active_token(&self, mode: Mode) -> Option<Arc<StopToken>> {
        self.runs.lock().ok().and_then(|runs| runs.get(&mode).cloned())
    }

    pub fn is_running(&self, mode: Mode) -> bool {
        self.runs
            .lock()
            .map(|runs| runs.contains_key(&mode))
            .unwrap_or(false)
    }
}

/// Releases the mode slot when the run ends, however it ends.
pub struct RunGuard {
    registry: Arc<RunRegistry>,
    mode: Mode,
    pub token: Arc<StopToken>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Ok(mut runs) = self.registry.runs.lock() {
            runs.remove(&self.mode);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockStore;

    #[tokio::test]
    async fn request_propagates_to_durable_store_and_clear_undoes_it() {
        let store = Arc::new(MockStore::new());
        let token = StopToken::new(Mode::Following, store.clone() as Arc<dyn MergeStore>);

        assert!(!token.is_requested_durable().await);
        token.request().await;
        assert!(token.is_requested());
        assert!(store.durable_stop(Mode::Following));

        // A fresh token for the same mode sees the process-wide flag.
        let other = StopToken::new(Mode::Following, store.clone() as Arc<dyn MergeStore>);
        assert!(other.is_requested());

        token.clear().await;
        assert!(!token.is_requested_durable().await);
        assert!(!store.durable_stop(Mode::Following));
    }

    #[tokio::test]
    async fn durable_flag_alone_reaches_a_run() {
        let store = Arc::new(MockStore::new());
        let token = StopToken::new(Mode::Saved, store.clone() as Arc<dyn MergeStore>);
        store.set_durable_stop(Mode::Saved, true);

        assert!(!token.is_requested());
        assert!(token.is_requested_durable().await);
        token.clear().await;
    }

    #[tokio::test]
    async fn registry_rejects_double_begin_per_mode() {
        let registry = RunRegistry::new();
        let store = Arc::new(MockStore::new()) as Arc<dyn MergeStore>;

        let guard = registry.begin(Mode::Saved, store.clone()).unwrap();
        assert!(registry.is_running(Mode::Saved));
        assert!(matches!(
            registry.begin(Mode::Saved, store.clone()),
            Err(KeepstackError::AlreadyRunning(Mode::Saved))
        ));
        // A different mode is unaffected.
        let other = registry.begin(Mode::Following, store.clone()).unwrap();
        drop(other);

        drop(guard);
        assert!(!registry.is_running(Mode::Saved));
        assert!(registry.begin(Mode::Saved, store).is_ok());
    }
}
