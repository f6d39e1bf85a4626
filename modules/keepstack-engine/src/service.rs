//! Collection service: the control surface over engine runs.
//!
//! Owns the run registry and turns "start collecting" / "stop collecting"
//! requests into outcomes. Every failure mode becomes a structured outcome
//! rather than a propagated panic: callers on the other side of the control
//! channel only ever see `RunOutcome` / `StopOutcome`.

use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use keepstack_common::{Mode, Tuning};

use crate::cancel::{RunRegistry, StopToken};
use crate::engine::CollectEngine;
use crate::orchestrator::SavedOrchestrator;
use crate::stats::RunMeta;
use crate::traits::{Extractor, MergeStore, Page};

/// Result of a start request, success or not.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub ok: bool,
    pub mode: Mode,
    /// Unique records collected by this run.
    pub count: usize,
    pub meta: Option<RunMeta>,
    pub error: Option<String>,
}

/// Result of a stop request.
#[derive(Debug, Clone)]
pub struct StopOutcome {
    pub ok: bool,
    /// Whether a run was actually in flight when the request landed.
    pub running: bool,
}

pub struct CollectionService {
    registry: Arc<RunRegistry>,
    page: Arc<dyn Page>,
    saved_extractor: Arc<dyn Extractor>,
    follow_extractor: Arc<dyn Extractor>,
    store: Arc<dyn MergeStore>,
    /// Overrides the per-mode defaults when set.
    tuning: Option<Tuning>,
}

impl CollectionService {
    pub fn new(
        page: Arc<dyn Page>,
        saved_extractor: Arc<dyn Extractor>,
        follow_extractor: Arc<dyn Extractor>,
        store: Arc<dyn MergeStore>,
    ) -> Self {
        Self {
            registry: RunRegistry::new(),
            page,
            saved_extractor,
            follow_extractor,
            store,
            tuning: None,
        }
    }

    pub fn with_tuning(mut self, tuning: Tuning) -> Self {
        self.tuning = Some(tuning);
        self
    }

    /// Start a run for a mode named over the wire.
    pub async fn start_collection_str(&self, mode: &str) -> RunOutcome {
        match mode.parse::<Mode>() {
            Ok(mode) => self.start_collection(mode).await,
            Err(e) => RunOutcome {
                ok: false,
                mode: Mode::Saved,
                count: 0,
                meta: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// Run a full collection pass for `mode`. Exactly one run per mode may
    /// be in flight; a second start returns an error outcome without touching
    /// the first.
    pub async fn start_collection(&self, mode: Mode) -> RunOutcome {
        let guard = match self.registry.begin(mode, self.store.clone()) {
            Ok(guard) => guard,
            // Typically AlreadyRunning; the in-flight run is left untouched.
            Err(e) => {
                return RunOutcome {
                    ok: false,
                    mode,
                    count: 0,
                    meta: None,
                    error: Some(e.to_string()),
                };
            }
        };

        let run_id = Uuid::new_v4().to_string();
        info!(mode = %mode, run_id = run_id.as_str(), "Collection run starting");

        // A stale stop flag from an earlier interrupted run must not cancel
        // this one on its first checkpoint.
        guard.token.clear().await;

        let outcome = self.execute(mode, &guard.token, run_id).await;

        // Leave no flags behind, success or failure.
        guard.token.clear().await;
        drop(guard);
        outcome
    }

    async fn execute(&self, mode: Mode, token: &StopToken, run_id: String) -> RunOutcome {
        let tuning = self
            .tuning
            .clone()
            .unwrap_or_else(|| Tuning::for_mode(mode));
        let result = match mode {
            Mode::Saved => {
                let orchestrator = SavedOrchestrator::new(
                    tuning,
                    self.page.clone(),
                    self.saved_extractor.clone(),
                    self.store.clone(),
                );
                orchestrator.run(token).await.map(|outcome| {
                    let mut meta = RunMeta::from_engine(run_id, &mode.to_string(), &outcome.meta);
                    meta.targets = outcome.targets;
                    (outcome.records.len(), meta)
                })
            }
            Mode::Following => {
                let engine = CollectEngine::new(
                    mode,
                    tuning,
                    self.page.clone(),
                    self.follow_extractor.clone(),
                    self.store.clone(),
                );
                engine
                    .run(token, chrono::Utc::now().timestamp_millis(), 0)
                    .await
                    .map(|result| {
                        let meta =
                            RunMeta::from_engine(run_id, &mode.to_string(), &result.meta);
                        (result.records.len(), meta)
                    })
            }
        };

        match result {
            Ok((count, meta)) => {
                info!(mode = %mode, count, stopped = meta.stopped, "Collection run finished");
                RunOutcome {
                    ok: true,
                    mode,
                    count,
                    meta: Some(meta),
                    error: None,
                }
            }
            Err(e) => {
                error!(mode = %mode, error = %e, "Collection run failed");
                RunOutcome {
                    ok: false,
                    mode,
                    count: 0,
                    meta: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Request cancellation of the in-flight run for `mode`. With no run in
    /// flight the durable flag is still raised, so a run that lost its
    /// registry entry (or lives in another process) can pick it up.
    pub async fn request_stop(&self, mode: Mode) -> StopOutcome {
        match self.registry.active_token(mode) {
            Some(token) => {
                token.request().await;
                StopOutcome {
                    ok: true,
                    running: true,
                }
            }
            None => {
                let token = StopToken::new(mode, self.store.clone());
                token.request().await;
                StopOutcome {
                    ok: true,
                    running: false,
                }
            }
        }
    }

    pub fn is_running(&self, mode: Mode) -> bool {
        self.registry.is_running(mode)
    }
}
