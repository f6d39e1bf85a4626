// Trait abstractions for the collection engine's three seams.
//
// Page: observation/actuation facade over the scrollable page.
// Extractor: the injected, inherently fragile candidate-extraction policy.
// MergeStore: the persistent identity-keyed merge store.
//
// These enable deterministic testing with scripted pages and mock stores:
// no browser, no filesystem unless a test wants one.

use anyhow::Result;
use async_trait::async_trait;

use keepstack_common::{CollectedRecord, Mode, RawCandidate};
use keepstack_vault::{MergeOutcome, Vault};

/// Observable metrics of one scroll surface. The locator heuristics consume
/// only these generic fields; nothing selector-shaped leaks into the engine.
#[derive(Debug, Clone)]
pub struct Surface {
    pub id: String,
    /// The page's own scrolling context (window scroller).
    pub is_document: bool,
    /// Dialog-role overlay container.
    pub dialog_role: bool,
    /// Id of the containing overlay for overlay descendants.
    pub parent_dialog: Option<String>,
    /// Heading text, used to score follow-list overlays.
    pub heading: String,
    pub content_height: i64,
    pub viewport_height: i64,
    pub scroll_top: i64,
    /// Overflow style permits scrolling regardless of current heights.
    pub overflow_scroll: bool,
    /// Distinct identity-bearing links rendered inside this surface.
    pub identity_link_count: usize,
}

/// Facade over the live page. Implementations must tolerate being polled
/// every round; the DOM may swap surfaces between rounds.
#[async_trait]
pub trait Page: Send + Sync {
    /// Origin used to absolutize relative links.
    async fn base_url(&self) -> String;

    /// All scroll surfaces currently present, document first by convention.
    async fn surfaces(&self) -> Vec<Surface>;

    /// Scroll one surface down by `px`.
    async fn scroll_by(&self, surface_id: &str, px: i64);

    /// Current route path, normalized with a trailing slash.
    async fn current_path(&self) -> String;

    /// Anchor hrefs on the page, as normalized paths.
    async fn link_paths(&self) -> Vec<String>;

    /// Click an anchor matching `path`. Returns false when no such anchor
    /// is rendered.
    async fn click_link(&self, path: &str) -> bool;

    /// Direct history navigation with a synthetic route-change signal.
    async fn navigate(&self, path: &str);

    /// Count of identity-bearing links, polled during route stabilization.
    async fn identity_link_count(&self) -> usize;
}

/// Injected extraction capability: a pure, idempotent read of currently
/// rendered content. The engine calls it once per round and tolerates
/// overlapping or empty results; failure is a logged empty round, not fatal.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self) -> Result<Vec<RawCandidate>>;
}

/// Persistent identity-keyed merge store plus the durable stop-flag channel.
#[async_trait]
pub trait MergeStore: Send + Sync {
    /// Merge one chunk into the mode's collection.
    async fn merge_chunk(&self, mode: Mode, items: Vec<CollectedRecord>) -> Result<MergeOutcome>;

    /// Durable stop flag. Read failures degrade to `false` so a flaky store
    /// cannot cancel a run on its own.
    async fn stop_requested(&self, mode: Mode) -> bool;

    /// Set or clear the durable stop flag.
    async fn set_stop_request(&self, mode: Mode, requested: bool) -> Result<()>;
}

#[async_trait]
impl MergeStore for Vault {
    async fn merge_chunk(&self, mode: Mode, items: Vec<CollectedRecord>) -> Result<MergeOutcome> {
        Ok(Vault::merge_chunk(self, mode, items).await?)
    }

    async fn stop_requested(&self, mode: Mode) -> bool {
        match Vault::stop_requested(self, mode).await {
            Ok(requested) => requested,
            Err(e) => {
                tracing::warn!(mode = %mode, error = %e, "Stop-flag read failed");
                false
            }
        }
    }

    async fn set_stop_request(&self, mode: Mode, requested: bool) -> Result<()> {
        Ok(Vault::set_stop_request(self, mode, requested).await?)
    }
}
