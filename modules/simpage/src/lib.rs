//! simpage: deterministic scripted-page simulator for scroll-collection
//! engines.
//!
//! Domain-agnostic stand-in for a live DOM: scriptable scroll surfaces,
//! modal overlays, routes with anchor links, and per-scroll content reveal.
//! Scripts are plain serde structs, loadable from JSON, so a page's behavior
//! over an entire run is reproducible byte for byte.

pub mod page;
pub mod types;

pub use page::{
    normalize_path, SimPage, DOCUMENT_SURFACE, OVERLAY_PANE_SURFACE, OVERLAY_SURFACE,
};
pub use types::{
    Frame, OverlayScript, PageScript, RouteScript, SimPost, SimProfile, SimSurface,
};
