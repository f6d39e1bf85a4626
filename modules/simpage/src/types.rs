use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A full page script: the routes a simulated session can visit and where
/// it starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageScript {
    pub start_path: String,
    /// Route path → behavior. Paths are normalized with a trailing slash.
    pub routes: HashMap<String, RouteScript>,
}

/// One navigable route. Content is revealed frame by frame: every scroll
/// step on the route's driving surface advances to the next frame (capped at
/// the last), so growth and reveal schedules are fully scripted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteScript {
    /// Scroll frames in order. At least one frame is required.
    pub frames: Vec<Frame>,
    /// Post population; a frame's `visible` count is a prefix of this list.
    #[serde(default)]
    pub posts: Vec<SimPost>,
    /// Profile population, revealed the same way.
    #[serde(default)]
    pub profiles: Vec<SimProfile>,
    /// Anchor hrefs present on this route (normalized paths).
    #[serde(default)]
    pub links: Vec<String>,
    /// Viewport height of the document scroller.
    #[serde(default = "default_viewport")]
    pub viewport_height: i64,
    /// Modal overlay hosting the profile list, if any.
    #[serde(default)]
    pub overlay: Option<OverlayScript>,
    /// When false, navigation to this route never lands (the path keeps
    /// pointing at the previous route). Models a route that never stabilizes.
    #[serde(default = "default_true")]
    pub navigable: bool,
}

fn default_viewport() -> i64 {
    900
}

fn default_true() -> bool {
    true
}

/// One scroll frame: the scrollable extent and how many items are rendered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Frame {
    pub content_height: i64,
    pub visible: usize,
}

/// A modal overlay containing a single scrollable pane. When present, the
/// pane is the route's driving surface and the document stays viewport-sized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayScript {
    pub heading: String,
    #[serde(default = "default_pane_viewport")]
    pub pane_viewport: i64,
}

fn default_pane_viewport() -> i64 {
    400
}

/// A rendered post tile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimPost {
    pub id: String,
    /// Path segment kind: `p`, `reel`, `reels` or `tv`.
    pub kind: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub saved_at: String,
}

/// A rendered profile row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimProfile {
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub bio: String,
}

/// Observable metrics of one scroll surface, as a locator heuristic would
/// read them off the DOM.
#[derive(Debug, Clone)]
pub struct SimSurface {
    pub id: String,
    pub is_document: bool,
    /// This surface is a dialog-role overlay container.
    pub dialog_role: bool,
    /// Id of the containing overlay, for overlay descendants.
    pub parent_dialog: Option<String>,
    pub heading: String,
    pub content_height: i64,
    pub viewport_height: i64,
    pub scroll_top: i64,
    pub overflow_scroll: bool,
    /// Distinct identity-bearing links rendered inside this surface.
    pub identity_link_count: usize,
}

impl PageScript {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let script: Self = serde_json::from_str(json)?;
        for (path, route) in &script.routes {
            anyhow::ensure!(!route.frames.is_empty(), "route {path} has no frames");
        }
        Ok(script)
    }
}
