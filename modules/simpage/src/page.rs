use std::collections::HashMap;

use tracing::debug;

use crate::types::{Frame, PageScript, RouteScript, SimPost, SimProfile, SimSurface};

pub const DOCUMENT_SURFACE: &str = "document";
pub const OVERLAY_SURFACE: &str = "overlay";
pub const OVERLAY_PANE_SURFACE: &str = "overlay-pane";

/// Normalize a path to the trailing-slash form used as route keys.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return "/".to_string();
    }
    let mut out = String::new();
    if !trimmed.starts_with('/') {
        out.push('/');
    }
    out.push_str(trimmed.trim_end_matches('/'));
    out.push('/');
    out
}

#[derive(Debug, Clone, Copy, Default)]
struct RouteState {
    frame_idx: usize,
    scroll_top: i64,
}

/// A live simulated page: one current route, per-route scroll state, frame
/// advancement on every scroll step of the driving surface.
pub struct SimPage {
    script: PageScript,
    current: String,
    states: HashMap<String, RouteState>,
}

impl SimPage {
    pub fn new(script: PageScript) -> Self {
        let current = normalize_path(&script.start_path);
        Self {
            script,
            current,
            states: HashMap::new(),
        }
    }

    pub fn current_path(&self) -> &str {
        &self.current
    }

    fn route(&self) -> Option<&RouteScript> {
        self.script.routes.get(&self.current)
    }

    fn state(&self) -> RouteState {
        self.states.get(&self.current).copied().unwrap_or_default()
    }

    fn frame(&self) -> Frame {
        let route = match self.route() {
            Some(r) => r,
            None => {
                return Frame {
                    content_height: 0,
                    visible: 0,
                }
            }
        };
        let idx = self.state().frame_idx.min(route.frames.len().saturating_sub(1));
        route
            .frames
            .get(idx)
            .copied()
            .unwrap_or(Frame {
                content_height: 0,
                visible: 0,
            })
    }

    /// Observable scroll surfaces on the current route. With an overlay the
    /// driving surface is the overlay pane and the document stays
    /// viewport-sized; otherwise the document itself drives.
    pub fn surfaces(&self) -> Vec<SimSurface> {
        let route = match self.route() {
            Some(r) => r,
            None => return Vec::new(),
        };
        let frame = self.frame();
        let state = self.state();

        match &route.overlay {
            Some(overlay) => {
                let visible = frame.visible.min(route.profiles.len());
                vec![
                    SimSurface {
                        id: DOCUMENT_SURFACE.to_string(),
                        is_document: true,
                        dialog_role: false,
                        parent_dialog: None,
                        heading: String::new(),
                        content_height: route.viewport_height,
                        viewport_height: route.viewport_height,
                        scroll_top: 0,
                        overflow_scroll: false,
                        identity_link_count: 0,
                    },
                    SimSurface {
                        id: OVERLAY_SURFACE.to_string(),
                        is_document: false,
                        dialog_role: true,
                        parent_dialog: None,
                        heading: overlay.heading.clone(),
                        content_height: frame.content_height,
                        viewport_height: overlay.pane_viewport,
                        scroll_top: state.scroll_top,
                        overflow_scroll: false,
                        identity_link_count: visible,
                    },
                    SimSurface {
                        id: OVERLAY_PANE_SURFACE.to_string(),
                        is_document: false,
                        dialog_role: false,
                        parent_dialog: Some(OVERLAY_SURFACE.to_string()),
                        heading: String::new(),
                        content_height: frame.content_height,
                        viewport_height: overlay.pane_viewport,
                        scroll_top: state.scroll_top,
                        overflow_scroll: true,
                        identity_link_count: visible,
                    },
                ]
            }
            None => vec![SimSurface {
                id: DOCUMENT_SURFACE.to_string(),
                is_document: true,
                dialog_role: false,
                parent_dialog: None,
                heading: String::new(),
                content_height: frame.content_height,
                viewport_height: route.viewport_height,
                scroll_top: state.scroll_top,
                overflow_scroll: false,
                identity_link_count: frame.visible.min(route.posts.len()),
            }],
        }
    }

    /// Scroll the driving surface by `px`. Each step advances one frame,
    /// revealing whatever the script says that frame renders.
    pub fn scroll(&mut self, surface_id: &str, px: i64) {
        let route = match self.route() {
            Some(r) => r.clone(),
            None => return,
        };
        let driving = match route.overlay {
            Some(_) => surface_id == OVERLAY_PANE_SURFACE || surface_id == OVERLAY_SURFACE,
            None => surface_id == DOCUMENT_SURFACE,
        };
        if !driving {
            return;
        }
        let viewport = match &route.overlay {
            Some(o) => o.pane_viewport,
            None => route.viewport_height,
        };
        // A frameless route has nothing to reveal or scroll.
        let last = match route.frames.len().checked_sub(1) {
            Some(last) => last,
            None => return,
        };
        let entry = self.states.entry(self.current.clone()).or_default();
        if entry.frame_idx < last {
            entry.frame_idx += 1;
        }
        let max_top = (route.frames[entry.frame_idx.min(last)].content_height - viewport).max(0);
        entry.scroll_top = (entry.scroll_top + px).clamp(0, max_top);
        debug!(
            path = self.current.as_str(),
            frame = entry.frame_idx,
            scroll_top = entry.scroll_top,
            "sim scroll"
        );
    }

    /// Posts rendered by the current frame.
    pub fn visible_posts(&self) -> Vec<SimPost> {
        let route = match self.route() {
            Some(r) => r,
            None => return Vec::new(),
        };
        let visible = self.frame().visible.min(route.posts.len());
        route.posts[..visible].to_vec()
    }

    /// Profiles rendered by the current frame.
    pub fn visible_profiles(&self) -> Vec<SimProfile> {
        let route = match self.route() {
            Some(r) => r,
            None => return Vec::new(),
        };
        let visible = self.frame().visible.min(route.profiles.len());
        route.profiles[..visible].to_vec()
    }

    /// Anchor hrefs present on the current route, as normalized paths.
    pub fn anchor_paths(&self) -> Vec<String> {
        self.route()
            .map(|r| r.links.iter().map(|l| normalize_path(l)).collect())
            .unwrap_or_default()
    }

    /// Identity-bearing link count used for route stabilization polling.
    pub fn identity_link_count(&self) -> usize {
        let route = match self.route() {
            Some(r) => r,
            None => return 0,
        };
        self.frame().visible.min(route.posts.len().max(route.profiles.len()))
    }

    /// Click an anchor if the current route carries it. Landing still goes
    /// through `navigate`, so a non-navigable target stays unreached.
    pub fn click(&mut self, path: &str) -> bool {
        let target = normalize_path(path);
        if !self.anchor_paths().contains(&target) {
            return false;
        }
        self.navigate(&target);
        true
    }

    /// Direct (history) navigation. Lands only when the target route exists
    /// and is navigable; scroll state of the target starts fresh.
    pub fn navigate(&mut self, path: &str) {
        let target = normalize_path(path);
        match self.script.routes.get(&target) {
            Some(route) if route.navigable => {
                self.states.remove(&target);
                self.current = target;
            }
            _ => {
                debug!(path = target.as_str(), "sim navigation did not land");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OverlayScript;

    fn feed_script() -> PageScript {
        let mut routes = HashMap::new();
        routes.insert(
            "/owner/saved/all-posts/".to_string(),
            RouteScript {
                frames: vec![
                    Frame {
                        content_height: 1000,
                        visible: 2,
                    },
                    Frame {
                        content_height: 2000,
                        visible: 4,
                    },
                    Frame {
                        content_height: 2000,
                        visible: 4,
                    },
                ],
                posts: (0..4)
                    .map(|i| SimPost {
                        id: format!("post{i}"),
                        kind: "p".to_string(),
                        ..Default::default()
                    })
                    .collect(),
                profiles: Vec::new(),
                links: vec!["/owner/saved/trips/".to_string()],
                viewport_height: 900,
                overlay: None,
                navigable: true,
            },
        );
        PageScript {
            start_path: "/owner/saved/all-posts/".to_string(),
            routes,
        }
    }

    #[test]
    fn frames_advance_on_scroll_and_cap_at_last() {
        let mut page = SimPage::new(feed_script());
        assert_eq!(page.visible_posts().len(), 2);
        assert_eq!(page.surfaces()[0].content_height, 1000);

        page.scroll(DOCUMENT_SURFACE, 800);
        assert_eq!(page.visible_posts().len(), 4);
        assert_eq!(page.surfaces()[0].content_height, 2000);

        page.scroll(DOCUMENT_SURFACE, 800);
        page.scroll(DOCUMENT_SURFACE, 800);
        assert_eq!(page.surfaces()[0].content_height, 2000);
        let s = &page.surfaces()[0];
        assert!(s.scroll_top + s.viewport_height >= s.content_height);
    }

    #[test]
    fn overlay_routes_expose_dialog_and_pane() {
        let mut routes = HashMap::new();
        routes.insert(
            "/owner/following/".to_string(),
            RouteScript {
                frames: vec![Frame {
                    content_height: 1200,
                    visible: 5,
                }],
                posts: Vec::new(),
                profiles: (0..5)
                    .map(|i| SimProfile {
                        username: format!("user{i}"),
                        ..Default::default()
                    })
                    .collect(),
                links: Vec::new(),
                viewport_height: 900,
                overlay: Some(OverlayScript {
                    heading: "Following".to_string(),
                    pane_viewport: 400,
                }),
                navigable: true,
            },
        );
        let page = SimPage::new(PageScript {
            start_path: "/owner/following/".to_string(),
            routes,
        });

        let surfaces = page.surfaces();
        assert_eq!(surfaces.len(), 3);
        assert!(surfaces[1].dialog_role);
        assert_eq!(surfaces[1].identity_link_count, 5);
        assert_eq!(
            surfaces[2].parent_dialog.as_deref(),
            Some(OVERLAY_SURFACE)
        );
        assert!(surfaces[2].overflow_scroll);
    }

    #[test]
    fn navigation_to_broken_route_does_not_land() {
        let mut script = feed_script();
        script.routes.insert(
            "/owner/saved/trips/".to_string(),
            RouteScript {
                frames: vec![Frame {
                    content_height: 900,
                    visible: 0,
                }],
                posts: Vec::new(),
                profiles: Vec::new(),
                links: Vec::new(),
                viewport_height: 900,
                overlay: None,
                navigable: false,
            },
        );
        let mut page = SimPage::new(script);
        assert!(page.click("/owner/saved/trips/"));
        assert_eq!(page.current_path(), "/owner/saved/all-posts/");

        page.navigate("/nowhere/");
        assert_eq!(page.current_path(), "/owner/saved/all-posts/");
    }

    #[test]
    fn frameless_route_scrolls_as_a_no_op() {
        let mut script = feed_script();
        script.routes.insert(
            "/owner/saved/broken/".to_string(),
            RouteScript {
                frames: Vec::new(),
                posts: Vec::new(),
                profiles: Vec::new(),
                links: Vec::new(),
                viewport_height: 900,
                overlay: None,
                navigable: true,
            },
        );
        script.start_path = "/owner/saved/broken/".to_string();
        let mut page = SimPage::new(script);

        page.scroll(DOCUMENT_SURFACE, 800);
        assert_eq!(page.surfaces()[0].content_height, 0);
        assert!(page.visible_posts().is_empty());
    }

    #[test]
    fn frameless_route_is_rejected_on_load() {
        let mut script = feed_script();
        script
            .routes
            .get_mut("/owner/saved/all-posts/")
            .unwrap()
            .frames
            .clear();
        let json = serde_json::to_string(&script).unwrap();
        let err = PageScript::from_json(&json).unwrap_err();
        assert!(err.to_string().contains("no frames"));
    }

    #[test]
    fn scripts_round_trip_through_json() {
        let json = serde_json::to_string(&feed_script()).unwrap();
        let parsed = PageScript::from_json(&json).unwrap();
        let page = SimPage::new(parsed);
        assert_eq!(page.visible_posts().len(), 2);
    }
}
