//! Bridges a scripted `simpage::SimPage` into the engine's `Page` and
//! `Extractor` seams. The simulator knows nothing about records; this adapter
//! reads its rendered posts/profiles into raw candidates the same way a live
//! DOM extractor would.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use keepstack_common::{RawCandidate, RawFollow, RawPost};
use simpage::SimPage;

use crate::traits::{Page, Surface};

pub struct SimPageHandle {
    origin: String,
    page: Mutex<SimPage>,
}

impl SimPageHandle {
    pub fn new(origin: impl Into<String>, page: SimPage) -> Arc<Self> {
        Arc::new(Self {
            origin: origin.into(),
            page: Mutex::new(page),
        })
    }
}

#[async_trait]
impl Page for SimPageHandle {
    async fn base_url(&self) -> String {
        self.origin.clone()
    }

    async fn surfaces(&self) -> Vec<Surface> {
        self.page
            .lock()
            .await
            .surfaces()
            .into_iter()
            .map(|s| Surface {
                id: s.id,
                is_document: s.is_document,
                dialog_role: s.dialog_role,
                parent_dialog: s.parent_dialog,
                heading: s.heading,
                content_height: s.content_height,
                viewport_height: s.viewport_height,
                scroll_top: s.scroll_top,
                overflow_scroll: s.overflow_scroll,
                identity_link_count: s.identity_link_count,
            })
            .collect()
    }

    async fn scroll_by(&self, surface_id: &str, px: i64) {
        self.page.lock().await.scroll(surface_id, px);
    }

    async fn current_path(&self) -> String {
        self.page.lock().await.current_path().to_string()
    }

    async fn link_paths(&self) -> Vec<String> {
        self.page.lock().await.anchor_paths()
    }

    async fn click_link(&self, path: &str) -> bool {
        self.page.lock().await.click(path)
    }

    async fn navigate(&self, path: &str) {
        self.page.lock().await.navigate(path);
    }

    async fn identity_link_count(&self) -> usize {
        self.page.lock().await.identity_link_count()
    }
}

/// Folder segment of a `/{owner}/saved/{folder}/` path, or empty.
fn folder_of(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [_, "saved", folder] => (*folder).to_string(),
        _ => String::new(),
    }
}

/// Reads the simulated saved-post grid.
pub struct SimSavedExtractor {
    page: Arc<SimPageHandle>,
}

impl SimSavedExtractor {
    pub fn new(page: Arc<SimPageHandle>) -> Arc<Self> {
        Arc::new(Self { page })
    }
}

#[async_trait]
impl crate::traits::Extractor for SimSavedExtractor {
    async fn extract(&self) -> Result<Vec<RawCandidate>> {
        let page = self.page.page.lock().await;
        let folder = folder_of(page.current_path());
        Ok(page
            .visible_posts()
            .into_iter()
            .map(|post| {
                RawCandidate::Post(RawPost {
                    href: format!("/{}/{}/", post.kind, post.id),
                    id: post.id,
                    kind: post.kind,
                    username: post.username,
                    caption: post.caption,
                    thumbnail: post.thumbnail,
                    source_folder: folder.clone(),
                    saved_at: post.saved_at,
                })
            })
            .collect())
    }
}

/// Reads the simulated following-list overlay.
pub struct SimFollowExtractor {
    page: Arc<SimPageHandle>,
}

impl SimFollowExtractor {
    pub fn new(page: Arc<SimPageHandle>) -> Arc<Self> {
        Arc::new(Self { page })
    }
}

#[async_trait]
impl crate::traits::Extractor for SimFollowExtractor {
    async fn extract(&self) -> Result<Vec<RawCandidate>> {
        let page = self.page.page.lock().await;
        let source_page = page.current_path().to_string();
        Ok(page
            .visible_profiles()
            .into_iter()
            .map(|profile| {
                RawCandidate::Follow(RawFollow {
                    profile_url: format!("/{}/", profile.username),
                    username: profile.username,
                    display_name: profile.display_name,
                    bio: profile.bio,
                    source_page: source_page.clone(),
                })
            })
            .collect())
    }
}
