use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::KeepstackError;

// --- Modes ---

/// Collection mode. Each mode has independent run state, tuning and a
/// dedicated collection in the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Saved-post grid, scrolled as a flat feed across folder sub-views.
    Saved,
    /// Following list, rendered inside a modal overlay.
    Following,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Saved => "saved",
            Mode::Following => "following",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = KeepstackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "saved" => Ok(Mode::Saved),
            "following" => Ok(Mode::Following),
            other => Err(KeepstackError::UnsupportedMode(other.to_string())),
        }
    }
}

// --- Records ---

/// Post media kind, named after the site's path segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    #[serde(rename = "p")]
    Photo,
    Reel,
    Reels,
    Tv,
}

impl PostKind {
    /// Parse from a post-path segment (`/p/`, `/reel/`, `/reels/`, `/tv/`).
    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "p" => Some(PostKind::Photo),
            "reel" => Some(PostKind::Reel),
            "reels" => Some(PostKind::Reels),
            "tv" => Some(PostKind::Tv),
            _ => None,
        }
    }

    pub fn as_segment(&self) -> &'static str {
        match self {
            PostKind::Photo => "p",
            PostKind::Reel => "reel",
            PostKind::Reels => "reels",
            PostKind::Tv => "tv",
        }
    }
}

/// A saved post. Identity key is `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PostRecord {
    pub id: String,
    pub kind: PostKind,
    pub link: String,
    pub username: String,
    pub caption: String,
    pub thumbnail: String,
    pub source_folder: String,
    /// ISO-8601 string from the page's `<time>` element, or empty.
    pub saved_at: String,
    pub discovered_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    /// Epoch-ms of the run that produced this record.
    pub crawl_at: Option<i64>,
    /// First-seen order within a run. Assigned once, never reassigned.
    pub crawl_order: Option<u64>,
}

/// A followed profile. Identity key is `username`, lower-cased with any
/// leading `@` stripped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FollowRecord {
    pub username: String,
    pub display_name: String,
    pub profile_url: String,
    pub bio: String,
    pub source_page: String,
    pub discovered_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub crawl_at: Option<i64>,
    pub crawl_order: Option<u64>,
}

/// Either record variant, as sent to the vault in chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CollectedRecord {
    Post(PostRecord),
    Follow(FollowRecord),
}

impl CollectedRecord {
    /// The stable identity key: post id or canonical username.
    pub fn identity(&self) -> &str {
        match self {
            CollectedRecord::Post(p) => &p.id,
            CollectedRecord::Follow(f) => &f.username,
        }
    }

    pub fn crawl_order(&self) -> Option<u64> {
        match self {
            CollectedRecord::Post(p) => p.crawl_order,
            CollectedRecord::Follow(f) => f.crawl_order,
        }
    }

    pub fn set_run_stamp(&mut self, crawl_at: i64, crawl_order: u64) {
        match self {
            CollectedRecord::Post(p) => {
                p.crawl_at = Some(crawl_at);
                p.crawl_order = Some(crawl_order);
            }
            CollectedRecord::Follow(f) => {
                f.crawl_at = Some(crawl_at);
                f.crawl_order = Some(crawl_order);
            }
        }
    }

    pub fn last_seen_at(&self) -> DateTime<Utc> {
        match self {
            CollectedRecord::Post(p) => p.last_seen_at,
            CollectedRecord::Follow(f) => f.last_seen_at,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        match self {
            CollectedRecord::Post(p) => p.last_seen_at = now,
            CollectedRecord::Follow(f) => f.last_seen_at = now,
        }
    }

    /// Effective ordering timestamp: `crawl_at`, falling back to
    /// `last_seen_at` in epoch-ms.
    pub fn order_stamp(&self) -> i64 {
        let (crawl_at, last_seen) = match self {
            CollectedRecord::Post(p) => (p.crawl_at, p.last_seen_at),
            CollectedRecord::Follow(f) => (f.crawl_at, f.last_seen_at),
        };
        crawl_at.unwrap_or_else(|| last_seen.timestamp_millis())
    }

    /// Merge `incoming` into `self`, field by field. A field is overwritten
    /// only when the incoming value is meaningful; `crawl_at`/`crawl_order`
    /// are preserved from `self` when the incoming record lacks them.
    pub fn merge_from(&mut self, incoming: &CollectedRecord) {
        match (self, incoming) {
            (CollectedRecord::Post(existing), CollectedRecord::Post(incoming)) => {
                existing.merge_from(incoming);
            }
            (CollectedRecord::Follow(existing), CollectedRecord::Follow(incoming)) => {
                existing.merge_from(incoming);
            }
            // Variant mismatch cannot occur within a mode-keyed collection.
            _ => {}
        }
    }
}

/// A meaningful string: non-empty once trimmed.
pub fn meaningful(value: &str) -> bool {
    !value.trim().is_empty()
}

fn merge_str(existing: &mut String, incoming: &str) {
    if meaningful(incoming) {
        *existing = incoming.to_string();
    }
}

impl PostRecord {
    pub fn merge_from(&mut self, incoming: &PostRecord) {
        self.kind = incoming.kind;
        merge_str(&mut self.link, &incoming.link);
        merge_str(&mut self.username, &incoming.username);
        merge_str(&mut self.caption, &incoming.caption);
        merge_str(&mut self.thumbnail, &incoming.thumbnail);
        merge_str(&mut self.source_folder, &incoming.source_folder);
        merge_str(&mut self.saved_at, &incoming.saved_at);
        // discovered_at marks the first sighting and never moves.
        self.last_seen_at = incoming.last_seen_at;
        if incoming.crawl_at.is_some() {
            self.crawl_at = incoming.crawl_at;
        }
        if incoming.crawl_order.is_some() {
            self.crawl_order = incoming.crawl_order;
        }
    }
}

impl FollowRecord {
    pub fn merge_from(&mut self, incoming: &FollowRecord) {
        merge_str(&mut self.display_name, &incoming.display_name);
        merge_str(&mut self.profile_url, &incoming.profile_url);
        merge_str(&mut self.bio, &incoming.bio);
        merge_str(&mut self.source_page, &incoming.source_page);
        self.last_seen_at = incoming.last_seen_at;
        if incoming.crawl_at.is_some() {
            self.crawl_at = incoming.crawl_at;
        }
        if incoming.crawl_order.is_some() {
            self.crawl_order = incoming.crawl_order;
        }
    }
}

// --- Raw candidates ---

/// Best-effort post fields as read from the rendered page. Only `id` is
/// required for normalization; everything else may be empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RawPost {
    pub id: String,
    pub kind: String,
    pub href: String,
    pub username: String,
    pub caption: String,
    pub thumbnail: String,
    pub source_folder: String,
    pub saved_at: String,
}

/// Best-effort profile fields as read from the rendered page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RawFollow {
    pub username: String,
    pub display_name: String,
    pub profile_url: String,
    pub bio: String,
    pub source_page: String,
}

/// One candidate as returned by the extraction capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawCandidate {
    Post(RawPost),
    Follow(RawFollow),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: &str) -> PostRecord {
        PostRecord {
            id: id.to_string(),
            kind: PostKind::Photo,
            link: format!("https://example.com/p/{id}/"),
            username: String::new(),
            caption: String::new(),
            thumbnail: String::new(),
            source_folder: String::new(),
            saved_at: String::new(),
            discovered_at: Utc::now(),
            last_seen_at: Utc::now(),
            crawl_at: None,
            crawl_order: None,
        }
    }

    #[test]
    fn mode_parsing_rejects_unknown_strings() {
        assert_eq!("saved".parse::<Mode>().unwrap(), Mode::Saved);
        assert_eq!("following".parse::<Mode>().unwrap(), Mode::Following);
        assert!(matches!(
            "followers".parse::<Mode>(),
            Err(KeepstackError::UnsupportedMode(_))
        ));
    }

    #[test]
    fn merge_keeps_meaningful_values_over_empty() {
        let mut existing = post("abc");
        existing.caption = "sunset over the bay".to_string();
        existing.username = "marina".to_string();

        let mut incoming = post("abc");
        incoming.caption = String::new();
        incoming.username = "   ".to_string();
        incoming.thumbnail = "https://cdn.example.com/t.jpg".to_string();

        existing.merge_from(&incoming);
        assert_eq!(existing.caption, "sunset over the bay");
        assert_eq!(existing.username, "marina");
        assert_eq!(existing.thumbnail, "https://cdn.example.com/t.jpg");
    }

    #[test]
    fn merge_preserves_run_stamp_when_incoming_lacks_one() {
        let mut existing = post("abc");
        existing.crawl_at = Some(1_700_000_000_000);
        existing.crawl_order = Some(7);

        let incoming = post("abc");
        existing.merge_from(&incoming);
        assert_eq!(existing.crawl_at, Some(1_700_000_000_000));
        assert_eq!(existing.crawl_order, Some(7));
    }

    #[test]
    fn last_meaningful_write_wins_per_field() {
        let mut a = post("x");
        a.caption = "first".to_string();
        let mut b = post("x");
        b.caption = "second".to_string();

        let mut merged = CollectedRecord::Post(a);
        merged.merge_from(&CollectedRecord::Post(b));
        match merged {
            CollectedRecord::Post(p) => assert_eq!(p.caption, "second"),
            _ => unreachable!(),
        }
    }
}
