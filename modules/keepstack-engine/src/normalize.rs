//! Record normalizer: raw extracted candidates to canonical records.
//!
//! Fails (returns `None`) only when the identity field cannot be derived;
//! every other field is best-effort and may stay empty for a later sighting
//! to fill in.

use chrono::{DateTime, Utc};
use url::Url;

use keepstack_common::{
    meaningful, CollectedRecord, FollowRecord, PostKind, PostRecord, RawCandidate, RawFollow,
    RawPost, MAX_USERNAME_LEN,
};

/// Collapse whitespace runs and strip zero-width characters.
pub fn sanitize(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last_was_space = false;
    for ch in value.chars() {
        if ch == '\u{200b}' {
            continue;
        }
        if ch.is_whitespace() {
            if !last_was_space && !out.is_empty() {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out.trim_end().to_string()
}

/// Resolve `href` against `base`. Already-absolute URLs pass through;
/// unresolvable ones fall back to the raw string.
pub fn absolutize(base: &Url, href: &str) -> String {
    let href = href.trim();
    if href.is_empty() {
        return String::new();
    }
    match base.join(href) {
        Ok(url) => url.to_string(),
        Err(_) => href.to_string(),
    }
}

pub fn normalize_candidate(
    raw: RawCandidate,
    base: &Url,
    now: DateTime<Utc>,
) -> Option<CollectedRecord> {
    match raw {
        RawCandidate::Post(post) => normalize_post(post, base, now).map(CollectedRecord::Post),
        RawCandidate::Follow(follow) => {
            normalize_follow(follow, base, now).map(CollectedRecord::Follow)
        }
    }
}

pub fn normalize_post(raw: RawPost, base: &Url, now: DateTime<Utc>) -> Option<PostRecord> {
    let id = raw.id.trim().to_string();
    if !meaningful(&id) {
        return None;
    }
    let kind = PostKind::from_segment(raw.kind.trim()).unwrap_or(PostKind::Photo);
    let link = if meaningful(&raw.href) {
        absolutize(base, &raw.href)
    } else {
        absolutize(base, &format!("/{}/{}/", kind.as_segment(), id))
    };
    Some(PostRecord {
        id,
        kind,
        link,
        username: raw.username.trim().to_string(),
        caption: sanitize(&raw.caption),
        thumbnail: absolutize(base, &raw.thumbnail),
        source_folder: sanitize(&raw.source_folder).to_lowercase(),
        saved_at: raw.saved_at.trim().to_string(),
        discovered_at: now,
        last_seen_at: now,
        crawl_at: None,
        crawl_order: None,
    })
}

pub fn normalize_follow(raw: RawFollow, base: &Url, now: DateTime<Utc>) -> Option<FollowRecord> {
    let username = raw
        .username
        .trim()
        .trim_start_matches('@')
        .to_lowercase();
    if !meaningful(&username) || username.len() > MAX_USERNAME_LEN {
        return None;
    }
    let display_name = sanitize(&raw.display_name);
    let profile_url = if meaningful(&raw.profile_url) {
        absolutize(base, &raw.profile_url)
    } else {
        absolutize(base, &format!("/{username}/"))
    };
    Some(FollowRecord {
        display_name: if meaningful(&display_name) {
            display_name
        } else {
            username.clone()
        },
        username,
        profile_url,
        bio: sanitize(&raw.bio),
        source_page: raw.source_page.trim().to_string(),
        discovered_at: now,
        last_seen_at: now,
        crawl_at: None,
        crawl_order: None,
    })
}
