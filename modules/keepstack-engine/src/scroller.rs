//! Scroller locator: heuristic choice of the surface to drive.
//!
//! Two policies: the document policy for flat feeds (biggest scrollable
//! surface, with a large bonus for the window scroller) and the overlay
//! policy for modal follow lists (score dialogs by identity-link density and
//! heading text, then pick the most scrollable descendant). Re-invoked every
//! round because the page may swap the actual scrollable node under us.

use keepstack_common::{Mode, Tuning};

use crate::traits::Surface;

/// Fixed bonus that lets the window scroller win ties against nested panels.
const DOCUMENT_BONUS: i64 = 100_000;
/// Scrollability bonus for overlay descendants.
const PANE_SCROLLABLE_BONUS: i64 = 2_000;
/// A dialog must render at least this many identity links to qualify.
const OVERLAY_MIN_LINKS: usize = 4;

pub fn locate(mode: Mode, surfaces: &[Surface], tuning: &Tuning) -> Option<Surface> {
    match mode {
        Mode::Saved => locate_document(surfaces, tuning),
        Mode::Following => {
            locate_overlay(surfaces, tuning).or_else(|| locate_document(surfaces, tuning))
        }
    }
}

fn scrollable(surface: &Surface, tuning: &Tuning) -> bool {
    surface.overflow_scroll
        || surface.content_height > surface.viewport_height + tuning.overflow_slack_px
}

fn locate_document(surfaces: &[Surface], tuning: &Tuning) -> Option<Surface> {
    let best = surfaces
        .iter()
        .filter(|s| !s.dialog_role && s.parent_dialog.is_none())
        .filter(|s| scrollable(s, tuning))
        .map(|s| {
            let score = s.content_height + if s.is_document { DOCUMENT_BONUS } else { 0 };
            (score, s)
        })
        .max_by_key(|(score, _)| *score)
        .map(|(_, s)| s.clone());
    // Nothing scrollable yet: fall back to the document itself so the loop
    // can keep observing it.
    best.or_else(|| surfaces.iter().find(|s| s.is_document).cloned())
}

fn locate_overlay(surfaces: &[Surface], tuning: &Tuning) -> Option<Surface> {
    let dialog = surfaces
        .iter()
        .filter(|s| s.dialog_role && s.identity_link_count >= OVERLAY_MIN_LINKS)
        .map(|s| {
            let heading_signal = if follow_heading(&s.heading) { 10 } else { 0 };
            (s.identity_link_count as i64 * 12 + heading_signal, s)
        })
        .max_by_key(|(score, _)| *score)
        .map(|(_, s)| s)?;

    let best_child = surfaces
        .iter()
        .filter(|s| s.parent_dialog.as_deref() == Some(dialog.id.as_str()))
        .chain(std::iter::once(dialog))
        .map(|s| {
            let score = if scrollable(s, tuning) {
                PANE_SCROLLABLE_BONUS
            } else {
                0
            } + s.identity_link_count as i64 * 100
                + s.content_height;
            (score, s)
        })
        .filter(|(score, _)| *score > 0)
        .max_by_key(|(score, _)| *score)
        .map(|(_, s)| s.clone());

    best_child.or_else(|| Some(dialog.clone()))
}

fn follow_heading(heading: &str) -> bool {
    let lower = heading.to_lowercase();
    lower.contains("follow") || lower.contains("팔로우") || lower.contains("팔로워")
}

/// Within `bottom_slack_px` of the scroll extent counts as at bottom.
pub fn at_bottom(surface: &Surface, tuning: &Tuning) -> bool {
    surface.scroll_top + surface.viewport_height
        >= surface.content_height - tuning.bottom_slack_px
}

/// Scroll step sizing: most of a viewport for the window scroller, a
/// slightly smaller fraction for nested panes.
pub fn scroll_step(surface: &Surface) -> i64 {
    if surface.is_document {
        700.max(surface.viewport_height * 9 / 10)
    } else {
        220.max(surface.viewport_height * 85 / 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface(id: &str) -> Surface {
        Surface {
            id: id.to_string(),
            is_document: false,
            dialog_role: false,
            parent_dialog: None,
            heading: String::new(),
            content_height: 900,
            viewport_height: 900,
            scroll_top: 0,
            overflow_scroll: false,
            identity_link_count: 0,
        }
    }

    fn tuning() -> Tuning {
        Tuning::for_mode(Mode::Saved)
    }

    #[test]
    fn document_wins_ties_against_nested_panels() {
        let mut doc = surface("document");
        doc.is_document = true;
        doc.content_height = 3000;
        let mut panel = surface("panel");
        panel.content_height = 4000;
        panel.overflow_scroll = true;

        let chosen = locate(Mode::Saved, &[doc, panel], &tuning()).unwrap();
        assert_eq!(chosen.id, "document");
    }

    #[test]
    fn dramatically_taller_panel_beats_document() {
        let mut doc = surface("document");
        doc.is_document = true;
        doc.content_height = 2000;
        let mut panel = surface("panel");
        panel.content_height = 200_000;
        panel.overflow_scroll = true;

        let chosen = locate(Mode::Saved, &[doc, panel], &tuning()).unwrap();
        assert_eq!(chosen.id, "panel");
    }

    #[test]
    fn non_scrollable_page_falls_back_to_document() {
        let mut doc = surface("document");
        doc.is_document = true;
        let chosen = locate(Mode::Saved, &[doc], &tuning()).unwrap();
        assert_eq!(chosen.id, "document");
    }

    #[test]
    fn overlay_policy_requires_enough_identity_links() {
        let mut doc = surface("document");
        doc.is_document = true;
        doc.content_height = 5000;
        let mut dialog = surface("dialog");
        dialog.dialog_role = true;
        dialog.identity_link_count = 3; // below threshold

        let chosen =
            locate(Mode::Following, &[doc.clone(), dialog], &Tuning::for_mode(Mode::Following))
                .unwrap();
        assert_eq!(chosen.id, "document");
    }

    #[test]
    fn overlay_pane_with_links_beats_overlay_itself() {
        let doc = {
            let mut s = surface("document");
            s.is_document = true;
            s
        };
        let mut dialog = surface("dialog");
        dialog.dialog_role = true;
        dialog.identity_link_count = 12;
        dialog.heading = "Following".to_string();
        let mut pane = surface("pane");
        pane.parent_dialog = Some("dialog".to_string());
        pane.overflow_scroll = true;
        pane.content_height = 1200;
        pane.viewport_height = 400;
        pane.identity_link_count = 12;

        let chosen = locate(
            Mode::Following,
            &[doc, dialog, pane],
            &Tuning::for_mode(Mode::Following),
        )
        .unwrap();
        assert_eq!(chosen.id, "pane");
    }

    #[test]
    fn bottom_detection_uses_slack() {
        let mut s = surface("document");
        s.is_document = true;
        s.content_height = 2000;
        s.viewport_height = 900;
        s.scroll_top = 1084; // 1084 + 900 = 1984 >= 2000 - 16
        assert!(at_bottom(&s, &tuning()));
        s.scroll_top = 1083;
        assert!(!at_bottom(&s, &tuning()));
    }
}
