use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::render::DisplaySize;
use crate::style::OverlayStyleId;
use crate::translate::TranslationRecord;

/// Immutable view of the overlay state. Renderers hold one of these for the
/// whole draw, so records and style always come from the same moment.
#[derive(Debug, Clone)]
pub struct OverlaySnapshot {
    /// Bumped on every change.
    pub generation: u64,
    /// Translation pass that produced `records`; 0 before the first commit.
    pub pass: u64,
    pub records: Arc<Vec<TranslationRecord>>,
    pub style: OverlayStyleId,
    pub visible: bool,
    pub viewport: Option<DisplaySize>,
}

/// Handle returned by [`OverlaySession::begin_pass`]; only the newest one commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct PassTicket(u64);

impl PassTicket {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Shared overlay state. Every update swaps in a whole new snapshot and
/// notifies subscribers so they can re-render.
pub struct OverlaySession {
    state: watch::Sender<Arc<OverlaySnapshot>>,
    latest_pass: AtomicU64,
}

impl OverlaySession {
    pub fn new(style: OverlayStyleId, visible: bool) -> Self {
        let initial = OverlaySnapshot {
            generation: 0,
            pass: 0,
            records: Arc::new(Vec::new()),
            style,
            visible,
            viewport: None,
        };
        let (state, _) = watch::channel(Arc::new(initial));
        Self {
            state,
            latest_pass: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> Arc<OverlaySnapshot> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<OverlaySnapshot>> {
        self.state.subscribe()
    }

    /// Starts a translation pass, superseding any pass still in flight.
    pub fn begin_pass(&self) -> PassTicket {
        let id = self.latest_pass.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(pass = id, "translation pass started");
        PassTicket(id)
    }

    /// Replaces the record list if `ticket` is still the newest pass.
    /// Returns false when the results are stale and were dropped.
    pub fn commit(&self, ticket: PassTicket, records: Vec<TranslationRecord>) -> bool {
        let committed = self.state.send_if_modified(|current| {
            if ticket.0 != self.latest_pass.load(Ordering::SeqCst) || ticket.0 <= current.pass {
                return false;
            }
            *current = Arc::new(OverlaySnapshot {
                generation: current.generation + 1,
                pass: ticket.0,
                records: Arc::new(records),
                ..(**current).clone()
            });
            true
        });
        if committed {
            debug!(pass = ticket.0, "translation pass committed");
        } else {
            info!(pass = ticket.0, "discarding results of a superseded translation pass");
        }
        committed
    }

    pub fn set_style(&self, style: OverlayStyleId) -> bool {
        self.update(|snapshot| {
            if snapshot.style == style {
                return false;
            }
            snapshot.style = style;
            true
        })
    }

    pub fn set_visible(&self, visible: bool) -> bool {
        self.update(|snapshot| {
            if snapshot.visible == visible {
                return false;
            }
            snapshot.visible = visible;
            true
        })
    }

    /// Flips overlay visibility and returns the new value.
    pub fn toggle_visibility(&self) -> bool {
        let mut visible = false;
        self.update(|snapshot| {
            snapshot.visible = !snapshot.visible;
            visible = snapshot.visible;
            true
        });
        visible
    }

    pub fn set_viewport(&self, viewport: DisplaySize) -> bool {
        self.update(|snapshot| {
            if snapshot.viewport == Some(viewport) {
                return false;
            }
            snapshot.viewport = Some(viewport);
            true
        })
    }

    /// Applies viewport sizes from `sizes`, waiting until they have been
    /// quiet for `delay` so a burst of resizes causes a single re-render.
    /// Returns once the sender side is closed.
    pub async fn debounce_viewport(&self, mut sizes: mpsc::Receiver<DisplaySize>, delay: Duration) {
        while let Some(mut latest) = sizes.recv().await {
            loop {
                match tokio::time::timeout(delay, sizes.recv()).await {
                    Ok(Some(size)) => latest = size,
                    Ok(None) | Err(_) => break,
                }
            }
            self.set_viewport(latest);
        }
    }

    fn update<F>(&self, change: F) -> bool
    where
        F: FnOnce(&mut OverlaySnapshot) -> bool,
    {
        self.state.send_if_modified(|current| {
            let mut next = (**current).clone();
            if !change(&mut next) {
                return false;
            }
            next.generation = current.generation + 1;
            *current = Arc::new(next);
            true
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::BBox;

    fn records(text: &str) -> Vec<TranslationRecord> {
        vec![TranslationRecord {
            original_text: text.to_string(),
            translated_text: text.to_uppercase(),
            from_language: "English".to_string(),
            to_language: "Hindi".to_string(),
            confidence: 80.0,
            bbox: BBox::new(0.0, 0.0, 10.0, 10.0),
        }]
    }

    #[test]
    fn newest_pass_wins_regardless_of_completion_order() {
        let session = OverlaySession::new(OverlayStyleId::Adaptive, true);
        let first = session.begin_pass();
        let second = session.begin_pass();
        assert!(session.commit(second, records("second")));
        assert!(!session.commit(first, records("first")));
        let snapshot = session.snapshot();
        assert_eq!(snapshot.records[0].original_text, "second");
        assert_eq!(snapshot.pass, second.id());
    }

    #[test]
    fn pass_superseded_before_commit_is_dropped() {
        let session = OverlaySession::new(OverlayStyleId::Adaptive, true);
        let first = session.begin_pass();
        let _second = session.begin_pass();
        assert!(!session.commit(first, records("first")));
        assert!(session.snapshot().records.is_empty());
        assert_eq!(session.snapshot().generation, 0);
    }

    #[test]
    fn commit_swaps_whole_list() {
        let session = OverlaySession::new(OverlayStyleId::Solid, true);
        let ticket = session.begin_pass();
        assert!(session.commit(ticket, records("one")));
        let held = session.snapshot();
        let ticket = session.begin_pass();
        assert!(session.commit(ticket, Vec::new()));
        assert_eq!(held.records.len(), 1);
        assert!(session.snapshot().records.is_empty());
        assert_eq!(session.snapshot().style, OverlayStyleId::Solid);
    }

    #[test]
    fn unchanged_settings_do_not_bump_generation() {
        let session = OverlaySession::new(OverlayStyleId::Adaptive, true);
        assert!(!session.set_style(OverlayStyleId::Adaptive));
        assert!(session.set_style(OverlayStyleId::Outline));
        assert!(!session.set_visible(true));
        assert!(!session.toggle_visibility());
        assert!(session.toggle_visibility());
        assert_eq!(session.snapshot().generation, 3);
    }

    #[tokio::test]
    async fn subscribers_see_changes() {
        let session = OverlaySession::new(OverlayStyleId::Adaptive, true);
        let mut rx = session.subscribe();
        session.set_style(OverlayStyleId::Shadow);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().style, OverlayStyleId::Shadow);
    }

    #[tokio::test]
    async fn resize_burst_applies_last_size_once() {
        let session = OverlaySession::new(OverlayStyleId::Adaptive, true);
        let (tx, rx) = mpsc::channel(8);
        for width in [300.0, 320.0, 340.0] {
            tx.send(DisplaySize::new(width, 200.0)).await.unwrap();
        }
        drop(tx);
        session
            .debounce_viewport(rx, Duration::from_millis(20))
            .await;
        let snapshot = session.snapshot();
        assert_eq!(snapshot.viewport, Some(DisplaySize::new(340.0, 200.0)));
        assert_eq!(snapshot.generation, 1);
    }
}
