//! Video completion detection.
//!
//! Completion is decided from four independent signals, any one of which is
//! sufficient:
//!
//! 1. a rendered "Replay" button,
//! 2. the play control carrying the `vjs-ended` marker,
//! 3. the media element's native `ended` flag,
//! 4. the media being paused at or beyond 95% of its duration.
//!
//! A visible big play button is deliberately not a signal: the same button
//! is shown whenever playback is merely paused.

use crate::dom::{DocumentSnapshot, Selector};

/// Fraction of the duration at which a paused video counts as finished.
pub const COMPLETION_RATIO: f64 = 0.95;

/// The individual signals behind a completion decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompletionSignals {
    pub replay_visible: bool,
    pub ended_marker: bool,
    pub media_ended: bool,
    pub paused_near_end: bool,
}

impl CompletionSignals {
    #[must_use]
    pub fn any(&self) -> bool {
        self.replay_visible || self.ended_marker || self.media_ended || self.paused_near_end
    }
}

/// Decides whether the video on a page has finished.
pub trait CompletionDetector: Send + Sync {
    /// Evaluates every signal. `None` means there is no usable media yet.
    fn signals(&self, doc: &DocumentSnapshot) -> Option<CompletionSignals>;

    fn is_complete(&self, doc: &DocumentSnapshot) -> bool {
        self.signals(doc).is_some_and(|s| s.any())
    }
}

/// Detector for video.js based players.
#[derive(Debug, Clone)]
pub struct PlayerCompletionDetector {
    replay: [Selector; 2],
    play_control: Selector,
    ratio: f64,
}

impl Default for PlayerCompletionDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerCompletionDetector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            replay: [
                Selector::tag("button").attr_eq("title", "Replay"),
                Selector::tag("button").attr_eq("aria-label", "Replay"),
            ],
            play_control: Selector::any().class("vjs-play-control"),
            ratio: COMPLETION_RATIO,
        }
    }
}

impl CompletionDetector for PlayerCompletionDetector {
    fn signals(&self, doc: &DocumentSnapshot) -> Option<CompletionSignals> {
        let media = doc.media()?;
        // Metadata not loaded yet.
        let progress = media.progress()?;

        let replay_visible = self
            .replay
            .iter()
            .find_map(|sel| doc.select_first(sel))
            .is_some_and(|b| doc.is_rendered(b));

        let ended_marker = doc
            .select_first(&self.play_control)
            .and_then(|c| doc.element(c))
            .is_some_and(|el| el.has_class("vjs-ended"));

        Some(CompletionSignals {
            replay_visible,
            ended_marker,
            media_ended: media.ended,
            paused_near_end: media.paused && progress >= self.ratio,
        })
    }
}
