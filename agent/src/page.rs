//! The page capability.
//!
//! [`Page`] is everything an agent may do to the tab it runs in: take a
//! snapshot, click elements, and drive the media element. Element ids refer
//! to the most recent snapshot and stay valid until the page re-renders.

use async_trait::async_trait;

use crate::dom::{DocumentSnapshot, ElementId};
use crate::error::PageError;

/// How a click is delivered.
///
/// Some players ignore plain programmatic clicks, so playback start escalates
/// through progressively more event-like interactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickStyle {
    /// The element's own click method.
    Direct,
    /// Synthetic pointer-down followed by pointer-up.
    PointerSequence,
    /// A dispatched synthetic click event.
    SyntheticEvent,
}

impl ClickStyle {
    /// Escalation order used when trying to start playback.
    pub const ESCALATION: [ClickStyle; 3] = [
        ClickStyle::Direct,
        ClickStyle::PointerSequence,
        ClickStyle::SyntheticEvent,
    ];
}

/// Operations on the document of one tab.
#[async_trait]
pub trait Page: Send + Sync + 'static {
    async fn snapshot(&self) -> Result<DocumentSnapshot, PageError>;

    async fn click(&self, element: ElementId, style: ClickStyle) -> Result<(), PageError>;

    async fn set_playback_rate(&self, rate: f64) -> Result<(), PageError>;

    /// Clears the media element's native looping flag.
    async fn disable_loop(&self) -> Result<(), PageError>;

    async fn set_muted(&self, muted: bool) -> Result<(), PageError>;

    /// Asks the media element to play. Browsers may refuse unmuted playback
    /// without a user gesture.
    async fn play(&self) -> Result<(), PageError>;

    /// Arms a one-shot listener that unmutes on the next click or key press.
    async fn unmute_on_interaction(&self) -> Result<(), PageError>;

    /// Reloads the document; the current page context does not survive it.
    async fn reload(&self) -> Result<(), PageError>;
}
