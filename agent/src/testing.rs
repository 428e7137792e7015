//! Shared fakes for unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use autolearn_coordinator::{
    channel, Coordinator, CoordinatorConfig, CoordinatorHandle, MemoryStore, RecordingBrowser,
};

use crate::classifier::PlatformClassifier;
use crate::config::AgentTimings;
use crate::context::Capabilities;
use crate::detector::PlayerCompletionDetector;
use crate::dom::{DocumentSnapshot, ElementId, MediaState};
use crate::error::PageError;
use crate::page::{ClickStyle, Page};

/// A page whose document is set by the test.
///
/// Clicking `play_button` starts playback when `button_starts_playback` is
/// set, and only with `button_style` when that is set too; unmuted `play()`
/// succeeds only when `unmuted_play_allowed` is set.
#[derive(Default)]
pub(crate) struct FakePage {
    pub doc: Mutex<DocumentSnapshot>,
    pub clicks: Mutex<Vec<(ElementId, ClickStyle)>>,
    pub play_button: Mutex<Option<ElementId>>,
    pub button_starts_playback: Mutex<bool>,
    pub button_style: Mutex<Option<ClickStyle>>,
    pub unmuted_play_allowed: Mutex<bool>,
    pub unmute_armed: Mutex<bool>,
    pub reloads: Mutex<usize>,
}

impl FakePage {
    pub fn new(doc: DocumentSnapshot) -> Arc<Self> {
        Arc::new(Self {
            doc: Mutex::new(doc),
            ..Self::default()
        })
    }

    pub fn media(&self) -> Option<MediaState> {
        self.doc.lock().media().copied()
    }

    pub fn update_media(&self, f: impl FnOnce(&mut MediaState)) {
        let mut doc = self.doc.lock();
        let mut media = doc.media().copied().unwrap_or_default();
        f(&mut media);
        doc.set_media(media);
    }

    pub fn clicked(&self) -> Vec<ElementId> {
        self.clicks.lock().iter().map(|(id, _)| *id).collect()
    }
}

#[async_trait]
impl Page for FakePage {
    async fn snapshot(&self) -> Result<DocumentSnapshot, PageError> {
        Ok(self.doc.lock().clone())
    }

    async fn click(&self, element: ElementId, style: ClickStyle) -> Result<(), PageError> {
        if self.doc.lock().element(element).is_none() {
            return Err(PageError::ElementMissing(element));
        }
        self.clicks.lock().push((element, style));
        let style_accepted = self.button_style.lock().map_or(true, |s| s == style);
        if *self.play_button.lock() == Some(element)
            && *self.button_starts_playback.lock()
            && style_accepted
        {
            self.update_media(|m| m.paused = false);
        }
        Ok(())
    }

    async fn set_playback_rate(&self, rate: f64) -> Result<(), PageError> {
        self.media().ok_or(PageError::NoMedia)?;
        self.update_media(|m| m.playback_rate = rate);
        Ok(())
    }

    async fn disable_loop(&self) -> Result<(), PageError> {
        self.media().ok_or(PageError::NoMedia)?;
        self.update_media(|m| m.looping = false);
        Ok(())
    }

    async fn set_muted(&self, muted: bool) -> Result<(), PageError> {
        self.media().ok_or(PageError::NoMedia)?;
        self.update_media(|m| m.muted = muted);
        Ok(())
    }

    async fn play(&self) -> Result<(), PageError> {
        let media = self.media().ok_or(PageError::NoMedia)?;
        if !media.muted && !*self.unmuted_play_allowed.lock() {
            return Err(PageError::PlaybackRejected("user gesture required".to_string()));
        }
        self.update_media(|m| m.paused = false);
        Ok(())
    }

    async fn unmute_on_interaction(&self) -> Result<(), PageError> {
        *self.unmute_armed.lock() = true;
        Ok(())
    }

    async fn reload(&self) -> Result<(), PageError> {
        *self.reloads.lock() += 1;
        Ok(())
    }
}

pub(crate) fn capabilities(page: Arc<FakePage>) -> Capabilities {
    Capabilities::new(
        page,
        Arc::new(PlatformClassifier::new()),
        Arc::new(PlayerCompletionDetector::new()),
    )
}

pub(crate) fn timings() -> AgentTimings {
    AgentTimings::default()
}

/// A running coordinator over a memory store and a recording browser.
pub(crate) struct TestCoordinator {
    pub handle: CoordinatorHandle,
    pub browser: Arc<RecordingBrowser>,
    pub store: Arc<MemoryStore>,
}

pub(crate) fn coordinator() -> TestCoordinator {
    let config = CoordinatorConfig::default();
    let (handle, inbox) = channel(config.inbox_capacity);
    let browser = Arc::new(RecordingBrowser::new());
    let store = Arc::new(MemoryStore::new());
    Coordinator::new(Arc::clone(&store), Arc::clone(&browser), config, inbox).spawn();
    TestCoordinator {
        handle,
        browser,
        store,
    }
}
