//! The [`Page`] capability over a simulated tab.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use autolearn_coordinator::TabId;

use crate::dom::{DocumentSnapshot, ElementId};
use crate::error::PageError;
use crate::page::{ClickStyle, Page};

use super::browser::SimBrowser;
use super::platform::{Control, Player, Rendered, SimPlatform};

/// What a simulated tab is showing.
#[derive(Debug, Clone, PartialEq)]
pub enum View {
    /// The course list at a zero-based page.
    List { page: usize },
    /// A course video.
    Video(Player),
}

impl View {
    /// The first list page.
    #[must_use]
    pub fn list() -> Self {
        Self::List { page: 0 }
    }
}

/// A page bound to one simulated tab.
///
/// Element ids are resolved against the most recent snapshot.
pub struct SimPage {
    browser: Weak<SimBrowser>,
    tab: TabId,
    view: Arc<Mutex<View>>,
    last: Mutex<Option<Rendered>>,
}

impl SimPage {
    pub(crate) fn new(browser: Weak<SimBrowser>, tab: TabId, view: Arc<Mutex<View>>) -> Self {
        Self {
            browser,
            tab,
            view,
            last: Mutex::new(None),
        }
    }

    fn browser(&self) -> Result<Arc<SimBrowser>, PageError> {
        self.browser
            .upgrade()
            .filter(|b| b.is_open(self.tab))
            .ok_or(PageError::Detached)
    }

    /// Runs `f` against the tab's player, after bringing it up to date.
    fn with_player<T>(
        &self,
        f: impl FnOnce(&mut SimPlatform, &mut Player, Instant) -> T,
    ) -> Result<T, PageError> {
        let browser = self.browser()?;
        let mut platform = browser.platform().lock();
        let mut view = self.view.lock();
        let View::Video(player) = &mut *view else {
            return Err(PageError::NoMedia);
        };
        let now = Instant::now();
        platform.advance(player, now);
        Ok(f(&mut *platform, player, now))
    }

    fn control(&self, element: ElementId) -> Result<Option<Control>, PageError> {
        let last = self.last.lock();
        let rendered = last.as_ref().ok_or(PageError::ElementMissing(element))?;
        if rendered.doc.element(element).is_none() {
            return Err(PageError::ElementMissing(element));
        }
        Ok(rendered.controls.get(&element).copied())
    }
}

#[async_trait]
impl Page for SimPage {
    async fn snapshot(&self) -> Result<DocumentSnapshot, PageError> {
        let browser = self.browser()?;
        let rendered = {
            let mut platform = browser.platform().lock();
            let mut view = self.view.lock();
            match &mut *view {
                View::List { page } => platform.render_list(*page),
                View::Video(player) => {
                    platform.advance(player, Instant::now());
                    platform.render_video(player)
                }
            }
        };
        let doc = rendered.doc.clone();
        *self.last.lock() = Some(rendered);
        Ok(doc)
    }

    async fn click(&self, element: ElementId, style: ClickStyle) -> Result<(), PageError> {
        let browser = self.browser()?;
        let Some(control) = self.control(element)? else {
            debug!(tab = %self.tab, element = %element, "Click on inert element");
            return Ok(());
        };

        match control {
            Control::OpenCourse(course) => {
                let player = browser.platform().lock().open_player(course);
                if let Some(player) = player {
                    browser.open_tab(View::Video(player));
                }
            }
            Control::GoToPage(page) => {
                *self.view.lock() = View::List { page };
            }
            Control::Play => {
                let started = self.with_player(|platform, player, now| {
                    platform.click_play(player, style, now)
                })?;
                debug!(tab = %self.tab, style = ?style, started, "Play control clicked");
            }
        }
        Ok(())
    }

    async fn set_playback_rate(&self, rate: f64) -> Result<(), PageError> {
        self.with_player(|platform, player, now| platform.set_rate(player, rate, now))
    }

    async fn disable_loop(&self) -> Result<(), PageError> {
        self.with_player(|_, player, _| player.looping = false)
    }

    async fn set_muted(&self, muted: bool) -> Result<(), PageError> {
        self.with_player(|_, player, _| player.muted = muted)
    }

    async fn play(&self) -> Result<(), PageError> {
        if self.with_player(|platform, player, now| platform.play(player, now))? {
            Ok(())
        } else {
            Err(PageError::PlaybackRejected(
                "play() requires a user gesture".to_string(),
            ))
        }
    }

    async fn unmute_on_interaction(&self) -> Result<(), PageError> {
        self.with_player(|_, player, _| player.unmute_armed = true)
    }

    async fn reload(&self) -> Result<(), PageError> {
        let browser = self.browser()?;
        {
            let mut view = self.view.lock();
            // Pagination lives in component state, not in the route.
            if let View::List { page } = &mut *view {
                *page = 0;
            }
        }
        if browser.reload_tab(self.tab) {
            Ok(())
        } else {
            Err(PageError::Detached)
        }
    }
}
