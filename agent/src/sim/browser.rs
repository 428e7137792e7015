//! The simulated browser.
//!
//! [`SimBrowser`] owns the open tabs. Each tab runs one [`PageContext`] over
//! a [`SimPage`]; opening a course link spawns a new tab, a reload replaces
//! the tab's context with a fresh one, and closing aborts it. Tab events are
//! reported to the coordinator through its handle, exactly as a real
//! extension host would.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use autolearn_coordinator::{Browser, CoordinatorHandle, Notice, TabId, TransportError};

use crate::classifier::PlatformClassifier;
use crate::config::AgentTimings;
use crate::context::{Capabilities, PageContext};
use crate::detector::PlayerCompletionDetector;

use super::page::{SimPage, View};
use super::platform::SimPlatform;

/// A live tab.
struct SimTab {
    view: Arc<Mutex<View>>,
    notices: mpsc::Sender<Notice>,
    task: JoinHandle<()>,
}

/// Tab host for the simulated platform.
pub struct SimBrowser {
    me: Weak<SimBrowser>,
    handle: CoordinatorHandle,
    platform: Arc<Mutex<SimPlatform>>,
    timings: AgentTimings,
    tabs: Mutex<HashMap<TabId, SimTab>>,
    next_tab: AtomicU32,
}

impl SimBrowser {
    #[must_use]
    pub fn new(
        handle: CoordinatorHandle,
        platform: Arc<Mutex<SimPlatform>>,
        timings: AgentTimings,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            handle,
            platform,
            timings,
            tabs: Mutex::new(HashMap::new()),
            next_tab: AtomicU32::new(1),
        })
    }

    #[must_use]
    pub fn platform(&self) -> &Arc<Mutex<SimPlatform>> {
        &self.platform
    }

    /// Ids of the currently open tabs, ascending.
    #[must_use]
    pub fn open_tabs(&self) -> Vec<TabId> {
        let mut tabs: Vec<TabId> = self.tabs.lock().keys().copied().collect();
        tabs.sort();
        tabs
    }

    #[must_use]
    pub fn is_open(&self, tab: TabId) -> bool {
        self.tabs.lock().contains_key(&tab)
    }

    /// Opens a tab showing `view` and starts its page context.
    pub fn open_tab(&self, view: View) -> TabId {
        let tab = TabId(self.next_tab.fetch_add(1, Ordering::SeqCst));
        let view = Arc::new(Mutex::new(view));
        let (notices, context) = self.new_context(tab, Arc::clone(&view));

        // The tab must be registered before its context first runs.
        let mut tabs = self.tabs.lock();
        tabs.insert(
            tab,
            SimTab {
                view,
                notices,
                task: context.spawn(),
            },
        );
        drop(tabs);

        info!(tab = %tab, "Tab opened");
        self.handle.tab_loaded(tab);
        tab
    }

    /// Replaces the tab's page context with a fresh one, as a reload does.
    pub fn reload_tab(&self, tab: TabId) -> bool {
        let mut tabs = self.tabs.lock();
        let Some(entry) = tabs.get_mut(&tab) else {
            return false;
        };
        entry.task.abort();
        let (notices, context) = self.new_context(tab, Arc::clone(&entry.view));
        entry.notices = notices;
        entry.task = context.spawn();
        drop(tabs);

        info!(tab = %tab, "Tab reloaded");
        self.handle.tab_loaded(tab);
        true
    }

    /// Closes every tab without reporting, ending the simulation.
    pub fn shutdown(&self) {
        for (tab, entry) in self.tabs.lock().drain() {
            debug!(tab = %tab, "Tearing down tab");
            entry.task.abort();
        }
    }

    fn new_context(
        &self,
        tab: TabId,
        view: Arc<Mutex<View>>,
    ) -> (mpsc::Sender<Notice>, PageContext) {
        let page = SimPage::new(self.me.clone(), tab, view);
        let caps = Capabilities::new(
            Arc::new(page),
            Arc::new(PlatformClassifier::new()),
            Arc::new(PlayerCompletionDetector::new()),
        );
        PageContext::new(caps, self.handle.client(tab), self.timings.clone())
    }
}

#[async_trait]
impl Browser for SimBrowser {
    async fn close_tab(&self, tab: TabId) -> Result<(), TransportError> {
        let entry = self
            .tabs
            .lock()
            .remove(&tab)
            .ok_or(TransportError::RecipientGone)?;
        entry.task.abort();
        info!(tab = %tab, "Tab closed");
        self.handle.tab_closed(tab);
        Ok(())
    }

    async fn notify_tab(&self, tab: TabId, notice: Notice) -> Result<(), TransportError> {
        let sender = self
            .tabs
            .lock()
            .get(&tab)
            .map(|entry| entry.notices.clone())
            .ok_or(TransportError::RecipientGone)?;
        sender
            .try_send(notice)
            .map_err(|_| TransportError::RecipientGone)
    }
}
