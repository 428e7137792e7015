//! Tab control capability used by the coordinator.
//!
//! Only the coordinator may close tabs or push notices into them. The
//! [`Browser`] trait is that capability; a real extension host, the course
//! simulator, and test fakes all implement it.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::types::{Notice, TabId};

/// Tab operations available to the coordinator.
#[async_trait]
pub trait Browser: Send + Sync + 'static {
    /// Closes a tab. Fails with [`TransportError::RecipientGone`] if it no longer exists.
    async fn close_tab(&self, tab: TabId) -> Result<(), TransportError>;

    /// Delivers a notice to the page context running in `tab`.
    ///
    /// Delivery is best-effort and at most once.
    async fn notify_tab(&self, tab: TabId, notice: Notice) -> Result<(), TransportError>;
}

#[cfg(any(test, feature = "test-support"))]
mod recording {
    use std::collections::HashSet;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::Browser;
    use crate::error::TransportError;
    use crate::types::{Notice, TabId};

    /// Browser fake that records every call.
    ///
    /// Tabs are considered open until closed or marked gone with
    /// [`RecordingBrowser::mark_gone`].
    #[derive(Debug, Default)]
    pub struct RecordingBrowser {
        closed: Mutex<Vec<TabId>>,
        notices: Mutex<Vec<(TabId, Notice)>>,
        gone: Mutex<HashSet<TabId>>,
    }

    impl RecordingBrowser {
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes every later call targeting `tab` fail with `RecipientGone`.
        pub fn mark_gone(&self, tab: TabId) {
            self.gone.lock().insert(tab);
        }

        pub fn closed_tabs(&self) -> Vec<TabId> {
            self.closed.lock().clone()
        }

        pub fn notices(&self) -> Vec<(TabId, Notice)> {
            self.notices.lock().clone()
        }

        pub fn notices_for(&self, tab: TabId) -> Vec<Notice> {
            self.notices
                .lock()
                .iter()
                .filter(|(t, _)| *t == tab)
                .map(|(_, n)| *n)
                .collect()
        }
    }

    #[async_trait]
    impl Browser for RecordingBrowser {
        async fn close_tab(&self, tab: TabId) -> Result<(), TransportError> {
            if !self.gone.lock().insert(tab) {
                return Err(TransportError::RecipientGone);
            }
            self.closed.lock().push(tab);
            Ok(())
        }

        async fn notify_tab(&self, tab: TabId, notice: Notice) -> Result<(), TransportError> {
            if self.gone.lock().contains(&tab) {
                return Err(TransportError::RecipientGone);
            }
            self.notices.lock().push((tab, notice));
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use recording::RecordingBrowser;
