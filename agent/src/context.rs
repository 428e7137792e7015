//! The page context runtime.
//!
//! One [`PageContext`] runs per tab generation (a reload starts a new one).
//! It owns the local run flag, a polling interval, and the inbox of notices
//! pushed by the coordinator. Ticks and notices are consumed from a single
//! `select!` loop, so a tick never overlaps another tick or a notice.
//!
//! Each tick classifies the page and hands it to the [`VideoAgent`] (created
//! once per context) or the [`ListAgent`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use autolearn_agent::classifier::PlatformClassifier;
//! use autolearn_agent::config::AgentTimings;
//! use autolearn_agent::context::{Capabilities, PageContext};
//! use autolearn_agent::detector::PlayerCompletionDetector;
//! use autolearn_agent::page::Page;
//! use autolearn_coordinator::CoordinatorClient;
//!
//! # fn example(page: Arc<dyn Page>, client: CoordinatorClient) {
//! let caps = Capabilities::new(
//!     page,
//!     Arc::new(PlatformClassifier::new()),
//!     Arc::new(PlayerCompletionDetector::new()),
//! );
//! let (notices, context) = PageContext::new(caps, client, AgentTimings::default());
//! context.spawn();
//! # drop(notices);
//! # }
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use autolearn_coordinator::{CoordinatorClient, Notice, SessionPatch};

use crate::classifier::{PageClassifier, PageKind};
use crate::config::AgentTimings;
use crate::detector::CompletionDetector;
use crate::dom::DocumentSnapshot;
use crate::error::PageError;
use crate::list::{ListAgent, ListOutcome};
use crate::page::{ClickStyle, Page};
use crate::video::VideoAgent;

/// Capacity of a page context's notice inbox.
const NOTICE_CAPACITY: usize = 32;

/// The local "automation is running" flag of one page context.
///
/// Delayed actions hold a clone and re-check it before acting, so stopping
/// turns every in-flight callback into a no-op.
#[derive(Debug, Clone, Default)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sets the flag. Returns false if it was already set.
    pub fn start(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Everything an agent can observe or do on its page.
#[derive(Clone)]
pub struct Capabilities {
    pub page: Arc<dyn Page>,
    pub classifier: Arc<dyn PageClassifier>,
    pub detector: Arc<dyn CompletionDetector>,
}

impl Capabilities {
    #[must_use]
    pub fn new(
        page: Arc<dyn Page>,
        classifier: Arc<dyn PageClassifier>,
        detector: Arc<dyn CompletionDetector>,
    ) -> Self {
        Self {
            page,
            classifier,
            detector,
        }
    }
}

/// Runs `action` after `delay`, unless the run flag was cleared meanwhile.
///
/// `action` is not polled before the delay elapses.
pub(crate) fn schedule<F>(
    run: RunFlag,
    delay: Duration,
    label: &'static str,
    action: F,
) -> JoinHandle<()>
where
    F: Future<Output = Result<(), PageError>> + Send + 'static,
{
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if !run.is_running() {
            debug!(action = label, "Run stopped, skipping delayed action");
            return;
        }
        match action.await {
            Ok(()) => debug!(action = label, "Delayed action done"),
            Err(e) => warn!(action = label, error = %e, "Delayed action failed"),
        }
    })
}

/// Sends a run-log line, logging transport failures locally.
pub(crate) async fn log_line(client: &CoordinatorClient, message: impl Into<String>) {
    if let Err(e) = client.append_log(message).await {
        debug!(error = %e, "Failed to append run log");
    }
}

/// The runtime of one tab generation.
pub struct PageContext {
    caps: Capabilities,
    client: CoordinatorClient,
    timings: AgentTimings,
    run: RunFlag,
    notices: mpsc::Receiver<Notice>,
    ticker: Interval,
    video: Option<VideoAgent>,
    list: ListAgent,
}

impl PageContext {
    /// Creates a context and the sender the browser uses to deliver notices to it.
    #[must_use]
    pub fn new(
        caps: Capabilities,
        client: CoordinatorClient,
        timings: AgentTimings,
    ) -> (mpsc::Sender<Notice>, Self) {
        let (tx, notices) = mpsc::channel(NOTICE_CAPACITY);
        let run = RunFlag::new();
        let mut ticker = interval(timings.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let list = ListAgent::new(caps.clone(), client.clone(), timings.clone(), run.clone());
        let context = Self {
            caps,
            client,
            timings,
            run,
            notices,
            ticker,
            video: None,
            list,
        };
        (tx, context)
    }

    /// The context's run flag.
    #[must_use]
    pub fn run_flag(&self) -> RunFlag {
        self.run.clone()
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Restores the persisted run state, then serves ticks and notices until
    /// the notice sender is dropped.
    pub async fn run(mut self) {
        self.restore().await;

        loop {
            tokio::select! {
                _ = self.ticker.tick() => {
                    if self.run.is_running() {
                        self.tick().await;
                    }
                }
                notice = self.notices.recv() => match notice {
                    Some(notice) => self.on_notice(notice).await,
                    None => break,
                },
            }
        }

        self.shutdown();
        debug!(tab = ?self.client.tab(), "Page context ended");
    }

    async fn restore(&mut self) {
        match self.client.session_state().await {
            Ok(state) if state.is_running => {
                info!(tab = ?self.client.tab(), "Restoring previous run");
                self.start().await;
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Failed to read session state on load"),
        }
    }

    async fn on_notice(&mut self, notice: Notice) {
        debug!(tab = ?self.client.tab(), notice = ?notice, "Notice received");
        match notice {
            Notice::Start => self.start().await,
            Notice::Stop => self.stop().await,
            Notice::ResumeNextCourse => {
                self.list.clear_pending();
                if self.run.is_running() {
                    self.tick_now().await;
                }
            }
            Notice::ResumeIfRunning => {
                if self.run.is_running() {
                    return;
                }
                match self.client.session_state().await {
                    Ok(state) if state.is_running => self.start().await,
                    Ok(_) => {}
                    Err(e) => debug!(error = %e, "Failed to read session state"),
                }
            }
            Notice::UpdateSpeed { speed } => {
                if let Some(video) = &self.video {
                    video.update_speed(speed).await;
                }
            }
        }
    }

    /// Starts automation in this context. Idempotent.
    pub async fn start(&mut self) {
        if !self.run.start() {
            debug!("Already running");
            return;
        }
        info!(tab = ?self.client.tab(), "Automation started");

        if let Some(video) = self.video.take() {
            video.abort();
        }
        self.list.reset_for_start();
        log_line(&self.client, "Automation started").await;

        if let Err(e) = self
            .client
            .update_session(SessionPatch::new().running(true))
            .await
        {
            debug!(error = %e, "Failed to persist run flag");
        }

        self.tick_now().await;
    }

    /// Stops automation, clears local flags, and persists the stop.
    pub async fn stop(&mut self) {
        self.run.stop();
        self.list.clear_pending();
        if let Some(video) = &self.video {
            video.abort();
        }
        info!(tab = ?self.client.tab(), "Automation stopped");
        log_line(&self.client, "Automation stopped").await;

        if let Err(e) = self
            .client
            .update_session(SessionPatch::new().running(false))
            .await
        {
            debug!(error = %e, "Failed to persist run flag");
        }
    }

    async fn tick_now(&mut self) {
        self.tick().await;
        self.ticker.reset();
    }

    async fn tick(&mut self) {
        let doc = match self.caps.page.snapshot().await {
            Ok(doc) => doc,
            Err(e) => {
                debug!(error = %e, "Page unavailable");
                return;
            }
        };

        match self.caps.classifier.classify(&doc) {
            PageKind::Video => {
                let video = self.video.get_or_insert_with(|| {
                    VideoAgent::new(
                        self.caps.clone(),
                        self.client.clone(),
                        self.timings.clone(),
                        self.run.clone(),
                    )
                });
                video.tick(&doc).await;
            }
            PageKind::CourseList { cards } => {
                self.dismiss_dialog(&doc);
                if self.list.tick(&doc, &cards).await == ListOutcome::Halted {
                    self.stop().await;
                }
            }
            PageKind::Unknown => {
                self.dismiss_dialog(&doc);
                debug!("Waiting for page to load");
            }
        }
    }

    /// Clicks a visible system dialog's button, best-effort.
    fn dismiss_dialog(&self, doc: &DocumentSnapshot) {
        let Some(button) = self.caps.classifier.dismissible_dialog(doc) else {
            return;
        };
        debug!(button = %button, "Dismissing system dialog");
        let page = Arc::clone(&self.caps.page);
        schedule(
            self.run.clone(),
            self.timings.dialog_delay,
            "dismiss-dialog",
            async move { page.click(button, ClickStyle::Direct).await },
        );
    }

    fn shutdown(&self) {
        if let Some(video) = &self.video {
            video.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use autolearn_coordinator::{CourseId, TabId};

    use crate::dom::{MediaState, Node};
    use crate::testing::{capabilities, coordinator, timings, FakePage};

    const TAB: TabId = TabId(1);

    fn list_page(count: usize) -> DocumentSnapshot {
        let mut doc = DocumentSnapshot::new("https://x/#/courses");
        let list = doc.append(None, Node::new("div").class("course-list"));
        for i in 0..count {
            let card = doc.append(Some(list), Node::new("div").classes("item hover-shadow"));
            doc.append(
                Some(card),
                Node::new("a").attr("href", format!("#/video?id=c{i}")),
            );
        }
        doc
    }

    fn video_page() -> DocumentSnapshot {
        let mut doc = DocumentSnapshot::new("https://x/#/video?id=c0");
        doc.append(None, Node::new("h1").text("Borrowing"));
        let player = doc.append(None, Node::new("div").class("video-js"));
        doc.append(Some(player), Node::new("video"));
        doc.set_media(MediaState {
            duration: 120.0,
            paused: false,
            ..MediaState::default()
        });
        doc
    }

    fn context(page: &Arc<FakePage>, client: CoordinatorClient) -> PageContext {
        let (_notices, context) =
            PageContext::new(capabilities(Arc::clone(page)), client, timings());
        context
    }

    #[test]
    fn run_flag_start_is_idempotent() {
        let flag = RunFlag::new();
        assert!(!flag.is_running());
        assert!(flag.start());
        assert!(!flag.start());
        assert!(flag.is_running());

        let clone = flag.clone();
        flag.stop();
        assert!(!clone.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_action_is_skipped_after_stop() {
        let flag = RunFlag::new();
        flag.start();
        let fired = Arc::new(AtomicBool::new(false));

        let f = Arc::clone(&fired);
        let handle = schedule(flag.clone(), Duration::from_secs(1), "test", async move {
            f.store(true, Ordering::SeqCst);
            Ok(())
        });
        flag.stop();
        handle.await.unwrap();

        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_action_runs_after_delay() {
        let flag = RunFlag::new();
        flag.start();
        let fired = Arc::new(AtomicBool::new(false));

        let f = Arc::clone(&fired);
        let handle = schedule(flag, Duration::from_secs(2), "test", async move {
            f.store(true, Ordering::SeqCst);
            Ok(())
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!fired.load(Ordering::SeqCst));

        handle.await.unwrap();
        assert!(fired.load(Ordering::SeqCst));
    }

    // ========================================================================
    // Notices
    // ========================================================================

    #[tokio::test(start_paused = true)]
    async fn stop_notice_clears_pending_and_persists() {
        let coord = coordinator();
        let page = FakePage::new(list_page(1));
        let client = coord.handle.client(TAB);
        let mut ctx = context(&page, client.clone());

        ctx.on_notice(Notice::Start).await;
        assert!(ctx.run.is_running());
        assert!(ctx.list.is_waiting());
        assert!(client.session_state().await.unwrap().is_running);

        ctx.on_notice(Notice::Stop).await;
        assert!(!ctx.run.is_running());
        assert!(!ctx.list.is_waiting());
        assert!(!client.session_state().await.unwrap().is_running);

        // The card activation scheduled before the stop never fires.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(page.clicks.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn resume_if_running_follows_persisted_flag() {
        let coord = coordinator();
        let page = FakePage::new(list_page(1));
        let client = coord.handle.client(TAB);
        let mut ctx = context(&page, client.clone());

        ctx.on_notice(Notice::ResumeIfRunning).await;
        assert!(!ctx.run.is_running());
        assert!(!ctx.list.is_waiting());

        client
            .update_session(SessionPatch::new().running(true))
            .await
            .unwrap();
        ctx.on_notice(Notice::ResumeIfRunning).await;
        assert!(ctx.run.is_running());
        assert!(ctx.list.is_waiting());
        assert_eq!(
            client.session_state().await.unwrap().current_learning_course_id,
            Some(CourseId::new("c0"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn resume_next_course_ticks_immediately() {
        let coord = coordinator();
        let page = FakePage::new(list_page(2));
        let client = coord.handle.client(TAB);
        let mut ctx = context(&page, client.clone());

        ctx.on_notice(Notice::Start).await;
        assert!(ctx.list.is_waiting());
        coord.handle.control().record_completion().await.unwrap();

        // Without the notice the pending navigation would hold the next tick.
        ctx.on_notice(Notice::ResumeNextCourse).await;
        assert!(ctx.list.is_waiting());
        let state = client.session_state().await.unwrap();
        assert_eq!(state.learned_courses, vec![CourseId::new("c0")]);
        assert_eq!(state.current_learning_course_id, Some(CourseId::new("c1")));
    }

    #[tokio::test(start_paused = true)]
    async fn update_speed_reaches_video_agent() {
        let coord = coordinator();
        let page = FakePage::new(video_page());
        let mut ctx = context(&page, coord.handle.client(TabId(2)));

        ctx.on_notice(Notice::Start).await;
        assert!(ctx.video.is_some());
        assert_eq!(page.media().unwrap().playback_rate, 1.5);

        ctx.on_notice(Notice::UpdateSpeed { speed: 2.5 }).await;
        assert_eq!(page.media().unwrap().playback_rate, 2.5);

        ctx.on_notice(Notice::Stop).await;
    }

    #[tokio::test(start_paused = true)]
    async fn update_speed_without_video_is_ignored() {
        let coord = coordinator();
        let page = FakePage::new(list_page(0));
        let mut ctx = context(&page, coord.handle.client(TAB));

        ctx.on_notice(Notice::UpdateSpeed { speed: 2.5 }).await;
        assert!(ctx.video.is_none());
        assert!(!ctx.run.is_running());
    }
}
