//! The coordinator actor.
//!
//! The coordinator is the process-wide arbiter between page contexts. It
//! tracks which tab runs the list agent, which tab runs the video agent, and
//! therefore the session [`Phase`]. It is the only component allowed to
//! close tabs and the only writer of session state during a run.
//!
//! # Architecture
//!
//! All mutable state lives in a [`CoordinatorState`] owned by a single tokio
//! task. Page contexts, control surfaces, and the browser reach it only
//! through a [`CoordinatorHandle`], which posts commands into the task's
//! inbox. Because every mutation happens on that one task, no locks are
//! needed around the phase or the two identities.
//!
//! Nothing here is persisted: a restarted coordinator starts idle with no
//! identities, and agents recover by re-registering on their next tick.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use autolearn_coordinator::browser::Browser;
//! use autolearn_coordinator::config::CoordinatorConfig;
//! use autolearn_coordinator::coordinator::{channel, Coordinator};
//! use autolearn_coordinator::store::MemoryStore;
//! use autolearn_coordinator::types::TabId;
//!
//! # async fn example(browser: Arc<impl Browser>) {
//! let config = CoordinatorConfig::default();
//! let (handle, inbox) = channel(config.inbox_capacity);
//! Coordinator::new(Arc::new(MemoryStore::new()), browser, config, inbox).spawn();
//!
//! let client = handle.client(TabId(1));
//! let phase = client.register_list_agent().await.unwrap();
//! println!("current phase: {phase}");
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::browser::Browser;
use crate::client::CoordinatorHandle;
use crate::config::CoordinatorConfig;
use crate::session::SessionStore;
use crate::store::Store;
use crate::types::{Notice, Phase, PhaseStatus, Request, Response, SessionPatch, SettingsPatch, TabId};

/// Commands accepted by the coordinator task.
#[derive(Debug)]
pub(crate) enum Command {
    /// A request from a page context or control surface.
    Request {
        from: Option<TabId>,
        request: Request,
        reply: oneshot::Sender<Response>,
    },
    /// The browser observed a tab being closed.
    TabClosed(TabId),
    /// The browser observed a tab finishing its load.
    TabLoaded(TabId),
}

/// Receiving half of the coordinator inbox.
#[derive(Debug)]
pub struct Inbox {
    rx: mpsc::Receiver<Command>,
}

/// Creates a connected handle and inbox.
///
/// The handle can be cloned and given to page contexts and the browser
/// before the coordinator itself is constructed.
#[must_use]
pub fn channel(capacity: usize) -> (CoordinatorHandle, Inbox) {
    let (tx, rx) = mpsc::channel(capacity);
    (CoordinatorHandle::new(tx), Inbox { rx })
}

/// What an observed tab closure means for the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosedTab {
    /// The video agent's tab closed; the list agent (if any) should resume.
    VideoAgent { resume: Option<TabId> },
    /// The list agent's tab closed; nobody is left to notify.
    ListAgent,
    /// Neither registered identity.
    Unrelated,
}

/// In-memory arbitration state.
///
/// The phase is derived from the video identity, so "learning iff a video
/// agent is registered" holds for every sequence of operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorState {
    list_agent: Option<TabId>,
    video_agent: Option<TabId>,
}

impl CoordinatorState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        if self.video_agent.is_some() {
            Phase::Learning
        } else {
            Phase::Idle
        }
    }

    #[must_use]
    pub fn list_agent(&self) -> Option<TabId> {
        self.list_agent
    }

    #[must_use]
    pub fn video_agent(&self) -> Option<TabId> {
        self.video_agent
    }

    #[must_use]
    pub fn status(&self) -> PhaseStatus {
        PhaseStatus {
            phase: self.phase(),
            video_agent_id: self.video_agent,
        }
    }

    /// Records the list agent, overwriting any previous one.
    pub fn register_list_agent(&mut self, tab: TabId) {
        self.list_agent = Some(tab);
    }

    /// Records the video agent and enters [`Phase::Learning`].
    ///
    /// Returns the identity it replaced, if it was a different tab.
    pub fn register_video_agent(&mut self, tab: TabId) -> Option<TabId> {
        self.video_agent.replace(tab).filter(|previous| *previous != tab)
    }

    /// Clears the video identity, returning to [`Phase::Idle`].
    pub fn take_video_agent(&mut self) -> Option<TabId> {
        self.video_agent.take()
    }

    /// Applies a tab-closed observation.
    pub fn tab_closed(&mut self, tab: TabId) -> ClosedTab {
        if self.video_agent == Some(tab) {
            self.video_agent = None;
            return ClosedTab::VideoAgent {
                resume: self.list_agent,
            };
        }
        if self.list_agent == Some(tab) {
            self.list_agent = None;
            return ClosedTab::ListAgent;
        }
        ClosedTab::Unrelated
    }
}

/// The coordinator task.
pub struct Coordinator<S, B> {
    state: CoordinatorState,
    session: SessionStore<S>,
    browser: Arc<B>,
    config: CoordinatorConfig,
    inbox: Inbox,
}

impl<S: Store, B: Browser> Coordinator<S, B> {
    /// Creates a coordinator over `store`, controlling tabs through `browser`.
    #[must_use]
    pub fn new(store: Arc<S>, browser: Arc<B>, config: CoordinatorConfig, inbox: Inbox) -> Self {
        Self {
            state: CoordinatorState::new(),
            session: SessionStore::new(store),
            browser,
            config,
            inbox,
        }
    }

    /// Spawns the coordinator onto the current tokio runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs until every handle has been dropped.
    pub async fn run(mut self) {
        if let Err(e) = self.session.initialize_defaults().await {
            warn!(error = %e, "Failed to initialize session defaults");
        }
        info!("Coordinator started");

        while let Some(command) = self.inbox.rx.recv().await {
            self.handle(command).await;
        }

        info!("Coordinator stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Request {
                from,
                request,
                reply,
            } => {
                let action = request.action();
                let response = self.handle_request(from, request).await;
                if reply.send(response).is_err() {
                    debug!(action, "Requester went away before the reply");
                }
            }
            Command::TabClosed(tab) => self.on_tab_closed(tab),
            Command::TabLoaded(tab) => self.on_tab_loaded(tab).await,
        }
    }

    async fn handle_request(&mut self, from: Option<TabId>, request: Request) -> Response {
        debug!(action = request.action(), from = ?from, "Request received");

        match request {
            Request::RegisterListAgent => match from {
                Some(tab) => {
                    if self.state.list_agent() != Some(tab) {
                        info!(tab = %tab, "List agent registered");
                    }
                    self.state.register_list_agent(tab);
                    Response::ListRegistered {
                        success: true,
                        current_phase: self.state.phase(),
                    }
                }
                None => Response::failed("registerListAgent requires a sender tab"),
            },

            Request::RegisterVideoAgent => match from {
                Some(tab) => {
                    let was = self.state.phase();
                    if let Some(previous) = self.state.register_video_agent(tab) {
                        warn!(previous = %previous, tab = %tab, "Video agent replaced");
                    }
                    if was == Phase::Idle {
                        info!(tab = %tab, "Video agent registered, idle -> learning");
                    }
                    Response::ok()
                }
                None => Response::failed("registerVideoAgent requires a sender tab"),
            },

            Request::QueryPhase => Response::Phase(self.state.status()),

            Request::CloseVideoTab => {
                self.close_video_tab().await;
                Response::ok()
            }

            Request::UpdateSessionField { data } => {
                into_ack(self.session.apply(data).await, "updateSessionField")
            }

            Request::AppendLog { message } => {
                into_ack(self.session.append_log(message).await, "appendLog")
            }

            Request::GetSettings => match self.session.settings().await {
                Ok(settings) => Response::Settings(settings),
                Err(e) => store_failure("getSettings", &e),
            },

            Request::UpdatePlaybackSpeed { speed } => self.update_playback_speed(speed).await,

            Request::GetSessionState => match self.session.session_state().await {
                Ok(state) => Response::Session(state),
                Err(e) => store_failure("getSessionState", &e),
            },

            Request::RecordCompletion => match self.session.record_completion().await {
                Ok(record) => {
                    info!(
                        learned_count = record.learned_count,
                        course = ?record.course_id,
                        "Course completion recorded"
                    );
                    Response::Completion(record)
                }
                Err(e) => store_failure("recordCompletion", &e),
            },

            Request::SetRunning { running } => self.set_running(running).await,

            Request::ResetProgress => {
                let response = into_ack(self.session.reset().await, "resetProgress");
                if response == Response::ok() {
                    info!("Progress reset");
                }
                response
            }

            Request::UpdateSettings { settings } => self.update_settings(settings).await,
        }
    }

    /// Closes the registered video tab and returns to idle.
    ///
    /// The phase goes back to idle whether or not the close succeeded. The
    /// list agent is told to resume only when there was a video tab to close.
    async fn close_video_tab(&mut self) {
        let Some(tab) = self.state.take_video_agent() else {
            debug!("No video tab to close");
            return;
        };

        match self.browser.close_tab(tab).await {
            Ok(()) => info!(tab = %tab, "Video tab closed, learning -> idle"),
            Err(e) => warn!(tab = %tab, error = %e, "Failed to close video tab, learning -> idle"),
        }

        if let Some(list) = self.state.list_agent() {
            self.schedule_notice(list, Notice::ResumeNextCourse, self.config.resume_delay);
        }
    }

    fn on_tab_closed(&mut self, tab: TabId) {
        match self.state.tab_closed(tab) {
            ClosedTab::VideoAgent { resume } => {
                info!(tab = %tab, "Video tab closed externally, learning -> idle");
                if let Some(list) = resume {
                    self.schedule_notice(list, Notice::ResumeNextCourse, self.config.resume_delay);
                }
            }
            ClosedTab::ListAgent => info!(tab = %tab, "List tab closed"),
            ClosedTab::Unrelated => debug!(tab = %tab, "Unregistered tab closed"),
        }
    }

    async fn on_tab_loaded(&mut self, tab: TabId) {
        match self.session.is_running().await {
            Ok(true) => {
                debug!(tab = %tab, "Tab loaded during a run, scheduling resume");
                self.schedule_notice(tab, Notice::ResumeIfRunning, self.config.tab_loaded_delay);
            }
            Ok(false) => {}
            Err(e) => warn!(tab = %tab, error = %e, "Failed to read run flag"),
        }
    }

    async fn update_playback_speed(&mut self, speed: f64) -> Response {
        if !speed.is_finite() || speed <= 0.0 {
            return Response::failed(format!("invalid playback speed {speed}"));
        }

        let patch = SettingsPatch {
            video_speed: Some(speed),
            ..SettingsPatch::default()
        };
        if let Err(e) = self.session.update_settings(patch).await {
            return store_failure("updatePlaybackSpeed", &e);
        }

        if let Some(video) = self.state.video_agent() {
            self.schedule_notice(video, Notice::UpdateSpeed { speed }, Duration::ZERO);
        }
        Response::ok()
    }

    async fn update_settings(&mut self, settings: SettingsPatch) -> Response {
        if let Some(speed) = settings.video_speed {
            if !speed.is_finite() || speed <= 0.0 {
                return Response::failed(format!("invalid playback speed {speed}"));
            }
        }
        let forward = settings.video_speed;

        if let Err(e) = self.session.update_settings(settings).await {
            return store_failure("updateSettings", &e);
        }

        if let (Some(speed), Some(video)) = (forward, self.state.video_agent()) {
            self.schedule_notice(video, Notice::UpdateSpeed { speed }, Duration::ZERO);
        }
        Response::ok()
    }

    /// Persists the run flag and tells the registered agents to start or stop.
    async fn set_running(&mut self, running: bool) -> Response {
        if let Err(e) = self.session.apply(SessionPatch::new().running(running)).await {
            return store_failure("setRunning", &e);
        }
        info!(running, "Run flag updated");

        let notice = if running { Notice::Start } else { Notice::Stop };
        for tab in [self.state.list_agent(), self.state.video_agent()]
            .into_iter()
            .flatten()
        {
            self.schedule_notice(tab, notice, Duration::ZERO);
        }
        Response::ok()
    }

    /// Sends `notice` to `tab` after `delay` without blocking the inbox.
    ///
    /// Delivery failures are logged and dropped.
    fn schedule_notice(&self, tab: TabId, notice: Notice, delay: Duration) {
        let browser = Arc::clone(&self.browser);
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match browser.notify_tab(tab, notice).await {
                Ok(()) => debug!(tab = %tab, notice = ?notice, "Notice delivered"),
                Err(e) => warn!(tab = %tab, notice = ?notice, error = %e, "Failed to deliver notice"),
            }
        });
    }
}

fn into_ack(result: Result<(), crate::store::StoreError>, action: &'static str) -> Response {
    match result {
        Ok(()) => Response::ok(),
        Err(e) => store_failure(action, &e),
    }
}

fn store_failure(action: &'static str, error: &crate::store::StoreError) -> Response {
    warn!(action, error = %error, "Store operation failed");
    Response::failed(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // CoordinatorState tests
    // ========================================================================

    #[test]
    fn new_state_is_idle_without_identities() {
        let state = CoordinatorState::new();
        assert_eq!(state.phase(), Phase::Idle);
        assert!(state.list_agent().is_none());
        assert!(state.video_agent().is_none());
    }

    #[test]
    fn register_video_agent_enters_learning() {
        let mut state = CoordinatorState::new();
        assert_eq!(state.register_video_agent(TabId(4)), None);
        assert_eq!(state.phase(), Phase::Learning);
        assert_eq!(
            state.status(),
            PhaseStatus {
                phase: Phase::Learning,
                video_agent_id: Some(TabId(4)),
            }
        );
    }

    #[test]
    fn re_registering_same_video_agent_is_not_a_replacement() {
        let mut state = CoordinatorState::new();
        state.register_video_agent(TabId(4));
        assert_eq!(state.register_video_agent(TabId(4)), None);
        assert_eq!(state.register_video_agent(TabId(5)), Some(TabId(4)));
        assert_eq!(state.video_agent(), Some(TabId(5)));
    }

    #[test]
    fn register_list_agent_is_idempotent() {
        let mut once = CoordinatorState::new();
        once.register_list_agent(TabId(1));

        let mut twice = CoordinatorState::new();
        twice.register_list_agent(TabId(1));
        twice.register_list_agent(TabId(1));

        assert_eq!(once, twice);
    }

    #[test]
    fn take_video_agent_is_idempotent() {
        let mut state = CoordinatorState::new();
        state.register_video_agent(TabId(2));

        assert_eq!(state.take_video_agent(), Some(TabId(2)));
        assert_eq!(state.phase(), Phase::Idle);
        assert_eq!(state.take_video_agent(), None);
        assert_eq!(state.phase(), Phase::Idle);
    }

    #[test]
    fn closing_video_tab_resumes_list_agent() {
        let mut state = CoordinatorState::new();
        state.register_list_agent(TabId(1));
        state.register_video_agent(TabId(2));

        assert_eq!(
            state.tab_closed(TabId(2)),
            ClosedTab::VideoAgent {
                resume: Some(TabId(1))
            }
        );
        assert_eq!(state.phase(), Phase::Idle);
        assert_eq!(state.list_agent(), Some(TabId(1)));

        // A second observation of the same closure changes nothing.
        assert_eq!(state.tab_closed(TabId(2)), ClosedTab::Unrelated);
    }

    #[test]
    fn closing_list_tab_only_clears_list_identity() {
        let mut state = CoordinatorState::new();
        state.register_list_agent(TabId(1));
        state.register_video_agent(TabId(2));

        assert_eq!(state.tab_closed(TabId(1)), ClosedTab::ListAgent);
        assert!(state.list_agent().is_none());
        assert_eq!(state.phase(), Phase::Learning);
    }

    #[test]
    fn phase_tracks_video_identity_for_any_sequence() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(0x9e37_79b9);
        let mut state = CoordinatorState::new();
        for _ in 0..500 {
            let tab = TabId(rng.random_range(0..4));
            match rng.random_range(0..4) {
                0 => {
                    state.register_video_agent(tab);
                }
                1 => state.register_list_agent(tab),
                2 => {
                    state.take_video_agent();
                }
                _ => {
                    state.tab_closed(tab);
                }
            }
            assert_eq!(
                state.phase() == Phase::Learning,
                state.video_agent().is_some()
            );
        }
    }
}
