//! Integration tests for the coordinator message protocol.
//!
//! These tests drive a real coordinator task over an in-memory store and a
//! fake browser, with tokio time paused so protocol delays elapse instantly.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use autolearn_coordinator::{
    channel, Browser, Coordinator, CoordinatorConfig, CoordinatorHandle, CourseId, MemoryStore,
    Notice, Phase, PhaseStatus, SessionPatch, SessionStore, TabId, TransportError,
};

// =============================================================================
// Test Helpers
// =============================================================================

const LIST_TAB: TabId = TabId(1);
const VIDEO_TAB: TabId = TabId(2);

/// Browser fake that records closes and notices.
#[derive(Default)]
struct FakeBrowser {
    closed: Mutex<Vec<TabId>>,
    notices: Mutex<Vec<(TabId, Notice)>>,
    gone: Mutex<HashSet<TabId>>,
    handle: Mutex<Option<CoordinatorHandle>>,
}

impl FakeBrowser {
    fn notices_for(&self, tab: TabId) -> Vec<Notice> {
        self.notices
            .lock()
            .iter()
            .filter(|(t, _)| *t == tab)
            .map(|(_, n)| *n)
            .collect()
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn close_tab(&self, tab: TabId) -> Result<(), TransportError> {
        if !self.gone.lock().insert(tab) {
            return Err(TransportError::RecipientGone);
        }
        self.closed.lock().push(tab);
        // A real browser reports the closure back as an event.
        if let Some(handle) = self.handle.lock().as_ref() {
            handle.tab_closed(tab);
        }
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

struct Harness {
    handle: CoordinatorHandle,
    browser: Arc<FakeBrowser>,
    store: Arc<MemoryStore>,
}

fn start_coordinator() -> Harness {
    let store = Arc::new(MemoryStore::new());
    start_with_store(store)
}

fn start_with_store(store: Arc<MemoryStore>) -> Harness {
    let config = CoordinatorConfig::default();
    let (handle, inbox) = channel(config.inbox_capacity);
    let browser = Arc::new(FakeBrowser::default());
    *browser.handle.lock() = Some(handle.clone());
    Coordinator::new(Arc::clone(&store), Arc::clone(&browser), config, inbox).spawn();
    Harness {
        handle,
        browser,
        store,
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_secs(3)).await;
}

// =============================================================================
// Arbitration
// =============================================================================

#[tokio::test(start_paused = true)]
async fn query_phase_reports_learning_while_video_registered() {
    let h = start_coordinator();
    let list = h.handle.client(LIST_TAB);
    let video = h.handle.client(VIDEO_TAB);

    assert_eq!(list.register_list_agent().await.unwrap(), Phase::Idle);
    video.register_video_agent().await.unwrap();

    let status = list.query_phase().await.unwrap();
    assert_eq!(
        status,
        PhaseStatus {
            phase: Phase::Learning,
            video_agent_id: Some(VIDEO_TAB),
        }
    );
    assert_eq!(list.register_list_agent().await.unwrap(), Phase::Learning);
}

#[tokio::test(start_paused = true)]
async fn close_video_tab_returns_to_idle_and_resumes_list() {
    let h = start_coordinator();
    let list = h.handle.client(LIST_TAB);
    let video = h.handle.client(VIDEO_TAB);
    list.register_list_agent().await.unwrap();
    video.register_video_agent().await.unwrap();

    video.close_video_tab().await.unwrap();

    assert_eq!(*h.browser.closed.lock(), vec![VIDEO_TAB]);
    assert_eq!(list.query_phase().await.unwrap().phase, Phase::Idle);

    // The resume notice waits one time unit.
    assert!(h.browser.notices_for(LIST_TAB).is_empty());
    settle().await;
    // Exactly one resume even though the browser also reported the closure.
    assert_eq!(
        h.browser.notices_for(LIST_TAB),
        vec![Notice::ResumeNextCourse]
    );
}

#[tokio::test(start_paused = true)]
async fn external_video_tab_closure_resumes_list() {
    let h = start_coordinator();
    let list = h.handle.client(LIST_TAB);
    h.handle
        .client(VIDEO_TAB)
        .register_video_agent()
        .await
        .unwrap();
    list.register_list_agent().await.unwrap();

    h.handle.tab_closed(VIDEO_TAB);

    let status = list.query_phase().await.unwrap();
    assert_eq!(status.phase, Phase::Idle);
    assert_eq!(status.video_agent_id, None);

    settle().await;
    assert_eq!(
        h.browser.notices_for(LIST_TAB),
        vec![Notice::ResumeNextCourse]
    );
}

#[tokio::test(start_paused = true)]
async fn close_video_tab_is_idempotent() {
    let h = start_coordinator();
    let list = h.handle.client(LIST_TAB);
    list.register_list_agent().await.unwrap();
    h.handle
        .client(VIDEO_TAB)
        .register_video_agent()
        .await
        .unwrap();

    list.close_video_tab().await.unwrap();
    list.close_video_tab().await.unwrap();
    h.handle.tab_closed(VIDEO_TAB);
    settle().await;

    assert_eq!(list.query_phase().await.unwrap().phase, Phase::Idle);
    assert_eq!(h.browser.closed.lock().len(), 1);
    assert_eq!(h.browser.notices_for(LIST_TAB).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_close_still_returns_to_idle() {
    let h = start_coordinator();
    let list = h.handle.client(LIST_TAB);
    list.register_list_agent().await.unwrap();
    h.handle
        .client(VIDEO_TAB)
        .register_video_agent()
        .await
        .unwrap();
    h.browser.gone.lock().insert(VIDEO_TAB);

    list.close_video_tab().await.unwrap();

    assert_eq!(list.query_phase().await.unwrap().phase, Phase::Idle);
    settle().await;
    assert_eq!(
        h.browser.notices_for(LIST_TAB),
        vec![Notice::ResumeNextCourse]
    );
}

#[tokio::test(start_paused = true)]
async fn closing_list_tab_sends_nothing() {
    let h = start_coordinator();
    let list = h.handle.client(LIST_TAB);
    list.register_list_agent().await.unwrap();

    h.handle.tab_closed(LIST_TAB);
    h.handle
        .client(VIDEO_TAB)
        .register_video_agent()
        .await
        .unwrap();
    h.handle.tab_closed(VIDEO_TAB);
    settle().await;

    assert!(h.browser.notices.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn registration_without_sender_is_rejected() {
    let h = start_coordinator();
    let err = h.handle.control().register_video_agent().await.unwrap_err();
    assert!(matches!(err, TransportError::Rejected(_)));

    let status = h.handle.control().query_phase().await.unwrap();
    assert_eq!(status.phase, Phase::Idle);
}

// =============================================================================
// Tab lifecycle observations
// =============================================================================

#[tokio::test(start_paused = true)]
async fn loaded_tab_is_nudged_only_while_running() {
    let h = start_coordinator();
    let control = h.handle.control();

    h.handle.tab_loaded(TabId(5));
    settle().await;
    assert!(h.browser.notices_for(TabId(5)).is_empty());

    control.set_running(true).await.unwrap();
    h.handle.tab_loaded(TabId(5));
    settle().await;
    assert_eq!(
        h.browser.notices_for(TabId(5)),
        vec![Notice::ResumeIfRunning]
    );
}

#[tokio::test(start_paused = true)]
async fn stopping_notifies_registered_agents() {
    let h = start_coordinator();
    h.handle
        .client(LIST_TAB)
        .register_list_agent()
        .await
        .unwrap();
    h.handle
        .client(VIDEO_TAB)
        .register_video_agent()
        .await
        .unwrap();

    h.handle.control().set_running(false).await.unwrap();
    settle().await;

    assert_eq!(h.browser.notices_for(LIST_TAB), vec![Notice::Stop]);
    assert_eq!(h.browser.notices_for(VIDEO_TAB), vec![Notice::Stop]);
}

// =============================================================================
// Session state
// =============================================================================

#[tokio::test(start_paused = true)]
async fn playback_speed_is_persisted_and_forwarded() {
    let h = start_coordinator();
    h.handle
        .client(VIDEO_TAB)
        .register_video_agent()
        .await
        .unwrap();

    h.handle.control().update_playback_speed(2.0).await.unwrap();
    settle().await;

    let settings = h.handle.control().settings().await.unwrap();
    assert_eq!(settings.video_speed, 2.0);
    assert_eq!(
        h.browser.notices_for(VIDEO_TAB),
        vec![Notice::UpdateSpeed { speed: 2.0 }]
    );

    let err = h
        .handle
        .control()
        .update_playback_speed(-1.0)
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Rejected(_)));
}

#[tokio::test(start_paused = true)]
async fn record_completion_updates_learned_set() {
    let h = start_coordinator();
    let list = h.handle.client(LIST_TAB);
    list.update_session(
        SessionPatch::new()
            .current_course("Traits")
            .learning_course(Some(CourseId::new("c-7"))),
    )
    .await
    .unwrap();

    let record = h
        .handle
        .client(VIDEO_TAB)
        .record_completion()
        .await
        .unwrap();
    assert_eq!(record.learned_count, 1);
    assert_eq!(record.course_id, Some(CourseId::new("c-7")));

    let settings = list.settings().await.unwrap();
    assert_eq!(settings.learned_courses, vec![CourseId::new("c-7")]);
    let state = list.session_state().await.unwrap();
    assert_eq!(state.current_course, "Traits");
    assert_eq!(state.current_learning_course_id, None);
}

#[tokio::test(start_paused = true)]
async fn appended_logs_are_capped() {
    let h = start_coordinator();
    let client = h.handle.client(LIST_TAB);
    for i in 0..55 {
        client.append_log(format!("entry {i}")).await.unwrap();
    }

    let logs = client.session_state().await.unwrap().logs;
    assert_eq!(logs.len(), 50);
    assert_eq!(logs[0].message, "entry 5");
    assert_eq!(logs[49].message, "entry 54");
}

#[tokio::test(start_paused = true)]
async fn restarted_coordinator_is_idle_but_keeps_session() {
    let h = start_coordinator();
    h.handle
        .client(VIDEO_TAB)
        .register_video_agent()
        .await
        .unwrap();
    h.handle.control().set_running(true).await.unwrap();

    let restarted = start_with_store(Arc::clone(&h.store));
    let control = restarted.handle.control();

    assert_eq!(control.query_phase().await.unwrap().phase, Phase::Idle);
    assert!(control.session_state().await.unwrap().is_running);

    let session = SessionStore::new(Arc::clone(&h.store));
    assert!(session.is_running().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn reset_progress_clears_learned_courses() {
    let h = start_coordinator();
    let control = h.handle.control();
    control
        .update_session(SessionPatch::new().learned_courses(vec![CourseId::new("a")]))
        .await
        .unwrap();
    control.append_log("before reset").await.unwrap();

    control.reset_progress().await.unwrap();

    let state = control.session_state().await.unwrap();
    assert!(state.learned_courses.is_empty());
    assert!(state.logs.is_empty());
    assert_eq!(state.learned_count, 0);
}
