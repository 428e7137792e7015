//! Client side of the coordinator protocol.
//!
//! [`CoordinatorHandle`] posts raw commands into the coordinator inbox and is
//! what the browser uses to report tab events. [`CoordinatorClient`] binds a
//! handle to one sender tab and exposes one typed method per request.
//!
//! Every send returns `Result<_, TransportError>`. A coordinator that has
//! shut down yields [`TransportError::RecipientGone`]; callers are expected
//! to log that and continue.

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::coordinator::Command;
use crate::error::TransportError;
use crate::types::{
    CompletionRecord, Phase, PhaseStatus, Request, Response, SessionPatch, SessionState, Settings,
    SettingsPatch, TabId,
};

/// Cloneable sender into the coordinator inbox.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Command>,
}

impl CoordinatorHandle {
    pub(crate) fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    /// Sends a request and waits for the reply.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::RecipientGone`] if the coordinator has
    /// stopped or dropped the request without answering.
    pub async fn request(
        &self,
        from: Option<TabId>,
        request: Request,
    ) -> Result<Response, TransportError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Command::Request {
                from,
                request,
                reply,
            })
            .await
            .map_err(|_| TransportError::RecipientGone)?;
        response.await.map_err(|_| TransportError::RecipientGone)
    }

    /// Reports that the browser closed `tab`.
    pub fn tab_closed(&self, tab: TabId) {
        self.post(Command::TabClosed(tab));
    }

    /// Reports that `tab` finished loading.
    pub fn tab_loaded(&self, tab: TabId) {
        self.post(Command::TabLoaded(tab));
    }

    /// Binds this handle to a sender tab.
    #[must_use]
    pub fn client(&self, tab: TabId) -> CoordinatorClient {
        CoordinatorClient {
            tab: Some(tab),
            handle: self.clone(),
        }
    }

    /// A client with no sender tab, for control surfaces outside any page.
    #[must_use]
    pub fn control(&self) -> CoordinatorClient {
        CoordinatorClient {
            tab: None,
            handle: self.clone(),
        }
    }

    /// Posts a browser event without waiting.
    ///
    /// Browser events can be raised from inside a coordinator call (closing a
    /// tab reports the closure), so this never awaits inbox capacity.
    fn post(&self, command: Command) {
        match self.tx.try_send(command) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(command)) => {
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    if tx.send(command).await.is_err() {
                        debug!("Coordinator stopped before a browser event was delivered");
                    }
                });
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Coordinator stopped, dropping browser event");
            }
        }
    }
}

/// Typed request API bound to one sender tab.
#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    tab: Option<TabId>,
    handle: CoordinatorHandle,
}

impl CoordinatorClient {
    /// The tab this client speaks for.
    #[must_use]
    pub fn tab(&self) -> Option<TabId> {
        self.tab
    }

    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        match self.handle.request(self.tab, request).await? {
            Response::Failed { error, .. } => Err(TransportError::Rejected(error)),
            response => Ok(response),
        }
    }

    async fn send_ack(&self, request: Request) -> Result<(), TransportError> {
        let action = request.action();
        match self.send(request).await? {
            Response::Ack { .. } => Ok(()),
            _ => Err(TransportError::UnexpectedResponse(action)),
        }
    }

    /// Registers this tab as the list agent. Returns the current phase.
    pub async fn register_list_agent(&self) -> Result<Phase, TransportError> {
        match self.send(Request::RegisterListAgent).await? {
            Response::ListRegistered { current_phase, .. } => Ok(current_phase),
            _ => Err(TransportError::UnexpectedResponse("registerListAgent")),
        }
    }

    /// Registers this tab as the video agent, moving the coordinator to learning.
    pub async fn register_video_agent(&self) -> Result<(), TransportError> {
        self.send_ack(Request::RegisterVideoAgent).await
    }

    pub async fn query_phase(&self) -> Result<PhaseStatus, TransportError> {
        match self.send(Request::QueryPhase).await? {
            Response::Phase(status) => Ok(status),
            _ => Err(TransportError::UnexpectedResponse("queryPhase")),
        }
    }

    /// Asks the coordinator to close the registered video tab.
    pub async fn close_video_tab(&self) -> Result<(), TransportError> {
        self.send_ack(Request::CloseVideoTab).await
    }

    pub async fn update_session(&self, data: SessionPatch) -> Result<(), TransportError> {
        self.send_ack(Request::UpdateSessionField { data }).await
    }

    pub async fn append_log(&self, message: impl Into<String>) -> Result<(), TransportError> {
        self.send_ack(Request::AppendLog {
            message: message.into(),
        })
        .await
    }

    pub async fn settings(&self) -> Result<Settings, TransportError> {
        match self.send(Request::GetSettings).await? {
            Response::Settings(settings) => Ok(settings),
            _ => Err(TransportError::UnexpectedResponse("getSettings")),
        }
    }

    pub async fn update_playback_speed(&self, speed: f64) -> Result<(), TransportError> {
        self.send_ack(Request::UpdatePlaybackSpeed { speed }).await
    }

    pub async fn session_state(&self) -> Result<SessionState, TransportError> {
        match self.send(Request::GetSessionState).await? {
            Response::Session(state) => Ok(state),
            _ => Err(TransportError::UnexpectedResponse("getSessionState")),
        }
    }

    /// Records a finished video: count, learned set, and pending course.
    pub async fn record_completion(&self) -> Result<CompletionRecord, TransportError> {
        match self.send(Request::RecordCompletion).await? {
            Response::Completion(record) => Ok(record),
            _ => Err(TransportError::UnexpectedResponse("recordCompletion")),
        }
    }

    pub async fn set_running(&self, running: bool) -> Result<(), TransportError> {
        self.send_ack(Request::SetRunning { running }).await
    }

    pub async fn reset_progress(&self) -> Result<(), TransportError> {
        self.send_ack(Request::ResetProgress).await
    }

    pub async fn update_settings(&self, settings: SettingsPatch) -> Result<(), TransportError> {
        self.send_ack(Request::UpdateSettings { settings }).await
    }
}
