//! The video agent.
//!
//! Runs in a video-page context and moves through
//! `Initializing -> AwaitingPlayback -> Monitoring -> Completed`:
//!
//! - **Initializing** (first tick): report the course title, apply the
//!   configured playback speed, accept any confirmation prompt, and start
//!   the playback driver in the background.
//! - **AwaitingPlayback**: the driver is still trying to start playback.
//! - **Monitoring**: the driver has finished, successfully or not.
//! - **Completed**: the completion detector fired and the coordinator was
//!   asked to close this tab. Terminal.
//!
//! The completion detector is polled on every tick after the first, in both
//! AwaitingPlayback and Monitoring. A video that never starts therefore
//! never completes, and the run waits on it until someone intervenes.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use autolearn_coordinator::types::DEFAULT_VIDEO_SPEED;
use autolearn_coordinator::{CoordinatorClient, SessionPatch};

use crate::classifier::PageClassifier;
use crate::config::AgentTimings;
use crate::context::{log_line, schedule, Capabilities, RunFlag};
use crate::dom::{DocumentSnapshot, ElementId};
use crate::page::{ClickStyle, Page};

/// Lifecycle of a video agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoState {
    Initializing,
    AwaitingPlayback,
    Monitoring,
    Completed,
}

/// How (or whether) playback got started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackStart {
    /// The video was already playing after the settle delay.
    AlreadyPlaying,
    /// Clicking the platform's play control worked.
    ButtonClicked,
    /// `play()` worked without a play control.
    DirectPlay,
    /// Only muted playback was allowed; unmuting waits for user interaction.
    MutedAutoplay,
    /// Every strategy failed.
    Failed(String),
    /// The run stopped before playback was attempted.
    Cancelled,
}

/// Video-page half of the automation.
pub struct VideoAgent {
    caps: Capabilities,
    client: CoordinatorClient,
    timings: AgentTimings,
    run: RunFlag,
    state: VideoState,
    driver: Mutex<Option<JoinHandle<PlaybackStart>>>,
}

impl VideoAgent {
    #[must_use]
    pub fn new(
        caps: Capabilities,
        client: CoordinatorClient,
        timings: AgentTimings,
        run: RunFlag,
    ) -> Self {
        Self {
            caps,
            client,
            timings,
            run,
            state: VideoState::Initializing,
            driver: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn state(&self) -> VideoState {
        self.state
    }

    /// Handles one polling tick on a video page.
    pub async fn tick(&mut self, doc: &DocumentSnapshot) -> VideoState {
        if self.state == VideoState::Completed {
            return self.state;
        }

        if let Err(e) = self.client.register_video_agent().await {
            debug!(error = %e, "Failed to register video agent");
        }
        // Looping would keep the video from ever ending.
        if let Err(e) = self.caps.page.disable_loop().await {
            debug!(error = %e, "Failed to disable looping");
        }

        match self.state {
            VideoState::Initializing => {
                self.initialize(doc).await;
                self.state = VideoState::AwaitingPlayback;
            }
            VideoState::AwaitingPlayback | VideoState::Monitoring => {
                self.poll_driver();
                if self.caps.detector.is_complete(doc) {
                    self.complete().await;
                } else if let Some(progress) = doc.media().and_then(|m| m.progress()) {
                    debug!(percent = progress * 100.0, "Playback progress");
                }
            }
            VideoState::Completed => {}
        }
        self.state
    }

    async fn initialize(&mut self, doc: &DocumentSnapshot) {
        let title = self.caps.classifier.video_title(doc);
        info!(title = %title, "Video page detected");
        if let Err(e) = self
            .client
            .update_session(SessionPatch::new().current_course(title.clone()))
            .await
        {
            debug!(error = %e, "Failed to report course title");
        }

        if let Some(prompt) = self.caps.classifier.confirm_prompt(doc) {
            debug!(button = %prompt, "Confirmation prompt found");
            let page = Arc::clone(&self.caps.page);
            let client = self.client.clone();
            schedule(self.run.clone(), self.timings.dialog_delay, "confirm-prompt", async move {
                page.click(prompt, ClickStyle::Direct).await?;
                log_line(&client, "Clicked confirmation prompt").await;
                Ok(())
            });
        }

        let speed = match self.client.settings().await {
            Ok(settings) => settings.video_speed,
            Err(e) => {
                debug!(error = %e, "Failed to read settings, using default speed");
                DEFAULT_VIDEO_SPEED
            }
        };
        self.apply_speed(speed).await;

        let driver = tokio::spawn(drive_playback(
            Arc::clone(&self.caps.page),
            Arc::clone(&self.caps.classifier),
            self.timings.clone(),
            self.run.clone(),
        ));
        *self.driver.lock() = Some(driver);
    }

    /// Moves to Monitoring once the playback driver has finished.
    fn poll_driver(&mut self) {
        if self.state != VideoState::AwaitingPlayback {
            return;
        }
        let finished = self
            .driver
            .lock()
            .as_ref()
            .map_or(true, JoinHandle::is_finished);
        if finished {
            self.driver.lock().take();
            debug!("Playback driver finished, monitoring");
            self.state = VideoState::Monitoring;
        }
    }

    async fn apply_speed(&self, speed: f64) {
        match self.caps.page.set_playback_rate(speed).await {
            Ok(()) => {
                info!(speed, "Playback speed applied");
                log_line(&self.client, format!("Playback speed set to {speed}x")).await;
            }
            Err(e) => warn!(speed, error = %e, "Failed to set playback speed"),
        }
    }

    /// Re-applies a speed changed while the video is playing.
    pub async fn update_speed(&self, speed: f64) {
        self.apply_speed(speed).await;
    }

    async fn complete(&mut self) {
        info!("Video complete");
        self.state = VideoState::Completed;
        self.run.stop();
        self.abort();

        log_line(&self.client, "Video finished").await;
        match self.client.record_completion().await {
            Ok(record) => info!(
                learned_count = record.learned_count,
                course = ?record.course_id,
                "Completion recorded"
            ),
            Err(e) => warn!(error = %e, "Failed to record completion"),
        }

        if let Err(e) = self.client.close_video_tab().await {
            warn!(error = %e, "Failed to ask coordinator to close this tab");
        }
    }

    /// Cancels the playback driver, if it is still running.
    pub fn abort(&self) {
        if let Some(driver) = self.driver.lock().take() {
            driver.abort();
        }
    }
}

/// Tries to get the video playing, escalating from the platform play control
/// to muted autoplay.
pub async fn drive_playback(
    page: Arc<dyn Page>,
    classifier: Arc<dyn PageClassifier>,
    timings: AgentTimings,
    run: RunFlag,
) -> PlaybackStart {
    sleep(timings.settle).await;
    if !run.is_running() {
        return PlaybackStart::Cancelled;
    }

    let doc = match page.snapshot().await {
        Ok(doc) => doc,
        Err(e) => return PlaybackStart::Failed(e.to_string()),
    };
    let Some(media) = doc.media().copied() else {
        return PlaybackStart::Failed("no media element".to_string());
    };
    if !media.paused {
        info!("Video is already playing");
        return PlaybackStart::AlreadyPlaying;
    }

    // The platform resumed from a bookmark; a play control will not help.
    if media.current_time > timings.resume_threshold_secs {
        info!(current_time = media.current_time, "Resumed video, using muted playback");
        return muted_autoplay(page.as_ref()).await;
    }

    let Some(button) = classifier.play_control(&doc) else {
        return match page.play().await {
            Ok(()) => {
                info!("Video started without a play control");
                PlaybackStart::DirectPlay
            }
            Err(e) => {
                debug!(error = %e, "Direct play rejected");
                muted_autoplay(page.as_ref()).await
            }
        };
    };

    click_play(page.as_ref(), button).await;
    sleep(timings.click_retry).await;
    if is_paused(page.as_ref()).await {
        debug!("Still paused after first click, clicking again");
        click_play(page.as_ref(), button).await;
    }

    sleep(timings.playback_verify.saturating_sub(timings.click_retry)).await;
    if !run.is_running() {
        return PlaybackStart::Cancelled;
    }
    if is_paused(page.as_ref()).await {
        info!("Play control did not start the video, using muted playback");
        muted_autoplay(page.as_ref()).await
    } else {
        info!("Play control started the video");
        PlaybackStart::ButtonClicked
    }
}

/// Clicks the play control with each style in turn until the video plays.
async fn click_play(page: &dyn Page, button: ElementId) {
    for style in ClickStyle::ESCALATION {
        if let Err(e) = page.click(button, style).await {
            debug!(style = ?style, error = %e, "Play control click failed");
        }
        if !is_paused(page).await {
            return;
        }
    }
}

async fn is_paused(page: &dyn Page) -> bool {
    page.snapshot()
        .await
        .ok()
        .and_then(|doc| doc.media().map(|m| m.paused))
        .unwrap_or(true)
}

async fn muted_autoplay(page: &dyn Page) -> PlaybackStart {
    if let Err(e) = page.set_muted(true).await {
        return PlaybackStart::Failed(e.to_string());
    }
    match page.play().await {
        Ok(()) => {
            if let Err(e) = page.unmute_on_interaction().await {
                debug!(error = %e, "Failed to arm unmute listener");
            }
            info!("Muted playback started; interact with the page to unmute");
            PlaybackStart::MutedAutoplay
        }
        Err(e) => {
            warn!(error = %e, "Muted playback failed, video needs a manual start");
            PlaybackStart::Failed(e.to_string())
        }
    }
}
