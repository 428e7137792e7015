//! The list agent.
//!
//! Runs in a course-list context. Each tick it either waits for a pending
//! navigation, performs a one-shot category switch, defers to an active
//! video agent, or scans the cards:
//!
//! 1. The first card (in document order) that is not complete, not in the
//!    local failed list, and not in the persisted learned set is selected,
//!    recorded as the pending course, and activated after a short delay.
//! 2. If nothing is selectable but some courses failed, the failed list is
//!    cleared and the page is rescanned on the next tick.
//! 3. Otherwise the agent paginates, or, on the last page, either restarts
//!    from page one (loop mode) or halts the run.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use autolearn_coordinator::{CoordinatorClient, CourseId, Phase, SessionPatch, Settings};

use crate::classifier::CourseCard;
use crate::config::AgentTimings;
use crate::context::{log_line, schedule, Capabilities, RunFlag};
use crate::dom::{DocumentSnapshot, ElementId};
use crate::page::ClickStyle;

/// What a list tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListOutcome {
    /// A course click or reload is still settling.
    Waiting,
    /// A video agent is active.
    Deferred,
    /// The course-group switch was clicked.
    Switched,
    /// A card was chosen and will be activated.
    Selected {
        index: usize,
        course_id: Option<CourseId>,
    },
    /// Everything left had failed; the failed list was cleared for a retry.
    RetryFailed,
    /// The next page will be opened.
    Paginating,
    /// All pages are done; the learned set was cleared and the page will reload.
    LoopRestart,
    /// All pages are done and loop mode is off.
    Halted,
}

/// A course click that has not yet produced a video agent.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingNavigation {
    course: Option<CourseId>,
    since: Instant,
}

/// Short-lived per-element markers that block double activation.
#[derive(Debug, Default)]
pub struct ActivationMarkers {
    expiries: HashMap<ElementId, Instant>,
}

impl ActivationMarkers {
    /// Marks `element` until `now + lifetime`. Returns false if it was already marked.
    pub fn try_mark(&mut self, element: ElementId, now: Instant, lifetime: std::time::Duration) -> bool {
        self.expiries.retain(|_, expiry| *expiry > now);
        if self.expiries.contains_key(&element) {
            return false;
        }
        self.expiries.insert(element, now + lifetime);
        true
    }
}

/// Picks the first selectable card, in document order.
///
/// A card is skipped when it is complete, or when its id is in `failed` or
/// `learned`. Cards without an id are only skipped when complete.
#[must_use]
pub fn select_course<'a>(
    cards: &'a [CourseCard],
    failed: &[CourseId],
    learned: &[CourseId],
) -> Option<(usize, &'a CourseCard)> {
    cards.iter().enumerate().find(|(_, card)| {
        if card.is_complete() {
            return false;
        }
        match &card.course_id {
            Some(id) => !failed.contains(id) && !learned.contains(id),
            None => true,
        }
    })
}

/// Course-list half of the automation.
pub struct ListAgent {
    caps: Capabilities,
    client: CoordinatorClient,
    timings: AgentTimings,
    run: RunFlag,
    failed: Vec<CourseId>,
    pending: Option<PendingNavigation>,
    reload_since: Option<Instant>,
    switched_category: bool,
    markers: Arc<Mutex<ActivationMarkers>>,
}

impl ListAgent {
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
            failed: Vec::new(),
            pending: None,
            reload_since: None,
            switched_category: false,
            markers: Arc::new(Mutex::new(ActivationMarkers::default())),
        }
    }

    /// Courses whose click did not lead to a video in time.
    #[must_use]
    pub fn failed(&self) -> &[CourseId] {
        &self.failed
    }

    #[must_use]
    pub fn is_waiting(&self) -> bool {
        self.pending.is_some()
    }

    /// Forgets any pending navigation.
    pub fn clear_pending(&mut self) {
        if self.pending.take().is_some() {
            debug!("Pending navigation cleared");
        }
    }

    /// Re-arms one-shot behavior for a new run.
    pub fn reset_for_start(&mut self) {
        self.switched_category = false;
    }

    /// Handles one polling tick on a list page.
    pub async fn tick(&mut self, doc: &DocumentSnapshot, card_ids: &[ElementId]) -> ListOutcome {
        if let Err(e) = self.client.register_list_agent().await {
            debug!(error = %e, "Failed to register list agent");
        }

        if let Some(since) = self.reload_since {
            if since.elapsed() < self.timings.navigation_timeout {
                return ListOutcome::Waiting;
            }
            warn!("Page reload did not happen, rescanning");
            self.reload_since = None;
        }

        if let Some(pending) = &self.pending {
            let waited = pending.since.elapsed();
            if waited < self.timings.navigation_timeout {
                debug!(?waited, "Waiting for video tab");
                return ListOutcome::Waiting;
            }
        }
        if let Some(pending) = self.pending.take() {
            self.settle_navigation(pending).await;
        }

        if !self.switched_category {
            if let Some(switch) = self.caps.classifier.category_switch(doc) {
                self.switched_category = true;
                info!("Required hours complete, switching to electives");
                if let Err(e) = self.caps.page.click(switch, ClickStyle::Direct).await {
                    warn!(error = %e, "Failed to switch course category");
                }
                log_line(&self.client, "Switched to elective courses").await;
                return ListOutcome::Switched;
            }
        }

        match self.client.query_phase().await {
            Ok(status) if status.phase == Phase::Learning => {
                debug!(video = ?status.video_agent_id, "A video is being learned, deferring");
                return ListOutcome::Deferred;
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Failed to query phase"),
        }

        let settings = match self.client.settings().await {
            Ok(settings) => settings,
            Err(e) => {
                debug!(error = %e, "Failed to read settings, using defaults");
                Settings::default()
            }
        };

        let cards: Vec<CourseCard> = card_ids
            .iter()
            .map(|id| self.caps.classifier.course_card(doc, *id))
            .collect();

        if let Some((index, card)) = select_course(&cards, &self.failed, &settings.learned_courses)
        {
            let card = card.clone();
            self.select(index, &card).await;
            return ListOutcome::Selected {
                index,
                course_id: card.course_id,
            };
        }

        info!(
            total = cards.len(),
            complete = cards.iter().filter(|c| c.is_complete()).count(),
            failed = self.failed.len(),
            "No selectable course on this page"
        );

        if !self.failed.is_empty() {
            self.failed.clear();
            info!("Retrying failed courses");
            return ListOutcome::RetryFailed;
        }

        if let Some(next) = self.caps.classifier.next_page(doc) {
            self.failed.clear();
            info!("Opening next page");
            log_line(&self.client, "Opening next page").await;
            let page = Arc::clone(&self.caps.page);
            schedule(
                self.run.clone(),
                self.timings.pagination_delay,
                "next-page",
                async move { page.click(next, ClickStyle::Direct).await },
            );
            return ListOutcome::Paginating;
        }

        log_line(&self.client, "All courses learned").await;
        if settings.loop_learning {
            self.restart_loop().await;
            ListOutcome::LoopRestart
        } else {
            info!("All courses learned, halting");
            ListOutcome::Halted
        }
    }

    /// Resolves a pending navigation whose wait window has passed.
    ///
    /// A registered video agent means the click worked; otherwise the course
    /// is skipped until the failed list is cleared.
    async fn settle_navigation(&mut self, pending: PendingNavigation) {
        if let Ok(status) = self.client.query_phase().await {
            if status.phase == Phase::Learning {
                debug!(course = ?pending.course, "Video tab is learning, navigation settled");
                return;
            }
        }

        warn!(course = ?pending.course, "No video tab opened in time");
        if let Some(course) = pending.course {
            if !self.failed.contains(&course) {
                self.failed.push(course);
            }
        }
        log_line(&self.client, "Course did not open in time, skipping it").await;
    }

    async fn select(&mut self, index: usize, card: &CourseCard) {
        info!(index, title = %card.title, course = ?card.course_id, "Course selected");
        log_line(&self.client, format!("Starting course: {}", card.title)).await;

        let patch = SessionPatch::new()
            .current_course(card.title.clone())
            .learning_course(card.course_id.clone());
        if let Err(e) = self.client.update_session(patch).await {
            debug!(error = %e, "Failed to persist selected course");
        }

        self.pending = Some(PendingNavigation {
            course: card.course_id.clone(),
            since: Instant::now(),
        });

        let page = Arc::clone(&self.caps.page);
        let markers = Arc::clone(&self.markers);
        let lifetime = self.timings.marker_lifetime;
        let (element, target) = (card.element, card.target);
        schedule(
            self.run.clone(),
            self.timings.card_click_delay,
            "open-course",
            async move {
                if !markers.lock().try_mark(element, Instant::now(), lifetime) {
                    debug!(card = %element, "Card activation already in progress");
                    return Ok(());
                }
                page.click(target, ClickStyle::Direct).await
            },
        );
    }

    async fn restart_loop(&mut self) {
        info!("All courses learned, restarting from the first page");
        log_line(&self.client, "Loop mode: resetting progress").await;
        if let Err(e) = self
            .client
            .update_session(SessionPatch::new().learned_courses(Vec::new()))
            .await
        {
            warn!(error = %e, "Failed to clear learned courses");
        }

        self.reload_since = Some(Instant::now());
        let page = Arc::clone(&self.caps.page);
        schedule(
            self.run.clone(),
            self.timings.reload_delay,
            "reload",
            async move { page.reload().await },
        );
    }
}
