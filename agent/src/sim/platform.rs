//! The simulated course platform.
//!
//! Holds the catalogue and renders the two page kinds the agents know how to
//! drive: a paginated course list and a video player. Rendering produces a
//! [`DocumentSnapshot`] together with a map of the interactive controls in
//! it, so the simulated page can translate clicks back into actions.
//!
//! Media time advances with the tokio clock: one time unit of wall time is
//! one second of media at 1x.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use autolearn_coordinator::CourseId;

use crate::dom::{DocumentSnapshot, ElementId, MediaState, Node};
use crate::page::ClickStyle;

/// Origin used in rendered page locations.
pub const SIM_ORIGIN: &str = "https://courses.sim.local";

/// How the simulated player reacts to attempts to start playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoplayPolicy {
    /// Any click on the play control starts playback; unmuted `play()` is allowed.
    #[default]
    Allowed,
    /// Only event-like clicks count as a gesture; direct clicks are ignored.
    GestureOnly,
    /// Nothing starts unmuted playback; muted `play()` still works.
    MutedOnly,
}

/// One course in the catalogue.
#[derive(Debug, Clone, PartialEq)]
pub struct SimCourse {
    pub id: CourseId,
    pub title: String,
    /// Length of the course video in media seconds.
    pub duration: f64,
    /// Media seconds already watched.
    pub watched: f64,
}

impl SimCourse {
    /// Watched fraction in `[0, 1]`.
    #[must_use]
    pub fn progress(&self) -> f64 {
        if self.duration <= 0.0 {
            return 1.0;
        }
        (self.watched / self.duration).clamp(0.0, 1.0)
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.progress() >= 1.0
    }
}

/// An interactive element in a rendered page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Opens the course at this catalogue index in a new tab.
    OpenCourse(usize),
    /// Shows the given list page.
    GoToPage(usize),
    /// The player's play control.
    Play,
}

/// A rendered document plus its controls.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub doc: DocumentSnapshot,
    pub controls: HashMap<ElementId, Control>,
}

/// State of one video player.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub course: usize,
    position: f64,
    playing_since: Option<Instant>,
    pub muted: bool,
    pub rate: f64,
    pub looping: bool,
    pub ended: bool,
    pub unmute_armed: bool,
}

impl Player {
    /// A paused player positioned at the course's watched mark.
    #[must_use]
    pub fn new(course: usize, watched: f64) -> Self {
        Self {
            course,
            position: watched,
            playing_since: None,
            muted: false,
            rate: 1.0,
            looping: true,
            ended: false,
            unmute_armed: false,
        }
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playing_since.is_some()
    }

    #[must_use]
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Folds elapsed play time into the position. Returns true when the end was reached.
    fn advance(&mut self, now: Instant, unit: Duration, duration: f64) -> bool {
        let Some(since) = self.playing_since else {
            return false;
        };
        let elapsed = now.saturating_duration_since(since).as_secs_f64() / unit.as_secs_f64();
        self.position += elapsed * self.rate;
        self.playing_since = Some(now);

        if self.position < duration {
            return false;
        }
        if self.looping {
            self.position %= duration;
            return false;
        }
        self.position = duration;
        self.playing_since = None;
        self.ended = true;
        true
    }

    fn start(&mut self, now: Instant) {
        if self.playing_since.is_none() {
            self.playing_since = Some(now);
            self.ended = false;
        }
    }
}

/// The course site: catalogue, layout, and player behavior.
#[derive(Debug, Clone)]
pub struct SimPlatform {
    courses: Vec<SimCourse>,
    page_size: usize,
    policy: AutoplayPolicy,
    time_unit: Duration,
}

impl SimPlatform {
    /// `page_size` is clamped to at least one card per page.
    #[must_use]
    pub fn new(
        courses: Vec<SimCourse>,
        page_size: usize,
        policy: AutoplayPolicy,
        time_unit: Duration,
    ) -> Self {
        Self {
            courses,
            page_size: page_size.max(1),
            policy,
            time_unit,
        }
    }

    /// A catalogue of `count` unwatched courses of `duration` media seconds each.
    #[must_use]
    pub fn catalogue(count: usize, duration: f64) -> Vec<SimCourse> {
        (1..=count)
            .map(|n| SimCourse {
                id: CourseId::new(format!("course-{n:03}")),
                title: format!("Course {n}"),
                duration,
                watched: 0.0,
            })
            .collect()
    }

    #[must_use]
    pub fn courses(&self) -> &[SimCourse] {
        &self.courses
    }

    #[must_use]
    pub fn policy(&self) -> AutoplayPolicy {
        self.policy
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.courses.len().div_ceil(self.page_size).max(1)
    }

    #[must_use]
    pub fn completed(&self) -> usize {
        self.courses.iter().filter(|c| c.is_complete()).count()
    }

    #[must_use]
    pub fn all_complete(&self) -> bool {
        self.courses.iter().all(SimCourse::is_complete)
    }

    /// A fresh player for a course.
    #[must_use]
    pub fn open_player(&self, course: usize) -> Option<Player> {
        self.courses
            .get(course)
            .map(|c| Player::new(course, if c.is_complete() { 0.0 } else { c.watched }))
    }

    /// Brings a player up to `now`, crediting watched time to its course.
    pub fn advance(&mut self, player: &mut Player, now: Instant) {
        let Some(course) = self.courses.get_mut(player.course) else {
            return;
        };
        player.advance(now, self.time_unit, course.duration);
        course.watched = course.watched.max(player.position);
    }

    /// Handles a click on the play control. Returns true if playback started.
    pub fn click_play(&mut self, player: &mut Player, style: ClickStyle, now: Instant) -> bool {
        self.advance(player, now);
        let accepted = match self.policy {
            AutoplayPolicy::Allowed => true,
            AutoplayPolicy::GestureOnly => style != ClickStyle::Direct,
            AutoplayPolicy::MutedOnly => player.muted,
        };
        if accepted {
            player.start(now);
        }
        accepted
    }

    /// Handles `play()` on the media element. Returns false if it was refused.
    pub fn play(&mut self, player: &mut Player, now: Instant) -> bool {
        self.advance(player, now);
        let accepted = player.muted || self.policy == AutoplayPolicy::Allowed;
        if accepted {
            player.start(now);
        }
        accepted
    }

    /// Changes the playback rate without losing elapsed time.
    pub fn set_rate(&mut self, player: &mut Player, rate: f64, now: Instant) {
        self.advance(player, now);
        player.rate = rate;
    }

    /// Renders list page `page` (zero-based).
    #[must_use]
    pub fn render_list(&self, page: usize) -> Rendered {
        let page = page.min(self.page_count() - 1);
        let mut doc = DocumentSnapshot::new(format!("{SIM_ORIGIN}/#/courses?page={}", page + 1));
        let mut controls = HashMap::new();

        let list = doc.append(None, Node::new("div").class("course-list"));
        let start = page * self.page_size;
        for (index, course) in self
            .courses
            .iter()
            .enumerate()
            .skip(start)
            .take(self.page_size)
        {
            let card = doc.append(Some(list), Node::new("div").classes("item hover-shadow"));
            let link = doc.append(
                Some(card),
                Node::new("a")
                    .attr("target", "_blank")
                    .attr("href", format!("#/course?id={}", course.id)),
            );
            doc.append(Some(link), Node::new("div").class("title").text(&course.title));
            let bar = doc.append(Some(card), Node::new("div").class("el-progress-bar"));
            doc.append(
                Some(bar),
                Node::new("div")
                    .class("el-progress-bar__inner")
                    .attr("style", format!("width: {:.0}%", course.progress() * 100.0)),
            );
            controls.insert(link, Control::OpenCourse(index));
        }

        let pager = doc.append(None, Node::new("ul").class("ivu-page"));
        for number in 0..self.page_count() {
            let mut item = Node::new("li").class("ivu-page-item").text((number + 1).to_string());
            if number == page {
                item = item.class("ivu-page-item-active");
            }
            let id = doc.append(Some(pager), item);
            controls.insert(id, Control::GoToPage(number));
        }
        let mut next = Node::new("li").class("ivu-page-next");
        if page + 1 >= self.page_count() {
            next = next.class("ivu-page-disabled");
        }
        let next = doc.append(Some(pager), next);
        if page + 1 < self.page_count() {
            controls.insert(next, Control::GoToPage(page + 1));
        }

        Rendered { doc, controls }
    }

    /// Renders the player page. The player must already be advanced.
    #[must_use]
    pub fn render_video(&self, player: &Player) -> Rendered {
        let Some(course) = self.courses.get(player.course) else {
            return Rendered {
                doc: DocumentSnapshot::new(format!("{SIM_ORIGIN}/#/404")),
                controls: HashMap::new(),
            };
        };

        let mut doc = DocumentSnapshot::new(format!("{SIM_ORIGIN}/#/video?id={}", course.id));
        let mut controls = HashMap::new();

        doc.append(None, Node::new("h1").text(&course.title));
        let player_root = doc.append(None, Node::new("div").classes("video-js vjs-default-skin"));
        let mut big = Node::new("button").class("vjs-big-play-button");
        if player.is_playing() {
            big = big.hidden();
        }
        let big = doc.append(Some(player_root), big);
        controls.insert(big, Control::Play);

        let bar = doc.append(Some(player_root), Node::new("div").class("vjs-control-bar"));
        let mut toggle = Node::new("button").class("vjs-play-control");
        toggle = if player.ended {
            toggle.class("vjs-ended")
        } else if player.is_playing() {
            toggle.class("vjs-playing")
        } else {
            toggle.class("vjs-paused")
        };
        doc.append(Some(bar), toggle);

        doc.set_media(MediaState {
            current_time: player.position,
            duration: course.duration,
            paused: !player.is_playing(),
            ended: player.ended,
            muted: player.muted,
            playback_rate: player.rate,
            looping: player.looping,
        });

        Rendered { doc, controls }
    }
}
