//! Page classification and card extraction.
//!
//! A [`PageClassifier`] answers every "what is on this page?" question the
//! agents ask, as pure functions over a [`DocumentSnapshot`]. Agents never
//! look at markup directly, so supporting a different course platform means
//! providing a different classifier.
//!
//! [`PlatformClassifier`] targets the iView/Element-UI based platform the
//! agents were built for. Each lookup is an ordered list of selectors tried
//! in priority order: platform-specific markup first, generic fallbacks last.

use std::sync::LazyLock;

use regex::Regex;

use autolearn_coordinator::CourseId;

use crate::dom::{DocumentSnapshot, ElementId, Selector};

/// Matches "completed 学时 / total 学时" credit-hour progress text.
static CREDIT_HOURS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([\d.]+)\s*学时\s*/([\d.]+)学时").expect("constant regex pattern is valid")
});

/// Extracts the percentage from an inline `width: N%` style.
static STYLE_WIDTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"width:\s*([\d.]+)%").expect("constant regex pattern is valid")
});

/// Extracts the course identifier from a link's query string.
static LINK_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"id=([^&]+)").expect("constant regex pattern is valid"));

/// Title used when a card has no readable title.
pub const UNKNOWN_COURSE_TITLE: &str = "unknown course";

/// Title used when a video page has no readable title.
pub const UNTITLED_VIDEO: &str = "now playing";

/// What kind of page a snapshot shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageKind {
    /// The page has a playable media element.
    Video,
    /// The page lists courses; `cards` is non-empty and in document order.
    CourseList { cards: Vec<ElementId> },
    /// Nothing recognizable yet (loading, transitional, or foreign page).
    Unknown,
}

/// Derived attributes of one course card.
#[derive(Debug, Clone, PartialEq)]
pub struct CourseCard {
    pub element: ElementId,
    pub title: String,
    /// Completion fraction in `[0, 1]`.
    pub completion: f64,
    pub course_id: Option<CourseId>,
    /// Element to activate to open the course.
    pub target: ElementId,
}

impl CourseCard {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completion >= 1.0
    }
}

/// Platform-specific page knowledge.
pub trait PageClassifier: Send + Sync {
    fn classify(&self, doc: &DocumentSnapshot) -> PageKind;

    /// Derives title, completion, identity, and activation target of a card.
    fn course_card(&self, doc: &DocumentSnapshot, card: ElementId) -> CourseCard;

    /// Human-readable title of the course playing on a video page.
    fn video_title(&self, doc: &DocumentSnapshot) -> String;

    /// The platform's big play control, rendered or not.
    fn play_control(&self, doc: &DocumentSnapshot) -> Option<ElementId>;

    /// A confirmation prompt shown on entering a video page.
    fn confirm_prompt(&self, doc: &DocumentSnapshot) -> Option<ElementId>;

    /// The button of a visible system dialog or notification overlay.
    fn dismissible_dialog(&self, doc: &DocumentSnapshot) -> Option<ElementId>;

    /// An enabled control that moves the list to its next page.
    fn next_page(&self, doc: &DocumentSnapshot) -> Option<ElementId>;

    /// The course-group switch to click once required hours are complete.
    fn category_switch(&self, doc: &DocumentSnapshot) -> Option<ElementId>;
}

/// Classifier for the target course platform.
#[derive(Debug, Clone)]
pub struct PlatformClassifier {
    card_selectors: Vec<Selector>,
    card_title_selectors: Vec<Selector>,
    video_title_selectors: Vec<Selector>,
    next_selectors: Vec<Selector>,
}

impl Default for PlatformClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformClassifier {
    #[must_use]
    pub fn new() -> Self {
        Self {
            card_selectors: vec![
                Selector::any().class("item").class("hover-shadow"),
                Selector::any().class("course-card"),
                Selector::any().class_contains("course").class_contains("item"),
                Selector::any()
                    .class("item")
                    .inside(Selector::any().class("course-list")),
            ],
            card_title_selectors: vec![
                Selector::any().class("title"),
                Selector::any().class("course-title"),
                Selector::any().class("name"),
                Selector::tag("h3"),
                Selector::tag("h4"),
                Selector::any().class("c-text"),
            ],
            video_title_selectors: vec![
                Selector::any().class("course-title"),
                Selector::any().class("video-title"),
                Selector::tag("h1"),
                Selector::tag("h2"),
                Selector::any().class("title"),
            ],
            next_selectors: vec![
                Selector::any()
                    .class("ivu-page-next")
                    .not_class("ivu-page-disabled"),
                Selector::any()
                    .class("el-pagination__next")
                    .not_class("disabled"),
                Selector::tag("button")
                    .class_contains("next")
                    .not_attr("disabled"),
            ],
        }
    }

    fn completion(&self, doc: &DocumentSnapshot, card: ElementId) -> f64 {
        let bar = doc
            .select_within(card, &Selector::any().class("el-progress-bar__inner"))
            .into_iter()
            .next();
        if let Some(width) = bar
            .and_then(|b| doc.element(b))
            .and_then(|el| el.attr("style"))
            .and_then(parse_width_percent)
        {
            if width >= 100.0 {
                return 1.0;
            }
            if let Some(ratio) = credit_ratio(&doc.text_content(card)) {
                return ratio.max(width / 100.0);
            }
            return width / 100.0;
        }
        credit_ratio(&doc.text_content(card)).unwrap_or(0.0)
    }

    fn course_id(doc: &DocumentSnapshot, card: ElementId) -> Option<CourseId> {
        let link = card_link(doc, card);
        if let Some(m) = link
            .and_then(|l| doc.element(l))
            .and_then(|el| el.attr("href"))
            .and_then(|href| LINK_ID.captures(href))
            .and_then(|c| c.get(1))
        {
            return Some(CourseId::new(m.as_str()));
        }

        doc.select_within(card, &Selector::tag("img").attr("src"))
            .into_iter()
            .filter_map(|img| doc.element(img).and_then(|el| el.attr("src")))
            .find(|src| !src.is_empty())
            .map(CourseId::new)
    }

    /// Link first, then the cover's link, then the cover, then the card itself.
    fn target(doc: &DocumentSnapshot, card: ElementId) -> ElementId {
        if let Some(link) = card_link(doc, card) {
            return link;
        }
        if let Some(cover) = doc
            .select_within(card, &Selector::any().class("cover"))
            .into_iter()
            .next()
        {
            return doc
                .select_within(cover, &Selector::tag("a").attr("href"))
                .into_iter()
                .next()
                .unwrap_or(cover);
        }
        card
    }

    fn first_text(
        doc: &DocumentSnapshot,
        root: Option<ElementId>,
        selectors: &[Selector],
    ) -> Option<String> {
        selectors.iter().find_map(|sel| {
            let first = match root {
                Some(root) => doc.select_within(root, sel).into_iter().next(),
                None => doc.select_first(sel),
            }?;
            let text = doc.text_content(first);
            (!text.is_empty()).then_some(text)
        })
    }

    fn next_page_number(doc: &DocumentSnapshot) -> Option<ElementId> {
        let active = doc
            .select_first(&Selector::any().class("ivu-page-item-active"))
            .or_else(|| doc.select_first(&Selector::any().class("el-pagination__current")))?;
        let current: u32 = doc.text_content(active).parse().ok()?;

        [
            Selector::any().class("ivu-page-item"),
            Selector::any().class("el-pagination__item"),
        ]
        .iter()
        .flat_map(|sel| doc.select(sel))
        .find(|item| doc.text_content(*item).parse::<u32>().ok() == Some(current + 1))
    }
}

impl PageClassifier for PlatformClassifier {
    fn classify(&self, doc: &DocumentSnapshot) -> PageKind {
        if doc.media().is_some() {
            return PageKind::Video;
        }
        for selector in &self.card_selectors {
            let cards = doc.select(selector);
            if !cards.is_empty() {
                return PageKind::CourseList { cards };
            }
        }
        PageKind::Unknown
    }

    fn course_card(&self, doc: &DocumentSnapshot, card: ElementId) -> CourseCard {
        CourseCard {
            element: card,
            title: Self::first_text(doc, Some(card), &self.card_title_selectors)
                .unwrap_or_else(|| UNKNOWN_COURSE_TITLE.to_string()),
            completion: self.completion(doc, card),
            course_id: Self::course_id(doc, card),
            target: Self::target(doc, card),
        }
    }

    fn video_title(&self, doc: &DocumentSnapshot) -> String {
        Self::first_text(doc, None, &self.video_title_selectors)
            .unwrap_or_else(|| UNTITLED_VIDEO.to_string())
    }

    fn play_control(&self, doc: &DocumentSnapshot) -> Option<ElementId> {
        let candidates = [
            Selector::any().class("vjs-big-play-button"),
            Selector::any().class("video-play-button"),
            Selector::any().class_contains("play-btn"),
        ];
        // First in document order matching any candidate.
        doc.select(&Selector::any())
            .into_iter()
            .find(|id| candidates.iter().any(|sel| sel.matches(doc, *id)))
    }

    fn confirm_prompt(&self, doc: &DocumentSnapshot) -> Option<ElementId> {
        doc.select(&Selector::tag("button")).into_iter().find(|b| {
            let text = doc.text_content(*b);
            ["确定", "确认", "继续"].iter().any(|word| text.contains(word))
        })
    }

    fn dismissible_dialog(&self, doc: &DocumentSnapshot) -> Option<ElementId> {
        let overlays = [
            Selector::any().class("ivu-modal-wrap"),
            Selector::any().class("ivu-message"),
            Selector::any().class("ivu-notice"),
        ];
        doc.select(&Selector::tag("button").class("ivu-btn-primary"))
            .into_iter()
            .find(|b| {
                let text = doc.text_content(*b);
                if !matches!(text.as_str(), "确定" | "我知道了" | "关闭") {
                    return false;
                }
                overlays
                    .iter()
                    .find_map(|sel| doc.closest(*b, sel))
                    .is_some_and(|overlay| doc.is_rendered(overlay))
            })
    }

    fn next_page(&self, doc: &DocumentSnapshot) -> Option<ElementId> {
        self.next_selectors
            .iter()
            .find_map(|sel| doc.select_first(sel))
            .or_else(|| Self::next_page_number(doc))
    }

    fn category_switch(&self, doc: &DocumentSnapshot) -> Option<ElementId> {
        if !doc.location().contains("/myClass") {
            return None;
        }
        let required_done = doc
            .select(&Selector::any().attr("data-v-a2a750ea"))
            .into_iter()
            .map(|id| doc.text_content(id))
            .filter(|text| text.contains("必修学习进度"))
            .filter_map(|text| credit_ratio(&text))
            .last()
            .is_some_and(|ratio| ratio >= 1.0);
        if !required_done {
            return None;
        }
        doc.select(&Selector::any().class("item"))
            .into_iter()
            .find(|item| doc.text_content(*item) == "选修")
    }
}

fn card_link(doc: &DocumentSnapshot, card: ElementId) -> Option<ElementId> {
    let el = doc.element(card)?;
    if el.tag().eq_ignore_ascii_case("a") {
        return el.attr("href").filter(|h| !h.is_empty()).map(|_| card);
    }
    doc.select_within(card, &Selector::tag("a"))
        .into_iter()
        .next()
        .filter(|a| {
            doc.element(*a)
                .and_then(|el| el.attr("href"))
                .is_some_and(|h| !h.is_empty())
        })
}

fn parse_width_percent(style: &str) -> Option<f64> {
    STYLE_WIDTH
        .captures(style)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Completed over total credit hours, clamped to 1.
fn credit_ratio(text: &str) -> Option<f64> {
    let caps = CREDIT_HOURS.captures(text)?;
    let completed: f64 = caps.get(1)?.as_str().parse().ok()?;
    let total: f64 = caps.get(2)?.as_str().parse().ok()?;
    if completed >= total {
        return Some(1.0);
    }
    Some(completed / total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{MediaState, Node};

    fn card(doc: &mut DocumentSnapshot, list: ElementId, id: &str, width: &str) -> ElementId {
        let card = doc.append(Some(list), Node::new("div").classes("item hover-shadow"));
        let link = doc.append(
            Some(card),
            Node::new("a")
                .attr("href", format!("#/course?id={id}&from=list"))
                .attr("target", "_blank"),
        );
        doc.append(Some(link), Node::new("img").attr("src", format!("/img/{id}.png")));
        doc.append(Some(card), Node::new("div").class("title").text(format!("Course {id}")));
        let bar = doc.append(Some(card), Node::new("div").class("el-progress-bar"));
        doc.append(
            Some(bar),
            Node::new("div")
                .class("el-progress-bar__inner")
                .attr("style", format!("width: {width};")),
        );
        card
    }

    #[test]
    fn video_page_requires_media() {
        let classifier = PlatformClassifier::new();
        let mut doc = DocumentSnapshot::new("https://x/#/video");
        doc.append(None, Node::new("video"));
        assert_eq!(classifier.classify(&doc), PageKind::Unknown);

        doc.set_media(MediaState::default());
        assert_eq!(classifier.classify(&doc), PageKind::Video);
    }

    #[test]
    fn course_list_uses_first_matching_selector() {
        let classifier = PlatformClassifier::new();
        let mut doc = DocumentSnapshot::new("https://x/#/list");
        let list = doc.append(None, Node::new("div").class("course-list"));
        let a = card(&mut doc, list, "a", "0%");
        let b = card(&mut doc, list, "b", "40%");
        // Only matches the last, generic selector.
        doc.append(Some(list), Node::new("div").class("item"));

        assert_eq!(
            classifier.classify(&doc),
            PageKind::CourseList { cards: vec![a, b] }
        );
    }

    #[test]
    fn empty_page_is_unknown() {
        let doc = DocumentSnapshot::new("https://x/#/loading");
        assert_eq!(PlatformClassifier::new().classify(&doc), PageKind::Unknown);
    }

    #[test]
    fn card_attributes() {
        let classifier = PlatformClassifier::new();
        let mut doc = DocumentSnapshot::new("https://x/#/list");
        let list = doc.append(None, Node::new("div").class("course-list"));
        let el = card(&mut doc, list, "c42", "40%");

        let card = classifier.course_card(&doc, el);
        assert_eq!(card.title, "Course c42");
        assert_eq!(card.course_id, Some(CourseId::new("c42")));
        assert!((card.completion - 0.4).abs() < 1e-9);
        assert!(!card.is_complete());
        assert_eq!(doc.element(card.target).unwrap().tag(), "a");
    }

    #[test]
    fn full_progress_bar_is_complete() {
        let classifier = PlatformClassifier::new();
        let mut doc = DocumentSnapshot::new("https://x/#/list");
        let list = doc.append(None, Node::new("div").class("course-list"));
        let el = card(&mut doc, list, "done", "100%");
        assert!(classifier.course_card(&doc, el).is_complete());
    }

    #[test]
    fn credit_hours_text_marks_completion() {
        let classifier = PlatformClassifier::new();
        let mut doc = DocumentSnapshot::new("https://x/#/list");
        let el = doc.append(None, Node::new("div").class("course-card"));
        doc.append(Some(el), Node::new("span").text("2.0 学时 /2.0学时"));
        assert!(classifier.course_card(&doc, el).is_complete());

        let mut doc = DocumentSnapshot::new("https://x/#/list");
        let el = doc.append(None, Node::new("div").class("course-card"));
        doc.append(Some(el), Node::new("span").text("0.5学时 /2学时"));
        assert!((classifier.course_card(&doc, el).completion - 0.25).abs() < 1e-9);
    }

    #[test]
    fn course_id_falls_back_to_thumbnail() {
        let classifier = PlatformClassifier::new();
        let mut doc = DocumentSnapshot::new("https://x/#/list");
        let el = doc.append(None, Node::new("div").class("course-card"));
        let cover = doc.append(Some(el), Node::new("div").class("cover"));
        doc.append(Some(cover), Node::new("img").attr("src", "/thumb/7.jpg"));

        let card = classifier.course_card(&doc, el);
        assert_eq!(card.course_id, Some(CourseId::new("/thumb/7.jpg")));
        assert_eq!(card.target, cover);
        assert_eq!(card.title, UNKNOWN_COURSE_TITLE);
    }

    #[test]
    fn card_without_link_or_image_has_no_id() {
        let classifier = PlatformClassifier::new();
        let mut doc = DocumentSnapshot::new("https://x/#/list");
        let el = doc.append(None, Node::new("div").class("course-card"));
        let card = classifier.course_card(&doc, el);
        assert_eq!(card.course_id, None);
        assert_eq!(card.target, el);
    }

    #[test]
    fn next_page_skips_disabled_control() {
        let classifier = PlatformClassifier::new();
        let mut doc = DocumentSnapshot::new("https://x/#/list");
        let pager = doc.append(None, Node::new("ul").class("ivu-page"));
        doc.append(Some(pager), Node::new("li").classes("ivu-page-next ivu-page-disabled"));
        assert_eq!(classifier.next_page(&doc), None);

        let mut doc = DocumentSnapshot::new("https://x/#/list");
        let pager = doc.append(None, Node::new("ul").class("ivu-page"));
        let next = doc.append(Some(pager), Node::new("li").class("ivu-page-next"));
        assert_eq!(classifier.next_page(&doc), Some(next));
    }

    #[test]
    fn next_page_falls_back_to_page_number() {
        let classifier = PlatformClassifier::new();
        let mut doc = DocumentSnapshot::new("https://x/#/list");
        let pager = doc.append(None, Node::new("ul").class("ivu-page"));
        doc.append(Some(pager), Node::new("li").class("ivu-page-item").text("1"));
        doc.append(
            Some(pager),
            Node::new("li").classes("ivu-page-item ivu-page-item-active").text("2"),
        );
        let third = doc.append(Some(pager), Node::new("li").class("ivu-page-item").text("3"));

        assert_eq!(classifier.next_page(&doc), Some(third));
    }

    #[test]
    fn dialog_must_be_visible() {
        let classifier = PlatformClassifier::new();
        let mut doc = DocumentSnapshot::new("https://x/#/list");
        let hidden = doc.append(None, Node::new("div").class("ivu-modal-wrap").hidden());
        doc.append(Some(hidden), Node::new("button").class("ivu-btn-primary").text("确定"));
        assert_eq!(classifier.dismissible_dialog(&doc), None);

        let shown = doc.append(None, Node::new("div").class("ivu-notice"));
        let button = doc.append(
            Some(shown),
            Node::new("button").class("ivu-btn-primary").text("我知道了"),
        );
        assert_eq!(classifier.dismissible_dialog(&doc), Some(button));
    }

    #[test]
    fn category_switch_needs_route_and_full_hours() {
        let classifier = PlatformClassifier::new();
        let build = |location: &str, progress: &str| {
            let mut doc = DocumentSnapshot::new(location);
            doc.append(
                None,
                Node::new("div")
                    .attr("data-v-a2a750ea", "")
                    .text(format!("必修学习进度 {progress}")),
            );
            let tabs = doc.append(None, Node::new("div").class("tabs"));
            doc.append(Some(tabs), Node::new("div").class("item").text("必修"));
            let elective = doc.append(Some(tabs), Node::new("div").class("item").text("选修"));
            (doc, elective)
        };

        let (doc, elective) = build("https://x/#/myClass", "20学时 /20学时");
        assert_eq!(classifier.category_switch(&doc), Some(elective));

        let (doc, _) = build("https://x/#/myClass", "12学时 /20学时");
        assert_eq!(classifier.category_switch(&doc), None);

        let (doc, _) = build("https://x/#/courses", "20学时 /20学时");
        assert_eq!(classifier.category_switch(&doc), None);
    }

    #[test]
    fn video_title_and_prompt() {
        let classifier = PlatformClassifier::new();
        let mut doc = DocumentSnapshot::new("https://x/#/video");
        assert_eq!(classifier.video_title(&doc), UNTITLED_VIDEO);

        doc.append(None, Node::new("h1").text("  Lifetimes  "));
        let ok = doc.append(None, Node::new("button").text("继续学习"));
        assert_eq!(classifier.video_title(&doc), "Lifetimes");
        assert_eq!(classifier.confirm_prompt(&doc), Some(ok));
    }
}
